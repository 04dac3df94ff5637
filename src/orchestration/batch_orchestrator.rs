// Batch Orchestrator: Main workflow coordinator

use anyhow::{Context, Result};
use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Url;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{CatalogResult, PipelineResult};
use crate::core::types::{
    FailedEntry, FailureStage, ImageOutcome, NewImage, ProductImage, RunResult, SkipReason,
};
use crate::orchestration::image_pipeline::{ImagePipeline, PipelineOutcome};
use crate::services::catalog::{CatalogClient, ShopifyClient};
use crate::services::fetcher::{HttpImageFetcher, ImageFetcher};
use crate::services::http::build_http_client;
use crate::services::ocr::VisionClient;
use crate::services::rendering::OverlayRenderer;
use crate::services::translation::ApiClient;
use crate::utils::Metrics;

/// Main batch orchestrator
pub struct BatchOrchestrator {
    catalog: Arc<dyn CatalogClient>,
    fetcher: Arc<dyn ImageFetcher>,
    pipeline: Arc<ImagePipeline>,
    image_semaphore: Arc<Semaphore>,
    max_concurrent_images: usize,
    metrics: Metrics,
}

impl BatchOrchestrator {
    /// Create the orchestrator with live catalog, OCR and translation clients
    #[instrument(skip(config, metrics))]
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Result<Self> {
        info!("Initializing services...");

        let http_client =
            build_http_client(&config.http).context("Failed to build HTTP client")?;

        let catalog = Arc::new(ShopifyClient::new(
            http_client.clone(),
            &config,
            Some(metrics.clone()),
        ));
        let fetcher = Arc::new(HttpImageFetcher::new(http_client.clone(), Some(metrics.clone())));
        let detector = Arc::new(VisionClient::new(
            http_client.clone(),
            &config.google,
            Some(metrics.clone()),
        ));
        let translator = Arc::new(ApiClient::new(
            http_client,
            &config.google,
            Some(metrics.clone()),
        ));
        let renderer = OverlayRenderer::new(&config.rendering);

        let pipeline = ImagePipeline::new(
            detector,
            translator,
            renderer,
            &config,
            Some(metrics.clone()),
        );

        info!(
            "✓ Ready (store: {}, target: {}, source scripts: {}, concurrent images: {})",
            config.catalog.store_domain,
            config.translation.target_language,
            if config.translation.script_filter.is_active() { "filtered" } else { "any" },
            config.max_concurrent_images()
        );

        Ok(Self::from_parts(
            catalog,
            fetcher,
            pipeline,
            config.max_concurrent_images(),
            metrics,
        ))
    }

    /// Assemble from already-built components
    pub fn from_parts(
        catalog: Arc<dyn CatalogClient>,
        fetcher: Arc<dyn ImageFetcher>,
        pipeline: ImagePipeline,
        max_concurrent_images: usize,
        metrics: Metrics,
    ) -> Self {
        let max_concurrent_images = max_concurrent_images.max(1);
        Self {
            catalog,
            fetcher,
            pipeline: Arc::new(pipeline),
            image_semaphore: Arc::new(Semaphore::new(max_concurrent_images)),
            max_concurrent_images,
            metrics,
        }
    }

    /// Translate every image of every product in the catalog
    ///
    /// Listing failure aborts the run; every per-image problem is recorded in
    /// the returned `RunResult` and the run carries on.
    #[instrument(skip(self))]
    pub async fn run(&self) -> CatalogResult<RunResult> {
        let start_time = Instant::now();

        let products = match self.catalog.list_products().await {
            Ok(products) => products,
            Err(e) => {
                error!("Failed to fetch products: {}", e);
                self.metrics.record_run(start_time.elapsed(), None);
                return Err(e);
            }
        };

        let jobs: Vec<(u64, ProductImage)> = products
            .iter()
            .flat_map(|p| p.images.iter().map(move |image| (p.id, image.clone())))
            .collect();

        info!(
            "Processing {} images across {} products (concurrency: {})",
            jobs.len(),
            products.len(),
            self.max_concurrent_images
        );

        let tasks = jobs.iter().map(|(product_id, image)| {
            let semaphore = Arc::clone(&self.image_semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok();
                self.process_product_image(*product_id, image).await
            }
        });
        let outcomes = join_all(tasks).await;

        // Fold in catalog order
        let mut result = RunResult {
            products: products.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            self.metrics.record_image_outcome(&outcome);
            result.record(outcome);
        }

        let elapsed = start_time.elapsed();
        self.metrics.record_run(elapsed, Some(&result));

        info!(
            "✓ Run complete: {} replaced, {} skipped, {} failed in {:.2}s",
            result.succeeded,
            result.skipped,
            result.failed.len(),
            elapsed.as_secs_f64()
        );

        Ok(result)
    }

    /// Fetch, translate and replace one product image
    #[instrument(skip(self, image), fields(image_id = image.id))]
    pub async fn process_product_image(&self, product_id: u64, image: &ProductImage) -> ImageOutcome {
        let Some(src) = image.src.as_deref().filter(|s| !s.trim().is_empty()) else {
            debug!("Image has no src, skipped");
            return ImageOutcome::Skipped(SkipReason::MissingSource);
        };

        let failed = |stage: FailureStage, reason: String| {
            ImageOutcome::Failed(FailedEntry {
                product_id,
                image_id: image.id,
                image_src: src.to_string(),
                stage,
                reason,
            })
        };

        let bytes = match self.fetcher.fetch(src).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Fetch failed for {}: {}", src, e);
                return failed(FailureStage::Fetch, e.to_string());
            }
        };

        let rendered = match self.pipeline.process(Arc::new(bytes), Some(src)).await {
            Ok(PipelineOutcome::Rendered(rendered)) => rendered,
            Ok(PipelineOutcome::NoText) => return ImageOutcome::Skipped(SkipReason::NoText),
            Ok(PipelineOutcome::NothingTranslated { .. }) => {
                return ImageOutcome::Skipped(SkipReason::NothingTranslated)
            }
            Err(e) => {
                error!("Render failed for {}: {}", src, e);
                return failed(FailureStage::Render, e.to_string());
            }
        };

        // Old image goes first; a failed delete is tolerated
        if let Err(e) = self.catalog.delete_image(product_id, image.id).await {
            warn!("Could not delete image {} of product {}: {}", image.id, product_id, e);
        }

        let replacement = NewImage {
            jpeg: rendered.jpeg,
            position: image.position,
            alt: image.alt.clone(),
            filename: replacement_filename(src),
        };

        match self.catalog.upload_image(product_id, replacement).await {
            Ok(created) => {
                info!(
                    "✓ Product {}: image {} replaced by {} ({} region(s))",
                    product_id,
                    image.id,
                    created.id,
                    rendered.translated.len()
                );
                ImageOutcome::Replaced
            }
            Err(e) => {
                error!("Upload failed for product {} ({}): {}", product_id, src, e);
                failed(FailureStage::Upload, e.to_string())
            }
        }
    }

    /// Fetch one image and run it through the pipeline without touching the catalog
    #[instrument(skip(self))]
    pub async fn translate_single(&self, url: &str) -> PipelineResult<PipelineOutcome> {
        let bytes = self.fetcher.fetch(url).await?;
        Ok(self.pipeline.process(Arc::new(bytes), Some(url)).await?)
    }
}

/// Runs batches on their own task, one at a time
///
/// A started run always completes and stores its result, even when the caller
/// stops waiting for it.
#[derive(Clone)]
pub struct BatchRunner {
    orchestrator: Arc<BatchOrchestrator>,
    run_lock: Arc<Mutex<()>>,
    last_run: Arc<RwLock<Option<RunResult>>>,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<BatchOrchestrator>) -> Self {
        Self {
            orchestrator,
            run_lock: Arc::new(Mutex::new(())),
            last_run: Arc::new(RwLock::new(None)),
        }
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    /// Start a run, or `None` while another one is in progress
    pub fn start(&self) -> Option<JoinHandle<CatalogResult<RunResult>>> {
        let guard = Arc::clone(&self.run_lock).try_lock_owned().ok()?;
        let orchestrator = Arc::clone(&self.orchestrator);
        let last_run = Arc::clone(&self.last_run);

        Some(tokio::spawn(async move {
            let _guard = guard;
            let result = orchestrator.run().await;
            if let Ok(ref run) = result {
                *last_run.write() = Some(run.clone());
            }
            result
        }))
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Result of the most recent completed run
    pub fn last_run(&self) -> Option<RunResult> {
        self.last_run.read().clone()
    }
}

/// `https://cdn/x/mug.png?v=3` → `mug-translated.jpg`
fn replacement_filename(src: &str) -> Option<String> {
    let url = Url::parse(src).ok()?;
    let name = url.path_segments()?.last()?;
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    (!stem.is_empty()).then(|| format!("{}-translated.jpg", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ImageTransport;
    use crate::core::errors::{
        CatalogError, CatalogOperation, DetectResult, FetchError, FetchResult, PipelineError,
    };
    use crate::core::types::{BoundingBox, Product, TextDetection, TextRegion};
    use crate::orchestration::image_pipeline::tests::{
        gray_png, test_renderer, FakeDetector, FakeTranslator,
    };
    use crate::services::ocr::{ImageSource, TextDetector};
    use crate::services::translation::ScriptFilter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory store acting as both the catalog and the image host
    #[derive(Default)]
    struct FakeStore {
        products: Mutex<Vec<Product>>,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        writes: Mutex<Vec<String>>,
        list_status: Option<u16>,
        fail_uploads: bool,
        next_id: AtomicUsize,
        fetch_delay: Option<Duration>,
        upload_delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeStore {
        fn with_image(self, product_id: u64, image_id: u64, src: Option<&str>, bytes: Vec<u8>) -> Self {
            {
                let mut products = self.products.lock();
                let image = ProductImage {
                    id: image_id,
                    product_id: Some(product_id),
                    src: src.map(str::to_string),
                    position: Some(1),
                    alt: Some("front".to_string()),
                };
                match products.iter_mut().find(|p| p.id == product_id) {
                    Some(product) => product.images.push(image),
                    None => products.push(Product {
                        id: product_id,
                        title: None,
                        images: vec![image],
                    }),
                }
                if let Some(src) = src {
                    self.blobs.lock().insert(src.to_string(), bytes);
                }
            }
            self
        }

        fn image_ids(&self, product_id: u64) -> Vec<u64> {
            self.products
                .lock()
                .iter()
                .find(|p| p.id == product_id)
                .map(|p| p.images.iter().map(|i| i.id).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CatalogClient for FakeStore {
        async fn list_products(&self) -> CatalogResult<Vec<Product>> {
            if let Some(status) = self.list_status {
                return Err(CatalogError::Status {
                    operation: CatalogOperation::ListProducts,
                    status,
                    body: "boom".to_string(),
                });
            }
            Ok(self.products.lock().clone())
        }

        async fn delete_image(&self, product_id: u64, image_id: u64) -> CatalogResult<()> {
            self.writes.lock().push(format!("delete {}/{}", product_id, image_id));
            for product in self.products.lock().iter_mut().filter(|p| p.id == product_id) {
                product.images.retain(|i| i.id != image_id);
            }
            Ok(())
        }

        async fn upload_image(&self, product_id: u64, image: NewImage) -> CatalogResult<ProductImage> {
            if let Some(delay) = self.upload_delay {
                tokio::time::sleep(delay).await;
            }
            self.writes.lock().push(format!("upload {}", product_id));
            if self.fail_uploads {
                return Err(CatalogError::Status {
                    operation: CatalogOperation::UploadImage,
                    status: 422,
                    body: "invalid attachment".to_string(),
                });
            }

            let id = 1000 + self.next_id.fetch_add(1, Ordering::SeqCst) as u64;
            let src = format!("https://cdn.example/{}.jpg", id);
            let created = ProductImage {
                id,
                product_id: Some(product_id),
                src: Some(src.clone()),
                position: image.position,
                alt: image.alt,
            };
            self.blobs.lock().insert(src, image.jpeg);
            for product in self.products.lock().iter_mut().filter(|p| p.id == product_id) {
                product.images.push(created.clone());
            }
            Ok(created)
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeStore {
        async fn fetch(&self, url: &str) -> FetchResult<Vec<u8>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.blobs
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    /// Sees Chinese on source PNGs and the English overlay on re-uploaded JPEGs
    struct OverlayAwareDetector;

    #[async_trait]
    impl TextDetector for OverlayAwareDetector {
        async fn detect(&self, image: ImageSource<'_>) -> DetectResult<TextDetection> {
            let ImageSource::Inline(bytes) = image else {
                return Ok(TextDetection::default());
            };
            let text = match image::guess_format(bytes) {
                Ok(image::ImageFormat::Jpeg) => "Hello",
                _ => "你好",
            };
            let bbox = BoundingBox::from_corners(10, 10, 50, 30);
            Ok(TextDetection::new(vec![
                TextRegion::new(text, bbox.clone()),
                TextRegion::new(text, bbox),
            ]))
        }
    }

    fn hello_detector() -> Arc<FakeDetector> {
        Arc::new(FakeDetector::with_regions(vec![TextRegion::new(
            "你好",
            BoundingBox::from_corners(10, 10, 50, 30),
        )]))
    }

    fn hello_translator() -> Arc<FakeTranslator> {
        Arc::new(FakeTranslator::with(&[("你好", "Hello"), ("Hello", "Hello")]))
    }

    fn orchestrator(
        store: Arc<FakeStore>,
        detector: Arc<dyn TextDetector>,
        script_filter: ScriptFilter,
        max_concurrent: usize,
    ) -> BatchOrchestrator {
        let pipeline = ImagePipeline::new(
            detector,
            hello_translator(),
            test_renderer(),
            &test_config(),
            None,
        )
        .with_script_filter(script_filter);
        BatchOrchestrator::from_parts(store.clone(), store, pipeline, max_concurrent, Metrics::new())
    }

    fn test_config() -> Config {
        let mut config = Config::from_lookup(|key| match key {
            "SHOPIFY_STORE_DOMAIN" => Some("shop.example".to_string()),
            "SHOPIFY_ADMIN_TOKEN" => Some("token".to_string()),
            "GOOGLE_API_KEY" => Some("key".to_string()),
            _ => None,
        })
        .unwrap();
        config.google.image_transport = ImageTransport::Inline;
        config
    }

    #[tokio::test]
    async fn test_replaces_image_with_translated_overlay() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/mug.png"),
            gray_png(100, 60),
        ));
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();

        assert_eq!(result.products, 1);
        assert_eq!(result.succeeded, 1);
        assert!(result.failed.is_empty());
        assert_eq!(*store.writes.lock(), vec!["delete 1/11", "upload 1"]);
        assert_eq!(store.image_ids(1), vec![1000]);

        let uploaded = store.blobs.lock().get("https://cdn.example/1000.jpg").cloned().unwrap();
        let decoded = image::load_from_memory(&uploaded).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (100, 60));
        let p = decoded.get_pixel(49, 29);
        assert!(p[0] > 230 && p[1] > 230 && p[2] > 230, "box pixel {:?}", p);

        // Position and alt survive the replacement
        let products = store.products.lock();
        assert_eq!(products[0].images[0].position, Some(1));
        assert_eq!(products[0].images[0].alt.as_deref(), Some("front"));
    }

    #[tokio::test]
    async fn test_image_without_text_is_left_alone() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/plain.png"),
            gray_png(20, 20),
        ));
        let detector = Arc::new(FakeDetector::with_regions(vec![]));
        let orch = orchestrator(store.clone(), detector, ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();
        assert_eq!(result.succeeded, 0);
        assert_eq!(result.skipped, 1);
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_image_without_src_is_never_written() {
        let store = Arc::new(FakeStore::default().with_image(1, 11, None, Vec::new()));
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();
        assert_eq!(result.skipped, 1);
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_run() {
        let store = Arc::new(FakeStore {
            list_status: Some(500),
            ..Default::default()
        });
        let metrics = Metrics::new();
        let pipeline = ImagePipeline::new(hello_detector(), hello_translator(), test_renderer(), &test_config(), None);
        let orch = BatchOrchestrator::from_parts(store.clone(), store.clone(), pipeline, 1, metrics.clone());

        let err = orch.run().await.unwrap_err();
        assert_eq!(err.operation(), CatalogOperation::ListProducts);
        assert!(store.writes.lock().is_empty());
        assert_eq!(metrics.snapshot().runs_failed, 1);
    }

    #[tokio::test]
    async fn test_upload_failure_after_delete_is_recorded() {
        let src = "https://cdn.example/mug.png";
        let store = Arc::new(FakeStore {
            fail_uploads: true,
            ..Default::default()
        }
        .with_image(7, 70, Some(src), gray_png(100, 60)));
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();

        assert_eq!(result.succeeded, 0);
        assert_eq!(result.failed.len(), 1);
        let entry = &result.failed[0];
        assert_eq!(entry.product_id, 7);
        assert_eq!(entry.image_src, src);
        assert_eq!(entry.stage, FailureStage::Upload);
        // Old image is gone
        assert!(store.image_ids(7).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded_and_run_continues() {
        let store = Arc::new(
            FakeStore::default()
                .with_image(1, 11, Some("https://cdn.example/ok.png"), gray_png(100, 60))
                .with_image(2, 21, Some("https://cdn.example/gone.png"), gray_png(100, 60)),
        );
        store.blobs.lock().remove("https://cdn.example/gone.png");
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].stage, FailureStage::Fetch);
        assert_eq!(result.failed[0].image_id, 21);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_a_render_failure() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/broken.jpg"),
            b"not really an image".to_vec(),
        ));
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let result = orch.run().await.unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].stage, FailureStage::Render);
        assert!(store.writes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_with_default_filter_is_a_no_op() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/mug.png"),
            gray_png(100, 60),
        ));
        let orch = orchestrator(store.clone(), Arc::new(OverlayAwareDetector), ScriptFilter::cjk(), 1);

        assert_eq!(orch.run().await.unwrap().succeeded, 1);
        let second = orch.run().await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(store.writes.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_second_run_without_filter_replaces_again() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/mug.png"),
            gray_png(100, 60),
        ));
        let orch = orchestrator(store.clone(), Arc::new(OverlayAwareDetector), ScriptFilter::any(), 1);

        assert_eq!(orch.run().await.unwrap().succeeded, 1);
        assert_eq!(orch.run().await.unwrap().succeeded, 1);
        assert_eq!(
            *store.writes.lock(),
            vec!["delete 1/11", "upload 1", "delete 1/1000", "upload 1"]
        );
        assert_eq!(store.image_ids(1), vec![1001]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_and_order_preserved() {
        let mut store = FakeStore {
            fetch_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        for i in 0..6u64 {
            let src = format!("https://cdn.example/missing-{}.png", i);
            store = store.with_image(i + 1, i + 10, Some(&src), Vec::new());
        }
        store.blobs.lock().clear();
        let store = Arc::new(store);
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 2);

        let result = orch.run().await.unwrap();

        let ids: Vec<u64> = result.failed.iter().map(|f| f.image_id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13, 14, 15]);
        let peak = store.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak {}", peak);
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_translate_single() {
        let store = Arc::new(FakeStore::default().with_image(
            1,
            11,
            Some("https://cdn.example/mug.png"),
            gray_png(100, 60),
        ));
        let orch = orchestrator(store.clone(), hello_detector(), ScriptFilter::cjk(), 1);

        let outcome = orch.translate_single("https://cdn.example/mug.png").await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Rendered(_)));
        assert!(store.writes.lock().is_empty());

        let err = orch.translate_single("https://cdn.example/nope.png").await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_runner_finishes_run_after_caller_gives_up() {
        let src = "https://cdn.example/mug.png";
        let store = Arc::new(FakeStore {
            fail_uploads: true,
            upload_delay: Some(Duration::from_millis(150)),
            ..Default::default()
        }
        .with_image(1, 11, Some(src), gray_png(100, 60)));
        let runner = BatchRunner::new(Arc::new(orchestrator(
            store.clone(),
            hello_detector(),
            ScriptFilter::cjk(),
            1,
        )));

        let handle = runner.start().unwrap();
        // Caller stops waiting while the upload is still in flight
        assert!(tokio::time::timeout(Duration::from_millis(50), handle).await.is_err());
        assert!(runner.is_running());

        let mut last_run = None;
        for _ in 0..100 {
            last_run = runner.last_run();
            if last_run.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let last_run = last_run.expect("run should complete in the background");
        assert_eq!(last_run.failed.len(), 1);
        assert_eq!(last_run.failed[0].stage, FailureStage::Upload);
        assert_eq!(last_run.failed[0].image_src, src);
        assert_eq!(*store.writes.lock(), vec!["delete 1/11", "upload 1"]);
    }

    #[tokio::test]
    async fn test_runner_rejects_overlapping_runs() {
        let store = Arc::new(FakeStore {
            upload_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        }
        .with_image(1, 11, Some("https://cdn.example/mug.png"), gray_png(100, 60)));
        let runner = BatchRunner::new(Arc::new(orchestrator(
            store,
            hello_detector(),
            ScriptFilter::cjk(),
            1,
        )));

        let first = runner.start().unwrap();
        assert!(runner.start().is_none());

        let result = first.await.unwrap().unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(runner.last_run(), Some(result));
        assert!(!runner.is_running());
        assert!(runner.start().is_some());
    }

    #[tokio::test]
    async fn test_runner_keeps_previous_result_on_listing_failure() {
        let store = Arc::new(FakeStore {
            list_status: Some(500),
            ..Default::default()
        });
        let runner = BatchRunner::new(Arc::new(orchestrator(
            store,
            hello_detector(),
            ScriptFilter::cjk(),
            1,
        )));

        assert!(runner.start().unwrap().await.unwrap().is_err());
        assert_eq!(runner.last_run(), None);
    }

    #[test]
    fn test_replacement_filename() {
        assert_eq!(
            replacement_filename("https://cdn.example/files/mug.png?v=3").as_deref(),
            Some("mug-translated.jpg")
        );
        assert_eq!(
            replacement_filename("https://cdn.example/files/poster").as_deref(),
            Some("poster-translated.jpg")
        );
        assert_eq!(
            replacement_filename("https://cdn.example/files/mug.v2.png#frag").as_deref(),
            Some("mug.v2-translated.jpg")
        );
        assert_eq!(replacement_filename("https://cdn.example/"), None);
        assert_eq!(replacement_filename("not a url"), None);
    }
}
