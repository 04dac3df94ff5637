// Image Pipeline: detect → filter → translate → render for one image

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::config::{Config, ImageTransport};
use crate::core::errors::RenderResult;
use crate::core::types::{TextDetection, TranslatedRegion};
use crate::services::ocr::{ImageSource, TextDetector};
use crate::services::rendering::OverlayRenderer;
use crate::services::translation::{ScriptFilter, Translator};
use crate::utils::Metrics;

/// Result of running one image through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// OCR found nothing (or failed)
    NoText,
    /// Text was found but no region qualified or came back translated
    NothingTranslated { regions: usize },
    Rendered(RenderedImage),
}

/// Processed JPEG plus the regions painted on it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    pub jpeg: Vec<u8>,
    pub translated: Vec<TranslatedRegion>,
}

pub struct ImagePipeline {
    detector: Arc<dyn TextDetector>,
    translator: Arc<dyn Translator>,
    renderer: OverlayRenderer,
    script_filter: ScriptFilter,
    target_language: String,
    transport: ImageTransport,
    metrics: Option<Metrics>,
}

impl ImagePipeline {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        translator: Arc<dyn Translator>,
        renderer: OverlayRenderer,
        config: &Config,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            detector,
            translator,
            renderer,
            script_filter: config.translation.script_filter.clone(),
            target_language: config.translation.target_language.clone(),
            transport: config.google.image_transport,
            metrics,
        }
    }

    /// Override the source-script predicate
    pub fn with_script_filter(mut self, script_filter: ScriptFilter) -> Self {
        self.script_filter = script_filter;
        self
    }

    /// Run one image through OCR, translation and overlay
    ///
    /// Detection and translation errors are soft; only rendering can fail.
    /// `src` is handed to the OCR service instead of the bytes when the
    /// transport is `uri` and the image has a remote URL.
    #[instrument(skip(self, image_bytes), fields(bytes = image_bytes.len()))]
    pub async fn process(
        &self,
        image_bytes: Arc<Vec<u8>>,
        src: Option<&str>,
    ) -> RenderResult<PipelineOutcome> {
        let detection = self.detect(&image_bytes, src).await;
        if detection.is_empty() {
            debug!("No text detected");
            return Ok(PipelineOutcome::NoText);
        }

        let regions = detection.regions().len();
        if let Some(full_text) = detection.full_text() {
            debug!("Detected {} region(s): {:?}", regions, full_text);
        }
        let translated = self.translate_regions(&detection).await;

        if let Some(ref m) = self.metrics {
            m.record_regions(regions, translated.len());
        }

        if translated.is_empty() {
            debug!("{} region(s) detected, none translated", regions);
            return Ok(PipelineOutcome::NothingTranslated { regions });
        }

        debug!("Rendering {}/{} translated region(s)", translated.len(), regions);
        let jpeg = self
            .renderer
            .render(image_bytes, translated.clone())
            .await?;

        Ok(PipelineOutcome::Rendered(RenderedImage { jpeg, translated }))
    }

    async fn detect(&self, image_bytes: &[u8], src: Option<&str>) -> TextDetection {
        let source = match (self.transport, src) {
            (ImageTransport::Uri, Some(url)) if is_remote(url) => ImageSource::Uri(url),
            _ => ImageSource::Inline(image_bytes),
        };

        match self.detector.detect(source).await {
            Ok(detection) => detection,
            Err(e) => {
                warn!("Text detection failed, treating as no text: {}", e);
                TextDetection::default()
            }
        }
    }

    /// Translate qualifying regions one at a time, in detection order
    async fn translate_regions(&self, detection: &TextDetection) -> Vec<TranslatedRegion> {
        let mut translated = Vec::new();

        for region in detection.regions() {
            if region.bounding_box.vertices.is_empty() {
                debug!("Region '{}' has no bounding polygon, skipped", region.text);
                continue;
            }
            if !self.script_filter.matches(&region.text) {
                debug!("Region '{}' not in source scripts, skipped", region.text);
                continue;
            }

            match self.translator.translate(&region.text, &self.target_language).await {
                Ok(Some(text)) => translated.push(TranslatedRegion {
                    region: region.clone(),
                    translated_text: text,
                }),
                Ok(None) => debug!("No translation for '{}'", region.text),
                Err(e) => warn!("Translation failed for '{}': {}", region.text, e),
            }
        }

        translated
    }
}

fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}
