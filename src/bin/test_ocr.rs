//! Single-image test binary: OCR, translate and overlay one image, no catalog writes
//! Run with: cargo run --release --bin test_ocr -- <image_url_or_path> [output.jpg]

use anyhow::{bail, Context, Result};
use catalog_translator::{
    core::Config,
    orchestration::{ImagePipeline, PipelineOutcome},
    services::{build_http_client, HttpImageFetcher, ImageFetcher, OverlayRenderer},
    utils::image_dimensions_async,
    ApiClient, VisionClient,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Catalog credentials are not needed here
fn offline_default(key: &str) -> Option<String> {
    match key {
        "SHOPIFY_STORE_DOMAIN" => Some("offline.invalid".to_string()),
        "SHOPIFY_ADMIN_TOKEN" => Some("unused".to_string()),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("catalog_translator=debug")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = args.get(1) else {
        bail!("usage: test_ocr <image_url_or_path> [output.jpg]");
    };
    let output = args.get(2).map(String::as_str).unwrap_or("output.jpg");

    let _ = dotenvy::dotenv();
    let config = Config::from_lookup(|key| std::env::var(key).ok().or_else(|| offline_default(key)))
        .context("Failed to load configuration")?;
    config.validate()?;

    let http_client = build_http_client(&config.http)?;
    let is_url = input.starts_with("http://") || input.starts_with("https://");

    let bytes = if is_url {
        info!("Fetching image: {}", input);
        HttpImageFetcher::new(http_client.clone(), None)
            .fetch(input)
            .await?
    } else {
        if !Path::new(input).exists() {
            bail!("Image not found: {}", input);
        }
        info!("Loading image: {}", input);
        std::fs::read(input).with_context(|| format!("Failed to read {}", input))?
    };

    let (width, height) = image_dimensions_async(bytes.clone()).await?;
    info!("Image dimensions: {}x{}", width, height);

    let pipeline = ImagePipeline::new(
        Arc::new(VisionClient::new(http_client.clone(), &config.google, None)),
        Arc::new(ApiClient::new(http_client, &config.google, None)),
        OverlayRenderer::new(&config.rendering),
        &config,
        None,
    );

    info!("\n=== Running pipeline ===");
    let src = is_url.then_some(input.as_str());
    match pipeline.process(Arc::new(bytes), src).await? {
        PipelineOutcome::Rendered(rendered) => {
            std::fs::write(output, &rendered.jpeg)
                .with_context(|| format!("Failed to write {}", output))?;

            println!("\n=== Results ===");
            for (i, region) in rendered.translated.iter().enumerate() {
                println!(
                    "  {}. {} -> {}",
                    i + 1,
                    region.region.text,
                    region.translated_text
                );
            }
            println!("Wrote {} ({} bytes)", output, rendered.jpeg.len());
        }
        PipelineOutcome::NoText => println!("No text detected"),
        PipelineOutcome::NothingTranslated { regions } => {
            println!("{} region(s) detected, nothing translated", regions)
        }
    }

    Ok(())
}
