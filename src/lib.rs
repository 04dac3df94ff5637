// Library exports for the catalog image translation workflow

// Core modules
pub mod core;
pub mod orchestration;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::Config,
    errors::{
        CatalogError, ConfigError, DetectError, FetchError, PipelineError, RenderError,
        TranslateError,
    },
    types::{
        BoundingBox, FailedEntry, FailureStage, ImageOutcome, Product, ProductImage, RunResult,
        RunSummary, TextDetection, TextRegion, TranslatedRegion,
    },
};

pub use orchestration::{BatchOrchestrator, BatchRunner, ImagePipeline, PipelineOutcome};

pub use services::{
    ApiClient, CatalogClient, HttpImageFetcher, ImageFetcher, OverlayRenderer, ScriptFilter,
    ShopifyClient, TextDetector, Translator, VisionClient,
};

pub use utils::{Metrics, MetricsSnapshot};
