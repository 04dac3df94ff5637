pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    CatalogError, CatalogOperation, ConfigError, DetectError, FetchError, PipelineError,
    RenderError, TranslateError,
};
pub use types::{
    BoundingBox, FailedEntry, FailureStage, ImageOutcome, NewImage, Product, ProductImage,
    RunResult, RunSummary, SkipReason, TextDetection, TextRegion, TranslatedRegion, Vertex,
};
