pub mod batch_orchestrator;
pub mod image_pipeline;

pub use batch_orchestrator::{BatchOrchestrator, BatchRunner};
pub use image_pipeline::{ImagePipeline, PipelineOutcome, RenderedImage};
