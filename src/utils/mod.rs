pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{decode_image, encode_jpeg, fill_rect, image_dimensions_async, PixelRect};
pub use metrics::{ApiService, Metrics, MetricsSnapshot};
