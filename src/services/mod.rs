pub mod catalog;
pub mod fetcher;
pub mod http;
pub mod ocr;
pub mod rendering;
pub mod translation;

// Re-export commonly used services
pub use catalog::{CatalogClient, ShopifyClient};
pub use fetcher::{HttpImageFetcher, ImageFetcher};
pub use http::build_http_client;
pub use ocr::{ImageSource, TextDetector, VisionClient};
pub use rendering::OverlayRenderer;
pub use translation::{ApiClient, ScriptFilter, Translator};
