// Error types for every component boundary of the translation pipeline
//
// Each remote collaborator gets its own error enum so the orchestrator can decide,
// per failure kind, whether to skip an image, record a failure or abort the run.

use std::fmt;
use thiserror::Error;

/// Image download errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Image request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Image request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Image at {url} has an empty body")]
    EmptyBody { url: String },
}

/// OCR service errors
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("OCR request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OCR service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("OCR service reported an error (code {code}): {message}")]
    Service { code: i32, message: String },

    #[error("Invalid OCR response: {0}")]
    InvalidResponse(String),
}

/// Translation service errors
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Translation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Translation service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid translation response: {0}")]
    InvalidResponse(String),
}

/// Overlay rendering errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Render task failed: {0}")]
    TaskJoin(String),
}

/// Which catalog call an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOperation {
    ListProducts,
    DeleteImage,
    UploadImage,
}

impl fmt::Display for CatalogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CatalogOperation::ListProducts => "list products",
            CatalogOperation::DeleteImage => "delete image",
            CatalogOperation::UploadImage => "upload image",
        })
    }
}

/// Catalog (store admin API) errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog request failed ({operation}): {source}")]
    Request {
        operation: CatalogOperation,
        #[source]
        source: reqwest::Error,
    },

    #[error("Catalog returned status {status} ({operation}): {body}")]
    Status {
        operation: CatalogOperation,
        status: u16,
        body: String,
    },

    #[error("Unexpected catalog response ({operation}): {reason}")]
    InvalidResponse {
        operation: CatalogOperation,
        reason: String,
    },
}

impl CatalogError {
    pub fn operation(&self) -> CatalogOperation {
        match self {
            CatalogError::Request { operation, .. }
            | CatalogError::Status { operation, .. }
            | CatalogError::InvalidResponse { operation, .. } => *operation,
        }
    }
}

/// Single-image pipeline errors (fetch + render; detection and translation are soft)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// Convenience type aliases for Results
pub type FetchResult<T> = Result<T, FetchError>;
pub type DetectResult<T> = Result<T, DetectError>;
pub type TranslateResult<T> = Result<T, TranslateError>;
pub type RenderResult<T> = Result<T, RenderError>;
pub type CatalogResult<T> = Result<T, CatalogError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error_reports_operation() {
        let err = CatalogError::Status {
            operation: CatalogOperation::UploadImage,
            status: 422,
            body: "bad attachment".to_string(),
        };
        assert_eq!(err.operation(), CatalogOperation::UploadImage);
        assert_eq!(
            err.to_string(),
            "Catalog returned status 422 (upload image): bad attachment"
        );
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::Missing("GOOGLE_API_KEY");
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
