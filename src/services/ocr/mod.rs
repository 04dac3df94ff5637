// OCR Service Module - text detection through the Cloud Vision REST API

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::core::config::GoogleConfig;
use crate::core::errors::{DetectError, DetectResult};
use crate::core::types::{BoundingBox, TextDetection, TextRegion, Vertex};
use crate::services::http::error_body;
use crate::utils::{ApiService, Metrics};

/// How the image reaches the OCR service
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// Raw bytes, sent base64-encoded
    Inline(&'a [u8]),
    /// Publicly reachable URL, fetched by the service
    Uri(&'a str),
}

/// Detects text regions in an image
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Returns the raw annotations: element 0 is the full-image aggregate
    async fn detect(&self, image: ImageSource<'_>) -> DetectResult<TextDetection>;
}

/// Cloud Vision `images:annotate` client using `TEXT_DETECTION`
pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    responses: Option<Vec<AnnotateImageResponse>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    text_annotations: Option<Vec<EntityAnnotation>>,
    #[serde(default)]
    error: Option<StatusPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bounding_poly: Option<BoundingPoly>,
}

#[derive(Debug, Deserialize)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl VisionClient {
    pub fn new(http_client: reqwest::Client, config: &GoogleConfig, metrics: Option<Metrics>) -> Self {
        Self {
            http_client,
            endpoint: config.vision_endpoint.clone(),
            api_key: config.api_key.clone(),
            metrics,
        }
    }

    async fn annotate(&self, body: &serde_json::Value) -> DetectResult<TextDetection> {
        let url = format!("{}?key={}", self.endpoint, urlencoding::encode(&self.api_key));

        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let text = response.text().await?;
        parse_annotate_response(&text)
    }
}

#[async_trait]
impl TextDetector for VisionClient {
    #[instrument(skip(self, image))]
    async fn detect(&self, image: ImageSource<'_>) -> DetectResult<TextDetection> {
        let body = build_annotate_request(image);
        let start = Instant::now();
        let result = self.annotate(&body).await;

        if let Some(ref m) = self.metrics {
            m.record_api_call(ApiService::Vision, result.is_ok(), start.elapsed());
        }
        if let Ok(ref detection) = result {
            debug!(
                "OCR returned {} annotations in {:.0}ms",
                detection.annotations.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
        }

        result
    }
}

/// Build the `images:annotate` request body
pub fn build_annotate_request(image: ImageSource<'_>) -> serde_json::Value {
    let image = match image {
        ImageSource::Inline(bytes) => serde_json::json!({
            "content": general_purpose::STANDARD.encode(bytes)
        }),
        ImageSource::Uri(uri) => serde_json::json!({
            "source": { "imageUri": uri }
        }),
    };

    serde_json::json!({
        "requests": [{
            "image": image,
            "features": [{ "type": "TEXT_DETECTION" }]
        }]
    })
}

/// Parse an `images:annotate` response body into raw annotations
///
/// Missing `responses` or `textAnnotations` mean "no text". Annotations with a
/// missing description or polygon are kept so that index 0 stays the aggregate.
pub fn parse_annotate_response(body: &str) -> DetectResult<TextDetection> {
    let response: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| DetectError::InvalidResponse(e.to_string()))?;

    let Some(first) = response.responses.and_then(|r| r.into_iter().next()) else {
        return Ok(TextDetection::default());
    };

    if let Some(error) = first.error {
        return Err(DetectError::Service {
            code: error.code,
            message: error.message,
        });
    }

    let annotations = first
        .text_annotations
        .unwrap_or_default()
        .into_iter()
        .map(|a| {
            TextRegion::new(
                a.description.unwrap_or_default(),
                BoundingBox::new(a.bounding_poly.map(|p| p.vertices).unwrap_or_default()),
            )
        })
        .collect();

    Ok(TextDetection::new(annotations))
}
