// Image Fetcher - downloads raw image bytes

use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::core::errors::{FetchError, FetchResult};
use crate::utils::{ApiService, Metrics};

/// Retrieves raw image bytes from an absolute URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<Vec<u8>>;
}

/// Plain HTTP GET fetcher, one attempt per image
pub struct HttpImageFetcher {
    http_client: reqwest::Client,
    metrics: Option<Metrics>,
}

impl HttpImageFetcher {
    pub fn new(http_client: reqwest::Client, metrics: Option<Metrics>) -> Self {
        Self {
            http_client,
            metrics,
        }
    }

    async fn fetch_once(&self, url: &str) -> FetchResult<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> FetchResult<Vec<u8>> {
        let start = Instant::now();
        let result = self.fetch_once(url).await;

        if let Some(ref m) = self.metrics {
            m.record_api_call(ApiService::ImageFetch, result.is_ok(), start.elapsed());
        }
        if let Ok(ref bytes) = result {
            debug!("Fetched {} bytes in {:.0}ms", bytes.len(), start.elapsed().as_secs_f64() * 1000.0);
        }

        result
    }
}
