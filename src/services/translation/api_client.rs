use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, instrument};

use crate::core::config::GoogleConfig;
use crate::core::errors::{TranslateError, TranslateResult};
use crate::services::http::error_body;
use crate::utils::{ApiService, Metrics};

/// Translates a single string
#[async_trait]
pub trait Translator: Send + Sync {
    /// `Ok(None)` when the service answered without a usable translation
    async fn translate(&self, text: &str, target_language: &str) -> TranslateResult<Option<String>>;
}

/// Cloud Translation v2 client: one request per text, no batching
pub struct ApiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    metrics: Option<Metrics>,
}

/// Request body for `language/translate/v2`
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    data: Option<TranslationData>,
}

#[derive(Debug, Deserialize)]
struct TranslationData {
    #[serde(default)]
    translations: Vec<TranslationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslationEntry {
    #[serde(default)]
    translated_text: Option<String>,
}

impl ApiClient {
    pub fn new(http_client: reqwest::Client, config: &GoogleConfig, metrics: Option<Metrics>) -> Self {
        Self {
            http_client,
            endpoint: config.translate_endpoint.clone(),
            api_key: config.api_key.clone(),
            metrics,
        }
    }

    async fn send(&self, text: &str, target_language: &str) -> TranslateResult<Option<String>> {
        let url = format!("{}?key={}", self.endpoint, urlencoding::encode(&self.api_key));
        let request_body = TranslateRequest {
            q: text,
            target: target_language,
            format: "text",
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let response_text = response.text().await?;
        parse_translate_response(&response_text)
    }
}

#[async_trait]
impl Translator for ApiClient {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn translate(&self, text: &str, target_language: &str) -> TranslateResult<Option<String>> {
        debug!("Text translation for: {}", text.chars().take(50).collect::<String>());

        let start = Instant::now();
        let result = self.send(text, target_language).await;

        if let Some(ref m) = self.metrics {
            m.record_api_call(ApiService::Translate, result.is_ok(), start.elapsed());
        }

        result
    }
}

/// Extract the first `translatedText`; missing or blank means no translation
pub fn parse_translate_response(body: &str) -> TranslateResult<Option<String>> {
    let response: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslateError::InvalidResponse(e.to_string()))?;

    let translated = response
        .data
        .and_then(|d| d.translations.into_iter().next())
        .and_then(|t| t.translated_text)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(translated)
}
