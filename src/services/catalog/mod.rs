// Catalog client - Shopify admin REST API (products and product images)

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use reqwest::header::{HeaderMap, LINK};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::core::config::Config;
use crate::core::errors::{CatalogError, CatalogOperation, CatalogResult};
use crate::core::types::{NewImage, Product, ProductImage};
use crate::services::http::error_body;
use crate::utils::{ApiService, Metrics};

/// Read and replace operations on the product catalog
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Every product with its images, across all pages
    async fn list_products(&self) -> CatalogResult<Vec<Product>>;

    async fn delete_image(&self, product_id: u64, image_id: u64) -> CatalogResult<()>;

    /// Attach a new image to the product, returning the created image
    async fn upload_image(&self, product_id: u64, image: NewImage) -> CatalogResult<ProductImage>;
}

/// Shopify admin API client authenticated with a static access token
pub struct ShopifyClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
    page_size: u32,
    metrics: Option<Metrics>,
}

#[derive(Debug, Deserialize)]
struct ProductsPage {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Serialize)]
struct UploadRequest<'a> {
    image: UploadAttachment<'a>,
}

#[derive(Debug, Serialize)]
struct UploadAttachment<'a> {
    attachment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    image: Option<ProductImage>,
}

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

impl ShopifyClient {
    pub fn new(http_client: reqwest::Client, config: &Config, metrics: Option<Metrics>) -> Self {
        Self {
            http_client,
            base_url: config.catalog_base_url(),
            access_token: config.catalog.admin_token.clone(),
            page_size: config.catalog.page_size,
            metrics,
        }
    }

    fn record(&self, success: bool, start: Instant) {
        if let Some(ref m) = self.metrics {
            m.record_api_call(ApiService::Catalog, success, start.elapsed());
        }
    }

    /// Fetch one page, returning its products and the next page URL if any
    async fn fetch_page(&self, url: &str) -> CatalogResult<(Vec<Product>, Option<String>)> {
        let op = CatalogOperation::ListProducts;
        let start = Instant::now();

        let response = self
            .http_client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|source| CatalogError::Request { operation: op, source });

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.record(false, start);
                return Err(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.record(false, start);
            return Err(CatalogError::Status {
                operation: op,
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let next = next_page_url(response.headers());
        let body = response
            .text()
            .await
            .map_err(|source| CatalogError::Request { operation: op, source });
        let page = body.and_then(|b| parse_products_page(&b));
        self.record(page.is_ok(), start);

        Ok((page?, next))
    }
}

#[async_trait]
impl CatalogClient for ShopifyClient {
    #[instrument(skip(self))]
    async fn list_products(&self) -> CatalogResult<Vec<Product>> {
        let mut url = Some(format!(
            "{}/products.json?limit={}",
            self.base_url, self.page_size
        ));
        let mut products = Vec::new();
        let mut pages = 0usize;

        while let Some(page_url) = url {
            let (page, next) = self.fetch_page(&page_url).await?;
            pages += 1;
            debug!("Catalog page {}: {} products", pages, page.len());
            products.extend(page);
            url = next;
        }

        info!("Listed {} products across {} page(s)", products.len(), pages);
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn delete_image(&self, product_id: u64, image_id: u64) -> CatalogResult<()> {
        let op = CatalogOperation::DeleteImage;
        let url = format!(
            "{}/products/{}/images/{}.json",
            self.base_url, product_id, image_id
        );
        let start = Instant::now();

        let response = self
            .http_client
            .delete(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|source| CatalogError::Request { operation: op, source });

        let result = match response {
            Ok(r) if r.status().is_success() => Ok(()),
            Ok(r) => Err(CatalogError::Status {
                operation: op,
                status: r.status().as_u16(),
                body: error_body(r).await,
            }),
            Err(e) => Err(e),
        };
        self.record(result.is_ok(), start);
        result
    }

    #[instrument(skip(self, image), fields(bytes = image.jpeg.len()))]
    async fn upload_image(&self, product_id: u64, image: NewImage) -> CatalogResult<ProductImage> {
        let op = CatalogOperation::UploadImage;
        let url = format!("{}/products/{}/images.json", self.base_url, product_id);
        let payload = build_upload_request(&image);
        let start = Instant::now();

        let response = self
            .http_client
            .post(&url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|source| CatalogError::Request { operation: op, source });

        let result = match response {
            Ok(r) if r.status().is_success() => match r.text().await {
                Ok(body) => parse_upload_response(&body),
                Err(source) => Err(CatalogError::Request { operation: op, source }),
            },
            Ok(r) => Err(CatalogError::Status {
                operation: op,
                status: r.status().as_u16(),
                body: error_body(r).await,
            }),
            Err(e) => Err(e),
        };
        self.record(result.is_ok(), start);
        result
    }
}

fn build_upload_request(image: &NewImage) -> UploadRequest<'_> {
    UploadRequest {
        image: UploadAttachment {
            attachment: general_purpose::STANDARD.encode(&image.jpeg),
            position: image.position,
            alt: image.alt.as_deref(),
            filename: image.filename.as_deref(),
        },
    }
}

fn parse_products_page(body: &str) -> CatalogResult<Vec<Product>> {
    serde_json::from_str::<ProductsPage>(body)
        .map(|page| page.products)
        .map_err(|e| CatalogError::InvalidResponse {
            operation: CatalogOperation::ListProducts,
            reason: e.to_string(),
        })
}

/// A successful upload echoes the created image under `image`
fn parse_upload_response(body: &str) -> CatalogResult<ProductImage> {
    let invalid = |reason: String| CatalogError::InvalidResponse {
        operation: CatalogOperation::UploadImage,
        reason,
    };

    serde_json::from_str::<UploadResponse>(body)
        .map_err(|e| invalid(e.to_string()))?
        .image
        .ok_or_else(|| invalid("response has no `image` object".to_string()))
}

/// Extract the `rel="next"` target from a `Link` header
///
/// `<https://shop/admin/api/2023-01/products.json?limit=50&page_info=abc>; rel="next"`
pub fn next_page_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|link| {
            let mut parts = link.split(';').map(str::trim);
            let target = parts.next()?.strip_prefix('<')?.strip_suffix('>')?;
            parts
                .any(|p| p.eq_ignore_ascii_case("rel=\"next\"") || p.eq_ignore_ascii_case("rel=next"))
                .then(|| target.to_string())
        })
}
