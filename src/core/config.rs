use crate::core::errors::ConfigError;
use crate::services::translation::script_filter::ScriptFilter;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Store admin API configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub store_domain: String,
    pub admin_token: String,
    pub api_version: String,
    /// Products requested per page; further pages are followed via the Link header
    pub page_size: u32,
}

/// How images are handed to the OCR service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTransport {
    /// Base64 content in the request body
    Inline,
    /// Image URL, fetched by the OCR service itself
    Uri,
}

impl FromStr for ImageTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" | "content" => Ok(ImageTransport::Inline),
            "uri" | "url" => Ok(ImageTransport::Uri),
            other => Err(format!("expected `inline` or `uri`, got `{}`", other)),
        }
    }
}

/// Google Cloud (Vision + Translation) configuration
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
    pub vision_endpoint: String,
    pub translate_endpoint: String,
    pub image_transport: ImageTransport,
}

/// Translation configuration
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub target_language: String,
    pub script_filter: ScriptFilter,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            target_language: "en".to_string(),
            script_filter: ScriptFilter::cjk(),
        }
    }
}

/// Overlay rendering configuration
#[derive(Debug, Clone)]
pub struct RenderingConfig {
    /// Preferred font file; the system monospace font is used when it is missing
    pub font_path: Option<PathBuf>,
    pub system_fonts: bool,
    /// Fixed font size; derived from the box height when unset
    pub font_size: Option<f32>,
    pub fallback_box_width: u32,
    pub fallback_box_height: u32,
    pub box_margin: u32,
    pub jpeg_quality: u8,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            font_path: Some(PathBuf::from("arial.ttf")),
            system_fonts: true,
            font_size: None,
            fallback_box_width: 120,
            fallback_box_height: 25,
            box_margin: 2,
            jpeg_quality: 90,
        }
    }
}

/// Batch run configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Images processed at the same time (1 = strictly sequential)
    pub max_concurrent_images: usize,
}

/// Outbound HTTP configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            connect_timeout_seconds: 10,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub google: GoogleConfig,
    pub translation: TranslationConfig,
    pub rendering: RenderingConfig,
    pub batch: BatchConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary key lookup (environment, map, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        // Parse log level
        let log_level = get("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let script_filter = match get("SOURCE_SCRIPTS") {
            Some(spec) => ScriptFilter::parse(&spec).map_err(|reason| ConfigError::Invalid {
                key: "SOURCE_SCRIPTS",
                value: spec.clone(),
                reason,
            })?,
            None => ScriptFilter::cjk(),
        };

        let font_path = match get("FONT_PATH") {
            Some(path) if matches!(path.to_lowercase().as_str(), "none" | "off") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => RenderingConfig::default().font_path,
        };

        let store_domain = required("SHOPIFY_STORE_DOMAIN")?
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            server: ServerConfig {
                port: parse_or(&get, "SERVER_PORT", 5000)?,
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                log_level,
            },
            catalog: CatalogConfig {
                store_domain,
                admin_token: required("SHOPIFY_ADMIN_TOKEN")?,
                api_version: get("SHOPIFY_API_VERSION").unwrap_or_else(|| "2023-01".to_string()),
                page_size: parse_or(&get, "CATALOG_PAGE_SIZE", 50)?,
            },
            google: GoogleConfig {
                api_key: required("GOOGLE_API_KEY")?,
                vision_endpoint: get("VISION_ENDPOINT").unwrap_or_else(|| {
                    "https://vision.googleapis.com/v1/images:annotate".to_string()
                }),
                translate_endpoint: get("TRANSLATE_ENDPOINT").unwrap_or_else(|| {
                    "https://translation.googleapis.com/language/translate/v2".to_string()
                }),
                image_transport: parse_or(&get, "OCR_IMAGE_TRANSPORT", ImageTransport::Inline)?,
            },
            translation: TranslationConfig {
                target_language: get("TARGET_LANGUAGE").unwrap_or_else(|| "en".to_string()),
                script_filter,
            },
            rendering: RenderingConfig {
                font_path,
                system_fonts: parse_or(&get, "SYSTEM_FONTS", true)?,
                font_size: get("FONT_SIZE")
                    .map(|s| {
                        s.parse::<f32>().map_err(|e| ConfigError::Invalid {
                            key: "FONT_SIZE",
                            value: s.clone(),
                            reason: e.to_string(),
                        })
                    })
                    .transpose()?,
                fallback_box_width: parse_or(&get, "FALLBACK_BOX_WIDTH", 120)?,
                fallback_box_height: parse_or(&get, "FALLBACK_BOX_HEIGHT", 25)?,
                box_margin: parse_or(&get, "BOX_MARGIN", 2)?,
                jpeg_quality: parse_or(&get, "JPEG_QUALITY", 90)?,
            },
            batch: BatchConfig {
                max_concurrent_images: parse_or(&get, "MAX_CONCURRENT_IMAGES", 1)?,
            },
            http: HttpConfig {
                timeout_seconds: parse_or(&get, "HTTP_TIMEOUT_SECONDS", 60)?,
                connect_timeout_seconds: parse_or(&get, "HTTP_CONNECT_TIMEOUT_SECONDS", 10)?,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=250).contains(&self.catalog.page_size) {
            return Err(invalid(
                "CATALOG_PAGE_SIZE",
                self.catalog.page_size,
                "must be between 1 and 250",
            ));
        }

        if self.batch.max_concurrent_images == 0 {
            return Err(invalid(
                "MAX_CONCURRENT_IMAGES",
                self.batch.max_concurrent_images,
                "must be > 0",
            ));
        }

        if !(1..=100).contains(&self.rendering.jpeg_quality) {
            return Err(invalid(
                "JPEG_QUALITY",
                self.rendering.jpeg_quality,
                "must be between 1 and 100",
            ));
        }

        if self.rendering.fallback_box_width == 0 || self.rendering.fallback_box_height == 0 {
            return Err(invalid(
                "FALLBACK_BOX_WIDTH",
                format!(
                    "{}x{}",
                    self.rendering.fallback_box_width, self.rendering.fallback_box_height
                ),
                "fallback box must have a non-zero size",
            ));
        }

        if let Some(size) = self.rendering.font_size {
            if !(4.0..=256.0).contains(&size) {
                return Err(invalid("FONT_SIZE", size, "must be between 4 and 256"));
            }
        }

        if self.translation.target_language.is_empty() {
            return Err(invalid("TARGET_LANGUAGE", "", "must not be empty"));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    /// Base URL of the versioned admin REST API
    pub fn catalog_base_url(&self) -> String {
        format!(
            "https://{}/admin/api/{}",
            self.catalog.store_domain, self.catalog.api_version
        )
    }

    pub fn max_concurrent_images(&self) -> usize {
        self.batch.max_concurrent_images
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
