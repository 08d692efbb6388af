//! Configuration types for the conversion services.
//!
//! One binary runs any of the three services; [`ServiceKind`] selects which
//! routes are mounted and which backend sits behind them. Everything else a
//! running service needs lives in [`ServiceConfig`], built through its
//! [`ServiceConfigBuilder`] so callers set only what they care about and rely
//! on documented defaults for the rest.

use crate::error::ConvertError;
use std::fmt;
use std::path::PathBuf;

/// Header carrying the shared secret on every protected route.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Default bind address for every service.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for every service.
pub const DEFAULT_PORT: u16 = 8080;

/// Default upload size cap (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

// ── Service selection ────────────────────────────────────────────────────

/// The three deployable services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Layout-to-markdown conversion plus metadata extraction.
    DocumentConverter,
    /// Vision-model conversion, accepting uploads and shared-volume paths.
    MarkerApi,
    /// Generic text extraction.
    MarkitdownApi,
}

impl ServiceKind {
    /// Name reported by `/health`.
    pub fn service_name(self) -> &'static str {
        match self {
            ServiceKind::DocumentConverter => "document-converter",
            ServiceKind::MarkerApi => "marker-api",
            ServiceKind::MarkitdownApi => "markitdown-api",
        }
    }

    /// Environment variable holding this service's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ServiceKind::DocumentConverter => "DOCUMENT_CONVERTER_API_KEY",
            ServiceKind::MarkerApi => "MARKER_API_KEY",
            ServiceKind::MarkitdownApi => "MARKITDOWN_API_KEY",
        }
    }

    /// Insecure fallback used when the environment variable is unset.
    pub fn default_api_key(self) -> &'static str {
        match self {
            ServiceKind::DocumentConverter => "converter_secret_key",
            ServiceKind::MarkerApi => "marker_secret_key",
            ServiceKind::MarkitdownApi => "markitdown_secret_key",
        }
    }

    /// Route serving upload-shape markdown conversion.
    pub fn convert_route(self) -> &'static str {
        match self {
            ServiceKind::DocumentConverter => "/convert-mupdf",
            ServiceKind::MarkerApi | ServiceKind::MarkitdownApi => "/convert",
        }
    }

    /// Resolve the API key once from the process environment.
    pub fn resolve_api_key(self) -> String {
        std::env::var(self.api_key_env()).unwrap_or_else(|_| self.default_api_key().to_string())
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

// ── Vision backend options ───────────────────────────────────────────────

/// Tuning for the vision-model converter (marker-api only).
#[derive(Debug, Clone)]
pub struct VisionOptions {
    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Rendering DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    ///
    /// Caps either dimension independent of DPI so a poster-sized page
    /// cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Concurrent page requests per document. Default: 4.
    pub concurrency: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a transient provider failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,
}

impl Default for VisionOptions {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 4,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

// ── Service configuration ────────────────────────────────────────────────

/// Everything a running service needs, fixed at startup.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Which service to run.
    pub kind: ServiceKind,

    /// Shared secret compared against `X-API-Key`.
    pub api_key: String,

    /// Bind host. Default: `0.0.0.0`.
    pub host: String,

    /// Bind port. Default: 8080.
    pub port: u16,

    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,

    /// Directory for upload temp files. None = OS temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Directory containing the pdfium shared library. None = system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Vision backend tuning.
    pub vision: VisionOptions,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("temp_dir", &self.temp_dir)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("vision", &self.vision)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a builder with defaults for `kind`. The API key is resolved
    /// from the service's environment variable.
    pub fn builder(kind: ServiceKind) -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: ServiceConfig {
                kind,
                api_key: kind.resolve_api_key(),
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                temp_dir: None,
                pdfium_lib_path: None,
                vision: VisionOptions::default(),
            },
        }
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn pdfium_lib_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.vision.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.vision.provider_name = Some(name.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.vision.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.vision.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.vision.concurrency = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.vision.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.vision.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.vision.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.vision.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.vision.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ConvertError> {
        let c = &self.config;
        if c.api_key.is_empty() {
            return Err(ConvertError::InvalidConfig(format!(
                "{} must not be empty",
                c.kind.api_key_env()
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.vision.dpi < 72 || c.vision.dpi > 400 {
            return Err(ConvertError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.vision.dpi
            )));
        }
        if c.vision.concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
