//! CLI binary for pdf2md-server.
//!
//! A thin shim that maps flags and environment variables onto
//! `ServiceConfig` and runs the selected service until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2md_server::{serve, ServiceConfig, ServiceKind};
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"SERVICES:
  document-converter   POST /convert-mupdf, POST /extract-metadata
  marker-api           POST /convert, POST /convert-path   (vision LLM)
  markitdown-api       POST /convert
  All services expose GET /health without authentication.

API KEYS (sent as the X-API-Key header):
  DOCUMENT_CONVERTER_API_KEY   document-converter
  MARKER_API_KEY               marker-api
  MARKITDOWN_API_KEY           markitdown-api
  Each falls back to a built-in default when unset. Set them in production.

VISION PROVIDER (marker-api only):
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not given
  EDGEQUAKE_MODEL         Model ID

EXAMPLES:
  pdf2md-server --service markitdown-api --port 8080
  curl -H "X-API-Key: $MARKITDOWN_API_KEY" -F file=@paper.pdf localhost:8080/convert
"#;

/// Serve PDF-to-Markdown conversion over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2md-server",
    version,
    about = "HTTP services converting PDF documents to Markdown and metadata JSON",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Which service to run.
    #[arg(long, env = "PDF2MD_SERVICE", value_enum)]
    service: ServiceArg,

    /// Bind address.
    #[arg(long, env = "PDF2MD_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port.
    #[arg(long, env = "PDF2MD_PORT", default_value_t = 8080)]
    port: u16,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "PDF2MD_MAX_UPLOAD_MB", default_value_t = 100,
          value_parser = clap::value_parser!(u64).range(1..=4096))]
    max_upload_mb: u64,

    /// Directory for upload temp files (default: OS temp dir).
    #[arg(long, env = "PDF2MD_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Directory containing libpdfium (default: ./ then system library path).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Vision LLM model ID (marker-api).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision LLM provider: openai, anthropic, gemini, ollama, azure (marker-api).
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI for the vision backend (72–400).
    #[arg(long, env = "PDF2MD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent vision calls per document.
    #[arg(long, env = "PDF2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per page on a failed vision call.
    #[arg(long, env = "PDF2MD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MD_VERBOSE")]
    verbose: bool,

    /// Log errors only.
    #[arg(short, long, env = "PDF2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ServiceArg {
    DocumentConverter,
    MarkerApi,
    MarkitdownApi,
}

impl From<ServiceArg> for ServiceKind {
    fn from(v: ServiceArg) -> Self {
        match v {
            ServiceArg::DocumentConverter => ServiceKind::DocumentConverter,
            ServiceArg::MarkerApi => ServiceKind::MarkerApi,
            ServiceArg::MarkitdownApi => ServiceKind::MarkitdownApi,
        }
    }
}

impl Cli {
    fn to_config(&self) -> Result<ServiceConfig> {
        let kind = ServiceKind::from(self.service);
        let mut builder = ServiceConfig::builder(kind)
            .host(&self.host)
            .port(self.port)
            .max_upload_bytes((self.max_upload_mb * 1024 * 1024) as usize)
            .dpi(self.dpi)
            .concurrency(self.concurrency)
            .max_retries(self.max_retries);
        if let Some(ref dir) = self.temp_dir {
            builder = builder.temp_dir(dir);
        }
        if let Some(ref dir) = self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(dir);
        }
        if let Some(ref model) = self.model {
            builder = builder.model(model);
        }
        if let Some(ref provider) = self.provider {
            builder = builder.provider_name(provider);
        }
        builder.build().context("Invalid service configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal; anything else is worth a warning once
    // logging is up.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = cli.to_config()?;
    let kind = config.kind;
    if config.api_key == kind.default_api_key() {
        warn!(
            "{} is unset; using the built-in default API key",
            kind.api_key_env()
        );
    }
    if let Some(ref dir) = config.temp_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create temp dir {}", dir.display()))?;
    }
    debug!("{:?}", config);

    serve(config)
        .await
        .with_context(|| format!("{kind} server failed"))
}
