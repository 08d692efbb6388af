//! # pdf2md-server
//!
//! Small HTTP services that turn PDF documents into Markdown or metadata JSON.
//! One crate, one binary, three deployable services selected at startup:
//!
//! | Service              | Routes                                   | Backend                    |
//! |----------------------|------------------------------------------|----------------------------|
//! | `document-converter` | `/convert-mupdf`, `/extract-metadata`    | pdfium text layout, info dict |
//! | `marker-api`         | `/convert`, `/convert-path`              | pdfium raster → vision LLM |
//! | `markitdown-api`     | `/convert`                               | pdfium plain text          |
//!
//! ## Request lifecycle
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Auth     X-API-Key must equal the service's secret        (auth)
//!  ├─ 2. Intake   multipart `file` or JSON `{path}`, .pdf only     (intake)
//!  ├─ 3. Store    upload → unique temp .pdf, removed on every exit (storage)
//!  ├─ 4. Convert  exactly one backend call                         (convert)
//!  └─ 5. Respond  {success, markdown|metadata, filename|path}      (response)
//!                 or {error} with 400 / 401 / 404 / 500            (error)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2md_server::{serve, ServiceConfig, ServiceKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key comes from MARKITDOWN_API_KEY, falling back to a default.
//!     let config = ServiceConfig::builder(ServiceKind::MarkitdownApi)
//!         .port(8080)
//!         .build()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md-server` binary (clap + anyhow + dotenvy + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod convert;
pub mod error;
pub mod intake;
pub mod prompts;
pub mod response;
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder, ServiceKind, VisionOptions};
pub use convert::{DocumentMetadata, MarkdownConverter, MetadataExtractor};
pub use error::{ApiError, ConvertError};
pub use server::{create_router, serve, AppState};
pub use storage::ScopedTempPdf;
