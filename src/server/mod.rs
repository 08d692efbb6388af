//! HTTP surface shared by the three services.
//!
//! | Route               | Auth | Mounted on                         |
//! |---------------------|------|------------------------------------|
//! | `GET /health`       | no   | all                                |
//! | `POST /convert-mupdf` | yes | document-converter                |
//! | `POST /extract-metadata` | yes | document-converter             |
//! | `POST /convert`     | yes  | marker-api, markitdown-api         |
//! | `POST /convert-path`| yes  | marker-api                         |
//!
//! The API-key check is a `route_layer`, so it only wraps matched protected
//! routes: `/health` stays open and unknown paths are a plain 404.

mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth;
use crate::config::{ServiceConfig, ServiceKind, DEFAULT_MAX_UPLOAD_BYTES};
use crate::convert::{
    LayoutConverter, MarkdownConverter, MetadataExtractor, PdfiumLibrary,
    PdfiumMetadataExtractor, PlainTextConverter, VisionConverter,
};

/// Shared, read-only per-process state.
#[derive(Clone)]
pub struct AppState {
    pub service: ServiceKind,
    pub api_key: Arc<str>,
    pub converter: Arc<dyn MarkdownConverter>,
    /// Present on document-converter only.
    pub metadata: Option<Arc<dyn MetadataExtractor>>,
    /// Directory for upload temp files. None = OS temp dir.
    pub temp_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        service: ServiceKind,
        api_key: impl Into<Arc<str>>,
        converter: Arc<dyn MarkdownConverter>,
    ) -> Self {
        Self {
            service,
            api_key: api_key.into(),
            converter,
            metadata: None,
            temp_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_metadata(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = Some(extractor);
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Wire up the real backends for `config.kind`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let library = PdfiumLibrary::new(config.pdfium_lib_path.clone());
        let converter: Arc<dyn MarkdownConverter> = match config.kind {
            ServiceKind::DocumentConverter => Arc::new(LayoutConverter::new(library.clone())),
            ServiceKind::MarkerApi => {
                Arc::new(VisionConverter::new(library.clone(), config.vision.clone()))
            }
            ServiceKind::MarkitdownApi => Arc::new(PlainTextConverter::new(library.clone())),
        };

        let mut state = Self::new(config.kind, config.api_key.as_str(), converter);
        if config.kind == ServiceKind::DocumentConverter {
            state = state.with_metadata(Arc::new(PdfiumMetadataExtractor::new(library)));
        }
        state.temp_dir = config.temp_dir.clone();
        state.max_upload_bytes = config.max_upload_bytes;
        state
    }
}

/// Build the router for `state.service`.
pub fn create_router(state: AppState) -> Router {
    let mut protected =
        Router::new().route(state.service.convert_route(), post(handlers::convert_upload));
    protected = match state.service {
        ServiceKind::DocumentConverter => {
            protected.route("/extract-metadata", post(handlers::extract_metadata))
        }
        ServiceKind::MarkerApi => protected.route("/convert-path", post(handlers::convert_path)),
        ServiceKind::MarkitdownApi => protected,
    };
    let protected = protected.route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_api_key,
    ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> io::Result<()> {
    let state = AppState::from_config(&config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        "Starting {} at http://{}",
        config.kind,
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("{} stopped", config.kind);
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C ({}); running until killed", e);
            std::future::pending::<()>().await;
        }
    }
}
