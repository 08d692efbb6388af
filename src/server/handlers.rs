//! Route handlers.
//!
//! Every handler returns `Result<Json<_>, ApiError>`; the error side renders
//! itself (see [`crate::error::ApiError`]). Upload handlers follow the same
//! sequence: intake, store, invoke, clean up, respond. Cleanup runs before
//! the result is inspected, so the temp file is gone on both outcomes.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::Json;
use tracing::{error, info};

use super::AppState;
use crate::error::{ApiError, ConvertError};
use crate::intake::{self, Upload};
use crate::response::{HealthBody, MarkdownBody, MetadataBody};
use crate::storage::ScopedTempPdf;

pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody::healthy(state.service.service_name()))
}

/// `POST /convert` and `POST /convert-mupdf`.
pub async fn convert_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MarkdownBody>, ApiError> {
    let Upload {
        filename, bytes, ..
    } = intake::read_upload(multipart).await?;
    info!("Converting '{}' with {}", filename, state.converter.name());

    let mut stored = store(&state, &filename, bytes).await?;
    let result = state.converter.convert(stored.path()).await;
    stored.cleanup();

    let markdown = result.map_err(|e| conversion_failed(&filename, e))?;
    info!("Converted '{}' ({} chars)", filename, markdown.len());
    Ok(Json(MarkdownBody::for_upload(markdown, filename)))
}

/// `POST /convert-path`: convert a file on a volume shared with the caller.
/// The file is never modified or removed.
pub async fn convert_path(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MarkdownBody>, ApiError> {
    let path = intake::parse_path_body(&body)?;
    let resolved = intake::resolve_path(&path).await?;
    info!("Converting path '{}' with {}", path, state.converter.name());

    let markdown = state
        .converter
        .convert(&resolved)
        .await
        .map_err(|e| conversion_failed(&path, e))?;
    info!("Converted '{}' ({} chars)", path, markdown.len());
    Ok(Json(MarkdownBody::for_path(markdown, path)))
}

/// `POST /extract-metadata`.
pub async fn extract_metadata(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MetadataBody>, ApiError> {
    let upload = intake::read_upload(multipart).await?;
    let Some(extractor) = state.metadata.clone() else {
        return Err(ApiError::Conversion(
            "Metadata extraction is not available on this service".into(),
        ));
    };
    info!("Extracting metadata from '{}'", upload.filename);

    let mut stored = store(&state, &upload.filename, upload.bytes).await?;
    let result = extractor.extract(stored.path()).await;
    stored.cleanup();

    let metadata = result.map_err(|e| conversion_failed(&upload.filename, e))?;
    Ok(Json(MetadataBody::new(
        &metadata,
        upload.fields.as_deref(),
        upload.filename,
    )))
}

async fn store(state: &AppState, filename: &str, bytes: Bytes) -> Result<ScopedTempPdf, ApiError> {
    ScopedTempPdf::create(bytes, state.temp_dir.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to store upload '{}': {}", filename, e);
            ApiError::Storage(format!("Failed to store upload: {e}"))
        })
}

fn conversion_failed(source: &str, err: ConvertError) -> ApiError {
    error!("Error converting {}: {}", source, err);
    err.into()
}
