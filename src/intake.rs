//! Request intake: turn a multipart upload or a JSON path reference into a
//! validated conversion request.
//!
//! Validation order matters because clients match on the messages:
//! uploads check presence, then filename, then extension; path requests
//! check presence, then existence (404), then extension.

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::error::ApiError;

/// Multipart field carrying the PDF.
pub const FILE_FIELD: &str = "file";

/// Multipart field carrying the optional metadata filter.
pub const FIELDS_FIELD: &str = "fields";

/// A validated multipart upload.
#[derive(Debug)]
pub struct Upload {
    /// Client-supplied filename, echoed back in the response.
    pub filename: String,
    /// Raw file bytes.
    pub bytes: Bytes,
    /// Parsed `fields` filter, if one was supplied and parsed to a list.
    pub fields: Option<Vec<String>>,
}

/// `true` when `name` ends in `.pdf`, ignoring case.
pub fn has_pdf_extension(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Keep the extractor's status so an oversized upload surfaces as 413.
fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    ApiError::Multipart {
        status: err.status(),
        message: format!("{context}: {}", err.body_text()),
    }
}

/// Drain the multipart body and validate the `file` part.
///
/// Parts without a filename are form values, not files, so a `file` value
/// sent without one is reported as missing.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut raw_fields: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) if file.is_none() => {
                let Some(filename) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file data", e))?;
                file = Some((filename, bytes));
            }
            Some(FIELDS_FIELD) => {
                raw_fields = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| multipart_error("Failed to read form field", e))?,
                );
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or(ApiError::MissingInput("No file provided"))?;
    if filename.is_empty() {
        return Err(ApiError::MissingInput("No file selected"));
    }
    if !has_pdf_extension(&filename) {
        return Err(ApiError::UnsupportedType);
    }

    debug!("Accepted upload '{}' ({} bytes)", filename, bytes.len());
    Ok(Upload {
        filename,
        bytes,
        fields: parse_field_filter(raw_fields.as_deref()),
    })
}

/// Parse the optional `fields` value.
///
/// Anything other than a JSON array yields `None`, which means "return every
/// field". Non-string array items are skipped since they can never name a key.
pub fn parse_field_filter(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => {
            debug!("Ignoring unusable fields filter: {raw}");
            None
        }
    }
}

// ── Path shape ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PathBody {
    path: String,
}

/// Extract `path` from a JSON body. Anything unusable is "No path provided".
pub fn parse_path_body(body: &[u8]) -> Result<String, ApiError> {
    serde_json::from_slice::<PathBody>(body)
        .map(|b| b.path)
        .map_err(|_| ApiError::MissingInput("No path provided"))
}

/// Check that a caller-supplied path exists and names a PDF.
pub async fn resolve_path(path: &str) -> Result<PathBuf, ApiError> {
    let resolved = PathBuf::from(path);
    if !tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
        return Err(ApiError::NotFound(path.to_string()));
    }
    if !has_pdf_extension(path) {
        return Err(ApiError::UnsupportedType);
    }
    Ok(resolved)
}
