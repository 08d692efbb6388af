//! Error types for the pdf2md services.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`ConvertError`]: returned by a conversion backend when the wrapped
//!   library cannot produce a result (corrupt PDF, pdfium not loadable,
//!   vision provider not configured). The message text is what the client
//!   finally sees, so variants keep the underlying detail verbatim.
//!
//! * [`ApiError`]: the request-boundary taxonomy. Every handler returns
//!   `Result<_, ApiError>` and axum renders it as `{"error": "..."}` with the
//!   status code picked by [`ApiError::status`]. Nothing escapes past this
//!   layer, so one bad document never takes the process down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::PathBuf;
use thiserror::Error;

use crate::response::ErrorBody;

/// Failures raised by a conversion backend.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The resolved PDF path vanished before the backend could open it.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF is encrypted; the services never accept passwords.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// pdfium could not load the text layer of a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    TextExtractionFailed { page: usize, detail: String },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Vision model errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// One or more pages failed after all retries; no partial document is returned.
    #[error("{failed} of {total} pages failed after {retries} retries each. First error: {first_error}")]
    PagesFailed {
        failed: usize,
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}. \
Set PDFIUM_LIB_PATH to the directory containing libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, encoder failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `X-API-Key` missing or different from the configured secret.
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// A required input (file field, filename, path) was not supplied.
    #[error("{0}")]
    MissingInput(&'static str),

    /// Filename or path does not carry a `.pdf` extension.
    #[error("Only PDF files are supported")]
    UnsupportedType,

    /// The multipart body could not be read; the status comes from the
    /// extractor (413 when the upload exceeds the body limit).
    #[error("{message}")]
    Multipart { status: StatusCode, message: String },

    /// A path-shape request referenced a file the process cannot see.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The conversion backend failed; carries its raw message.
    #[error("{0}")]
    Conversion(String),

    /// The upload could not be written to temporary storage.
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    /// HTTP status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingInput(_) | ApiError::UnsupportedType => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conversion(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        ApiError::Conversion(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::MissingInput("No file provided").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::UnsupportedType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NotFound("/x.pdf".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conversion("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Storage("disk full".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn multipart_error_keeps_extractor_status() {
        let e = ApiError::Multipart {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "Failed to read multipart field: length limit exceeded".into(),
        };
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(e.to_string().contains("length limit"), "got: {e}");
    }

    #[test]
    fn not_found_message_names_path() {
        let e = ApiError::NotFound("/shared/missing.pdf".into());
        assert_eq!(e.to_string(), "File not found: /shared/missing.pdf");
    }

    #[test]
    fn conversion_error_keeps_raw_text() {
        let e: ApiError = ConvertError::CorruptPdf {
            path: PathBuf::from("/tmp/a.pdf"),
            detail: "xref table broken".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("xref table broken"), "got: {e}");
    }

    #[test]
    fn pages_failed_display() {
        let e = ConvertError::PagesFailed {
            failed: 2,
            total: 4,
            retries: 3,
            first_error: "rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("2 of 4 pages"), "got: {msg}");
        assert!(msg.contains("rate limited"), "got: {msg}");
    }
}
