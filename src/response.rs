//! JSON envelopes returned by every route.
//!
//! Success bodies always carry `"success": true`, the payload, and a field
//! naming the input (`filename` for uploads, `path` for shared-volume
//! requests). Error bodies carry only `"error"`; see [`crate::error::ApiError`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::convert::DocumentMetadata;

/// `{"status": "healthy", "service": "<name>"}`
#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub service: &'static str,
}

impl HealthBody {
    pub fn healthy(service: &'static str) -> Self {
        Self {
            status: "healthy",
            service,
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Markdown conversion envelope.
#[derive(Debug, Serialize)]
pub struct MarkdownBody {
    pub success: bool,
    pub markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl MarkdownBody {
    /// Result of an uploaded file.
    pub fn for_upload(markdown: String, filename: String) -> Self {
        Self {
            success: true,
            markdown,
            filename: Some(filename),
            path: None,
        }
    }

    /// Result of a caller-supplied path.
    pub fn for_path(markdown: String, path: String) -> Self {
        Self {
            success: true,
            markdown,
            filename: None,
            path: Some(path),
        }
    }
}

/// Metadata extraction envelope.
#[derive(Debug, Serialize)]
pub struct MetadataBody {
    pub success: bool,
    pub metadata: Map<String, Value>,
    pub filename: String,
}

impl MetadataBody {
    /// Apply the optional field filter and wrap the result.
    pub fn new(metadata: &DocumentMetadata, fields: Option<&[String]>, filename: String) -> Self {
        Self {
            success: true,
            metadata: select_fields(metadata, fields),
            filename,
        }
    }
}

/// Project `metadata` onto the requested keys.
///
/// `None` or an empty list yields every field. Requested names that are not
/// metadata keys are dropped without complaint.
pub fn select_fields(metadata: &DocumentMetadata, fields: Option<&[String]>) -> Map<String, Value> {
    let all = metadata.to_map();
    match fields {
        Some(wanted) if !wanted.is_empty() => all
            .into_iter()
            .filter(|(key, _)| wanted.iter().any(|w| w == key))
            .collect(),
        _ => all,
    }
}
