//! Conversion backends.
//!
//! Each service delegates to exactly one backend. The HTTP layer only sees
//! the two traits below, so tests swap in counting mocks and the router never
//! knows which library sits underneath.
//!
//! ```text
//! document-converter  /convert-mupdf     ──▶ LayoutConverter
//!                     /extract-metadata  ──▶ PdfiumMetadataExtractor
//! marker-api          /convert(-path)    ──▶ VisionConverter
//! markitdown-api      /convert           ──▶ PlainTextConverter
//! ```
//!
//! Every pdfium call runs inside `spawn_blocking` (see [`pdfium`]).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::ConvertError;

pub mod layout;
pub mod metadata;
pub mod pdfium;
pub mod postprocess;
pub mod text;
pub mod vision;

pub use layout::LayoutConverter;
pub use metadata::PdfiumMetadataExtractor;
pub use pdfium::PdfiumLibrary;
pub use text::PlainTextConverter;
pub use vision::VisionConverter;

/// Turns a PDF on disk into markdown.
#[async_trait]
pub trait MarkdownConverter: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Convert the whole document. The file is only read, never modified.
    async fn convert(&self, pdf_path: &Path) -> Result<String, ConvertError>;
}

/// Reads document properties without rendering content.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, pdf_path: &Path) -> Result<DocumentMetadata, ConvertError>;
}

/// The ten metadata fields reported by `/extract-metadata`.
///
/// Missing string properties are empty strings, never absent keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: String,
    #[serde(rename = "modDate")]
    pub mod_date: String,
    pub page_count: usize,
    /// e.g. `"PDF 1.7"`.
    pub format: String,
}

impl DocumentMetadata {
    /// Field names as they appear on the wire.
    pub const FIELDS: [&'static str; 10] = [
        "title",
        "author",
        "subject",
        "keywords",
        "creator",
        "producer",
        "creationDate",
        "modDate",
        "pageCount",
        "format",
    ];

    /// Flatten into a JSON object keyed by wire name.
    pub fn to_map(&self) -> Map<String, Value> {
        let strings = [
            &self.title,
            &self.author,
            &self.subject,
            &self.keywords,
            &self.creator,
            &self.producer,
            &self.creation_date,
            &self.mod_date,
        ];
        let mut map: Map<String, Value> = Self::FIELDS
            .iter()
            .zip(strings)
            .map(|(key, value)| (key.to_string(), Value::String(value.clone())))
            .collect();
        map.insert("pageCount".into(), Value::from(self.page_count));
        map.insert("format".into(), Value::String(self.format.clone()));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_has_all_wire_keys() {
        let meta = DocumentMetadata {
            title: "Report".into(),
            mod_date: "D:20240101".into(),
            page_count: 3,
            ..Default::default()
        };
        let map = meta.to_map();
        assert_eq!(map.len(), DocumentMetadata::FIELDS.len());
        for key in DocumentMetadata::FIELDS {
            assert!(map.contains_key(key), "missing {key}");
        }
        assert_eq!(map["title"], "Report");
        assert_eq!(map["modDate"], "D:20240101");
        assert_eq!(map["pageCount"], 3);
        assert_eq!(map["author"], "");
    }

    #[test]
    fn map_matches_serde_names() {
        let meta = DocumentMetadata::default();
        let via_serde = serde_json::to_value(&meta).unwrap();
        assert_eq!(via_serde, Value::Object(meta.to_map()));
    }
}
