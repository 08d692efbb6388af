//! Metadata backend for `/extract-metadata`.
//!
//! Reads the document information dictionary and page count; no page is
//! rendered and the document is never modified.

use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

use super::pdfium::PdfiumLibrary;
use super::{DocumentMetadata, MetadataExtractor};
use crate::error::ConvertError;

#[derive(Debug, Clone)]
pub struct PdfiumMetadataExtractor {
    library: PdfiumLibrary,
}

impl PdfiumMetadataExtractor {
    pub fn new(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

#[async_trait]
impl MetadataExtractor for PdfiumMetadataExtractor {
    async fn extract(&self, pdf_path: &Path) -> Result<DocumentMetadata, ConvertError> {
        let metadata = self
            .library
            .with_document(pdf_path, |document| Ok(read_metadata(document)))
            .await?;
        debug!(
            "Metadata for {}: {} pages, {}",
            pdf_path.display(),
            metadata.page_count,
            metadata.format
        );
        Ok(metadata)
    }
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let info = document.metadata();
    let tag = |kind: PdfDocumentMetadataTagType| -> String {
        info.get(kind)
            .map(|t| t.value().to_string())
            .unwrap_or_default()
    };

    DocumentMetadata {
        title: tag(PdfDocumentMetadataTagType::Title),
        author: tag(PdfDocumentMetadataTagType::Author),
        subject: tag(PdfDocumentMetadataTagType::Subject),
        keywords: tag(PdfDocumentMetadataTagType::Keywords),
        creator: tag(PdfDocumentMetadataTagType::Creator),
        producer: tag(PdfDocumentMetadataTagType::Producer),
        creation_date: tag(PdfDocumentMetadataTagType::CreationDate),
        mod_date: tag(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        format: pdf_format_label(&format!("{:?}", document.version())),
    }
}

/// `Pdf1_7` → `PDF 1.7`. Unknown or unset versions report plain `PDF`.
pub fn pdf_format_label(version: &str) -> String {
    match version.strip_prefix("Pdf") {
        Some(v) if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit() || c == '_') => {
            format!("PDF {}", v.replace('_', "."))
        }
        _ => "PDF".to_string(),
    }
}
