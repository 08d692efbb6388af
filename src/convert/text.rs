//! Plain-text backend for the markitdown service.
//!
//! No structure recovery: the text layer of each page, in order, separated
//! by a blank line.

use async_trait::async_trait;
use std::path::Path;

use super::pdfium::{page_texts, PdfiumLibrary};
use super::postprocess::tidy_text;
use super::MarkdownConverter;
use crate::error::ConvertError;

#[derive(Debug, Clone)]
pub struct PlainTextConverter {
    library: PdfiumLibrary,
}

impl PlainTextConverter {
    pub fn new(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

#[async_trait]
impl MarkdownConverter for PlainTextConverter {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    async fn convert(&self, pdf_path: &Path) -> Result<String, ConvertError> {
        let pages = self
            .library
            .with_document(pdf_path, |document| page_texts(document))
            .await?;
        Ok(join_pages(&pages))
    }
}

/// Join page texts with a blank line, skipping pages without text.
pub fn join_pages(pages: &[String]) -> String {
    let parts: Vec<&str> = pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    tidy_text(&parts.join("\n\n"))
}
