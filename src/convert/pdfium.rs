//! pdfium binding and document access shared by every backend.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and does CPU-heavy work. [`PdfiumLibrary::with_document`] binds the
//! library, opens the document and runs the caller's closure on the blocking
//! pool, so Tokio worker threads never stall on a large PDF.
//!
//! ## Handle lifetime
//!
//! The `PdfDocument` lives only inside that closure. It is dropped (and the
//! pdfium handle closed) when the closure returns, whether it returned
//! `Ok` or `Err`.

use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConvertError;

/// Where to find the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLibrary {
    lib_dir: Option<PathBuf>,
}

impl PdfiumLibrary {
    /// `lib_dir` is the directory holding `libpdfium`; `None` tries the
    /// working directory and then the system library search path.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    /// Bind to the library. Cheap after the first call in a process.
    pub fn bind(&self) -> Result<Pdfium, ConvertError> {
        let bindings = match &self.lib_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    /// Open `pdf_path` on the blocking pool and hand the document to `f`.
    pub async fn with_document<T, F>(&self, pdf_path: &Path, f: F) -> Result<T, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce(&PdfDocument<'_>) -> Result<T, ConvertError> + Send + 'static,
    {
        let library = self.clone();
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let pdfium = library.bind()?;
            let document = open_document(&pdfium, &path)?;
            f(&document)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("pdfium task panicked: {e}")))?
    }
}

/// Load a document, classifying pdfium's failure.
pub fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ConvertError> {
    if !path.exists() {
        return Err(ConvertError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| classify_load_error(path, &format!("{e:?}")))?;
    debug!(
        "Opened {} ({} pages)",
        path.display(),
        document.pages().len()
    );
    Ok(document)
}

/// Map pdfium's load error text onto [`ConvertError`].
pub(crate) fn classify_load_error(path: &Path, detail: &str) -> ConvertError {
    if detail.contains("Password") || detail.contains("password") {
        ConvertError::PasswordRequired {
            path: path.to_path_buf(),
        }
    } else {
        ConvertError::CorruptPdf {
            path: path.to_path_buf(),
            detail: detail.to_string(),
        }
    }
}

/// Text layer of every page, in page order.
pub fn page_texts(document: &PdfDocument<'_>) -> Result<Vec<String>, ConvertError> {
    document
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            page.text()
                .map(|text| text.all())
                .map_err(|e| ConvertError::TextExtractionFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })
        })
        .collect()
}
