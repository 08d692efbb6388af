//! Scoped temporary storage for uploaded PDFs.
//!
//! pdfium opens documents by path, so uploads are written to a uniquely
//! named `.pdf` file first. [`ScopedTempPdf`] owns that file for exactly one
//! request: the handler calls [`ScopedTempPdf::cleanup`] once conversion
//! finishes either way, and `Drop` repeats the same existence-guarded removal
//! for early returns and panics. Removing a file that is already gone is not
//! an error.

use axum::body::Bytes;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// An uploaded PDF materialised on disk for the lifetime of one request.
#[derive(Debug)]
pub struct ScopedTempPdf {
    path: PathBuf,
    guard: Option<TempPath>,
}

impl ScopedTempPdf {
    /// Write `bytes` to a fresh `upload-*.pdf` file in `dir` (or the OS temp dir).
    ///
    /// Runs on the blocking pool since uploads can be large. If the write
    /// fails midway the partially written file is removed before returning.
    pub async fn create(bytes: Bytes, dir: Option<&Path>) -> io::Result<Self> {
        let dir = dir.map(Path::to_path_buf);
        let guard = tokio::task::spawn_blocking(move || -> io::Result<TempPath> {
            let mut builder = tempfile::Builder::new();
            builder.prefix("upload-").suffix(".pdf");
            let mut file = match dir {
                Some(ref d) => builder.tempfile_in(d)?,
                None => builder.tempfile()?,
            };
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| io::Error::other(format!("temp file task panicked: {e}")))??;

        let path = guard.to_path_buf();
        debug!("Stored upload at {}", path.display());
        Ok(Self {
            path,
            guard: Some(guard),
        })
    }

    /// Location of the stored upload.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Idempotent.
    pub fn cleanup(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        match guard.close() {
            Ok(()) => debug!("Removed temp file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for ScopedTempPdf {
    fn drop(&mut self) {
        self.cleanup();
    }
}
