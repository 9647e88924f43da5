//! Input handling and document loading.
//!
//! Files arrive as [`InputFile`]s carrying a *declared* content type, the way
//! a browser upload or a file picker would hand them over. Only PDFs are
//! accepted; anything else is skipped with a warning rather than failing the
//! whole batch. Before handing bytes to the backend we check the `%PDF`
//! magic so callers get a meaningful error instead of a backend crash.

use crate::error::Pdf2ImgError;
use crate::pipeline::backend::{DocumentBackend, PageSource};
use crate::project::PageMetadata;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// MIME type of the only accepted document format.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// A user-supplied document, not yet opened.
#[derive(Clone)]
pub struct InputFile {
    pub name: String,
    /// Declared type, e.g. `application/pdf`. `None` when the source did not say.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl InputFile {
    pub fn new(name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Read a local file; the declared type is derived from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Pdf2ImgError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            let detail = match e.kind() {
                std::io::ErrorKind::NotFound => "file not found".to_string(),
                std::io::ErrorKind::PermissionDenied => "permission denied".to_string(),
                _ => e.to_string(),
            };
            Pdf2ImgError::LoadFailed {
                name: name.clone(),
                detail,
            }
        })?;

        let content_type = path
            .extension()
            .filter(|ext| ext.eq_ignore_ascii_case("pdf"))
            .map(|_| PDF_MIME_TYPE);

        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, content_type, bytes))
    }

    /// Declared size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the declared type marks this file as a PDF.
    ///
    /// Without a declared type the `.pdf` extension decides.
    pub fn is_pdf(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.trim().eq_ignore_ascii_case(PDF_MIME_TYPE),
            None => self.name.to_ascii_lowercase().ends_with(".pdf"),
        }
    }
}

/// Keep only the PDFs, logging every skipped file.
pub fn accept_pdfs(files: Vec<InputFile>) -> Vec<InputFile> {
    files
        .into_iter()
        .filter(|f| {
            let ok = f.is_pdf();
            if !ok {
                warn!(
                    "Skipping '{}': not a PDF (declared type: {})",
                    f.name,
                    f.content_type.as_deref().unwrap_or("unknown")
                );
            }
            ok
        })
        .collect()
}

/// Open a document and read its metadata.
///
/// Runs the backend inside `spawn_blocking`.
pub async fn load(
    backend: Arc<dyn DocumentBackend>,
    bytes: Vec<u8>,
    name: &str,
    byte_size: u64,
) -> Result<(Arc<dyn PageSource>, PageMetadata), Pdf2ImgError> {
    check_magic(&bytes, name)?;

    let handle = tokio::task::spawn_blocking(move || backend.open(bytes))
        .await
        .map_err(|e| Pdf2ImgError::Internal(format!("Load task panicked: {}", e)))?
        .map_err(|e| Pdf2ImgError::LoadFailed {
            name: name.to_string(),
            detail: e.message,
        })?;

    let metadata = PageMetadata {
        name: name.to_string(),
        byte_size,
        total_pages: handle.page_count(),
    };
    info!("PDF loaded: '{}' ({} pages)", name, metadata.total_pages);

    Ok((handle, metadata))
}

/// Verify the `%PDF` signature.
fn check_magic(bytes: &[u8], name: &str) -> Result<(), Pdf2ImgError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(Pdf2ImgError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}
