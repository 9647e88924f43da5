//! Archive export: a project's converted pages → one downloadable zip.
//!
//! Layout of `<base>_converted.zip`:
//!
//! ```text
//! <base>_Export/
//!     Page_001.png
//!     Page_002.png
//!     ...
//! ```
//!
//! where `<base>` is the document's file name without its extension. Entries
//! are stored, not deflated: PNG and JPEG payloads are already compressed.

use crate::error::Pdf2ImgError;
use crate::project::{ConvertedPage, ProjectSnapshot};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Extension of the produced archive.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// One packaged export, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveArtifact {
    /// Suggested download name, e.g. `report_converted.zip`.
    pub file_name: String,
    /// Entry paths in archive order.
    pub entries: Vec<String>,
    pub bytes: Vec<u8>,
}

impl ArchiveArtifact {
    /// Write the archive into `dir` under [`file_name`](Self::file_name).
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, Pdf2ImgError> {
        let dir = dir.as_ref();
        let path = dir.join(&self.file_name);
        let write_err = |source| Pdf2ImgError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        let tmp_path = path.with_extension("zip.tmp");
        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(write_err)?;

        info!("Wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

/// File name without its final extension: `report.v2.pdf` → `report.v2`.
pub fn document_base_name(name: &str) -> String {
    let base = RE_EXTENSION.replace(name, "");
    if base.is_empty() {
        name.to_string()
    } else {
        base.into_owned()
    }
}

/// Archive entry name for a page: `Page_007.png`.
pub fn entry_file_name(page: &ConvertedPage) -> String {
    format!("Page_{:03}.{}", page.page_number, page.format.extension())
}

/// Export a project's pages, or only its selected pages.
///
/// Returns `Ok(None)` when there is nothing to export. Archive assembly runs
/// on the blocking pool.
pub async fn export_archive(
    project: &ProjectSnapshot,
    only_selected: bool,
) -> Result<Option<ArchiveArtifact>, Pdf2ImgError> {
    let pages: Vec<ConvertedPage> = project
        .pages
        .iter()
        .filter(|p| !only_selected || project.selected_pages.contains(&p.page_number))
        .cloned()
        .collect();

    if pages.is_empty() {
        debug!(
            "Nothing to export for project {} (only_selected={})",
            project.id, only_selected
        );
        return Ok(None);
    }

    let base = document_base_name(&project.metadata.name);
    tokio::task::spawn_blocking(move || build_archive(&base, &pages))
        .await
        .map_err(|e| Pdf2ImgError::Internal(format!("Archive task panicked: {}", e)))?
        .map(Some)
}

/// Assemble the zip in memory.
pub fn build_archive(base: &str, pages: &[ConvertedPage]) -> Result<ArchiveArtifact, Pdf2ImgError> {
    let zip_err = |e: zip::result::ZipError| Pdf2ImgError::ExportFailed(e.to_string());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let folder = format!("{base}_Export");

    // Pages are grouped by path prefix only; the archive holds one entry per page.
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let mut entries = Vec::with_capacity(pages.len());
    for page in pages {
        let bytes = page.decode()?;
        let entry = format!("{folder}/{}", entry_file_name(page));
        zip.start_file(entry.as_str(), options).map_err(zip_err)?;
        zip.write_all(&bytes)
            .map_err(|e| Pdf2ImgError::ExportFailed(e.to_string()))?;
        entries.push(entry);
    }

    let bytes = zip.finish().map_err(zip_err)?.into_inner();
    info!(
        "Packed {} pages of '{}' into {} bytes",
        entries.len(),
        base,
        bytes.len()
    );

    Ok(ArchiveArtifact {
        file_name: format!("{base}_converted.{ARCHIVE_EXTENSION}"),
        entries,
        bytes,
    })
}
