//! Error types for the edgequake-pdf2img library.
//!
//! Two error types reflect the two layers of the crate:
//!
//! * [`Pdf2ImgError`] — returned by every public operation (load, convert,
//!   export, analysis). Errors that belong to one project are *also* recorded
//!   on that project (`status = Error`, `error = Some(..)`), so callers that
//!   only watch project state never miss a failure.
//!
//! * [`BackendError`] — reported by the opaque PDF capability
//!   ([`crate::pipeline::backend`]). The loader and rasteriser translate it
//!   into the matching [`Pdf2ImgError`] variant, adding the context (file
//!   name, page number) the backend does not know about.

use crate::project::{ProjectId, ProjectStatus};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdf2img library.
#[derive(Debug, Error)]
pub enum Pdf2ImgError {
    // ── Load errors ───────────────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` signature.
    #[error("File '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// The PDF capability could not open the document.
    #[error("Failed to load '{name}': {detail}")]
    LoadFailed { name: String, detail: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// The PDF capability could not produce a surface for the page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Range errors ──────────────────────────────────────────────────────
    /// A requested page number lies outside `1..=total`.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// A page-range expression could not be parsed.
    #[error("Invalid page range '{input}': {reason}")]
    InvalidPageRange { input: String, reason: String },

    // ── Registry errors ───────────────────────────────────────────────────
    /// The project exists but has no open document (still loading or failed to load).
    #[error("Project {id} is not ready for conversion (status: {status})")]
    NotReady { id: ProjectId, status: ProjectStatus },

    /// No project with this id is registered.
    #[error("Unknown project {id}")]
    UnknownProject { id: ProjectId },

    /// The project was removed while an operation on it was in flight.
    #[error("Project {id} was removed during the operation")]
    ProjectRemoved { id: ProjectId },

    // ── Analysis errors ───────────────────────────────────────────────────
    /// The configured provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The summary request failed or returned an unparseable reply.
    #[error("Document analysis failed: {0}")]
    AnalysisFailed(String),

    // ── Export errors ─────────────────────────────────────────────────────
    /// Building the archive failed; no partial artifact is returned.
    #[error("Archive export failed: {0}")]
    ExportFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the pdf2img executable or in the current directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ImgError {
    /// Short description stored on a project when this error ends its run.
    pub fn project_message(&self) -> String {
        match self {
            Pdf2ImgError::NotAPdf { .. } | Pdf2ImgError::LoadFailed { .. } => {
                format!("Load failed: {self}")
            }
            Pdf2ImgError::RenderFailed { page, .. } => {
                format!("Error during conversion of page {page}")
            }
            other => other.to_string(),
        }
    }
}

/// A failure reported by a [`crate::pipeline::backend::DocumentBackend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
