//! # edgequake-pdf2img
//!
//! Convert PDF pages to PNG or JPEG images, bundle them into zip archives,
//! and optionally summarise each document with a Vision Language Model.
//!
//! ## Why this crate?
//!
//! Getting a page out of a PDF as a picture is easy once; doing it for a
//! queue of documents, at print resolution, without re-rendering pages you
//! already have, while a summary request runs in the background and the user
//! keeps removing and re-adding files, is where the bookkeeping goes wrong.
//! The [`Coordinator`] owns that bookkeeping: one [`Project`] per document,
//! every state change a named [`ProjectCommand`], late results dropped once
//! their project is gone.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Input    keep PDFs only, check the %PDF magic
//!  ├─ 2. Load     open through the PDF backend (pdfium), read page count
//!  ├─ 3. Render   rasterise at scale = dpi / 72 (CPU-bound, spawn_blocking)
//!  ├─ 4. Encode   PNG (alpha kept) or JPEG (white-backed, q=95) → data URI
//!  ├─ 5. Analyse  page 1 → VLM → title, summary, key points (fire-and-forget)
//!  └─ 6. Export   <name>_converted.zip with <name>_Export/Page_001.png …
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2img::{ConversionConfig, Coordinator, InputFile, PdfiumBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder().dpi(150).build()?;
//!     let coordinator = Coordinator::new(&config, Arc::new(PdfiumBackend::new()?));
//!
//!     let file = InputFile::from_path("document.pdf").await?;
//!     let ids = coordinator.add_files(vec![file]).await;
//!     for id in ids {
//!         coordinator.convert(id, None).await?;
//!         if let Some(zip) = coordinator.export(id, false).await? {
//!             zip.write_to("out").await?;
//!         }
//!     }
//!     coordinator.settle().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2img` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdf2img = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Resolution
//!
//! | DPI | Letter page | Typical use |
//! |-----|-------------|-------------|
//! | 72  | 612 × 792   | Thumbnails |
//! | 150 | 1275 × 1650 | Screen reading |
//! | 300 | 2550 × 3300 | Default, print quality |
//! | 600 | 5100 × 6600 | Archival, fine print |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, ImageFormat, PageSelection, RenderSettings};
pub use coordinator::{ConversionReport, Coordinator};
pub use error::{BackendError, Pdf2ImgError};
pub use pipeline::analysis::{LlmSummarizer, Summarizer};
pub use pipeline::archive::ArchiveArtifact;
pub use pipeline::backend::{DocumentBackend, PageSource, RenderIntent, Viewport};
pub use pipeline::input::InputFile;
pub use pipeline::pdfium::PdfiumBackend;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use project::{
    ConvertedPage, DocumentAnalysis, PageMetadata, Project, ProjectCommand, ProjectId,
    ProjectSnapshot, ProjectStatus,
};
