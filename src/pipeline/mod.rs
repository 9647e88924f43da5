//! Pipeline stages for PDF-to-image conversion.
//!
//! Each submodule implements exactly one step; the [`crate::Coordinator`]
//! strings them together and owns all project state.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ backend ──▶ render ──▶ encode ──▶ archive
//! (upload)  (open PDF)  (raster)  (PNG/JPEG)  (zip export)
//!                          │
//!                          └──▶ analysis (page 1 only, optional VLM)
//! ```
//!
//! 1. [`input`]    — filter uploads to PDFs, check the magic, open via the backend
//! 2. [`backend`]  — the PDF capability as traits; [`pdfium`] is the real one
//! 3. [`render`]   — rasterise one page at the configured scale; runs in
//!    `spawn_blocking` because the backend is synchronous
//! 4. [`encode`]   — PNG/JPEG bytes wrapped in a base64 data URI
//! 5. [`archive`]  — package converted pages into a zip
//! 6. [`analysis`] — first-page summary; the only stage with network I/O

pub mod analysis;
pub mod archive;
pub mod backend;
pub mod encode;
pub mod input;
pub mod pdfium;
pub mod render;
