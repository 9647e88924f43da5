//! pdfium-backed implementation of the PDF capability.
//!
//! ## Library resolution
//!
//! The first successful location is remembered for the rest of the process:
//!
//! 1. `PDFIUM_LIB_PATH` — a library file, or a directory containing one;
//! 2. the directory of the running executable;
//! 3. the current working directory;
//! 4. the system library search path.
//!
//! ## Document lifetime
//!
//! `pdfium-render` documents borrow both the `Pdfium` binding and the source
//! bytes, which makes them awkward to keep inside a long-lived, `Send` handle.
//! [`PdfiumDocument`] therefore owns the bytes plus the page sizes read at
//! open time, and re-opens the document inside each blocking render call.
//! Dropping the handle frees the bytes; pdfium holds nothing between calls.

use crate::error::{BackendError, Pdf2ImgError};
use crate::pipeline::backend::{DocumentBackend, PageSource, RenderIntent, Viewport};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Where the system library was found; `None` means "use the system search path".
static RESOLVED_LIBRARY: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Bind to pdfium, remembering which location worked.
pub fn bind_pdfium() -> Result<Pdfium, BackendError> {
    if let Some(resolved) = RESOLVED_LIBRARY.get() {
        return bind_at(resolved.as_deref());
    }

    let mut last_err = None;
    for candidate in candidate_libraries() {
        match bind_at(candidate.as_deref()) {
            Ok(pdfium) => {
                debug!(
                    "Bound pdfium from {}",
                    candidate
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "system library path".into())
                );
                let _ = RESOLVED_LIBRARY.set(candidate);
                return Ok(pdfium);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| BackendError::new("no pdfium library candidates")))
}

fn bind_at(path: Option<&Path>) -> Result<Pdfium, BackendError> {
    let bindings = match path {
        Some(p) => Pdfium::bind_to_library(p),
        None => Pdfium::bind_to_system_library(),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| BackendError::new(e.to_string()))
}

fn candidate_libraries() -> Vec<Option<PathBuf>> {
    let mut candidates = Vec::new();

    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        let p = PathBuf::from(env_path);
        if p.is_dir() {
            candidates.push(Some(Pdfium::pdfium_platform_library_name_at_path(&p)));
        } else {
            candidates.push(Some(p));
        }
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        candidates.push(Some(Pdfium::pdfium_platform_library_name_at_path(&dir)));
    }

    candidates.push(Some(Pdfium::pdfium_platform_library_name_at_path("./")));
    candidates.push(None);
    candidates
}

/// [`DocumentBackend`] backed by the pdfium C++ library.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumBackend;

impl PdfiumBackend {
    /// Verify that pdfium can be bound before any document is opened.
    pub fn new() -> Result<Self, Pdf2ImgError> {
        bind_pdfium().map_err(|e| Pdf2ImgError::PdfiumBindingFailed(e.message))?;
        info!("pdfium backend ready");
        Ok(Self)
    }
}

impl DocumentBackend for PdfiumBackend {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn PageSource>, BackendError> {
        let pdfium = bind_pdfium()?;
        let page_sizes = {
            let document = pdfium
                .load_pdf_from_byte_slice(&bytes, None)
                .map_err(|e| BackendError::new(format!("cannot open document: {e}")))?;
            document
                .pages()
                .iter()
                .map(|page| (page.width().value, page.height().value))
                .collect::<Vec<_>>()
        };

        Ok(Arc::new(PdfiumDocument { bytes, page_sizes }))
    }
}

/// An opened PDF: source bytes plus page sizes in points.
pub struct PdfiumDocument {
    bytes: Vec<u8>,
    page_sizes: Vec<(f32, f32)>,
}

impl PageSource for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn viewport(&self, page_number: usize, scale: f32) -> Result<Viewport, BackendError> {
        let &(w, h) = page_number
            .checked_sub(1)
            .and_then(|idx| self.page_sizes.get(idx))
            .ok_or_else(|| BackendError::new(format!("page {page_number} does not exist")))?;
        Ok(Viewport::from_points(w, h, scale))
    }

    fn render(
        &self,
        page_number: usize,
        viewport: Viewport,
        intent: RenderIntent,
    ) -> Result<RgbaImage, BackendError> {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|e| BackendError::new(format!("cannot reopen document: {e}")))?;

        let index = page_number
            .checked_sub(1)
            .ok_or_else(|| BackendError::new("page numbers start at 1"))?;
        let page = document
            .pages()
            .get(index as u16)
            .map_err(|e| BackendError::new(format!("cannot read page: {e}")))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(viewport.width as i32)
            .set_target_height(viewport.height as i32)
            .set_clear_color(PdfColor::new(255, 255, 255, 0))
            .render_form_data(true)
            .use_print_quality(intent == RenderIntent::Print);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| BackendError::new(format!("render failed: {e}")))?;

        Ok(bitmap.as_image().to_rgba8())
    }
}
