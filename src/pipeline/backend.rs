//! The opaque PDF capability.
//!
//! The crate never parses PDF itself. Everything it needs from a rendering
//! library is captured by two small traits:
//!
//! * [`DocumentBackend`] opens raw bytes into a [`PageSource`];
//! * [`PageSource`] reports the page count, computes a page's
//!   [`Viewport`] at a scale, and paints a page into an RGBA surface.
//!
//! The production implementation is [`crate::pipeline::pdfium::PdfiumBackend`];
//! tests plug in an in-memory backend. All methods are blocking: callers run
//! them inside `tokio::task::spawn_blocking`.

use crate::error::BackendError;
use image::RgbaImage;
use std::sync::Arc;

/// Integer pixel size of a page rendered at a given scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Round a page size in points, multiplied by `scale`, to whole pixels.
    ///
    /// Backends that have no rounding rule of their own use this one.
    pub fn from_points(width_pt: f32, height_pt: f32, scale: f32) -> Self {
        Self {
            width: ((width_pt * scale).round() as u32).max(1),
            height: ((height_pt * scale).round() as u32).max(1),
        }
    }
}

/// Which rendering path the backend should favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderIntent {
    /// Screen-oriented approximations (faster, hinting for displays).
    Display,
    /// Print-oriented: sharper text and vector output. Used for all exports.
    #[default]
    Print,
}

/// Opens documents.
pub trait DocumentBackend: Send + Sync {
    /// Open `bytes` as a document. Fails on corrupt, empty or unsupported input.
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn PageSource>, BackendError>;
}

/// An opened document.
///
/// Dropping the last reference releases whatever the backend holds for it.
pub trait PageSource: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Pixel size of 1-based page `page_number` at `scale`.
    ///
    /// Fails when the page does not exist or its page object is unreadable.
    fn viewport(&self, page_number: usize, scale: f32) -> Result<Viewport, BackendError>;

    /// Paint page `page_number` into a surface of exactly `viewport` pixels.
    ///
    /// The page is painted over a fully transparent background; the returned
    /// image keeps whatever alpha the page content produces.
    fn render(
        &self,
        page_number: usize,
        viewport: Viewport,
        intent: RenderIntent,
    ) -> Result<RgbaImage, BackendError>;
}
