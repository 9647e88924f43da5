//! Page rasterisation: one page of an open document → one encoded image.
//!
//! ## Why spawn_blocking?
//!
//! Rendering is CPU-bound and the pdfium backend is not async-safe.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! coordinator's async tasks (other projects, analysis requests) keep running
//! while a page is being painted.
//!
//! ## Sizing
//!
//! The output size is whatever the backend's [`PageSource::viewport`] reports
//! for `scale = dpi / 72`; this module only checks that the painted surface
//! has exactly that size. JPEG has no alpha channel, so the surface is
//! composited over opaque white before encoding. PNG keeps the alpha.

use crate::config::{ImageFormat, RenderSettings};
use crate::error::{BackendError, Pdf2ImgError};
use crate::pipeline::backend::{PageSource, RenderIntent};
use crate::pipeline::encode;
use crate::project::ConvertedPage;
use image::{Rgb, RgbImage, RgbaImage};
use std::sync::Arc;
use tracing::debug;

/// Rasterise one 1-based page off the async executor.
pub async fn rasterize(
    source: Arc<dyn PageSource>,
    page_number: usize,
    settings: RenderSettings,
) -> Result<ConvertedPage, Pdf2ImgError> {
    tokio::task::spawn_blocking(move || rasterize_blocking(source.as_ref(), page_number, settings))
        .await
        .map_err(|e| Pdf2ImgError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of [`rasterize`].
pub fn rasterize_blocking(
    source: &dyn PageSource,
    page_number: usize,
    settings: RenderSettings,
) -> Result<ConvertedPage, Pdf2ImgError> {
    let total = source.page_count();
    if page_number == 0 || page_number > total {
        return Err(Pdf2ImgError::RenderFailed {
            page: page_number,
            detail: format!("page does not exist (document has {total} pages)"),
        });
    }

    let render_err = |e: BackendError| Pdf2ImgError::RenderFailed {
        page: page_number,
        detail: e.message,
    };

    let viewport = source
        .viewport(page_number, settings.scale())
        .map_err(render_err)?;
    let surface = source
        .render(page_number, viewport, RenderIntent::Print)
        .map_err(render_err)?;

    if surface.dimensions() != (viewport.width, viewport.height) {
        return Err(Pdf2ImgError::RenderFailed {
            page: page_number,
            detail: format!(
                "backend painted {}x{} px, expected {}x{}",
                surface.width(),
                surface.height(),
                viewport.width,
                viewport.height
            ),
        });
    }

    let encoded = match settings.format {
        ImageFormat::Png => encode::encode_png(&surface),
        ImageFormat::Jpeg => encode::encode_jpeg(&flatten_on_white(&surface)),
    }
    .map_err(|e| Pdf2ImgError::RenderFailed {
        page: page_number,
        detail: format!("Image encoding failed: {}", e),
    })?;

    debug!(
        "Rendered page {} → {}x{} px {} ({} bytes)",
        page_number,
        viewport.width,
        viewport.height,
        settings.format,
        encoded.len()
    );

    Ok(ConvertedPage {
        page_number,
        image_data: encode::to_data_uri(settings.format, &encoded),
        width_px: viewport.width,
        height_px: viewport.height,
        format: settings.format,
        dpi: settings.dpi,
    })
}

/// Composite an RGBA surface over opaque white.
pub fn flatten_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
