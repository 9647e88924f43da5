//! Image encoding: pixel surfaces → PNG/JPEG bytes → self-describing data URIs.
//!
//! A data URI (`data:image/png;base64,...`) carries its own format tag, so a
//! converted page can be shown, downloaded or forwarded to a vision model
//! without any side-channel telling the consumer what it is.

use crate::config::{ImageFormat, JPEG_QUALITY};
use crate::error::Pdf2ImgError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Lossless PNG, alpha preserved.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} PNG → {} bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// JPEG at [`JPEG_QUALITY`]. The input must already be opaque.
pub fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(img)?;
    debug!("Encoded {}x{} JPEG → {} bytes", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Wrap encoded bytes in a `data:` URI tagged with `format`'s MIME type.
pub fn to_data_uri(format: ImageFormat, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

/// Split a base64 image data URI into its format and raw bytes.
pub fn decode_data_uri(uri: &str) -> Result<(ImageFormat, Vec<u8>), Pdf2ImgError> {
    let (header, payload) = split_data_uri(uri)?;
    let mime = header.trim_end_matches(";base64");
    let format = ImageFormat::from_mime_type(mime).ok_or_else(|| {
        Pdf2ImgError::ExportFailed(format!("unsupported image type '{mime}' in data URI"))
    })?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| Pdf2ImgError::ExportFailed(format!("invalid base64 in data URI: {e}")))?;
    Ok((format, bytes))
}

/// `(header, payload)` of a base64 data URI, without decoding the payload.
///
/// `header` is the part between `data:` and the comma, e.g. `image/png;base64`.
pub fn split_data_uri(uri: &str) -> Result<(&str, &str), Pdf2ImgError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Pdf2ImgError::ExportFailed("not a data URI".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Pdf2ImgError::ExportFailed("data URI has no payload".into()))?;
    if !header.ends_with(";base64") {
        return Err(Pdf2ImgError::ExportFailed(
            "data URI payload is not base64".into(),
        ));
    }
    Ok((header, payload))
}
