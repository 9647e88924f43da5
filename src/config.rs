//! Configuration types for PDF-to-image conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The [`crate::Coordinator`] copies the
//! render-related fields ([`RenderSettings`]) at start-up and lets callers
//! change them between runs; everything else (analysis provider, progress
//! callback) is fixed for the coordinator's lifetime.

use crate::error::Pdf2ImgError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Resolution of the PDF coordinate system: one point is 1/72 inch.
pub const REFERENCE_DPI: f32 = 72.0;

/// Lowest accepted output resolution.
pub const MIN_DPI: u32 = 72;

/// Highest accepted output resolution.
pub const MAX_DPI: u32 = 600;

/// JPEG quality factor (0–100). High enough that rasterised text shows no
/// visible block artefacts, low enough to stay well below PNG sizes.
pub const JPEG_QUALITY: u8 = 95;

/// Configuration for a conversion session.
///
/// # Example
/// ```rust
/// use edgequake_pdf2img::{ConversionConfig, ImageFormat};
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .format(ImageFormat::Jpeg)
///     .analysis(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Output resolution in dots per inch. Range: 72–600. Default: 300.
    ///
    /// Applied uniformly to every page of a run through `scale = dpi / 72`.
    /// 300 DPI is print resolution: an A4 page becomes 2481 × 3508 px.
    pub dpi: u32,

    /// Encoding of the produced images. Default: [`ImageFormat::Png`].
    pub format: ImageFormat,

    /// Request a one-shot summary of each document's first page. Default: true.
    ///
    /// Has no effect when no provider can be resolved; conversion never
    /// depends on the summary.
    pub analysis: bool,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "gemini-2.0-flash".
    /// If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the summary. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate for the summary. Default: 1024.
    pub max_tokens: usize,

    /// Optional observer for conversion events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            format: ImageFormat::default(),
            analysis: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 1024,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("format", &self.format)
            .field("analysis", &self.analysis)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The render-related subset of this config.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            dpi: self.dpi,
            format: self.format,
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    /// Output DPI. Validated by [`build`](Self::build), not clamped, so a
    /// typo surfaces as an error instead of a silently different resolution.
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn format(mut self, format: ImageFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn analysis(mut self, enabled: bool) -> Self {
        self.config.analysis = enabled;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2ImgError> {
        validate_dpi(self.config.dpi)?;
        if self.config.max_tokens == 0 {
            return Err(Pdf2ImgError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Check that `dpi` lies in the supported 72–600 range.
pub fn validate_dpi(dpi: u32) -> Result<(), Pdf2ImgError> {
    if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
        return Err(Pdf2ImgError::InvalidConfig(format!(
            "DPI must be {MIN_DPI}–{MAX_DPI}, got {dpi}"
        )));
    }
    Ok(())
}

// ── Render settings ──────────────────────────────────────────────────────

/// Resolution and encoding applied to every page of one conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub dpi: u32,
    pub format: ImageFormat,
}

impl RenderSettings {
    /// Scale factor from PDF points to output pixels.
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / REFERENCE_DPI
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        ConversionConfig::default().render_settings()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Encoding of a rasterised page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless, keeps the page's transparency. (default)
    #[default]
    Png,
    /// Lossy at [`JPEG_QUALITY`], always opaque (white background).
    Jpeg,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Inverse of [`mime_type`](Self::mime_type); accepts the `image/jpg` alias.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = Pdf2ImgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(Pdf2ImgError::InvalidConfig(format!(
                "Unsupported image format '{other}' (expected png or jpeg)"
            ))),
        }
    }
}

/// Specifies which pages of a document to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
    /// Convert a list of inclusive ranges, e.g. `1-5, 10` as `[(1, 5), (10, 10)]`.
    Spans(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-based page
    /// numbers for a document of `total_pages` pages.
    ///
    /// Unlike a clipping selection, any page outside `1..=total_pages` is an
    /// error: the caller asked for something the document does not have.
    pub fn to_page_numbers(&self, total_pages: usize) -> Result<Vec<usize>, Pdf2ImgError> {
        let spans: Vec<(usize, usize)> = match self {
            PageSelection::All if total_pages == 0 => Vec::new(),
            PageSelection::All => vec![(1, total_pages)],
            PageSelection::Single(p) => vec![(*p, *p)],
            PageSelection::Range(start, end) => vec![(*start, *end)],
            PageSelection::Set(pages) => pages.iter().map(|&p| (p, p)).collect(),
            PageSelection::Spans(spans) => spans.clone(),
        };

        // Bounds are checked on the spans so a huge range never gets expanded.
        for &(start, end) in &spans {
            let outside = if start == 0 {
                Some(0)
            } else if start > total_pages {
                Some(start)
            } else if end > total_pages {
                Some(total_pages.saturating_add(1))
            } else {
                None
            };
            if let Some(page) = outside {
                return Err(Pdf2ImgError::PageOutOfRange {
                    page,
                    total: total_pages,
                });
            }
        }

        let mut pages: Vec<usize> = spans.into_iter().flat_map(|(a, b)| a..=b).collect();
        pages.sort_unstable();
        pages.dedup();
        Ok(pages)
    }
}

impl FromStr for PageSelection {
    type Err = Pdf2ImgError;

    /// Parse `all`, `5`, `3-15`, `1,3,5` or mixed lists such as `1-5, 10`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().to_lowercase();
        let invalid = |reason: String| Pdf2ImgError::InvalidPageRange {
            input: s.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("empty selection".into()));
        }
        if input == "all" {
            return Ok(PageSelection::All);
        }

        let mut items = Vec::new();
        for part in input.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(invalid("empty list item".into()));
            }
            items.push(parse_item(part).map_err(invalid)?);
        }

        match items.as_slice() {
            [Item::Single(p)] => Ok(PageSelection::Single(*p)),
            [Item::Range(a, b)] => Ok(PageSelection::Range(*a, *b)),
            _ if items.iter().all(|item| matches!(item, Item::Single(_))) => Ok(PageSelection::Set(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Item::Single(p) => Some(p),
                        Item::Range(..) => None,
                    })
                    .collect(),
            )),
            _ => Ok(PageSelection::Spans(
                items
                    .into_iter()
                    .map(|item| match item {
                        Item::Single(p) => (p, p),
                        Item::Range(a, b) => (a, b),
                    })
                    .collect(),
            )),
        }
    }
}

enum Item {
    Single(usize),
    Range(usize, usize),
}

fn parse_item(part: &str) -> Result<Item, String> {
    let number = |t: &str| -> Result<usize, String> {
        let n: usize = t
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a page number", t.trim()))?;
        if n < 1 {
            return Err(format!("pages are 1-indexed, minimum is 1 (got {n})"));
        }
        Ok(n)
    };

    match part.split_once('-') {
        Some((start, end)) => {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(format!("range {start}-{end}: start must be <= end"));
            }
            Ok(Item::Range(start, end))
        }
        None => Ok(Item::Single(number(part)?)),
    }
}
