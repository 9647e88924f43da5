//! Progress-callback trait for per-project conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! [`crate::Coordinator`] from the outside: a terminal progress bar, a UI
//! refresh, a log line. Every event carries the [`ProjectId`] it belongs to,
//! since several projects may be converting at once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2img::{ConversionProgressCallback, ConversionConfig, ProjectId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, id: ProjectId, page: usize, total: usize, progress: u8, reused: bool) {
//!         if !reused {
//!             self.rendered.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("{id}: page {page}/{total} ({progress}%)");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { rendered: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::project::ProjectId;
use std::sync::Arc;

/// Called by the coordinator as it works through a project.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for different projects may arrive
/// concurrently from different tasks.
pub trait ConversionProgressCallback: Send + Sync {
    /// A conversion run started.
    ///
    /// # Arguments
    /// * `total_pages` — pages in the run's range, already-converted ones included
    fn on_conversion_start(&self, id: ProjectId, total_pages: usize) {
        let _ = (id, total_pages);
    }

    /// A page in the run's range is done.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    /// * `total_pages` — pages in the run's range
    /// * `progress` — project progress after this page, 0..=100
    /// * `reused` — `true` when the page was already converted and was not rendered again
    fn on_page_complete(
        &self,
        id: ProjectId,
        page_num: usize,
        total_pages: usize,
        progress: u8,
        reused: bool,
    ) {
        let _ = (id, page_num, total_pages, progress, reused);
    }

    /// A page failed; the run stops here.
    fn on_page_error(&self, id: ProjectId, page_num: usize, error: &str) {
        let _ = (id, page_num, error);
    }

    /// The run finished without error.
    ///
    /// # Arguments
    /// * `converted` — pages newly rendered by this run
    fn on_conversion_complete(&self, id: ProjectId, converted: usize) {
        let _ = (id, converted);
    }

    /// The document summary has been stored on the project.
    fn on_analysis_ready(&self, id: ProjectId) {
        let _ = id;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
