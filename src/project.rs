//! Project data model and the reducer that mutates it.
//!
//! A [`Project`] is everything derived from one uploaded document: its open
//! handle, metadata, converted pages, selection, progress and summary. The
//! [`crate::Coordinator`] never edits a project field by field; every change
//! is a named [`ProjectCommand`] applied under the registry lock by
//! [`Project::apply`]. The reducer is where the model's invariants live:
//!
//! * `pages` is keyed by page number, so it can never hold duplicates and
//!   always iterates in ascending order;
//! * pages are only ever added;
//! * progress never decreases inside a run and is reset only by a new run;
//! * the analysis is written at most once.

use crate::config::ImageFormat;
use crate::error::Pdf2ImgError;
use crate::pipeline::backend::PageSource;
use crate::pipeline::encode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Opaque, process-unique project identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(u64);

impl ProjectId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a project.
///
/// ```text
/// LOADING ──▶ IDLE ──▶ CONVERTING ──▶ COMPLETED
///    │                   ▲   │            │
///    ▼                   │   ▼            │
///  ERROR (terminal)      └─ ERROR ◀───────┘ (re-entrant: new runs allowed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Loading,
    Idle,
    Converting,
    Completed,
    Error,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Loading => "LOADING",
            ProjectStatus::Idle => "IDLE",
            ProjectStatus::Converting => "CONVERTING",
            ProjectStatus::Completed => "COMPLETED",
            ProjectStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Basic facts about a loaded document. Immutable once the load succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// File name as supplied by the user, extension included.
    pub name: String,
    /// Declared size of the input in bytes.
    pub byte_size: u64,
    /// Page count read from the opened document (0 until loaded).
    pub total_pages: usize,
}

/// One rasterised page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedPage {
    /// 1-based page number; unique within a project.
    pub page_number: usize,
    /// Encoded image as a `data:image/<fmt>;base64,...` URI.
    pub image_data: String,
    pub width_px: u32,
    pub height_px: u32,
    pub format: ImageFormat,
    /// Resolution the page was produced at.
    pub dpi: u32,
}

impl ConvertedPage {
    /// Download name for a single page, e.g. `Page_7.png`.
    pub fn file_name(&self) -> String {
        format!("Page_{}.{}", self.page_number, self.format.extension())
    }

    /// The raw encoded image bytes behind the data URI.
    pub fn decode(&self) -> Result<Vec<u8>, Pdf2ImgError> {
        encode::decode_data_uri(&self.image_data).map(|(_, bytes)| bytes)
    }
}

/// Structured summary of a document's first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub suggested_title: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

/// The unit of work for one uploaded document.
pub struct Project {
    pub(crate) id: ProjectId,
    pub(crate) handle: Option<Arc<dyn PageSource>>,
    pub(crate) metadata: PageMetadata,
    pub(crate) status: ProjectStatus,
    pub(crate) pages: BTreeMap<usize, ConvertedPage>,
    pub(crate) selected_pages: BTreeSet<usize>,
    pub(crate) progress: u8,
    pub(crate) analysis: Option<DocumentAnalysis>,
    pub(crate) analysis_requested: bool,
    pub(crate) error: Option<String>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("handle", &self.handle.as_ref().map(|_| "<dyn PageSource>"))
            .field("metadata", &self.metadata)
            .field("status", &self.status)
            .field("pages", &self.pages.keys().collect::<Vec<_>>())
            .field("selected_pages", &self.selected_pages)
            .field("progress", &self.progress)
            .field("analysis", &self.analysis.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// A named, atomic mutation of one project.
pub enum ProjectCommand {
    /// Load succeeded: attach the handle and the metadata, go `IDLE`.
    Attach {
        handle: Arc<dyn PageSource>,
        metadata: PageMetadata,
    },
    /// Change the lifecycle state. Entering `CONVERTING` starts a new run:
    /// progress resets to 0 and any previous error is cleared.
    SetStatus(ProjectStatus),
    /// Advance progress (ignored if lower than the current value).
    SetProgress(u8),
    /// Insert a freshly rasterised page and advance progress.
    AppendPage { page: ConvertedPage, progress: u8 },
    /// Record that the one-shot summary request has been dispatched.
    MarkAnalysisRequested,
    /// Store the summary unless one is already present.
    SetAnalysis(DocumentAnalysis),
    /// Fail the project with a short description.
    SetError(String),
    TogglePage(usize),
    SetSelection(BTreeSet<usize>),
    /// Select every converted page.
    SelectAll,
    ClearSelection,
}

impl fmt::Debug for ProjectCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectCommand::Attach { metadata, .. } => {
                f.debug_struct("Attach").field("metadata", metadata).finish()
            }
            ProjectCommand::SetStatus(s) => f.debug_tuple("SetStatus").field(s).finish(),
            ProjectCommand::SetProgress(p) => f.debug_tuple("SetProgress").field(p).finish(),
            ProjectCommand::AppendPage { page, progress } => f
                .debug_struct("AppendPage")
                .field("page_number", &page.page_number)
                .field("progress", progress)
                .finish(),
            ProjectCommand::MarkAnalysisRequested => f.write_str("MarkAnalysisRequested"),
            ProjectCommand::SetAnalysis(_) => f.write_str("SetAnalysis"),
            ProjectCommand::SetError(e) => f.debug_tuple("SetError").field(e).finish(),
            ProjectCommand::TogglePage(p) => f.debug_tuple("TogglePage").field(p).finish(),
            ProjectCommand::SetSelection(s) => f.debug_tuple("SetSelection").field(s).finish(),
            ProjectCommand::SelectAll => f.write_str("SelectAll"),
            ProjectCommand::ClearSelection => f.write_str("ClearSelection"),
        }
    }
}

impl Project {
    /// A fresh project in `LOADING` state.
    pub(crate) fn new(id: ProjectId, name: impl Into<String>, byte_size: u64) -> Self {
        Self {
            id,
            handle: None,
            metadata: PageMetadata {
                name: name.into(),
                byte_size,
                total_pages: 0,
            },
            status: ProjectStatus::Loading,
            pages: BTreeMap::new(),
            selected_pages: BTreeSet::new(),
            progress: 0,
            analysis: None,
            analysis_requested: false,
            error: None,
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn metadata(&self) -> &PageMetadata {
        &self.metadata
    }

    /// Converted pages in ascending page order.
    pub fn pages(&self) -> impl Iterator<Item = &ConvertedPage> {
        self.pages.values()
    }

    pub fn has_page(&self, page_number: usize) -> bool {
        self.pages.contains_key(&page_number)
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn analysis(&self) -> Option<&DocumentAnalysis> {
        self.analysis.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn handle(&self) -> Option<Arc<dyn PageSource>> {
        self.handle.clone()
    }

    /// Apply one command. Returns `true` when the project changed.
    pub fn apply(&mut self, command: ProjectCommand) -> bool {
        match command {
            ProjectCommand::Attach { handle, metadata } => {
                if self.status != ProjectStatus::Loading {
                    return false;
                }
                self.handle = Some(handle);
                self.metadata = metadata;
                self.status = ProjectStatus::Idle;
                true
            }
            ProjectCommand::SetStatus(status) => {
                if status == ProjectStatus::Converting {
                    self.progress = 0;
                }
                if status != ProjectStatus::Error {
                    self.error = None;
                }
                self.status = status;
                true
            }
            ProjectCommand::SetProgress(progress) => self.advance_progress(progress),
            ProjectCommand::AppendPage { page, progress } => {
                if self.pages.contains_key(&page.page_number) {
                    return false;
                }
                self.pages.insert(page.page_number, page);
                self.advance_progress(progress);
                true
            }
            ProjectCommand::MarkAnalysisRequested => {
                let changed = !self.analysis_requested;
                self.analysis_requested = true;
                changed
            }
            ProjectCommand::SetAnalysis(analysis) => {
                if self.analysis.is_some() {
                    return false;
                }
                self.analysis = Some(analysis);
                true
            }
            ProjectCommand::SetError(message) => {
                self.status = ProjectStatus::Error;
                self.error = Some(message);
                true
            }
            ProjectCommand::TogglePage(page) => {
                if !self.selected_pages.remove(&page) {
                    self.selected_pages.insert(page);
                }
                true
            }
            ProjectCommand::SetSelection(pages) => {
                self.selected_pages = pages;
                true
            }
            ProjectCommand::SelectAll => {
                self.selected_pages = self.pages.keys().copied().collect();
                true
            }
            ProjectCommand::ClearSelection => {
                let changed = !self.selected_pages.is_empty();
                self.selected_pages.clear();
                changed
            }
        }
    }

    fn advance_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// A detached, serialisable copy of the project's visible state.
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            id: self.id,
            metadata: self.metadata.clone(),
            status: self.status,
            pages: self.pages.values().cloned().collect(),
            selected_pages: self.selected_pages.iter().copied().collect(),
            progress: self.progress,
            analysis: self.analysis.clone(),
            error: self.error.clone(),
        }
    }
}

/// Read-only copy of a project, safe to hold across awaits and to serialise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: ProjectId,
    pub metadata: PageMetadata,
    pub status: ProjectStatus,
    /// Ascending by page number.
    pub pages: Vec<ConvertedPage>,
    pub selected_pages: Vec<usize>,
    pub progress: u8,
    pub analysis: Option<DocumentAnalysis>,
    pub error: Option<String>,
}

impl ProjectSnapshot {
    pub fn page(&self, page_number: usize) -> Option<&ConvertedPage> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.page_number).collect()
    }
}

/// Progress after `completed` of `total` pages: `round(completed / total * 100)`.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
