//! The conversion coordinator: project registry plus conversion runs.
//!
//! A [`Coordinator`] owns every open [`Project`] in an ordered registry keyed
//! by [`ProjectId`]. All mutations go through [`ProjectCommand`]s applied
//! under the registry lock, and every late write (a page finishing after the
//! project was removed, a summary arriving after a second run started) is a
//! guarded merge: it is dropped when the target id is no longer registered.
//! Ids come from a monotonic counter and are never reused, so a removed
//! project cannot be resurrected by a stale result.
//!
//! ## Runs
//!
//! ```text
//! convert(id, pages)
//!   │ validate range (no mutation on error)
//!   │ wait for the project's run gate      ← one run per project at a time
//!   ▼
//!   CONVERTING, progress = 0
//!   for page in ascending order:
//!       already converted? → count it, advance progress
//!       otherwise          → rasterize (blocking pool) → AppendPage
//!       page 1 newly rendered? → spawn the one-shot summary (detached)
//!   COMPLETED, progress = 100      (any failure: ERROR, pages kept)
//! ```
//!
//! Runs on different projects interleave freely; [`Coordinator::convert_all`]
//! drives them concurrently.

use crate::config::{validate_dpi, ConversionConfig, ImageFormat, PageSelection, RenderSettings};
use crate::error::Pdf2ImgError;
use crate::pipeline::analysis::{LlmSummarizer, Summarizer};
use crate::pipeline::archive::{self, ArchiveArtifact};
use crate::pipeline::backend::DocumentBackend;
use crate::pipeline::input::{self, InputFile};
use crate::pipeline::render;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::project::{
    progress_percent, ConvertedPage, Project, ProjectCommand, ProjectId, ProjectSnapshot,
    ProjectStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of one successful [`Coordinator::convert`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub id: ProjectId,
    /// Page numbers of the run, ascending.
    pub requested: Vec<usize>,
    /// Pages rasterised by this run.
    pub converted: usize,
    /// Pages that were already present and were not rasterised again.
    pub reused: usize,
}

struct Entry {
    project: Project,
    /// Held for the whole duration of a run on this project.
    gate: Arc<tokio::sync::Mutex<()>>,
}

struct Registry {
    projects: BTreeMap<ProjectId, Entry>,
    active: Option<ProjectId>,
    settings: RenderSettings,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(state: &SharedRegistry) -> MutexGuard<'_, Registry> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply a command to a registered project.
///
/// Returns `Err(ProjectRemoved)` when the id is no longer registered; nothing
/// is written in that case.
fn dispatch(
    state: &SharedRegistry,
    id: ProjectId,
    command: ProjectCommand,
) -> Result<bool, Pdf2ImgError> {
    let mut registry = lock(state);
    match registry.projects.get_mut(&id) {
        Some(entry) => Ok(entry.project.apply(command)),
        None => {
            debug!("Dropped {:?} for removed project {}", command, id);
            Err(Pdf2ImgError::ProjectRemoved { id })
        }
    }
}

/// Owns the open projects and drives their conversion.
pub struct Coordinator {
    backend: Arc<dyn DocumentBackend>,
    summarizer: Option<Arc<dyn Summarizer>>,
    callback: ProgressCallback,
    state: SharedRegistry,
    next_id: AtomicU64,
    background: Mutex<JoinSet<()>>,
}

impl Coordinator {
    /// Create a coordinator.
    ///
    /// When `config.analysis` is set, the summary provider is resolved now;
    /// if none can be resolved the coordinator simply runs without summaries.
    pub fn new(config: &ConversionConfig, backend: Arc<dyn DocumentBackend>) -> Self {
        let summarizer: Option<Arc<dyn Summarizer>> = if config.analysis {
            match LlmSummarizer::from_config(config) {
                Ok(s) => Some(Arc::new(s)),
                Err(e) => {
                    warn!("Document summaries disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self::with_summarizer(config, backend, summarizer)
    }

    /// Create a coordinator with an explicit summarizer.
    ///
    /// The summarizer is ignored when `config.analysis` is false.
    pub fn with_summarizer(
        config: &ConversionConfig,
        backend: Arc<dyn DocumentBackend>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        Self {
            backend,
            summarizer: summarizer.filter(|_| config.analysis),
            callback: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            state: Arc::new(Mutex::new(Registry {
                projects: BTreeMap::new(),
                active: None,
                settings: config.render_settings(),
            })),
            next_id: AtomicU64::new(1),
            background: Mutex::new(JoinSet::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.state)
    }

    fn dispatch(&self, id: ProjectId, command: ProjectCommand) -> Result<bool, Pdf2ImgError> {
        dispatch(&self.state, id, command)
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Add one file. Returns `None` when the file is not a PDF.
    ///
    /// A load failure is recorded on the returned project, not returned.
    pub async fn add_file(&self, file: InputFile) -> Option<ProjectId> {
        self.add_files(vec![file]).await.into_iter().next()
    }

    /// Add several files: one `LOADING` project per accepted PDF, then load
    /// them concurrently. Non-PDF files are skipped.
    ///
    /// Returns the created ids in input order. Each project ends `IDLE` or,
    /// if its document could not be opened, `ERROR` with a "Load failed"
    /// message; one bad file never affects the others.
    pub async fn add_files(&self, files: Vec<InputFile>) -> Vec<ProjectId> {
        let accepted = input::accept_pdfs(files);
        let staged: Vec<(ProjectId, InputFile)> = {
            let mut registry = self.registry();
            accepted
                .into_iter()
                .map(|file| {
                    let id = ProjectId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
                    registry.projects.insert(
                        id,
                        Entry {
                            project: Project::new(id, file.name.clone(), file.byte_size()),
                            gate: Arc::new(tokio::sync::Mutex::new(())),
                        },
                    );
                    (id, file)
                })
                .collect()
        };

        let ids = staged.iter().map(|(id, _)| *id).collect();
        futures::future::join_all(
            staged
                .into_iter()
                .map(|(id, file)| self.load_project(id, file)),
        )
        .await;
        ids
    }

    async fn load_project(&self, id: ProjectId, file: InputFile) {
        let byte_size = file.byte_size();
        let result = input::load(Arc::clone(&self.backend), file.bytes, &file.name, byte_size).await;

        let mut registry = self.registry();
        let Some(entry) = registry.projects.get_mut(&id) else {
            debug!("Project {} removed while loading '{}'", id, file.name);
            return;
        };
        match result {
            Ok((handle, metadata)) => {
                entry.project.apply(ProjectCommand::Attach { handle, metadata });
                if registry.active.is_none() {
                    registry.active = Some(id);
                }
            }
            Err(e) => {
                warn!("Project {}: {}", id, e);
                entry.project.apply(ProjectCommand::SetError(e.project_message()));
            }
        }
    }

    /// Remove a project and release its document.
    ///
    /// An in-flight run on the project stops at its next step; nothing it
    /// produces afterwards is written anywhere. Returns `false` for unknown ids.
    pub fn remove(&self, id: ProjectId) -> bool {
        let mut registry = self.registry();
        if registry.projects.remove(&id).is_none() {
            return false;
        }
        if registry.active == Some(id) {
            registry.active = registry.projects.keys().next().copied();
        }
        info!("Removed project {}", id);
        true
    }

    // ── Conversion ──────────────────────────────────────────────────────

    /// Convert the selected pages of one project (`None` → every page).
    ///
    /// Pages already converted are counted but not rendered again. A run on
    /// a project waits for any earlier run on the same project to finish.
    ///
    /// # Errors
    /// - `UnknownProject` / `NotReady` — nothing was changed.
    /// - `PageOutOfRange` — a page outside the document; nothing was changed.
    /// - `RenderFailed` — the run stopped at that page; the project is
    ///   `ERROR` and keeps every page converted before it.
    /// - `ProjectRemoved` — the project was removed during the run.
    pub async fn convert(
        &self,
        id: ProjectId,
        pages: Option<PageSelection>,
    ) -> Result<ConversionReport, Pdf2ImgError> {
        let (gate, total_pages) = {
            let registry = self.registry();
            let entry = registry
                .projects
                .get(&id)
                .ok_or(Pdf2ImgError::UnknownProject { id })?;
            if entry.project.handle.is_none() {
                return Err(Pdf2ImgError::NotReady {
                    id,
                    status: entry.project.status(),
                });
            }
            (Arc::clone(&entry.gate), entry.project.metadata().total_pages)
        };

        let requested = pages.unwrap_or_default().to_page_numbers(total_pages)?;
        let _run = gate.lock().await;

        let (handle, settings) = {
            let registry = self.registry();
            let entry = registry
                .projects
                .get(&id)
                .ok_or(Pdf2ImgError::ProjectRemoved { id })?;
            let handle = entry.project.handle().ok_or(Pdf2ImgError::NotReady {
                id,
                status: entry.project.status(),
            })?;
            (handle, registry.settings)
        };

        let start = Instant::now();
        let total = requested.len();
        self.dispatch(id, ProjectCommand::SetStatus(ProjectStatus::Converting))?;
        info!(
            "Converting project {}: {} pages at {} DPI as {}",
            id, total, settings.dpi, settings.format
        );
        self.callback.on_conversion_start(id, total);

        let mut converted = 0;
        let mut reused = 0;
        for (done, &page_number) in requested.iter().enumerate() {
            let progress = progress_percent(done + 1, total);

            let present = {
                let registry = self.registry();
                registry
                    .projects
                    .get(&id)
                    .map(|e| e.project.has_page(page_number))
                    .ok_or(Pdf2ImgError::ProjectRemoved { id })?
            };
            if present {
                self.dispatch(id, ProjectCommand::SetProgress(progress))?;
                reused += 1;
                debug!("Project {}: page {} already converted", id, page_number);
                self.callback
                    .on_page_complete(id, page_number, total, progress, true);
                continue;
            }

            let page = match render::rasterize(Arc::clone(&handle), page_number, settings).await {
                Ok(page) => page,
                Err(e) => {
                    let message = e.project_message();
                    warn!("Project {}: {}", id, e);
                    if self.dispatch(id, ProjectCommand::SetError(message.clone())).is_ok() {
                        self.callback.on_page_error(id, page_number, &message);
                    }
                    return Err(e);
                }
            };

            let first_page = (page_number == 1).then(|| page.clone());
            self.dispatch(id, ProjectCommand::AppendPage { page, progress })?;
            converted += 1;
            self.callback
                .on_page_complete(id, page_number, total, progress, false);

            if let Some(page) = first_page {
                self.request_analysis(id, page);
            }
        }

        self.dispatch(id, ProjectCommand::SetProgress(100))?;
        self.dispatch(id, ProjectCommand::SetStatus(ProjectStatus::Completed))?;
        info!(
            "Project {} complete: {} rendered, {} reused, {}ms",
            id,
            converted,
            reused,
            start.elapsed().as_millis()
        );
        self.callback.on_conversion_complete(id, converted);

        Ok(ConversionReport {
            id,
            requested,
            converted,
            reused,
        })
    }

    /// Run one independent [`convert`](Self::convert) per project, concurrently.
    pub async fn convert_all(
        &self,
        pages: Option<PageSelection>,
    ) -> Vec<(ProjectId, Result<ConversionReport, Pdf2ImgError>)> {
        let ids = self.project_ids();
        let runs = ids.iter().map(|&id| self.convert(id, pages.clone()));
        ids.iter()
            .copied()
            .zip(futures::future::join_all(runs).await)
            .collect()
    }

    /// Dispatch the one-shot summary for a project, if it has none yet.
    fn request_analysis(&self, id: ProjectId, page: ConvertedPage) {
        let Some(summarizer) = self.summarizer.clone() else {
            return;
        };

        let claimed = {
            let mut registry = self.registry();
            match registry.projects.get_mut(&id) {
                Some(entry) if entry.project.analysis().is_none() => {
                    entry.project.apply(ProjectCommand::MarkAnalysisRequested)
                }
                _ => false,
            }
        };
        if !claimed {
            return;
        }

        let state = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        debug!("Project {}: requesting document summary", id);
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                match summarizer.summarize(&page).await {
                    Ok(analysis) => match dispatch(&state, id, ProjectCommand::SetAnalysis(analysis)) {
                        Ok(true) => {
                            info!("Project {}: summary ready", id);
                            callback.on_analysis_ready(id);
                        }
                        Ok(false) => debug!("Project {}: summary already present", id),
                        Err(_) => {}
                    },
                    Err(e) => warn!("Project {}: summary unavailable: {}", id, e),
                }
            });
    }

    /// Wait until every detached summary request has finished.
    pub async fn settle(&self) {
        loop {
            let mut tasks = {
                let mut guard = self.background.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::replace(&mut *guard, JoinSet::new())
            };
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Summary task failed: {}", e);
                }
            }
        }
    }

    // ── Export ──────────────────────────────────────────────────────────

    /// Package a project's pages (or only its selected pages) into a zip.
    ///
    /// `Ok(None)` when there is nothing to export. Never changes the project.
    pub async fn export(
        &self,
        id: ProjectId,
        only_selected: bool,
    ) -> Result<Option<ArchiveArtifact>, Pdf2ImgError> {
        let snapshot = self
            .snapshot(id)
            .ok_or(Pdf2ImgError::UnknownProject { id })?;
        archive::export_archive(&snapshot, only_selected).await
    }

    // ── Selection ───────────────────────────────────────────────────────

    /// Add or remove one page from the export selection.
    pub fn toggle_page(&self, id: ProjectId, page_number: usize) -> Result<(), Pdf2ImgError> {
        let total = self.total_pages(id)?;
        if page_number == 0 || page_number > total {
            return Err(Pdf2ImgError::PageOutOfRange {
                page: page_number,
                total,
            });
        }
        self.dispatch(id, ProjectCommand::TogglePage(page_number))?;
        Ok(())
    }

    /// Replace the export selection.
    pub fn set_selection(&self, id: ProjectId, pages: &PageSelection) -> Result<(), Pdf2ImgError> {
        let selected: BTreeSet<usize> = pages
            .to_page_numbers(self.total_pages(id)?)?
            .into_iter()
            .collect();
        self.dispatch(id, ProjectCommand::SetSelection(selected))?;
        Ok(())
    }

    /// Select every converted page.
    pub fn select_all(&self, id: ProjectId) -> Result<(), Pdf2ImgError> {
        self.dispatch(id, ProjectCommand::SelectAll)
            .map_err(|_| Pdf2ImgError::UnknownProject { id })?;
        Ok(())
    }

    pub fn clear_selection(&self, id: ProjectId) -> Result<(), Pdf2ImgError> {
        self.dispatch(id, ProjectCommand::ClearSelection)
            .map_err(|_| Pdf2ImgError::UnknownProject { id })?;
        Ok(())
    }

    fn total_pages(&self, id: ProjectId) -> Result<usize, Pdf2ImgError> {
        self.registry()
            .projects
            .get(&id)
            .map(|e| e.project.metadata().total_pages)
            .ok_or(Pdf2ImgError::UnknownProject { id })
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn snapshot(&self, id: ProjectId) -> Option<ProjectSnapshot> {
        self.registry()
            .projects
            .get(&id)
            .map(|e| e.project.snapshot())
    }

    /// Snapshots of every project, in creation order.
    pub fn snapshots(&self) -> Vec<ProjectSnapshot> {
        self.registry()
            .projects
            .values()
            .map(|e| e.project.snapshot())
            .collect()
    }

    pub fn project_ids(&self) -> Vec<ProjectId> {
        self.registry().projects.keys().copied().collect()
    }

    /// The project currently shown to the user, if any.
    pub fn active(&self) -> Option<ProjectId> {
        self.registry().active
    }

    pub fn set_active(&self, id: ProjectId) -> Result<(), Pdf2ImgError> {
        let mut registry = self.registry();
        if !registry.projects.contains_key(&id) {
            return Err(Pdf2ImgError::UnknownProject { id });
        }
        registry.active = Some(id);
        Ok(())
    }

    // ── Settings ────────────────────────────────────────────────────────

    /// Settings the next run will use.
    pub fn render_settings(&self) -> RenderSettings {
        self.registry().settings
    }

    /// Change the resolution of future runs. Converted pages keep theirs.
    pub fn set_dpi(&self, dpi: u32) -> Result<(), Pdf2ImgError> {
        validate_dpi(dpi)?;
        self.registry().settings.dpi = dpi;
        Ok(())
    }

    /// Change the encoding of future runs. Converted pages keep theirs.
    pub fn set_format(&self, format: ImageFormat) {
        self.registry().settings.format = format;
    }
}
