//! Coordinator integration tests.
//!
//! Everything here runs against an in-memory PDF backend, so no pdfium
//! library and no API key are needed. A mock document is described by the
//! text after its `%PDF` magic, e.g. `%PDF-mock pages=5 fail=3`:
//!
//! | token    | effect                                              |
//! |----------|-----------------------------------------------------|
//! | `pages=N`| page count (default 1)                              |
//! | `fail=N` | rendering page N fails                              |
//! | `hold=N` | rendering page N blocks until the test releases it  |
//! | `hold_open` | opening blocks until the test releases it        |
//! | `broken` | the document cannot be opened                       |
//!
//! Every page is 14.4 × 7.2 pt, transparent, with one opaque black pixel in
//! its top-left corner.

use edgequake_pdf2img::{
    BackendError, ConversionConfig, ConversionProgressCallback, ConvertedPage, Coordinator,
    DocumentAnalysis, DocumentBackend, ImageFormat, InputFile, PageSelection, PageSource,
    Pdf2ImgError, ProjectId, ProjectStatus, RenderIntent, Summarizer, Viewport,
};
use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

// ── Mock backend ─────────────────────────────────────────────────────────────

const PAGE_W_PT: f32 = 14.4;
const PAGE_H_PT: f32 = 7.2;

struct Hold {
    started: Notify,
    release: Mutex<mpsc::Receiver<()>>,
}

#[derive(Default)]
struct MockBackend {
    /// Every page number handed to `render`, across all documents.
    rendered: Arc<Mutex<Vec<usize>>>,
    hold: Option<Arc<Hold>>,
    /// Once set, `fail=N` no longer fails.
    healed: Arc<AtomicBool>,
}

struct MockDocument {
    pages: usize,
    fail: Option<usize>,
    hold_page: Option<usize>,
    rendered: Arc<Mutex<Vec<usize>>>,
    hold: Option<Arc<Hold>>,
    healed: Arc<AtomicBool>,
}

impl DocumentBackend for MockBackend {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn PageSource>, BackendError> {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        if text.split_whitespace().any(|t| t == "hold_open") {
            if let Some(hold) = &self.hold {
                hold.started.notify_one();
                hold.release.lock().unwrap().recv().ok();
            }
        }
        let mut doc = MockDocument {
            pages: 1,
            fail: None,
            hold_page: None,
            rendered: Arc::clone(&self.rendered),
            hold: self.hold.clone(),
            healed: Arc::clone(&self.healed),
        };
        for token in text.split_whitespace().skip(1) {
            let number = |n: &str| {
                n.parse::<usize>()
                    .map_err(|_| BackendError::new(format!("bad token {token}")))
            };
            match token.split_once('=') {
                Some(("pages", n)) => doc.pages = number(n)?,
                Some(("fail", n)) => doc.fail = Some(number(n)?),
                Some(("hold", n)) => doc.hold_page = Some(number(n)?),
                None if token == "broken" => {
                    return Err(BackendError::new("xref table missing"))
                }
                _ => {}
            }
        }
        Ok(Arc::new(doc))
    }
}

impl PageSource for MockDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn viewport(&self, page_number: usize, scale: f32) -> Result<Viewport, BackendError> {
        if page_number == 0 || page_number > self.pages {
            return Err(BackendError::new("no such page"));
        }
        Ok(Viewport::from_points(PAGE_W_PT, PAGE_H_PT, scale))
    }

    fn render(
        &self,
        page_number: usize,
        viewport: Viewport,
        _intent: RenderIntent,
    ) -> Result<RgbaImage, BackendError> {
        self.rendered.lock().unwrap().push(page_number);

        if self.hold_page == Some(page_number) {
            if let Some(hold) = &self.hold {
                hold.started.notify_one();
                hold.release.lock().unwrap().recv().ok();
            }
        }
        if self.fail == Some(page_number) && !self.healed.load(Ordering::SeqCst) {
            return Err(BackendError::new("corrupted page object"));
        }

        let mut img = RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([0, 0, 0, 0]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        Ok(img)
    }
}

fn pdf(name: &str, spec: &str) -> InputFile {
    InputFile::new(
        name,
        Some("application/pdf"),
        format!("%PDF-mock {spec}").into_bytes(),
    )
}

// ── Scripted summarizer ──────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedSummarizer {
    calls: AtomicUsize,
    fail: bool,
    release: Option<Arc<Notify>>,
}

impl Summarizer for ScriptedSummarizer {
    fn summarize<'a>(
        &'a self,
        page: &'a ConvertedPage,
    ) -> BoxFuture<'a, Result<DocumentAnalysis, Pdf2ImgError>> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(release) = &self.release {
                release.notified().await;
            }
            if self.fail {
                return Err(Pdf2ImgError::AnalysisFailed("quota exceeded".into()));
            }
            Ok(DocumentAnalysis {
                suggested_title: format!("Title {n}"),
                summary: format!("Saw page {}. Two sentences.", page.page_number),
                key_points: vec!["one".into(), "two".into(), "three".into()],
            })
        })
    }
}

// ── Recording callback ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(usize),
    Page { page: usize, progress: u8, reused: bool },
    Error(usize, String),
    Complete(usize),
    Analysis,
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Page { progress, .. } => Some(progress),
                _ => None,
            })
            .collect()
    }
}

impl ConversionProgressCallback for Recorder {
    fn on_conversion_start(&self, _id: ProjectId, total_pages: usize) {
        self.events.lock().unwrap().push(Event::Start(total_pages));
    }

    fn on_page_complete(&self, _id: ProjectId, page: usize, _total: usize, progress: u8, reused: bool) {
        self.events.lock().unwrap().push(Event::Page { page, progress, reused });
    }

    fn on_page_error(&self, _id: ProjectId, page: usize, error: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Error(page, error.to_string()));
    }

    fn on_conversion_complete(&self, _id: ProjectId, converted: usize) {
        self.events.lock().unwrap().push(Event::Complete(converted));
    }

    fn on_analysis_ready(&self, _id: ProjectId) {
        self.events.lock().unwrap().push(Event::Analysis);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(dpi: u32) -> ConversionConfig {
    ConversionConfig::builder()
        .dpi(dpi)
        .build()
        .expect("valid config")
}

/// `RUST_LOG=edgequake_pdf2img=debug cargo test --test coordinator -- --nocapture`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn coordinator(
    config: &ConversionConfig,
    backend: MockBackend,
    summarizer: Option<Arc<ScriptedSummarizer>>,
) -> Coordinator {
    init_tracing();
    Coordinator::with_summarizer(
        config,
        Arc::new(backend),
        summarizer.map(|s| s as Arc<dyn Summarizer>),
    )
}

async fn add_one(c: &Coordinator, spec: &str) -> ProjectId {
    c.add_file(pdf("doc.pdf", spec)).await.expect("accepted")
}

// ── Loading ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_files_skips_non_pdfs() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let ids = c
        .add_files(vec![
            pdf("a.pdf", "pages=2"),
            InputFile::new("photo.png", Some("image/png"), b"\x89PNG".to_vec()),
            pdf("b.pdf", "pages=7"),
        ])
        .await;

    assert_eq!(ids.len(), 2);
    let snaps = c.snapshots();
    assert_eq!(snaps[0].metadata.name, "a.pdf");
    assert_eq!(snaps[0].metadata.total_pages, 2);
    assert_eq!(snaps[1].metadata.total_pages, 7);
    assert!(snaps.iter().all(|s| s.status == ProjectStatus::Idle));
    assert!(ids.contains(&c.active().expect("an active project")));
}

#[tokio::test]
async fn load_failure_is_local_to_its_project() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let ids = c
        .add_files(vec![
            pdf("broken.pdf", "broken"),
            InputFile::new("fake.pdf", Some("application/pdf"), b"PK\x03\x04".to_vec()),
            pdf("good.pdf", "pages=3"),
        ])
        .await;

    let broken = c.snapshot(ids[0]).unwrap();
    assert_eq!(broken.status, ProjectStatus::Error);
    let msg = broken.error.unwrap();
    assert!(msg.starts_with("Load failed"), "got: {msg}");
    assert!(msg.contains("xref table missing"), "got: {msg}");

    let fake = c.snapshot(ids[1]).unwrap();
    assert_eq!(fake.status, ProjectStatus::Error);
    assert!(fake.error.unwrap().contains("not a valid PDF"));

    assert_eq!(c.snapshot(ids[2]).unwrap().status, ProjectStatus::Idle);
    assert_eq!(c.active(), Some(ids[2]));

    let err = c.convert(ids[0], None).await.unwrap_err();
    assert!(matches!(err, Pdf2ImgError::NotReady { status: ProjectStatus::Error, .. }));
    assert!(c.convert(ids[2], None).await.is_ok());
}

#[tokio::test]
async fn unknown_project_is_rejected() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let err = c.convert(ProjectId::from_raw(42), None).await.unwrap_err();
    assert!(matches!(err, Pdf2ImgError::UnknownProject { .. }));
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn converts_every_page_in_ascending_order() {
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .dpi(72)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let backend = MockBackend::default();
    let rendered = Arc::clone(&backend.rendered);
    let c = coordinator(&cfg, backend, None);
    let id = add_one(&c, "pages=5").await;

    let report = c.convert(id, None).await.unwrap();
    assert_eq!(report.requested, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.converted, 5);
    assert_eq!(report.reused, 0);

    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.status, ProjectStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(snap.page_numbers(), vec![1, 2, 3, 4, 5]);
    assert_eq!(*rendered.lock().unwrap(), vec![1, 2, 3, 4, 5]);

    assert_eq!(recorder.events().first(), Some(&Event::Start(5)));
    assert_eq!(recorder.events().last(), Some(&Event::Complete(5)));
}

#[tokio::test]
async fn progress_is_monotone_and_ends_at_100() {
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .dpi(72)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let c = coordinator(&cfg, MockBackend::default(), None);
    let id = add_one(&c, "pages=3").await;

    c.convert(id, Some(PageSelection::Single(2))).await.unwrap();
    c.convert(id, None).await.unwrap();

    // Two runs: [100] then [33, 67, 100]; each run restarts from 0.
    assert_eq!(recorder.progress(), vec![100, 33, 67, 100]);
    assert_eq!(c.snapshot(id).unwrap().progress, 100);
}

#[tokio::test]
async fn converted_pages_are_never_rendered_twice() {
    let backend = MockBackend::default();
    let rendered = Arc::clone(&backend.rendered);
    let c = coordinator(&config(72), backend, None);
    let id = add_one(&c, "pages=3").await;

    c.convert(id, Some(PageSelection::Single(2))).await.unwrap();
    let page2 = c.snapshot(id).unwrap().page(2).cloned().unwrap();

    let report = c.convert(id, None).await.unwrap();
    assert_eq!((report.converted, report.reused), (2, 1));

    let report = c.convert(id, Some(PageSelection::Single(2))).await.unwrap();
    assert_eq!((report.converted, report.reused), (0, 1));

    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.page_numbers(), vec![1, 2, 3]);
    assert_eq!(snap.page(2), Some(&page2));
    assert_eq!(snap.status, ProjectStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(*rendered.lock().unwrap(), vec![2, 1, 3]);
}

#[tokio::test]
async fn output_size_follows_dpi() {
    let c = coordinator(&config(300), MockBackend::default(), None);
    let id = add_one(&c, "pages=1").await;
    c.convert(id, None).await.unwrap();

    let page = c.snapshot(id).unwrap().page(1).cloned().unwrap();
    // 14.4 × 7.2 pt at 300/72 → 60 × 30 px
    assert_eq!((page.width_px, page.height_px), (60, 30));
    assert_eq!(page.dpi, 300);
    let img = image::load_from_memory(&page.decode().unwrap()).unwrap();
    assert_eq!((img.width(), img.height()), (60, 30));
}

#[tokio::test]
async fn jpeg_is_opaque_and_png_keeps_alpha() {
    let c = coordinator(&config(144), MockBackend::default(), None);
    let id = add_one(&c, "pages=2").await;

    c.convert(id, Some(PageSelection::Single(1))).await.unwrap();
    c.set_format(ImageFormat::Jpeg);
    c.convert(id, Some(PageSelection::Single(2))).await.unwrap();

    let snap = c.snapshot(id).unwrap();
    let png = snap.page(1).unwrap();
    let jpeg = snap.page(2).unwrap();
    assert_eq!(png.format, ImageFormat::Png);
    assert_eq!(jpeg.format, ImageFormat::Jpeg);
    assert!(jpeg.image_data.starts_with("data:image/jpeg;base64,"));

    let png_img = image::load_from_memory(&png.decode().unwrap()).unwrap().to_rgba8();
    assert_eq!(png_img.get_pixel(10, 5)[3], 0);
    assert_eq!(png_img.get_pixel(0, 0)[3], 255);

    let jpeg_img = image::load_from_memory(&jpeg.decode().unwrap()).unwrap();
    assert!(!jpeg_img.color().has_alpha());
    let px = jpeg_img.to_rgb8().get_pixel(20, 10).0;
    assert!(px.iter().all(|&c| c > 240), "expected white, got {px:?}");
}

#[tokio::test]
async fn failing_page_stops_the_run_and_keeps_earlier_pages() {
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .dpi(72)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let backend = MockBackend::default();
    let rendered = Arc::clone(&backend.rendered);
    let c = coordinator(&cfg, backend, None);
    let id = add_one(&c, "pages=5 fail=3").await;

    let err = c.convert(id, None).await.unwrap_err();
    assert!(matches!(err, Pdf2ImgError::RenderFailed { page: 3, .. }));

    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.status, ProjectStatus::Error);
    assert_eq!(snap.error.as_deref(), Some("Error during conversion of page 3"));
    assert_eq!(snap.page_numbers(), vec![1, 2]);
    assert_eq!(*rendered.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(
        recorder.events().last(),
        Some(&Event::Error(3, "Error during conversion of page 3".into()))
    );
    assert!(!recorder.events().contains(&Event::Complete(2)));
}

#[tokio::test]
async fn failed_run_can_be_retried() {
    let backend = MockBackend::default();
    let healed = Arc::clone(&backend.healed);
    let c = coordinator(&config(72), backend, None);
    let id = add_one(&c, "pages=4 fail=4").await;
    assert!(c.convert(id, None).await.is_err());

    healed.store(true, Ordering::SeqCst);

    let report = c.convert(id, None).await.unwrap();
    assert_eq!((report.converted, report.reused), (1, 3));
    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.status, ProjectStatus::Completed);
    assert!(snap.error.is_none());
    assert_eq!(snap.page_numbers(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn out_of_range_request_changes_nothing() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let id = add_one(&c, "pages=5").await;
    let before = c.snapshot(id).unwrap();

    let err = c
        .convert(id, Some(PageSelection::Range(4, 9)))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ImgError::PageOutOfRange { page: 6, total: 5 }));
    assert_eq!(c.snapshot(id).unwrap(), before);

    let err = c.convert(id, Some(PageSelection::Single(0))).await.unwrap_err();
    assert!(matches!(err, Pdf2ImgError::PageOutOfRange { page: 0, .. }));
    assert_eq!(c.snapshot(id).unwrap().status, ProjectStatus::Idle);

    for huge in ["1-18446744073709551615", "3, 1-4000000000"] {
        let err = c.convert(id, Some(huge.parse().unwrap())).await.unwrap_err();
        assert!(matches!(err, Pdf2ImgError::PageOutOfRange { page: 6, total: 5 }));
        assert!(c.set_selection(id, &huge.parse().unwrap()).is_err());
    }
    assert_eq!(c.snapshot(id).unwrap(), before);
}

#[tokio::test]
async fn concurrent_runs_on_one_project_are_serialised() {
    let backend = MockBackend::default();
    let rendered = Arc::clone(&backend.rendered);
    let c = coordinator(&config(72), backend, None);
    let id = add_one(&c, "pages=4").await;

    let (a, b) = tokio::join!(c.convert(id, None), c.convert(id, None));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.converted + b.converted, 4);
    assert_eq!(a.reused + b.reused, 4);
    assert_eq!(rendered.lock().unwrap().len(), 4);
    assert_eq!(c.snapshot(id).unwrap().progress, 100);
}

#[tokio::test]
async fn convert_all_isolates_failures() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let ids = c
        .add_files(vec![
            pdf("ok.pdf", "pages=2"),
            pdf("bad.pdf", "pages=3 fail=2"),
            pdf("broken.pdf", "broken"),
        ])
        .await;

    let results = c.convert_all(None).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert!(matches!(results[1].1, Err(Pdf2ImgError::RenderFailed { page: 2, .. })));
    assert!(matches!(results[2].1, Err(Pdf2ImgError::NotReady { .. })));

    assert_eq!(c.snapshot(ids[0]).unwrap().status, ProjectStatus::Completed);
    assert_eq!(c.snapshot(ids[1]).unwrap().page_numbers(), vec![1]);
}

#[tokio::test]
async fn dpi_change_keeps_converted_pages() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let id = add_one(&c, "pages=2").await;

    c.convert(id, Some(PageSelection::Single(1))).await.unwrap();
    c.set_dpi(144).unwrap();
    assert!(c.set_dpi(50).is_err());
    assert_eq!(c.render_settings().dpi, 144);
    c.convert(id, None).await.unwrap();

    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.page(1).unwrap().dpi, 72);
    assert_eq!(snap.page(1).unwrap().width_px, 14);
    assert_eq!(snap.page(2).unwrap().dpi, 144);
    assert_eq!(snap.page(2).unwrap().width_px, 29);
}

// ── Removal ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn removal_during_a_run_leaves_no_trace() {
    let (release, rx) = mpsc::channel();
    let hold = Arc::new(Hold {
        started: Notify::new(),
        release: Mutex::new(rx),
    });
    let backend = MockBackend {
        hold: Some(Arc::clone(&hold)),
        ..Default::default()
    };
    let rendered = Arc::clone(&backend.rendered);
    let c = coordinator(&config(72), backend, None);
    let id = add_one(&c, "pages=3 hold=2").await;

    let remover = async {
        hold.started.notified().await;
        assert!(c.remove(id));
        release.send(()).unwrap();
    };
    let (result, ()) = tokio::join!(c.convert(id, None), remover);

    assert!(matches!(result, Err(Pdf2ImgError::ProjectRemoved { .. })));
    assert!(c.snapshot(id).is_none());
    assert!(c.project_ids().is_empty());
    assert_eq!(*rendered.lock().unwrap(), vec![1, 2]);

    let next = add_one(&c, "pages=1").await;
    assert_ne!(next, id);
}

#[tokio::test]
async fn removal_while_loading_is_not_undone_by_the_load() {
    let (release, rx) = mpsc::channel();
    let hold = Arc::new(Hold {
        started: Notify::new(),
        release: Mutex::new(rx),
    });
    let backend = MockBackend {
        hold: Some(Arc::clone(&hold)),
        ..Default::default()
    };
    let c = coordinator(&config(72), backend, None);

    let remover = async {
        hold.started.notified().await;
        let held = c.project_ids()[0];
        assert_eq!(c.snapshot(held).unwrap().status, ProjectStatus::Loading);
        assert!(c.remove(held));
        release.send(()).unwrap();
        held
    };
    let (ids, held) = tokio::join!(
        c.add_files(vec![pdf("slow.pdf", "hold_open pages=2"), pdf("fast.pdf", "pages=1")]),
        remover
    );

    assert_eq!(ids[0], held);
    assert!(c.snapshot(held).is_none());
    assert_eq!(c.project_ids(), vec![ids[1]]);
    assert_eq!(c.active(), Some(ids[1]));
    assert!(matches!(
        c.convert(held, None).await,
        Err(Pdf2ImgError::UnknownProject { .. })
    ));
}

#[tokio::test]
async fn removing_the_active_project_activates_the_next() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let ids = c
        .add_files(vec![pdf("a.pdf", ""), pdf("b.pdf", ""), pdf("c.pdf", "")])
        .await;

    c.set_active(ids[1]).unwrap();
    assert!(c.remove(ids[1]));
    assert_eq!(c.active(), Some(ids[0]));
    assert!(!c.remove(ids[1]));
    assert!(c.set_active(ids[1]).is_err());
}

// ── Analysis ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_analysis_per_project() {
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .dpi(72)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let summarizer = Arc::new(ScriptedSummarizer::default());
    let c = coordinator(&cfg, MockBackend::default(), Some(Arc::clone(&summarizer)));
    let id = add_one(&c, "pages=3").await;

    c.convert(id, Some(PageSelection::Single(2))).await.unwrap();
    c.settle().await;
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);

    c.convert(id, Some(PageSelection::Range(1, 2))).await.unwrap();
    c.convert(id, None).await.unwrap();
    c.settle().await;

    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    let analysis = c.snapshot(id).unwrap().analysis.unwrap();
    assert_eq!(analysis.suggested_title, "Title 1");
    assert!(analysis.summary.contains("page 1"));
    assert_eq!(
        recorder.events().iter().filter(|e| **e == Event::Analysis).count(),
        1
    );
}

#[tokio::test]
async fn analysis_failure_is_swallowed() {
    let summarizer = Arc::new(ScriptedSummarizer {
        fail: true,
        ..Default::default()
    });
    let c = coordinator(&config(72), MockBackend::default(), Some(Arc::clone(&summarizer)));
    let id = add_one(&c, "pages=2").await;

    c.convert(id, None).await.unwrap();
    c.settle().await;

    let snap = c.snapshot(id).unwrap();
    assert_eq!(snap.status, ProjectStatus::Completed);
    assert!(snap.analysis.is_none());
    assert!(snap.error.is_none());
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn analysis_disabled_by_config() {
    let summarizer = Arc::new(ScriptedSummarizer::default());
    let cfg = ConversionConfig::builder().dpi(72).analysis(false).build().unwrap();
    let c = coordinator(&cfg, MockBackend::default(), Some(Arc::clone(&summarizer)));
    let id = add_one(&c, "pages=1").await;

    c.convert(id, None).await.unwrap();
    c.settle().await;
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    assert!(c.snapshot(id).unwrap().analysis.is_none());
}

#[tokio::test]
async fn late_analysis_for_removed_project_is_dropped() {
    let release = Arc::new(Notify::new());
    let summarizer = Arc::new(ScriptedSummarizer {
        release: Some(Arc::clone(&release)),
        ..Default::default()
    });
    let c = coordinator(&config(72), MockBackend::default(), Some(Arc::clone(&summarizer)));
    let id = add_one(&c, "pages=1").await;

    // The run completes while the summary is still pending.
    c.convert(id, None).await.unwrap();
    assert_eq!(c.snapshot(id).unwrap().status, ProjectStatus::Completed);
    assert!(c.snapshot(id).unwrap().analysis.is_none());

    assert!(c.remove(id));
    release.notify_one();
    c.settle().await;

    assert!(c.snapshot(id).is_none());
    assert!(c.snapshots().is_empty());
}

// ── Selection & export ───────────────────────────────────────────────────────

#[tokio::test]
async fn export_only_selected_pages() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let id = c.add_file(pdf("Quarterly.Report.pdf", "pages=4")).await.unwrap();
    c.convert(id, None).await.unwrap();

    assert!(c.export(id, true).await.unwrap().is_none());

    c.set_selection(id, &"2,4".parse().unwrap()).unwrap();
    let artifact = c.export(id, true).await.unwrap().expect("artifact");
    assert_eq!(artifact.file_name, "Quarterly.Report_converted.zip");

    let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
    assert_eq!(archive.len(), 2);
    let mut files: Vec<String> = archive.file_names().map(str::to_string).collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "Quarterly.Report_Export/Page_002.png",
            "Quarterly.Report_Export/Page_004.png"
        ]
    );

    let entry = archive
        .by_name("Quarterly.Report_Export/Page_004.png")
        .unwrap();
    assert!(entry.size() > 0);
    drop(entry);

    let all = c.export(id, false).await.unwrap().expect("artifact");
    assert_eq!(all.entries.len(), 4);
}

#[tokio::test]
async fn export_of_unconverted_project_is_empty() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let id = add_one(&c, "pages=2").await;
    assert!(c.export(id, false).await.unwrap().is_none());
    assert!(matches!(
        c.export(ProjectId::from_raw(999), false).await,
        Err(Pdf2ImgError::UnknownProject { .. })
    ));
}

#[tokio::test]
async fn selection_commands() {
    let c = coordinator(&config(72), MockBackend::default(), None);
    let id = add_one(&c, "pages=3").await;
    c.convert(id, Some(PageSelection::Range(1, 2))).await.unwrap();

    c.toggle_page(id, 3).unwrap();
    c.toggle_page(id, 1).unwrap();
    c.toggle_page(id, 3).unwrap();
    assert_eq!(c.snapshot(id).unwrap().selected_pages, vec![1]);
    assert!(c.toggle_page(id, 4).is_err());

    c.select_all(id).unwrap();
    assert_eq!(c.snapshot(id).unwrap().selected_pages, vec![1, 2]);

    c.clear_selection(id).unwrap();
    assert!(c.snapshot(id).unwrap().selected_pages.is_empty());

    let before = c.snapshot(id).unwrap();
    assert!(c.set_selection(id, &PageSelection::Range(2, 5)).is_err());
    assert_eq!(c.snapshot(id).unwrap(), before);
}
