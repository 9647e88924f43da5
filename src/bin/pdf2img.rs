//! CLI binary for edgequake-pdf2img.
//!
//! A thin shim over the library crate: loads every input into one
//! `Coordinator`, converts them concurrently, then writes page images or zip
//! archives.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::pipeline::archive::document_base_name;
use edgequake_pdf2img::{
    ConversionConfig, ConversionProgressCallback, Coordinator, ImageFormat, InputFile,
    PageSelection, PdfiumBackend, ProgressCallback, ProjectId, ProjectSnapshot, ProjectStatus,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar per document, stacked in a [`MultiProgress`].
struct CliProgressCallback {
    multi: MultiProgress,
    names: Mutex<HashMap<ProjectId, String>>,
    bars: Mutex<HashMap<ProjectId, ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            names: Mutex::new(HashMap::new()),
            bars: Mutex::new(HashMap::new()),
        })
    }

    /// Remember the document name shown as the bar prefix.
    fn register(&self, id: ProjectId, name: &str) {
        self.names.lock().unwrap().insert(id, name.to_string());
    }

    fn name(&self, id: ProjectId) -> String {
        self.names
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, id: ProjectId, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:36.green/238}] {pos:>3}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = self.multi.add(ProgressBar::new(total_pages as u64));
        bar.set_style(style);
        bar.set_prefix(self.name(id));
        self.bars.lock().unwrap().insert(id, bar);
    }

    fn on_page_complete(&self, id: ProjectId, page_num: usize, _total: usize, progress: u8, reused: bool) {
        if let Some(bar) = self.bars.lock().unwrap().get(&id) {
            let note = if reused { " (cached)" } else { "" };
            bar.set_message(format!("page {page_num}{note}  {progress}%"));
            bar.inc(1);
        }
    }

    fn on_page_error(&self, id: ProjectId, page_num: usize, error: &str) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&id) {
            bar.abandon_with_message(red(&format!("page {page_num}: {error}")));
        }
    }

    fn on_conversion_complete(&self, id: ProjectId, converted: usize) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&id) {
            bar.finish_with_message(green(&format!("✓ {converted} rendered")));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every page of a document as 300 DPI PNGs in ./report/
  pdf2img report.pdf

  # Pages 1-5 and 10 as 150 DPI JPEGs
  pdf2img --dpi 150 --format jpeg --pages "1-5, 10" report.pdf

  # One zip per document
  pdf2img --zip -o exports/ a.pdf b.pdf c.pdf

  # Zip with only pages 2 and 4
  pdf2img --zip --selected 2,4 report.pdf

  # Page counts only, no rendering
  pdf2img --inspect-only *.pdf

  # Machine-readable results, no summary request
  pdf2img --json --no-analysis report.pdf > result.json

OUTPUT LAYOUT:
  images  <output-dir>/<name>/Page_<n>.<png|jpeg>
  --zip   <output-dir>/<name>_converted.zip
            └─ <name>_Export/Page_001.png, Page_002.png, …

DOCUMENT SUMMARY:
  After page 1 of a document is rendered, it is sent once to a vision model
  for a suggested title, a two-sentence summary and key points. Without a
  configured provider the summary is skipped; conversion is unaffected.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Convert PDF pages to PNG/JPEG images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Convert PDF pages to PNG/JPEG images and zip archives",
    long_about = "Convert the pages of one or more PDF documents to PNG or JPEG images at a \
chosen resolution, optionally packaged as one zip archive per document, with an optional \
first-page summary from a Vision Language Model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to convert. Non-PDF files are skipped.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output resolution (72–600).
    #[arg(long, env = "PDF2IMG_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Image format.
    #[arg(long, env = "PDF2IMG_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Page selection: all, 5, 3-15, 1,3,5 or 1-5,10.
    #[arg(long, env = "PDF2IMG_PAGES", default_value = "all")]
    pages: String,

    /// Directory for images or archives.
    #[arg(short, long, env = "PDF2IMG_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Write one zip archive per document instead of loose images.
    #[arg(long, env = "PDF2IMG_ZIP")]
    zip: bool,

    /// With --zip: only pack these pages (same syntax as --pages).
    #[arg(long, env = "PDF2IMG_SELECTED", requires = "zip")]
    selected: Option<String>,

    /// Print document metadata only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print results as JSON on stdout.
    #[arg(long, env = "PDF2IMG_JSON")]
    json: bool,

    /// Do not request a document summary.
    #[arg(long, env = "PDF2IMG_NO_ANALYSIS")]
    no_analysis: bool,

    /// LLM provider for the summary: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID for the summary (default: gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Disable progress bars.
    #[arg(long, env = "PDF2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMG_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// `--json` view of a project: everything except the image payloads.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectSummary<'a> {
    id: ProjectId,
    name: &'a str,
    total_pages: usize,
    status: ProjectStatus,
    progress: u8,
    pages: Vec<PageSummary>,
    analysis: Option<&'a edgequake_pdf2img::DocumentAnalysis>,
    error: Option<&'a str>,
    outputs: Vec<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageSummary {
    page_number: usize,
    width_px: u32,
    height_px: u32,
    format: ImageFormat,
    dpi: u32,
}

impl<'a> ProjectSummary<'a> {
    fn new(snapshot: &'a ProjectSnapshot, outputs: Vec<PathBuf>) -> Self {
        Self {
            id: snapshot.id,
            name: &snapshot.metadata.name,
            total_pages: snapshot.metadata.total_pages,
            status: snapshot.status,
            progress: snapshot.progress,
            pages: snapshot
                .pages
                .iter()
                .map(|p| PageSummary {
                    page_number: p.page_number,
                    width_px: p.width_px,
                    height_px: p.height_px,
                    format: p.format,
                    dpi: p.dpi,
                })
                .collect(),
            analysis: snapshot.analysis.as_ref(),
            error: snapshot.error.as_deref(),
            outputs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when progress bars are active;
    // the bars provide all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let backend = Arc::new(PdfiumBackend::new().context("PDF engine unavailable")?);

    // ── Read inputs ──────────────────────────────────────────────────────
    let mut files = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        match InputFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => eprintln!("{} {}", red("✗"), e),
        }
    }

    let progress_cb = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress_cb.clone().map(|cb| cb as ProgressCallback))?;
    let coordinator = Coordinator::new(&config, backend);

    let ids = coordinator.add_files(files).await;
    if ids.is_empty() {
        anyhow::bail!("No PDF among the inputs");
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let snapshots = coordinator.snapshots();
        if cli.json {
            let summaries: Vec<_> = snapshots
                .iter()
                .map(|s| ProjectSummary::new(s, Vec::new()))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&summaries).context("Failed to serialize metadata")?
            );
        } else {
            for s in &snapshots {
                println!("File:    {}", s.metadata.name);
                println!("Size:    {} bytes", s.metadata.byte_size);
                match &s.error {
                    Some(e) => println!("Error:   {}", e),
                    None => println!("Pages:   {}", s.metadata.total_pages),
                }
                println!();
            }
        }
        return Ok(());
    }

    for snapshot in coordinator.snapshots() {
        if let Some(ref cb) = progress_cb {
            cb.register(snapshot.id, &snapshot.metadata.name);
        }
        if let Some(ref e) = snapshot.error {
            eprintln!("{} {}  {}", red("✗"), bold(&snapshot.metadata.name), red(e));
        }
    }

    // ── Convert ──────────────────────────────────────────────────────────
    let pages: PageSelection = cli.pages.parse().context("Invalid --pages")?;
    let selected: Option<PageSelection> = cli
        .selected
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("Invalid --selected")?;

    let start = Instant::now();
    let ready: Vec<ProjectId> = coordinator
        .snapshots()
        .into_iter()
        .filter(|s| s.status == ProjectStatus::Idle)
        .map(|s| s.id)
        .collect();
    let runs = ready
        .iter()
        .map(|&id| coordinator.convert(id, Some(pages.clone())));
    let results = futures::future::join_all(runs).await;
    coordinator.settle().await;

    // ── Write outputs ────────────────────────────────────────────────────
    let mut outputs: HashMap<ProjectId, Vec<PathBuf>> = HashMap::new();
    for (&id, result) in ready.iter().zip(&results) {
        if let Err(e) = result {
            if !cli.json {
                eprintln!("{} {}", red("✗"), e);
            }
            continue;
        }
        let written = if cli.zip {
            if let Some(ref selection) = selected {
                coordinator
                    .set_selection(id, selection)
                    .context("Invalid --selected")?;
            }
            let artifact = coordinator
                .export(id, selected.is_some())
                .await
                .context("Export failed")?;
            match artifact {
                Some(zip) => vec![zip.write_to(&cli.output_dir).await?],
                None => Vec::new(),
            }
        } else {
            write_images(&coordinator, id, &cli.output_dir).await?
        };
        outputs.insert(id, written);
    }

    // ── Report ───────────────────────────────────────────────────────────
    let snapshots = coordinator.snapshots();
    if cli.json {
        let summaries: Vec<_> = snapshots
            .iter()
            .map(|s| ProjectSummary::new(s, outputs.remove(&s.id).unwrap_or_default()))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&summaries).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        for s in &snapshots {
            print_project(s, outputs.get(&s.id).map(Vec::as_slice).unwrap_or_default());
        }
        eprintln!("{}", dim(&format!("{}ms total", start.elapsed().as_millis())));
    }

    let failed = snapshots
        .iter()
        .filter(|s| s.status == ProjectStatus::Error)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} documents failed", failed, snapshots.len());
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .format(cli.format.into())
        .analysis(!cli.no_analysis && !cli.inspect_only);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write each converted page as `<dir>/<document>/Page_<n>.<ext>`.
async fn write_images(coordinator: &Coordinator, id: ProjectId, dir: &Path) -> Result<Vec<PathBuf>> {
    let snapshot = coordinator
        .snapshot(id)
        .with_context(|| format!("Project {id} disappeared"))?;
    let folder = dir.join(document_base_name(&snapshot.metadata.name));
    tokio::fs::create_dir_all(&folder)
        .await
        .with_context(|| format!("Failed to create {}", folder.display()))?;

    let mut written = Vec::with_capacity(snapshot.pages.len());
    for page in &snapshot.pages {
        let path = folder.join(page.file_name());
        tokio::fs::write(&path, page.decode()?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn print_project(s: &ProjectSnapshot, outputs: &[PathBuf]) {
    let mark = match s.status {
        ProjectStatus::Completed => green("✔"),
        ProjectStatus::Error => red("✘"),
        _ => cyan("◆"),
    };
    eprintln!(
        "{} {}  {}/{} pages",
        mark,
        bold(&s.metadata.name),
        s.pages.len(),
        s.metadata.total_pages
    );
    if let Some(ref e) = s.error {
        eprintln!("   {}", red(e));
    }
    if let Some(ref a) = s.analysis {
        eprintln!("   {} {}", cyan("Title:"), a.suggested_title);
        eprintln!("   {}", dim(&a.summary));
        for point in &a.key_points {
            eprintln!("   • {}", point);
        }
    }
    match outputs {
        [] => {}
        [single] => eprintln!("   → {}", single.display()),
        many => eprintln!(
            "   → {} files in {}",
            many.len(),
            many[0].parent().map(|p| p.display().to_string()).unwrap_or_default()
        ),
    }
}
