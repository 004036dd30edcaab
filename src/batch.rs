//! Batch driver: watermark every PDF in a directory
//!
//! Each file moves through
//! `Pending → Reading → (GeneratingOverlay → Merging)* → Writing → Done | Failed`.
//! Failures are recorded against the file and the batch carries on; only
//! configuration problems abort the run.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use lopdf::Document;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::pdf::compose::{merge_overlay_with, ImportedResources};
use crate::pdf::metadata::page_geometry;
use crate::pdf::overlay::OverlayBuilder;
use crate::watermark::WatermarkSpec;

/// Name of the output subdirectory created inside the source directory
pub const OUTPUT_DIR_NAME: &str = "watermarked";

/// Suffix appended to the source file stem
pub const OUTPUT_SUFFIX: &str = "_watermarked";

/// Where a file was in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Pending,
    Reading,
    GeneratingOverlay { page: u32 },
    Merging { page: u32 },
    Writing,
}

impl FileStage {
    /// Failure category for an error raised in this stage
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            FileStage::Pending | FileStage::Reading => FailureKind::Read,
            FileStage::GeneratingOverlay { .. } | FileStage::Merging { .. } => FailureKind::Page,
            FileStage::Writing => FailureKind::Write,
        }
    }
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStage::Pending => write!(f, "pending"),
            FileStage::Reading => write!(f, "reading"),
            FileStage::GeneratingOverlay { page } => write!(f, "generating overlay for page {}", page),
            FileStage::Merging { page } => write!(f, "merging page {}", page),
            FileStage::Writing => write!(f, "writing"),
        }
    }
}

/// Broad category of a per-file failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The PDF could not be opened or parsed
    Read,
    /// Overlay construction or merge failed on a page
    Page,
    /// The output could not be written
    Write,
}

/// Terminal state of one source file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Done {
        output: PathBuf,
        pages: usize,
    },
    Failed {
        stage: FileStage,
        kind: FailureKind,
        reason: String,
    },
    /// Not processed because the batch was cancelled
    Skipped,
}

impl FileOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, FileOutcome::Done { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FileOutcome::Skipped)
    }
}

/// Outcome of every discovered file, keyed by filename
#[derive(Debug, Clone)]
pub struct BatchResult {
    output_dir: PathBuf,
    total: usize,
    outcomes: BTreeMap<String, FileOutcome>,
}

impl BatchResult {
    fn new(output_dir: PathBuf, total: usize) -> Self {
        Self {
            output_dir,
            total,
            outcomes: BTreeMap::new(),
        }
    }

    fn record(&mut self, filename: String, outcome: FileOutcome) {
        self.outcomes.insert(filename, outcome);
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of PDFs discovered
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of files with a recorded outcome
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, filename: &str) -> Option<&FileOutcome> {
        self.outcomes.get(filename)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_skipped()).count()
    }

    /// Filename and message of every failed file
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            FileOutcome::Failed { reason, .. } => Some((name.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Every file was watermarked
    pub fn is_success(&self) -> bool {
        self.succeeded() == self.total
    }
}

/// Receives progress from a running batch
///
/// All methods default to doing nothing.
pub trait BatchObserver {
    /// Called after each file reaches a terminal state
    fn on_progress(&mut self, _completed: usize, _total: usize) {}

    /// Called with each file's outcome, before the matching `on_progress`
    fn on_file_result(&mut self, _filename: &str, _outcome: &FileOutcome) {}

    /// Called once when the batch has finished
    fn on_batch_complete(&mut self, _result: &BatchResult) {}
}

/// Observer that ignores everything
impl BatchObserver for () {}

/// Cooperative cancellation flag shared between a batch and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop before the next file
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Output location for `source` inside `output_dir`
///
/// `report.pdf` becomes `report_watermarked.pdf`.
pub fn output_path_for(output_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{}{}.pdf", stem, OUTPUT_SUFFIX))
}

/// Pattern discovered files must match
const PDF_PATTERN: &str = "*.pdf";

/// PDF files directly inside `source_dir`, sorted by name
///
/// Matching is case-sensitive: `scan.PDF` is not picked up. Only file names
/// are matched, so the directory path itself may contain glob metacharacters
/// or be non-UTF-8.
pub fn discover_pdfs(source_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(PDF_PATTERN).map_err(|e| Error::InvalidGlob(e.to_string()))?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(path = %path.display(), "Skipping file with non-UTF-8 name");
            continue;
        };

        if pattern.matches_with(name, options) && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn validate_source_dir(source_dir: &Path) -> Result<()> {
    if !source_dir.exists() {
        return Err(Error::SourceDirNotFound(source_dir.to_path_buf()));
    }
    if !source_dir.is_dir() {
        return Err(Error::NotADirectory(source_dir.to_path_buf()));
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Attach the page number to errors raised while handling one page
fn in_page(page: u32, err: Error) -> Error {
    match err {
        Error::Page { .. } => err,
        other => Error::page(page, other.to_string()),
    }
}

/// Watermark one PDF, tracking the stage reached so failures can be classified
fn process_file(
    source: &Path,
    output: &Path,
    builder: &OverlayBuilder,
    stage: &mut FileStage,
) -> Result<usize> {
    *stage = FileStage::Reading;
    let mut doc = Document::load(source).map_err(|e| Error::Read {
        path: source.to_path_buf(),
        source: e,
    })?;

    if doc.is_encrypted() {
        return Err(Error::Encrypted(source.to_path_buf()));
    }

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::EmptyPdf(source.to_path_buf()));
    }
    let page_count = pages.len();
    let mut imported = ImportedResources::new();

    for (number, page_id) in pages {
        *stage = FileStage::GeneratingOverlay { page: number };
        let geometry = page_geometry(&doc, number, page_id)?;
        let overlay = builder.build(&geometry).map_err(|e| in_page(number, e))?;
        debug!(page = number, width = geometry.width, height = geometry.height, "Built overlay");

        *stage = FileStage::Merging { page: number };
        merge_overlay_with(&mut doc, page_id, &geometry, overlay, &mut imported)
            .map_err(|e| in_page(number, e))?;
    }

    *stage = FileStage::Writing;
    let written = doc.get_pages().len();
    if written != page_count {
        return Err(Error::Write {
            path: output.to_path_buf(),
            reason: format!("page count changed from {} to {}", page_count, written),
        });
    }

    // Serialize fully before touching the output so a failure leaves no partial file
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| Error::Write {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(output, buffer).map_err(|e| Error::Write {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(page_count)
}

/// Watermark a single PDF into `output`, returning its page count
///
/// # Example
///
/// ```no_run
/// use pdf_logo_stamp::batch::watermark_pdf;
/// use pdf_logo_stamp::geometry::Corner;
/// use pdf_logo_stamp::pdf::OverlayBuilder;
/// use pdf_logo_stamp::WatermarkSpec;
/// use std::path::Path;
///
/// let spec = WatermarkSpec::new("logo.png", [Corner::BottomRight]);
/// let logo = spec.load_logo().expect("Failed to load logo");
/// let builder = OverlayBuilder::new(&logo, &spec).expect("Invalid spec");
///
/// watermark_pdf(Path::new("input.pdf"), Path::new("output.pdf"), &builder)
///     .expect("Failed to watermark");
/// ```
pub fn watermark_pdf(source: &Path, output: &Path, builder: &OverlayBuilder) -> Result<usize> {
    let mut stage = FileStage::Pending;
    process_file(source, output, builder, &mut stage)
}

fn watermark_one(source: &Path, output_dir: &Path, builder: &OverlayBuilder) -> FileOutcome {
    let output = output_path_for(output_dir, source);
    let mut stage = FileStage::Pending;

    match process_file(source, &output, builder, &mut stage) {
        Ok(pages) => {
            info!(source = %source.display(), output = %output.display(), pages, "Watermarked PDF");
            FileOutcome::Done { output, pages }
        }
        Err(err) => {
            warn!(source = %source.display(), %stage, error = %err, "Failed to watermark PDF");
            FileOutcome::Failed {
                stage,
                kind: stage.failure_kind(),
                reason: err.to_string(),
            }
        }
    }
}

/// Watermark every PDF in `source_dir` into `source_dir/watermarked/`
///
/// # Example
///
/// ```no_run
/// use pdf_logo_stamp::{run_batch, WatermarkSpec};
/// use pdf_logo_stamp::geometry::Corner;
/// use std::path::Path;
///
/// let spec = WatermarkSpec::new("logo.png", [Corner::TopRight, Corner::BottomLeft]);
/// let result = run_batch(Path::new("handouts"), &spec, &mut ()).expect("Invalid configuration");
///
/// println!("{} of {} files watermarked", result.succeeded(), result.total());
/// ```
pub fn run_batch(
    source_dir: &Path,
    spec: &WatermarkSpec,
    observer: &mut dyn BatchObserver,
) -> Result<BatchResult> {
    run_batch_with_cancel(source_dir, spec, observer, &CancelToken::new())
}

/// [`run_batch`] with a token checked before each file
///
/// Files not started when the token is cancelled are recorded as
/// [`FileOutcome::Skipped`] and still count towards progress.
#[instrument(skip(spec, observer, cancel), fields(source = %source_dir.display()))]
pub fn run_batch_with_cancel(
    source_dir: &Path,
    spec: &WatermarkSpec,
    observer: &mut dyn BatchObserver,
    cancel: &CancelToken,
) -> Result<BatchResult> {
    // Configuration first: nothing on disk is touched until these pass
    validate_source_dir(source_dir)?;
    spec.validate()?;
    let logo = spec.load_logo()?;
    let builder = OverlayBuilder::new(&logo, spec)?;

    let files = discover_pdfs(source_dir)?;
    let output_dir = source_dir.join(OUTPUT_DIR_NAME);
    fs::create_dir_all(&output_dir)?;

    let total = files.len();
    info!(
        files = total,
        corners = ?spec.corners,
        opacity = spec.opacity,
        margin = spec.margin,
        "Starting batch"
    );

    let mut result = BatchResult::new(output_dir.clone(), total);
    let mut announced_cancel = false;

    for (index, path) in files.iter().enumerate() {
        let filename = file_label(path);

        let outcome = if cancel.is_cancelled() {
            if !announced_cancel {
                warn!(remaining = total - index, "Batch cancelled, skipping remaining files");
                announced_cancel = true;
            }
            FileOutcome::Skipped
        } else {
            debug!(file = %filename, "Processing");
            watermark_one(path, &output_dir, &builder)
        };

        observer.on_file_result(&filename, &outcome);
        result.record(filename, outcome);
        observer.on_progress(index + 1, total);
    }

    info!(
        succeeded = result.succeeded(),
        failed = result.failed(),
        skipped = result.skipped(),
        "Batch complete"
    );
    observer.on_batch_complete(&result);

    Ok(result)
}
