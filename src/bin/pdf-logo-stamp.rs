//! PDF Logo Stamp CLI tool
//!
//! A command-line tool for stamping a logo onto every PDF in a folder.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pdf_logo_stamp::batch::{run_batch, BatchObserver, BatchResult, FileOutcome};
use pdf_logo_stamp::pdf::extract_metadata;
use pdf_logo_stamp::watermark::{DEFAULT_MARGIN, DEFAULT_OPACITY};
use pdf_logo_stamp::{Corner, WatermarkSpec};

/// PDF Logo Stamp - Watermark a folder of PDFs with a logo
#[derive(Parser)]
#[command(name = "pdf-logo-stamp")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Stamp logo.png in the top-right corner of every PDF in ./handouts
    pdf-logo-stamp stamp handouts --corner top-right

    # Stamp a custom logo in two corners, 10pt in from the edges
    pdf-logo-stamp stamp handouts --logo brand.png --corner tl,br --margin 10

    # Show page sizes of a PDF
    pdf-logo-stamp info handouts/watermarked/intro_watermarked.pdf")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark every PDF in a directory into <DIR>/watermarked/
    Stamp {
        /// Directory containing the PDF files
        dir: PathBuf,

        /// Logo image (PNG or JPEG), painted at its pixel size in points
        #[arg(long, default_value = "logo.png")]
        logo: PathBuf,

        /// Corner(s) to stamp: top-left, top-right, bottom-left, bottom-right
        /// (or tl, tr, bl, br). Repeat or separate with commas.
        #[arg(short, long = "corner", required = true, value_delimiter = ',', value_parser = parse_corner)]
        corners: Vec<Corner>,

        /// Logo opacity between 0.0 and 1.0
        #[arg(long, default_value_t = DEFAULT_OPACITY)]
        opacity: f32,

        /// Distance from the page edges in points
        #[arg(long, default_value_t = DEFAULT_MARGIN)]
        margin: f32,
    },

    /// Show information about a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn parse_corner(s: &str) -> Result<Corner, String> {
    s.parse::<Corner>().map_err(|e| e.to_string())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stamp { dir, logo, corners, opacity, margin } => {
            cmd_stamp(dir, logo, corners, opacity, margin)
        }
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Prints per-file status lines to stderr
struct ConsoleProgress;

impl BatchObserver for ConsoleProgress {
    fn on_file_result(&mut self, filename: &str, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Done { output, pages } => {
                eprintln!("  ✓ {} ({} pages) -> {}", filename, pages, output.display());
            }
            FileOutcome::Failed { reason, .. } => {
                eprintln!("  ✗ {}: {}", filename, reason);
            }
            FileOutcome::Skipped => {
                eprintln!("  - {} skipped", filename);
            }
        }
    }

    fn on_progress(&mut self, completed: usize, total: usize) {
        eprintln!("[{}/{}]", completed, total);
    }

    fn on_batch_complete(&mut self, result: &BatchResult) {
        eprintln!(
            "Done: {} succeeded, {} failed, {} skipped (of {})",
            result.succeeded(),
            result.failed(),
            result.skipped(),
            result.total()
        );
    }
}

/// Watermark every PDF in a directory
fn cmd_stamp(
    dir: PathBuf,
    logo: PathBuf,
    corners: Vec<Corner>,
    opacity: f32,
    margin: f32,
) -> anyhow::Result<()> {
    let spec = WatermarkSpec::new(logo, corners)
        .with_opacity(opacity)
        .with_margin(margin);

    eprintln!("Stamping PDFs in {}...", dir.display());

    let result = run_batch(&dir, &spec, &mut ConsoleProgress)
        .with_context(|| format!("Cannot watermark {}", dir.display()))?;

    if result.total() == 0 {
        eprintln!("No PDF files found in {}", dir.display());
        return Ok(());
    }

    eprintln!("Output: {}", result.output_dir().display());

    if result.failed() > 0 {
        bail!("{} of {} files failed", result.failed(), result.total());
    }

    Ok(())
}

/// Show information about a PDF
fn cmd_info(input: PathBuf) -> anyhow::Result<()> {
    let metadata = extract_metadata(&input)
        .with_context(|| format!("Cannot inspect {}", input.display()))?;

    println!("File: {}", input.display());
    println!("Pages: {}", metadata.page_count);

    for (i, page) in metadata.pages.iter().enumerate() {
        println!("  Page {}: {} x {} pt", i + 1, page.width, page.height);
    }

    if let Some(title) = metadata.title {
        println!("Title: {}", title);
    }
    if let Some(author) = metadata.author {
        println!("Author: {}", author);
    }

    Ok(())
}
