//! Error types for the logo stamping library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the logo stamping library
///
/// Variants fall into four groups:
/// - configuration errors, which stop a batch before any file is touched
///   (see [`Error::is_configuration`]);
/// - read errors for a single PDF;
/// - page processing errors;
/// - write errors.
///
/// Only configuration errors escape [`crate::batch::run_batch`]; everything
/// else is recorded against the file that caused it.
#[derive(Error, Debug)]
pub enum Error {
    /// Source directory does not exist
    #[error("Source directory not found: {}", .0.display())]
    SourceDirNotFound(PathBuf),

    /// Source path exists but is not a directory
    #[error("Source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// No corner positions were requested
    #[error("At least one watermark corner must be selected")]
    NoCorners,

    /// Unrecognised corner name
    #[error("Invalid corner '{0}': expected top-left, top-right, bottom-left or bottom-right")]
    InvalidCorner(String),

    /// Opacity outside 0.0..=1.0
    #[error("Invalid opacity {0}: must be between 0.0 and 1.0")]
    InvalidOpacity(f32),

    /// Negative or non-finite margin
    #[error("Invalid margin {0}: must be a non-negative number of points")]
    InvalidMargin(f32),

    /// Logo file missing
    #[error("Logo image not found: {}", .0.display())]
    LogoNotFound(PathBuf),

    /// Logo file present but not decodable
    #[error("Failed to decode logo image {}: {source}", .path.display())]
    LogoDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A PDF could not be opened or parsed
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    /// Encrypted PDFs are not supported
    #[error("PDF is encrypted: {}", .0.display())]
    Encrypted(PathBuf),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),

    /// Page box with zero, negative or non-finite size
    #[error("Degenerate page size {width}x{height}")]
    DegeneratePage { width: f32, height: f32 },

    /// Overlay built for a different page size than the page it is merged onto
    #[error("Overlay is {overlay_width}x{overlay_height} but page is {page_width}x{page_height}")]
    OverlayMismatch {
        overlay_width: f32,
        overlay_height: f32,
        page_width: f32,
        page_height: f32,
    },

    /// Overlay construction or merge failed for one page
    #[error("Page {page}: {reason}")]
    Page { page: u32, reason: String },

    /// Output could not be written
    #[error("Failed to write {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid glob pattern built from the source directory
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),
}

impl Error {
    /// Whether this error invalidates the whole batch rather than one file
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::SourceDirNotFound(_)
                | Error::NotADirectory(_)
                | Error::NoCorners
                | Error::InvalidCorner(_)
                | Error::InvalidOpacity(_)
                | Error::InvalidMargin(_)
                | Error::LogoNotFound(_)
                | Error::LogoDecode { .. }
        )
    }

    pub(crate) fn page(page: u32, reason: impl Into<String>) -> Self {
        Error::Page {
            page,
            reason: reason.into(),
        }
    }
}
