//! PDF Logo Stamp Library
//!
//! A cross-platform library for stamping a translucent logo onto every page of
//! every PDF in a folder. This library provides functionality to:
//! - Build a page-sized overlay carrying the logo at any of the four corners
//! - Merge that overlay on top of existing page content
//! - Run a whole directory as a batch with per-file outcomes, progress
//!   callbacks and cancellation
//! - Inspect page counts and page sizes
//!
//! # Example
//!
//! ```no_run
//! use pdf_logo_stamp::{run_batch, WatermarkSpec};
//! use pdf_logo_stamp::geometry::Corner;
//! use std::path::Path;
//!
//! let spec = WatermarkSpec::new("logo.png", [Corner::TopRight, Corner::BottomLeft])
//!     .with_margin(10.0);
//!
//! let result = run_batch(Path::new("handouts"), &spec, &mut ())
//!     .expect("Failed to start batch");
//!
//! for (name, reason) in result.failures() {
//!     eprintln!("{}: {}", name, reason);
//! }
//! ```

pub mod batch;
pub mod error;
pub mod geometry;
pub mod pdf;
pub mod watermark;

// Re-export commonly used items
pub use batch::{
    run_batch, run_batch_with_cancel, BatchObserver, BatchResult, CancelToken, FileOutcome,
};
pub use error::{Error, Result};
pub use geometry::{Corner, PageGeometry};
pub use watermark::{Logo, WatermarkSpec};
