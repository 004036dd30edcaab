//! PDF manipulation module

pub mod compose;
pub mod metadata;
pub mod overlay;

// Re-export commonly used items
pub use compose::{merge_overlay, merge_overlay_with, ImportedResources};
pub use metadata::{count_pages, extract_metadata, page_geometries, page_geometry, PdfMetadata};
pub use overlay::{Overlay, OverlayBuilder};
