//! PDF metadata and page geometry extraction

use std::path::Path;
use lopdf::{Dictionary, Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::geometry::PageGeometry;

/// Guard against cyclic Parent chains in malformed page trees
const MAX_TREE_DEPTH: usize = 64;

/// Follow a reference to the object it points at
///
/// Direct objects and dangling references are returned unchanged.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

/// Look up a page attribute, walking up the page tree for inheritable keys
/// such as `MediaBox` and `Resources`
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node_id = page_id;

    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(node_id).ok()?;

        if let Ok(value) = node.get(key) {
            return Some(resolve(doc, value));
        }

        node_id = node.get(b"Parent").ok()?.as_reference().ok()?;
    }

    None
}

/// Read the effective MediaBox of a page
///
/// `page_number` is only used for error messages.
pub fn page_geometry(doc: &Document, page_number: u32, page_id: ObjectId) -> Result<PageGeometry> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .ok_or_else(|| Error::page(page_number, "page has no MediaBox"))?;

    let values = media_box
        .as_array()
        .map_err(|_| Error::page(page_number, "MediaBox is not an array"))?;

    if values.len() != 4 {
        return Err(Error::page(
            page_number,
            format!("MediaBox has {} entries, expected 4", values.len()),
        ));
    }

    let mut coords = [0.0f32; 4];
    for (slot, value) in coords.iter_mut().zip(values) {
        *slot = resolve(doc, value)
            .as_float()
            .map_err(|_| Error::page(page_number, "MediaBox entry is not a number"))?;
    }

    let geometry = PageGeometry::from_rect(coords[0], coords[1], coords[2], coords[3]);
    if !geometry.is_valid() {
        return Err(Error::page(
            page_number,
            format!(
                "degenerate page size {}x{}",
                geometry.width, geometry.height
            ),
        ));
    }

    Ok(geometry)
}

/// Geometry of every page, in page order
pub fn page_geometries(doc: &Document) -> Result<Vec<PageGeometry>> {
    doc.get_pages()
        .into_iter()
        .map(|(number, id)| page_geometry(doc, number, id))
        .collect()
}

/// Count pages by reading the Count field from the Pages dictionary
/// This is more reliable than get_pages() which doesn't handle nested page trees
fn count_pages_from_catalog(doc: &Document) -> Result<usize> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)?;

    let catalog: &Dictionary = doc.get_dictionary(catalog_id)?;
    let pages_id = catalog.get(b"Pages").and_then(Object::as_reference)?;
    let pages: &Dictionary = doc.get_dictionary(pages_id)?;

    let count = resolve(doc, pages.get(b"Count")?).as_i64()?;
    Ok(count.max(0) as usize)
}

fn load(path: &Path) -> Result<Document> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    Document::load(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// MediaBox of each page, in page order
    pub pages: Vec<PageGeometry>,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

fn info_string(doc: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = resolve(doc, info.get(key).ok()?).as_str().ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    let doc = load(path)?;

    let pages = page_geometries(&doc)?;
    if pages.is_empty() {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .map(|obj| resolve(&doc, obj))
        .and_then(|obj| obj.as_dict().ok());

    let (title, author) = match info {
        Some(info) => (
            info_string(&doc, info, b"Title"),
            info_string(&doc, info, b"Author"),
        ),
        None => (None, None),
    };

    Ok(PdfMetadata {
        page_count: pages.len(),
        pages,
        title,
        author,
    })
}

/// Count the number of pages in a PDF file
///
/// This is a quick operation that reads the Count field from the Pages dictionary.
pub fn count_pages(path: &Path) -> Result<usize> {
    let doc = load(path)?;
    let page_count = count_pages_from_catalog(&doc)?;

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count)
}
