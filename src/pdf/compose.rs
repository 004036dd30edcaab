//! Page composition: merging an overlay on top of an existing page using lopdf
//!
//! The overlay page is turned into a Form XObject inside the target document.
//! Its resources travel with the form, so names such as `/Im0` cannot clash
//! with the page's own resources. The original content is bracketed in `q`/`Q`
//! so any transformation it leaves behind does not move the overlay.

use std::collections::{BTreeSet, HashMap};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;
use crate::error::{Error, Result};
use crate::geometry::PageGeometry;
use crate::pdf::metadata::{inherited_attribute, resolve};
use crate::pdf::overlay::Overlay;

/// Base resource name for the overlay form on each page
const FORM_NAME: &str = "WmLogo";

/// Overlay resources already copied into one target document, keyed by the
/// builder that produced them
///
/// Every page stamped from the same [`OverlayBuilder`](crate::pdf::OverlayBuilder)
/// then shares a single copy of the logo image. A cache belongs to exactly one
/// target document.
#[derive(Debug, Default)]
pub struct ImportedResources {
    by_builder: HashMap<u64, Dictionary>,
}

impl ImportedResources {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Merge `overlay` on top of the page `page_id` of `doc`
///
/// `page` must be the geometry the overlay was built for. The overlay is
/// consumed; nothing of it outlives this call except the objects copied into
/// `doc`.
pub fn merge_overlay(
    doc: &mut Document,
    page_id: ObjectId,
    page: &PageGeometry,
    overlay: Overlay,
) -> Result<()> {
    merge_overlay_with(doc, page_id, page, overlay, &mut ImportedResources::new())
}

/// [`merge_overlay`], reusing resources already imported into `doc` through
/// `imported`
pub fn merge_overlay_with(
    doc: &mut Document,
    page_id: ObjectId,
    page: &PageGeometry,
    overlay: Overlay,
    imported: &mut ImportedResources,
) -> Result<()> {
    let size = overlay.geometry();
    if !size.same_size(page) {
        return Err(Error::OverlayMismatch {
            overlay_width: size.width,
            overlay_height: size.height,
            page_width: page.width,
            page_height: page.height,
        });
    }

    // 1. Copy the overlay's images and graphics states into the target document
    let resources = match imported.by_builder.get(&overlay.builder_id()) {
        Some(resources) => resources.clone(),
        None => {
            let resources = import_overlay_resources(doc, &overlay)?;
            imported
                .by_builder
                .insert(overlay.builder_id(), resources.clone());
            resources
        }
    };

    // 2. Wrap the overlay content in a Form XObject positioned at the page origin
    let content = overlay.document().get_page_content(overlay.page_id())?;
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page.width),
                Object::Real(page.height),
            ],
            "Matrix" => vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(page.x),
                Object::Real(page.y),
            ],
            "Resources" => resources,
        },
        content,
    ));

    // 3. Register the form with the page
    let name = add_xobject_to_page_resources(doc, page_id, form_id)?;

    // 4. Isolate the original content and draw the form after it
    let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    prepend_content_to_page(doc, page_id, save_id)?;

    let invoke = format!("\nQ\nq\n/{} Do\nQ\n", name);
    let invoke_id = doc.add_object(Stream::new(Dictionary::new(), invoke.into_bytes()));
    append_content_to_page(doc, page_id, invoke_id)?;

    debug!(?page_id, form = %name, "Merged overlay onto page");
    Ok(())
}

/// Copy every object reachable from the overlay page's Resources into `doc`
/// and return the Resources dictionary rewritten to the new IDs
fn import_overlay_resources(doc: &mut Document, overlay: &Overlay) -> Result<Dictionary> {
    let source = overlay.document();
    let page = source.get_dictionary(overlay.page_id())?;

    let resources = match page.get(b"Resources") {
        Ok(res) => resolve(source, res).as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };

    let mut reachable = BTreeSet::new();
    for (_, value) in resources.iter() {
        collect_references(source, value, &mut reachable);
    }

    // Build complete ID map first
    let id_map: HashMap<ObjectId, ObjectId> = reachable
        .iter()
        .map(|&old_id| (old_id, doc.new_object_id()))
        .collect();

    // Now copy the objects, renumbering references
    for (old_id, new_id) in &id_map {
        let object = source.get_object(*old_id)?;
        doc.objects
            .insert(*new_id, renumber_object_references(object, &id_map));
    }

    match renumber_object_references(&Object::Dictionary(resources), &id_map) {
        Object::Dictionary(dict) => Ok(dict),
        _ => Ok(Dictionary::new()),
    }
}

/// Gather the IDs of all indirect objects referenced from `object`
fn collect_references(doc: &Document, object: &Object, seen: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            if seen.insert(*id) {
                if let Ok(target) = doc.get_object(*id) {
                    collect_references(doc, target, seen);
                }
            }
        }
        Object::Array(items) => {
            for item in items {
                collect_references(doc, item, seen);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_references(doc, value, seen);
            }
        }
        _ => {}
    }
}

/// Renumber all object references in an object
fn renumber_object_references(object: &Object, id_map: &HashMap<ObjectId, ObjectId>) -> Object {
    match object {
        Object::Reference(old_id) => {
            Object::Reference(id_map.get(old_id).copied().unwrap_or(*old_id))
        }
        Object::Array(arr) => Object::Array(
            arr.iter()
                .map(|obj| renumber_object_references(obj, id_map))
                .collect(),
        ),
        Object::Dictionary(dict) => Object::Dictionary(renumber_dictionary(dict, id_map)),
        Object::Stream(stream) => {
            let mut stream = stream.clone();
            stream.dict = renumber_dictionary(&stream.dict, id_map);
            Object::Stream(stream)
        }
        _ => object.clone(),
    }
}

fn renumber_dictionary(dict: &Dictionary, id_map: &HashMap<ObjectId, ObjectId>) -> Dictionary {
    let mut new_dict = Dictionary::new();
    for (key, value) in dict.iter() {
        new_dict.set(key.clone(), renumber_object_references(value, id_map));
    }
    new_dict
}

/// Add an XObject to the page's Resources under an unused name
///
/// Inherited Resources are copied onto the page first so the page keeps every
/// font and image it had. Returns the name the XObject was registered as.
fn add_xobject_to_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    xobject_id: ObjectId,
) -> Result<String> {
    let mut resources = match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    let mut xobjects = match resources.get(b"XObject") {
        Ok(xo) => match resolve(doc, xo) {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let name = unused_name(&xobjects, FORM_NAME);
    xobjects.set(name.clone(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    // Set the Resources directly on the page (not as a reference)
    // so shared resource dictionaries of other pages stay untouched
    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Resources", Object::Dictionary(resources));

    Ok(name)
}

fn unused_name(dict: &Dictionary, base: &str) -> String {
    if !dict.has(base.as_bytes()) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !dict.has(candidate.as_bytes()))
        .unwrap_or_else(|| base.to_string())
}

/// Current Contents of a page as a flat list of stream references
///
/// A direct content stream is moved into its own object so it can share an
/// array with the streams we add. A reference to an array is replaced by the
/// array's items.
fn page_content_refs(doc: &mut Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let existing = doc.get_dictionary(page_id)?.get(b"Contents").ok().cloned();

    let refs = match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        Some(Object::Stream(stream)) => vec![Object::Reference(doc.add_object(stream))],
        _ => Vec::new(),
    };

    Ok(refs)
}

/// Prepend a content stream to a page's Contents
fn prepend_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = page_content_refs(doc, page_id)?;
    contents.insert(0, Object::Reference(new_content_id));

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Contents", Object::Array(contents));
    Ok(())
}

/// Append a content stream to a page's Contents
///
/// Appended content is drawn on top of the original content.
fn append_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = page_content_refs(doc, page_id)?;
    contents.push(Object::Reference(new_content_id));

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Contents", Object::Array(contents));
    Ok(())
}
