//! Overlay creation: a single blank page carrying the logo at each requested corner
//!
//! The overlay is an in-memory `lopdf` document whose only page has exactly the
//! size of the page it will be merged onto. The logo is embedded once as an
//! image XObject (with an SMask when it has transparency) and painted at every
//! placement under an ExtGState that carries the opacity.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::geometry::{any_overlap, place_logos, Corner, PageGeometry, Placement};
use crate::watermark::{Logo, WatermarkSpec};

/// Resource name of the logo image inside the overlay
const IMAGE_NAME: &str = "Im0";

/// Resource name of the opacity graphics state inside the overlay
const GSTATE_NAME: &str = "GS0";

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(0);

/// Builds page-sized overlays for one logo and one set of corners
///
/// The logo is compressed once when the builder is created; each call to
/// [`OverlayBuilder::build`] only clones the encoded streams.
#[derive(Debug, Clone)]
pub struct OverlayBuilder {
    /// Shared by every overlay this builder produces; their resources are identical
    id: u64,
    image: Stream,
    smask: Option<Stream>,
    logo_width: f32,
    logo_height: f32,
    corners: Vec<Corner>,
    opacity: f32,
    margin: f32,
}

impl OverlayBuilder {
    pub fn new(logo: &Logo, spec: &WatermarkSpec) -> Result<Self> {
        spec.validate()?;

        let (image, smask) = encode_logo(logo)?;

        Ok(Self {
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            image,
            smask,
            logo_width: logo.width() as f32,
            logo_height: logo.height() as f32,
            corners: spec.corners.iter().copied().collect(),
            opacity: spec.opacity,
            margin: spec.margin,
        })
    }

    /// Create an overlay sized exactly to `geometry`
    ///
    /// Only the size of `geometry` is used here; its origin is applied by the
    /// compositor when the overlay is merged.
    #[instrument(level = "debug", skip(self), fields(width = geometry.width, height = geometry.height))]
    pub fn build(&self, geometry: &PageGeometry) -> Result<Overlay> {
        if !geometry.is_valid() {
            return Err(Error::DegeneratePage {
                width: geometry.width,
                height: geometry.height,
            });
        }

        if self.logo_width > geometry.width || self.logo_height > geometry.height {
            // Drawn at native size; the page box clips whatever falls outside.
            warn!(
                logo_width = self.logo_width,
                logo_height = self.logo_height,
                page_width = geometry.width,
                page_height = geometry.height,
                "Logo is larger than the page and will be clipped"
            );
        }

        let placements = place_logos(
            &self.corners,
            geometry,
            self.logo_width,
            self.logo_height,
            self.margin,
        );

        if any_overlap(&placements) {
            debug!("Logo placements overlap on this page size");
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let image_id = match &self.smask {
            Some(smask) => {
                let smask_id = doc.add_object(smask.clone());
                let mut image = self.image.clone();
                image.dict.set("SMask", Object::Reference(smask_id));
                doc.add_object(image)
            }
            None => doc.add_object(self.image.clone()),
        };

        let gstate_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(self.opacity),
            "CA" => Object::Real(self.opacity),
        });

        let content = overlay_content(&placements);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.width),
                Object::Real(geometry.height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    IMAGE_NAME => image_id,
                },
                "ExtGState" => dictionary! {
                    GSTATE_NAME => gstate_id,
                },
            },
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        Ok(Overlay {
            builder_id: self.id,
            document: doc,
            page_id,
            geometry: *geometry,
            placements,
        })
    }
}

/// One page-sized watermark layer, consumed by the compositor
#[derive(Debug)]
pub struct Overlay {
    builder_id: u64,
    document: Document,
    page_id: ObjectId,
    geometry: PageGeometry,
    placements: Vec<Placement>,
}

impl Overlay {
    /// Geometry of the page this overlay was built for
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Logo rectangles, in overlay coordinates
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_id(&self) -> ObjectId {
        self.page_id
    }

    pub(crate) fn builder_id(&self) -> u64 {
        self.builder_id
    }

    /// Serialize the overlay as a standalone one-page PDF
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut doc = self.document.clone();
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }
}

/// Content stream painting the logo at every placement under the opacity state
fn overlay_content(placements: &[Placement]) -> String {
    let mut content = format!("q\n/{} gs\n", GSTATE_NAME);

    for placement in placements {
        let rect = &placement.rect;
        content.push_str(&format!(
            "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
            rect.width, rect.height, rect.x, rect.y, IMAGE_NAME
        ));
    }

    content.push_str("Q\n");
    content
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Encode the logo as a Flate RGB image plus an optional DeviceGray soft mask
fn encode_logo(logo: &Logo) -> Result<(Stream, Option<Stream>)> {
    let width = logo.width() as i64;
    let height = logo.height() as i64;

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        deflate(logo.rgb())?,
    )
    .with_compression(false);

    let smask = match logo.alpha() {
        Some(alpha) => Some(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(alpha)?,
            )
            .with_compression(false),
        ),
        None => None,
    };

    Ok((image, smask))
}
