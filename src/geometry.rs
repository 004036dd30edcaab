//! Page geometry and logo placement calculations
//!
//! All values are in PDF points with the PDF coordinate convention: origin at
//! the bottom-left of the page box, x to the right, y upward.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A page's MediaBox as origin plus size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Lower-left x of the MediaBox
    pub x: f32,
    /// Lower-left y of the MediaBox
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// Page box anchored at the origin
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    /// Build from a `[llx lly urx ury]` rectangle, normalising swapped corners
    pub fn from_rect(llx: f32, lly: f32, urx: f32, ury: f32) -> Self {
        Self {
            x: llx.min(urx),
            y: lly.min(ury),
            width: (urx - llx).abs(),
            height: (ury - lly).abs(),
        }
    }

    /// US Letter (8.5" × 11")
    pub fn letter() -> Self {
        Self::new(612.0, 792.0)
    }

    /// A4 (210mm × 297mm)
    pub fn a4() -> Self {
        Self::new(595.276, 841.89)
    }

    /// Width and height are finite and strictly positive
    pub fn is_valid(&self) -> bool {
        self.width.is_finite()
            && self.height.is_finite()
            && self.x.is_finite()
            && self.y.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Same width and height, ignoring the origin
    pub fn same_size(&self, other: &PageGeometry) -> bool {
        (self.width - other.width).abs() < 0.001 && (self.height - other.height).abs() < 0.001
    }
}

/// One of the four page corners a logo can be anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Canonical hyphenated name
    pub fn as_str(&self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }

    /// Lower-left corner of a `logo_width × logo_height` box anchored to this
    /// corner of a `page_width × page_height` page, `margin` points in from
    /// both adjacent edges
    pub fn origin(
        &self,
        page_width: f32,
        page_height: f32,
        logo_width: f32,
        logo_height: f32,
        margin: f32,
    ) -> (f32, f32) {
        let left = margin;
        let right = page_width - logo_width - margin;
        let bottom = margin;
        let top = page_height - logo_height - margin;

        match self {
            Corner::TopLeft => (left, top),
            Corner::TopRight => (right, top),
            Corner::BottomLeft => (left, bottom),
            Corner::BottomRight => (right, bottom),
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "top-left" | "tl" => Ok(Corner::TopLeft),
            "top-right" | "tr" => Ok(Corner::TopRight),
            "bottom-left" | "bl" => Ok(Corner::BottomLeft),
            "bottom-right" | "br" => Ok(Corner::BottomRight),
            _ => Err(Error::InvalidCorner(s.to_string())),
        }
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn top(&self) -> f32 {
        self.y + self.height
    }

    /// Interiors overlap; rectangles that only share an edge do not
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.top()
            && other.y < self.top()
    }

    /// Entirely inside `[0, width] × [0, height]`
    pub fn fits_within(&self, width: f32, height: f32) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= width && self.top() <= height
    }
}

/// Where one logo instance lands on an overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub corner: Corner,
    pub rect: Rect,
}

/// Compute the logo rectangle for each corner, in the order given
pub fn place_logos<'a>(
    corners: impl IntoIterator<Item = &'a Corner>,
    page: &PageGeometry,
    logo_width: f32,
    logo_height: f32,
    margin: f32,
) -> Vec<Placement> {
    corners
        .into_iter()
        .map(|corner| {
            let (x, y) = corner.origin(page.width, page.height, logo_width, logo_height, margin);
            Placement {
                corner: *corner,
                rect: Rect {
                    x,
                    y,
                    width: logo_width,
                    height: logo_height,
                },
            }
        })
        .collect()
}

/// Whether any two placements overlap
pub fn any_overlap(placements: &[Placement]) -> bool {
    placements.iter().enumerate().any(|(i, a)| {
        placements[i + 1..]
            .iter()
            .any(|b| a.rect.intersects(&b.rect))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_origins_without_margin() {
        let (w, h) = (612.0, 792.0);
        assert_eq!(Corner::TopLeft.origin(w, h, 100.0, 50.0, 0.0), (0.0, 742.0));
        assert_eq!(Corner::TopRight.origin(w, h, 100.0, 50.0, 0.0), (512.0, 742.0));
        assert_eq!(Corner::BottomLeft.origin(w, h, 100.0, 50.0, 0.0), (0.0, 0.0));
        assert_eq!(Corner::BottomRight.origin(w, h, 100.0, 50.0, 0.0), (512.0, 0.0));
    }

    #[test]
    fn test_corner_origins_with_margin() {
        let (w, h) = (612.0, 792.0);
        assert_eq!(Corner::TopLeft.origin(w, h, 100.0, 50.0, 10.0), (10.0, 732.0));
        assert_eq!(Corner::TopRight.origin(w, h, 100.0, 50.0, 10.0), (502.0, 732.0));
        assert_eq!(Corner::BottomLeft.origin(w, h, 100.0, 50.0, 10.0), (10.0, 10.0));
        assert_eq!(Corner::BottomRight.origin(w, h, 100.0, 50.0, 10.0), (502.0, 10.0));
    }

    #[test]
    fn test_corner_parsing() {
        assert_eq!("top-left".parse::<Corner>().unwrap(), Corner::TopLeft);
        assert_eq!("top_right".parse::<Corner>().unwrap(), Corner::TopRight);
        assert_eq!("BL".parse::<Corner>().unwrap(), Corner::BottomLeft);
        assert_eq!(" Bottom-Right ".parse::<Corner>().unwrap(), Corner::BottomRight);
        assert!(matches!("middle".parse::<Corner>(), Err(Error::InvalidCorner(_))));
    }

    #[test]
    fn test_corner_display_round_trips() {
        for corner in Corner::ALL {
            assert_eq!(corner.to_string().parse::<Corner>().unwrap(), corner);
        }
    }

    #[test]
    fn test_four_corners_do_not_overlap_for_small_logo() {
        let page = PageGeometry::letter();
        let placements = place_logos(Corner::ALL.iter(), &page, 100.0, 50.0, 0.0);
        assert_eq!(placements.len(), 4);
        assert!(!any_overlap(&placements));
        for p in &placements {
            assert!(p.rect.fits_within(page.width, page.height));
        }
    }

    #[test]
    fn test_large_logo_overlaps() {
        let page = PageGeometry::new(200.0, 200.0);
        let placements = place_logos(Corner::ALL.iter(), &page, 150.0, 150.0, 0.0);
        assert!(any_overlap(&placements));
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let a = Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = Rect { x: 10.0, y: 0.0, width: 10.0, height: 10.0 };
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_geometry_from_swapped_rect() {
        let g = PageGeometry::from_rect(612.0, 792.0, 0.0, 0.0);
        assert_eq!(g, PageGeometry::letter());
    }

    #[test]
    fn test_degenerate_geometry_is_invalid() {
        assert!(!PageGeometry::new(0.0, 792.0).is_valid());
        assert!(!PageGeometry::new(612.0, f32::NAN).is_valid());
        assert!(PageGeometry::a4().is_valid());
    }
}
