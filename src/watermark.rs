//! Watermark configuration and logo decoding

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Corner;

/// Default opacity applied to every painted logo
pub const DEFAULT_OPACITY: f32 = 0.3;

/// Default distance from the page edges, in points
pub const DEFAULT_MARGIN: f32 = 0.0;

/// What to stamp and where, fixed for the duration of one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    /// Logo image file (PNG or JPEG)
    pub logo_path: PathBuf,
    /// Corners to paint the logo at
    pub corners: BTreeSet<Corner>,
    /// Global alpha in `0.0..=1.0`
    pub opacity: f32,
    /// Inset from the adjacent page edges, in points
    pub margin: f32,
}

impl WatermarkSpec {
    /// Spec with the default opacity and margin
    pub fn new(logo_path: impl Into<PathBuf>, corners: impl IntoIterator<Item = Corner>) -> Self {
        Self {
            logo_path: logo_path.into(),
            corners: corners.into_iter().collect(),
            opacity: DEFAULT_OPACITY,
            margin: DEFAULT_MARGIN,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Check everything except the logo file itself
    pub fn validate(&self) -> Result<()> {
        if self.corners.is_empty() {
            return Err(Error::NoCorners);
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(Error::InvalidOpacity(self.opacity));
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            return Err(Error::InvalidMargin(self.margin));
        }
        Ok(())
    }

    /// Decode the configured logo
    pub fn load_logo(&self) -> Result<Logo> {
        Logo::open(&self.logo_path)
    }
}

/// A decoded logo, split into colour and alpha planes for embedding
#[derive(Debug, Clone)]
pub struct Logo {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl Logo {
    /// Decode a PNG or JPEG logo from disk
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::LogoNotFound(path.to_path_buf()));
        }

        let image = image::open(path).map_err(|source| Error::LogoDecode {
            path: path.to_path_buf(),
            source,
        })?;

        let logo = Self::from_image(&image);
        debug!(
            path = %path.display(),
            width = logo.width,
            height = logo.height,
            has_alpha = logo.alpha.is_some(),
            "Decoded logo"
        );
        Ok(logo)
    }

    /// Split an already decoded image
    ///
    /// The alpha plane is dropped when every pixel is opaque.
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let pixel_count = (width as usize) * (height as usize);
        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);

        for pixel in rgba.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let alpha = if alpha.iter().all(|&a| a == u8::MAX) {
            None
        } else {
            Some(alpha)
        };

        Self {
            width,
            height,
            rgb,
            alpha,
        }
    }

    /// Width in pixels, painted as the same number of points
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels, painted as the same number of points
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    pub fn alpha(&self) -> Option<&[u8]> {
        self.alpha.as_deref()
    }
}
