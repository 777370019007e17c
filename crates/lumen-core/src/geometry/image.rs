//! Raster buffers exchanged with image and segmentation models.

use crate::error::{LumenError, Result};

/// A packed 8-bit RGB image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[u8; 3]>,
}

impl RgbImage {
    /// Image filled with a single color.
    pub fn filled(width: usize, height: usize, color: [u8; 3]) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }
}

/// A binary per-pixel mask, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub bits: Vec<bool>,
}

impl Mask {
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    /// Build a mask from a predicate over pixel coordinates.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    /// Check that the bit buffer matches the declared dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.bits.len() != self.width * self.height {
            return Err(LumenError::invalid_geometry(format!(
                "mask is {}x{} but holds {} pixels",
                self.width,
                self.height,
                self.bits.len()
            )));
        }
        Ok(())
    }

    /// Number of set pixels.
    pub fn area(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

/// Per-pixel index of the visible mesh face, `-1` for background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceIdMap {
    pub width: usize,
    pub height: usize,
    pub ids: Vec<i32>,
}

impl FaceIdMap {
    pub const BACKGROUND: i32 = -1;

    pub fn background(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ids: vec![Self::BACKGROUND; width * height],
        }
    }

    /// Faces visible under `mask`, deduplicated, background ignored.
    ///
    /// Pixels outside the overlap of the two rasters are ignored.
    pub fn faces_under(&self, mask: &Mask) -> Vec<usize> {
        let width = self.width.min(mask.width);
        let height = self.height.min(mask.height);
        let mut faces = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if !mask.bits.get(y * mask.width + x).copied().unwrap_or(false) {
                    continue;
                }
                match self.ids.get(y * self.width + x) {
                    Some(&id) if id >= 0 => faces.push(id as usize),
                    _ => {}
                }
            }
        }
        faces.sort_unstable();
        faces.dedup();
        faces
    }
}
