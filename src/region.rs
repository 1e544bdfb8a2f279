//! Rectangular image regions
//!
//! Detectors report boxes in either pixel or normalized (0..1) coordinates,
//! possibly hanging off the image. Everything downstream works on
//! [`BoundingBox`], which is always integral and inside the image.

use serde::{Deserialize, Serialize};

/// Pixel-space rectangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate (left)
    pub x: u32,
    /// Y coordinate (top)
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the right edge (exclusive)
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Get the bottom edge (exclusive)
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether the pixel lies inside this box
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && (px as u64) < self.right() && py >= self.y && (py as u64) < self.bottom()
    }

    /// Whether the box lies fully inside `[0, width) x [0, height)`
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Whether both sides reach `min_size`
    pub fn meets_min_size(&self, min_size: u32) -> bool {
        self.width >= min_size && self.height >= min_size && self.width > 0 && self.height > 0
    }

    /// Intersect with the image bounds; `None` when nothing is left
    pub fn clip(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let right = self.right().min(width as u64);
        let bottom = self.bottom().min(height as u64);

        if right <= self.x as u64 || bottom <= self.y as u64 {
            return None;
        }

        Some(BoundingBox {
            x: self.x,
            y: self.y,
            width: (right - self.x as u64) as u32,
            height: (bottom - self.y as u64) as u32,
        })
    }
}

/// Coordinate system of a raw detector box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coordinates {
    /// Absolute pixels
    #[default]
    Pixel,
    /// Fractions of image width/height
    Normalized,
}

/// Box as reported by a detector, before clipping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub coordinates: Coordinates,
}

impl RawBox {
    pub fn pixel(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            coordinates: Coordinates::Pixel,
        }
    }

    pub fn normalized(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            coordinates: Coordinates::Normalized,
        }
    }

    /// Convert to pixels and clip to the image
    ///
    /// Edges are expanded outward to whole pixels (floor on the near side,
    /// ceil on the far side) so a fractional box never loses coverage.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let values = [self.x, self.y, self.width, self.height];
        if values.iter().any(|v| !v.is_finite()) || self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }

        let (sx, sy) = match self.coordinates {
            Coordinates::Pixel => (1.0, 1.0),
            Coordinates::Normalized => (width as f64, height as f64),
        };

        let left = (self.x * sx).floor().max(0.0);
        let top = (self.y * sy).floor().max(0.0);
        let right = ((self.x + self.width) * sx).ceil().min(width as f64);
        let bottom = ((self.y + self.height) * sy).ceil().min(height as f64);

        if right <= left || bottom <= top {
            return None;
        }

        BoundingBox::new(
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .clip(width, height)
    }
}
