//! Watermark region model shared by the detector and the inpainter
//!
//! Regions are normalized rectangles: `x`, `y`, `width` and `height` are
//! fractions of the image dimensions. Construction does not clamp; callers
//! that derive regions from pixel data clamp to `[0, 1]` themselves.

use serde::{Deserialize, Serialize};

/// Kind of watermark a region was flagged as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    /// Text found by OCR
    #[default]
    Text,
    /// Compact high-edge-density shape
    Logo,
    /// Repeating or tiled pattern
    Pattern,
}

impl std::fmt::Display for RegionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Logo => write!(f, "logo"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// A normalized rectangular area flagged as a probable watermark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detection confidence in `[0, 1]`
    #[serde(default)]
    pub confidence: f32,
    /// Recognized text, for OCR detections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub region_type: RegionType,
}

impl WatermarkRegion {
    /// Create a region without text
    #[must_use]
    pub fn new(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        confidence: f32,
        region_type: RegionType,
    ) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            text: None,
            region_type,
        }
    }

    /// Create a region from normalized corner coordinates
    #[must_use]
    pub fn from_corners(
        x_min: f32,
        y_min: f32,
        x_max: f32,
        y_max: f32,
        confidence: f32,
        region_type: RegionType,
    ) -> Self {
        Self::new(
            x_min,
            y_min,
            (x_max - x_min).max(0.0),
            (y_max - y_min).max(0.0),
            confidence,
            region_type,
        )
    }

    /// Attach recognized text
    #[must_use]
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Right edge (`x + width`)
    #[must_use]
    pub fn x_max(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge (`y + height`)
    #[must_use]
    pub fn y_max(&self) -> f32 {
        self.y + self.height
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Whether every coordinate lies within `[0, 1]` and the rectangle fits the image
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        let unit = 0.0..=1.0;
        unit.contains(&self.x)
            && unit.contains(&self.y)
            && unit.contains(&self.width)
            && unit.contains(&self.height)
            && unit.contains(&self.confidence)
            && self.x_max() <= 1.0 + f32::EPSILON
            && self.y_max() <= 1.0 + f32::EPSILON
    }

    /// Intersection over Union with another region
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.x_max().min(other.x_max());
        let y2 = self.y_max().min(other.y_max());

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Merge two regions into their tight bounding union
    ///
    /// Confidence is the max of both, text prefers `self`, and the type comes
    /// from whichever region has the strictly higher confidence (`other` on ties).
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let x_min = self.x.min(other.x);
        let y_min = self.y.min(other.y);
        let x_max = self.x_max().max(other.x_max());
        let y_max = self.y_max().max(other.y_max());

        let region_type = if self.confidence > other.confidence {
            self.region_type
        } else {
            other.region_type
        };

        Self {
            x: x_min,
            y: y_min,
            width: x_max - x_min,
            height: y_max - y_min,
            confidence: self.confidence.max(other.confidence),
            text: self
                .text
                .as_ref()
                .filter(|t| !t.is_empty())
                .or(other.text.as_ref())
                .cloned(),
            region_type,
        }
    }

    /// Expand by `padding` on each side and clamp to the unit square
    #[must_use]
    pub fn padded(&self, padding: f32) -> Self {
        let x_min = (self.x - padding).max(0.0);
        let y_min = (self.y - padding).max(0.0);
        let x_max = (self.x_max() + padding).min(1.0);
        let y_max = (self.y_max() + padding).min(1.0);

        Self {
            x: x_min,
            y: y_min,
            width: (x_max - x_min).max(0.0),
            height: (y_max - y_min).max(0.0),
            confidence: self.confidence,
            text: self.text.clone(),
            region_type: self.region_type,
        }
    }

    /// Integer pixel bounds `(x1, y1, x2, y2)` clamped to the image, `x2`/`y2` exclusive
    #[must_use]
    pub fn to_pixel_bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = width as f32;
        let h = height as f32;
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;

        // Truncation toward zero matches integer pixel addressing
        let x1 = (self.x * w).trunc().clamp(0.0, max_x) as u32;
        let y1 = (self.y * h).trunc().clamp(0.0, max_y) as u32;
        let x2 = (self.x_max() * w).trunc().clamp(0.0, w) as u32;
        let y2 = (self.y_max() * h).trunc().clamp(0.0, h) as u32;

        (x1, y1, x2, y2)
    }
}
