//! Logo candidate detection from edge structure
//!
//! grayscale -> 5x5 Gaussian -> Canny(50, 150) -> 3x3 dilation x2 ->
//! external contours -> area / aspect / edge-density heuristics.

use crate::error::{Result, WatermarkError};
use crate::region::{RegionType, WatermarkRegion};
use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::{edges, filter, morphology};

/// Padding added on each side of a logo box (normalized units)
pub const LOGO_PADDING: f32 = 0.005;

/// Sigma equivalent to a 5x5 Gaussian kernel with automatic sigma
pub(crate) const GAUSSIAN_5X5_SIGMA: f32 = 1.1;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Relative area bounds (exclusive) for logo candidates
const MIN_RELATIVE_AREA: f64 = 0.001;
const MAX_RELATIVE_AREA: f64 = 0.15;

/// Aspect ratio bounds (exclusive) for logo candidates
const MIN_ASPECT_RATIO: f64 = 0.2;
const MAX_ASPECT_RATIO: f64 = 5.0;

/// Measured properties of a contour that passed the shape filters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogoCandidate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Contour area divided by image area
    pub relative_area: f64,
    /// Fraction of Canny edge pixels inside the bounding box
    pub edge_density: f64,
}

impl LogoCandidate {
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            f64::from(self.width) / f64::from(self.height)
        }
    }

    #[must_use]
    pub fn confidence(&self) -> f32 {
        logo_confidence(self.relative_area, self.edge_density)
    }
}

/// Heuristic logo confidence: 0.5 base, +0.2 for edge density above 0.1,
/// +0.1 for relative area below 0.05, capped at 1.0
#[must_use]
pub fn logo_confidence(relative_area: f64, edge_density: f64) -> f32 {
    let mut confidence: f32 = 0.5;
    if edge_density > 0.1 {
        confidence += 0.2;
    }
    if relative_area < 0.05 {
        confidence += 0.1;
    }
    confidence.min(1.0)
}

/// Whether a contour's area and bounding box make it a plausible logo
#[must_use]
pub fn passes_shape_filters(relative_area: f64, aspect_ratio: f64) -> bool {
    relative_area > MIN_RELATIVE_AREA
        && relative_area < MAX_RELATIVE_AREA
        && aspect_ratio > MIN_ASPECT_RATIO
        && aspect_ratio < MAX_ASPECT_RATIO
}

/// Detect logo regions with confidence at or above `threshold`
///
/// # Errors
/// - Image too small for the edge pipeline
pub fn detect_logos(image: &RgbImage, threshold: f32) -> Result<Vec<WatermarkRegion>> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return Err(WatermarkError::processing(format!(
            "Image {width}x{height} is too small for logo detection"
        )));
    }

    let gray = image::imageops::grayscale(image);
    let candidates = find_logo_candidates(&gray);
    let (w, h) = (width as f32, height as f32);

    let regions = candidates
        .into_iter()
        .filter_map(|candidate| {
            let confidence = candidate.confidence();
            if confidence < threshold {
                return None;
            }
            let region = WatermarkRegion::new(
                candidate.x as f32 / w,
                candidate.y as f32 / h,
                candidate.width as f32 / w,
                candidate.height as f32 / h,
                confidence,
                RegionType::Logo,
            )
            .padded(LOGO_PADDING);
            Some(region)
        })
        .collect();

    Ok(regions)
}

/// Run the edge pipeline and return every contour that passes the shape filters
#[must_use]
pub fn find_logo_candidates(gray: &GrayImage) -> Vec<LogoCandidate> {
    let (width, height) = gray.dimensions();
    let image_area = f64::from(width) * f64::from(height);
    if image_area == 0.0 {
        return Vec::new();
    }

    let blurred = filter::gaussian_blur_f32(gray, GAUSSIAN_5X5_SIGMA);
    let edge_map = edges::canny(&blurred, CANNY_LOW, CANNY_HIGH);
    // 3x3 square kernel, two iterations
    let dilated = morphology::dilate(&edge_map, Norm::LInf, 2);

    find_contours::<u32>(&dilated)
        .iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let relative_area = contour_area(contour) / image_area;
            let (x, y, w, h) = bounding_rect(contour)?;
            let aspect_ratio = if h > 0 { f64::from(w) / f64::from(h) } else { 0.0 };
            if !passes_shape_filters(relative_area, aspect_ratio) {
                return None;
            }
            let roi = image::imageops::crop_imm(gray, x, y, w, h).to_image();
            Some(LogoCandidate {
                x,
                y,
                width: w,
                height: h,
                relative_area,
                edge_density: edge_density(&roi),
            })
        })
        .collect()
}

/// Fraction of Canny edge pixels in a grayscale patch
#[must_use]
pub fn edge_density(roi: &GrayImage) -> f64 {
    let total = u64::from(roi.width()) * u64::from(roi.height());
    if total == 0 {
        return 0.0;
    }
    let roi_edges = edges::canny(roi, CANNY_LOW, CANNY_HIGH);
    let edge_pixels = roi_edges.pixels().filter(|p| p.0[0] > 0).count() as u64;
    edge_pixels as f64 / total as f64
}

/// Polygon area of a contour (shoelace formula)
fn contour_area(contour: &Contour<u32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice_area.unsigned_abs() as f64 / 2.0
}

/// Inclusive pixel bounding box `(x, y, width, height)` of a contour
fn bounding_rect(contour: &Contour<u32>) -> Option<(u32, u32, u32, u32)> {
    let first = contour.points.first()?;
    let (x0, y0, x1, y1) = contour.points.iter().fold(
        (first.x, first.y, first.x, first.y),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    );
    Some((x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}
