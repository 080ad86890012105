//! Per-component multi-pass inpainting
//!
//! Every connected component of the mask is filled on its own crop, with
//! enough surrounding context for the classical fills:
//! 1. Telea fill of the whole component
//! 2. diffusion refinement of the eroded component centre
//! 3. distance-weighted blend of a blurred copy, so interiors are smooth
//!    while boundaries keep the sharper fill

use super::navier_stokes::inpaint_navier_stokes;
use super::telea::inpaint_telea;
use crate::detection::logo::GAUSSIAN_5X5_SIGMA;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::region_labelling::{connected_components, Connectivity};
use imageproc::{filter, morphology};

/// Minimum context padding around a component, in pixels
const MIN_CONTEXT_PADDING: u32 = 20;

/// Context padding as a fraction of the component's longer side
const CONTEXT_PADDING_RATIO: f32 = 0.3;

const FIRST_PASS_RADIUS: u32 = 3;
const REFINE_PASS_RADIUS: u32 = 2;

/// Bounding box of one mask component, `x1`/`y1` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentBounds {
    pub label: u32,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl ComponentBounds {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    /// Context padding for this component: `max(20, 0.3 * longer side)`
    #[must_use]
    pub fn context_padding(&self) -> u32 {
        let longer = self.width().max(self.height());
        MIN_CONTEXT_PADDING.max((longer as f32 * CONTEXT_PADDING_RATIO) as u32)
    }

    /// Padded crop rectangle `(x, y, width, height)` clamped to the image
    #[must_use]
    pub fn padded_crop(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let padding = self.context_padding();
        let x = self.x0.saturating_sub(padding);
        let y = self.y0.saturating_sub(padding);
        let x_end = (self.x1 + padding).min(image_width);
        let y_end = (self.y1 + padding).min(image_height);
        (x, y, x_end - x, y_end - y)
    }
}

/// Per-pixel component labels, 0 for background
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Label the mask's 8-connected components and return their bounds in label order
#[must_use]
pub fn mask_components(mask: &GrayImage) -> (Vec<ComponentBounds>, LabelImage) {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut bounds: Vec<ComponentBounds> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let slot = label as usize - 1;
        if slot >= bounds.len() {
            bounds.resize(
                slot + 1,
                ComponentBounds {
                    label: 0,
                    x0: u32::MAX,
                    y0: u32::MAX,
                    x1: 0,
                    y1: 0,
                },
            );
        }
        let b = &mut bounds[slot];
        b.label = label;
        b.x0 = b.x0.min(x);
        b.y0 = b.y0.min(y);
        b.x1 = b.x1.max(x + 1);
        b.y1 = b.y1.max(y + 1);
    }

    bounds.retain(|b| b.label != 0);
    (bounds, labels)
}

/// Fill every mask component independently with the three-pass method
#[must_use]
pub fn inpaint_advanced(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    let mut result = image.clone();
    if image.dimensions() != mask.dimensions() {
        return result;
    }

    let (width, height) = image.dimensions();
    let (components, labels) = mask_components(mask);
    tracing::trace!(components = components.len(), "Advanced inpainting");

    for component in components {
        let (x, y, w, h) = component.padded_crop(width, height);
        let roi = image::imageops::crop_imm(&result, x, y, w, h).to_image();
        let roi_mask = GrayImage::from_fn(w, h, |cx, cy| {
            if labels.get_pixel(x + cx, y + cy).0[0] == component.label {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let filled = multi_pass_inpaint(&roi, &roi_mask);
        image::imageops::replace(&mut result, &filled, i64::from(x), i64::from(y));
    }

    result
}

/// Three-pass fill of a single crop
#[must_use]
pub fn multi_pass_inpaint(image: &RgbImage, mask: &GrayImage) -> RgbImage {
    let mut result = inpaint_telea(image, mask, FIRST_PASS_RADIUS);

    let eroded = morphology::erode(mask, Norm::LInf, 1);
    if eroded.pixels().any(|p| p.0[0] > 0) {
        result = inpaint_navier_stokes(&result, &eroded, REFINE_PASS_RADIUS);
    }

    let Some(weights) = blend_weights(mask) else {
        return result;
    };
    let blurred = filter::gaussian_blur_f32(&result, GAUSSIAN_5X5_SIGMA);

    let mut blended = result.clone();
    for (x, y, pixel) in blended.enumerate_pixels_mut() {
        let alpha = weights[(y * mask.width() + x) as usize];
        if alpha <= 0.0 {
            continue;
        }
        let sharp = result.get_pixel(x, y);
        let soft = blurred.get_pixel(x, y);
        for c in 0..3 {
            let value = f32::from(soft[c]) * alpha + f32::from(sharp[c]) * (1.0 - alpha);
            pixel[c] = value.clamp(0.0, 255.0) as u8;
        }
    }
    blended
}

/// Distance from each masked pixel to the nearest unmasked pixel, scaled to `[0, 1]`
///
/// Returns `None` when the mask is empty. Pixels with no unmasked pixel
/// anywhere in the crop get full weight.
#[must_use]
pub fn blend_weights(mask: &GrayImage) -> Option<Vec<f32>> {
    // Distances are measured to nonzero pixels, so invert the mask
    let inverted = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y).0[0] > 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let squared = euclidean_squared_distance_transform(&inverted);

    let distances: Vec<f64> = squared.pixels().map(|p| p.0[0].sqrt()).collect();
    let max = distances
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0f64, f64::max);
    if max <= 0.0 {
        return None;
    }

    Some(
        distances
            .into_iter()
            .map(|d| if d.is_finite() { (d / max) as f32 } else { 1.0 })
            .map(|w| w.clamp(0.0, 1.0))
            .collect(),
    )
}
