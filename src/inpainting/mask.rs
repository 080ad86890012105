//! Region rasterisation into inpainting masks

use crate::region::WatermarkRegion;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Mask value for pixels to fill
pub const MASK_ON: u8 = 255;

/// Chebyshev radius equivalent to a 5x5 square kernel applied twice
const COVERAGE_DILATION: u8 = 4;

/// Rasterise regions into a dilated single-channel mask
///
/// Each region is truncated to integer pixel bounds clamped to the image,
/// filled with [`MASK_ON`], then the union is dilated so fills extend past
/// the raw detection boxes.
#[must_use]
pub fn create_mask(regions: &[WatermarkRegion], width: u32, height: u32) -> GrayImage {
    let raw = rasterize_regions(regions, width, height);
    if width == 0 || height == 0 {
        return raw;
    }
    morphology::dilate(&raw, Norm::LInf, COVERAGE_DILATION)
}

/// Rasterise regions without dilation
#[must_use]
pub fn rasterize_regions(regions: &[WatermarkRegion], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 {
        return mask;
    }

    for region in regions {
        let (x1, y1, x2, y2) = region.to_pixel_bounds(width, height);
        for y in y1..y2 {
            for x in x1..x2 {
                mask.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }
    mask
}

/// Number of pixels marked for filling
#[must_use]
pub fn masked_pixel_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 0).count()
}
