//! Greedy IoU-based region merging

use crate::region::WatermarkRegion;

/// IoU above which two detections are merged
pub const MERGE_IOU_THRESHOLD: f32 = 0.3;

/// Merge overlapping regions in a single greedy pass
///
/// For each region not yet consumed, every later unconsumed region whose IoU
/// with the running merged region exceeds `iou_threshold` is folded into it.
/// A grown cluster is never compared again against regions already emitted,
/// so transitively overlapping inputs can stay separate depending on order.
#[must_use]
pub fn merge_overlapping_regions(
    regions: &[WatermarkRegion],
    iou_threshold: f32,
) -> Vec<WatermarkRegion> {
    if regions.len() < 2 {
        return regions.to_vec();
    }

    let mut consumed = vec![false; regions.len()];
    let mut merged = Vec::with_capacity(regions.len());

    for (i, region) in regions.iter().enumerate() {
        if consumed[i] {
            continue;
        }
        let mut current = region.clone();

        for (j, candidate) in regions.iter().enumerate().skip(i + 1) {
            if consumed[j] {
                continue;
            }
            if current.iou(candidate) > iou_threshold {
                current = current.merge(candidate);
                consumed[j] = true;
            }
        }

        merged.push(current);
    }

    merged
}
