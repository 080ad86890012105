//! OCR capability interface and text region extraction
//!
//! Concrete OCR engines live outside this crate and are injected through a
//! [`TextRecognizerFactory`], the same way frontends inject inference backends.

use crate::config::OcrSettings;
use crate::error::{Result, WatermarkError};
use crate::region::{RegionType, WatermarkRegion};
use image::RgbImage;

/// Padding added on each side of a recognized text box (normalized units)
pub const TEXT_PADDING: f32 = 0.01;

/// A single OCR result in pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct OcrDetection {
    /// Bounding polygon as `[x, y]` pixel points
    pub polygon: Vec<[f32; 2]>,
    pub text: String,
    /// Recognition confidence in `[0, 1]`
    pub confidence: f32,
}

impl OcrDetection {
    #[must_use]
    pub fn new<S: Into<String>>(polygon: Vec<[f32; 2]>, text: S, confidence: f32) -> Self {
        Self {
            polygon,
            text: text.into(),
            confidence,
        }
    }

    /// Axis-aligned pixel bounds `(x_min, y_min, x_max, y_max)` of the polygon
    #[must_use]
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.polygon.first()?;
        let init = (first[0], first[1], first[0], first[1]);
        Some(self.polygon.iter().fold(init, |(x0, y0, x1, y1), p| {
            (x0.min(p[0]), y0.min(p[1]), x1.max(p[0]), y1.max(p[1]))
        }))
    }
}

/// Trait for OCR engines that read text from RGB images
pub trait TextRecognizer: Send + Sync {
    /// Recognize text, returning one detection per text box
    ///
    /// # Errors
    /// - Engine-specific recognition failures
    fn read_text(&self, image: &RgbImage) -> Result<Vec<OcrDetection>>;

    /// Engine name for diagnostics
    fn name(&self) -> &str {
        "ocr"
    }
}

/// Factory trait for creating OCR engines on first use
pub trait TextRecognizerFactory: Send + Sync {
    /// Create and initialize an engine; may download or load models
    ///
    /// # Errors
    /// - Engine unavailable or failed to initialize
    fn create(&self, settings: &OcrSettings) -> Result<Box<dyn TextRecognizer>>;

    /// Whether this factory can produce an engine at all
    fn is_available(&self) -> bool;
}

/// Default factory with no OCR engine compiled in
pub struct DefaultTextRecognizerFactory;

impl TextRecognizerFactory for DefaultTextRecognizerFactory {
    fn create(&self, _settings: &OcrSettings) -> Result<Box<dyn TextRecognizer>> {
        Err(WatermarkError::ocr(
            "No OCR engine available in core. Must be injected by frontend.",
        ))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Convert OCR detections at or above `threshold` into padded, normalized text regions
#[must_use]
pub fn text_regions(
    detections: &[OcrDetection],
    width: u32,
    height: u32,
    threshold: f32,
) -> Vec<WatermarkRegion> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let (w, h) = (width as f32, height as f32);

    detections
        .iter()
        .filter(|detection| detection.confidence >= threshold)
        .filter_map(|detection| {
            let (x_min, y_min, x_max, y_max) = detection.bounds()?;
            tracing::debug!(
                text = %detection.text,
                confidence = detection.confidence,
                "Detected text"
            );
            let region = WatermarkRegion::from_corners(
                x_min / w,
                y_min / h,
                x_max / w,
                y_max / h,
                detection.confidence,
                RegionType::Text,
            )
            .padded(TEXT_PADDING)
            .with_text(detection.text.clone());
            Some(region)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_regions_filter_and_normalize() {
        let detections = vec![
            OcrDetection::new(
                vec![[20.0, 10.0], [60.0, 10.0], [60.0, 30.0], [20.0, 30.0]],
                "SAMPLE",
                0.9,
            ),
            OcrDetection::new(vec![[0.0, 0.0], [10.0, 10.0]], "noise", 0.4),
        ];

        let regions = text_regions(&detections, 100, 100, 0.7);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert!((region.x - 0.19).abs() < 1e-5);
        assert!((region.y - 0.09).abs() < 1e-5);
        assert!((region.width - 0.42).abs() < 1e-5);
        assert!((region.height - 0.22).abs() < 1e-5);
        assert_eq!(region.text.as_deref(), Some("SAMPLE"));
        assert_eq!(region.region_type, RegionType::Text);
    }

    #[test]
    fn test_text_regions_clamp_at_image_border() {
        let detections = vec![OcrDetection::new(
            vec![[0.0, 90.0], [100.0, 90.0], [100.0, 100.0], [0.0, 100.0]],
            "footer",
            0.8,
        )];
        let regions = text_regions(&detections, 100, 100, 0.7);
        let region = &regions[0];
        assert_eq!(region.x, 0.0);
        assert!(region.x_max() <= 1.0);
        assert!(region.y_max() <= 1.0);
        assert!(region.is_normalized());
    }

    #[test]
    fn test_empty_polygon_is_skipped() {
        let detections = vec![OcrDetection::new(Vec::new(), "ghost", 0.99)];
        assert!(text_regions(&detections, 100, 100, 0.5).is_empty());
    }

    #[test]
    fn test_default_factory_is_unavailable() {
        let factory = DefaultTextRecognizerFactory;
        assert!(!factory.is_available());
        let settings = OcrSettings {
            languages: vec!["en".to_string()],
            use_gpu: false,
        };
        assert!(matches!(factory.create(&settings), Err(WatermarkError::Ocr(_))));
    }
}
