//! Watermark detection: OCR text, logo heuristics and overlap merging
//!
//! [`WatermarkDetector`] owns the lazily created OCR engine and combines the
//! text and logo subsystems. Either subsystem failing during a call is logged
//! and contributes no regions; it never fails the whole call.

pub mod logo;
pub mod merge;
pub mod text;

pub use logo::{detect_logos, logo_confidence, LogoCandidate, LOGO_PADDING};
pub use merge::{merge_overlapping_regions, MERGE_IOU_THRESHOLD};
pub use text::{
    text_regions, DefaultTextRecognizerFactory, OcrDetection, TextRecognizer,
    TextRecognizerFactory, TEXT_PADDING,
};

use crate::config::OcrSettings;
use crate::error::{Result, WatermarkError};
use crate::region::WatermarkRegion;
use image::RgbImage;
use instant::Instant;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Detects watermark regions in decoded RGB images
pub struct WatermarkDetector {
    ocr_settings: OcrSettings,
    recognizer_factory: Box<dyn TextRecognizerFactory>,
    recognizer: Mutex<Option<Arc<dyn TextRecognizer>>>,
}

impl WatermarkDetector {
    /// Create a detector with no OCR engine injected
    #[must_use]
    pub fn new(ocr_settings: OcrSettings) -> Self {
        Self::with_factory(ocr_settings, Box::new(DefaultTextRecognizerFactory))
    }

    /// Create a detector that builds its OCR engine from `recognizer_factory` on first use
    #[must_use]
    pub fn with_factory(
        ocr_settings: OcrSettings,
        recognizer_factory: Box<dyn TextRecognizerFactory>,
    ) -> Self {
        Self {
            ocr_settings,
            recognizer_factory,
            recognizer: Mutex::new(None),
        }
    }

    /// Whether the OCR engine has been created
    #[must_use]
    pub fn is_ocr_initialized(&self) -> bool {
        self.recognizer
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Whether an OCR engine can be created at all
    #[must_use]
    pub fn is_ocr_available(&self) -> bool {
        self.recognizer_factory.is_available()
    }

    /// Get the OCR engine, creating it on first use
    ///
    /// The lock is held while the engine is built, so concurrent first calls
    /// create it at most once. A failed creation is not cached.
    ///
    /// # Errors
    /// - OCR engine creation failures
    pub fn recognizer(&self) -> Result<Arc<dyn TextRecognizer>> {
        let mut guard = self
            .recognizer
            .lock()
            .map_err(|_| WatermarkError::internal("OCR engine lock poisoned"))?;

        if let Some(recognizer) = guard.as_ref() {
            return Ok(Arc::clone(recognizer));
        }

        info!(languages = ?self.ocr_settings.languages, gpu = self.ocr_settings.use_gpu, "Initializing OCR engine");
        let start = Instant::now();
        let recognizer: Arc<dyn TextRecognizer> =
            Arc::from(self.recognizer_factory.create(&self.ocr_settings)?);
        info!(
            engine = recognizer.name(),
            init_ms = start.elapsed().as_millis() as u64,
            "OCR engine ready"
        );

        *guard = Some(Arc::clone(&recognizer));
        Ok(recognizer)
    }

    /// Detect watermark regions at or above `confidence_threshold`
    ///
    /// Returns merged regions and the elapsed time in milliseconds.
    ///
    /// # Errors
    /// - OCR engine creation failure when `detect_text` is set
    #[instrument(
        skip(self, image),
        fields(dimensions = %format!("{}x{}", image.width(), image.height()))
    )]
    pub fn detect(
        &self,
        image: &RgbImage,
        confidence_threshold: f32,
        detect_text: bool,
        detect_logos: bool,
    ) -> Result<(Vec<WatermarkRegion>, u64)> {
        let start = Instant::now();
        let mut regions = Vec::new();

        if detect_text {
            let recognizer = self.recognizer()?;
            regions.extend(self.text_pass(recognizer.as_ref(), image, confidence_threshold));
        }

        if detect_logos {
            match logo::detect_logos(image, confidence_threshold) {
                Ok(logos) => {
                    debug!(count = logos.len(), "Logo detection finished");
                    regions.extend(logos);
                },
                Err(e) => warn!(error = %e, "Logo detection failed"),
            }
        }

        let merged = merge_overlapping_regions(&regions, MERGE_IOU_THRESHOLD);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        debug!(
            raw = regions.len(),
            merged = merged.len(),
            elapsed_ms,
            "Detection finished"
        );
        Ok((merged, elapsed_ms))
    }

    fn text_pass(
        &self,
        recognizer: &dyn TextRecognizer,
        image: &RgbImage,
        confidence_threshold: f32,
    ) -> Vec<WatermarkRegion> {
        match recognizer.read_text(image) {
            Ok(detections) => {
                let found =
                    text_regions(&detections, image.width(), image.height(), confidence_threshold);
                debug!(
                    detections = detections.len(),
                    kept = found.len(),
                    "Text detection finished"
                );
                found
            },
            Err(e) => {
                warn!(engine = recognizer.name(), error = %e, "Text detection failed");
                Vec::new()
            },
        }
    }
}

impl std::fmt::Debug for WatermarkDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkDetector")
            .field("ocr_settings", &self.ocr_settings)
            .field("ocr_initialized", &self.is_ocr_initialized())
            .finish_non_exhaustive()
    }
}
