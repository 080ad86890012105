//! Shared fixtures and test doubles for integration tests

#![allow(dead_code)]

use clean_watermarks::{
    InpaintModel, InpaintModelFactory, OcrDetection, OcrSettings, Result, Settings,
    TextRecognizer, TextRecognizerFactory, WatermarkError, WatermarkProcessor,
};
use image::{GrayImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Recognizer returning the same detections for every image
///
/// Tracks how many calls are in flight and the highest count seen.
pub struct ScriptedRecognizer {
    pub detections: Vec<OcrDetection>,
    pub delay: Option<Duration>,
    pub busy: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl TextRecognizer for ScriptedRecognizer {
    fn read_text(&self, _image: &RgbImage) -> Result<Vec<OcrDetection>> {
        let running = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.busy.fetch_sub(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Factory handing out [`ScriptedRecognizer`]s and counting creations
pub struct ScriptedRecognizerFactory {
    detections: Vec<OcrDetection>,
    delay: Option<Duration>,
    pub created: Arc<AtomicUsize>,
    pub busy: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl ScriptedRecognizerFactory {
    pub fn new(detections: Vec<OcrDetection>) -> Self {
        Self {
            detections,
            delay: None,
            created: Arc::new(AtomicUsize::new(0)),
            busy: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(Vec::new())
        }
    }
}

impl TextRecognizerFactory for ScriptedRecognizerFactory {
    fn create(&self, _settings: &OcrSettings) -> Result<Box<dyn TextRecognizer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedRecognizer {
            detections: self.detections.clone(),
            delay: self.delay,
            busy: Arc::clone(&self.busy),
            peak: Arc::clone(&self.peak),
        }))
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Model that paints every masked pixel a fixed color
pub struct FlatFillModel {
    pub color: Rgb<u8>,
    pub delay: Option<Duration>,
}

impl InpaintModel for FlatFillModel {
    fn inpaint(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut result = image.clone();
        for (x, y, value) in mask.enumerate_pixels() {
            if value[0] > 0 {
                result.put_pixel(x, y, self.color);
            }
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "flat-fill"
    }
}

pub struct FlatFillFactory {
    pub color: Rgb<u8>,
    pub delay: Option<Duration>,
    pub created: Arc<AtomicUsize>,
}

impl FlatFillFactory {
    pub fn new(color: Rgb<u8>) -> Self {
        Self {
            color,
            delay: None,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(color: Rgb<u8>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(color)
        }
    }
}

impl InpaintModelFactory for FlatFillFactory {
    fn create(&self, _settings: &Settings) -> Result<Box<dyn InpaintModel>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlatFillModel {
            color: self.color,
            delay: self.delay,
        }))
    }
}

/// Model that panics on every inference
pub struct PanickingModel;

impl InpaintModel for PanickingModel {
    fn inpaint(&mut self, _image: &RgbImage, _mask: &GrayImage) -> Result<RgbImage> {
        panic!("inference kernel crashed");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

pub struct PanickingModelFactory;

impl InpaintModelFactory for PanickingModelFactory {
    fn create(&self, _settings: &Settings) -> Result<Box<dyn InpaintModel>> {
        Ok(Box::new(PanickingModel))
    }
}

/// Files in `dir` whose names mark them as unfinished outputs
pub fn staged_files(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(".partial_"))
                .collect()
        })
        .unwrap_or_default()
}

/// Factory that never produces a model
pub struct MissingModelFactory {
    pub attempts: Arc<AtomicUsize>,
}

impl MissingModelFactory {
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InpaintModelFactory for MissingModelFactory {
    fn create(&self, _settings: &Settings) -> Result<Box<dyn InpaintModel>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(WatermarkError::model("model file not found"))
    }
}

/// Temporary upload and output directories for one processor
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::builder()
            .upload_dir(self.dir.path().join("uploads"))
            .output_dir(self.dir.path().join("processed"))
            .max_workers(2)
            .build()
            .unwrap()
    }

    /// Processor without OCR output and with a flat-fill learned model
    pub fn processor(&self) -> WatermarkProcessor {
        self.processor_with(self.settings())
    }

    pub fn processor_with(&self, settings: Settings) -> WatermarkProcessor {
        WatermarkProcessor::with_factories(
            settings,
            Box::new(ScriptedRecognizerFactory::new(Vec::new())),
            Box::new(FlatFillFactory::new(Rgb([0, 255, 0]))),
        )
        .unwrap()
    }
}

/// Dark background with a bright horizontal band across the middle
pub fn banded_image(width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([40, 50, 60]));
    let band_top = height * 2 / 5;
    let band_bottom = height * 3 / 5;
    for y in band_top..band_bottom {
        for x in width / 5..width * 4 / 5 {
            image.put_pixel(x, y, Rgb([245, 245, 245]));
        }
    }
    image
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&banded_image(width, height), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&banded_image(width, height), ImageFormat::Jpeg)
}

/// OCR detection covering a pixel rectangle
pub fn text_box(x: f32, y: f32, w: f32, h: f32, text: &str, confidence: f32) -> OcrDetection {
    OcrDetection::new(
        vec![[x, y], [x + w, y], [x + w, y + h], [x, y + h]],
        text,
        confidence,
    )
}
