#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Clean Watermarks
//!
//! Batch watermark detection and removal. Images are scanned for text
//! (through an injected OCR engine) and logo-like marks (edge and contour
//! heuristics); overlapping detections are merged and the resulting regions
//! are filled with a learned LaMa model or classical inpainting.
//!
//! ## Features
//!
//! - **Detection**: OCR text regions, logo heuristics, IoU-based merging
//! - **Inpainting**: LaMa via ONNX Runtime with automatic fallback to a
//!   multi-pass classical method, plus Telea and Navier-Stokes fills
//! - **Batch jobs**: an in-memory job registry with a bounded worker pool
//!   shared by all jobs, per-image timeouts and progress reporting
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clean_watermarks::{ProcessingOptions, Settings, WatermarkProcessor};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let processor = WatermarkProcessor::new(Settings::default())?;
//! let job = processor.create_job(vec!["photo.jpg".to_string()]).await?;
//! processor
//!     .save_uploaded_files(&job.id, vec![("photo.jpg".to_string(), std::fs::read("photo.jpg")?)])
//!     .await?;
//!
//! let options = ProcessingOptions {
//!     ocr_enabled: false,
//!     ..Default::default()
//! };
//! let report = processor.process_job(&job.id, options).await?;
//! println!("{:.0}% done", report.progress);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): LaMa inpainting through ONNX Runtime
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP decoding and encoding
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod inpainting;
pub mod job;
pub mod processor;
pub mod region;
pub mod services;
pub mod tracing_config;

pub use backends::*;
pub use config::{ExecutionProvider, OcrSettings, Settings, SettingsBuilder};
pub use detection::{
    DefaultTextRecognizerFactory, OcrDetection, TextRecognizer, TextRecognizerFactory,
    WatermarkDetector,
};
pub use error::{Result, WatermarkError};
pub use inpainting::{
    DefaultInpaintModelFactory, InpaintModel, InpaintModelFactory, WatermarkInpainter,
};
pub use job::{
    BatchJob, ImageTask, InpaintingMethod, JobStatusReport, ProcessingOptions, ProcessingStatus,
};
pub use processor::{collect_regions, HealthReport, ModelStatus, WatermarkProcessor};
pub use region::{RegionType, WatermarkRegion};
pub use services::{
    CollectingProgressReporter, ConsoleProgressReporter, ImageIOService, JobProgressReporter,
    JobStorage, NoOpProgressReporter, ProgressEvent, TaskOutcome,
};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

use image::RgbImage;

/// Detect and remove watermarks from an in-memory image
///
/// Runs detection (when `options.auto_detect` is set), adds the manual
/// regions and inpaints them. No files are read or written.
///
/// Returns the cleaned image and the regions that were removed.
///
/// # Examples
/// ```rust,no_run
/// use clean_watermarks::{
///     remove_watermarks_from_image, ProcessingOptions, Settings, WatermarkDetector,
///     WatermarkInpainter,
/// };
///
/// # fn example(image: image::RgbImage) -> clean_watermarks::Result<()> {
/// let settings = Settings::default();
/// let detector = WatermarkDetector::new(settings.ocr_settings());
/// let inpainter = WatermarkInpainter::new(settings);
/// let options = ProcessingOptions {
///     ocr_enabled: false,
///     ..Default::default()
/// };
/// let (cleaned, regions) = remove_watermarks_from_image(&image, &options, &detector, &inpainter)?;
/// println!("removed {} regions", regions.len());
/// # Ok(())
/// # }
/// ```
pub fn remove_watermarks_from_image(
    image: &RgbImage,
    options: &ProcessingOptions,
    detector: &WatermarkDetector,
    inpainter: &WatermarkInpainter,
) -> Result<(RgbImage, Vec<WatermarkRegion>)> {
    options.validate()?;
    let regions = collect_regions(image, options, detector)?;
    if regions.is_empty() {
        return Ok((image.clone(), regions));
    }
    let (cleaned, _elapsed_ms) = inpainter.inpaint(image, &regions, options.inpainting_method)?;
    Ok((cleaned, regions))
}

/// Detect and remove watermarks from encoded image bytes
///
/// # Errors
/// - Bytes that can't be decoded as an image
/// - Errors from [`remove_watermarks_from_image`]
pub fn remove_watermarks_from_bytes(
    image_bytes: &[u8],
    options: &ProcessingOptions,
    detector: &WatermarkDetector,
    inpainter: &WatermarkInpainter,
) -> Result<(RgbImage, Vec<WatermarkRegion>)> {
    let image = ImageIOService::load_from_bytes(image_bytes)?;
    remove_watermarks_from_image(&image, options, detector, inpainter)
}
