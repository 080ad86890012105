//! Batch job and image task records
//!
//! A [`BatchJob`] owns one [`ImageTask`] per submitted file. Both share the
//! [`ProcessingStatus`] state machine:
//! `pending -> detecting -> removing -> completed | failed`.

use crate::error::{Result, WatermarkError};
use crate::region::WatermarkRegion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Processing state shared by jobs and tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Detecting,
    Removing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// Whether no further transitions can happen
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Detecting => "detecting",
            Self::Removing => "removing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Fill algorithm used to remove detected watermarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum InpaintingMethod {
    /// Learned generative fill, falling back to `Advanced` when unavailable
    #[default]
    Lama,
    /// Fast-marching classical inpainting
    Telea,
    /// Diffusion-based classical inpainting
    Ns,
    /// Per-component multi-pass classical inpainting
    Advanced,
}

impl InpaintingMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lama => "lama",
            Self::Telea => "telea",
            Self::Ns => "ns",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for InpaintingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized method names select the advanced multi-pass fill
impl From<&str> for InpaintingMethod {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lama" => Self::Lama,
            "telea" => Self::Telea,
            "ns" | "navier-stokes" => Self::Ns,
            _ => Self::Advanced,
        }
    }
}

impl From<String> for InpaintingMethod {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<InpaintingMethod> for String {
    fn from(value: InpaintingMethod) -> Self {
        value.as_str().to_string()
    }
}

/// Options for one `process_job` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessingOptions {
    /// Run the detector on each image
    pub auto_detect: bool,
    /// Minimum confidence for detected regions, in `[0.5, 0.95]`
    pub detection_confidence: f32,
    /// Enable OCR text detection
    pub ocr_enabled: bool,
    /// Enable logo detection
    pub logo_detection: bool,
    pub inpainting_method: InpaintingMethod,
    /// Encode outputs with quality settings matched to the input format
    pub preserve_quality: bool,
    /// Regions added to every image regardless of `auto_detect`
    pub manual_regions: Vec<WatermarkRegion>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            auto_detect: true,
            detection_confidence: 0.7,
            ocr_enabled: true,
            logo_detection: true,
            inpainting_method: InpaintingMethod::Lama,
            preserve_quality: true,
            manual_regions: Vec::new(),
        }
    }
}

impl ProcessingOptions {
    /// Validate thresholds and manual regions
    ///
    /// # Errors
    /// - Detection confidence outside 0.5-0.95
    /// - Manual region with coordinates outside `[0, 1]`
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=0.95).contains(&self.detection_confidence) {
            return Err(WatermarkError::config_value_error(
                "detection confidence",
                self.detection_confidence,
                "0.5-0.95",
                Some(0.7),
            ));
        }
        if let Some((index, _)) = self
            .manual_regions
            .iter()
            .enumerate()
            .find(|(_, region)| !region.is_normalized())
        {
            return Err(WatermarkError::invalid_config(format!(
                "Manual region {index} has coordinates outside [0, 1]"
            )));
        }
        Ok(())
    }
}

/// One image's unit of work within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTask {
    pub id: String,
    pub filename: String,
    pub original_path: Option<PathBuf>,
    pub processed_path: Option<PathBuf>,
    pub status: ProcessingStatus,
    pub regions: Vec<WatermarkRegion>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<u64>,
}

impl ImageTask {
    /// Create a pending task for a file
    #[must_use]
    pub fn new<S: Into<String>>(filename: S) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            original_path: None,
            processed_path: None,
            status: ProcessingStatus::Pending,
            regions: Vec::new(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            processing_time_ms: None,
        }
    }

    /// Mark the task failed with an error message; idempotent
    pub fn mark_failed<S: Into<String>>(&mut self, error: S) {
        self.status = ProcessingStatus::Failed;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// A batch of images submitted together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub tasks: Vec<ImageTask>,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    /// Create a pending job with one pending task per file name
    #[must_use]
    pub fn new<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<ImageTask> = filenames.into_iter().map(ImageTask::new).collect();
        Self {
            id: Uuid::new_v4().to_string(),
            total_images: tasks.len(),
            tasks,
            completed_images: 0,
            failed_images: 0,
            status: ProcessingStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Percentage of tasks that reached a terminal state
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total_images == 0 {
            return 0.0;
        }
        (self.completed_images + self.failed_images) as f64 / self.total_images as f64 * 100.0
    }

    /// Find a task by id
    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&ImageTask> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    /// Final status once every task has resolved: failed only if every task failed
    #[must_use]
    pub fn final_status(&self) -> ProcessingStatus {
        if self.failed_images == self.total_images {
            ProcessingStatus::Failed
        } else {
            ProcessingStatus::Completed
        }
    }

    /// Status snapshot suitable for reporting
    #[must_use]
    pub fn status_report(&self) -> JobStatusReport {
        JobStatusReport {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress(),
            total_images: self.total_images,
            completed_images: self.completed_images,
            failed_images: self.failed_images,
            tasks: self.tasks.clone(),
            download_ready: self.status == ProcessingStatus::Completed
                && self.completed_images > 0,
        }
    }
}

/// Status summary of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: String,
    pub status: ProcessingStatus,
    pub progress: f64,
    pub total_images: usize,
    pub completed_images: usize,
    pub failed_images: usize,
    pub tasks: Vec<ImageTask>,
    pub download_ready: bool,
}
