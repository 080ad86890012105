//! Configuration types for watermark removal services

use crate::error::{Result, WatermarkError};
use crate::job::InpaintingMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution provider options for the learned inpainting backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl ExecutionProvider {
    /// Whether this provider may run on a GPU
    #[must_use]
    pub fn uses_gpu(self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(WatermarkError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// OCR backend settings handed to the text recognizer factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Languages the recognizer should load
    pub languages: Vec<String>,
    /// Whether the recognizer may use a GPU
    pub use_gpu: bool,
}

/// Process-wide settings for the watermark removal services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory for uploaded images (`upload_dir/<job id>/<file>`)
    pub upload_dir: PathBuf,

    /// Root directory for processed images (`output_dir/<job id>/cleaned_<file>`)
    pub output_dir: PathBuf,

    /// Maximum accepted size of a single uploaded file in bytes
    pub max_upload_size: u64,

    /// Maximum number of images per job
    pub max_batch_size: usize,

    /// Accepted file extensions (lowercase, without dot)
    pub allowed_extensions: Vec<String>,

    /// Size of the worker pool shared by all jobs
    pub max_workers: usize,

    /// Per-image processing timeout in seconds
    pub processing_timeout_secs: u64,

    /// OCR languages
    pub ocr_languages: Vec<String>,

    /// Default detection confidence threshold
    pub detection_confidence: f32,

    /// Default inpainting method
    pub inpainting_method: InpaintingMethod,

    /// Execution provider for learned models
    pub execution_provider: ExecutionProvider,

    /// Path to a LaMa ONNX model (learned inpainting disabled when unset)
    pub lama_model_path: Option<PathBuf>,

    /// Square input resolution expected by the LaMa model
    pub lama_input_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            max_upload_size: 50 * 1024 * 1024,
            max_batch_size: 200,
            allowed_extensions: ["jpg", "jpeg", "png", "webp", "bmp", "tiff"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_workers: 4,
            processing_timeout_secs: 300,
            ocr_languages: vec!["en".to_string()],
            detection_confidence: 0.7,
            inpainting_method: InpaintingMethod::Lama,
            execution_provider: ExecutionProvider::Auto,
            lama_model_path: None,
            lama_input_size: 512,
        }
    }
}

impl Settings {
    /// Create a new settings builder
    ///
    /// # Examples
    /// ```rust
    /// use clean_watermarks::Settings;
    ///
    /// let settings = Settings::builder()
    ///     .max_workers(2)
    ///     .detection_confidence(0.8)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(settings.max_workers, 2);
    /// ```
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load settings from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Malformed JSON
    /// - Values outside their valid ranges
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WatermarkError::file_io_error("read settings file", path, &e))?;
        let settings: Self = serde_json::from_str(&content).map_err(|e| {
            WatermarkError::invalid_config(format!(
                "Failed to parse settings file '{}': {e}",
                path.display()
            ))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Detection confidence outside 0.5-0.95
    /// - Zero workers, timeout or batch size
    /// - LaMa input size not a positive multiple of 8
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=0.95).contains(&self.detection_confidence) {
            return Err(WatermarkError::config_value_error(
                "detection confidence",
                self.detection_confidence,
                "0.5-0.95",
                Some(0.7),
            ));
        }
        if self.max_workers == 0 {
            return Err(WatermarkError::config_value_error(
                "max workers",
                self.max_workers,
                ">= 1",
                Some(4),
            ));
        }
        if self.processing_timeout_secs == 0 {
            return Err(WatermarkError::config_value_error(
                "processing timeout",
                self.processing_timeout_secs,
                ">= 1 second",
                Some(300),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(WatermarkError::config_value_error(
                "max batch size",
                self.max_batch_size,
                ">= 1",
                Some(200),
            ));
        }
        if self.lama_input_size == 0 || self.lama_input_size % 8 != 0 {
            return Err(WatermarkError::config_value_error(
                "LaMa input size",
                self.lama_input_size,
                "positive multiple of 8",
                Some(512),
            ));
        }
        Ok(())
    }

    /// OCR settings derived from these settings
    #[must_use]
    pub fn ocr_settings(&self) -> OcrSettings {
        OcrSettings {
            languages: self.ocr_languages.clone(),
            use_gpu: self.execution_provider.uses_gpu(),
        }
    }

    /// Whether a file name carries one of the allowed extensions
    #[must_use]
    pub fn is_allowed_extension(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    /// Create the upload and output roots if they don't exist
    ///
    /// # Errors
    /// - Directory creation failures
    pub fn setup_directories(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.output_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| WatermarkError::file_io_error("create directory", dir, &e))?;
        }
        Ok(())
    }
}

/// Builder for `Settings`
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    #[must_use]
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.settings.upload_dir = dir.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.settings.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.settings.max_upload_size = bytes;
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.settings.max_batch_size = size;
        self
    }

    #[must_use]
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.allowed_extensions = extensions
            .into_iter()
            .map(|ext| ext.into().to_ascii_lowercase())
            .collect();
        self
    }

    #[must_use]
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.settings.max_workers = workers;
        self
    }

    #[must_use]
    pub fn processing_timeout_secs(mut self, seconds: u64) -> Self {
        self.settings.processing_timeout_secs = seconds;
        self
    }

    #[must_use]
    pub fn ocr_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.ocr_languages = languages.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn detection_confidence(mut self, confidence: f32) -> Self {
        self.settings.detection_confidence = confidence;
        self
    }

    #[must_use]
    pub fn inpainting_method(mut self, method: InpaintingMethod) -> Self {
        self.settings.inpainting_method = method;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.settings.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn lama_model_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.settings.lama_model_path = path.map(Into::into);
        self
    }

    #[must_use]
    pub fn lama_input_size(mut self, size: u32) -> Self {
        self.settings.lama_input_size = size;
        self
    }

    /// Build and validate the settings
    ///
    /// # Errors
    /// - Any value outside its valid range (see [`Settings::validate`])
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
