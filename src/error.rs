//! Error types for watermark detection, removal and job orchestration

use thiserror::Error;

/// Result type alias for watermark removal operations
pub type Result<T> = std::result::Result<T, WatermarkError>;

/// Error types for watermark removal operations
#[derive(Error, Debug)]
pub enum WatermarkError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// OCR backend errors (initialization or recognition)
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Learned model inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No job registered under the given id
    #[error("Job {0} not found")]
    JobNotFound(String),

    /// Job exists but cannot accept the requested operation in its current state
    #[error("Job {job_id} cannot be processed in state '{status}'")]
    InvalidJobState { job_id: String, status: String },

    /// Per-image processing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Per-image processing exceeded the configured timeout
    #[error("Processing of '{filename}' timed out after {seconds}s")]
    Timeout { filename: String, seconds: u64 },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatermarkError {
    /// Create a new OCR error
    pub fn ocr<S: Into<String>>(msg: S) -> Self {
        Self::Ocr(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new job-not-found error
    pub fn job_not_found<S: Into<String>>(job_id: S) -> Self {
        Self::JobNotFound(job_id.into())
    }

    /// Create a new invalid job state error
    pub fn invalid_job_state<S: Into<String>, T: std::fmt::Display>(job_id: S, status: T) -> Self {
        Self::InvalidJobState {
            job_id: job_id.into(),
            status: status.to_string(),
        }
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create image loading error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Processing(format!(
            "Failed to load image: {} (format: {extension}): {error}",
            path_ref.display()
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }
}
