//! Image I/O and job storage layout
//!
//! Keeps file handling out of the detection and inpainting code: decoding,
//! quality-aware encoding, and the per-job upload/output directory layout.

use crate::error::{Result, WatermarkError};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageFormat, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// JPEG quality used when preserving quality
pub const PRESERVED_JPEG_QUALITY: u8 = 95;

/// Prefix of processed output file names
pub const PROCESSED_PREFIX: &str = "cleaned_";

const STAGING_PREFIX: &str = ".partial_";

/// Service for image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image file as 8-bit RGB
    ///
    /// Falls back to content sniffing when the extension doesn't match the data.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Data that can't be decoded as an image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use clean_watermarks::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WatermarkError::file_io_error(
                "read image file",
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path) {
            Ok(image) => Ok(image.to_rgb8()),
            Err(extension_err) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %extension_err,
                    "Extension-based decoding failed, trying content detection"
                );
                let data = std::fs::read(path)
                    .map_err(|e| WatermarkError::file_io_error("read image data", path, &e))?;
                image::load_from_memory(&data)
                    .map(|image| image.to_rgb8())
                    .map_err(|e| WatermarkError::image_load_error(path, &e))
            },
        }
    }

    /// Decode image bytes as 8-bit RGB
    ///
    /// # Errors
    /// - Data that can't be decoded as an image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<RgbImage> {
        image::load_from_memory(bytes)
            .map(|image| image.to_rgb8())
            .map_err(|e| WatermarkError::processing(format!("Failed to decode image from bytes: {e}")))
    }

    /// Save an image, choosing the encoder from the path's extension
    ///
    /// With `preserve_quality`, JPEG output uses quality 95 and PNG output
    /// uses fast (low-level) compression; otherwise default encoder settings.
    ///
    /// # Errors
    /// - Output directory can't be created
    /// - Unsupported extension or encoding failures
    pub fn save_image<P: AsRef<Path>>(image: &RgbImage, path: P, preserve_quality: bool) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WatermarkError::file_io_error("create output directory", parent, &e))?;
        }

        let format = ImageFormat::from_path(path).map_err(|e| {
            WatermarkError::processing(format!(
                "Unsupported output format for '{}': {e}",
                path.display()
            ))
        })?;

        if preserve_quality && matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            let file = File::create(path)
                .map_err(|e| WatermarkError::file_io_error("create output file", path, &e))?;
            let writer = BufWriter::new(file);
            let encoded = if format == ImageFormat::Jpeg {
                image.write_with_encoder(JpegEncoder::new_with_quality(writer, PRESERVED_JPEG_QUALITY))
            } else {
                image.write_with_encoder(PngEncoder::new_with_quality(
                    writer,
                    CompressionType::Fast,
                    FilterType::Adaptive,
                ))
            };
            return encoded.map_err(|e| {
                WatermarkError::processing(format!("Failed to save '{}': {e}", path.display()))
            });
        }

        image
            .save_with_format(path, format)
            .map_err(|e| WatermarkError::processing(format!("Failed to save '{}': {e}", path.display())))
    }

    /// Check if a path has an image extension this build can decode
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                match ext.as_str() {
                    "jpg" | "jpeg" | "png" | "tiff" | "tif" | "bmp" => true,
                    "webp" => cfg!(feature = "webp-support"),
                    _ => false,
                }
            })
    }
}

/// On-disk layout of job files
///
/// Uploads live in `upload_root/<job id>/<file>` and results in
/// `output_root/<job id>/cleaned_<file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStorage {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl JobStorage {
    #[must_use]
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(upload_root: P, output_root: Q) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    #[must_use]
    pub fn upload_dir(&self, job_id: &str) -> PathBuf {
        self.upload_root.join(job_id)
    }

    #[must_use]
    pub fn output_dir(&self, job_id: &str) -> PathBuf {
        self.output_root.join(job_id)
    }

    #[must_use]
    pub fn input_path(&self, job_id: &str, filename: &str) -> PathBuf {
        self.upload_dir(job_id).join(filename)
    }

    #[must_use]
    pub fn output_path(&self, job_id: &str, filename: &str) -> PathBuf {
        self.output_dir(job_id).join(processed_file_name(filename))
    }

    /// Write an uploaded file into the job's upload directory
    ///
    /// Directory components of `filename` are discarded. When a file with the
    /// same name exists, `_xxxxxxxx` is inserted before the extension.
    /// Returns the stored file name.
    ///
    /// # Errors
    /// - File name with no usable final component
    /// - Directory creation or write failures
    pub fn store_upload(&self, job_id: &str, filename: &str, data: &[u8]) -> Result<String> {
        let name = sanitize_file_name(filename).ok_or_else(|| {
            WatermarkError::invalid_config(format!("Invalid upload file name '{filename}'"))
        })?;

        let dir = self.upload_dir(job_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| WatermarkError::file_io_error("create upload directory", &dir, &e))?;

        let mut stored = name.clone();
        while dir.join(&stored).exists() {
            stored = with_unique_suffix(&name);
        }

        let path = dir.join(&stored);
        std::fs::write(&path, data)
            .map_err(|e| WatermarkError::file_io_error("write uploaded file", &path, &e))?;
        Ok(stored)
    }

    /// Delete the job's upload and output directories; missing directories are ignored
    ///
    /// # Errors
    /// - Removal failures other than "not found"
    pub async fn remove_job_dirs(&self, job_id: &str) -> Result<()> {
        for dir in [self.upload_dir(job_id), self.output_dir(job_id)] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::debug!(dir = %dir.display(), "Removed job directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(WatermarkError::file_io_error("remove job directory", &dir, &e)),
            }
        }
        Ok(())
    }
}

/// Output file name for a processed image
#[must_use]
pub fn processed_file_name(filename: &str) -> String {
    format!("{PROCESSED_PREFIX}{filename}")
}

/// Whether `filename` is a bare file name that stays inside a job directory
#[must_use]
pub fn is_plain_file_name(filename: &str) -> bool {
    sanitize_file_name(filename).as_deref() == Some(filename)
}

/// Hidden sibling of `path` that an output is written to before it is moved into place
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{STAGING_PREFIX}{name}"))
}

fn sanitize_file_name(filename: &str) -> Option<String> {
    let name = Path::new(filename).file_name()?.to_str()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

fn with_unique_suffix(name: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let path = Path::new(name);
    match (path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (Some(stem), Some(ext)) => format!("{stem}_{suffix}.{ext}"),
        _ => format!("{name}_{suffix}"),
    }
}
