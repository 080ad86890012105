//! Batch watermark removal processor
//!
//! [`WatermarkProcessor`] owns the job registry, the detector and inpainter
//! services and a worker pool shared by every job. Each image task runs as
//! its own unit of work; `process_job` fans out one task per image and waits
//! for all of them before finalizing the job.

use crate::config::Settings;
use crate::detection::{TextRecognizerFactory, WatermarkDetector};
use crate::error::{Result, WatermarkError};
use crate::inpainting::{InpaintModelFactory, WatermarkInpainter};
use crate::job::{BatchJob, JobStatusReport, ProcessingOptions, ProcessingStatus};
use crate::region::WatermarkRegion;
use crate::services::{
    is_plain_file_name, staging_path, ImageIOService, JobProgressReporter, JobStorage,
    NoOpProgressReporter, TaskOutcome,
};
use crate::tracing_config::{events, spans};
use chrono::Utc;
use image::RgbImage;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::{error, info, instrument, warn, Instrument};

type SharedJob = Arc<Mutex<BatchJob>>;

/// Which lazily-initialized backends are ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub ocr: bool,
    pub inpainting: bool,
}

/// Service health snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub gpu_available: bool,
    pub models_loaded: ModelStatus,
    pub ocr_available: bool,
    pub registered_jobs: usize,
}

/// Collect the regions to remove from one image
///
/// Runs the detector when `auto_detect` is set, then appends the manual regions.
///
/// # Errors
/// - OCR engine creation failure when OCR is enabled
pub fn collect_regions(
    image: &RgbImage,
    options: &ProcessingOptions,
    detector: &WatermarkDetector,
) -> Result<Vec<WatermarkRegion>> {
    let mut regions = Vec::new();
    if options.auto_detect {
        let _span = spans::detection(image.dimensions()).entered();
        let (detected, _elapsed_ms) = detector.detect(
            image,
            options.detection_confidence,
            options.ocr_enabled,
            options.logo_detection,
        )?;
        regions.extend(detected);
    }
    regions.extend(options.manual_regions.iter().cloned());
    Ok(regions)
}

/// Per-task pipeline shared by all workers
#[derive(Clone)]
struct TaskRunner {
    storage: JobStorage,
    detector: Arc<WatermarkDetector>,
    inpainter: Arc<WatermarkInpainter>,
    reporter: Arc<dyn JobProgressReporter>,
    slots: Arc<Semaphore>,
    timeout: Duration,
}

impl TaskRunner {
    /// Run one task to completion or failure, recording the outcome on the task
    async fn run(
        &self,
        job: SharedJob,
        job_id: String,
        index: usize,
        options: Arc<ProcessingOptions>,
    ) -> Result<TaskOutcome> {
        // Shared with the blocking work so the slot stays taken until it really ends
        let permit = Arc::new(
            Arc::clone(&self.slots)
                .acquire_owned()
                .await
                .map_err(|_| WatermarkError::internal("Worker pool closed"))?,
        );

        let (task_id, filename) = {
            let mut guard = job.lock().await;
            let task = guard
                .tasks
                .get_mut(index)
                .ok_or_else(|| WatermarkError::internal(format!("Task {index} missing from job")))?;
            task.status = ProcessingStatus::Detecting;
            (task.id.clone(), task.filename.clone())
        };
        self.reporter.on_task_start(&job_id, &task_id, &filename);

        let start = Instant::now();
        let commit = Arc::new(AtomicU8::new(PIPELINE_RUNNING));
        let span = spans::task_processing(&job_id, &task_id, &filename);
        let mut pipeline = tokio::spawn({
            let runner = self.clone();
            let job = Arc::clone(&job);
            let job_id = job_id.clone();
            let filename = filename.clone();
            let options = Arc::clone(&options);
            let commit = Arc::clone(&commit);
            let permit = Arc::clone(&permit);
            async move {
                runner
                    .clean(&job, &job_id, index, &filename, &options, &commit, &permit)
                    .await
            }
            .instrument(span)
        });

        let result = match tokio::time::timeout(self.timeout, &mut pipeline).await {
            Ok(joined) => flatten_worker(joined),
            Err(_) => {
                let abandoned = commit
                    .compare_exchange(
                        PIPELINE_RUNNING,
                        PIPELINE_ABANDONED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok();
                if abandoned {
                    pipeline.abort();
                    Err(WatermarkError::Timeout {
                        filename: filename.clone(),
                        seconds: self.timeout.as_secs(),
                    })
                } else {
                    // Output already committed, only the final move is left
                    flatten_worker(pipeline.await)
                }
            },
        };
        drop(permit);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut guard = job.lock().await;
        let task = guard
            .tasks
            .get_mut(index)
            .ok_or_else(|| WatermarkError::internal(format!("Task {index} missing from job")))?;
        task.processing_time_ms = Some(elapsed_ms);

        match result {
            Ok((regions, output_path)) => {
                let outcome = TaskOutcome {
                    job_id: job_id.clone(),
                    task_id,
                    filename,
                    regions: regions.len(),
                    processing_time_ms: elapsed_ms,
                };
                task.regions = regions;
                task.processed_path = Some(output_path);
                task.status = ProcessingStatus::Completed;
                task.completed_at = Some(Utc::now());
                drop(guard);

                info!(
                    job_id = %job_id,
                    filename = %outcome.filename,
                    regions = outcome.regions,
                    elapsed_ms,
                    "Image processed"
                );
                self.reporter.on_task_complete(&outcome);
                Ok(outcome)
            },
            Err(e) => {
                let message = e.to_string();
                task.mark_failed(message.clone());
                drop(guard);

                error!(job_id = %job_id, filename = %filename, error = %message, "Image failed");
                self.reporter.on_task_error(&job_id, &task_id, &filename, &message);
                Err(e)
            },
        }
    }

    /// Load, detect, inpaint and save one image
    ///
    /// The output is written to a staging file and only moved into place if
    /// the task has not been abandoned by its timeout.
    #[allow(clippy::too_many_arguments)]
    async fn clean(
        &self,
        job: &SharedJob,
        job_id: &str,
        index: usize,
        filename: &str,
        options: &Arc<ProcessingOptions>,
        commit: &Arc<AtomicU8>,
        permit: &Arc<OwnedSemaphorePermit>,
    ) -> Result<(Vec<WatermarkRegion>, PathBuf)> {
        let input_path = self.storage.input_path(job_id, filename);
        let detector = Arc::clone(&self.detector);
        let detect_options = Arc::clone(options);
        let slot = Arc::clone(permit);
        let (image, regions) = tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let image = ImageIOService::load_image(&input_path)?;
            let regions = collect_regions(&image, &detect_options, &detector)?;
            Ok::<_, WatermarkError>((image, regions))
        })
        .await
        .map_err(|e| WatermarkError::internal(format!("Detection worker failed: {e}")))??;

        {
            let mut guard = job.lock().await;
            if let Some(task) = guard.tasks.get_mut(index) {
                task.status = ProcessingStatus::Removing;
                task.regions.clone_from(&regions);
            }
        }

        let output_path = self.storage.output_path(job_id, filename);
        let inpainter = Arc::clone(&self.inpainter);
        let to_remove = regions.clone();
        let method = options.inpainting_method;
        let preserve_quality = options.preserve_quality;
        let commit = Arc::clone(commit);
        let slot = Arc::clone(permit);
        let destination = output_path.clone();
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            let result = if to_remove.is_empty() {
                image
            } else {
                let _span = spans::inpainting(method.as_str(), to_remove.len()).entered();
                inpainter.inpaint(&image, &to_remove, method)?.0
            };
            commit_output(&result, &destination, preserve_quality, &commit)
        })
        .await
        .map_err(|e| WatermarkError::internal(format!("Inpainting worker failed: {e}")))??;

        Ok((regions, output_path))
    }
}

const PIPELINE_RUNNING: u8 = 0;
const PIPELINE_COMMITTED: u8 = 1;
const PIPELINE_ABANDONED: u8 = 2;

fn flatten_worker<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.map_err(|e| WatermarkError::internal(format!("Image worker failed: {e}")))?
}

/// Save `image` next to `destination` and move it into place unless the task was abandoned
fn commit_output(
    image: &RgbImage,
    destination: &Path,
    preserve_quality: bool,
    commit: &AtomicU8,
) -> Result<()> {
    let staging = staging_path(destination);
    if let Err(e) = ImageIOService::save_image(image, &staging, preserve_quality) {
        discard_staging(&staging);
        return Err(e);
    }

    let committed = commit
        .compare_exchange(
            PIPELINE_RUNNING,
            PIPELINE_COMMITTED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
        .is_ok();
    if !committed {
        discard_staging(&staging);
        return Err(WatermarkError::processing("Processing abandoned after timeout"));
    }

    std::fs::rename(&staging, destination).map_err(|e| {
        discard_staging(&staging);
        WatermarkError::file_io_error("move output into place", destination, &e)
    })
}

fn discard_staging(staging: &Path) {
    if let Err(e) = std::fs::remove_file(staging) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Failed to remove staged output");
        }
    }
}

/// Batch watermark removal processor
///
/// # Examples
/// ```rust,no_run
/// use clean_watermarks::{ProcessingOptions, Settings, WatermarkProcessor};
///
/// # async fn example() -> clean_watermarks::Result<()> {
/// let processor = WatermarkProcessor::new(Settings::default())?;
/// let job = processor.create_job(vec!["photo.jpg".to_string()]).await?;
/// let report = processor.process_job(&job.id, ProcessingOptions::default()).await?;
/// println!("{} of {} images cleaned", report.completed_images, report.total_images);
/// # Ok(())
/// # }
/// ```
pub struct WatermarkProcessor {
    settings: Settings,
    runner: TaskRunner,
    jobs: RwLock<HashMap<String, SharedJob>>,
}

impl WatermarkProcessor {
    /// Create a processor with the default OCR and learned-model factories
    ///
    /// # Errors
    /// - Invalid settings
    pub fn new(settings: Settings) -> Result<Self> {
        let detector = WatermarkDetector::new(settings.ocr_settings());
        let inpainter = WatermarkInpainter::new(settings.clone());
        Self::with_services(settings, detector, inpainter)
    }

    /// Create a processor with custom OCR and learned-model factories
    ///
    /// # Errors
    /// - Invalid settings
    pub fn with_factories(
        settings: Settings,
        recognizer_factory: Box<dyn TextRecognizerFactory>,
        model_factory: Box<dyn InpaintModelFactory>,
    ) -> Result<Self> {
        let detector = WatermarkDetector::with_factory(settings.ocr_settings(), recognizer_factory);
        let inpainter = WatermarkInpainter::with_factory(settings.clone(), model_factory);
        Self::with_services(settings, detector, inpainter)
    }

    fn with_services(
        settings: Settings,
        detector: WatermarkDetector,
        inpainter: WatermarkInpainter,
    ) -> Result<Self> {
        settings.validate()?;
        settings.setup_directories()?;
        let runner = TaskRunner {
            storage: JobStorage::new(&settings.upload_dir, &settings.output_dir),
            detector: Arc::new(detector),
            inpainter: Arc::new(inpainter),
            reporter: Arc::new(NoOpProgressReporter),
            slots: Arc::new(Semaphore::new(settings.max_workers)),
            timeout: Duration::from_secs(settings.processing_timeout_secs),
        };
        Ok(Self {
            settings,
            runner,
            jobs: RwLock::new(HashMap::new()),
        })
    }

    /// Report job progress to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn JobProgressReporter>) -> Self {
        self.runner.reporter = reporter;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn storage(&self) -> &JobStorage {
        &self.runner.storage
    }

    #[must_use]
    pub fn detector(&self) -> &Arc<WatermarkDetector> {
        &self.runner.detector
    }

    #[must_use]
    pub fn inpainter(&self) -> &Arc<WatermarkInpainter> {
        &self.runner.inpainter
    }

    /// Register a new pending job with one task per file name
    ///
    /// Returns a snapshot of the created job.
    ///
    /// # Errors
    /// - Empty file list
    /// - More files than `max_batch_size`
    /// - A name that is not a bare file name (separators, `..`, padding)
    pub async fn create_job(&self, filenames: Vec<String>) -> Result<BatchJob> {
        if filenames.is_empty() {
            return Err(WatermarkError::invalid_config("No files provided"));
        }
        if filenames.len() > self.settings.max_batch_size {
            return Err(WatermarkError::invalid_config(format!(
                "Maximum {} images per batch, got {}",
                self.settings.max_batch_size,
                filenames.len()
            )));
        }
        if let Some(name) = filenames.iter().find(|name| !is_plain_file_name(name)) {
            return Err(WatermarkError::invalid_config(format!(
                "Invalid file name '{name}'"
            )));
        }

        let mut job = BatchJob::new(filenames);
        for task in &mut job.tasks {
            task.original_path = Some(self.runner.storage.input_path(&job.id, &task.filename));
        }

        let snapshot = job.clone();
        self.jobs
            .write()
            .await
            .insert(job.id.clone(), Arc::new(Mutex::new(job)));

        info!(job_id = %snapshot.id, images = snapshot.total_images, "Created job");
        Ok(snapshot)
    }

    /// Write uploaded files into the job's upload directory
    ///
    /// Every file is validated before anything is written. When a stored name
    /// had to be changed to avoid a collision, the matching task is renamed so
    /// workers read the stored file. Returns the stored file names in order.
    ///
    /// # Errors
    /// - Job not found
    /// - Disallowed extension or file larger than `max_upload_size`
    /// - File system failures
    pub async fn save_uploaded_files(
        &self,
        job_id: &str,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<String>> {
        let job = self.job_handle(job_id).await?;

        for (filename, data) in &files {
            if !self.settings.is_allowed_extension(filename) {
                return Err(WatermarkError::invalid_config(format!(
                    "File type not allowed: {filename}"
                )));
            }
            if data.len() as u64 > self.settings.max_upload_size {
                return Err(WatermarkError::invalid_config(format!(
                    "File {filename} exceeds the maximum upload size of {} bytes",
                    self.settings.max_upload_size
                )));
            }
        }

        let storage = self.runner.storage.clone();
        let target = job_id.to_string();
        let stored = tokio::task::spawn_blocking(move || {
            files
                .iter()
                .map(|(filename, data)| {
                    storage
                        .store_upload(&target, filename, data)
                        .map(|stored| (filename.clone(), stored))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| WatermarkError::internal(format!("Upload writer failed: {e}")))??;

        let mut guard = job.lock().await;
        let mut claimed = vec![false; guard.tasks.len()];
        for (original, stored_name) in &stored {
            let slot = guard
                .tasks
                .iter()
                .zip(&claimed)
                .position(|(task, taken)| !taken && task.filename == *original);
            let Some(i) = slot else { continue };
            if let (Some(task), Some(taken)) = (guard.tasks.get_mut(i), claimed.get_mut(i)) {
                *taken = true;
                task.filename.clone_from(stored_name);
                task.original_path = Some(self.runner.storage.input_path(job_id, stored_name));
            }
        }
        drop(guard);

        info!(job_id, files = stored.len(), "Saved uploaded files");
        Ok(stored.into_iter().map(|(_, stored_name)| stored_name).collect())
    }

    /// Snapshot of a job
    pub async fn get_job(&self, job_id: &str) -> Option<BatchJob> {
        let job = self.jobs.read().await.get(job_id).cloned()?;
        let snapshot = job.lock().await.clone();
        Some(snapshot)
    }

    /// Ids of all registered jobs
    pub async fn list_jobs(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Status report of a job
    ///
    /// # Errors
    /// - Job not found
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusReport> {
        let job = self.job_handle(job_id).await?;
        let report = job.lock().await.status_report();
        Ok(report)
    }

    /// Output path of a completed task
    pub async fn processed_image_path(&self, job_id: &str, task_id: &str) -> Option<PathBuf> {
        let job = self.get_job(job_id).await?;
        job.task(task_id)
            .filter(|task| task.status == ProcessingStatus::Completed)
            .and_then(|task| task.processed_path.clone())
    }

    /// Process every task of a pending job and wait for all of them
    ///
    /// Tasks run on the shared worker pool; a failed task does not affect its
    /// siblings. After the join the job is `failed` if every task failed and
    /// `completed` otherwise.
    ///
    /// # Errors
    /// - Invalid options
    /// - Job not found
    /// - Job not in the `pending` state
    #[instrument(skip(self, options))]
    pub async fn process_job(
        &self,
        job_id: &str,
        options: ProcessingOptions,
    ) -> Result<JobStatusReport> {
        options.validate()?;
        let job = self.job_handle(job_id).await?;

        let task_count = {
            let mut guard = job.lock().await;
            if guard.status != ProcessingStatus::Pending {
                return Err(WatermarkError::invalid_job_state(job_id, guard.status));
            }
            guard.status = ProcessingStatus::Detecting;
            guard.tasks.len()
        };

        info!(
            tasks = task_count,
            method = %options.inpainting_method,
            auto_detect = options.auto_detect,
            "Starting job processing"
        );
        self.runner.reporter.on_job_start(job_id, task_count);
        let start = Instant::now();

        let options = Arc::new(options);
        let job_span = spans::job_processing(job_id, task_count);
        let handles: Vec<_> = (0..task_count)
            .map(|index| {
                let runner = self.runner.clone();
                let job = Arc::clone(&job);
                let options = Arc::clone(&options);
                let job_id = job_id.to_string();
                tokio::spawn(
                    async move { runner.run(job, job_id, index, options).await }
                        .instrument(job_span.clone()),
                )
            })
            .collect();

        let results = futures::future::join_all(handles).instrument(job_span).await;

        let report = {
            let mut guard = job.lock().await;
            for (index, joined) in results.into_iter().enumerate() {
                let result = joined
                    .map_err(|e| WatermarkError::internal(format!("Worker panicked: {e}")))
                    .and_then(|result| result);
                match result {
                    Ok(_) => guard.completed_images += 1,
                    Err(e) => {
                        if let Some(task) = guard.tasks.get_mut(index) {
                            task.mark_failed(e.to_string());
                        }
                        guard.failed_images += 1;
                    },
                }
            }
            guard.status = guard.final_status();
            guard.completed_at = Some(Utc::now());
            guard.status_report()
        };

        events::performance_metric("process_job", start.elapsed().as_millis() as u64);
        if report.status == ProcessingStatus::Failed {
            warn!(failed = report.failed_images, "Job failed: every image failed");
        } else {
            info!(
                completed = report.completed_images,
                failed = report.failed_images,
                total = report.total_images,
                "Job completed"
            );
        }
        self.runner.reporter.on_job_complete(&report);
        Ok(report)
    }

    /// Delete a job's directories and registry entry
    ///
    /// Returns whether the job was registered. Calling this for an unknown or
    /// already-removed job is a no-op apart from removing leftover directories.
    ///
    /// # Errors
    /// - Directory removal failures
    pub async fn cleanup_job(&self, job_id: &str) -> Result<bool> {
        let removed = self.jobs.write().await.remove(job_id).is_some();
        self.runner.storage.remove_job_dirs(job_id).await?;
        if removed {
            info!(job_id, "Cleaned up job");
        }
        Ok(removed)
    }

    /// Which backends have been initialized
    #[must_use]
    pub fn models_loaded(&self) -> ModelStatus {
        ModelStatus {
            ocr: self.runner.detector.is_ocr_initialized(),
            inpainting: self.runner.inpainter.is_model_loaded(),
        }
    }

    /// Health snapshot of the service
    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            gpu_available: self.settings.execution_provider.uses_gpu(),
            models_loaded: self.models_loaded(),
            ocr_available: self.runner.detector.is_ocr_available(),
            registered_jobs: self.jobs.read().await.len(),
        }
    }

    async fn job_handle(&self, job_id: &str) -> Result<SharedJob> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| WatermarkError::job_not_found(job_id))
    }
}

impl std::fmt::Debug for WatermarkProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkProcessor")
            .field("max_workers", &self.settings.max_workers)
            .field("storage", &self.runner.storage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DefaultTextRecognizerFactory;
    use crate::inpainting::DefaultInpaintModelFactory;
    use crate::job::InpaintingMethod;
    use crate::region::RegionType;
    use image::Rgb;
    use tempfile::TempDir;

    fn processor(dir: &TempDir) -> WatermarkProcessor {
        let settings = Settings::builder()
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("outputs"))
            .max_batch_size(3)
            .max_upload_size(1024)
            .build()
            .unwrap();
        WatermarkProcessor::with_factories(
            settings,
            Box::new(DefaultTextRecognizerFactory),
            Box::new(DefaultInpaintModelFactory),
        )
        .unwrap()
    }

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(16, 16, Rgb(color));
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn manual_only() -> ProcessingOptions {
        ProcessingOptions {
            auto_detect: false,
            inpainting_method: InpaintingMethod::Telea,
            manual_regions: vec![WatermarkRegion::new(0.25, 0.25, 0.25, 0.25, 1.0, RegionType::Text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_job_limits() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        assert!(processor.create_job(Vec::new()).await.is_err());

        let too_many = (0..4).map(|i| format!("{i}.png")).collect();
        assert!(matches!(
            processor.create_job(too_many).await,
            Err(WatermarkError::InvalidConfig(_))
        ));

        let job = processor.create_job(vec!["a.png".to_string()]).await.unwrap();
        assert_eq!(job.status, ProcessingStatus::Pending);
        assert_eq!(
            job.tasks[0].original_path,
            Some(dir.path().join("uploads").join(&job.id).join("a.png"))
        );
        assert_eq!(processor.list_jobs().await, vec![job.id.clone()]);
    }

    #[tokio::test]
    async fn test_create_job_rejects_names_that_leave_the_job_dir() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("outputs").is_dir());

        for name in ["../escape.png", "sub/a.png", "/etc/passwd.png", "..", " a.png"] {
            let result = processor
                .create_job(vec!["ok.png".to_string(), name.to_string()])
                .await;
            let message = result.unwrap_err().to_string();
            assert!(message.contains(name), "{name}: {message}");
        }
        assert!(processor.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_uploaded_files_validates_and_renames() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let job = processor
            .create_job(vec!["a.png".to_string(), "a.png".to_string()])
            .await
            .unwrap();

        let rejected = processor
            .save_uploaded_files(&job.id, vec![("notes.txt".to_string(), b"x".to_vec())])
            .await;
        assert!(rejected.is_err());
        let oversized = processor
            .save_uploaded_files(&job.id, vec![("big.png".to_string(), vec![0; 2048])])
            .await;
        assert!(oversized.is_err());

        let stored = processor
            .save_uploaded_files(
                &job.id,
                vec![
                    ("a.png".to_string(), png_bytes([1, 1, 1])),
                    ("a.png".to_string(), png_bytes([2, 2, 2])),
                ],
            )
            .await
            .unwrap();
        assert_eq!(stored[0], "a.png");
        assert_ne!(stored[1], "a.png");

        let snapshot = processor.get_job(&job.id).await.unwrap();
        assert_eq!(snapshot.tasks[0].filename, stored[0]);
        assert_eq!(snapshot.tasks[1].filename, stored[1]);
    }

    #[tokio::test]
    async fn test_process_job_with_manual_regions() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let job = processor.create_job(vec!["a.png".to_string()]).await.unwrap();
        processor
            .save_uploaded_files(&job.id, vec![("a.png".to_string(), png_bytes([90, 90, 90]))])
            .await
            .unwrap();

        let report = processor.process_job(&job.id, manual_only()).await.unwrap();
        assert_eq!(report.status, ProcessingStatus::Completed);
        assert_eq!(report.completed_images, 1);
        assert!(report.download_ready);
        assert_eq!(report.tasks[0].regions.len(), 1);

        let task_id = &report.tasks[0].id;
        let path = processor.processed_image_path(&job.id, task_id).await.unwrap();
        assert!(path.ends_with("cleaned_a.png"));
        assert_eq!(ImageIOService::load_image(&path).unwrap().dimensions(), (16, 16));
    }

    #[tokio::test]
    async fn test_process_job_rejections() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        assert!(matches!(
            processor.process_job("missing", manual_only()).await,
            Err(WatermarkError::JobNotFound(_))
        ));

        let job = processor.create_job(vec!["a.png".to_string()]).await.unwrap();
        let bad_options = ProcessingOptions {
            detection_confidence: 0.1,
            ..Default::default()
        };
        assert!(processor.process_job(&job.id, bad_options).await.is_err());
        assert_eq!(processor.get_job(&job.id).await.unwrap().status, ProcessingStatus::Pending);

        let report = processor.process_job(&job.id, manual_only()).await.unwrap();
        assert_eq!(report.status, ProcessingStatus::Failed);
        let again = processor.process_job(&job.id, manual_only()).await;
        assert!(matches!(again, Err(WatermarkError::InvalidJobState { .. })));
    }

    #[tokio::test]
    async fn test_missing_upload_fails_task_with_message() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let job = processor.create_job(vec!["ghost.png".to_string()]).await.unwrap();
        let report = processor.process_job(&job.id, manual_only()).await.unwrap();
        assert_eq!(report.failed_images, 1);
        assert_eq!(report.tasks[0].status, ProcessingStatus::Failed);
        assert!(report.tasks[0].error.as_deref().unwrap().contains("ghost.png"));
        assert!((report.progress - 100.0).abs() < 1e-9);
        assert!(!report.download_ready);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let job = processor.create_job(vec!["a.png".to_string()]).await.unwrap();
        processor
            .save_uploaded_files(&job.id, vec![("a.png".to_string(), png_bytes([0, 0, 0]))])
            .await
            .unwrap();

        assert!(processor.cleanup_job(&job.id).await.unwrap());
        assert!(!processor.storage().upload_dir(&job.id).exists());
        assert!(processor.get_job(&job.id).await.is_none());
        assert!(!processor.cleanup_job(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_health_reports_uninitialized_models() {
        let dir = TempDir::new().unwrap();
        let processor = processor(&dir);
        let health = processor.health().await;
        assert_eq!(health.status, "healthy");
        assert!(!health.models_loaded.ocr);
        assert!(!health.models_loaded.inpainting);
        assert!(!health.ocr_available);
        assert_eq!(health.registered_jobs, 0);
    }
}
