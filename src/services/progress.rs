//! Progress reporting service
//!
//! This module separates progress reporting concerns from job orchestration,
//! allowing different frontends to implement their own progress handling.

use crate::job::{JobStatusReport, ProcessingStatus};
use std::sync::Mutex;

/// Result of one finished image task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub job_id: String,
    pub task_id: String,
    pub filename: String,
    /// Number of regions that were inpainted
    pub regions: usize,
    pub processing_time_ms: u64,
}

/// Trait for reporting progress while a job is processed
///
/// Callbacks may arrive concurrently from different workers; task callbacks
/// within a job arrive in completion order, not submission order.
pub trait JobProgressReporter: Send + Sync {
    /// Called once when a job starts processing
    fn on_job_start(&self, job_id: &str, total_images: usize);

    /// Called when a worker picks up a task
    fn on_task_start(&self, job_id: &str, task_id: &str, filename: &str);

    /// Called when a task completes
    fn on_task_complete(&self, outcome: &TaskOutcome);

    /// Called when a task fails
    fn on_task_error(&self, job_id: &str, task_id: &str, filename: &str, error: &str);

    /// Called once after every task has resolved
    fn on_job_complete(&self, report: &JobStatusReport);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl JobProgressReporter for NoOpProgressReporter {
    fn on_job_start(&self, _job_id: &str, _total_images: usize) {}

    fn on_task_start(&self, _job_id: &str, _task_id: &str, _filename: &str) {}

    fn on_task_complete(&self, _outcome: &TaskOutcome) {}

    fn on_task_error(&self, _job_id: &str, _task_id: &str, _filename: &str, _error: &str) {}

    fn on_job_complete(&self, _report: &JobStatusReport) {}
}

/// Console progress reporter that emits tracing events
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to report task starts and per-task timings
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl JobProgressReporter for ConsoleProgressReporter {
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        tracing::info!(job_id, total_images, "Processing job");
    }

    fn on_task_start(&self, job_id: &str, task_id: &str, filename: &str) {
        if self.verbose {
            tracing::info!(job_id, task_id, filename, "Processing image");
        }
    }

    fn on_task_complete(&self, outcome: &TaskOutcome) {
        if self.verbose {
            tracing::info!(
                job_id = %outcome.job_id,
                filename = %outcome.filename,
                regions = outcome.regions,
                elapsed_ms = outcome.processing_time_ms,
                "Image cleaned"
            );
        } else {
            tracing::info!(filename = %outcome.filename, "Image cleaned");
        }
    }

    fn on_task_error(&self, job_id: &str, task_id: &str, filename: &str, error: &str) {
        tracing::error!(job_id, task_id, filename, error, "Image failed");
    }

    fn on_job_complete(&self, report: &JobStatusReport) {
        let status = report.status;
        if status == ProcessingStatus::Failed {
            tracing::error!(
                job_id = %report.job_id,
                failed = report.failed_images,
                "Job failed: no image could be processed"
            );
        } else {
            tracing::info!(
                job_id = %report.job_id,
                completed = report.completed_images,
                failed = report.failed_images,
                total = report.total_images,
                "Job {status}"
            );
        }
    }
}

/// Event recorded by [`CollectingProgressReporter`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    JobStarted { job_id: String, total_images: usize },
    TaskStarted { task_id: String, filename: String },
    TaskCompleted(TaskOutcome),
    TaskFailed { task_id: String, filename: String, error: String },
    JobCompleted(JobStatusReport),
}

/// Reporter that records every callback, in arrival order
#[derive(Default)]
pub struct CollectingProgressReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn push(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl JobProgressReporter for CollectingProgressReporter {
    fn on_job_start(&self, job_id: &str, total_images: usize) {
        self.push(ProgressEvent::JobStarted {
            job_id: job_id.to_string(),
            total_images,
        });
    }

    fn on_task_start(&self, _job_id: &str, task_id: &str, filename: &str) {
        self.push(ProgressEvent::TaskStarted {
            task_id: task_id.to_string(),
            filename: filename.to_string(),
        });
    }

    fn on_task_complete(&self, outcome: &TaskOutcome) {
        self.push(ProgressEvent::TaskCompleted(outcome.clone()));
    }

    fn on_task_error(&self, _job_id: &str, task_id: &str, filename: &str, error: &str) {
        self.push(ProgressEvent::TaskFailed {
            task_id: task_id.to_string(),
            filename: filename.to_string(),
            error: error.to_string(),
        });
    }

    fn on_job_complete(&self, report: &JobStatusReport) {
        self.push(ProgressEvent::JobCompleted(report.clone()));
    }
}
