//! Watermark removal CLI tool
//!
//! Copies the given images into a job, processes the job with the shared
//! worker pool and writes the cleaned images to the output directory.

use super::config::CliConfigBuilder;
use crate::{
    config::Settings,
    job::{JobStatusReport, ProcessingStatus},
    processor::WatermarkProcessor,
    services::{is_plain_file_name, JobProgressReporter, TaskOutcome},
    tracing_config::{events, init_cli_tracing, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watermark removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "clean-watermarks")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Vec<PathBuf>,

    /// Root directory for cleaned images (written to <DIR>/<job id>/cleaned_<file>)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Root directory for the job's input copies
    #[arg(long, value_name = "DIR")]
    pub upload_dir: Option<PathBuf>,

    /// JSON settings file; flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of images processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Per-image timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Detection confidence threshold (0.5-0.95)
    #[arg(short, long)]
    pub confidence: Option<f32>,

    /// Inpainting method
    #[arg(short, long, value_enum)]
    pub method: Option<CliMethod>,

    /// Disable OCR text detection
    #[arg(long)]
    pub no_ocr: bool,

    /// Disable logo detection
    #[arg(long)]
    pub no_logo: bool,

    /// Skip detection and only remove --region areas
    #[arg(long)]
    pub no_auto_detect: bool,

    /// Manual region as normalized x,y,w,h (repeatable)
    #[arg(long = "region", value_name = "X,Y,W,H")]
    pub regions: Vec<String>,

    /// Path to a LaMa ONNX model
    #[arg(long, value_name = "PATH")]
    pub lama_model: Option<PathBuf>,

    /// Execution provider for the LaMa model (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Encode outputs with default settings instead of format-matched quality
    #[arg(long)]
    pub no_preserve_quality: bool,

    /// Print the final job report as JSON
    #[arg(long)]
    pub json: bool,

    /// Keep the job's input copies after processing
    #[arg(long)]
    pub keep_uploads: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMethod {
    Lama,
    Telea,
    Ns,
    Advanced,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let settings = CliConfigBuilder::settings_from_cli(&cli).context("Failed to build settings")?;
    let mut options =
        CliConfigBuilder::options_from_cli(&cli, &settings).context("Invalid processing options")?;

    let files = collect_input_files(&cli.input, cli.recursive)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }
    if files.len() > settings.max_batch_size {
        anyhow::bail!(
            "Found {} images but at most {} can be processed per run",
            files.len(),
            settings.max_batch_size
        );
    }
    info!(images = files.len(), "Found images to process");

    let bar = Arc::new(ProgressBarReporter::new(files.len(), cli.json));
    let processor = WatermarkProcessor::new(settings)
        .context("Failed to create processor")?
        .with_reporter(bar);

    if options.ocr_enabled && !processor.detector().is_ocr_available() {
        events::warning_with_recommendation(
            "No OCR engine available in this build, text detection disabled",
            "pass --no-ocr to silence this warning",
        );
        options.ocr_enabled = false;
    }

    let uploads = select_uploads(&files, processor.settings());
    if uploads.is_empty() {
        anyhow::bail!("None of the inputs could be read");
    }

    let job = processor
        .create_job(uploads.iter().map(|(name, _)| name.clone()).collect())
        .await
        .context("Failed to create job")?;
    // One file in memory at a time; a file that can't be copied fails its task
    for (name, path) in uploads {
        let copied = match tokio::fs::read(&path).await {
            Ok(data) => processor
                .save_uploaded_files(&job.id, vec![(name, data)])
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        if let Err(e) = copied {
            warn!("Failed to copy {} into the job: {e:#}", path.display());
        }
    }

    let report = processor
        .process_job(&job.id, options)
        .await
        .context("Failed to process job")?;

    if !cli.keep_uploads {
        let upload_dir = processor.storage().upload_dir(&job.id);
        if let Err(e) = tokio::fs::remove_dir_all(&upload_dir).await {
            events::error_with_context(&e, &format!("removing {}", upload_dir.display()));
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize job report")?
        );
    } else {
        print_summary(&report, &processor.storage().output_dir(&job.id));
    }

    if report.status == ProcessingStatus::Failed {
        anyhow::bail!("All {} images failed", report.failed_images);
    }
    Ok(())
}

/// Initialize tracing based on verbosity and format flags
fn init_tracing(cli: &Cli) -> Result<()> {
    let format = match cli.log_format {
        CliLogFormat::Console => TracingFormat::Console,
        CliLogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => TracingFormat::Json,
    };

    init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing subscriber")?;

    debug!(verbosity = cli.verbose, "Tracing initialized");
    Ok(())
}

fn show_provider_diagnostics() {
    println!("Execution providers for LaMa inpainting");

    #[cfg(feature = "onnx")]
    for (name, available, description) in crate::backends::LamaOnnxModel::list_providers() {
        let status = if available { "available" } else { "not available" };
        println!("  {name}: {status} - {description}");
    }

    #[cfg(not(feature = "onnx"))]
    println!("  ONNX support not compiled in; the advanced classical method is used instead");
}

/// Expand files and directories into a sorted list of supported images
fn collect_input_files(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if is_image_file(input) {
                files.push(input.clone());
            } else {
                warn!("Skipping unsupported file: {}", input.display());
            }
        } else if input.is_dir() {
            files.extend(find_image_files(input, recursive)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            );
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    crate::services::ImageIOService::is_supported_format(path)
}

/// Pick the inputs the job would accept, paired with their job file names
fn select_uploads(files: &[PathBuf], settings: &Settings) -> Vec<(String, PathBuf)> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping file with a non UTF-8 name: {}", path.display());
            continue;
        };
        if !is_plain_file_name(name) {
            warn!("Skipping file with an unusable name: {}", path.display());
            continue;
        }
        if !settings.is_allowed_extension(name) {
            warn!("Skipping file type not allowed by settings: {}", path.display());
            continue;
        }
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > settings.max_upload_size => {
                warn!("Skipping oversized file: {}", path.display());
            },
            Ok(_) => uploads.push((name.to_string(), path.clone())),
            Err(e) => warn!("Skipping unreadable file {}: {e}", path.display()),
        }
    }
    uploads
}

fn print_summary(report: &JobStatusReport, output_dir: &Path) {
    println!(
        "Processed {} image(s): {} cleaned, {} failed",
        report.total_images, report.completed_images, report.failed_images
    );
    for task in &report.tasks {
        match (&task.status, &task.error) {
            (ProcessingStatus::Completed, _) => println!(
                "  ok      {} ({} regions, {} ms)",
                task.filename,
                task.regions.len(),
                task.processing_time_ms.unwrap_or_default()
            ),
            (_, Some(error)) => println!("  failed  {}: {error}", task.filename),
            (status, None) => println!("  {status}  {}", task.filename),
        }
    }
    if report.completed_images > 0 {
        println!("Output: {}", output_dir.display());
    }
}

/// Progress bar driven by job progress callbacks
struct ProgressBarReporter {
    bar: ProgressBar,
}

impl ProgressBarReporter {
    fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden || total < 2 {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl JobProgressReporter for ProgressBarReporter {
    fn on_job_start(&self, _job_id: &str, total_images: usize) {
        self.bar.set_length(total_images as u64);
    }

    fn on_task_start(&self, _job_id: &str, _task_id: &str, filename: &str) {
        self.bar.set_message(format!("Processing {filename}"));
    }

    fn on_task_complete(&self, outcome: &TaskOutcome) {
        self.bar.inc(1);
        debug!(
            filename = %outcome.filename,
            regions = outcome.regions,
            elapsed_ms = outcome.processing_time_ms,
            "Image cleaned"
        );
    }

    fn on_task_error(&self, _job_id: &str, _task_id: &str, filename: &str, error: &str) {
        self.bar.inc(1);
        self.bar.suspend(|| warn!("Failed to process {filename}: {error}"));
    }

    fn on_job_complete(&self, _report: &JobStatusReport) {
        self.bar.finish_and_clear();
    }
}
