//! Services supporting job processing
//!
//! - [`io`]: image decoding, quality-aware encoding and job directory layout
//! - [`progress`]: progress reporting for frontends

pub mod io;
pub mod progress;

pub use io::{is_plain_file_name, processed_file_name, staging_path, ImageIOService, JobStorage};
pub use progress::{
    CollectingProgressReporter, ConsoleProgressReporter, JobProgressReporter,
    NoOpProgressReporter, ProgressEvent, TaskOutcome,
};
