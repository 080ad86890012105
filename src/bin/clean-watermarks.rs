//! Clean Watermarks CLI Tool
//!
//! Command-line interface for batch watermark detection and removal.

use clean_watermarks::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
