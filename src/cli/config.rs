//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliMethod};
use crate::{
    config::{ExecutionProvider, Settings},
    job::{InpaintingMethod, ProcessingOptions},
    region::{RegionType, WatermarkRegion},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to settings and processing options
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build settings from an optional JSON file plus flag overrides
    pub(crate) fn settings_from_cli(cli: &Cli) -> Result<Settings> {
        let mut settings = match &cli.config {
            Some(path) => Settings::from_json_file(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(dir) = &cli.output_dir {
            settings.output_dir.clone_from(dir);
        }
        if let Some(dir) = &cli.upload_dir {
            settings.upload_dir.clone_from(dir);
        }
        if let Some(workers) = cli.workers {
            settings.max_workers = workers;
        }
        if let Some(timeout) = cli.timeout {
            settings.processing_timeout_secs = timeout;
        }
        if let Some(confidence) = cli.confidence {
            settings.detection_confidence = confidence;
        }
        if let Some(method) = cli.method {
            settings.inpainting_method = method.into();
        }
        if cli.lama_model.is_some() {
            settings.lama_model_path.clone_from(&cli.lama_model);
        }
        settings.execution_provider = cli
            .execution_provider
            .parse::<ExecutionProvider>()
            .context("Invalid execution provider")?;

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    /// Build per-job processing options from flags and settings defaults
    pub(crate) fn options_from_cli(cli: &Cli, settings: &Settings) -> Result<ProcessingOptions> {
        let manual_regions = cli
            .regions
            .iter()
            .map(|spec| Self::parse_region(spec))
            .collect::<Result<Vec<_>>>()?;

        let options = ProcessingOptions {
            auto_detect: !cli.no_auto_detect,
            detection_confidence: settings.detection_confidence,
            ocr_enabled: !cli.no_ocr,
            logo_detection: !cli.no_logo,
            inpainting_method: settings.inpainting_method,
            preserve_quality: !cli.no_preserve_quality,
            manual_regions,
        };
        options.validate().context("Invalid processing options")?;
        Ok(options)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        cli.execution_provider
            .parse::<ExecutionProvider>()
            .context("Invalid execution provider")?;

        if cli.no_auto_detect && cli.regions.is_empty() {
            anyhow::bail!("--no-auto-detect requires at least one --region");
        }
        for spec in &cli.regions {
            Self::parse_region(spec)?;
        }
        if let Some(path) = &cli.lama_model {
            if !path.is_file() {
                anyhow::bail!("LaMa model not found: {}", path.display());
            }
        }
        Ok(())
    }

    /// Parse a normalized `x,y,w,h` region
    pub(crate) fn parse_region(spec: &str) -> Result<WatermarkRegion> {
        let values = spec
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Region '{spec}' must be four numbers x,y,w,h"))?;

        let &[x, y, width, height] = values.as_slice() else {
            anyhow::bail!("Region '{spec}' must be four numbers x,y,w,h");
        };
        let region = WatermarkRegion::new(x, y, width, height, 1.0, RegionType::default());
        if !region.is_normalized() {
            anyhow::bail!("Region '{spec}' must lie within [0, 1]");
        }
        Ok(region)
    }
}

impl From<CliMethod> for InpaintingMethod {
    fn from(method: CliMethod) -> Self {
        match method {
            CliMethod::Lama => Self::Lama,
            CliMethod::Telea => Self::Telea,
            CliMethod::Ns => Self::Ns,
            CliMethod::Advanced => Self::Advanced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["clean-watermarks"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_settings_overrides() {
        let cli = parse(&[
            "in.png",
            "--workers",
            "2",
            "--timeout",
            "30",
            "--confidence",
            "0.8",
            "--method",
            "ns",
            "-e",
            "cpu",
            "-o",
            "/tmp/cleaned",
        ]);
        let settings = CliConfigBuilder::settings_from_cli(&cli).unwrap();
        assert_eq!(settings.max_workers, 2);
        assert_eq!(settings.processing_timeout_secs, 30);
        assert!((settings.detection_confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(settings.inpainting_method, InpaintingMethod::Ns);
        assert_eq!(settings.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(settings.output_dir, std::path::PathBuf::from("/tmp/cleaned"));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let cli = parse(&["in.png", "--workers", "0"]);
        assert!(CliConfigBuilder::settings_from_cli(&cli).is_err());

        let cli = parse(&["in.png", "--confidence", "0.2"]);
        assert!(CliConfigBuilder::settings_from_cli(&cli).is_err());
    }

    #[test]
    fn test_options_from_flags() {
        let cli = parse(&["in.png", "--no-logo", "--no-preserve-quality", "--region", "0.1,0.2,0.3,0.1"]);
        let settings = CliConfigBuilder::settings_from_cli(&cli).unwrap();
        let options = CliConfigBuilder::options_from_cli(&cli, &settings).unwrap();
        assert!(options.auto_detect);
        assert!(options.ocr_enabled);
        assert!(!options.logo_detection);
        assert!(!options.preserve_quality);
        assert_eq!(options.inpainting_method, InpaintingMethod::Lama);
        assert_eq!(options.manual_regions.len(), 1);
        assert!((options.manual_regions[0].y - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_region() {
        assert!(CliConfigBuilder::parse_region("0.1, 0.1, 0.5, 0.5").is_ok());
        assert!(CliConfigBuilder::parse_region("0.1,0.1,0.5").is_err());
        assert!(CliConfigBuilder::parse_region("a,b,c,d").is_err());
        assert!(CliConfigBuilder::parse_region("0.8,0.8,0.5,0.5").is_err());
    }

    #[test]
    fn test_cli_validation() {
        let cli = parse(&["in.png"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        let cli = parse(&["in.png", "-e", "tpu"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["in.png", "--no-auto-detect"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["in.png", "--lama-model", "/nonexistent/lama.onnx"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }
}
