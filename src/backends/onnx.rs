//! ONNX Runtime LaMa inpainting model
//!
//! Runs a LaMa export taking two positional inputs, image `[1, 3, S, S]` in
//! `[0, 1]` and mask `[1, 1, S, S]` in `{0, 1}`, and producing `[1, 3, S, S]`.
//! Supports CPU, CUDA and `CoreML` execution providers.

use crate::config::ExecutionProvider;
use crate::error::{Result, WatermarkError};
use crate::inpainting::model::{
    composite_masked, image_to_tensor, mask_to_tensor, tensor_to_image, InpaintModel,
};
use image::{GrayImage, RgbImage};
use instant::Instant;
use ndarray::{Array4, Ix4};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Value;
use std::path::Path;

/// LaMa inpainting model backed by an ONNX Runtime session
#[derive(Debug)]
pub struct LamaOnnxModel {
    session: Session,
    input_size: u32,
}

impl LamaOnnxModel {
    /// List ONNX Runtime execution providers with their availability
    ///
    /// Returns `(name, available, description)` tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda = OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
            .unwrap_or(false);
        let coreml = OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
            .unwrap_or(false);
        vec![
            ("CPU".to_string(), true, "Always available".to_string()),
            ("CUDA".to_string(), cuda, "NVIDIA GPU acceleration".to_string()),
            ("CoreML".to_string(), coreml, "Apple Silicon acceleration".to_string()),
        ]
    }

    /// Load a LaMa model from an ONNX file
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Session creation or provider configuration failures
    pub fn load<P: AsRef<Path>>(
        path: P,
        input_size: u32,
        provider: ExecutionProvider,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(WatermarkError::model(format!(
                "LaMa model not found at '{}'",
                path.display()
            )));
        }

        let start = Instant::now();
        let builder = Session::builder()
            .map_err(|e| {
                WatermarkError::model(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                WatermarkError::model(format!("Failed to set optimization level: {e}"))
            })?;

        let intra_threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);

        let session = with_execution_provider(builder, provider)?
            .with_intra_threads(intra_threads)
            .map_err(|e| WatermarkError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                WatermarkError::model(format!(
                    "Failed to load LaMa model '{}': {e}",
                    path.display()
                ))
            })?;

        tracing::info!(
            model = %path.display(),
            input_size,
            provider = %provider,
            load_ms = start.elapsed().as_millis() as u64,
            "LaMa model loaded"
        );

        Ok(Self {
            session,
            input_size,
        })
    }

    fn run(&mut self, image: Array4<f32>, mask: Array4<f32>) -> Result<Array4<f32>> {
        let image_value = Value::from_array(image).map_err(|e| {
            WatermarkError::inference(format!("Failed to convert image tensor: {e}"))
        })?;
        let mask_value = Value::from_array(mask).map_err(|e| {
            WatermarkError::inference(format!("Failed to convert mask tensor: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![image_value, mask_value])
            .map_err(|e| WatermarkError::inference(format!("LaMa inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| WatermarkError::inference("LaMa produced no outputs"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| WatermarkError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| WatermarkError::inference(format!("Failed to extract output: {e}")))?;

        output
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| WatermarkError::inference(format!("Unexpected output rank: {e}")))
    }
}

impl InpaintModel for LamaOnnxModel {
    fn inpaint(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        let start = Instant::now();
        let image_tensor = image_to_tensor(image, self.input_size);
        let mask_tensor = mask_to_tensor(mask, self.input_size);

        let output = self.run(image_tensor, mask_tensor)?;
        let generated = tensor_to_image(&output)?;
        let result = composite_masked(image, &generated, mask);

        tracing::debug!(
            inference_ms = start.elapsed().as_millis() as u64,
            "LaMa inpainting finished"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "lama-onnx"
    }
}

/// Configure execution providers with availability checks, falling back to CPU
fn with_execution_provider(
    builder: SessionBuilder,
    provider: ExecutionProvider,
) -> Result<SessionBuilder> {
    let cuda_available =
        || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
    let coreml_available = || {
        OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
    };

    match provider {
        ExecutionProvider::Auto => {
            let mut providers = Vec::new();
            if cuda_available() {
                tracing::info!("CUDA execution provider is available and will be used");
                providers.push(CUDAExecutionProvider::default().build());
            }
            if coreml_available() {
                tracing::info!("CoreML execution provider is available and will be used");
                providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
            }
            if providers.is_empty() {
                tracing::warn!("No hardware acceleration available, using CPU");
                return Ok(builder);
            }
            builder.with_execution_providers(providers).map_err(|e| {
                WatermarkError::model(format!("Failed to set auto execution providers: {e}"))
            })
        },
        ExecutionProvider::Cpu => {
            tracing::info!("Using CPU execution provider");
            Ok(builder)
        },
        ExecutionProvider::Cuda => {
            if cuda_available() {
                tracing::info!("Using CUDA execution provider");
                builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(|e| {
                        WatermarkError::model(format!("Failed to set CUDA execution provider: {e}"))
                    })
            } else {
                tracing::warn!("CUDA execution provider requested but not available, using CPU");
                Ok(builder)
            }
        },
        ExecutionProvider::CoreMl => {
            if coreml_available() {
                tracing::info!("Using CoreML execution provider");
                builder
                    .with_execution_providers([CoreMLExecutionProvider::default()
                        .with_subgraphs(true)
                        .build()])
                    .map_err(|e| {
                        WatermarkError::model(format!(
                            "Failed to set CoreML execution provider: {e}"
                        ))
                    })
            } else {
                tracing::warn!("CoreML execution provider requested but not available, using CPU");
                Ok(builder)
            }
        },
    }
}
