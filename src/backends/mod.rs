//! Runtime backends for learned inpainting models
//!
//! - ONNX Runtime LaMa model (CPU, CUDA and `CoreML` providers)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use self::onnx::LamaOnnxModel;
