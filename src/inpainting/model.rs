//! Learned inpainting model interface
//!
//! Models are created on first use through an [`InpaintModelFactory`]. The
//! tensor helpers here convert between images and the NCHW layout used by
//! LaMa-style models, independent of the runtime that executes them.

use crate::config::Settings;
use crate::error::{Result, WatermarkError};
use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};
use ndarray::Array4;

/// Trait for learned models that fill masked pixels
pub trait InpaintModel: Send {
    /// Fill the pixels where `mask` is nonzero, returning an image of the same size
    ///
    /// # Errors
    /// - Inference or tensor conversion failures
    fn inpaint(&mut self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage>;

    /// Model name for diagnostics
    fn name(&self) -> &str {
        "inpaint-model"
    }
}

/// Factory trait for creating learned inpainting models
pub trait InpaintModelFactory: Send + Sync {
    /// Create and load a model
    ///
    /// # Errors
    /// - Model missing, unsupported or failed to load
    fn create(&self, settings: &Settings) -> Result<Box<dyn InpaintModel>>;
}

/// Default factory: ONNX LaMa when the `onnx` feature is enabled and a model path is configured
pub struct DefaultInpaintModelFactory;

impl InpaintModelFactory for DefaultInpaintModelFactory {
    fn create(&self, settings: &Settings) -> Result<Box<dyn InpaintModel>> {
        let path = settings.lama_model_path.as_ref().ok_or_else(|| {
            WatermarkError::model("No LaMa model configured (set lama_model_path)")
        })?;

        #[cfg(feature = "onnx")]
        {
            let model = crate::backends::LamaOnnxModel::load(
                path,
                settings.lama_input_size,
                settings.execution_provider,
            )?;
            Ok(Box::new(model))
        }

        #[cfg(not(feature = "onnx"))]
        {
            Err(WatermarkError::model(format!(
                "Cannot load LaMa model '{}': ONNX support not compiled in",
                path.display()
            )))
        }
    }
}

/// Resize an image to `size`x`size` and pack it as `[1, 3, size, size]` in `[0, 1]`
#[must_use]
pub fn image_to_tensor(image: &RgbImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
        }
    }
    tensor
}

/// Resize a mask to `size`x`size` and pack it as `[1, 1, size, size]` in `{0, 1}`
#[must_use]
pub fn mask_to_tensor(mask: &GrayImage, size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(mask, size, size, FilterType::Nearest);
    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, s, s));
    for (x, y, pixel) in resized.enumerate_pixels() {
        if pixel.0[0] > 0 {
            tensor[[0, 0, y as usize, x as usize]] = 1.0;
        }
    }
    tensor
}

/// Unpack a `[1, 3, H, W]` model output into an RGB image
///
/// Outputs whose values all lie in `[0, 1]` are rescaled to `0..=255`.
///
/// # Errors
/// - Tensor shape other than `[1, 3, H, W]`
pub fn tensor_to_image(tensor: &Array4<f32>) -> Result<RgbImage> {
    let (batch, channels, height, width) = tensor.dim();
    if batch != 1 || channels != 3 {
        return Err(WatermarkError::inference(format!(
            "Expected output tensor [1, 3, H, W], got {:?}",
            tensor.dim()
        )));
    }

    let max = tensor.iter().copied().fold(f32::MIN, f32::max);
    let scale = if max <= 1.0 { 255.0 } else { 1.0 };

    let image = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let channel = |c: usize| (tensor[[0, c, y, x]] * scale).round().clamp(0.0, 255.0) as u8;
        Rgb([channel(0), channel(1), channel(2)])
    });
    Ok(image)
}

/// Copy `generated` into `original` where `mask` is nonzero
///
/// `generated` is resized to the original dimensions first.
#[must_use]
pub fn composite_masked(original: &RgbImage, generated: &RgbImage, mask: &GrayImage) -> RgbImage {
    let (width, height) = original.dimensions();
    let generated = if generated.dimensions() == (width, height) {
        generated.clone()
    } else {
        image::imageops::resize(generated, width, height, FilterType::Lanczos3)
    };

    let mut output = original.clone();
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        if mask.get_pixel_checked(x, y).is_some_and(|m| m.0[0] > 0) {
            *pixel = *generated.get_pixel(x, y);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_image_tensor_layout() {
        let image = RgbImage::from_pixel(4, 4, Rgb([255, 0, 51]));
        let tensor = image_to_tensor(&image, 8);
        assert_eq!(tensor.dim(), (1, 3, 8, 8));
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 3, 3]], 0.0);
        assert!((tensor[[0, 2, 7, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mask_tensor_is_binary() {
        let mask = GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([255]) } else { Luma([0]) });
        let tensor = mask_to_tensor(&mask, 8);
        assert_eq!(tensor.dim(), (1, 1, 8, 8));
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 0, 0, 7]], 0.0);
        assert!(tensor.iter().all(|v| *v == 0.0 || *v == 1.0));
    }

    #[test]
    fn test_tensor_to_image_rescales_unit_range() {
        let mut tensor = Array4::<f32>::zeros((1, 3, 2, 2));
        tensor[[0, 0, 0, 0]] = 1.0;
        tensor[[0, 1, 1, 1]] = 0.5;
        let image = tensor_to_image(&tensor).unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 255);
        assert_eq!(image.get_pixel(1, 1)[1], 128);

        let mut raw = Array4::<f32>::zeros((1, 3, 2, 2));
        raw[[0, 2, 0, 1]] = 200.0;
        let image = tensor_to_image(&raw).unwrap();
        assert_eq!(image.get_pixel(1, 0)[2], 200);
    }

    #[test]
    fn test_tensor_to_image_rejects_bad_shape() {
        let tensor = Array4::<f32>::zeros((1, 1, 2, 2));
        assert!(tensor_to_image(&tensor).is_err());
    }

    #[test]
    fn test_composite_only_touches_masked_pixels() {
        let original = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let generated = RgbImage::from_pixel(10, 10, Rgb([200, 100, 50]));
        let mask = GrayImage::from_fn(10, 10, |x, y| {
            if x >= 5 && y >= 5 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let out = composite_masked(&original, &generated, &mask);
        assert_eq!(*out.get_pixel(7, 7), Rgb([200, 100, 50]));
        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_default_factory_without_model_path_fails() {
        let settings = Settings::default();
        assert!(matches!(
            DefaultInpaintModelFactory.create(&settings),
            Err(WatermarkError::Model(_))
        ));
    }
}
