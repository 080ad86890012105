//! Watermark inpainting
//!
//! [`WatermarkInpainter`] turns regions into a mask and dispatches to one of
//! the fill methods. The learned model is created on first use; when it is
//! unavailable or fails, the advanced multi-pass method is used instead.

pub mod advanced;
pub mod mask;
pub mod model;
pub mod navier_stokes;
pub mod telea;

pub use advanced::inpaint_advanced;
pub use mask::create_mask;
pub use model::{DefaultInpaintModelFactory, InpaintModel, InpaintModelFactory};
pub use navier_stokes::inpaint_navier_stokes;
pub use telea::inpaint_telea;

use crate::config::Settings;
use crate::error::{Result, WatermarkError};
use crate::job::InpaintingMethod;
use crate::region::WatermarkRegion;
use image::{GrayImage, RgbImage};
use instant::Instant;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Radius used by the single-pass classical methods
pub const CLASSICAL_RADIUS: u32 = 5;

enum ModelState {
    Uninitialized,
    Ready(Box<dyn InpaintModel>),
    Unavailable,
}

/// Removes watermarks by filling masked regions
pub struct WatermarkInpainter {
    settings: Settings,
    model_factory: Box<dyn InpaintModelFactory>,
    model: Mutex<ModelState>,
}

impl WatermarkInpainter {
    /// Create an inpainter using the default model factory
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self::with_factory(settings, Box::new(DefaultInpaintModelFactory))
    }

    /// Create an inpainter with a custom learned-model factory
    #[must_use]
    pub fn with_factory(settings: Settings, model_factory: Box<dyn InpaintModelFactory>) -> Self {
        Self {
            settings,
            model_factory,
            model: Mutex::new(ModelState::Uninitialized),
        }
    }

    /// Whether the learned model has been loaded successfully
    #[must_use]
    pub fn is_model_loaded(&self) -> bool {
        self.model
            .lock()
            .map(|state| matches!(*state, ModelState::Ready(_)))
            .unwrap_or(false)
    }

    /// Fill the given regions using `method`
    ///
    /// Returns the result and elapsed milliseconds. An empty region list
    /// returns an unchanged copy and 0 ms.
    #[instrument(
        skip(self, image, regions),
        fields(regions = regions.len(), method = %method)
    )]
    pub fn inpaint(
        &self,
        image: &RgbImage,
        regions: &[WatermarkRegion],
        method: InpaintingMethod,
    ) -> Result<(RgbImage, u64)> {
        if regions.is_empty() {
            return Ok((image.clone(), 0));
        }

        let start = Instant::now();
        let mask = create_mask(regions, image.width(), image.height());
        debug!(
            masked_pixels = mask::masked_pixel_count(&mask),
            "Mask created"
        );

        let result = match method {
            InpaintingMethod::Lama => self.inpaint_learned(image, &mask)?,
            InpaintingMethod::Telea => inpaint_telea(image, &mask, CLASSICAL_RADIUS),
            InpaintingMethod::Ns => inpaint_navier_stokes(image, &mask, CLASSICAL_RADIUS),
            InpaintingMethod::Advanced => inpaint_advanced(image, &mask),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(elapsed_ms, method = %method, "Inpainting completed");
        Ok((result, elapsed_ms))
    }

    /// Learned fill with fallback to the advanced method
    fn inpaint_learned(&self, image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
        let mut state = self.model.lock().unwrap_or_else(|poisoned| {
            // A model that panicked mid-inference is not trusted again
            let mut state = poisoned.into_inner();
            if matches!(*state, ModelState::Ready(_)) {
                warn!("Learned model panicked during inference, disabling it");
                *state = ModelState::Unavailable;
            }
            state
        });

        if matches!(*state, ModelState::Uninitialized) {
            *state = self.load_model();
        }

        if let ModelState::Ready(model) = &mut *state {
            match model.inpaint(image, mask) {
                Ok(result) => return Ok(result),
                Err(e) => warn!(
                    model = model.name(),
                    error = %e,
                    "Learned inpainting failed, falling back to advanced method"
                ),
            }
        } else {
            debug!("Learned model not available, using advanced method");
        }
        drop(state);

        Ok(inpaint_advanced(image, mask))
    }

    fn load_model(&self) -> ModelState {
        info!("Initializing inpainting model");
        let start = Instant::now();
        match self.model_factory.create(&self.settings) {
            Ok(model) => {
                info!(
                    model = model.name(),
                    init_ms = start.elapsed().as_millis() as u64,
                    "Inpainting model loaded"
                );
                ModelState::Ready(model)
            },
            Err(e) => {
                warn!(error = %e, "Learned inpainting model not available, using fallback");
                ModelState::Unavailable
            },
        }
    }
}

impl std::fmt::Debug for WatermarkInpainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkInpainter")
            .field("model_loaded", &self.is_model_loaded())
            .finish_non_exhaustive()
    }
}
