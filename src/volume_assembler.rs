use crate::{
    enums::NormalizationPolicy,
    slice::Slice,
    volume::{VolumeField, clamp_unit},
};

use log::{debug, trace};
use ndarray::{Array3, ArrayViewMut2, Axis};
use rayon::prelude::*;
use thiserror::Error;

/// Window center used when the first slice carries no center.
pub const DEFAULT_WINDOW_CENTER: f32 = 200.0;
/// Window width used when the first slice carries no width.
pub const DEFAULT_WINDOW_WIDTH: f32 = 400.0;
/// Substituted for `window_width - 1` when that denominator would vanish.
pub const WINDOW_EPSILON: f32 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum AssemblerError {
    #[error("No slices to assemble")]
    EmptyInput,

    #[error("Slice {index} is {found:?} but the series is {expected:?} (width, height)")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Slice {index} has {found} samples, expected {expected}")]
    PixelCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Slice {index} has zero width or height")]
    ZeroSizedSlice { index: usize },
}

/// Builds a [`VolumeField`] from an ordered slice stack.
///
/// Depth order is the input order. Each slice is normalized on its own rayon
/// task; the field is only returned once every slice has been written.
#[derive(Debug, Clone, Default)]
pub struct VolumeAssembler {
    policy: NormalizationPolicy,
    window_override: Option<(f32, f32)>,
    spacing: Option<(f32, f32, f32)>,
}

impl VolumeAssembler {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Use this window instead of the one found on the first slice.
    pub fn with_window(mut self, center: f32, width: f32) -> Self {
        self.window_override = Some((center, width));
        self
    }

    pub fn with_spacing(mut self, spacing: (f32, f32, f32)) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// Assemble a volume from decoded slices
    ///
    /// # Arguments
    ///
    /// * `slices` - Spatially ordered slices of one series
    ///
    /// # Errors
    ///
    /// Returns error if there are no slices or their dimensions are inconsistent
    pub fn assemble(&self, slices: &[Slice]) -> Result<VolumeField, AssemblerError> {
        let first = slices.first().ok_or(AssemblerError::EmptyInput)?;
        Self::validate_dimensions(slices)?;

        let (window_center, window_width) = self.effective_window(first);
        debug!(
            "Assembling {}x{}x{} volume ({:?}, window {}/{})",
            first.width,
            first.height,
            slices.len(),
            self.policy,
            window_center,
            window_width
        );
        if matches!(self.policy, NormalizationPolicy::Windowed)
            && window_width - 1.0 < WINDOW_EPSILON
        {
            debug!("Degenerate window width {window_width}, flooring denominator at {WINDOW_EPSILON}");
        }

        let data = self.build_volume_array(slices, window_center, window_width);
        let volume = VolumeField::new(data, window_center, window_width);

        Ok(match self.spacing {
            Some(spacing) => volume.with_spacing(spacing),
            None => volume,
        })
    }

    fn effective_window(&self, first: &Slice) -> (f32, f32) {
        self.window_override.unwrap_or_else(|| {
            (
                first.first_window_center().unwrap_or(DEFAULT_WINDOW_CENTER),
                first.first_window_width().unwrap_or(DEFAULT_WINDOW_WIDTH),
            )
        })
    }

    fn validate_dimensions(slices: &[Slice]) -> Result<(), AssemblerError> {
        let expected = (slices[0].width, slices[0].height);

        for (index, slice) in slices.iter().enumerate() {
            if slice.width == 0 || slice.height == 0 {
                return Err(AssemblerError::ZeroSizedSlice { index });
            }
            let found = (slice.width, slice.height);
            if found != expected {
                return Err(AssemblerError::ShapeMismatch {
                    index,
                    expected,
                    found,
                });
            }
            let samples = slice.pixel_data.len();
            if samples != slice.width * slice.height {
                return Err(AssemblerError::PixelCountMismatch {
                    index,
                    expected: slice.width * slice.height,
                    found: samples,
                });
            }
        }
        Ok(())
    }

    fn build_volume_array(
        &self,
        slices: &[Slice],
        window_center: f32,
        window_width: f32,
    ) -> Array3<f32> {
        let (width, height) = (slices[0].width, slices[0].height);
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        volume
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(slices.par_iter())
            .enumerate()
            .for_each(|(index, (plane, slice))| {
                trace!("Normalizing slice {index}");
                self.normalize_slice(slice, plane, window_center, window_width);
            });

        volume
    }

    fn normalize_slice(
        &self,
        slice: &Slice,
        mut plane: ArrayViewMut2<'_, f32>,
        center: f32,
        width: f32,
    ) {
        let row_len = slice.width;
        match self.policy {
            NormalizationPolicy::Windowed => {
                let slope = slice.slope();
                let intercept = slice.intercept();
                slice.pixel_data.for_each_sample(|j, raw| {
                    plane[[j / row_len, j % row_len]] =
                        normalize_windowed(raw.mul_add(slope, intercept), center, width);
                });
            }
            NormalizationPolicy::RawScaled { divisor } => {
                let divisor = if divisor.abs() < WINDOW_EPSILON {
                    WINDOW_EPSILON
                } else {
                    divisor
                };
                slice.pixel_data.for_each_sample(|j, raw| {
                    plane[[j / row_len, j % row_len]] = clamp_unit(raw / divisor);
                });
            }
        }
    }
}

/// Linear window levelling of a calibrated value into `[0, 1]`.
///
/// A window width of 1 (or less) would divide by zero or flip the ramp, so
/// the denominator is floored at [`WINDOW_EPSILON`].
pub fn normalize_windowed(calibrated: f32, window_center: f32, window_width: f32) -> f32 {
    let denominator = (window_width - 1.0).max(WINDOW_EPSILON);
    clamp_unit((calibrated - (window_center - 0.5)) / denominator + 0.5)
}
