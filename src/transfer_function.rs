//! Intensity to colour/opacity mapping shared by the ray marcher and the
//! slice display.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Extra gain for dense structures above a cutoff intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityBoost {
    pub cutoff: f32,
    pub color_factor: f32,
    pub opacity_factor: f32,
}

impl Default for IntensityBoost {
    fn default() -> Self {
        Self {
            cutoff: 0.6,
            color_factor: 1.3,
            opacity_factor: 2.5,
        }
    }
}

/// Piecewise transfer function.
///
/// Below `threshold` a sample is fully transparent. Above it the intensity is
/// rescaled to `n ∈ [0, 1]`; grey level is `color_gain * n^contrast_exponent`
/// and opacity is `opacity_gain * n`, both clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferFunctionConfig {
    pub threshold: f32,
    pub contrast_exponent: f32,
    pub color_gain: f32,
    pub opacity_gain: f32,
    pub boost: Option<IntensityBoost>,
}

impl Default for TransferFunctionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.15,
            contrast_exponent: 2.0,
            color_gain: 5.0,
            opacity_gain: 0.25,
            boost: Some(IntensityBoost::default()),
        }
    }
}

impl TransferFunctionConfig {
    /// Evaluate the mapping as straight (non-premultiplied) `(r, g, b, a)`.
    pub fn evaluate(&self, intensity: f32) -> Vec4 {
        // NaN compares false and stays transparent.
        if !(intensity >= self.threshold) {
            return Vec4::ZERO;
        }

        let span = 1.0 - self.threshold;
        let normalized = if span <= f32::EPSILON {
            1.0
        } else {
            ((intensity - self.threshold) / span).clamp(0.0, 1.0)
        };

        let mut color = self.color_gain * normalized.powf(self.contrast_exponent);
        let mut alpha = self.opacity_gain * normalized;

        if let Some(boost) = self.boost {
            if intensity > boost.cutoff {
                color *= boost.color_factor;
                alpha *= boost.opacity_factor;
            }
        }

        Vec3::splat(color.clamp(0.0, 1.0)).extend(alpha.clamp(0.0, 1.0))
    }

    pub(crate) fn uniform(&self) -> TransferUniform {
        // Intensities never exceed 1, so a cutoff of 2 disables the boost.
        let (boost_cutoff, boost_color, boost_opacity) = match self.boost {
            Some(boost) => (boost.cutoff, boost.color_factor, boost.opacity_factor),
            None => (2.0, 1.0, 1.0),
        };
        TransferUniform {
            threshold: self.threshold,
            contrast_exponent: self.contrast_exponent,
            color_gain: self.color_gain,
            opacity_gain: self.opacity_gain,
            boost_cutoff,
            boost_color,
            boost_opacity,
            _padding: 0.0,
        }
    }
}

/// WGSL-side layout of [`TransferFunctionConfig`].
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct TransferUniform {
    pub threshold: f32,
    pub contrast_exponent: f32,
    pub color_gain: f32,
    pub opacity_gain: f32,
    pub boost_cutoff: f32,
    pub boost_color: f32,
    pub boost_opacity: f32,
    pub _padding: f32,
}
