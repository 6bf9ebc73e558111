//! Top-level configuration for the slice and volume views.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    camera::CameraConfig,
    enums::{NormalizationPolicy, Processor},
    ray_march::RayMarchConfig,
    slice_sampler::SliceConfig,
    transfer_function::TransferFunctionConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every tunable of the pipeline with its documented default.
///
/// | field | default | effect |
/// |---|---|---|
/// | `ray_march.width`/`height` | 512 | 3D output raster size |
/// | `ray_march.step_size` | 0.005 | march step in volume units |
/// | `ray_march.max_steps` | 1024 | hard bound on samples per ray |
/// | `ray_march.early_termination` | 0.95 | opacity that ends a ray |
/// | `camera.min_scale`/`max_scale` | 0.1 / 5.0 | zoom bounds |
/// | `transfer` | threshold 0.15, exponent 2 | intensity to colour/opacity |
/// | `slice.gamma` | 2.2 | display gamma for MPR rasters |
/// | `processor` | CPU | backend for slices and the 3D view |
/// | `frame_interval_ms` | 16 | render coalescing tick |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub normalization: NormalizationPolicy,
    pub processor: Processor,
    pub ray_march: RayMarchConfig,
    pub slice: SliceConfig,
    pub camera: CameraConfig,
    pub transfer: TransferFunctionConfig,
    pub frame_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            normalization: NormalizationPolicy::default(),
            processor: Processor::default(),
            ray_march: RayMarchConfig::default(),
            slice: SliceConfig::default(),
            camera: CameraConfig::default(),
            transfer: TransferFunctionConfig::default(),
            frame_interval_ms: 16,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl RenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path.as_ref())?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ray = &self.ray_march;
        if ray.width == 0 || ray.height == 0 {
            return Err(invalid("ray_march.width", "resolution must be non-zero"));
        }
        if !(ray.step_size > 0.0 && ray.step_size.is_finite()) {
            return Err(invalid("ray_march.step_size", "must be a positive number"));
        }
        if ray.max_steps == 0 {
            return Err(invalid("ray_march.max_steps", "must be at least 1"));
        }
        if !(ray.early_termination > 0.0 && ray.early_termination <= 1.0) {
            return Err(invalid("ray_march.early_termination", "must be in (0, 1]"));
        }

        let camera = &self.camera;
        if !(camera.min_scale > 0.0 && camera.min_scale <= camera.max_scale) {
            return Err(invalid(
                "camera.min_scale",
                format!(
                    "need 0 < min_scale <= max_scale, got {} and {}",
                    camera.min_scale, camera.max_scale
                ),
            ));
        }
        if !(camera.zoom_in_factor > 1.0) {
            return Err(invalid("camera.zoom_in_factor", "must exceed 1"));
        }
        if !(camera.zoom_out_factor > 0.0 && camera.zoom_out_factor < 1.0) {
            return Err(invalid("camera.zoom_out_factor", "must be in (0, 1)"));
        }

        let transfer = &self.transfer;
        if !(0.0..=1.0).contains(&transfer.threshold) {
            return Err(invalid("transfer.threshold", "must be in [0, 1]"));
        }
        if !(transfer.contrast_exponent > 0.0) {
            return Err(invalid("transfer.contrast_exponent", "must be positive"));
        }
        if !(transfer.color_gain >= 0.0) {
            return Err(invalid("transfer.color_gain", "must not be negative"));
        }
        if !(transfer.opacity_gain >= 0.0) {
            return Err(invalid("transfer.opacity_gain", "must not be negative"));
        }
        if let Some(boost) = transfer.boost {
            // A factor below 1 would drop opacity or colour at the cutoff.
            if !(boost.color_factor >= 1.0 && boost.opacity_factor >= 1.0) {
                return Err(invalid("transfer.boost", "factors must be at least 1"));
            }
        }

        if !(self.slice.gamma > 0.0) {
            return Err(invalid("slice.gamma", "must be positive"));
        }
        if let Some((width, height)) = self.slice.resolution {
            if width == 0 || height == 0 {
                return Err(invalid("slice.resolution", "must be non-zero"));
            }
        }

        if let NormalizationPolicy::RawScaled { divisor } = self.normalization {
            if !(divisor > 0.0) {
                return Err(invalid("normalization.divisor", "must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RenderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.ray_march.width, 512);
        assert_eq!(config.ray_march.step_size, 0.005);
        assert_eq!(config.ray_march.early_termination, 0.95);
        assert_eq!(config.camera.max_scale, 5.0);
        assert_eq!(config.processor, Processor::CPU);
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RenderConfig::from_json_str(
            r#"{ "ray_march": { "max_steps": 256 }, "transfer": { "threshold": 0.3 } }"#,
        )
        .unwrap();
        assert_eq!(config.ray_march.max_steps, 256);
        assert_eq!(config.ray_march.step_size, 0.005);
        assert_eq!(config.transfer.threshold, 0.3);
        assert_eq!(config.transfer.contrast_exponent, 2.0);
    }

    #[test]
    fn raw_normalization_parses() {
        let config =
            RenderConfig::from_json_str(r#"{ "normalization": { "RawScaled": { "divisor": 255.0 } } }"#)
                .unwrap();
        assert_eq!(
            config.normalization,
            NormalizationPolicy::RawScaled { divisor: 255.0 }
        );
    }

    #[test]
    fn raw_normalization_divisor_defaults_to_byte_range() {
        let config = RenderConfig::from_json_str(r#"{ "normalization": { "RawScaled": {} } }"#)
            .unwrap();
        assert_eq!(
            config.normalization,
            NormalizationPolicy::RawScaled { divisor: 255.0 }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = RenderConfig::from_json_str(r#"{ "ray_march": { "step_size": 0.0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "ray_march.step_size",
                ..
            }
        ));

        let err = RenderConfig::from_json_str(r#"{ "camera": { "min_scale": 6.0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "camera.min_scale", .. }));
    }

    #[test]
    fn zoom_out_factor_must_shrink_the_view() {
        for factor in ["1.0", "1.5", "0.0"] {
            let json = format!(r#"{{ "camera": {{ "zoom_out_factor": {factor} }} }}"#);
            let err = RenderConfig::from_json_str(&json).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "camera.zoom_out_factor",
                    ..
                }
            ));
        }
    }

    #[test]
    fn weakening_boost_is_rejected() {
        let err = RenderConfig::from_json_str(
            r#"{ "transfer": { "boost": { "cutoff": 0.6, "color_factor": 1.3, "opacity_factor": 0.5 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "transfer.boost", .. }));

        let err = RenderConfig::from_json_str(
            r#"{ "transfer": { "boost": { "cutoff": 0.6, "color_factor": 0.8, "opacity_factor": 2.0 } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "transfer.boost", .. }));

        let err = RenderConfig::from_json_str(r#"{ "transfer": { "opacity_gain": -0.1 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "transfer.opacity_gain",
                ..
            }
        ));
    }

    #[test]
    fn accepted_transfer_function_keeps_opacity_monotonic() {
        let config = RenderConfig::from_json_str(
            r#"{ "transfer": { "boost": { "cutoff": 0.6, "color_factor": 1.0, "opacity_factor": 1.0 } } }"#,
        )
        .unwrap();
        let mut previous = 0.0;
        for i in 0..=1000 {
            let intensity = i as f32 / 1000.0;
            let alpha = config.transfer.evaluate(intensity).w;
            assert!(alpha >= previous, "alpha dropped at {intensity}");
            previous = alpha;
        }
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = RenderConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RenderConfig::from_json_file("/nonexistent/volume-mpr.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
