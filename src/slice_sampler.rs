//! Multi-planar reconstruction: axial, sagittal and coronal planes through a
//! [`VolumeField`].

use image::{GrayImage, ImageBuffer, Luma};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, Orientation, Processor};
use crate::gpu_context::{GpuContext, GpuError};
use crate::gpu_slice_extractor::GpuSliceExtractor;
use crate::interpolator::Interpolator;
use crate::volume::VolumeField;

pub type SliceImage = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    pub interpolation: Interpolation,
    pub gamma: f32,
    /// Multiplier applied before gamma.
    pub brightness: f32,
    /// Output (width, height); the plane's native voxel extent when unset.
    pub resolution: Option<(u32, u32)>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Trilinear,
            gamma: 2.2,
            brightness: 1.0,
            resolution: None,
        }
    }
}

/// Voxel index for raster pixel `k` of `count`, corner-aligned on `len` voxels.
#[inline]
fn raster_to_index(k: u32, count: u32, len: usize) -> f32 {
    if count <= 1 || len <= 1 {
        return 0.0;
    }
    let last = (len - 1) as f32;
    (k as f32 * last / (count - 1) as f32).min(last)
}

pub struct SliceSampler {
    config: SliceConfig,
    gpu: Option<GpuSliceExtractor>,
}

impl SliceSampler {
    pub fn new(config: SliceConfig) -> Self {
        Self { config, gpu: None }
    }

    pub async fn with_gpu(config: SliceConfig, gpu: GpuContext) -> Result<Self, GpuError> {
        Ok(Self {
            config,
            gpu: Some(GpuSliceExtractor::new(gpu).await?),
        })
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    pub fn processor(&self) -> Processor {
        match self.gpu {
            Some(_) => Processor::GPU,
            None => Processor::CPU,
        }
    }

    /// Raster (width, height) for a plane.
    pub fn raster_size(&self, volume: &VolumeField, orientation: Orientation) -> (u32, u32) {
        if let Some(resolution) = self.config.resolution {
            return resolution;
        }
        let (depth, height, width) = volume.dim();
        let (columns, rows) = match orientation {
            Orientation::Axial => (width, height),
            Orientation::Sagittal => (height, depth),
            Orientation::Coronal => (width, depth),
        };
        (columns as u32, rows as u32)
    }

    /// Pre-gamma intensities of the plane at `offset` (clamped into `[0, 1]`).
    pub fn extract(
        &self,
        volume: &VolumeField,
        orientation: Orientation,
        offset: f32,
    ) -> SliceImage {
        let (out_width, out_height) = self.raster_size(volume, orientation);
        let (depth, height, width) = volume.dim();
        let interpolation = self.config.interpolation;
        let offset = offset.clamp(0.0, 1.0);

        let mut image = SliceImage::new(out_width, out_height);
        image.par_enumerate_pixels_mut().for_each(|(u, v, pixel)| {
            let (x, y, z) = match orientation {
                Orientation::Axial => (
                    raster_to_index(u, out_width, width),
                    raster_to_index(v, out_height, height),
                    Interpolator::to_index_space(offset, depth),
                ),
                Orientation::Sagittal => (
                    Interpolator::to_index_space(offset, width),
                    raster_to_index(u, out_width, height),
                    raster_to_index(v, out_height, depth),
                ),
                Orientation::Coronal => (
                    raster_to_index(u, out_width, width),
                    Interpolator::to_index_space(offset, height),
                    raster_to_index(v, out_height, depth),
                ),
            };
            *pixel = Luma([volume.sample_index(x, y, z, interpolation)]);
        });
        image
    }

    /// Like [`extract`](Self::extract), on the GPU when one is attached.
    pub async fn extract_async(
        &mut self,
        volume: &VolumeField,
        orientation: Orientation,
        offset: f32,
    ) -> Result<SliceImage, GpuError> {
        let (out_width, out_height) = self.raster_size(volume, orientation);
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(self.extract(volume, orientation, offset));
        };

        let pixels = gpu
            .extract(
                volume,
                orientation,
                offset,
                self.config.interpolation,
                out_width,
                out_height,
            )
            .await?;
        debug!("GPU extracted {orientation:?} slice {out_width}x{out_height}");
        SliceImage::from_raw(out_width, out_height, pixels).ok_or_else(|| {
            GpuError::BufferMap(format!("readback does not fill {out_width}x{out_height}"))
        })
    }

    /// Brightness then display gamma, `(v * brightness)^(1 / gamma)`.
    pub fn apply_display(&self, image: &SliceImage) -> SliceImage {
        let brightness = self.config.brightness;
        let inverse_gamma = 1.0 / self.config.gamma;
        let mut display = image.clone();
        display.par_pixels_mut().for_each(|pixel| {
            pixel.0[0] = (pixel.0[0] * brightness).clamp(0.0, 1.0).powf(inverse_gamma);
        });
        display
    }

    pub fn extract_display(
        &self,
        volume: &VolumeField,
        orientation: Orientation,
        offset: f32,
    ) -> SliceImage {
        self.apply_display(&self.extract(volume, orientation, offset))
    }
}

/// 8-bit grey copy of a raster in `[0, 1]`.
pub fn to_gray8(image: &SliceImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y).0[0].clamp(0.0, 1.0);
        Luma([(value * 255.0).round() as u8])
    })
}
