//! Front-to-back ray marching through a [`VolumeField`].
//!
//! Rays are built from the camera in the same way on the CPU and in
//! `shaders/ray_march.wgsl`: pixel centres are mapped to `[-1, 1]`, pan and
//! zoom are undone, the point is placed on the view plane at `z = -√3` (outside
//! the unit cube for any rotation) and rotated back into volume space with the
//! transposed camera rotation. Volume y grows with the image row, so the y axis
//! is flipped before mapping `[-1, 1]` onto `[0, 1]`.

use glam::{Vec2, Vec3, Vec4};
use image::{DynamicImage, Rgba, Rgba32FImage, RgbaImage};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::camera::CameraState;
use crate::enums::{Interpolation, Processor};
use crate::gpu_context::{GpuContext, GpuError};
use crate::gpu_ray_marcher::GpuRayMarcher;
use crate::transfer_function::TransferFunctionConfig;
use crate::volume::VolumeField;

/// Distance from the cube centre to the view plane, in `[-1, 1]` units.
const VIEW_DISTANCE: f32 = 1.732_050_8;
const FLIP_Y: Vec3 = Vec3::new(1.0, -1.0, 1.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RayMarchConfig {
    pub width: u32,
    pub height: u32,
    pub step_size: f32,
    pub max_steps: u32,
    pub early_termination: f32,
    pub interpolation: Interpolation,
}

impl Default for RayMarchConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            step_size: 0.005,
            max_steps: 1024,
            early_termination: 0.95,
            interpolation: Interpolation::Trilinear,
        }
    }
}

/// A ray in normalized volume coordinates (`[0, 1]³` is the volume).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Ray through the centre of pixel `(x, y)` of a `width`×`height` raster.
pub fn camera_ray(camera: &CameraState, x: u32, y: u32, width: u32, height: u32) -> Ray {
    let screen = Vec2::new(
        2.0 * (x as f32 + 0.5) / width as f32 - 1.0,
        1.0 - 2.0 * (y as f32 + 0.5) / height as f32,
    );
    let view = (screen - 2.0 * camera.pan) / camera.scale;

    // Rotations are orthonormal, so the inverse is the transpose.
    let inverse = camera.rotation.transpose();
    let origin = inverse * view.extend(-VIEW_DISTANCE);
    let direction = inverse * Vec3::Z;

    Ray {
        origin: origin * FLIP_Y * 0.5 + 0.5,
        direction: (direction * FLIP_Y).normalize_or_zero(),
    }
}

fn inside_unit_cube(p: Vec3) -> bool {
    p.cmpge(Vec3::ZERO).all() && p.cmple(Vec3::ONE).all()
}

/// Front-to-back "over" accumulation of straight-alpha samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Compositor {
    accum: Vec4,
}

impl Compositor {
    pub fn add(&mut self, sample: Vec4) {
        let weight = (1.0 - self.accum.w) * sample.w;
        let rgb = self.accum.truncate() + weight * sample.truncate();
        self.accum = rgb.extend(self.accum.w + weight);
    }

    pub fn opacity(&self) -> f32 {
        self.accum.w
    }

    /// Accumulated colour with opacity in `w`.
    pub fn color(&self) -> Vec4 {
        self.accum
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarchResult {
    pub color: Vec4,
    /// Loop iterations taken, never more than `max_steps`.
    pub steps: u32,
}

/// March one ray. Samples outside the cube are skipped; the march ends when
/// opacity reaches `early_termination` or after `max_steps` iterations.
pub fn march(
    volume: &VolumeField,
    ray: &Ray,
    config: &RayMarchConfig,
    transfer: &TransferFunctionConfig,
) -> MarchResult {
    let step = ray.direction * config.step_size;
    let mut position = ray.origin;
    let mut compositor = Compositor::default();
    let mut steps = 0;

    while steps < config.max_steps {
        steps += 1;
        if inside_unit_cube(position) {
            let intensity = volume.sample(position, config.interpolation);
            compositor.add(transfer.evaluate(intensity));
            if compositor.opacity() >= config.early_termination {
                break;
            }
        }
        position += step;
    }

    MarchResult {
        color: compositor.color(),
        steps,
    }
}

/// Renders the 3D view of a volume for a camera, on the CPU or on a GPU.
pub struct RayMarchRenderer {
    config: RayMarchConfig,
    transfer: TransferFunctionConfig,
    gpu: Option<GpuRayMarcher>,
}

impl RayMarchRenderer {
    pub fn new(config: RayMarchConfig, transfer: TransferFunctionConfig) -> Self {
        Self {
            config,
            transfer,
            gpu: None,
        }
    }

    pub async fn with_gpu(
        config: RayMarchConfig,
        transfer: TransferFunctionConfig,
        gpu: GpuContext,
    ) -> Result<Self, GpuError> {
        Ok(Self {
            config,
            transfer,
            gpu: Some(GpuRayMarcher::new(gpu).await?),
        })
    }

    pub fn processor(&self) -> Processor {
        match self.gpu {
            Some(_) => Processor::GPU,
            None => Processor::CPU,
        }
    }

    pub fn config(&self) -> &RayMarchConfig {
        &self.config
    }

    pub fn transfer(&self) -> &TransferFunctionConfig {
        &self.transfer
    }

    pub fn set_transfer(&mut self, transfer: TransferFunctionConfig) {
        self.transfer = transfer;
    }

    /// Reference implementation, rows in parallel.
    pub fn render_cpu(&self, volume: &VolumeField, camera: &CameraState) -> Rgba32FImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = Rgba32FImage::new(width, height);
        image.par_enumerate_pixels_mut().for_each(|(x, y, pixel)| {
            let ray = camera_ray(camera, x, y, width, height);
            let result = march(volume, &ray, &self.config, &self.transfer);
            *pixel = Rgba(result.color.to_array());
        });
        image
    }

    /// Render with the configured processor. GPU failures are returned, never
    /// replaced by an empty frame.
    pub async fn render(
        &mut self,
        volume: &VolumeField,
        camera: &CameraState,
    ) -> Result<Rgba32FImage, GpuError> {
        let start = Instant::now();
        let image = match self.gpu.as_mut() {
            Some(gpu) => {
                let (width, height) = (self.config.width, self.config.height);
                let pixels = gpu
                    .render(volume, camera, &self.config, &self.transfer)
                    .await?;
                let raw: Vec<f32> = pixels.into_iter().flatten().collect();
                Rgba32FImage::from_raw(width, height, raw).ok_or_else(|| {
                    GpuError::BufferMap(format!("readback does not fill {width}x{height}"))
                })?
            }
            None => self.render_cpu(volume, camera),
        };
        debug!(
            "Rendered {}x{} volume view on {:?} in {:?}",
            image.width(),
            image.height(),
            self.processor(),
            start.elapsed()
        );
        Ok(image)
    }
}

/// 8-bit copy of a rendered frame for display or PNG output.
pub fn to_rgba8(image: &Rgba32FImage) -> RgbaImage {
    DynamicImage::ImageRgba32F(image.clone()).to_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu_context::tests::try_create_gpu_context;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    fn constant(value: f32) -> VolumeField {
        VolumeField::from_normalized(Array3::from_elem((8, 8, 8), value)).unwrap()
    }

    fn small_config() -> RayMarchConfig {
        RayMarchConfig {
            width: 8,
            height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn identity_centre_ray_starts_in_front_and_looks_down_z() {
        let ray = camera_ray(&CameraState::default(), 0, 0, 1, 1);
        assert_abs_diff_eq!(ray.origin.x, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(ray.origin.y, 0.5, epsilon = 1e-6);
        assert!(ray.origin.z < 0.0);
        assert_abs_diff_eq!(ray.direction.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn top_left_pixel_maps_to_first_row_and_column() {
        let ray = camera_ray(&CameraState::default(), 0, 0, 8, 8);
        assert!(ray.origin.x < 0.5);
        assert!(ray.origin.y < 0.5);
    }

    #[test]
    fn compositing_opacity_is_monotonic_and_bounded() {
        let mut compositor = Compositor::default();
        let mut previous = 0.0;
        for i in 0..200 {
            let alpha = ((i * 37) % 101) as f32 / 100.0;
            compositor.add(Vec4::new(1.0, 1.0, 1.0, alpha));
            assert!(compositor.opacity() >= previous);
            assert!(compositor.opacity() <= 1.0);
            previous = compositor.opacity();
        }
    }

    #[test]
    fn transparent_samples_leave_accumulation_untouched() {
        let mut compositor = Compositor::default();
        compositor.add(Vec4::new(0.5, 0.5, 0.5, 0.4));
        let before = compositor.color();
        compositor.add(Vec4::new(1.0, 1.0, 1.0, 0.0));
        assert_eq!(compositor.color(), before);
    }

    #[test]
    fn empty_volume_renders_transparent() {
        let renderer = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default());
        let image = renderer.render_cpu(&constant(0.0), &CameraState::default());
        assert!(image.pixels().all(|p| p.0 == [0.0; 4]));
    }

    #[test]
    fn dense_volume_terminates_early() {
        let volume = constant(1.0);
        let ray = camera_ray(&CameraState::default(), 4, 4, 8, 8);
        let result = march(&volume, &ray, &small_config(), &TransferFunctionConfig::default());
        assert!(result.color.w >= 0.95);
        assert!(result.steps < 100);
    }

    #[test]
    fn samples_behind_saturation_do_not_change_the_image() {
        let front_loaded = |back: f32| {
            VolumeField::from_normalized(Array3::from_shape_fn((16, 8, 8), |(z, _, _)| {
                if z < 8 { 1.0 } else { back }
            }))
            .unwrap()
        };
        let renderer = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default());
        let camera = CameraState::default();
        let a = renderer.render_cpu(&front_loaded(0.0), &camera);
        let b = renderer.render_cpu(&front_loaded(0.7), &camera);
        assert_eq!(a, b);
    }

    #[test]
    fn max_steps_bounds_the_march() {
        let config = RayMarchConfig {
            max_steps: 10,
            ..small_config()
        };
        let ray = camera_ray(&CameraState::default(), 4, 4, 8, 8);
        let result = march(&constant(1.0), &ray, &config, &TransferFunctionConfig::default());
        assert_eq!(result.steps, 10);
        // Ten steps of 0.005 never reach the cube from z = -0.37.
        assert_eq!(result.color, Vec4::ZERO);
    }

    #[test]
    fn zooming_out_leaves_corners_empty() {
        let renderer = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default());
        let volume = constant(1.0);

        let full = renderer.render_cpu(&volume, &CameraState::default());
        assert!(full.get_pixel(0, 0).0[3] > 0.9);

        let zoomed_out = CameraState {
            scale: 0.5,
            ..Default::default()
        };
        let small = renderer.render_cpu(&volume, &zoomed_out);
        assert_eq!(small.get_pixel(0, 0).0, [0.0; 4]);
        assert!(small.get_pixel(4, 4).0[3] > 0.9);
    }

    #[test]
    fn panning_right_moves_the_volume_right() {
        let renderer = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default());
        let panned = CameraState {
            pan: Vec2::new(0.5, 0.0),
            ..Default::default()
        };
        let image = renderer.render_cpu(&constant(1.0), &panned);
        assert_eq!(image.get_pixel(0, 4).0, [0.0; 4]);
        assert!(image.get_pixel(7, 4).0[3] > 0.9);
    }

    #[test]
    fn cpu_renderer_reports_processor() {
        let renderer = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default());
        assert_eq!(renderer.processor(), Processor::CPU);
        let image = pollster::block_on(async {
            let mut renderer = renderer;
            renderer.render(&constant(0.0), &CameraState::default()).await
        })
        .unwrap();
        assert_eq!(image.dimensions(), (8, 8));
    }

    #[test]
    fn gpu_matches_cpu_at_the_centre() {
        pollster::block_on(async {
            let Some(gpu) = try_create_gpu_context().await else {
                return;
            };
            let volume = VolumeField::from_normalized(Array3::from_shape_fn(
                (8, 8, 8),
                |(z, y, x)| ((x + y + z) as f32 / 21.0),
            ))
            .unwrap();
            let camera = CameraState::default();
            let cpu = RayMarchRenderer::new(small_config(), TransferFunctionConfig::default())
                .render_cpu(&volume, &camera);
            let mut renderer =
                RayMarchRenderer::with_gpu(small_config(), TransferFunctionConfig::default(), gpu)
                    .await
                    .unwrap();
            assert_eq!(renderer.processor(), Processor::GPU);
            let gpu_image = renderer.render(&volume, &camera).await.unwrap();

            let expected = cpu.get_pixel(4, 4).0;
            let actual = gpu_image.get_pixel(4, 4).0;
            for channel in 0..4 {
                assert_abs_diff_eq!(actual[channel], expected[channel], epsilon = 0.05);
            }
        });
    }
}
