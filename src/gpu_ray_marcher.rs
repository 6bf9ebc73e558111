use glam::Mat4;
use log::trace;
use wgpu::util::DeviceExt;

use crate::camera::CameraState;
use crate::gpu_context::{GpuContext, GpuError};
use crate::ray_march::RayMarchConfig;
use crate::transfer_function::TransferFunctionConfig;
use crate::volume::VolumeField;
use crate::volume_texture::VolumeTexture;

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct RayUniforms {
    inv_rotation: [[f32; 4]; 4],
    pan_scale: [f32; 4],
    march: [f32; 4],
    output_info: [u32; 4],
    volume_dim: [u32; 4],
}

impl RayUniforms {
    fn new(
        camera: &CameraState,
        config: &RayMarchConfig,
        dimensions: (u32, u32, u32),
    ) -> Self {
        let (depth, height, width) = dimensions;
        Self {
            inv_rotation: Mat4::from_mat3(camera.rotation.transpose()).to_cols_array_2d(),
            pan_scale: [camera.pan.x, camera.pan.y, camera.scale, 0.0],
            march: [config.step_size, config.early_termination, 0.0, 0.0],
            output_info: [
                config.width,
                config.height,
                config.max_steps,
                config.interpolation.shader_index(),
            ],
            volume_dim: [width, height, depth, 0],
        }
    }
}

/// Compute-shader ray marcher. Owns the volume texture it samples.
pub struct GpuRayMarcher {
    gpu: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    texture: Option<VolumeTexture>,
}

impl GpuRayMarcher {
    pub async fn new(gpu: GpuContext) -> Result<Self, GpuError> {
        let (pipeline, bind_group_layout) = gpu
            .create_volume_pipeline(
                "Ray March Pipeline",
                include_str!("shaders/ray_march.wgsl"),
                2,
            )
            .await?;

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            texture: None,
        })
    }

    /// Straight-alpha RGBA per pixel, row-major. Returns once the GPU work is
    /// complete.
    pub async fn render(
        &mut self,
        volume: &VolumeField,
        camera: &CameraState,
        config: &RayMarchConfig,
        transfer: &TransferFunctionConfig,
    ) -> Result<Vec<[f32; 4]>, GpuError> {
        self.gpu.ensure_alive()?;
        let output_size = self.gpu.check_output_size(
            config.width,
            config.height,
            std::mem::size_of::<[f32; 4]>() as u64,
        )?;
        let texture = VolumeTexture::ensure(&mut self.texture, &self.gpu, volume).await?;

        let uniforms = RayUniforms::new(camera, config, texture.dimensions);
        let transfer_uniform = transfer.uniform();
        trace!(
            "GPU ray march {}x{} at scale {}",
            config.width, config.height, camera.scale
        );

        let device = &self.gpu.device;
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ray Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let transfer_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Transfer Function Buffer"),
            contents: bytemuck::bytes_of(&transfer_uniform),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Ray Output Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Ray March Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: transfer_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Ray March Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ray March Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                config.width.div_ceil(WORKGROUP_SIZE),
                config.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }

        self.gpu
            .submit_and_read("Ray March Pass", encoder, &output_buffer, output_size)
            .await
    }
}
