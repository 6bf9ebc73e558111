use log::trace;
use wgpu::util::DeviceExt;

use crate::enums::{Interpolation, Orientation};
use crate::gpu_context::{GpuContext, GpuError};
use crate::volume::VolumeField;
use crate::volume_texture::VolumeTexture;

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct SliceUniforms {
    orientation: u32,
    output_width: u32,
    output_height: u32,
    interpolation: u32,
    volume_width: u32,
    volume_height: u32,
    volume_depth: u32,
    _padding0: u32,
    offset: f32,
    _padding1: [f32; 3],
}

/// Samples orthogonal planes out of a 3D texture with a compute shader.
pub struct GpuSliceExtractor {
    gpu: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    texture: Option<VolumeTexture>,
}

impl GpuSliceExtractor {
    pub async fn new(gpu: GpuContext) -> Result<Self, GpuError> {
        let (pipeline, bind_group_layout) = gpu
            .create_volume_pipeline(
                "Volume Slice Pipeline",
                include_str!("shaders/volume_slice.wgsl"),
                1,
            )
            .await?;

        Ok(Self {
            gpu,
            pipeline,
            bind_group_layout,
            texture: None,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    /// Pre-gamma intensities of one plane in row-major order.
    pub async fn extract(
        &mut self,
        volume: &VolumeField,
        orientation: Orientation,
        offset: f32,
        interpolation: Interpolation,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>, GpuError> {
        self.gpu.ensure_alive()?;
        let output_size = self.gpu.check_output_size(
            target_width,
            target_height,
            std::mem::size_of::<f32>() as u64,
        )?;
        let texture = VolumeTexture::ensure(&mut self.texture, &self.gpu, volume).await?;
        let (depth, height, width) = texture.dimensions;

        let uniforms = SliceUniforms {
            orientation: orientation.shader_index(),
            output_width: target_width,
            output_height: target_height,
            interpolation: interpolation.shader_index(),
            volume_width: width,
            volume_height: height,
            volume_depth: depth,
            _padding0: 0,
            offset: offset.clamp(0.0, 1.0),
            _padding1: [0.0; 3],
        };
        trace!("GPU slice {orientation:?} at {offset} into {target_width}x{target_height}");

        let device = &self.gpu.device;
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Slice Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Slice Output Buffer"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Slice Bind Group"),
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
            ],
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Volume Slice Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Volume Slice Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                target_width.div_ceil(WORKGROUP_SIZE),
                target_height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }

        self.gpu
            .submit_and_read("Volume Slice Pass", encoder, &output_buffer, output_size)
            .await
    }
}
