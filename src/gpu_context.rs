use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use thiserror::Error;
use wgpu::PollType;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("Failed to create device: {0}")]
    DeviceRequest(String),

    #[error("GPU validation failed in {label}: {message}")]
    Validation { label: &'static str, message: String },

    #[error("GPU device was lost")]
    ContextLost,

    #[error("Failed to read back GPU buffer: {0}")]
    BufferMap(String),

    #[error("Requested {width}x{height} output exceeds device limits")]
    OutputTooLarge { width: u32, height: u32 },
}

/// Device and queue shared by the GPU slice extractor and ray marcher.
///
/// Cloning is cheap; all clones observe the same device-lost flag.
#[derive(Clone)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Request a headless adapter and device.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::AdapterUnavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            "Using GPU adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Volume MPR Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    /// Wrap an existing device, e.g. one owned by a windowing layer.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            warn!("GPU device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });
        Self {
            device,
            queue,
            lost,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), GpuError> {
        if self.is_lost() {
            return Err(GpuError::ContextLost);
        }
        Ok(())
    }

    /// Run `f` inside a validation error scope and surface any error it raised.
    pub(crate) async fn validated<T>(
        &self,
        label: &'static str,
        f: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        if let Some(error) = self.device.pop_error_scope().await {
            return Err(GpuError::Validation {
                label,
                message: error.to_string(),
            });
        }
        self.ensure_alive()?;
        Ok(value)
    }

    /// Compute pipeline over the shared volume bind group layout.
    pub(crate) async fn create_volume_pipeline(
        &self,
        label: &'static str,
        source: &'static str,
        uniform_bindings: u32,
    ) -> Result<(wgpu::ComputePipeline, wgpu::BindGroupLayout), GpuError> {
        self.validated(label, |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });

            let entries = volume_layout_entries(uniform_bindings);
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(label),
                    entries: &entries,
                });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            (pipeline, bind_group_layout)
        })
        .await
    }

    /// Submit `encoder`, copy `output` into a staging buffer and wait for it.
    ///
    /// Returns only after the GPU work is complete, so the bytes are final.
    pub(crate) async fn submit_and_read<T: bytemuck::Pod>(
        &self,
        label: &'static str,
        mut encoder: wgpu::CommandEncoder,
        output: &wgpu::Buffer,
        size: u64,
    ) -> Result<Vec<T>, GpuError> {
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(output, 0, &staging_buffer, 0, size);

        self.validated(label, |_| {
            self.queue.submit(Some(encoder.finish()));
        })
        .await?;

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;

        receiver
            .await
            .map_err(|_| GpuError::BufferMap("map callback dropped".to_string()))?
            .map_err(|e| GpuError::BufferMap(e.to_string()))?;
        self.ensure_alive()?;

        let mapped = buffer_slice.get_mapped_range();
        let data = bytemuck::cast_slice::<u8, T>(&mapped).to_vec();
        drop(mapped);
        staging_buffer.unmap();
        Ok(data)
    }

    pub(crate) fn check_output_size(
        &self,
        width: u32,
        height: u32,
        texel_bytes: u64,
    ) -> Result<u64, GpuError> {
        let size = width as u64 * height as u64 * texel_bytes;
        let limits = self.device.limits();
        if width == 0
            || height == 0
            || size > limits.max_storage_buffer_binding_size as u64
            || size > limits.max_buffer_size
        {
            return Err(GpuError::OutputTooLarge { width, height });
        }
        Ok(size)
    }
}

/// Bindings: 3D texture, sampler, output storage buffer, then uniforms.
fn volume_layout_entries(uniform_bindings: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D3,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
    ];
    entries.extend((0..uniform_bindings).map(|i| wgpu::BindGroupLayoutEntry {
        binding: 3 + i,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }));
    entries
}
