use half::f16;
use log::debug;

use crate::gpu_context::{GpuContext, GpuError};
use crate::volume::{VolumeField, VolumeId};

/// 3D texture built from one [`VolumeField`].
///
/// The texture is never patched in place. Owners compare [`VolumeId`]s and
/// replace the whole texture when the field changes; dropping it destroys the
/// GPU allocation.
pub(crate) struct VolumeTexture {
    volume_id: VolumeId,
    texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
    pub(crate) sampler: wgpu::Sampler,
    pub(crate) dimensions: (u32, u32, u32), // (depth, height, width)
}

impl VolumeTexture {
    pub(crate) async fn new(gpu: &GpuContext, volume: &VolumeField) -> Result<Self, GpuError> {
        let (depth, height, width) = volume.dim();
        let (depth, height, width) = (depth as u32, height as u32, width as u32);

        let limit = gpu.device.limits().max_texture_dimension_3d;
        if width > limit || height > limit || depth > limit {
            return Err(GpuError::Validation {
                label: "Volume 3D Texture",
                message: format!("{width}x{height}x{depth} exceeds 3D texture limit {limit}"),
            });
        }

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };

        // Half floats keep the texture filterable without optional features.
        let texels: Vec<f16> = volume.data().iter().map(|&v| f16::from_f32(v)).collect();

        let (texture, view, sampler) = gpu
            .validated("Volume 3D Texture", |device| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Volume 3D Texture"),
                    size: texture_size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D3,
                    format: wgpu::TextureFormat::R16Float,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });

                gpu.queue.write_texture(
                    wgpu::TexelCopyTextureInfoBase {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytemuck::cast_slice(&texels),
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(width * std::mem::size_of::<f16>() as u32),
                        rows_per_image: Some(height),
                    },
                    texture_size,
                );

                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

                let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("Volume Sampler"),
                    address_mode_u: wgpu::AddressMode::ClampToEdge,
                    address_mode_v: wgpu::AddressMode::ClampToEdge,
                    address_mode_w: wgpu::AddressMode::ClampToEdge,
                    mag_filter: wgpu::FilterMode::Linear,
                    min_filter: wgpu::FilterMode::Linear,
                    mipmap_filter: wgpu::FilterMode::Nearest,
                    ..Default::default()
                });

                (texture, view, sampler)
            })
            .await?;

        debug!(
            "Uploaded volume {:?} as {}x{}x{} R16Float texture",
            volume.id(),
            width,
            height,
            depth
        );

        Ok(Self {
            volume_id: volume.id(),
            texture,
            view,
            sampler,
            dimensions: (depth, height, width),
        })
    }

    pub(crate) fn volume_id(&self) -> VolumeId {
        self.volume_id
    }

    /// Keep `slot` in sync with `volume`, rebuilding on identity change.
    pub(crate) async fn ensure<'a>(
        slot: &'a mut Option<VolumeTexture>,
        gpu: &GpuContext,
        volume: &VolumeField,
    ) -> Result<&'a VolumeTexture, GpuError> {
        if slot.as_ref().map(VolumeTexture::volume_id) != Some(volume.id()) {
            // Release the previous texture before allocating its replacement.
            *slot = None;
            *slot = Some(VolumeTexture::new(gpu, volume).await?);
        }
        slot.as_ref().ok_or(GpuError::ContextLost)
    }
}

impl Drop for VolumeTexture {
    fn drop(&mut self) {
        debug!("Destroying texture for volume {:?}", self.volume_id);
        self.texture.destroy();
    }
}
