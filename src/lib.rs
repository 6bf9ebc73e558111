//! # Volume MPR library
//!
//! This crate turns an ordered stack of calibrated 2D slices into a normalized
//! scalar volume and renders it in two ways: as multi-planar reconstruction
//! (MPR) slices and as a front-to-back ray-marched 3D projection.
//!
//! Decoding image files is left to the caller. Each slice arrives as raw
//! samples plus optional rescale slope/intercept and window center/width;
//! [`VolumeAssembler`] applies calibration and window levelling to every slice
//! in parallel using rayon. The resulting [`VolumeField`] can be sliced along
//! the three medical axes:
//!  - Axial
//!  - Sagittal
//!  - Coronal
//!
//! Slices and 3D views are produced either on the CPU (rayon, the reference
//! implementation) or on the GPU using WGPU compute shaders sampling a 3D
//! texture. Both follow the same corner-aligned coordinate convention, so a
//! normalized coordinate of `0` addresses the first voxel along an axis and
//! `1` the last.
//!
//! The 3D view is driven by [`CameraController`], an arcball camera fed with
//! pointer and wheel events, and coloured by a [`TransferFunctionConfig`].
//! [`RenderConfig`] collects every tunable and can be loaded from JSON.
//!
//! # Examples
//!
//! ## Assembling a volume and extracting a sagittal slice
//!
//! ```no_run
//! # use volume_mpr::{NormalizationPolicy, Orientation, PixelData, Slice, SliceConfig,
//! #     SliceSampler, VolumeAssembler, to_gray8};
//! let slices: Vec<Slice> = (0..64)
//!     .map(|_| {
//!         Slice::new(PixelData::I16(vec![0; 256 * 256]), 256, 256)
//!             .with_rescale(1.0, -1024.0)
//!             .with_window(40.0_f32, 400.0_f32)
//!     })
//!     .collect();
//! let volume = VolumeAssembler::new(NormalizationPolicy::Windowed)
//!     .assemble(&slices)
//!     .expect("should have assembled the slice stack");
//! let sampler = SliceSampler::new(SliceConfig::default());
//! let image = sampler.extract_display(&volume, Orientation::Sagittal, 0.5);
//! to_gray8(&image).save("sagittal.png").expect("should have written the image");
//! ```
//!
//! ## Rendering the 3D view on the GPU
//!
//! ```no_run
//! # use volume_mpr::{CameraState, GpuContext, RayMarchConfig, RayMarchRenderer,
//! #     TransferFunctionConfig, VolumeField};
//! # async fn render(volume: &VolumeField) -> Result<(), Box<dyn std::error::Error>> {
//! let gpu = GpuContext::new().await?;
//! let mut renderer = RayMarchRenderer::with_gpu(
//!     RayMarchConfig::default(),
//!     TransferFunctionConfig::default(),
//!     gpu,
//! )
//! .await?;
//! let frame = renderer.render(volume, &CameraState::default()).await?;
//! volume_mpr::to_rgba8(&frame).save("volume.png")?;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod enums;
pub mod gpu_context;
mod gpu_ray_marcher;
mod gpu_slice_extractor;
mod interpolator;
pub mod ray_march;
pub mod scheduler;
pub mod slice;
pub mod slice_sampler;
pub mod transfer_function;
pub mod volume;
pub mod volume_assembler;
mod volume_texture;

pub use camera::{CameraConfig, CameraController, CameraState, DragMode, InputEvent, PointerButton};
pub use config::{ConfigError, RenderConfig};
pub use enums::{Interpolation, NormalizationPolicy, Orientation, Processor};
pub use gpu_context::{GpuContext, GpuError};
pub use gpu_ray_marcher::GpuRayMarcher;
pub use gpu_slice_extractor::GpuSliceExtractor;
pub use ray_march::{RayMarchConfig, RayMarchRenderer, to_rgba8};
pub use scheduler::{Completion, RenderCoalescer, RenderRequest};
pub use slice::{PixelData, Slice, WindowValue};
pub use slice_sampler::{SliceConfig, SliceImage, SliceSampler, to_gray8};
pub use transfer_function::{IntensityBoost, TransferFunctionConfig};
pub use volume::{VolumeField, VolumeId};
pub use volume_assembler::{AssemblerError, VolumeAssembler};
