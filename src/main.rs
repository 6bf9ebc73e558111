use std::{error::Error, sync::Arc};

use env_logger::Env;
use glam::Vec2;
use log::{info, warn};
use volume_mpr::{
    CameraController, Completion, GpuContext, InputEvent, Orientation, PixelData, PointerButton,
    Processor, RayMarchRenderer, RenderCoalescer, RenderConfig, Slice, SliceSampler,
    VolumeAssembler, to_gray8, to_rgba8,
};
use web_time::Instant;

const PHANTOM_DEPTH: usize = 48;
const PHANTOM_SIZE: usize = 96;

/// CT-like series: air around a soft tissue ellipsoid with a dense core.
fn phantom_series() -> Vec<Slice> {
    let centre = (PHANTOM_SIZE as f32 - 1.0) / 2.0;
    let middle = (PHANTOM_DEPTH as f32 - 1.0) / 2.0;
    (0..PHANTOM_DEPTH)
        .map(|z| {
            let dz = (z as f32 - middle) / middle;
            let mut samples = vec![0i16; PHANTOM_SIZE * PHANTOM_SIZE];
            for (i, sample) in samples.iter_mut().enumerate() {
                let dx = ((i % PHANTOM_SIZE) as f32 - centre) / centre;
                let dy = ((i / PHANTOM_SIZE) as f32 - centre) / (centre * 0.8);
                let r2 = dx * dx + dy * dy + dz * dz;
                *sample = if r2 < 0.1 {
                    1824 // 800 HU
                } else if r2 < 0.8 {
                    1064 // 40 HU
                } else {
                    0
                };
            }
            Slice::new(PixelData::I16(samples), PHANTOM_SIZE, PHANTOM_SIZE)
                .with_rescale(1.0, -1024.0)
                .with_window(200.0_f32, 1200.0_f32)
        })
        .collect()
}

async fn gpu_context(processor: Processor) -> Option<GpuContext> {
    match processor {
        Processor::CPU => None,
        Processor::GPU => match GpuContext::new().await {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                warn!("{e}, falling back to the CPU processor");
                None
            }
        },
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => RenderConfig::from_json_file(path)?,
        None => RenderConfig::default(),
    };

    let volume = Arc::new(VolumeAssembler::new(config.normalization).assemble(&phantom_series())?);
    let (depth, height, width) = volume.dim();
    info!("Assembled {width}x{height}x{depth} volume");

    let gpu = gpu_context(config.processor).await;

    let mut sampler = match &gpu {
        Some(gpu) => SliceSampler::with_gpu(config.slice.clone(), gpu.clone()).await?,
        None => SliceSampler::new(config.slice.clone()),
    };
    for orientation in Orientation::ALL {
        let raw = sampler.extract_async(&volume, orientation, 0.5).await?;
        let path = format!("{}.png", format!("{orientation:?}").to_lowercase());
        to_gray8(&sampler.apply_display(&raw)).save(&path)?;
        info!(
            "Wrote {path}: slice {} of {} ({:?})",
            volume.slice_number(orientation, 0.5),
            volume.slice_count(orientation),
            sampler.processor()
        );
    }

    let mut renderer = match gpu {
        Some(gpu) => {
            RayMarchRenderer::with_gpu(config.ray_march.clone(), config.transfer, gpu).await?
        }
        None => RayMarchRenderer::new(config.ray_march.clone(), config.transfer),
    };

    // Scripted interaction: a rotating drag followed by one zoom step.
    let viewport = Vec2::new(config.ray_march.width as f32, config.ray_march.height as f32);
    let mut controller = CameraController::new(config.camera, viewport.x, viewport.y);
    let mut coalescer = RenderCoalescer::new(config.frame_interval());
    let events = [
        InputEvent::PointerDown {
            button: PointerButton::Secondary,
            position: viewport * 0.5,
        },
        InputEvent::PointerMove {
            position: viewport * Vec2::new(0.6, 0.45),
        },
        InputEvent::PointerMove {
            position: viewport * Vec2::new(0.7, 0.4),
        },
        InputEvent::PointerUp {
            button: PointerButton::Secondary,
        },
        InputEvent::Wheel { delta_y: -1.0 },
    ];
    for event in &events {
        controller.handle(event);
        coalescer.request(*controller.state());
    }

    while let Some(request) = coalescer.poll(Instant::now()) {
        let frame = renderer.render(&volume, &request.params).await?;
        if coalescer.complete(request.generation) == Completion::Current {
            to_rgba8(&frame).save("volume.png")?;
            info!(
                "Wrote volume.png at {:.0}% zoom ({:?})",
                request.params.zoom_percent(),
                renderer.processor()
            );
        }
    }

    Ok(())
}
