//! Headless strata demo.
//!
//! Builds the embedded JSON scene, paints it once and writes the frame as a
//! PNG: `strata-studio [out.png]`.

mod scene;

use anyhow::{Context, Result};

use strata_engine::device::{Gpu, GpuInit};
use strata_engine::gpu::{GpuBackend, SoftwareBackend};
use strata_engine::logging::{init_logging, LoggingConfig};
use strata_engine::render::WgpuBackend;
use strata_engine::GraphicsGl;

const SCENE: &str = include_str!("../scene.json");

fn backend() -> Box<dyn GpuBackend> {
    match Gpu::headless(GpuInit::default()) {
        Ok(gpu) => Box::new(WgpuBackend::new(gpu)),
        Err(err) => {
            log::warn!("no usable GPU ({err:#}); falling back to the software backend");
            Box::new(SoftwareBackend::new())
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let out = std::env::args().nth(1).unwrap_or_else(|| "strata.png".to_owned());
    let description = strata_json::parse(SCENE).context("embedded scene is not valid JSON")?;

    let mut gfx = GraphicsGl::from_config(backend(), &scene::config(&description))?;
    scene::build(&mut gfx, &description)?;
    log::info!("scene has {} layers on {}", gfx.layers().len(), gfx.ctx().backend_name());

    gfx.paint().context("paint failed")?;
    let frame = gfx.snapshot().context("frame read-back failed")?;
    frame.save(&out).with_context(|| format!("failed to write {out}"))?;

    log::info!("wrote {}x{} frame to {out}", frame.width(), frame.height());
    Ok(())
}
