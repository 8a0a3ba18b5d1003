use std::collections::HashMap;

use crate::coords::{Rect, ScissorRect};
use crate::device::Gpu;
use crate::gpu::{
    BackendError, DrawCall, GpuBackend, PassTarget, PixelBuffer, PixelData, TextureId, TileMode,
    TilingHandle,
};
use crate::paint::Color;
use crate::render::{RenderCtx, RenderTarget};

use super::common::{padded_bytes_per_row, QuadInstance, TEXTURE_FORMAT};
use super::quad::{QuadDraw, QuadRenderer, SamplerKind, Segment};

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Source {
    White,
    Texture(TextureId),
    Tiling(TilingHandle),
}

enum PassOp {
    Clear(Color),
    Quad { source: Source, dest: Rect, uv: Rect, tint: Color, scissor: ScissorRect },
}

struct PendingPass {
    target: PassTarget,
    bounds: ScissorRect,
    scissor: Option<ScissorRect>,
    ops: Vec<PassOp>,
}

/// `GpuBackend` over wgpu.
///
/// Draw calls are recorded per pass and encoded at `end_pass`; each `Clear`
/// starts a new render pass with `LoadOp::Clear`. The default target is an
/// offscreen `Rgba8Unorm` texture the host can copy to its own surface.
pub struct WgpuBackend {
    gpu: Gpu,
    quad: QuadRenderer,

    framebuffer: Option<GpuTexture>,
    white: Option<GpuTexture>,
    textures: HashMap<TextureId, GpuTexture>,
    tilings: HashMap<TilingHandle, GpuTexture>,

    pass: Option<PendingPass>,
    next_handle: u64,
}

impl WgpuBackend {
    pub fn new(gpu: Gpu) -> Self {
        Self {
            gpu,
            quad: QuadRenderer::new(),
            framebuffer: None,
            white: None,
            textures: HashMap::new(),
            tilings: HashMap::new(),
            pass: None,
            next_handle: 1,
        }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    /// The default target, `None` while the view is zero-sized.
    pub fn framebuffer(&self) -> Option<&wgpu::Texture> {
        self.framebuffer.as_ref().map(|t| &t.texture)
    }

    fn check_lost(&self) -> Result<(), BackendError> {
        match self.gpu.lost_reason() {
            Some(reason) => Err(BackendError::Lost(reason)),
            None => Ok(()),
        }
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }

    fn check_size(&self, width: u32, height: u32) -> Result<(), BackendError> {
        self.check_lost()?;
        let max = self.gpu.max_texture_size();
        if width == 0 || height == 0 || width > max || height > max {
            return Err(BackendError::TextureTooLarge { width, height, max });
        }
        Ok(())
    }

    fn allocate(
        &mut self,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        sampler: SamplerKind,
        label: &str,
    ) -> GpuTexture {
        let device = self.gpu.device();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.quad.bind_texture(device, &view, sampler);
        GpuTexture { texture, view, bind_group, width, height }
    }

    fn upload(&self, texture: &GpuTexture, data: PixelData<'_>) {
        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(data.width * 4),
                rows_per_image: Some(data.height),
            },
            wgpu::Extent3d { width: data.width, height: data.height, depth_or_array_layers: 1 },
        );
    }

    fn sampled(
        &mut self,
        data: PixelData<'_>,
        sampler: SamplerKind,
        label: &str,
    ) -> Result<GpuTexture, BackendError> {
        self.check_size(data.width, data.height)?;
        let expected = data.width as usize * data.height as usize * 4;
        if data.pixels.len() != expected {
            return Err(BackendError::OutOfMemory(format!(
                "pixel buffer has {} bytes, expected {expected}",
                data.pixels.len()
            )));
        }
        let usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        let texture = self.allocate(data.width, data.height, usage, sampler, label);
        self.upload(&texture, data);
        Ok(texture)
    }

    fn ensure_white(&mut self) {
        if self.white.is_some() {
            return;
        }
        let px = [255u8; 4];
        let data = PixelData { width: 1, height: 1, pixels: &px };
        self.white = self.sampled(data, SamplerKind::Clamp, "strata white texture").ok();
    }

    fn target_bounds(&self, target: PassTarget) -> Result<ScissorRect, BackendError> {
        let texture = match target {
            PassTarget::Default => self.framebuffer.as_ref(),
            PassTarget::Texture(id) => {
                Some(self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?)
            }
        };
        Ok(texture.map_or(ScissorRect::default(), |t| ScissorRect::new(0, 0, t.width, t.height)))
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn max_texture_size(&self) -> u32 {
        self.gpu.max_texture_size()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(fb) = &self.framebuffer {
            if (fb.width, fb.height) == (width, height) {
                return;
            }
        }
        let max = self.gpu.max_texture_size();
        self.framebuffer = if width == 0 || height == 0 {
            None
        } else if width > max || height > max {
            log::warn!(
                "framebuffer {width}x{height} exceeds the device limit of {max}; not allocated"
            );
            None
        } else {
            let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC;
            Some(self.allocate(width, height, usage, SamplerKind::Clamp, "strata framebuffer"))
        };
    }

    fn create_texture(&mut self, data: PixelData<'_>) -> Result<TextureId, BackendError> {
        let texture = self.sampled(data, SamplerKind::Clamp, "strata image texture")?;
        let id = TextureId::new(self.next_raw());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        data: PixelData<'_>,
    ) -> Result<(), BackendError> {
        self.check_lost()?;
        let existing = self.textures.get(&texture).ok_or(BackendError::UnknownTexture(texture))?;
        if (existing.width, existing.height) == (data.width, data.height) {
            self.upload(existing, data);
            return Ok(());
        }
        let replacement = self.sampled(data, SamplerKind::Clamp, "strata image texture")?;
        self.textures.insert(texture, replacement);
        Ok(())
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> Result<TextureId, BackendError> {
        self.check_size(width, height)?;
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let texture =
            self.allocate(width, height, usage, SamplerKind::Clamp, "strata render target");
        let id = TextureId::new(self.next_raw());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn create_tiling(
        &mut self,
        data: PixelData<'_>,
        mode: TileMode,
    ) -> Result<TilingHandle, BackendError> {
        let texture = self.sampled(data, SamplerKind::Repeat, "strata tiling texture")?;
        let handle = TilingHandle::new(self.next_raw());
        self.tilings.insert(handle, texture);
        log::trace!("wgpu tiling {handle:?} ({mode:?})");
        Ok(handle)
    }

    fn release_tiling(&mut self, tiling: TilingHandle) {
        if let Some(t) = self.tilings.remove(&tiling) {
            t.texture.destroy();
        }
    }

    fn begin_pass(&mut self, target: PassTarget) -> Result<(), BackendError> {
        self.check_lost()?;
        let bounds = self.target_bounds(target)?;
        self.ensure_white();
        self.pass = Some(PendingPass { target, bounds, scissor: None, ops: Vec::new() });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError> {
        self.check_lost()?;
        match &call {
            DrawCall::Texture { texture, .. } if !self.textures.contains_key(texture) => {
                return Err(BackendError::UnknownTexture(*texture));
            }
            DrawCall::Tiled { tiling, .. } if !self.tilings.contains_key(tiling) => {
                return Err(BackendError::UnknownTiling(*tiling));
            }
            _ => {}
        }

        let pass = self.pass.as_mut().ok_or(BackendError::NoActivePass)?;
        let scissor = pass.scissor.map_or(pass.bounds, |s| s.intersect(pass.bounds));
        let (source, dest, uv, tint) = match call {
            DrawCall::Clear(color) => {
                pass.ops.push(PassOp::Clear(color));
                return Ok(());
            }
            DrawCall::SetScissor(s) => {
                pass.scissor = s;
                return Ok(());
            }
            DrawCall::FillRect { dest, color } => {
                (Source::White, dest, Rect::new(0.0, 0.0, 1.0, 1.0), color)
            }
            DrawCall::Texture { texture, dest, uv, tint } => {
                if pass.target == PassTarget::Texture(texture) {
                    log::warn!("skipping draw of {texture:?} into itself");
                    return Ok(());
                }
                (Source::Texture(texture), dest, uv, tint)
            }
            DrawCall::Tiled { tiling, dest, uv, tint } => (Source::Tiling(tiling), dest, uv, tint),
        };
        if !scissor.is_empty() {
            pass.ops.push(PassOp::Quad { source, dest, uv, tint, scissor });
        }
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), BackendError> {
        let pass = self.pass.take().ok_or(BackendError::NoActivePass)?;
        self.check_lost()?;

        let Self { gpu, quad, framebuffer, white, textures, tilings, .. } = self;
        let target = match pass.target {
            PassTarget::Default => framebuffer.as_ref(),
            PassTarget::Texture(id) => {
                Some(textures.get(&id).ok_or(BackendError::UnknownTexture(id))?)
            }
        };
        let Some(target) = target else {
            return Ok(());
        };

        let mut segments = vec![Segment { load: wgpu::LoadOp::Load, draws: Vec::new() }];
        for op in &pass.ops {
            match op {
                PassOp::Clear(c) => {
                    let load = wgpu::LoadOp::Clear(wgpu::Color {
                        r: c.r as f64,
                        g: c.g as f64,
                        b: c.b as f64,
                        a: c.a as f64,
                    });
                    match segments.last_mut() {
                        Some(last) if last.draws.is_empty() => last.load = load,
                        _ => segments.push(Segment { load, draws: Vec::new() }),
                    }
                }
                PassOp::Quad { source, dest, uv, tint, scissor } => {
                    let bound = match source {
                        Source::White => white.as_ref(),
                        Source::Texture(id) => textures.get(id),
                        Source::Tiling(id) => tilings.get(id),
                    };
                    let Some(bound) = bound else { continue };
                    let color = [tint.r, tint.g, tint.b, tint.a];
                    let instance =
                        QuadInstance::new(*dest, *uv, color, target.width, target.height);
                    if let Some(segment) = segments.last_mut() {
                        let bind_group = &bound.bind_group;
                        segment.draws.push(QuadDraw { bind_group, instance, scissor: *scissor });
                    }
                }
            }
        }

        let mut encoder = gpu.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("strata pass encoder"),
        });
        {
            let ctx = RenderCtx::new(gpu.device(), gpu.queue(), (target.width, target.height));
            let mut rt = RenderTarget::new(&mut encoder, &target.view);
            quad.render(&ctx, &mut rt, &segments);
        }
        gpu.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, target: PassTarget) -> Result<PixelBuffer, BackendError> {
        self.check_lost()?;
        let texture = match target {
            PassTarget::Default => self.framebuffer.as_ref(),
            PassTarget::Texture(id) => {
                Some(self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?)
            }
        };
        let Some(texture) = texture else {
            return Ok(PixelBuffer { width: 0, height: 0, data: Vec::new() });
        };
        let (width, height) = (texture.width, texture.height);

        let device = self.gpu.device();
        let bytes_per_row = padded_bytes_per_row(width);
        let copy_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata readback buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("strata readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &copy_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.gpu.queue().submit([encoder.finish()]);

        let (tx, rx) = std::sync::mpsc::channel();
        copy_buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| BackendError::Lost(format!("device poll failed: {err}")))?;
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(BackendError::Lost(format!("readback mapping failed: {err}")));
            }
            Err(_) => return Err(BackendError::Lost("readback callback dropped".into())),
        }

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for row in copy_buffer.slice(..).get_mapped_range().chunks_exact(bytes_per_row as usize) {
            data.extend_from_slice(&row[..width as usize * 4]);
        }
        copy_buffer.unmap();
        Ok(PixelBuffer { width, height, data })
    }
}
