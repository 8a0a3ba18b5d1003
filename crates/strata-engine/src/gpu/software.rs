use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::coords::{Rect, ScissorRect};
use crate::paint::Color;

use super::{
    BackendError, DrawCall, GpuBackend, PassTarget, PixelBuffer, PixelData, TextureId, TileMode,
    TilingHandle,
};

const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

/// A draw call together with the target it was issued against.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub target: PassTarget,
    pub call: DrawCall,
}

/// CPU reference backend.
///
/// Rasterizes draw calls with nearest sampling and premultiplied source-over
/// blending, and records every call it executes. Clones share state, so a
/// test can hand one clone to a `GpuContext` and inspect the other.
#[derive(Clone, Default)]
pub struct SoftwareBackend {
    state: Rc<RefCell<State>>,
}

struct Buffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Buffer {
    fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0; width as usize * height as usize * 4] }
    }

    fn from_pixels(data: PixelData<'_>) -> Self {
        Self { width: data.width, height: data.height, data: data.pixels.to_vec() }
    }

    fn bytes(&self) -> usize {
        self.data.len()
    }

    fn texel(&self, x: u32, y: u32) -> Color {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[i..i + 4];
        Color::from_premul(
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
            px[3] as f32 / 255.0,
        )
    }

    fn blend(&mut self, x: u32, y: u32, src: Color) {
        let dst = self.texel(x, y);
        let k = 1.0 - src.a;
        let out = Color::from_premul(
            src.r + dst.r * k,
            src.g + dst.g * k,
            src.b + dst.b * k,
            src.a + dst.a * k,
        );
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&out.to_premul_u8());
    }

    fn fill(&mut self, color: Color) {
        let px = color.to_premul_u8();
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
}

struct Tiling {
    pixels: Buffer,
    mode: TileMode,
}

struct Pass {
    target: PassTarget,
    scissor: Option<ScissorRect>,
}

struct State {
    max_texture_size: u32,
    memory_budget: Option<usize>,
    used_bytes: usize,
    next_handle: u64,

    framebuffer: Buffer,
    textures: HashMap<TextureId, Buffer>,
    tilings: HashMap<TilingHandle, Tiling>,
    pass: Option<Pass>,
    lost: Option<String>,

    calls: Vec<RecordedCall>,
    uploads: usize,
    released_textures: Vec<TextureId>,
    released_tilings: Vec<TilingHandle>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            memory_budget: None,
            used_bytes: 0,
            next_handle: 1,
            framebuffer: Buffer::new(0, 0),
            textures: HashMap::new(),
            tilings: HashMap::new(),
            pass: None,
            lost: None,
            calls: Vec::new(),
            uploads: 0,
            released_textures: Vec::new(),
            released_tilings: Vec::new(),
        }
    }
}

impl State {
    fn check_lost(&self) -> Result<(), BackendError> {
        match &self.lost {
            Some(reason) => Err(BackendError::Lost(reason.clone())),
            None => Ok(()),
        }
    }

    fn reserve(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        self.check_lost()?;
        let max = self.max_texture_size;
        if width > max || height > max {
            return Err(BackendError::TextureTooLarge { width, height, max });
        }
        let bytes = width as usize * height as usize * 4;
        if let Some(budget) = self.memory_budget {
            if self.used_bytes + bytes > budget {
                return Err(BackendError::OutOfMemory(format!(
                    "{bytes} bytes requested, {} of {budget} in use",
                    self.used_bytes
                )));
            }
        }
        self.used_bytes += bytes;
        Ok(())
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }

    fn target_buffer(&mut self, target: PassTarget) -> Result<&mut Buffer, BackendError> {
        match target {
            PassTarget::Default => Ok(&mut self.framebuffer),
            PassTarget::Texture(id) => {
                self.textures.get_mut(&id).ok_or(BackendError::UnknownTexture(id))
            }
        }
    }

    fn execute(&mut self, call: &DrawCall) -> Result<(), BackendError> {
        let pass = self.pass.as_ref().ok_or(BackendError::NoActivePass)?;
        let (target, scissor) = (pass.target, pass.scissor);

        // Sampling may read another texture while writing the target, so the
        // target buffer is taken out of the map for the duration.
        let mut dst = match target {
            PassTarget::Default => std::mem::replace(&mut self.framebuffer, Buffer::new(0, 0)),
            PassTarget::Texture(id) => {
                self.textures.remove(&id).ok_or(BackendError::UnknownTexture(id))?
            }
        };
        let result = self.rasterize(&mut dst, scissor, call);
        match target {
            PassTarget::Default => self.framebuffer = dst,
            PassTarget::Texture(id) => {
                self.textures.insert(id, dst);
            }
        }
        result
    }

    fn rasterize(
        &mut self,
        dst: &mut Buffer,
        scissor: Option<ScissorRect>,
        call: &DrawCall,
    ) -> Result<(), BackendError> {
        let bounds = ScissorRect::new(0, 0, dst.width, dst.height);
        let clip = scissor.map_or(bounds, |s| s.intersect(bounds));

        match call {
            DrawCall::Clear(color) => dst.fill(*color),
            DrawCall::SetScissor(s) => {
                if let Some(pass) = self.pass.as_mut() {
                    pass.scissor = *s;
                }
            }
            DrawCall::FillRect { dest, color } => {
                for_each_covered(*dest, clip, |x, y, _, _| dst.blend(x, y, *color));
            }
            DrawCall::Texture { texture, dest, uv, tint } => {
                let src =
                    self.textures.get(texture).ok_or(BackendError::UnknownTexture(*texture))?;
                let (w, h) = (src.width as i64, src.height as i64);
                for_each_covered(*dest, clip, |x, y, tx, ty| {
                    let (u, v) = lerp_uv(*uv, tx, ty);
                    let sx = ((u * w as f32).floor() as i64).clamp(0, w - 1) as u32;
                    let sy = ((v * h as f32).floor() as i64).clamp(0, h - 1) as u32;
                    dst.blend(x, y, modulate(src.texel(sx, sy), *tint));
                });
            }
            DrawCall::Tiled { tiling, dest, uv, tint } => {
                let src =
                    &self.tilings.get(tiling).ok_or(BackendError::UnknownTiling(*tiling))?.pixels;
                let (w, h) = (src.width as i64, src.height as i64);
                for_each_covered(*dest, clip, |x, y, tx, ty| {
                    let (u, v) = lerp_uv(*uv, tx, ty);
                    let sx = ((u * w as f32).floor() as i64).rem_euclid(w) as u32;
                    let sy = ((v * h as f32).floor() as i64).rem_euclid(h) as u32;
                    dst.blend(x, y, modulate(src.texel(sx, sy), *tint));
                });
            }
        }
        Ok(())
    }
}

/// Visits pixels whose centers fall in `dest` and `clip`, passing the
/// pixel plus its normalized position inside `dest`.
fn for_each_covered(dest: Rect, clip: ScissorRect, mut f: impl FnMut(u32, u32, f32, f32)) {
    if clip.is_empty() || dest.is_empty() || !dest.is_finite() {
        return;
    }
    let span = |lo: f32, hi: f32, min: u32, max: u32| {
        let a = ((lo - 0.5).ceil().max(min as f32) as u32).min(max);
        let b = ((hi - 0.5).ceil().max(min as f32) as u32).min(max);
        a..b
    };
    let xs = span(dest.origin.x, dest.max().x, clip.x, clip.x + clip.width);
    let ys = span(dest.origin.y, dest.max().y, clip.y, clip.y + clip.height);
    for y in ys {
        let ty = (y as f32 + 0.5 - dest.origin.y) / dest.size.y;
        for x in xs.clone() {
            let tx = (x as f32 + 0.5 - dest.origin.x) / dest.size.x;
            f(x, y, tx, ty);
        }
    }
}

fn lerp_uv(uv: Rect, tx: f32, ty: f32) -> (f32, f32) {
    (uv.origin.x + uv.size.x * tx, uv.origin.y + uv.size.y * ty)
}

fn modulate(c: Color, tint: Color) -> Color {
    Color::from_premul(c.r * tint.r, c.g * tint.g, c.b * tint.b, c.a * tint.a)
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_texture_size(self, max: u32) -> Self {
        self.state.borrow_mut().max_texture_size = max;
        self
    }

    /// Limits the bytes of live textures and tilings; allocations past it fail
    /// with `BackendError::OutOfMemory`.
    pub fn with_memory_budget(self, bytes: usize) -> Self {
        self.state.borrow_mut().memory_budget = Some(bytes);
        self
    }

    /// Simulates a device reset: every later call fails with `Lost`.
    pub fn lose_context(&self, reason: &str) {
        self.state.borrow_mut().lost = Some(reason.to_owned());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        let state = self.state.borrow();
        (state.framebuffer.width, state.framebuffer.height)
    }

    /// Premultiplied RGBA at `(x, y)` of the default target.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let state = self.state.borrow();
        let fb = &state.framebuffer;
        if x >= fb.width || y >= fb.height {
            return None;
        }
        let c = fb.texel(x, y);
        Some(c.to_premul_u8())
    }

    /// Texture uploads and re-uploads performed so far.
    pub fn uploads(&self) -> usize {
        self.state.borrow().uploads
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_tilings(&self) -> usize {
        self.state.borrow().tilings.len()
    }

    pub fn released_textures(&self) -> Vec<TextureId> {
        self.state.borrow().released_textures.clone()
    }

    /// Repeat flags a live tiling handle was created with.
    pub fn tile_mode(&self, tiling: TilingHandle) -> Option<TileMode> {
        self.state.borrow().tilings.get(&tiling).map(|t| t.mode)
    }

    pub fn released_tilings(&self) -> Vec<TilingHandle> {
        self.state.borrow().released_tilings.clone()
    }
}

impl GpuBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn max_texture_size(&self) -> u32 {
        self.state.borrow().max_texture_size
    }

    /// Sizes over the texture limit leave an empty framebuffer.
    fn resize(&mut self, width: u32, height: u32) {
        let mut state = self.state.borrow_mut();
        let max = state.max_texture_size;
        state.framebuffer = if width <= max && height <= max {
            Buffer::new(width, height)
        } else {
            Buffer::new(0, 0)
        };
    }

    fn create_texture(&mut self, data: PixelData<'_>) -> Result<TextureId, BackendError> {
        let mut state = self.state.borrow_mut();
        state.reserve(data.width, data.height)?;
        let id = TextureId::new(state.next_raw());
        state.textures.insert(id, Buffer::from_pixels(data));
        state.uploads += 1;
        Ok(id)
    }

    fn update_texture(
        &mut self,
        texture: TextureId,
        data: PixelData<'_>,
    ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.check_lost()?;
        let slot = state.textures.get_mut(&texture).ok_or(BackendError::UnknownTexture(texture))?;
        *slot = Buffer::from_pixels(data);
        state.uploads += 1;
        Ok(())
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> Result<TextureId, BackendError> {
        let mut state = self.state.borrow_mut();
        state.reserve(width, height)?;
        let id = TextureId::new(state.next_raw());
        state.textures.insert(id, Buffer::new(width, height));
        Ok(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        if let Some(buffer) = state.textures.remove(&texture) {
            state.used_bytes = state.used_bytes.saturating_sub(buffer.bytes());
            state.released_textures.push(texture);
        }
    }

    fn create_tiling(
        &mut self,
        data: PixelData<'_>,
        mode: TileMode,
    ) -> Result<TilingHandle, BackendError> {
        let mut state = self.state.borrow_mut();
        state.reserve(data.width, data.height)?;
        let handle = TilingHandle::new(state.next_raw());
        state.tilings.insert(handle, Tiling { pixels: Buffer::from_pixels(data), mode });
        Ok(handle)
    }

    fn release_tiling(&mut self, tiling: TilingHandle) {
        let mut state = self.state.borrow_mut();
        if let Some(t) = state.tilings.remove(&tiling) {
            state.used_bytes = state.used_bytes.saturating_sub(t.pixels.bytes());
            state.released_tilings.push(tiling);
        }
    }

    fn begin_pass(&mut self, target: PassTarget) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.check_lost()?;
        state.target_buffer(target)?;
        state.pass = Some(Pass { target, scissor: None });
        Ok(())
    }

    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.check_lost()?;
        state.execute(&call)?;
        let target = state.pass.as_ref().map_or(PassTarget::Default, |p| p.target);
        state.calls.push(RecordedCall { target, call });
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.check_lost()?;
        state.pass.take().map(|_| ()).ok_or(BackendError::NoActivePass)
    }

    fn read_pixels(&mut self, target: PassTarget) -> Result<PixelBuffer, BackendError> {
        let mut state = self.state.borrow_mut();
        state.check_lost()?;
        let buffer = state.target_buffer(target)?;
        Ok(PixelBuffer { width: buffer.width, height: buffer.height, data: buffer.data.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
        px.repeat((w * h) as usize)
    }

    fn backend(w: u32, h: u32) -> SoftwareBackend {
        let mut b = SoftwareBackend::new();
        b.resize(w, h);
        b
    }

    #[test]
    fn fill_rect_covers_pixel_centers() {
        let mut b = backend(4, 4);
        b.begin_pass(PassTarget::Default).unwrap();
        let dest = Rect::new(1.0, 1.0, 2.0, 2.0);
        b.draw(DrawCall::FillRect { dest, color: Color::white() }).unwrap();
        b.end_pass().unwrap();
        assert_eq!(b.pixel(1, 1), Some([255; 4]));
        assert_eq!(b.pixel(2, 2), Some([255; 4]));
        assert_eq!(b.pixel(0, 0), Some([0; 4]));
        assert_eq!(b.pixel(3, 3), Some([0; 4]));
    }

    #[test]
    fn scissor_limits_fill() {
        let mut b = backend(4, 4);
        b.begin_pass(PassTarget::Default).unwrap();
        b.draw(DrawCall::SetScissor(Some(ScissorRect::new(0, 0, 1, 4)))).unwrap();
        let dest = Rect::new(0.0, 0.0, 4.0, 4.0);
        b.draw(DrawCall::FillRect { dest, color: Color::white() }).unwrap();
        b.end_pass().unwrap();
        assert_eq!(b.pixel(0, 3), Some([255; 4]));
        assert_eq!(b.pixel(1, 0), Some([0; 4]));
    }

    #[test]
    fn clear_ignores_scissor() {
        let mut b = backend(2, 2);
        b.begin_pass(PassTarget::Default).unwrap();
        b.draw(DrawCall::SetScissor(Some(ScissorRect::new(0, 0, 1, 1)))).unwrap();
        b.draw(DrawCall::Clear(Color::white())).unwrap();
        b.end_pass().unwrap();
        assert_eq!(b.pixel(1, 1), Some([255; 4]));
    }

    #[test]
    fn tiled_draw_wraps() {
        let mut b = backend(4, 1);
        let mut px = solid(2, 1, [0, 0, 0, 255]);
        px[4..8].copy_from_slice(&[255, 255, 255, 255]);
        let mode = TileMode { repeat_x: true, repeat_y: true };
        let tiling = b.create_tiling(PixelData { width: 2, height: 1, pixels: &px }, mode).unwrap();

        b.begin_pass(PassTarget::Default).unwrap();
        let dest = Rect::new(0.0, 0.0, 4.0, 1.0);
        let uv = Rect::new(0.0, 0.0, 2.0, 1.0);
        b.draw(DrawCall::Tiled { tiling, dest, uv, tint: Color::white() }).unwrap();
        b.end_pass().unwrap();

        assert_eq!(b.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(b.pixel(1, 0), Some([255; 4]));
        assert_eq!(b.pixel(2, 0), Some([0, 0, 0, 255]));
        assert_eq!(b.pixel(3, 0), Some([255; 4]));
    }

    #[test]
    fn texture_draw_applies_tint() {
        let mut b = backend(1, 1);
        let px = solid(1, 1, [255; 4]);
        let texture = b.create_texture(PixelData { width: 1, height: 1, pixels: &px }).unwrap();
        b.begin_pass(PassTarget::Default).unwrap();
        let tint = Color::white().with_opacity(0.5);
        let unit = Rect::new(0.0, 0.0, 1.0, 1.0);
        b.draw(DrawCall::Texture { texture, dest: unit, uv: unit, tint }).unwrap();
        b.end_pass().unwrap();
        assert_eq!(b.pixel(0, 0), Some([128; 4]));
    }

    #[test]
    fn render_target_can_be_sampled() {
        let mut b = backend(2, 2);
        let rt = b.create_render_target(1, 1).unwrap();
        b.begin_pass(PassTarget::Texture(rt)).unwrap();
        b.draw(DrawCall::Clear(Color::from_rgba8(0, 0, 255, 255))).unwrap();
        b.end_pass().unwrap();

        b.begin_pass(PassTarget::Default).unwrap();
        let uv = Rect::new(0.0, 0.0, 1.0, 1.0);
        let dest = Rect::new(0.0, 0.0, 2.0, 2.0);
        b.draw(DrawCall::Texture { texture: rt, dest, uv, tint: Color::white() }).unwrap();
        b.end_pass().unwrap();
        assert_eq!(b.pixel(1, 1), Some([0, 0, 255, 255]));
    }

    #[test]
    fn memory_budget_rejects_allocations() {
        let mut b = SoftwareBackend::new().with_memory_budget(16);
        assert!(b.create_render_target(2, 2).is_ok());
        assert!(matches!(b.create_render_target(1, 1), Err(BackendError::OutOfMemory(_))));
    }

    #[test]
    fn draw_outside_pass_fails() {
        let mut b = backend(1, 1);
        assert_eq!(b.draw(DrawCall::Clear(Color::black())), Err(BackendError::NoActivePass));
    }

    #[test]
    fn lost_backend_rejects_everything() {
        let mut b = backend(1, 1);
        b.lose_context("reset");
        assert!(matches!(b.begin_pass(PassTarget::Default), Err(BackendError::Lost(_))));
        assert!(matches!(b.create_render_target(1, 1), Err(BackendError::Lost(_))));
    }
}
