use std::collections::HashMap;

use crate::config::GraphicsConfig;
use crate::coords::{Affine, Rect, Scale, ScissorRect, Vec2};
use crate::error::{GraphicsError, Result};
use crate::image::{Image, ImageId, Pattern, RetiredTilings, WeakImage};
use crate::paint::Color;

use super::{
    BackendError, DrawCall, GpuBackend, PassTarget, PixelBuffer, PixelData, TextureId, TileMode,
    TilingHandle,
};

/// Off-screen render target allocated for a surface layer, in device pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
}

struct TextureEntry {
    texture: TextureId,
    version: u64,
    layer_refs: u32,
    image: WeakImage,
}

/// Device-space viewport geometry derived from the view size and scale.
#[derive(Debug, Copy, Clone)]
struct DeviceView {
    bounds: ScissorRect,
    logical: Vec2,
}

#[derive(Debug, Copy, Clone)]
struct ActivePass {
    target: PassTarget,
    bounds: ScissorRect,
}

/// Shared rendering context: viewport, scale factor and the draw-call
/// surface every layer renders through.
///
/// Public drawing APIs are logical; this type is the only place logical
/// coordinates become device pixels. Backend failures inside a pass move the
/// context into a terminal lost state; afterwards every operation reports
/// `GraphicsError::ContextLost`.
pub struct GpuContext {
    backend: Box<dyn GpuBackend>,
    scale: Scale,
    view_width: u32,
    view_height: u32,
    device_view: Option<DeviceView>,

    textures: HashMap<ImageId, TextureEntry>,
    render_targets: HashMap<TextureId, RenderTarget>,
    retired_tilings: RetiredTilings,

    pass: Option<ActivePass>,
    clips: Vec<ScissorRect>,
    lost: Option<String>,
}

impl GpuContext {
    pub fn new(backend: Box<dyn GpuBackend>, config: &GraphicsConfig) -> Result<Self> {
        let factor = config.scale_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(GraphicsError::invalid("scale_factor", format!("{factor} is not positive")));
        }

        let mut ctx = Self {
            backend,
            scale: Scale::new(factor),
            view_width: config.view_width,
            view_height: config.view_height,
            device_view: None,
            textures: HashMap::new(),
            render_targets: HashMap::new(),
            retired_tilings: RetiredTilings::default(),
            pass: None,
            clips: Vec::new(),
            lost: None,
        };
        ctx.backend.resize(ctx.view_width, ctx.view_height);

        log::info!(
            "gpu context ready: backend={} view={}x{} scale={}",
            ctx.backend.name(),
            ctx.view_width,
            ctx.view_height,
            factor
        );
        Ok(ctx)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Updates the device viewport. Negative sizes clamp to zero.
    pub fn set_size(&mut self, width: i32, height: i32) {
        let width = width.max(0) as u32;
        let height = height.max(0) as u32;
        self.view_width = width;
        self.view_height = height;
        self.device_view = None;
        let max = self.backend.max_texture_size();
        if width > max || height > max {
            log::warn!(
                "viewport {width}x{height} exceeds the texture limit of {max}; drawing is disabled"
            );
        }
        self.backend.resize(width, height);
        log::debug!("viewport resized to {width}x{height}");
    }

    pub fn view_width(&self) -> u32 {
        self.view_width
    }

    pub fn view_height(&self) -> u32 {
        self.view_height
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale.factor
    }

    pub fn logical_width(&self) -> f32 {
        self.scale.inv_scaled(self.view_width as f32)
    }

    pub fn logical_height(&self) -> f32 {
        self.scale.inv_scaled(self.view_height as f32)
    }

    pub fn max_texture_size(&self) -> u32 {
        self.backend.max_texture_size()
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    pub fn check_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(GraphicsError::ContextLost(reason.clone())),
            None => Ok(()),
        }
    }

    /// Number of images currently uploaded.
    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    /// Logical size of the default target.
    pub(crate) fn logical_view(&mut self) -> Vec2 {
        self.device_view().logical
    }

    /// A view larger than the backend's texture limit has empty bounds, so
    /// passes on it are skipped.
    fn device_view(&mut self) -> DeviceView {
        let (width, height, scale) = (self.view_width, self.view_height, self.scale);
        let max = self.backend.max_texture_size();
        *self.device_view.get_or_insert_with(|| DeviceView {
            bounds: if width <= max && height <= max {
                ScissorRect::new(0, 0, width, height)
            } else {
                ScissorRect::default()
            },
            logical: Vec2::new(scale.inv_scaled(width as f32), scale.inv_scaled(height as f32)),
        })
    }

    pub(crate) fn lose(&mut self, reason: impl Into<String>) {
        if self.lost.is_none() {
            let reason = reason.into();
            log::error!("GPU context lost: {reason}");
            self.lost = Some(reason);
        }
        self.pass = None;
        self.clips.clear();
    }

    fn pass_failure(&mut self, err: BackendError) -> GraphicsError {
        let reason = err.to_string();
        self.lose(reason.clone());
        GraphicsError::ContextLost(reason)
    }

    fn allocation_failure(&mut self, err: BackendError) -> GraphicsError {
        if err.is_allocation_failure() {
            log::warn!("GPU allocation failed: {err}");
            err.into()
        } else {
            self.pass_failure(err)
        }
    }

    /// Rejects pixel extents the backend cannot hold with `ResourceExhausted`.
    pub(crate) fn check_texture_size(&self, width: u32, height: u32) -> Result<()> {
        let max = self.backend.max_texture_size();
        if width > max || height > max {
            let err = BackendError::TextureTooLarge { width, height, max };
            log::warn!("GPU allocation failed: {err}");
            return Err(GraphicsError::ResourceExhausted(err.to_string()));
        }
        Ok(())
    }

    // ── textures ───────────────────────────────────────────────────────────

    /// Texture holding `image`, uploading on first use and re-uploading when
    /// the image version changed. `None` for images without pixels.
    pub(crate) fn texture_for(&mut self, image: &Image) -> Result<Option<TextureId>> {
        self.check_alive()?;
        let (width, height) = (image.pixel_width(), image.pixel_height());
        if width == 0 || height == 0 {
            return Ok(None);
        }

        let id = image.id();
        if let Some(entry) = self.textures.get(&id) {
            if entry.version == image.version() {
                return Ok(Some(entry.texture));
            }
            let texture = entry.texture;
            let pixels = image.premultiplied();
            let data = PixelData { width, height, pixels: &pixels };
            if let Err(err) = self.backend.update_texture(texture, data) {
                return Err(self.allocation_failure(err));
            }
            if let Some(entry) = self.textures.get_mut(&id) {
                entry.version = image.version();
            }
            log::trace!("re-uploaded {id:?} at version {}", image.version());
            return Ok(Some(texture));
        }

        self.check_texture_size(width, height)?;
        let pixels = image.premultiplied();
        let data = PixelData { width, height, pixels: &pixels };
        let texture = match self.backend.create_texture(data) {
            Ok(texture) => texture,
            Err(err) => return Err(self.allocation_failure(err)),
        };
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                version: image.version(),
                layer_refs: 0,
                image: image.downgrade(),
            },
        );
        log::debug!("uploaded {id:?} as {texture:?} ({width}x{height})");
        Ok(Some(texture))
    }

    /// Like `texture_for`, and records a layer reference that keeps the
    /// texture alive until the matching `release_image`.
    pub(crate) fn retain_image(&mut self, image: &Image) -> Result<Option<TextureId>> {
        let texture = self.texture_for(image)?;
        if let Some(entry) = self.textures.get_mut(&image.id()) {
            entry.layer_refs += 1;
        }
        Ok(texture)
    }

    /// Drops a layer reference; the texture is released when none remain.
    pub(crate) fn release_image(&mut self, image: ImageId) {
        let Some(entry) = self.textures.get_mut(&image) else {
            return;
        };
        entry.layer_refs = entry.layer_refs.saturating_sub(1);
        if entry.layer_refs == 0 {
            if let Some(entry) = self.textures.remove(&image) {
                self.backend.release_texture(entry.texture);
                log::debug!("released {:?} for {image:?}", entry.texture);
            }
        }
    }

    /// Frame-boundary housekeeping: releases textures of dropped images that
    /// no layer holds, and tiling handles of dropped patterns.
    pub(crate) fn begin_frame(&mut self) {
        let dead: Vec<ImageId> = self
            .textures
            .iter()
            .filter(|(_, e)| e.layer_refs == 0 && e.image.is_dead())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            if let Some(entry) = self.textures.remove(&id) {
                self.backend.release_texture(entry.texture);
                log::trace!("purged {:?} for dropped {id:?}", entry.texture);
            }
        }

        let retired: Vec<TilingHandle> = self.retired_tilings.borrow_mut().drain(..).collect();
        for tiling in retired {
            self.backend.release_tiling(tiling);
            log::trace!("released {tiling:?}");
        }
    }

    // ── render targets ─────────────────────────────────────────────────────

    /// Allocates a target covering `width` × `height` logical units.
    /// `None` when either device extent is zero.
    pub(crate) fn create_render_target(
        &mut self,
        width: f32,
        height: f32,
    ) -> Result<Option<RenderTarget>> {
        self.check_alive()?;
        let (w, h) = (self.scale.scaled_ceil(width), self.scale.scaled_ceil(height));
        if w == 0 || h == 0 {
            return Ok(None);
        }
        self.check_texture_size(w, h)?;
        let texture = match self.backend.create_render_target(w, h) {
            Ok(texture) => texture,
            Err(err) => return Err(self.allocation_failure(err)),
        };
        let target = RenderTarget { texture, width: w, height: h };
        self.render_targets.insert(texture, target);
        log::debug!("allocated render target {texture:?} ({w}x{h})");
        Ok(Some(target))
    }

    pub(crate) fn release_render_target(&mut self, texture: TextureId) {
        if self.render_targets.remove(&texture).is_some() {
            self.backend.release_texture(texture);
            log::debug!("released render target {texture:?}");
        }
    }

    // ── patterns ───────────────────────────────────────────────────────────

    /// Builds the backend tiling handle for `image` once.
    pub fn create_pattern(
        &mut self,
        image: &Image,
        repeat_x: bool,
        repeat_y: bool,
    ) -> Result<Pattern> {
        self.check_alive()?;
        let (width, height) = (image.pixel_width(), image.pixel_height());
        if width == 0 || height == 0 {
            return Err(GraphicsError::invalid("image", "pattern image has no pixels"));
        }
        self.check_texture_size(width, height)?;

        let pixels = image.premultiplied();
        let data = PixelData { width, height, pixels: &pixels };
        let tiling = match self.backend.create_tiling(data, TileMode { repeat_x, repeat_y }) {
            Ok(tiling) => tiling,
            Err(err) => return Err(self.allocation_failure(err)),
        };
        log::debug!("created {tiling:?} for {:?} (repeat {repeat_x}/{repeat_y})", image.id());
        Ok(Pattern::new(image.clone(), repeat_x, repeat_y, tiling, &self.retired_tilings))
    }

    // ── passes ─────────────────────────────────────────────────────────────

    /// Starts a pass. Returns `false` (and starts nothing) for a zero-size target.
    pub(crate) fn begin_pass(&mut self, target: PassTarget, clear: Option<Color>) -> Result<bool> {
        self.check_alive()?;
        if self.pass.is_some() {
            return Err(GraphicsError::invalid("target", "a render pass is already active"));
        }

        let bounds = match target {
            PassTarget::Default => self.device_view().bounds,
            PassTarget::Texture(texture) => match self.render_targets.get(&texture) {
                Some(rt) => ScissorRect::new(0, 0, rt.width, rt.height),
                None => return Err(self.pass_failure(BackendError::UnknownTexture(texture))),
            },
        };
        if bounds.is_empty() {
            log::trace!("skipping pass on zero-size {target:?}");
            return Ok(false);
        }

        if let Err(err) = self.backend.begin_pass(target) {
            return Err(self.pass_failure(err));
        }
        self.pass = Some(ActivePass { target, bounds });
        self.clips.clear();
        if let Some(color) = clear {
            self.submit(DrawCall::Clear(color));
        }
        Ok(true)
    }

    pub(crate) fn end_pass(&mut self) -> Result<()> {
        if let Some(pass) = self.pass.take() {
            self.clips.clear();
            if let Err(err) = self.backend.end_pass() {
                return Err(self.pass_failure(err));
            }
            log::trace!("ended pass on {:?}", pass.target);
        }
        self.check_alive()
    }

    pub fn read_pixels(&mut self, target: PassTarget) -> Result<PixelBuffer> {
        self.check_alive()?;
        if self.pass.is_some() {
            return Err(GraphicsError::invalid("target", "cannot read back during a render pass"));
        }
        match self.backend.read_pixels(target) {
            Ok(buffer) => Ok(buffer),
            Err(err) => Err(self.pass_failure(err)),
        }
    }

    // ── drawing ────────────────────────────────────────────────────────────

    fn submit(&mut self, call: DrawCall) {
        if self.lost.is_some() || self.pass.is_none() {
            return;
        }
        if let Err(err) = self.backend.draw(call) {
            self.pass_failure(err);
        }
    }

    fn current_clip(&self) -> Option<ScissorRect> {
        self.clips.last().copied().or(self.pass.map(|p| p.bounds))
    }

    /// Maps a logical rect through `transform` and the scale factor.
    /// Returns the normalized device rect and per-axis mirroring, or `None`
    /// when nothing would be visible.
    fn to_device(&self, transform: Affine, rect: Rect) -> Option<(Rect, bool, bool)> {
        if !transform.is_finite() || !rect.is_finite() {
            return None;
        }
        let raw = self.scale.scaled_rect(transform.transform_rect(rect));
        let dest = raw.normalized();
        if dest.is_empty() {
            return None;
        }
        let clip = self.current_clip()?;
        let clip = Rect::new(clip.x as f32, clip.y as f32, clip.width as f32, clip.height as f32);
        dest.intersect(clip)?;
        Some((dest, raw.size.x < 0.0, raw.size.y < 0.0))
    }

    /// Clears the whole current target, ignoring clips.
    pub(crate) fn clear(&mut self, color: Color) {
        self.submit(DrawCall::Clear(color));
    }

    pub(crate) fn fill_rect(&mut self, transform: Affine, rect: Rect, color: Color) {
        if color.a <= 0.0 {
            return;
        }
        if let Some((dest, _, _)) = self.to_device(transform, rect) {
            self.submit(DrawCall::FillRect { dest, color });
        }
    }

    /// Draws the whole of `texture` stretched over `rect`.
    pub(crate) fn draw_texture(
        &mut self,
        transform: Affine,
        texture: TextureId,
        rect: Rect,
        alpha: f32,
    ) {
        if alpha <= 0.0 {
            return;
        }
        if let Some((dest, flip_x, flip_y)) = self.to_device(transform, rect) {
            let uv = mirrored(Rect::new(0.0, 0.0, 1.0, 1.0), flip_x, flip_y);
            let tint = Color::white().with_opacity(alpha);
            self.submit(DrawCall::Texture { texture, dest, uv, tint });
        }
    }

    /// Fills `rect` with `tiling`, one tile covering `tile` (both logical,
    /// in the same local space).
    pub(crate) fn draw_tiled(
        &mut self,
        transform: Affine,
        tiling: TilingHandle,
        rect: Rect,
        tile: Rect,
        alpha: f32,
    ) {
        if alpha <= 0.0 || tile.is_empty() {
            return;
        }
        if let Some((dest, flip_x, flip_y)) = self.to_device(transform, rect) {
            let r = rect.normalized();
            let u0 = (r.origin.x - tile.origin.x) / tile.size.x;
            let v0 = (r.origin.y - tile.origin.y) / tile.size.y;
            let uv = Rect::new(u0, v0, r.size.x / tile.size.x, r.size.y / tile.size.y);
            let tint = Color::white().with_opacity(alpha);
            self.submit(DrawCall::Tiled { tiling, dest, uv: mirrored(uv, flip_x, flip_y), tint });
        }
    }

    /// Intersects the clip with `rect` until the matching `pop_clip`.
    pub(crate) fn push_clip(&mut self, transform: Affine, rect: Rect) {
        let Some(current) = self.current_clip() else {
            return;
        };
        let device = self.scale.scaled_rect(transform.transform_rect(rect));
        let scissor = if device.is_finite() {
            let target = self.pass.map_or(current, |p| p.bounds);
            ScissorRect::from_device_rect(device, target.width, target.height).intersect(current)
        } else {
            ScissorRect::default()
        };
        self.clips.push(scissor);
        self.submit(DrawCall::SetScissor(Some(scissor)));
    }

    pub(crate) fn pop_clip(&mut self) {
        if self.clips.pop().is_none() {
            return;
        }
        let next = self.clips.last().copied();
        self.submit(DrawCall::SetScissor(next));
    }
}

fn mirrored(uv: Rect, flip_x: bool, flip_y: bool) -> Rect {
    let mut out = uv;
    if flip_x {
        out.origin.x += uv.size.x;
        out.size.x = -uv.size.x;
    }
    if flip_y {
        out.origin.y += uv.size.y;
        out.size.y = -uv.size.y;
    }
    out
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("backend", &self.backend.name())
            .field("view", &(self.view_width, self.view_height))
            .field("scale", &self.scale.factor)
            .field("textures", &self.textures.len())
            .field("render_targets", &self.render_targets.len())
            .field("lost", &self.lost)
            .finish()
    }
}
