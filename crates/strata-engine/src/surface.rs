//! Immediate-mode drawing API.
//!
//! A [`Surface`] is handed to immediate layer renderers every frame and to
//! `GraphicsGl::draw_surface` callbacks. Coordinates are logical; the
//! underlying `GpuContext` maps them to device pixels.

use crate::coords::{Affine, Rect, Vec2};
use crate::gpu::GpuContext;
use crate::image::{Image, Pattern};
use crate::paint::{Color, Paint};

/// Per-frame renderer of an immediate layer.
pub trait ImmediateRenderer {
    fn render(&mut self, surface: &mut Surface<'_>);
}

impl<F> ImmediateRenderer for F
where
    F: FnMut(&mut Surface<'_>),
{
    fn render(&mut self, surface: &mut Surface<'_>) {
        self(surface)
    }
}

#[derive(Debug, Clone)]
struct DrawState {
    transform: Affine,
    alpha: f32,
    fill: Paint,
}

/// Drawing target with a transform/alpha stack and a fill paint.
///
/// Methods chain. Draw failures never surface here: allocation failures are
/// logged and skip the draw, and a lost context turns every draw into a
/// no-op and is reported by the enclosing `paint` or `draw_surface`.
pub struct Surface<'a> {
    ctx: &'a mut GpuContext,
    size: Vec2,
    layer_alpha: f32,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl<'a> Surface<'a> {
    pub(crate) fn new(
        ctx: &'a mut GpuContext,
        transform: Affine,
        layer_alpha: f32,
        size: Vec2,
    ) -> Self {
        Self {
            ctx,
            size,
            layer_alpha,
            state: DrawState { transform, alpha: 1.0, fill: Paint::default() },
            saved: Vec::new(),
        }
    }

    /// Logical width of the drawing area.
    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn scale_factor(&self) -> f32 {
        self.ctx.scale_factor()
    }

    pub fn save(&mut self) -> &mut Self {
        self.saved.push(self.state.clone());
        self
    }

    /// Pops the last `save`; unbalanced calls are ignored.
    pub fn restore(&mut self) -> &mut Self {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        self
    }

    pub fn translate(&mut self, dx: f32, dy: f32) -> &mut Self {
        self.state.transform = self.state.transform.then(Affine::translate(dx, dy));
        self
    }

    pub fn scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        self.state.transform = self.state.transform.then(Affine::scale(sx, sy));
        self
    }

    /// Opacity for subsequent draws, combined with the layer's alpha.
    pub fn set_alpha(&mut self, alpha: f32) -> &mut Self {
        if alpha.is_finite() {
            self.state.alpha = alpha.clamp(0.0, 1.0);
        }
        self
    }

    pub fn alpha(&self) -> f32 {
        self.state.alpha
    }

    pub fn set_fill_color(&mut self, color: Color) -> &mut Self {
        self.state.fill = Paint::Solid(color);
        self
    }

    pub fn set_fill_pattern(&mut self, pattern: &Pattern) -> &mut Self {
        self.state.fill = Paint::Pattern(pattern.clone());
        self
    }

    /// Clears the whole target to transparent.
    pub fn clear(&mut self) -> &mut Self {
        self.ctx.clear(Color::transparent());
        self
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        let alpha = self.effective_alpha();
        let rect = Rect::new(x, y, width, height);
        match &self.state.fill {
            Paint::Solid(color) => {
                self.ctx.fill_rect(self.state.transform, rect, color.with_opacity(alpha));
            }
            Paint::Pattern(pattern) => {
                pattern.warn_if_stale();
                let tile = Rect::from_size(pattern.image().size());
                let (repeat_x, repeat_y) = (pattern.repeat_x(), pattern.repeat_y());
                if let Some(rect) = clamp_to_tile(rect.normalized(), tile, repeat_x, repeat_y) {
                    self.ctx.draw_tiled(self.state.transform, pattern.tiling(), rect, tile, alpha);
                }
            }
        }
        self
    }

    /// Draws `image` at its natural logical size.
    pub fn draw_image(&mut self, image: &Image, x: f32, y: f32) -> &mut Self {
        let size = image.size();
        self.draw_image_scaled(image, x, y, size.x, size.y)
    }

    pub fn draw_image_scaled(
        &mut self,
        image: &Image,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> &mut Self {
        if let Ok(Some(texture)) = self.ctx.texture_for(image) {
            let alpha = self.effective_alpha();
            let rect = Rect::new(x, y, width, height);
            self.ctx.draw_texture(self.state.transform, texture, rect, alpha);
        }
        self
    }

    fn effective_alpha(&self) -> f32 {
        self.layer_alpha * self.state.alpha
    }
}

/// Limits a non-repeating axis to the single tile at the pattern origin.
fn clamp_to_tile(rect: Rect, tile: Rect, repeat_x: bool, repeat_y: bool) -> Option<Rect> {
    let mut out = rect;
    if !repeat_x {
        let x0 = out.origin.x.max(tile.origin.x);
        let x1 = out.max().x.min(tile.max().x);
        if x1 <= x0 {
            return None;
        }
        out.origin.x = x0;
        out.size.x = x1 - x0;
    }
    if !repeat_y {
        let y0 = out.origin.y.max(tile.origin.y);
        let y1 = out.max().y.min(tile.max().y);
        if y1 <= y0 {
            return None;
        }
        out.origin.y = y0;
        out.size.y = y1 - y0;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use ::image::{Rgba, RgbaImage};

    use super::*;
    use crate::config::GraphicsConfig;
    use crate::gpu::{DrawCall, PassTarget, SoftwareBackend};

    fn ctx(w: u32, h: u32) -> (GpuContext, SoftwareBackend) {
        let soft = SoftwareBackend::new();
        let config = GraphicsConfig::default().with_view_size(w, h);
        (GpuContext::new(Box::new(soft.clone()), &config).unwrap(), soft)
    }

    fn draw(ctx: &mut GpuContext, f: impl FnOnce(&mut Surface<'_>)) {
        assert!(ctx.begin_pass(PassTarget::Default, None).unwrap());
        let size = ctx.logical_view();
        f(&mut Surface::new(ctx, Affine::IDENTITY, 1.0, size));
        ctx.end_pass().unwrap();
    }

    fn last_dest(soft: &SoftwareBackend) -> Option<Rect> {
        soft.calls().last().and_then(|c| c.call.dest())
    }

    // ── state stack ───────────────────────────────────────────────────────

    #[test]
    fn save_restore_scopes_transform() {
        let (mut ctx, soft) = ctx(100, 100);
        draw(&mut ctx, |s| {
            s.save().translate(10.0, 10.0).fill_rect(0.0, 0.0, 5.0, 5.0);
            s.restore().fill_rect(0.0, 0.0, 5.0, 5.0);
        });
        let dests: Vec<_> = soft.calls().iter().filter_map(|c| c.call.dest()).collect();
        assert_eq!(dests, vec![Rect::new(10.0, 10.0, 5.0, 5.0), Rect::new(0.0, 0.0, 5.0, 5.0)]);
    }

    #[test]
    fn alpha_combines_with_layer_alpha() {
        let (mut ctx, soft) = ctx(10, 10);
        ctx.begin_pass(PassTarget::Default, None).unwrap();
        Surface::new(&mut ctx, Affine::IDENTITY, 0.5, Vec2::new(10.0, 10.0))
            .set_alpha(0.5)
            .set_fill_color(Color::white())
            .fill_rect(0.0, 0.0, 1.0, 1.0);
        ctx.end_pass().unwrap();
        match soft.calls().last().map(|c| c.call.clone()) {
            Some(DrawCall::FillRect { color, .. }) => {
                assert_eq!(color, Color::white().with_opacity(0.25))
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    // ── patterns ──────────────────────────────────────────────────────────

    #[test]
    fn non_repeating_axis_is_clamped_to_one_tile() {
        let (mut ctx, soft) = ctx(100, 100);
        let image = Image::from(RgbaImage::new(8, 4));
        let pattern = ctx.create_pattern(&image, true, false).unwrap();
        draw(&mut ctx, |s| {
            s.set_fill_pattern(&pattern).fill_rect(0.0, 0.0, 40.0, 40.0);
        });
        assert_eq!(last_dest(&soft), Some(Rect::new(0.0, 0.0, 40.0, 4.0)));
        match soft.calls().last().map(|c| c.call.clone()) {
            Some(DrawCall::Tiled { uv, .. }) => assert_eq!(uv, Rect::new(0.0, 0.0, 5.0, 1.0)),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn fully_clamped_pattern_draws_nothing() {
        let (mut ctx, soft) = ctx(100, 100);
        let image = Image::from(RgbaImage::new(8, 8));
        let pattern = ctx.create_pattern(&image, false, false).unwrap();
        draw(&mut ctx, |s| {
            s.set_fill_pattern(&pattern).fill_rect(20.0, 20.0, 10.0, 10.0);
        });
        assert!(soft.calls().is_empty());
    }

    #[test]
    fn stale_pattern_still_draws() {
        let (mut ctx, soft) = ctx(10, 10);
        let image = Image::from(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
        let pattern = ctx.create_pattern(&image, true, true).unwrap();
        image.modify(|px| px.put_pixel(0, 0, Rgba([0, 0, 255, 255])));
        assert!(pattern.is_stale());

        draw(&mut ctx, |s| {
            s.set_fill_pattern(&pattern).fill_rect(0.0, 0.0, 2.0, 2.0);
        });
        // The tiling handle still holds the pixels from creation time.
        assert_eq!(soft.pixel(1, 1), Some([255, 0, 0, 255]));
    }

    // ── images ────────────────────────────────────────────────────────────

    #[test]
    fn draw_image_uses_natural_size() {
        let (mut ctx, soft) = ctx(100, 100);
        let image = Image::from(RgbaImage::from_pixel(6, 3, Rgba([0, 255, 0, 255])));
        draw(&mut ctx, |s| {
            s.draw_image(&image, 2.0, 2.0);
        });
        assert_eq!(last_dest(&soft), Some(Rect::new(2.0, 2.0, 6.0, 3.0)));
        assert_eq!(soft.pixel(7, 4), Some([0, 255, 0, 255]));
    }

    #[test]
    fn oversized_image_is_skipped() {
        let soft = SoftwareBackend::new().with_max_texture_size(4);
        let config = GraphicsConfig::default().with_view_size(10, 10);
        let mut ctx = GpuContext::new(Box::new(soft.clone()), &config).unwrap();
        let image = Image::from(RgbaImage::new(8, 8));
        draw(&mut ctx, |s| {
            s.draw_image(&image, 0.0, 0.0);
        });
        assert!(soft.calls().is_empty());
        assert!(!ctx.is_lost());
    }
}
