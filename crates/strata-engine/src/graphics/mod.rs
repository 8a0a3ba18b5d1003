//! `GraphicsGl`: the root facade applications talk to.
//!
//! Owns the layer tree and the shared `GpuContext`, creates layers bound to
//! that context, and renders the tree under [`GraphicsGl::root_layer`].

mod paint;

use ::image::RgbaImage;

use crate::config::GraphicsConfig;
use crate::coords::{Affine, Vec2};
use crate::error::{GraphicsError, Result, check_dimension};
use crate::gpu::{GpuBackend, GpuContext, PassTarget};
use crate::image::{Canvas, Image, Pattern};
use crate::paint::Color;
use crate::scene::{
    CanvasLayer, GroupLayer, ImageLayer, ImmediateLayer, LayerContent, LayerId, LayerTree,
    SurfaceLayer,
};
use crate::surface::{ImmediateRenderer, Surface};

/// Layer factory, viewport facade and render pass driver.
///
/// New layers start at translation (0, 0), visible, alpha 1, detached.
#[derive(Debug)]
pub struct GraphicsGl {
    ctx: GpuContext,
    layers: LayerTree,
    root: GroupLayer,
    clear_color: Color,
}

impl GraphicsGl {
    pub fn new(ctx: GpuContext) -> Self {
        let mut layers = LayerTree::new();
        let root = GroupLayer(layers.insert(LayerContent::Group { children: Vec::new() }));
        Self { ctx, layers, root, clear_color: Color::black() }
    }

    /// Builds the context and the facade in one step.
    pub fn from_config(backend: Box<dyn GpuBackend>, config: &GraphicsConfig) -> Result<Self> {
        let ctx = GpuContext::new(backend, config)?;
        let mut gfx = Self::new(ctx);
        gfx.clear_color = config.clear_color;
        Ok(gfx)
    }

    pub fn root_layer(&self) -> GroupLayer {
        self.root
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    // ── viewport ───────────────────────────────────────────────────────────

    /// View width in device pixels.
    pub fn width(&self) -> u32 {
        self.ctx.view_width()
    }

    /// View height in device pixels.
    pub fn height(&self) -> u32 {
        self.ctx.view_height()
    }

    pub fn scale_factor(&self) -> f32 {
        self.ctx.scale_factor()
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.ctx.set_size(width, height);
    }

    // ── factories ──────────────────────────────────────────────────────────

    pub fn create_group_layer(&mut self) -> GroupLayer {
        GroupLayer(self.layers.insert(LayerContent::Group { children: Vec::new() }))
    }

    /// Image layer with no image; its size is (0, 0) until one is set.
    pub fn create_image_layer(&mut self) -> ImageLayer {
        ImageLayer(self.layers.insert(LayerContent::Image { image: None, size: None, bound: None }))
    }

    /// Image layer sized to the image's natural logical size.
    pub fn create_image_layer_with(&mut self, image: Image) -> ImageLayer {
        let content = LayerContent::Image { image: Some(image), size: None, bound: None };
        ImageLayer(self.layers.insert(content))
    }

    /// Surface layer backed by an off-screen target allocated now.
    ///
    /// A zero extent yields a layer that draws nothing and owns no target.
    pub fn create_surface_layer(&mut self, width: f32, height: f32) -> Result<SurfaceLayer> {
        let size = Vec2::new(check_dimension("width", width)?, check_dimension("height", height)?);
        let target = self.ctx.create_render_target(size.x, size.y)?;
        Ok(SurfaceLayer(self.layers.insert(LayerContent::Surface { target, size })))
    }

    /// Immediate layer whose drawing is clipped to `width` × `height`.
    pub fn create_immediate_layer_clipped(
        &mut self,
        width: f32,
        height: f32,
        renderer: impl ImmediateRenderer + 'static,
    ) -> Result<ImmediateLayer> {
        let clip = Vec2::new(check_dimension("width", width)?, check_dimension("height", height)?);
        let content = LayerContent::Immediate { renderer: Box::new(renderer), clip: Some(clip) };
        Ok(ImmediateLayer(self.layers.insert(content)))
    }

    /// Immediate layer drawing without a clip.
    pub fn create_immediate_layer(
        &mut self,
        renderer: impl ImmediateRenderer + 'static,
    ) -> ImmediateLayer {
        let renderer = Box::new(renderer);
        ImmediateLayer(self.layers.insert(LayerContent::Immediate { renderer, clip: None }))
    }

    /// Image layer over a CPU raster canvas.
    #[deprecated(note = "draw with a surface layer or an immediate layer instead")]
    pub fn create_canvas_layer(&mut self, width: f32, height: f32) -> Result<CanvasLayer> {
        let canvas = self.create_canvas(width, height)?;
        Ok(CanvasLayer(self.layers.insert(LayerContent::Canvas { canvas, bound: None })))
    }

    /// CPU raster canvas at the context's scale factor.
    pub fn create_canvas(&self, width: f32, height: f32) -> Result<Canvas> {
        let (w, h) = (check_dimension("width", width)?, check_dimension("height", height)?);
        let scale = self.ctx.scale();
        self.ctx.check_texture_size(scale.scaled_ceil(w), scale.scaled_ceil(h))?;
        Ok(Canvas::new(w, h, scale))
    }

    pub fn create_pattern(
        &mut self,
        image: &Image,
        repeat_x: bool,
        repeat_y: bool,
    ) -> Result<Pattern> {
        self.ctx.create_pattern(image, repeat_x, repeat_y)
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Disposes `layer` and its subtree, releasing GPU resources once.
    /// Disposing an already disposed layer succeeds and does nothing.
    pub fn dispose(&mut self, layer: impl Into<LayerId>) -> Result<()> {
        let id = layer.into();
        if id == self.root.id() {
            return Err(GraphicsError::invalid("layer", "the root layer cannot be disposed"));
        }
        for (id, node) in self.layers.remove_subtree(id) {
            match node.content {
                LayerContent::Image { bound: Some(image), .. }
                | LayerContent::Canvas { bound: Some(image), .. } => {
                    self.ctx.release_image(image);
                }
                LayerContent::Surface { target: Some(target), .. } => {
                    self.ctx.release_render_target(target.texture);
                }
                _ => {}
            }
            log::trace!("disposed {id:?}");
        }
        Ok(())
    }

    // ── rendering ──────────────────────────────────────────────────────────

    /// Draws into a surface layer's off-screen target. Contents persist
    /// across frames until cleared.
    pub fn draw_surface(
        &mut self,
        layer: SurfaceLayer,
        draw: impl FnOnce(&mut Surface<'_>),
    ) -> Result<()> {
        self.ctx.check_alive()?;
        let (target, size) = self.layers.surface_target(layer)?;
        let Some(target) = target else {
            return Ok(());
        };
        if !self.ctx.begin_pass(PassTarget::Texture(target.texture), None)? {
            return Ok(());
        }
        draw(&mut Surface::new(&mut self.ctx, Affine::IDENTITY, 1.0, size));
        self.ctx.end_pass()
    }

    /// Renders the tree under the root layer into the default target.
    pub fn paint(&mut self) -> Result<()> {
        self.ctx.check_alive()?;
        self.ctx.begin_frame();
        if !self.ctx.begin_pass(PassTarget::Default, Some(self.clear_color))? {
            return Ok(());
        }
        paint::paint_layer(&mut self.ctx, &mut self.layers, self.root.id(), Affine::IDENTITY, 1.0);
        self.ctx.end_pass()
    }

    /// Reads back the default target as straight-alpha RGBA.
    pub fn snapshot(&mut self) -> Result<RgbaImage> {
        let buffer = self.ctx.read_pixels(PassTarget::Default)?;
        let mut data = buffer.data;
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u32;
            if a == 0 {
                px[..3].fill(0);
            } else {
                for c in &mut px[..3] {
                    *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
        RgbaImage::from_raw(buffer.width, buffer.height, data).ok_or_else(|| {
            GraphicsError::ContextLost("read back buffer has the wrong length".into())
        })
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn layers(&self) -> &LayerTree {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerTree {
        &mut self.layers
    }

    pub fn ctx(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut GpuContext {
        &mut self.ctx
    }

    pub fn is_lost(&self) -> bool {
        self.ctx.is_lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareBackend;

    fn gfx() -> GraphicsGl {
        let config = GraphicsConfig::default().with_view_size(32, 32);
        GraphicsGl::from_config(Box::new(SoftwareBackend::new()), &config).unwrap()
    }

    #[test]
    fn root_cannot_be_disposed() {
        let mut gfx = gfx();
        let root = gfx.root_layer();
        assert!(matches!(gfx.dispose(root), Err(GraphicsError::InvalidArgument { .. })));
        assert!(gfx.layers().is_alive(root));
    }

    #[test]
    fn factories_validate_sizes() {
        let mut gfx = gfx();
        assert!(gfx.create_surface_layer(f32::NAN, 1.0).is_err());
        assert!(gfx.create_immediate_layer_clipped(1.0, -1.0, |_: &mut Surface<'_>| {}).is_err());
        assert!(gfx.create_canvas(-0.5, 1.0).is_err());
        assert!(gfx.create_surface_layer(0.0, 0.0).is_ok());
    }

    #[test]
    fn new_layers_have_default_properties() {
        let mut gfx = gfx();
        let layer = gfx.create_image_layer();
        let layers = gfx.layers();
        assert_eq!(layers.translation(layer).unwrap(), Vec2::ZERO);
        assert_eq!(layers.alpha(layer).unwrap(), 1.0);
        assert!(layers.visible(layer).unwrap());
        assert_eq!(layers.size(layer).unwrap(), Vec2::ZERO);
    }

    #[test]
    fn snapshot_unpremultiplies() {
        let mut gfx = gfx();
        gfx.set_clear_color(Color::from_rgba8(255, 0, 0, 128));
        gfx.paint().unwrap();
        let snap = gfx.snapshot().unwrap();
        assert_eq!(snap.dimensions(), (32, 32));
        assert_eq!(snap.get_pixel(0, 0).0, [255, 0, 0, 128]);
    }
}
