use ::image::{Rgba, RgbaImage};

use crate::coords::{Rect, Scale, Vec2};
use crate::paint::Color;

use super::Image;

/// CPU raster surface backing deprecated canvas layers.
///
/// Sized in logical units and allocated at `ceil(size * scale)` pixels. Every
/// mutation bumps the backing image version, so layers re-upload it and
/// patterns built from it report stale.
#[derive(Debug)]
pub struct Canvas {
    image: Image,
    size: Vec2,
    fill: Color,
}

impl Canvas {
    /// Sizes must already be validated as finite and non-negative, and `scale`
    /// as positive.
    pub(crate) fn new(width: f32, height: f32, scale: Scale) -> Self {
        let pixels = RgbaImage::new(scale.scaled_ceil(width), scale.scaled_ceil(height));
        let image = Image::new(pixels, scale);
        Self { image, size: Vec2::new(width, height), fill: Color::black() }
    }

    /// The backing image. Shares pixels with the canvas.
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    pub fn set_fill_color(&mut self, color: Color) -> &mut Self {
        self.fill = color;
        self
    }

    /// Resets every pixel to transparent.
    pub fn clear(&mut self) -> &mut Self {
        self.image.modify(|px| {
            for p in px.pixels_mut() {
                *p = Rgba([0, 0, 0, 0]);
            }
        });
        self
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        let fill = self.fill;
        let dest = self.device_rect(Rect::new(x, y, width, height));
        self.image.modify(|px| {
            for_each_covered(px, dest, |p, _, _| blend_over(p, fill));
        });
        self
    }

    /// Draws `image` at its natural logical size with its top-left at `(x, y)`.
    pub fn draw_image(&mut self, image: &Image, x: f32, y: f32) -> &mut Self {
        let dest = self.device_rect(Rect::from_origin_size(Vec2::new(x, y), image.size()));
        if dest.is_empty() || image.pixel_width() == 0 || image.pixel_height() == 0 {
            return self;
        }

        // Drawing a canvas into itself reads from a snapshot.
        let src = image.pixels().clone();
        let (sw, sh) = src.dimensions();
        self.image.modify(|px| {
            for_each_covered(px, dest, |p, cx, cy| {
                let u = ((cx - dest.origin.x) / dest.size.x * sw as f32) as u32;
                let v = ((cy - dest.origin.y) / dest.size.y * sh as f32) as u32;
                let s = src.get_pixel(u.min(sw - 1), v.min(sh - 1)).0;
                blend_over(p, Color::from_rgba8(s[0], s[1], s[2], s[3]));
            });
        });
        self
    }

    fn device_rect(&self, r: Rect) -> Rect {
        self.image.scale().scaled_rect(r).normalized()
    }
}

/// Calls `f` for every pixel whose center lies in `dest`, passing the center.
fn for_each_covered(px: &mut RgbaImage, dest: Rect, mut f: impl FnMut(&mut Rgba<u8>, f32, f32)) {
    if !dest.is_finite() || dest.is_empty() {
        return;
    }
    let (w, h) = px.dimensions();
    let x0 = (dest.origin.x - 0.5).ceil().clamp(0.0, w as f32) as u32;
    let y0 = (dest.origin.y - 0.5).ceil().clamp(0.0, h as f32) as u32;
    let x1 = (dest.max().x - 0.5).ceil().clamp(0.0, w as f32) as u32;
    let y1 = (dest.max().y - 0.5).ceil().clamp(0.0, h as f32) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            f(px.get_pixel_mut(x, y), x as f32 + 0.5, y as f32 + 0.5);
        }
    }
}

/// Source-over of a premultiplied color onto a straight-alpha pixel.
fn blend_over(dst: &mut Rgba<u8>, src: Color) {
    let [dr, dg, db, da] = dst.0.map(|c| c as f32 / 255.0);
    let d = Color::from_straight(dr, dg, db, da);
    let k = 1.0 - src.a;
    let out =
        Color::from_premul(src.r + d.r * k, src.g + d.g * k, src.b + d.b * k, src.a + d.a * k);
    let (r, g, b, a) = out.clamped().to_straight();
    dst.0 = [r, g, b, a].map(|c| (c * 255.0 + 0.5) as u8);
}
