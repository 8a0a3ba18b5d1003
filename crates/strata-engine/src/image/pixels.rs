use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use ::image::RgbaImage;

use crate::coords::{Scale, Vec2};
use crate::error::{GraphicsError, Result};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique image identity, used to key the texture cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    fn next() -> Self {
        Self(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Decoded pixels supplied by the host's image loader.
pub trait ImageSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Straight-alpha RGBA8, row-major, `width * height * 4` bytes.
    fn pixels(&self) -> &[u8];
}

impl ImageSource for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixels(&self) -> &[u8] {
        self.as_raw()
    }
}

/// Shared handle to a decoded RGBA8 image.
///
/// Clones share pixels; equality is identity. The logical size is the pixel
/// size divided by the image's density scale.
#[derive(Clone)]
pub struct Image(Rc<ImageInner>);

struct ImageInner {
    id: ImageId,
    scale: Scale,
    pixels: RefCell<RgbaImage>,
    version: Cell<u64>,
}

impl Image {
    /// Wraps straight-alpha RGBA8 pixels at density 1.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GraphicsError::invalid(
                "pixels",
                format!("expected {expected} bytes for {width}x{height}, got {}", pixels.len()),
            ));
        }
        RgbaImage::from_raw(width, height, pixels)
            .map(Self::from)
            .ok_or_else(|| GraphicsError::invalid("pixels", "buffer does not match dimensions"))
    }

    /// Copies pixels out of a host-decoded source.
    pub fn from_source(source: &dyn ImageSource) -> Result<Self> {
        Self::from_rgba8(source.width(), source.height(), source.pixels().to_vec())
    }

    /// Wraps `pixels` rendered at `scale` device pixels per logical unit.
    pub fn with_scale(pixels: RgbaImage, scale: Scale) -> Result<Self> {
        if !scale.factor.is_finite() || scale.factor <= 0.0 {
            let reason = format!("{} is not positive", scale.factor);
            return Err(GraphicsError::invalid("scale", reason));
        }
        Ok(Self::new(pixels, scale))
    }

    pub(crate) fn new(pixels: RgbaImage, scale: Scale) -> Self {
        Self(Rc::new(ImageInner {
            id: ImageId::next(),
            scale,
            pixels: RefCell::new(pixels),
            version: Cell::new(0),
        }))
    }

    pub fn id(&self) -> ImageId {
        self.0.id
    }

    pub fn pixel_width(&self) -> u32 {
        self.0.pixels.borrow().width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.0.pixels.borrow().height()
    }

    pub fn scale(&self) -> Scale {
        self.0.scale
    }

    /// Natural width in logical units.
    pub fn width(&self) -> f32 {
        self.0.scale.inv_scaled(self.pixel_width() as f32)
    }

    /// Natural height in logical units.
    pub fn height(&self) -> f32 {
        self.0.scale.inv_scaled(self.pixel_height() as f32)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width(), self.height())
    }

    /// Content version; bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    pub fn ptr_eq(a: &Image, b: &Image) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Borrows the straight-alpha pixels.
    pub fn pixels(&self) -> Ref<'_, RgbaImage> {
        self.0.pixels.borrow()
    }

    /// Premultiplied copy of the pixels, the layout backends upload.
    pub(crate) fn premultiplied(&self) -> Vec<u8> {
        let pixels = self.0.pixels.borrow();
        let mut out = pixels.as_raw().clone();
        for px in out.chunks_exact_mut(4) {
            let a = px[3] as u32;
            for c in &mut px[..3] {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
        out
    }

    /// Mutates the pixels in place and bumps the version.
    pub(crate) fn modify<R>(&self, f: impl FnOnce(&mut RgbaImage) -> R) -> R {
        let out = f(&mut self.0.pixels.borrow_mut());
        self.0.version.set(self.0.version.get() + 1);
        out
    }

    pub(crate) fn downgrade(&self) -> WeakImage {
        WeakImage(Rc::downgrade(&self.0))
    }
}

impl From<RgbaImage> for Image {
    fn from(pixels: RgbaImage) -> Self {
        Self::new(pixels, Scale::ONE)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        Image::ptr_eq(self, other)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.0.id)
            .field("pixels", &(self.pixel_width(), self.pixel_height()))
            .field("scale", &self.0.scale.factor)
            .field("version", &self.version())
            .finish()
    }
}

/// Non-owning image reference held by the texture cache.
#[derive(Clone)]
pub(crate) struct WeakImage(Weak<ImageInner>);

impl WeakImage {
    pub(crate) fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(w: u32, h: u32, px: [u8; 4]) -> Image {
        Image::from(RgbaImage::from_pixel(w, h, ::image::Rgba(px)))
    }

    #[test]
    fn from_rgba8_checks_length() {
        assert!(Image::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Image::from_rgba8(2, 2, vec![0; 15]),
            Err(GraphicsError::InvalidArgument { name: "pixels", .. })
        ));
    }

    #[test]
    fn logical_size_divides_by_density() {
        let img = Image::with_scale(RgbaImage::new(40, 20), Scale::new(2.0)).unwrap();
        assert_eq!(img.size(), Vec2::new(20.0, 10.0));
        assert_eq!(img.pixel_width(), 40);
    }

    #[test]
    fn clones_share_identity() {
        let a = rgba(1, 1, [0, 0, 0, 255]);
        let b = a.clone();
        let c = rgba(1, 1, [0, 0, 0, 255]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn modify_bumps_version() {
        let img = rgba(1, 1, [0, 0, 0, 0]);
        assert_eq!(img.version(), 0);
        img.modify(|p| p.put_pixel(0, 0, ::image::Rgba([1, 2, 3, 4])));
        assert_eq!(img.version(), 1);
        assert_eq!(img.pixels().get_pixel(0, 0).0, [1, 2, 3, 4]);
    }

    #[test]
    fn premultiplied_scales_rgb_by_alpha() {
        let img = rgba(1, 1, [255, 128, 0, 128]);
        assert_eq!(img.premultiplied(), vec![128, 64, 0, 128]);
    }

    #[test]
    fn weak_reference_dies_with_last_clone() {
        let img = rgba(1, 1, [0; 4]);
        let weak = img.downgrade();
        assert!(!weak.is_dead());
        drop(img);
        assert!(weak.is_dead());
    }
}
