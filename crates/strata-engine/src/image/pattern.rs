use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{GraphicsError, Result};
use crate::gpu::TilingHandle;

use super::Image;

/// Tiling handles whose last pattern clone dropped; the context releases
/// them to the backend at the next frame boundary.
pub(crate) type RetiredTilings = Rc<RefCell<Vec<TilingHandle>>>;

/// Tileable image reference with independent horizontal and vertical repeat.
///
/// The backend tiling handle is built once from the image pixels at creation.
/// Mutating the image afterwards leaves the pattern stale; build a new one.
#[derive(Clone)]
pub struct Pattern(Rc<PatternInner>);

struct PatternInner {
    image: Image,
    repeat_x: bool,
    repeat_y: bool,
    tiling: TilingHandle,
    image_version: u64,
    warned_stale: Cell<bool>,
    retired: Weak<RefCell<Vec<TilingHandle>>>,
}

impl Pattern {
    pub(crate) fn new(
        image: Image,
        repeat_x: bool,
        repeat_y: bool,
        tiling: TilingHandle,
        retired: &RetiredTilings,
    ) -> Self {
        let image_version = image.version();
        Self(Rc::new(PatternInner {
            image,
            repeat_x,
            repeat_y,
            tiling,
            image_version,
            warned_stale: Cell::new(false),
            retired: Rc::downgrade(retired),
        }))
    }

    pub fn repeat_x(&self) -> bool {
        self.0.repeat_x
    }

    pub fn repeat_y(&self) -> bool {
        self.0.repeat_y
    }

    /// The image the pattern was built from (same identity, not a copy).
    pub fn image(&self) -> &Image {
        &self.0.image
    }

    pub fn tiling(&self) -> TilingHandle {
        self.0.tiling
    }

    /// True once the image changed after the tiling handle was built.
    pub fn is_stale(&self) -> bool {
        self.0.image.version() != self.0.image_version
    }

    pub fn ensure_fresh(&self) -> Result<()> {
        if self.is_stale() {
            return Err(GraphicsError::StaleResource);
        }
        Ok(())
    }

    pub fn ptr_eq(a: &Pattern, b: &Pattern) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Logs a single warning per pattern when it is drawn while stale.
    pub(crate) fn warn_if_stale(&self) {
        if self.is_stale() && !self.0.warned_stale.replace(true) {
            log::warn!(
                "drawing stale pattern {:?}: image {:?} changed after the pattern was built",
                self.0.tiling,
                self.0.image.id()
            );
        }
    }
}

impl Drop for PatternInner {
    fn drop(&mut self) {
        if let Some(retired) = self.retired.upgrade() {
            retired.borrow_mut().push(self.tiling);
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        Pattern::ptr_eq(self, other)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("image", &self.0.image.id())
            .field("repeat_x", &self.0.repeat_x)
            .field("repeat_y", &self.0.repeat_y)
            .field("tiling", &self.0.tiling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ::image::RgbaImage;

    use super::*;

    fn pattern(image: &Image, rx: bool, ry: bool, retired: &RetiredTilings) -> Pattern {
        Pattern::new(image.clone(), rx, ry, TilingHandle::new(7), retired)
    }

    #[test]
    fn accessors_report_flags() {
        let retired = RetiredTilings::default();
        let image = Image::from(RgbaImage::new(2, 2));
        for (rx, ry) in [(false, false), (true, false), (false, true), (true, true)] {
            let p = pattern(&image, rx, ry, &retired);
            assert_eq!((p.repeat_x(), p.repeat_y()), (rx, ry));
            assert!(Image::ptr_eq(p.image(), &image));
        }
    }

    #[test]
    fn image_mutation_makes_pattern_stale() {
        let retired = RetiredTilings::default();
        let image = Image::from(RgbaImage::new(1, 1));
        let p = pattern(&image, true, true, &retired);
        assert!(p.ensure_fresh().is_ok());

        image.modify(|px| px.put_pixel(0, 0, ::image::Rgba([9, 9, 9, 9])));
        assert!(p.is_stale());
        assert_eq!(p.ensure_fresh(), Err(GraphicsError::StaleResource));
    }

    #[test]
    fn last_clone_retires_tiling() {
        let retired = RetiredTilings::default();
        let image = Image::from(RgbaImage::new(1, 1));
        let p = pattern(&image, true, false, &retired);
        let q = p.clone();
        drop(p);
        assert!(retired.borrow().is_empty());
        drop(q);
        assert_eq!(*retired.borrow(), vec![TilingHandle::new(7)]);
    }
}
