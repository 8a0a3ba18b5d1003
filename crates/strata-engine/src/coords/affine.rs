use super::{Rect, Vec2};

/// Axis-aligned 2D transform: per-axis scale followed by a translation.
///
/// Layers compose translation and scale only, so rectangles stay
/// axis-aligned through any chain of these transforms.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Affine {
    pub scale: Vec2,
    pub translation: Vec2,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        scale: Vec2::ONE,
        translation: Vec2::ZERO,
    };

    #[inline]
    pub const fn translate(x: f32, y: f32) -> Self {
        Self {
            scale: Vec2::ONE,
            translation: Vec2::new(x, y),
        }
    }

    #[inline]
    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self {
            scale: Vec2::new(sx, sy),
            translation: Vec2::ZERO,
        }
    }

    /// Returns `self` followed by `inner`, i.e. `inner` is applied first.
    ///
    /// This is the parent-to-child composition order: a child's local
    /// transform is applied before its parent's.
    #[inline]
    pub fn then(self, inner: Affine) -> Affine {
        Affine {
            scale: self.scale.mul_elem(inner.scale),
            translation: self.transform_point(inner.translation),
        }
    }

    #[inline]
    pub fn transform_point(self, p: Vec2) -> Vec2 {
        p.mul_elem(self.scale) + self.translation
    }

    /// Transforms `r`. The result may have negative extents when a scale
    /// component is negative; callers normalize as needed.
    #[inline]
    pub fn transform_rect(self, r: Rect) -> Rect {
        Rect::from_origin_size(self.transform_point(r.origin), r.size.mul_elem(self.scale))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.scale.is_finite() && self.translation.is_finite()
    }
}
