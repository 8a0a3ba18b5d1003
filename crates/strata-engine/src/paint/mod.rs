//! Paint model shared by the drawing surface, canvases and backends.
//!
//! Scope:
//! - color representation (premultiplied alpha)
//! - fill sources (solid color, tiled pattern)

pub mod color;

pub use color::Color;

use crate::image::Pattern;

/// Fill source for `Surface::fill_rect`.
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Color),
    Pattern(Pattern),
}

impl Default for Paint {
    fn default() -> Self {
        Paint::Solid(Color::black())
    }
}

impl Paint {
    #[inline]
    pub fn solid(color: Color) -> Self {
        Paint::Solid(color)
    }

    /// Conservative opacity test; patterns are assumed translucent.
    #[inline]
    pub fn is_opaque(&self) -> bool {
        match self {
            Paint::Solid(c) => c.a >= 1.0,
            Paint::Pattern(_) => false,
        }
    }
}
