//! Coordinate and geometry types shared by the layer tree, the GPU context and
//! the backends.
//!
//! Two spaces exist:
//! - logical units (device independent), used by every public API
//! - device pixels, produced only inside `gpu::GpuContext` via [`Scale`]
//!
//! Both spaces have a top-left origin, +X right, +Y down.

mod affine;
mod rect;
mod scale;
mod vec2;

pub use affine::Affine;
pub use rect::Rect;
pub use scale::{Scale, ScissorRect};
pub use vec2::Vec2;
