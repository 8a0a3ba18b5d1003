//! Decoded images, CPU canvases and tiling patterns.
//!
//! Decoding and asset loading live outside the core; pixels arrive through
//! [`ImageSource`] or as raw straight-alpha RGBA8.

mod canvas;
mod pattern;
mod pixels;

pub use canvas::Canvas;
pub use pattern::Pattern;
pub use pixels::{Image, ImageId, ImageSource};

pub(crate) use pattern::RetiredTilings;
pub(crate) use pixels::WeakImage;
