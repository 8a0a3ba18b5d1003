//! Strata engine crate.
//!
//! Retained 2D layer tree rendered through a GPU context abstraction shared by
//! every platform backend. Application code talks to [`GraphicsGl`]; platform
//! code implements [`gpu::GpuBackend`].
//!
//! The core is single-threaded: images, patterns and the layer tree are `!Send`
//! and must stay on the thread that owns the GPU device.

pub mod config;
pub mod coords;
pub mod device;
pub mod error;
pub mod gpu;
pub mod graphics;
pub mod image;
pub mod logging;
pub mod paint;
pub mod render;
pub mod scene;
pub mod surface;

pub use config::GraphicsConfig;
pub use error::{GraphicsError, Result};
pub use graphics::GraphicsGl;
