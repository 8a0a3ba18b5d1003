//! wgpu rendering backend.
//!
//! [`WgpuBackend`] implements `gpu::GpuBackend`: it owns device textures,
//! records draw calls per pass and encodes them with one instanced quad
//! pipeline.
//!
//! Convention:
//! - geometry arrives in device pixels (top-left origin, +Y down)
//! - NDC conversion happens on the CPU per instance
//! - all textures are `Rgba8Unorm` holding premultiplied color

mod backend;
mod common;
mod ctx;
mod quad;

pub use backend::WgpuBackend;
pub use ctx::{RenderCtx, RenderTarget};
