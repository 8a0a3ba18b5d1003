//! Headless wgpu device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a window
//! - tracking device loss reported by the driver
//!
//! Presentation belongs to the host: it copies or samples the framebuffer
//! owned by `render::WgpuBackend`.

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
