//! GPU context boundary.
//!
//! [`GpuContext`] owns viewport and scale state and converts logical drawing
//! into device-pixel [`DrawCall`]s. Platforms plug in through [`GpuBackend`];
//! [`SoftwareBackend`] is the CPU reference implementation.

mod backend;
mod cmd;
mod context;
mod software;

pub use backend::{
    BackendError, GpuBackend, PassTarget, PixelBuffer, PixelData, TextureId, TileMode, TilingHandle,
};
pub use cmd::DrawCall;
pub use context::{GpuContext, RenderTarget};
pub use software::{RecordedCall, SoftwareBackend};
