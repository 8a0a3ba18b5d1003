//! Retained layer tree.
//!
//! Responsibilities:
//! - store layers in a generational arena addressed by [`LayerId`]
//! - own parent/child structure (groups own ordered child lists)
//! - hold per-layer transform, alpha, visibility and kind-specific content
//!
//! Rendering lives in `graphics`; GPU resources referenced by layers are
//! acquired and released through `gpu::GpuContext`.

mod id;
mod node;
mod tree;

pub use id::{
    CanvasLayer, GroupLayer, ImageLayer, ImmediateLayer, LayerId, LayerKind, LayerState,
    SurfaceLayer,
};
pub use tree::LayerTree;

pub(crate) use node::{LayerContent, LayerNode};
