use crate::coords::{Rect, ScissorRect};
use crate::paint::Color;

use super::{TextureId, TilingHandle};

/// Device-space draw command executed by a backend inside a pass.
///
/// `dest` rectangles are in device pixels of the current target and always
/// normalized. `uv` is in normalized texture coordinates; it may have
/// negative extents (mirrored draws) and, for tiled draws, exceed `[0, 1]`.
/// `tint` is premultiplied and multiplies sampled texels.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    /// Fills the whole target, ignoring the scissor.
    Clear(Color),
    /// Restricts subsequent draws; `None` restores the full target.
    SetScissor(Option<ScissorRect>),
    FillRect { dest: Rect, color: Color },
    Texture { texture: TextureId, dest: Rect, uv: Rect, tint: Color },
    Tiled { tiling: TilingHandle, dest: Rect, uv: Rect, tint: Color },
}

impl DrawCall {
    /// Destination rectangle for geometry-producing calls.
    pub fn dest(&self) -> Option<Rect> {
        match self {
            DrawCall::FillRect { dest, .. }
            | DrawCall::Texture { dest, .. }
            | DrawCall::Tiled { dest, .. } => Some(*dest),
            DrawCall::Clear(_) | DrawCall::SetScissor(_) => None,
        }
    }
}
