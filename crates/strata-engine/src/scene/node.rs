use std::fmt;

use crate::coords::{Affine, Vec2};
use crate::gpu::RenderTarget;
use crate::image::{Canvas, Image, ImageId};
use crate::surface::ImmediateRenderer;

use super::{LayerId, LayerKind};

#[derive(Debug)]
pub(crate) struct LayerNode {
    pub(crate) parent: Option<LayerId>,
    pub(crate) ever_attached: bool,
    pub(crate) translation: Vec2,
    pub(crate) scale: Vec2,
    pub(crate) alpha: f32,
    pub(crate) visible: bool,
    pub(crate) content: LayerContent,
}

impl LayerNode {
    pub(crate) fn new(content: LayerContent) -> Self {
        Self {
            parent: None,
            ever_attached: false,
            translation: Vec2::ZERO,
            scale: Vec2::ONE,
            alpha: 1.0,
            visible: true,
            content,
        }
    }

    /// Local transform: scale about the layer origin, then translation.
    pub(crate) fn transform(&self) -> Affine {
        let scale = Affine::scale(self.scale.x, self.scale.y);
        Affine::translate(self.translation.x, self.translation.y).then(scale)
    }
}

pub(crate) enum LayerContent {
    Group {
        children: Vec<LayerId>,
    },
    Image {
        image: Option<Image>,
        size: Option<Vec2>,
        /// Image whose texture reference this layer holds in the context cache.
        bound: Option<ImageId>,
    },
    Surface {
        target: Option<RenderTarget>,
        size: Vec2,
    },
    Immediate {
        renderer: Box<dyn ImmediateRenderer>,
        clip: Option<Vec2>,
    },
    Canvas {
        canvas: Canvas,
        bound: Option<ImageId>,
    },
}

impl LayerContent {
    pub(crate) fn kind(&self) -> LayerKind {
        match self {
            LayerContent::Group { .. } => LayerKind::Group,
            LayerContent::Image { .. } => LayerKind::Image,
            LayerContent::Surface { .. } => LayerKind::Surface,
            LayerContent::Immediate { .. } => LayerKind::Immediate,
            LayerContent::Canvas { .. } => LayerKind::Canvas,
        }
    }
}

impl fmt::Debug for LayerContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerContent::Group { children } => {
                f.debug_struct("Group").field("children", children).finish()
            }
            LayerContent::Image { image, size, .. } => {
                f.debug_struct("Image").field("image", image).field("size", size).finish()
            }
            LayerContent::Surface { target, size } => {
                f.debug_struct("Surface").field("target", target).field("size", size).finish()
            }
            LayerContent::Immediate { clip, .. } => {
                f.debug_struct("Immediate").field("clip", clip).finish()
            }
            LayerContent::Canvas { canvas, .. } => {
                f.debug_struct("Canvas").field("canvas", canvas).finish()
            }
        }
    }
}
