use crate::coords::{Affine, Rect};
use crate::error::GraphicsError;
use crate::gpu::{GpuContext, TextureId};
use crate::image::{Image, ImageId};
use crate::scene::{LayerContent, LayerId, LayerTree};
use crate::surface::Surface;

/// Paints `id` and its subtree back-to-front.
///
/// Disposed ids are skipped; a failed upload skips only the affected layer.
pub(crate) fn paint_layer(
    ctx: &mut GpuContext,
    tree: &mut LayerTree,
    id: LayerId,
    parent: Affine,
    parent_alpha: f32,
) {
    if ctx.is_lost() {
        return;
    }
    let Some(node) = tree.get(id) else {
        log::trace!("skipping disposed layer {id:?}");
        return;
    };
    if !node.visible {
        return;
    }
    let alpha = parent_alpha * node.alpha;
    if alpha <= 0.0 {
        return;
    }
    let transform = parent.then(node.transform());

    if matches!(node.content, LayerContent::Group { .. }) {
        // Re-read by index; the child list cannot stay borrowed across the
        // recursive walk.
        let mut index = 0;
        while let Some(child) = tree.child_at(id, index) {
            paint_layer(ctx, tree, child, transform, alpha);
            index += 1;
        }
        return;
    }

    let Some(node) = tree.get_mut(id) else {
        return;
    };
    match &mut node.content {
        LayerContent::Group { .. } => {}
        LayerContent::Image { image, size, bound } => match image {
            Some(image) => {
                let rect = Rect::from_size(size.unwrap_or_else(|| image.size()));
                if let Some(texture) = bind_image(ctx, bound, image) {
                    ctx.draw_texture(transform, texture, rect, alpha);
                }
            }
            None => {
                if let Some(old) = bound.take() {
                    ctx.release_image(old);
                }
            }
        },
        LayerContent::Canvas { canvas, bound } => {
            let rect = Rect::new(0.0, 0.0, canvas.width(), canvas.height());
            if let Some(texture) = bind_image(ctx, bound, canvas.image()) {
                ctx.draw_texture(transform, texture, rect, alpha);
            }
        }
        LayerContent::Surface { target, size } => {
            if let Some(target) = target {
                ctx.draw_texture(transform, target.texture, Rect::from_size(*size), alpha);
            }
        }
        LayerContent::Immediate { renderer, clip } => {
            let clip = *clip;
            if let Some(clip) = clip {
                ctx.push_clip(transform, Rect::from_size(clip));
            }
            let size = clip.unwrap_or_else(|| ctx.logical_view());
            renderer.render(&mut Surface::new(ctx, transform, alpha, size));
            if clip.is_some() {
                ctx.pop_clip();
            }
        }
    }
}

/// Texture for `image`, moving the layer's cache reference to it when the
/// layer's image changed since the last frame.
fn bind_image(
    ctx: &mut GpuContext,
    bound: &mut Option<ImageId>,
    image: &Image,
) -> Option<TextureId> {
    let result = if *bound == Some(image.id()) {
        ctx.texture_for(image)
    } else {
        if let Some(old) = bound.take() {
            ctx.release_image(old);
        }
        let result = ctx.retain_image(image);
        if matches!(result, Ok(Some(_))) {
            *bound = Some(image.id());
        }
        result
    };

    match result {
        Ok(texture) => texture,
        Err(GraphicsError::ResourceExhausted(reason)) => {
            log::warn!("skipping layer image {:?}: {reason}", image.id());
            None
        }
        Err(_) => None,
    }
}
