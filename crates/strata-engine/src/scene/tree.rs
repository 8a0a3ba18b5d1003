use slotmap::SlotMap;

use crate::coords::Vec2;
use crate::error::{GraphicsError, Result, check_dimension};
use crate::gpu::RenderTarget;
use crate::image::{Canvas, Image};

use super::{
    CanvasLayer, GroupLayer, ImageLayer, ImmediateLayer, LayerContent, LayerId, LayerKind,
    LayerNode, LayerState, SurfaceLayer,
};

/// Arena of layers plus their parent/child structure.
///
/// Every accessor fails with `UseAfterDispose` once the layer is disposed.
#[derive(Debug, Default)]
pub struct LayerTree {
    nodes: SlotMap<LayerId, LayerNode>,
}

impl LayerTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, content: LayerContent) -> LayerId {
        self.nodes.insert(LayerNode::new(content))
    }

    /// Number of live layers, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_alive(&self, id: impl Into<LayerId>) -> bool {
        self.nodes.contains_key(id.into())
    }

    pub fn state(&self, id: impl Into<LayerId>) -> LayerState {
        match self.nodes.get(id.into()) {
            None => LayerState::Disposed,
            Some(node) if node.parent.is_some() => LayerState::Attached,
            Some(node) if node.ever_attached => LayerState::Detached,
            Some(_) => LayerState::Created,
        }
    }

    pub fn kind(&self, id: impl Into<LayerId>) -> Result<LayerKind> {
        Ok(self.node(id.into())?.content.kind())
    }

    pub(crate) fn get(&self, id: LayerId) -> Option<&LayerNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: LayerId) -> Option<&mut LayerNode> {
        self.nodes.get_mut(id)
    }

    fn node(&self, id: LayerId) -> Result<&LayerNode> {
        self.nodes.get(id).ok_or(GraphicsError::UseAfterDispose(id))
    }

    fn node_mut(&mut self, id: LayerId) -> Result<&mut LayerNode> {
        self.nodes.get_mut(id).ok_or(GraphicsError::UseAfterDispose(id))
    }

    // ── structure ──────────────────────────────────────────────────────────

    pub fn parent(&self, id: impl Into<LayerId>) -> Result<Option<LayerId>> {
        Ok(self.node(id.into())?.parent)
    }

    /// Children of `group` in paint order (first is bottom-most).
    pub fn children(&self, group: GroupLayer) -> Result<&[LayerId]> {
        match &self.node(group.id())?.content {
            LayerContent::Group { children } => Ok(children),
            _ => Err(kind_mismatch(group.id(), LayerKind::Group)),
        }
    }

    pub(crate) fn child_at(&self, group: LayerId, index: usize) -> Option<LayerId> {
        match &self.nodes.get(group)?.content {
            LayerContent::Group { children } => children.get(index).copied(),
            _ => None,
        }
    }

    /// Appends `child` on top of `group`'s children, moving it from any
    /// previous parent.
    pub fn add(&mut self, group: GroupLayer, child: impl Into<LayerId>) -> Result<()> {
        self.add_at(group, child, usize::MAX)
    }

    /// Inserts `child` at `index` (clamped to the child count).
    pub fn add_at(
        &mut self,
        group: GroupLayer,
        child: impl Into<LayerId>,
        index: usize,
    ) -> Result<()> {
        let (group_id, child_id) = (group.id(), child.into());
        if self.node(group_id)?.content.kind() != LayerKind::Group {
            return Err(kind_mismatch(group_id, LayerKind::Group));
        }
        self.node(child_id)?;
        if group_id == child_id {
            return Err(GraphicsError::invalid("child", "a layer cannot be added to itself"));
        }
        if self.is_ancestor(child_id, group_id) {
            let reason = "a layer cannot be added to its own descendant";
            return Err(GraphicsError::invalid("child", reason));
        }

        self.detach(child_id)?;
        if let LayerContent::Group { children } = &mut self.node_mut(group_id)?.content {
            let at = index.min(children.len());
            children.insert(at, child_id);
        }

        let node = self.node_mut(child_id)?;
        node.parent = Some(group_id);
        node.ever_attached = true;
        log::trace!("attached {child_id:?} to {group_id:?}");
        Ok(())
    }

    /// Removes `child` from `group`. Fails if it is not a child of `group`.
    pub fn remove(&mut self, group: GroupLayer, child: impl Into<LayerId>) -> Result<()> {
        let child_id = child.into();
        self.node(group.id())?;
        if self.node(child_id)?.parent != Some(group.id()) {
            let reason = format!("{child_id:?} is not a child of {:?}", group.id());
            return Err(GraphicsError::invalid("child", reason));
        }
        self.detach(child_id)
    }

    /// Removes the layer from its parent, if any.
    pub fn detach(&mut self, id: impl Into<LayerId>) -> Result<()> {
        let id = id.into();
        let Some(parent) = self.node_mut(id)?.parent.take() else {
            return Ok(());
        };
        if let Some(LayerNode { content: LayerContent::Group { children }, .. }) =
            self.nodes.get_mut(parent)
        {
            children.retain(|c| *c != id);
        }
        Ok(())
    }

    fn is_ancestor(&self, ancestor: LayerId, mut id: LayerId) -> bool {
        while let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Detaches `id` and removes it with its whole subtree, returning the
    /// removed nodes so their resources can be released.
    pub(crate) fn remove_subtree(&mut self, id: LayerId) -> Vec<(LayerId, LayerNode)> {
        if self.detach(id).is_err() {
            return Vec::new();
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                if let LayerContent::Group { children } = &node.content {
                    stack.extend(children.iter().copied());
                }
                removed.push((next, node));
            }
        }
        removed
    }

    // ── transform / appearance ─────────────────────────────────────────────

    pub fn translation(&self, id: impl Into<LayerId>) -> Result<Vec2> {
        Ok(self.node(id.into())?.translation)
    }

    pub fn set_translation(&mut self, id: impl Into<LayerId>, x: f32, y: f32) -> Result<()> {
        let t = Vec2::new(x, y);
        if !t.is_finite() {
            return Err(GraphicsError::invalid("translation", format!("({x}, {y}) is not finite")));
        }
        self.node_mut(id.into())?.translation = t;
        Ok(())
    }

    pub fn scale(&self, id: impl Into<LayerId>) -> Result<Vec2> {
        Ok(self.node(id.into())?.scale)
    }

    /// Per-axis scale about the layer origin. Negative values mirror.
    pub fn set_scale(&mut self, id: impl Into<LayerId>, sx: f32, sy: f32) -> Result<()> {
        let s = Vec2::new(sx, sy);
        if !s.is_finite() {
            return Err(GraphicsError::invalid("scale", format!("({sx}, {sy}) is not finite")));
        }
        self.node_mut(id.into())?.scale = s;
        Ok(())
    }

    pub fn alpha(&self, id: impl Into<LayerId>) -> Result<f32> {
        Ok(self.node(id.into())?.alpha)
    }

    /// Sets opacity, clamped to `[0, 1]`; multiplies into descendants.
    pub fn set_alpha(&mut self, id: impl Into<LayerId>, alpha: f32) -> Result<()> {
        if !alpha.is_finite() {
            return Err(GraphicsError::invalid("alpha", format!("{alpha} is not finite")));
        }
        self.node_mut(id.into())?.alpha = alpha.clamp(0.0, 1.0);
        Ok(())
    }

    pub fn visible(&self, id: impl Into<LayerId>) -> Result<bool> {
        Ok(self.node(id.into())?.visible)
    }

    pub fn set_visible(&mut self, id: impl Into<LayerId>, visible: bool) -> Result<()> {
        self.node_mut(id.into())?.visible = visible;
        Ok(())
    }

    /// Logical size of the layer's content; groups report zero.
    pub fn size(&self, id: impl Into<LayerId>) -> Result<Vec2> {
        Ok(match &self.node(id.into())?.content {
            LayerContent::Group { .. } => Vec2::ZERO,
            LayerContent::Image { image, size, .. } => {
                size.or_else(|| image.as_ref().map(Image::size)).unwrap_or(Vec2::ZERO)
            }
            LayerContent::Surface { size, .. } => *size,
            LayerContent::Immediate { clip, .. } => clip.unwrap_or(Vec2::ZERO),
            LayerContent::Canvas { canvas, .. } => Vec2::new(canvas.width(), canvas.height()),
        })
    }

    // ── content ────────────────────────────────────────────────────────────

    pub fn image(&self, layer: ImageLayer) -> Result<Option<Image>> {
        match &self.node(layer.id())?.content {
            LayerContent::Image { image, .. } => Ok(image.clone()),
            _ => Err(kind_mismatch(layer.id(), LayerKind::Image)),
        }
    }

    /// Replaces the image; the texture binding follows on the next paint.
    pub fn set_image(&mut self, layer: ImageLayer, image: Option<Image>) -> Result<()> {
        match &mut self.node_mut(layer.id())?.content {
            LayerContent::Image { image: slot, .. } => {
                *slot = image;
                Ok(())
            }
            _ => Err(kind_mismatch(layer.id(), LayerKind::Image)),
        }
    }

    /// Stretches the image to an explicit logical size.
    pub fn set_image_size(&mut self, layer: ImageLayer, width: f32, height: f32) -> Result<()> {
        let size = Vec2::new(check_dimension("width", width)?, check_dimension("height", height)?);
        match &mut self.node_mut(layer.id())?.content {
            LayerContent::Image { size: slot, .. } => {
                *slot = Some(size);
                Ok(())
            }
            _ => Err(kind_mismatch(layer.id(), LayerKind::Image)),
        }
    }

    /// Reverts to the image's natural size.
    pub fn clear_image_size(&mut self, layer: ImageLayer) -> Result<()> {
        match &mut self.node_mut(layer.id())?.content {
            LayerContent::Image { size, .. } => {
                *size = None;
                Ok(())
            }
            _ => Err(kind_mismatch(layer.id(), LayerKind::Image)),
        }
    }

    pub fn canvas(&self, layer: CanvasLayer) -> Result<&Canvas> {
        match &self.node(layer.id())?.content {
            LayerContent::Canvas { canvas, .. } => Ok(canvas),
            _ => Err(kind_mismatch(layer.id(), LayerKind::Canvas)),
        }
    }

    pub fn canvas_mut(&mut self, layer: CanvasLayer) -> Result<&mut Canvas> {
        match &mut self.node_mut(layer.id())?.content {
            LayerContent::Canvas { canvas, .. } => Ok(canvas),
            _ => Err(kind_mismatch(layer.id(), LayerKind::Canvas)),
        }
    }

    /// Clip size fixed at creation; `None` for unclipped layers.
    pub fn clip_size(&self, layer: ImmediateLayer) -> Result<Option<Vec2>> {
        match &self.node(layer.id())?.content {
            LayerContent::Immediate { clip, .. } => Ok(*clip),
            _ => Err(kind_mismatch(layer.id(), LayerKind::Immediate)),
        }
    }

    pub(crate) fn surface_target(
        &self,
        layer: SurfaceLayer,
    ) -> Result<(Option<RenderTarget>, Vec2)> {
        match &self.node(layer.id())?.content {
            LayerContent::Surface { target, size } => Ok((*target, *size)),
            _ => Err(kind_mismatch(layer.id(), LayerKind::Surface)),
        }
    }
}

fn kind_mismatch(id: LayerId, expected: LayerKind) -> GraphicsError {
    GraphicsError::invalid("layer", format!("{id:?} is not a {expected:?} layer"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(tree: &mut LayerTree) -> GroupLayer {
        GroupLayer(tree.insert(LayerContent::Group { children: Vec::new() }))
    }

    fn image(tree: &mut LayerTree) -> ImageLayer {
        ImageLayer(tree.insert(LayerContent::Image { image: None, size: None, bound: None }))
    }

    // ── structure ─────────────────────────────────────────────────────────

    #[test]
    fn add_appends_in_order() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let (a, b) = (image(&mut tree), image(&mut tree));
        tree.add(root, a).unwrap();
        tree.add(root, b).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[a.id(), b.id()]);
        assert_eq!(tree.parent(a).unwrap(), Some(root.id()));
    }

    #[test]
    fn add_at_clamps_index() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let (a, b, c) = (image(&mut tree), image(&mut tree), image(&mut tree));
        tree.add(root, a).unwrap();
        tree.add_at(root, b, 0).unwrap();
        tree.add_at(root, c, 99).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[b.id(), a.id(), c.id()]);
    }

    #[test]
    fn adding_attached_child_moves_it() {
        let mut tree = LayerTree::new();
        let (g1, g2) = (group(&mut tree), group(&mut tree));
        let child = image(&mut tree);
        tree.add(g1, child).unwrap();
        tree.add(g2, child).unwrap();
        assert!(tree.children(g1).unwrap().is_empty());
        assert_eq!(tree.children(g2).unwrap(), &[child.id()]);
    }

    #[test]
    fn re_adding_to_same_group_moves_to_top() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let (a, b) = (image(&mut tree), image(&mut tree));
        tree.add(root, a).unwrap();
        tree.add(root, b).unwrap();
        tree.add(root, a).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[b.id(), a.id()]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = LayerTree::new();
        let (outer, inner) = (group(&mut tree), group(&mut tree));
        tree.add(outer, inner).unwrap();
        assert!(matches!(tree.add(outer, outer), Err(GraphicsError::InvalidArgument { .. })));
        assert!(matches!(tree.add(inner, outer), Err(GraphicsError::InvalidArgument { .. })));
        assert_eq!(tree.parent(outer).unwrap(), None);
    }

    #[test]
    fn remove_requires_membership() {
        let mut tree = LayerTree::new();
        let (g1, g2) = (group(&mut tree), group(&mut tree));
        let child = image(&mut tree);
        tree.add(g1, child).unwrap();
        assert!(tree.remove(g2, child).is_err());
        tree.remove(g1, child).unwrap();
        assert_eq!(tree.parent(child).unwrap(), None);
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn state_follows_lifecycle() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let child = image(&mut tree);
        assert_eq!(tree.state(child), LayerState::Created);
        tree.add(root, child).unwrap();
        assert_eq!(tree.state(child), LayerState::Attached);
        tree.detach(child).unwrap();
        assert_eq!(tree.state(child), LayerState::Detached);
        tree.remove_subtree(child.id());
        assert_eq!(tree.state(child), LayerState::Disposed);
    }

    #[test]
    fn remove_subtree_takes_descendants() {
        let mut tree = LayerTree::new();
        let root = group(&mut tree);
        let inner = group(&mut tree);
        let leaf = image(&mut tree);
        tree.add(root, inner).unwrap();
        tree.add(inner, leaf).unwrap();

        let removed = tree.remove_subtree(inner.id());
        assert_eq!(removed.len(), 2);
        assert!(!tree.is_alive(leaf));
        assert!(tree.children(root).unwrap().is_empty());
        assert_eq!(tree.alpha(leaf), Err(GraphicsError::UseAfterDispose(leaf.id())));
    }

    // ── properties ────────────────────────────────────────────────────────

    #[test]
    fn alpha_is_clamped_and_nan_rejected() {
        let mut tree = LayerTree::new();
        let layer = image(&mut tree);
        tree.set_alpha(layer, 2.0).unwrap();
        assert_eq!(tree.alpha(layer).unwrap(), 1.0);
        assert!(tree.set_alpha(layer, f32::NAN).is_err());
    }

    #[test]
    fn image_size_override_validates() {
        let mut tree = LayerTree::new();
        let layer = image(&mut tree);
        assert!(matches!(
            tree.set_image_size(layer, -1.0, 5.0),
            Err(GraphicsError::InvalidArgument { name: "width", .. })
        ));
        tree.set_image_size(layer, 4.0, 5.0).unwrap();
        assert_eq!(tree.size(layer).unwrap(), Vec2::new(4.0, 5.0));
        tree.clear_image_size(layer).unwrap();
        assert_eq!(tree.size(layer).unwrap(), Vec2::ZERO);
    }
}
