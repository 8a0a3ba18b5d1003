use strata_engine::coords::{Rect, Vec2};
use strata_engine::gpu::{DrawCall, PassTarget, SoftwareBackend, TileMode};
use strata_engine::image::Image;
use strata_engine::paint::Color;
use strata_engine::scene::{LayerKind, LayerState};
use strata_engine::{GraphicsConfig, GraphicsError, GraphicsGl};

fn setup(scale: f32, width: u32, height: u32) -> (GraphicsGl, SoftwareBackend) {
    let soft = SoftwareBackend::new();
    let config = GraphicsConfig::default().with_scale_factor(scale).with_view_size(width, height);
    let gfx = GraphicsGl::from_config(Box::new(soft.clone()), &config).unwrap();
    (gfx, soft)
}

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Image {
    let pixels = rgba.iter().copied().cycle().take(width as usize * height as usize * 4).collect();
    Image::from_rgba8(width, height, pixels).unwrap()
}

// ── viewport ─────────────────────────────────────────────────────────────────

#[test]
fn set_size_round_trips_including_zero() {
    let (mut gfx, soft) = setup(1.0, 64, 64);
    gfx.set_size(120, 80);
    assert_eq!((gfx.width(), gfx.height()), (120, 80));
    assert_eq!(soft.framebuffer_size(), (120, 80));

    gfx.set_size(0, 0);
    assert_eq!((gfx.width(), gfx.height()), (0, 0));
    gfx.paint().unwrap();
    assert!(soft.calls().is_empty());
}

#[test]
fn oversized_viewport_disables_drawing_instead_of_allocating() {
    let soft = SoftwareBackend::new().with_max_texture_size(64);
    let config = GraphicsConfig::default().with_view_size(32, 32);
    let mut gfx = GraphicsGl::from_config(Box::new(soft.clone()), &config).unwrap();
    let root = gfx.root_layer();
    let layer = gfx.create_image_layer_with(solid(4, 4, [255, 0, 0, 255]));
    gfx.layers_mut().add(root, layer).unwrap();

    gfx.set_size(20_000, 20_000);
    assert_eq!((gfx.width(), gfx.height()), (20_000, 20_000));
    assert_eq!(soft.framebuffer_size(), (0, 0));
    gfx.paint().unwrap();
    assert!(soft.calls().is_empty());

    gfx.set_size(16, 16);
    gfx.paint().unwrap();
    assert_eq!(soft.framebuffer_size(), (16, 16));
    assert_eq!(soft.pixel(0, 0), Some([255, 0, 0, 255]));
}

// ── surface layers ───────────────────────────────────────────────────────────

#[test]
fn surface_layer_reports_its_size() {
    let (mut gfx, _) = setup(1.0, 64, 64);
    let layer = gfx.create_surface_layer(30.0, 12.5).unwrap();
    assert_eq!(gfx.layers().size(layer).unwrap(), Vec2::new(30.0, 12.5));
    assert_eq!(gfx.layers().kind(layer).unwrap(), LayerKind::Surface);
}

#[test]
fn surface_layer_rejects_negative_size() {
    let (mut gfx, _) = setup(1.0, 64, 64);
    let err = gfx.create_surface_layer(-1.0, 10.0).unwrap_err();
    assert!(matches!(err, GraphicsError::InvalidArgument { name: "width", .. }));
}

#[test]
#[allow(deprecated)]
fn oversized_canvas_layer_is_rejected() {
    let (mut gfx, soft) = setup(1.0, 64, 64);
    let err = gfx.create_canvas_layer(1e10, 1e10).unwrap_err();
    assert!(matches!(err, GraphicsError::ResourceExhausted(_)));
    let err = gfx.create_canvas_layer(9000.0, 1.0).unwrap_err();
    assert!(matches!(err, GraphicsError::ResourceExhausted(_)));
    assert_eq!(soft.live_textures(), 0);
}

#[test]
fn surface_contents_persist_across_paints() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let root = gfx.root_layer();
    let layer = gfx.create_surface_layer(4.0, 4.0).unwrap();
    gfx.layers_mut().add(root, layer).unwrap();
    gfx.draw_surface(layer, |s| {
        s.set_fill_color(Color::white()).fill_rect(0.0, 0.0, 4.0, 4.0);
    })
    .unwrap();

    gfx.paint().unwrap();
    gfx.paint().unwrap();
    assert_eq!(soft.pixel(1, 1), Some([255, 255, 255, 255]));
    assert_eq!(soft.pixel(8, 8), Some([0, 0, 0, 255]));
}

// ── tree structure ───────────────────────────────────────────────────────────

#[test]
fn children_keep_insertion_order_and_move_between_groups() {
    let (mut gfx, _) = setup(1.0, 64, 64);
    let a = gfx.create_group_layer();
    let b = gfx.create_group_layer();
    let x = gfx.create_image_layer();
    let y = gfx.create_image_layer();
    let z = gfx.create_image_layer();

    let tree = gfx.layers_mut();
    tree.add(a, x).unwrap();
    tree.add(a, y).unwrap();
    tree.add_at(a, z, 0).unwrap();
    assert_eq!(tree.children(a).unwrap(), &[z.id(), x.id(), y.id()]);

    tree.add(b, x).unwrap();
    assert_eq!(tree.children(a).unwrap(), &[z.id(), y.id()]);
    assert_eq!(tree.children(b).unwrap(), &[x.id()]);
    assert_eq!(tree.parent(x).unwrap(), Some(b.id()));
}

#[test]
fn adding_a_group_under_its_descendant_fails() {
    let (mut gfx, _) = setup(1.0, 64, 64);
    let outer = gfx.create_group_layer();
    let inner = gfx.create_group_layer();
    let tree = gfx.layers_mut();
    tree.add(outer, inner).unwrap();
    assert!(matches!(tree.add(inner, outer), Err(GraphicsError::InvalidArgument { .. })));
    assert!(matches!(tree.add(outer, outer), Err(GraphicsError::InvalidArgument { .. })));
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn dispose_is_idempotent_and_poisons_the_handle() {
    let (mut gfx, _) = setup(1.0, 64, 64);
    let root = gfx.root_layer();
    let layer = gfx.create_image_layer();
    assert_eq!(gfx.layers().state(layer), LayerState::Created);
    gfx.layers_mut().add(root, layer).unwrap();
    assert_eq!(gfx.layers().state(layer), LayerState::Attached);

    gfx.dispose(layer).unwrap();
    gfx.dispose(layer).unwrap();
    assert_eq!(gfx.layers().state(layer), LayerState::Disposed);
    assert!(gfx.layers().children(root).unwrap().is_empty());
    assert!(matches!(
        gfx.layers_mut().set_translation(layer, 1.0, 1.0),
        Err(GraphicsError::UseAfterDispose(_))
    ));
}

#[test]
fn disposing_a_surface_layer_releases_its_target() {
    let (mut gfx, soft) = setup(1.0, 64, 64);
    let layer = gfx.create_surface_layer(8.0, 8.0).unwrap();
    assert_eq!(soft.live_textures(), 1);
    gfx.dispose(layer).unwrap();
    gfx.dispose(layer).unwrap();
    assert_eq!(soft.live_textures(), 0);
    assert_eq!(soft.released_textures().len(), 1);
}

#[test]
fn disposing_a_painted_image_layer_releases_its_texture_once() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let root = gfx.root_layer();
    let layer = gfx.create_image_layer_with(solid(2, 2, [0, 255, 0, 255]));
    gfx.layers_mut().add(root, layer).unwrap();
    gfx.paint().unwrap();
    assert_eq!(soft.live_textures(), 1);

    gfx.dispose(layer).unwrap();
    assert_eq!(soft.live_textures(), 0);
    assert_eq!(soft.released_textures().len(), 1);
    gfx.dispose(layer).unwrap();
    gfx.paint().unwrap();
    assert_eq!(soft.released_textures().len(), 1);
}

#[test]
fn disposing_a_group_releases_resources_of_its_subtree() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let root = gfx.root_layer();
    let group = gfx.create_group_layer();
    let image = gfx.create_image_layer_with(solid(2, 2, [0, 255, 0, 255]));
    let surface = gfx.create_surface_layer(4.0, 4.0).unwrap();
    gfx.layers_mut().add(root, group).unwrap();
    gfx.layers_mut().add(group, image).unwrap();
    gfx.layers_mut().add(group, surface).unwrap();
    gfx.paint().unwrap();
    assert_eq!(soft.live_textures(), 2);

    gfx.dispose(group).unwrap();
    assert_eq!(soft.live_textures(), 0);
    assert_eq!(soft.released_textures().len(), 2);
    assert_eq!(gfx.layers().state(image), LayerState::Disposed);
    assert_eq!(gfx.layers().state(surface), LayerState::Disposed);
    assert!(gfx.layers().children(root).unwrap().is_empty());
}

// ── scale factor ─────────────────────────────────────────────────────────────

#[test]
fn logical_coordinates_are_scaled_to_device_pixels() {
    let (mut gfx, soft) = setup(2.0, 64, 64);
    gfx.set_size(200, 200);
    let root = gfx.root_layer();
    let layer = gfx.create_image_layer_with(solid(4, 4, [255, 0, 0, 255]));
    gfx.layers_mut().add(root, layer).unwrap();
    gfx.layers_mut().set_translation(layer, 10.0, 10.0).unwrap();
    gfx.paint().unwrap();

    let dest = soft.calls().into_iter().find_map(|c| match c.call {
        DrawCall::Texture { dest, .. } => Some(dest),
        _ => None,
    });
    assert_eq!(dest, Some(Rect::new(20.0, 20.0, 8.0, 8.0)));
    assert_eq!(soft.pixel(20, 20), Some([255, 0, 0, 255]));
    assert_eq!(soft.pixel(19, 19), Some([0, 0, 0, 255]));
    assert_eq!(soft.pixel(28, 28), Some([0, 0, 0, 255]));
}

// ── patterns ─────────────────────────────────────────────────────────────────

#[test]
fn patterns_record_their_repeat_flags() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let image = solid(2, 2, [0, 0, 255, 255]);
    for (rx, ry) in [(false, false), (true, false), (false, true), (true, true)] {
        let pattern = gfx.create_pattern(&image, rx, ry).unwrap();
        assert_eq!((pattern.repeat_x(), pattern.repeat_y()), (rx, ry));
        let mode = TileMode { repeat_x: rx, repeat_y: ry };
        assert_eq!(soft.tile_mode(pattern.tiling()), Some(mode));
    }
}

#[test]
fn patterns_over_the_same_image_get_distinct_handles() {
    let (mut gfx, _) = setup(1.0, 16, 16);
    let image = solid(2, 2, [0, 0, 255, 255]);
    let alias = image.clone();
    let a = gfx.create_pattern(&image, true, false).unwrap();
    let b = gfx.create_pattern(&alias, false, true).unwrap();
    assert_ne!(a.tiling(), b.tiling());
    assert_eq!((a.repeat_x(), a.repeat_y()), (true, false));
    assert_eq!((b.repeat_x(), b.repeat_y()), (false, true));
    assert!(Image::ptr_eq(a.image(), b.image()));
}

#[test]
fn dropped_patterns_release_their_tiling_on_the_next_frame() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let pattern = gfx.create_pattern(&solid(2, 2, [0, 0, 255, 255]), true, false).unwrap();
    let handle = pattern.tiling();
    drop(pattern);
    assert_eq!(soft.live_tilings(), 1);
    gfx.paint().unwrap();
    assert_eq!(soft.live_tilings(), 0);
    assert_eq!(soft.released_tilings(), vec![handle]);
}

// ── immediate layers ─────────────────────────────────────────────────────────

#[test]
fn immediate_layer_draws_with_the_layer_transform() {
    let (mut gfx, soft) = setup(1.0, 32, 32);
    let root = gfx.root_layer();
    let layer = gfx
        .create_immediate_layer_clipped(8.0, 8.0, |s: &mut strata_engine::surface::Surface<'_>| {
            s.set_fill_color(Color::white()).fill_rect(0.0, 0.0, 100.0, 100.0);
        })
        .unwrap();
    gfx.layers_mut().add(root, layer).unwrap();
    gfx.layers_mut().set_translation(layer, 4.0, 4.0).unwrap();
    gfx.paint().unwrap();

    assert_eq!(soft.pixel(4, 4), Some([255, 255, 255, 255]));
    assert_eq!(soft.pixel(11, 11), Some([255, 255, 255, 255]));
    assert_eq!(soft.pixel(12, 12), Some([0, 0, 0, 255]));
}

// ── context loss ─────────────────────────────────────────────────────────────

#[test]
fn lost_context_fails_paint_and_stays_lost() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    soft.lose_context("driver reset");
    assert!(matches!(gfx.paint(), Err(GraphicsError::ContextLost(_))));
    assert!(gfx.is_lost());
    assert!(matches!(gfx.snapshot(), Err(GraphicsError::ContextLost(_))));
    assert!(gfx.ctx_mut().read_pixels(PassTarget::Default).is_err());
}

// ── canvas layers ────────────────────────────────────────────────────────────

#[test]
#[allow(deprecated)]
fn canvas_layer_uploads_its_raster() {
    let (mut gfx, soft) = setup(1.0, 16, 16);
    let root = gfx.root_layer();
    let layer = gfx.create_canvas_layer(4.0, 4.0).unwrap();
    gfx.layers_mut()
        .canvas_mut(layer)
        .unwrap()
        .set_fill_color(Color::white())
        .fill_rect(0.0, 0.0, 2.0, 2.0);
    gfx.layers_mut().add(root, layer).unwrap();
    gfx.paint().unwrap();

    assert_eq!(soft.pixel(0, 0), Some([255, 255, 255, 255]));
    assert_eq!(soft.pixel(3, 3), Some([0, 0, 0, 255]));
    assert_eq!(gfx.layers().size(layer).unwrap(), Vec2::new(4.0, 4.0));
}

#[test]
fn snapshot_returns_straight_alpha() {
    let (mut gfx, _) = setup(1.0, 4, 4);
    gfx.set_clear_color(Color::from_straight(1.0, 0.0, 0.0, 0.5));
    gfx.paint().unwrap();
    let shot = gfx.snapshot().unwrap();
    let px = shot.get_pixel(0, 0).0;
    assert_eq!(px[0], 255);
    assert!((127..=128).contains(&px[3]));
}
