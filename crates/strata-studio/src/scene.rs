//! Builds a layer tree from a JSON scene description.
//!
//! Every layer object has a `kind` (`group`, `image`, `canvas`, `surface`,
//! `immediate`) plus optional `x`, `y`, `scale`, `alpha` and `visible`.
//! Colors are `[r, g, b, a]` arrays of straight components in `0..=1`.

use anyhow::{bail, Context, Result};
use image::RgbaImage;

use strata_engine::image::Image;
use strata_engine::paint::Color;
use strata_engine::scene::{GroupLayer, LayerId};
use strata_engine::surface::Surface;
use strata_engine::{GraphicsConfig, GraphicsGl};
use strata_json::{JsonObject, TypedArray};

fn number(obj: &JsonObject, key: &str, default: f64) -> f32 {
    let v = obj.get_number(key);
    if v.is_nan() { default as f32 } else { v as f32 }
}

fn color(obj: &JsonObject, key: &str, default: Color) -> Color {
    match obj.get_typed_array::<f64>(key).map(TypedArray::into_vec).as_deref() {
        Some(&[r, g, b, a]) => Color::from_straight(r as f32, g as f32, b as f32, a as f32),
        _ => default,
    }
}

fn pair(obj: &JsonObject, key: &str) -> Option<(f32, f32)> {
    match obj.get_typed_array::<f64>(key)?.into_vec().as_slice() {
        &[a, b] => Some((a as f32, b as f32)),
        _ => None,
    }
}

/// Viewport settings of a scene.
pub fn config(scene: &JsonObject) -> GraphicsConfig {
    let width = scene.get_int("width").max(1) as u32;
    let height = scene.get_int("height").max(1) as u32;
    GraphicsConfig::default()
        .with_scale_factor(number(scene, "scale", 1.0))
        .with_view_size(width, height)
        .with_clear_color(color(scene, "clear", Color::black()))
}

/// Adds every entry of `layers` under the root layer.
pub fn build(gfx: &mut GraphicsGl, scene: &JsonObject) -> Result<()> {
    let root = gfx.root_layer();
    let layers = scene.get_array("layers").context("scene has no `layers` array")?;
    add_children(gfx, root, layers.objects())
}

fn add_children(
    gfx: &mut GraphicsGl,
    group: GroupLayer,
    children: impl Iterator<Item = JsonObject>,
) -> Result<()> {
    for (index, child) in children.enumerate() {
        let id = build_layer(gfx, &child)
            .with_context(|| format!("layer #{index} ({})", child.get_string("kind")))?;
        if let Err(err) = gfx.layers_mut().add(group, id) {
            discard(gfx, id);
            return Err(err.into());
        }
    }
    Ok(())
}

/// Disposes a layer whose construction failed part way.
fn discard(gfx: &mut GraphicsGl, id: LayerId) {
    if let Err(err) = gfx.dispose(id) {
        log::warn!("could not dispose partially built {id:?}: {err}");
    }
}

/// Creates the layer described by `obj`. On error nothing stays allocated.
fn build_layer(gfx: &mut GraphicsGl, obj: &JsonObject) -> Result<LayerId> {
    let id = create_layer(gfx, obj)?;
    if let Err(err) = apply_properties(gfx, id, obj) {
        discard(gfx, id);
        return Err(err);
    }
    Ok(id)
}

fn create_layer(gfx: &mut GraphicsGl, obj: &JsonObject) -> Result<LayerId> {
    Ok(match obj.get_string("kind") {
        "group" => {
            let group = gfx.create_group_layer();
            if let Some(children) = obj.get_array("children") {
                if let Err(err) = add_children(gfx, group, children.objects()) {
                    discard(gfx, group.into());
                    return Err(err);
                }
            }
            group.into()
        }
        "image" => gfx.create_image_layer_with(checkerboard(obj)?).into(),
        "canvas" => {
            let (w, h) = (number(obj, "width", 64.0), number(obj, "height", 64.0));
            let mut canvas = gfx.create_canvas(w, h)?;
            canvas.set_fill_color(color(obj, "fill", Color::white()));
            if let Some(rects) = obj.get_array("rects") {
                for i in 0..rects.len() {
                    let rect = rects.get_typed_array::<f64>(i).map(TypedArray::into_vec);
                    if let Some(&[x, y, w, h]) = rect.as_deref() {
                        canvas.fill_rect(x as f32, y as f32, w as f32, h as f32);
                    }
                }
            }
            gfx.create_image_layer_with(canvas.image().clone()).into()
        }
        "surface" => {
            let (w, h) = (number(obj, "width", 64.0), number(obj, "height", 64.0));
            let layer = gfx.create_surface_layer(w, h)?;
            let fill = color(obj, "fill", Color::white());
            let inset = number(obj, "inset", 0.0);
            gfx.draw_surface(layer, |s| {
                s.set_fill_color(fill).fill_rect(inset, inset, w - 2.0 * inset, h - 2.0 * inset);
            })?;
            layer.into()
        }
        "immediate" => {
            let pattern = match obj.get_object("pattern") {
                Some(p) => {
                    let tile = p.get_int("tile").max(1) as u32;
                    let image = checker_image(tile, [Color::white(), Color::transparent()]);
                    let (repeat_x, repeat_y) = (p.get_bool("repeat_x"), p.get_bool("repeat_y"));
                    Some(gfx.create_pattern(&image, repeat_x, repeat_y)?)
                }
                None => None,
            };
            let fill = color(obj, "fill", Color::white());
            let renderer = move |s: &mut Surface<'_>| {
                match &pattern {
                    Some(p) => s.set_fill_pattern(p),
                    None => s.set_fill_color(fill),
                };
                let (w, h) = (s.width(), s.height());
                s.fill_rect(0.0, 0.0, w, h);
            };
            match pair(obj, "clip") {
                Some((w, h)) => gfx.create_immediate_layer_clipped(w, h, renderer)?.into(),
                None => gfx.create_immediate_layer(renderer).into(),
            }
        }
        other => bail!("unknown layer kind `{other}`"),
    })
}

fn apply_properties(gfx: &mut GraphicsGl, id: LayerId, obj: &JsonObject) -> Result<()> {
    let tree = gfx.layers_mut();
    tree.set_translation(id, number(obj, "x", 0.0), number(obj, "y", 0.0))?;
    let scale = number(obj, "scale", 1.0);
    tree.set_scale(id, scale, scale)?;
    tree.set_alpha(id, number(obj, "alpha", 1.0))?;
    if obj.contains_key("visible") {
        tree.set_visible(id, obj.get_bool("visible"))?;
    }
    Ok(())
}

fn checkerboard(obj: &JsonObject) -> Result<Image> {
    let cell = obj.get_int("checker").max(1) as u32;
    let colors = match obj.get_array("colors") {
        Some(list) => {
            let pick = |i| {
                match list.get_typed_array::<f64>(i).map(TypedArray::into_vec).as_deref() {
                    Some(&[r, g, b, a]) => {
                        Color::from_straight(r as f32, g as f32, b as f32, a as f32)
                    }
                    _ => Color::black(),
                }
            };
            [pick(0), pick(1)]
        }
        None => [Color::from_straight(0.2, 0.2, 0.25, 1.0), Color::white()],
    };
    let (w, h) = (obj.get_int("width"), obj.get_int("height"));
    if w <= 0 || h <= 0 {
        bail!("image layers need a positive `width` and `height`");
    }
    let (w, h) = (w as u32, h as u32);
    let pixels = RgbaImage::from_fn(w, h, |x, y| {
        let c = colors[((x / cell + y / cell) % 2) as usize];
        image::Rgba(straight_u8(c))
    });
    Ok(Image::from(pixels))
}

fn checker_image(cell: u32, colors: [Color; 2]) -> Image {
    let size = cell * 2;
    Image::from(RgbaImage::from_fn(size, size, |x, y| {
        image::Rgba(straight_u8(colors[((x / cell + y / cell) % 2) as usize]))
    }))
}

fn straight_u8(c: Color) -> [u8; 4] {
    let (r, g, b, a) = c.to_straight();
    [r, g, b, a].map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use strata_engine::gpu::SoftwareBackend;
    use strata_engine::scene::LayerKind;

    use super::*;

    const SCENE: &str = include_str!("../scene.json");

    fn load(text: &str) -> GraphicsGl {
        let scene = strata_json::parse(text).unwrap();
        let backend = Box::new(SoftwareBackend::new());
        let mut gfx = GraphicsGl::from_config(backend, &config(&scene)).unwrap();
        build(&mut gfx, &scene).unwrap();
        gfx
    }

    #[test]
    fn demo_scene_builds_and_paints() {
        let mut gfx = load(SCENE);
        let root = gfx.root_layer();
        let kinds: Vec<_> = gfx
            .layers()
            .children(root)
            .unwrap()
            .iter()
            .map(|id| gfx.layers().kind(*id).unwrap())
            .collect();
        assert_eq!(
            kinds,
            [
                LayerKind::Immediate,
                LayerKind::Group,
                LayerKind::Image,
                LayerKind::Surface,
                LayerKind::Immediate,
                LayerKind::Image
            ]
        );
        gfx.paint().unwrap();
        let shot = gfx.snapshot().unwrap();
        assert_eq!(shot.dimensions(), (320, 240));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let text = r#"{ "width": 8, "height": 8, "layers": [{ "kind": "sprite" }] }"#;
        let scene = strata_json::parse(text).unwrap();
        let backend = Box::new(SoftwareBackend::new());
        let mut gfx = GraphicsGl::from_config(backend, &config(&scene)).unwrap();
        let err = build(&mut gfx, &scene).unwrap_err();
        assert!(format!("{err:#}").contains("sprite"));
    }

    #[test]
    fn failed_layers_release_what_they_allocated() {
        let text = r#"{ "width": 8, "height": 8, "layers": [
            { "kind": "surface", "width": 4, "height": 4, "x": 1e300 },
            { "kind": "group", "children": [
                { "kind": "surface", "width": 4, "height": 4 },
                { "kind": "surface", "width": 4, "height": 4, "alpha": -1e300 }
            ] }
        ] }"#;
        let scene = strata_json::parse(text).unwrap();
        let soft = SoftwareBackend::new();
        let mut gfx = GraphicsGl::from_config(Box::new(soft.clone()), &config(&scene)).unwrap();

        let err = build(&mut gfx, &scene).unwrap_err();
        assert!(format!("{err:#}").contains("translation"));
        assert_eq!(soft.live_textures(), 0);

        let bad_group = strata_json::parse(&text.replace("\"x\": 1e300", "\"x\": 0")).unwrap();
        let err = build(&mut gfx, &bad_group).unwrap_err();
        assert!(format!("{err:#}").contains("alpha"));
        assert_eq!(soft.live_textures(), 1);
        let root = gfx.root_layer();
        assert_eq!(gfx.layers().children(root).unwrap().len(), 1);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let scene = strata_json::parse("{}").unwrap();
        let config = config(&scene);
        assert_eq!((config.view_width, config.view_height), (1, 1));
        assert_eq!(config.scale_factor, 1.0);
    }
}
