slotmap::new_key_type! {
    /// Generational layer id. Ids of disposed layers never alias new layers.
    pub struct LayerId;
}

macro_rules! layer_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) LayerId);

        impl $name {
            #[inline]
            pub fn id(self) -> LayerId {
                self.0
            }
        }

        impl From<$name> for LayerId {
            #[inline]
            fn from(handle: $name) -> LayerId {
                handle.0
            }
        }
    };
}

layer_handle!(
    /// Layer that renders its children in insertion order.
    GroupLayer
);
layer_handle!(
    /// Layer that draws an image, optionally stretched to an explicit size.
    ImageLayer
);
layer_handle!(
    /// Layer backed by an off-screen render target.
    SurfaceLayer
);
layer_handle!(
    /// Layer that calls a renderer every frame.
    ImmediateLayer
);
layer_handle!(
    /// Image layer over a CPU raster canvas.
    CanvasLayer
);

/// Lifecycle of a layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerState {
    /// Never had a parent.
    Created,
    Attached,
    /// Had a parent once, currently has none.
    Detached,
    Disposed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Group,
    Image,
    Surface,
    Immediate,
    Canvas,
}
