use crate::paint::Color;

/// Session configuration for a `GpuContext`.
///
/// `scale_factor` is fixed for the lifetime of the context; hosts pass the
/// display density reported by the OS. The view size is in device pixels and
/// may change later through `set_size`.
#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    pub scale_factor: f32,
    pub view_width: u32,
    pub view_height: u32,

    /// Color the default target is cleared to at the start of every `paint`.
    pub clear_color: Color,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            view_width: 800,
            view_height: 600,
            clear_color: Color::black(),
        }
    }
}

impl GraphicsConfig {
    pub fn with_scale_factor(mut self, scale_factor: f32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_view_size(mut self, width: u32, height: u32) -> Self {
        self.view_width = width;
        self.view_height = height;
        self
    }

    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }
}
