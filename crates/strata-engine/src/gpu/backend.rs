use thiserror::Error;

use super::DrawCall;

/// Opaque backend texture handle (uploaded images and render targets).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque backend tiling handle built once per pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilingHandle(u64);

impl TilingHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Destination of a render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PassTarget {
    /// The host-visible framebuffer, sized by `GpuBackend::resize`.
    Default,
    /// An off-screen render target from `create_render_target`.
    Texture(TextureId),
}

/// Repeat flags recorded with a tiling handle.
///
/// Samplers wrap on both axes regardless; the flags describe the pattern
/// the handle was built for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TileMode {
    pub repeat_x: bool,
    pub repeat_y: bool,
}

/// Borrowed premultiplied RGBA8 pixels.
#[derive(Debug, Copy, Clone)]
pub struct PixelData<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Owned premultiplied RGBA8 pixels read back from a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Premultiplied RGBA at `(x, y)`, or `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data.get(i..i + 4).and_then(|s| s.try_into().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("texture {width}x{height} exceeds the device limit of {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("out of GPU memory: {0}")]
    OutOfMemory(String),

    #[error("device lost: {0}")]
    Lost(String),

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("unknown tiling handle {0:?}")]
    UnknownTiling(TilingHandle),

    #[error("draw issued outside of a render pass")]
    NoActivePass,
}

impl BackendError {
    /// Allocation failures are recoverable; everything else poisons the device.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::TextureTooLarge { .. } | Self::OutOfMemory(_))
    }
}

/// Platform rendering backend.
///
/// Receives only device-pixel geometry and premultiplied pixels; all logical
/// to device conversion happens in `GpuContext`. Release calls for unknown
/// handles are ignored.
pub trait GpuBackend {
    fn name(&self) -> &str;

    /// Largest texture edge in pixels.
    fn max_texture_size(&self) -> u32;

    /// Resizes the default target. Zero extents are valid.
    fn resize(&mut self, width: u32, height: u32);

    fn create_texture(&mut self, data: PixelData<'_>) -> Result<TextureId, BackendError>;
    fn update_texture(
        &mut self,
        texture: TextureId,
        data: PixelData<'_>,
    ) -> Result<(), BackendError>;
    fn create_render_target(&mut self, width: u32, height: u32) -> Result<TextureId, BackendError>;
    fn release_texture(&mut self, texture: TextureId);

    fn create_tiling(
        &mut self,
        data: PixelData<'_>,
        mode: TileMode,
    ) -> Result<TilingHandle, BackendError>;
    fn release_tiling(&mut self, tiling: TilingHandle);

    fn begin_pass(&mut self, target: PassTarget) -> Result<(), BackendError>;
    fn draw(&mut self, call: DrawCall) -> Result<(), BackendError>;
    fn end_pass(&mut self) -> Result<(), BackendError>;

    /// Reads back a target as premultiplied RGBA8. Must not be called mid-pass.
    fn read_pixels(&mut self, target: PassTarget) -> Result<PixelBuffer, BackendError>;
}
