use super::{Rect, Vec2};

/// Logical-to-device conversion ratio.
///
/// Fixed for the lifetime of a `GpuContext`; backends derive it from the
/// display density reported by the host OS.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Scale {
    pub factor: f32,
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl Scale {
    pub const ONE: Scale = Scale { factor: 1.0 };

    #[inline]
    pub const fn new(factor: f32) -> Self {
        Self { factor }
    }

    /// Logical length to device pixels.
    #[inline]
    pub fn scaled(self, v: f32) -> f32 {
        v * self.factor
    }

    /// Device pixels to logical length.
    #[inline]
    pub fn inv_scaled(self, v: f32) -> f32 {
        v / self.factor
    }

    /// Smallest whole pixel count covering the logical length `v`.
    #[inline]
    pub fn scaled_ceil(self, v: f32) -> u32 {
        // Absorb float noise so 100.0 * 1.1 does not round up to 111.
        let px = self.scaled(v) - 1e-3;
        px.ceil().max(0.0) as u32
    }

    #[inline]
    pub fn scaled_point(self, p: Vec2) -> Vec2 {
        p * self.factor
    }

    #[inline]
    pub fn scaled_rect(self, r: Rect) -> Rect {
        r.scaled(self.factor)
    }
}

/// Scissor rectangle in whole device pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Converts a device-space rectangle to whole pixels clamped to a
    /// `view_w` × `view_h` target. Partially covered pixels are included.
    pub fn from_device_rect(r: Rect, view_w: u32, view_h: u32) -> Self {
        let r = r.normalized();
        let x0 = (r.origin.x.floor().max(0.0) as u32).min(view_w);
        let y0 = (r.origin.y.floor().max(0.0) as u32).min(view_h);
        let x1 = (r.max().x.ceil().max(0.0) as u32).min(view_w);
        let y1 = (r.max().y.ceil().max(0.0) as u32).min(view_h);
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    pub fn intersect(self, other: ScissorRect) -> ScissorRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        ScissorRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Returns true when device pixel `(x, y)` lies inside.
    #[inline]
    pub fn contains(self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_ceil_covers_fractional_pixels() {
        let s = Scale::new(1.5);
        assert_eq!(s.scaled_ceil(10.0), 15);
        assert_eq!(s.scaled_ceil(10.5), 16);
        assert_eq!(s.scaled_ceil(0.0), 0);
        assert_eq!(Scale::new(1.1).scaled_ceil(100.0), 110);
    }

    #[test]
    fn scissor_from_rect_clamps_to_view() {
        let s = ScissorRect::from_device_rect(Rect::new(-5.0, 10.0, 50.0, 200.0), 40, 100);
        assert_eq!(s, ScissorRect::new(0, 10, 40, 90));
    }

    #[test]
    fn scissor_from_rect_outside_view_is_empty() {
        let s = ScissorRect::from_device_rect(Rect::new(500.0, 0.0, 10.0, 10.0), 100, 100);
        assert!(s.is_empty());
    }

    #[test]
    fn scissor_intersection() {
        let a = ScissorRect::new(0, 0, 10, 10);
        let b = ScissorRect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(b), ScissorRect::new(5, 5, 5, 5));
        assert!(a.intersect(ScissorRect::new(20, 20, 1, 1)).is_empty());
    }
}
