/// Premultiplied RGBA color with `f32` channels in `[0, 1]`.
///
/// Invariant: `r`, `g` and `b` are already multiplied by `a`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32, // premultiplied
    pub g: f32, // premultiplied
    pub b: f32, // premultiplied
    pub a: f32,
}

impl Color {
    #[inline]
    pub const fn transparent() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 }
    }

    #[inline]
    pub const fn black() -> Self {
        Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 }
    }

    #[inline]
    pub const fn white() -> Self {
        Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 }
    }

    /// Creates a premultiplied color from straight RGBA bytes.
    #[inline]
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from_straight(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    /// Creates a premultiplied color from a `0xAARRGGBB` word.
    #[inline]
    pub fn from_argb(argb: u32) -> Self {
        let [a, r, g, b] = argb.to_be_bytes();
        Self::from_rgba8(r, g, b, a)
    }

    #[inline]
    pub const fn from_premul(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a premultiplied color from straight alpha components.
    #[inline]
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        let a = a.clamp(0.0, 1.0);
        Self {
            r: r.clamp(0.0, 1.0) * a,
            g: g.clamp(0.0, 1.0) * a,
            b: b.clamp(0.0, 1.0) * a,
            a,
        }
    }

    /// Returns a straight-alpha representation. For `a == 0`, RGB is 0.
    #[inline]
    pub fn to_straight(self) -> (f32, f32, f32, f32) {
        if self.a <= 0.0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let inv = 1.0 / self.a;
            (self.r * inv, self.g * inv, self.b * inv, self.a)
        }
    }

    /// Premultiplied RGBA bytes, as uploaded to textures.
    #[inline]
    pub fn to_premul_u8(self) -> [u8; 4] {
        let c = self.clamped();
        [to_u8(c.r), to_u8(c.g), to_u8(c.b), to_u8(c.a)]
    }

    /// Multiplies every channel by `alpha` (opacity modulation).
    #[inline]
    pub fn with_opacity(self, alpha: f32) -> Self {
        let k = alpha.clamp(0.0, 1.0);
        Self { r: self.r * k, g: self.g * k, b: self.b * k, a: self.a * k }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    /// Clamps all channels to [0, 1] and enforces premultiplication.
    #[inline]
    pub fn clamped(self) -> Self {
        let a = self.a.clamp(0.0, 1.0);
        Self {
            r: self.r.clamp(0.0, a),
            g: self.g.clamp(0.0, a),
            b: self.b.clamp(0.0, a),
            a,
        }
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_bytes_are_premultiplied() {
        let c = Color::from_rgba8(255, 0, 0, 128);
        assert!((c.r - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.to_premul_u8(), [128, 0, 0, 128]);
    }

    #[test]
    fn argb_word_decodes_channels() {
        assert_eq!(Color::from_argb(0xFF00FF00), Color::from_straight(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn opacity_scales_all_channels() {
        let c = Color::white().with_opacity(0.5);
        assert_eq!(c, Color::from_premul(0.5, 0.5, 0.5, 0.5));
    }

    #[test]
    fn to_straight_of_transparent_is_zero() {
        assert_eq!(Color::transparent().to_straight(), (0.0, 0.0, 0.0, 0.0));
    }
}
