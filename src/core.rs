use crate::error::{DeepfryError, DeepfryResult};

pub use kurbo::{Affine, Point, Vec2};

/// Stable identity of a layer, assigned at creation.
///
/// Ids are monotonically increasing per engine and survive reordering, so
/// selection can be re-resolved by id after a sort.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LayerId(pub u64);

/// Render target dimensions in pixels, fixed at engine construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Create validated canvas dimensions.
    pub fn new(width: u32, height: u32) -> DeepfryResult<Self> {
        if width == 0 || height == 0 {
            return Err(DeepfryError::validation("canvas width/height must be > 0"));
        }
        Ok(Self { width, height })
    }

    /// Byte length of a tightly packed RGBA8 buffer for this canvas.
    pub fn rgba8_len(self) -> DeepfryResult<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| DeepfryError::validation("canvas pixel buffer size overflows"))
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    /// Red channel premultiplied by alpha.
    pub r: u8,
    /// Green channel premultiplied by alpha.
    pub g: u8,
    /// Blue channel premultiplied by alpha.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8Premul {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Opaque white.
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };

    /// Convert straight-alpha RGBA8 into premultiplied RGBA8.
    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional, case-insensitive).
    pub fn from_hex(s: &str) -> DeepfryResult<Self> {
        let s = s.trim();
        let s = s.strip_prefix('#').unwrap_or(s);

        fn hex_byte(pair: &str) -> DeepfryResult<u8> {
            u8::from_str_radix(pair, 16)
                .map_err(|_| DeepfryError::validation(format!("invalid hex byte \"{pair}\"")))
        }

        let (r, g, b, a) = match s.len() {
            6 => (
                hex_byte(&s[0..2])?,
                hex_byte(&s[2..4])?,
                hex_byte(&s[4..6])?,
                255,
            ),
            8 => (
                hex_byte(&s[0..2])?,
                hex_byte(&s[2..4])?,
                hex_byte(&s[4..6])?,
                hex_byte(&s[6..8])?,
            ),
            _ => {
                return Err(DeepfryError::validation(
                    "hex color must be #RRGGBB or #RRGGBBAA",
                ));
            }
        };

        Ok(Self::from_straight_rgba(r, g, b, a))
    }

    /// Pixel bytes in buffer order.
    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_rejects_zero_dims() {
        assert!(Canvas::new(0, 10).is_err());
        assert!(Canvas::new(10, 0).is_err());
        assert_eq!(Canvas::new(3, 4).unwrap().rgba8_len().unwrap(), 48);
    }

    #[test]
    fn premultiply_rounds_to_nearest() {
        let c = Rgba8Premul::from_straight_rgba(100, 50, 200, 128);
        assert_eq!(c.r, ((100u16 * 128 + 127) / 255) as u8);
        assert_eq!(c.a, 128);
    }

    #[test]
    fn hex_parses_rgb_and_rgba() {
        assert_eq!(Rgba8Premul::from_hex("#ffffff").unwrap(), Rgba8Premul::WHITE);
        let c = Rgba8Premul::from_hex("0000ff80").unwrap();
        assert_eq!(c.a, 128);
        assert_eq!(c.b, ((255u16 * 128 + 127) / 255) as u8);
        assert!(Rgba8Premul::from_hex("#abc").is_err());
    }
}
