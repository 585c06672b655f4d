//! RGB color values and rendered output frames.

use serde::{Deserialize, Serialize};

/// An 8-bit-per-channel RGB color.
///
/// Serializes as a `[r, g, b]` array, matching the wire shape rendered code
/// and the data store use for colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Create a color from integer channels, clamping to 0..=255.
    pub fn new(r: i64, g: i64, b: i64) -> Self {
        Rgb(
            r.clamp(0, 255) as u8,
            g.clamp(0, 255) as u8,
            b.clamp(0, 255) as u8,
        )
    }

    /// Create a color from float channels in 0.0..=255.0.
    pub fn from_f64(r: f64, g: f64, b: f64) -> Self {
        Rgb(
            r.round().clamp(0.0, 255.0) as u8,
            g.round().clamp(0.0, 255.0) as u8,
            b.round().clamp(0.0, 255.0) as u8,
        )
    }

    pub fn r(&self) -> u8 {
        self.0
    }

    pub fn g(&self) -> u8 {
        self.1
    }

    pub fn b(&self) -> u8 {
        self.2
    }

    /// Convert from HSV. Hue in degrees (wraps), saturation and value in 0..=1.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r1, g1, b1) = match h as u32 / 60 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Rgb::from_f64((r1 + m) * 255.0, (g1 + m) * 255.0, (b1 + m) * 255.0)
    }

    /// Linear interpolation toward `other`. `t` is clamped to 0..=1.
    pub fn lerp(&self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| a as f64 + (b as f64 - a as f64) * t;
        Rgb::from_f64(mix(self.0, other.0), mix(self.1, other.1), mix(self.2, other.2))
    }

    /// Perceived brightness in 0.0..=1.0 (Rec. 601 luma weights).
    pub fn luminance(&self) -> f64 {
        (0.299 * self.0 as f64 + 0.587 * self.1 as f64 + 0.114 * self.2 as f64) / 255.0
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Rgb(r, g, b)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// One rendered output frame.
///
/// `primary` drives single-color targets via `set_color`. When `pixels` is
/// present the frame addresses a multi-pixel target: each entry maps to
/// `set_pixel(i, ..)` followed by one `show()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Color for the primary channel.
    pub primary: Rgb,

    /// Per-pixel colors for multi-pixel targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels: Option<Vec<Rgb>>,
}

impl Frame {
    /// A single-channel frame.
    pub fn solid(color: Rgb) -> Self {
        Self {
            primary: color,
            pixels: None,
        }
    }
}

impl From<Rgb> for Frame {
    fn from(color: Rgb) -> Self {
        Frame::solid(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_channels() {
        assert_eq!(Rgb::new(-5, 300, 128), Rgb(0, 255, 128));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb(255, 0, 0));
        assert_eq!(Rgb::from_hsv(120.0, 1.0, 1.0), Rgb(0, 255, 0));
        assert_eq!(Rgb::from_hsv(240.0, 1.0, 1.0), Rgb(0, 0, 255));
    }

    #[test]
    fn test_hsv_wraps_hue() {
        assert_eq!(Rgb::from_hsv(360.0, 1.0, 1.0), Rgb::from_hsv(0.0, 1.0, 1.0));
        assert_eq!(Rgb::from_hsv(-120.0, 1.0, 1.0), Rgb::from_hsv(240.0, 1.0, 1.0));
    }

    #[test]
    fn test_hsv_zero_saturation_is_gray() {
        let gray = Rgb::from_hsv(200.0, 0.0, 0.5);
        assert_eq!(gray.r(), gray.g());
        assert_eq!(gray.g(), gray.b());
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Rgb(0, 0, 0);
        let b = Rgb(200, 100, 50);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Rgb(100, 50, 25));
    }

    #[test]
    fn test_serde_array_shape() {
        let json = serde_json::to_value(Rgb(1, 2, 3)).unwrap();
        assert_eq!(json, serde_json::json!([1, 2, 3]));
        let back: Rgb = serde_json::from_value(json).unwrap();
        assert_eq!(back, Rgb(1, 2, 3));
    }
}
