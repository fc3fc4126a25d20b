use crate::meta::Color;
use crate::pixel::Pixel;

/// Color remapping used by conversion.
///
/// Every source pixel is first expanded to linear RGBA, then reduced to the
/// target color. Implementations only need to supply a luma function, which
/// drives the gray colors; both steps must be deterministic.
///
/// Stored components are normalized so they fit integer sample types:
///
/// | color | components |
/// |-------|------------|
/// | `ycbcr` | BT.709 full range, `Cb`/`Cr` offset by 0.5 |
/// | `lab` | `L / 100`, `a / 256 + 0.5`, `b / 256 + 0.5` (D65) |
/// | `lch` | `L / 100`, `C / 200`, `h / 360` |
/// | `xyz` | CIE XYZ from linear sRGB primaries, D65 |
/// | `yuv` | CIE 1976 `Y u' v'` |
/// | `xyy` | CIE `x y Y` |
/// | `hsl`, `hsv` | hue in turns, then saturation and lightness/value |
/// | `cmyk` | naive complement of RGB with black extracted |
pub trait ColorModel: Send + Sync {
    fn luma(&self, r: f32, g: f32, b: f32) -> f32;

    /// Expand a pixel stored in `color` to RGBA. Alpha is 1 when the color
    /// has none.
    fn to_rgba(&self, px: &Pixel, color: Color) -> Pixel {
        let [a, b, c, d] = px.data;
        let alpha = if color.has_alpha() { px.data[color.channels() as usize - 1] } else { 1.0 };
        let [r, g, bl] = match color {
            Color::Gray | Color::GrayAlpha => [a, a, a],
            Color::Rgb | Color::Rgba => [a, b, c],
            Color::Cmyk => cmyk_to_rgb([a, b, c, d]),
            Color::Ycbcr | Color::YcbcrA => ycbcr_to_rgb([a, b, c]),
            Color::Lab | Color::LabA => xyz_to_rgb(lab_to_xyz(decode_lab([a, b, c]))),
            Color::Lch | Color::LchA => xyz_to_rgb(lab_to_xyz(lch_to_lab(decode_lch([a, b, c])))),
            Color::Xyz | Color::XyzA => xyz_to_rgb([a, b, c]),
            Color::Yuv | Color::YuvA => xyz_to_rgb(yuv_to_xyz([a, b, c])),
            Color::Hsl | Color::HslA => hsl_to_rgb([a, b, c]),
            Color::Hsv | Color::HsvA => hsv_to_rgb([a, b, c]),
            Color::Xyy | Color::XyyA => xyz_to_rgb(xyy_to_xyz([a, b, c])),
        };
        Pixel::rgba(r, g, bl, alpha)
    }

    /// Reduce an RGBA pixel to `color`. Unused slots are zero.
    fn from_rgba(&self, rgba: &Pixel, color: Color) -> Pixel {
        let [r, g, b, a] = rgba.data;
        let rgb = [r, g, b];
        let [x, y, z] = match color {
            Color::Gray | Color::GrayAlpha => {
                let luma = self.luma(r, g, b);
                return if color.has_alpha() {
                    Pixel::rgba(luma, a, 0.0, 0.0)
                } else {
                    Pixel::rgba(luma, 0.0, 0.0, 0.0)
                };
            }
            Color::Cmyk => return Pixel { data: rgb_to_cmyk(rgb) },
            Color::Rgb | Color::Rgba => rgb,
            Color::Ycbcr | Color::YcbcrA => rgb_to_ycbcr(rgb),
            Color::Lab | Color::LabA => encode_lab(xyz_to_lab(rgb_to_xyz(rgb))),
            Color::Lch | Color::LchA => encode_lch(lab_to_lch(xyz_to_lab(rgb_to_xyz(rgb)))),
            Color::Xyz | Color::XyzA => rgb_to_xyz(rgb),
            Color::Yuv | Color::YuvA => xyz_to_yuv(rgb_to_xyz(rgb)),
            Color::Hsl | Color::HslA => rgb_to_hsl(rgb),
            Color::Hsv | Color::HsvA => rgb_to_hsv(rgb),
            Color::Xyy | Color::XyyA => xyz_to_xyy(rgb_to_xyz(rgb)),
        };
        Pixel::rgba(x, y, z, if color.has_alpha() { a } else { 0.0 })
    }
}

/// ITU-R BT.709 luma weights.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rec709;

impl Rec709 {
    pub const WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];
}

impl ColorModel for Rec709 {
    fn luma(&self, r: f32, g: f32, b: f32) -> f32 {
        let [wr, wg, wb] = Self::WEIGHTS;
        wr * r + wg * g + wb * b
    }
}

// ----------------------------------------------------------------------------
// Spaces
// ----------------------------------------------------------------------------

/// D65 reference white.
const WHITE: [f32; 3] = [0.95047, 1.0, 1.08883];

/// D65 chromaticity, used for black where `x y` and `u' v'` are undefined.
const WHITE_XY: [f32; 2] = [0.3127, 0.3290];
const WHITE_UV: [f32; 2] = [0.1978, 0.4683];

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_456_4, 0.357_576_1, 0.180_437_5],
    [0.212_672_9, 0.715_152_2, 0.072_175_0],
    [0.019_333_9, 0.119_192_0, 0.950_304_1],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240_454_2, -1.537_138_5, -0.498_531_4],
    [-0.969_266_0, 1.876_010_8, 0.041_556_0],
    [0.055_643_4, -0.204_025_9, 1.057_225_2],
];

fn mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

fn rgb_to_xyz(rgb: [f32; 3]) -> [f32; 3] {
    mul(&RGB_TO_XYZ, rgb)
}

fn xyz_to_rgb(xyz: [f32; 3]) -> [f32; 3] {
    mul(&XYZ_TO_RGB, xyz)
}

fn rgb_to_ycbcr([r, g, b]: [f32; 3]) -> [f32; 3] {
    let [wr, wg, wb] = Rec709::WEIGHTS;
    let y = wr * r + wg * g + wb * b;
    let cb = (b - y) / (2.0 * (1.0 - wb)) + 0.5;
    let cr = (r - y) / (2.0 * (1.0 - wr)) + 0.5;
    [y, cb, cr]
}

fn ycbcr_to_rgb([y, cb, cr]: [f32; 3]) -> [f32; 3] {
    let [wr, wg, wb] = Rec709::WEIGHTS;
    let r = y + 2.0 * (1.0 - wr) * (cr - 0.5);
    let b = y + 2.0 * (1.0 - wb) * (cb - 0.5);
    let g = (y - wr * r - wb * b) / wg;
    [r, g, b]
}

const LAB_EPSILON: f32 = 6.0 / 29.0;

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * LAB_EPSILON * LAB_EPSILON) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.powi(3)
    } else {
        3.0 * LAB_EPSILON * LAB_EPSILON * (t - 4.0 / 29.0)
    }
}

fn xyz_to_lab([x, y, z]: [f32; 3]) -> [f32; 3] {
    let fx = lab_f(x / WHITE[0]);
    let fy = lab_f(y / WHITE[1]);
    let fz = lab_f(z / WHITE[2]);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn lab_to_xyz([l, a, b]: [f32; 3]) -> [f32; 3] {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    [WHITE[0] * lab_f_inv(fx), WHITE[1] * lab_f_inv(fy), WHITE[2] * lab_f_inv(fz)]
}

fn encode_lab([l, a, b]: [f32; 3]) -> [f32; 3] {
    [l / 100.0, a / 256.0 + 0.5, b / 256.0 + 0.5]
}

fn decode_lab([l, a, b]: [f32; 3]) -> [f32; 3] {
    [l * 100.0, (a - 0.5) * 256.0, (b - 0.5) * 256.0]
}

fn lab_to_lch([l, a, b]: [f32; 3]) -> [f32; 3] {
    let h = b.atan2(a).to_degrees();
    [l, a.hypot(b), if h < 0.0 { h + 360.0 } else { h }]
}

fn lch_to_lab([l, c, h]: [f32; 3]) -> [f32; 3] {
    let (sin, cos) = h.to_radians().sin_cos();
    [l, c * cos, c * sin]
}

fn encode_lch([l, c, h]: [f32; 3]) -> [f32; 3] {
    [l / 100.0, c / 200.0, h / 360.0]
}

fn decode_lch([l, c, h]: [f32; 3]) -> [f32; 3] {
    [l * 100.0, c * 200.0, h * 360.0]
}

fn xyz_to_yuv([x, y, z]: [f32; 3]) -> [f32; 3] {
    let denom = x + 15.0 * y + 3.0 * z;
    if denom <= 0.0 {
        return [y, WHITE_UV[0], WHITE_UV[1]];
    }
    [y, 4.0 * x / denom, 9.0 * y / denom]
}

fn yuv_to_xyz([y, u, v]: [f32; 3]) -> [f32; 3] {
    if v <= 0.0 {
        return [0.0, y, 0.0];
    }
    [y * 9.0 * u / (4.0 * v), y, y * (12.0 - 3.0 * u - 20.0 * v) / (4.0 * v)]
}

fn xyz_to_xyy([x, y, z]: [f32; 3]) -> [f32; 3] {
    let sum = x + y + z;
    if sum <= 0.0 {
        return [WHITE_XY[0], WHITE_XY[1], y];
    }
    [x / sum, y / sum, y]
}

fn xyy_to_xyz([x, y, luminance]: [f32; 3]) -> [f32; 3] {
    if y <= 0.0 {
        return [0.0, luminance, 0.0];
    }
    [x * luminance / y, luminance, (1.0 - x - y) * luminance / y]
}

/// Hue in turns, chroma, max and min of an RGB triple.
fn hue([r, g, b]: [f32; 3]) -> (f32, f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    let h = if chroma <= 0.0 {
        0.0
    } else if max == r {
        ((g - b) / chroma).rem_euclid(6.0)
    } else if max == g {
        (b - r) / chroma + 2.0
    } else {
        (r - g) / chroma + 4.0
    };
    (h / 6.0, chroma, max, min)
}

/// RGB from hue (turns), chroma, and the amount added to every component.
fn from_hue(h: f32, chroma: f32, m: f32) -> [f32; 3] {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let x = chroma * (1.0 - (h6.rem_euclid(2.0) - 1.0).abs());
    let [r, g, b] = match h6 as u32 {
        0 => [chroma, x, 0.0],
        1 => [x, chroma, 0.0],
        2 => [0.0, chroma, x],
        3 => [0.0, x, chroma],
        4 => [x, 0.0, chroma],
        _ => [chroma, 0.0, x],
    };
    [r + m, g + m, b + m]
}

fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let (h, chroma, max, _) = hue(rgb);
    let s = if max > 0.0 { chroma / max } else { 0.0 };
    [h, s, max]
}

fn hsv_to_rgb([h, s, v]: [f32; 3]) -> [f32; 3] {
    let chroma = v * s;
    from_hue(h, chroma, v - chroma)
}

fn rgb_to_hsl(rgb: [f32; 3]) -> [f32; 3] {
    let (h, chroma, max, min) = hue(rgb);
    let l = (max + min) / 2.0;
    let denom = 1.0 - (2.0 * l - 1.0).abs();
    let s = if denom > 0.0 { chroma / denom } else { 0.0 };
    [h, s, l]
}

fn hsl_to_rgb([h, s, l]: [f32; 3]) -> [f32; 3] {
    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    from_hue(h, chroma, l - chroma / 2.0)
}

fn rgb_to_cmyk([r, g, b]: [f32; 3]) -> [f32; 4] {
    let k = 1.0 - r.max(g).max(b);
    if k >= 1.0 {
        return [0.0, 0.0, 0.0, 1.0];
    }
    let scale = 1.0 - k;
    [(1.0 - r - k) / scale, (1.0 - g - k) / scale, (1.0 - b - k) / scale, k]
}

fn cmyk_to_rgb([c, m, y, k]: [f32; 4]) -> [f32; 3] {
    [(1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_table() {
        let px = Pixel::rgba(0.1, 0.2, 0.3, 0.4);
        let m = Rec709;
        assert_eq!(m.to_rgba(&px, Color::Gray).data, [0.1, 0.1, 0.1, 1.0]);
        assert_eq!(m.to_rgba(&px, Color::GrayAlpha).data, [0.1, 0.1, 0.1, 0.2]);
        assert_eq!(m.to_rgba(&px, Color::Rgb).data, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(m.to_rgba(&px, Color::Rgba).data, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn reduction_uses_luma() {
        let m = Rec709;
        let white = Pixel::splat(1.0);
        assert!((m.from_rgba(&white, Color::Gray).data[0] - 1.0).abs() < 1e-6);

        let red = Pixel::rgba(1.0, 0.0, 0.0, 0.5);
        let ga = m.from_rgba(&red, Color::GrayAlpha);
        assert!((ga.data[0] - 0.2126).abs() < 1e-6);
        assert_eq!(ga.data[1], 0.5);
        assert_eq!(m.from_rgba(&red, Color::Rgb).data, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn every_space_roundtrips_through_rgba() {
        let m = Rec709;
        let samples = [
            Pixel::rgba(0.8, 0.3, 0.1, 0.25),
            Pixel::rgba(0.2, 0.6, 0.9, 1.0),
            Pixel::rgba(0.5, 0.5, 0.5, 0.5),
            Pixel::rgba(1.0, 1.0, 1.0, 1.0),
        ];
        for color in Color::ALL.into_iter().filter(|c| !matches!(c, Color::Gray | Color::GrayAlpha)) {
            for rgba in &samples {
                let stored = m.from_rgba(rgba, color);
                let back = m.to_rgba(&stored, color);
                let expected_alpha = if color.has_alpha() { rgba.data[3] } else { 1.0 };
                let expected = Pixel::rgba(rgba.data[0], rgba.data[1], rgba.data[2], expected_alpha);
                assert!(back.approx_eq(&expected, 1e-3), "{color}: {rgba:?} -> {stored:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn stored_components_are_normalized() {
        let m = Rec709;
        for color in Color::ALL {
            for rgba in [Pixel::rgba(1.0, 0.0, 0.0, 1.0), Pixel::rgba(0.0, 0.0, 1.0, 1.0), Pixel::rgba(0.3, 0.9, 0.2, 1.0)] {
                let stored = m.from_rgba(&rgba, color);
                for v in &stored.data[..color.channels() as usize] {
                    if color == Color::Xyz || color == Color::XyzA {
                        continue;
                    }
                    assert!((-1e-4..=1.0 + 1e-4).contains(v), "{color}: {stored:?}");
                }
            }
        }
    }

    #[test]
    fn known_values() {
        let m = Rec709;
        let white = Pixel::rgba(1.0, 1.0, 1.0, 1.0);

        let lab = m.from_rgba(&white, Color::Lab);
        assert!(Pixel::rgba(1.0, 0.5, 0.5, 0.0).approx_eq(&lab, 1e-3), "{lab:?}");

        let xyz = m.from_rgba(&white, Color::Xyz);
        assert!(Pixel::rgba(WHITE[0], WHITE[1], WHITE[2], 0.0).approx_eq(&xyz, 1e-3), "{xyz:?}");

        let red = Pixel::rgba(1.0, 0.0, 0.0, 1.0);
        assert_eq!(m.from_rgba(&red, Color::Hsv).data, [0.0, 1.0, 1.0, 0.0]);
        assert_eq!(m.from_rgba(&red, Color::Hsl).data, [0.0, 1.0, 0.5, 0.0]);
        assert_eq!(m.from_rgba(&red, Color::Cmyk).data, [0.0, 1.0, 1.0, 0.0]);

        let black = Pixel::rgba(0.0, 0.0, 0.0, 1.0);
        assert_eq!(m.from_rgba(&black, Color::Cmyk).data, [0.0, 0.0, 0.0, 1.0]);
        let ycbcr = m.from_rgba(&black, Color::Ycbcr);
        assert!(Pixel::rgba(0.0, 0.5, 0.5, 0.0).approx_eq(&ycbcr, 1e-6));
        assert!(m.to_rgba(&m.from_rgba(&black, Color::Xyy), Color::Xyy).approx_eq(&black, 1e-6));
        assert!(m.to_rgba(&m.from_rgba(&black, Color::Yuv), Color::Yuv).approx_eq(&black, 1e-6));
    }
}
