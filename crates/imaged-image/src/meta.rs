use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ImageResult};

/// Maximum number of channels a stored image may carry.
pub const MAX_CHANNELS: u8 = 4;

/// Numeric representation of one sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// Unsigned integer of the given bit width (8, 16, 32 or 64).
    UInt(u8),
    /// IEEE float of the given bit width (16, 32 or 64).
    Float(u8),
}

impl SampleType {
    pub const U8: Self = Self::UInt(8);
    pub const U16: Self = Self::UInt(16);
    pub const U32: Self = Self::UInt(32);
    pub const U64: Self = Self::UInt(64);
    pub const F16: Self = Self::Float(16);
    pub const F32: Self = Self::Float(32);
    pub const F64: Self = Self::Float(64);

    /// Every supported sample type.
    pub const ALL: [Self; 7] = [
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F16,
        Self::F32,
        Self::F64,
    ];

    pub fn bits(&self) -> u8 {
        match *self {
            Self::UInt(bits) | Self::Float(bits) => bits,
        }
    }

    /// Bytes occupied by a single sample.
    pub fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    pub fn is_valid(&self) -> bool {
        matches!(*self, Self::UInt(8 | 16 | 32 | 64) | Self::Float(16 | 32 | 64))
    }

    /// Short name, e.g. `u8` or `f32`. Invalid types are reported as `invalid`.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::UInt(8) => "u8",
            Self::UInt(16) => "u16",
            Self::UInt(32) => "u32",
            Self::UInt(64) => "u64",
            Self::Float(16) => "f16",
            Self::Float(32) => "f32",
            Self::Float(64) => "f64",
            _ => "invalid",
        }
    }

    /// Parse a type name. Accepts the short names plus the long aliases
    /// `uint8`..`uint64`, `half`, `float` and `double`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Some(Self::U8),
            "u16" | "uint16" => Some(Self::U16),
            "u32" | "uint32" => Some(Self::U32),
            "u64" | "uint64" => Some(Self::U64),
            "f16" | "half" => Some(Self::F16),
            "f32" | "float" => Some(Self::F32),
            "f64" | "double" => Some(Self::F64),
            _ => None,
        }
    }

    /// Wire/disk tag for the numeric kind.
    pub fn kind_byte(&self) -> u8 {
        match self {
            Self::UInt(_) => 0,
            Self::Float(_) => 1,
        }
    }

    /// Rebuild from a kind tag and bit width. Returns `None` for unknown tags
    /// or unsupported widths.
    pub fn from_parts(kind: u8, bits: u8) -> Option<Self> {
        let ty = match kind {
            0 => Self::UInt(bits),
            1 => Self::Float(bits),
            _ => return None,
        };
        ty.is_valid().then_some(ty)
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SampleType {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ImageError::InvalidMetadata(format!("unknown type: {s}")))
    }
}

/// Color space of the stored components.
///
/// Every color fits in [`MAX_CHANNELS`] components. Alpha, when present, is
/// always the last one. Components are stored normalized so that integer
/// sample types can hold them; see [`ColorModel`](crate::ColorModel) for the
/// encoding of each space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    Cmyk,
    Ycbcr,
    YcbcrA,
    Lab,
    LabA,
    Lch,
    LchA,
    Xyz,
    XyzA,
    Yuv,
    YuvA,
    Hsl,
    HslA,
    Hsv,
    HsvA,
    Xyy,
    XyyA,
}

impl Color {
    /// Every supported color.
    pub const ALL: [Self; 21] = [
        Self::Gray,
        Self::GrayAlpha,
        Self::Rgb,
        Self::Rgba,
        Self::Cmyk,
        Self::Ycbcr,
        Self::YcbcrA,
        Self::Lab,
        Self::LabA,
        Self::Lch,
        Self::LchA,
        Self::Xyz,
        Self::XyzA,
        Self::Yuv,
        Self::YuvA,
        Self::Hsl,
        Self::HslA,
        Self::Hsv,
        Self::HsvA,
        Self::Xyy,
        Self::XyyA,
    ];

    pub fn channels(&self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Cmyk => 4,
            c if c.has_alpha() => 4,
            _ => 3,
        }
    }

    /// The gray/RGB color for a channel count.
    pub fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(Self::Gray),
            2 => Some(Self::GrayAlpha),
            3 => Some(Self::Rgb),
            4 => Some(Self::Rgba),
            _ => None,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(
            self,
            Self::GrayAlpha
                | Self::Rgba
                | Self::YcbcrA
                | Self::LabA
                | Self::LchA
                | Self::XyzA
                | Self::YuvA
                | Self::HslA
                | Self::HsvA
                | Self::XyyA
        )
    }

    /// Same space with alpha added or removed. `None` for CMYK with alpha,
    /// which would need five channels.
    pub fn with_alpha(&self, alpha: bool) -> Option<Self> {
        let (plain, with) = match self {
            Self::Gray | Self::GrayAlpha => (Self::Gray, Self::GrayAlpha),
            Self::Rgb | Self::Rgba => (Self::Rgb, Self::Rgba),
            Self::Cmyk => return (!alpha).then_some(Self::Cmyk),
            Self::Ycbcr | Self::YcbcrA => (Self::Ycbcr, Self::YcbcrA),
            Self::Lab | Self::LabA => (Self::Lab, Self::LabA),
            Self::Lch | Self::LchA => (Self::Lch, Self::LchA),
            Self::Xyz | Self::XyzA => (Self::Xyz, Self::XyzA),
            Self::Yuv | Self::YuvA => (Self::Yuv, Self::YuvA),
            Self::Hsl | Self::HslA => (Self::Hsl, Self::HslA),
            Self::Hsv | Self::HsvA => (Self::Hsv, Self::HsvA),
            Self::Xyy | Self::XyyA => (Self::Xyy, Self::XyyA),
        };
        Some(if alpha { with } else { plain })
    }

    /// Gray or RGB, with or without alpha.
    pub fn is_display(&self) -> bool {
        matches!(self, Self::Gray | Self::GrayAlpha | Self::Rgb | Self::Rgba)
    }

    /// The gray/RGB color an encoder can write for this space.
    pub fn display_color(&self) -> Self {
        match (self.is_display(), self.has_alpha()) {
            (true, _) => *self,
            (false, true) => Self::Rgba,
            (false, false) => Self::Rgb,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gray => "gray",
            Self::GrayAlpha => "graya",
            Self::Rgb => "rgb",
            Self::Rgba => "rgba",
            Self::Cmyk => "cmyk",
            Self::Ycbcr => "ycbcr",
            Self::YcbcrA => "ycbcra",
            Self::Lab => "lab",
            Self::LabA => "laba",
            Self::Lch => "lch",
            Self::LchA => "lcha",
            Self::Xyz => "xyz",
            Self::XyzA => "xyza",
            Self::Yuv => "yuv",
            Self::YuvA => "yuva",
            Self::Hsl => "hsl",
            Self::HslA => "hsla",
            Self::Hsv => "hsv",
            Self::HsvA => "hsva",
            Self::Xyy => "xyy",
            Self::XyyA => "xyya",
        }
    }

    /// Parse a color name or a bare channel count (`1`..`4`, meaning
    /// gray/RGB). Case-insensitive; `grey`, `y'cbcr` and `cielab`-style
    /// spellings are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase().replace(['\'', ' ', '_', '-'], "");
        let name = lower.strip_prefix("cie").unwrap_or(&lower);
        match name {
            "grey" | "y" => Some(Self::Gray),
            "greya" | "ya" => Some(Self::GrayAlpha),
            other => Self::ALL
                .iter()
                .copied()
                .find(|c| c.name() == other)
                .or_else(|| other.parse::<u8>().ok().and_then(Self::from_channels)),
        }
    }

    /// On-disk tag.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Rgb => 3,
            Self::Rgba => 4,
            Self::Cmyk => 5,
            Self::Ycbcr => 7,
            Self::YcbcrA => 8,
            Self::Lab => 9,
            Self::LabA => 10,
            Self::Lch => 11,
            Self::LchA => 12,
            Self::Xyz => 13,
            Self::XyzA => 14,
            Self::Yuv => 15,
            Self::YuvA => 16,
            Self::Hsl => 17,
            Self::HslA => 18,
            Self::Hsv => 19,
            Self::HsvA => 20,
            Self::Xyy => 21,
            Self::XyyA => 22,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.tag() == tag)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Color {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ImageError::InvalidMetadata(format!("unknown color: {s}")))
    }
}

/// Shape and sample type of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageMeta {
    pub width: u64,
    pub height: u64,
    /// Always `color.channels()` for valid metadata.
    pub channels: u8,
    pub color: Color,
    pub ty: SampleType,
}

impl ImageMeta {
    /// Gray or RGB metadata for `channels` components.
    pub fn new(width: u64, height: u64, channels: u8, ty: SampleType) -> Self {
        let color = Color::from_channels(channels).unwrap_or(Color::Gray);
        Self { width, height, channels, color, ty }
    }

    /// Metadata for the given color space.
    pub fn with_color(width: u64, height: u64, color: Color, ty: SampleType) -> Self {
        Self { width, height, channels: color.channels(), color, ty }
    }

    /// Check every invariant, including that the byte size fits in memory.
    pub fn validate(&self) -> ImageResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::InvalidMetadata(format!(
                "dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ImageError::InvalidMetadata(format!(
                "channel count must be in 1..={MAX_CHANNELS}, got {}",
                self.channels
            )));
        }
        if self.color.channels() != self.channels {
            return Err(ImageError::InvalidMetadata(format!(
                "color {} has {} channels, not {}",
                self.color,
                self.color.channels(),
                self.channels
            )));
        }
        if !self.ty.is_valid() {
            return Err(ImageError::InvalidMetadata(format!(
                "unsupported sample type {:?}",
                self.ty
            )));
        }
        let total = self.checked_num_bytes().ok_or_else(|| {
            ImageError::InvalidMetadata(format!(
                "{}x{}x{} {} overflows the addressable size",
                self.width, self.height, self.channels, self.ty
            ))
        })?;
        usize::try_from(total).map_err(|_| {
            ImageError::InvalidMetadata(format!("{total} bytes exceeds the addressable size"))
        })?;
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn num_pixels(&self) -> u64 {
        self.width * self.height
    }

    /// Bytes per pixel: `channels * bits / 8`.
    pub fn pixel_bytes(&self) -> usize {
        self.channels as usize * self.ty.bytes()
    }

    /// Bytes per scanline.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_bytes()
    }

    /// `width * height * channels * bits / 8`.
    ///
    /// Callers must have validated the metadata; use
    /// [`checked_num_bytes`](Self::checked_num_bytes) for untrusted input.
    pub fn num_bytes(&self) -> u64 {
        self.width * self.height * self.channels as u64 * self.ty.bytes() as u64
    }

    pub fn checked_num_bytes(&self) -> Option<u64> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.channels as u64)?
            .checked_mul(self.ty.bytes() as u64)
    }

    /// Byte offset of the first sample of `(x, y)`. No bounds check.
    pub fn offset(&self, x: u64, y: u64) -> usize {
        ((y * self.width + x) * self.channels as u64) as usize * self.ty.bytes()
    }

    pub fn in_bounds(&self, x: u64, y: u64) -> bool {
        x < self.width && y < self.height
    }

    /// Copy with different dimensions.
    pub fn resized(&self, width: u64, height: u64) -> Self {
        Self { width, height, ..*self }
    }

    /// Copy with a different channel count and sample type. Keeps the color
    /// space when the count is unchanged, otherwise switches to gray/RGB.
    pub fn converted(&self, channels: u8, ty: SampleType) -> Self {
        if channels == self.channels {
            return Self { ty, ..*self };
        }
        Self::new(self.width, self.height, channels, ty)
    }

    /// Copy in a different color space and sample type.
    pub fn recolored(&self, color: Color, ty: SampleType) -> Self {
        Self::with_color(self.width, self.height, color, ty)
    }
}

impl std::fmt::Display for ImageMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} {} {}", self.width, self.height, self.color, self.ty)
    }
}
