//! Conventional image files in and out of pixel buffers.
//!
//! - `decode`: read a PNG/JPEG/TIFF/etc. into an owned buffer, optionally
//!   converting to a requested layout.
//! - `encode`: write a buffer to a file, format from the extension.
//! - `encode_to_vec`: encode into memory for a named format.
//!
//! Codecs only understand gray and RGB. Other color spaces are converted to
//! RGB (or RGBA when they carry alpha) on the way out.

use std::io::Cursor;
use std::path::Path;

use image::{ColorType, DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb, Rgba};
use tracing::debug;

use crate::error::{ImageError, ImageResult};
use crate::meta::{Color, ImageMeta, SampleType};
use crate::view::{Image, ImageView};

/// Read an image file. `color` and `ty` select the stored layout; `None`
/// keeps whatever the file holds.
pub fn decode(path: &Path, color: Option<Color>, ty: Option<SampleType>) -> ImageResult<Image> {
    let dynamic = image::open(path)
        .map_err(|e| ImageError::DecodeFailed(format!("{}: {e}", path.display())))?;
    let decoded = from_dynamic(dynamic)?;
    debug!(path = %path.display(), meta = %decoded.meta(), "decoded image");

    let color = color.unwrap_or(decoded.meta().color);
    let ty = ty.unwrap_or(decoded.sample_type());
    if color == decoded.meta().color && ty == decoded.sample_type() {
        return Ok(decoded);
    }
    decoded.convert_color(color, ty)
}

/// Write `view` to `path`. The format is inferred from the extension.
pub fn encode(view: &impl ImageView, path: &Path) -> ImageResult<()> {
    let format = ImageFormat::from_path(path)
        .map_err(|e| ImageError::EncodeFailed(format!("{}: {e}", path.display())))?;
    let dynamic = to_dynamic(view, format)?;
    dynamic
        .save_with_format(path, format)
        .map_err(|e| ImageError::EncodeFailed(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), ?format, "encoded image");
    Ok(())
}

/// Encode `view` in memory. `format` is an extension such as `png` or `jpg`.
pub fn encode_to_vec(view: &impl ImageView, format: &str) -> ImageResult<Vec<u8>> {
    let format = ImageFormat::from_extension(format)
        .ok_or_else(|| ImageError::EncodeFailed(format!("unknown format: {format}")))?;
    let dynamic = to_dynamic(view, format)?;
    let mut out = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut out, format)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    Ok(out.into_inner())
}

fn from_dynamic(dynamic: DynamicImage) -> ImageResult<Image> {
    let (width, height) = (dynamic.width() as u64, dynamic.height() as u64);
    let (channels, ty, data) = match dynamic.color() {
        ColorType::L8 => (1, SampleType::U8, dynamic.into_luma8().into_raw()),
        ColorType::La8 => (2, SampleType::U8, dynamic.into_luma_alpha8().into_raw()),
        ColorType::Rgb8 => (3, SampleType::U8, dynamic.into_rgb8().into_raw()),
        ColorType::Rgba8 => (4, SampleType::U8, dynamic.into_rgba8().into_raw()),
        ColorType::L16 => (1, SampleType::U16, u16_bytes(dynamic.into_luma16().into_raw())),
        ColorType::La16 => (2, SampleType::U16, u16_bytes(dynamic.into_luma_alpha16().into_raw())),
        ColorType::Rgb16 => (3, SampleType::U16, u16_bytes(dynamic.into_rgb16().into_raw())),
        ColorType::Rgba16 => (4, SampleType::U16, u16_bytes(dynamic.into_rgba16().into_raw())),
        ColorType::Rgb32F => (3, SampleType::F32, f32_bytes(dynamic.into_rgb32f().into_raw())),
        _ => (4, SampleType::F32, f32_bytes(dynamic.into_rgba32f().into_raw())),
    };
    Image::from_raw(ImageMeta::new(width, height, channels, ty), data)
}

/// Build an encoder-ready image. Output is 8 bits per sample, or 16 for
/// PNG and TIFF when the source is wider than 8 bits. JPEG drops alpha.
fn to_dynamic(view: &impl ImageView, format: ImageFormat) -> ImageResult<DynamicImage> {
    let meta = view.meta();
    let width = u32::try_from(meta.width)
        .map_err(|_| ImageError::EncodeFailed(format!("width {} too large", meta.width)))?;
    let height = u32::try_from(meta.height)
        .map_err(|_| ImageError::EncodeFailed(format!("height {} too large", meta.height)))?;

    let mut color = meta.color.display_color();
    if format == ImageFormat::Jpeg {
        color = color.with_alpha(false).unwrap_or(color);
    }
    let channels = color.channels();
    let wide = meta.ty.bits() > 8 && matches!(format, ImageFormat::Png | ImageFormat::Tiff);
    let ty = if wide { SampleType::U16 } else { SampleType::U8 };
    let converted = view.convert_color(color, ty)?.into_raw();

    let dynamic = if wide {
        let data: Vec<u16> = converted
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        match channels {
            1 => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, data).map(DynamicImage::ImageLuma16),
            2 => ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, data).map(DynamicImage::ImageLumaA16),
            3 => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgb16),
            _ => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgba16),
        }
    } else {
        let data = converted;
        match channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            _ => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        }
    };
    dynamic.ok_or_else(|| ImageError::EncodeFailed("buffer smaller than dimensions".to_string()))
}

fn u16_bytes(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_le_bytes).collect()
}

fn f32_bytes(samples: Vec<f32>) -> Vec<u8> {
    samples.into_iter().flat_map(f32::to_le_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Pixel;
    use crate::view::ImageViewMut;

    fn checker(channels: u8, ty: SampleType) -> Image {
        let mut image = Image::new(ImageMeta::new(6, 4, channels, ty)).unwrap();
        image.for_each_pixel(|x, y, _| {
            if (x + y) % 2 == 0 {
                Pixel::rgba(1.0, 0.0, 1.0, 1.0)
            } else {
                Pixel::rgba(0.0, 1.0, 0.0, 1.0)
            }
        });
        image
    }

    #[test]
    fn png_roundtrip_keeps_u8_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let image = checker(3, SampleType::U8);
        encode(&image, &path).unwrap();

        let decoded = decode(&path, None, None).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn wide_sources_encode_as_16_bit_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        encode(&checker(4, SampleType::F32), &path).unwrap();

        let decoded = decode(&path, None, None).unwrap();
        assert_eq!(decoded.sample_type(), SampleType::U16);
        assert_eq!(decoded.channels(), 4);
        assert_eq!(decoded.pixel(0, 0).unwrap().data, [1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn decode_converts_to_requested_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        encode(&checker(3, SampleType::U8), &path).unwrap();

        let decoded = decode(&path, Some(Color::Gray), Some(SampleType::F32)).unwrap();
        assert_eq!(decoded.channels(), 1);
        assert_eq!(decoded.sample_type(), SampleType::F32);

        let lab = decode(&path, Some(Color::Lab), None).unwrap();
        assert_eq!(lab.meta().color, Color::Lab);
        assert_eq!(lab.sample_type(), SampleType::U8);
    }

    #[test]
    fn jpeg_drops_alpha() {
        let bytes = encode_to_vec(&checker(4, SampleType::U8), "jpg").unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!(decoded.width(), 6);
    }

    #[test]
    fn other_color_spaces_export_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hsv.png");
        let hsv = checker(3, SampleType::F32).convert_color(Color::Hsv, SampleType::F32).unwrap();
        encode(&hsv, &path).unwrap();

        let decoded = decode(&path, None, None).unwrap();
        assert_eq!(decoded.meta().color, Color::Rgb);
        assert_eq!(decoded.pixel(0, 0).unwrap().data, [1.0, 0.0, 1.0, 0.0]);
        assert_eq!(decoded.pixel(1, 0).unwrap().data, [0.0, 1.0, 0.0, 0.0]);

        let cmyk = checker(3, SampleType::U8).convert_color(Color::Cmyk, SampleType::U8).unwrap();
        let bytes = encode_to_vec(&cmyk, "png").unwrap();
        assert_eq!(image::load_from_memory(&bytes).unwrap().color(), ColorType::Rgb8);
    }

    #[test]
    fn failures_map_to_codec_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(decode(&missing, None, None), Err(ImageError::DecodeFailed(_))));

        let image = checker(1, SampleType::U8);
        assert!(matches!(encode_to_vec(&image, "nope"), Err(ImageError::EncodeFailed(_))));
        assert!(matches!(
            encode(&image, &dir.path().join("file.unknown")),
            Err(ImageError::EncodeFailed(_))
        ));
    }
}
