use rayon::prelude::*;

use crate::error::ImageResult;
use crate::pixel::Pixel;
use crate::view::{read_pixel, write_pixel, Image, ImageMut, ImageRef, ImageView, ImageViewMut};

pub(crate) fn resize(src: &ImageRef<'_>, width: u64, height: u64) -> ImageResult<Image> {
    let mut out = Image::new(src.meta().resized(width, height))?;
    resample(src, &mut out.as_image_mut());
    Ok(out)
}

pub(crate) fn resize_into(src: &ImageRef<'_>, dst: &mut ImageMut<'_>) -> bool {
    if src.meta().color != dst.meta().color {
        return false;
    }
    resample(src, dst);
    true
}

/// Source sample positions for one axis: lower index, upper index, weight
/// of the upper sample. Pixel centres are aligned and edges clamped.
fn axis_taps(src_len: u64, dst_len: u64) -> Vec<(usize, usize, f32)> {
    let ratio = src_len as f64 / dst_len as f64;
    let last = (src_len - 1) as f64;
    (0..dst_len)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * ratio - 0.5).clamp(0.0, last);
            let lo = pos.floor();
            let hi = (lo + 1.0).min(last);
            (lo as usize, hi as usize, (pos - lo) as f32)
        })
        .collect()
}

fn lerp(a: Pixel, b: Pixel, t: f32) -> Pixel {
    if t == 0.0 {
        return a;
    }
    a * (1.0 - t) + b * t
}

/// Bilinear resample of `src` into `dst`, one parallel unit per output row.
fn resample(src: &ImageRef<'_>, dst: &mut ImageMut<'_>) {
    let src_meta = *src.meta();
    let dst_meta = *dst.meta();
    let xs = axis_taps(src_meta.width, dst_meta.width);
    let ys = axis_taps(src_meta.height, dst_meta.height);
    let src_pixel = src_meta.pixel_bytes();
    let dst_pixel = dst_meta.pixel_bytes();

    let sample = |x: usize, row: &[u8]| {
        let mut px = Pixel::new();
        read_pixel(&src_meta, &row[x * src_pixel..], &mut px);
        px
    };

    dst.data_mut()
        .par_chunks_mut(dst_meta.row_bytes())
        .zip(ys.par_iter())
        .for_each(|(row, &(y0, y1, ty))| {
            let top = src.row(y0 as u64);
            let bottom = src.row(y1 as u64);
            for (x, &(x0, x1, tx)) in xs.iter().enumerate() {
                let upper = lerp(sample(x0, top), sample(x1, top), tx);
                let lower = lerp(sample(x0, bottom), sample(x1, bottom), tx);
                write_pixel(&dst_meta, &mut row[x * dst_pixel..], &lerp(upper, lower, ty));
            }
        });
}
