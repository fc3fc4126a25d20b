use rayon::prelude::*;

use crate::color::ColorModel;
use crate::error::ImageResult;
use crate::meta::ImageMeta;
use crate::pixel::Pixel;
use crate::view::{read_pixel, write_pixel, Image, ImageMut, ImageRef, ImageView, ImageViewMut};

pub(crate) fn convert(src: &ImageRef<'_>, target: ImageMeta, model: &dyn ColorModel) -> ImageResult<Image> {
    if target == *src.meta() {
        return src.to_image();
    }
    let mut out = Image::new(target)?;
    remap_rows(src, &mut out.as_image_mut(), model);
    Ok(out)
}

pub(crate) fn convert_into(src: &ImageRef<'_>, dst: &mut ImageMut<'_>, model: &dyn ColorModel) -> bool {
    if src.width() != dst.width() || src.height() != dst.height() {
        return false;
    }
    if src.meta() == dst.meta() {
        dst.data_mut().copy_from_slice(src.data());
        return true;
    }
    remap_rows(src, dst, model);
    true
}

/// Expand each source pixel to RGBA and reduce it into the destination
/// color. Rows are processed in parallel.
fn remap_rows(src: &ImageRef<'_>, dst: &mut ImageMut<'_>, model: &dyn ColorModel) {
    let src_meta = *src.meta();
    let dst_meta = *dst.meta();
    let src_pixel = src_meta.pixel_bytes();
    let dst_pixel = dst_meta.pixel_bytes();

    dst.data_mut()
        .par_chunks_mut(dst_meta.row_bytes())
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = src.row(y as u64);
            let mut px = Pixel::new();
            for x in 0..src_meta.width as usize {
                read_pixel(&src_meta, &src_row[x * src_pixel..], &mut px);
                let rgba = model.to_rgba(&px, src_meta.color);
                write_pixel(&dst_meta, &mut row[x * dst_pixel..], &model.from_rgba(&rgba, dst_meta.color));
            }
        });
}
