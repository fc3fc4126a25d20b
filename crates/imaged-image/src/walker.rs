//! Parallel per-pixel traversal.

use rayon::prelude::*;

use crate::pixel::Pixel;
use crate::view::{read_pixel, write_pixel, ImageMut, ImageView, ImageViewMut};

/// Apply `f` to every pixel of `image` and store the result.
///
/// One rayon task per row; each task only touches its own scanline. Returns
/// after every row is done. A panic in `f` propagates to the caller.
pub fn for_each_pixel<F>(image: &mut ImageMut<'_>, f: F)
where
    F: Fn(u64, u64, Pixel) -> Pixel + Sync,
{
    let meta = *image.meta();
    let pixel_bytes = meta.pixel_bytes();

    image
        .data_mut()
        .par_chunks_mut(meta.row_bytes())
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..meta.width as usize {
                let at = x * pixel_bytes;
                let mut px = Pixel::new();
                read_pixel(&meta, &row[at..], &mut px);
                let out = f(x as u64, y as u64, px);
                write_pixel(&meta, &mut row[at..], &out);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ImageMeta, SampleType};
    use crate::view::Image;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn halves_a_constant_image() {
        for ty in [SampleType::F32, SampleType::F16, SampleType::U16] {
            let meta = ImageMeta::new(17, 9, 4, ty);
            let mut image = Image::filled(meta, &Pixel::splat(1.0)).unwrap();
            image.for_each_pixel(|_, _, px| px * 0.5);
            for y in 0..9 {
                for x in 0..17 {
                    let px = image.pixel(x, y).unwrap();
                    assert!(px.approx_eq_all(0.5, 1.0 / 65535.0), "{ty} at ({x},{y}): {px:?}");
                }
            }
        }
    }

    #[test]
    fn visits_every_coordinate_once() {
        let mut image = Image::new(ImageMeta::new(8, 5, 1, SampleType::U8)).unwrap();
        let seen = Mutex::new(HashSet::new());
        image.for_each_pixel(|x, y, px| {
            assert!(seen.lock().expect("lock poisoned").insert((x, y)));
            px
        });
        assert_eq!(seen.into_inner().unwrap().len(), 40);
    }

    #[test]
    fn coordinates_match_storage() {
        let mut image = Image::new(ImageMeta::new(6, 4, 2, SampleType::F32)).unwrap();
        image.for_each_pixel(|x, y, _| Pixel::rgba(x as f32, y as f32, 0.0, 0.0));
        assert_eq!(image.pixel(5, 3).unwrap().data, [5.0, 3.0, 0.0, 0.0]);
        assert_eq!(image.pixel(2, 1).unwrap().data, [2.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    #[should_panic]
    fn panics_propagate() {
        let mut image = Image::new(ImageMeta::new(4, 4, 1, SampleType::U8)).unwrap();
        image.for_each_pixel(|_, y, px| {
            if y == 2 {
                panic!("row failed");
            }
            px
        });
    }
}
