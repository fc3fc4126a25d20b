use crate::color::{ColorModel, Rec709};
use crate::error::{ImageError, ImageResult};
use crate::meta::{Color, ImageMeta, SampleType};
use crate::pixel::Pixel;
use crate::sample::{read_sample, write_sample};
use crate::{convert, resize, walker};

/// Read access to a typed pixel buffer.
///
/// Implemented by the owned [`Image`] and the borrowed [`ImageRef`] and
/// [`ImageMut`]. Everything beyond [`meta`](Self::meta) and
/// [`data`](Self::data) is provided.
pub trait ImageView {
    fn meta(&self) -> &ImageMeta;

    /// Raw little-endian samples, row-major, `num_bytes()` long.
    fn data(&self) -> &[u8];

    fn width(&self) -> u64 {
        self.meta().width
    }

    fn height(&self) -> u64 {
        self.meta().height
    }

    fn channels(&self) -> u8 {
        self.meta().channels
    }

    fn sample_type(&self) -> SampleType {
        self.meta().ty
    }

    fn num_bytes(&self) -> u64 {
        self.meta().num_bytes()
    }

    fn pixel_bytes(&self) -> usize {
        self.meta().pixel_bytes()
    }

    fn row_bytes(&self) -> usize {
        self.meta().row_bytes()
    }

    /// Scanline `y`. Panics if `y` is out of range.
    fn row(&self, y: u64) -> &[u8] {
        let row_bytes = self.row_bytes();
        let start = y as usize * row_bytes;
        &self.data()[start..start + row_bytes]
    }

    /// Read the pixel at `(x, y)` into `px`.
    ///
    /// Returns `false` when the coordinate is outside the image. Only the
    /// first `channels` components of `px` are written.
    fn get_pixel(&self, x: u64, y: u64, px: &mut Pixel) -> bool {
        let meta = self.meta();
        if !meta.in_bounds(x, y) {
            return false;
        }
        read_pixel(meta, &self.data()[meta.offset(x, y)..], px);
        true
    }

    /// The pixel at `(x, y)` starting from the empty pixel.
    fn pixel(&self, x: u64, y: u64) -> Option<Pixel> {
        let mut px = Pixel::new();
        self.get_pixel(x, y, &mut px).then_some(px)
    }

    fn as_image_ref(&self) -> ImageRef<'_> {
        ImageRef { meta: *self.meta(), data: self.data() }
    }

    /// Owned copy of this buffer.
    fn to_image(&self) -> ImageResult<Image> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data().len())
            .map_err(|_| ImageError::AllocationFailed(self.num_bytes()))?;
        data.extend_from_slice(self.data());
        Ok(Image { meta: *self.meta(), data })
    }

    /// New buffer with the given channel count and sample type, using the
    /// Rec.709 color model. Identical targets produce a byte-identical copy.
    ///
    /// Keeps the color space when the channel count is unchanged; any other
    /// count selects gray or RGB.
    fn convert(&self, channels: u8, ty: SampleType) -> ImageResult<Image> {
        self.convert_with(channels, ty, &Rec709)
    }

    fn convert_with(&self, channels: u8, ty: SampleType, model: &dyn ColorModel) -> ImageResult<Image> {
        let src = self.as_image_ref();
        if Color::from_channels(channels).is_none() {
            return Err(ImageError::ConversionUndefined { from: self.channels(), to: channels });
        }
        convert::convert(&src, src.meta().converted(channels, ty), model)
    }

    /// New buffer in another color space, e.g. RGB to Lab.
    fn convert_color(&self, color: Color, ty: SampleType) -> ImageResult<Image> {
        self.convert_color_with(color, ty, &Rec709)
    }

    fn convert_color_with(&self, color: Color, ty: SampleType, model: &dyn ColorModel) -> ImageResult<Image> {
        let src = self.as_image_ref();
        convert::convert(&src, src.meta().recolored(color, ty), model)
    }

    /// Convert into `dest`, which keeps its own color and type.
    /// Returns `false` if the dimensions differ.
    fn convert_into(&self, dest: &mut impl ImageViewMut) -> bool
    where
        Self: Sized,
    {
        convert::convert_into(&self.as_image_ref(), &mut dest.as_image_mut(), &Rec709)
    }

    /// Bilinear resample to `width` x `height`.
    fn resize(&self, width: u64, height: u64) -> ImageResult<Image> {
        resize::resize(&self.as_image_ref(), width, height)
    }

    /// Resample into `dest`. Returns `false` if the colors differ.
    fn resize_into(&self, dest: &mut impl ImageViewMut) -> bool
    where
        Self: Sized,
    {
        resize::resize_into(&self.as_image_ref(), &mut dest.as_image_mut())
    }

    /// `resize(round(width * fx), round(height * fy))`.
    fn scale(&self, fx: f64, fy: f64) -> ImageResult<Image> {
        let meta = self.meta();
        let width = (meta.width as f64 * fx).round();
        let height = (meta.height as f64 * fy).round();
        if !(width >= 1.0 && height >= 1.0) {
            return Err(ImageError::InvalidMetadata(format!(
                "scale factors {fx}x{fy} produce an empty image"
            )));
        }
        self.resize(width as u64, height as u64)
    }
}

/// Write access to a typed pixel buffer.
pub trait ImageViewMut: ImageView {
    fn data_mut(&mut self) -> &mut [u8];

    fn as_image_mut(&mut self) -> ImageMut<'_> {
        let meta = *self.meta();
        ImageMut { meta, data: self.data_mut() }
    }

    /// Write `px` at `(x, y)`. Returns `false` when out of range.
    ///
    /// Only the first `channels` components are stored. Integer samples are
    /// clamped to their range and rounded to nearest.
    fn set_pixel(&mut self, x: u64, y: u64, px: &Pixel) -> bool {
        let meta = *self.meta();
        if !meta.in_bounds(x, y) {
            return false;
        }
        let offset = meta.offset(x, y);
        write_pixel(&meta, &mut self.data_mut()[offset..], px);
        true
    }

    /// Set every pixel to `px`.
    fn fill(&mut self, px: &Pixel) {
        let meta = *self.meta();
        let pixel_bytes = meta.pixel_bytes();
        let mut encoded = vec![0u8; pixel_bytes];
        write_pixel(&meta, &mut encoded, px);
        for chunk in self.data_mut().chunks_exact_mut(pixel_bytes) {
            chunk.copy_from_slice(&encoded);
        }
    }

    /// Apply `f` to every pixel in parallel, one work unit per row.
    fn for_each_pixel<F>(&mut self, f: F)
    where
        F: Fn(u64, u64, Pixel) -> Pixel + Sync,
        Self: Sized,
    {
        walker::for_each_pixel(&mut self.as_image_mut(), f)
    }

    /// Raise every color component to `gamma_to / gamma_from`. Alpha is
    /// left untouched.
    fn adjust_gamma(&mut self, gamma_from: f32, gamma_to: f32)
    where
        Self: Sized,
    {
        let exponent = gamma_to / gamma_from;
        let color = self.meta().color;
        let color_channels = color.channels() as usize - color.has_alpha() as usize;
        self.for_each_pixel(|_, _, mut px| {
            for v in px.data.iter_mut().take(color_channels) {
                *v = v.max(0.0).powf(exponent);
            }
            px
        });
    }
}

/// Decode the first `channels` samples of `bytes` into `px`.
pub(crate) fn read_pixel(meta: &ImageMeta, bytes: &[u8], px: &mut Pixel) {
    let sample_bytes = meta.ty.bytes();
    for c in 0..meta.channels as usize {
        px.data[c] = read_sample(meta.ty, &bytes[c * sample_bytes..]);
    }
}

/// Encode the first `channels` components of `px` into `bytes`.
pub(crate) fn write_pixel(meta: &ImageMeta, bytes: &mut [u8], px: &Pixel) {
    let sample_bytes = meta.ty.bytes();
    for c in 0..meta.channels as usize {
        write_sample(meta.ty, &mut bytes[c * sample_bytes..], px.data[c]);
    }
}

/// `len` zero bytes, or `AllocationFailed` if the allocator refuses.
pub fn zeroed_buffer(len: u64) -> ImageResult<Vec<u8>> {
    let size = usize::try_from(len).map_err(|_| ImageError::AllocationFailed(len))?;
    let mut data = Vec::new();
    data.try_reserve_exact(size).map_err(|_| ImageError::AllocationFailed(len))?;
    data.resize(size, 0);
    Ok(data)
}

fn check_size(meta: &ImageMeta, len: usize) -> ImageResult<()> {
    meta.validate()?;
    if meta.num_bytes() != len as u64 {
        return Err(ImageError::SizeMismatch { expected: meta.num_bytes(), actual: len as u64 });
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Owned
// ----------------------------------------------------------------------------

/// A buffer that owns its samples. Freed exactly once, on drop.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    meta: ImageMeta,
    data: Vec<u8>,
}

impl Image {
    /// Zero-filled image.
    pub fn new(meta: ImageMeta) -> ImageResult<Self> {
        meta.validate()?;
        Ok(Self { meta, data: zeroed_buffer(meta.num_bytes())? })
    }

    /// Wrap existing samples. `data.len()` must equal `meta.num_bytes()`.
    pub fn from_raw(meta: ImageMeta, data: Vec<u8>) -> ImageResult<Self> {
        check_size(&meta, data.len())?;
        Ok(Self { meta, data })
    }

    /// Image with every pixel set to `px`.
    pub fn filled(meta: ImageMeta, px: &Pixel) -> ImageResult<Self> {
        let mut image = Self::new(meta)?;
        image.fill(px);
        Ok(image)
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

impl ImageView for Image {
    fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl ImageViewMut for Image {
    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

// ----------------------------------------------------------------------------
// Borrowed
// ----------------------------------------------------------------------------

/// Read-only view of samples owned elsewhere.
#[derive(Clone, Copy, Debug)]
pub struct ImageRef<'a> {
    meta: ImageMeta,
    data: &'a [u8],
}

impl<'a> ImageRef<'a> {
    pub fn new(meta: ImageMeta, data: &'a [u8]) -> ImageResult<Self> {
        check_size(&meta, data.len())?;
        Ok(Self { meta, data })
    }

    /// Samples with the full borrow lifetime.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }
}

impl ImageView for ImageRef<'_> {
    fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    fn data(&self) -> &[u8] {
        self.data
    }
}

/// Mutable view of samples owned elsewhere.
#[derive(Debug)]
pub struct ImageMut<'a> {
    meta: ImageMeta,
    data: &'a mut [u8],
}

impl<'a> ImageMut<'a> {
    pub fn new(meta: ImageMeta, data: &'a mut [u8]) -> ImageResult<Self> {
        check_size(&meta, data.len())?;
        Ok(Self { meta, data })
    }

    /// Give up write access, keeping the borrow.
    pub fn into_ref(self) -> ImageRef<'a> {
        ImageRef { meta: self.meta, data: self.data }
    }
}

impl ImageView for ImageMut<'_> {
    fn meta(&self) -> &ImageMeta {
        &self.meta
    }

    fn data(&self) -> &[u8] {
        &*self.data
    }
}

impl ImageViewMut for ImageMut<'_> {
    fn data_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rgb_u8(w: u64, h: u64) -> Image {
        Image::new(ImageMeta::new(w, h, 3, SampleType::U8)).unwrap()
    }

    #[test]
    fn bounds_are_exclusive() {
        let mut image = rgb_u8(4, 3);
        let mut px = Pixel::new();
        let white = Pixel::splat(1.0);

        assert!(image.get_pixel(3, 2, &mut px));
        assert!(image.set_pixel(3, 2, &white));
        assert!(!image.get_pixel(4, 2, &mut px));
        assert!(!image.get_pixel(3, 3, &mut px));
        assert!(!image.get_pixel(u64::MAX, 0, &mut px));
        assert!(!image.set_pixel(4, 0, &white));
        assert!(!image.set_pixel(0, 3, &white));
    }

    #[test]
    fn components_beyond_channels_are_untouched() {
        let mut image = Image::new(ImageMeta::new(2, 2, 1, SampleType::F32)).unwrap();
        image.set_pixel(1, 1, &Pixel::splat(0.25));

        let mut px = Pixel::rgba(9.0, 8.0, 7.0, 6.0);
        assert!(image.get_pixel(1, 1, &mut px));
        assert_eq!(px.data, [0.25, 8.0, 7.0, 6.0]);

        let fresh = image.pixel(1, 1).unwrap();
        assert_eq!(fresh.data, [0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn set_pixel_writes_expected_offset() {
        let mut image = rgb_u8(4, 4);
        image.set_pixel(1, 2, &Pixel::rgb(1.0, 0.0, 1.0));
        let offset = ((2 * 4 + 1) * 3) as usize;
        assert_eq!(&image.data()[offset..offset + 3], &[255, 0, 255]);
        assert_eq!(image.data().iter().filter(|b| **b != 0).count(), 2);
    }

    #[test]
    fn from_raw_checks_length() {
        let meta = ImageMeta::new(2, 2, 3, SampleType::U8);
        assert!(Image::from_raw(meta, vec![0; 12]).is_ok());
        assert!(matches!(
            Image::from_raw(meta, vec![0; 11]),
            Err(ImageError::SizeMismatch { expected: 12, actual: 11 })
        ));
        assert!(Image::new(ImageMeta::new(0, 2, 3, SampleType::U8)).is_err());
    }

    #[test]
    fn borrowed_views_share_storage() {
        let mut image = rgb_u8(2, 2);
        {
            let mut view = image.as_image_mut();
            view.set_pixel(0, 0, &Pixel::gray(1.0));
        }
        let view = image.as_image_ref();
        assert_eq!(view.pixel(0, 0).unwrap().data, [1.0, 1.0, 1.0, 0.0]);
        assert_eq!(view.num_bytes(), 12);
        assert_eq!(view.row(1), &[0u8; 6]);
    }

    #[test]
    fn fill_sets_every_pixel() {
        let meta = ImageMeta::new(3, 2, 4, SampleType::U16);
        let image = Image::filled(meta, &Pixel::rgba(1.0, 0.0, 1.0, 1.0)).unwrap();
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(image.pixel(x, y).unwrap().data, [1.0, 0.0, 1.0, 1.0]);
            }
        }
    }

    #[test]
    fn scale_rounds_dimensions() {
        let image = rgb_u8(10, 4);
        let scaled = image.scale(0.25, 1.5).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (3, 6));
        assert!(image.scale(0.0, 1.0).is_err());
    }

    #[test]
    fn gamma_leaves_alpha_alone() {
        let meta = ImageMeta::new(2, 1, 4, SampleType::F32);
        let mut image = Image::filled(meta, &Pixel::rgba(0.25, 0.25, 0.25, 0.25)).unwrap();
        image.adjust_gamma(1.0, 2.0);
        let px = image.pixel(1, 0).unwrap();
        assert!(px.approx_eq(&Pixel::rgba(0.0625, 0.0625, 0.0625, 0.25), 1e-6));
        assert_eq!(px.data[3], 0.25);
    }

    #[test]
    fn gamma_touches_every_cmyk_component() {
        let meta = ImageMeta::with_color(1, 1, Color::Cmyk, SampleType::F32);
        let mut image = Image::filled(meta, &Pixel::splat(0.5)).unwrap();
        image.adjust_gamma(1.0, 2.0);
        assert!(image.pixel(0, 0).unwrap().approx_eq_all(0.25, 1e-6));
    }

    #[test]
    fn oversized_buffers_fail_instead_of_aborting() {
        let huge = ImageMeta::new(1 << 40, 1 << 20, 1, SampleType::U8);
        assert!(huge.validate().is_ok());
        assert!(matches!(Image::new(huge), Err(ImageError::AllocationFailed(n)) if n == 1 << 60));

        let image = rgb_u8(2, 2);
        assert!(matches!(image.resize(1 << 40, 1 << 20), Err(ImageError::AllocationFailed(_))));
        assert!(matches!(zeroed_buffer(u64::MAX), Err(ImageError::AllocationFailed(_))));
        assert_eq!(zeroed_buffer(3).unwrap(), vec![0, 0, 0]);
    }

    proptest! {
        #[test]
        fn set_then_get_within_quantization(
            r in 0.0f32..=1.0,
            g in 0.0f32..=1.0,
            b in 0.0f32..=1.0,
            a in 0.0f32..=1.0,
            ty_idx in 0usize..SampleType::ALL.len(),
        ) {
            let ty = SampleType::ALL[ty_idx];
            let tolerance = match ty {
                SampleType::UInt(bits) if bits <= 16 => 1.0 / ((1u64 << bits) - 1) as f32,
                SampleType::Float(16) => 1.0e-3,
                _ => 1.0e-6,
            };
            let mut image = Image::new(ImageMeta::new(3, 3, 4, ty)).unwrap();
            let input = Pixel::rgba(r, g, b, a);
            prop_assert!(image.set_pixel(2, 1, &input));
            let output = image.pixel(2, 1).unwrap();
            prop_assert!(output.approx_eq(&input, tolerance), "{:?} vs {:?}", output, input);
        }
    }
}
