use serde::{Deserialize, Serialize};

/// Number of components held by every [`Pixel`].
pub const PIXEL_COMPONENTS: usize = 4;

/// A normalized 4-component sample, independent of storage precision.
///
/// Integer samples are scaled into `[0, 1]` when read; float samples are
/// passed through. The empty pixel is `0.0` in every slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    pub data: [f32; PIXEL_COMPONENTS],
}

impl Pixel {
    /// The empty pixel.
    pub const fn new() -> Self {
        Self { data: [0.0; PIXEL_COMPONENTS] }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { data: [r, g, b, a] }
    }

    /// Opaque RGB pixel.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Opaque gray pixel, luminance broadcast to R, G and B.
    pub const fn gray(v: f32) -> Self {
        Self::rgba(v, v, v, 1.0)
    }

    /// Same value in all four slots.
    pub const fn splat(v: f32) -> Self {
        Self { data: [v; PIXEL_COMPONENTS] }
    }

    /// Component at `index`, or `0.0` when the index is out of range.
    pub fn get(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }

    /// Set the component at `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: f32) {
        if let Some(slot) = self.data.get_mut(index) {
            *slot = value;
        }
    }

    /// Clamp every component into `[0, 1]`.
    pub fn clamp(&mut self) {
        for v in &mut self.data {
            *v = v.clamp(0.0, 1.0);
        }
    }

    /// Clamped copy.
    pub fn clamped(mut self) -> Self {
        self.clamp();
        self
    }

    /// Apply `f` to each component.
    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self { data: self.data.map(f) }
    }

    /// Sum of all components.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// True when every component of `self` and `other` differ by at most `eps`.
    pub fn approx_eq(&self, other: &Pixel, eps: f32) -> bool {
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }

    /// True when every component is within `eps` of `v`.
    pub fn approx_eq_all(&self, v: f32, eps: f32) -> bool {
        self.data.iter().all(|c| (c - v).abs() <= eps)
    }
}

impl From<[f32; PIXEL_COMPONENTS]> for Pixel {
    fn from(data: [f32; PIXEL_COMPONENTS]) -> Self {
        Self { data }
    }
}

impl From<Pixel> for [f32; PIXEL_COMPONENTS] {
    fn from(px: Pixel) -> Self {
        px.data
    }
}

macro_rules! componentwise_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl std::ops::$trait for Pixel {
            type Output = Pixel;
            fn $method(self, rhs: Pixel) -> Pixel {
                let mut out = self;
                for (a, b) in out.data.iter_mut().zip(rhs.data) {
                    *a = *a $op b;
                }
                out
            }
        }

        impl std::ops::$trait<f32> for Pixel {
            type Output = Pixel;
            fn $method(self, rhs: f32) -> Pixel {
                self.map(|a| a $op rhs)
            }
        }

        impl std::ops::$assign_trait for Pixel {
            fn $assign_method(&mut self, rhs: Pixel) {
                *self = *self $op rhs;
            }
        }
    };
}

componentwise_op!(Add, add, AddAssign, add_assign, +);
componentwise_op!(Sub, sub, SubAssign, sub_assign, -);
componentwise_op!(Mul, mul, MulAssign, mul_assign, *);
componentwise_op!(Div, div, DivAssign, div_assign, /);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pixel_is_zero() {
        assert_eq!(Pixel::new().data, [0.0; 4]);
        assert_eq!(Pixel::default(), Pixel::new());
    }

    #[test]
    fn constructors() {
        assert_eq!(Pixel::gray(0.5).data, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(Pixel::rgb(0.1, 0.2, 0.3).data, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(Pixel::splat(2.0).data, [2.0; 4]);
    }

    #[test]
    fn out_of_range_index_is_lenient() {
        let mut px = Pixel::rgba(1.0, 2.0, 3.0, 4.0);
        assert_eq!(px.get(3), 4.0);
        assert_eq!(px.get(4), 0.0);
        assert_eq!(px.get(usize::MAX), 0.0);

        px.set(7, 9.0);
        assert_eq!(px.data, [1.0, 2.0, 3.0, 4.0]);
        px.set(0, 9.0);
        assert_eq!(px.get(0), 9.0);
    }

    #[test]
    fn clamp_bounds_components() {
        let px = Pixel::rgba(-1.0, 0.5, 2.0, 1.0).clamped();
        assert_eq!(px.data, [0.0, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn arithmetic_is_componentwise() {
        let a = Pixel::rgba(1.0, 2.0, 3.0, 4.0);
        let b = Pixel::splat(2.0);
        assert_eq!((a + b).data, [3.0, 4.0, 5.0, 6.0]);
        assert_eq!((a - b).data, [-1.0, 0.0, 1.0, 2.0]);
        assert_eq!((a * b).data, [2.0, 4.0, 6.0, 8.0]);
        assert_eq!((a / b).data, [0.5, 1.0, 1.5, 2.0]);
        assert_eq!((a * 0.5).data, [0.5, 1.0, 1.5, 2.0]);

        let mut c = a;
        c += b;
        assert_eq!(c.sum(), 18.0);
    }

    #[test]
    fn approx_comparisons() {
        let a = Pixel::splat(0.5);
        assert!(a.approx_eq(&Pixel::splat(0.5001), 1e-3));
        assert!(!a.approx_eq(&Pixel::splat(0.6), 1e-3));
        assert!(a.approx_eq_all(0.5, 0.0));
    }
}
