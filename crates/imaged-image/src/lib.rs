//! Typed pixel buffers for the imaged store.
//!
//! A buffer is an [`ImageMeta`] (width, height, [`Color`], sample type)
//! plus raw little-endian samples in row-major order. Pixels are exchanged
//! as a normalized four-component [`Pixel`] regardless of storage precision.
//!
//! # Buffer Types
//!
//! - [`Image`] -- owns its samples, freed on drop
//! - [`ImageRef`] -- read-only borrow, tied to whatever owns the bytes
//! - [`ImageMut`] -- mutable borrow
//!
//! All three implement [`ImageView`]; the writable ones also implement
//! [`ImageViewMut`]. Accessors are bounds-checked and report out-of-range
//! coordinates as `false` rather than an error.
//!
//! # Operations
//!
//! - color space and type conversion through a [`ColorModel`] (default [`Rec709`])
//! - bilinear resampling with pixel-centre alignment
//! - parallel per-row traversal with [`ImageViewMut::for_each_pixel`]
//! - file import/export through [`io`]

mod convert;
mod resize;

pub mod color;
pub mod error;
pub mod io;
pub mod meta;
pub mod pixel;
pub mod sample;
pub mod view;
pub mod walker;

pub use color::{ColorModel, Rec709};
pub use error::{ImageError, ImageResult};
pub use meta::{Color, ImageMeta, SampleType, MAX_CHANNELS};
pub use pixel::{Pixel, PIXEL_COMPONENTS};
pub use view::{Image, ImageMut, ImageRef, ImageView, ImageViewMut};
