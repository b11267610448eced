//! The pyramid/slab data model and the TIFF/GeoTIFF/BIL encoders that turn
//! a resampled [`rok4_image::Image`] into the final response byte stream.

pub mod bil;
pub mod pyramid;
pub mod slab;
pub mod tiff;

pub use bil::BilEncoder;
pub use pyramid::{Level, PixelFormat, Pyramid};
pub use slab::SlabHeader;
pub use tiff::{GeoTiffParams, GeoTiffProjection, TiffEncoder};
