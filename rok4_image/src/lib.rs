//! A pull-based image-operator graph.
//!
//! Every node implements [`Image`]: a source of scanlines in one of three
//! sample formats, aware of its own dimensions, CRS and bounding box. Leaf
//! nodes ([`BasicImage`]) wrap decoded or synthetic buffers; operator nodes
//! (decimation, merge, mirror, palette, terrain, grid-based reprojection)
//! wrap one or more upstream `Arc<dyn Image>` sources and compute their own
//! lines on demand, so a pyramid request pulls exactly the source data it
//! needs and nothing is materialized ahead of time.

pub mod decimated;
pub mod grid;
pub mod image;
pub mod kernel;
pub mod merge;
pub mod mirror;
pub mod palette;
pub mod reprojected;
pub mod terrain;

pub use decimated::DecimatedImage;
pub use grid::Grid;
pub use image::{BasicImage, Image, SampleFormat};
pub use kernel::{Kernel, WeightTable};
pub use merge::{MergeImage, MergeLayer, MergeMask, MergeMethod};
pub use mirror::{MirrorImage, Side};
pub use palette::{Interpolation, Palette, PaletteEntry, PaletteImage};
pub use reprojected::ReprojectedImage;
pub use terrain::{SlopeAlgorithm, SlopeUnit, TerrainImage, TerrainOp};
