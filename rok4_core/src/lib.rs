//! Core primitives for the rok4 raster pyramid tile server: coordinate
//! reference systems, bounding box arithmetic, tile matrices, storage
//! contexts, the tile index cache, binary I/O helpers and the raster
//! compressors (LZW, PackBits, Deflate) shared by the encoder layer.

pub mod cache;
pub mod compression;
pub mod config;
pub mod crs;
pub mod io;
pub mod storage;
pub mod tile_matrix;

pub use cache::IndexCache;
pub use crs::Crs;
pub use tile_matrix::{BoundingBox, TileLimits, TileMatrix, TileMatrixSet};
