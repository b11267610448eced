//! The `Pyramid`/`Level` data model: a pyramid owns a `TileMatrixSet`, a
//! map of levels keyed by id, a canonical pixel format and per-channel
//! nodata, and a storage context; a level bundles a `TileMatrix`, tile
//! limits, a slab layout and backend pathing.

use crate::slab::SlabHeader;
use anyhow::{Context, Result, bail};
use rok4_core::compression::{Compression, deflate_decode, lzw_decode, packbits_decode};
use rok4_core::storage::{StorageContext, file_backend_path};
use rok4_core::{BoundingBox, Crs, IndexCache, TileMatrix, TileMatrixSet};
use rok4_image::image::{BasicImage, Image, SampleFormat};
use rok4_image::grid::Grid;
use rok4_image::kernel::Kernel;
use rok4_image::reprojected::ReprojectedImage;
use std::collections::HashMap;
use std::sync::Arc;

/// The pyramid's canonical pixel format: every tile and every reassembled
/// bbox window shares this sample format, channel count and codec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelFormat {
	pub sample_format: SampleFormat,
	pub channel_count: u8,
	pub compression: Compression,
}

impl PixelFormat {
	#[must_use]
	pub fn bytes_per_sample(self) -> usize {
		match self.sample_format {
			SampleFormat::U8 => 1,
			SampleFormat::U16 => 2,
			SampleFormat::F32 => 4,
		}
	}
}

/// One level of a pyramid: a `TileMatrix`, the tile row/column limits the
/// pyramid actually stores data for, the slab layout and the file-backend
/// pathing parameters.
pub struct Level {
	pub id: String,
	pub tile_matrix: TileMatrix,
	pub crs: Crs,
	pub min_tile_col: u32,
	pub max_tile_col: u32,
	pub min_tile_row: u32,
	pub max_tile_row: u32,
	pub tiles_per_width: u32,
	pub tiles_per_height: u32,
	pub base_dir: String,
	pub path_depth: u32,
	storage: Arc<StorageContext>,
	cache: Arc<IndexCache>,
}

impl Level {
	#[must_use]
	#[allow(clippy::too_many_arguments)]
	pub fn new(id: String, tile_matrix: TileMatrix, crs: Crs, min_tile_col: u32, max_tile_col: u32, min_tile_row: u32, max_tile_row: u32, tiles_per_width: u32, tiles_per_height: u32, base_dir: String, path_depth: u32, storage: Arc<StorageContext>, cache: Arc<IndexCache>) -> Self {
		Level { id, tile_matrix, crs, min_tile_col, max_tile_col, min_tile_row, max_tile_row, tiles_per_width, tiles_per_height, base_dir, path_depth, storage, cache }
	}

	#[must_use]
	fn in_limits(&self, tile_col: u32, tile_row: u32) -> bool {
		(self.min_tile_col..=self.max_tile_col).contains(&tile_col) && (self.min_tile_row..=self.max_tile_row).contains(&tile_row)
	}

	/// Resolves and reads the raw tile bytes for `(tile_col, tile_row)` and
	/// decompresses them per `format.compression`. Returns `Ok(None)` when
	/// the tile is out of the level's stored limits or its slab is absent
	/// (both are "use nodata" cases, not errors).
	pub fn get_tile(&self, tile_col: u32, tile_row: u32, format: PixelFormat) -> Result<Option<Vec<u8>>> {
		if !self.in_limits(tile_col, tile_row) {
			return Ok(None);
		}
		let sx = tile_col / self.tiles_per_width;
		let sy = tile_row / self.tiles_per_height;
		let local_col = tile_col % self.tiles_per_width;
		let local_row = tile_row % self.tiles_per_height;
		let tile_index = (local_row * self.tiles_per_width + local_col) as usize;

		let slab_name = file_backend_path(&self.base_dir, &self.id, sx, sy, self.path_depth);

		let (offset, size, header_len) = match self.cache.get(&slab_name, tile_index) {
			Some((index, offset, size)) => (offset, size, 20 + 2 * index.offsets.len() * 4),
			None => {
				if !self.storage.exists(&slab_name).with_context(|| format!("checking slab '{slab_name}' existence"))? {
					return Ok(None);
				}
				let prefix = self.storage.read(&slab_name, 0, 20).with_context(|| format!("reading slab header prefix for '{slab_name}'"))?;
				let tiles_per_width = u32::from_le_bytes(prefix[8..12].try_into().unwrap());
				let tiles_per_height = u32::from_le_bytes(prefix[12..16].try_into().unwrap());
				let tile_count = (tiles_per_width * tiles_per_height) as usize;
				let header_len = 20 + 2 * tile_count * 4;
				let header_bytes = self.storage.read(&slab_name, 0, header_len as u64).with_context(|| format!("reading slab header for '{slab_name}'"))?;
				let header = SlabHeader::decode(&header_bytes)?;
				self.cache.add(&slab_name, "default", &slab_name, header.offsets.clone(), header.sizes.clone());
				let offset = *header.offsets.get(tile_index).ok_or_else(|| anyhow::anyhow!("tile index {tile_index} out of range for slab '{slab_name}'"))?;
				let size = *header.sizes.get(tile_index).ok_or_else(|| anyhow::anyhow!("tile index {tile_index} out of range for slab '{slab_name}'"))?;
				(offset, size, header_len)
			}
		};

		let bytes = self.storage.read(&slab_name, (header_len as u64) + u64::from(offset), u64::from(size)).with_context(|| format!("reading tile {tile_col},{tile_row} from slab '{slab_name}'"))?;

		let decoded = match format.compression {
			Compression::Raw => bytes,
			Compression::Lzw => lzw_decode(&bytes),
			Compression::PackBits => packbits_decode(&bytes),
			Compression::Deflate => deflate_decode(&bytes)?,
		};
		Ok(Some(decoded))
	}

	/// Builds an [`Image`] for the given tile, or a nodata-filled image of
	/// the same dimensions when the tile is absent.
	fn tile_image(&self, tile_col: u32, tile_row: u32, format: PixelFormat, nodata: &[f64], crs: &Crs) -> Result<BasicImage> {
		let tm = &self.tile_matrix;
		let bbox = BoundingBox::new(tm.x0 + f64::from(tile_col) * tm.cell_width(), tm.y0 - f64::from(tile_row + 1) * tm.cell_height(), tm.x0 + f64::from(tile_col + 1) * tm.cell_width(), tm.y0 - f64::from(tile_row) * tm.cell_height(), crs.clone());

		match self.get_tile(tile_col, tile_row, format)? {
			Some(bytes) => decode_tile_bytes(&bytes, tm.tile_width, tm.tile_height, format, bbox, crs),
			None => Ok(nodata_image(tm.tile_width, tm.tile_height, format, nodata, bbox, crs)),
		}
	}
}

fn decode_tile_bytes(bytes: &[u8], width: u32, height: u32, format: PixelFormat, bbox: BoundingBox<f64>, crs: &Crs) -> Result<BasicImage> {
	let channels = format.channel_count;
	match format.sample_format {
		SampleFormat::U8 => {
			let expected = (width * height * u32::from(channels)) as usize;
			if bytes.len() != expected {
				bail!("decoded tile payload is {} bytes, expected {expected}", bytes.len());
			}
			Ok(BasicImage::new_u8(width, height, channels, bbox, crs.clone(), bytes.to_vec()))
		}
		SampleFormat::F32 => {
			let expected = (width * height * u32::from(channels)) as usize;
			let values: Vec<f32> = bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect();
			if values.len() != expected {
				bail!("decoded tile payload has {} f32 samples, expected {expected}", values.len());
			}
			Ok(BasicImage::new_f32(width, height, channels, bbox, crs.clone(), values))
		}
		SampleFormat::U16 => {
			let expected = (width * height * u32::from(channels)) as usize;
			let values: Vec<f32> = bytes.chunks_exact(2).map(|c| f32::from(u16::from_le_bytes(c.try_into().unwrap()))).collect();
			if values.len() != expected {
				bail!("decoded tile payload has {} u16 samples, expected {expected}", values.len());
			}
			Ok(BasicImage::new_f32(width, height, channels, bbox, crs.clone(), values))
		}
	}
}

fn nodata_image(width: u32, height: u32, format: PixelFormat, nodata: &[f64], bbox: BoundingBox<f64>, crs: &Crs) -> BasicImage {
	let channels = format.channel_count;
	let pixel_count = (width * height) as usize;
	let mask = Arc::new(BasicImage::new_u8(width, height, 1, bbox.clone(), crs.clone(), vec![0u8; pixel_count]).as_mask());

	match format.sample_format {
		SampleFormat::U8 => {
			let mut data = Vec::with_capacity(pixel_count * channels as usize);
			for _ in 0..pixel_count {
				for c in 0..channels as usize {
					data.push(nodata.get(c).copied().unwrap_or(0.0) as u8);
				}
			}
			BasicImage::new_u8(width, height, channels, bbox, crs.clone(), data).with_mask(mask)
		}
		SampleFormat::F32 | SampleFormat::U16 => {
			let mut data = Vec::with_capacity(pixel_count * channels as usize);
			for _ in 0..pixel_count {
				for c in 0..channels as usize {
					data.push(nodata.get(c).copied().unwrap_or(0.0) as f32);
				}
			}
			BasicImage::new_f32(width, height, channels, bbox, crs.clone(), data).with_mask(mask)
		}
	}
}

impl Level {
	/// Assembles all tiles intersecting `bbox` into a single mosaic image,
	/// then crops, resamples and reprojects it onto `target_w × target_h`
	/// pixels covering `bbox` in `target_crs`, via the grid-based
	/// reprojection operator.
	pub fn get_bbox_window(&self, bbox: &BoundingBox<f64>, target_w: u32, target_h: u32, target_crs: &Crs, kernel: Kernel, format: PixelFormat, nodata: &[f64]) -> Result<Arc<dyn Image>> {
		let source_crs = self.crs.clone();
		let source_bbox = if *target_crs == source_crs { bbox.clone() } else { bbox.reproject(target_crs, &source_crs, 16)? };
		let limits = self.tile_matrix.bbox_to_tile_limits(&source_bbox);
		let mosaic_bbox = self.tile_matrix.tile_limits_to_bbox(&limits, &source_crs);

		let tiles_w = limits.max_col - limits.min_col + 1;
		let tiles_h = limits.max_row - limits.min_row + 1;
		let tw = self.tile_matrix.tile_width;
		let th = self.tile_matrix.tile_height;
		let mosaic_w = tiles_w * tw;
		let mosaic_h = tiles_h * th;

		let mut mosaic_data_u8 = if format.sample_format == SampleFormat::U8 { Some(vec![0u8; (mosaic_w * mosaic_h * u32::from(format.channel_count)) as usize]) } else { None };
		let mut mosaic_data_f32 = if format.sample_format != SampleFormat::U8 { Some(vec![0f32; (mosaic_w * mosaic_h * u32::from(format.channel_count)) as usize]) } else { None };
		let mut mosaic_mask = vec![0u8; (mosaic_w * mosaic_h) as usize];

		for row in 0..tiles_h {
			for col in 0..tiles_w {
				let tile_col = limits.min_col + col;
				let tile_row = limits.min_row + row;
				let tile_image = self.tile_image(tile_col, tile_row, format, nodata, &source_crs)?;
				let dest_x0 = col * tw;
				let dest_y0 = row * th;
				let channels = format.channel_count as usize;

				for y in 0..th {
					let mask_line = tile_image.mask().map(|m| m.get_line_u8(y)).transpose()?;
					let dest_row = (dest_y0 + y) as usize;
					if let Some(buf) = mosaic_data_u8.as_mut() {
						let line = tile_image.get_line_u8(y)?;
						for x in 0..tw as usize {
							let dst_idx = (dest_row * mosaic_w as usize + dest_x0 as usize + x) * channels;
							buf[dst_idx..dst_idx + channels].copy_from_slice(&line[x * channels..x * channels + channels]);
						}
					}
					if let Some(buf) = mosaic_data_f32.as_mut() {
						let line = tile_image.get_line_f32(y)?;
						for x in 0..tw as usize {
							let dst_idx = (dest_row * mosaic_w as usize + dest_x0 as usize + x) * channels;
							buf[dst_idx..dst_idx + channels].copy_from_slice(&line[x * channels..x * channels + channels]);
						}
					}
					if let Some(mask_line) = mask_line {
						for x in 0..tw as usize {
							mosaic_mask[dest_row * mosaic_w as usize + dest_x0 as usize + x] = mask_line[x];
						}
					} else {
						for x in 0..tw as usize {
							mosaic_mask[dest_row * mosaic_w as usize + dest_x0 as usize + x] = 255;
						}
					}
				}
			}
		}

		let mask_image = Arc::new(BasicImage::new_u8(mosaic_w, mosaic_h, 1, mosaic_bbox.clone(), source_crs.clone(), mosaic_mask).as_mask());
		let mosaic: Arc<dyn Image> = if let Some(data) = mosaic_data_u8 {
			Arc::new(BasicImage::new_u8(mosaic_w, mosaic_h, format.channel_count, mosaic_bbox.clone(), source_crs.clone(), data).with_mask(mask_image))
		} else {
			Arc::new(BasicImage::new_f32(mosaic_w, mosaic_h, format.channel_count, mosaic_bbox.clone(), source_crs.clone(), mosaic_data_f32.unwrap()).with_mask(mask_image))
		};

		let mut grid = Grid::new(target_w, target_h, bbox, 16);
		if *target_crs != source_crs {
			grid.reproject(target_crs, &source_crs)?;
		}
		Ok(Arc::new(ReprojectedImage::new(mosaic, bbox.clone(), target_w, target_h, target_crs.clone(), grid, kernel)))
	}
}

/// A pyramid: a `TileMatrixSet`, a map of `Level`s keyed by id, a canonical
/// pixel format, per-channel nodata, and a storage context.
pub struct Pyramid {
	pub tile_matrix_set: TileMatrixSet,
	pub levels: HashMap<String, Level>,
	pub pixel_format: PixelFormat,
	pub nodata: Vec<f64>,
	pub storage: Arc<StorageContext>,
}

impl Pyramid {
	/// Picks the coarsest level whose resolution is at least the mean of
	/// `(res_x, res_y)`, scanning resolution-descending; falls back to the
	/// finest level if every level is too coarse.
	#[must_use]
	pub fn best_level(&self, res_x: f64, res_y: f64) -> Option<&TileMatrix> {
		let target = (res_x + res_y) / 2.0;
		let mut levels: Vec<&TileMatrix> = self.tile_matrix_set.levels.iter().collect();
		levels.sort_by(|a, b| b.resolution.partial_cmp(&a.resolution).unwrap());
		levels.iter().find(|l| l.resolution >= target).copied().or_else(|| levels.last().copied())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rok4_core::storage::FileContext;
	use tempfile::tempdir;

	fn matrix(id: &str, resolution: f64) -> TileMatrix {
		TileMatrix { id: id.to_string(), resolution, x0: 0.0, y0: 1024.0, tile_width: 4, tile_height: 4, matrix_width: 4, matrix_height: 4 }
	}

	fn build_level(dir: &std::path::Path) -> (Level, Arc<StorageContext>) {
		let storage = Arc::new(StorageContext::File(FileContext::new(dir.to_str().unwrap())));
		let cache = Arc::new(IndexCache::with_defaults());
		let level = Level::new("0".to_string(), matrix("0", 1.0), Crs::new("LOCAL"), 0, 3, 0, 3, 2, 2, "pyramid".to_string(), 1, storage.clone(), cache);
		(level, storage)
	}

	#[test]
	fn missing_slab_reports_no_tile_rather_than_erroring() {
		let dir = tempdir().unwrap();
		let (level, _storage) = build_level(dir.path());
		let format = PixelFormat { sample_format: SampleFormat::U8, channel_count: 1, compression: Compression::Raw };
		let tile = level.get_tile(0, 0, format).unwrap();
		assert!(tile.is_none());
	}

	#[test]
	fn out_of_limits_tile_reports_none() {
		let dir = tempdir().unwrap();
		let (level, _storage) = build_level(dir.path());
		let format = PixelFormat { sample_format: SampleFormat::U8, channel_count: 1, compression: Compression::Raw };
		let tile = level.get_tile(10, 10, format).unwrap();
		assert!(tile.is_none());
	}

	#[test]
	fn best_level_picks_coarsest_match_or_finest_fallback() {
		let tms = TileMatrixSet { id: "t".into(), title: "t".into(), keywords: vec![], crs: Crs::new("LOCAL"), levels: vec![matrix("0", 8.0), matrix("1", 4.0), matrix("2", 2.0)] };
		let pyramid = Pyramid { tile_matrix_set: tms, levels: HashMap::new(), pixel_format: PixelFormat { sample_format: SampleFormat::U8, channel_count: 1, compression: Compression::Raw }, nodata: vec![0.0], storage: Arc::new(StorageContext::File(FileContext::new("/tmp"))) };
		assert_eq!(pyramid.best_level(3.0, 3.0).unwrap().id, "1");
		assert_eq!(pyramid.best_level(100.0, 100.0).unwrap().id, "0");
		assert_eq!(pyramid.best_level(0.1, 0.1).unwrap().id, "2");
	}
}
