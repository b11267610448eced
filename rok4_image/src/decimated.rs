//! Nearest-pixel decimation onto a coarser grid aligned with the source's
//! pixel centers — no filtering, just picking the corresponding source
//! sample, since target resolution is required to be an integer multiple
//! of the source's.

use crate::image::{Image, SampleFormat};
use anyhow::{Result, ensure};
use rok4_core::{BoundingBox, Crs};
use std::sync::Arc;

pub struct DecimatedImage {
	source: Arc<dyn Image>,
	width: u32,
	height: u32,
	bbox: BoundingBox<f64>,
	ratio_x: u32,
	ratio_y: u32,
	/// Offset, in source pixels, from source column/row 0 to target
	/// column/row 0's corresponding source column/row.
	source_offset_x: i64,
	source_offset_y: i64,
}

impl DecimatedImage {
	pub fn new(source: Arc<dyn Image>, target_resolution_x: f64, target_resolution_y: f64, bbox: BoundingBox<f64>) -> Result<Self> {
		let rx = target_resolution_x / source.resolution_x();
		let ry = target_resolution_y / source.resolution_y();
		ensure!((rx - rx.round()).abs() < 1e-6, "target X resolution must be an integer multiple of the source's (got ratio {rx})");
		ensure!((ry - ry.round()).abs() < 1e-6, "target Y resolution must be an integer multiple of the source's (got ratio {ry})");
		let ratio_x = rx.round() as u32;
		let ratio_y = ry.round() as u32;

		let width = ((bbox.xmax - bbox.xmin) / target_resolution_x).round() as u32;
		let height = ((bbox.ymax - bbox.ymin) / target_resolution_y).round() as u32;

		let (src_x0, src_y0) = source.terrain_to_pixel(bbox.xmin + target_resolution_x / 2.0, bbox.ymax - target_resolution_y / 2.0);
		ensure!((src_x0 - src_x0.round()).abs() < 1e-6, "target/source pixel-center offset is not an integer number of source pixels along X");
		ensure!((src_y0 - src_y0.round()).abs() < 1e-6, "target/source pixel-center offset is not an integer number of source pixels along Y");

		Ok(DecimatedImage { source, width, height, bbox, ratio_x, ratio_y, source_offset_x: src_x0.round() as i64, source_offset_y: src_y0.round() as i64 })
	}

	fn source_row(&self, y: u32) -> Option<u32> {
		let row = self.source_offset_y + i64::from(y) * i64::from(self.ratio_y);
		if row < 0 || row >= i64::from(self.source.height()) {
			None
		} else {
			Some(row as u32)
		}
	}

	fn pick<T: Copy + Default>(&self, y: u32, fetch_source: impl Fn(u32) -> Result<Vec<T>>, fetch_mask: impl Fn(u32) -> Result<Option<Vec<u8>>>) -> Result<Vec<T>> {
		let channels = self.channel_count() as usize;
		let Some(source_row) = self.source_row(y) else {
			return Ok(vec![T::default(); self.width as usize * channels]);
		};
		let source_line = fetch_source(source_row)?;
		let mask_line = fetch_mask(source_row)?;

		let mut out = Vec::with_capacity(self.width as usize * channels);
		for x in 0..self.width as i64 {
			let col = self.source_offset_x + x * i64::from(self.ratio_x);
			let in_range = col >= 0 && col < i64::from(self.source.width());
			let masked_out = in_range && mask_line.as_ref().is_some_and(|m| m[col as usize] == 0);
			if !in_range || masked_out {
				out.extend(std::iter::repeat(T::default()).take(channels));
			} else {
				let col = col as usize;
				out.extend_from_slice(&source_line[col * channels..(col + 1) * channels]);
			}
		}
		Ok(out)
	}
}

impl Image for DecimatedImage {
	fn width(&self) -> u32 {
		self.width
	}
	fn height(&self) -> u32 {
		self.height
	}
	fn channel_count(&self) -> u8 {
		self.source.channel_count()
	}
	fn bbox(&self) -> &BoundingBox<f64> {
		&self.bbox
	}
	fn crs(&self) -> &Crs {
		self.source.crs()
	}
	fn sample_format(&self) -> SampleFormat {
		self.source.sample_format()
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		self.pick(y, |row| self.source.get_line_u8(row), |row| self.source.mask().map(|m| m.get_line_u8(row)).transpose())
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		self.ensure_valid_line(y)?;
		self.pick(y, |row| self.source.get_line_u16(row), |row| self.source.mask().map(|m| m.get_line_u8(row)).transpose())
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		self.ensure_valid_line(y)?;
		self.pick(y, |row| self.source.get_line_f32(row), |row| self.source.mask().map(|m| m.get_line_u8(row)).transpose())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::image::BasicImage;

	fn crs() -> Crs {
		Crs::new("EPSG:3857")
	}

	#[test]
	fn picks_the_corresponding_source_pixel() {
		// 4x4 source, decimate 2x2 -> output pixel (0,0) picks source (0,0).
		let data: Vec<u8> = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
		let source: Arc<dyn Image> = Arc::new(BasicImage::new_u8(4, 4, 1, BoundingBox::new(0.0, 0.0, 4.0, 4.0, crs()), crs(), data));
		let target_bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0, crs());
		let dec = DecimatedImage::new(source, 2.0, 2.0, target_bbox).unwrap();
		assert_eq!(dec.width(), 2);
		assert_eq!(dec.height(), 2);
		assert_eq!(dec.get_line_u8(0).unwrap(), vec![1, 3]);
		assert_eq!(dec.get_line_u8(1).unwrap(), vec![9, 11]);
	}

	#[test]
	fn rejects_non_integer_resolution_ratio() {
		let source: Arc<dyn Image> = Arc::new(BasicImage::new_u8(4, 4, 1, BoundingBox::new(0.0, 0.0, 4.0, 4.0, crs()), crs(), vec![0; 16]));
		let target_bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0, crs());
		assert!(DecimatedImage::new(source, 1.5, 1.5, target_bbox).is_err());
	}
}
