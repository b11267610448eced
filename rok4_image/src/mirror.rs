//! Mirror padding: reflects a band of pixels just outside one edge of a
//! source image, used to extend the support available to a resampling
//! kernel past an image's edge.

use crate::image::{Image, SampleFormat};
use anyhow::{Result, ensure};
use rok4_core::BoundingBox;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Top,
	Right,
	Bottom,
	Left,
}

/// A reflected band of `k` pixels just outside `source`'s given `side`.
/// Row/column `b` of the band (`0` = farthest from the source, `k-1` =
/// adjacent to it) mirrors source row/column `b`, the usual edge-excluded
/// reflection (`f(-i-1) = f(i)`).
pub struct MirrorImage {
	source: Arc<dyn Image>,
	side: Side,
	k: u32,
	bbox: BoundingBox<f64>,
}

impl MirrorImage {
	pub fn new(source: Arc<dyn Image>, side: Side, k: u32) -> Result<Self> {
		ensure!(k > 0, "mirror band width must be positive");
		ensure!(k <= source.width().min(source.height()), "mirror band width {k} exceeds the source's smaller dimension");

		let rx = source.resolution_x();
		let ry = source.resolution_y();
		let src_bbox = source.bbox();
		let bbox = match side {
			Side::Top => BoundingBox::new(src_bbox.xmin, src_bbox.ymax, src_bbox.xmax, src_bbox.ymax + f64::from(k) * ry, src_bbox.crs.clone()),
			Side::Bottom => BoundingBox::new(src_bbox.xmin, src_bbox.ymin - f64::from(k) * ry, src_bbox.xmax, src_bbox.ymin, src_bbox.crs.clone()),
			Side::Left => BoundingBox::new(src_bbox.xmin - f64::from(k) * rx, src_bbox.ymin, src_bbox.xmin, src_bbox.ymax, src_bbox.crs.clone()),
			Side::Right => BoundingBox::new(src_bbox.xmax, src_bbox.ymin, src_bbox.xmax + f64::from(k) * rx, src_bbox.ymax, src_bbox.crs.clone()),
		};

		Ok(MirrorImage { source, side, k, bbox })
	}

	fn source_row(&self, band_row: u32) -> u32 {
		match self.side {
			Side::Top => self.k - 1 - band_row,
			Side::Bottom => self.source.height() - 1 - band_row,
			Side::Left | Side::Right => band_row,
		}
	}
}

impl Image for MirrorImage {
	fn width(&self) -> u32 {
		match self.side {
			Side::Top | Side::Bottom => self.source.width(),
			Side::Left | Side::Right => self.k,
		}
	}

	fn height(&self) -> u32 {
		match self.side {
			Side::Top | Side::Bottom => self.k,
			Side::Left | Side::Right => self.source.height(),
		}
	}

	fn channel_count(&self) -> u8 {
		self.source.channel_count()
	}

	fn bbox(&self) -> &BoundingBox<f64> {
		&self.bbox
	}

	fn crs(&self) -> &rok4_core::Crs {
		self.source.crs()
	}

	fn sample_format(&self) -> SampleFormat {
		self.source.sample_format()
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		self.reflect_line(y, |row| self.source.get_line_u8(row))
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		self.ensure_valid_line(y)?;
		self.reflect_line(y, |row| self.source.get_line_u16(row))
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		self.ensure_valid_line(y)?;
		self.reflect_line(y, |row| self.source.get_line_f32(row))
	}
}

impl MirrorImage {
	fn reflect_line<T: Copy>(&self, y: u32, fetch: impl Fn(u32) -> Result<Vec<T>>) -> Result<Vec<T>> {
		let channels = self.channel_count() as usize;
		match self.side {
			Side::Top | Side::Bottom => fetch(self.source_row(y)),
			Side::Left => {
				let row = fetch(y)?;
				let mut band: Vec<T> = row[..self.k as usize * channels].to_vec();
				reverse_pixels(&mut band, channels);
				Ok(band)
			}
			Side::Right => {
				let row = fetch(y)?;
				let start = row.len() - self.k as usize * channels;
				let mut band: Vec<T> = row[start..].to_vec();
				reverse_pixels(&mut band, channels);
				Ok(band)
			}
		}
	}
}

fn reverse_pixels<T: Copy>(buf: &mut [T], channels: usize) {
	let pixels = buf.len() / channels;
	for i in 0..pixels / 2 {
		let (a, b) = (i * channels, (pixels - 1 - i) * channels);
		for c in 0..channels {
			buf.swap(a + c, b + c);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::image::BasicImage;
	use rok4_core::Crs;

	fn crs() -> Crs {
		Crs::new("EPSG:3857")
	}

	fn checkerboard(w: u32, h: u32) -> Arc<dyn Image> {
		let data: Vec<u8> = (0..w * h).map(|i| i as u8).collect();
		Arc::new(BasicImage::new_u8(w, h, 1, BoundingBox::new(0.0, 0.0, f64::from(w), f64::from(h), crs()), crs(), data))
	}

	#[test]
	fn top_band_mirrors_the_first_k_rows_in_reverse_order() {
		let src = checkerboard(3, 4);
		let mirror = MirrorImage::new(src.clone(), Side::Top, 2).unwrap();
		assert_eq!(mirror.width(), 3);
		assert_eq!(mirror.height(), 2);
		// band row 1 (adjacent to source) mirrors source row 0
		assert_eq!(mirror.get_line_u8(1).unwrap(), src.get_line_u8(0).unwrap());
		// band row 0 (farthest) mirrors source row 1
		assert_eq!(mirror.get_line_u8(0).unwrap(), src.get_line_u8(1).unwrap());
	}

	#[test]
	fn left_band_mirrors_columns_within_each_row() {
		let src = checkerboard(4, 2);
		let mirror = MirrorImage::new(src.clone(), Side::Left, 2).unwrap();
		assert_eq!(mirror.width(), 2);
		let src_row = src.get_line_u8(0).unwrap();
		let band_row = mirror.get_line_u8(0).unwrap();
		// columns 0,1 of source reversed
		assert_eq!(band_row, vec![src_row[1], src_row[0]]);
	}

	#[test]
	fn rejects_band_wider_than_the_source() {
		let src = checkerboard(2, 2);
		assert!(MirrorImage::new(src, Side::Top, 3).is_err());
	}
}
