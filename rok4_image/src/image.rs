//! The pull-based [`Image`] contract: every operator in this crate is a node
//! that answers `get_line` in the sample type its consumer asks for, and
//! declares its own dimensions/CRS/bounding box at construction. Nothing is
//! pre-rendered; a line is computed the moment it's requested.

use anyhow::{Result, ensure};
use rok4_core::{BoundingBox, Crs};
use std::sync::Arc;

/// The sample representation a node natively produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
	U8,
	U16,
	F32,
}

/// Abstract node of the pipeline graph.
///
/// A node exposes its geometry (`width`/`height`/`channel_count`/`bbox`/
/// `crs`) and answers `get_line_*` in any of the three sample flavors —
/// callers request the flavor they need; nodes convert internally if their
/// native format differs. An optional single-channel mask (0 = nodata,
/// 255 = data) travels alongside data nodes; mask nodes report
/// `is_mask() == true` and have `channel_count() == 1`.
pub trait Image: Send + Sync {
	fn width(&self) -> u32;
	fn height(&self) -> u32;
	fn channel_count(&self) -> u8;
	fn bbox(&self) -> &BoundingBox<f64>;
	fn crs(&self) -> &Crs;
	fn sample_format(&self) -> SampleFormat;

	fn is_mask(&self) -> bool {
		false
	}

	fn mask(&self) -> Option<&Arc<dyn Image>> {
		None
	}

	/// Fetches one scanline as `u8` samples, `width() * channel_count()` long.
	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>>;
	/// Fetches one scanline as `u16` samples.
	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>>;
	/// Fetches one scanline as `f32` samples.
	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>>;

	/// Ground resolution along X, derived from the bounding box and width.
	fn resolution_x(&self) -> f64 {
		(self.bbox().xmax - self.bbox().xmin) / f64::from(self.width())
	}

	/// Ground resolution along Y.
	fn resolution_y(&self) -> f64 {
		(self.bbox().ymax - self.bbox().ymin) / f64::from(self.height())
	}

	/// Converts a pixel's center to terrain (CRS) coordinates, against the
	/// `(xmin, ymax)` origin with pixel-center convention.
	fn pixel_to_terrain(&self, x: f64, y: f64) -> (f64, f64) {
		let bbox = self.bbox();
		(bbox.xmin + (x + 0.5) * self.resolution_x(), bbox.ymax - (y + 0.5) * self.resolution_y())
	}

	/// Inverse of [`Image::pixel_to_terrain`].
	fn terrain_to_pixel(&self, tx: f64, ty: f64) -> (f64, f64) {
		let bbox = self.bbox();
		((tx - bbox.xmin) / self.resolution_x() - 0.5, (bbox.ymax - ty) / self.resolution_y() - 0.5)
	}

	/// Validates that `y` is a legal line index.
	fn ensure_valid_line(&self, y: u32) -> Result<()> {
		ensure!(y < self.height(), "line {y} is out of range for an image of height {}", self.height());
		Ok(())
	}

	/// Compatibility check against another node: same CRS, resolution within
	/// 0.1% of the smaller of the two, phase within 0.001 (or ≥ 0.999, i.e.
	/// within 0.001 of the next integer) on each axis, and equal channel
	/// count.
	fn is_compatible_with(&self, other: &dyn Image) -> Result<()> {
		ensure!(self.crs() == other.crs(), "incompatible images: CRS mismatch ({} vs {})", self.crs().canonical_code(), other.crs().canonical_code());
		ensure!(self.channel_count() == other.channel_count(), "incompatible images: {} vs {} channels", self.channel_count(), other.channel_count());

		for (a, b) in [(self.resolution_x(), other.resolution_x()), (self.resolution_y(), other.resolution_y())] {
			let smaller = a.abs().min(b.abs()).max(f64::EPSILON);
			ensure!((a - b).abs() / smaller <= 0.001, "incompatible images: resolutions {a} and {b} differ by more than 0.1%");
		}

		let phase_ok = |a: f64, b: f64, res: f64| -> bool {
			if res <= 0.0 {
				return true;
			}
			let phase = ((a - b) / res).fract().abs();
			phase <= 0.001 || phase >= 0.999
		};
		ensure!(
			phase_ok(self.bbox().xmin, other.bbox().xmin, self.resolution_x()) && phase_ok(self.bbox().ymax, other.bbox().ymax, self.resolution_y()),
			"incompatible images: pixel phase mismatch"
		);
		Ok(())
	}
}

/// Converts a `u8` sample to the given target format.
#[must_use]
pub fn convert_sample_u8(v: u8, target: SampleFormat) -> SampleValue {
	match target {
		SampleFormat::U8 => SampleValue::U8(v),
		SampleFormat::U16 => SampleValue::U16(u16::from(v) * 257),
		SampleFormat::F32 => SampleValue::F32(f32::from(v) / 255.0),
	}
}

/// A single converted sample, tagged by format.
#[derive(Debug, Clone, Copy)]
pub enum SampleValue {
	U8(u8),
	U16(u16),
	F32(f32),
}

/// A concrete, fully materialized leaf node: a flat buffer of samples in one
/// native format, plus geometry and an optional mask. Used for decoded
/// tiles, nodata fill, and as the terminal node under every operator chain.
pub struct BasicImage {
	width: u32,
	height: u32,
	channels: u8,
	bbox: BoundingBox<f64>,
	crs: Crs,
	format: SampleFormat,
	is_mask: bool,
	mask: Option<Arc<dyn Image>>,
	data_u8: Vec<u8>,
	data_u16: Vec<u16>,
	data_f32: Vec<f32>,
}

impl BasicImage {
	#[must_use]
	pub fn new_u8(width: u32, height: u32, channels: u8, bbox: BoundingBox<f64>, crs: Crs, data: Vec<u8>) -> Self {
		debug_assert_eq!(data.len(), (width * height * u32::from(channels)) as usize);
		BasicImage { width, height, channels, bbox, crs, format: SampleFormat::U8, is_mask: false, mask: None, data_u8: data, data_u16: Vec::new(), data_f32: Vec::new() }
	}

	#[must_use]
	pub fn new_f32(width: u32, height: u32, channels: u8, bbox: BoundingBox<f64>, crs: Crs, data: Vec<f32>) -> Self {
		debug_assert_eq!(data.len(), (width * height * u32::from(channels)) as usize);
		BasicImage { width, height, channels, bbox, crs, format: SampleFormat::F32, is_mask: false, mask: None, data_u8: Vec::new(), data_u16: Vec::new(), data_f32: data }
	}

	/// A solid-fill image, used to stamp nodata for missing tiles.
	#[must_use]
	pub fn filled_u8(width: u32, height: u32, channels: u8, bbox: BoundingBox<f64>, crs: Crs, values: &[u8]) -> Self {
		let mut data = vec![0u8; (width * height * u32::from(channels)) as usize];
		for (i, px) in data.chunks_mut(channels as usize).enumerate() {
			let _ = i;
			px.copy_from_slice(values);
		}
		Self::new_u8(width, height, channels, bbox, crs, data)
	}

	#[must_use]
	pub fn with_mask(mut self, mask: Arc<dyn Image>) -> Self {
		self.mask = Some(mask);
		self
	}

	#[must_use]
	pub fn as_mask(mut self) -> Self {
		self.is_mask = true;
		self
	}

	fn pixel_range(&self, y: u32) -> std::ops::Range<usize> {
		let row_len = self.width as usize * self.channels as usize;
		y as usize * row_len..(y as usize + 1) * row_len
	}
}

impl Image for BasicImage {
	fn width(&self) -> u32 {
		self.width
	}
	fn height(&self) -> u32 {
		self.height
	}
	fn channel_count(&self) -> u8 {
		self.channels
	}
	fn bbox(&self) -> &BoundingBox<f64> {
		&self.bbox
	}
	fn crs(&self) -> &Crs {
		&self.crs
	}
	fn sample_format(&self) -> SampleFormat {
		self.format
	}
	fn is_mask(&self) -> bool {
		self.is_mask
	}
	fn mask(&self) -> Option<&Arc<dyn Image>> {
		self.mask.as_ref()
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		let range = self.pixel_range(y);
		Ok(match self.format {
			SampleFormat::U8 => self.data_u8[range].to_vec(),
			SampleFormat::U16 => self.data_u16[range].iter().map(|&v| (v >> 8) as u8).collect(),
			SampleFormat::F32 => self.data_f32[range].iter().map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8).collect(),
		})
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		self.ensure_valid_line(y)?;
		let range = self.pixel_range(y);
		Ok(match self.format {
			SampleFormat::U8 => self.data_u8[range].iter().map(|&v| u16::from(v) * 257).collect(),
			SampleFormat::U16 => self.data_u16[range].to_vec(),
			SampleFormat::F32 => self.data_f32[range].iter().map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16).collect(),
		})
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		self.ensure_valid_line(y)?;
		let range = self.pixel_range(y);
		Ok(match self.format {
			SampleFormat::U8 => self.data_u8[range].iter().map(|&v| f32::from(v) / 255.0).collect(),
			SampleFormat::U16 => self.data_u16[range].iter().map(|&v| f32::from(v) / 65535.0).collect(),
			SampleFormat::F32 => self.data_f32[range].to_vec(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn crs() -> Crs {
		Crs::new("EPSG:3857")
	}

	fn bbox(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> BoundingBox<f64> {
		BoundingBox::new(xmin, ymin, xmax, ymax, crs())
	}

	#[test]
	fn basic_image_round_trips_u8_lines() {
		let img = BasicImage::new_u8(2, 2, 1, bbox(0.0, 0.0, 2.0, 2.0), crs(), vec![10, 20, 30, 40]);
		assert_eq!(img.get_line_u8(0).unwrap(), vec![10, 20]);
		assert_eq!(img.get_line_u8(1).unwrap(), vec![30, 40]);
	}

	#[test]
	fn get_line_out_of_range_errors() {
		let img = BasicImage::new_u8(2, 2, 1, bbox(0.0, 0.0, 2.0, 2.0), crs(), vec![1, 2, 3, 4]);
		assert!(img.get_line_u8(5).is_err());
	}

	#[test]
	fn pixel_to_terrain_uses_top_left_pixel_center_origin() {
		let img = BasicImage::new_u8(4, 4, 1, bbox(0.0, 0.0, 4.0, 4.0), crs(), vec![0; 16]);
		let (tx, ty) = img.pixel_to_terrain(0.0, 0.0);
		assert!((tx - 0.5).abs() < 1e-9);
		assert!((ty - 3.5).abs() < 1e-9);
		let (x, y) = img.terrain_to_pixel(tx, ty);
		assert!((x - 0.0).abs() < 1e-9);
		assert!((y - 0.0).abs() < 1e-9);
	}

	#[test]
	fn compatibility_checks_crs_resolution_phase_and_channels() {
		let a = BasicImage::new_u8(4, 4, 3, bbox(0.0, 0.0, 4.0, 4.0), crs(), vec![0; 48]);
		let b = BasicImage::new_u8(4, 4, 3, bbox(0.0, 0.0, 4.0, 4.0), crs(), vec![0; 48]);
		a.is_compatible_with(&b).unwrap();

		let wrong_channels = BasicImage::new_u8(4, 4, 1, bbox(0.0, 0.0, 4.0, 4.0), crs(), vec![0; 16]);
		assert!(a.is_compatible_with(&wrong_channels).is_err());

		let wrong_res = BasicImage::new_u8(4, 4, 3, bbox(0.0, 0.0, 400.0, 400.0), crs(), vec![0; 48]);
		assert!(a.is_compatible_with(&wrong_res).is_err());
	}
}
