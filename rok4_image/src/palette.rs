//! Value-to-color lookup for single-channel sources (classification rasters,
//! hypsometric tinting), with continuous (interpolated) or stepwise color
//! and alpha ramps. Lookup is `O(log n)` via binary search over a
//! monotone-by-construction breakpoint list.

use crate::image::{Image, SampleFormat};
use anyhow::{Result, bail, ensure};
use rok4_core::{BoundingBox, Crs};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interpolation {
	Continuous,
	Stepwise,
}

#[derive(Debug, Clone, Copy)]
pub struct PaletteEntry {
	pub value: f64,
	pub rgba: [u8; 4],
}

/// A monotone value→RGBA lookup table.
pub struct Palette {
	entries: Vec<PaletteEntry>,
	interpolation: Interpolation,
	has_alpha: bool,
	/// Color substituted for nodata (mask = 0) pixels, when set.
	no_alpha: Option<[u8; 4]>,
}

impl Palette {
	/// `entries` must be sorted by strictly increasing `value`; `has_alpha`
	/// controls whether lookups retain the alpha channel (4 output channels)
	/// or discard it (3).
	pub fn new(entries: Vec<PaletteEntry>, interpolation: Interpolation, has_alpha: bool) -> Result<Self> {
		ensure!(!entries.is_empty(), "a palette needs at least one entry");
		for w in entries.windows(2) {
			ensure!(w[0].value < w[1].value, "palette entries must be strictly increasing in value, got {} then {}", w[0].value, w[1].value);
		}
		Ok(Palette { entries, interpolation, has_alpha, no_alpha: None })
	}

	/// Sets the color substituted for nodata pixels in [`PaletteImage::line_rgba`].
	#[must_use]
	pub fn with_no_alpha(mut self, color: [u8; 4]) -> Self {
		self.no_alpha = Some(color);
		self
	}

	#[must_use]
	pub fn output_channels(&self) -> u8 {
		if self.has_alpha { 4 } else { 3 }
	}

	#[must_use]
	pub fn lookup(&self, value: f64) -> [u8; 4] {
		let idx = self.entries.partition_point(|e| e.value <= value);
		if idx == 0 {
			return self.entries[0].rgba;
		}
		if idx == self.entries.len() {
			return self.entries[self.entries.len() - 1].rgba;
		}
		let lo = &self.entries[idx - 1];
		let hi = &self.entries[idx];
		match self.interpolation {
			Interpolation::Stepwise => lo.rgba,
			Interpolation::Continuous => {
				let t = ((value - lo.value) / (hi.value - lo.value)) as f32;
				let mut out = [0u8; 4];
				for c in 0..4 {
					out[c] = (f32::from(lo.rgba[c]) + t * (f32::from(hi.rgba[c]) - f32::from(lo.rgba[c]))).round() as u8;
				}
				out
			}
		}
	}
}

pub struct PaletteImage {
	source: Arc<dyn Image>,
	palette: Arc<Palette>,
}

impl PaletteImage {
	pub fn new(source: Arc<dyn Image>, palette: Arc<Palette>) -> Result<Self> {
		if source.channel_count() != 1 {
			bail!("palette image requires a single-channel source, got {} channels", source.channel_count());
		}
		Ok(PaletteImage { source, palette })
	}

	fn line_rgba(&self, y: u32) -> Result<Vec<[u8; 4]>> {
		let line = self.source.get_line_f32(y)?;
		let mask_line = self.source.mask().map(|m| m.get_line_u8(y)).transpose()?;
		let mut out = Vec::with_capacity(line.len());
		for (i, &v) in line.iter().enumerate() {
			let is_nodata = mask_line.as_ref().is_some_and(|m| m[i] == 0);
			out.push(match (is_nodata, self.palette.no_alpha) {
				(true, Some(color)) => color,
				_ => self.palette.lookup(f64::from(v)),
			});
		}
		Ok(out)
	}
}

impl Image for PaletteImage {
	fn width(&self) -> u32 {
		self.source.width()
	}
	fn height(&self) -> u32 {
		self.source.height()
	}
	fn channel_count(&self) -> u8 {
		self.palette.output_channels()
	}
	fn bbox(&self) -> &BoundingBox<f64> {
		self.source.bbox()
	}
	fn crs(&self) -> &Crs {
		self.source.crs()
	}
	fn sample_format(&self) -> SampleFormat {
		SampleFormat::U8
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		let channels = self.channel_count() as usize;
		Ok(self.line_rgba(y)?.into_iter().flat_map(|rgba| rgba[..channels].to_vec()).collect())
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		Ok(self.get_line_u8(y)?.into_iter().map(|v| u16::from(v) * 257).collect())
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		Ok(self.get_line_u8(y)?.into_iter().map(|v| f32::from(v) / 255.0).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::image::BasicImage;

	fn crs() -> Crs {
		Crs::new("EPSG:4326")
	}
	fn bbox() -> BoundingBox<f64> {
		BoundingBox::new(0.0, 0.0, 2.0, 1.0, crs())
	}

	fn source() -> Arc<dyn Image> {
		Arc::new(BasicImage::new_f32(2, 1, 1, bbox(), crs(), vec![0.0, 100.0]))
	}

	#[test]
	fn stepwise_palette_picks_the_lower_breakpoint() {
		let palette = Arc::new(
			Palette::new(vec![PaletteEntry { value: 0.0, rgba: [0, 0, 0, 255] }, PaletteEntry { value: 50.0, rgba: [255, 255, 255, 255] }], Interpolation::Stepwise, false).unwrap(),
		);
		let img = PaletteImage::new(source(), palette).unwrap();
		assert_eq!(img.channel_count(), 3);
		assert_eq!(img.get_line_u8(0).unwrap(), vec![0, 0, 0, 255, 255, 255]);
	}

	#[test]
	fn continuous_palette_interpolates() {
		let palette = Arc::new(
			Palette::new(vec![PaletteEntry { value: 0.0, rgba: [0, 0, 0, 255] }, PaletteEntry { value: 100.0, rgba: [200, 0, 0, 255] }], Interpolation::Continuous, true).unwrap(),
		);
		let img = PaletteImage::new(source(), palette).unwrap();
		assert_eq!(img.channel_count(), 4);
		let line = img.get_line_u8(0).unwrap();
		assert_eq!(&line[0..4], &[0, 0, 0, 255]);
		assert_eq!(&line[4..8], &[200, 0, 0, 255]);
	}

	#[test]
	fn nodata_pixels_use_the_no_alpha_color() {
		let mask = Arc::new(BasicImage::new_u8(2, 1, 1, bbox(), crs(), vec![255, 0]).as_mask());
		let source = Arc::new(BasicImage::new_f32(2, 1, 1, bbox(), crs(), vec![0.0, 100.0]).with_mask(mask)) as Arc<dyn Image>;
		let palette = Arc::new(
			Palette::new(vec![PaletteEntry { value: 0.0, rgba: [0, 0, 0, 255] }, PaletteEntry { value: 100.0, rgba: [200, 0, 0, 255] }], Interpolation::Stepwise, true)
				.unwrap()
				.with_no_alpha([1, 2, 3, 0]),
		);
		let img = PaletteImage::new(source, palette).unwrap();
		let line = img.get_line_u8(0).unwrap();
		assert_eq!(&line[0..4], &[0, 0, 0, 255]);
		assert_eq!(&line[4..8], &[1, 2, 3, 0]);
	}

	#[test]
	fn rejects_non_monotone_entries() {
		let err = Palette::new(vec![PaletteEntry { value: 1.0, rgba: [0; 4] }, PaletteEntry { value: 0.0, rgba: [0; 4] }], Interpolation::Stepwise, false);
		assert!(err.is_err());
	}
}
