//! Layering N compatible images with a per-pixel merge rule, propagating an
//! output mask that is the union of the sources' masks.
//!
//! Internally every merge runs in normalized `[0, 1]` floating point
//! regardless of the sample format requested by the caller — the spec's
//! per-format `coeff` (255 for `u8`, 1 for `f32`) collapses to the same
//! normalized arithmetic, so one code path serves every output flavor.

use crate::image::{Image, SampleFormat};
use anyhow::{Result, bail, ensure};
use rok4_core::{BoundingBox, Crs};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
	Normal,
	Multiply,
	AlphaTop,
}

pub struct MergeLayer {
	pub image: Arc<dyn Image>,
	/// An RGB triple treated as transparent: pixels matching it (first three
	/// channels) are demoted to `alpha = 0` before merging.
	pub transparent: Option<[u8; 3]>,
}

/// Merges layers bottom-to-top (`layers[0]` is the bottom, `layers.last()`
/// the top) using `method`.
pub struct MergeImage {
	layers: Vec<MergeLayer>,
	method: MergeMethod,
	width: u32,
	height: u32,
	channels: u8,
	bbox: BoundingBox<f64>,
	crs: Crs,
}

impl MergeImage {
	pub fn new(layers: Vec<MergeLayer>, method: MergeMethod) -> Result<Self> {
		ensure!(!layers.is_empty(), "merge needs at least one layer");
		let first = &layers[0].image;
		for layer in &layers[1..] {
			first.is_compatible_with(layer.image.as_ref())?;
		}
		Ok(MergeImage { width: first.width(), height: first.height(), channels: first.channel_count(), bbox: first.bbox().clone(), crs: first.crs().clone(), layers, method })
	}

	fn layer_mask(&self, layer: &MergeLayer, data: &[f32], y: u32) -> Result<Vec<f32>> {
		if let Some(mask) = layer.image.mask() {
			Ok(mask.get_line_f32(y)?)
		} else {
			let channels = self.channels as usize;
			let pixels = data.len() / channels.max(1);
			let mut mask = vec![1.0f32; pixels];
			if let Some(t) = layer.transparent {
				if channels >= 3 {
					for (i, px) in data.chunks(channels).enumerate() {
						let matches = (0..3).all(|c| ((px[c] * 255.0).round() as u8) == t[c]);
						if matches {
							mask[i] = 0.0;
						}
					}
				}
			}
			Ok(mask)
		}
	}

	fn composite(&self, y: u32) -> Result<(Vec<f32>, Vec<f32>)> {
		let channels = self.channels as usize;
		let mut out = self.layers[0].image.get_line_f32(y)?;
		let mut out_mask = self.layer_mask(&self.layers[0], &out, y)?;

		for layer in &self.layers[1..] {
			let above = layer.image.get_line_f32(y)?;
			let above_mask = self.layer_mask(layer, &above, y)?;

			for px in 0..self.width as usize {
				let a_above = above_mask[px];
				let a_below = out_mask[px];
				match self.method {
					MergeMethod::Normal => {
						if a_above > 0.0 {
							for c in 0..channels {
								out[px * channels + c] = above[px * channels + c];
							}
							out_mask[px] = a_above;
						}
					}
					MergeMethod::Multiply => {
						if a_above > 0.0 {
							for c in 0..channels {
								out[px * channels + c] *= above[px * channels + c];
							}
							out_mask[px] = a_below * a_above;
						}
					}
					MergeMethod::AlphaTop => {
						let a_new = a_above + a_below * (1.0 - a_above);
						if a_new > 0.0 {
							for c in 0..channels {
								let blended = a_above * above[px * channels + c] + a_below * out[px * channels + c] * (1.0 - a_above);
								out[px * channels + c] = blended / a_new;
							}
						}
						out_mask[px] = a_new;
					}
				}
			}
		}

		Ok((out, out_mask))
	}
}

impl Image for MergeImage {
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
		SampleFormat::F32
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		let (data, _) = self.composite(y)?;
		Ok(data.iter().map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8).collect())
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		self.ensure_valid_line(y)?;
		let (data, _) = self.composite(y)?;
		Ok(data.iter().map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16).collect())
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		self.ensure_valid_line(y)?;
		let (data, _) = self.composite(y)?;
		Ok(data)
	}
}

/// The union of every layer's mask, computed independently of the merged
/// data — used when a caller needs just the coverage, not the pixels.
pub struct MergeMask {
	layers: Vec<Arc<dyn Image>>,
	width: u32,
	height: u32,
	bbox: BoundingBox<f64>,
	crs: Crs,
}

impl MergeMask {
	pub fn new(layers: Vec<Arc<dyn Image>>) -> Result<Self> {
		let Some(first) = layers.first() else { bail!("merge mask needs at least one layer") };
		for layer in &layers[1..] {
			ensure!(layer.width() == first.width() && layer.height() == first.height(), "merge mask layers must share dimensions");
		}
		Ok(MergeMask { width: first.width(), height: first.height(), bbox: first.bbox().clone(), crs: first.crs().clone(), layers })
	}
}

impl Image for MergeMask {
	fn width(&self) -> u32 {
		self.width
	}
	fn height(&self) -> u32 {
		self.height
	}
	fn channel_count(&self) -> u8 {
		1
	}
	fn bbox(&self) -> &BoundingBox<f64> {
		&self.bbox
	}
	fn crs(&self) -> &Crs {
		&self.crs
	}
	fn sample_format(&self) -> SampleFormat {
		SampleFormat::U8
	}
	fn is_mask(&self) -> bool {
		true
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		let mut union = vec![0u8; self.width as usize];
		for layer in &self.layers {
			let line = if let Some(mask) = layer.mask() { mask.get_line_u8(y)? } else { vec![255u8; self.width as usize] };
			if line.iter().all(|&v| v == 255) {
				return Ok(vec![255u8; self.width as usize]);
			}
			for (u, &v) in union.iter_mut().zip(line.iter()) {
				*u = (*u).max(v);
			}
		}
		Ok(union)
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
		Crs::new("EPSG:3857")
	}
	fn bbox() -> BoundingBox<f64> {
		BoundingBox::new(0.0, 0.0, 2.0, 2.0, crs())
	}

	fn flat(value: u8) -> Arc<dyn Image> {
		Arc::new(BasicImage::new_u8(2, 2, 1, bbox(), crs(), vec![value; 4]))
	}

	fn flat_with_mask(value: u8, mask_value: u8) -> Arc<dyn Image> {
		let mask = Arc::new(BasicImage::new_u8(2, 2, 1, bbox(), crs(), vec![mask_value; 4]).as_mask());
		Arc::new(BasicImage::new_u8(2, 2, 1, bbox(), crs(), vec![value; 4]).with_mask(mask))
	}

	#[test]
	fn normal_merge_lets_top_layer_win_where_masked() {
		let bottom = flat(10);
		let top = flat_with_mask(200, 255);
		let merged = MergeImage::new(vec![MergeLayer { image: bottom, transparent: None }, MergeLayer { image: top, transparent: None }], MergeMethod::Normal).unwrap();
		assert_eq!(merged.get_line_u8(0).unwrap(), vec![200, 200]);
	}

	#[test]
	fn normal_merge_keeps_bottom_where_top_is_masked_out() {
		let bottom = flat(10);
		let top = flat_with_mask(200, 0);
		let merged = MergeImage::new(vec![MergeLayer { image: bottom, transparent: None }, MergeLayer { image: top, transparent: None }], MergeMethod::Normal).unwrap();
		assert_eq!(merged.get_line_u8(0).unwrap(), vec![10, 10]);
	}

	#[test]
	fn multiply_merge_scales_the_base() {
		let bottom = flat(255);
		let top = flat_with_mask(128, 255);
		let merged = MergeImage::new(vec![MergeLayer { image: bottom, transparent: None }, MergeLayer { image: top, transparent: None }], MergeMethod::Multiply).unwrap();
		let out = merged.get_line_u8(0).unwrap();
		assert!(out[0] >= 126 && out[0] <= 130);
	}

	#[test]
	fn merge_mask_is_the_union_of_source_masks() {
		let a = flat_with_mask(1, 0);
		let b = flat_with_mask(1, 255);
		let mask = MergeMask::new(vec![a, b]).unwrap();
		assert_eq!(mask.get_line_u8(0).unwrap(), vec![255, 255]);
	}
}
