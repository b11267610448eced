//! Hillshade, slope and aspect over a float elevation source: a 3x3 window
//! sliding down the source, backed by a rolling cache of the 3 most
//! recently fetched source lines (keyed by `line index % 3`, re-fetched only
//! on a cache miss).

use crate::image::{Image, SampleFormat};
use anyhow::{Result, bail, ensure};
use parking_lot::Mutex;
use rok4_core::{BoundingBox, Crs};
use std::sync::Arc;

/// Geographic CRS ground resolution conversion factor (degrees to meters at
/// the equator).
pub const METER_PER_DEG: f64 = 111_319.492;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeAlgorithm {
	Horn,
	ZevenbergenThorne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeUnit {
	Degree,
	Percent,
}

#[derive(Debug, Clone, Copy)]
pub enum TerrainOp {
	Relief { zenith_deg: f64, azimuth_deg: f64, z_factor: f64 },
	Slope { algorithm: SlopeAlgorithm, unit: SlopeUnit, max_slope: f64, nodata: f32 },
	Aspect { min_slope_deg: f64 },
}

const ASPECT_NODATA: f32 = -1.0;

struct LineSlot {
	index: Option<u32>,
	data: Vec<f32>,
}

/// Shared rolling window of 3 source lines, reused by relief/slope/aspect.
struct LineCache {
	slots: [LineSlot; 3],
}

impl LineCache {
	fn new() -> Self {
		LineCache { slots: [LineSlot { index: None, data: Vec::new() }, LineSlot { index: None, data: Vec::new() }, LineSlot { index: None, data: Vec::new() }] }
	}

	fn get(&mut self, source: &dyn Image, elev_nodata: f32, row: u32) -> Result<Vec<f32>> {
		let slot = &mut self.slots[row as usize % 3];
		if slot.index != Some(row) {
			slot.data = source.get_line_f32(row)?;
			if let Some(mask) = source.mask() {
				let mask_line = mask.get_line_u8(row)?;
				for (v, m) in slot.data.iter_mut().zip(mask_line) {
					if m == 0 {
						*v = elev_nodata;
					}
				}
			}
			slot.index = Some(row);
		}
		Ok(slot.data.clone())
	}
}

pub struct TerrainImage {
	source: Arc<dyn Image>,
	op: TerrainOp,
	elev_nodata: f32,
	width: u32,
	height: u32,
	bbox: BoundingBox<f64>,
	res_x_m: f64,
	res_y_m: f64,
	cache: Mutex<LineCache>,
}

impl TerrainImage {
	pub fn new(source: Arc<dyn Image>, op: TerrainOp, elev_nodata: f32) -> Result<Self> {
		ensure!(source.channel_count() == 1, "terrain operators require a single-channel elevation source");
		ensure!(source.width() > 2 && source.height() > 2, "terrain source must be at least 1px larger than the output on each side");

		let src_bbox = source.bbox();
		let rx = source.resolution_x();
		let ry = source.resolution_y();
		let bbox = BoundingBox::new(src_bbox.xmin + rx, src_bbox.ymin + ry, src_bbox.xmax - rx, src_bbox.ymax - ry, src_bbox.crs.clone());

		let (res_x_m, res_y_m) = if source.crs().is_geographic() { (rx * METER_PER_DEG, ry * METER_PER_DEG) } else { (rx, ry) };

		Ok(TerrainImage { width: source.width() - 2, height: source.height() - 2, bbox, res_x_m, res_y_m, source, op, elev_nodata, cache: Mutex::new(LineCache::new()) })
	}

	/// Fetches the 3x3 window of source samples for output pixel `(x, y)`.
	fn window_at(&self, y: u32, x: u32) -> Result<[f32; 9]> {
		let mut cache = self.cache.lock();
		let mut z = [0f32; 9];
		for j in 0..3u32 {
			let line = cache.get(self.source.as_ref(), self.elev_nodata, y + j)?;
			for i in 0..3u32 {
				z[(j * 3 + i) as usize] = line[(x + i) as usize];
			}
		}
		Ok(z)
	}

	fn has_nodata(&self, z: &[f32; 9]) -> bool {
		z.iter().any(|&v| v == self.elev_nodata)
	}

	fn gradients(&self, z: &[f32; 9], algorithm: SlopeAlgorithm) -> (f64, f64) {
		let z = z.map(f64::from);
		match algorithm {
			SlopeAlgorithm::Horn => {
				let dzdx = ((z[2] + 2.0 * z[5] + z[8]) - (z[0] + 2.0 * z[3] + z[6])) / (8.0 * self.res_x_m);
				let dzdy = ((z[6] + 2.0 * z[7] + z[8]) - (z[0] + 2.0 * z[1] + z[2])) / (8.0 * self.res_y_m);
				(dzdx, dzdy)
			}
			SlopeAlgorithm::ZevenbergenThorne => {
				let dzdx = (z[5] - z[3]) / (2.0 * self.res_x_m);
				let dzdy = (z[7] - z[1]) / (2.0 * self.res_y_m);
				(dzdx, dzdy)
			}
		}
	}

	fn relief_pixel(&self, z: &[f32; 9], zenith_deg: f64, azimuth_deg: f64, z_factor: f64) -> u8 {
		let (dzdx, dzdy) = self.gradients(z, SlopeAlgorithm::Horn);
		let slope_rad = (z_factor * (dzdx * dzdx + dzdy * dzdy).sqrt()).atan();
		let aspect_rad = dzdy.atan2(-dzdx);

		let zenith_rad = (90.0 - zenith_deg).to_radians();
		let azimuth_rad = (360.0 - azimuth_deg).to_radians();

		let illum = zenith_rad.cos() * slope_rad.cos() + zenith_rad.sin() * slope_rad.sin() * (azimuth_rad - aspect_rad).cos();
		(illum.max(0.0) * 255.0).round().clamp(0.0, 255.0) as u8
	}

	fn slope_pixel(&self, z: &[f32; 9], algorithm: SlopeAlgorithm, unit: SlopeUnit, max_slope: f64) -> f32 {
		let (dzdx, dzdy) = self.gradients(z, algorithm);
		let gradient = (dzdx * dzdx + dzdy * dzdy).sqrt();
		let value = match unit {
			SlopeUnit::Degree => gradient.atan().to_degrees().clamp(0.0, 90.0),
			SlopeUnit::Percent => gradient * 100.0,
		};
		value.min(max_slope) as f32
	}

	fn aspect_pixel(&self, z: &[f32; 9], min_slope_deg: f64) -> f32 {
		let (dzdx, dzdy) = self.gradients(z, SlopeAlgorithm::Horn);
		let slope_deg = (dzdx * dzdx + dzdy * dzdy).sqrt().atan().to_degrees();
		if slope_deg < min_slope_deg {
			return ASPECT_NODATA;
		}
		let mut aspect = dzdy.atan2(-dzdx).to_degrees();
		if aspect < 0.0 {
			aspect += 360.0;
		}
		aspect as f32
	}

	fn compute_line(&self, y: u32) -> Result<Vec<f32>> {
		let mut out = Vec::with_capacity(self.width as usize);
		for x in 0..self.width {
			let z = self.window_at(y, x)?;
			let v = match self.op {
				TerrainOp::Relief { zenith_deg, azimuth_deg, z_factor } => {
					if self.has_nodata(&z) {
						0.0
					} else {
						f32::from(self.relief_pixel(&z, zenith_deg, azimuth_deg, z_factor))
					}
				}
				TerrainOp::Slope { algorithm, unit, max_slope, nodata } => {
					if self.has_nodata(&z) {
						nodata
					} else {
						self.slope_pixel(&z, algorithm, unit, max_slope)
					}
				}
				TerrainOp::Aspect { min_slope_deg } => {
					if self.has_nodata(&z) {
						ASPECT_NODATA
					} else {
						self.aspect_pixel(&z, min_slope_deg)
					}
				}
			};
			out.push(v);
		}
		Ok(out)
	}
}

impl Image for TerrainImage {
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
		self.source.crs()
	}
	fn sample_format(&self) -> SampleFormat {
		match self.op {
			TerrainOp::Relief { .. } => SampleFormat::U8,
			TerrainOp::Slope { .. } | TerrainOp::Aspect { .. } => SampleFormat::F32,
		}
	}

	fn get_line_u8(&self, y: u32) -> Result<Vec<u8>> {
		self.ensure_valid_line(y)?;
		if !matches!(self.op, TerrainOp::Relief { .. }) {
			bail!("slope/aspect outputs are floating point; request get_line_f32 instead");
		}
		Ok(self.compute_line(y)?.into_iter().map(|v| v as u8).collect())
	}

	fn get_line_u16(&self, y: u32) -> Result<Vec<u16>> {
		Ok(self.get_line_f32(y)?.into_iter().map(|v| v as u16).collect())
	}

	fn get_line_f32(&self, y: u32) -> Result<Vec<f32>> {
		self.ensure_valid_line(y)?;
		self.compute_line(y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::image::BasicImage;

	fn crs() -> Crs {
		Crs::new("LOCAL")
	}

	fn flat_source(size: u32, elevation: f32) -> Arc<dyn Image> {
		Arc::new(BasicImage::new_f32(size, size, 1, BoundingBox::new(0.0, 0.0, f64::from(size), f64::from(size), crs()), crs(), vec![elevation; (size * size) as usize]))
	}

	#[test]
	fn output_is_shrunk_by_one_pixel_on_each_side() {
		let source = flat_source(5, 100.0);
		let terrain = TerrainImage::new(source, TerrainOp::Slope { algorithm: SlopeAlgorithm::Horn, unit: SlopeUnit::Degree, max_slope: 90.0, nodata: -9999.0 }, -9999.0).unwrap();
		assert_eq!(terrain.width(), 3);
		assert_eq!(terrain.height(), 3);
	}

	#[test]
	fn flat_terrain_has_zero_slope() {
		let source = flat_source(5, 100.0);
		let terrain = TerrainImage::new(source, TerrainOp::Slope { algorithm: SlopeAlgorithm::Horn, unit: SlopeUnit::Degree, max_slope: 90.0, nodata: -9999.0 }, -9999.0).unwrap();
		let line = terrain.get_line_f32(0).unwrap();
		assert!(line.iter().all(|&v| v.abs() < 1e-6));
	}

	#[test]
	fn flat_terrain_aspect_is_sentinel_below_min_slope() {
		let source = flat_source(5, 100.0);
		let terrain = TerrainImage::new(source, TerrainOp::Aspect { min_slope_deg: 1.0 }, -9999.0).unwrap();
		let line = terrain.get_line_f32(0).unwrap();
		assert!(line.iter().all(|&v| v == ASPECT_NODATA));
	}

	#[test]
	fn relief_of_flat_terrain_is_uniform() {
		let source = flat_source(5, 100.0);
		let terrain = TerrainImage::new(source, TerrainOp::Relief { zenith_deg: 45.0, azimuth_deg: 315.0, z_factor: 1.0 }, -9999.0).unwrap();
		let line = terrain.get_line_u8(0).unwrap();
		assert!(line.windows(2).all(|w| w[0] == w[1]));
	}
}
