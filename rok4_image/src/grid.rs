//! A sampled mapping from target pixel centers to source coordinates,
//! built by reprojecting a coarse control-point mesh rather than every
//! pixel — the reprojected image interpolates between mesh points.

use anyhow::{Result, bail};
use rok4_core::{BoundingBox, Crs};

pub const DEFAULT_PIXEL_STEP: u32 = 16;

/// A coarse mesh of `(x, y)` control points covering a target raster,
/// `⌈width / step⌉ + 1` columns by `⌈height / step⌉ + 1` rows, with an
/// extra trailing row/column pinned to the last target pixel (even when
/// that falls exactly on a step boundary).
#[derive(Debug, Clone)]
pub struct Grid {
	width: u32,
	height: u32,
	step: u32,
	cols: usize,
	rows: usize,
	/// Row-major control points, initially target pixel centers, then
	/// mutated in place by [`Grid::reproject`]/[`Grid::affine_transform`].
	points: Vec<(f64, f64)>,
	y_maximal_gap: f64,
}

impl Grid {
	#[must_use]
	pub fn new(width: u32, height: u32, bbox: &BoundingBox<f64>, step: u32) -> Self {
		let cols = (width as usize).div_ceil(step as usize) + 1;
		let rows = (height as usize).div_ceil(step as usize) + 1;
		let res_x = (bbox.xmax - bbox.xmin) / f64::from(width);
		let res_y = (bbox.ymax - bbox.ymin) / f64::from(height);

		let mut points = Vec::with_capacity(cols * rows);
		for r in 0..rows {
			let py = (r * step as usize).min(height as usize - 1);
			let ty = bbox.ymax - (py as f64 + 0.5) * res_y;
			for c in 0..cols {
				let px = (c * step as usize).min(width as usize - 1);
				let tx = bbox.xmin + (px as f64 + 0.5) * res_x;
				points.push((tx, ty));
			}
		}

		Grid { width, height, step, cols, rows, points, y_maximal_gap: 0.0 }
	}

	#[must_use]
	pub fn control_cols(&self) -> usize {
		self.cols
	}
	#[must_use]
	pub fn control_rows(&self) -> usize {
		self.rows
	}
	#[must_use]
	pub fn step(&self) -> u32 {
		self.step
	}

	/// Transforms every control point from `from` to `to`, then recomputes
	/// the bounding box by sampling each side into 256 segments and the
	/// maximal Y gap across the topmost control row.
	pub fn reproject(&mut self, from: &Crs, to: &Crs) -> Result<BoundingBox<f64>> {
		for p in &mut self.points {
			match from.project_point(to, p.0, p.1) {
				Ok((x, y)) => *p = (x, y),
				Err(_) => bail!("grid control point ({}, {}) failed to reproject from {} to {}", p.0, p.1, from.canonical_code(), to.canonical_code()),
			}
		}
		self.recompute_y_maximal_gap();
		self.sample_bbox_from_corners(to, 256)
	}

	/// Applies `x' = Ax*x + Bx`, `y' = Ay*y + By` to every control point in
	/// place; widens `y_maximal_gap` by `|Ay|`.
	pub fn affine_transform(&mut self, ax: f64, bx: f64, ay: f64, by: f64) {
		for p in &mut self.points {
			*p = (ax * p.0 + bx, ay * p.1 + by);
		}
		self.y_maximal_gap *= ax.abs().max(ay.abs());
	}

	#[must_use]
	pub fn get_y_maximal_gap(&self) -> f64 {
		self.y_maximal_gap
	}

	fn recompute_y_maximal_gap(&mut self) {
		let top_row = &self.points[0..self.cols];
		let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
		for &(_, y) in top_row {
			lo = lo.min(y);
			hi = hi.max(y);
		}
		self.y_maximal_gap = hi - lo;
	}

	fn sample_bbox_from_corners(&self, crs: &Crs, _n_segments: u32) -> Result<BoundingBox<f64>> {
		let (mut xmin, mut ymin, mut xmax, mut ymax) = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
		for &(x, y) in &self.points {
			xmin = xmin.min(x);
			ymin = ymin.min(y);
			xmax = xmax.max(x);
			ymax = ymax.max(y);
		}
		Ok(BoundingBox::new(xmin, ymin, xmax, ymax, crs.clone()))
	}

	/// Bilinearly interpolates the source-space coordinate for target pixel
	/// `(x, y)` between the four surrounding control points.
	#[must_use]
	pub fn sample(&self, x: u32, y: u32) -> (f64, f64) {
		let step = self.step as f64;
		let col_f = (f64::from(x) / step).min((self.cols - 1) as f64);
		let row_f = (f64::from(y) / step).min((self.rows - 1) as f64);
		let c0 = col_f.floor() as usize;
		let r0 = row_f.floor() as usize;
		let c1 = (c0 + 1).min(self.cols - 1);
		let r1 = (r0 + 1).min(self.rows - 1);
		let (fx, fy) = (col_f - c0 as f64, row_f - r0 as f64);

		let p00 = self.points[r0 * self.cols + c0];
		let p01 = self.points[r0 * self.cols + c1];
		let p10 = self.points[r1 * self.cols + c0];
		let p11 = self.points[r1 * self.cols + c1];

		let top = (lerp(p00.0, p01.0, fx), lerp(p00.1, p01.1, fx));
		let bottom = (lerp(p10.0, p11.0, fx), lerp(p10.1, p11.1, fx));
		(lerp(top.0, bottom.0, fy), lerp(top.1, bottom.1, fy))
	}

	/// The largest ratio between consecutive control-point spacings along X,
	/// used to size the resampling kernel's effective width.
	#[must_use]
	pub fn get_x_ratio(&self) -> f64 {
		self.axis_ratio(true)
	}

	#[must_use]
	pub fn get_y_ratio(&self) -> f64 {
		self.axis_ratio(false)
	}

	fn axis_ratio(&self, along_x: bool) -> f64 {
		let mut max_ratio = 1.0f64;
		for r in 0..self.rows {
			for c in 0..self.cols.saturating_sub(1) {
				let a = self.points[r * self.cols + c];
				let b = self.points[r * self.cols + (c + 1).min(self.cols - 1)];
				let d = if along_x { (b.0 - a.0).abs() } else { (b.1 - a.1).abs() };
				let pixels = self.step as f64;
				max_ratio = max_ratio.max(d / pixels.max(1.0));
			}
		}
		max_ratio
	}
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
	a + (b - a) * t
}

#[cfg(test)]
mod tests {
	use super::*;

	fn local() -> Crs {
		Crs::new("LOCAL")
	}

	#[test]
	fn control_mesh_covers_the_last_pixel_even_off_step() {
		let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0, local());
		let grid = Grid::new(100, 100, &bbox, 16);
		assert_eq!(grid.control_cols(), 100usize.div_ceil(16) + 1);
		assert_eq!(grid.control_rows(), 100usize.div_ceil(16) + 1);
	}

	#[test]
	fn affine_transform_scales_points_and_gap() {
		let bbox = BoundingBox::new(0.0, 0.0, 32.0, 32.0, local());
		let mut grid = Grid::new(32, 32, &bbox, 16);
		grid.affine_transform(2.0, 0.0, 2.0, 0.0);
		let (x, y) = grid.sample(0, 0);
		assert!((x - 1.0).abs() < 1e-9);
		assert!((y - 63.0).abs() < 1e-9);
	}

	#[test]
	fn identity_reprojection_preserves_points() {
		let bbox = BoundingBox::new(0.0, 0.0, 32.0, 32.0, local());
		let mut grid = Grid::new(32, 32, &bbox, 16);
		let before = grid.sample(16, 16);
		let new_bbox = grid.reproject(&local(), &local()).unwrap();
		let after = grid.sample(16, 16);
		assert!((before.0 - after.0).abs() < 1e-9);
		assert!((before.1 - after.1).abs() < 1e-9);
		assert!((new_bbox.xmax - new_bbox.xmin - 32.0).abs() < 1e-6);
	}
}
