//! Bounding box arithmetic, tile matrices and tile matrix sets.

use crate::crs::Crs;
use anyhow::{Result, ensure};
use rok4_derive::context;
use std::fmt::Debug;
use std::ops::{Add, Sub};

/// A value usable as a bounding box extremum. Implemented for the numeric
/// types that make sense as pixel or geographic coordinates; arithmetic
/// that requires floating point (phase, reprojection) is only implemented
/// for `BoundingBox<f64>`, see the inherent `impl` block below.
pub trait Extremum: Copy + PartialOrd + Add<Output = Self> + Sub<Output = Self> + Debug {
	fn min(a: Self, b: Self) -> Self;
	fn max(a: Self, b: Self) -> Self;
}

macro_rules! impl_extremum {
	($($t:ty),*) => {
		$(impl Extremum for $t {
			fn min(a: Self, b: Self) -> Self { if a < b { a } else { b } }
			fn max(a: Self, b: Self) -> Self { if a > b { a } else { b } }
		})*
	};
}
impl_extremum!(f64, f32, i64, i32);

/// Four extrema plus an attached CRS code, generic over the numeric type of
/// the extrema (pixel bounding boxes use integer types; geographic/terrain
/// bounding boxes use `f64`).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox<T: Extremum> {
	pub xmin: T,
	pub ymin: T,
	pub xmax: T,
	pub ymax: T,
	pub crs: Crs,
}

impl<T: Extremum> BoundingBox<T> {
	pub fn new(xmin: T, ymin: T, xmax: T, ymax: T, crs: Crs) -> Self {
		BoundingBox { xmin, ymin, xmax, ymax, crs }
	}

	#[must_use]
	pub fn is_null(&self) -> bool {
		!(self.xmin < self.xmax) || !(self.ymin < self.ymax)
	}

	/// True when the box has a null area even though `xmin < xmax` and
	/// `ymin < ymax` individually hold in floating comparisons but the
	/// values are not finite (NaN extrema, for instance).
	#[must_use]
	pub fn has_null_area(&self) -> bool {
		self.is_null()
	}

	#[must_use]
	pub fn intersects(&self, other: &BoundingBox<T>) -> bool {
		self.xmin < other.xmax && other.xmin < self.xmax && self.ymin < other.ymax && other.ymin < self.ymax
	}

	#[must_use]
	pub fn contains(&self, x: T, y: T) -> bool {
		x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
	}

	#[must_use]
	pub fn get_intersection(&self, other: &BoundingBox<T>) -> BoundingBox<T> {
		BoundingBox {
			xmin: Extremum::max(self.xmin, other.xmin),
			ymin: Extremum::max(self.ymin, other.ymin),
			xmax: Extremum::min(self.xmax, other.xmax),
			ymax: Extremum::min(self.ymax, other.ymax),
			crs: self.crs.clone(),
		}
	}

	#[must_use]
	pub fn get_union(&self, other: &BoundingBox<T>) -> BoundingBox<T> {
		BoundingBox {
			xmin: Extremum::min(self.xmin, other.xmin),
			ymin: Extremum::min(self.ymin, other.ymin),
			xmax: Extremum::max(self.xmax, other.xmax),
			ymax: Extremum::max(self.ymax, other.ymax),
			crs: self.crs.clone(),
		}
	}
}

impl BoundingBox<f64> {
	/// Pixel phase along X: the fractional offset of `xmin` from the
	/// coordinate origin, expressed in pixels at resolution `res`.
	#[must_use]
	pub fn phase_xmin(&self, res: f64) -> f64 {
		let p = (self.xmin / res).fract();
		if p < 0.0 { p + 1.0 } else { p }
	}

	/// Pixel phase along X at `xmax`, expressed as the fractional distance
	/// from `xmax` down to the next lower pixel boundary.
	#[must_use]
	pub fn phase_xmax(&self, res: f64) -> f64 {
		let p = (self.xmax / res).fract();
		let p = if p < 0.0 { p + 1.0 } else { p };
		(1.0 - p).rem_euclid(1.0)
	}

	pub fn expand(&mut self, pixels: f64, res_x: f64, res_y: f64) {
		self.xmin -= pixels * res_x;
		self.xmax += pixels * res_x;
		self.ymin -= pixels * res_y;
		self.ymax += pixels * res_y;
	}

	/// Reprojects the box from `from` to `to` by sampling each side into
	/// `n_segments` points (each edge contributes `n_segments + 1` points,
	/// corners included), transforming all of them, and taking the new
	/// extrema. This preserves a bounding envelope over non-linear
	/// transforms, unlike reprojecting the four corners alone.
	#[context("failed to reproject bounding box from {} to {}", from.canonical_code(), to.canonical_code())]
	pub fn reproject(&self, from: &Crs, to: &Crs, n_segments: usize) -> Result<BoundingBox<f64>> {
		ensure!(n_segments > 0, "n_segments must be > 0");
		let mut points = Vec::with_capacity(4 * (n_segments + 1));
		for i in 0..=n_segments {
			let t = i as f64 / n_segments as f64;
			let x = self.xmin + t * (self.xmax - self.xmin);
			points.push((x, self.ymin));
			points.push((x, self.ymax));
			let y = self.ymin + t * (self.ymax - self.ymin);
			points.push((self.xmin, y));
			points.push((self.xmax, y));
		}

		let mut xmin = f64::INFINITY;
		let mut ymin = f64::INFINITY;
		let mut xmax = f64::NEG_INFINITY;
		let mut ymax = f64::NEG_INFINITY;
		for (x, y) in points {
			let (ox, oy) = from.project_point(to, x, y)?;
			xmin = xmin.min(ox);
			ymin = ymin.min(oy);
			xmax = xmax.max(ox);
			ymax = ymax.max(oy);
		}

		Ok(BoundingBox { xmin, ymin, xmax, ymax, crs: to.clone() })
	}
}

/// Inclusive column/row limits of tiles intersecting a bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLimits {
	pub min_col: u32,
	pub max_col: u32,
	pub min_row: u32,
	pub max_row: u32,
}

/// A single level of a pyramid: resolution, origin of the top-left tile,
/// tile pixel dimensions, and matrix extent in tiles.
#[derive(Debug, Clone)]
pub struct TileMatrix {
	pub id: String,
	pub resolution: f64,
	pub x0: f64,
	pub y0: f64,
	pub tile_width: u32,
	pub tile_height: u32,
	pub matrix_width: u32,
	pub matrix_height: u32,
}

impl TileMatrix {
	#[must_use]
	pub fn cell_width(&self) -> f64 {
		self.resolution * self.tile_width as f64
	}

	#[must_use]
	pub fn cell_height(&self) -> f64 {
		self.resolution * self.tile_height as f64
	}

	/// Bounding box (in the matrix's CRS) covering the whole matrix.
	#[must_use]
	pub fn bbox(&self, crs: &Crs) -> BoundingBox<f64> {
		BoundingBox::new(
			self.x0,
			self.y0 - self.cell_height() * self.matrix_height as f64,
			self.x0 + self.cell_width() * self.matrix_width as f64,
			self.y0,
			crs.clone(),
		)
	}

	/// Column/row limits of tiles intersecting `bbox`, clamped to the
	/// matrix bounds. Rows grow downward from the top, i.e. row 0 touches
	/// `y0`: `row = floor((y0 - y) / cell_height)`.
	#[must_use]
	pub fn bbox_to_tile_limits(&self, bbox: &BoundingBox<f64>) -> TileLimits {
		let cw = self.cell_width();
		let ch = self.cell_height();

		let min_col = ((bbox.xmin - self.x0) / cw).floor();
		let max_col = ((bbox.xmax - self.x0) / cw).ceil() - 1.0;
		let min_row = ((self.y0 - bbox.ymax) / ch).floor();
		let max_row = ((self.y0 - bbox.ymin) / ch).ceil() - 1.0;

		// A request entirely outside the matrix clamps to the nearest edge
		// row/column (matching the underlying implementation's index
		// arithmetic, which bottoms out at the matrix's last valid index in
		// either direction rather than producing an out-of-range index).
		let clamp = |v: f64, hi: u32| -> u32 {
			if v < 0.0 || v >= hi as f64 {
				hi.saturating_sub(1)
			} else {
				v as u32
			}
		};

		TileLimits {
			min_col: clamp(min_col, self.matrix_width),
			max_col: clamp(max_col, self.matrix_width),
			min_row: clamp(min_row, self.matrix_height),
			max_row: clamp(max_row, self.matrix_height),
		}
	}

	/// Inverse of `bbox_to_tile_limits`: the bounding box covered by the
	/// given tile limits.
	#[must_use]
	pub fn tile_limits_to_bbox(&self, limits: &TileLimits, crs: &Crs) -> BoundingBox<f64> {
		let cw = self.cell_width();
		let ch = self.cell_height();
		BoundingBox::new(
			self.x0 + limits.min_col as f64 * cw,
			self.y0 - (limits.max_row as f64 + 1.0) * ch,
			self.x0 + (limits.max_col as f64 + 1.0) * cw,
			self.y0 - limits.min_row as f64 * ch,
			crs.clone(),
		)
	}
}

/// An ordered set of tile matrices sharing a CRS.
#[derive(Debug, Clone)]
pub struct TileMatrixSet {
	pub id: String,
	pub title: String,
	pub keywords: Vec<String>,
	pub crs: Crs,
	/// Levels in resolution-descending order (coarsest first), matching the
	/// data model invariant that resolution ordering is stable.
	pub levels: Vec<TileMatrix>,
}

impl TileMatrixSet {
	#[must_use]
	pub fn level(&self, id: &str) -> Option<&TileMatrix> {
		self.levels.iter().find(|l| l.id == id)
	}

	/// Whether the sequence forms a quad-tree: each level's resolution is
	/// exactly half of the previous one (within 0.01% tolerance), sharing
	/// origin and tile size.
	#[must_use]
	pub fn is_quad_tree(&self) -> bool {
		if self.levels.len() < 2 {
			return true;
		}
		self.levels.windows(2).all(|w| {
			let (coarse, fine) = (&w[0], &w[1]);
			let expected = coarse.resolution / 2.0;
			let tol = expected * 0.0001;
			(fine.resolution - expected).abs() <= tol
				&& (fine.x0 - coarse.x0).abs() < 1e-9
				&& (fine.y0 - coarse.y0).abs() < 1e-9
				&& fine.tile_width == coarse.tile_width
				&& fine.tile_height == coarse.tile_height
		})
	}

	/// Finds the level in `self` whose effective resolution ratio to
	/// `other_level` (after reprojecting the intersection of the two TMS's
	/// definition areas) lies in `[0.8, 1.5]` and is closest to 1.
	#[must_use]
	pub fn corresponding_level<'a>(&'a self, other_level: &TileMatrix) -> Option<&'a TileMatrix> {
		let ratio_ok = |res: f64| -> Option<f64> {
			let ratio = res / other_level.resolution;
			if (0.8..=1.5).contains(&ratio) { Some((ratio - 1.0).abs()) } else { None }
		};
		self
			.levels
			.iter()
			.filter_map(|l| ratio_ok(l.resolution).map(|d| (l, d)))
			.min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
			.map(|(l, _)| l)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use rstest::rstest;

	fn crs() -> Crs {
		Crs::new("EPSG:4326")
	}

	#[test]
	fn intersection_and_union() {
		let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, crs());
		let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0, crs());
		assert!(a.intersects(&b));
		let i = a.get_intersection(&b);
		assert_eq!((i.xmin, i.ymin, i.xmax, i.ymax), (5.0, 5.0, 10.0, 10.0));
		let u = a.get_union(&b);
		assert_eq!((u.xmin, u.ymin, u.xmax, u.ymax), (0.0, 0.0, 15.0, 15.0));
	}

	#[test]
	fn null_box_detection() {
		assert!(BoundingBox::new(10.0, 0.0, 0.0, 10.0, crs()).is_null());
		assert!(!BoundingBox::new(0.0, 0.0, 10.0, 10.0, crs()).is_null());
	}

	#[rstest]
	#[case(0.0, 10.0, 1.0)]
	#[case(0.5, 10.5, 1.0)]
	#[case(-0.5, 9.5, 1.0)]
	fn phase_sums_close_to_width_mod_one(#[case] xmin: f64, #[case] xmax: f64, #[case] res: f64) {
		let b = BoundingBox::new(xmin, 0.0, xmax, 1.0, crs());
		let expected = ((xmax - xmin) / res).rem_euclid(1.0);
		let actual = b.phase_xmin(res) + b.phase_xmax(res);
		assert!((actual - expected).abs() <= 0.001 || (actual - expected - 1.0).abs() <= 0.001);
	}

	#[test]
	fn crs_round_trip_bbox() {
		let wgs84 = Crs::new("EPSG:4326");
		let webm = Crs::new("EPSG:3857");
		let b = BoundingBox::new(-180.0, -85.0511, 180.0, 85.0511, wgs84.clone());
		let out = b.reproject(&wgs84, &webm, 256).unwrap();
		assert_abs_diff_eq!(out.xmin, -20037508.34, epsilon = 0.5);
		assert_abs_diff_eq!(out.ymin, -20037508.34, epsilon = 0.5);
		assert_abs_diff_eq!(out.xmax, 20037508.34, epsilon = 0.5);
		assert_abs_diff_eq!(out.ymax, 20037508.34, epsilon = 0.5);
	}

	fn matrix(id: &str, resolution: f64) -> TileMatrix {
		TileMatrix {
			id: id.to_string(),
			resolution,
			x0: 0.0,
			y0: 0.0,
			tile_width: 256,
			tile_height: 256,
			matrix_width: 10,
			matrix_height: 10,
		}
	}

	#[test]
	fn quad_tree_recognition() {
		let tms = TileMatrixSet {
			id: "test".into(),
			title: "test".into(),
			keywords: vec![],
			crs: Crs::new("EPSG:3857"),
			levels: vec![matrix("0", 156543.034), matrix("1", 78271.517), matrix("2", 39135.758)],
		};
		assert!(tms.is_quad_tree());

		let mut perturbed = tms.clone();
		perturbed.levels[1].resolution *= 1.01;
		assert!(!perturbed.is_quad_tree());
	}

	#[test]
	fn tile_limits_math() {
		let tm = TileMatrix {
			id: "0".into(),
			resolution: 1000.0,
			x0: 0.0,
			y0: 0.0,
			tile_width: 256,
			tile_height: 256,
			matrix_width: 10,
			matrix_height: 10,
		};
		let bbox = BoundingBox::new(0.0, 0.0, 512_000.0, 256_000.0, Crs::new("EPSG:3857"));
		let limits = tm.bbox_to_tile_limits(&bbox);
		assert_eq!(limits.min_col, 0);
		assert_eq!(limits.max_col, 1);
		assert_eq!(limits.min_row, 9);
		assert_eq!(limits.max_row, 9);
	}
}
