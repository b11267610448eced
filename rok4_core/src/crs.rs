//! Coordinate reference system handles.
//!
//! The full system defers projection math to a geodesy library (PROJ in the
//! original implementation). This crate is the per-request pixel pipeline,
//! not a geodesy engine, so it ships a small internal registry covering the
//! handful of systems the reprojection contract needs to be exercised
//! against (`EPSG:4326` geographic, `EPSG:3857` spherical Web Mercator) plus
//! a generic identity/affine fallback for test fixtures that declare their
//! own local CRS. Anything else is accepted as a *requested* code but marked
//! undefined, per the invariant in the data model.

use anyhow::{Result, bail};
use rok4_derive::context;
use std::f64::consts::PI;
use std::sync::Arc;

/// Sentinel canonical code used when a requested code could not be resolved
/// against the registry.
pub const NO_PROJ_CODE: &str = "unknown";

const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Approximate meters per degree at the equator, used to convert geographic
/// resolutions into linear ones for the relief/slope/aspect operators.
pub const METER_PER_DEG: f64 = 111_319.492;

/// A geographic bounding box describing the area over which a projection is
/// numerically valid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefinitionArea {
	pub xmin: f64,
	pub ymin: f64,
	pub xmax: f64,
	pub ymax: f64,
}

impl DefinitionArea {
	pub const WORLD: DefinitionArea = DefinitionArea {
		xmin: -180.0,
		ymin: -90.0,
		xmax: 180.0,
		ymax: 90.0,
	};

	pub const WEB_MERCATOR: DefinitionArea = DefinitionArea {
		xmin: -180.0,
		ymin: -85.051_128_78,
		xmax: 180.0,
		ymax: 85.051_128_78,
	};
}

/// Whether a CRS's native axes are geographic (degrees) or projected
/// (linear units, usually meters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisUnit {
	Degree,
	Meter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectionKind {
	Geographic4326,
	WebMercator3857,
	/// A locally-defined, already-planar CRS: reprojection to/from it is the
	/// identity unless the other side is also `Local`, in which case it is
	/// also the identity (same local frame).
	Local,
}

/// A resolved projection handle. Cheap to clone (reference-counted), so it
/// can be cached per-thread without re-parsing the code.
#[derive(Debug, Clone)]
struct ProjectionHandle {
	kind: ProjectionKind,
	area: DefinitionArea,
	unit: AxisUnit,
}

/// A coordinate reference system value.
///
/// Carries the code as the client presented it (`requested_code`, case
/// preserved) alongside the canonical code resolved against the registry.
/// When resolution fails, `canonical_code` is [`NO_PROJ_CODE`] and the CRS
/// is "undefined": it may be stored and compared for equality, but any
/// attempt to reproject with it fails.
#[derive(Debug, Clone)]
pub struct Crs {
	requested_code: String,
	canonical_code: String,
	handle: Option<Arc<ProjectionHandle>>,
}

impl Crs {
	/// Resolves a code such as `"EPSG:4326"` (case-insensitive) against the
	/// internal registry. Unknown codes still produce a `Crs` value, marked
	/// undefined, so callers can carry it through the data model without an
	/// early error; only reprojection rejects it.
	pub fn new(requested_code: &str) -> Crs {
		let upper = requested_code.to_ascii_uppercase();
		let handle = match upper.as_str() {
			"EPSG:4326" | "CRS:84" => Some(Arc::new(ProjectionHandle {
				kind: ProjectionKind::Geographic4326,
				area: DefinitionArea::WORLD,
				unit: AxisUnit::Degree,
			})),
			"EPSG:3857" | "EPSG:900913" => Some(Arc::new(ProjectionHandle {
				kind: ProjectionKind::WebMercator3857,
				area: DefinitionArea::WEB_MERCATOR,
				unit: AxisUnit::Meter,
			})),
			"LOCAL" => Some(Arc::new(ProjectionHandle {
				kind: ProjectionKind::Local,
				area: DefinitionArea::WORLD,
				unit: AxisUnit::Meter,
			})),
			_ => None,
		};

		Crs {
			requested_code: requested_code.to_string(),
			canonical_code: handle.as_ref().map_or_else(|| NO_PROJ_CODE.to_string(), |_| upper),
			handle,
		}
	}

	#[must_use]
	pub fn requested_code(&self) -> &str {
		&self.requested_code
	}

	#[must_use]
	pub fn canonical_code(&self) -> &str {
		&self.canonical_code
	}

	#[must_use]
	pub fn is_defined(&self) -> bool {
		self.handle.is_some()
	}

	/// The geographic area over which this projection is valid. Returns
	/// `None` for an undefined CRS.
	#[must_use]
	pub fn definition_area(&self) -> Option<DefinitionArea> {
		self.handle.as_ref().map(|h| h.area)
	}

	#[must_use]
	pub fn axis_unit(&self) -> AxisUnit {
		self.handle.as_ref().map_or(AxisUnit::Meter, |h| h.unit)
	}

	#[must_use]
	pub fn is_geographic(&self) -> bool {
		self.axis_unit() == AxisUnit::Degree
	}

	/// Projects a single point from `self` into `to`. Returns an error if
	/// either CRS is undefined or the point falls outside the source's
	/// definition area, mirroring `ProjectionError` in the error taxonomy
	/// (CRS unknown or reprojection numerically invalid).
	#[context("failed to reproject point ({x}, {y}) from {} to {}", self.canonical_code, to.canonical_code)]
	pub fn project_point(&self, to: &Crs, x: f64, y: f64) -> Result<(f64, f64)> {
		let from_handle = self
			.handle
			.as_ref()
			.ok_or_else(|| anyhow::anyhow!("source CRS '{}' is undefined", self.requested_code))?;
		let to_handle = to
			.handle
			.as_ref()
			.ok_or_else(|| anyhow::anyhow!("target CRS '{}' is undefined", to.requested_code))?;

		if !x.is_finite() || !y.is_finite() {
			bail!("non-finite input coordinate ({x}, {y})");
		}

		let geo = to_geographic(from_handle.kind, x, y)?;
		let (ox, oy) = from_geographic(to_handle.kind, geo.0, geo.1)?;
		if !ox.is_finite() || !oy.is_finite() {
			bail!("reprojection produced a non-finite result (HUGE_VAL)");
		}
		Ok((ox, oy))
	}
}

impl PartialEq for Crs {
	fn eq(&self, other: &Self) -> bool {
		self.canonical_code == other.canonical_code
	}
}
impl Eq for Crs {}

/// Converts a point in `kind`'s native space to geographic degrees.
fn to_geographic(kind: ProjectionKind, x: f64, y: f64) -> Result<(f64, f64)> {
	match kind {
		ProjectionKind::Geographic4326 | ProjectionKind::Local => Ok((x, y)),
		ProjectionKind::WebMercator3857 => {
			let lon = x / EARTH_RADIUS_M * 180.0 / PI;
			let lat = (2.0 * ((y / EARTH_RADIUS_M).exp().atan()) - PI / 2.0) * 180.0 / PI;
			if !lat.is_finite() || !lon.is_finite() {
				bail!("web mercator inverse projection diverged at ({x}, {y})");
			}
			Ok((lon, lat))
		}
	}
}

/// Converts a geographic point (degrees) into `kind`'s native space.
fn from_geographic(kind: ProjectionKind, lon: f64, lat: f64) -> Result<(f64, f64)> {
	match kind {
		ProjectionKind::Geographic4326 | ProjectionKind::Local => Ok((lon, lat)),
		ProjectionKind::WebMercator3857 => {
			if !(-90.0..=90.0).contains(&lat) {
				bail!("latitude {lat} outside web mercator's definition area");
			}
			let x = lon.to_radians() * EARTH_RADIUS_M;
			let lat_rad = lat.to_radians();
			let y = EARTH_RADIUS_M * ((PI / 4.0 + lat_rad / 2.0).tan()).ln();
			Ok((x, y))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;
	use rstest::rstest;

	#[test]
	fn resolves_known_codes() {
		let crs = Crs::new("epsg:4326");
		assert!(crs.is_defined());
		assert_eq!(crs.canonical_code(), "EPSG:4326");
		assert_eq!(crs.requested_code(), "epsg:4326");
	}

	#[test]
	fn marks_unknown_codes_undefined() {
		let crs = Crs::new("EPSG:99999999");
		assert!(!crs.is_defined());
		assert_eq!(crs.canonical_code(), NO_PROJ_CODE);
	}

	#[rstest]
	#[case(-180.0, -85.0511, -20037508.34, -20037508.34)]
	#[case(180.0, 85.0511, 20037508.34, 20037508.34)]
	fn crs_round_trip_4326_to_3857(#[case] lon: f64, #[case] lat: f64, #[case] ex: f64, #[case] ey: f64) {
		let wgs84 = Crs::new("EPSG:4326");
		let webm = Crs::new("EPSG:3857");
		let (x, y) = wgs84.project_point(&webm, lon, lat).unwrap();
		assert_abs_diff_eq!(x, ex, epsilon = 0.5);
		assert_abs_diff_eq!(y, ey, epsilon = 0.5);
	}

	#[test]
	fn reprojection_with_undefined_crs_fails() {
		let undefined = Crs::new("EPSG:0");
		let webm = Crs::new("EPSG:3857");
		assert!(undefined.project_point(&webm, 0.0, 0.0).is_err());
	}

	#[test]
	fn equality_is_by_canonical_code() {
		assert_eq!(Crs::new("epsg:4326"), Crs::new("EPSG:4326"));
		assert_ne!(Crs::new("EPSG:4326"), Crs::new("EPSG:3857"));
	}
}
