//! GeoTIFF tag splicing: inserts `ModelPixelScale`, `ModelTiepoint`,
//! `GeoKeyDirectory`, `GeoDoubleParams`, `GeoAsciiParams` and a vendor
//! `NodataAscii` tag into an already-built raw TIFF header.
//!
//! Reference: <http://geotiff.maptools.org/spec/geotiff6.html>. The geokey
//! directory is built from a small table of projection descriptors, each
//! naming the GeoTIFF key codes a given projection family populates; this
//! mirrors the original's per-projection `ProjParams` tables but receives
//! already-resolved numeric parameters rather than parsing a proj string,
//! since this crate's [`rok4_core::Crs`] does not carry one (see DESIGN.md).

use rok4_core::io::{ByteWriter, patch_u16_le, patch_u32_le};

/// The six-tag IFD fragment spliced in right after the existing tag
/// directory, before the original header's inline-data blocks. Every
/// pointer/count field here is zeroed and patched in after the caller's
/// variable-length blocks (GeoKeyDirectory, GeoDoubleParams, ...) are sized.
#[rustfmt::skip]
const GEOTIFF_HEADER_PART: [u8; 72] = [
	14, 131, 12, 0, 3, 0, 0, 0, 0, 0, 0, 0,
	130, 132, 12, 0, 6, 0, 0, 0, 0, 0, 0, 0,
	175, 135, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	176, 135, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	177, 135, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0,
	129, 164, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

const MODEL_PIXEL_SCALE_PTR: usize = 8;
const MODEL_TIEPOINT_PTR: usize = 20;
const GEO_KEY_DIR_COUNT: usize = 28;
const GEO_KEY_DIR_PTR: usize = 32;
const GEO_DOUBLE_PARAMS_COUNT: usize = 40;
const GEO_DOUBLE_PARAMS_PTR: usize = 44;
const GEO_ASCII_PARAMS_COUNT: usize = 52;
const GEO_ASCII_PARAMS_PTR: usize = 56;
const NODATA_ASCII_COUNT: usize = 64;
const NODATA_ASCII_PTR: usize = 68;

/// One parameter a projection family contributes to `GeoDoubleParams`,
/// keyed by its GeoTIFF `ProjXxxGeoKey` code.
pub struct GeoParam {
	pub geokey: u16,
	pub value: f64,
}

/// A resolved projection, carrying the numeric parameters the original's
/// proj-string parser would have extracted. `projcoordtrans` is the
/// `ProjCoordTransGeoKey` value identifying the projection method.
pub enum GeoTiffProjection {
	Geographic,
	Lambert1Sp { lon_0: f64, lat_1: f64, x_0: f64, y_0: f64, k_0: f64 },
	Lambert2Sp { lat_1: f64, lat_2: f64, lon_0: f64, lat_0: f64, x_0: f64, y_0: f64 },
	Mercator1Sp { lon_0: f64, x_0: f64, y_0: f64, k_0: f64 },
	TransverseMercator { x_0: f64, y_0: f64, lon_0: f64, lat_0: f64, k: f64 },
	/// Zone 1-60; hemisphere selects false northing (10,000,000 in the south).
	Utm { zone: u8, northern_hemisphere: bool },
	Albers { lat_1: f64, lat_2: f64, lon_0: f64, lat_0: f64, x_0: f64, y_0: f64 },
}

impl GeoTiffProjection {
	fn projcoordtrans(&self) -> Option<u16> {
		match self {
			GeoTiffProjection::Geographic => None,
			GeoTiffProjection::Lambert1Sp { .. } => Some(9),
			GeoTiffProjection::Lambert2Sp { .. } => Some(8),
			GeoTiffProjection::Mercator1Sp { .. } => Some(7),
			GeoTiffProjection::TransverseMercator { .. } | GeoTiffProjection::Utm { .. } => Some(1),
			GeoTiffProjection::Albers { .. } => Some(11),
		}
	}

	fn params(&self) -> Vec<GeoParam> {
		match self {
			GeoTiffProjection::Geographic => vec![],
			GeoTiffProjection::Lambert1Sp { lon_0, lat_1, x_0, y_0, k_0 } => vec![
				GeoParam { geokey: 3080, value: *lon_0 },
				GeoParam { geokey: 3081, value: *lat_1 },
				GeoParam { geokey: 3082, value: *x_0 },
				GeoParam { geokey: 3083, value: *y_0 },
				GeoParam { geokey: 3092, value: *k_0 },
			],
			GeoTiffProjection::Lambert2Sp { lat_1, lat_2, lon_0, lat_0, x_0, y_0 } => vec![
				GeoParam { geokey: 3078, value: *lat_1 },
				GeoParam { geokey: 3079, value: *lat_2 },
				GeoParam { geokey: 3084, value: *lon_0 },
				GeoParam { geokey: 3085, value: *lat_0 },
				GeoParam { geokey: 3086, value: *x_0 },
				GeoParam { geokey: 3087, value: *y_0 },
			],
			GeoTiffProjection::Mercator1Sp { lon_0, x_0, y_0, k_0 } => vec![
				GeoParam { geokey: 3080, value: *lon_0 },
				GeoParam { geokey: 3082, value: *x_0 },
				GeoParam { geokey: 3083, value: *y_0 },
				GeoParam { geokey: 3092, value: *k_0 },
			],
			GeoTiffProjection::TransverseMercator { x_0, y_0, lon_0, lat_0, k } => vec![
				GeoParam { geokey: 3082, value: *x_0 },
				GeoParam { geokey: 3083, value: *y_0 },
				GeoParam { geokey: 3080, value: *lon_0 },
				GeoParam { geokey: 3081, value: *lat_0 },
				GeoParam { geokey: 3092, value: *k },
			],
			GeoTiffProjection::Utm { zone, northern_hemisphere } => {
				let central_meridian = f64::from(*zone) * 6.0 - 183.0;
				let false_northing = if *northern_hemisphere { 0.0 } else { 10_000_000.0 };
				vec![
					GeoParam { geokey: 3081, value: 0.0 },
					GeoParam { geokey: 3080, value: central_meridian },
					GeoParam { geokey: 3082, value: 500_000.0 },
					GeoParam { geokey: 3083, value: false_northing },
					GeoParam { geokey: 3092, value: 0.9996 },
				]
			}
			GeoTiffProjection::Albers { lat_1, lat_2, lon_0, lat_0, x_0, y_0 } => vec![
				GeoParam { geokey: 3078, value: *lat_1 },
				GeoParam { geokey: 3079, value: *lat_2 },
				GeoParam { geokey: 3080, value: *lon_0 },
				GeoParam { geokey: 3081, value: *lat_0 },
				GeoParam { geokey: 3082, value: *x_0 },
				GeoParam { geokey: 3083, value: *y_0 },
			],
		}
	}
}

/// Geographic extent and per-pixel resolution needed to populate
/// `ModelPixelScale`/`ModelTiepoint`; decoupled from [`rok4_image::Image`]
/// so this module has no dependency on the image-graph crate.
pub struct GeoTiffParams {
	pub resolution_x: f64,
	pub resolution_y: f64,
	pub origin_x: f64,
	pub origin_y: f64,
	pub epsg_code: String,
	pub projection: GeoTiffProjection,
	pub nodata: i32,
}

struct GeoKeyDirectory {
	entries: Vec<[u16; 4]>,
}

impl GeoKeyDirectory {
	fn new() -> Self {
		GeoKeyDirectory { entries: vec![[1, 1, 0, 0]] }
	}

	fn push(&mut self, key: u16, location: u16, count: u16, value: u16) {
		self.entries.push([key, location, count, value]);
	}

	fn finish(mut self) -> Vec<u16> {
		self.entries.push([0, 0, 0, 0]);
		let key_count = (self.entries.len() - 2) as u16;
		self.entries[0][3] = key_count;
		self.entries.into_iter().flatten().collect()
	}
}

/// Splices GeoTIFF tags into `header` (a complete, already-patched raw TIFF
/// header) and returns the new header. Repoints the strip offset at byte 78
/// to the end of the spliced region, since pixel data now starts later.
pub fn insert_geo_tags(header: &[u8], params: &GeoTiffParams) -> Vec<u8> {
	let old_tag_count = u16::from_le_bytes([header[8], header[9]]) as usize;
	let tag_dir_end = 10 + 12 * old_tag_count;

	let mut geo_keys = GeoKeyDirectory::new();
	let mut geo_doubles: Vec<f64> = Vec::new();
	let mut geo_ascii = String::new();

	let model_type = if matches!(params.projection, GeoTiffProjection::Geographic) { 2 } else { 1 };
	geo_keys.push(1024, 0, 1, model_type);
	geo_keys.push(1025, 0, 1, 1); // RasterPixelIsArea
	geo_keys.push(1026, 34737, (params.epsg_code.len() + 1) as u16, geo_ascii.len() as u16);
	geo_ascii.push_str(&params.epsg_code);
	geo_ascii.push('|');

	geo_keys.push(2048, 0, 1, 32767);
	geo_keys.push(2050, 0, 1, 32767);
	geo_keys.push(2051, 0, 1, 32767);
	geo_keys.push(2052, 0, 1, 9001);
	geo_keys.push(2054, 0, 1, 9102);
	geo_keys.push(2056, 0, 1, 32767);

	if let Some(coord_trans) = params.projection.projcoordtrans() {
		geo_keys.push(3072, 0, 1, 32767);
		geo_keys.push(3074, 0, 1, 32767);
		geo_keys.push(3075, 0, 1, coord_trans);
		geo_keys.push(3076, 0, 1, 9001);
		for p in params.projection.params() {
			geo_keys.push(p.geokey, 34736, 1, geo_doubles.len() as u16);
			geo_doubles.push(p.value);
		}
	}

	let geo_key_words = geo_keys.finish();
	let nodata_ascii = format!(" {}", params.nodata);

	let new_size = tag_dir_end
		+ GEOTIFF_HEADER_PART.len()
		+ (header.len() - tag_dir_end)
		+ 3 * 8
		+ 6 * 8
		+ geo_key_words.len() * 2
		+ geo_doubles.len() * 8
		+ geo_ascii.len() + 1
		+ nodata_ascii.len() + 1
		+ 1;

	let mut writer = ByteWriter::with_capacity(new_size);
	writer.write_bytes(&header[..tag_dir_end]);
	let mut out = writer.into_vec();

	patch_u16_le(&mut out, 8, (old_tag_count + 6) as u16);

	for i in 0..old_tag_count {
		let tag_start = 10 + i * 12;
		let count = u32::from_le_bytes(out[tag_start + 4..tag_start + 8].try_into().unwrap());
		if count != 1 {
			let current = u32::from_le_bytes(out[tag_start + 8..tag_start + 12].try_into().unwrap());
			patch_u32_le(&mut out, tag_start + 8, current + GEOTIFF_HEADER_PART.len() as u32);
		}
	}

	let geotiff_part_offset = out.len();
	out.extend_from_slice(&GEOTIFF_HEADER_PART);

	out.extend_from_slice(&header[tag_dir_end..]);

	let mut offset = out.len();
	patch_u32_le(&mut out, geotiff_part_offset + MODEL_PIXEL_SCALE_PTR, offset as u32);
	out.extend_from_slice(&params.resolution_x.to_le_bytes());
	out.extend_from_slice(&params.resolution_y.to_le_bytes());
	out.extend_from_slice(&0f64.to_le_bytes());
	offset = out.len();

	patch_u32_le(&mut out, geotiff_part_offset + MODEL_TIEPOINT_PTR, offset as u32);
	for v in [0.0, 0.0, 0.0, params.origin_x, params.origin_y, 0.0] {
		out.extend_from_slice(&v.to_le_bytes());
	}
	offset = out.len();

	patch_u32_le(&mut out, geotiff_part_offset + GEO_KEY_DIR_COUNT, geo_key_words.len() as u32);
	patch_u32_le(&mut out, geotiff_part_offset + GEO_KEY_DIR_PTR, offset as u32);
	for w in &geo_key_words {
		out.extend_from_slice(&w.to_le_bytes());
	}
	offset = out.len();

	patch_u32_le(&mut out, geotiff_part_offset + GEO_DOUBLE_PARAMS_COUNT, geo_doubles.len() as u32);
	patch_u32_le(&mut out, geotiff_part_offset + GEO_DOUBLE_PARAMS_PTR, offset as u32);
	for d in &geo_doubles {
		out.extend_from_slice(&d.to_le_bytes());
	}
	offset = out.len();

	patch_u32_le(&mut out, geotiff_part_offset + GEO_ASCII_PARAMS_COUNT, (geo_ascii.len() + 1) as u32);
	patch_u32_le(&mut out, geotiff_part_offset + GEO_ASCII_PARAMS_PTR, offset as u32);
	out.extend_from_slice(geo_ascii.as_bytes());
	out.push(0);
	offset = out.len();

	patch_u32_le(&mut out, geotiff_part_offset + NODATA_ASCII_COUNT, (nodata_ascii.len() + 1) as u32);
	patch_u32_le(&mut out, geotiff_part_offset + NODATA_ASCII_PTR, offset as u32);
	out.extend_from_slice(nodata_ascii.as_bytes());
	out.push(0);

	out.push(0);

	let new_strip_offset = out.len() as u32;
	patch_u32_le(&mut out, crate::tiff::templates::STRIP_OFFSET_VALUE, new_strip_offset);

	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tiff::templates;

	fn base_header() -> Vec<u8> {
		let mut header = templates::GRAY_U8.to_vec();
		patch_u32_le(&mut header, templates::WIDTH_VALUE, 256);
		patch_u32_le(&mut header, templates::HEIGHT_VALUE, 256);
		header
	}

	#[test]
	fn geographic_splice_grows_header_and_repoints_strip_offset() {
		let header = base_header();
		let original_len = header.len();
		let params = GeoTiffParams {
			resolution_x: 0.5,
			resolution_y: 0.5,
			origin_x: 100.0,
			origin_y: 200.0,
			epsg_code: "EPSG:4326".to_string(),
			projection: GeoTiffProjection::Geographic,
			nodata: -99999,
		};
		let spliced = insert_geo_tags(&header, &params);
		assert!(spliced.len() > original_len);
		let strip_offset = u32::from_le_bytes(spliced[templates::STRIP_OFFSET_VALUE..templates::STRIP_OFFSET_VALUE + 4].try_into().unwrap());
		assert_eq!(strip_offset as usize, spliced.len());
	}

	#[test]
	fn utm_splice_adds_projected_geokeys() {
		let header = base_header();
		let params = GeoTiffParams {
			resolution_x: 1.0,
			resolution_y: 1.0,
			origin_x: 0.0,
			origin_y: 0.0,
			epsg_code: "EPSG:32631".to_string(),
			projection: GeoTiffProjection::Utm { zone: 31, northern_hemisphere: true },
			nodata: 0,
		};
		let spliced = insert_geo_tags(&header, &params);
		let new_tag_count = u16::from_le_bytes([spliced[8], spliced[9]]);
		assert_eq!(new_tag_count, 10 + 6);
	}
}
