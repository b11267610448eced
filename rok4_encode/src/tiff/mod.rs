//! TIFF/GeoTIFF encoding: wraps an [`Image`] as a bit-exact TIFF byte
//! stream, built eagerly at construction rather than lazily on first
//! `read()`/`get_length()` call, since this crate has no equivalent of the
//! original's "maybe nobody ever reads this stream" caller.

pub mod geotiff;
pub mod templates;

use anyhow::{Result, ensure};
use rok4_core::compression::{Compression, DeflateEncoder, lzw_encode, packbits_encode};
use rok4_core::io::{patch_u16_le, patch_u32_le};
use rok4_image::image::{Image, SampleFormat};

pub use geotiff::{GeoTiffParams, GeoTiffProjection};

/// A fully assembled TIFF byte stream: header followed by (possibly
/// compressed) pixel payload, read out via a single forward cursor.
pub struct TiffEncoder {
	header: Vec<u8>,
	payload: Vec<u8>,
	cursor: usize,
	geotiff: bool,
}

impl TiffEncoder {
	/// Builds a raw (non-geo) TIFF stream for `image`, compressed with
	/// `compression`.
	pub fn new(image: &dyn Image, compression: Compression) -> Result<Self> {
		Self::build(image, compression, None)
	}

	/// Builds a GeoTIFF stream: same payload encoding, with the geo tags
	/// spliced into the header.
	pub fn new_geotiff(image: &dyn Image, compression: Compression, geo: GeoTiffParams) -> Result<Self> {
		Self::build(image, compression, Some(geo))
	}

	fn build(image: &dyn Image, compression: Compression, geo: Option<GeoTiffParams>) -> Result<Self> {
		let channels = image.channel_count();
		let format = image.sample_format();
		ensure!(
			matches!((channels, format), (1, SampleFormat::U8) | (1, SampleFormat::F32) | (3, SampleFormat::U8) | (4, SampleFormat::U8)),
			"tiff encoder supports u8 gray/rgb/rgba or f32 gray, got {channels} channels in {format:?}"
		);

		let raw_payload = Self::assemble_payload(image)?;
		let (payload, compressed_line_lengths) = Self::compress_payload(&raw_payload, image, compression)?;
		let _ = compressed_line_lengths;

		let template: &[u8] = match (channels, format) {
			(1, SampleFormat::U8) => &templates::GRAY_U8,
			(1, SampleFormat::F32) => &templates::GRAY_F32,
			(3, SampleFormat::U8) => &templates::RGB_U8,
			(4, SampleFormat::U8) => &templates::RGBA_U8,
			_ => unreachable!("checked above"),
		};

		let mut header = template.to_vec();
		patch_u32_le(&mut header, templates::WIDTH_VALUE, image.width());
		patch_u32_le(&mut header, templates::HEIGHT_VALUE, image.height());
		patch_u32_le(&mut header, templates::ROWS_PER_STRIP_VALUE, image.height());
		patch_u32_le(&mut header, templates::STRIP_BYTE_COUNT_VALUE, payload.len() as u32);
		patch_u16_le(&mut header, templates::COMPRESSION_VALUE, compression.tiff_tag_value());

		let is_geotiff = geo.is_some();
		if let Some(params) = geo {
			header = geotiff::insert_geo_tags(&header, &params);
		} else {
			let strip_offset = header.len() as u32;
			patch_u32_le(&mut header, templates::STRIP_OFFSET_VALUE, strip_offset);
		}

		Ok(TiffEncoder { header, payload, cursor: 0, geotiff: is_geotiff })
	}

	fn assemble_payload(image: &dyn Image) -> Result<Vec<u8>> {
		let mut raw = Vec::new();
		for y in 0..image.height() {
			match image.sample_format() {
				SampleFormat::U8 => raw.extend_from_slice(&image.get_line_u8(y)?),
				SampleFormat::F32 => {
					for v in image.get_line_f32(y)? {
						raw.extend_from_slice(&v.to_le_bytes());
					}
				}
				SampleFormat::U16 => {
					for v in image.get_line_u16(y)? {
						raw.extend_from_slice(&v.to_le_bytes());
					}
				}
			}
		}
		Ok(raw)
	}

	/// Compresses `raw` (the whole uncompressed payload, rows concatenated)
	/// according to `compression`. LZW and PackBits operate per scanline in
	/// the original and are applied the same way here so dictionary/run
	/// state resets at each row boundary; Deflate is a single stream.
	fn compress_payload(raw: &[u8], image: &dyn Image, compression: Compression) -> Result<(Vec<u8>, Vec<usize>)> {
		let row_bytes = raw.len() / image.height().max(1) as usize;
		match compression {
			Compression::Raw => Ok((raw.to_vec(), vec![row_bytes; image.height() as usize])),
			Compression::Lzw => {
				let mut out = Vec::new();
				let mut lens = Vec::new();
				for row in raw.chunks(row_bytes.max(1)) {
					let encoded = lzw_encode(row);
					lens.push(encoded.len());
					out.extend_from_slice(&encoded);
				}
				Ok((out, lens))
			}
			Compression::PackBits => {
				let mut out = Vec::new();
				let mut lens = Vec::new();
				for row in raw.chunks(row_bytes.max(1)) {
					let encoded = packbits_encode(row);
					lens.push(encoded.len());
					out.extend_from_slice(&encoded);
				}
				Ok((out, lens))
			}
			Compression::Deflate => {
				let mut encoder = DeflateEncoder::new();
				for row in raw.chunks(row_bytes.max(1)) {
					encoder.write_line(row)?;
				}
				let out = encoder.finish()?;
				let len = out.len();
				Ok((out, vec![len]))
			}
		}
	}

	/// MIME type of the assembled stream.
	#[must_use]
	pub fn mime_type(&self) -> &'static str {
		if self.geotiff { "image/geotiff" } else { "image/tiff" }
	}

	/// Reads up to `buf.len()` bytes from the stream into `buf`, returning
	/// the number written. Mirrors the header-then-payload cursor contract:
	/// a `buf` shorter than the remaining header returns 0 without
	/// consuming any header bytes.
	pub fn read(&mut self, buf: &mut [u8]) -> usize {
		let total = self.header.len() + self.payload.len();
		if self.cursor >= total {
			return 0;
		}
		if self.cursor < self.header.len() && buf.len() < self.header.len() - self.cursor {
			return 0;
		}
		let remaining = total - self.cursor;
		let n = buf.len().min(remaining);
		let mut written = 0;
		if self.cursor < self.header.len() {
			let from_header = n.min(self.header.len() - self.cursor);
			buf[..from_header].copy_from_slice(&self.header[self.cursor..self.cursor + from_header]);
			written += from_header;
			self.cursor += from_header;
		}
		if written < n && self.cursor >= self.header.len() {
			let payload_offset = self.cursor - self.header.len();
			let from_payload = n - written;
			buf[written..n].copy_from_slice(&self.payload[payload_offset..payload_offset + from_payload]);
			self.cursor += from_payload;
		}
		n
	}

	#[must_use]
	pub fn eof(&self) -> bool {
		self.cursor >= self.header.len() + self.payload.len()
	}

	#[must_use]
	pub fn get_length(&self) -> u64 {
		(self.header.len() + self.payload.len()) as u64
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rok4_core::{BoundingBox, Crs};
	use rok4_image::image::BasicImage;

	fn gray_u8_image() -> BasicImage {
		let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0, Crs::new("LOCAL"));
		BasicImage::new_u8(4, 4, 1, bbox, Crs::new("LOCAL"), vec![7u8; 16])
	}

	#[test]
	fn raw_gray_u8_header_is_134_bytes() {
		let image = gray_u8_image();
		let encoder = TiffEncoder::new(&image, Compression::Raw).unwrap();
		assert_eq!(encoder.header.len(), 134);
		assert_eq!(encoder.mime_type(), "image/tiff");
	}

	#[test]
	fn read_with_undersized_buffer_consumes_nothing() {
		let image = gray_u8_image();
		let mut encoder = TiffEncoder::new(&image, Compression::Raw).unwrap();
		let mut tiny = vec![0u8; 4];
		let n = encoder.read(&mut tiny);
		assert_eq!(n, 0);
		assert_eq!(encoder.cursor, 0);
	}

	#[test]
	fn lzw_round_trip_decodes_to_original_payload() {
		let image = gray_u8_image();
		let mut encoder = TiffEncoder::new(&image, Compression::Lzw).unwrap();
		let len = encoder.get_length() as usize;
		let mut buf = vec![0u8; len];
		let n = encoder.read(&mut buf);
		assert_eq!(n, len);
		assert!(encoder.eof());
		let decoded = rok4_core::compression::lzw_decode(&buf[encoder.header.len()..]);
		assert_eq!(decoded, vec![7u8; 16]);
	}

	#[test]
	fn geotiff_stream_reports_geotiff_mime_and_grows_past_raw_header() {
		let image = gray_u8_image();
		let raw = TiffEncoder::new(&image, Compression::Raw).unwrap();
		let geo = TiffEncoder::new_geotiff(
			&image,
			Compression::Raw,
			GeoTiffParams { resolution_x: 1.0, resolution_y: 1.0, origin_x: 0.0, origin_y: 4.0, epsg_code: "EPSG:4326".to_string(), projection: GeoTiffProjection::Geographic, nodata: -99999 },
		)
		.unwrap();
		assert_eq!(geo.mime_type(), "image/geotiff");
		assert!(geo.header.len() > raw.header.len());
	}
}
