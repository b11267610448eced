//! BIL (band-interleaved-by-line) float32 encoding: the raw stream is just
//! every scanline's samples as little-endian `f32`, no header at all.

use anyhow::Result;
use rok4_image::image::Image;

/// A fully assembled BIL byte stream.
pub struct BilEncoder {
	payload: Vec<u8>,
	cursor: usize,
}

impl BilEncoder {
	pub fn new(image: &dyn Image) -> Result<Self> {
		let mut payload = Vec::with_capacity(image.width() as usize * image.height() as usize * image.channel_count() as usize * 4);
		for y in 0..image.height() {
			for v in image.get_line_f32(y)? {
				payload.extend_from_slice(&v.to_le_bytes());
			}
		}
		Ok(BilEncoder { payload, cursor: 0 })
	}

	#[must_use]
	pub fn mime_type(&self) -> &'static str {
		"image/x-bil;bits=32"
	}

	pub fn read(&mut self, buf: &mut [u8]) -> usize {
		let remaining = self.payload.len() - self.cursor;
		let n = buf.len().min(remaining);
		buf[..n].copy_from_slice(&self.payload[self.cursor..self.cursor + n]);
		self.cursor += n;
		n
	}

	#[must_use]
	pub fn eof(&self) -> bool {
		self.cursor >= self.payload.len()
	}

	#[must_use]
	pub fn get_length(&self) -> u64 {
		self.payload.len() as u64
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rok4_core::{BoundingBox, Crs};
	use rok4_image::image::BasicImage;

	#[test]
	fn payload_length_matches_width_height_times_four_bytes() {
		let bbox = BoundingBox::new(0.0, 0.0, 3.0, 2.0, Crs::new("LOCAL"));
		let image = BasicImage::new_f32(3, 2, 1, bbox, Crs::new("LOCAL"), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
		let encoder = BilEncoder::new(&image).unwrap();
		assert_eq!(encoder.get_length(), 3 * 2 * 4);
	}

	#[test]
	fn reads_full_payload_in_one_call() {
		let bbox = BoundingBox::new(0.0, 0.0, 2.0, 1.0, Crs::new("LOCAL"));
		let image = BasicImage::new_f32(2, 1, 1, bbox, Crs::new("LOCAL"), vec![1.5, 2.5]);
		let mut encoder = BilEncoder::new(&image).unwrap();
		let mut buf = vec![0u8; 8];
		let n = encoder.read(&mut buf);
		assert_eq!(n, 8);
		assert!(encoder.eof());
		assert_eq!(f32::from_le_bytes(buf[0..4].try_into().unwrap()), 1.5);
		assert_eq!(f32::from_le_bytes(buf[4..8].try_into().unwrap()), 2.5);
	}
}
