//! Small binary I/O helpers for fixed-layout headers: slab headers, TIFF
//! IFDs, and the little-endian offset/size tables the index cache parses.

use byteorder::{ByteOrder, LittleEndian};

/// Reads `count` little-endian `u32` values starting at `offset` in `data`.
#[must_use]
pub fn read_u32_le_array(data: &[u8], offset: usize, count: usize) -> Vec<u32> {
	(0..count)
		.map(|i| LittleEndian::read_u32(&data[offset + i * 4..offset + i * 4 + 4]))
		.collect()
}

/// Patches a 4-byte little-endian `u32` field into `buf` at `offset`,
/// in place. Used to stamp width/height/strip-byte-count into a TIFF
/// header template after copying it from its constant byte array.
pub fn patch_u32_le(buf: &mut [u8], offset: usize, value: u32) {
	LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

/// Patches a 2-byte little-endian `u16` field into `buf` at `offset`.
pub fn patch_u16_le(buf: &mut [u8], offset: usize, value: u16) {
	LittleEndian::write_u16(&mut buf[offset..offset + 2], value);
}

/// A small growable little-endian byte writer, used to assemble spliced
/// GeoTIFF tag blocks and slab headers without hand-rolling index math at
/// every call site.
#[derive(Debug, Default)]
pub struct ByteWriter {
	buf: Vec<u8>,
}

impl ByteWriter {
	#[must_use]
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	#[must_use]
	pub fn with_capacity(cap: usize) -> Self {
		Self { buf: Vec::with_capacity(cap) }
	}

	pub fn write_u8(&mut self, v: u8) -> &mut Self {
		self.buf.push(v);
		self
	}

	pub fn write_u16_le(&mut self, v: u16) -> &mut Self {
		self.buf.extend_from_slice(&v.to_le_bytes());
		self
	}

	pub fn write_u32_le(&mut self, v: u32) -> &mut Self {
		self.buf.extend_from_slice(&v.to_le_bytes());
		self
	}

	pub fn write_f64_le(&mut self, v: f64) -> &mut Self {
		self.buf.extend_from_slice(&v.to_le_bytes());
		self
	}

	pub fn write_bytes(&mut self, v: &[u8]) -> &mut Self {
		self.buf.extend_from_slice(v);
		self
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.buf.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	#[must_use]
	pub fn into_vec(self) -> Vec<u8> {
		self.buf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn patches_u32_in_place() {
		let mut buf = vec![0u8; 8];
		patch_u32_le(&mut buf, 2, 0x0102_0304);
		assert_eq!(&buf[2..6], &[0x04, 0x03, 0x02, 0x01]);
	}

	#[test]
	fn reads_offset_table() {
		let mut buf = Vec::new();
		buf.extend_from_slice(&10u32.to_le_bytes());
		buf.extend_from_slice(&20u32.to_le_bytes());
		let values = read_u32_le_array(&buf, 0, 2);
		assert_eq!(values, vec![10, 20]);
	}

	#[test]
	fn byte_writer_round_trip() {
		let mut w = ByteWriter::new();
		w.write_u16_le(1).write_u32_le(2).write_u8(3);
		assert_eq!(w.into_vec(), vec![1, 0, 2, 0, 0, 0, 3]);
	}
}
