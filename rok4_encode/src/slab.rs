//! Slab header encode/decode: a slab is one storable object holding a
//! `tiles_per_width × tiles_per_height` grid of tiles, fronted by a fixed
//! prefix (magic, version, dimensions, channel count) and two
//! little-endian `u32` tables (per-tile byte offset, per-tile byte size).

use anyhow::{Result, ensure};
use rok4_core::io::{ByteWriter, read_u32_le_array};

const MAGIC: [u8; 4] = *b"R4SL";
const VERSION: u32 = 1;
const HEADER_FIXED_LEN: usize = 4 + 4 + 4 + 4 + 4; // magic, version, width, height, channels

/// Parsed fixed prefix and offset/size tables of a slab header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabHeader {
	pub tiles_per_width: u32,
	pub tiles_per_height: u32,
	pub channel_count: u32,
	pub offsets: Vec<u32>,
	pub sizes: Vec<u32>,
}

impl SlabHeader {
	#[must_use]
	pub fn tile_count(&self) -> usize {
		(self.tiles_per_width * self.tiles_per_height) as usize
	}

	/// Total byte length of the encoded header (fixed prefix plus the two
	/// tile tables), i.e. where tile payloads start.
	#[must_use]
	pub fn encoded_len(&self) -> usize {
		HEADER_FIXED_LEN + 2 * self.tile_count() * 4
	}

	/// Encodes the header prefix and tables; does not include tile payloads.
	#[must_use]
	pub fn encode(&self) -> Vec<u8> {
		let mut writer = ByteWriter::with_capacity(self.encoded_len());
		writer.write_bytes(&MAGIC);
		writer.write_u32_le(VERSION);
		writer.write_u32_le(self.tiles_per_width);
		writer.write_u32_le(self.tiles_per_height);
		writer.write_u32_le(self.channel_count);
		for &o in &self.offsets {
			writer.write_u32_le(o);
		}
		for &s in &self.sizes {
			writer.write_u32_le(s);
		}
		writer.into_vec()
	}

	/// Parses a slab header from its leading bytes, validating the magic,
	/// version and that both tables are the size the declared dimensions
	/// imply.
	pub fn decode(data: &[u8]) -> Result<SlabHeader> {
		ensure!(data.len() >= HEADER_FIXED_LEN, "slab header truncated: only {} bytes", data.len());
		ensure!(&data[0..4] == MAGIC, "slab header has bad magic {:?}", &data[0..4]);
		let version = u32::from_le_bytes(data[4..8].try_into().unwrap());
		ensure!(version == VERSION, "unsupported slab header version {version}");
		let tiles_per_width = u32::from_le_bytes(data[8..12].try_into().unwrap());
		let tiles_per_height = u32::from_le_bytes(data[12..16].try_into().unwrap());
		let channel_count = u32::from_le_bytes(data[16..20].try_into().unwrap());
		let tile_count = (tiles_per_width * tiles_per_height) as usize;
		let tables_len = 2 * tile_count * 4;
		ensure!(data.len() >= HEADER_FIXED_LEN + tables_len, "slab header declares {tile_count} tiles but only {} bytes follow the prefix", data.len() - HEADER_FIXED_LEN);

		let offsets = read_u32_le_array(data, HEADER_FIXED_LEN, tile_count);
		let sizes = read_u32_le_array(data, HEADER_FIXED_LEN + tile_count * 4, tile_count);
		Ok(SlabHeader { tiles_per_width, tiles_per_height, channel_count, offsets, sizes })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_encode_decode() {
		let header = SlabHeader { tiles_per_width: 2, tiles_per_height: 2, channel_count: 3, offsets: vec![100, 200, 300, 400], sizes: vec![50, 60, 70, 80] };
		let encoded = header.encode();
		let decoded = SlabHeader::decode(&encoded).unwrap();
		assert_eq!(decoded, header);
		assert_eq!(encoded.len(), header.encoded_len());
	}

	#[test]
	fn rejects_truncated_header() {
		assert!(SlabHeader::decode(&[1, 2, 3]).is_err());
	}

	#[test]
	fn rejects_bad_magic() {
		let mut encoded = SlabHeader { tiles_per_width: 1, tiles_per_height: 1, channel_count: 1, offsets: vec![0], sizes: vec![1] }.encode();
		encoded[0] = b'X';
		assert!(SlabHeader::decode(&encoded).is_err());
	}
}
