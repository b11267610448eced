//! Incremental Deflate, driven one source line at a time.
//!
//! The original implementation hands the compressor a fixed output buffer
//! (`2·W·H·C·sizeof(T)`) and doubles-and-restarts the whole compression on
//! overflow. Per the design note suggesting this be replaced with a
//! streaming design, this wraps `flate2::Compress` directly and appends
//! compressed chunks to a growable buffer instead, so overflow never
//! repeats prior work.

use anyhow::{Result, bail};
use flate2::{Compress, Compression as Flate2Compression, FlushCompress, Status};

/// A streaming zlib/Deflate encoder fed one scanline at a time.
pub struct DeflateEncoder {
	compress: Compress,
	out: Vec<u8>,
	chunk: Vec<u8>,
}

impl DeflateEncoder {
	#[must_use]
	pub fn new() -> Self {
		DeflateEncoder { compress: Compress::new(Flate2Compression::default(), true), out: Vec::new(), chunk: vec![0u8; 64 * 1024] }
	}

	/// Feeds one scanline's worth of bytes into the compressor.
	pub fn write_line(&mut self, line: &[u8]) -> Result<()> {
		self.drive(line, FlushCompress::None)
	}

	/// Finalizes the stream, flushing any remaining compressed bytes.
	pub fn finish(mut self) -> Result<Vec<u8>> {
		self.drive(&[], FlushCompress::Finish)?;
		Ok(self.out)
	}

	fn drive(&mut self, mut input: &[u8], flush: FlushCompress) -> Result<()> {
		loop {
			let before_in = self.compress.total_in();
			let before_out = self.compress.total_out();
			let status = self.compress.compress(input, &mut self.chunk, flush)?;
			let consumed = (self.compress.total_in() - before_in) as usize;
			let produced = (self.compress.total_out() - before_out) as usize;
			self.out.extend_from_slice(&self.chunk[..produced]);
			input = &input[consumed..];

			match status {
				Status::Ok | Status::BufError if !input.is_empty() || (flush == FlushCompress::Finish && status != Status::StreamEnd) => {
					if produced == 0 && consumed == 0 {
						// Output buffer was full and nothing could be produced
						// or consumed this round; growing gives the stream
						// room without restarting compression from scratch.
						self.chunk = vec![0u8; self.chunk.len() * 2];
					}
					if input.is_empty() && flush != FlushCompress::Finish {
						return Ok(());
					}
				}
				Status::StreamEnd => return Ok(()),
				Status::Ok => return Ok(()),
				Status::BufError => bail!("deflate stream reported a buffer error it could not recover from"),
			}
		}
	}
}

impl Default for DeflateEncoder {
	fn default() -> Self {
		Self::new()
	}
}

/// Decompresses a full Deflate/zlib stream, for round-trip tests.
pub fn deflate_decode(data: &[u8]) -> Result<Vec<u8>> {
	let mut decompress = flate2::Decompress::new(true);
	let mut out = Vec::new();
	let mut chunk = vec![0u8; 64 * 1024];
	let mut input = data;
	loop {
		let before_in = decompress.total_in();
		let before_out = decompress.total_out();
		let status = decompress.decompress(input, &mut chunk, flate2::FlushDecompress::None)?;
		let consumed = (decompress.total_in() - before_in) as usize;
		let produced = (decompress.total_out() - before_out) as usize;
		out.extend_from_slice(&chunk[..produced]);
		input = &input[consumed..];
		match status {
			flate2::Status::StreamEnd => break,
			flate2::Status::Ok if consumed == 0 && produced == 0 => {
				chunk = vec![0u8; chunk.len() * 2];
			}
			_ => {}
		}
		if input.is_empty() && status != flate2::Status::StreamEnd {
			break;
		}
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_several_lines() {
		let mut enc = DeflateEncoder::new();
		for row in 0..50u8 {
			let line: Vec<u8> = (0..256).map(|x| (x as u8).wrapping_add(row)).collect();
			enc.write_line(&line).unwrap();
		}
		let compressed = enc.finish().unwrap();
		let decompressed = deflate_decode(&compressed).unwrap();

		let mut expected = Vec::new();
		for row in 0..50u8 {
			expected.extend((0..256).map(|x| (x as u8).wrapping_add(row)));
		}
		assert_eq!(decompressed, expected);
	}
}
