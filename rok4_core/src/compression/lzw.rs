//! TIFF-flavored LZW: 9-to-12-bit variable width codes, explicit clear
//! (256) and end-of-data (257) markers, dictionary reset on exhaustion.
//! Grounded directly on the original encoder's bit-packing and dictionary
//! growth schedule; only the one-shot encode path is implemented, per the
//! open question on the unused streaming variant.

const CLEAR_CODE: u16 = 256;
const END_CODE: u16 = 257;
const INITIAL_DICT_SIZE: usize = 258;
const INITIAL_BIT_SIZE: u32 = 9;
const MAX_BIT_SIZE: u32 = 12;

struct BitWriter {
	out: Vec<u8>,
	buffer: u32,
	n_bits: u32,
}

impl BitWriter {
	fn new() -> Self {
		BitWriter { out: Vec::new(), buffer: 0, n_bits: 0 }
	}

	fn write_bits(&mut self, code: u16, width: u32) {
		self.buffer = (self.buffer << width) | u32::from(code);
		self.n_bits += width;
		while self.n_bits >= 8 {
			self.n_bits -= 8;
			self.out.push((self.buffer >> self.n_bits) as u8);
		}
		if self.n_bits > 0 {
			self.buffer &= (1 << self.n_bits) - 1;
		}
	}

	fn finish(mut self) -> Vec<u8> {
		if self.n_bits > 0 {
			self.out.push((self.buffer << (8 - self.n_bits)) as u8);
		}
		self.out
	}
}

/// Encodes `input` with a fresh dictionary, emitting a clear code at the
/// start of the stream and an end-of-data code at the end.
#[must_use]
pub fn lzw_encode(input: &[u8]) -> Vec<u8> {
	let mut writer = BitWriter::new();
	if input.is_empty() {
		writer.write_bits(CLEAR_CODE, INITIAL_BIT_SIZE);
		writer.write_bits(END_CODE, INITIAL_BIT_SIZE);
		return writer.finish();
	}

	// dict[prefix_code] maps a following byte to the code representing
	// prefix_code followed by that byte; codes 0..255 are single bytes,
	// 256/257 are the markers and carry no dictionary node of their own.
	let mut dict: Vec<std::collections::HashMap<u8, u16>> = vec![std::collections::HashMap::new(); INITIAL_DICT_SIZE];
	let mut next_code: u16 = INITIAL_DICT_SIZE as u16;
	let mut bit_size = INITIAL_BIT_SIZE;
	let mut max_code: u32 = 1 << bit_size;

	writer.write_bits(CLEAR_CODE, bit_size as u32);

	let mut iter = input.iter();
	let mut last_code = u16::from(*iter.next().unwrap());

	for &byte in iter {
		if let Some(&code) = dict[last_code as usize].get(&byte) {
			last_code = code;
			continue;
		}

		writer.write_bits(last_code, bit_size);
		dict[last_code as usize].insert(byte, next_code);
		dict.push(std::collections::HashMap::new());
		next_code += 1;

		if u32::from(next_code) == max_code {
			if bit_size < MAX_BIT_SIZE {
				bit_size += 1;
				max_code *= 2;
			} else {
				writer.write_bits(CLEAR_CODE, bit_size);
				dict = vec![std::collections::HashMap::new(); INITIAL_DICT_SIZE];
				next_code = INITIAL_DICT_SIZE as u16;
				bit_size = INITIAL_BIT_SIZE;
				max_code = 1 << bit_size;
			}
		}
		last_code = u16::from(byte);
	}

	writer.write_bits(last_code, bit_size);
	writer.write_bits(END_CODE, bit_size);
	writer.finish()
}

struct BitReader<'a> {
	data: &'a [u8],
	byte_pos: usize,
	bit_pos: u32,
}

impl<'a> BitReader<'a> {
	fn new(data: &'a [u8]) -> Self {
		BitReader { data, byte_pos: 0, bit_pos: 0 }
	}

	fn read_bits(&mut self, width: u32) -> Option<u16> {
		let mut value: u32 = 0;
		let mut remaining = width;
		while remaining > 0 {
			let byte = *self.data.get(self.byte_pos)?;
			let bits_left_in_byte = 8 - self.bit_pos;
			let take = remaining.min(bits_left_in_byte);
			let shift = bits_left_in_byte - take;
			let mask = (1u32 << take) - 1;
			let bits = (u32::from(byte) >> shift) & mask;
			value = (value << take) | bits;
			self.bit_pos += take;
			remaining -= take;
			if self.bit_pos == 8 {
				self.bit_pos = 0;
				self.byte_pos += 1;
			}
		}
		Some(value as u16)
	}
}

/// Decodes a TIFF-flavored LZW stream produced by [`lzw_encode`] (or any
/// encoder following the same 9-to-`max_bit` schedule).
#[must_use]
pub fn lzw_decode(input: &[u8]) -> Vec<u8> {
	let mut reader = BitReader::new(input);
	let mut out = Vec::new();
	let mut table: Vec<Vec<u8>> = (0..256).map(|b| vec![b as u8]).collect();
	table.push(Vec::new()); // 256: clear, unused as entry
	table.push(Vec::new()); // 257: end, unused as entry
	let mut bit_size = INITIAL_BIT_SIZE;
	let mut old_code: Option<u16> = None;

	loop {
		let Some(code) = reader.read_bits(bit_size) else { break };
		if code == CLEAR_CODE {
			table.truncate(258);
			bit_size = INITIAL_BIT_SIZE;
			old_code = None;
			continue;
		}
		if code == END_CODE {
			break;
		}

		let entry = if (code as usize) < table.len() {
			table[code as usize].clone()
		} else if let Some(old) = old_code {
			let mut e = table[old as usize].clone();
			e.push(table[old as usize][0]);
			e
		} else {
			break;
		};

		out.extend_from_slice(&entry);

		if let Some(old) = old_code {
			let mut new_entry = table[old as usize].clone();
			new_entry.push(entry[0]);
			table.push(new_entry);
			let size = table.len();
			if size == (1 << bit_size) && bit_size < MAX_BIT_SIZE {
				bit_size += 1;
			}
		}
		old_code = Some(code);
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_tobeornottobeornottobeornot() {
		let input = b"TOBEORNOTTOBEORTOBEORNOT";
		let encoded = lzw_encode(input);
		// First codeword emitted must be the clear code.
		let first_code = BitReader::new(&encoded).read_bits(INITIAL_BIT_SIZE).unwrap();
		assert_eq!(first_code, CLEAR_CODE);

		let decoded = lzw_decode(&encoded);
		assert_eq!(decoded, input);
	}

	#[test]
	fn round_trips_empty_input() {
		let encoded = lzw_encode(b"");
		assert_eq!(lzw_decode(&encoded), Vec::<u8>::new());
	}

	#[test]
	fn round_trips_repetitive_data_past_dictionary_reset() {
		let input: Vec<u8> = (0..5000).map(|i| (i % 7) as u8).collect();
		let encoded = lzw_encode(&input);
		assert_eq!(lzw_decode(&encoded), input);
	}

	#[test]
	fn round_trips_single_byte() {
		let input = [42u8];
		let encoded = lzw_encode(&input);
		assert_eq!(lzw_decode(&encoded), input);
	}
}
