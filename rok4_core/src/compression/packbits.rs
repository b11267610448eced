//! PackBits: per-scanline run-length/literal byte encoding, as used by
//! TIFF's PackBits compression (tag value 32773).

/// Encodes a single scanline. Runs of 2–128 identical bytes become a
/// `(-n+1, byte)` control/value pair; runs of 1–128 dissimilar bytes become
/// a `(n-1, bytes...)` literal block.
#[must_use]
pub fn packbits_encode(line: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(line.len() + line.len() / 64 + 1);
	let mut i = 0;
	while i < line.len() {
		let run_len = run_length(line, i);
		if run_len >= 2 {
			out.push((1u8.wrapping_sub(run_len as u8)) as i8 as u8);
			out.push(line[i]);
			i += run_len;
		} else {
			let lit_len = literal_length(line, i);
			out.push((lit_len - 1) as u8);
			out.extend_from_slice(&line[i..i + lit_len]);
			i += lit_len;
		}
	}
	out
}

fn run_length(line: &[u8], start: usize) -> usize {
	let mut n = 1;
	while start + n < line.len() && n < 128 && line[start + n] == line[start] {
		n += 1;
	}
	n
}

/// Length of a literal run starting at `start`: stops before a run of 2+
/// identical bytes begins, capped at 128 bytes.
fn literal_length(line: &[u8], start: usize) -> usize {
	let mut n = 1;
	while start + n < line.len() && n < 128 {
		if run_length(line, start + n) >= 2 {
			break;
		}
		n += 1;
	}
	n
}

/// Decodes a PackBits-compressed scanline.
#[must_use]
pub fn packbits_decode(data: &[u8]) -> Vec<u8> {
	let mut out = Vec::new();
	let mut i = 0;
	while i < data.len() {
		let control = data[i] as i8;
		i += 1;
		if control >= 0 {
			let n = control as usize + 1;
			out.extend_from_slice(&data[i..i + n]);
			i += n;
		} else if control != -128 {
			let n = (1 - control as i32) as usize;
			out.extend(std::iter::repeat(data[i]).take(n));
			i += 1;
		}
		// control == -128 is a no-op per the PackBits spec.
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(&[])]
	#[case(&[1, 2, 3, 4])]
	#[case(&[7, 7, 7, 7, 7, 7, 7, 7])]
	#[case(&[1, 2, 2, 2, 3, 4, 4, 5, 6, 6, 6, 6, 6])]
	fn round_trips(#[case] line: &[u8]) {
		let encoded = packbits_encode(line);
		assert_eq!(packbits_decode(&encoded), line);
	}

	#[test]
	fn long_run_is_run_length_encoded() {
		let line = vec![9u8; 200];
		let encoded = packbits_encode(&line);
		assert_eq!(packbits_decode(&encoded), line);
		assert!(encoded.len() < line.len());
	}
}
