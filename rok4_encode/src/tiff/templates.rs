//! Byte-exact TIFF IFD templates, one per (sample format, channel count)
//! combination this encoder supports. Each is a complete little-endian TIFF
//! header with a fixed compression tag value (`1`, none); [`super::Compression`]
//! is applied by patching the two compression-value bytes at [`COMPRESSION_VALUE`]
//! rather than keeping sixteen near-duplicate templates, since that field is
//! the only byte that differs between an otherwise identical codec family.
//!
//! Offsets below are absolute byte positions into the template, not tag
//! indices: every variant places its first nine tags (width through
//! strip-byte-counts) in the same slots, so these offsets are shared across
//! all four templates.

/// Width value (LONG).
pub const WIDTH_VALUE: usize = 18;
/// Height value (LONG).
pub const HEIGHT_VALUE: usize = 30;
/// Compression value (SHORT, zero-padded to 4 bytes; only the first 2 matter).
pub const COMPRESSION_VALUE: usize = 54;
/// Strip offset value (LONG): where pixel data begins.
pub const STRIP_OFFSET_VALUE: usize = 78;
/// Rows-per-strip value (LONG): patched to the image height for a single-strip TIFF.
pub const ROWS_PER_STRIP_VALUE: usize = 102;
/// Strip byte count value (LONG): total payload size.
pub const STRIP_BYTE_COUNT_VALUE: usize = 114;

/// Number of top-level IFD tags before the GeoTIFF splice, at byte 8.
pub const TAG_COUNT: usize = 10;

#[rustfmt::skip]
pub const GRAY_U8: [u8; 134] = [
	73, 73, 42, 0, 8, 0, 0, 0,
	10, 0,
	0, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	1, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	2, 1, 3, 0, 1, 0, 0, 0, 8, 0, 0, 0,
	3, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	6, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	17, 1, 4, 0, 1, 0, 0, 0, 134, 0, 0, 0,
	21, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	22, 1, 4, 0, 1, 0, 0, 0, 255, 255, 255, 255,
	23, 1, 4, 0, 1, 0, 0, 0, 0, 0, 3, 0,
	83, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	0, 0, 0, 0,
];

#[rustfmt::skip]
pub const GRAY_F32: [u8; 134] = [
	73, 73, 42, 0, 8, 0, 0, 0,
	10, 0,
	0, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	1, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	2, 1, 3, 0, 1, 0, 0, 0, 32, 0, 0, 0,
	3, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	6, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	17, 1, 4, 0, 1, 0, 0, 0, 134, 0, 0, 0,
	21, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	22, 1, 4, 0, 1, 0, 0, 0, 255, 255, 255, 255,
	23, 1, 4, 0, 1, 0, 0, 0, 0, 0, 3, 0,
	83, 1, 3, 0, 1, 0, 0, 0, 3, 0, 0, 0,
	0, 0, 0, 0,
];

#[rustfmt::skip]
pub const RGB_U8: [u8; 146] = [
	73, 73, 42, 0, 8, 0, 0, 0,
	10, 0,
	0, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	1, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	2, 1, 3, 0, 3, 0, 0, 0, 134, 0, 0, 0,
	3, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	6, 1, 3, 0, 1, 0, 0, 0, 2, 0, 0, 0,
	17, 1, 4, 0, 1, 0, 0, 0, 146, 0, 0, 0,
	21, 1, 3, 0, 1, 0, 0, 0, 3, 0, 0, 0,
	22, 1, 4, 0, 1, 0, 0, 0, 255, 255, 255, 255,
	23, 1, 4, 0, 1, 0, 0, 0, 0, 0, 3, 0,
	83, 1, 3, 0, 3, 0, 0, 0, 140, 0, 0, 0,
	0, 0, 0, 0,
	8, 0, 8, 0, 8, 0,
	1, 0, 1, 0, 1, 0,
];

#[rustfmt::skip]
pub const RGBA_U8: [u8; 162] = [
	73, 73, 42, 0, 8, 0, 0, 0,
	11, 0,
	0, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	1, 1, 4, 0, 1, 0, 0, 0, 0, 1, 0, 0,
	2, 1, 3, 0, 4, 0, 0, 0, 146, 0, 0, 0,
	3, 1, 3, 0, 1, 0, 0, 0, 1, 0, 0, 0,
	6, 1, 3, 0, 1, 0, 0, 0, 2, 0, 0, 0,
	17, 1, 4, 0, 1, 0, 0, 0, 162, 0, 0, 0,
	21, 1, 3, 0, 1, 0, 0, 0, 4, 0, 0, 0,
	22, 1, 4, 0, 1, 0, 0, 0, 255, 255, 255, 255,
	23, 1, 4, 0, 1, 0, 0, 0, 0, 0, 4, 0,
	82, 1, 3, 0, 1, 0, 0, 0, 2, 0, 0, 0,
	83, 1, 3, 0, 4, 0, 0, 0, 154, 0, 0, 0,
	0, 0, 0, 0,
	8, 0, 8, 0, 8, 0, 8, 0,
	1, 0, 1, 0, 1, 0, 1, 0,
];
