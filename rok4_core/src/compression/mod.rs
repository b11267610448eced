//! Raster payload compressors: TIFF-flavored LZW and PackBits implemented
//! from scratch; Deflate delegated to `flate2` (which wraps zlib/miniz).

mod deflate;
mod lzw;
mod packbits;

pub use deflate::{DeflateEncoder, deflate_decode};
pub use lzw::{lzw_decode, lzw_encode};
pub use packbits::{packbits_decode, packbits_encode};

/// The compression codecs a pyramid or encoder can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
	Raw,
	Lzw,
	Deflate,
	PackBits,
}

impl Compression {
	/// The TIFF `Compression` tag value (field 259).
	#[must_use]
	pub fn tiff_tag_value(self) -> u16 {
		match self {
			Compression::Raw => 1,
			Compression::Lzw => 5,
			Compression::Deflate => 8,
			Compression::PackBits => 32773,
		}
	}

	/// The `Content-Encoding`-style advertised encoding for the HTTP
	/// response; only Deflate advertises one, per the external interfaces.
	#[must_use]
	pub fn advertised_encoding(self) -> &'static str {
		match self {
			Compression::Deflate => "deflate",
			_ => "",
		}
	}
}
