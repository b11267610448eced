//! Storage contexts: a unified read/write/exists contract over file and
//! HTTP-object backends, with bounded retries and lazy re-authentication.
//!
//! The full system distinguishes File/S3/Swift/Ceph; this crate implements
//! `File` concretely and a generic `Http` backend covering the common
//! "signed/bearer HTTP GET+PUT" shape shared by S3/Swift/Ceph, since
//! per-backend authentication protocol detail is out of scope (see
//! SPEC_FULL.md §1).

mod file;
mod http;

pub use file::FileContext;
pub use http::{HttpContext, TokenProvider};

use anyhow::Result;

/// A unified storage path `type://container/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
	pub kind: String,
	pub container: String,
	pub name: String,
}

impl StoragePath {
	pub fn parse(path: &str) -> Result<StoragePath> {
		let (kind, rest) = path.split_once("://").ok_or_else(|| anyhow::anyhow!("storage path '{path}' is missing a 'type://' prefix"))?;
		let (container, name) = rest.split_once('/').ok_or_else(|| anyhow::anyhow!("storage path '{path}' is missing a container/name separator"))?;
		Ok(StoragePath { kind: kind.to_string(), container: container.to_string(), name: name.to_string() })
	}
}

/// Configuration shared by every backend: retry counts and backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub read_attempts: u32,
	pub write_attempts: u32,
	pub backoff: std::time::Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy { read_attempts: 3, write_attempts: 3, backoff: std::time::Duration::from_millis(50) }
	}
}

/// An in-progress buffered write: writes accumulate here until
/// `close_to_write` flushes the buffer as a single object.
#[derive(Debug, Default)]
pub struct WriteHandle {
	pub name: String,
	pub buffer: Vec<u8>,
}

impl WriteHandle {
	/// Writes `src` at `offset`, growing the buffer (zero-filled) as
	/// needed, per the "buffer is grown to offset + size" contract.
	pub fn write(&mut self, offset: usize, src: &[u8]) {
		let end = offset + src.len();
		if self.buffer.len() < end {
			self.buffer.resize(end, 0);
		}
		self.buffer[offset..end].copy_from_slice(src);
	}
}

/// Tagged variant over the supported backends. `S3`/`Swift`/`Ceph` share
/// the `Http` implementation; only the token provider differs.
pub enum StorageContext {
	File(FileContext),
	Http(HttpContext),
}

impl StorageContext {
	pub fn exists(&self, name: &str) -> Result<bool> {
		match self {
			StorageContext::File(c) => c.exists(name),
			StorageContext::Http(c) => c.exists(name),
		}
	}

	pub fn read(&self, name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
		match self {
			StorageContext::File(c) => c.read(name, offset, size),
			StorageContext::Http(c) => c.read(name, offset, size),
		}
	}

	pub fn read_full(&self, name: &str) -> Result<Vec<u8>> {
		match self {
			StorageContext::File(c) => c.read_full(name),
			StorageContext::Http(c) => c.read_full(name),
		}
	}

	pub fn open_to_write(&self, name: &str) -> WriteHandle {
		WriteHandle { name: name.to_string(), buffer: Vec::new() }
	}

	pub fn close_to_write(&self, handle: WriteHandle) -> Result<()> {
		match self {
			StorageContext::File(c) => c.close_to_write(handle),
			StorageContext::Http(c) => c.close_to_write(handle),
		}
	}

	#[must_use]
	pub fn path_for(&self, name: &str) -> String {
		match self {
			StorageContext::File(c) => c.path_for(name),
			StorageContext::Http(c) => c.path_for(name),
		}
	}
}

/// `base_dir/levelN/d1/d2/…/dp`: hex-bucketed path rule for file-backend
/// slab storage, splitting `(sx, sy)` into `depth` hex digit pairs.
#[must_use]
pub fn file_backend_path(base_dir: &str, level_id: &str, sx: u32, sy: u32, depth: u32) -> String {
	let mut parts = vec![base_dir.trim_end_matches('/').to_string(), format!("level{level_id}")];
	let combined = (u64::from(sx) << 32) | u64::from(sy);
	for i in (0..depth).rev() {
		let nibble = (combined >> (i * 4)) & 0xF;
		parts.push(format!("{nibble:x}"));
	}
	parts.join("/")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_storage_path() {
		let p = StoragePath::parse("s3://my-bucket/pyramids/level3/slab.data").unwrap();
		assert_eq!(p.kind, "s3");
		assert_eq!(p.container, "my-bucket");
		assert_eq!(p.name, "pyramids/level3/slab.data");
	}

	#[test]
	fn rejects_path_without_scheme() {
		assert!(StoragePath::parse("my-bucket/name").is_err());
	}

	#[test]
	fn write_handle_grows_buffer() {
		let mut handle = WriteHandle { name: "x".into(), buffer: Vec::new() };
		handle.write(4, &[1, 2, 3]);
		assert_eq!(handle.buffer, vec![0, 0, 0, 0, 1, 2, 3]);
	}

	#[test]
	fn file_backend_path_is_depth_bucketed() {
		let path = file_backend_path("/data", "3", 0x12, 0x34, 2);
		assert!(path.starts_with("/data/level3/"));
		assert_eq!(path.split('/').count(), 5);
	}
}
