use super::{RetryPolicy, WriteHandle};
use anyhow::Result;
use rok4_derive::context;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread::sleep;

/// Local filesystem storage context. `name` is resolved relative to
/// `base_dir`; retries apply to the rare transient I/O error (mirroring
/// the remote-backend contract even though local reads are not expected
/// to need them in practice).
pub struct FileContext {
	base_dir: PathBuf,
	retry: RetryPolicy,
}

impl FileContext {
	#[must_use]
	pub fn new(base_dir: impl Into<PathBuf>) -> Self {
		FileContext { base_dir: base_dir.into(), retry: RetryPolicy::default() }
	}

	#[must_use]
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	#[must_use]
	pub fn path_for(&self, name: &str) -> String {
		self.base_dir.join(name).to_string_lossy().into_owned()
	}

	fn resolved(&self, name: &str) -> PathBuf {
		self.base_dir.join(name)
	}

	pub fn exists(&self, name: &str) -> Result<bool> {
		Ok(self.resolved(name).exists())
	}

	#[context("failed to read {size} bytes at offset {offset} from file slab '{name}'")]
	pub fn read(&self, name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
		let path = self.resolved(name);
		let mut last_err = None;
		for attempt in 0..self.retry.read_attempts.max(1) {
			match read_range(&path, offset, size) {
				Ok(data) => return Ok(data),
				Err(e) => {
					log::warn!("file read attempt {attempt} on '{name}' failed: {e}");
					last_err = Some(e);
					sleep(self.retry.backoff);
				}
			}
		}
		Err(last_err.unwrap())
	}

	#[context("failed to read file slab '{name}' in full")]
	pub fn read_full(&self, name: &str) -> Result<Vec<u8>> {
		Ok(fs::read(self.resolved(name))?)
	}

	#[context("failed to flush write to file '{}'", handle.name)]
	pub fn close_to_write(&self, handle: WriteHandle) -> Result<()> {
		let path = self.resolved(&handle.name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		fs::write(path, handle.buffer)?;
		Ok(())
	}
}

fn read_range(path: &Path, offset: u64, size: u64) -> Result<Vec<u8>> {
	let mut f = fs::File::open(path)?;
	f.seek(SeekFrom::Start(offset))?;
	let mut buf = vec![0u8; size as usize];
	f.read_exact(&mut buf)?;
	Ok(buf)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn round_trips_a_write_then_read() {
		let dir = tempdir().unwrap();
		let ctx = FileContext::new(dir.path());
		let mut handle = WriteHandle { name: "slab.data".to_string(), buffer: Vec::new() };
		handle.write(0, b"hello world");
		ctx.close_to_write(handle).unwrap();

		assert!(ctx.exists("slab.data").unwrap());
		let data = ctx.read("slab.data", 6, 5).unwrap();
		assert_eq!(data, b"world");
	}

	#[test]
	fn missing_file_read_errors_after_retries() {
		let dir = tempdir().unwrap();
		let ctx = FileContext::new(dir.path()).with_retry_policy(RetryPolicy {
			read_attempts: 2,
			write_attempts: 2,
			backoff: std::time::Duration::from_millis(1),
		});
		assert!(ctx.read("missing.data", 0, 4).is_err());
	}
}
