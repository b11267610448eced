use super::{RetryPolicy, WriteHandle};
use anyhow::{Result, bail};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use rok4_derive::context;
use std::thread::sleep;

/// Supplies the bearer/auth token for an `HttpContext`. Swift's Keystone
/// exchange and S3's signature scheme are both collapsed behind this one
/// seam — full protocol fidelity is out of scope (see SPEC_FULL.md §1);
/// what matters to this crate is the *shape* of the contract: lazy
/// authentication, with one automatic re-authentication on 401/403/400.
pub trait TokenProvider: Send + Sync {
	fn token(&self) -> Result<String>;
	/// Forces the next `token()` call to re-authenticate. Called once after
	/// an auth-flavored HTTP failure.
	fn invalidate(&self);
}

/// A token provider pre-seeded from a file path (`ROK4_SWIFT_TOKEN_FILE`),
/// re-read only after an explicit `invalidate`.
pub struct FileTokenProvider {
	path: String,
	cached: Mutex<Option<String>>,
}

impl FileTokenProvider {
	#[must_use]
	pub fn new(path: impl Into<String>) -> Self {
		FileTokenProvider { path: path.into(), cached: Mutex::new(None) }
	}
}

impl TokenProvider for FileTokenProvider {
	fn token(&self) -> Result<String> {
		let mut cached = self.cached.lock();
		if let Some(t) = cached.as_ref() {
			return Ok(t.clone());
		}
		let token = std::fs::read_to_string(&self.path)?.trim().to_string();
		*cached = Some(token.clone());
		Ok(token)
	}

	fn invalidate(&self) {
		*self.cached.lock() = None;
	}
}

/// A generic HTTP-object storage context (covers the common shape of
/// S3/Swift/Ceph: signed or bearer-authenticated GET/PUT against a base
/// URL). Each thread is expected to own its own `HttpContext` built from a
/// shared `reqwest::blocking::Client`, per the per-thread transport-handle
/// pooling in §4.1.
pub struct HttpContext {
	client: Client,
	base_url: String,
	token: Box<dyn TokenProvider>,
	retry: RetryPolicy,
}

impl HttpContext {
	#[must_use]
	pub fn new(client: Client, base_url: impl Into<String>, token: Box<dyn TokenProvider>) -> Self {
		HttpContext { client, base_url: base_url.into(), token, retry: RetryPolicy::default() }
	}

	#[must_use]
	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	#[must_use]
	pub fn path_for(&self, name: &str) -> String {
		format!("{}/{}", self.base_url.trim_end_matches('/'), name)
	}

	fn authed_request(&self, method: reqwest::Method, name: &str) -> Result<reqwest::blocking::RequestBuilder> {
		let token = self.token.token()?;
		Ok(self.client.request(method, self.path_for(name)).bearer_auth(token))
	}

	pub fn exists(&self, name: &str) -> Result<bool> {
		let resp = self.authed_request(reqwest::Method::HEAD, name)?.send()?;
		Ok(resp.status().is_success())
	}

	#[context("failed to read {size} bytes at offset {offset} from object '{name}'")]
	pub fn read(&self, name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
		let range = format!("bytes={}-{}", offset, offset + size - 1);
		let mut reauthenticated = false;
		let mut last_err = None;
		for attempt in 0..self.retry.read_attempts.max(1) {
			let outcome = self
				.authed_request(reqwest::Method::GET, name)
				.and_then(|b| Ok(b.header(reqwest::header::RANGE, range.clone()).send()?));
			match outcome {
				Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::PARTIAL_CONTENT => {
					return Ok(resp.bytes()?.to_vec());
				}
				Ok(resp) if is_auth_failure(resp.status()) && !reauthenticated => {
					log::warn!("object store returned {} for '{name}', re-authenticating once", resp.status());
					self.token.invalidate();
					reauthenticated = true;
				}
				Ok(resp) => {
					last_err = Some(anyhow::anyhow!("object store returned {} for '{name}'", resp.status()));
					sleep(self.retry.backoff);
				}
				Err(e) => {
					log::warn!("object read attempt {attempt} on '{name}' failed: {e}");
					last_err = Some(e);
					sleep(self.retry.backoff);
				}
			}
		}
		bail!(last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted read attempts for '{name}'")))
	}

	#[context("failed to read object '{name}' in full")]
	pub fn read_full(&self, name: &str) -> Result<Vec<u8>> {
		let resp = self.authed_request(reqwest::Method::GET, name)?.send()?;
		if !resp.status().is_success() {
			bail!("object store returned {} for '{name}'", resp.status());
		}
		Ok(resp.bytes()?.to_vec())
	}

	#[context("failed to flush write to object '{}'", handle.name)]
	pub fn close_to_write(&self, handle: WriteHandle) -> Result<()> {
		let mut reauthenticated = false;
		let mut last_err = None;
		for attempt in 0..self.retry.write_attempts.max(1) {
			let outcome = self
				.authed_request(reqwest::Method::PUT, &handle.name)
				.and_then(|b| Ok(b.body(handle.buffer.clone()).send()?));
			match outcome {
				Ok(resp) if resp.status().is_success() => return Ok(()),
				Ok(resp) if is_auth_failure(resp.status()) && !reauthenticated => {
					self.token.invalidate();
					reauthenticated = true;
				}
				Ok(resp) => {
					last_err = Some(anyhow::anyhow!("object store returned {} writing '{}'", resp.status(), handle.name));
					sleep(self.retry.backoff);
				}
				Err(e) => {
					log::warn!("object write attempt {attempt} on '{}' failed: {e}", handle.name);
					last_err = Some(e);
					sleep(self.retry.backoff);
				}
			}
		}
		bail!(last_err.unwrap_or_else(|| anyhow::anyhow!("exhausted write attempts for '{}'", handle.name)))
	}
}

fn is_auth_failure(status: StatusCode) -> bool {
	matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn file_token_provider_caches_until_invalidated() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("token");
		std::fs::write(&path, "abc123\n").unwrap();
		let provider = FileTokenProvider::new(path.to_string_lossy().to_string());
		assert_eq!(provider.token().unwrap(), "abc123");
		std::fs::write(&path, "changed\n").unwrap();
		// still cached
		assert_eq!(provider.token().unwrap(), "abc123");
		provider.invalidate();
		assert_eq!(provider.token().unwrap(), "changed");
	}

	#[test]
	fn classifies_auth_failures() {
		assert!(is_auth_failure(StatusCode::UNAUTHORIZED));
		assert!(is_auth_failure(StatusCode::FORBIDDEN));
		assert!(is_auth_failure(StatusCode::BAD_REQUEST));
		assert!(!is_auth_failure(StatusCode::NOT_FOUND));
	}
}
