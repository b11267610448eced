//! Process configuration read from `ROK4_*` environment variables, with
//! typed defaults matching [`crate::cache::IndexCache`] and
//! [`crate::storage::RetryPolicy`].

use std::env;
use std::time::Duration;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use crate::storage::RetryPolicy;

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
	env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Sizing for the process-wide slab index cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
	pub capacity: usize,
	pub ttl: Duration,
}

impl CacheConfig {
	/// Reads `ROK4_CACHE_CAPACITY` and `ROK4_CACHE_TTL_SECONDS`, falling back
	/// to the cache's own defaults when unset or unparsable.
	#[must_use]
	pub fn from_env() -> Self {
		CacheConfig {
			capacity: env_parsed("ROK4_CACHE_CAPACITY", DEFAULT_CAPACITY),
			ttl: Duration::from_secs(env_parsed("ROK4_CACHE_TTL_SECONDS", DEFAULT_TTL.as_secs())),
		}
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfig { capacity: DEFAULT_CAPACITY, ttl: DEFAULT_TTL }
	}
}

/// Retry sizing for storage contexts, shared by the file and HTTP backends.
#[derive(Debug, Clone, Copy)]
pub struct StorageConfig {
	pub read_attempts: u32,
	pub write_attempts: u32,
}

impl StorageConfig {
	/// Reads `ROK4_STORAGE_READ_ATTEMPTS` and `ROK4_STORAGE_WRITE_ATTEMPTS`,
	/// falling back to [`RetryPolicy::default`]'s attempt counts.
	#[must_use]
	pub fn from_env() -> Self {
		let defaults = RetryPolicy::default();
		StorageConfig {
			read_attempts: env_parsed("ROK4_STORAGE_READ_ATTEMPTS", defaults.read_attempts),
			write_attempts: env_parsed("ROK4_STORAGE_WRITE_ATTEMPTS", defaults.write_attempts),
		}
	}

	/// Applies this configuration's attempt counts onto a [`RetryPolicy`],
	/// keeping its backoff untouched (backoff is not environment-driven).
	#[must_use]
	pub fn apply(self, mut policy: RetryPolicy) -> RetryPolicy {
		policy.read_attempts = self.read_attempts;
		policy.write_attempts = self.write_attempts;
		policy
	}
}

impl Default for StorageConfig {
	fn default() -> Self {
		let defaults = RetryPolicy::default();
		StorageConfig { read_attempts: defaults.read_attempts, write_attempts: defaults.write_attempts }
	}
}

#[cfg(test)]
mod tests {
	// A single test function, since these mutate process-wide environment
	// variables and `cargo test` runs tests in the same process concurrently.
	use super::*;

	#[test]
	fn env_driven_configs_fall_back_and_read_overrides() {
		unsafe {
			env::remove_var("ROK4_CACHE_CAPACITY");
			env::remove_var("ROK4_CACHE_TTL_SECONDS");
		}
		let cfg = CacheConfig::from_env();
		assert_eq!(cfg.capacity, DEFAULT_CAPACITY);
		assert_eq!(cfg.ttl, DEFAULT_TTL);

		unsafe {
			env::set_var("ROK4_CACHE_CAPACITY", "42");
			env::set_var("ROK4_CACHE_TTL_SECONDS", "17");
		}
		let cfg = CacheConfig::from_env();
		assert_eq!(cfg.capacity, 42);
		assert_eq!(cfg.ttl, Duration::from_secs(17));
		unsafe {
			env::remove_var("ROK4_CACHE_CAPACITY");
			env::remove_var("ROK4_CACHE_TTL_SECONDS");
		}

		unsafe {
			env::set_var("ROK4_STORAGE_READ_ATTEMPTS", "7");
			env::remove_var("ROK4_STORAGE_WRITE_ATTEMPTS");
		}
		let cfg = StorageConfig::from_env();
		let policy = cfg.apply(RetryPolicy::default());
		assert_eq!(policy.read_attempts, 7);
		assert_eq!(policy.write_attempts, RetryPolicy::default().write_attempts);
		unsafe {
			env::remove_var("ROK4_STORAGE_READ_ATTEMPTS");
		}
	}
}
