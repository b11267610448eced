//! The tile index cache: a bounded map from slab key to the slab's parsed
//! header (storage context name, physical slab path, per-tile offsets and
//! sizes), keyed by an absolute TTL rather than LRU recency.
//!
//! This deliberately diverges from a classic LRU cache (the shape a cache
//! in this codebase would normally take): entries are *not* promoted on a
//! hit. A hot slab must still be re-read after its TTL elapses, so a writer
//! that rewrites a slab in place is visible again within a bounded window
//! instead of being masked forever by cache hits.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The parsed header of a slab, as consulted by `Level::get_tile`: offsets
/// and sizes are parallel vectors, one entry per tile in the slab.
#[derive(Debug, Clone)]
pub struct SlabIndex {
	/// Name of the storage context that owns this slab (e.g. a backend id),
	/// opaque to the cache itself.
	pub context_name: String,
	/// Physical slab path, which may differ from the requested key (e.g.
	/// after following a symlink on a file backend).
	pub slab_name: String,
	pub offsets: Vec<u32>,
	pub sizes: Vec<u32>,
}

struct Entry {
	index: SlabIndex,
	created_at: Instant,
}

/// Default entry capacity and TTL, per the data model (§3 Slab and tile
/// index).
pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Inner {
	capacity: usize,
	ttl: Duration,
	/// Insertion-ordered keys, used purely for bounded eviction (oldest
	/// entry evicted first); this is NOT an LRU list, it is never reordered
	/// on a hit.
	order: Vec<String>,
	entries: HashMap<String, Entry>,
}

/// Bounded, TTL-expiring, thread-safe tile index cache. Every mutating
/// operation holds a single mutex for the whole cache; a read that
/// observes an expired entry takes the mutex, rechecks under lock, and
/// erases it — so the cache never returns a second round of a stale hit.
pub struct IndexCache {
	inner: Mutex<Inner>,
}

impl IndexCache {
	#[must_use]
	pub fn new(capacity: usize, ttl: Duration) -> Self {
		IndexCache {
			inner: Mutex::new(Inner { capacity, ttl, order: Vec::new(), entries: HashMap::new() }),
		}
	}

	#[must_use]
	pub fn with_defaults() -> Self {
		Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
	}

	/// Looks up `(slab_key, tile_index)`. Returns `None` on a cold miss or
	/// when the entry has expired (in which case it is evicted as a side
	/// effect). Does *not* refresh the entry's position or timestamp.
	pub fn get(&self, slab_key: &str, tile_index: usize) -> Option<(SlabIndex, u32, u32)> {
		let mut inner = self.inner.lock();
		let expired = match inner.entries.get(slab_key) {
			Some(entry) => entry.created_at.elapsed() > inner.ttl,
			None => return None,
		};
		if expired {
			inner.entries.remove(slab_key);
			inner.order.retain(|k| k != slab_key);
			log::debug!("index cache: evicting expired slab '{slab_key}'");
			return None;
		}
		let entry = inner.entries.get(slab_key)?;
		let offset = *entry.index.offsets.get(tile_index)?;
		let size = *entry.index.sizes.get(tile_index)?;
		Some((entry.index.clone(), offset, size))
	}

	/// Inserts the parsed header for `slab_key`, built from raw
	/// little-endian offset/size tables read from the slab header. If the
	/// cache is at capacity, evicts the oldest entry (back of the
	/// insertion-ordered list) before inserting.
	pub fn add(&self, slab_key: &str, context_name: &str, slab_name: &str, offsets: Vec<u32>, sizes: Vec<u32>) {
		let mut inner = self.inner.lock();
		if !inner.entries.contains_key(slab_key) && inner.entries.len() >= inner.capacity {
			if let Some(oldest) = inner.order.first().cloned() {
				inner.entries.remove(&oldest);
				inner.order.remove(0);
				log::debug!("index cache: evicting '{oldest}' to make room for '{slab_key}'");
			}
		}
		let index = SlabIndex { context_name: context_name.to_string(), slab_name: slab_name.to_string(), offsets, sizes };
		if inner.entries.insert(slab_key.to_string(), Entry { index, created_at: Instant::now() }).is_none() {
			inner.order.push(slab_key.to_string());
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.inner.lock().capacity
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::thread::sleep;

	#[test]
	fn miss_on_empty_cache() {
		let cache = IndexCache::with_defaults();
		assert!(cache.get("slab-1", 0).is_none());
	}

	#[test]
	fn hit_after_add() {
		let cache = IndexCache::with_defaults();
		cache.add("slab-1", "file", "slab-1.data", vec![0, 10], vec![10, 20]);
		let (index, offset, size) = cache.get("slab-1", 1).unwrap();
		assert_eq!(index.slab_name, "slab-1.data");
		assert_eq!(offset, 10);
		assert_eq!(size, 20);
	}

	#[test]
	fn never_exceeds_capacity() {
		let cache = IndexCache::new(2, DEFAULT_TTL);
		cache.add("a", "file", "a.data", vec![0], vec![1]);
		cache.add("b", "file", "b.data", vec![0], vec![1]);
		cache.add("c", "file", "c.data", vec![0], vec![1]);
		assert_eq!(cache.len(), 2);
		// 'a' was the oldest, so it should have been evicted.
		assert!(cache.get("a", 0).is_none());
		assert!(cache.get("c", 0).is_some());
	}

	#[test]
	fn entries_older_than_ttl_are_treated_as_misses() {
		let cache = IndexCache::new(10, Duration::from_millis(10));
		cache.add("a", "file", "a.data", vec![0], vec![1]);
		sleep(Duration::from_millis(30));
		assert!(cache.get("a", 0).is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn hit_does_not_promote_or_refresh() {
		// Demonstrates the deliberate divergence from LRU: repeatedly
		// hitting 'a' does not protect it from capacity eviction in favor
		// of recency, only insertion order matters.
		let cache = IndexCache::new(2, DEFAULT_TTL);
		cache.add("a", "file", "a.data", vec![0], vec![1]);
		cache.add("b", "file", "b.data", vec![0], vec![1]);
		for _ in 0..5 {
			assert!(cache.get("a", 0).is_some());
		}
		cache.add("c", "file", "c.data", vec![0], vec![1]);
		assert!(cache.get("a", 0).is_none(), "hits must not promote 'a' out of eviction order");
	}
}
