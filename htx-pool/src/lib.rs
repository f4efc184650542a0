//! Client connection pool (C10): composite-keyed reuse with weak-reference
//! expiry, grounded in `connection_pool.{hpp,cpp}`.
//!
//! The original indexes entries two ways (a hashed composite key and a
//! sequenced index "for LRU-style access if needed in future"), but never
//! wires the sequenced index into any eviction policy — it only exists to
//! let `clear()`/`cleanup_expired()` walk every entry in insertion order.
//! This keeps the key→weak map and drops the unused ordering (see
//! DESIGN.md's Open Question decision).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

/// Host/port/ssl/unix-path composite key identifying a pool slot.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PoolKey {
    host: String,
    port: u16,
    ssl: bool,
    unix_path: String,
}

impl PoolKey {
    pub fn tcp(host: impl Into<String>, port: u16, ssl: bool) -> Self {
        PoolKey { host: host.into(), port, ssl, unix_path: String::new() }
    }

    pub fn unix(path: impl Into<String>) -> Self {
        PoolKey { host: String::new(), port: 0, ssl: false, unix_path: path.into() }
    }
}

/// A pool of `Weak<T>` connections keyed by [`PoolKey`]. `T` is whatever
/// reusable connection type the caller (`htx-client`) wraps in `Arc`; the
/// pool never owns a strong reference, so an idle connection that nothing
/// else holds onto is simply dropped rather than kept alive indefinitely.
pub struct ConnectionPool<T> {
    entries: RwLock<HashMap<PoolKey, Weak<T>>>,
}

impl<T> Default for ConnectionPool<T> {
    fn default() -> Self {
        ConnectionPool { entries: RwLock::new(HashMap::new()) }
    }
}

impl<T> ConnectionPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Double-checked lookup: a shared-lock fast path returns a live
    /// connection without ever taking the write lock; only a stale entry
    /// triggers the exclusive-lock cleanup pass.
    pub fn get(&self, key: &PoolKey) -> Option<Arc<T>> {
        {
            let entries = self.entries.read().expect("pool lock poisoned");
            match entries.get(key) {
                Some(weak) => {
                    if let Some(conn) = weak.upgrade() {
                        return Some(conn);
                    }
                }
                None => return None,
            }
        }

        let mut entries = self.entries.write().expect("pool lock poisoned");
        if let Some(weak) = entries.get(key) {
            if weak.strong_count() == 0 {
                entries.remove(key);
            }
        }
        None
    }

    /// Replaces whatever is stored under `key` with `connection`.
    pub fn store(&self, key: PoolKey, connection: &Arc<T>) {
        let mut entries = self.entries.write().expect("pool lock poisoned");
        entries.insert(key, Arc::downgrade(connection));
    }

    /// Drops every entry whose connection has already been dropped
    /// elsewhere. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().expect("pool lock poisoned");
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "evicted expired pool connections");
        }
        removed
    }

    pub fn size(&self) -> usize {
        self.entries.read().expect("pool lock poisoned").len()
    }

    /// Drops every entry. Unlike the original's `clear()`, this never
    /// calls a `close()` method on live connections: `T` is an opaque
    /// caller type to this crate, and a pool entry is only ever a `Weak`
    /// reference, so there is nothing here to gracefully shut down —
    /// the caller's own `Arc<T>` owns that lifecycle.
    pub fn clear(&self) {
        let mut entries = self.entries.write().expect("pool lock poisoned");
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_reuses_live_connection() {
        let pool = ConnectionPool::new();
        let key = PoolKey::tcp("example.com", 443, true);
        let conn = Arc::new(7u32);
        pool.store(key.clone(), &conn);
        assert_eq!(pool.get(&key).map(|c| *c), Some(7));
    }

    #[test]
    fn get_returns_none_once_last_strong_ref_drops() {
        let pool = ConnectionPool::new();
        let key = PoolKey::tcp("example.com", 80, false);
        let conn = Arc::new(1u32);
        pool.store(key.clone(), &conn);
        drop(conn);
        assert!(pool.get(&key).is_none());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn cleanup_expired_removes_only_dead_entries() {
        let pool = ConnectionPool::new();
        let alive_key = PoolKey::tcp("a.example.com", 80, false);
        let dead_key = PoolKey::tcp("b.example.com", 80, false);
        let alive = Arc::new(1u32);
        pool.store(alive_key, &alive);
        {
            let dead = Arc::new(2u32);
            pool.store(dead_key, &dead);
        }
        assert_eq!(pool.size(), 2);
        assert_eq!(pool.cleanup_expired(), 1);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn distinct_unix_paths_are_distinct_keys() {
        let pool = ConnectionPool::new();
        let a = PoolKey::unix("/tmp/a.sock");
        let b = PoolKey::unix("/tmp/b.sock");
        assert_ne!(a, b);
        let conn = Arc::new(9u32);
        pool.store(a.clone(), &conn);
        assert!(pool.get(&b).is_none());
        assert!(pool.get(&a).is_some());
    }

    #[test]
    fn clear_empties_the_pool() {
        let pool = ConnectionPool::new();
        let conn = Arc::new(1u32);
        pool.store(PoolKey::tcp("x", 1, false), &conn);
        pool.clear();
        assert_eq!(pool.size(), 0);
    }
}
