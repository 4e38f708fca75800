//! Type aliases for commonly used shared-state types.
//!
//! Subscriber and handler closures must be `Send + Sync + 'static`, so any
//! mutable state they touch lives behind one of these wrappers.
//! `parking_lot` locks are used throughout; they do not poison.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe read-write locked map, for registries read far more often
/// than written.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Create an empty `ThreadSafeRwMap<K, V>`.
#[inline]
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}
