//! Memoization of "current equals desired" checks.
//!
//! The reconciler compares the remote ruleset with the desired one on every
//! plan. Verdicts are cached per `"<file id>.<field>"` key together with a
//! fingerprint of the compared inputs; a verdict is only reused when the
//! fingerprint matches, and it is dropped after any write to that file.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use tracing::trace;

/// Key for the rules field of a file.
pub fn rules_key(file_id: &str) -> String {
    format!("{}.rules", file_id)
}

/// Fingerprint of the two values being compared. Hashes the values as they
/// are, without rendering them, so it stays cheaper than the comparison it
/// guards.
pub fn fingerprint<T: Hash + ?Sized>(current: &T, desired: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    current.hash(&mut hasher);
    desired.hash(&mut hasher);
    hasher.finish()
}

/// A cached equality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub fingerprint: u64,
    pub equal: bool,
}

/// Cache of equality verdicts.
pub trait DiffCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Verdict>;
    fn insert(&self, key: &str, verdict: Verdict);
    fn invalidate(&self, key: &str);

    /// Return the cached verdict for these inputs or compute and store it.
    fn get_or_compute(&self, key: &str, fingerprint: u64, compute: &mut dyn FnMut() -> bool) -> bool {
        if let Some(hit) = self.get(key).filter(|v| v.fingerprint == fingerprint) {
            trace!(key, equal = hit.equal, "diff cache hit");
            return hit.equal;
        }
        let equal = compute();
        self.insert(key, Verdict { fingerprint, equal });
        equal
    }
}

/// Process-local cache guarded by a read/write lock.
#[derive(Debug, Default)]
pub struct MemoryDiffCache {
    entries: RwLock<HashMap<String, Verdict>>,
}

impl MemoryDiffCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiffCache for MemoryDiffCache {
    fn get(&self, key: &str) -> Option<Verdict> {
        self.entries.read().ok()?.get(key).copied()
    }

    fn insert(&self, key: &str, verdict: Verdict) {
        // A poisoned lock only costs a recomputation.
        if let Ok(mut map) = self.entries.write() {
            map.insert(key.to_string(), verdict);
        }
    }

    fn invalidate(&self, key: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.remove(key);
        }
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiffCache;

impl DiffCache for NoopDiffCache {
    fn get(&self, _key: &str) -> Option<Verdict> {
        None
    }

    fn insert(&self, _key: &str, _verdict: Verdict) {}

    fn invalidate(&self, _key: &str) {}
}
