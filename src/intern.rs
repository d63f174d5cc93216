// ============================================================================
// Process-wide field-name interning
// ============================================================================
//
// Repeated object keys ("id", "name", ...) are deduplicated into shared
// `Arc<str>` values across all parses. Lookups that hit take only the shared
// read lock; the exclusive lock is held for inserts alone. `reset` clears
// the cache explicitly; there is no implicit eviction.

use std::collections::HashSet;
use std::hash::{BuildHasher, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;

// ----------------------------------------------------------------------------
// FNV-1a hasher - fast non-cryptographic hash for short key strings
// ----------------------------------------------------------------------------

/// FNV-1a hasher optimized for short byte slices (JSON keys).
/// Non-cryptographic but fast - perfect for key deduplication.
#[derive(Default)]
pub(crate) struct FnvHasher(u64);

impl Hasher for FnvHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        const FNV_PRIME: u64 = 0x100000001b3;
        for &byte in bytes {
            self.0 ^= byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

pub(crate) struct FnvBuildHasher;

impl BuildHasher for FnvBuildHasher {
    type Hasher = FnvHasher;

    #[inline]
    fn build_hasher(&self) -> FnvHasher {
        FnvHasher(0xcbf29ce484222325) // FNV offset basis
    }
}

impl Default for FnvBuildHasher {
    fn default() -> Self {
        FnvBuildHasher
    }
}

lazy_static! {
    static ref KEYS: RwLock<HashSet<Arc<str>, FnvBuildHasher>> =
        RwLock::new(HashSet::with_hasher(FnvBuildHasher));
}

/// Shared copy of `name`, deduplicated process-wide.
pub fn intern(name: &str) -> Arc<str> {
    {
        let keys = KEYS.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = keys.get(name) {
            return Arc::clone(hit);
        }
    }
    let mut keys = KEYS.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(hit) = keys.get(name) {
        return Arc::clone(hit);
    }
    let value: Arc<str> = Arc::from(name);
    keys.insert(Arc::clone(&value));
    value
}

/// Drop every cached name. Interned values already handed out stay valid.
pub fn reset() {
    KEYS.write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Number of currently cached names.
pub fn len() -> usize {
    KEYS.read().unwrap_or_else(PoisonError::into_inner).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    // one test so the global reset cannot race a sibling test's lookups
    #[test]
    fn test_intern_dedupes_and_reset_clears() {
        let a = intern("field_one_for_intern_test");
        let b = intern("field_one_for_intern_test");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&*a, "field_one_for_intern_test");
        assert!(len() >= 1);

        reset();
        // handed-out values stay valid; the next intern is a fresh entry
        assert_eq!(&*a, "field_one_for_intern_test");
        let c = intern("field_one_for_intern_test");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
