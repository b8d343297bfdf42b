//! Module for hashing utilities.
//!
//! Named hash_utils to prevent clashing with the std::hash module.

/// IndexMap using a fast, non-cryptographic hash algorithm.
pub type FastIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// HashMap that uses pre-hashed keys and an identity hasher.
///
/// The bind group layout pool only needs the key to find the slot, never to
/// read it back, so the (potentially large) entry map is not stored.
pub type PreHashedMap<K, V> =
    std::collections::HashMap<PreHashedKey<K>, V, std::hash::BuildHasherDefault<IdentityHasher>>;

/// A pre-hashed key using FxHash which allows the hashing operation to be disconnected
/// from the storage in the map.
pub struct PreHashedKey<K>(u64, std::marker::PhantomData<fn() -> K>);

impl<K> std::fmt::Debug for PreHashedKey<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PreHashedKey").field(&self.0).finish()
    }
}

impl<K> Copy for PreHashedKey<K> {}

impl<K> Clone for PreHashedKey<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> PartialEq for PreHashedKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K> Eq for PreHashedKey<K> {}

impl<K> std::hash::Hash for PreHashedKey<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<K: std::hash::Hash> PreHashedKey<K> {
    pub fn from_key(key: &K) -> Self {
        use std::hash::Hasher;

        let mut hasher = rustc_hash::FxHasher::default();
        key.hash(&mut hasher);
        Self(hasher.finish(), std::marker::PhantomData)
    }
}

/// A hasher which passes a pre-computed `u64` hash straight through.
///
/// Only `write_u64` is meaningful; [`PreHashedKey`] is the only key type
/// hashed with it.
#[derive(Default)]
pub struct IdentityHasher {
    hash: u64,
}

impl std::hash::Hasher for IdentityHasher {
    fn write(&mut self, bytes: &[u8]) {
        // Fold arbitrary bytes in; never reached through `PreHashedKey`.
        for &byte in bytes {
            self.hash = self.hash.rotate_left(8) ^ u64::from(byte);
        }
    }

    fn write_u64(&mut self, i: u64) {
        self.hash = i;
    }

    fn finish(&self) -> u64 {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_hashed_keys_are_stable() {
        let a = PreHashedKey::from_key(&[1u32, 2, 3]);
        let b = PreHashedKey::from_key(&[1u32, 2, 3]);
        let c = PreHashedKey::from_key(&[3u32, 2, 1]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut map = PreHashedMap::default();
        map.insert(a, "first");
        assert_eq!(map.get(&b), Some(&"first"));
        assert_eq!(map.get(&c), None);
    }
}
