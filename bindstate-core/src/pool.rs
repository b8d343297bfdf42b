use std::{
    collections::{hash_map::Entry, HashMap},
    hash::Hash,
    sync::{Arc, Weak},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{PreHashedKey, PreHashedMap};

type PoolSlot<V> = Arc<OnceCell<Weak<V>>>;

/// Interning pool handing out one shared object per distinct key.
///
/// The pool only holds weak references. The object is expected to call
/// [`ResourcePool::remove`] from its `Drop` implementation so that the key can
/// be reused.
pub(crate) struct ResourcePool<K, V> {
    slots: Mutex<PreHashedMap<K, PoolSlot<V>>>,
}

impl<K: Hash, V> ResourcePool<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::default()),
        }
    }

    /// Returns the live object for `key`, or builds one with `constructor`.
    ///
    /// At most one object exists per key at any time. If the constructor
    /// fails, the slot stays empty and the next caller retries.
    pub fn get_or_init<F, E>(&self, key: K, constructor: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(K) -> Result<Arc<V>, E>,
    {
        let hashed_key = PreHashedKey::from_key(&key);

        // The constructor runs at most once, but it is moved into a closure on
        // every iteration of the loop below.
        let mut pending = Some((key, constructor));

        loop {
            let slot = {
                let mut slots = self.slots.lock();
                match slots.entry(hashed_key) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => Arc::clone(entry.insert(Arc::new(OnceCell::new()))),
                }
            };

            // Hold the strong reference we create so it outlives the closure.
            let mut created = None;
            let weak = slot.get_or_try_init(|| {
                let (key, constructor) = match pending.take() {
                    Some(pending) => pending,
                    None => unreachable!("pool constructor invoked twice"),
                };
                let strong = constructor(key)?;
                let weak = Arc::downgrade(&strong);
                created = Some(strong);
                Ok(weak)
            })?;

            if let Some(strong) = created {
                return Ok(strong);
            }
            if let Some(strong) = weak.upgrade() {
                return Ok(strong);
            }

            // The object is being dropped and its `remove` call has not
            // happened yet. Spin until the slot is cleared.
            std::hint::spin_loop();
        }
    }

    /// Forgets the slot for `key`.
    ///
    /// Only the `Drop` implementation of the pooled object may call this.
    pub fn remove(&self, key: &K) {
        let hashed_key = PreHashedKey::from_key(key);
        self.slots.lock().remove(&hashed_key);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Barrier,
    };

    use super::*;

    #[test]
    fn same_key_yields_same_object() {
        let pool = ResourcePool::<&str, String>::new();
        let mut built = 0;

        let first = pool
            .get_or_init::<_, ()>("uniform", |key| {
                built += 1;
                Ok(Arc::new(key.to_string()))
            })
            .unwrap();
        let second = pool
            .get_or_init::<_, ()>("uniform", |key| {
                built += 1;
                Ok(Arc::new(key.to_string()))
            })
            .unwrap();
        let other = pool
            .get_or_init::<_, ()>("storage", |key| {
                built += 1;
                Ok(Arc::new(key.to_string()))
            })
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(built, 2);
    }

    #[test]
    fn removed_key_is_rebuilt() {
        let pool = ResourcePool::<u32, u32>::new();

        let first = pool.get_or_init::<_, ()>(7, |key| Ok(Arc::new(key))).unwrap();
        let weak = Arc::downgrade(&first);
        drop(first);
        pool.remove(&7);
        assert_eq!(pool.len(), 0);

        let second = pool
            .get_or_init::<_, ()>(7, |key| Ok(Arc::new(key + 1)))
            .unwrap();
        assert!(weak.upgrade().is_none());
        assert_eq!(*second, 8);
    }

    #[test]
    fn failed_constructor_leaves_slot_empty() {
        let pool = ResourcePool::<u32, u32>::new();

        let err = pool.get_or_init(1, |_| Err("bad layout")).unwrap_err();
        assert_eq!(err, "bad layout");

        let value = pool
            .get_or_init::<_, &str>(1, |key| Ok(Arc::new(key * 10)))
            .unwrap();
        assert_eq!(*value, 10);
    }

    #[test]
    fn concurrent_creation_2_threads() {
        let pool = Arc::new(ResourcePool::<u32, u32>::new());
        let built = Arc::new(AtomicU32::new(0));
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |pool: Arc<ResourcePool<u32, u32>>,
                     built: Arc<AtomicU32>,
                     barrier: Arc<Barrier>| {
            std::thread::spawn(move || {
                barrier.wait();
                pool.get_or_init::<_, ()>(3, |key| {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                    built.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(key))
                })
                .unwrap()
            })
        };

        let a = spawn(pool.clone(), built.clone(), barrier.clone());
        let b = spawn(pool, built.clone(), barrier);
        let a = a.join().unwrap();
        let b = b.join().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
