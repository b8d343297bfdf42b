use std::hash::{Hash, Hasher};

use crate::{binding_model, FastIndexMap};

/// A map of the [`bst::BindGroupLayoutEntry`]s of one bind group layout, keyed
/// by binding index.
///
/// It is hashable, so the device can deduplicate bind group layouts.
#[derive(Debug, Default, Clone, Eq)]
pub struct EntryMap {
    /// Entries are sorted by binding index, so that the hash of equivalent
    /// layouts is the same regardless of the order they were declared in.
    inner: FastIndexMap<u32, bst::BindGroupLayoutEntry>,
    /// Hash and PartialEq are only stable on a sorted map.
    sorted: bool,
}

impl PartialEq for EntryMap {
    fn eq(&self, other: &Self) -> bool {
        self.assert_sorted();
        other.assert_sorted();

        self.inner == other.inner
    }
}

impl Hash for EntryMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.assert_sorted();

        // Keys are part of the values.
        for entry in self.inner.values() {
            entry.hash(state);
        }
    }
}

impl EntryMap {
    fn assert_sorted(&self) {
        assert!(self.sorted);
    }

    /// Create a new [`EntryMap`] from a slice of [`bst::BindGroupLayoutEntry`]s.
    ///
    /// Errors if there are duplicate bindings or if any binding index is not
    /// below the device's `max_bindings_per_bind_group`.
    pub fn from_entries(
        device_limits: &bst::Limits,
        entries: &[bst::BindGroupLayoutEntry],
    ) -> Result<Self, binding_model::CreateBindGroupLayoutError> {
        let mut inner = FastIndexMap::with_capacity_and_hasher(entries.len(), Default::default());
        for entry in entries {
            if entry.binding >= device_limits.max_bindings_per_bind_group {
                return Err(
                    binding_model::CreateBindGroupLayoutError::InvalidBindingIndex {
                        binding: entry.binding,
                        maximum: device_limits.max_bindings_per_bind_group,
                    },
                );
            }
            if inner.insert(entry.binding, *entry).is_some() {
                return Err(binding_model::CreateBindGroupLayoutError::ConflictBinding(
                    entry.binding,
                ));
            }
        }
        inner.sort_unstable_keys();

        Ok(Self {
            inner,
            sorted: true,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, binding: u32) -> Option<&bst::BindGroupLayoutEntry> {
        self.inner.get(&binding)
    }

    /// Iterator over all the entries, in increasing binding order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &bst::BindGroupLayoutEntry> + '_ {
        self.inner.values()
    }
}
