use crate::{
    binding_model::{BindError, BindGroup, BindGroupLayout, PipelineLayout},
    resource::{Labeled, ResourceErrorIdent},
};

use thiserror::Error;

use std::sync::Arc;

mod compat {
    use crate::resource::Handle;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(super) enum Mismatch {
        Missing,
        Incompatible,
    }

    #[derive(Debug)]
    struct Entry<T> {
        assigned: Option<T>,
        expected: Option<T>,
    }

    impl<T> Default for Entry<T> {
        fn default() -> Self {
            Entry {
                assigned: None,
                expected: None,
            }
        }
    }

    impl<T: Handle> Entry<T> {
        fn check(&self) -> Result<(), Mismatch> {
            match (&self.expected, &self.assigned) {
                (None, _) => Ok(()),
                (Some(_), None) => Err(Mismatch::Missing),
                (Some(expected), Some(assigned)) if expected.is_same(assigned) => Ok(()),
                (Some(_), Some(_)) => Err(Mismatch::Incompatible),
            }
        }
    }

    #[derive(Debug)]
    pub(super) struct Manager<T> {
        entries: [Entry<T>; bst::MAX_BIND_GROUPS],
    }

    impl<T: Handle> Manager<T> {
        pub fn new() -> Self {
            Manager {
                entries: Default::default(),
            }
        }

        pub fn update_expectations(&mut self, expectations: &[T]) {
            for (i, e) in self.entries.iter_mut().enumerate() {
                e.expected = expectations.get(i).cloned();
            }
        }

        pub fn assign(&mut self, index: usize, value: T) {
            self.entries[index].assigned = Some(value);
        }

        /// Number of slots the current expectations cover.
        pub fn num_expected(&self) -> usize {
            self.entries
                .iter()
                .take_while(|e| e.expected.is_some())
                .count()
        }

        pub fn check(&self, index: usize) -> Result<(), Mismatch> {
            self.entries[index].check()
        }
    }

    #[test]
    fn test_compatibility() {
        use std::sync::Arc;

        let (a, b, c) = (Arc::new(1), Arc::new(2), Arc::new(3));
        let equal_to_a = Arc::new(1);

        let mut man = Manager::<Arc<i32>>::new();
        man.update_expectations(&[a.clone(), b.clone()]);
        assert_eq!(man.num_expected(), 2);
        assert_eq!(man.check(0), Err(Mismatch::Missing));

        man.assign(0, equal_to_a);
        // compared by identity, not value
        assert_eq!(man.check(0), Err(Mismatch::Incompatible));
        man.assign(0, a.clone());
        assert_eq!(man.check(0), Ok(()));

        man.assign(1, c.clone());
        assert_eq!(man.check(1), Err(Mismatch::Incompatible));
        man.update_expectations(&[a, c]);
        assert_eq!(man.check(1), Ok(()));

        // slots outside the expectations are never checked
        man.update_expectations(&[]);
        assert_eq!(man.num_expected(), 0);
        assert_eq!(man.check(1), Ok(()));
    }
}

/// Error encountered when validating the bind groups used by a draw or a
/// dispatch.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum BinderError {
    #[error("{pipeline} expects a bind group at index {index}, but none was set")]
    MissingBindGroup {
        index: u32,
        pipeline: ResourceErrorIdent,
    },
    #[error("{bind_group} at index {index} is incompatible with the bind group layout {pipeline} expects there")]
    IncompatibleBindGroup {
        index: u32,
        pipeline: ResourceErrorIdent,
        bind_group: ResourceErrorIdent,
    },
    #[error(transparent)]
    Bind(#[from] BindError),
}

#[derive(Debug, Default)]
pub(super) struct EntryPayload {
    pub(super) group: Option<Arc<BindGroup>>,
    pub(super) dynamic_offsets: Vec<bst::DynamicOffset>,
}

/// Mirror of the binding state of a pass, used to validate it when the
/// encoder is finished.
#[derive(Debug)]
pub(super) struct Binder {
    manager: compat::Manager<Arc<BindGroupLayout>>,
    payloads: [EntryPayload; bst::MAX_BIND_GROUPS],
}

impl Binder {
    pub(super) fn new() -> Self {
        Binder {
            manager: compat::Manager::new(),
            payloads: Default::default(),
        }
    }

    pub(super) fn change_pipeline_layout(&mut self, new: &Arc<PipelineLayout>) {
        self.manager.update_expectations(&new.bind_group_layouts);
    }

    pub(super) fn assign_group(
        &mut self,
        index: usize,
        bind_group: &Arc<BindGroup>,
        offsets: &[bst::DynamicOffset],
    ) {
        log::trace!("\tBinding [{}] = {}", index, bind_group.error_ident());

        let payload = &mut self.payloads[index];
        payload.group = Some(bind_group.clone());
        payload.dynamic_offsets.clear();
        payload.dynamic_offsets.extend_from_slice(offsets);

        self.manager.assign(index, bind_group.layout.clone());
    }

    /// Checks the bind groups the current pipeline layout uses, slot by slot.
    ///
    /// A missing group is always an error. With `skip_validation`, layout
    /// compatibility and dynamic offsets are not checked.
    pub(super) fn check_bindings<P: Labeled>(
        &self,
        pipeline: &P,
        limits: &bst::Limits,
        skip_validation: bool,
    ) -> Result<(), BinderError> {
        for index in 0..self.manager.num_expected() {
            let payload = &self.payloads[index];
            let group = match payload.group {
                Some(ref group) => group,
                None => {
                    return Err(BinderError::MissingBindGroup {
                        index: index as u32,
                        pipeline: pipeline.error_ident(),
                    })
                }
            };
            if skip_validation {
                continue;
            }

            if self.manager.check(index) == Err(compat::Mismatch::Incompatible) {
                return Err(BinderError::IncompatibleBindGroup {
                    index: index as u32,
                    pipeline: pipeline.error_ident(),
                    bind_group: group.error_ident(),
                });
            }
            group.validate_dynamic_bindings(index as u32, &payload.dynamic_offsets, limits)?;
        }
        Ok(())
    }
}
