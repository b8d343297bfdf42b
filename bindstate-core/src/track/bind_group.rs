use std::{marker::PhantomData, sync::Arc};

use smallvec::SmallVec;

use crate::{
    binding_model::{BindGroup, PipelineLayout},
    hal,
    resource::Handle,
    track::{iterate_mask, BindGroupMask, DynamicOffsetWidth, InheritancePolicy},
};

/// Tracks the bind groups set during a pass and computes which slots must be
/// re-bound on the backend before the next draw or dispatch.
///
/// `G` is the bind group handle, compared by identity. `P` decides whether
/// bind groups are inherited across pipeline changes and `O` is the native
/// dynamic offset width.
#[derive(Debug)]
pub struct BindGroupTracker<G, P, O> {
    bind_group_layouts_mask: BindGroupMask,
    bind_groups: [Option<G>; bst::MAX_BIND_GROUPS],
    dynamic_offsets: [SmallVec<[O; 4]>; bst::MAX_BIND_GROUPS],
    dirty_bind_groups: BindGroupMask,
    dirty_bind_groups_object_changed_or_is_dynamic: BindGroupMask,
    /// Changes to slots outside `bind_group_layouts_mask`, held back until a
    /// layout uses the slot again.
    dirty_outside_layout: BindGroupMask,
    dirty_outside_layout_object_changed_or_is_dynamic: BindGroupMask,

    /// The pipeline layout of the last `on_set_pipeline` call.
    pipeline_layout: Option<Arc<PipelineLayout>>,
    /// The pipeline layout in effect at the last `did_apply` call.
    last_applied_pipeline_layout: Option<Arc<PipelineLayout>>,

    _policy: PhantomData<P>,
}

impl<G, P, O> Default for BindGroupTracker<G, P, O>
where
    G: Handle,
    P: InheritancePolicy,
    O: DynamicOffsetWidth,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<G, P, O> BindGroupTracker<G, P, O>
where
    G: Handle,
    P: InheritancePolicy,
    O: DynamicOffsetWidth,
{
    pub fn new() -> Self {
        Self {
            bind_group_layouts_mask: 0,
            bind_groups: Default::default(),
            dynamic_offsets: Default::default(),
            dirty_bind_groups: 0,
            dirty_bind_groups_object_changed_or_is_dynamic: 0,
            dirty_outside_layout: 0,
            dirty_outside_layout_object_changed_or_is_dynamic: 0,
            pipeline_layout: None,
            last_applied_pipeline_layout: None,
            _policy: PhantomData,
        }
    }

    pub fn on_set_bind_group(
        &mut self,
        index: u32,
        bind_group: G,
        dynamic_offsets: &[bst::DynamicOffset],
    ) {
        let slot = index as usize;
        assert!(
            slot < bst::MAX_BIND_GROUPS,
            "bind group index {index} out of range"
        );
        let bit = 1 << slot;

        let changed = match self.bind_groups[slot] {
            Some(ref current) => !current.is_same(&bind_group),
            None => true,
        };
        let (dirty, dirty_object_changed_or_is_dynamic) =
            if self.bind_group_layouts_mask & bit != 0 {
                (
                    &mut self.dirty_bind_groups,
                    &mut self.dirty_bind_groups_object_changed_or_is_dynamic,
                )
            } else {
                (
                    &mut self.dirty_outside_layout,
                    &mut self.dirty_outside_layout_object_changed_or_is_dynamic,
                )
            };
        if changed {
            // Both the bind group and its layout need to be re-applied.
            *dirty |= bit;
            *dirty_object_changed_or_is_dynamic |= bit;
        }
        if !dynamic_offsets.is_empty() {
            // The group object is unchanged, but its offsets may not be.
            *dirty_object_changed_or_is_dynamic |= bit;
        }

        log::trace!(
            "Set bind group {index} with {} dynamic offsets, dirty = {:#06b}",
            dynamic_offsets.len(),
            self.dirty_bind_groups_object_changed_or_is_dynamic
        );

        self.bind_groups[slot] = Some(bind_group);
        let offsets = &mut self.dynamic_offsets[slot];
        offsets.clear();
        offsets.resize(dynamic_offsets.len(), O::default());
        O::copy_offsets(offsets, dynamic_offsets);
    }

    pub fn on_set_pipeline(&mut self, pipeline_layout: &Arc<PipelineLayout>) {
        self.pipeline_layout = Some(pipeline_layout.clone());
        self.set_bind_group_layouts_mask(pipeline_layout.bind_group_layouts_mask());

        if let Some(ref last_applied) = self.last_applied_pipeline_layout {
            if Arc::ptr_eq(last_applied, pipeline_layout) {
                return;
            }
        }

        match self.last_applied_pipeline_layout {
            Some(ref last_applied) if P::CAN_INHERIT_BIND_GROUPS => {
                // Slots after the compatible prefix must be re-bound, even if
                // the group object did not change. Slots outside the new
                // layout are never dirty.
                let dirtied = !pipeline_layout.inherited_groups_mask(last_applied)
                    & self.bind_group_layouts_mask;
                self.dirty_bind_groups |= dirtied;
                self.dirty_bind_groups_object_changed_or_is_dynamic |= dirtied;
            }
            _ => {
                self.dirty_bind_groups = self.bind_group_layouts_mask;
                self.dirty_bind_groups_object_changed_or_is_dynamic =
                    self.bind_group_layouts_mask;
            }
        }

        log::trace!(
            "Set pipeline layout, mask = {:#06b}, dirty = {:#06b}",
            self.bind_group_layouts_mask,
            self.dirty_bind_groups_object_changed_or_is_dynamic
        );
    }

    /// Moves dirty bits of slots the new mask does not use aside, and brings
    /// back the held ones it uses again.
    fn set_bind_group_layouts_mask(&mut self, mask: BindGroupMask) {
        self.dirty_outside_layout |= self.dirty_bind_groups & !mask;
        self.dirty_outside_layout_object_changed_or_is_dynamic |=
            self.dirty_bind_groups_object_changed_or_is_dynamic & !mask;

        self.dirty_bind_groups =
            (self.dirty_bind_groups | self.dirty_outside_layout) & mask;
        self.dirty_bind_groups_object_changed_or_is_dynamic =
            (self.dirty_bind_groups_object_changed_or_is_dynamic
                | self.dirty_outside_layout_object_changed_or_is_dynamic)
                & mask;

        self.dirty_outside_layout &= !mask;
        self.dirty_outside_layout_object_changed_or_is_dynamic &= !mask;
        self.bind_group_layouts_mask = mask;
    }

    /// Marks the current state as applied to the backend.
    pub fn did_apply(&mut self) {
        bst::strict_assert_eq!(
            self.dirty_bind_groups & !self.dirty_bind_groups_object_changed_or_is_dynamic,
            0
        );
        bst::strict_assert_eq!(
            self.dirty_bind_groups_object_changed_or_is_dynamic & !self.bind_group_layouts_mask,
            0
        );
        self.dirty_bind_groups = 0;
        self.dirty_bind_groups_object_changed_or_is_dynamic = 0;
        self.last_applied_pipeline_layout = self.pipeline_layout.clone();
    }

    pub fn bind_group_layouts_mask(&self) -> BindGroupMask {
        self.bind_group_layouts_mask
    }

    /// Slots whose pipeline layout binding changed since the last apply.
    pub fn dirty_bind_groups(&self) -> BindGroupMask {
        self.dirty_bind_groups
    }

    /// Slots that must be re-bound before the next draw or dispatch.
    pub fn dirty_bind_groups_object_changed_or_is_dynamic(&self) -> BindGroupMask {
        self.dirty_bind_groups_object_changed_or_is_dynamic
    }

    pub fn pipeline_layout(&self) -> Option<&Arc<PipelineLayout>> {
        self.pipeline_layout.as_ref()
    }

    pub fn bind_group(&self, index: u32) -> Option<&G> {
        self.bind_groups.get(index as usize)?.as_ref()
    }

    /// The dynamic offsets of slot `index` in native width.
    pub fn dynamic_offsets(&self, index: u32) -> &[O] {
        match self.dynamic_offsets.get(index as usize) {
            Some(offsets) => offsets,
            None => &[],
        }
    }

    /// The slots that must be re-bound, with their group and native offsets.
    ///
    /// Dirty slots without a bind group are skipped. Draw validation rejects
    /// them before replay.
    pub fn dirty_entries(&self) -> impl Iterator<Item = (u32, &G, &[O])> + '_ {
        iterate_mask(self.dirty_bind_groups_object_changed_or_is_dynamic).filter_map(
            move |slot| {
                let group = self.bind_groups[slot].as_ref()?;
                Some((slot as u32, group, self.dynamic_offsets[slot].as_slice()))
            },
        )
    }
}

impl<P, O> BindGroupTracker<Arc<BindGroup>, P, O>
where
    P: InheritancePolicy,
    O: DynamicOffsetWidth,
{
    /// Issues a native bind call for every dirty slot, then marks the state as
    /// applied.
    pub fn apply<A>(&mut self, encoder: &mut A::CommandEncoder)
    where
        A: hal::Api<Inheritance = P, DynamicOffset = O>,
    {
        use hal::CommandEncoder as _;

        if let Some(ref layout) = self.pipeline_layout {
            for (index, group, offsets) in self.dirty_entries() {
                log::trace!("Apply bind group {index}");
                encoder.set_bind_group(layout, index, group, offsets);
            }
        }
        self.did_apply();
    }
}
