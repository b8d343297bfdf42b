/*! Binding State Tracking

Command buffers are validated when they are finished and replayed onto a
backend when they are submitted. During replay, a [`BindGroupTracker`] sits
between the recorded commands and the backend encoder and decides, at every
draw or dispatch, which bind group slots need a native bind call.

## Dirty Sets

The tracker keeps two bit masks with one bit per bind group slot:

- `dirty_bind_groups`: slots whose native binding must be reissued because
  the pipeline layout at that slot changed.
- `dirty_bind_groups_object_changed_or_is_dynamic`: a superset of the above,
  also containing slots whose bind group object changed or that carry dynamic
  offsets. Dynamic offsets are part of the native bind call, so a slot with
  dynamic offsets is re-dirtied on every `set_bind_group`, even if the group
  itself is the same.

Both masks are always restricted to the slots used by the current pipeline
layout. Bind groups set in unused slots are remembered, and become dirty once
a pipeline layout using the slot is set. The same goes for dirty slots a
narrower layout drops before they were applied.

## Inheritance

Some backends keep bound descriptor sets alive across a pipeline change if
the new pipeline layout shares a prefix of bind group layouts with the old
one ([`PipelineLayout::inherited_groups_mask`]). The tracker is generic over
an [`InheritancePolicy`]: with [`Inherit`], only the slots after the common
prefix are re-dirtied on a pipeline change; with [`NoInherit`], every used
slot is.

## Offset Width

The API carries dynamic offsets as 64-bit values. Backends store them in
their native width, selected at compile time through [`DynamicOffsetWidth`].

[`PipelineLayout::inherited_groups_mask`]: crate::binding_model::PipelineLayout::inherited_groups_mask
!*/

mod bind_group;

pub use bind_group::BindGroupTracker;

use std::fmt;

/// A set of bind group slots, one bit per slot.
pub type BindGroupMask = u8;

const _: () = assert!(bst::MAX_BIND_GROUPS <= BindGroupMask::BITS as usize);

/// Iterates the slot indices set in `mask`, in increasing order.
pub(crate) fn iterate_mask(mask: BindGroupMask) -> impl Iterator<Item = usize> {
    (0..bst::MAX_BIND_GROUPS).filter(move |&index| mask & (1 << index) != 0)
}

/// Whether a backend keeps compatible bind groups bound across a pipeline
/// change.
pub trait InheritancePolicy: fmt::Debug + 'static {
    const CAN_INHERIT_BIND_GROUPS: bool;
}

/// Bind groups in a compatible prefix stay bound across pipeline changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inherit;

impl InheritancePolicy for Inherit {
    const CAN_INHERIT_BIND_GROUPS: bool = true;
}

/// Every pipeline change invalidates all bound groups.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInherit;

impl InheritancePolicy for NoInherit {
    const CAN_INHERIT_BIND_GROUPS: bool = false;
}

/// The native width of dynamic offsets of a backend.
pub trait DynamicOffsetWidth: Copy + Default + fmt::Debug + Into<u64> + 'static {
    /// Copies API offsets into native storage. `dst` and `src` have the same
    /// length.
    fn copy_offsets(dst: &mut [Self], src: &[bst::DynamicOffset]);
}

impl DynamicOffsetWidth for u32 {
    fn copy_offsets(dst: &mut [Self], src: &[bst::DynamicOffset]) {
        for (native, &offset) in dst.iter_mut().zip(src) {
            // Offsets were validated against buffer sizes, which a 32-bit
            // backend never exceeds.
            assert!(
                offset <= u32::MAX as u64,
                "dynamic offset {offset} is not representable on this backend"
            );
            *native = offset as u32;
        }
    }
}

impl DynamicOffsetWidth for u64 {
    fn copy_offsets(dst: &mut [Self], src: &[bst::DynamicOffset]) {
        dst.copy_from_slice(src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_iteration() {
        assert_eq!(iterate_mask(0).count(), 0);
        assert_eq!(iterate_mask(0b1010).collect::<Vec<_>>(), [1, 3]);
        assert_eq!(iterate_mask(0xff).count(), bst::MAX_BIND_GROUPS);
    }

    #[test]
    fn narrow_offsets() {
        let mut native = [0u32; 2];
        u32::copy_offsets(&mut native, &[256, u32::MAX as u64]);
        assert_eq!(native, [256, u32::MAX]);

        let mut wide = [0u64; 2];
        u64::copy_offsets(&mut wide, &[512, u64::MAX]);
        assert_eq!(wide, [512, u64::MAX]);
    }

    #[test]
    #[should_panic(expected = "not representable")]
    fn narrow_offset_overflow() {
        let mut native = [0u32; 1];
        u32::copy_offsets(&mut native, &[u32::MAX as u64 + 1]);
    }
}
