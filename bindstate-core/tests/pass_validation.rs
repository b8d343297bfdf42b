mod common;

use bindstate_core::{
    binding_model::{BindError, BindGroup},
    command::{
        BinderError, CommandEncoderDescriptor, CommandEncoderError, ComputePassDescriptor,
        ComputePassError, ComputePassErrorInner, DispatchError, DrawError, PassErrorScope,
        RenderCommandError, RenderPassDescriptor, RenderPassError, RenderPassErrorInner,
    },
    pipeline::ComputePipeline,
    resource::Fallible,
};

use common::{buffer_entry, initialize_test, TestingContext, STORAGE, UNIFORM};

/// A pipeline whose only bind group has a dynamic uniform binding at 0 and a
/// dynamic storage binding at 1, both 9 bytes long at the start of a 520 byte
/// buffer.
struct DynamicSetup {
    ctx: TestingContext,
    pipeline: Fallible<ComputePipeline>,
    bind_group: Fallible<BindGroup>,
}

fn dynamic_setup(toggles: bst::Toggles) -> DynamicSetup {
    let ctx = initialize_test(toggles);
    let layout = ctx.bind_group_layout(&[
        buffer_entry(0, UNIFORM, true),
        buffer_entry(1, STORAGE, true),
    ]);
    let pipeline_layout = ctx.pipeline_layout(&[&layout]);
    let pipeline = ctx.compute_pipeline("pipeline", &pipeline_layout);
    let buffer = ctx.buffer(520, bst::BufferUsages::UNIFORM | bst::BufferUsages::STORAGE);
    let bind_group = ctx.bind_group(
        "group",
        &layout,
        &buffer,
        &[(0, 0, Some(9)), (1, 0, Some(9))],
    );
    DynamicSetup {
        ctx,
        pipeline,
        bind_group,
    }
}

impl DynamicSetup {
    fn dispatch_with(&self, offsets: &[bst::DynamicOffset]) -> Result<(), CommandEncoderError> {
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&CommandEncoderDescriptor::default());
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, offsets);
        pass.dispatch_workgroups(1, 1, 1);
        pass.end();
        encoder.try_finish().map(|_| ())
    }
}

fn dispatch_bind_error(result: Result<(), CommandEncoderError>) -> BindError {
    match result {
        Err(CommandEncoderError::ComputePass(ComputePassError {
            scope: PassErrorScope::Dispatch,
            inner: ComputePassErrorInner::Dispatch(DispatchError::Binder(BinderError::Bind(error))),
        })) => error,
        other => panic!("expected a dynamic offset error at dispatch, got {other:?}"),
    }
}

#[test]
fn dynamic_offsets_in_bounds() {
    let setup = dynamic_setup(bst::Toggles::empty());
    setup.dispatch_with(&[0, 0]).unwrap();
    setup.dispatch_with(&[256, 0]).unwrap();
    setup.dispatch_with(&[256, 256]).unwrap();
}

#[test]
fn dynamic_offsets_out_of_bounds() {
    let setup = dynamic_setup(bst::Toggles::empty());

    for (offsets, expected_idx) in [([512, 0], 0), ([0, 512], 1), ([1024, 0], 0)] {
        match dispatch_bind_error(setup.dispatch_with(&offsets)) {
            BindError::DynamicBindingOutOfBounds {
                idx,
                group,
                binding,
                buffer_size,
                ..
            } => {
                assert_eq!(idx, expected_idx);
                assert_eq!(group, 0);
                assert_eq!(binding, expected_idx as u32);
                assert_eq!(buffer_size, 520);
            }
            other => panic!("{offsets:?}: unexpected {other:?}"),
        }
    }
}

#[test]
fn dynamic_offsets_overflow() {
    let setup = dynamic_setup(bst::Toggles::empty());
    let huge = u64::MAX - 255;
    assert!(matches!(
        dispatch_bind_error(setup.dispatch_with(&[huge, 0])),
        BindError::DynamicBindingOutOfBounds { offset, .. } if offset == huge
    ));
}

#[test]
fn dynamic_offsets_alignment() {
    let setup = dynamic_setup(bst::Toggles::empty());
    match dispatch_bind_error(setup.dispatch_with(&[1, 2])) {
        BindError::UnalignedDynamicBinding {
            idx,
            offset,
            alignment,
            limit_name,
            ..
        } => {
            assert_eq!((idx, offset, alignment), (0, 1, 256));
            assert_eq!(limit_name, "min_uniform_buffer_offset_alignment");
        }
        other => panic!("unexpected {other:?}"),
    }

    match dispatch_bind_error(setup.dispatch_with(&[0, 128])) {
        BindError::UnalignedDynamicBinding { idx, limit_name, .. } => {
            assert_eq!(idx, 1);
            assert_eq!(limit_name, "min_storage_buffer_offset_alignment");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn dynamic_offset_count() {
    let setup = dynamic_setup(bst::Toggles::empty());
    for offsets in [&[0u64][..], &[][..], &[0, 0, 0][..]] {
        assert!(matches!(
            dispatch_bind_error(setup.dispatch_with(offsets)),
            BindError::MismatchedDynamicOffsetCount { expected: 2, actual, .. }
                if actual == offsets.len()
        ));
    }
}

#[test]
fn skip_validation_ignores_offsets() {
    let setup = dynamic_setup(bst::Toggles::SKIP_VALIDATION);
    setup.dispatch_with(&[512, 0]).unwrap();
    setup.dispatch_with(&[1, 2]).unwrap();
}

#[test]
fn only_slots_of_the_pipeline_are_validated() {
    let setup = dynamic_setup(bst::Toggles::empty());
    let ctx = &setup.ctx;

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&setup.pipeline);
    pass.set_bind_group(0, &setup.bind_group, &[0, 0]);
    // Slot 1 is unused by the pipeline, its wrong offsets are not checked.
    pass.set_bind_group(1, &setup.bind_group, &[1]);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();
    encoder.try_finish().unwrap();
}

#[test]
fn groups_can_be_set_before_the_pipeline() {
    let setup = dynamic_setup(bst::Toggles::empty());
    let ctx = &setup.ctx;

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_bind_group(0, &setup.bind_group, &[256, 0]);
    pass.set_pipeline(&setup.pipeline);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();
    encoder.try_finish().unwrap();
}

#[test]
fn dispatch_needs_a_pipeline() {
    let setup = dynamic_setup(bst::Toggles::empty());
    let mut encoder = setup
        .ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_bind_group(0, &setup.bind_group, &[0, 0]);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();

    assert!(matches!(
        encoder.try_finish(),
        Err(CommandEncoderError::ComputePass(ComputePassError {
            scope: PassErrorScope::Dispatch,
            inner: ComputePassErrorInner::Dispatch(DispatchError::MissingPipeline),
        }))
    ));
}

#[test]
fn missing_bind_group_is_reported_even_without_validation() {
    for toggles in [bst::Toggles::empty(), bst::Toggles::SKIP_VALIDATION] {
        let setup = dynamic_setup(toggles);
        let mut encoder = setup
            .ctx
            .device
            .create_command_encoder(&CommandEncoderDescriptor::default());
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
        pass.set_pipeline(&setup.pipeline);
        pass.dispatch_workgroups(1, 1, 1);
        pass.end();

        match encoder.try_finish() {
            Err(CommandEncoderError::ComputePass(ComputePassError {
                inner:
                    ComputePassErrorInner::Dispatch(DispatchError::Binder(
                        BinderError::MissingBindGroup { index, .. },
                    )),
                ..
            })) => assert_eq!(index, 0),
            other => panic!("{toggles:?}: unexpected {other:?}"),
        }
    }
}

#[test]
fn incompatible_bind_group() {
    let ctx = initialize_test(bst::Toggles::empty());
    let uniform = ctx.bind_group_layout(&[buffer_entry(0, UNIFORM, false)]);
    let storage = ctx.bind_group_layout(&[buffer_entry(0, STORAGE, false)]);
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM | bst::BufferUsages::STORAGE);
    let storage_group = ctx.bind_group("storage group", &storage, &buffer, &[(0, 0, None)]);
    let pipeline = ctx.render_pipeline("uniform pipeline", &ctx.pipeline_layout(&[&uniform]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::default());
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &storage_group, &[]);
    pass.draw(0..3, 0..1);
    pass.end();

    match encoder.try_finish() {
        Err(CommandEncoderError::RenderPass(RenderPassError {
            scope: PassErrorScope::Draw,
            inner:
                RenderPassErrorInner::Draw(DrawError::Binder(BinderError::IncompatibleBindGroup {
                    index,
                    pipeline,
                    bind_group,
                })),
        })) => {
            assert_eq!(index, 0);
            assert_eq!(pipeline.label(), "uniform pipeline");
            assert_eq!(bind_group.label(), "storage group");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn equivalent_layouts_make_groups_compatible() {
    let ctx = initialize_test(bst::Toggles::empty());
    // Created separately, deduplicated by the device.
    let group_layout = ctx.bind_group_layout(&[buffer_entry(0, UNIFORM, false)]);
    let pipeline_group_layout = ctx.bind_group_layout(&[buffer_entry(0, UNIFORM, false)]);
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let group = ctx.bind_group("group", &group_layout, &buffer, &[(0, 0, None)]);
    let pipeline = ctx.render_pipeline("pipeline", &ctx.pipeline_layout(&[&pipeline_group_layout]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::default());
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &group, &[]);
    pass.draw(0..3, 0..1);
    pass.end();
    encoder.try_finish().unwrap();
}

#[test]
fn bind_group_index_out_of_range() {
    let ctx = initialize_test(bst::Toggles::empty());
    let layout = ctx.bind_group_layout(&[]);
    let group = ctx.empty_bind_group("empty", &layout);
    let max = ctx.device.limits().max_bind_groups;

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_render_pass(&RenderPassDescriptor::default());
    pass.set_bind_group(max, &group, &[]);
    pass.end();

    assert!(matches!(
        encoder.try_finish(),
        Err(CommandEncoderError::RenderPass(RenderPassError {
            scope: PassErrorScope::SetBindGroup,
            inner: RenderPassErrorInner::RenderCommand(
                RenderCommandError::BindGroupIndexOutOfRange { index, max: limit }
            ),
        })) if index == max && limit == max
    ));
}

#[test]
fn invalid_bind_group_is_rejected_when_set() {
    let ctx = initialize_test(bst::Toggles::SKIP_VALIDATION);
    let invalid = Fallible::<BindGroup>::Invalid(std::sync::Arc::new("broken".to_string()));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_bind_group(0, &invalid, &[]);
    pass.end();

    match encoder.try_finish() {
        Err(CommandEncoderError::ComputePass(ComputePassError {
            scope: PassErrorScope::SetBindGroup,
            inner: ComputePassErrorInner::InvalidResource(error),
        })) => assert_eq!(error.0.label(), "broken"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn pass_dropped_without_end() {
    let ctx = initialize_test(bst::Toggles::empty());
    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
        pass.dispatch_workgroups(1, 1, 1);
    }

    assert!(matches!(
        encoder.try_finish(),
        Err(CommandEncoderError::PassNotEnded)
    ));
}

#[test]
fn passes_are_validated_independently() {
    let setup = dynamic_setup(bst::Toggles::empty());
    let mut encoder = setup
        .ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());

    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&setup.pipeline);
    pass.set_bind_group(0, &setup.bind_group, &[0, 0]);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();

    // Nothing carries over from the previous pass.
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&setup.pipeline);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();

    assert!(matches!(
        encoder.try_finish(),
        Err(CommandEncoderError::ComputePass(ComputePassError {
            inner: ComputePassErrorInner::Dispatch(DispatchError::Binder(
                BinderError::MissingBindGroup { index: 0, .. }
            )),
            ..
        }))
    ));
}
