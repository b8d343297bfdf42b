mod common;

use std::sync::{Arc, Mutex};

use bindstate_core::{
    command::{CommandBuffer, CommandEncoderDescriptor, ComputePassDescriptor},
    device::{Device, DeviceDescriptor, QueueSubmitError},
    error::ErrorType,
    hal::{capture, empty},
    resource::{Buffer, Fallible},
};

use common::{buffer_entry, initialize_test, TestingContext, UNIFORM};

/// Records a dispatch using a bind group over `buffer`.
fn command_buffer(ctx: &TestingContext, buffer: &Fallible<Buffer>) -> Fallible<CommandBuffer> {
    let layout = ctx.bind_group_layout(&[buffer_entry(0, UNIFORM, false)]);
    let group = ctx.bind_group("group", &layout, buffer, &[(0, 0, None)]);
    let pipeline = ctx.compute_pipeline("pipeline", &ctx.pipeline_layout(&[&layout]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &group, &[]);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();
    encoder.finish()
}

#[test]
fn submission_index_increases() {
    let ctx = initialize_test(bst::Toggles::empty());
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    assert_eq!(ctx.queue.last_submission_index(), 0);

    let mut raw = empty::Encoder;
    let first = ctx
        .queue
        .try_submit::<empty::Api>(&mut raw, &[command_buffer(&ctx, &buffer)])
        .unwrap();
    let second = ctx
        .queue
        .try_submit::<empty::Api>(
            &mut raw,
            &[command_buffer(&ctx, &buffer), command_buffer(&ctx, &buffer)],
        )
        .unwrap();
    let empty = ctx.queue.try_submit::<empty::Api>(&mut raw, &[]).unwrap();

    assert_eq!((first, second, empty), (1, 2, 3));
    assert_eq!(ctx.queue.last_submission_index(), 3);
}

#[test]
fn command_buffers_are_submitted_once() {
    let ctx = initialize_test(bst::Toggles::empty());
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let command_buffer = command_buffer(&ctx, &buffer);

    let mut raw = capture::Encoder::new();
    ctx.queue
        .try_submit::<capture::DescriptorSetApi>(&mut raw, &[command_buffer.clone()])
        .unwrap();
    let replayed = raw.commands.len();

    assert!(matches!(
        ctx.queue
            .try_submit::<capture::DescriptorSetApi>(&mut raw, &[command_buffer]),
        Err(QueueSubmitError::AlreadySubmitted(_))
    ));
    assert_eq!(raw.commands.len(), replayed);
    assert_eq!(ctx.queue.last_submission_index(), 1);
}

#[test]
fn destroyed_buffers_fail_the_submission() {
    let ctx = initialize_test(bst::Toggles::empty());
    let kept = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let destroyed = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let valid = command_buffer(&ctx, &kept);
    let stale = command_buffer(&ctx, &destroyed);
    destroyed.get().unwrap().destroy();

    let mut raw = capture::Encoder::new();
    let result = ctx
        .queue
        .try_submit::<capture::DescriptorSetApi>(&mut raw, &[valid.clone(), stale]);
    assert!(matches!(result, Err(QueueSubmitError::DestroyedBuffer(_))));

    // Nothing was replayed, and both command buffers are spent.
    assert!(raw.commands.is_empty());
    assert!(valid.get().unwrap().is_submitted());
    assert!(matches!(
        ctx.queue
            .try_submit::<capture::DescriptorSetApi>(&mut raw, &[valid]),
        Err(QueueSubmitError::AlreadySubmitted(_))
    ));
}

#[test]
fn unused_bind_groups_are_checked_for_destroyed_buffers() {
    let ctx = initialize_test(bst::Toggles::empty());
    let layout = ctx.bind_group_layout(&[buffer_entry(0, UNIFORM, false)]);
    let kept = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let destroyed = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let used = ctx.bind_group("used", &layout, &kept, &[(0, 0, None)]);
    let unused = ctx.bind_group("unused", &layout, &destroyed, &[(0, 0, None)]);
    let pipeline = ctx.compute_pipeline("pipeline", &ctx.pipeline_layout(&[&layout]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&pipeline);
    pass.set_bind_group(0, &used, &[]);
    // Slot 1 is outside the pipeline layout.
    pass.set_bind_group(1, &unused, &[]);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();
    let command_buffer = encoder.finish();
    assert!(command_buffer.is_valid());
    destroyed.get().unwrap().destroy();

    let mut raw = empty::Encoder;
    assert!(matches!(
        ctx.queue.try_submit::<empty::Api>(&mut raw, &[command_buffer]),
        Err(QueueSubmitError::DestroyedBuffer(_))
    ));
}

#[test]
fn invalid_command_buffers_are_rejected() {
    let ctx = initialize_test(bst::Toggles::empty());
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let valid = command_buffer(&ctx, &buffer);

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor {
            label: Some("unfinished".into()),
        });
    drop(encoder.begin_compute_pass(&ComputePassDescriptor::default()));
    ctx.device.push_error_scope(bst::ErrorFilter::Validation);
    let invalid = encoder.finish();
    assert!(ctx.device.pop_error_scope().unwrap().is_some());

    let mut raw = capture::Encoder::new();
    match ctx
        .queue
        .try_submit::<capture::DescriptorSetApi>(&mut raw, &[invalid, valid.clone()])
    {
        Err(QueueSubmitError::InvalidResource(error)) => {
            assert_eq!(error.0.label(), "unfinished");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(valid.get().unwrap().is_submitted());
}

#[test]
fn command_buffers_from_another_device() {
    let ctx = initialize_test(bst::Toggles::empty());
    let (other_device, _other_queue) = Device::create(&DeviceDescriptor::default()).unwrap();
    let other = TestingContext {
        queue: ctx.queue,
        device: other_device,
    };
    let buffer = other.buffer(256, bst::BufferUsages::UNIFORM);
    let foreign = command_buffer(&other, &buffer);

    let mut raw = empty::Encoder;
    assert!(matches!(
        other.queue.try_submit::<empty::Api>(&mut raw, &[foreign]),
        Err(QueueSubmitError::DeviceMismatch(_))
    ));
}

#[test]
fn failed_submissions_are_reported_to_the_device() {
    let ctx = initialize_test(bst::Toggles::empty());
    let buffer = ctx.buffer(256, bst::BufferUsages::UNIFORM);
    let command_buffer = command_buffer(&ctx, &buffer);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    ctx.device.on_uncaptured_error(Box::new(move |error| {
        sink.lock().unwrap().push(error.error_type());
    }));

    let mut raw = empty::Encoder;
    assert_eq!(
        ctx.queue
            .submit::<empty::Api>(&mut raw, &[command_buffer.clone()]),
        Some(1)
    );
    assert_eq!(
        ctx.queue.submit::<empty::Api>(&mut raw, &[command_buffer]),
        None
    );
    assert_eq!(*errors.lock().unwrap(), [ErrorType::Validation]);
}
