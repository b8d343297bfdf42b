mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bindstate_core::{
    command::{CommandEncoderDescriptor, CommandEncoderError, ComputePassDescriptor},
    device::PopErrorScopeError,
    error::ErrorType,
};

use common::initialize_test;

#[test]
fn finish_errors_reach_the_innermost_matching_scope() {
    let ctx = initialize_test(bst::Toggles::empty());
    let layout = ctx.bind_group_layout(&[]);
    let pipeline = ctx.compute_pipeline("pipeline", &ctx.pipeline_layout(&[&layout]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor::default());
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor::default());
    pass.set_pipeline(&pipeline);
    pass.dispatch_workgroups(1, 1, 1);
    pass.end();

    ctx.device.push_error_scope(bst::ErrorFilter::Validation);
    ctx.device.push_error_scope(bst::ErrorFilter::OutOfMemory);
    let command_buffer = encoder.finish();
    assert!(!command_buffer.is_valid());

    assert!(ctx.device.pop_error_scope().unwrap().is_none());
    let error = ctx.device.pop_error_scope().unwrap().unwrap();
    assert_eq!(error.error_type(), ErrorType::Validation);
    assert!(matches!(
        error.downcast_ref::<CommandEncoderError>(),
        Some(CommandEncoderError::ComputePass(_))
    ));
    // The description walks the chain of causes.
    let description = error.description();
    assert!(description.contains("In a dispatch command"));
    assert!(description.contains("expects a bind group at index 0"));
}

#[test]
fn only_the_first_error_is_kept() {
    let ctx = initialize_test(bst::Toggles::empty());
    ctx.device.push_error_scope(bst::ErrorFilter::Validation);
    ctx.device.inject_error(ErrorType::Validation, "first");
    ctx.device.inject_error(ErrorType::Validation, "second");

    let error = ctx.device.pop_error_scope().unwrap().unwrap();
    assert_eq!(error.to_string(), "first");
}

#[test]
fn popping_an_empty_stack() {
    let ctx = initialize_test(bst::Toggles::empty());
    assert_eq!(
        ctx.device.pop_error_scope().unwrap_err(),
        PopErrorScopeError::EmptyStack
    );
}

#[test]
fn unmatched_errors_are_uncaptured() {
    let ctx = initialize_test(bst::Toggles::empty());
    let uncaptured = Arc::new(AtomicUsize::new(0));
    let counter = uncaptured.clone();
    ctx.device.on_uncaptured_error(Box::new(move |error| {
        assert_eq!(error.error_type(), ErrorType::OutOfMemory);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    ctx.device.push_error_scope(bst::ErrorFilter::Validation);
    ctx.device.inject_error(ErrorType::OutOfMemory, "allocation failed");
    assert!(ctx.device.pop_error_scope().unwrap().is_none());

    ctx.device.inject_error(ErrorType::OutOfMemory, "again");
    assert_eq!(uncaptured.load(Ordering::SeqCst), 2);
}

#[test]
fn internal_errors_bubble_through_every_scope() {
    let ctx = initialize_test(bst::Toggles::empty());
    let uncaptured = Arc::new(AtomicUsize::new(0));
    let counter = uncaptured.clone();
    ctx.device.on_uncaptured_error(Box::new(move |error| {
        assert_eq!(error.error_type(), ErrorType::Internal);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    ctx.device.push_error_scope(bst::ErrorFilter::OutOfMemory);
    ctx.device.push_error_scope(bst::ErrorFilter::Validation);
    ctx.device.inject_error(ErrorType::Internal, "device lost");

    for _ in 0..2 {
        let error = ctx.device.pop_error_scope().unwrap().unwrap();
        assert_eq!(error.error_type(), ErrorType::Internal);
        assert_eq!(error.to_string(), "device lost");
    }
    assert_eq!(uncaptured.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_may_use_the_device() {
    let ctx = initialize_test(bst::Toggles::empty());
    let device = Arc::downgrade(&ctx.device);
    ctx.device.on_uncaptured_error(Box::new(move |_| {
        // Error scopes can be used from the handler.
        if let Some(device) = device.upgrade() {
            device.push_error_scope(bst::ErrorFilter::Validation);
        }
    }));

    ctx.device.inject_error(ErrorType::Validation, "uncaptured");
    ctx.device.inject_error(ErrorType::Validation, "captured");
    let error = ctx.device.pop_error_scope().unwrap().unwrap();
    assert_eq!(error.to_string(), "captured");
}
