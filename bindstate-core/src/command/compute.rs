use crate::{
    binding_model::BindGroup,
    command::{
        bind::{Binder, BinderError},
        take_offsets, BasePass, CommandEncoder, MapPassErr, PassErrorScope, RecordedPass,
    },
    device::{Device, DeviceMismatch},
    error::ErrorClass,
    hal::{self, CommandEncoder as _},
    pipeline::ComputePipeline,
    resource::{Fallible, InvalidResourceError, Labeled, ParentDevice},
    track::BindGroupTracker,
    Label,
};

use thiserror::Error;

use std::{mem, sync::Arc};

/// A compute command as recorded, before validation.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub enum ComputeCommand {
    SetBindGroup {
        index: u32,
        num_dynamic_offsets: usize,
        bind_group: Fallible<BindGroup>,
    },
    SetPipeline(Fallible<ComputePipeline>),
    Dispatch([u32; 3]),
}

/// A validated compute command.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub enum ArcComputeCommand {
    SetBindGroup {
        index: u32,
        num_dynamic_offsets: usize,
        bind_group: Arc<BindGroup>,
    },
    SetPipeline(Arc<ComputePipeline>),
    Dispatch([u32; 3]),
}

#[derive(Clone, Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    pub label: Label<'a>,
}

/// Error validating a dispatch.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Compute pipeline must be set")]
    MissingPipeline,
    #[error(transparent)]
    Binder(#[from] BinderError),
}

/// Error encountered when performing a compute pass.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ComputePassErrorInner {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error("Bind group index {index} is greater than the device's requested `max_bind_group` limit {max}")]
    BindGroupIndexOutOfRange { index: u32, max: u32 },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Error encountered when performing a compute pass, with the command it
/// happened in.
#[derive(Clone, Debug, Error)]
#[error("{scope}")]
pub struct ComputePassError {
    pub scope: PassErrorScope,
    #[source]
    pub inner: ComputePassErrorInner,
}

impl ErrorClass for ComputePassError {}

impl<T, E> MapPassErr<T, ComputePassError> for Result<T, E>
where
    E: Into<ComputePassErrorInner>,
{
    fn map_pass_err(self, scope: PassErrorScope) -> Result<T, ComputePassError> {
        self.map_err(|inner| ComputePassError {
            scope,
            inner: inner.into(),
        })
    }
}

/// A compute pass being recorded.
///
/// Nothing is validated until the encoder is finished. The pass must be
/// ended with [`ComputePass::end`]; dropping it otherwise invalidates the
/// encoder.
#[derive(Debug)]
pub struct ComputePass<'a> {
    encoder: &'a mut CommandEncoder,
    base: BasePass<ComputeCommand>,
    ended: bool,
}

impl<'a> ComputePass<'a> {
    pub(super) fn new(encoder: &'a mut CommandEncoder, desc: &ComputePassDescriptor) -> Self {
        Self {
            encoder,
            base: BasePass::new(&desc.label),
            ended: false,
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Fallible<ComputePipeline>) {
        self.base
            .commands
            .push(ComputeCommand::SetPipeline(pipeline.clone()));
    }

    pub fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: &Fallible<BindGroup>,
        offsets: &[bst::DynamicOffset],
    ) {
        self.base.dynamic_offsets.extend_from_slice(offsets);
        self.base.commands.push(ComputeCommand::SetBindGroup {
            index,
            num_dynamic_offsets: offsets.len(),
            bind_group: bind_group.clone(),
        });
    }

    pub fn dispatch_workgroups(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.base
            .commands
            .push(ComputeCommand::Dispatch([groups_x, groups_y, groups_z]));
    }

    pub fn end(mut self) {
        let base = mem::take(&mut self.base);
        self.ended = true;
        self.encoder.passes.push(RecordedPass::Compute(base));
    }
}

impl Drop for ComputePass<'_> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!(
                "Compute pass {:?} dropped without end(), {} is now invalid",
                self.base.label,
                self.encoder.error_ident()
            );
            self.encoder.invalidate();
        }
    }
}

pub(super) fn validate_pass(
    device: &Arc<Device>,
    base: BasePass<ComputeCommand>,
    used_bind_groups: &mut Vec<Arc<BindGroup>>,
) -> Result<BasePass<ArcComputeCommand>, ComputePassError> {
    profiling::scope!("CommandEncoder::validate_compute_pass");
    log::trace!("Validating compute pass {:?}", base.label);

    let BasePass {
        label,
        commands: recorded,
        dynamic_offsets,
    } = base;
    let skip_validation = device.skip_validation();

    let mut binder = Binder::new();
    let mut pipeline: Option<Arc<ComputePipeline>> = None;
    let mut commands = Vec::with_capacity(recorded.len());
    let mut dynamic_offset_cursor = 0;

    for command in recorded {
        match command {
            ComputeCommand::SetBindGroup {
                index,
                num_dynamic_offsets,
                bind_group,
            } => {
                let scope = PassErrorScope::SetBindGroup;
                let offsets = take_offsets(
                    &dynamic_offsets,
                    &mut dynamic_offset_cursor,
                    num_dynamic_offsets,
                );

                let max = device.limits.max_bind_groups;
                if index >= max {
                    return Err(ComputePassErrorInner::BindGroupIndexOutOfRange { index, max })
                        .map_pass_err(scope);
                }

                let bind_group = bind_group.get().map_pass_err(scope)?;
                bind_group.same_device(device).map_pass_err(scope)?;

                binder.assign_group(index as usize, &bind_group, offsets);
                used_bind_groups.push(bind_group.clone());
                commands.push(ArcComputeCommand::SetBindGroup {
                    index,
                    num_dynamic_offsets,
                    bind_group,
                });
            }
            ComputeCommand::SetPipeline(new_pipeline) => {
                let scope = PassErrorScope::SetPipelineCompute;
                let new_pipeline = new_pipeline.get().map_pass_err(scope)?;
                new_pipeline.same_device(device).map_pass_err(scope)?;

                binder.change_pipeline_layout(&new_pipeline.layout);
                pipeline = Some(new_pipeline.clone());
                commands.push(ArcComputeCommand::SetPipeline(new_pipeline));
            }
            ComputeCommand::Dispatch(groups) => {
                let scope = PassErrorScope::Dispatch;
                let pipeline = pipeline
                    .as_ref()
                    .ok_or(DispatchError::MissingPipeline)
                    .map_pass_err(scope)?;
                binder
                    .check_bindings(&**pipeline, &device.limits, skip_validation)
                    .map_err(DispatchError::from)
                    .map_pass_err(scope)?;

                commands.push(ArcComputeCommand::Dispatch(groups));
            }
        }
    }

    Ok(BasePass {
        label,
        commands,
        dynamic_offsets,
    })
}

/// Replays a validated compute pass onto `raw`, binding groups lazily
/// before each dispatch.
pub(super) fn replay<A: hal::Api>(raw: &mut A::CommandEncoder, base: &BasePass<ArcComputeCommand>) {
    let mut tracker = BindGroupTracker::<Arc<BindGroup>, A::Inheritance, A::DynamicOffset>::new();
    let mut dynamic_offset_cursor = 0;

    raw.begin_compute_pass(base.label.as_deref());
    for command in base.commands.iter() {
        match *command {
            ArcComputeCommand::SetBindGroup {
                index,
                num_dynamic_offsets,
                ref bind_group,
            } => {
                let offsets = take_offsets(
                    &base.dynamic_offsets,
                    &mut dynamic_offset_cursor,
                    num_dynamic_offsets,
                );
                tracker.on_set_bind_group(index, bind_group.clone(), offsets);
            }
            ArcComputeCommand::SetPipeline(ref pipeline) => {
                raw.set_compute_pipeline(pipeline);
                tracker.on_set_pipeline(&pipeline.layout);
            }
            ArcComputeCommand::Dispatch(groups) => {
                tracker.apply::<A>(raw);
                raw.dispatch(groups);
            }
        }
    }
    raw.end_compute_pass();
}
