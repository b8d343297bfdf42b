use crate::{
    binding_model::BindGroup,
    command::{
        bind::{Binder, BinderError},
        take_offsets, BasePass, CommandEncoder, MapPassErr, PassErrorScope, RecordedPass,
    },
    device::{Device, DeviceMismatch},
    error::ErrorClass,
    hal::{self, CommandEncoder as _},
    pipeline::RenderPipeline,
    resource::{Fallible, InvalidResourceError, Labeled, ParentDevice},
    track::BindGroupTracker,
    Label,
};

use thiserror::Error;

use std::{mem, ops::Range, sync::Arc};

/// A render command as recorded, before validation.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub enum RenderCommand {
    SetBindGroup {
        index: u32,
        num_dynamic_offsets: usize,
        bind_group: Fallible<BindGroup>,
    },
    SetPipeline(Fallible<RenderPipeline>),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}

/// A validated render command.
#[doc(hidden)]
#[derive(Clone, Debug)]
pub enum ArcRenderCommand {
    SetBindGroup {
        index: u32,
        num_dynamic_offsets: usize,
        bind_group: Arc<BindGroup>,
    },
    SetPipeline(Arc<RenderPipeline>),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Label<'a>,
}

/// Error validating a draw call.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum DrawError {
    #[error("Render pipeline must be set")]
    MissingPipeline,
    #[error(transparent)]
    Binder(#[from] BinderError),
}

/// Error validating a render command argument.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum RenderCommandError {
    #[error("Bind group index {index} is greater than the device's requested `max_bind_group` limit {max}")]
    BindGroupIndexOutOfRange { index: u32, max: u32 },
}

/// Error encountered when performing a render pass.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum RenderPassErrorInner {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error(transparent)]
    RenderCommand(#[from] RenderCommandError),
    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// Error encountered when performing a render pass, with the command it
/// happened in.
#[derive(Clone, Debug, Error)]
#[error("{scope}")]
pub struct RenderPassError {
    pub scope: PassErrorScope,
    #[source]
    pub inner: RenderPassErrorInner,
}

impl ErrorClass for RenderPassError {}

impl<T, E> MapPassErr<T, RenderPassError> for Result<T, E>
where
    E: Into<RenderPassErrorInner>,
{
    fn map_pass_err(self, scope: PassErrorScope) -> Result<T, RenderPassError> {
        self.map_err(|inner| RenderPassError {
            scope,
            inner: inner.into(),
        })
    }
}

/// A render pass being recorded.
///
/// Nothing is validated until the encoder is finished. The pass must be
/// ended with [`RenderPass::end`]; dropping it otherwise invalidates the
/// encoder.
#[derive(Debug)]
pub struct RenderPass<'a> {
    encoder: &'a mut CommandEncoder,
    base: BasePass<RenderCommand>,
    ended: bool,
}

impl<'a> RenderPass<'a> {
    pub(super) fn new(encoder: &'a mut CommandEncoder, desc: &RenderPassDescriptor) -> Self {
        Self {
            encoder,
            base: BasePass::new(&desc.label),
            ended: false,
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Fallible<RenderPipeline>) {
        self.base
            .commands
            .push(RenderCommand::SetPipeline(pipeline.clone()));
    }

    pub fn set_bind_group(
        &mut self,
        index: u32,
        bind_group: &Fallible<BindGroup>,
        offsets: &[bst::DynamicOffset],
    ) {
        self.base.dynamic_offsets.extend_from_slice(offsets);
        self.base.commands.push(RenderCommand::SetBindGroup {
            index,
            num_dynamic_offsets: offsets.len(),
            bind_group: bind_group.clone(),
        });
    }

    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.base.commands.push(RenderCommand::Draw {
            vertex_count: vertices.end.saturating_sub(vertices.start),
            instance_count: instances.end.saturating_sub(instances.start),
            first_vertex: vertices.start,
            first_instance: instances.start,
        });
    }

    pub fn end(mut self) {
        let base = mem::take(&mut self.base);
        self.ended = true;
        self.encoder.passes.push(RecordedPass::Render(base));
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        if !self.ended {
            log::warn!(
                "Render pass {:?} dropped without end(), {} is now invalid",
                self.base.label,
                self.encoder.error_ident()
            );
            self.encoder.invalidate();
        }
    }
}

pub(super) fn validate_pass(
    device: &Arc<Device>,
    base: BasePass<RenderCommand>,
    used_bind_groups: &mut Vec<Arc<BindGroup>>,
) -> Result<BasePass<ArcRenderCommand>, RenderPassError> {
    profiling::scope!("CommandEncoder::validate_render_pass");
    log::trace!("Validating render pass {:?}", base.label);

    let BasePass {
        label,
        commands: recorded,
        dynamic_offsets,
    } = base;
    let skip_validation = device.skip_validation();

    let mut binder = Binder::new();
    let mut pipeline: Option<Arc<RenderPipeline>> = None;
    let mut commands = Vec::with_capacity(recorded.len());
    let mut dynamic_offset_cursor = 0;

    for command in recorded {
        match command {
            RenderCommand::SetBindGroup {
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
                    return Err(RenderCommandError::BindGroupIndexOutOfRange { index, max })
                        .map_pass_err(scope);
                }

                let bind_group = bind_group.get().map_pass_err(scope)?;
                bind_group.same_device(device).map_pass_err(scope)?;

                binder.assign_group(index as usize, &bind_group, offsets);
                used_bind_groups.push(bind_group.clone());
                commands.push(ArcRenderCommand::SetBindGroup {
                    index,
                    num_dynamic_offsets,
                    bind_group,
                });
            }
            RenderCommand::SetPipeline(new_pipeline) => {
                let scope = PassErrorScope::SetPipelineRender;
                let new_pipeline = new_pipeline.get().map_pass_err(scope)?;
                new_pipeline.same_device(device).map_pass_err(scope)?;

                binder.change_pipeline_layout(&new_pipeline.layout);
                pipeline = Some(new_pipeline.clone());
                commands.push(ArcRenderCommand::SetPipeline(new_pipeline));
            }
            RenderCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                let scope = PassErrorScope::Draw;
                let pipeline = pipeline
                    .as_ref()
                    .ok_or(DrawError::MissingPipeline)
                    .map_pass_err(scope)?;
                binder
                    .check_bindings(&**pipeline, &device.limits, skip_validation)
                    .map_err(DrawError::from)
                    .map_pass_err(scope)?;

                commands.push(ArcRenderCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                });
            }
        }
    }

    Ok(BasePass {
        label,
        commands,
        dynamic_offsets,
    })
}

/// Replays a validated render pass onto `raw`, binding groups lazily before
/// each draw.
pub(super) fn replay<A: hal::Api>(raw: &mut A::CommandEncoder, base: &BasePass<ArcRenderCommand>) {
    let mut tracker = BindGroupTracker::<Arc<BindGroup>, A::Inheritance, A::DynamicOffset>::new();
    let mut dynamic_offset_cursor = 0;

    raw.begin_render_pass(base.label.as_deref());
    for command in base.commands.iter() {
        match *command {
            ArcRenderCommand::SetBindGroup {
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
            ArcRenderCommand::SetPipeline(ref pipeline) => {
                raw.set_render_pipeline(pipeline);
                tracker.on_set_pipeline(&pipeline.layout);
            }
            ArcRenderCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => {
                tracker.apply::<A>(raw);
                raw.draw(first_vertex, vertex_count, first_instance, instance_count);
            }
        }
    }
    raw.end_render_pass();
}
