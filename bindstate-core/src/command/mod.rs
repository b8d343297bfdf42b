//! Command recording.
//!
//! A [`CommandEncoder`] records compute and render passes without validating
//! them. [`CommandEncoder::finish`] validates every pass in order and produces
//! a [`CommandBuffer`] holding the resolved commands, which the queue replays
//! onto a backend.

mod bind;
mod compute;
mod render;

pub use self::bind::BinderError;
pub use self::compute::{
    ArcComputeCommand, ComputeCommand, ComputePass, ComputePassDescriptor, ComputePassError,
    ComputePassErrorInner, DispatchError,
};
pub use self::render::{
    ArcRenderCommand, DrawError, RenderCommand, RenderCommandError, RenderPass,
    RenderPassDescriptor, RenderPassError, RenderPassErrorInner,
};

use crate::{
    binding_model::BindGroup,
    device::Device,
    error::ErrorClass,
    hal,
    resource::{Buffer, Fallible, Labeled},
    resource_log, Label, LabelHelpers,
};

use thiserror::Error;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Clone, Debug, Default)]
pub struct CommandEncoderDescriptor<'a> {
    pub label: Label<'a>,
}

/// A stream of commands for a render pass or compute pass.
///
/// This also contains side tables referred to by certain commands,
/// like dynamic offsets for [`SetBindGroup`].
///
/// [`SetBindGroup`]: ComputeCommand::SetBindGroup
#[doc(hidden)]
#[derive(Debug)]
pub struct BasePass<C> {
    pub label: Option<String>,

    /// The stream of commands.
    pub commands: Vec<C>,

    /// Dynamic offsets consumed by [`SetBindGroup`] commands in `commands`.
    ///
    /// Each successive `SetBindGroup` consumes the next
    /// [`num_dynamic_offsets`] values from this list.
    ///
    /// [`SetBindGroup`]: ComputeCommand::SetBindGroup
    /// [`num_dynamic_offsets`]: ComputeCommand::SetBindGroup::num_dynamic_offsets
    pub dynamic_offsets: Vec<bst::DynamicOffset>,
}

impl<C> BasePass<C> {
    fn new(label: &Label) -> Self {
        Self {
            label: label.borrow_option().map(str::to_owned),
            commands: Vec::new(),
            dynamic_offsets: Vec::new(),
        }
    }
}

/// Returns the `count` offsets of a side table starting at `*cursor`, and
/// advances the cursor past them.
fn take_offsets<'a>(
    dynamic_offsets: &'a [bst::DynamicOffset],
    cursor: &mut usize,
    count: usize,
) -> &'a [bst::DynamicOffset] {
    let start = *cursor;
    *cursor += count;
    &dynamic_offsets[start..*cursor]
}

impl<C> Default for BasePass<C> {
    fn default() -> Self {
        Self::new(&None)
    }
}

#[derive(Debug)]
pub(crate) enum RecordedPass<C, R> {
    Compute(BasePass<C>),
    Render(BasePass<R>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommandEncoderStatus {
    /// Ready to record commands.
    Recording,
    /// A pass was dropped without being ended. Finishing fails.
    Error,
}

/// Records passes into a [`CommandBuffer`].
#[derive(Debug)]
pub struct CommandEncoder {
    pub(crate) device: Arc<Device>,
    pub(crate) label: String,
    status: CommandEncoderStatus,
    passes: Vec<RecordedPass<ComputeCommand, RenderCommand>>,
}

crate::impl_resource_type!(CommandEncoder);
crate::impl_labeled!(CommandEncoder);

impl CommandEncoder {
    pub(crate) fn new(device: &Arc<Device>, label: &Label) -> Self {
        Self {
            device: device.clone(),
            label: label.borrow_or_default().to_string(),
            status: CommandEncoderStatus::Recording,
            passes: Vec::new(),
        }
    }

    pub fn begin_compute_pass(&mut self, desc: &ComputePassDescriptor) -> ComputePass<'_> {
        ComputePass::new(self, desc)
    }

    pub fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> RenderPass<'_> {
        RenderPass::new(self, desc)
    }

    fn invalidate(&mut self) {
        self.status = CommandEncoderStatus::Error;
    }

    /// Validates the recorded passes and resolves them into a command
    /// buffer.
    pub fn try_finish(self) -> Result<Arc<CommandBuffer>, CommandEncoderError> {
        profiling::scope!("CommandEncoder::finish");

        if self.status == CommandEncoderStatus::Error {
            return Err(CommandEncoderError::PassNotEnded);
        }

        let Self {
            device,
            label,
            passes,
            ..
        } = self;

        let mut resolved = Vec::with_capacity(passes.len());
        let mut used_bind_groups = Vec::new();
        for pass in passes {
            resolved.push(match pass {
                RecordedPass::Compute(base) => RecordedPass::Compute(compute::validate_pass(
                    &device,
                    base,
                    &mut used_bind_groups,
                )?),
                RecordedPass::Render(base) => RecordedPass::Render(render::validate_pass(
                    &device,
                    base,
                    &mut used_bind_groups,
                )?),
            });
        }

        let command_buffer = Arc::new(CommandBuffer {
            device,
            label,
            passes: resolved,
            used_bind_groups,
            submitted: AtomicBool::new(false),
        });
        resource_log!("Created {}", command_buffer.error_ident());
        Ok(command_buffer)
    }

    /// Like [`CommandEncoder::try_finish`], but reports the error to the
    /// device and returns an invalid handle.
    pub fn finish(self) -> Fallible<CommandBuffer> {
        let device = self.device.clone();
        let label = self.label.clone();
        match self.try_finish() {
            Ok(command_buffer) => Fallible::Valid(command_buffer),
            Err(error) => {
                device.handle_error(error);
                Fallible::Invalid(Arc::new(label))
            }
        }
    }
}

/// Validated commands, ready to be submitted once.
#[derive(Debug)]
pub struct CommandBuffer {
    pub(crate) device: Arc<Device>,
    pub(crate) label: String,
    passes: Vec<RecordedPass<ArcComputeCommand, ArcRenderCommand>>,
    used_bind_groups: Vec<Arc<BindGroup>>,
    submitted: AtomicBool,
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

crate::impl_resource_type!(CommandBuffer);
crate::impl_labeled!(CommandBuffer);
crate::impl_parent_device!(CommandBuffer);

impl CommandBuffer {
    /// Buffers referenced by the bind groups set in this command buffer.
    pub fn used_buffers(&self) -> impl Iterator<Item = &Arc<Buffer>> + '_ {
        self.used_bind_groups
            .iter()
            .flat_map(|group| group.buffers().iter())
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    /// Marks the command buffer as submitted, returning whether it already
    /// was.
    pub(crate) fn take_for_submit(&self) -> bool {
        self.submitted.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn replay<A: hal::Api>(&self, raw: &mut A::CommandEncoder) {
        profiling::scope!("CommandBuffer::replay");
        for pass in self.passes.iter() {
            match *pass {
                RecordedPass::Compute(ref base) => compute::replay::<A>(raw, base),
                RecordedPass::Render(ref base) => render::replay::<A>(raw, base),
            }
        }
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CommandEncoderError {
    #[error("A pass was dropped without being ended")]
    PassNotEnded,
    #[error(transparent)]
    ComputePass(#[from] ComputePassError),
    #[error(transparent)]
    RenderPass(#[from] RenderPassError),
}

impl ErrorClass for CommandEncoderError {}

pub(crate) trait MapPassErr<T, O> {
    fn map_pass_err(self, scope: PassErrorScope) -> Result<T, O>;
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PassErrorScope {
    #[error("In a set_bind_group command")]
    SetBindGroup,
    #[error("In a set_pipeline command")]
    SetPipelineRender,
    #[error("In a set_pipeline command")]
    SetPipelineCompute,
    #[error("In a draw command")]
    Draw,
    #[error("In a dispatch command")]
    Dispatch,
}
