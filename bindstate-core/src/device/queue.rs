use crate::{
    command::CommandBuffer,
    device::{Device, DeviceMismatch},
    error::ErrorClass,
    hal,
    resource::{DestroyedResourceError, Fallible, InvalidResourceError, Labeled, ParentDevice},
    SubmissionIndex,
};

use thiserror::Error;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum QueueSubmitError {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error(transparent)]
    DestroyedBuffer(#[from] DestroyedResourceError),
    #[error("{0} was already submitted")]
    AlreadySubmitted(crate::resource::ResourceErrorIdent),
}

impl ErrorClass for QueueSubmitError {}

/// Submits finished command buffers, replaying them onto a backend encoder.
#[derive(Debug)]
pub struct Queue {
    device: Arc<Device>,
    last_submission_index: AtomicU64,
}

impl Queue {
    pub(crate) fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            last_submission_index: AtomicU64::new(0),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Index of the last successful submission, or zero.
    pub fn last_submission_index(&self) -> SubmissionIndex {
        self.last_submission_index.load(Ordering::Acquire)
    }

    /// Validates `command_buffers` and replays them, in order, onto `raw`.
    ///
    /// Every valid command buffer of this device is consumed, even if the
    /// submission fails. Nothing is replayed unless all of them are valid.
    ///
    /// The destroyed buffer check covers every bind group set in a pass,
    /// including groups in slots no draw or dispatch used.
    pub fn try_submit<A: hal::Api>(
        &self,
        raw: &mut A::CommandEncoder,
        command_buffers: &[Fallible<CommandBuffer>],
    ) -> Result<SubmissionIndex, QueueSubmitError> {
        profiling::scope!("Queue::submit");

        let mut validated = Vec::with_capacity(command_buffers.len());
        let mut first_error = None;
        for command_buffer in command_buffers {
            match self.take_command_buffer(command_buffer) {
                Ok(command_buffer) => validated.push(command_buffer),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }
        for command_buffer in validated.iter() {
            for buffer in command_buffer.used_buffers() {
                buffer.check_destroyed()?;
            }
        }

        for command_buffer in validated.iter() {
            log::trace!("Replaying {}", command_buffer.error_ident());
            command_buffer.replay::<A>(raw);
        }

        let index = self.last_submission_index.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "Submission {index} with {} command buffers",
            validated.len()
        );
        Ok(index)
    }

    fn take_command_buffer(
        &self,
        command_buffer: &Fallible<CommandBuffer>,
    ) -> Result<Arc<CommandBuffer>, QueueSubmitError> {
        let command_buffer = command_buffer.get()?;
        command_buffer.same_device(&self.device)?;
        if command_buffer.take_for_submit() {
            return Err(QueueSubmitError::AlreadySubmitted(
                command_buffer.error_ident(),
            ));
        }
        Ok(command_buffer)
    }

    /// Like [`Queue::try_submit`], but reports the error to the device.
    pub fn submit<A: hal::Api>(
        &self,
        raw: &mut A::CommandEncoder,
        command_buffers: &[Fallible<CommandBuffer>],
    ) -> Option<SubmissionIndex> {
        match self.try_submit::<A>(raw, command_buffers) {
            Ok(index) => Some(index),
            Err(error) => {
                self.device.handle_error(error);
                None
            }
        }
    }
}
