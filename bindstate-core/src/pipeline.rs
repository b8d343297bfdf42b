use crate::{
    binding_model::PipelineLayout,
    device::{Device, DeviceMismatch},
    error::ErrorClass,
    resource::{Fallible, InvalidResourceError, Labeled},
    resource_log, Label,
};

use thiserror::Error;

use std::sync::Arc;

/// Describes a compute pipeline.
#[derive(Clone, Debug)]
pub struct ComputePipelineDescriptor<'a> {
    pub label: Label<'a>,
    /// The layout of bind groups for this pipeline.
    pub layout: &'a Fallible<PipelineLayout>,
}

/// Describes a render pipeline.
#[derive(Clone, Debug)]
pub struct RenderPipelineDescriptor<'a> {
    pub label: Label<'a>,
    /// The layout of bind groups for this pipeline.
    pub layout: &'a Fallible<PipelineLayout>,
    /// The shader stages of the pipeline. Must contain the vertex stage.
    pub stages: bst::ShaderStages,
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreatePipelineError {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error("Shader stages {0:?} are not valid for a render pipeline")]
    InvalidStages(bst::ShaderStages),
    #[error("A render pipeline requires a vertex stage")]
    MissingVertexStage,
}

impl ErrorClass for CreatePipelineError {}

#[derive(Debug)]
pub struct ComputePipeline {
    pub(crate) device: Arc<Device>,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) label: String,
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl ComputePipeline {
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
}

crate::impl_resource_type!(ComputePipeline);
crate::impl_labeled!(ComputePipeline);
crate::impl_parent_device!(ComputePipeline);

#[derive(Debug)]
pub struct RenderPipeline {
    pub(crate) device: Arc<Device>,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) stages: bst::ShaderStages,
    pub(crate) label: String,
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl RenderPipeline {
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn stages(&self) -> bst::ShaderStages {
        self.stages
    }
}

crate::impl_resource_type!(RenderPipeline);
crate::impl_labeled!(RenderPipeline);
crate::impl_parent_device!(RenderPipeline);
