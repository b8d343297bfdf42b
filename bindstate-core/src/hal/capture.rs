//! A backend that records the native command stream.
//!
//! [`DescriptorSetApi`] behaves like a backend with descriptor sets: bind
//! groups in a compatible prefix survive pipeline changes, and dynamic offsets
//! are 32-bit. [`FlatApi`] re-binds everything on each pipeline change and
//! keeps 64-bit offsets.

use std::{fmt, marker::PhantomData};

use crate::{
    binding_model::{BindGroup, PipelineLayout},
    pipeline::{ComputePipeline, RenderPipeline},
    resource::Labeled,
    track::{DynamicOffsetWidth, Inherit, InheritancePolicy, NoInherit},
};

pub struct Api<P, O>(PhantomData<fn() -> (P, O)>);

pub type DescriptorSetApi = Api<Inherit, u32>;
pub type FlatApi = Api<NoInherit, u64>;

impl<P, O> Clone for Api<P, O> {
    fn clone(&self) -> Self {
        Self(PhantomData)
    }
}

impl<P, O> fmt::Debug for Api<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("capture::Api")
    }
}

/// A native command, with objects named by their label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    BeginComputePass(Option<String>),
    EndComputePass,
    BeginRenderPass(Option<String>),
    EndRenderPass,
    SetComputePipeline(String),
    SetRenderPipeline(String),
    SetBindGroup {
        index: u32,
        group: String,
        offsets: Vec<u64>,
    },
    Draw {
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    },
    Dispatch([u32; 3]),
}

#[derive(Debug, Default)]
pub struct Encoder {
    pub commands: Vec<Command>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `SetBindGroup` commands, as `(index, group label)` pairs.
    pub fn bind_calls(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.commands.iter().filter_map(|command| match *command {
            Command::SetBindGroup {
                index, ref group, ..
            } => Some((index, group.as_str())),
            _ => None,
        })
    }
}

impl<P: InheritancePolicy, O: DynamicOffsetWidth> crate::hal::Api for Api<P, O> {
    type Inheritance = P;
    type DynamicOffset = O;

    type CommandEncoder = Encoder;
}

impl<P: InheritancePolicy, O: DynamicOffsetWidth> crate::hal::CommandEncoder<Api<P, O>>
    for Encoder
{
    fn begin_compute_pass(&mut self, label: Option<&str>) {
        self.commands
            .push(Command::BeginComputePass(label.map(str::to_owned)));
    }

    fn end_compute_pass(&mut self) {
        self.commands.push(Command::EndComputePass);
    }

    fn begin_render_pass(&mut self, label: Option<&str>) {
        self.commands
            .push(Command::BeginRenderPass(label.map(str::to_owned)));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline) {
        self.commands
            .push(Command::SetComputePipeline(pipeline.label().to_owned()));
    }

    fn set_render_pipeline(&mut self, pipeline: &RenderPipeline) {
        self.commands
            .push(Command::SetRenderPipeline(pipeline.label().to_owned()));
    }

    fn set_bind_group(
        &mut self,
        _layout: &PipelineLayout,
        index: u32,
        group: &BindGroup,
        dynamic_offsets: &[O],
    ) {
        self.commands.push(Command::SetBindGroup {
            index,
            group: group.label().to_owned(),
            offsets: dynamic_offsets.iter().map(|&offset| offset.into()).collect(),
        });
    }

    fn draw(
        &mut self,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) {
        self.commands.push(Command::Draw {
            first_vertex,
            vertex_count,
            first_instance,
            instance_count,
        });
    }

    fn dispatch(&mut self, count: [u32; 3]) {
        self.commands.push(Command::Dispatch(count));
    }
}
