/*! The backend contract.

A backend is described by an [`Api`]: whether it keeps bind groups bound
across compatible pipeline changes, the width of its native dynamic offsets,
and the encoder recorded command buffers are replayed onto. Queue submission
drives a [`crate::track::BindGroupTracker`] parameterized by the backend's
policy and only forwards the minimal set of bind calls to the encoder.

Two backends are provided in-tree: [`empty`] discards everything and
[`capture`] records the native command stream.
!*/

pub mod capture;
pub mod empty;

use std::fmt;

use crate::{
    binding_model::{BindGroup, PipelineLayout},
    pipeline::{ComputePipeline, RenderPipeline},
    track::{DynamicOffsetWidth, InheritancePolicy},
};

pub trait Api: Clone + Sized + 'static {
    type Inheritance: InheritancePolicy;
    type DynamicOffset: DynamicOffsetWidth;

    type CommandEncoder: CommandEncoder<Self>;
}

pub trait CommandEncoder<A: Api>: fmt::Debug {
    fn begin_compute_pass(&mut self, label: Option<&str>);
    fn end_compute_pass(&mut self);
    fn begin_render_pass(&mut self, label: Option<&str>);
    fn end_render_pass(&mut self);

    fn set_compute_pipeline(&mut self, pipeline: &ComputePipeline);
    fn set_render_pipeline(&mut self, pipeline: &RenderPipeline);

    /// Binds `group` at slot `index` of `layout`.
    ///
    /// `dynamic_offsets` holds one offset per dynamic binding of the group, in
    /// increasing binding order.
    fn set_bind_group(
        &mut self,
        layout: &PipelineLayout,
        index: u32,
        group: &BindGroup,
        dynamic_offsets: &[A::DynamicOffset],
    );

    fn draw(
        &mut self,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    );
    fn dispatch(&mut self, count: [u32; 3]);
}
