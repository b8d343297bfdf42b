//! A backend that does nothing.

use crate::{
    binding_model::{BindGroup, PipelineLayout},
    pipeline::{ComputePipeline, RenderPipeline},
    track::NoInherit,
};

#[derive(Clone, Debug)]
pub struct Api;

#[derive(Debug, Default)]
pub struct Encoder;

impl crate::hal::Api for Api {
    type Inheritance = NoInherit;
    type DynamicOffset = u64;

    type CommandEncoder = Encoder;
}

impl crate::hal::CommandEncoder<Api> for Encoder {
    fn begin_compute_pass(&mut self, _label: Option<&str>) {}
    fn end_compute_pass(&mut self) {}
    fn begin_render_pass(&mut self, _label: Option<&str>) {}
    fn end_render_pass(&mut self) {}

    fn set_compute_pipeline(&mut self, _pipeline: &ComputePipeline) {}
    fn set_render_pipeline(&mut self, _pipeline: &RenderPipeline) {}

    fn set_bind_group(
        &mut self,
        _layout: &PipelineLayout,
        _index: u32,
        _group: &BindGroup,
        _dynamic_offsets: &[u64],
    ) {
    }

    fn draw(
        &mut self,
        _first_vertex: u32,
        _vertex_count: u32,
        _first_instance: u32,
        _instance_count: u32,
    ) {
    }
    fn dispatch(&mut self, _count: [u32; 3]) {}
}
