//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{borrow::Cow, sync::Arc};

use bindstate_core::{
    binding_model::{
        BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout,
        BindGroupLayoutDescriptor, BindingResource, BufferBinding, PipelineLayout,
        PipelineLayoutDescriptor,
    },
    device::{Device, DeviceDescriptor, Queue},
    pipeline::{
        ComputePipeline, ComputePipelineDescriptor, RenderPipeline, RenderPipelineDescriptor,
    },
    resource::{
        Buffer, BufferDescriptor, Fallible, Sampler, SamplerDescriptor, Texture,
        TextureDescriptor, TextureView, TextureViewDescriptor,
    },
};

pub struct TestingContext {
    pub device: Arc<Device>,
    pub queue: Queue,
}

pub fn initialize_test(toggles: bst::Toggles) -> TestingContext {
    let _ = env_logger::builder().is_test(true).try_init();

    let (device, queue) = Device::create(&DeviceDescriptor {
        label: Some("test device".into()),
        limits: bst::Limits::default(),
        toggles,
    })
    .unwrap();
    // Errors reported through the device fail the test unless a scope
    // captures them.
    device.on_uncaptured_error(Box::new(|error| panic!("uncaptured error: {error}")));

    TestingContext { device, queue }
}

pub fn buffer_entry(
    binding: u32,
    ty: bst::BufferBindingType,
    has_dynamic_offset: bool,
) -> bst::BindGroupLayoutEntry {
    bst::BindGroupLayoutEntry {
        binding,
        visibility: bst::ShaderStages::VERTEX_FRAGMENT | bst::ShaderStages::COMPUTE,
        ty: bst::BindingType::Buffer {
            ty,
            has_dynamic_offset,
        },
    }
}

pub const UNIFORM: bst::BufferBindingType = bst::BufferBindingType::Uniform;
pub const STORAGE: bst::BufferBindingType = bst::BufferBindingType::Storage { read_only: false };

impl TestingContext {
    pub fn bind_group_layout(&self, entries: &[bst::BindGroupLayoutEntry]) -> Arc<BindGroupLayout> {
        self.device
            .try_create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: None,
                entries: Cow::Borrowed(entries),
            })
            .unwrap()
    }

    pub fn pipeline_layout(&self, layouts: &[&Arc<BindGroupLayout>]) -> Arc<PipelineLayout> {
        let bind_group_layouts = layouts
            .iter()
            .map(|&layout| Fallible::from(layout.clone()))
            .collect::<Vec<_>>();
        self.device
            .try_create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: Cow::Owned(bind_group_layouts),
            })
            .unwrap()
    }

    pub fn compute_pipeline(
        &self,
        label: &str,
        layout: &Arc<PipelineLayout>,
    ) -> Fallible<ComputePipeline> {
        Fallible::from(
            self.device
                .try_create_compute_pipeline(&ComputePipelineDescriptor {
                    label: Some(label.into()),
                    layout: &Fallible::from(layout.clone()),
                })
                .unwrap(),
        )
    }

    pub fn render_pipeline(
        &self,
        label: &str,
        layout: &Arc<PipelineLayout>,
    ) -> Fallible<RenderPipeline> {
        Fallible::from(
            self.device
                .try_create_render_pipeline(&RenderPipelineDescriptor {
                    label: Some(label.into()),
                    layout: &Fallible::from(layout.clone()),
                    stages: bst::ShaderStages::VERTEX_FRAGMENT,
                })
                .unwrap(),
        )
    }

    pub fn buffer(&self, size: u64, usage: bst::BufferUsages) -> Fallible<Buffer> {
        Fallible::from(
            self.device
                .try_create_buffer(&BufferDescriptor {
                    label: Some("buffer".into()),
                    size,
                    usage,
                })
                .unwrap(),
        )
    }

    pub fn texture(
        &self,
        dimension: bst::TextureDimension,
        format: bst::TextureFormat,
        sample_count: u32,
        usage: bst::TextureUsages,
    ) -> Fallible<Texture> {
        Fallible::from(
            self.device
                .try_create_texture(&TextureDescriptor {
                    label: Some("texture".into()),
                    dimension,
                    format,
                    sample_count,
                    usage,
                })
                .unwrap(),
        )
    }

    /// A view of `texture`, with the dimension of the texture unless one is
    /// given.
    pub fn texture_view(
        &self,
        texture: &Fallible<Texture>,
        dimension: Option<bst::TextureViewDimension>,
    ) -> Fallible<TextureView> {
        Fallible::from(
            self.device
                .try_create_texture_view(
                    texture,
                    &TextureViewDescriptor {
                        label: Some("view".into()),
                        dimension,
                    },
                )
                .unwrap(),
        )
    }

    pub fn sampler(&self) -> Fallible<Sampler> {
        self.device.create_sampler(&SamplerDescriptor {
            label: Some("sampler".into()),
        })
    }

    /// Creates a bind group with one buffer binding per `(binding, offset,
    /// size)` triple, all pointing into `buffer`.
    pub fn bind_group(
        &self,
        label: &str,
        layout: &Arc<BindGroupLayout>,
        buffer: &Fallible<Buffer>,
        bindings: &[(u32, u64, Option<u64>)],
    ) -> Fallible<BindGroup> {
        let entries = bindings
            .iter()
            .map(|&(binding, offset, size)| BindGroupEntry {
                binding,
                resource: BindingResource::Buffer(BufferBinding {
                    buffer,
                    offset,
                    size,
                }),
            })
            .collect::<Vec<_>>();
        Fallible::from(
            self.device
                .try_create_bind_group(&BindGroupDescriptor {
                    label: Some(label.into()),
                    layout: &Fallible::from(layout.clone()),
                    entries: &entries,
                })
                .unwrap(),
        )
    }

    /// A group for a layout without entries.
    pub fn empty_bind_group(&self, label: &str, layout: &Arc<BindGroupLayout>) -> Fallible<BindGroup> {
        Fallible::from(
            self.device
                .try_create_bind_group(&BindGroupDescriptor {
                    label: Some(label.into()),
                    layout: &Fallible::from(layout.clone()),
                    entries: &[],
                })
                .unwrap(),
        )
    }
}
