use crate::{
    binding_model::{
        self, BindGroup, BindGroupDynamicBindingData, BindGroupLayout, BindingResource,
        BindingTypeMaxCountValidator, DynamicBinding, PipelineLayout,
    },
    command::{CommandEncoder, CommandEncoderDescriptor},
    device::{
        bgl, check_limits,
        error_scope::{ErrorSink, PopErrorScopeError, UncapturedErrorHandler},
        DeviceDescriptor, Queue, RequestDeviceError,
    },
    error::{Error, ErrorClass, ErrorType},
    pipeline::{self, ComputePipeline, RenderPipeline},
    pool::ResourcePool,
    resource::{
        self, Buffer, Fallible, Labeled, ParentDevice, ResourceType, Sampler, Texture,
        TextureView,
    },
    resource_log, Label, LabelHelpers,
};

use arrayvec::ArrayVec;
use bst::math::is_aligned;
use parking_lot::Mutex;
use smallvec::SmallVec;

use std::{fmt, sync::Arc};

/// The device owns the limits and toggles every object is validated against,
/// the bind group layout pool, and the error scope stack.
pub struct Device {
    pub(crate) label: String,
    pub(crate) limits: bst::Limits,
    pub(crate) toggles: bst::Toggles,
    pub(crate) bgl_pool: ResourcePool<bgl::EntryMap, BindGroupLayout>,
    error_sink: Mutex<ErrorSink>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("label", &self.label)
            .field("limits", &self.limits)
            .field("toggles", &self.toggles)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

crate::impl_resource_type!(Device);
crate::impl_labeled!(Device);

impl Device {
    /// Creates a device and its queue.
    pub fn create(desc: &DeviceDescriptor) -> Result<(Arc<Self>, Queue), RequestDeviceError> {
        profiling::scope!("Device::create");
        check_limits(&desc.limits)?;

        let device = Arc::new(Self {
            label: desc.label.borrow_or_default().to_string(),
            limits: desc.limits.clone(),
            toggles: desc.toggles,
            bgl_pool: ResourcePool::new(),
            error_sink: Mutex::new(ErrorSink::new()),
        });
        log::info!("Created {} with {:?}", device.error_ident(), device.toggles);

        let queue = Queue::new(device.clone());
        Ok((device, queue))
    }

    pub fn limits(&self) -> &bst::Limits {
        &self.limits
    }

    pub fn toggles(&self) -> bst::Toggles {
        self.toggles
    }

    pub(crate) fn skip_validation(&self) -> bool {
        self.toggles.contains(bst::Toggles::SKIP_VALIDATION)
    }

    pub fn push_error_scope(&self, filter: bst::ErrorFilter) {
        self.error_sink.lock().push(filter);
    }

    /// Pops the innermost error scope, returning the first error it captured.
    pub fn pop_error_scope(&self) -> Result<Option<Error>, PopErrorScopeError> {
        self.error_sink.lock().pop()
    }

    /// Replaces the handler receiving errors that no scope captures.
    ///
    /// The default handler logs them at error level.
    pub fn on_uncaptured_error(&self, handler: Box<UncapturedErrorHandler>) {
        self.error_sink
            .lock()
            .set_uncaptured_handler(Arc::from(handler));
    }

    /// Reports an error of type `ty` as if an operation had failed.
    pub fn inject_error(&self, ty: ErrorType, message: &str) {
        self.report_error(Error::from_message(ty, message));
    }

    pub(crate) fn handle_error<E: ErrorClass>(&self, error: E) {
        log::debug!("{} reports: {}", self.error_ident(), error);
        self.report_error(Error::new(error));
    }

    fn report_error(&self, error: Error) {
        let uncaptured = self.error_sink.lock().capture(error);
        if let Some((handler, error)) = uncaptured {
            handler(error);
        }
    }

    /// Turns the result of a `try_create_*` call into a handle, reporting
    /// the error if there is one.
    fn fallible<T: ResourceType, E: ErrorClass>(
        &self,
        label: &Label,
        result: Result<Arc<T>, E>,
    ) -> Fallible<T> {
        match result {
            Ok(value) => Fallible::Valid(value),
            Err(error) => {
                self.handle_error(error);
                Fallible::invalid(label)
            }
        }
    }

    pub fn try_create_buffer(
        self: &Arc<Self>,
        desc: &resource::BufferDescriptor,
    ) -> Result<Arc<Buffer>, resource::CreateBufferError> {
        profiling::scope!("Device::create_buffer");
        let buffer = Buffer::new(self, desc)?;
        resource_log!("Created {}", buffer.error_ident());
        Ok(buffer)
    }

    pub fn create_buffer(self: &Arc<Self>, desc: &resource::BufferDescriptor) -> Fallible<Buffer> {
        self.fallible(&desc.label, self.try_create_buffer(desc))
    }

    pub fn try_create_texture(
        self: &Arc<Self>,
        desc: &resource::TextureDescriptor,
    ) -> Result<Arc<Texture>, resource::CreateTextureError> {
        profiling::scope!("Device::create_texture");
        let texture = Texture::new(self, desc)?;
        resource_log!("Created {}", texture.error_ident());
        Ok(texture)
    }

    pub fn create_texture(
        self: &Arc<Self>,
        desc: &resource::TextureDescriptor,
    ) -> Fallible<Texture> {
        self.fallible(&desc.label, self.try_create_texture(desc))
    }

    pub fn try_create_texture_view(
        &self,
        texture: &Fallible<Texture>,
        desc: &resource::TextureViewDescriptor,
    ) -> Result<Arc<TextureView>, resource::CreateTextureViewError> {
        profiling::scope!("Device::create_texture_view");
        let texture = texture.get()?;
        texture.same_device(self)?;
        let view = TextureView::new(&texture, desc)?;
        resource_log!("Created {}", view.error_ident());
        Ok(view)
    }

    pub fn create_texture_view(
        &self,
        texture: &Fallible<Texture>,
        desc: &resource::TextureViewDescriptor,
    ) -> Fallible<TextureView> {
        self.fallible(&desc.label, self.try_create_texture_view(texture, desc))
    }

    pub fn create_sampler(
        self: &Arc<Self>,
        desc: &resource::SamplerDescriptor,
    ) -> Fallible<Sampler> {
        profiling::scope!("Device::create_sampler");
        let sampler = Sampler::new(self, desc);
        resource_log!("Created {}", sampler.error_ident());
        Fallible::Valid(sampler)
    }

    /// Creates a bind group layout, or returns the live layout created from
    /// an equivalent descriptor.
    ///
    /// Layouts are equivalent when they have the same entries, regardless of
    /// declaration order. Deduplicated layouts are the same object, which is
    /// what bind group compatibility is checked against.
    pub fn try_create_bind_group_layout(
        self: &Arc<Self>,
        desc: &binding_model::BindGroupLayoutDescriptor,
    ) -> Result<Arc<BindGroupLayout>, binding_model::CreateBindGroupLayoutError> {
        profiling::scope!("Device::create_bind_group_layout");

        let entry_map = bgl::EntryMap::from_entries(&self.limits, &desc.entries)?;
        let layout = self.bgl_pool.get_or_init(entry_map, |entry_map| {
            self.create_bind_group_layout_internal(&desc.label, entry_map)
        })?;

        log::debug!(
            "Created {} with {} entries",
            layout.error_ident(),
            layout.entries.len()
        );
        Ok(layout)
    }

    pub fn create_bind_group_layout(
        self: &Arc<Self>,
        desc: &binding_model::BindGroupLayoutDescriptor,
    ) -> Fallible<BindGroupLayout> {
        self.fallible(&desc.label, self.try_create_bind_group_layout(desc))
    }

    fn create_bind_group_layout_internal(
        self: &Arc<Self>,
        label: &Label,
        entry_map: bgl::EntryMap,
    ) -> Result<Arc<BindGroupLayout>, binding_model::CreateBindGroupLayoutError> {
        use binding_model::{BindGroupLayoutEntryError, CreateBindGroupLayoutError as Error};

        for entry in entry_map.values() {
            if entry.visibility.contains_invalid_bits() {
                return Err(Error::InvalidVisibility(entry.visibility));
            }

            let error = match entry.ty {
                bst::BindingType::StorageTexture {
                    view_dimension:
                        bst::TextureViewDimension::Cube | bst::TextureViewDimension::CubeArray,
                } => Some(BindGroupLayoutEntryError::StorageTextureCube),
                bst::BindingType::Texture {
                    multisampled: true,
                    view_dimension,
                    ..
                } if view_dimension != bst::TextureViewDimension::D2 => {
                    Some(BindGroupLayoutEntryError::MultisampledNot2d(view_dimension))
                }
                _ => None,
            };
            if let Some(error) = error {
                return Err(Error::Entry {
                    binding: entry.binding,
                    error,
                });
            }
        }

        let mut count_validator = BindingTypeMaxCountValidator::default();
        for entry in entry_map.values() {
            count_validator.add_binding(entry);
        }
        // A layout must be usable on its own in a pipeline layout.
        count_validator.validate(&self.limits)?;

        // The count validator bounds the dynamic bindings by limits that never
        // exceed the capacity.
        let dynamic_bindings = entry_map
            .values()
            .filter(|entry| entry.ty.has_dynamic_offset())
            .filter_map(|entry| match entry.ty {
                bst::BindingType::Buffer { ty, .. } => Some(DynamicBinding {
                    binding: entry.binding,
                    ty,
                }),
                _ => None,
            })
            .collect::<ArrayVec<_, { binding_model::MAX_DYNAMIC_BINDINGS }>>();

        Ok(Arc::new(BindGroupLayout {
            device: self.clone(),
            entries: entry_map,
            dynamic_bindings,
            count_validator,
            label: label.borrow_or_default().to_string(),
        }))
    }

    pub fn try_create_pipeline_layout(
        self: &Arc<Self>,
        desc: &binding_model::PipelineLayoutDescriptor,
    ) -> Result<Arc<PipelineLayout>, binding_model::CreatePipelineLayoutError> {
        use binding_model::CreatePipelineLayoutError as Error;
        profiling::scope!("Device::create_pipeline_layout");

        let bind_group_layouts_count = desc.bind_group_layouts.len();
        let max_bind_groups = self.limits.max_bind_groups as usize;
        if bind_group_layouts_count > max_bind_groups {
            return Err(Error::TooManyGroups {
                actual: bind_group_layouts_count,
                max: max_bind_groups,
            });
        }

        let mut bind_group_layouts = ArrayVec::new();
        let mut count_validator = BindingTypeMaxCountValidator::default();
        for bgl in desc.bind_group_layouts.iter() {
            let bgl = bgl.get()?;
            bgl.same_device(self)?;
            count_validator.merge(&bgl.count_validator);
            bind_group_layouts.push(bgl);
        }
        count_validator.validate(&self.limits)?;

        let layout = Arc::new(PipelineLayout::new(self, &desc.label, bind_group_layouts));
        log::debug!(
            "Created {} with {} bind group layouts",
            layout.error_ident(),
            bind_group_layouts_count
        );
        Ok(layout)
    }

    pub fn create_pipeline_layout(
        self: &Arc<Self>,
        desc: &binding_model::PipelineLayoutDescriptor,
    ) -> Fallible<PipelineLayout> {
        self.fallible(&desc.label, self.try_create_pipeline_layout(desc))
    }

    fn create_buffer_binding(
        &self,
        bb: &binding_model::BufferBinding,
        binding: u32,
        decl: &bst::BindGroupLayoutEntry,
        used_buffers: &mut Vec<Arc<Buffer>>,
        dynamic_binding_info: &mut Vec<BindGroupDynamicBindingData>,
    ) -> Result<(), binding_model::CreateBindGroupError> {
        use binding_model::CreateBindGroupError as Error;

        let (binding_ty, dynamic) = match decl.ty {
            bst::BindingType::Buffer {
                ty,
                has_dynamic_offset,
            } => (ty, has_dynamic_offset),
            _ => {
                return Err(Error::WrongBindingType {
                    binding,
                    actual: decl.ty,
                    expected: "UniformBuffer, StorageBuffer or ReadonlyStorageBuffer",
                })
            }
        };
        let range_limit = match binding_ty {
            bst::BufferBindingType::Uniform => self.limits.max_uniform_buffer_binding_size,
            bst::BufferBindingType::Storage { .. } => self.limits.max_storage_buffer_binding_size,
        };

        let buffer = bb.buffer.get()?;
        buffer.same_device(self)?;
        buffer.check_usage(binding_ty.required_usage())?;

        let (align, align_limit_name) =
            binding_model::buffer_binding_type_alignment(&self.limits, binding_ty);
        if !is_aligned(bb.offset, align as u64) {
            return Err(Error::UnalignedBufferOffset(
                bb.offset,
                align_limit_name,
                align,
            ));
        }

        // No size binds the whole buffer, so only a zero offset fits.
        let bind_size = bb.size.unwrap_or(buffer.size);
        match bb.offset.checked_add(bind_size) {
            Some(end) if end <= buffer.size => {}
            _ => {
                return Err(Error::BindingRangeOutOfBounds {
                    buffer: buffer.error_ident(),
                    binding,
                    offset: bb.offset,
                    size: bb.size,
                    buffer_size: buffer.size,
                })
            }
        }

        if bind_size > range_limit as u64 {
            return Err(Error::BufferRangeTooLarge {
                binding,
                given: bind_size,
                limit: range_limit,
            });
        }

        // Record binding info for validating dynamic offsets
        if dynamic {
            dynamic_binding_info.push(BindGroupDynamicBindingData {
                binding_idx: binding,
                buffer_size: buffer.size,
                binding_range: bb.offset..bb.offset + bind_size,
                binding_type: binding_ty,
            });
        }

        used_buffers.push(buffer);
        Ok(())
    }

    fn create_texture_binding(
        &self,
        view: &Fallible<TextureView>,
        binding: u32,
        decl: &bst::BindGroupLayoutEntry,
    ) -> Result<Arc<TextureView>, binding_model::CreateBindGroupError> {
        use binding_model::CreateBindGroupError as Error;

        let view = view.get()?;
        view.same_device(self)?;
        let texture = view.texture();

        match decl.ty {
            bst::BindingType::Texture {
                component_type,
                view_dimension,
                multisampled,
            } => {
                texture.check_usage(bst::TextureUsages::SAMPLED)?;
                if multisampled != (texture.sample_count > 1) {
                    return Err(Error::InvalidTextureMultisample {
                        binding,
                        layout_multisampled: multisampled,
                        view_samples: texture.sample_count,
                    });
                }
                if texture.format.component_type() != component_type {
                    return Err(Error::InvalidTextureComponentType {
                        binding,
                        layout_component_type: component_type,
                        view_format: texture.format,
                    });
                }
                if view.dimension != view_dimension {
                    return Err(Error::InvalidTextureDimension {
                        binding,
                        layout_dimension: view_dimension,
                        view_dimension: view.dimension,
                    });
                }
            }
            bst::BindingType::StorageTexture { view_dimension } => {
                texture.check_usage(bst::TextureUsages::STORAGE)?;
                if view.dimension != view_dimension {
                    return Err(Error::InvalidTextureDimension {
                        binding,
                        layout_dimension: view_dimension,
                        view_dimension: view.dimension,
                    });
                }
            }
            _ => {
                return Err(Error::WrongBindingType {
                    binding,
                    actual: decl.ty,
                    expected: "SampledTexture or StorageTexture",
                })
            }
        }

        Ok(view)
    }

    pub fn try_create_bind_group(
        self: &Arc<Self>,
        desc: &binding_model::BindGroupDescriptor,
    ) -> Result<Arc<BindGroup>, binding_model::CreateBindGroupError> {
        use binding_model::CreateBindGroupError as Error;
        profiling::scope!("Device::create_bind_group");

        let layout = desc.layout.get()?;
        layout.same_device(self)?;

        // Check that the number of entries in the descriptor matches
        // the number of entries in the layout.
        let actual = desc.entries.len();
        let expected = layout.entries.len();
        if actual != expected {
            return Err(Error::BindingsNumMismatch { expected, actual });
        }

        let mut seen_bindings = SmallVec::<[u32; 8]>::new();
        let mut used_buffers = Vec::new();
        let mut used_texture_views = Vec::new();
        let mut used_samplers = Vec::new();
        let mut dynamic_binding_info = Vec::new();

        for entry in desc.entries.iter() {
            let binding = entry.binding;
            // Find the corresponding declaration in the layout
            let decl = layout
                .entries
                .get(binding)
                .ok_or(Error::MissingBindingDeclaration(binding))?;
            if seen_bindings.contains(&binding) {
                return Err(Error::DuplicateBinding(binding));
            }
            seen_bindings.push(binding);

            match entry.resource {
                BindingResource::Buffer(ref bb) => {
                    self.create_buffer_binding(
                        bb,
                        binding,
                        decl,
                        &mut used_buffers,
                        &mut dynamic_binding_info,
                    )?;
                }
                BindingResource::Sampler(sampler) => match decl.ty {
                    bst::BindingType::Sampler => {
                        let sampler = sampler.get()?;
                        sampler.same_device(self)?;
                        used_samplers.push(sampler);
                    }
                    _ => {
                        return Err(Error::WrongBindingType {
                            binding,
                            actual: decl.ty,
                            expected: "Sampler",
                        })
                    }
                },
                BindingResource::TextureView(view) => {
                    used_texture_views.push(self.create_texture_binding(view, binding, decl)?);
                }
            }
        }

        // Dynamic offsets are given in increasing binding order, whatever
        // the order of the descriptor entries.
        dynamic_binding_info.sort_unstable_by_key(|info| info.binding_idx);

        let bind_group = Arc::new(BindGroup {
            device: self.clone(),
            layout,
            label: desc.label.borrow_or_default().to_string(),
            used_buffers,
            used_texture_views,
            used_samplers,
            dynamic_binding_info,
        });
        resource_log!("Created {}", bind_group.error_ident());
        Ok(bind_group)
    }

    pub fn create_bind_group(
        self: &Arc<Self>,
        desc: &binding_model::BindGroupDescriptor,
    ) -> Fallible<BindGroup> {
        self.fallible(&desc.label, self.try_create_bind_group(desc))
    }

    pub fn try_create_compute_pipeline(
        self: &Arc<Self>,
        desc: &pipeline::ComputePipelineDescriptor,
    ) -> Result<Arc<ComputePipeline>, pipeline::CreatePipelineError> {
        profiling::scope!("Device::create_compute_pipeline");

        let layout = desc.layout.get()?;
        layout.same_device(self)?;

        let pipeline = Arc::new(ComputePipeline {
            device: self.clone(),
            layout,
            label: desc.label.borrow_or_default().to_string(),
        });
        resource_log!("Created {}", pipeline.error_ident());
        Ok(pipeline)
    }

    pub fn create_compute_pipeline(
        self: &Arc<Self>,
        desc: &pipeline::ComputePipelineDescriptor,
    ) -> Fallible<ComputePipeline> {
        self.fallible(&desc.label, self.try_create_compute_pipeline(desc))
    }

    pub fn try_create_render_pipeline(
        self: &Arc<Self>,
        desc: &pipeline::RenderPipelineDescriptor,
    ) -> Result<Arc<RenderPipeline>, pipeline::CreatePipelineError> {
        use pipeline::CreatePipelineError as Error;
        profiling::scope!("Device::create_render_pipeline");

        if desc.stages.contains_invalid_bits() || desc.stages.contains(bst::ShaderStages::COMPUTE)
        {
            return Err(Error::InvalidStages(desc.stages));
        }
        if !desc.stages.contains(bst::ShaderStages::VERTEX) {
            return Err(Error::MissingVertexStage);
        }

        let layout = desc.layout.get()?;
        layout.same_device(self)?;

        let pipeline = Arc::new(RenderPipeline {
            device: self.clone(),
            layout,
            stages: desc.stages,
            label: desc.label.borrow_or_default().to_string(),
        });
        resource_log!("Created {}", pipeline.error_ident());
        Ok(pipeline)
    }

    pub fn create_render_pipeline(
        self: &Arc<Self>,
        desc: &pipeline::RenderPipelineDescriptor,
    ) -> Fallible<RenderPipeline> {
        self.fallible(&desc.label, self.try_create_render_pipeline(desc))
    }

    pub fn create_command_encoder(
        self: &Arc<Self>,
        desc: &CommandEncoderDescriptor,
    ) -> CommandEncoder {
        profiling::scope!("Device::create_command_encoder");
        CommandEncoder::new(self, &desc.label)
    }
}
