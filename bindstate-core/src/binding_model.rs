use crate::{
    device::{bgl, Device, DeviceMismatch},
    error::ErrorClass,
    resource::{
        Buffer, Fallible, InvalidResourceError, Labeled, MissingBufferUsageError,
        MissingTextureUsageError, ParentDevice, ResourceErrorIdent, Sampler, TextureView,
    },
    resource_log,
    track::BindGroupMask,
    Label, LabelHelpers,
};

use arrayvec::ArrayVec;
use bst::math::is_aligned;
use thiserror::Error;

use std::{borrow::Cow, ops::Range, sync::Arc};

/// Upper bound on the number of dynamic bindings in one bind group layout.
pub(crate) const MAX_DYNAMIC_BINDINGS: usize =
    (bst::MAX_DYNAMIC_UNIFORM_BUFFER_COUNT + bst::MAX_DYNAMIC_STORAGE_BUFFER_COUNT) as usize;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BindGroupLayoutEntryError {
    #[error("Cube dimension is not expected for texture storage")]
    StorageTextureCube,
    #[error("Multisampled texture binding view dimension must be 2D, got {0:?}")]
    MultisampledNot2d(bst::TextureViewDimension),
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreateBindGroupLayoutError {
    #[error("Conflicting binding at index {0}")]
    ConflictBinding(u32),
    #[error("Binding {binding} entry is invalid")]
    Entry {
        binding: u32,
        #[source]
        error: BindGroupLayoutEntryError,
    },
    #[error(transparent)]
    TooManyBindings(#[from] BindingTypeMaxCountError),
    #[error("Binding index {binding} is greater than the maximum number {maximum}")]
    InvalidBindingIndex { binding: u32, maximum: u32 },
    #[error("Invalid visibility {0:?}")]
    InvalidVisibility(bst::ShaderStages),
}

impl ErrorClass for CreateBindGroupLayoutError {}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreateBindGroupError {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error(
        "Number of bindings in bind group descriptor ({actual}) does not match the number of bindings defined in the bind group layout ({expected})"
    )]
    BindingsNumMismatch { actual: usize, expected: usize },
    #[error("Binding {0} is used at least twice in the descriptor")]
    DuplicateBinding(u32),
    #[error("Unable to find a corresponding declaration for the given binding {0}")]
    MissingBindingDeclaration(u32),
    #[error(transparent)]
    MissingBufferUsage(#[from] MissingBufferUsageError),
    #[error(transparent)]
    MissingTextureUsage(#[from] MissingTextureUsageError),
    #[error("Buffer offset {0} does not respect device's requested `{1}` limit {2}")]
    UnalignedBufferOffset(bst::BufferAddress, &'static str, u32),
    #[error(
        "Buffer binding {binding} range {offset}..{offset}+{size:?} does not fit in {buffer} of size {buffer_size}"
    )]
    BindingRangeOutOfBounds {
        buffer: ResourceErrorIdent,
        binding: u32,
        offset: bst::BufferAddress,
        size: Option<bst::BufferAddress>,
        buffer_size: bst::BufferAddress,
    },
    #[error(
        "Buffer binding {binding} range {given} exceeds `max_*_buffer_binding_size` limit {limit}"
    )]
    BufferRangeTooLarge {
        binding: u32,
        given: bst::BufferAddress,
        limit: u32,
    },
    #[error("Binding {binding} has a different type ({actual:?}) than the one in the layout ({expected})")]
    WrongBindingType {
        binding: u32,
        actual: bst::BindingType,
        expected: &'static str,
    },
    #[error("Texture binding {binding} expects multisampled = {layout_multisampled}, but given a view with samples = {view_samples}")]
    InvalidTextureMultisample {
        binding: u32,
        layout_multisampled: bool,
        view_samples: u32,
    },
    #[error("Texture binding {binding} expects component type = {layout_component_type:?}, but given a view with format = {view_format:?}")]
    InvalidTextureComponentType {
        binding: u32,
        layout_component_type: bst::TextureComponentType,
        view_format: bst::TextureFormat,
    },
    #[error("Texture binding {binding} expects dimension = {layout_dimension:?}, but given a view with dimension = {view_dimension:?}")]
    InvalidTextureDimension {
        binding: u32,
        layout_dimension: bst::TextureViewDimension,
        view_dimension: bst::TextureViewDimension,
    },
}

impl ErrorClass for CreateBindGroupError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindingZone {
    Stage(bst::ShaderStages),
    Pipeline,
}

impl std::fmt::Display for BindingZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Stage(stage) => write!(f, "Stage {stage:?}"),
            Self::Pipeline => write!(f, "Whole pipeline"),
        }
    }
}

#[derive(Clone, Debug, Error)]
#[error("Too many bindings of type {kind:?} in {zone}, limit is {limit}, count was {count}")]
pub struct BindingTypeMaxCountError {
    pub kind: BindingTypeMaxCountErrorKind,
    pub zone: BindingZone,
    pub limit: u32,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindingTypeMaxCountErrorKind {
    DynamicUniformBuffers,
    DynamicStorageBuffers,
    SampledTextures,
    Samplers,
    StorageBuffers,
    StorageTextures,
    UniformBuffers,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct PerStageBindingTypeCounter {
    vertex: u32,
    fragment: u32,
    compute: u32,
}

impl PerStageBindingTypeCounter {
    pub(crate) fn add(&mut self, stage: bst::ShaderStages, count: u32) {
        if stage.contains(bst::ShaderStages::VERTEX) {
            self.vertex += count;
        }
        if stage.contains(bst::ShaderStages::FRAGMENT) {
            self.fragment += count;
        }
        if stage.contains(bst::ShaderStages::COMPUTE) {
            self.compute += count;
        }
    }

    pub(crate) fn max(&self) -> (BindingZone, u32) {
        let max_value = self.vertex.max(self.fragment.max(self.compute));
        let mut stage = bst::ShaderStages::NONE;
        if max_value == self.vertex {
            stage |= bst::ShaderStages::VERTEX
        }
        if max_value == self.fragment {
            stage |= bst::ShaderStages::FRAGMENT
        }
        if max_value == self.compute {
            stage |= bst::ShaderStages::COMPUTE
        }
        (BindingZone::Stage(stage), max_value)
    }

    /// Bindings of every group of a pipeline layout are visible at once, so
    /// per-stage counts add up.
    pub(crate) fn merge(&mut self, other: &Self) {
        self.vertex += other.vertex;
        self.fragment += other.fragment;
        self.compute += other.compute;
    }

    pub(crate) fn validate(
        &self,
        limit: u32,
        kind: BindingTypeMaxCountErrorKind,
    ) -> Result<(), BindingTypeMaxCountError> {
        let (zone, count) = self.max();
        if limit < count {
            Err(BindingTypeMaxCountError {
                kind,
                zone,
                limit,
                count,
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct BindingTypeMaxCountValidator {
    dynamic_uniform_buffers: u32,
    dynamic_storage_buffers: u32,
    sampled_textures: PerStageBindingTypeCounter,
    samplers: PerStageBindingTypeCounter,
    storage_buffers: PerStageBindingTypeCounter,
    storage_textures: PerStageBindingTypeCounter,
    uniform_buffers: PerStageBindingTypeCounter,
}

impl BindingTypeMaxCountValidator {
    pub(crate) fn add_binding(&mut self, binding: &bst::BindGroupLayoutEntry) {
        match binding.ty {
            bst::BindingType::Buffer {
                ty: bst::BufferBindingType::Uniform,
                has_dynamic_offset,
            } => {
                self.uniform_buffers.add(binding.visibility, 1);
                if has_dynamic_offset {
                    self.dynamic_uniform_buffers += 1;
                }
            }
            bst::BindingType::Buffer {
                ty: bst::BufferBindingType::Storage { .. },
                has_dynamic_offset,
            } => {
                self.storage_buffers.add(binding.visibility, 1);
                if has_dynamic_offset {
                    self.dynamic_storage_buffers += 1;
                }
            }
            bst::BindingType::Sampler => {
                self.samplers.add(binding.visibility, 1);
            }
            bst::BindingType::Texture { .. } => {
                self.sampled_textures.add(binding.visibility, 1);
            }
            bst::BindingType::StorageTexture { .. } => {
                self.storage_textures.add(binding.visibility, 1);
            }
        }
    }

    pub(crate) fn merge(&mut self, other: &Self) {
        self.dynamic_uniform_buffers += other.dynamic_uniform_buffers;
        self.dynamic_storage_buffers += other.dynamic_storage_buffers;
        self.sampled_textures.merge(&other.sampled_textures);
        self.samplers.merge(&other.samplers);
        self.storage_buffers.merge(&other.storage_buffers);
        self.storage_textures.merge(&other.storage_textures);
        self.uniform_buffers.merge(&other.uniform_buffers);
    }

    pub(crate) fn validate(&self, limits: &bst::Limits) -> Result<(), BindingTypeMaxCountError> {
        if limits.max_dynamic_uniform_buffers_per_pipeline_layout < self.dynamic_uniform_buffers {
            return Err(BindingTypeMaxCountError {
                kind: BindingTypeMaxCountErrorKind::DynamicUniformBuffers,
                zone: BindingZone::Pipeline,
                limit: limits.max_dynamic_uniform_buffers_per_pipeline_layout,
                count: self.dynamic_uniform_buffers,
            });
        }
        if limits.max_dynamic_storage_buffers_per_pipeline_layout < self.dynamic_storage_buffers {
            return Err(BindingTypeMaxCountError {
                kind: BindingTypeMaxCountErrorKind::DynamicStorageBuffers,
                zone: BindingZone::Pipeline,
                limit: limits.max_dynamic_storage_buffers_per_pipeline_layout,
                count: self.dynamic_storage_buffers,
            });
        }
        self.sampled_textures.validate(
            limits.max_sampled_textures_per_shader_stage,
            BindingTypeMaxCountErrorKind::SampledTextures,
        )?;
        self.samplers.validate(
            limits.max_samplers_per_shader_stage,
            BindingTypeMaxCountErrorKind::Samplers,
        )?;
        self.storage_buffers.validate(
            limits.max_storage_buffers_per_shader_stage,
            BindingTypeMaxCountErrorKind::StorageBuffers,
        )?;
        self.storage_textures.validate(
            limits.max_storage_textures_per_shader_stage,
            BindingTypeMaxCountErrorKind::StorageTextures,
        )?;
        self.uniform_buffers.validate(
            limits.max_uniform_buffers_per_shader_stage,
            BindingTypeMaxCountErrorKind::UniformBuffers,
        )?;
        Ok(())
    }
}

/// Describes a group of bindings and the resources to be bound.
#[derive(Clone, Debug)]
pub struct BindGroupDescriptor<'a> {
    /// Debug label of the bind group.
    pub label: Label<'a>,
    /// The [`BindGroupLayout`] that corresponds to this bind group.
    pub layout: &'a Fallible<BindGroupLayout>,
    /// The resources to bind to this bind group.
    pub entries: &'a [BindGroupEntry<'a>],
}

/// Describes a [`BindGroupLayout`].
#[derive(Clone, Debug, Default)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// Debug label of the bind group layout.
    pub label: Label<'a>,
    /// Array of entries in this BindGroupLayout
    pub entries: Cow<'a, [bst::BindGroupLayoutEntry]>,
}

/// A dynamic binding of a layout, in increasing binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DynamicBinding {
    pub binding: u32,
    pub ty: bst::BufferBindingType,
}

/// Bind group layout.
#[derive(Debug)]
pub struct BindGroupLayout {
    pub(crate) device: Arc<Device>,
    pub(crate) entries: bgl::EntryMap,
    pub(crate) dynamic_bindings: ArrayVec<DynamicBinding, MAX_DYNAMIC_BINDINGS>,
    pub(crate) count_validator: BindingTypeMaxCountValidator,
    pub(crate) label: String,
}

impl Drop for BindGroupLayout {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
        self.device.bgl_pool.remove(&self.entries);
    }
}

impl BindGroupLayout {
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &bst::BindGroupLayoutEntry> + '_ {
        self.entries.values()
    }

    /// Number of bindings with a dynamic offset. A `set_bind_group` call with
    /// this layout must provide exactly this many offsets.
    pub fn dynamic_count(&self) -> usize {
        self.dynamic_bindings.len()
    }
}

crate::impl_resource_type!(BindGroupLayout);
crate::impl_labeled!(BindGroupLayout);
crate::impl_parent_device!(BindGroupLayout);

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreatePipelineLayoutError {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(
        "Bind group layout count {actual} exceeds device bind group limit {max}"
    )]
    TooManyGroups { actual: usize, max: usize },
    #[error(transparent)]
    TooManyBindings(#[from] BindingTypeMaxCountError),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
}

impl ErrorClass for CreatePipelineLayoutError {}

/// Describes a pipeline layout.
///
/// A `PipelineLayoutDescriptor` can be used to create a pipeline layout.
#[derive(Clone, Debug)]
pub struct PipelineLayoutDescriptor<'a> {
    /// Debug label of the pipeline layout.
    pub label: Label<'a>,
    /// Bind groups that this pipeline uses. The first entry will provide all the bindings for
    /// "set = 0", second entry will provide all the bindings for "set = 1" etc.
    pub bind_group_layouts: Cow<'a, [Fallible<BindGroupLayout>]>,
}

#[derive(Debug)]
pub struct PipelineLayout {
    pub(crate) device: Arc<Device>,
    pub(crate) label: String,
    pub(crate) bind_group_layouts: ArrayVec<Arc<BindGroupLayout>, { bst::MAX_BIND_GROUPS }>,
    pub(crate) bind_group_layouts_mask: BindGroupMask,
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl PipelineLayout {
    pub(crate) fn new(
        device: &Arc<Device>,
        label: &Label,
        bind_group_layouts: ArrayVec<Arc<BindGroupLayout>, { bst::MAX_BIND_GROUPS }>,
    ) -> Self {
        let bind_group_layouts_mask = ((1u32 << bind_group_layouts.len()) - 1) as BindGroupMask;
        Self {
            device: device.clone(),
            label: label.borrow_or_default().to_string(),
            bind_group_layouts,
            bind_group_layouts_mask,
        }
    }

    pub fn bind_group_layouts(&self) -> &[Arc<BindGroupLayout>] {
        &self.bind_group_layouts
    }

    /// Bit `i` is set if the layout has a bind group layout at slot `i`.
    pub fn bind_group_layouts_mask(&self) -> BindGroupMask {
        self.bind_group_layouts_mask
    }

    /// Mask of the leading slots whose bind group layouts are the same
    /// objects in both pipeline layouts.
    ///
    /// Bind groups bound at these slots stay valid when switching from one
    /// layout to the other on backends that support inheritance.
    pub fn inherited_groups_mask(&self, other: &Self) -> BindGroupMask {
        let common = self
            .bind_group_layouts
            .iter()
            .zip(other.bind_group_layouts.iter())
            .take_while(|&(a, b)| Arc::ptr_eq(a, b))
            .count();
        ((1u32 << common) - 1) as BindGroupMask
    }
}

crate::impl_resource_type!(PipelineLayout);
crate::impl_labeled!(PipelineLayout);
crate::impl_parent_device!(PipelineLayout);

#[derive(Clone, Debug)]
pub struct BufferBinding<'a> {
    pub buffer: &'a Fallible<Buffer>,
    pub offset: bst::BufferAddress,
    /// Size of the binding, or `None` for the size of the whole buffer.
    pub size: Option<bst::BufferAddress>,
}

#[derive(Clone, Debug)]
pub enum BindingResource<'a> {
    Buffer(BufferBinding<'a>),
    Sampler(&'a Fallible<Sampler>),
    TextureView(&'a Fallible<TextureView>),
}

/// An element of a [`BindGroupDescriptor`], consisting of a bindable resource
/// and the slot to bind it to.
#[derive(Clone, Debug)]
pub struct BindGroupEntry<'a> {
    /// Slot for which binding provides resource. Corresponds to an entry of the same
    /// binding index in the [`BindGroupLayoutDescriptor`].
    pub binding: u32,
    /// Resource to attach to the binding
    pub resource: BindingResource<'a>,
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum BindError {
    #[error(
        "{bind_group} {group} expects {expected} dynamic offset{s0}. However {actual} dynamic offset{s1} were provided.",
        s0 = if *.expected >= 2 { "s" } else { "" },
        s1 = if *.actual >= 2 { "s" } else { "" },
    )]
    MismatchedDynamicOffsetCount {
        bind_group: ResourceErrorIdent,
        group: u32,
        actual: usize,
        expected: usize,
    },
    #[error(
        "Dynamic binding index {idx} (targeting {bind_group} {group}, binding {binding}) with value {offset}, does not respect device's requested `{limit_name}` limit: {alignment}"
    )]
    UnalignedDynamicBinding {
        bind_group: ResourceErrorIdent,
        idx: usize,
        group: u32,
        binding: u32,
        offset: bst::DynamicOffset,
        alignment: u32,
        limit_name: &'static str,
    },
    #[error(
        "Dynamic binding offset index {idx} with offset {offset} would overrun the buffer bound to {bind_group} {group} -> binding {binding}. \
         Buffer size is {buffer_size} bytes, the binding binds bytes {binding_range:?}"
    )]
    DynamicBindingOutOfBounds {
        bind_group: ResourceErrorIdent,
        idx: usize,
        group: u32,
        binding: u32,
        offset: bst::DynamicOffset,
        buffer_size: bst::BufferAddress,
        binding_range: Range<bst::BufferAddress>,
    },
}

impl ErrorClass for BindError {}

/// What finish-time validation needs to know about one dynamic binding.
#[derive(Clone, Debug)]
pub struct BindGroupDynamicBindingData {
    /// The index of the binding.
    pub(crate) binding_idx: u32,
    /// The size of the buffer.
    pub(crate) buffer_size: bst::BufferAddress,
    /// The range that the binding covers before any dynamic offset.
    pub(crate) binding_range: Range<bst::BufferAddress>,
    /// The binding type.
    pub(crate) binding_type: bst::BufferBindingType,
}

impl BindGroupDynamicBindingData {
    /// Whether `offset` keeps the binding inside the buffer.
    fn fits(&self, offset: bst::DynamicOffset) -> bool {
        self.binding_range
            .end
            .checked_add(offset)
            .map_or(false, |end| end <= self.buffer_size)
    }
}

#[derive(Debug)]
pub struct BindGroup {
    pub(crate) device: Arc<Device>,
    pub(crate) layout: Arc<BindGroupLayout>,
    pub(crate) label: String,
    pub(crate) used_buffers: Vec<Arc<Buffer>>,
    pub(crate) used_texture_views: Vec<Arc<TextureView>>,
    pub(crate) used_samplers: Vec<Arc<Sampler>>,
    pub(crate) dynamic_binding_info: Vec<BindGroupDynamicBindingData>,
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl BindGroup {
    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }

    /// Buffers referenced by this bind group.
    pub fn buffers(&self) -> &[Arc<Buffer>] {
        &self.used_buffers
    }

    /// Validates the dynamic offsets passed to `set_bind_group` at slot
    /// `bind_group_index` against the bindings of this group.
    ///
    /// Offsets apply to the dynamic bindings in increasing binding order.
    pub(crate) fn validate_dynamic_bindings(
        &self,
        bind_group_index: u32,
        offsets: &[bst::DynamicOffset],
        limits: &bst::Limits,
    ) -> Result<(), BindError> {
        if self.dynamic_binding_info.len() != offsets.len() {
            return Err(BindError::MismatchedDynamicOffsetCount {
                bind_group: self.error_ident(),
                group: bind_group_index,
                expected: self.dynamic_binding_info.len(),
                actual: offsets.len(),
            });
        }

        for (idx, (info, &offset)) in self
            .dynamic_binding_info
            .iter()
            .zip(offsets.iter())
            .enumerate()
        {
            let (alignment, limit_name) = buffer_binding_type_alignment(limits, info.binding_type);
            if !is_aligned(offset, alignment as u64) {
                return Err(BindError::UnalignedDynamicBinding {
                    bind_group: self.error_ident(),
                    group: bind_group_index,
                    binding: info.binding_idx,
                    idx,
                    offset,
                    alignment,
                    limit_name,
                });
            }

            if !info.fits(offset) {
                return Err(BindError::DynamicBindingOutOfBounds {
                    bind_group: self.error_ident(),
                    group: bind_group_index,
                    binding: info.binding_idx,
                    idx,
                    offset,
                    buffer_size: info.buffer_size,
                    binding_range: info.binding_range.clone(),
                });
            }
        }

        Ok(())
    }
}

crate::impl_resource_type!(BindGroup);
crate::impl_labeled!(BindGroup);
crate::impl_parent_device!(BindGroup);

/// Returns the alignment required for offsets of a buffer binding of type
/// `binding_type`, and the name of the limit it comes from.
pub(crate) fn buffer_binding_type_alignment(
    limits: &bst::Limits,
    binding_type: bst::BufferBindingType,
) -> (u32, &'static str) {
    match binding_type {
        bst::BufferBindingType::Uniform => (
            limits.min_uniform_buffer_offset_alignment,
            "min_uniform_buffer_offset_alignment",
        ),
        bst::BufferBindingType::Storage { .. } => (
            limits.min_storage_buffer_offset_alignment,
            "min_storage_buffer_offset_alignment",
        ),
    }
}
