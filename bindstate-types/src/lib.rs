/*! This library describes the API surface of the bindstate binding core that is
 *  agnostic of the backend: limits, flag sets, binding kinds and descriptors.
 */

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
)]
#![warn(missing_docs, unsafe_op_in_unsafe_fn)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod assertions;
pub mod math;

// Plain `Serialize`/`Deserialize` derives on bitflags would reject unknown
// bits on deserialization. We want deserialization to succeed and the
// unknown bits to be reported by bindstate-core validation instead.
macro_rules! impl_bitflags {
    ($name:ident) => {
        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.bits().serialize(serializer)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = <_ as serde::Deserialize<'de>>::deserialize(deserializer)?;
                Ok($name::from_bits_retain(value))
            }
        }

        impl $name {
            /// Returns true if the bitflags contains bits that are not part of
            /// the bitflags definition.
            pub fn contains_invalid_bits(&self) -> bool {
                let all = Self::all().bits();
                (self.bits() | all) != all
            }
        }
    };
}

/// Integral type used for buffer offsets and sizes.
pub type BufferAddress = u64;
/// Integral type used for dynamic bind group offsets.
///
/// Offsets are always 64-bit at the API boundary. Backends narrow them to
/// their native width when the offsets are applied.
pub type DynamicOffset = u64;

/// Maximum number of bind groups a pipeline layout can hold.
///
/// Per-slot state is stored in fixed arrays of this size, and the slot masks
/// are `u8`, so this can never exceed 8.
pub const MAX_BIND_GROUPS: usize = 4;
/// Maximum number of bindings in a single bind group layout. Binding indices
/// must be strictly below this value.
pub const MAX_BINDINGS_PER_GROUP: usize = 16;
/// Maximum number of dynamic uniform buffers in a pipeline layout.
pub const MAX_DYNAMIC_UNIFORM_BUFFER_COUNT: u32 = 8;
/// Maximum number of dynamic storage buffers in a pipeline layout.
pub const MAX_DYNAMIC_STORAGE_BUFFER_COUNT: u32 = 4;
/// Default alignment of buffer binding offsets and dynamic offsets.
pub const MIN_DYNAMIC_BUFFER_OFFSET_ALIGNMENT: u32 = 256;

const _: () = assert!(MAX_BIND_GROUPS <= 8);

/// Represents the sets of limits a device supports.
///
/// Limits are injected into a device at creation time and drive every
/// validation decision that depends on a number: binding indices, dynamic
/// buffer counts, offset alignments and buffer sizes. None of the values may
/// exceed the compile-time maxima ([`MAX_BIND_GROUPS`],
/// [`MAX_BINDINGS_PER_GROUP`], [`MAX_DYNAMIC_UNIFORM_BUFFER_COUNT`] and
/// [`MAX_DYNAMIC_STORAGE_BUFFER_COUNT`]).
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct Limits {
    /// Amount of bind groups that can be attached to a pipeline at the same time. Defaults to 4. Higher is "better".
    pub max_bind_groups: u32,
    /// Binding indices in `create_bind_group_layout` must be lower than this. Defaults to 16.
    pub max_bindings_per_bind_group: u32,
    /// Amount of uniform buffer bindings that can be dynamic in a single pipeline. Defaults to 8. Higher is "better".
    pub max_dynamic_uniform_buffers_per_pipeline_layout: u32,
    /// Amount of storage buffer bindings that can be dynamic in a single pipeline. Defaults to 4. Higher is "better".
    pub max_dynamic_storage_buffers_per_pipeline_layout: u32,
    /// Amount of sampled textures visible in a single shader stage. Defaults to 16. Higher is "better".
    pub max_sampled_textures_per_shader_stage: u32,
    /// Amount of samplers visible in a single shader stage. Defaults to 16. Higher is "better".
    pub max_samplers_per_shader_stage: u32,
    /// Amount of storage buffers visible in a single shader stage. Defaults to 8. Higher is "better".
    pub max_storage_buffers_per_shader_stage: u32,
    /// Amount of storage textures visible in a single shader stage. Defaults to 4. Higher is "better".
    pub max_storage_textures_per_shader_stage: u32,
    /// Amount of uniform buffers visible in a single shader stage. Defaults to 12. Higher is "better".
    pub max_uniform_buffers_per_shader_stage: u32,
    /// Maximum size in bytes of a binding to a uniform buffer. Defaults to 64 KB. Higher is "better".
    pub max_uniform_buffer_binding_size: u32,
    /// Maximum size in bytes of a binding to a storage buffer. Defaults to 128 MB. Higher is "better".
    pub max_storage_buffer_binding_size: u32,
    /// A limit above which buffer creation fails. Defaults to 256 MB.
    pub max_buffer_size: u64,
    /// Required alignment of `BufferBinding::offset` for uniform buffer bindings,
    /// and of the dynamic offsets supplied for them. Defaults to 256. Lower is "better".
    pub min_uniform_buffer_offset_alignment: u32,
    /// Required alignment of `BufferBinding::offset` for storage buffer bindings,
    /// and of the dynamic offsets supplied for them. Defaults to 256. Lower is "better".
    pub min_storage_buffer_offset_alignment: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_bind_groups: MAX_BIND_GROUPS as u32,
            max_bindings_per_bind_group: MAX_BINDINGS_PER_GROUP as u32,
            max_dynamic_uniform_buffers_per_pipeline_layout: MAX_DYNAMIC_UNIFORM_BUFFER_COUNT,
            max_dynamic_storage_buffers_per_pipeline_layout: MAX_DYNAMIC_STORAGE_BUFFER_COUNT,
            max_sampled_textures_per_shader_stage: 16,
            max_samplers_per_shader_stage: 16,
            max_storage_buffers_per_shader_stage: 8,
            max_storage_textures_per_shader_stage: 4,
            max_uniform_buffers_per_shader_stage: 12,
            max_uniform_buffer_binding_size: 64 << 10,
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 1 << 28,
            min_uniform_buffer_offset_alignment: MIN_DYNAMIC_BUFFER_OFFSET_ALIGNMENT,
            min_storage_buffer_offset_alignment: MIN_DYNAMIC_BUFFER_OFFSET_ALIGNMENT,
        }
    }
}

impl Limits {
    /// These default limits are guaranteed to be compatible with GLES-3.1, and D3D11
    pub fn downlevel_defaults() -> Self {
        Self {
            max_storage_buffers_per_shader_stage: 4,
            max_uniform_buffer_binding_size: 16 << 10,
            ..Self::default()
        }
    }
}

bitflags::bitflags! {
    /// Device-level switches that alter validation behavior.
    ///
    /// Toggles are passed explicitly in [`DeviceDescriptor`] rather than read
    /// from any global state.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct Toggles: u32 {
        /// Skip bind group compatibility and dynamic offset validation when a
        /// command encoder is finished. Invalid objects are still rejected.
        const SKIP_VALIDATION = 1 << 0;
    }
}

impl_bitflags!(Toggles);

/// Describes a device.
#[derive(Clone, Debug, Default)]
pub struct DeviceDescriptor<L> {
    /// Debug label for the device.
    pub label: L,
    /// The limits the device must respect.
    pub limits: Limits,
    /// Validation switches.
    pub toggles: Toggles,
}

bitflags::bitflags! {
    /// Describes the shader stages that a binding will be visible from.
    ///
    /// These can be combined so something that is visible from both vertex and fragment shaders can be defined as:
    ///
    /// `ShaderStages::VERTEX | ShaderStages::FRAGMENT`
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Binding is not visible from any shader stage.
        const NONE = 0;
        /// Binding is visible from the vertex shader of a render pipeline.
        const VERTEX = 1 << 0;
        /// Binding is visible from the fragment shader of a render pipeline.
        const FRAGMENT = 1 << 1;
        /// Binding is visible from the compute shader of a compute pipeline.
        const COMPUTE = 1 << 2;
        /// Binding is visible from the vertex and fragment shaders of a render pipeline.
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl_bitflags!(ShaderStages);

bitflags::bitflags! {
    /// Different ways that you can use a buffer.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        /// Allow a buffer to be mapped for reading.
        const MAP_READ = 1 << 0;
        /// Allow a buffer to be mapped for writing.
        const MAP_WRITE = 1 << 1;
        /// Allow a buffer to be the source of a copy.
        const COPY_SRC = 1 << 2;
        /// Allow a buffer to be the destination of a copy.
        const COPY_DST = 1 << 3;
        /// Allow a buffer to be the index buffer in a draw operation.
        const INDEX = 1 << 4;
        /// Allow a buffer to be the vertex buffer in a draw operation.
        const VERTEX = 1 << 5;
        /// Allow a buffer to be a [`BufferBindingType::Uniform`] inside a bind group.
        const UNIFORM = 1 << 6;
        /// Allow a buffer to be a [`BufferBindingType::Storage`] inside a bind group.
        const STORAGE = 1 << 7;
        /// Allow a buffer to be the indirect buffer in an indirect draw call.
        const INDIRECT = 1 << 8;
    }
}

impl_bitflags!(BufferUsages);

bitflags::bitflags! {
    /// Different ways that you can use a texture.
    #[repr(transparent)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u32 {
        /// Allows a texture to be the source of a copy.
        const COPY_SRC = 1 << 0;
        /// Allows a texture to be the destination of a copy.
        const COPY_DST = 1 << 1;
        /// Allows a texture to be a [`BindingType::Texture`] in a bind group.
        const SAMPLED = 1 << 2;
        /// Allows a texture to be a [`BindingType::StorageTexture`] in a bind group.
        const STORAGE = 1 << 3;
        /// Allows a texture to be an output attachment of a render pass.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

impl_bitflags!(TextureUsages);

/// Specific type of a buffer binding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BufferBindingType {
    /// A uniform buffer. The buffer must have [`BufferUsages::UNIFORM`].
    Uniform,
    /// A storage buffer. The buffer must have [`BufferUsages::STORAGE`].
    Storage {
        /// If `true`, the buffer can only be read in the shader.
        read_only: bool,
    },
}

impl BufferBindingType {
    /// The usage a buffer needs to be bound with this binding type.
    pub fn required_usage(self) -> BufferUsages {
        match self {
            Self::Uniform => BufferUsages::UNIFORM,
            Self::Storage { .. } => BufferUsages::STORAGE,
        }
    }
}

/// Type of the values read from a texture in a shader.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextureComponentType {
    /// Sampling returns floats.
    Float,
    /// Sampling returns signed integers.
    Sint,
    /// Sampling returns unsigned integers.
    Uint,
}

/// Dimensionality of a texture.
#[repr(C)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextureDimension {
    /// 1D texture
    #[cfg_attr(feature = "serde", serde(rename = "1d"))]
    D1,
    /// 2D texture
    #[cfg_attr(feature = "serde", serde(rename = "2d"))]
    D2,
    /// 3D texture
    #[cfg_attr(feature = "serde", serde(rename = "3d"))]
    D3,
}

/// Dimensions of a particular texture view.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextureViewDimension {
    /// A one dimensional texture.
    #[cfg_attr(feature = "serde", serde(rename = "1d"))]
    D1,
    /// A two dimensional texture.
    #[cfg_attr(feature = "serde", serde(rename = "2d"))]
    #[default]
    D2,
    /// A two dimensional array texture.
    #[cfg_attr(feature = "serde", serde(rename = "2d-array"))]
    D2Array,
    /// A cubemap texture.
    #[cfg_attr(feature = "serde", serde(rename = "cube"))]
    Cube,
    /// A cubemap array texture.
    #[cfg_attr(feature = "serde", serde(rename = "cube-array"))]
    CubeArray,
    /// A three dimensional texture.
    #[cfg_attr(feature = "serde", serde(rename = "3d"))]
    D3,
}

impl TextureViewDimension {
    /// Get the texture dimension required of this texture view dimension.
    pub fn compatible_texture_dimension(self) -> TextureDimension {
        match self {
            Self::D1 => TextureDimension::D1,
            Self::D2 | Self::D2Array | Self::Cube | Self::CubeArray => TextureDimension::D2,
            Self::D3 => TextureDimension::D3,
        }
    }
}

/// Underlying texture data format.
///
/// Only the formats needed to exercise component type validation are listed.
#[repr(C)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextureFormat {
    /// Red channel only. 8 bit integer per channel. [0, 255] converted to/from float [0, 1] in shader.
    R8Unorm,
    /// Red channel only. 8 bit integer per channel. Unsigned in shader.
    R8Uint,
    /// Red channel only. 8 bit integer per channel. Signed in shader.
    R8Sint,
    /// Red, green, blue, and alpha channels. 8 bit integer per channel. [0, 255] converted to/from float [0, 1] in shader.
    Rgba8Unorm,
    /// Red, green, blue, and alpha channels. 8 bit integer per channel. Unsigned in shader.
    Rgba8Uint,
    /// Red, green, blue, and alpha channels. 8 bit integer per channel. Signed in shader.
    Rgba8Sint,
    /// Red channel only. 32 bit float per channel. Float in shader.
    R32Float,
    /// Red, green, blue, and alpha channels. 32 bit float per channel. Float in shader.
    Rgba32Float,
    /// Special depth format with 32 bit floating point depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns the type of the values a shader reads from a texture of this format.
    pub fn component_type(self) -> TextureComponentType {
        match self {
            Self::R8Uint | Self::Rgba8Uint => TextureComponentType::Uint,
            Self::R8Sint | Self::Rgba8Sint => TextureComponentType::Sint,
            Self::R8Unorm
            | Self::Rgba8Unorm
            | Self::R32Float
            | Self::Rgba32Float
            | Self::Depth32Float => TextureComponentType::Float,
        }
    }
}

/// Specific type of a binding.
///
/// For use in [`BindGroupLayoutEntry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BindingType {
    /// A buffer binding.
    Buffer {
        /// Sub-type of the buffer binding.
        ty: BufferBindingType,
        /// Indicates that the binding has a dynamic offset.
        ///
        /// One offset must be passed to `set_bind_group` for each dynamic
        /// binding in increasing order of binding number.
        #[cfg_attr(feature = "serde", serde(default))]
        has_dynamic_offset: bool,
    },
    /// A sampler that can be used to sample a texture.
    Sampler,
    /// A texture binding, read through a sampler.
    Texture {
        /// Type of the values the shader reads from the texture.
        component_type: TextureComponentType,
        /// Dimension of the texture view that is going to be sampled.
        view_dimension: TextureViewDimension,
        /// True if the texture has a sample count greater than 1.
        multisampled: bool,
    },
    /// A storage texture.
    StorageTexture {
        /// Dimension of the texture view that is going to be accessed.
        view_dimension: TextureViewDimension,
    },
}

impl BindingType {
    /// Returns true for buffer bindings with dynamic offset enabled.
    pub fn has_dynamic_offset(&self) -> bool {
        match *self {
            Self::Buffer {
                has_dynamic_offset, ..
            } => has_dynamic_offset,
            _ => false,
        }
    }
}

/// Describes a single binding inside a bind group layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BindGroupLayoutEntry {
    /// Binding index. Must match shader index and be unique inside a BindGroupLayout. A binding
    /// of index 1, would be described as `layout(set = 0, binding = 1) uniform` in shaders.
    pub binding: u32,
    /// Which shader stages can see this binding.
    pub visibility: ShaderStages,
    /// The type of the binding
    pub ty: BindingType,
}

/// Describes a buffer.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BufferDescriptor<L> {
    /// Debug label of a buffer.
    pub label: L,
    /// Size of a buffer, in bytes.
    pub size: BufferAddress,
    /// Usages of a buffer. If the buffer is used in any way that isn't specified here, the operation
    /// will fail.
    pub usage: BufferUsages,
}

/// Describes a texture.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextureDescriptor<L> {
    /// Debug label of the texture.
    pub label: L,
    /// Dimensionality of the texture.
    pub dimension: TextureDimension,
    /// Format of the texture.
    pub format: TextureFormat,
    /// Sample count of texture. If this is not 1, texture must have [`BindingType::Texture::multisampled`] set to true.
    pub sample_count: u32,
    /// Allowed usages of the texture.
    pub usage: TextureUsages,
}

/// Describes a sampler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplerDescriptor<L> {
    /// Debug label of the sampler.
    pub label: L,
}

/// Filter for error scopes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorFilter {
    /// Catch only out-of-memory errors.
    OutOfMemory,
    /// Catch only validation errors.
    Validation,
    /// Catch only internal errors.
    Internal,
}
