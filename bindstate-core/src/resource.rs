use crate::{
    device::{Device, DeviceMismatch},
    error::ErrorClass,
    resource_log, Label, LabelHelpers,
};

use thiserror::Error;

use std::{
    borrow::Cow,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Type and label of a resource, used to name it in error messages.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceErrorIdent {
    r#type: Cow<'static, str>,
    label: String,
}

impl fmt::Display for ResourceErrorIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} with '{}' label", self.r#type, self.label)
    }
}

impl ResourceErrorIdent {
    pub fn resource_type(&self) -> &str {
        &self.r#type
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

pub trait ResourceType {
    const TYPE: &'static str;
}

#[macro_export]
macro_rules! impl_resource_type {
    ($ty:ident) => {
        impl $crate::resource::ResourceType for $ty {
            const TYPE: &'static str = stringify!($ty);
        }
    };
}

pub trait Labeled: ResourceType {
    /// Returns the label given at creation. May be empty.
    fn label(&self) -> &str;

    fn error_ident(&self) -> ResourceErrorIdent {
        ResourceErrorIdent {
            r#type: Cow::Borrowed(Self::TYPE),
            label: self.label().to_owned(),
        }
    }
}

#[macro_export]
macro_rules! impl_labeled {
    ($ty:ident) => {
        impl $crate::resource::Labeled for $ty {
            fn label(&self) -> &str {
                &self.label
            }
        }
    };
}

pub(crate) trait ParentDevice: Labeled {
    fn device(&self) -> &Arc<Device>;

    fn same_device_as<O: ParentDevice>(&self, other: &O) -> Result<(), Box<DeviceMismatch>> {
        if Arc::ptr_eq(self.device(), other.device()) {
            Ok(())
        } else {
            Err(Box::new(DeviceMismatch {
                res: self.error_ident(),
                res_device: self.device().error_ident(),
                target: Some(other.error_ident()),
                target_device: other.device().error_ident(),
            }))
        }
    }

    fn same_device(&self, device: &Device) -> Result<(), Box<DeviceMismatch>> {
        if std::ptr::eq(&**self.device(), device) {
            Ok(())
        } else {
            Err(Box::new(DeviceMismatch {
                res: self.error_ident(),
                res_device: self.device().error_ident(),
                target: None,
                target_device: device.error_ident(),
            }))
        }
    }
}

#[macro_export]
macro_rules! impl_parent_device {
    ($ty:ident) => {
        impl $crate::resource::ParentDevice for $ty {
            fn device(&self) -> &Arc<Device> {
                &self.device
            }
        }
    };
}

/// Handle compared by identity rather than by value.
///
/// Bind groups, layouts and pipeline layouts are equal only if they are the
/// same object. Two layouts created from equal descriptors are still distinct
/// unless the device deduplicated them.
pub trait Handle: Clone {
    fn is_same(&self, other: &Self) -> bool;
}

impl<T> Handle for Arc<T> {
    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// The result of creating an object: either the object, or the label of the
/// object whose creation failed.
///
/// An invalid handle can be passed anywhere a valid one can. Every operation
/// using it fails with [`InvalidResourceError`].
#[derive(Debug)]
pub enum Fallible<T: ResourceType> {
    Valid(Arc<T>),
    Invalid(Arc<String>),
}

impl<T: ResourceType> Fallible<T> {
    pub fn get(&self) -> Result<Arc<T>, InvalidResourceError> {
        match *self {
            Fallible::Valid(ref v) => Ok(Arc::clone(v)),
            Fallible::Invalid(ref label) => Err(InvalidResourceError(ResourceErrorIdent {
                r#type: Cow::Borrowed(T::TYPE),
                label: (**label).clone(),
            })),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(*self, Fallible::Valid(_))
    }

    pub(crate) fn invalid(label: &Label) -> Self {
        Fallible::Invalid(Arc::new(label.borrow_or_default().to_string()))
    }
}

impl<T: ResourceType> Clone for Fallible<T> {
    fn clone(&self) -> Self {
        match *self {
            Self::Valid(ref v) => Self::Valid(Arc::clone(v)),
            Self::Invalid(ref label) => Self::Invalid(Arc::clone(label)),
        }
    }
}

impl<T: ResourceType> From<Arc<T>> for Fallible<T> {
    fn from(value: Arc<T>) -> Self {
        Fallible::Valid(value)
    }
}

#[derive(Clone, Debug, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{0} is invalid")]
pub struct InvalidResourceError(pub ResourceErrorIdent);

impl ErrorClass for InvalidResourceError {}

#[derive(Clone, Debug, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("{0} has been destroyed")]
pub struct DestroyedResourceError(pub ResourceErrorIdent);

impl ErrorClass for DestroyedResourceError {}

#[derive(Clone, Debug, Error)]
#[error("Usage flags {actual:?} of {res} do not contain required usage flags {expected:?}")]
pub struct MissingBufferUsageError {
    pub(crate) res: ResourceErrorIdent,
    pub(crate) actual: bst::BufferUsages,
    pub(crate) expected: bst::BufferUsages,
}

#[derive(Clone, Debug, Error)]
#[error("Usage flags {actual:?} of {res} do not contain required usage flags {expected:?}")]
pub struct MissingTextureUsageError {
    pub(crate) res: ResourceErrorIdent,
    pub(crate) actual: bst::TextureUsages,
    pub(crate) expected: bst::TextureUsages,
}

pub type BufferDescriptor<'a> = bst::BufferDescriptor<Label<'a>>;

#[derive(Debug)]
pub struct Buffer {
    pub(crate) device: Arc<Device>,
    pub(crate) usage: bst::BufferUsages,
    pub(crate) size: bst::BufferAddress,
    pub(crate) label: String,
    destroyed: AtomicBool,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl Buffer {
    pub(crate) fn new(
        device: &Arc<Device>,
        desc: &BufferDescriptor,
    ) -> Result<Arc<Self>, CreateBufferError> {
        if desc.usage.is_empty() || desc.usage.contains_invalid_bits() {
            return Err(CreateBufferError::InvalidUsage(desc.usage));
        }
        if desc.size > device.limits.max_buffer_size {
            return Err(CreateBufferError::MaxBufferSize {
                requested: desc.size,
                maximum: device.limits.max_buffer_size,
            });
        }

        Ok(Arc::new(Self {
            device: device.clone(),
            usage: desc.usage,
            size: desc.size,
            label: desc.label.borrow_or_default().to_string(),
            destroyed: AtomicBool::new(false),
        }))
    }

    pub fn size(&self) -> bst::BufferAddress {
        self.size
    }

    pub fn usage(&self) -> bst::BufferUsages {
        self.usage
    }

    /// Marks the buffer as destroyed.
    ///
    /// Command buffers recorded with bind groups referencing it can still be
    /// finished, but submitting them fails.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            log::debug!("Destroy {}", self.error_ident());
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn check_destroyed(&self) -> Result<(), DestroyedResourceError> {
        if self.is_destroyed() {
            Err(DestroyedResourceError(self.error_ident()))
        } else {
            Ok(())
        }
    }

    /// Checks that the given buffer usage contains the required buffer usage,
    /// returns an error otherwise.
    pub(crate) fn check_usage(
        &self,
        expected: bst::BufferUsages,
    ) -> Result<(), MissingBufferUsageError> {
        if self.usage.contains(expected) {
            Ok(())
        } else {
            Err(MissingBufferUsageError {
                res: self.error_ident(),
                actual: self.usage,
                expected,
            })
        }
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreateBufferError {
    #[error("Invalid usage flags {0:?}")]
    InvalidUsage(bst::BufferUsages),
    #[error("Buffer size {requested} is greater than the maximum buffer size ({maximum})")]
    MaxBufferSize { requested: u64, maximum: u64 },
}

impl ErrorClass for CreateBufferError {}

crate::impl_resource_type!(Buffer);
crate::impl_labeled!(Buffer);
crate::impl_parent_device!(Buffer);

pub type TextureDescriptor<'a> = bst::TextureDescriptor<Label<'a>>;

#[derive(Debug)]
pub struct Texture {
    pub(crate) device: Arc<Device>,
    pub(crate) dimension: bst::TextureDimension,
    pub(crate) format: bst::TextureFormat,
    pub(crate) sample_count: u32,
    pub(crate) usage: bst::TextureUsages,
    pub(crate) label: String,
}

impl Drop for Texture {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl Texture {
    pub(crate) fn new(
        device: &Arc<Device>,
        desc: &TextureDescriptor,
    ) -> Result<Arc<Self>, CreateTextureError> {
        if desc.usage.is_empty() || desc.usage.contains_invalid_bits() {
            return Err(CreateTextureError::InvalidUsage(desc.usage));
        }
        if desc.sample_count != 1 && desc.sample_count != 4 {
            return Err(CreateTextureError::InvalidSampleCount(desc.sample_count));
        }
        if desc.sample_count > 1 {
            if desc.dimension != bst::TextureDimension::D2 {
                return Err(CreateTextureError::InvalidMultisampledDimension(
                    desc.dimension,
                ));
            }
            if desc.usage.contains(bst::TextureUsages::STORAGE) {
                return Err(CreateTextureError::InvalidMultisampledStorageBinding);
            }
        }

        Ok(Arc::new(Self {
            device: device.clone(),
            dimension: desc.dimension,
            format: desc.format,
            sample_count: desc.sample_count,
            usage: desc.usage,
            label: desc.label.borrow_or_default().to_string(),
        }))
    }

    pub fn format(&self) -> bst::TextureFormat {
        self.format
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Checks that the given texture usage contains the required texture usage,
    /// returns an error otherwise.
    pub(crate) fn check_usage(
        &self,
        expected: bst::TextureUsages,
    ) -> Result<(), MissingTextureUsageError> {
        if self.usage.contains(expected) {
            Ok(())
        } else {
            Err(MissingTextureUsageError {
                res: self.error_ident(),
                actual: self.usage,
                expected,
            })
        }
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreateTextureError {
    #[error("Invalid usage flags {0:?}")]
    InvalidUsage(bst::TextureUsages),
    #[error("Sample count {0} is not supported, it must be 1 or 4")]
    InvalidSampleCount(u32),
    #[error("Multisampled textures must be 2D, not {0:?}")]
    InvalidMultisampledDimension(bst::TextureDimension),
    #[error("Texture usage STORAGE is not allowed for multisampled textures")]
    InvalidMultisampledStorageBinding,
}

impl ErrorClass for CreateTextureError {}

crate::impl_resource_type!(Texture);
crate::impl_labeled!(Texture);
crate::impl_parent_device!(Texture);

/// Describes a [`TextureView`].
#[derive(Clone, Debug, Default)]
pub struct TextureViewDescriptor<'a> {
    /// Debug label of the texture view.
    pub label: Label<'a>,
    /// The dimension of the texture view. Defaults to the dimension of the
    /// texture.
    pub dimension: Option<bst::TextureViewDimension>,
}

#[derive(Debug)]
pub struct TextureView {
    pub(crate) parent: Arc<Texture>,
    pub(crate) device: Arc<Device>,
    pub(crate) dimension: bst::TextureViewDimension,
    pub(crate) label: String,
}

impl Drop for TextureView {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl TextureView {
    pub(crate) fn new(
        texture: &Arc<Texture>,
        desc: &TextureViewDescriptor,
    ) -> Result<Arc<Self>, CreateTextureViewError> {
        let dimension = match desc.dimension {
            Some(dim) => dim,
            None => match texture.dimension {
                bst::TextureDimension::D1 => bst::TextureViewDimension::D1,
                bst::TextureDimension::D2 => bst::TextureViewDimension::D2,
                bst::TextureDimension::D3 => bst::TextureViewDimension::D3,
            },
        };

        if dimension.compatible_texture_dimension() != texture.dimension {
            return Err(CreateTextureViewError::InvalidTextureViewDimension {
                view: dimension,
                texture: texture.dimension,
            });
        }
        if texture.sample_count > 1 && dimension != bst::TextureViewDimension::D2 {
            return Err(CreateTextureViewError::InvalidMultisampledTextureViewDimension(dimension));
        }

        Ok(Arc::new(Self {
            parent: texture.clone(),
            device: texture.device.clone(),
            dimension,
            label: desc.label.borrow_or_default().to_string(),
        }))
    }

    pub fn dimension(&self) -> bst::TextureViewDimension {
        self.dimension
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.parent
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum CreateTextureViewError {
    #[error(transparent)]
    DeviceMismatch(#[from] Box<DeviceMismatch>),
    #[error(transparent)]
    InvalidResource(#[from] InvalidResourceError),
    #[error("Invalid texture view dimension `{view:?}` with texture of dimension `{texture:?}`")]
    InvalidTextureViewDimension {
        view: bst::TextureViewDimension,
        texture: bst::TextureDimension,
    },
    #[error("Invalid texture view dimension `{0:?}` of a multisampled texture")]
    InvalidMultisampledTextureViewDimension(bst::TextureViewDimension),
}

impl ErrorClass for CreateTextureViewError {}

crate::impl_resource_type!(TextureView);
crate::impl_labeled!(TextureView);
crate::impl_parent_device!(TextureView);

pub type SamplerDescriptor<'a> = bst::SamplerDescriptor<Label<'a>>;

#[derive(Debug)]
pub struct Sampler {
    pub(crate) device: Arc<Device>,
    pub(crate) label: String,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        resource_log!("Drop {}", self.error_ident());
    }
}

impl Sampler {
    pub(crate) fn new(device: &Arc<Device>, desc: &SamplerDescriptor) -> Arc<Self> {
        Arc::new(Self {
            device: device.clone(),
            label: desc.label.borrow_or_default().to_string(),
        })
    }
}

crate::impl_resource_type!(Sampler);
crate::impl_labeled!(Sampler);
crate::impl_parent_device!(Sampler);
