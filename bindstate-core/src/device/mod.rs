use crate::{error::ErrorClass, resource::ResourceErrorIdent, Label};

use thiserror::Error;

use std::fmt;

pub mod bgl;
mod error_scope;
pub mod queue;
pub mod resource;

pub use error_scope::{PopErrorScopeError, UncapturedErrorHandler};
pub use queue::{Queue, QueueSubmitError};
pub use resource::Device;

pub type DeviceDescriptor<'a> = bst::DeviceDescriptor<Label<'a>>;

#[derive(Clone, Debug)]
pub struct DeviceMismatch {
    pub(super) res: ResourceErrorIdent,
    pub(super) res_device: ResourceErrorIdent,
    pub(super) target: Option<ResourceErrorIdent>,
    pub(super) target_device: ResourceErrorIdent,
}

impl fmt::Display for DeviceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "{} of {} doesn't match {}",
            self.res_device, self.res, self.target_device
        )?;
        if let Some(target) = self.target.as_ref() {
            write!(f, " of {target}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DeviceMismatch {}

impl ErrorClass for DeviceMismatch {}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum RequestDeviceError {
    #[error("Limit '{name}' value {requested} is better than allowed {allowed}")]
    LimitsExceeded {
        name: &'static str,
        requested: u64,
        allowed: u64,
    },
    #[error("Limit '{name}' value {value} must be a power of two")]
    UnalignedLimit { name: &'static str, value: u32 },
}

impl ErrorClass for RequestDeviceError {}

/// Checks requested limits against what this implementation supports.
pub(crate) fn check_limits(limits: &bst::Limits) -> Result<(), RequestDeviceError> {
    fn check_max(
        name: &'static str,
        requested: impl Into<u64>,
        allowed: impl Into<u64>,
    ) -> Result<(), RequestDeviceError> {
        let (requested, allowed) = (requested.into(), allowed.into());
        if requested > allowed {
            Err(RequestDeviceError::LimitsExceeded {
                name,
                requested,
                allowed,
            })
        } else {
            Ok(())
        }
    }

    fn check_alignment(name: &'static str, value: u32) -> Result<(), RequestDeviceError> {
        if value.is_power_of_two() {
            Ok(())
        } else {
            Err(RequestDeviceError::UnalignedLimit { name, value })
        }
    }

    check_max(
        "max_bind_groups",
        limits.max_bind_groups,
        bst::MAX_BIND_GROUPS as u64,
    )?;
    check_max(
        "max_bindings_per_bind_group",
        limits.max_bindings_per_bind_group,
        bst::MAX_BINDINGS_PER_GROUP as u64,
    )?;
    check_max(
        "max_dynamic_uniform_buffers_per_pipeline_layout",
        limits.max_dynamic_uniform_buffers_per_pipeline_layout,
        bst::MAX_DYNAMIC_UNIFORM_BUFFER_COUNT,
    )?;
    check_max(
        "max_dynamic_storage_buffers_per_pipeline_layout",
        limits.max_dynamic_storage_buffers_per_pipeline_layout,
        bst::MAX_DYNAMIC_STORAGE_BUFFER_COUNT,
    )?;
    check_alignment(
        "min_uniform_buffer_offset_alignment",
        limits.min_uniform_buffer_offset_alignment,
    )?;
    check_alignment(
        "min_storage_buffer_offset_alignment",
        limits.min_storage_buffer_offset_alignment,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_supported() {
        check_limits(&bst::Limits::default()).unwrap();
        check_limits(&bst::Limits::downlevel_defaults()).unwrap();
    }

    #[test]
    fn limits_above_maximum() {
        let limits = bst::Limits {
            max_bind_groups: bst::MAX_BIND_GROUPS as u32 + 1,
            ..Default::default()
        };
        assert!(matches!(
            check_limits(&limits),
            Err(RequestDeviceError::LimitsExceeded {
                name: "max_bind_groups",
                ..
            })
        ));

        let limits = bst::Limits {
            max_dynamic_storage_buffers_per_pipeline_layout: bst::MAX_DYNAMIC_STORAGE_BUFFER_COUNT
                + 1,
            ..Default::default()
        };
        assert!(check_limits(&limits).is_err());
    }

    #[test]
    fn alignment_must_be_power_of_two() {
        let limits = bst::Limits {
            min_storage_buffer_offset_alignment: 96,
            ..Default::default()
        };
        assert!(matches!(
            check_limits(&limits),
            Err(RequestDeviceError::UnalignedLimit { value: 96, .. })
        ));
    }
}
