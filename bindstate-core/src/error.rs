//! Error classification and reporting.
//!
//! Every fallible operation returns a typed error. When an operation reports
//! through the device instead, the typed error is classified with
//! [`ErrorClass`] and wrapped into an [`Error`], which is what error scopes and
//! the uncaptured error handler receive.

use std::{error::Error as StdError, fmt, sync::Arc};

/// Coarse category of an error, used to route it to an error scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The API was used incorrectly.
    Validation,
    /// An allocation failed.
    OutOfMemory,
    /// Something went wrong that is not the caller's fault.
    Internal,
}

impl ErrorType {
    pub(crate) fn matches(self, filter: bst::ErrorFilter) -> bool {
        match (self, filter) {
            (Self::Validation, bst::ErrorFilter::Validation)
            | (Self::OutOfMemory, bst::ErrorFilter::OutOfMemory)
            | (Self::Internal, bst::ErrorFilter::Internal) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Validation => "Validation Error",
            Self::OutOfMemory => "Out of Memory",
            Self::Internal => "Internal Error",
        })
    }
}

/// Implemented by every error enum of the crate.
pub trait ErrorClass: StdError + Send + Sync + 'static {
    fn error_type(&self) -> ErrorType {
        ErrorType::Validation
    }
}

/// An error as delivered to error scopes and the uncaptured error handler.
#[derive(Clone)]
pub struct Error {
    ty: ErrorType,
    description: String,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub fn new<E: ErrorClass>(error: E) -> Self {
        Self {
            ty: error.error_type(),
            description: format_error(&error),
            source: Some(Arc::new(error)),
        }
    }

    /// An error with no typed source, as produced by `Device::inject_error`.
    pub fn from_message(ty: ErrorType, message: impl Into<String>) -> Self {
        Self {
            ty,
            description: message.into(),
            source: None,
        }
    }

    pub fn error_type(&self) -> ErrorType {
        self.ty
    }

    /// Human readable description, including the chain of causes.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the typed error this was created from, if it is an `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("ty", &self.ty)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Formats an error and the chain of its sources, one per line.
pub fn format_error(err: &(dyn StdError + 'static)) -> String {
    let mut descriptions = vec![format_error_line(err)];

    let mut source_opt = err.source();
    while let Some(source) = source_opt {
        descriptions.push(format_error_line(source));
        source_opt = source.source();
    }

    format!("Caused by:\n{}", descriptions.join(""))
}

fn format_error_line(err: &dyn fmt::Display) -> String {
    format!("    {err}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: Inner,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("inner failure")]
    struct Inner;

    impl ErrorClass for Outer {}

    #[test]
    fn description_walks_sources() {
        let error = Error::new(Outer { inner: Inner });
        assert_eq!(error.error_type(), ErrorType::Validation);
        assert_eq!(
            error.description(),
            "Caused by:\n    outer failure\n    inner failure\n"
        );
        assert!(error.downcast_ref::<Outer>().is_some());
        assert!(error.downcast_ref::<Inner>().is_none());
    }

    #[test]
    fn filters() {
        assert!(ErrorType::Validation.matches(bst::ErrorFilter::Validation));
        assert!(!ErrorType::Validation.matches(bst::ErrorFilter::OutOfMemory));
        assert!(ErrorType::Internal.matches(bst::ErrorFilter::Internal));
    }
}
