use std::sync::Arc;

use thiserror::Error;

use crate::error::{Error, ErrorClass, ErrorType};

/// Receives the errors no error scope captured.
pub type UncapturedErrorHandler = dyn Fn(Error) + Send + Sync + 'static;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PopErrorScopeError {
    #[error("Tried to pop an error scope, but there are none")]
    EmptyStack,
}

impl ErrorClass for PopErrorScopeError {}

#[derive(Debug)]
struct ErrorScope {
    filter: bst::ErrorFilter,
    error: Option<Error>,
}

pub(super) struct ErrorSink {
    scopes: Vec<ErrorScope>,
    uncaptured_handler: Arc<UncapturedErrorHandler>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            uncaptured_handler: Arc::new(default_error_handler),
        }
    }

    pub fn push(&mut self, filter: bst::ErrorFilter) {
        self.scopes.push(ErrorScope {
            filter,
            error: None,
        });
    }

    pub fn pop(&mut self) -> Result<Option<Error>, PopErrorScopeError> {
        let scope = self.scopes.pop().ok_or(PopErrorScopeError::EmptyStack)?;
        Ok(scope.error)
    }

    pub fn set_uncaptured_handler(&mut self, handler: Arc<UncapturedErrorHandler>) {
        self.uncaptured_handler = handler;
    }

    /// Hands `error` to the innermost scope with a matching filter.
    ///
    /// If no scope matches, returns the uncaptured error handler, which the
    /// caller invokes once the sink is unlocked. Internal errors are fatal:
    /// every open scope without an error records them, whatever its filter,
    /// and they are handed to the uncaptured error handler as well.
    pub fn capture(&mut self, error: Error) -> Option<(Arc<UncapturedErrorHandler>, Error)> {
        let ty = error.error_type();
        if ty == ErrorType::Internal {
            for scope in self.scopes.iter_mut().rev() {
                if scope.error.is_none() {
                    scope.error = Some(error.clone());
                }
            }
            return Some((self.uncaptured_handler.clone(), error));
        }

        match self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| ty.matches(scope.filter))
        {
            Some(scope) => {
                // Only the first error of a scope is kept.
                if scope.error.is_none() {
                    scope.error = Some(error);
                }
                None
            }
            None => Some((self.uncaptured_handler.clone(), error)),
        }
    }
}

fn default_error_handler(err: Error) {
    log::error!("Handling bindstate errors as fatal by default");
    log::error!("{}: {}", err.error_type(), err);
}
