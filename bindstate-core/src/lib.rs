/*! This library implements the binding core of an explicit GPU API: the bind
 *  group model, pipeline layout compatibility, command recording with
 *  finish-time validation, and the dirty-state tracker that replays recorded
 *  passes onto a backend with the minimal number of bind calls.
 */

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![allow(
    // It is much clearer to assert negative conditions with eq! false
    clippy::bool_assert_comparison,
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
    // No need for defaults in the internal types.
    clippy::new_without_default,
    // Needless updates are more scaleable, easier to play with features.
    clippy::needless_update,
    // Clashes with clippy::pattern_type_mismatch
    clippy::needless_borrowed_reference,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_op_in_unsafe_fn,
    unused_extern_crates,
    unused_qualifications,
)]

pub mod binding_model;
pub mod command;
pub mod device;
pub mod error;
pub mod hal;
mod hash_utils;
pub mod pipeline;
mod pool;
pub mod resource;
pub mod track;

pub use bst::{
    MAX_BIND_GROUPS, MAX_BINDINGS_PER_GROUP, MAX_DYNAMIC_STORAGE_BUFFER_COUNT,
    MAX_DYNAMIC_UNIFORM_BUFFER_COUNT, MIN_DYNAMIC_BUFFER_OFFSET_ALIGNMENT,
};

pub(crate) use hash_utils::*;

use std::borrow::Cow;

/// The index of a queue submission.
pub type SubmissionIndex = u64;

pub type Label<'a> = Option<Cow<'a, str>>;

trait LabelHelpers<'a> {
    fn borrow_option(&'a self) -> Option<&'a str>;
    fn borrow_or_default(&'a self) -> &'a str;
}
impl<'a> LabelHelpers<'a> for Label<'a> {
    fn borrow_option(&'a self) -> Option<&'a str> {
        self.as_ref().map(|cow| cow.as_ref())
    }
    fn borrow_or_default(&'a self) -> &'a str {
        self.borrow_option().unwrap_or_default()
    }
}

/// Logs the creation and destruction of resources.
///
/// Kept at trace level; a busy application creates bind groups every frame.
macro_rules! resource_log {
    ($($arg:tt)+) => (log::trace!($($arg)+))
}
pub(crate) use resource_log;
