//! Utilitary math functions.

use std::ops::Rem;

/// Returns true if `value` is a multiple of `alignment`.
///
/// # Examples
///
/// ```
/// # use bindstate_types::math::is_aligned;
/// assert!(is_aligned(512u64, 256));
/// assert!(is_aligned(0u64, 256));
/// assert!(!is_aligned(128u64, 256));
/// ```
pub fn is_aligned<T>(value: T, alignment: T) -> bool
where
    T: Copy + Default + PartialEq<T> + Rem<Output = T>,
{
    value % alignment == T::default()
}
