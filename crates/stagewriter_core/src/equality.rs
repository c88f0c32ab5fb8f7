//! Equality-keyed slice helpers.
//!
//! # Responsibility
//! - Describe entity identity through a caller-supplied predicate.
//! - Provide linear-scan membership and removal over plain slices.
//!
//! # Invariants
//! - The predicate is expected to be an equivalence relation.
//! - Helpers never reorder the elements they keep.

/// Boxed identity predicate shared by every bucket of one writer.
pub type Equality<T> = Box<dyn Fn(&T, &T) -> bool>;

/// Returns whether any element of `values` is equal to `probe`.
pub fn contains<T>(values: &[T], probe: &T, eq: &dyn Fn(&T, &T) -> bool) -> bool {
    values.iter().any(|value| eq(probe, value))
}

/// Returns the elements of `values` that are NOT equal to `probe`.
///
/// Every equal element is dropped, not only the first one.
pub fn filter_out<T: Clone>(values: &[T], probe: &T, eq: &dyn Fn(&T, &T) -> bool) -> Vec<T> {
    values
        .iter()
        .filter(|value| !eq(probe, *value))
        .cloned()
        .collect()
}

/// In-place variant of [`filter_out`]. Returns how many elements were removed.
pub fn remove_all<T>(values: &mut Vec<T>, probe: &T, eq: &dyn Fn(&T, &T) -> bool) -> usize {
    let before = values.len();
    values.retain(|value| !eq(probe, value));
    before - values.len()
}

/// Removes every element equal to `probe` and returns them in order.
pub fn take_all<T>(values: &mut Vec<T>, probe: &T, eq: &dyn Fn(&T, &T) -> bool) -> Vec<T> {
    let (taken, kept): (Vec<T>, Vec<T>) = std::mem::take(values)
        .into_iter()
        .partition(|value| eq(probe, value));
    *values = kept;
    taken
}
