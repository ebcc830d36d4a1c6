use std::ops::Deref;

use rustpython_parser::ast::{Located, Location};

/// A source range, in (row, column) locations as reported by the parser.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Range {
    pub location: Location,
    pub end_location: Location,
}

impl Range {
    pub const fn new(location: Location, end_location: Location) -> Self {
        Self {
            location,
            end_location,
        }
    }

    pub fn from_located<T>(located: &Located<T>) -> Self {
        Range::new(located.location, located.end_location.unwrap_or_default())
    }
}

/// A reference that hashes and compares by pointer identity.
///
/// The semantic index never owns tree nodes; side tables are keyed on the
/// address of the borrowed node, which is stable for the lifetime of the
/// analysis.
#[derive(Debug)]
pub struct RefEquality<'a, T>(pub &'a T);

impl<T> Copy for RefEquality<'_, T> {}

impl<T> Clone for RefEquality<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> std::hash::Hash for RefEquality<'_, T> {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        std::ptr::from_ref(self.0).hash(state);
    }
}

impl<'a, 'b, T> PartialEq<RefEquality<'b, T>> for RefEquality<'a, T> {
    fn eq(&self, other: &RefEquality<'b, T>) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl<T> Eq for RefEquality<'_, T> {}

impl<T> Deref for RefEquality<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}
