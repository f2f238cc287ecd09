//! Formatting helpers.

use std::fmt;

/// Wrapper rendering a `Display` value through `Debug`, for use inside
/// `debug_struct` builders.
pub struct DisplayToDebug<T>(pub T);

impl<T: fmt::Display> fmt::Debug for DisplayToDebug<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
