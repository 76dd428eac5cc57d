//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{collapse_whitespace, format_elapsed, truncate_string};
