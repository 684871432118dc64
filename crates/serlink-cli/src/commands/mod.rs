//! CLI command implementations.

pub mod attach;
pub mod bringup;
pub mod formats;
pub mod validate;
