//! CLI command implementations.

pub mod keys;
pub mod scenario;
pub mod simulate;
