//! Shared utilities.

pub mod hex;
pub mod log;
