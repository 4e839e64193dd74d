//! Deterministic contract virtual machine.
//!
//! Provides the bytecode engine, versioned gas metering, contract storage
//! collections, native contract dispatch and the chain-facing runtime.

pub mod config;
pub mod contract;
pub mod runtime;
pub mod storage;
pub mod types;
pub mod utils;
pub mod virtual_machine;
