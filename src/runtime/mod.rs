//! Runtime layer: runs transaction scripts against chain state.
//!
//! - [`runtime_vm`]: [`RuntimeVM`], the entry point for one execution
//! - [`host`]: [`RuntimeEnv`], gas limits, context loading and native dispatch
//! - [`extcalls`]: the `EXTCALL` table
//! - [`chain`]: read-only chain and oracle views, emitted events

pub mod chain;
pub mod extcalls;
pub mod host;
pub mod runtime_vm;

pub use chain::{ChainReader, Event, OracleReader, StaticChain, StaticOracle};
pub use host::RuntimeEnv;
pub use runtime_vm::{ENTRY_CONTEXT_NAME, RuntimeVM};
