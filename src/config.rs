//! Runtime configuration and protocol versioning.
//!
//! Every consensus-relevant behaviour change is gated on the protocol
//! version carried by [`RuntimeConfig`], never toggled silently.

use num_bigint::BigInt;

/// Protocol version a transaction executes under.
pub type ProtocolVersion = u32;

/// First protocol version.
pub const PROTOCOL_VERSION_1: ProtocolVersion = 1;

/// From this version, mutating storage extcalls refuse native and reserved
/// contract names.
pub const DANGEROUS_NAMES_CHECK_VERSION: ProtocolVersion = 2;

/// From this version, opcodes are priced with the second gas table.
pub const GAS_TABLE_V2_VERSION: ProtocolVersion = 3;

/// Latest protocol version this engine understands.
pub const LATEST_PROTOCOL_VERSION: ProtocolVersion = 3;

/// Registers per frame when nothing else is configured.
pub const DEFAULT_REGISTER_COUNT: usize = 32;

/// Upper bound on registers per frame (register operands are one byte).
pub const MAX_REGISTER_COUNT: usize = 256;

/// Value-stack capacity per frame.
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024;

/// Parameters of one execution.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub protocol_version: ProtocolVersion,
    /// Gas limit declared by the transaction. `None` counts gas without
    /// enforcing a limit.
    pub max_gas: Option<BigInt>,
    pub register_count: usize,
    pub max_stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            protocol_version: LATEST_PROTOCOL_VERSION,
            max_gas: None,
            register_count: DEFAULT_REGISTER_COUNT,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_max_gas(mut self, max_gas: impl Into<BigInt>) -> Self {
        self.max_gas = Some(max_gas.into());
        self
    }

    /// Clamped to `1..=MAX_REGISTER_COUNT`.
    pub fn with_register_count(mut self, count: usize) -> Self {
        self.register_count = count.clamp(1, MAX_REGISTER_COUNT);
        self
    }

    pub fn with_max_stack_size(mut self, size: usize) -> Self {
        self.max_stack_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.protocol_version, LATEST_PROTOCOL_VERSION);
        assert!(config.max_gas.is_none());
        assert_eq!(config.register_count, DEFAULT_REGISTER_COUNT);
    }

    #[test]
    fn register_count_is_clamped() {
        assert_eq!(
            RuntimeConfig::default().with_register_count(1000).register_count,
            MAX_REGISTER_COUNT
        );
        assert_eq!(RuntimeConfig::default().with_register_count(0).register_count, 1);
    }

    #[test]
    fn version_gates_are_ordered() {
        assert!(PROTOCOL_VERSION_1 < DANGEROUS_NAMES_CHECK_VERSION);
        assert!(DANGEROUS_NAMES_CHECK_VERSION <= GAS_TABLE_V2_VERSION);
        assert!(GAS_TABLE_V2_VERSION <= LATEST_PROTOCOL_VERSION);
    }
}
