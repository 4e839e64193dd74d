use crate::types::encoding::DecodeError;
use crate::virtual_machine::object::{MAX_NESTING, VMType};
use ledger_vm_derive::Error;
use num_bigint::BigInt;

/// Errors raised while assembling, decoding or executing scripts.
///
/// Data conditions ([`VMError::is_fault`]) end the current context in
/// `Fault`; everything else aborts the whole execution. Display strings are
/// part of the client-facing contract and must stay stable.
#[derive(Debug, Clone, Error)]
pub enum VMError {
    // ---- bytecode ----
    #[error("invalid opcode {opcode} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("unexpected end of script at offset {offset}")]
    UnexpectedEndOfScript { offset: usize },
    #[error("invalid instruction pointer {ip}")]
    InvalidIP { ip: usize },
    #[error("invalid VM type tag {0}")]
    InvalidTypeTag(u8),
    #[error("register index {index} out of bounds ({available} registers)")]
    InvalidRegisterIndex { index: u8, available: usize },
    #[error("decoding error: {0}")]
    Decode(DecodeError),

    // ---- data conditions ----
    #[error("Cannot convert {from} '{value}' to {to}.")]
    CannotConvert {
        from: VMType,
        value: String,
        to: &'static str,
    },
    #[error("logical op unsupported for type {0}")]
    LogicalOpUnsupported(VMType),
    #[error("{instruction} unsupported for type {actual}")]
    TypeMismatch {
        instruction: &'static str,
        actual: VMType,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("index {index} out of range ({count} elements)")]
    IndexOutOfRange { index: String, count: usize },
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("VM ctx instruction failed: could not find context with name '{name}'")]
    ContextNotFound { name: String },
    #[error("struct nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },
    #[error("{instruction} result exceeds {limit} bits")]
    IntegerTooLarge { instruction: &'static str, limit: u64 },

    // ---- aborts ----
    #[error("no active execution frame")]
    NoActiveFrame,
    #[error("VM stack underflow")]
    StackUnderflow,
    #[error("VM stack overflow, limit is {limit}")]
    StackOverflow { limit: usize },
    #[error("not enough arguments in stack, expected {expected} got {actual}")]
    NotEnoughArguments { expected: usize, actual: usize },
    #[error("{message}")]
    Throw { message: String },
    #[error("{message}")]
    ExpectFailed { message: String },
    #[error("{message}")]
    ExpectWarning { message: String },
    #[error("{message}")]
    NestedFault { context: String, message: String },
    #[error("context {context} ended in state {state}")]
    ContextSwitchFailed { context: String, state: &'static str },
    #[error("VM gas limit exceeded ({max})/({used})")]
    GasLimitExceeded { max: BigInt, used: BigInt },
    #[error("unknown extcall {0}")]
    UnknownExtcall(String),
    #[error("not allowed from this context: {method}")]
    NotAllowedFromContext { method: String },
    #[error("{method}: contract name '{name}' is reserved")]
    ReservedContractName { method: String, name: String },
    #[error("invalid field name '{0}'")]
    InvalidFieldName(String),
    #[error("contract {0} is not deployed")]
    ContractNotFound(String),
    #[error("contract {0} is already deployed")]
    ContractAlreadyDeployed(String),
    #[error("method {method} not found in contract {contract}")]
    MethodNotFound { contract: String, method: String },
    #[error("argument {index} of {method}: cannot coerce {actual} into {expected}")]
    ArgumentCoercion {
        method: String,
        index: usize,
        expected: String,
        actual: VMType,
    },
    #[error("oracle read failed: {0}")]
    OracleUnavailable(String),
    #[error("invalid ABI: {0}")]
    InvalidAbi(String),
    #[error("object of type {0} cannot be serialized")]
    NotSerializable(&'static str),

    // ---- assembly ----
    #[error("line {line}, column {offset}: {message}")]
    Assembly {
        line: usize,
        offset: usize,
        message: String,
    },
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    #[error("io error: {0}")]
    Io(String),
}

impl VMError {
    /// Data conditions that fault the current context instead of aborting.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            VMError::CannotConvert { .. }
                | VMError::LogicalOpUnsupported(_)
                | VMError::TypeMismatch { .. }
                | VMError::DivisionByZero
                | VMError::IndexOutOfRange { .. }
                | VMError::InvalidRange(_)
                | VMError::ContextNotFound { .. }
                | VMError::NestingTooDeep { .. }
                | VMError::IntegerTooLarge { .. }
        )
    }

    /// Raised through `ExpectWarning`: aborts, but is reported as a notice.
    pub fn is_warning(&self) -> bool {
        matches!(self, VMError::ExpectWarning { .. })
    }
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::NestingTooDeep => VMError::NestingTooDeep { limit: MAX_NESTING },
            other => VMError::Decode(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_message_is_verbatim() {
        let err = VMError::CannotConvert {
            from: VMType::String,
            value: "abc".into(),
            to: "BigInteger",
        };
        assert_eq!(err.to_string(), "Cannot convert String 'abc' to BigInteger.");
        assert!(err.is_fault());
    }

    #[test]
    fn logical_op_message_is_verbatim() {
        let err = VMError::LogicalOpUnsupported(VMType::String);
        assert_eq!(err.to_string(), "logical op unsupported for type String");
    }

    #[test]
    fn context_not_found_message_is_verbatim() {
        let err = VMError::ContextNotFound {
            name: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "VM ctx instruction failed: could not find context with name 'ghost'"
        );
    }

    #[test]
    fn aborts_are_not_faults() {
        let gas = VMError::GasLimitExceeded {
            max: BigInt::from(10),
            used: BigInt::from(11),
        };
        assert!(!gas.is_fault());
        assert_eq!(gas.to_string(), "VM gas limit exceeded (10)/(11)");
        assert!(!VMError::Throw { message: "x".into() }.is_fault());
    }

    #[test]
    fn warnings_are_tagged() {
        assert!(VMError::ExpectWarning { message: "w".into() }.is_warning());
        assert!(!VMError::ExpectFailed { message: "e".into() }.is_warning());
    }
}
