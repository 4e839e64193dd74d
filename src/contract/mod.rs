//! Contract surface shared by script and native contracts.
//!
//! - [`abi`]: method/event interfaces and their binary form
//! - [`native`]: the [`NativeContract`](native::NativeContract) trait, method
//!   tables, field binding and argument coercion
//! - [`registry`]: the injected [`ContractRegistry`](registry::ContractRegistry)

pub mod abi;
pub mod native;
pub mod registry;

use crate::virtual_machine::errors::VMError;

/// Names that can never be deployed or written to by scripts, in addition
/// to every registered native contract.
pub const RESERVED_CONTRACT_NAMES: &[&str] = &[
    "account",
    "consensus",
    "entry",
    "exchange",
    "gas",
    "governance",
    "interop",
    "nexus",
    "oracle",
    "organization",
    "runtime",
    "stake",
    "storage",
    "swap",
    "validator",
];

/// Case-insensitive check against [`RESERVED_CONTRACT_NAMES`].
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_CONTRACT_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Aborts the execution with `message` unless `condition` holds.
pub fn expect(condition: bool, message: &str) -> Result<(), VMError> {
    if condition {
        Ok(())
    } else {
        Err(VMError::ExpectFailed {
            message: message.to_string(),
        })
    }
}

/// Like [`expect`], but the failure is tagged as a warning for the caller
/// to log. It still aborts the execution.
pub fn expect_warning(condition: bool, message: &str) -> Result<(), VMError> {
    if condition {
        Ok(())
    } else {
        Err(VMError::ExpectWarning {
            message: message.to_string(),
        })
    }
}
