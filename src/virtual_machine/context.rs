//! Execution contexts and the host interface the VM core runs against.

use crate::contract::abi::ContractInterface;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use std::cmp::Ordering;
use std::sync::Arc;

/// A named unit of executable code.
///
/// Contexts compare by variant and name only; two script contexts with the
/// same name are the same context.
#[derive(Clone, Debug)]
pub enum ExecutionContext {
    /// Bytecode, optionally with an ABI mapping method names to offsets.
    Script {
        name: String,
        script: Arc<[u8]>,
        abi: Option<Arc<ContractInterface>>,
    },
    /// Dispatched to the host's native contract registry.
    Native { name: String },
    /// Executes as an immediate `Halt`. Used by dry runs.
    Dummy { name: String },
}

impl ExecutionContext {
    pub fn script(name: impl Into<String>, script: impl Into<Arc<[u8]>>) -> Self {
        ExecutionContext::Script {
            name: name.into(),
            script: script.into(),
            abi: None,
        }
    }

    pub fn script_with_abi(
        name: impl Into<String>,
        script: impl Into<Arc<[u8]>>,
        abi: ContractInterface,
    ) -> Self {
        ExecutionContext::Script {
            name: name.into(),
            script: script.into(),
            abi: Some(Arc::new(abi)),
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        ExecutionContext::Native { name: name.into() }
    }

    pub fn dummy(name: impl Into<String>) -> Self {
        ExecutionContext::Dummy { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            ExecutionContext::Script { name, .. }
            | ExecutionContext::Native { name }
            | ExecutionContext::Dummy { name } => name,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, ExecutionContext::Native { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            ExecutionContext::Script { .. } => 0,
            ExecutionContext::Native { .. } => 1,
            ExecutionContext::Dummy { .. } => 2,
        }
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ExecutionContext {}

impl PartialOrd for ExecutionContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExecutionContext {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.name().cmp(other.name()))
    }
}

/// Resolves contexts by name. The VM keeps no registry of its own.
pub trait ContextLoader {
    fn load_context(&mut self, name: &str) -> Option<ExecutionContext>;
}

/// Everything the VM core delegates to its surroundings.
pub trait ExecutionHost: ContextLoader {
    /// Runs before every instruction; charging gas happens here.
    fn validate_opcode(&mut self, vm: &VirtualMachine, opcode: Instruction) -> Result<(), VMError>;

    /// `EXTCALL`: arguments are on the current frame's stack.
    fn execute_interop(
        &mut self,
        vm: &mut VirtualMachine,
        method: &str,
    ) -> Result<ExecutionState, VMError>;

    /// Body of a [`ExecutionContext::Native`] context.
    fn execute_native(
        &mut self,
        vm: &mut VirtualMachine,
        context: &str,
    ) -> Result<ExecutionState, VMError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_variant_and_name() {
        let a = ExecutionContext::script("token", vec![0u8]);
        let b = ExecutionContext::script("token", vec![1u8, 2]);
        assert_eq!(a, b);
        assert_ne!(a, ExecutionContext::native("token"));
        assert!(ExecutionContext::native("a") < ExecutionContext::dummy("a"));
    }

    #[test]
    fn names() {
        assert_eq!(ExecutionContext::dummy("gas").name(), "gas");
        assert!(ExecutionContext::native("stake").is_native());
    }
}
