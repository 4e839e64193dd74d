use crate::config::RuntimeConfig;
use crate::contract::registry::ContractRegistry;
use crate::runtime::chain::{ChainReader, Event, OracleReader};
use crate::runtime::host::RuntimeEnv;
use crate::storage::context::StorageContext;
use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::gas::GasMachine;
use crate::virtual_machine::object::VMObject;
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use crate::{error, warn};
use num_bigint::BigInt;


/// Name of the transaction script's context.
pub const ENTRY_CONTEXT_NAME: &str = "entry";

/// A transaction script bound to chain state.
///
/// Storage writes go straight to the supplied [`StorageContext`]; wrap it in
/// a [`ChangeSet`](crate::storage::ChangeSet) to commit or discard the whole
/// execution.
pub struct RuntimeVM<'a> {
    vm: VirtualMachine,
    env: RuntimeEnv<'a>,
}

impl<'a> RuntimeVM<'a> {
    pub fn new(
        script: Vec<u8>,
        config: RuntimeConfig,
        storage: &'a mut dyn StorageContext,
        chain: &'a dyn ChainReader,
        registry: &'a ContractRegistry,
    ) -> Self {
        let vm = VirtualMachine::new(ExecutionContext::script(ENTRY_CONTEXT_NAME, script), &config);
        Self {
            vm,
            env: RuntimeEnv::new(config, storage, chain, registry),
        }
    }

    pub fn with_oracle(mut self, oracle: &'a mut dyn OracleReader) -> Self {
        self.env.oracle = Some(oracle);
        self
    }

    /// Marks the execution as a trigger, as reported by `Runtime.IsTrigger`.
    pub fn as_trigger(mut self) -> Self {
        self.env.is_trigger = true;
        self
    }

    /// Queues an argument for the entry script. The last value pushed is on
    /// top when execution starts.
    pub fn push_argument(&mut self, value: VMObject) -> Result<(), VMError> {
        self.vm.stack_push(value)
    }

    /// Runs the script to completion.
    ///
    /// A data fault returns `Ok(Fault)`; anything else that stops the script
    /// early is an `Err`. Either way the caller should discard the writes.
    pub fn execute(&mut self) -> Result<ExecutionState, VMError> {
        let result = self.vm.execute(&mut self.env);
        match &result {
            Ok(ExecutionState::Fault) => warn!(
                "Execution faulted: {}",
                self.vm.fault_message().unwrap_or_default()
            ),
            Err(err) if err.is_warning() => warn!("{err}"),
            Err(err) => error!("Execution aborted: {err}"),
            Ok(_) => {}
        }
        result
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    /// Values left by the entry script, top of stack last.
    pub fn stack(&self) -> &[VMObject] {
        self.vm.stack()
    }

    pub fn fault_message(&self) -> Option<&str> {
        self.vm.fault_message()
    }

    pub fn used_gas(&self) -> &BigInt {
        self.env.gas().used_gas()
    }

    pub fn gas(&self) -> &GasMachine {
        self.env.gas()
    }

    pub fn events(&self) -> &[Event] {
        self.env.events()
    }

    pub fn logs(&self) -> &[String] {
        self.env.logs()
    }
}
