//! Host side of a runtime execution.
//!
//! [`RuntimeEnv`] owns everything an execution touches besides the VM itself:
//! storage, chain and oracle views, the gas ledger and the native contract
//! registry. It is the [`ExecutionHost`] the VM core runs against and the
//! [`NativeRuntime`] native contracts see.

use crate::config::{DANGEROUS_NAMES_CHECK_VERSION, RuntimeConfig};
use crate::contract::abi::ContractInterface;
use crate::contract::native::NativeRuntime;
use crate::contract::registry::ContractRegistry;
use crate::contract::{expect, is_reserved_name};
use crate::runtime::chain::{ChainReader, Event, OracleReader};
use crate::runtime::extcalls;
use crate::storage::context::StorageContext;
use crate::storage::keys::{FIELD_SEPARATOR, global_key};
use crate::storage::map::StorageMap;
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::virtual_machine::context::{ContextLoader, ExecutionContext, ExecutionHost};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::gas::GasMachine;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::object::{VMObject, VMType};
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};

// Global fields, stored under the empty contract prefix.
const CONTRACT_SCRIPTS: &str = "contracts";
const CONTRACT_ABIS: &str = "abis";
const CONTRACT_OWNERS: &str = "owners";
const BALANCES: &str = "balances";

/// Deployed script bodies by contract name.
pub(crate) fn contract_scripts() -> StorageMap {
    StorageMap::new(global_key(CONTRACT_SCRIPTS))
}

pub(crate) fn contract_abis() -> StorageMap {
    StorageMap::new(global_key(CONTRACT_ABIS))
}

pub(crate) fn contract_owners() -> StorageMap {
    StorageMap::new(global_key(CONTRACT_OWNERS))
}

/// Balances of `symbol`, keyed by raw address bytes.
pub(crate) fn balances(symbol: &str) -> StorageMap {
    StorageMap::new(global_key(&format!("{BALANCES}.{symbol}")))
}

pub struct RuntimeEnv<'a> {
    pub(crate) config: RuntimeConfig,
    pub(crate) storage: &'a mut dyn StorageContext,
    pub(crate) chain: &'a dyn ChainReader,
    pub(crate) oracle: Option<&'a mut dyn OracleReader>,
    pub(crate) registry: &'a ContractRegistry,
    pub(crate) gas: GasMachine,
    pub(crate) events: Vec<Event>,
    pub(crate) logs: Vec<String>,
    /// Last value of the `Runtime.Random` chain; seeded from the transaction
    /// hash on first use.
    pub(crate) random_seed: Option<Hash>,
    pub(crate) is_trigger: bool,
    /// Native contract currently running, for event attribution.
    native_caller: Option<&'static str>,
}

impl<'a> RuntimeEnv<'a> {
    pub fn new(
        config: RuntimeConfig,
        storage: &'a mut dyn StorageContext,
        chain: &'a dyn ChainReader,
        registry: &'a ContractRegistry,
    ) -> Self {
        let gas = GasMachine::new(config.protocol_version);
        Self {
            config,
            storage,
            chain,
            oracle: None,
            registry,
            gas,
            events: Vec::new(),
            logs: Vec::new(),
            random_seed: None,
            is_trigger: false,
            native_caller: None,
        }
    }

    pub fn gas(&self) -> &GasMachine {
        &self.gas
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    fn check_gas_limit(&self) -> Result<(), VMError> {
        match &self.config.max_gas {
            Some(max) if self.gas.used_gas() > max => Err(VMError::GasLimitExceeded {
                max: max.clone(),
                used: self.gas.used_gas().clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Rejects native and reserved contract names from
    /// [`DANGEROUS_NAMES_CHECK_VERSION`] on.
    pub(crate) fn check_contract_name(&self, method: &str, name: &str) -> Result<(), VMError> {
        if self.config.protocol_version >= DANGEROUS_NAMES_CHECK_VERSION
            && (self.registry.contains(name) || is_reserved_name(name))
        {
            return Err(VMError::ReservedContractName {
                method: method.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn is_deployed(&self, name: &str) -> bool {
        contract_scripts().contains_key(&*self.storage, name.as_bytes())
    }

    pub(crate) fn contract_owner(&self, name: &str) -> Result<Option<Address>, VMError> {
        contract_owners().get(&*self.storage, name.as_bytes())
    }

    pub(crate) fn contract_abi(&self, name: &str) -> Result<Option<ContractInterface>, VMError> {
        contract_abis()
            .get_raw(&*self.storage, name.as_bytes())
            .map(|bytes| ContractInterface::deserialize(&bytes))
            .transpose()
    }

    /// Writes script, ABI and owner of `name`. Callers validate first.
    pub(crate) fn store_contract(
        &mut self,
        name: &str,
        owner: &Address,
        script: Vec<u8>,
        abi: &ContractInterface,
    ) -> Result<(), VMError> {
        let key = name.as_bytes();
        contract_scripts().set_raw(&mut *self.storage, key, script)?;
        contract_abis().set_raw(&mut *self.storage, key, abi.serialize())?;
        contract_owners().set(&mut *self.storage, key, owner)
    }

    pub(crate) fn balance_of(&self, symbol: &str, address: &Address) -> Result<BigInt, VMError> {
        Ok(balances(symbol)
            .get::<BigInt>(&*self.storage, address.as_slice())?
            .unwrap_or_else(BigInt::zero))
    }

    fn set_balance(&mut self, symbol: &str, address: &Address, amount: BigInt) -> Result<(), VMError> {
        let map = balances(symbol);
        if amount.is_zero() {
            map.remove(&mut *self.storage, address.as_slice())?;
            Ok(())
        } else {
            map.set(&mut *self.storage, address.as_slice(), &amount)
        }
    }

    /// Moves `amount` of `symbol` between two balances. Witness checks are
    /// the caller's job.
    pub(crate) fn move_tokens(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        amount: &BigInt,
    ) -> Result<(), VMError> {
        expect(self.chain.token_exists(symbol), &format!("token {symbol} does not exist"))?;
        expect(amount.is_positive(), "amount must be greater than zero")?;
        let source = self.balance_of(symbol, from)?;
        expect(&source >= amount, &format!("{from} has not enough {symbol}"))?;
        if from == to {
            return Ok(());
        }
        let target = self.balance_of(symbol, to)?;
        self.set_balance(symbol, from, source - amount)?;
        self.set_balance(symbol, to, target + amount)
    }

    pub(crate) fn emit(&mut self, kind: &str, address: &Address, contract: &str, data: VMObject) -> Result<(), VMError> {
        if !data.is_serializable() {
            return Err(VMError::NotSerializable("ExecutionContext"));
        }
        self.events.push(Event {
            kind: kind.to_string(),
            address: *address,
            contract: contract.to_string(),
            data,
        });
        Ok(())
    }

    pub(crate) fn oracle_multiplier(&self) -> BigInt {
        self.oracle
            .as_ref()
            .map_or_else(BigInt::one, |oracle| oracle.multiplier())
    }

    fn invoke_native(
        &mut self,
        contract: &str,
        method: &str,
        args: Vec<VMObject>,
    ) -> Result<VMObject, VMError> {
        let registry = self.registry;
        let entry = registry
            .get(contract)
            .ok_or_else(|| VMError::ContractNotFound(contract.to_string()))?;
        let previous = self.native_caller.replace(entry.name());
        let result = entry.invoke(&mut *self, method, args);
        self.native_caller = previous;
        result
    }
}

/// Contract names may not contain the field separator.
pub(crate) fn is_valid_contract_name(name: &str) -> bool {
    !name.is_empty()
        && !name.as_bytes().contains(&FIELD_SEPARATOR)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ContextLoader for RuntimeEnv<'_> {
    fn load_context(&mut self, name: &str) -> Option<ExecutionContext> {
        if self.registry.contains(name) {
            return Some(ExecutionContext::native(name));
        }
        let script = contract_scripts().get_raw(&*self.storage, name.as_bytes())?;
        match self.contract_abi(name).ok().flatten() {
            Some(abi) => Some(ExecutionContext::script_with_abi(name, script, abi)),
            None => Some(ExecutionContext::script(name, script)),
        }
    }
}

impl ExecutionHost for RuntimeEnv<'_> {
    fn validate_opcode(&mut self, _vm: &VirtualMachine, opcode: Instruction) -> Result<(), VMError> {
        self.gas.charge_instruction(opcode);
        self.check_gas_limit()
    }

    fn execute_interop(
        &mut self,
        vm: &mut VirtualMachine,
        method: &str,
    ) -> Result<ExecutionState, VMError> {
        let multiplier = self.oracle_multiplier();
        self.gas.charge_interop(method, &multiplier)?;
        self.check_gas_limit()?;
        extcalls::dispatch(self, vm, method)
    }

    /// Pops the method name and one value per declared parameter, then
    /// pushes the result unless the method returns nothing.
    fn execute_native(
        &mut self,
        vm: &mut VirtualMachine,
        context: &str,
    ) -> Result<ExecutionState, VMError> {
        let registry = self.registry;
        let entry = registry
            .get(context)
            .ok_or_else(|| VMError::ContractNotFound(context.to_string()))?;
        vm.expect_stack(1)?;
        let method_name = vm.stack_pop()?.as_string()?;
        let method = entry
            .abi()
            .find_method(&method_name)
            .ok_or_else(|| VMError::MethodNotFound {
                contract: context.to_string(),
                method: method_name.clone(),
            })?;

        let argc = method.parameters.len();
        vm.expect_stack(argc)?;
        let args = (0..argc)
            .map(|_| vm.stack_pop())
            .collect::<Result<Vec<_>, _>>()?;

        let result = self.invoke_native(context, &method_name, args)?;
        if !(result.is_none() && method.return_type == VMType::None) {
            vm.stack_push(result)?;
        }
        Ok(ExecutionState::Halt)
    }
}

impl NativeRuntime for RuntimeEnv<'_> {
    fn storage(&self) -> &dyn StorageContext {
        &*self.storage
    }

    fn storage_mut(&mut self) -> &mut dyn StorageContext {
        &mut *self.storage
    }

    fn is_witness(&self, address: &Address) -> bool {
        self.chain.is_witness(address)
    }

    fn time(&self) -> u32 {
        self.chain.time()
    }

    fn lookup_name(&self, name: &str) -> Option<Address> {
        self.chain.lookup_name(name)
    }

    fn transfer_tokens(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        amount: &BigInt,
    ) -> Result<(), VMError> {
        self.move_tokens(symbol, from, to, amount)
    }

    fn call_native_context(
        &mut self,
        contract: &str,
        method: &str,
        args: Vec<VMObject>,
    ) -> Result<VMObject, VMError> {
        self.invoke_native(contract, method, args)
    }

    fn notify(&mut self, kind: &str, address: &Address, data: VMObject) -> Result<(), VMError> {
        let contract = self.native_caller.unwrap_or_default();
        self.emit(kind, address, contract, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::chain::StaticChain;
    use crate::storage::context::MemoryStorage;

    #[test]
    fn contract_names() {
        assert!(is_valid_contract_name("my_token2"));
        assert!(!is_valid_contract_name(""));
        assert!(!is_valid_contract_name("a.b"));
        assert!(!is_valid_contract_name("a b"));
    }

    #[test]
    fn token_moves_keep_totals() {
        let alice = Address::from_public_key(b"alice");
        let bob = Address::from_public_key(b"bob");
        let mut storage = MemoryStorage::new();
        balances("SOUL").set(&mut storage, alice.as_slice(), &BigInt::from(10)).unwrap();
        let chain = StaticChain::default().with_token("SOUL");
        let registry = ContractRegistry::new();
        let mut env = RuntimeEnv::new(RuntimeConfig::default(), &mut storage, &chain, &registry);

        env.move_tokens("SOUL", &alice, &bob, &BigInt::from(10)).unwrap();
        assert_eq!(env.balance_of("SOUL", &alice).unwrap(), BigInt::zero());
        assert_eq!(env.balance_of("SOUL", &bob).unwrap(), BigInt::from(10));

        let err = env.move_tokens("SOUL", &alice, &bob, &BigInt::one()).unwrap_err();
        assert!(err.to_string().contains("has not enough SOUL"));
        assert!(env.move_tokens("KCAL", &bob, &alice, &BigInt::one()).is_err());
        drop(env);
        assert!(!balances("SOUL").contains_key(&storage, alice.as_slice()));
    }
}
