//! Registry of native contracts, built once and injected into the runtime.

use crate::contract::abi::ContractInterface;
use crate::contract::native::{MethodTable, NativeContract, NativeRuntime, invoke_native};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;
use std::collections::BTreeMap;

type Invoker = fn(&mut dyn NativeRuntime, &str, Vec<VMObject>) -> Result<VMObject, VMError>;

/// A registered contract: its derived ABI and a monomorphized entry point.
#[derive(Clone)]
pub struct NativeEntry {
    name: &'static str,
    abi: ContractInterface,
    invoke: Invoker,
}

impl NativeEntry {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn abi(&self) -> &ContractInterface {
        &self.abi
    }

    pub fn invoke(
        &self,
        runtime: &mut dyn NativeRuntime,
        method: &str,
        args: Vec<VMObject>,
    ) -> Result<VMObject, VMError> {
        (self.invoke)(runtime, method, args)
    }
}

#[derive(Clone, Default)]
pub struct ContractRegistry {
    entries: BTreeMap<&'static str, NativeEntry>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: NativeContract>(&mut self) -> Result<(), VMError> {
        if self.entries.contains_key(C::KIND) {
            return Err(VMError::ContractAlreadyDeployed(C::KIND.to_string()));
        }
        let entry = NativeEntry {
            name: C::KIND,
            abi: MethodTable::<C>::build().abi()?,
            invoke: invoke_native::<C>,
        };
        self.entries.insert(C::KIND, entry);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<C: NativeContract>(mut self) -> Result<Self, VMError> {
        self.register::<C>()?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&NativeEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::native::tests::{CounterContract, TestRuntime};
    use crate::types::address::Address;

    #[test]
    fn registration_derives_abi() {
        let registry = ContractRegistry::new().with::<CounterContract>().unwrap();
        let entry = registry.get("counter").unwrap();
        assert!(entry.abi().has_method("Bump"));
        assert!(!entry.abi().has_method("Hidden"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["counter"]);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = ContractRegistry::new();
        registry.register::<CounterContract>().unwrap();
        assert!(matches!(
            registry.register::<CounterContract>(),
            Err(VMError::ContractAlreadyDeployed(_))
        ));
    }

    #[test]
    fn invoke_through_entry() {
        let registry = ContractRegistry::new().with::<CounterContract>().unwrap();
        let mut rt = TestRuntime::default();
        let args = vec![
            VMObject::from_address(Address::from_public_key(b"k")),
            VMObject::from_number(4),
        ];
        let entry = registry.get("counter").unwrap();
        assert_eq!(
            entry.invoke(&mut rt, "Bump", args).unwrap(),
            VMObject::from_number(4)
        );
        assert_eq!(
            entry.invoke(&mut rt, "GetTotal", vec![]).unwrap(),
            VMObject::from_number(4)
        );
    }
}
