//! Native contracts: Rust types exposing methods to the VM.
//!
//! A contract declares its public surface through [`NativeContract::methods`]
//! and its persistent state through [`NativeContract::fields`]. Invocation
//! constructs the contract, binds its fields to storage, coerces the popped
//! arguments to the declared parameter types, runs the handler and writes the
//! scalar fields back.

use crate::contract::abi::{ContractInterface, ContractMethod, ContractParameter, NATIVE_METHOD_OFFSET};
use crate::contract::{expect, expect_warning};
use crate::storage::context::StorageContext;
use crate::storage::keys::field_key;
use crate::storage::{StorageList, StorageMap, StorageValue};
use crate::types::address::Address;
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::{VMObject, VMType};
use num_bigint::BigInt;
use std::fmt;

/// Declared type of a native method parameter or return value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamType {
    /// No value; only meaningful as a return type.
    Void,
    Number,
    String,
    Bool,
    Bytes,
    Timestamp,
    Enum,
    Address,
    Hash,
    Struct,
    /// Array of values, carried as an index-keyed struct.
    Array,
    /// Accepts any value as is.
    Any,
    /// A Rust type with no VM representation. Methods using it are left out
    /// of the method table.
    Unsupported(&'static str),
}

impl ParamType {
    /// Tag the value appears under in the ABI.
    pub fn vm_type(&self) -> Option<VMType> {
        let ty = match self {
            ParamType::Void | ParamType::Any => VMType::None,
            ParamType::Number => VMType::Number,
            ParamType::String => VMType::String,
            ParamType::Bool => VMType::Bool,
            ParamType::Bytes => VMType::Bytes,
            ParamType::Timestamp => VMType::Timestamp,
            ParamType::Enum => VMType::Enum,
            ParamType::Address | ParamType::Hash => VMType::Object,
            ParamType::Struct | ParamType::Array => VMType::Struct,
            ParamType::Unsupported(_) => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Unsupported(name) => f.write_str(name),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Engine services available to native code.
pub trait NativeRuntime {
    fn storage(&self) -> &dyn StorageContext;
    fn storage_mut(&mut self) -> &mut dyn StorageContext;

    fn is_witness(&self, address: &Address) -> bool;
    /// Block time in seconds.
    fn time(&self) -> u32;
    /// Resolves a registered account name.
    fn lookup_name(&self, name: &str) -> Option<Address>;

    fn transfer_tokens(
        &mut self,
        symbol: &str,
        from: &Address,
        to: &Address,
        amount: &BigInt,
    ) -> Result<(), VMError>;

    /// Invokes another native contract directly.
    fn call_native_context(
        &mut self,
        contract: &str,
        method: &str,
        args: Vec<VMObject>,
    ) -> Result<VMObject, VMError>;

    /// Emits an event attributed to `address`.
    fn notify(&mut self, kind: &str, address: &Address, data: VMObject) -> Result<(), VMError>;

    fn expect(&self, condition: bool, message: &str) -> Result<(), VMError> {
        expect(condition, message)
    }

    fn expect_warning(&self, condition: bool, message: &str) -> Result<(), VMError> {
        expect_warning(condition, message)
    }
}

/// Handler signature; arguments are already coerced.
pub type NativeHandler<C> =
    fn(&mut C, &mut dyn NativeRuntime, &[VMObject]) -> Result<VMObject, VMError>;

pub struct NativeMethod<C> {
    pub name: &'static str,
    pub parameters: Vec<(&'static str, ParamType)>,
    pub returns: ParamType,
    pub handler: NativeHandler<C>,
}

impl<C> NativeMethod<C> {
    pub fn new(
        name: &'static str,
        parameters: Vec<(&'static str, ParamType)>,
        returns: ParamType,
        handler: NativeHandler<C>,
    ) -> Self {
        Self {
            name,
            parameters,
            returns,
            handler,
        }
    }

    fn is_supported(&self) -> bool {
        self.returns.vm_type().is_some()
            && self.parameters.iter().all(|(_, ty)| ty.vm_type().is_some())
    }

    fn abi_entry(&self) -> ContractMethod {
        let parameters = self
            .parameters
            .iter()
            .map(|(name, ty)| ContractParameter::new(*name, ty.vm_type().unwrap_or(VMType::None)))
            .collect();
        ContractMethod::new(
            self.name,
            self.returns.vm_type().unwrap_or(VMType::None),
            parameters,
            NATIVE_METHOD_OFFSET,
        )
    }
}

/// A scalar field persisted wholesale.
pub trait ScalarField {
    fn load(&mut self, bytes: &[u8]) -> Result<(), VMError>;
    fn save(&self) -> Vec<u8>;
}

impl<T: Encode + Decode> ScalarField for T {
    fn load(&mut self, bytes: &[u8]) -> Result<(), VMError> {
        *self = T::from_bytes(bytes)?;
        Ok(())
    }

    fn save(&self) -> Vec<u8> {
        self.to_bytes()
    }
}

/// How a declared field is bound to storage.
pub enum FieldBinding<'a> {
    /// Collection views are re-bound to the field's key, never materialized.
    Map(&'a mut StorageMap),
    List(&'a mut StorageList),
    Value(&'a mut StorageValue),
    Scalar(&'a mut dyn ScalarField),
}

pub trait NativeContract: Default + 'static {
    /// Contract name; also the storage prefix of its fields.
    const KIND: &'static str;

    fn methods() -> Vec<NativeMethod<Self>>;

    /// Ordered field descriptor.
    fn fields(&mut self) -> Vec<(&'static str, FieldBinding<'_>)> {
        Vec::new()
    }
}

/// Binds every field of `contract` to storage. Scalars keep their default
/// when their key is absent.
pub fn load_fields<C: NativeContract>(
    contract: &mut C,
    storage: &dyn StorageContext,
) -> Result<(), VMError> {
    for (name, binding) in contract.fields() {
        let key = field_key(C::KIND, name);
        match binding {
            FieldBinding::Map(map) => *map = StorageMap::new(key),
            FieldBinding::List(list) => *list = StorageList::new(key),
            FieldBinding::Value(value) => *value = StorageValue::new(key),
            FieldBinding::Scalar(scalar) => {
                if let Some(bytes) = storage.get(&key) {
                    scalar.load(&bytes)?;
                }
            }
        }
    }
    Ok(())
}

/// Writes every scalar field of `contract` back to storage.
pub fn save_fields<C: NativeContract>(contract: &mut C, storage: &mut dyn StorageContext) {
    for (name, binding) in contract.fields() {
        if let FieldBinding::Scalar(scalar) = binding {
            storage.put(&field_key(C::KIND, name), scalar.save());
        }
    }
}

/// Methods of a contract that have a VM representation.
pub struct MethodTable<C> {
    methods: Vec<NativeMethod<C>>,
}

impl<C: NativeContract> MethodTable<C> {
    /// Drops every method whose parameter or return type has no VM tag.
    pub fn build() -> Self {
        let methods = C::methods()
            .into_iter()
            .filter(NativeMethod::is_supported)
            .collect();
        Self { methods }
    }

    /// Case-insensitive, like [`ContractInterface::find_method`].
    pub fn find(&self, name: &str) -> Option<&NativeMethod<C>> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn abi(&self) -> Result<ContractInterface, VMError> {
        ContractInterface::new(self.methods.iter().map(NativeMethod::abi_entry).collect(), vec![])
    }
}

/// Converts a popped argument to a parameter's declared type.
pub fn coerce_argument(
    runtime: &dyn NativeRuntime,
    method: &str,
    index: usize,
    expected: &ParamType,
    arg: VMObject,
) -> Result<VMObject, VMError> {
    let actual = arg.vm_type();
    let fail = || VMError::ArgumentCoercion {
        method: method.to_string(),
        index,
        expected: expected.to_string(),
        actual,
    };

    let coerced = match expected {
        ParamType::Any => Ok(arg),
        ParamType::Void => Ok(VMObject::None),
        ParamType::Number => arg.as_number().map(VMObject::Number),
        ParamType::String => arg.as_string().map(VMObject::String),
        ParamType::Bool => arg.as_bool().map(VMObject::Bool),
        ParamType::Bytes => arg.as_bytes().map(VMObject::Bytes),
        ParamType::Timestamp => arg.as_timestamp().map(VMObject::Timestamp),
        ParamType::Enum => arg.as_enum().map(VMObject::Enum),
        ParamType::Hash => arg.as_hash().map(VMObject::from_hash),
        ParamType::Address => match &arg {
            VMObject::String(text) => Address::from_text(text)
                .or_else(|| runtime.lookup_name(text))
                .map(VMObject::from_address)
                .ok_or_else(fail),
            _ => arg.as_address().map(VMObject::from_address),
        },
        ParamType::Struct => match arg {
            VMObject::Bytes(bytes) => VMObject::deserialize(&bytes).and_then(require_struct),
            other => require_struct(other),
        },
        ParamType::Array => {
            let value = match arg {
                VMObject::Bytes(bytes) => VMObject::deserialize(&bytes),
                other => Ok(other),
            };
            value
                .and_then(|v| v.to_array())
                .map(VMObject::from_array)
        }
        ParamType::Unsupported(_) => Err(fail()),
    };
    coerced.map_err(|_| fail())
}

fn require_struct(value: VMObject) -> Result<VMObject, VMError> {
    value.as_struct()?;
    Ok(value)
}

/// Runs `method` on a freshly constructed `C`.
///
/// Fields are bound before the call and scalars saved only when the handler
/// succeeds.
pub fn invoke_native<C: NativeContract>(
    runtime: &mut dyn NativeRuntime,
    method: &str,
    args: Vec<VMObject>,
) -> Result<VMObject, VMError> {
    let table = MethodTable::<C>::build();
    let entry = table.find(method).ok_or_else(|| VMError::MethodNotFound {
        contract: C::KIND.to_string(),
        method: method.to_string(),
    })?;
    if args.len() < entry.parameters.len() {
        return Err(VMError::NotEnoughArguments {
            expected: entry.parameters.len(),
            actual: args.len(),
        });
    }

    let mut coerced = Vec::with_capacity(entry.parameters.len());
    for (index, ((_, ty), arg)) in entry.parameters.iter().zip(args).enumerate() {
        coerced.push(coerce_argument(runtime, method, index, ty, arg)?);
    }

    let mut contract = C::default();
    load_fields(&mut contract, runtime.storage())?;
    let result = (entry.handler)(&mut contract, runtime, &coerced)?;
    save_fields(&mut contract, runtime.storage_mut());
    Ok(result)
}
