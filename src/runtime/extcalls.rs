//! `EXTCALL` surface.
//!
//! A fixed table maps each call name to its argument count and handler. The
//! count is checked before anything is popped; arguments are popped in
//! declaration order, so scripts push them last-to-first. Reads take the
//! target contract as an argument, writes always land in the calling
//! contract's namespace.

use crate::contract::abi::ContractInterface;
use crate::contract::expect;
use crate::runtime::host::{RuntimeEnv, is_valid_contract_name};
use crate::storage::keys::{field_key, global_key, is_valid_field_name};
use crate::storage::list::StorageList;
use crate::storage::map::StorageMap;
use crate::storage::value::StorageValue;
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::virtual_machine::context::ContextLoader;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::{VMObject, VMType};
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use crate::info;
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, ToPrimitive, Zero};

type Extcall = fn(&mut RuntimeEnv<'_>, &mut VirtualMachine) -> Result<ExecutionState, VMError>;

/// `(name, argument count, handler)`.
const EXTCALLS: &[(&str, usize, Extcall)] = &[
    ("Runtime.Time", 0, runtime_time),
    ("Runtime.Height", 0, runtime_height),
    ("Runtime.TransactionHash", 0, runtime_transaction_hash),
    ("Runtime.GasUsed", 0, runtime_gas_used),
    ("Runtime.Context", 0, runtime_context),
    ("Runtime.PreviousContext", 0, runtime_previous_context),
    ("Runtime.GenerateUID", 0, runtime_generate_uid),
    ("Runtime.Random", 0, runtime_random),
    ("Runtime.SetSeed", 1, runtime_set_seed),
    ("Runtime.IsWitness", 1, runtime_is_witness),
    ("Runtime.IsTrigger", 0, runtime_is_trigger),
    ("Runtime.Log", 1, runtime_log),
    ("Runtime.Notify", 3, runtime_notify),
    ("Runtime.TransferTokens", 4, runtime_transfer_tokens),
    ("Runtime.TransferBalance", 3, runtime_transfer_balance),
    ("Runtime.GetBalance", 2, runtime_get_balance),
    ("Runtime.DeployContract", 4, runtime_deploy_contract),
    ("Runtime.UpgradeContract", 4, runtime_upgrade_contract),
    ("Runtime.CallContract", 2, runtime_call_contract),
    ("Data.Get", 3, data_get),
    ("Data.Set", 2, data_set),
    ("Data.Delete", 1, data_delete),
    ("Map.Has", 3, map_has),
    ("Map.Get", 4, map_get),
    ("Map.Set", 3, map_set),
    ("Map.Remove", 2, map_remove),
    ("Map.Count", 2, map_count),
    ("Map.Clear", 1, map_clear),
    ("Map.Keys", 3, map_keys),
    ("List.Get", 4, list_get),
    ("List.Add", 2, list_add),
    ("List.Replace", 3, list_replace),
    ("List.RemoveAt", 2, list_remove_at),
    ("List.Count", 2, list_count),
    ("List.Clear", 1, list_clear),
    ("Account.Name", 1, account_name),
    ("Account.LastActivity", 1, account_last_activity),
    ("Oracle.Read", 1, oracle_read),
    ("Oracle.Price", 1, oracle_price),
    ("Nexus.TokenExists", 1, nexus_token_exists),
    ("Nexus.GetGovernanceValue", 1, nexus_governance_value),
    ("Organization.Exists", 1, organization_exists),
    ("Organization.IsMember", 2, organization_is_member),
    ("Organization.AddMember", 3, organization_add_member),
    ("Organization.RemoveMember", 3, organization_remove_member),
    ("Address()", 1, construct_address),
    ("Hash()", 1, construct_hash),
];

/// Names of every supported extcall, in table order.
pub fn extcall_names() -> impl Iterator<Item = &'static str> {
    EXTCALLS.iter().map(|(name, ..)| *name)
}

pub(crate) fn dispatch(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
    method: &str,
) -> Result<ExecutionState, VMError> {
    let (_, argc, handler) = EXTCALLS
        .iter()
        .find(|(name, ..)| *name == method)
        .ok_or_else(|| VMError::UnknownExtcall(method.to_string()))?;
    vm.expect_stack(*argc)?;
    handler(env, vm)
}

// =========================
// Argument helpers
// =========================

fn push(vm: &mut VirtualMachine, value: VMObject) -> Result<ExecutionState, VMError> {
    vm.stack_push(value)?;
    Ok(ExecutionState::Running)
}

fn push_optional<T>(
    vm: &mut VirtualMachine,
    value: Option<T>,
    convert: impl FnOnce(T) -> VMObject,
) -> Result<ExecutionState, VMError> {
    push(vm, value.map_or(VMObject::None, convert))
}

fn pop_string(vm: &mut VirtualMachine) -> Result<String, VMError> {
    vm.stack_pop()?.as_string()
}

/// Field, collection or organization name.
fn pop_field(vm: &mut VirtualMachine) -> Result<String, VMError> {
    let name = pop_string(vm)?;
    if !is_valid_field_name(&name) {
        return Err(VMError::InvalidFieldName(name));
    }
    Ok(name)
}

fn pop_number(vm: &mut VirtualMachine) -> Result<BigInt, VMError> {
    vm.stack_pop()?.as_number()
}

fn pop_bytes(vm: &mut VirtualMachine) -> Result<Vec<u8>, VMError> {
    vm.stack_pop()?.as_bytes()
}

/// Address text, registered name, address handle or raw bytes.
fn pop_address(env: &RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<Address, VMError> {
    let value = vm.stack_pop()?;
    if let VMObject::String(text) = &value {
        if let Some(address) = Address::from_text(text).or_else(|| env.chain.lookup_name(text)) {
            return Ok(address);
        }
    }
    value.as_address()
}

fn pop_type(vm: &mut VirtualMachine) -> Result<VMType, VMError> {
    let tag = vm.stack_pop()?.as_enum()?;
    let tag = u8::try_from(tag).map_err(|_| VMError::InvalidRange(format!("type tag {tag}")))?;
    VMType::try_from(tag)
}

fn pop_index(vm: &mut VirtualMachine) -> Result<u64, VMError> {
    let index = pop_number(vm)?;
    index
        .to_u64()
        .ok_or_else(|| VMError::InvalidRange(format!("list index {index}")))
}

/// Storage form of a value.
fn to_stored(value: &VMObject) -> Result<Vec<u8>, VMError> {
    value.to_raw()
}

fn from_stored(ty: VMType, bytes: Option<Vec<u8>>) -> Result<VMObject, VMError> {
    match bytes {
        Some(bytes) => VMObject::from_raw(ty, &bytes),
        None => Ok(VMObject::None),
    }
}

fn current_name(vm: &VirtualMachine) -> Result<String, VMError> {
    vm.current_context()
        .map(|context| context.name().to_string())
        .ok_or(VMError::NoActiveFrame)
}

/// Namespace of the calling contract, if it may write to it.
fn writable_contract(
    env: &RuntimeEnv<'_>,
    vm: &VirtualMachine,
    method: &str,
) -> Result<String, VMError> {
    if vm.is_entry_context() {
        return Err(VMError::NotAllowedFromContext {
            method: method.to_string(),
        });
    }
    let name = current_name(vm)?;
    env.check_contract_name(method, &name)?;
    Ok(name)
}

fn require_witness(env: &RuntimeEnv<'_>, address: &Address) -> Result<(), VMError> {
    expect(env.chain.is_witness(address), &format!("invalid witness for {address}"))
}

// =========================
// Runtime
// =========================

fn runtime_time(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    push(vm, VMObject::Timestamp(env.chain.time()))
}

fn runtime_height(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    push(vm, VMObject::from_number(env.chain.height()))
}

fn runtime_transaction_hash(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    push(vm, VMObject::from_hash(env.chain.transaction_hash()))
}

fn runtime_gas_used(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    push(vm, VMObject::Number(env.gas.used_gas().clone()))
}

fn runtime_context(_env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let name = current_name(vm)?;
    push(vm, VMObject::String(name))
}

/// Falls back to the current context when called from the entry context.
fn runtime_previous_context(
    _env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let name = match vm.previous_context() {
        Some(context) => context.name().to_string(),
        None => current_name(vm)?,
    };
    push(vm, VMObject::String(name))
}

fn runtime_generate_uid(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    writable_contract(env, vm, "Runtime.GenerateUID")?;
    let counter = StorageValue::new(global_key("uid"));
    let next = counter
        .get::<BigInt>(&*env.storage)?
        .unwrap_or_else(BigInt::zero)
        + BigInt::one();
    counter.set(&mut *env.storage, &next);
    push(vm, VMObject::Number(next))
}

/// Next value of a sha3 chain seeded with the transaction hash.
fn runtime_random(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let seed = env
        .random_seed
        .unwrap_or_else(|| env.chain.transaction_hash());
    let next = Hash::sha3().chain(seed.as_slice()).finalize();
    env.random_seed = Some(next);
    push(vm, VMObject::Number(BigInt::from_bytes_le(Sign::Plus, next.as_slice())))
}

fn runtime_set_seed(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let seed = pop_bytes(vm)?;
    env.random_seed = Some(Hash::digest(&seed));
    Ok(ExecutionState::Running)
}

fn runtime_is_witness(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let address = pop_address(env, vm)?;
    push(vm, VMObject::Bool(env.chain.is_witness(&address)))
}

fn runtime_is_trigger(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    push(vm, VMObject::Bool(env.is_trigger))
}

fn runtime_log(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let message = pop_string(vm)?;
    env.logs.push(message);
    Ok(ExecutionState::Running)
}

fn runtime_notify(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let kind = pop_string(vm)?;
    let address = pop_address(env, vm)?;
    let data = vm.stack_pop()?;
    let contract = current_name(vm)?;
    env.emit(&kind, &address, &contract, data)?;
    Ok(ExecutionState::Running)
}

fn runtime_transfer_tokens(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let from = pop_address(env, vm)?;
    let to = pop_address(env, vm)?;
    let symbol = pop_string(vm)?;
    let amount = pop_number(vm)?;
    require_witness(env, &from)?;
    env.move_tokens(&symbol, &from, &to, &amount)?;
    Ok(ExecutionState::Running)
}

fn runtime_transfer_balance(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let from = pop_address(env, vm)?;
    let to = pop_address(env, vm)?;
    let symbol = pop_string(vm)?;
    require_witness(env, &from)?;
    let amount = env.balance_of(&symbol, &from)?;
    expect(amount.is_positive(), &format!("{from} has no {symbol} balance"))?;
    env.move_tokens(&symbol, &from, &to, &amount)?;
    Ok(ExecutionState::Running)
}

fn runtime_get_balance(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let address = pop_address(env, vm)?;
    let symbol = pop_string(vm)?;
    let balance = env.balance_of(&symbol, &address)?;
    push(vm, VMObject::Number(balance))
}

/// Pops `(from, name, script, abi)` and validates all of it before any write.
fn pop_contract(
    env: &RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<(Address, String, Vec<u8>, ContractInterface), VMError> {
    let from = pop_address(env, vm)?;
    let name = pop_string(vm)?;
    let script = pop_bytes(vm)?;
    let abi = ContractInterface::deserialize(&pop_bytes(vm)?)?;
    expect(!script.is_empty(), "contract script is empty")?;
    abi.validate_offsets(script.len())?;
    require_witness(env, &from)?;
    Ok((from, name, script, abi))
}

fn runtime_deploy_contract(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    const METHOD: &str = "Runtime.DeployContract";
    let (from, name, script, abi) = pop_contract(env, vm)?;
    expect(is_valid_contract_name(&name), &format!("invalid contract name '{name}'"))?;
    env.check_contract_name(METHOD, &name)?;
    if env.registry.contains(&name) || env.is_deployed(&name) {
        return Err(VMError::ContractAlreadyDeployed(name));
    }
    env.store_contract(&name, &from, script, &abi)?;
    info!("Contract {name} deployed by {from}");
    Ok(ExecutionState::Running)
}

/// The owner may replace the script as long as the new interface still
/// offers every method of the old one.
fn runtime_upgrade_contract(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    const METHOD: &str = "Runtime.UpgradeContract";
    let (from, name, script, abi) = pop_contract(env, vm)?;
    env.check_contract_name(METHOD, &name)?;
    let owner = env
        .contract_owner(&name)?
        .ok_or_else(|| VMError::ContractNotFound(name.clone()))?;
    expect(owner == from, &format!("{from} is not the owner of {name}"))?;
    let current = env.contract_abi(&name)?.unwrap_or_default();
    if !abi.implements(&current) {
        return Err(VMError::InvalidAbi(format!(
            "new interface of {name} drops existing methods"
        )));
    }
    env.store_contract(&name, &owner, script, &abi)?;
    info!("Contract {name} upgraded by {from}");
    Ok(ExecutionState::Running)
}

/// Pops the contract name and switches into it; the method name and its
/// arguments stay on the stack for the callee.
fn runtime_call_contract(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let name = pop_string(vm)?;
    let context = env
        .load_context(&name)
        .ok_or_else(|| VMError::ContractNotFound(name.clone()))?;
    vm.call_context(context, env)?;
    Ok(ExecutionState::Running)
}

// =========================
// Data
// =========================

fn data_get(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let field = pop_field(vm)?;
    let ty = pop_type(vm)?;
    let stored = env.storage.get(&field_key(&contract, &field));
    push(vm, from_stored(ty, stored)?)
}

fn data_set(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "Data.Set")?;
    let field = pop_field(vm)?;
    let value = vm.stack_pop()?;
    let key = field_key(&contract, &field);
    // storing None clears the field
    if value.is_none() {
        env.storage.delete(&key);
    } else {
        env.storage.put(&key, to_stored(&value)?);
    }
    Ok(ExecutionState::Running)
}

fn data_delete(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "Data.Delete")?;
    let field = pop_field(vm)?;
    env.storage.delete(&field_key(&contract, &field));
    Ok(ExecutionState::Running)
}

// =========================
// Map
// =========================

fn pop_map(vm: &mut VirtualMachine, contract: &str) -> Result<StorageMap, VMError> {
    Ok(StorageMap::new(field_key(contract, &pop_field(vm)?)))
}

fn map_has(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let map = pop_map(vm, &contract)?;
    let key = pop_bytes(vm)?;
    push(vm, VMObject::Bool(map.contains_key(&*env.storage, &key)))
}

fn map_get(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let map = pop_map(vm, &contract)?;
    let key = pop_bytes(vm)?;
    let ty = pop_type(vm)?;
    push(vm, from_stored(ty, map.get_raw(&*env.storage, &key))?)
}

fn map_set(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "Map.Set")?;
    let map = pop_map(vm, &contract)?;
    let key = pop_bytes(vm)?;
    let value = vm.stack_pop()?;
    if value.is_none() {
        map.remove(&mut *env.storage, &key)?;
    } else {
        map.set_raw(&mut *env.storage, &key, to_stored(&value)?)?;
    }
    Ok(ExecutionState::Running)
}

fn map_remove(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "Map.Remove")?;
    let map = pop_map(vm, &contract)?;
    let key = pop_bytes(vm)?;
    map.remove(&mut *env.storage, &key)?;
    Ok(ExecutionState::Running)
}

fn map_count(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let map = pop_map(vm, &contract)?;
    push(vm, VMObject::from_number(map.count(&*env.storage)?))
}

fn map_clear(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "Map.Clear")?;
    let map = pop_map(vm, &contract)?;
    map.clear(&mut *env.storage);
    Ok(ExecutionState::Running)
}

/// Keys as an array, each converted to the requested type.
fn map_keys(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let map = pop_map(vm, &contract)?;
    let ty = pop_type(vm)?;
    let keys = map
        .all_keys(&*env.storage)
        .into_iter()
        .map(|key| VMObject::from_raw(ty, &key))
        .collect::<Result<Vec<_>, _>>()?;
    push(vm, VMObject::from_array(keys))
}

// =========================
// List
// =========================

fn pop_list(vm: &mut VirtualMachine, contract: &str) -> Result<StorageList, VMError> {
    Ok(StorageList::new(field_key(contract, &pop_field(vm)?)))
}

fn list_get(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let list = pop_list(vm, &contract)?;
    let index = pop_index(vm)?;
    let ty = pop_type(vm)?;
    let bytes = list.get_raw(&*env.storage, index)?;
    push(vm, VMObject::from_raw(ty, &bytes)?)
}

fn list_add(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "List.Add")?;
    let list = pop_list(vm, &contract)?;
    let value = vm.stack_pop()?;
    list.add_raw(&mut *env.storage, to_stored(&value)?)?;
    Ok(ExecutionState::Running)
}

fn list_replace(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "List.Replace")?;
    let list = pop_list(vm, &contract)?;
    let index = pop_index(vm)?;
    let value = vm.stack_pop()?;
    list.replace_raw(&mut *env.storage, index, to_stored(&value)?)?;
    Ok(ExecutionState::Running)
}

fn list_remove_at(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "List.RemoveAt")?;
    let list = pop_list(vm, &contract)?;
    let index = pop_index(vm)?;
    list.remove_at(&mut *env.storage, index)?;
    Ok(ExecutionState::Running)
}

fn list_count(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = pop_string(vm)?;
    let list = pop_list(vm, &contract)?;
    push(vm, VMObject::from_number(list.count(&*env.storage)?))
}

fn list_clear(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let contract = writable_contract(env, vm, "List.Clear")?;
    let list = pop_list(vm, &contract)?;
    list.clear(&mut *env.storage)?;
    Ok(ExecutionState::Running)
}

// =========================
// Account / Nexus
// =========================

fn account_name(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let address = pop_address(env, vm)?;
    push_optional(vm, env.chain.account_name(&address), VMObject::String)
}

fn account_last_activity(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let address = pop_address(env, vm)?;
    push_optional(vm, env.chain.last_activity(&address), VMObject::Timestamp)
}

fn nexus_token_exists(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let symbol = pop_string(vm)?;
    push(vm, VMObject::Bool(env.chain.token_exists(&symbol)))
}

fn nexus_governance_value(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let name = pop_string(vm)?;
    push_optional(vm, env.chain.governance_value(&name), VMObject::Number)
}

// =========================
// Oracle
// =========================

fn oracle_read(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let url = pop_string(vm)?;
    let oracle = env
        .oracle
        .as_deref_mut()
        .ok_or_else(|| VMError::OracleUnavailable(url.clone()))?;
    let data = oracle.read(&url)?;
    env.gas.record_oracle_read();
    push(vm, VMObject::Bytes(data))
}

fn oracle_price(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let symbol = pop_string(vm)?;
    let oracle = env
        .oracle
        .as_deref_mut()
        .ok_or_else(|| VMError::OracleUnavailable(symbol.clone()))?;
    let price = oracle.price(&symbol)?;
    env.gas.record_oracle_read();
    push(vm, VMObject::Number(price))
}

// =========================
// Organization
// =========================

/// Founder by organization id.
fn organizations() -> StorageMap {
    StorageMap::new(global_key("organizations"))
}

fn organization_members(id: &str) -> StorageMap {
    StorageMap::new(global_key(&format!("organization.{id}")))
}

fn organization_exists(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let id = pop_field(vm)?;
    push(vm, VMObject::Bool(organizations().contains_key(&*env.storage, id.as_bytes())))
}

fn organization_is_member(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let id = pop_field(vm)?;
    let address = pop_address(env, vm)?;
    let member = organization_members(&id).contains_key(&*env.storage, address.as_slice());
    push(vm, VMObject::Bool(member))
}

/// Adding to an unknown organization creates it with `from` as founder.
fn organization_add_member(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let id = pop_field(vm)?;
    let from = pop_address(env, vm)?;
    let target = pop_address(env, vm)?;
    require_witness(env, &from)?;

    let members = organization_members(&id);
    let storage = &mut *env.storage;
    if organizations().contains_key(storage, id.as_bytes()) {
        expect(
            members.contains_key(storage, from.as_slice()),
            &format!("{from} is not a member of {id}"),
        )?;
    } else {
        organizations().set(storage, id.as_bytes(), &from)?;
        members.set(storage, from.as_slice(), &true)?;
    }
    members.set(storage, target.as_slice(), &true)?;
    Ok(ExecutionState::Running)
}

fn organization_remove_member(
    env: &mut RuntimeEnv<'_>,
    vm: &mut VirtualMachine,
) -> Result<ExecutionState, VMError> {
    let id = pop_field(vm)?;
    let from = pop_address(env, vm)?;
    let target = pop_address(env, vm)?;
    require_witness(env, &from)?;

    let members = organization_members(&id);
    let storage = &mut *env.storage;
    expect(
        organizations().contains_key(storage, id.as_bytes()),
        &format!("organization {id} does not exist"),
    )?;
    expect(
        members.contains_key(storage, from.as_slice()),
        &format!("{from} is not a member of {id}"),
    )?;
    let removed = members.remove(storage, target.as_slice())?;
    expect(removed, &format!("{target} is not a member of {id}"))?;
    Ok(ExecutionState::Running)
}

// =========================
// Constructors
// =========================

fn construct_address(env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let address = pop_address(env, vm)?;
    push(vm, VMObject::from_address(address))
}

fn construct_hash(_env: &mut RuntimeEnv<'_>, vm: &mut VirtualMachine) -> Result<ExecutionState, VMError> {
    let hash = vm.stack_pop()?.as_hash()?;
    push(vm, VMObject::from_hash(hash))
}
