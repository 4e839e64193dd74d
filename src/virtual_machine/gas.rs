//! Gas accounting.
//!
//! [`GasMachine`] prices opcodes through the versioned [`GasTable`] and
//! extcalls by namespace. It only meters: comparing the total against a
//! transaction's limit is the runtime's job. On its own it is also a
//! dry-run [`ExecutionHost`] for estimating a script's cost.

use crate::config::{ProtocolVersion, RuntimeConfig};
use crate::virtual_machine::context::{ContextLoader, ExecutionContext, ExecutionHost};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{GasTable, Instruction};
use crate::virtual_machine::vm::{ExecutionState, VirtualMachine};
use num_bigint::BigInt;
use num_traits::{One, Zero};

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 9;

pub const RUNTIME_EXTCALL_COST: u64 = 10;
pub const DATA_EXTCALL_COST: u64 = 50;
pub const COLLECTION_EXTCALL_COST: u64 = 50;
pub const ACCOUNT_EXTCALL_COST: u64 = 100;
pub const ORGANIZATION_EXTCALL_COST: u64 = 200;
pub const NEXUS_EXTCALL_COST: u64 = 1000;
/// Base of `base * multiplier * 2^reads`.
pub const ORACLE_BASE_COST: u64 = 200;
pub const CONSTRUCTOR_EXTCALL_COST: u64 = 10;

/// Categories of gas consumption for profiling and debugging.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Per-instruction cost from the active table.
    Opcode = 0,
    Runtime = 1,
    /// `Data.*` field access.
    Data = 2,
    /// `Map.*` and `List.*`.
    Collection = 3,
    Account = 4,
    Organization = 5,
    /// Administrative `Nexus.*` calls.
    Nexus = 6,
    Oracle = 7,
    /// `Address()` and `Hash()`.
    Constructor = 8,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::Opcode => "Opcode",
            GasCategory::Runtime => "Runtime",
            GasCategory::Data => "Data",
            GasCategory::Collection => "Collection",
            GasCategory::Account => "Account",
            GasCategory::Organization => "Organization",
            GasCategory::Nexus => "Nexus",
            GasCategory::Oracle => "Oracle",
            GasCategory::Constructor => "Constructor",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::Opcode,
        GasCategory::Runtime,
        GasCategory::Data,
        GasCategory::Collection,
        GasCategory::Account,
        GasCategory::Organization,
        GasCategory::Nexus,
        GasCategory::Oracle,
        GasCategory::Constructor,
    ];

    /// Category and flat cost of an extcall, by namespace. `Oracle.*` is
    /// returned with its base cost.
    pub fn for_extcall(method: &str) -> Option<(GasCategory, u64)> {
        if matches!(method, "Address()" | "Hash()") {
            return Some((GasCategory::Constructor, CONSTRUCTOR_EXTCALL_COST));
        }
        let (namespace, name) = method.split_once('.')?;
        if name.is_empty() {
            return None;
        }
        let priced = match namespace {
            "Runtime" => (GasCategory::Runtime, RUNTIME_EXTCALL_COST),
            "Data" => (GasCategory::Data, DATA_EXTCALL_COST),
            "Map" | "List" => (GasCategory::Collection, COLLECTION_EXTCALL_COST),
            "Account" => (GasCategory::Account, ACCOUNT_EXTCALL_COST),
            "Organization" => (GasCategory::Organization, ORGANIZATION_EXTCALL_COST),
            "Nexus" => (GasCategory::Nexus, NEXUS_EXTCALL_COST),
            "Oracle" => (GasCategory::Oracle, ORACLE_BASE_COST),
            _ => return None,
        };
        Some(priced)
    }
}

/// Gas consumption per category.
///
/// Backed by a flat array indexed by [`GasCategory`] discriminant.
#[derive(Clone, Debug)]
pub struct GasProfile {
    counts: [BigInt; GAS_CATEGORY_COUNT],
}

impl Default for GasProfile {
    fn default() -> Self {
        Self {
            counts: std::array::from_fn(|_| BigInt::zero()),
        }
    }
}

impl GasProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, category: GasCategory, amount: &BigInt) {
        self.counts[category as usize] += amount;
    }

    pub fn get(&self, category: GasCategory) -> &BigInt {
        &self.counts[category as usize]
    }

    pub fn total(&self) -> BigInt {
        self.counts.iter().sum()
    }

    /// Categories with their consumption, in discriminant order.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, &BigInt)> {
        GasCategory::ALL.into_iter().zip(self.counts.iter())
    }
}

/// Deterministic gas ledger.
#[derive(Clone, Debug)]
pub struct GasMachine {
    used_gas: BigInt,
    protocol_version: ProtocolVersion,
    table: GasTable,
    profile: GasProfile,
    /// Oracle reads already served in this execution.
    oracle_reads: u32,
}

impl GasMachine {
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self {
            used_gas: BigInt::zero(),
            protocol_version,
            table: GasTable::for_protocol(protocol_version),
            profile: GasProfile::new(),
            oracle_reads: 0,
        }
    }

    pub fn used_gas(&self) -> &BigInt {
        &self.used_gas
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn table(&self) -> GasTable {
        self.table
    }

    pub fn profile(&self) -> &GasProfile {
        &self.profile
    }

    pub fn oracle_reads(&self) -> u32 {
        self.oracle_reads
    }

    /// Adds `amount` to the ledger and returns the new total.
    pub fn consume_gas(&mut self, category: GasCategory, amount: impl Into<BigInt>) -> &BigInt {
        let amount = amount.into();
        self.profile.add(category, &amount);
        self.used_gas += amount;
        &self.used_gas
    }

    pub fn instruction_cost(&self, opcode: Instruction) -> u64 {
        opcode.gas(self.table)
    }

    /// Cost of calling `method`. Oracle calls scale with the provider's
    /// `multiplier` and double with every read already served.
    pub fn interop_cost(
        &self,
        method: &str,
        oracle_multiplier: &BigInt,
    ) -> Result<(GasCategory, BigInt), VMError> {
        let (category, base) = GasCategory::for_extcall(method)
            .ok_or_else(|| VMError::UnknownExtcall(method.to_string()))?;
        let cost = match category {
            GasCategory::Oracle => {
                BigInt::from(base) * oracle_multiplier * (BigInt::one() << self.oracle_reads)
            }
            _ => BigInt::from(base),
        };
        Ok((category, cost))
    }

    pub fn charge_instruction(&mut self, opcode: Instruction) -> &BigInt {
        let cost = self.instruction_cost(opcode);
        self.consume_gas(GasCategory::Opcode, cost)
    }

    pub fn charge_interop(
        &mut self,
        method: &str,
        oracle_multiplier: &BigInt,
    ) -> Result<&BigInt, VMError> {
        let (category, cost) = self.interop_cost(method, oracle_multiplier)?;
        Ok(self.consume_gas(category, cost))
    }

    /// Records a served oracle read; later reads cost twice as much.
    pub fn record_oracle_read(&mut self) {
        self.oracle_reads += 1;
    }
}

impl ContextLoader for GasMachine {
    fn load_context(&mut self, name: &str) -> Option<ExecutionContext> {
        Some(ExecutionContext::dummy(name))
    }
}

impl ExecutionHost for GasMachine {
    fn validate_opcode(&mut self, _vm: &VirtualMachine, opcode: Instruction) -> Result<(), VMError> {
        self.charge_instruction(opcode);
        Ok(())
    }

    fn execute_interop(
        &mut self,
        _vm: &mut VirtualMachine,
        method: &str,
    ) -> Result<ExecutionState, VMError> {
        self.charge_interop(method, &BigInt::one())?;
        if method.starts_with("Oracle.") {
            self.record_oracle_read();
        }
        Ok(ExecutionState::Running)
    }

    fn execute_native(
        &mut self,
        _vm: &mut VirtualMachine,
        _context: &str,
    ) -> Result<ExecutionState, VMError> {
        Ok(ExecutionState::Halt)
    }
}

/// Result of a dry run.
#[derive(Clone, Debug)]
pub struct GasEstimate {
    pub state: ExecutionState,
    pub gas: GasMachine,
}

/// Runs `script` against a [`GasMachine`]: nested contexts are dummies and
/// extcalls are charged without effect.
pub fn estimate_gas(script: &[u8], config: &RuntimeConfig) -> Result<GasEstimate, VMError> {
    let mut gas = GasMachine::new(config.protocol_version);
    let mut vm = VirtualMachine::new(ExecutionContext::script("estimate", script.to_vec()), config);
    let state = vm.execute(&mut gas)?;
    Ok(GasEstimate { state, gas })
}
