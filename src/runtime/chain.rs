//! Read-only views of the chain and oracle services the runtime consults,
//! plus the events an execution emits.

use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;
use ledger_vm_derive::BinaryCodec;
use num_bigint::BigInt;
use num_traits::One;
use std::collections::{BTreeMap, BTreeSet};

/// Block and transaction facts visible to scripts.
pub trait ChainReader {
    fn height(&self) -> u64;
    /// Block time in seconds since the epoch.
    fn time(&self) -> u32;
    fn transaction_hash(&self) -> Hash;
    /// Whether `address` signed the executing transaction.
    fn is_witness(&self, address: &Address) -> bool;
    fn lookup_name(&self, name: &str) -> Option<Address>;
    fn account_name(&self, address: &Address) -> Option<String>;
    fn last_activity(&self, address: &Address) -> Option<u32>;
    fn token_exists(&self, symbol: &str) -> bool;
    fn governance_value(&self, name: &str) -> Option<BigInt>;
}

/// External data feed. Fetching is out of scope; implementations serve
/// values already agreed on by the chain.
pub trait OracleReader {
    fn read(&mut self, url: &str) -> Result<Vec<u8>, VMError>;
    fn price(&mut self, symbol: &str) -> Result<BigInt, VMError>;
    /// Provider-defined factor in the oracle gas formula.
    fn multiplier(&self) -> BigInt {
        BigInt::one()
    }
}

/// Event emitted through `Runtime.Notify` or a native contract.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Event {
    pub kind: String,
    pub address: Address,
    /// Context that emitted the event.
    pub contract: String,
    pub data: VMObject,
}

/// In-memory [`ChainReader`] filled through builder methods.
#[derive(Clone, Debug, Default)]
pub struct StaticChain {
    height: u64,
    time: u32,
    transaction_hash: Hash,
    witnesses: BTreeSet<Address>,
    names: BTreeMap<String, Address>,
    last_activity: BTreeMap<Address, u32>,
    tokens: BTreeSet<String>,
    governance: BTreeMap<String, BigInt>,
}

impl StaticChain {
    pub fn new(height: u64, time: u32, transaction_hash: Hash) -> Self {
        Self {
            height,
            time,
            transaction_hash,
            ..Self::default()
        }
    }

    pub fn with_witness(mut self, address: Address) -> Self {
        self.witnesses.insert(address);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>, address: Address) -> Self {
        self.names.insert(name.into(), address);
        self
    }

    pub fn with_last_activity(mut self, address: Address, time: u32) -> Self {
        self.last_activity.insert(address, time);
        self
    }

    pub fn with_token(mut self, symbol: impl Into<String>) -> Self {
        self.tokens.insert(symbol.into());
        self
    }

    pub fn with_governance_value(mut self, name: impl Into<String>, value: impl Into<BigInt>) -> Self {
        self.governance.insert(name.into(), value.into());
        self
    }
}

impl ChainReader for StaticChain {
    fn height(&self) -> u64 {
        self.height
    }

    fn time(&self) -> u32 {
        self.time
    }

    fn transaction_hash(&self) -> Hash {
        self.transaction_hash
    }

    fn is_witness(&self, address: &Address) -> bool {
        self.witnesses.contains(address)
    }

    fn lookup_name(&self, name: &str) -> Option<Address> {
        self.names.get(name).copied()
    }

    fn account_name(&self, address: &Address) -> Option<String> {
        self.names
            .iter()
            .find(|(_, a)| *a == address)
            .map(|(name, _)| name.clone())
    }

    fn last_activity(&self, address: &Address) -> Option<u32> {
        self.last_activity.get(address).copied()
    }

    fn token_exists(&self, symbol: &str) -> bool {
        self.tokens.contains(symbol)
    }

    fn governance_value(&self, name: &str) -> Option<BigInt> {
        self.governance.get(name).cloned()
    }
}

/// Oracle with a fixed set of answers.
#[derive(Clone, Debug)]
pub struct StaticOracle {
    multiplier: BigInt,
    data: BTreeMap<String, Vec<u8>>,
    prices: BTreeMap<String, BigInt>,
}

impl Default for StaticOracle {
    fn default() -> Self {
        Self {
            multiplier: BigInt::one(),
            data: BTreeMap::new(),
            prices: BTreeMap::new(),
        }
    }
}

impl StaticOracle {
    pub fn new(multiplier: impl Into<BigInt>) -> Self {
        Self {
            multiplier: multiplier.into(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, url: impl Into<String>, data: Vec<u8>) -> Self {
        self.data.insert(url.into(), data);
        self
    }

    pub fn with_price(mut self, symbol: impl Into<String>, price: impl Into<BigInt>) -> Self {
        self.prices.insert(symbol.into(), price.into());
        self
    }
}

impl OracleReader for StaticOracle {
    fn read(&mut self, url: &str) -> Result<Vec<u8>, VMError> {
        self.data
            .get(url)
            .cloned()
            .ok_or_else(|| VMError::OracleUnavailable(url.to_string()))
    }

    fn price(&mut self, symbol: &str) -> Result<BigInt, VMError> {
        self.prices
            .get(symbol)
            .cloned()
            .ok_or_else(|| VMError::OracleUnavailable(symbol.to_string()))
    }

    fn multiplier(&self) -> BigInt {
        self.multiplier.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn names_resolve_both_ways() {
        let alice = Address::from_public_key(b"alice");
        let chain = StaticChain::default().with_name("alice", alice);
        assert_eq!(chain.lookup_name("alice"), Some(alice));
        assert_eq!(chain.account_name(&alice).as_deref(), Some("alice"));
        assert_eq!(chain.lookup_name("bob"), None);
    }

    #[test]
    fn oracle_misses_are_errors() {
        let mut oracle = StaticOracle::new(2).with_price("SOUL", 15);
        assert_eq!(oracle.price("SOUL").unwrap(), BigInt::from(15));
        assert!(matches!(oracle.read("http://x"), Err(VMError::OracleUnavailable(_))));
        assert_eq!(oracle.multiplier(), BigInt::from(2));
    }

    #[test]
    fn events_encode() {
        let event = Event {
            kind: "Mint".into(),
            address: Address::from_public_key(b"a"),
            contract: "token".into(),
            data: VMObject::from_number(5),
        };
        assert_eq!(Event::from_bytes(&event.to_bytes()).unwrap(), event);
    }
}
