//! 20-byte account and contract addresses.

use crate::types::hash::Hash;
use crate::utils::hex;
use ledger_vm_derive::BinaryCodec;
use std::fmt;

pub const ADDRESS_LEN: usize = 20;

/// Text prefix of a rendered address.
const TEXT_PREFIX: &str = "0x";

/// Fixed-size 20-byte address identifying accounts and contracts.
///
/// User addresses are the last 20 bytes of the SHA3-256 of a public key;
/// contract addresses are derived from the contract name the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BinaryCodec)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const fn null() -> Address {
        Address([0u8; ADDRESS_LEN])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Address> {
        <[u8; ADDRESS_LEN]>::try_from(bytes).ok().map(Address)
    }

    /// Address of a public key.
    pub fn from_public_key(key: &[u8]) -> Address {
        Self::from_hash(Hash::digest(key))
    }

    /// Address owned by the contract called `name`.
    pub fn from_contract_name(name: &str) -> Address {
        let mut h = Hash::sha3();
        h.update(b"CONTRACT");
        h.update(name.as_bytes());
        Self::from_hash(h.finalize())
    }

    fn from_hash(hash: Hash) -> Address {
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&hash.0[hash.0.len() - ADDRESS_LEN..]);
        Address(out)
    }

    /// Parses the `0x`-prefixed hex form produced by `Display`.
    pub fn from_text(text: &str) -> Option<Address> {
        let bytes = hex::decode(text.strip_prefix(TEXT_PREFIX)?)?;
        bytes.try_into().ok().map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TEXT_PREFIX}{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let addr = Address::from_public_key(b"alice");
        let text = addr.to_string();
        assert_eq!(text.len(), 2 + ADDRESS_LEN * 2);
        assert_eq!(Address::from_text(&text), Some(addr));
    }

    #[test]
    fn from_text_rejects_malformed() {
        assert_eq!(Address::from_text("alice"), None);
        assert_eq!(Address::from_text("0x1234"), None);
        assert_eq!(Address::from_text(&format!("0x{}", "zz".repeat(20))), None);
        assert_eq!(Address::from_text(&format!("0x{}", "+f".repeat(20))), None);
    }

    #[test]
    fn contract_addresses_are_distinct_from_key_addresses() {
        assert_ne!(
            Address::from_contract_name("token"),
            Address::from_public_key(b"token")
        );
        assert!(Address::null().is_null());
    }
}
