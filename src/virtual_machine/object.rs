//! Tagged values manipulated by scripts.
//!
//! A [`VMObject`]'s tag fully determines which accessor succeeds. Accessors
//! convert along a fixed table (see `as_*`) and fail with
//! [`VMError::CannotConvert`] instead of truncating. Arrays are structs keyed
//! by `Number(0..n)`.

use crate::types::address::Address;
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_array, read_len};
use crate::types::hash::Hash;
use crate::utils::hex;
use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Deepest struct nesting a value may have. Decoding, `PUT` and `PACK`
/// refuse to go past it.
pub const MAX_NESTING: usize = 64;

/// Wire tag of a [`VMObject`].
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VMType {
    None = 0,
    Struct = 1,
    Bytes = 2,
    Number = 3,
    String = 4,
    Timestamp = 5,
    Bool = 6,
    Enum = 7,
    Object = 8,
}

impl VMType {
    pub const ALL: [VMType; 9] = [
        VMType::None,
        VMType::Struct,
        VMType::Bytes,
        VMType::Number,
        VMType::String,
        VMType::Timestamp,
        VMType::Bool,
        VMType::Enum,
        VMType::Object,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            VMType::None => "None",
            VMType::Struct => "Struct",
            VMType::Bytes => "Bytes",
            VMType::Number => "Number",
            VMType::String => "String",
            VMType::Timestamp => "Timestamp",
            VMType::Bool => "Bool",
            VMType::Enum => "Enum",
            VMType::Object => "Object",
        }
    }

    /// Case-insensitive lookup by [`VMType::name`].
    pub fn from_name(name: &str) -> Option<VMType> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u8> for VMType {
    type Error = VMError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(VMError::InvalidTypeTag(value))
    }
}

impl fmt::Display for VMType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Encode for VMType {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u8).encode(out);
    }
}

impl Decode for VMType {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        VMType::try_from(u8::decode(input)?).map_err(|_| DecodeError::InvalidValue)
    }
}

/// Opaque handle carried by [`VMObject::Object`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectHandle {
    Address(Address),
    Hash(Hash),
    /// Resolved execution context, produced by `CTX`. Never serialized.
    Context(ExecutionContext),
}

impl ObjectHandle {
    fn kind(&self) -> &'static str {
        match self {
            ObjectHandle::Address(_) => "Address",
            ObjectHandle::Hash(_) => "Hash",
            ObjectHandle::Context(_) => "ExecutionContext",
        }
    }
}

/// Conversion target names used in error messages.
const NUMBER_TARGET: &str = "BigInteger";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VMObject {
    None,
    Struct(BTreeMap<VMObject, VMObject>),
    Bytes(Vec<u8>),
    Number(BigInt),
    String(String),
    /// Seconds since the Unix epoch.
    Timestamp(u32),
    Bool(bool),
    Enum(u32),
    Object(ObjectHandle),
}

impl Default for VMObject {
    fn default() -> Self {
        VMObject::None
    }
}

impl VMObject {
    pub fn vm_type(&self) -> VMType {
        match self {
            VMObject::None => VMType::None,
            VMObject::Struct(_) => VMType::Struct,
            VMObject::Bytes(_) => VMType::Bytes,
            VMObject::Number(_) => VMType::Number,
            VMObject::String(_) => VMType::String,
            VMObject::Timestamp(_) => VMType::Timestamp,
            VMObject::Bool(_) => VMType::Bool,
            VMObject::Enum(_) => VMType::Enum,
            VMObject::Object(_) => VMType::Object,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, VMObject::None)
    }

    fn cannot_convert(&self, to: &'static str) -> VMError {
        VMError::CannotConvert {
            from: self.vm_type(),
            value: self.to_string(),
            to,
        }
    }

    // ---- constructors ----

    pub fn from_number(value: impl Into<BigInt>) -> Self {
        VMObject::Number(value.into())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        VMObject::String(value.into())
    }

    pub fn from_address(address: Address) -> Self {
        VMObject::Object(ObjectHandle::Address(address))
    }

    pub fn from_hash(hash: Hash) -> Self {
        VMObject::Object(ObjectHandle::Hash(hash))
    }

    pub fn from_context(context: ExecutionContext) -> Self {
        VMObject::Object(ObjectHandle::Context(context))
    }

    /// Struct nesting level: 0 for scalars, 1 for a flat struct.
    pub fn depth(&self) -> usize {
        match self {
            VMObject::Struct(fields) => {
                1 + fields
                    .iter()
                    .map(|(k, v)| k.depth().max(v.depth()))
                    .max()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Array encoding: a struct keyed by `Number(0..n)`.
    pub fn from_array(items: impl IntoIterator<Item = VMObject>) -> Self {
        VMObject::Struct(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (VMObject::from_number(i), item))
                .collect(),
        )
    }

    /// Record encoding: a struct keyed by field name.
    pub fn from_fields<K: Into<String>>(fields: impl IntoIterator<Item = (K, VMObject)>) -> Self {
        VMObject::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (VMObject::String(name.into()), value))
                .collect(),
        )
    }

    // ---- accessors ----

    pub fn as_number(&self) -> Result<BigInt, VMError> {
        match self {
            VMObject::Number(n) => Ok(n.clone()),
            VMObject::Timestamp(t) => Ok(BigInt::from(*t)),
            VMObject::Enum(e) => Ok(BigInt::from(*e)),
            VMObject::Bool(b) => Ok(BigInt::from(u8::from(*b))),
            VMObject::String(s) if is_decimal(s) => BigInt::from_str(s)
                .map_err(|_| self.cannot_convert(NUMBER_TARGET)),
            VMObject::Bytes(bytes) => Ok(BigInt::from_signed_bytes_le(bytes)),
            _ => Err(self.cannot_convert(NUMBER_TARGET)),
        }
    }

    pub fn as_string(&self) -> Result<String, VMError> {
        match self {
            VMObject::String(s) => Ok(s.clone()),
            VMObject::Number(n) => Ok(n.to_string()),
            VMObject::Bool(b) => Ok(b.to_string()),
            VMObject::Timestamp(v) | VMObject::Enum(v) => Ok(v.to_string()),
            VMObject::Bytes(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| self.cannot_convert("String"))
            }
            VMObject::Object(ObjectHandle::Address(address)) => Ok(address.to_string()),
            VMObject::Object(ObjectHandle::Hash(hash)) => Ok(hash.to_string()),
            _ => Err(self.cannot_convert("String")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, VMError> {
        match self {
            VMObject::Bool(b) => Ok(*b),
            VMObject::Number(n) => Ok(!n.is_zero()),
            VMObject::String(s) if s == "true" => Ok(true),
            VMObject::String(s) if s == "false" => Ok(false),
            VMObject::Bytes(bytes) if bytes.as_slice() == [0] => Ok(false),
            VMObject::Bytes(bytes) if bytes.as_slice() == [1] => Ok(true),
            _ => Err(self.cannot_convert("Bool")),
        }
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, VMError> {
        match self {
            VMObject::None => Ok(Vec::new()),
            VMObject::Bytes(bytes) => Ok(bytes.clone()),
            VMObject::String(s) => Ok(s.as_bytes().to_vec()),
            VMObject::Number(n) => Ok(n.to_signed_bytes_le()),
            VMObject::Bool(b) => Ok(vec![u8::from(*b)]),
            VMObject::Timestamp(v) | VMObject::Enum(v) => Ok(v.to_le_bytes().to_vec()),
            VMObject::Object(ObjectHandle::Address(address)) => Ok(address.0.to_vec()),
            VMObject::Object(ObjectHandle::Hash(hash)) => Ok(hash.0.to_vec()),
            VMObject::Struct(_) => self.serialize(),
            VMObject::Object(ObjectHandle::Context(_)) => Err(self.cannot_convert("Bytes")),
        }
    }

    pub fn as_timestamp(&self) -> Result<u32, VMError> {
        match self {
            VMObject::Timestamp(t) => Ok(*t),
            VMObject::Number(n) => n.to_u32().ok_or_else(|| self.cannot_convert("Timestamp")),
            _ => Err(self.cannot_convert("Timestamp")),
        }
    }

    pub fn as_enum(&self) -> Result<u32, VMError> {
        match self {
            VMObject::Enum(e) => Ok(*e),
            VMObject::Number(n) => n.to_u32().ok_or_else(|| self.cannot_convert("Enum")),
            _ => Err(self.cannot_convert("Enum")),
        }
    }

    /// Address handle, `0x…` text, or 20 raw bytes.
    pub fn as_address(&self) -> Result<Address, VMError> {
        match self {
            VMObject::Object(ObjectHandle::Address(address)) => Ok(*address),
            VMObject::String(s) => {
                Address::from_text(s).ok_or_else(|| self.cannot_convert("Address"))
            }
            VMObject::Bytes(bytes) => {
                Address::from_slice(bytes).ok_or_else(|| self.cannot_convert("Address"))
            }
            _ => Err(self.cannot_convert("Address")),
        }
    }

    pub fn as_hash(&self) -> Result<Hash, VMError> {
        match self {
            VMObject::Object(ObjectHandle::Hash(hash)) => Ok(*hash),
            VMObject::Bytes(bytes) => {
                Hash::from_slice(bytes).ok_or_else(|| self.cannot_convert("Hash"))
            }
            _ => Err(self.cannot_convert("Hash")),
        }
    }

    pub fn as_context(&self) -> Result<&ExecutionContext, VMError> {
        match self {
            VMObject::Object(ObjectHandle::Context(context)) => Ok(context),
            _ => Err(self.cannot_convert("ExecutionContext")),
        }
    }

    pub fn as_struct(&self) -> Result<&BTreeMap<VMObject, VMObject>, VMError> {
        match self {
            VMObject::Struct(fields) => Ok(fields),
            _ => Err(self.cannot_convert("Struct")),
        }
    }

    /// Elements of an array-encoded struct, in index order.
    pub fn to_array(&self) -> Result<Vec<VMObject>, VMError> {
        let fields = self.as_struct()?;
        let mut items = Vec::with_capacity(fields.len());
        for (i, (key, value)) in fields.iter().enumerate() {
            if *key != VMObject::from_number(i) {
                return Err(self.cannot_convert("Array"));
            }
            items.push(value.clone());
        }
        Ok(items)
    }

    /// `CAST` semantics: converts along the accessor table.
    pub fn cast_to(&self, ty: VMType) -> Result<VMObject, VMError> {
        if self.vm_type() == ty {
            return Ok(self.clone());
        }
        Ok(match ty {
            VMType::None => VMObject::None,
            VMType::Bytes => VMObject::Bytes(self.as_bytes()?),
            VMType::Number => VMObject::Number(self.as_number()?),
            VMType::String => VMObject::String(self.as_string()?),
            VMType::Timestamp => VMObject::Timestamp(self.as_timestamp()?),
            VMType::Bool => VMObject::Bool(self.as_bool()?),
            VMType::Enum => VMObject::Enum(self.as_enum()?),
            VMType::Struct => match self {
                VMObject::Bytes(bytes) => VMObject::deserialize(bytes)?,
                _ => return Err(self.cannot_convert("Struct")),
            },
            VMType::Object => VMObject::from_address(self.as_address()?),
        })
    }

    /// Number of entries for structs, 0 for `None`, 1 otherwise.
    pub fn count(&self) -> usize {
        match self {
            VMObject::Struct(fields) => fields.len(),
            VMObject::None => 0,
            _ => 1,
        }
    }

    // ---- serialization ----

    pub fn is_serializable(&self) -> bool {
        match self {
            VMObject::Object(ObjectHandle::Context(_)) => false,
            VMObject::Struct(fields) => fields
                .iter()
                .all(|(k, v)| k.is_serializable() && v.is_serializable()),
            _ => true,
        }
    }

    /// Tag byte followed by the payload.
    pub fn serialize(&self) -> Result<Vec<u8>, VMError> {
        if !self.is_serializable() {
            return Err(VMError::NotSerializable("ExecutionContext"));
        }
        Ok(self.to_bytes())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<VMObject, VMError> {
        Ok(VMObject::from_bytes(bytes)?)
    }

    /// Builds an object of type `ty` from a raw `LOAD` payload.
    pub fn from_raw(ty: VMType, data: &[u8]) -> Result<VMObject, VMError> {
        let mut input = data;
        let object = match ty {
            VMType::None => VMObject::None,
            VMType::Bytes => VMObject::Bytes(data.to_vec()),
            VMType::Number => VMObject::Number(BigInt::from_signed_bytes_le(data)),
            VMType::String => VMObject::String(
                String::from_utf8(data.to_vec()).map_err(|_| DecodeError::InvalidValue)?,
            ),
            VMType::Bool => match data {
                [0] => VMObject::Bool(false),
                [1] => VMObject::Bool(true),
                _ => return Err(DecodeError::InvalidValue.into()),
            },
            VMType::Timestamp => VMObject::Timestamp(u32::from_le_bytes(read_array(&mut input)?)),
            VMType::Enum => VMObject::Enum(u32::from_le_bytes(read_array(&mut input)?)),
            VMType::Struct => return VMObject::deserialize(data),
            VMType::Object => VMObject::Object(ObjectHandle::decode(&mut input)?),
        };
        if matches!(ty, VMType::Timestamp | VMType::Enum | VMType::Object) && !input.is_empty() {
            return Err(DecodeError::InvalidValue.into());
        }
        Ok(object)
    }

    /// Inverse of [`VMObject::from_raw`].
    pub fn to_raw(&self) -> Result<Vec<u8>, VMError> {
        match self {
            VMObject::Struct(_) => self.serialize(),
            VMObject::Object(handle) => {
                if let ObjectHandle::Context(_) = handle {
                    return Err(VMError::NotSerializable(handle.kind()));
                }
                Ok(handle.to_bytes())
            }
            _ => self.as_bytes(),
        }
    }
}

fn is_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl Encode for ObjectHandle {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            ObjectHandle::Address(address) => {
                0u8.encode(out);
                address.encode(out);
            }
            ObjectHandle::Hash(hash) => {
                1u8.encode(out);
                hash.encode(out);
            }
            // Guarded by `is_serializable`; decoding rejects this tag.
            ObjectHandle::Context(context) => {
                2u8.encode(out);
                context.name().encode(out);
            }
        }
    }
}

impl Decode for ObjectHandle {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(ObjectHandle::Address(Address::decode(input)?)),
            1 => Ok(ObjectHandle::Hash(Hash::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl Encode for VMObject {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.vm_type().encode(out);
        match self {
            VMObject::None => {}
            VMObject::Struct(fields) => fields.encode(out),
            VMObject::Bytes(bytes) => bytes.encode(out),
            VMObject::Number(n) => n.encode(out),
            VMObject::String(s) => s.encode(out),
            VMObject::Timestamp(v) | VMObject::Enum(v) => v.encode(out),
            VMObject::Bool(b) => b.encode(out),
            VMObject::Object(handle) => handle.encode(out),
        }
    }
}

impl Decode for VMObject {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        decode_object(input, 0)
    }
}

fn decode_object(input: &mut &[u8], depth: usize) -> Result<VMObject, DecodeError> {
    Ok(match VMType::decode(input)? {
        VMType::None => VMObject::None,
        VMType::Struct => {
            if depth >= MAX_NESTING {
                return Err(DecodeError::NestingTooDeep);
            }
            let len = read_len(input)?;
            let mut fields = BTreeMap::new();
            for _ in 0..len {
                let key = decode_object(input, depth + 1)?;
                let value = decode_object(input, depth + 1)?;
                if fields.insert(key, value).is_some() {
                    return Err(DecodeError::InvalidValue);
                }
            }
            VMObject::Struct(fields)
        }
        VMType::Bytes => VMObject::Bytes(Vec::decode(input)?),
        VMType::Number => VMObject::Number(BigInt::decode(input)?),
        VMType::String => VMObject::String(String::decode(input)?),
        VMType::Timestamp => VMObject::Timestamp(u32::decode(input)?),
        VMType::Bool => VMObject::Bool(bool::decode(input)?),
        VMType::Enum => VMObject::Enum(u32::decode(input)?),
        VMType::Object => VMObject::Object(ObjectHandle::decode(input)?),
    })
}

impl fmt::Display for VMObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMObject::None => f.write_str("null"),
            VMObject::Struct(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            VMObject::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            VMObject::Number(n) => write!(f, "{n}"),
            VMObject::String(s) => f.write_str(s),
            VMObject::Timestamp(t) => write!(f, "{t}"),
            VMObject::Bool(b) => write!(f, "{b}"),
            VMObject::Enum(e) => write!(f, "{e}"),
            VMObject::Object(ObjectHandle::Address(address)) => write!(f, "{address}"),
            VMObject::Object(ObjectHandle::Hash(hash)) => write!(f, "{hash}"),
            VMObject::Object(ObjectHandle::Context(context)) => write!(f, "<{}>", context.name()),
        }
    }
}

impl From<bool> for VMObject {
    fn from(value: bool) -> Self {
        VMObject::Bool(value)
    }
}

impl From<&str> for VMObject {
    fn from(value: &str) -> Self {
        VMObject::String(value.to_string())
    }
}

impl From<String> for VMObject {
    fn from(value: String) -> Self {
        VMObject::String(value)
    }
}

impl From<BigInt> for VMObject {
    fn from(value: BigInt) -> Self {
        VMObject::Number(value)
    }
}

impl From<i64> for VMObject {
    fn from(value: i64) -> Self {
        VMObject::Number(value.into())
    }
}

impl From<Vec<u8>> for VMObject {
    fn from(value: Vec<u8>) -> Self {
        VMObject::Bytes(value)
    }
}

impl From<Address> for VMObject {
    fn from(value: Address) -> Self {
        VMObject::from_address(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Conversions ====================

    #[test]
    fn numeric_string_converts() {
        assert_eq!(VMObject::from("-42").as_number().unwrap(), BigInt::from(-42));
    }

    #[test]
    fn non_numeric_string_names_the_value() {
        let err = VMObject::from("abc").as_number().unwrap_err();
        assert_eq!(err.to_string(), "Cannot convert String 'abc' to BigInteger.");
        assert!(err.is_fault());
    }

    #[test]
    fn signed_strings_must_have_digits() {
        assert!(VMObject::from("-").as_number().is_err());
        assert!(VMObject::from("+5").as_number().is_err());
        assert!(VMObject::from("").as_number().is_err());
    }

    #[test]
    fn timestamp_does_not_truncate() {
        let too_big = VMObject::from_number(u64::from(u32::MAX) + 1);
        assert!(too_big.as_timestamp().is_err());
        assert_eq!(VMObject::from_number(7).as_timestamp().unwrap(), 7);
    }

    #[test]
    fn bool_conversions() {
        assert!(VMObject::from_number(3).as_bool().unwrap());
        assert!(!VMObject::from("false").as_bool().unwrap());
        assert!(VMObject::from("yes").as_bool().is_err());
    }

    #[test]
    fn address_from_text_and_bytes() {
        let addr = Address::from_public_key(b"bob");
        assert_eq!(VMObject::from(addr.to_string()).as_address().unwrap(), addr);
        assert_eq!(VMObject::Bytes(addr.0.to_vec()).as_address().unwrap(), addr);
        assert!(VMObject::from("bob").as_address().is_err());
    }

    #[test]
    fn cast_to_string_and_back() {
        let n = VMObject::from_number(1234);
        let s = n.cast_to(VMType::String).unwrap();
        assert_eq!(s, VMObject::from("1234"));
        assert_eq!(s.cast_to(VMType::Number).unwrap(), n);
    }

    // ==================== Arrays ====================

    #[test]
    fn array_round_trip() {
        let items = vec![VMObject::from("a"), VMObject::from_number(2), VMObject::Bool(true)];
        let array = VMObject::from_array(items.clone());
        assert_eq!(array.count(), 3);
        assert_eq!(array.to_array().unwrap(), items);
    }

    #[test]
    fn record_is_not_an_array() {
        let record = VMObject::from_fields([("name", VMObject::from("x"))]);
        assert!(record.to_array().is_err());
    }

    // ==================== Serialization ====================

    #[test]
    fn nested_struct_serialization() {
        let inner = VMObject::from_array([VMObject::from_number(-5), VMObject::None]);
        let outer = VMObject::from_fields([
            ("inner", inner),
            ("owner", VMObject::from_address(Address::from_public_key(b"k"))),
            ("when", VMObject::Timestamp(1_700_000_000)),
        ]);
        let bytes = outer.serialize().unwrap();
        assert_eq!(bytes[0], VMType::Struct as u8);
        assert_eq!(VMObject::deserialize(&bytes).unwrap(), outer);
    }

    #[test]
    fn nesting_is_limited_on_deserialize() {
        let mut value = VMObject::None;
        for _ in 0..MAX_NESTING {
            value = VMObject::from_array([value]);
        }
        assert_eq!(value.depth(), MAX_NESTING);
        let bytes = value.serialize().unwrap();
        assert_eq!(VMObject::deserialize(&bytes).unwrap(), value);

        let deeper = VMObject::from_array([value]).serialize().unwrap();
        let err = VMObject::deserialize(&deeper).unwrap_err();
        assert!(matches!(err, VMError::NestingTooDeep { limit: MAX_NESTING }));
        assert!(err.is_fault());
    }

    #[test]
    fn struct_keys_count_toward_nesting() {
        let key = VMObject::from_array([VMObject::from_array([VMObject::None])]);
        let outer = VMObject::Struct(BTreeMap::from([(key, VMObject::Bool(true))]));
        assert_eq!(outer.depth(), 3);
    }

    #[test]
    fn duplicate_struct_keys_are_rejected() {
        let mut bytes = vec![VMType::Struct as u8];
        bytes.extend_from_slice(&2u64.to_le_bytes());
        for _ in 0..2 {
            bytes.extend(VMObject::from("k").to_bytes());
            bytes.extend(VMObject::Bool(true).to_bytes());
        }
        assert!(matches!(
            VMObject::deserialize(&bytes),
            Err(VMError::Decode(DecodeError::InvalidValue))
        ));
    }

    #[test]
    fn context_handles_are_not_serializable() {
        let ctx = VMObject::from_context(ExecutionContext::dummy("gas"));
        assert!(matches!(ctx.serialize(), Err(VMError::NotSerializable(_))));
        let holder = VMObject::from_array([ctx]);
        assert!(!holder.is_serializable());
    }

    #[test]
    fn raw_payloads() {
        assert_eq!(
            VMObject::from_raw(VMType::Number, &[5]).unwrap(),
            VMObject::from_number(5)
        );
        assert_eq!(
            VMObject::from_raw(VMType::String, b"hi").unwrap(),
            VMObject::from("hi")
        );
        assert!(VMObject::from_raw(VMType::Bool, &[2]).is_err());
        assert!(VMObject::from_raw(VMType::Timestamp, &[1, 2, 3, 4, 5]).is_err());
        let t = VMObject::Timestamp(99);
        assert_eq!(VMObject::from_raw(VMType::Timestamp, &t.to_raw().unwrap()).unwrap(), t);
    }

    #[test]
    fn type_tags() {
        assert_eq!(VMType::try_from(3).unwrap(), VMType::Number);
        assert!(matches!(VMType::try_from(9), Err(VMError::InvalidTypeTag(9))));
        assert_eq!(VMType::from_name("timestamp"), Some(VMType::Timestamp));
    }
}
