//! Deterministic binary encoding.
//!
//! Everything persisted or hashed by the engine (ABI blobs, typed storage
//! values, VM objects) goes through [`Encode`] / [`Decode`].
//!
//! # Binary Format
//!
//! - Integers: little-endian, fixed-width
//! - `usize`: encoded as `u64`
//! - `bool`: single byte (0 = false, 1 = true)
//! - `Vec<T>`/`String`: 8-byte length prefix followed by elements
//! - `Option<T>`: 1-byte tag followed by the value if present
//! - [`BigInt`]: 8-byte length prefix followed by signed little-endian bytes
//! - [`VarInt`]: bytecode operand form (`<0xFD` inline, else marker + u16/u32/u64)

use ledger_vm_derive::Error;
use num_bigint::BigInt;
use std::collections::BTreeMap;

/// Sink for writing encoded bytes.
///
/// Implemented by byte buffers and hashers so values can be hashed without
/// an intermediate buffer.
pub trait EncodeSink {
    fn write(&mut self, bytes: &[u8]);
}

/// Counts encoded bytes without allocating.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Types that can be serialized to the binary format.
pub trait Encode {
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes into a buffer allocated with the exact encoded size.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid encoded value")]
    InvalidValue,
    #[error("length prefix too large")]
    LengthOverflow,
    #[error("nesting too deep")]
    NestingTooDeep,
}

/// Types that can be deserialized from the binary format.
pub trait Decode: Sized {
    /// Decodes a value, advancing `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value that must span the whole of `data`.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::InvalidValue);
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

/// Reads a fixed-size array, advancing the slice.
pub fn read_array<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    let bytes = read_bytes(input, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_array::<1>(input)?[0])
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_le_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    Ok(<$t>::from_le_bytes(read_array(input)?))
                }
            }
        )*
    };
}

impl_int!(u16, u32, u64, i32, i64);

impl Encode for usize {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (*self as u64).encode(out);
    }
}

impl Decode for usize {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let v = u64::decode(input)?;
        usize::try_from(v).map_err(|_| DecodeError::LengthOverflow)
    }
}

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self as u8]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// Maximum allowed length for decoded sequences.
const MAX_VEC_LEN: usize = 1_000_000;

pub(crate) fn read_len(input: &mut &[u8]) -> Result<usize, DecodeError> {
    let len = usize::decode(input)?;
    if len > MAX_VEC_LEN {
        return Err(DecodeError::LengthOverflow);
    }
    Ok(len)
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_slice().encode(out);
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let mut vec = Vec::with_capacity(len);
        for _ in 0..len {
            vec.push(T::decode(input)?);
        }
        Ok(vec)
    }
}

impl Encode for String {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.as_str().encode(out);
    }
}

impl Encode for str {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let bytes = read_bytes(input, len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidValue)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => 0u8.encode(out),
            Some(v) => {
                1u8.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        read_array(input)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
        self.1.encode(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok((A::decode(input)?, B::decode(input)?))
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        for (key, value) in self {
            key.encode(out);
            value.encode(out);
        }
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::decode(input)?;
            let value = V::decode(input)?;
            if map.insert(key, value).is_some() {
                return Err(DecodeError::InvalidValue);
            }
        }
        Ok(map)
    }
}

impl Encode for BigInt {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.to_signed_bytes_le().encode(out);
    }
}

impl Decode for BigInt {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        Ok(BigInt::from_signed_bytes_le(read_bytes(input, len)?))
    }
}

/// Variable-width unsigned integer used by bytecode operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VarInt(pub u64);

impl VarInt {
    /// Encoded width in bytes.
    pub fn encoded_len(value: u64) -> usize {
        match value {
            0..0xFD => 1,
            0xFD..=0xFFFF => 3,
            0x1_0000..=0xFFFF_FFFF => 5,
            _ => 9,
        }
    }
}

impl Encode for VarInt {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let value = self.0;
        if value < 0xFD {
            out.write(&[value as u8]);
        } else if let Ok(v) = u16::try_from(value) {
            out.write(&[0xFD]);
            out.write(&v.to_le_bytes());
        } else if let Ok(v) = u32::try_from(value) {
            out.write(&[0xFE]);
            out.write(&v.to_le_bytes());
        } else {
            out.write(&[0xFF]);
            out.write(&value.to_le_bytes());
        }
    }
}

impl Decode for VarInt {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let value = match u8::decode(input)? {
            0xFD => u64::from(u16::decode(input)?),
            0xFE => u64::from(u32::decode(input)?),
            0xFF => u64::decode(input)?,
            small => u64::from(small),
        };
        Ok(VarInt(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Integers ==========

    #[test]
    fn u32_little_endian() {
        let val: u32 = 0x12345678;
        let bytes = val.to_bytes();
        assert_eq!(bytes, vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(u32::from_bytes(&bytes).unwrap(), val);
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert!(bool::from_bytes(&[1]).unwrap());
        assert_eq!(bool::from_bytes(&[2]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn to_bytes_allocates_exact_capacity() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5];
        let bytes = data.to_bytes();
        assert_eq!(bytes.len(), 8 + 5);
        assert_eq!(bytes.capacity(), bytes.len());
    }

    // ========== Sequences ==========

    #[test]
    fn vec_and_str_share_layout() {
        let s = "abc";
        assert_eq!(s.to_bytes(), s.as_bytes().to_vec().to_bytes());
    }

    #[test]
    fn vec_length_overflow() {
        let bytes = ((MAX_VEC_LEN as u64) + 1).to_bytes();
        assert_eq!(
            Vec::<u8>::from_bytes(&bytes),
            Err(DecodeError::LengthOverflow)
        );
    }

    #[test]
    fn string_invalid_utf8() {
        let mut bytes = Vec::new();
        3u64.encode(&mut bytes);
        bytes.extend_from_slice(&[0xFF, 0xFE, 0x00]);
        assert_eq!(String::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn btree_map_rejects_duplicate_keys() {
        let mut bytes = Vec::new();
        2usize.encode(&mut bytes);
        (1u8, 10u8).encode(&mut bytes);
        (1u8, 11u8).encode(&mut bytes);
        assert_eq!(
            BTreeMap::<u8, u8>::from_bytes(&bytes),
            Err(DecodeError::InvalidValue)
        );
    }

    #[test]
    fn trailing_bytes_error() {
        assert_eq!(u8::from_bytes(&[42, 0xFF]), Err(DecodeError::InvalidValue));
    }

    // ========== BigInt ==========

    #[test]
    fn bigint_signed_little_endian() {
        let value = BigInt::from(-2);
        let bytes = value.to_bytes();
        assert_eq!(&bytes[..8], &1u64.to_le_bytes());
        assert_eq!(bytes[8], 0xFE);
        assert_eq!(BigInt::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn bigint_larger_than_u128() {
        let value = BigInt::from(u128::MAX) * BigInt::from(1_000_000u32);
        assert_eq!(BigInt::from_bytes(&value.to_bytes()).unwrap(), value);
    }

    // ========== VarInt ==========

    #[test]
    fn varint_widths() {
        assert_eq!(VarInt(0xFC).to_bytes(), vec![0xFC]);
        assert_eq!(VarInt(0xFD).to_bytes(), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(VarInt(0x1_0000).to_bytes(), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(VarInt(u64::MAX).to_bytes().len(), 9);
        for value in [0, 0xFC, 0xFD, 0xFFFF, 0x1_0000, u64::MAX] {
            assert_eq!(VarInt(value).to_bytes().len(), VarInt::encoded_len(value));
        }
    }

    #[test]
    fn varint_truncated_input() {
        assert_eq!(VarInt::from_bytes(&[0xFE, 0x01]), Err(DecodeError::UnexpectedEof));
    }
}
