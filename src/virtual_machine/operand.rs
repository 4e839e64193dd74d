//! Operand kinds and the bytecode reader.
//!
//! Operands are laid out right after the opcode byte:
//! - `Reg`: 1 byte register index
//! - `Var`: var-int (`<0xFD` inline, `0xFD`+u16, `0xFE`+u32, `0xFF`+u64)
//! - `Type`: 1 byte [`VMType`] tag
//! - `Data`: var-int length followed by that many raw bytes

use crate::types::encoding::{Decode, DecodeError, Encode, VarInt};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMType;

/// Encoding class of an instruction operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    Reg,
    Var,
    Type,
    Data,
}

/// Cursor over a script's bytes.
///
/// Every read fails with [`VMError::UnexpectedEndOfScript`] instead of
/// running past the end.
pub struct ScriptReader<'a> {
    script: &'a [u8],
    pos: usize,
}

impl<'a> ScriptReader<'a> {
    pub fn new(script: &'a [u8], pos: usize) -> Self {
        Self { script, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.script.len()
    }

    fn eof(&self) -> VMError {
        VMError::UnexpectedEndOfScript { offset: self.pos }
    }

    pub fn read_u8(&mut self) -> Result<u8, VMError> {
        let byte = *self.script.get(self.pos).ok_or_else(|| self.eof())?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_var(&mut self) -> Result<u64, VMError> {
        let mut input = self.script.get(self.pos..).ok_or_else(|| self.eof())?;
        let before = input.len();
        let value = VarInt::decode(&mut input).map_err(|err| match err {
            DecodeError::UnexpectedEof => self.eof(),
            other => VMError::Decode(other),
        })?;
        self.pos += before - input.len();
        Ok(value.0)
    }

    /// Var-int operand that must fit a script offset.
    pub fn read_offset(&mut self) -> Result<usize, VMError> {
        let at = self.pos;
        let value = self.read_var()?;
        usize::try_from(value).map_err(|_| VMError::InvalidIP { ip: at })
    }

    pub fn read_type(&mut self) -> Result<VMType, VMError> {
        VMType::try_from(self.read_u8()?)
    }

    pub fn read_data(&mut self) -> Result<&'a [u8], VMError> {
        let len = self.read_offset()?;
        let end = self.pos.checked_add(len).ok_or_else(|| self.eof())?;
        let data = self.script.get(self.pos..end).ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(data)
    }
}

// ---------- encoding ----------

pub fn emit_reg(out: &mut Vec<u8>, reg: u8) {
    out.push(reg);
}

pub fn emit_var(out: &mut Vec<u8>, value: u64) {
    VarInt(value).encode(out);
}

/// Fixed 5-byte var-int, used for label references so instruction sizes do
/// not depend on where labels land.
pub fn emit_var_wide(out: &mut Vec<u8>, value: u32) {
    out.push(0xFE);
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn emit_type(out: &mut Vec<u8>, ty: VMType) {
    out.push(ty as u8);
}

pub fn emit_data(out: &mut Vec<u8>, data: &[u8]) {
    emit_var(out, data.len() as u64);
    out.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_each_kind() {
        let mut script = vec![7u8];
        emit_var(&mut script, 300);
        emit_type(&mut script, VMType::String);
        emit_data(&mut script, b"hey");

        let mut reader = ScriptReader::new(&script, 0);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_var().unwrap(), 300);
        assert_eq!(reader.read_type().unwrap(), VMType::String);
        assert_eq!(reader.read_data().unwrap(), b"hey");
        assert!(reader.is_at_end());
    }

    #[test]
    fn wide_var_decodes_like_minimal() {
        let mut script = Vec::new();
        emit_var_wide(&mut script, 5);
        assert_eq!(script.len(), 5);
        assert_eq!(ScriptReader::new(&script, 0).read_var().unwrap(), 5);
    }

    #[test]
    fn truncated_operand_reports_offset() {
        let script = [0xFD, 0x01];
        let err = ScriptReader::new(&script, 0).read_var().unwrap_err();
        assert!(matches!(err, VMError::UnexpectedEndOfScript { offset: 0 }));

        let mut data = Vec::new();
        emit_var(&mut data, 10);
        data.extend_from_slice(b"short");
        let mut reader = ScriptReader::new(&data, 0);
        assert!(matches!(
            reader.read_data(),
            Err(VMError::UnexpectedEndOfScript { .. })
        ));
    }

    #[test]
    fn invalid_type_tag() {
        let script = [42u8];
        assert!(matches!(
            ScriptReader::new(&script, 0).read_type(),
            Err(VMError::InvalidTypeTag(42))
        ));
    }
}
