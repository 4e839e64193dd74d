//! Bytecode listing: one `"{offset:03}: {MNEMONIC} {operands}"` line per
//! instruction, in the syntax the assembler reads back.

use crate::utils::hex;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::object::{ObjectHandle, VMObject, VMType};
use crate::virtual_machine::operand::{OperandKind, ScriptReader};
use std::fmt;

/// A decoded operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    Var(u64),
    Type(VMType),
    /// `LOAD` payload, already interpreted by its type tag.
    Literal(VMObject),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "r{r}"),
            Operand::Var(v) => write!(f, "{v}"),
            Operand::Type(ty) => write!(f, "{ty}"),
            Operand::Literal(value) => f.write_str(&render_literal(value)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub offset: usize,
    pub instruction: Instruction,
    pub operands: Vec<Operand>,
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}: {}", self.offset, self.instruction.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write!(f, "{operand}")?;
        }
        Ok(())
    }
}

/// Renders a value as the assembler's `LOAD` literal syntax.
pub fn render_literal(value: &VMObject) -> String {
    match value {
        VMObject::Number(n) => n.to_string(),
        VMObject::String(s) => {
            let escaped = s
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n")
                .replace('\t', "\\t");
            format!("\"{escaped}\"")
        }
        VMObject::Bool(b) => b.to_string(),
        VMObject::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        VMObject::None => "None".to_string(),
        VMObject::Timestamp(v) => format!("Timestamp:{v}"),
        VMObject::Enum(v) => format!("Enum:{v}"),
        VMObject::Object(ObjectHandle::Address(address)) => format!("Address:{address}"),
        VMObject::Object(ObjectHandle::Hash(hash)) => format!("Hash:0x{hash}"),
        VMObject::Object(ObjectHandle::Context(context)) => format!("<{}>", context.name()),
        VMObject::Struct(_) => match value.serialize() {
            Ok(bytes) => format!("Struct:0x{}", hex::encode(&bytes)),
            Err(_) => value.to_string(),
        },
    }
}

/// Decodes the instruction starting at the reader's position.
pub fn decode_instruction(reader: &mut ScriptReader<'_>) -> Result<DecodedInstruction, VMError> {
    let offset = reader.position();
    let opcode = reader.read_u8()?;
    let instruction = Instruction::try_from(opcode)
        .map_err(|_| VMError::InvalidOpcode { opcode, offset })?;

    let kinds = instruction.operands();
    let mut operands = Vec::with_capacity(kinds.len());
    let mut i = 0;
    while i < kinds.len() {
        match kinds[i] {
            OperandKind::Reg => operands.push(Operand::Reg(reader.read_u8()?)),
            OperandKind::Var => operands.push(Operand::Var(reader.read_var()?)),
            OperandKind::Type if kinds.get(i + 1) == Some(&OperandKind::Data) => {
                let ty = reader.read_type()?;
                let data = reader.read_data()?;
                operands.push(Operand::Literal(VMObject::from_raw(ty, data)?));
                i += 1;
            }
            OperandKind::Type => operands.push(Operand::Type(reader.read_type()?)),
            OperandKind::Data => {
                operands.push(Operand::Literal(VMObject::Bytes(reader.read_data()?.to_vec())))
            }
        }
        i += 1;
    }

    Ok(DecodedInstruction {
        offset,
        instruction,
        operands,
    })
}

/// Decodes a whole script.
pub fn disassemble(script: &[u8]) -> Result<Vec<DecodedInstruction>, VMError> {
    let mut reader = ScriptReader::new(script, 0);
    let mut out = Vec::new();
    while !reader.is_at_end() {
        out.push(decode_instruction(&mut reader)?);
    }
    Ok(out)
}

/// Disassembly listing, one line per instruction.
pub fn disassemble_to_string(script: &[u8]) -> Result<String, VMError> {
    let mut listing = String::new();
    for instr in disassemble(script)? {
        listing.push_str(&instr.to_string());
        listing.push('\n');
    }
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::address::Address;
    use crate::virtual_machine::assembler::assemble_source;

    fn listing(source: &str) -> Vec<String> {
        let script = assemble_source(source).unwrap().script;
        disassemble(&script)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn offsets_are_zero_padded() {
        assert_eq!(
            listing("ADD r0, r1, r2\nNOP\nRET"),
            vec!["000: ADD r0, r1, r2", "004: NOP", "005: RET"]
        );
    }

    #[test]
    fn load_literals_render_back() {
        let addr = Address::from_public_key(b"a");
        let source = format!(
            "LOAD r1, 5\nLOAD r2, \"abc\"\nLOAD r3, true\nLOAD r4, 0x0aff\nLOAD r5, Timestamp:9\nLOAD r6, Address:{addr}"
        );
        let lines = listing(&source);
        assert_eq!(lines[0], "000: LOAD r1, 5");
        assert!(lines[1].ends_with("LOAD r2, \"abc\""));
        assert!(lines[2].ends_with("LOAD r3, true"));
        assert!(lines[3].ends_with("LOAD r4, 0x0aff"));
        assert!(lines[4].ends_with("LOAD r5, Timestamp:9"));
        assert!(lines[5].ends_with(&format!("LOAD r6, Address:{addr}")));
    }

    #[test]
    fn listing_reassembles_with_narrow_offsets() {
        // label targets are emitted as 5-byte var-ints, numeric ones as 1 byte
        let source = "LOAD r0, \"say \\\"hi\\\"\"\nCAST r0, r1, Number\nstart: JMPIF r1, start\nRANGE r0, r2, 1, 300\nPACK r3, 2\nRET";
        let script = assemble_source(source).unwrap().script;
        let text: String = disassemble(&script)
            .unwrap()
            .iter()
            .map(|i| {
                let line = i.to_string();
                format!("{}\n", &line[5..])
            })
            .collect();
        let again = assemble_source(&text).unwrap().script;
        assert_eq!(disassemble(&again).unwrap().len(), disassemble(&script).unwrap().len());
        assert_eq!(
            disassemble_to_string(&script).unwrap().lines().last(),
            Some("033: RET")
        );
        assert_eq!(
            disassemble_to_string(&again).unwrap().lines().last(),
            Some("029: RET")
        );
    }

    #[test]
    fn invalid_opcode_reports_offset() {
        let err = disassemble(&[Instruction::Nop as u8, 0xEE]).unwrap_err();
        assert!(matches!(
            err,
            VMError::InvalidOpcode {
                opcode: 0xEE,
                offset: 1
            }
        ));
    }

    #[test]
    fn truncated_script() {
        let err = disassemble(&[Instruction::Add as u8, 1, 2]).unwrap_err();
        assert!(matches!(err, VMError::UnexpectedEndOfScript { offset: 3 }));
    }
}
