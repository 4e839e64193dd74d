//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the VM dispatcher, the assembler and the disassembler all
//! derive from one list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - mnemonic lookup both ways, operand layouts and per-table gas costs
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - `Reg`: register index, 1 byte
//! - `Var`: var-int (offsets, indices, lengths, counts)
//! - `Type`: [`VMType`](super::object::VMType) tag, 1 byte
//! - `Data`: var-int length + raw payload

use crate::config::{GAS_TABLE_V2_VERSION, ProtocolVersion};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::operand::OperandKind;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Entry layout: `Name = opcode, "MNEMONIC" => [operands], gas_v1, gas_v2`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Registers and stack
            // =========================
            /// NOP ; does nothing
            Nop = 0x00, "NOP" => [], 0, 0,
            /// MOVE src, dst ; dst = src, src = None
            Move = 0x01, "MOVE" => [src: Reg, dst: Reg], 1, 1,
            /// COPY src, dst ; dst = clone(src)
            Copy = 0x02, "COPY" => [src: Reg, dst: Reg], 1, 1,
            /// PUSH src ; pushes a copy of src on the frame stack
            Push = 0x03, "PUSH" => [src: Reg], 1, 1,
            /// POP dst ; dst = pop()
            Pop = 0x04, "POP" => [dst: Reg], 1, 1,
            /// SWAP a, b ; exchanges two registers
            Swap = 0x05, "SWAP" => [a: Reg, b: Reg], 1, 1,
            // =========================
            // Control flow
            // =========================
            /// CALL ofs ; saves the return pointer and jumps to ofs
            Call = 0x06, "CALL" => [ofs: Var], 5, 5,
            /// EXTCALL src ; invokes the host method named by src
            Extcall = 0x07, "EXTCALL" => [src: Reg], 10, 10,
            /// JMP ofs ; jumps to ofs
            Jmp = 0x08, "JMP" => [ofs: Var], 1, 1,
            /// JMPIF src, ofs ; jumps to ofs if src is true
            JmpIf = 0x09, "JMPIF" => [src: Reg, ofs: Var], 1, 1,
            /// JMPNOT src, ofs ; jumps to ofs if src is false
            JmpNot = 0x0A, "JMPNOT" => [src: Reg, ofs: Var], 1, 1,
            /// RET ; returns to the saved pointer, or halts the context
            Ret = 0x0B, "RET" => [], 0, 0,
            /// THROW src ; aborts execution with src as message
            Throw = 0x0C, "THROW" => [src: Reg], 1, 1,
            // =========================
            // Values
            // =========================
            /// LOAD dst, type, data ; dst = data interpreted as type
            Load = 0x0D, "LOAD" => [dst: Reg, ty: Type, data: Data], 5, 5,
            /// CAST src, dst, type ; dst = src converted to type
            Cast = 0x0E, "CAST" => [src: Reg, dst: Reg, ty: Type], 1, 1,
            /// CAT a, b, dst ; dst = a ++ b (strings or bytes)
            Cat = 0x0F, "CAT" => [a: Reg, b: Reg, dst: Reg], 1, 3,
            /// RANGE src, dst, index, len ; dst = bytes of src in [index, index + len)
            Range = 0x10, "RANGE" => [src: Reg, dst: Reg, index: Var, len: Var], 1, 3,
            /// LEFT src, dst, len ; first len bytes of src
            Left = 0x11, "LEFT" => [src: Reg, dst: Reg, len: Var], 1, 3,
            /// RIGHT src, dst, len ; last len bytes of src
            Right = 0x12, "RIGHT" => [src: Reg, dst: Reg, len: Var], 1, 3,
            /// SIZE src, dst ; dst = byte length of src
            Size = 0x13, "SIZE" => [src: Reg, dst: Reg], 1, 1,
            /// COUNT src, dst ; dst = number of entries of src
            Count = 0x14, "COUNT" => [src: Reg, dst: Reg], 1, 1,
            // =========================
            // Logic and comparison
            // =========================
            /// NOT src, dst ; logical not for Bool, bitwise not for Number
            Not = 0x15, "NOT" => [src: Reg, dst: Reg], 1, 1,
            /// AND a, b, dst
            And = 0x16, "AND" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// OR a, b, dst
            Or = 0x17, "OR" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// XOR a, b, dst
            Xor = 0x18, "XOR" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// EQUAL a, b, dst ; dst = (a == b), any types
            Equal = 0x19, "EQUAL" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// LT a, b, dst ; dst = a < b
            Lt = 0x1A, "LT" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// GT a, b, dst ; dst = a > b
            Gt = 0x1B, "GT" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// LTE a, b, dst ; dst = a <= b
            Lte = 0x1C, "LTE" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// GTE a, b, dst ; dst = a >= b
            Gte = 0x1D, "GTE" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            // =========================
            // Arithmetic
            // =========================
            /// INC dst ; dst = dst + 1
            Inc = 0x1E, "INC" => [dst: Reg], 1, 1,
            /// DEC dst ; dst = dst - 1
            Dec = 0x1F, "DEC" => [dst: Reg], 1, 1,
            /// SIGN src, dst ; dst = -1, 0 or 1
            Sign = 0x20, "SIGN" => [src: Reg, dst: Reg], 1, 1,
            /// NEGATE src, dst ; dst = -src
            Negate = 0x21, "NEGATE" => [src: Reg, dst: Reg], 1, 1,
            /// ABS src, dst ; dst = |src|
            Abs = 0x22, "ABS" => [src: Reg, dst: Reg], 1, 1,
            /// ADD a, b, dst ; dst = a + b
            Add = 0x23, "ADD" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// SUB a, b, dst ; dst = a - b
            Sub = 0x24, "SUB" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// MUL a, b, dst ; dst = a * b
            Mul = 0x25, "MUL" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// DIV a, b, dst ; dst = a / b, truncated toward zero
            Div = 0x26, "DIV" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// MOD a, b, dst ; dst = a % b, sign of a
            Mod = 0x27, "MOD" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// SHL a, b, dst ; dst = a << b
            Shl = 0x28, "SHL" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// SHR a, b, dst ; dst = a >> b (arithmetic)
            Shr = 0x29, "SHR" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// MIN a, b, dst
            Min = 0x2A, "MIN" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// MAX a, b, dst
            Max = 0x2B, "MAX" => [a: Reg, b: Reg, dst: Reg], 1, 1,
            /// POW a, b, dst ; dst = a ^ b
            Pow = 0x2C, "POW" => [a: Reg, b: Reg, dst: Reg], 1, 20,
            // =========================
            // Contexts
            // =========================
            /// CTX src, dst ; dst = context handle named by src
            Ctx = 0x2D, "CTX" => [src: Reg, dst: Reg], 10, 10,
            /// SWITCH src ; runs the context in src, handing over the stack
            Switch = 0x2E, "SWITCH" => [src: Reg], 100, 200,
            // =========================
            // Structs
            // =========================
            /// PUT src, dst, key ; dst[key] = src
            Put = 0x2F, "PUT" => [src: Reg, dst: Reg, key: Reg], 5, 5,
            /// GET src, dst, key ; dst = src[key], None when absent
            Get = 0x30, "GET" => [src: Reg, dst: Reg, key: Reg], 5, 5,
            /// CLEAR dst ; dst = None
            Clear = 0x31, "CLEAR" => [dst: Reg], 1, 1,
            /// UNPACK src ; pushes array elements, index 0 last
            Unpack = 0x32, "UNPACK" => [src: Reg], 1, 1,
            /// PACK dst, count ; dst = array of count popped values
            Pack = 0x33, "PACK" => [dst: Reg, count: Var], 1, 1,
            /// DEBUG ; marker for tooling
            Debug = 0x34, "DEBUG" => [], 1, 1,
            /// SUBSTR src, dst, index, len ; string slice by byte offsets
            Substr = 0x35, "SUBSTR" => [src: Reg, dst: Reg, index: Var, len: Var], 1, 3,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas_v1:expr, $gas_v2:expr
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name ),* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Case-insensitive reverse of [`Instruction::mnemonic`].
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Instruction::$name);
                    }
                )*
                None
            }

            /// Operand layout following the opcode byte.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Instruction::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }

            /// Cost under the given gas table.
            pub const fn gas(&self, table: GasTable) -> u64 {
                match table {
                    GasTable::V1 => match self {
                        $( Instruction::$name => $gas_v1, )*
                    },
                    GasTable::V2 => match self {
                        $( Instruction::$name => $gas_v2, )*
                    },
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

/// Opcode pricing table selected by protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GasTable {
    V1,
    V2,
}

impl GasTable {
    pub fn for_protocol(version: ProtocolVersion) -> GasTable {
        if version >= GAS_TABLE_V2_VERSION {
            GasTable::V2
        } else {
            GasTable::V1
        }
    }
}
