//! Register/stack bytecode virtual machine for contract execution.
//!
//! # Architecture
//!
//! - **Values**: every register and stack slot holds a typed [`object::VMObject`];
//!   numbers are arbitrary precision integers
//! - **Frames**: one [`frame::ExecutionFrame`] per active context, owning its
//!   registers, a bounded value stack and `CALL`/`RET` pointers
//! - **Contexts**: [`context::ExecutionContext`] is a script, a native contract
//!   or a dummy; contexts are resolved by name through the host
//! - **Instruction format**: one opcode byte followed by fixed per-opcode
//!   operands (1-byte registers, var-int offsets, typed literal payloads)
//! - **Gas**: every opcode and extcall is priced by [`gas::GasMachine`] through
//!   the host before it runs
//!
//! # Modules
//!
//! - [`assembler`]: assembly parsing, diagnostics and bytecode generation
//! - [`context`]: execution contexts and the host interface
//! - [`disassembler`]: bytecode listings
//! - [`errors`]: assembly and execution error types
//! - [`frame`]: per-context registers and stack
//! - [`gas`]: gas tables, ledger and dry-run host
//! - [`isa`]: instruction set definition and opcode mappings
//! - [`object`]: the value model
//! - [`operand`]: operand encoding/decoding helpers
//! - [`vm`]: core virtual machine

pub mod assembler;
pub mod context;
pub mod disassembler;
pub mod errors;
pub mod frame;
pub mod gas;
pub mod isa;
pub mod object;
pub mod operand;
pub mod vm;
