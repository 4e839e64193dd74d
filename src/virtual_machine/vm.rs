//! Core virtual machine implementation.
//!
//! The VM executes bytecode frame by frame. Each frame belongs to one
//! [`ExecutionContext`] and owns its registers and value stack; frame 0 is
//! the entry context. Every opcode is approved by the [`ExecutionHost`]
//! before it runs, and all arithmetic is arbitrary precision.

use crate::config::RuntimeConfig;
use crate::contract::abi::ContractInterface;
use crate::virtual_machine::context::{ExecutionContext, ExecutionHost};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::frame::ExecutionFrame;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::object::{MAX_NESTING, VMObject, VMType};
use crate::virtual_machine::operand::ScriptReader;
use num_bigint::BigInt;
use num_traits::{Pow, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::mem;

#[cfg(test)]
mod tests;

/// Outcome of running a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    /// Stopped by the host without failing.
    Break,
    Halt,
    Fault,
}

impl ExecutionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Running => "Running",
            ExecutionState::Break => "Break",
            ExecutionState::Halt => "Halt",
            ExecutionState::Fault => "Fault",
        }
    }
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        host = $host:ident,
        reader = $reader:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $host, $reader, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler that needs the host (semicolon separator)
    (@call $vm:ident, $host:ident, $reader:ident, $instr_name:expr, $handler:ident,
        (host; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $reader, $kind)?; )*
        $vm.current_frame_mut()?.ip = $reader.position();
        $vm.$handler($instr_name, $host, $( $field ),*)
    }};

    // Handler without host
    (@call $vm:ident, $host:ident, $reader:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $reader, $kind)?; )*
        $vm.current_frame_mut()?.ip = $reader.position();
        $vm.$handler($instr_name, $( $field ),*)
    }};

    (@read $reader:ident, Reg) => { $reader.read_u8() };
    (@read $reader:ident, Var) => { $reader.read_offset() };
    (@read $reader:ident, Type) => { $reader.read_type() };
    (@read $reader:ident, Data) => { $reader.read_data() };
}

/// Widest integer `SHL`, `POW` and `MUL` may produce, and the largest
/// shift amount.
pub const MAX_INTEGER_BITS: u64 = 4096;

/// Bytecode virtual machine.
pub struct VirtualMachine {
    entry: ExecutionContext,
    frames: Vec<ExecutionFrame>,
    /// Arguments pushed before `execute`, handed to the entry frame.
    pending_stack: Vec<VMObject>,
    /// Entry frame's stack once execution is over.
    result_stack: Vec<VMObject>,
    register_count: usize,
    max_stack_size: usize,
    /// First fault message of this execution.
    exception: Option<String>,
}

type OpResult = Result<ExecutionState, VMError>;

impl VirtualMachine {
    pub fn new(entry: ExecutionContext, config: &RuntimeConfig) -> Self {
        Self {
            entry,
            frames: Vec::new(),
            pending_stack: Vec::new(),
            result_stack: Vec::new(),
            register_count: config.register_count,
            max_stack_size: config.max_stack_size,
            exception: None,
        }
    }

    // =========================
    // Context stack
    // =========================

    pub fn entry_context(&self) -> &ExecutionContext {
        &self.entry
    }

    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.frames.last().map(ExecutionFrame::context)
    }

    /// Context that switched into the current one.
    pub fn previous_context(&self) -> Option<&ExecutionContext> {
        let len = self.frames.len();
        if len < 2 {
            return None;
        }
        self.frames.get(len - 2).map(ExecutionFrame::context)
    }

    /// True while the transaction script itself is executing.
    pub fn is_entry_context(&self) -> bool {
        self.frames.len() <= 1
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_frame(&self) -> Result<&ExecutionFrame, VMError> {
        self.frames.last().ok_or(VMError::NoActiveFrame)
    }

    pub fn current_frame_mut(&mut self) -> Result<&mut ExecutionFrame, VMError> {
        self.frames.last_mut().ok_or(VMError::NoActiveFrame)
    }

    /// Message of the first fault raised during execution.
    pub fn fault_message(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    // =========================
    // Value stack
    // =========================

    /// Pushes on the current frame, or queues an argument for the entry
    /// context before execution starts.
    pub fn stack_push(&mut self, value: VMObject) -> Result<(), VMError> {
        match self.frames.last_mut() {
            Some(frame) => frame.push(value),
            None => {
                self.pending_stack.push(value);
                Ok(())
            }
        }
    }

    pub fn stack_pop(&mut self) -> Result<VMObject, VMError> {
        match self.frames.last_mut() {
            Some(frame) => frame.pop(),
            None => self.result_stack.pop().ok_or(VMError::StackUnderflow),
        }
    }

    pub fn stack_len(&self) -> usize {
        match self.frames.last() {
            Some(frame) => frame.stack_len(),
            None => self.result_stack.len(),
        }
    }

    /// The current frame's stack, or the entry frame's leftovers once
    /// execution has finished. Top of stack is last.
    pub fn stack(&self) -> &[VMObject] {
        match self.frames.last() {
            Some(frame) => frame.stack(),
            None => &self.result_stack,
        }
    }

    /// Fails with `not enough arguments` unless `count` values are available.
    pub fn expect_stack(&self, count: usize) -> Result<(), VMError> {
        let actual = self.stack_len();
        if actual < count {
            return Err(VMError::NotEnoughArguments {
                expected: count,
                actual,
            });
        }
        Ok(())
    }

    // =========================
    // Execution
    // =========================

    /// Runs the entry context to a terminal state.
    ///
    /// Data faults return `Ok(Fault)` with [`fault_message`](Self::fault_message)
    /// set; every other failure aborts with `Err`.
    pub fn execute<H: ExecutionHost>(&mut self, host: &mut H) -> Result<ExecutionState, VMError> {
        let stack = mem::take(&mut self.pending_stack);
        let entry = self.entry.clone();
        let (state, stack) = self.run_context(entry, stack, host)?;
        self.result_stack = stack;
        Ok(state)
    }

    /// Runs `context` in a new frame. The caller's whole stack moves into the
    /// callee and whatever the callee leaves moves back.
    pub fn switch_context<H: ExecutionHost>(
        &mut self,
        context: ExecutionContext,
        host: &mut H,
    ) -> Result<ExecutionState, VMError> {
        let stack = self.current_frame_mut()?.take_stack();
        let (state, returned) = self.run_context(context, stack, host)?;
        self.current_frame_mut()?.extend_stack(returned)?;
        Ok(state)
    }

    fn run_context<H: ExecutionHost>(
        &mut self,
        context: ExecutionContext,
        stack: Vec<VMObject>,
        host: &mut H,
    ) -> Result<(ExecutionState, Vec<VMObject>), VMError> {
        self.frames.push(ExecutionFrame::new(
            context,
            self.register_count,
            self.max_stack_size,
            stack,
        ));
        let result = self.run_current(host);
        let stack = self
            .frames
            .pop()
            .map(ExecutionFrame::into_stack)
            .unwrap_or_default();
        result.map(|state| (state, stack))
    }

    fn run_current<H: ExecutionHost>(&mut self, host: &mut H) -> OpResult {
        let context = self.current_frame()?.context().clone();
        let result = match &context {
            ExecutionContext::Dummy { .. } => Ok(ExecutionState::Halt),
            ExecutionContext::Native { name } => host.execute_native(self, name),
            ExecutionContext::Script { script, abi, .. } => {
                if let Some(abi) = abi {
                    self.enter_method(abi)?;
                }
                self.run_script(script, host)
            }
        };

        match result {
            Err(err) if err.is_fault() => {
                if self.exception.is_none() {
                    self.exception = Some(err.to_string());
                }
                Ok(ExecutionState::Fault)
            }
            other => other,
        }
    }

    /// Starts at the ABI method named by the string on top of the stack.
    fn enter_method(&mut self, abi: &ContractInterface) -> Result<(), VMError> {
        let frame = self.current_frame_mut()?;
        let offset = match frame.peek() {
            Some(VMObject::String(name)) => abi
                .find_method(name)
                .filter(|method| !method.is_native())
                .map(|method| method.offset as usize),
            _ => None,
        };
        if let Some(offset) = offset {
            frame.pop()?;
            frame.ip = offset;
        }
        Ok(())
    }

    fn run_script<H: ExecutionHost>(&mut self, script: &[u8], host: &mut H) -> OpResult {
        loop {
            match self.step(script, host)? {
                ExecutionState::Running => continue,
                state => return Ok(state),
            }
        }
    }

    fn step<H: ExecutionHost>(&mut self, script: &[u8], host: &mut H) -> OpResult {
        let ip = self.current_frame()?.ip;
        match ip.cmp(&script.len()) {
            Ordering::Equal => return Ok(ExecutionState::Halt),
            Ordering::Greater => return Err(VMError::InvalidIP { ip }),
            Ordering::Less => {}
        }

        let mut reader = ScriptReader::new(script, ip);
        let opcode = reader.read_u8()?;
        let instruction = Instruction::try_from(opcode)
            .map_err(|_| VMError::InvalidOpcode { opcode, offset: ip })?;
        host.validate_opcode(self, instruction)?;
        self.exec(instruction, &mut reader, host)
    }

    /// Executes a single instruction.
    fn exec<H: ExecutionHost>(
        &mut self,
        instruction: Instruction,
        reader: &mut ScriptReader<'_>,
        host: &mut H,
    ) -> OpResult {
        exec_vm! {
            vm = self,
            host = host,
            reader = reader,
            instr = instruction,
            {
                // Registers and stack
                Nop => op_nop(),
                Move => op_move(src: Reg, dst: Reg),
                Copy => op_copy(src: Reg, dst: Reg),
                Push => op_push(src: Reg),
                Pop => op_pop(dst: Reg),
                Swap => op_swap(a: Reg, b: Reg),
                // Control flow
                Call => op_call(ofs: Var),
                Extcall => op_extcall(host; src: Reg),
                Jmp => op_jmp(ofs: Var),
                JmpIf => op_jmp_if(src: Reg, ofs: Var),
                JmpNot => op_jmp_not(src: Reg, ofs: Var),
                Ret => op_ret(),
                Throw => op_throw(src: Reg),
                // Values
                Load => op_load(dst: Reg, ty: Type, data: Data),
                Cast => op_cast(src: Reg, dst: Reg, ty: Type),
                Cat => op_cat(a: Reg, b: Reg, dst: Reg),
                Range => op_range(src: Reg, dst: Reg, index: Var, len: Var),
                Left => op_left(src: Reg, dst: Reg, len: Var),
                Right => op_right(src: Reg, dst: Reg, len: Var),
                Size => op_size(src: Reg, dst: Reg),
                Count => op_count(src: Reg, dst: Reg),
                // Logic and comparison
                Not => op_not(src: Reg, dst: Reg),
                And => op_and(a: Reg, b: Reg, dst: Reg),
                Or => op_or(a: Reg, b: Reg, dst: Reg),
                Xor => op_xor(a: Reg, b: Reg, dst: Reg),
                Equal => op_equal(a: Reg, b: Reg, dst: Reg),
                Lt => op_lt(a: Reg, b: Reg, dst: Reg),
                Gt => op_gt(a: Reg, b: Reg, dst: Reg),
                Lte => op_lte(a: Reg, b: Reg, dst: Reg),
                Gte => op_gte(a: Reg, b: Reg, dst: Reg),
                // Arithmetic
                Inc => op_inc(dst: Reg),
                Dec => op_dec(dst: Reg),
                Sign => op_sign(src: Reg, dst: Reg),
                Negate => op_negate(src: Reg, dst: Reg),
                Abs => op_abs(src: Reg, dst: Reg),
                Add => op_add(a: Reg, b: Reg, dst: Reg),
                Sub => op_sub(a: Reg, b: Reg, dst: Reg),
                Mul => op_mul(a: Reg, b: Reg, dst: Reg),
                Div => op_div(a: Reg, b: Reg, dst: Reg),
                Mod => op_mod(a: Reg, b: Reg, dst: Reg),
                Shl => op_shl(a: Reg, b: Reg, dst: Reg),
                Shr => op_shr(a: Reg, b: Reg, dst: Reg),
                Min => op_min(a: Reg, b: Reg, dst: Reg),
                Max => op_max(a: Reg, b: Reg, dst: Reg),
                Pow => op_pow(a: Reg, b: Reg, dst: Reg),
                // Contexts
                Ctx => op_ctx(host; src: Reg, dst: Reg),
                Switch => op_switch(host; src: Reg),
                // Structs
                Put => op_put(src: Reg, dst: Reg, key: Reg),
                Get => op_get(src: Reg, dst: Reg, key: Reg),
                Clear => op_clear(dst: Reg),
                Unpack => op_unpack(src: Reg),
                Pack => op_pack(dst: Reg, count: Var),
                Debug => op_debug(),
                Substr => op_substr(src: Reg, dst: Reg, index: Var, len: Var),
            }
        }
    }

    // =========================
    // Register helpers
    // =========================

    fn reg(&self, idx: u8) -> Result<&VMObject, VMError> {
        self.current_frame()?.get(idx)
    }

    fn set_reg(&mut self, idx: u8, value: VMObject) -> OpResult {
        self.current_frame_mut()?.set(idx, value)?;
        Ok(ExecutionState::Running)
    }

    fn number(&self, idx: u8) -> Result<BigInt, VMError> {
        self.reg(idx)?.as_number()
    }

    fn jump(&mut self, ofs: usize) -> OpResult {
        self.current_frame_mut()?.ip = ofs;
        Ok(ExecutionState::Running)
    }

    fn unary_number(
        &mut self,
        src: u8,
        dst: u8,
        f: impl FnOnce(BigInt) -> BigInt,
    ) -> OpResult {
        let n = self.number(src)?;
        self.set_reg(dst, VMObject::Number(f(n)))
    }

    fn binary_number(
        &mut self,
        a: u8,
        b: u8,
        dst: u8,
        f: impl FnOnce(BigInt, BigInt) -> Result<BigInt, VMError>,
    ) -> OpResult {
        let (x, y) = (self.number(a)?, self.number(b)?);
        self.set_reg(dst, VMObject::Number(f(x, y)?))
    }

    fn compare(&mut self, a: u8, b: u8, dst: u8, f: impl FnOnce(Ordering) -> bool) -> OpResult {
        let (x, y) = (self.number(a)?, self.number(b)?);
        self.set_reg(dst, VMObject::Bool(f(x.cmp(&y))))
    }

    fn logical(
        &mut self,
        a: u8,
        b: u8,
        dst: u8,
        on_bool: impl FnOnce(bool, bool) -> bool,
        on_number: impl FnOnce(&BigInt, &BigInt) -> BigInt,
    ) -> OpResult {
        let result = match (self.reg(a)?, self.reg(b)?) {
            (VMObject::Bool(x), VMObject::Bool(y)) => VMObject::Bool(on_bool(*x, *y)),
            (VMObject::Number(x), VMObject::Number(y)) => VMObject::Number(on_number(x, y)),
            (VMObject::Bool(_) | VMObject::Number(_), other) | (other, _) => {
                return Err(VMError::LogicalOpUnsupported(other.vm_type()));
            }
        };
        self.set_reg(dst, result)
    }

    /// String or Bytes payload of `src` for the slicing opcodes.
    fn sliceable(&self, instr: &'static str, src: u8) -> Result<(Vec<u8>, bool), VMError> {
        match self.reg(src)? {
            VMObject::String(s) => Ok((s.as_bytes().to_vec(), true)),
            VMObject::Bytes(b) => Ok((b.clone(), false)),
            other => Err(VMError::TypeMismatch {
                instruction: instr,
                actual: other.vm_type(),
            }),
        }
    }

    fn store_slice(&mut self, dst: u8, bytes: &[u8], as_string: bool) -> OpResult {
        let value = if as_string {
            VMObject::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| VMError::InvalidRange("cut inside a UTF-8 sequence".into()))?,
            )
        } else {
            VMObject::Bytes(bytes.to_vec())
        };
        self.set_reg(dst, value)
    }

    // =========================
    // Registers and stack
    // =========================

    fn op_nop(&mut self, _instr: &'static str) -> OpResult {
        Ok(ExecutionState::Running)
    }

    fn op_move(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        let value = self.current_frame_mut()?.take(src)?;
        self.set_reg(dst, value)
    }

    fn op_copy(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        let value = self.reg(src)?.clone();
        self.set_reg(dst, value)
    }

    fn op_push(&mut self, _instr: &'static str, src: u8) -> OpResult {
        let value = self.reg(src)?.clone();
        self.current_frame_mut()?.push(value)?;
        Ok(ExecutionState::Running)
    }

    fn op_pop(&mut self, _instr: &'static str, dst: u8) -> OpResult {
        let value = self.current_frame_mut()?.pop()?;
        self.set_reg(dst, value)
    }

    fn op_swap(&mut self, _instr: &'static str, a: u8, b: u8) -> OpResult {
        self.current_frame_mut()?.swap(a, b)?;
        Ok(ExecutionState::Running)
    }

    // =========================
    // Control flow
    // =========================

    fn op_call(&mut self, _instr: &'static str, ofs: usize) -> OpResult {
        let frame = self.current_frame_mut()?;
        let return_to = frame.ip;
        frame.push_call_pointer(return_to);
        self.jump(ofs)
    }

    fn op_extcall<H: ExecutionHost>(
        &mut self,
        _instr: &'static str,
        host: &mut H,
        src: u8,
    ) -> OpResult {
        let method = self.reg(src)?.as_string()?;
        host.execute_interop(self, &method)
    }

    fn op_jmp(&mut self, _instr: &'static str, ofs: usize) -> OpResult {
        self.jump(ofs)
    }

    fn op_jmp_if(&mut self, _instr: &'static str, src: u8, ofs: usize) -> OpResult {
        if self.reg(src)?.as_bool()? {
            return self.jump(ofs);
        }
        Ok(ExecutionState::Running)
    }

    fn op_jmp_not(&mut self, _instr: &'static str, src: u8, ofs: usize) -> OpResult {
        if !self.reg(src)?.as_bool()? {
            return self.jump(ofs);
        }
        Ok(ExecutionState::Running)
    }

    fn op_ret(&mut self, _instr: &'static str) -> OpResult {
        match self.current_frame_mut()?.pop_call_pointer() {
            Some(return_to) => self.jump(return_to),
            None => Ok(ExecutionState::Halt),
        }
    }

    fn op_throw(&mut self, _instr: &'static str, src: u8) -> OpResult {
        Err(VMError::Throw {
            message: self.reg(src)?.to_string(),
        })
    }

    // =========================
    // Values
    // =========================

    fn op_load(&mut self, _instr: &'static str, dst: u8, ty: VMType, data: &[u8]) -> OpResult {
        let value = VMObject::from_raw(ty, data)?;
        self.set_reg(dst, value)
    }

    fn op_cast(&mut self, _instr: &'static str, src: u8, dst: u8, ty: VMType) -> OpResult {
        let value = self.reg(src)?.cast_to(ty)?;
        self.set_reg(dst, value)
    }

    fn op_cat(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        let result = match (self.reg(a)?, self.reg(b)?) {
            (VMObject::None, other) | (other, VMObject::None) => other.clone(),
            (VMObject::String(x), VMObject::String(y)) => VMObject::String(format!("{x}{y}")),
            (x, y) => {
                let mut bytes = x.as_bytes()?;
                bytes.extend(y.as_bytes()?);
                VMObject::Bytes(bytes)
            }
        };
        self.set_reg(dst, result)
    }

    fn op_range(
        &mut self,
        _instr: &'static str,
        src: u8,
        dst: u8,
        index: usize,
        len: usize,
    ) -> OpResult {
        let bytes = self.reg(src)?.as_bytes()?;
        let slice = index
            .checked_add(len)
            .and_then(|end| bytes.get(index..end))
            .ok_or_else(|| {
                VMError::InvalidRange(format!("{index}+{len} over {} bytes", bytes.len()))
            })?;
        self.set_reg(dst, VMObject::Bytes(slice.to_vec()))
    }

    fn op_left(&mut self, instr: &'static str, src: u8, dst: u8, len: usize) -> OpResult {
        let (bytes, as_string) = self.sliceable(instr, src)?;
        let slice = bytes.get(..len).ok_or_else(|| VMError::IndexOutOfRange {
            index: len.to_string(),
            count: bytes.len(),
        })?;
        self.store_slice(dst, slice, as_string)
    }

    fn op_right(&mut self, instr: &'static str, src: u8, dst: u8, len: usize) -> OpResult {
        let (bytes, as_string) = self.sliceable(instr, src)?;
        let start = bytes.len().checked_sub(len).ok_or_else(|| VMError::IndexOutOfRange {
            index: len.to_string(),
            count: bytes.len(),
        })?;
        self.store_slice(dst, &bytes[start..], as_string)
    }

    fn op_substr(
        &mut self,
        instr: &'static str,
        src: u8,
        dst: u8,
        index: usize,
        len: usize,
    ) -> OpResult {
        let text = match self.reg(src)? {
            VMObject::String(s) => s,
            other => {
                return Err(VMError::TypeMismatch {
                    instruction: instr,
                    actual: other.vm_type(),
                });
            }
        };
        let slice = index
            .checked_add(len)
            .and_then(|end| text.get(index..end))
            .ok_or_else(|| {
                VMError::InvalidRange(format!("{index}+{len} in string of {} bytes", text.len()))
            })?
            .to_string();
        self.set_reg(dst, VMObject::String(slice))
    }

    fn op_size(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        let size = match self.reg(src)? {
            VMObject::String(s) => s.len(),
            other => other.as_bytes()?.len(),
        };
        self.set_reg(dst, VMObject::from_number(size))
    }

    fn op_count(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        let count = self.reg(src)?.count();
        self.set_reg(dst, VMObject::from_number(count))
    }

    // =========================
    // Logic and comparison
    // =========================

    fn op_not(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        let result = match self.reg(src)? {
            VMObject::Bool(b) => VMObject::Bool(!b),
            VMObject::Number(n) => VMObject::Number(!n),
            other => return Err(VMError::LogicalOpUnsupported(other.vm_type())),
        };
        self.set_reg(dst, result)
    }

    fn op_and(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.logical(a, b, dst, |x, y| x && y, |x, y| x & y)
    }

    fn op_or(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.logical(a, b, dst, |x, y| x || y, |x, y| x | y)
    }

    fn op_xor(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.logical(a, b, dst, |x, y| x ^ y, |x, y| x ^ y)
    }

    fn op_equal(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        let equal = self.reg(a)? == self.reg(b)?;
        self.set_reg(dst, VMObject::Bool(equal))
    }

    fn op_lt(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.compare(a, b, dst, Ordering::is_lt)
    }

    fn op_gt(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.compare(a, b, dst, Ordering::is_gt)
    }

    fn op_lte(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.compare(a, b, dst, Ordering::is_le)
    }

    fn op_gte(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.compare(a, b, dst, Ordering::is_ge)
    }

    // =========================
    // Arithmetic
    // =========================

    fn op_inc(&mut self, _instr: &'static str, dst: u8) -> OpResult {
        self.unary_number(dst, dst, |n| n + 1)
    }

    fn op_dec(&mut self, _instr: &'static str, dst: u8) -> OpResult {
        self.unary_number(dst, dst, |n| n - 1)
    }

    fn op_sign(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        self.unary_number(src, dst, |n| n.signum())
    }

    fn op_negate(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        self.unary_number(src, dst, |n| -n)
    }

    fn op_abs(&mut self, _instr: &'static str, src: u8, dst: u8) -> OpResult {
        self.unary_number(src, dst, |n| n.abs())
    }

    fn op_add(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| Ok(x + y))
    }

    fn op_sub(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| Ok(x - y))
    }

    fn op_mul(&mut self, instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| fit_bits(instr, x * y))
    }

    /// Truncates toward zero.
    fn op_div(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| {
            if y.is_zero() {
                return Err(VMError::DivisionByZero);
            }
            Ok(x / y)
        })
    }

    /// Result takes the sign of the dividend.
    fn op_mod(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| {
            if y.is_zero() {
                return Err(VMError::DivisionByZero);
            }
            Ok(x % y)
        })
    }

    fn op_shl(&mut self, instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| {
            let shift = shift_amount(&y)?;
            if !x.is_zero() && x.bits() + shift as u64 > MAX_INTEGER_BITS {
                return Err(too_large(instr));
            }
            Ok(x << shift)
        })
    }

    fn op_shr(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| Ok(x >> shift_amount(&y)?))
    }

    fn op_min(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| Ok(x.min(y)))
    }

    fn op_max(&mut self, _instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| Ok(x.max(y)))
    }

    fn op_pow(&mut self, instr: &'static str, a: u8, b: u8, dst: u8) -> OpResult {
        self.binary_number(a, b, dst, |x, y| {
            let exp = y
                .to_u32()
                .ok_or_else(|| VMError::InvalidRange(format!("exponent {y}")))?;
            // |x| >= 2 gains at least bits(x) - 1 bits per factor
            if x.bits() > 1 && (x.bits() - 1).saturating_mul(u64::from(exp)) > MAX_INTEGER_BITS {
                return Err(too_large(instr));
            }
            fit_bits(instr, Pow::pow(x, exp))
        })
    }

    // =========================
    // Contexts
    // =========================

    fn op_ctx<H: ExecutionHost>(
        &mut self,
        _instr: &'static str,
        host: &mut H,
        src: u8,
        dst: u8,
    ) -> OpResult {
        let name = self.reg(src)?.as_string()?;
        let context = host
            .load_context(&name)
            .ok_or(VMError::ContextNotFound { name })?;
        self.set_reg(dst, VMObject::from_context(context))
    }

    /// The nested context must end in `Halt`.
    fn op_switch<H: ExecutionHost>(
        &mut self,
        _instr: &'static str,
        host: &mut H,
        src: u8,
    ) -> OpResult {
        let context = self.reg(src)?.as_context()?.clone();
        self.call_context(context, host)?;
        Ok(ExecutionState::Running)
    }

    /// [`switch_context`](Self::switch_context) that requires the callee to
    /// halt. A nested fault keeps its message but aborts the caller.
    pub fn call_context<H: ExecutionHost>(
        &mut self,
        context: ExecutionContext,
        host: &mut H,
    ) -> Result<(), VMError> {
        let name = context.name().to_string();
        match self.switch_context(context, host)? {
            ExecutionState::Halt => Ok(()),
            ExecutionState::Fault => Err(VMError::NestedFault {
                context: name,
                message: self.exception.clone().unwrap_or_default(),
            }),
            state => Err(VMError::ContextSwitchFailed {
                context: name,
                state: state.as_str(),
            }),
        }
    }

    // =========================
    // Structs
    // =========================

    fn op_put(&mut self, instr: &'static str, src: u8, dst: u8, key: u8) -> OpResult {
        let value = self.reg(src)?.clone();
        let key = self.reg(key)?.clone();
        check_nesting([&key, &value])?;
        let target = self.current_frame_mut()?.get_mut(dst)?;
        if target.is_none() {
            *target = VMObject::Struct(BTreeMap::new());
        }
        match target {
            VMObject::Struct(fields) => {
                fields.insert(key, value);
                Ok(ExecutionState::Running)
            }
            other => Err(VMError::TypeMismatch {
                instruction: instr,
                actual: other.vm_type(),
            }),
        }
    }

    fn op_get(&mut self, instr: &'static str, src: u8, dst: u8, key: u8) -> OpResult {
        let value = match self.reg(src)? {
            VMObject::Struct(fields) => fields.get(self.reg(key)?).cloned().unwrap_or_default(),
            VMObject::None => VMObject::None,
            other => {
                return Err(VMError::TypeMismatch {
                    instruction: instr,
                    actual: other.vm_type(),
                });
            }
        };
        self.set_reg(dst, value)
    }

    fn op_clear(&mut self, _instr: &'static str, dst: u8) -> OpResult {
        self.set_reg(dst, VMObject::None)
    }

    /// Index 0 ends on top of the stack.
    fn op_unpack(&mut self, _instr: &'static str, src: u8) -> OpResult {
        let items = self.reg(src)?.to_array()?;
        let frame = self.current_frame_mut()?;
        for item in items.into_iter().rev() {
            frame.push(item)?;
        }
        Ok(ExecutionState::Running)
    }

    /// First popped value becomes index 0.
    fn op_pack(&mut self, _instr: &'static str, dst: u8, count: usize) -> OpResult {
        self.expect_stack(count)?;
        let frame = self.current_frame_mut()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(frame.pop()?);
        }
        check_nesting(&items)?;
        self.set_reg(dst, VMObject::from_array(items))
    }

    fn op_debug(&mut self, _instr: &'static str) -> OpResult {
        Ok(ExecutionState::Running)
    }
}

fn shift_amount(n: &BigInt) -> Result<usize, VMError> {
    n.to_u64()
        .filter(|shift| *shift <= MAX_INTEGER_BITS)
        .and_then(|shift| usize::try_from(shift).ok())
        .ok_or_else(|| VMError::InvalidRange(format!("shift by {n}")))
}

/// Values about to be wrapped in one more struct level.
fn check_nesting<'a>(children: impl IntoIterator<Item = &'a VMObject>) -> Result<(), VMError> {
    if children.into_iter().any(|child| child.depth() >= MAX_NESTING) {
        return Err(VMError::NestingTooDeep { limit: MAX_NESTING });
    }
    Ok(())
}

fn too_large(instruction: &'static str) -> VMError {
    VMError::IntegerTooLarge {
        instruction,
        limit: MAX_INTEGER_BITS,
    }
}

fn fit_bits(instruction: &'static str, n: BigInt) -> Result<BigInt, VMError> {
    if n.bits() > MAX_INTEGER_BITS {
        return Err(too_large(instruction));
    }
    Ok(n)
}
