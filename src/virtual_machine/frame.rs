//! Per-context register file, value stack and return pointers.

use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;
use std::mem;

/// State of one active context.
///
/// Registers start as `None`. The value stack is private to the frame and
/// bounded; `CALL`/`RET` return pointers live beside it.
#[derive(Debug)]
pub struct ExecutionFrame {
    context: ExecutionContext,
    pub(crate) ip: usize,
    registers: Vec<VMObject>,
    stack: Vec<VMObject>,
    max_stack_size: usize,
    call_pointers: Vec<usize>,
}

impl ExecutionFrame {
    pub fn new(
        context: ExecutionContext,
        register_count: usize,
        max_stack_size: usize,
        stack: Vec<VMObject>,
    ) -> Self {
        Self {
            context,
            ip: 0,
            registers: vec![VMObject::None; register_count],
            stack,
            max_stack_size,
            call_pointers: Vec::new(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    fn slot(&self, idx: u8) -> Result<usize, VMError> {
        let slot = idx as usize;
        if slot < self.registers.len() {
            Ok(slot)
        } else {
            Err(VMError::InvalidRegisterIndex {
                index: idx,
                available: self.registers.len(),
            })
        }
    }

    /// Returns a reference to the value in register `idx`.
    pub fn get(&self, idx: u8) -> Result<&VMObject, VMError> {
        Ok(&self.registers[self.slot(idx)?])
    }

    pub fn get_mut(&mut self, idx: u8) -> Result<&mut VMObject, VMError> {
        let slot = self.slot(idx)?;
        Ok(&mut self.registers[slot])
    }

    pub fn set(&mut self, idx: u8, value: VMObject) -> Result<(), VMError> {
        *self.get_mut(idx)? = value;
        Ok(())
    }

    /// Moves the value out, leaving `None` behind.
    pub fn take(&mut self, idx: u8) -> Result<VMObject, VMError> {
        Ok(mem::take(self.get_mut(idx)?))
    }

    pub fn swap(&mut self, a: u8, b: u8) -> Result<(), VMError> {
        let (a, b) = (self.slot(a)?, self.slot(b)?);
        self.registers.swap(a, b);
        Ok(())
    }

    pub fn push(&mut self, value: VMObject) -> Result<(), VMError> {
        if self.stack.len() >= self.max_stack_size {
            return Err(VMError::StackOverflow {
                limit: self.max_stack_size,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<VMObject, VMError> {
        self.stack.pop().ok_or(VMError::StackUnderflow)
    }

    pub fn peek(&self) -> Option<&VMObject> {
        self.stack.last()
    }

    pub fn stack(&self) -> &[VMObject] {
        &self.stack
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Hands the whole stack over, leaving this frame's stack empty.
    pub fn take_stack(&mut self) -> Vec<VMObject> {
        mem::take(&mut self.stack)
    }

    /// Appends values returned by a nested context.
    pub fn extend_stack(&mut self, values: Vec<VMObject>) -> Result<(), VMError> {
        if self.stack.len() + values.len() > self.max_stack_size {
            return Err(VMError::StackOverflow {
                limit: self.max_stack_size,
            });
        }
        self.stack.extend(values);
        Ok(())
    }

    pub fn push_call_pointer(&mut self, return_to: usize) {
        self.call_pointers.push(return_to);
    }

    pub fn pop_call_pointer(&mut self) -> Option<usize> {
        self.call_pointers.pop()
    }

    pub fn into_stack(self) -> Vec<VMObject> {
        self.stack
    }
}
