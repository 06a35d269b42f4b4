//! Frame context
//!
//! One `Frame` per active invocation: the register file and operand stack
//! share a single contiguous allocation, with registers in the low slots
//! and contexts/operands growing upward. The high-water mark never exceeds
//! `register_end + stack_limit`.

use std::rc::Rc;

use crate::code::CompiledCode;
use crate::state::CallOperation;
use crate::value::{HeapRef, Value};

/// Cursor sentinel installed when a parked call operation failed; fetching
/// from it behaves like the `{ExtPrefix, Error}` byte sequence and sends
/// the loop straight into exception handling.
pub(crate) const ERROR_CURSOR: usize = usize::MAX;

/// Per-invocation execution state.
#[derive(Debug)]
pub struct Frame {
    /// Compiled code driving this frame.
    pub(crate) code: Rc<CompiledCode>,
    /// Innermost lexical environment; owned reference.
    pub(crate) lex_env: HeapRef,
    /// Receiver of the invocation; owned value.
    pub(crate) this_binding: Value,
    /// Registers `0..register_end`, then context records and operands.
    pub(crate) stack: Vec<Value>,
    /// Index of the next free operand slot.
    pub(crate) stack_top: usize,
    /// Stack slots currently occupied by context records.
    pub(crate) context_depth: usize,
    /// Byte offset of the next instruction.
    pub(crate) cursor: usize,
    /// Value of the last completed statement, for eval results.
    pub(crate) block_result: Value,
    /// Operation handed back to the driver.
    pub(crate) call_operation: CallOperation,
    /// Whether this frame executes eval code (hoisting declares
    /// configurable bindings).
    pub(crate) is_eval_code: bool,
    #[cfg(feature = "line-info")]
    pub(crate) current_line: u32,
}

impl Frame {
    /// Build a frame over `code`. Ownership of the `lex_env` reference and
    /// the `this_binding` value transfers to the frame.
    pub(crate) fn new(code: Rc<CompiledCode>, lex_env: HeapRef, this_binding: Value) -> Self {
        let register_end = code.register_end as usize;
        let stack = vec![Value::UNDEFINED; code.frame_size()];

        Frame {
            code,
            lex_env,
            this_binding,
            stack,
            stack_top: register_end,
            context_depth: 0,
            cursor: 0,
            block_result: Value::UNDEFINED,
            call_operation: CallOperation::None,
            is_eval_code: false,
            #[cfg(feature = "line-info")]
            current_line: 0,
        }
    }

    pub(crate) fn register_end(&self) -> usize {
        self.code.register_end as usize
    }

    /// First slot above the context records; operands live at or above
    /// this index.
    pub(crate) fn context_bottom(&self) -> usize {
        self.register_end() + self.context_depth
    }

    pub(crate) fn register(&self, index: usize) -> Value {
        debug_assert!(index < self.register_end());
        self.stack[index]
    }

    /// Swap a register's occupant; the caller releases the returned value.
    #[must_use]
    pub(crate) fn replace_register(&mut self, index: usize, value: Value) -> Value {
        debug_assert!(index < self.register_end());
        core::mem::replace(&mut self.stack[index], value)
    }

    pub(crate) fn push(&mut self, value: Value) {
        debug_assert!(self.stack_top < self.stack.len());
        self.stack[self.stack_top] = value;
        self.stack_top += 1;
    }

    #[must_use]
    pub(crate) fn pop(&mut self) -> Value {
        debug_assert!(self.stack_top > self.context_bottom());
        self.stack_top -= 1;
        self.stack[self.stack_top]
    }

    /// Operand `depth` slots below the top without popping.
    pub(crate) fn peek(&self, depth: usize) -> Value {
        self.stack[self.stack_top - 1 - depth]
    }

    pub(crate) fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.code.bytecode.get(self.cursor)?;
        self.cursor += 1;
        Some(byte)
    }

    pub(crate) fn redirect_to_error(&mut self) {
        self.cursor = ERROR_CURSOR;
    }

    pub(crate) fn in_error_sequence(&self) -> bool {
        self.cursor == ERROR_CURSOR
    }
}
