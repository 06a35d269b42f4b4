//! Context-stack machine
//!
//! Active try/catch/finally/with/for-in/for-of/block regions are recorded
//! inline on the operand stack as fixed-width context records: a packed
//! record word on top, payload slots below. Values and records share the
//! stack; distinguishing them is positional, guaranteed by the compiler's
//! static stack heights.
//!
//! The record word carries the simple-value tag so that a suspended frame
//! can be released by blindly freeing its live slots; numeric payload slots
//! hold tagged integers for the same reason.

use crate::consts::*;
use crate::frame::Frame;
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::opcode::Opcode;
use crate::value::Value;

/// Type tag of a context record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    /// Active try block; offset points at its handler chain.
    Try = 0,
    /// Active catch block; offset points past its body.
    Catch = 1,
    /// Finally entered on the normal path or through break/continue; the
    /// payload slot holds the pending jump target.
    FinallyJump = 2,
    /// Finally entered while unwinding a throw; the payload slot holds
    /// the pending exception.
    FinallyThrow = 3,
    /// Finally entered while unwinding a return; the payload slot holds
    /// the pending return value.
    FinallyReturn = 4,
    /// Active `with` region; installs an object-bound environment.
    With = 5,
    /// Active for-in loop; payload holds collection, cursor and object.
    ForIn = 6,
    /// Active for-of loop; payload holds next value and iterator.
    ForOf = 7,
    /// Lexical block with a declarative environment.
    Block = 8,
}

/// The record owns a lexical environment that must be popped on exit.
pub const CONTEXT_HAS_LEX_ENV: u32 = 1 << 8;

/// For-of only: the iterator must be closed on abnormal exit.
pub const CONTEXT_CLOSE_ITERATOR: u32 = 1 << 9;

const CONTEXT_TYPE_SHIFT: u32 = 4;
const CONTEXT_OFFSET_SHIFT: u32 = 12;

/// Pack a context record word.
pub(crate) fn make_context(ty: ContextType, offset: usize) -> Value {
    debug_assert!(offset < (1 << (32 - CONTEXT_OFFSET_SHIFT)));
    Value::from_raw(
        ((offset as u32) << CONTEXT_OFFSET_SHIFT) | ((ty as u32) << CONTEXT_TYPE_SHIFT) | TAG_SIMPLE,
    )
}

pub(crate) fn context_type(word: Value) -> ContextType {
    match (word.raw() >> CONTEXT_TYPE_SHIFT) & 0xf {
        0 => ContextType::Try,
        1 => ContextType::Catch,
        2 => ContextType::FinallyJump,
        3 => ContextType::FinallyThrow,
        4 => ContextType::FinallyReturn,
        5 => ContextType::With,
        6 => ContextType::ForIn,
        7 => ContextType::ForOf,
        8 => ContextType::Block,
        other => unreachable!("corrupt context record type {other}"),
    }
}

/// Absolute bytecode offset stored in the record.
pub(crate) fn context_offset(word: Value) -> usize {
    (word.raw() >> CONTEXT_OFFSET_SHIFT) as usize
}

pub(crate) fn context_has_flag(word: Value, flag: u32) -> bool {
    word.raw() & flag != 0
}

pub(crate) fn context_set_flag(word: Value, flag: u32) -> Value {
    Value::from_raw(word.raw() | flag)
}

pub(crate) fn context_clear_flag(word: Value, flag: u32) -> Value {
    Value::from_raw(word.raw() & !flag)
}

pub(crate) const fn is_finally(ty: ContextType) -> bool {
    matches!(
        ty,
        ContextType::FinallyJump | ContextType::FinallyThrow | ContextType::FinallyReturn
    )
}

/// Stack slots occupied by a record of the given type.
pub(crate) const fn context_allocation(ty: ContextType) -> usize {
    match ty {
        ContextType::Try
        | ContextType::Catch
        | ContextType::FinallyJump
        | ContextType::FinallyThrow
        | ContextType::FinallyReturn => TRY_CONTEXT_STACK_ALLOCATION,
        ContextType::With => WITH_CONTEXT_STACK_ALLOCATION,
        ContextType::ForIn => FOR_IN_CONTEXT_STACK_ALLOCATION,
        ContextType::ForOf => FOR_OF_CONTEXT_STACK_ALLOCATION,
        ContextType::Block => BLOCK_CONTEXT_STACK_ALLOCATION,
    }
}

impl Frame {
    /// Push `slots` context slots; the caller fills payload and word. The
    /// operand stack must be empty above the context chain.
    pub(crate) fn grow_context(&mut self, slots: usize) {
        debug_assert_eq!(self.stack_top, self.context_bottom());
        for _ in 0..slots {
            self.stack[self.stack_top] = Value::UNDEFINED;
            self.stack_top += 1;
        }
        self.context_depth += slots;
    }

    pub(crate) fn shrink_context(&mut self, slots: usize) {
        self.context_depth -= slots;
        self.stack_top -= slots;
    }

    /// Record word of the topmost context.
    pub(crate) fn context_word(&self) -> Value {
        self.stack[self.context_bottom() - 1]
    }

    pub(crate) fn set_context_word(&mut self, word: Value) {
        let at = self.context_bottom() - 1;
        self.stack[at] = word;
    }

    /// Payload slot `depth` slots below the record word.
    pub(crate) fn context_payload(&self, depth: usize) -> Value {
        self.stack[self.context_bottom() - 1 - depth]
    }

    pub(crate) fn set_context_payload(&mut self, depth: usize, value: Value) {
        let at = self.context_bottom() - 1 - depth;
        self.stack[at] = value;
    }
}

impl<H: Host> Interpreter<H> {
    /// Install a freshly created environment as the frame's innermost
    /// one, taking over its creation reference and releasing the frame's
    /// reference on the previous environment.
    pub(crate) fn install_lex_env(&mut self, frame: &mut Frame, env: crate::value::HeapRef) {
        let old = core::mem::replace(&mut frame.lex_env, env);
        self.heap.free_value(Value::object(old));
    }

    /// Replace the frame's innermost lexical environment with its outer
    /// one, releasing the popped environment.
    pub(crate) fn pop_lex_env(&mut self, frame: &mut Frame) {
        let env = frame.lex_env;
        let outer = self
            .heap
            .object(env)
            .environment()
            .outer
            .expect("popping the outermost lexical environment");
        self.heap.bump(outer);
        frame.lex_env = outer;
        self.heap.free_value(Value::object(env));
    }

    /// Abort the topmost context record: release everything it owns and
    /// remove it from the stack. For-of iterators with the close flag are
    /// closed; a close failure surfaces as a pending exception only when
    /// none was pending already.
    pub(crate) fn stack_context_abort(&mut self, frame: &mut Frame) {
        let word = frame.context_word();
        let ty = context_type(word);

        match ty {
            ContextType::Try | ContextType::Catch => {
                if context_has_flag(word, CONTEXT_HAS_LEX_ENV) {
                    self.pop_lex_env(frame);
                }
            }
            ContextType::FinallyJump => {}
            ContextType::FinallyThrow | ContextType::FinallyReturn => {
                let pending = frame.context_payload(1);
                self.heap.free_value(pending);
            }
            ContextType::With | ContextType::Block => {
                self.pop_lex_env(frame);
            }
            ContextType::ForIn => {
                let collection = frame.context_payload(1);
                let object = frame.context_payload(3);
                self.heap.free_value(collection);
                self.heap.free_value(object);
            }
            ContextType::ForOf => {
                let next_value = frame.context_payload(1);
                let iterator = frame.context_payload(2);
                self.heap.free_value(next_value);

                if context_has_flag(word, CONTEXT_CLOSE_ITERATOR) {
                    // An exception already unwinding wins over anything the
                    // iterator's `return` throws.
                    let saved = self.exception.take();
                    if self.iterator_close(iterator).is_err() && saved.is_some() {
                        let superseded = self.take_exception();
                        self.heap.free_value(superseded);
                    }
                    if let Some(saved) = saved {
                        debug_assert!(self.exception.is_none());
                        self.exception = Some(saved);
                    }
                }
                self.heap.free_value(iterator);
            }
        }

        frame.shrink_context(context_allocation(ty));
    }

    /// Walk the context stack looking for a record able to service the
    /// requested unwind (`FinallyThrow`, `FinallyReturn` or `FinallyJump`
    /// with a target offset). Non-finally records passed on the way are
    /// aborted. On success the frame cursor points into the handler and
    /// the topmost record has been converted; the caller stores the
    /// pending value into the payload slot. Returns `false` when the
    /// unwind escaped every handler of this frame.
    pub(crate) fn stack_find_finally(
        &mut self,
        frame: &mut Frame,
        finally_type: ContextType,
        jump_target: usize,
    ) -> bool {
        debug_assert!(is_finally(finally_type));

        while frame.context_depth > 0 {
            let mut word = frame.context_word();
            let ty = context_type(word);
            let context_end = context_offset(word);

            if finally_type == ContextType::FinallyJump && jump_target < context_end {
                // The jump lands inside this context; no unwinding needed.
                return false;
            }

            match ty {
                ContextType::Try | ContextType::Catch => {
                    if context_has_flag(word, CONTEXT_HAS_LEX_ENV) {
                        self.pop_lex_env(frame);
                        word = context_clear_flag(word, CONTEXT_HAS_LEX_ENV);
                        frame.set_context_word(word);
                    }

                    let mut position = context_end;
                    loop {
                        match self.handler_opcode(frame, position) {
                            Some((Opcode::Catch, catch_end)) if ty == ContextType::Try => {
                                if finally_type == ContextType::FinallyThrow {
                                    frame.set_context_word(make_context(
                                        ContextType::Catch,
                                        catch_end,
                                    ));
                                    frame.cursor = position + 3;
                                    return true;
                                }
                                // Return/jump unwinds skip the catch body.
                                position = catch_end;
                            }
                            Some((Opcode::Finally, finally_end)) => {
                                frame.set_context_word(make_context(finally_type, finally_end));
                                frame.cursor = position + 3;
                                return true;
                            }
                            _ => {
                                frame.shrink_context(TRY_CONTEXT_STACK_ALLOCATION);
                                break;
                            }
                        }
                    }
                }
                ContextType::FinallyJump
                | ContextType::FinallyThrow
                | ContextType::FinallyReturn
                | ContextType::With
                | ContextType::Block
                | ContextType::ForIn
                | ContextType::ForOf => {
                    self.stack_context_abort(frame);
                }
            }
        }

        false
    }

    /// Decode the handler opcode at `position` together with its absolute
    /// branch target. Anything but `Catch`/`Finally` ends the handler
    /// chain.
    fn handler_opcode(&self, frame: &Frame, position: usize) -> Option<(Opcode, usize)> {
        let bytecode = &frame.code.bytecode;
        let opcode = Opcode::from_byte(*bytecode.get(position)?)?;
        if !matches!(opcode, Opcode::Catch | Opcode::Finally) {
            return None;
        }
        let high = *bytecode.get(position + 1)? as usize;
        let low = *bytecode.get(position + 2)? as usize;
        Some((opcode, position + ((high << 8) | low)))
    }
}
