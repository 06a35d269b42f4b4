//! The dispatch loop
//!
//! Decodes one opcode at a time, materializes its operands per the
//! descriptor, executes the semantic group and applies the result
//! disposition. Exceptions drain the operand stack and consult the context
//! stack for a handler; call/construct opcodes park the cursor and hand
//! control back to the outer driver.

use std::rc::Rc;

use crate::code::Literal;
use crate::consts::*;
use crate::error::Thrown;
use crate::frame::Frame;
use crate::heap::{PropertyFlags, PropertyKey, PropertyValue};
use crate::host::Host;
use crate::interpreter::alu::{ArithOp, BitwiseOp, RelOp};
use crate::interpreter::Interpreter;
use crate::opcode::{ExtOpcode, OpGroup, OpMeta, Opcode, OperandMode, PutMode};
use crate::stack::{
    context_has_flag, context_offset, context_set_flag, context_type, is_finally, make_context,
    ContextType, CONTEXT_CLOSE_ITERATOR, CONTEXT_HAS_LEX_ENV,
};
use crate::state::CallOperation;
use crate::value::Value;

/// Per-frame decode parameters hoisted out of the loop.
struct DecodeInfo {
    register_end: u16,
    ident_end: u16,
    const_literal_end: u16,
    encoding_limit: u16,
    encoding_delta: u16,
    is_strict: bool,
}

/// Outcome of one instruction.
enum Flow {
    /// Keep decoding.
    Continue,
    /// Leave the instruction loop with a completion value; return and
    /// throw intents pass through the context-stack unwinder.
    Leave(Value),
    /// Return control to the outer driver immediately (parked call
    /// operation or suspension); the frame state is already saved.
    Suspend(Value),
}

impl<H: Host> Interpreter<H> {
    /// Run bytecode until the frame completes, suspends or parks a call
    /// operation.
    pub(crate) fn dispatch(&mut self, frame: &mut Frame) -> Value {
        let info = DecodeInfo {
            register_end: frame.code.register_end,
            ident_end: frame.code.ident_end,
            const_literal_end: frame.code.const_literal_end,
            encoding_limit: frame.code.encoding().0,
            encoding_delta: frame.code.encoding().1,
            is_strict: frame.code.is_strict(),
        };

        let result = 'outer: loop {
            let mut result = loop {
                match self.step(frame, &info) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Suspend(value)) => return value,
                    Ok(Flow::Leave(value)) => break value,
                    Err(Thrown) => break Value::ERROR,
                }
            };

            if result.is_error() {
                debug_assert!(self.has_pending_exception());

                // Drain the inner operand stack above the context chain.
                while frame.stack_top > frame.context_bottom() {
                    frame.stack_top -= 1;
                    let item = frame.stack[frame.stack_top];
                    if item == Value::RELEASE_LEX_ENV {
                        self.pop_lex_env(frame);
                    } else {
                        self.heap.fast_free_value(item);
                    }
                }

                #[cfg(feature = "debug")]
                self.hooks.exception_thrown();
            }

            debug_assert_eq!(frame.stack_top, frame.context_bottom());

            if frame.context_depth == 0 {
                break 'outer result;
            }

            if !result.is_error() {
                if self.stack_find_finally(frame, ContextType::FinallyReturn, 0) {
                    if self.has_pending_exception() {
                        // An exception raised while unwinding (iterator
                        // close) supersedes the return: the finally
                        // re-raises it instead.
                        let word = frame.context_word();
                        frame.set_context_word(make_context(
                            ContextType::FinallyThrow,
                            context_offset(word),
                        ));
                        self.heap.fast_free_value(result);
                        result = self.take_exception();
                    }
                    frame.set_context_payload(1, result);
                    continue 'outer;
                }
                if self.has_pending_exception() {
                    self.heap.fast_free_value(result);
                    result = Value::ERROR;
                }
                break 'outer result;
            }

            if self.has_pending_exception() && !self.has_pending_abort() {
                if self.stack_find_finally(frame, ContextType::FinallyThrow, 0) {
                    let exception = self.take_exception();
                    match context_type(frame.context_word()) {
                        ContextType::FinallyThrow => frame.set_context_payload(1, exception),
                        ContextType::Catch => frame.push(exception),
                        other => unreachable!("throw unwound into {other:?}"),
                    }
                    continue 'outer;
                }
                break 'outer result;
            }

            // Aborts bypass every handler.
            while frame.context_depth > 0 {
                self.stack_context_abort(frame);
            }
            break 'outer result;
        };

        let block = core::mem::replace(&mut frame.block_result, Value::UNDEFINED);
        self.heap.fast_free_value(block);
        frame.call_operation = CallOperation::None;
        result
    }

    fn fetch_byte(&mut self, frame: &mut Frame) -> Result<u8, Thrown> {
        match frame.read_byte() {
            Some(byte) => Ok(byte),
            None => Err(self.raise_abort("truncated bytecode stream")),
        }
    }

    fn read_literal_index(&mut self, frame: &mut Frame, info: &DecodeInfo) -> Result<u16, Thrown> {
        let first = self.fetch_byte(frame)? as u16;
        if first >= info.encoding_limit {
            let second = self.fetch_byte(frame)? as u16;
            Ok(((first << 8) | second).wrapping_sub(info.encoding_delta))
        } else {
            Ok(first)
        }
    }

    /// Resolve a literal index: register slot, identifier binding, direct
    /// primitive or sub-function/regexp construction.
    fn read_literal(&mut self, frame: &mut Frame, index: u16) -> Result<Value, Thrown> {
        let code = frame.code.clone();
        if index < code.register_end {
            return Ok(self.heap.fast_copy_value(frame.register(index as usize)));
        }
        if index < code.ident_end {
            let name = code.ident(index).clone();
            return self.resolve_reference_value(frame.lex_env, &name);
        }
        if index < code.const_literal_end {
            return Ok(match code.literal(index) {
                Literal::Integer(value) => self.heap.int32_value(*value),
                Literal::Number(value) => self.heap.number_value(*value),
                Literal::Str(value) => self.heap.str_value(value.clone()),
                other => unreachable!("constant segment holds {other:?}"),
            });
        }
        self.construct_literal_object(frame, frame.code.clone().literal(index))
    }

    fn operands_thrown(&mut self, left: Value, right: Value, thrown: Thrown) -> Thrown {
        self.heap.fast_free_value(left);
        self.heap.fast_free_value(right);
        thrown
    }

    /// Execute one instruction.
    #[allow(clippy::cognitive_complexity)]
    fn step(&mut self, frame: &mut Frame, info: &DecodeInfo) -> Result<Flow, Thrown> {
        if frame.in_error_sequence() {
            // Parked call operation failed; behave like {ExtPrefix, Error}.
            debug_assert!(self.has_pending_exception());
            return Ok(Flow::Leave(Value::ERROR));
        }

        let instr_start = frame.cursor;
        let byte = self.fetch_byte(frame)?;
        let Some(opcode) = Opcode::from_byte(byte) else {
            return Err(self.raise_abort("undefined opcode"));
        };

        let mut ext: Option<ExtOpcode> = None;
        let meta: OpMeta = if opcode == Opcode::ExtPrefix {
            let second = self.fetch_byte(frame)?;
            let Some(extended) = ExtOpcode::from_byte(second) else {
                return Err(self.raise_abort("undefined extended opcode"));
            };
            ext = Some(extended);
            extended.meta()
        } else {
            opcode.meta()
        };

        let mut left = Value::UNDEFINED;
        let mut right = Value::UNDEFINED;
        let mut branch_target = 0usize;

        match meta.operands {
            OperandMode::None => {}
            OperandMode::Stack => {
                left = frame.pop();
            }
            OperandMode::StackStack => {
                right = frame.pop();
                left = frame.pop();
            }
            OperandMode::Literal => {
                let index = self.read_literal_index(frame, info)?;
                left = self.read_literal(frame, index)?;
            }
            OperandMode::LiteralLiteral => {
                let index = self.read_literal_index(frame, info)?;
                left = self.read_literal(frame, index)?;
                let second = match self.read_literal_index(frame, info) {
                    Ok(index) => index,
                    Err(thrown) => return Err(self.operands_thrown(left, right, thrown)),
                };
                right = match self.read_literal(frame, second) {
                    Ok(value) => value,
                    Err(thrown) => return Err(self.operands_thrown(left, right, thrown)),
                };
            }
            OperandMode::StackLiteral => {
                let index = self.read_literal_index(frame, info)?;
                right = self.read_literal(frame, index)?;
                left = frame.pop();
            }
            OperandMode::ThisLiteral => {
                let index = self.read_literal_index(frame, info)?;
                right = self.read_literal(frame, index)?;
                left = self.heap.copy_value(frame.this_binding);
            }
            OperandMode::Branch => {
                let mut offset = 0usize;
                for _ in 0..meta.branch_length {
                    offset = (offset << 8) | self.fetch_byte(frame)? as usize;
                }
                if meta.backward_branch {
                    #[cfg(feature = "vm-exec-stop")]
                    {
                        self.exec_stop_counter -= 1;
                        if self.exec_stop_counter == 0 {
                            self.consult_stop_hook()?;
                        }
                    }
                    branch_target = instr_start - offset;
                } else {
                    branch_target = instr_start + offset;
                }
            }
        }

        let mut put = meta.put;

        let outcome: Option<Value> = match meta.group {
            OpGroup::Pop => {
                let value = frame.pop();
                self.heap.free_value(value);
                None
            }
            OpGroup::PopBlock => {
                let value = frame.pop();
                let previous = core::mem::replace(&mut frame.block_result, value);
                self.heap.fast_free_value(previous);
                None
            }
            OpGroup::Push => {
                frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                None
            }
            OpGroup::PushTwo => {
                frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                frame.push(core::mem::replace(&mut right, Value::UNDEFINED));
                None
            }
            OpGroup::PushThree => {
                frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                let index = self.read_literal_index(frame, info)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                let third = self
                    .read_literal(frame, index)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(core::mem::replace(&mut right, Value::UNDEFINED));
                frame.push(third);
                None
            }
            OpGroup::PushUndefined => {
                frame.push(Value::UNDEFINED);
                None
            }
            OpGroup::PushTrue => {
                frame.push(Value::TRUE);
                None
            }
            OpGroup::PushFalse => {
                frame.push(Value::FALSE);
                None
            }
            OpGroup::PushNull => {
                frame.push(Value::NULL);
                None
            }
            OpGroup::PushThis => {
                let this = self.heap.copy_value(frame.this_binding);
                frame.push(this);
                None
            }
            OpGroup::PushZero => {
                frame.push(Value::ZERO);
                None
            }
            OpGroup::PushPosByte => {
                let byte = self.fetch_byte(frame)? as i32;
                frame.push(Value::from_integer(byte + 1));
                None
            }
            OpGroup::PushNegByte => {
                let byte = self.fetch_byte(frame)? as i32;
                frame.push(Value::from_integer(-(byte + 1)));
                None
            }
            OpGroup::PushObject => {
                let object = self.heap.new_object();
                frame.push(Value::object(object));
                None
            }
            OpGroup::PushArray => {
                let array = self.heap.new_fast_array(Vec::new());
                frame.push(Value::object(array));
                None
            }
            OpGroup::PushElision => {
                frame.push(Value::ARRAY_HOLE);
                None
            }
            OpGroup::AppendArray => {
                let count = self.fetch_byte(frame)? as usize;
                self.append_array(frame, count)?;
                None
            }
            OpGroup::NamedFuncExpr => {
                // left = function literal, right = its name string.
                let name = self.heap.string_of(right);
                let name_env = self.heap.new_decl_env(Some(frame.lex_env));
                let bound = self.heap.copy_value(left);
                self.heap.define_data_property(
                    name_env,
                    PropertyKey::Name(name),
                    PropertyFlags::empty(),
                    bound,
                );
                let old_scope = core::mem::replace(
                    &mut self.heap.object_mut(left.heap_ref()).function_mut().scope,
                    Some(name_env),
                );
                if let Some(old_scope) = old_scope {
                    self.heap.free_value(Value::object(old_scope));
                }
                frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                None
            }

            OpGroup::CreateBinding => {
                let index = self.read_literal_index(frame, info)?;
                let name = frame.code.ident(index).clone();
                debug_assert!(self.heap.object(frame.lex_env).is_environment());
                let (flags, value) = match opcode {
                    Opcode::CreateLet => {
                        (PropertyFlags::enumerable_writable(), Value::UNINITIALIZED)
                    }
                    Opcode::CreateConst => (PropertyFlags::ENUMERABLE, Value::UNINITIALIZED),
                    _ => (PropertyFlags::WRITABLE, Value::UNDEFINED),
                };
                self.heap
                    .define_data_property(frame.lex_env, PropertyKey::Name(name), flags, value);
                None
            }
            OpGroup::VarEval => {
                let mut function_value = None;
                if opcode == Opcode::CreateVarFuncEval {
                    let value_index = self.read_literal_index(frame, info)?;
                    debug_assert!(value_index >= info.const_literal_end);
                    let code = frame.code.clone();
                    function_value = Some(self.construct_literal_object(frame, code.literal(value_index))?);
                }
                let index = match self.read_literal_index(frame, info) {
                    Ok(index) => index,
                    Err(thrown) => {
                        if let Some(value) = function_value {
                            self.heap.free_value(value);
                        }
                        return Err(thrown);
                    }
                };
                debug_assert!(index >= info.register_end);
                let name = frame.code.ident(index).clone();

                // The var path skips block environments.
                let mut env = frame.lex_env;
                while self.heap.object(env).environment().is_block {
                    env = self
                        .heap
                        .object(env)
                        .environment()
                        .outer
                        .expect("block environment without an outer one");
                }

                if let Err(thrown) = self.var_decl(env, &name, frame.is_eval_code) {
                    if let Some(value) = function_value {
                        self.heap.free_value(value);
                    }
                    return Err(thrown);
                }
                if let Some(value) = function_value {
                    self.infer_function_name(value, &name);
                    self.set_var(env, &name, info.is_strict, value)?;
                }
                None
            }
            OpGroup::InitArgOrFunc => {
                let value_index = self.read_literal_index(frame, info)?;
                let index = self.read_literal_index(frame, info)?;
                debug_assert!(value_index != index);

                let value = if value_index < info.register_end {
                    self.heap.fast_copy_value(frame.register(value_index as usize))
                } else {
                    let code = frame.code.clone();
                    self.construct_literal_object(frame, code.literal(value_index))?
                };

                if index < info.register_end {
                    let old = frame.replace_register(index as usize, value);
                    self.heap.fast_free_value(old);
                } else {
                    let name = frame.code.ident(index).clone();
                    self.infer_function_name(value, &name);
                    self.heap.define_data_property(
                        frame.lex_env,
                        PropertyKey::Name(name),
                        PropertyFlags::WRITABLE,
                        value,
                    );
                }
                None
            }
            OpGroup::CheckVar => {
                let index = self.read_literal_index(frame, info)?;
                let name = frame.code.ident(index).clone();
                if self.heap.object(frame.lex_env).environment().is_block {
                    let key = PropertyKey::Name(name.clone());
                    if self.heap.object(frame.lex_env).find_property(&key).is_some() {
                        let message = format!("Identifier '{name}' has already been declared");
                        return Err(self.raise_syntax_error(&message));
                    }
                }
                None
            }
            OpGroup::CheckLet => {
                let index = self.read_literal_index(frame, info)?;
                let name = frame.code.ident(index).clone();
                let key = PropertyKey::Name(name.clone());

                let mut env = frame.lex_env;
                if self.heap.object(env).environment().is_block {
                    if self.heap.object(env).find_property(&key).is_some() {
                        let message = format!("Identifier '{name}' has already been declared");
                        return Err(self.raise_syntax_error(&message));
                    }
                    env = self
                        .heap
                        .object(env)
                        .environment()
                        .outer
                        .expect("block environment without an outer one");
                }

                let shadowed = match self.heap.object(env).environment().kind {
                    crate::heap::EnvKind::Declarative => {
                        self.heap.object(env).find_property(&key).is_some()
                    }
                    crate::heap::EnvKind::ObjectBound { object, .. } => {
                        self.object_has(object, &key)?
                    }
                };
                if shadowed {
                    let message = format!("Identifier '{name}' has already been declared");
                    return Err(self.raise_syntax_error(&message));
                }
                None
            }
            OpGroup::AssignLetConst => {
                let index = self.read_literal_index(frame, info)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                debug_assert!(index >= info.register_end);
                let name = frame.code.ident(index).clone();
                let key = PropertyKey::Name(name);
                let slot = self
                    .heap
                    .object(frame.lex_env)
                    .find_property(&key)
                    .expect("let/const binding was not created");
                self.heap
                    .assign_data_property(frame.lex_env, slot, core::mem::replace(&mut left, Value::UNDEFINED));
                None
            }
            OpGroup::InitBinding => {
                let index = self.read_literal_index(frame, info)?;
                debug_assert!(index >= info.register_end);
                let name = frame.code.ident(index).clone();
                let flags = match opcode {
                    Opcode::InitLet => PropertyFlags::enumerable_writable(),
                    Opcode::InitConst => PropertyFlags::ENUMERABLE,
                    _ => PropertyFlags::WRITABLE,
                };
                let value = frame.pop();
                self.heap
                    .define_data_property(frame.lex_env, PropertyKey::Name(name), flags, value);
                None
            }
            OpGroup::ThrowConstError => {
                return Err(self.raise_type_error("Constant bindings cannot be reassigned"));
            }
            OpGroup::MovIdent => {
                let index = self.read_literal_index(frame, info)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                debug_assert!(index < info.register_end);
                let old = frame.replace_register(
                    index as usize,
                    core::mem::replace(&mut left, Value::UNDEFINED),
                );
                self.heap.fast_free_value(old);
                None
            }
            OpGroup::IdentReference => {
                let index = self.read_literal_index(frame, info)?;
                debug_assert!(index < info.ident_end);
                if index < info.register_end {
                    let value = self.heap.fast_copy_value(frame.register(index as usize));
                    frame.push(Value::REGISTER_REF);
                    frame.push(Value::from_integer(index as i32));
                    frame.push(value);
                } else {
                    let name = frame.code.ident(index).clone();
                    match self.resolve_reference_base(frame.lex_env, &name)? {
                        None => {
                            let message = format!("{name} is not defined");
                            return Err(self.raise_reference_error(&message));
                        }
                        Some((base, value)) => {
                            self.heap.bump(base);
                            let name_value = self.heap.str_value(name);
                            frame.push(Value::object(base));
                            frame.push(name_value);
                            frame.push(value);
                        }
                    }
                }
                None
            }
            OpGroup::TypeofIdent => {
                let index = self.read_literal_index(frame, info)?;
                let value = if index < info.register_end {
                    self.heap.fast_copy_value(frame.register(index as usize))
                } else {
                    let name = frame.code.ident(index).clone();
                    match self.resolve_reference_base(frame.lex_env, &name)? {
                        None => Value::UNDEFINED,
                        Some((_, value)) => value,
                    }
                };
                let rendered = self.typeof_value(value);
                self.heap.free_value(value);
                frame.push(rendered);
                None
            }
            OpGroup::DeleteIdent => {
                let index = self.read_literal_index(frame, info)?;
                if index < info.register_end {
                    frame.push(Value::FALSE);
                } else {
                    let name = frame.code.ident(index).clone();
                    let verdict = self.delete_var(frame.lex_env, &name)?;
                    frame.push(verdict);
                }
                None
            }

            OpGroup::Assign => Some(core::mem::replace(&mut left, Value::UNDEFINED)),

            OpGroup::PropGet => {
                let value = self
                    .get_value(left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(value);
                None
            }
            OpGroup::PropReference => {
                // The reference forms leave (base, property) on the stack
                // for a later write-back.
                match meta.operands {
                    OperandMode::None => {}
                    OperandMode::Literal => {
                        frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                    }
                    _ => {
                        frame.push(core::mem::replace(&mut left, Value::UNDEFINED));
                        frame.push(core::mem::replace(&mut right, Value::UNDEFINED));
                    }
                }
                let base = frame.peek(1);
                let property = frame.peek(0);
                let value = self.get_value(base, property)?;
                frame.push(value);
                None
            }
            OpGroup::PropDelete => {
                let verdict = self
                    .delete_prop(left, right, info.is_strict)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(verdict);
                None
            }
            OpGroup::SetProperty => {
                if opcode == Opcode::SetComputedProperty {
                    core::mem::swap(&mut left, &mut right);
                }
                // left = value, right = property name.
                let key = self
                    .to_property_key(right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                let target = frame.peek(0);
                debug_assert!(target.is_object());
                if self.heap.is_class_constructor(target)
                    && matches!(&key, PropertyKey::Name(name) if &**name == "prototype")
                {
                    let thrown =
                        self.raise_type_error("Class 'prototype' property is non-configurable");
                    return Err(self.operands_thrown(left, right, thrown));
                }
                if let PropertyKey::Name(name) = &key {
                    let name = name.clone();
                    self.infer_function_name(left, &name);
                }
                let target = target.heap_ref();
                let value = core::mem::replace(&mut left, Value::UNDEFINED);
                match self.heap.find_own_property(target, &key) {
                    Some(slot)
                        if matches!(
                            self.heap.object(target).property(slot).value,
                            PropertyValue::Data(_)
                        ) =>
                    {
                        self.heap.assign_data_property(target, slot, value);
                    }
                    Some(slot) => {
                        self.heap.delete_own_property(target, slot);
                        self.heap.define_data_property(
                            target,
                            key,
                            PropertyFlags::configurable_enumerable_writable(),
                            value,
                        );
                    }
                    None => {
                        self.heap.define_data_property(
                            target,
                            key,
                            PropertyFlags::configurable_enumerable_writable(),
                            value,
                        );
                    }
                }
                None
            }
            OpGroup::SetGetter | OpGroup::SetSetter => {
                // left = property name, right = accessor function.
                let key = self
                    .to_property_key(left)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                let target = frame.peek(0);
                debug_assert!(target.is_object());
                if self.heap.is_class_constructor(target)
                    && matches!(&key, PropertyKey::Name(name) if &**name == "prototype")
                {
                    let thrown =
                        self.raise_type_error("Class 'prototype' property is non-configurable");
                    return Err(self.operands_thrown(left, right, thrown));
                }
                let target = target.heap_ref();
                let is_getter = meta.group == OpGroup::SetGetter;
                let accessor = core::mem::replace(&mut right, Value::UNDEFINED);

                let slot = match self.heap.find_own_property(target, &key) {
                    Some(slot)
                        if matches!(
                            self.heap.object(target).property(slot).value,
                            PropertyValue::Accessor { .. }
                        ) =>
                    {
                        Some(slot)
                    }
                    Some(slot) => {
                        self.heap.delete_own_property(target, slot);
                        None
                    }
                    None => None,
                };

                match slot {
                    Some(slot) => {
                        let property = self.heap.object_mut(target).property_mut(slot);
                        let PropertyValue::Accessor { getter, setter } = &mut property.value
                        else {
                            unreachable!()
                        };
                        let half = if is_getter { getter } else { setter };
                        let old = core::mem::replace(half, accessor);
                        self.heap.free_value(old);
                    }
                    None => {
                        let (getter, setter) = if is_getter {
                            (accessor, Value::UNDEFINED)
                        } else {
                            (Value::UNDEFINED, accessor)
                        };
                        self.heap.define_accessor_property(
                            target,
                            key,
                            PropertyFlags::from_bits_truncate(
                                PropertyFlags::ENUMERABLE.bits()
                                    | PropertyFlags::CONFIGURABLE.bits(),
                            ),
                            getter,
                            setter,
                        );
                    }
                }
                None
            }
            OpGroup::RequireObjectCoercible => {
                if frame.peek(0).is_null_or_undefined() {
                    return Err(
                        self.raise_type_error("Cannot convert null or undefined to an object")
                    );
                }
                None
            }

            OpGroup::PreIncr
            | OpGroup::PreDecr
            | OpGroup::PostIncr
            | OpGroup::PostDecr
            | OpGroup::PropPreIncr
            | OpGroup::PropPreDecr
            | OpGroup::PropPostIncr
            | OpGroup::PropPostDecr => {
                let is_prop = matches!(
                    meta.group,
                    OpGroup::PropPreIncr
                        | OpGroup::PropPreDecr
                        | OpGroup::PropPostIncr
                        | OpGroup::PropPostDecr
                );
                let is_post = matches!(
                    meta.group,
                    OpGroup::PostIncr
                        | OpGroup::PostDecr
                        | OpGroup::PropPostIncr
                        | OpGroup::PropPostDecr
                );
                let is_decr = matches!(
                    meta.group,
                    OpGroup::PreDecr
                        | OpGroup::PostDecr
                        | OpGroup::PropPreDecr
                        | OpGroup::PropPostDecr
                );

                if is_prop {
                    let base = frame.peek(1);
                    let property = frame.peek(0);
                    left = self.get_value(base, property)?;
                }

                let (old_value, new_value) = if left.is_integer() {
                    let raw = left.raw() as i32;
                    let delta = if is_decr {
                        -(1 << DIRECT_SHIFT)
                    } else {
                        1 << DIRECT_SHIFT
                    };
                    let bumped = raw as i64 + delta as i64;
                    if (INTEGER_NUMBER_MIN_SHIFTED as i64..=INTEGER_NUMBER_MAX_SHIFTED as i64)
                        .contains(&bumped)
                    {
                        (left, Value::from_raw(bumped as i32 as u32))
                    } else {
                        // Saturated the unboxed window; promote to float.
                        let number = left.as_integer() as f64;
                        let step = if is_decr { -1.0 } else { 1.0 };
                        (left, self.heap.number_value(number + step))
                    }
                } else {
                    let number = self
                        .to_number_value(left)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    self.heap.fast_free_value(left);
                    let step = if is_decr { -1.0 } else { 1.0 };
                    let old = self.heap.number_value(number);
                    (old, self.heap.number_value(number + step))
                };
                left = Value::UNDEFINED;

                if is_post {
                    // Postfix forms expose the unmodified number.
                    if put.contains(PutMode::STACK) {
                        if is_prop {
                            frame.push(Value::UNDEFINED);
                            let top = frame.stack_top;
                            frame.stack[top - 1] = frame.stack[top - 2];
                            frame.stack[top - 2] = frame.stack[top - 3];
                            frame.stack[top - 3] = old_value;
                        } else {
                            frame.push(old_value);
                        }
                        put.remove(PutMode::STACK);
                    } else if put.contains(PutMode::BLOCK) {
                        let previous = core::mem::replace(&mut frame.block_result, old_value);
                        self.heap.fast_free_value(previous);
                        put.remove(PutMode::BLOCK);
                    } else {
                        self.heap.fast_free_value(old_value);
                    }
                } else {
                    self.heap.fast_free_value(old_value);
                }

                Some(new_value)
            }

            OpGroup::UnaryPlus | OpGroup::UnaryMinus => {
                let value = self
                    .unary_operation(left, meta.group == OpGroup::UnaryPlus)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(value);
                None
            }
            OpGroup::LogicalNot => {
                frame.push(Value::boolean(!self.heap.to_boolean(left)));
                None
            }
            OpGroup::BitNot => {
                if left.is_integer() {
                    frame.push(Value::from_raw(!left.raw() & !DIRECT_TYPE_MASK));
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::Not, left, left)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::Void => {
                frame.push(Value::UNDEFINED);
                None
            }
            OpGroup::Typeof => {
                let rendered = self.typeof_value(left);
                frame.push(rendered);
                None
            }

            OpGroup::Add => {
                if let Some(sum) = Value::are_integers(left, right)
                    .then(|| Value::integer_add(left, right))
                    .flatten()
                {
                    frame.push(sum);
                } else {
                    let value = self
                        .addition(left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::Sub => {
                if let Some(difference) = Value::are_integers(left, right)
                    .then(|| Value::integer_sub(left, right))
                    .flatten()
                {
                    frame.push(difference);
                } else {
                    let value = self
                        .number_arithmetic(ArithOp::Sub, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::Mul => {
                if Value::are_integers(left, right) {
                    let l = left.as_integer();
                    let r = right.as_integer();
                    // The window bound keeps the product inside the value
                    // range; zero operands go through the float path to
                    // preserve signed zero.
                    if (-INTEGER_MULTIPLY_MAX..=INTEGER_MULTIPLY_MAX).contains(&l)
                        && (-INTEGER_MULTIPLY_MAX..=INTEGER_MULTIPLY_MAX).contains(&r)
                        && l != 0
                        && r != 0
                    {
                        frame.push(Value::from_integer(l * r));
                    } else {
                        let product = self.heap.number_value(l as f64 * r as f64);
                        frame.push(product);
                    }
                } else {
                    let value = self
                        .number_arithmetic(ArithOp::Mul, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::Div => {
                let value = self
                    .number_arithmetic(ArithOp::Div, left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(value);
                None
            }
            OpGroup::Mod => {
                let mut pushed = false;
                if Value::are_integers(left, right) {
                    let l = left.as_integer();
                    let r = right.as_integer();
                    if r != 0 {
                        let remainder = l % r;
                        // A zero remainder of a negative dividend is -0.
                        if remainder != 0 || l >= 0 {
                            frame.push(Value::from_integer(remainder));
                            pushed = true;
                        }
                    }
                }
                if !pushed {
                    let value = self
                        .number_arithmetic(ArithOp::Mod, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::Exp => {
                let value = self
                    .number_arithmetic(ArithOp::Exp, left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(value);
                None
            }
            OpGroup::Equal | OpGroup::NotEqual => {
                let verdict = self
                    .equality(left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                if meta.group == OpGroup::NotEqual {
                    frame.push(Value::boolean(verdict.is_false()));
                } else {
                    frame.push(verdict);
                }
                None
            }
            OpGroup::StrictEqual => {
                frame.push(Value::boolean(self.heap.strict_equals(left, right)));
                None
            }
            OpGroup::StrictNotEqual => {
                frame.push(Value::boolean(!self.heap.strict_equals(left, right)));
                None
            }
            OpGroup::Less
            | OpGroup::Greater
            | OpGroup::LessEqual
            | OpGroup::GreaterEqual => {
                if Value::are_integers(left, right) {
                    let l = left.raw() as i32;
                    let r = right.raw() as i32;
                    let verdict = match meta.group {
                        OpGroup::Less => l < r,
                        OpGroup::Greater => l > r,
                        OpGroup::LessEqual => l <= r,
                        _ => l >= r,
                    };

                    // Hot-loop fusion: a LESS followed by a backward
                    // conditional branch executes the branch inline. The
                    // stop-hook build keeps them separate so the hook sees
                    // every backward branch.
                    #[cfg(not(feature = "vm-exec-stop"))]
                    if meta.group == OpGroup::Less {
                        let next = frame
                            .code
                            .bytecode
                            .get(frame.cursor)
                            .copied()
                            .and_then(Opcode::from_byte);
                        if let Some(
                            branch @ (Opcode::BranchIfTrueBackward
                            | Opcode::BranchIfTrueBackward2
                            | Opcode::BranchIfTrueBackward3),
                        ) = next
                        {
                            let fusion_start = frame.cursor;
                            frame.cursor += 1;
                            let length = branch.meta().branch_length as usize;
                            if verdict {
                                let mut offset = 0usize;
                                for _ in 0..length {
                                    offset = (offset << 8) | self.fetch_byte(frame)? as usize;
                                }
                                frame.cursor = fusion_start - offset;
                            } else {
                                frame.cursor += length;
                            }
                            return Ok(Flow::Continue);
                        }
                    }

                    frame.push(Value::boolean(verdict));
                } else {
                    let op = match meta.group {
                        OpGroup::Less => RelOp::Less,
                        OpGroup::Greater => RelOp::Greater,
                        OpGroup::LessEqual => RelOp::LessEqual,
                        _ => RelOp::GreaterEqual,
                    };
                    let verdict = self
                        .relation(op, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(verdict);
                }
                None
            }
            OpGroup::BitAnd => {
                if Value::are_integers(left, right) {
                    frame.push(Value::from_raw(left.raw() & right.raw()));
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::And, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::BitOr => {
                if Value::are_integers(left, right) {
                    frame.push(Value::from_raw(left.raw() | right.raw()));
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::Or, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::BitXor => {
                if Value::are_integers(left, right) {
                    frame.push(Value::from_raw(
                        (left.raw() ^ right.raw()) & !DIRECT_TYPE_MASK,
                    ));
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::Xor, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::LeftShift => {
                if Value::are_integers(left, right) {
                    let l = left.as_integer();
                    let shift = right.as_integer() & 0x1f;
                    let value = self.heap.int32_value(l.wrapping_shl(shift as u32));
                    frame.push(value);
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::ShiftLeft, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::RightShift => {
                if Value::are_integers(left, right) {
                    let l = left.as_integer();
                    let shift = right.as_integer() & 0x1f;
                    frame.push(Value::from_integer(l >> shift));
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::ShiftRight, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::UnsRightShift => {
                if Value::are_integers(left, right) {
                    let l = left.as_integer() as u32;
                    let shift = right.as_integer() & 0x1f;
                    let value = self.heap.uint32_value(l >> shift);
                    frame.push(value);
                } else {
                    let value = self
                        .bitwise_logic(BitwiseOp::ShiftRightUnsigned, left, right)
                        .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                    frame.push(value);
                }
                None
            }
            OpGroup::In => {
                let verdict = self
                    .in_op(left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(verdict);
                None
            }
            OpGroup::InstanceOf => {
                let verdict = self
                    .instanceof_op(left, right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                frame.push(verdict);
                None
            }

            OpGroup::Jump => {
                frame.cursor = branch_target;
                None
            }
            OpGroup::BranchIfStrictEqual => {
                let value = frame.pop();
                let against = frame.peek(0);
                if self.heap.strict_equals(value, against) {
                    frame.cursor = branch_target;
                    let matched = frame.pop();
                    self.heap.free_value(matched);
                }
                self.heap.free_value(value);
                None
            }
            OpGroup::BranchIfTrue | OpGroup::BranchIfFalse => {
                let value = frame.pop();
                let mut verdict = self.heap.to_boolean(value);
                if meta.group == OpGroup::BranchIfFalse {
                    verdict = !verdict;
                }
                if verdict {
                    frame.cursor = branch_target;
                }
                self.heap.fast_free_value(value);
                None
            }
            OpGroup::BranchIfLogicalTrue | OpGroup::BranchIfLogicalFalse => {
                let value = frame.pop();
                let mut verdict = self.heap.to_boolean(value);
                if meta.group == OpGroup::BranchIfLogicalFalse {
                    verdict = !verdict;
                }
                if verdict {
                    // Short-circuit: the tested value stays on the stack.
                    frame.cursor = branch_target;
                    frame.push(value);
                } else {
                    self.heap.fast_free_value(value);
                }
                None
            }
            OpGroup::JumpAndExitContext => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                debug_assert!(!self.has_pending_exception());
                if self.stack_find_finally(frame, ContextType::FinallyJump, branch_target) {
                    frame.set_context_payload(1, Value::from_integer(branch_target as i32));
                } else {
                    frame.cursor = branch_target;
                }
                if self.has_pending_exception() {
                    return Ok(Flow::Leave(Value::ERROR));
                }
                None
            }

            OpGroup::Return => {
                let result = if opcode == Opcode::ReturnWithBlock {
                    core::mem::replace(&mut frame.block_result, Value::UNDEFINED)
                } else {
                    core::mem::replace(&mut left, Value::UNDEFINED)
                };
                return Ok(Flow::Leave(result));
            }
            OpGroup::Throw => {
                self.raise_exception(core::mem::replace(&mut left, Value::UNDEFINED));
                return Ok(Flow::Leave(Value::ERROR));
            }
            OpGroup::ThrowReferenceError => {
                return Err(self.raise_reference_error("Undefined reference"));
            }

            OpGroup::Call => {
                frame.call_operation = CallOperation::Call;
                frame.cursor = instr_start;
                return Ok(Flow::Suspend(Value::UNDEFINED));
            }
            OpGroup::New => {
                frame.call_operation = CallOperation::Construct;
                frame.cursor = instr_start;
                return Ok(Flow::Suspend(Value::UNDEFINED));
            }
            OpGroup::ResolveBaseForCall => {
                let top = frame.stack_top;
                let this_slot = frame.stack[top - 3];
                if this_slot == Value::REGISTER_REF {
                    // A register cannot be a reference base.
                    frame.stack[top - 2] = Value::UNDEFINED;
                    frame.stack[top - 3] = Value::UNDEFINED;
                } else if self.heap.is_environment(this_slot) {
                    let implicit = self.implicit_this_value(this_slot.heap_ref());
                    self.heap.free_value(this_slot);
                    frame.stack[top - 3] = implicit;
                }
                None
            }

            OpGroup::Try => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                frame.grow_context(TRY_CONTEXT_STACK_ALLOCATION);
                frame.set_context_word(make_context(ContextType::Try, branch_target));
                None
            }
            OpGroup::Catch => {
                // On the normal path catches are jumps over their body.
                debug_assert_eq!(context_type(frame.context_word()), ContextType::Try);
                frame.cursor = branch_target;
                None
            }
            OpGroup::Finally => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                let word = frame.context_word();
                debug_assert!(matches!(
                    context_type(word),
                    ContextType::Try | ContextType::Catch
                ));
                if context_has_flag(word, CONTEXT_HAS_LEX_ENV) {
                    self.pop_lex_env(frame);
                }
                frame.set_context_word(make_context(ContextType::FinallyJump, branch_target));
                frame.set_context_payload(1, Value::from_integer(branch_target as i32));
                None
            }
            OpGroup::ContextEnd => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                let word = frame.context_word();
                debug_assert!(!context_has_flag(word, CONTEXT_CLOSE_ITERATOR));
                let ty = context_type(word);

                if !is_finally(ty) {
                    self.stack_context_abort(frame);
                    None
                } else {
                    if context_has_flag(word, CONTEXT_HAS_LEX_ENV) {
                        self.pop_lex_env(frame);
                    }
                    frame.shrink_context(TRY_CONTEXT_STACK_ALLOCATION);
                    let pending = frame.stack[frame.stack_top];

                    match ty {
                        ContextType::FinallyReturn => {
                            return Ok(Flow::Leave(pending));
                        }
                        ContextType::FinallyThrow => {
                            self.raise_exception(pending);
                            return Ok(Flow::Leave(Value::ERROR));
                        }
                        _ => {
                            let target = pending.as_integer() as usize;
                            if self.stack_find_finally(frame, ContextType::FinallyJump, target) {
                                frame.set_context_payload(
                                    1,
                                    Value::from_integer(target as i32),
                                );
                            } else {
                                frame.cursor = target;
                            }
                            None
                        }
                    }
                }
            }
            OpGroup::With => {
                let value = frame.pop();
                let object = match self.to_object(value) {
                    Ok(object) => {
                        self.heap.free_value(value);
                        object
                    }
                    Err(thrown) => {
                        self.heap.free_value(value);
                        return Err(thrown);
                    }
                };
                debug_assert_eq!(frame.stack_top, frame.context_bottom());

                let with_env =
                    self.heap
                        .new_object_env(Some(frame.lex_env), object.heap_ref(), true);
                self.heap.object_mut(with_env).environment_mut().is_block = true;
                self.heap.free_value(object);
                self.install_lex_env(frame, with_env);

                frame.grow_context(WITH_CONTEXT_STACK_ALLOCATION);
                frame.set_context_word(context_set_flag(
                    make_context(ContextType::With, branch_target),
                    CONTEXT_HAS_LEX_ENV,
                ));
                None
            }
            OpGroup::BlockCreateContext => {
                let preserved = frame.stack_top > frame.context_bottom();
                if preserved {
                    // Keep the switch scrutinee above the new record.
                    debug_assert_eq!(frame.stack_top, frame.context_bottom() + 1);
                    frame.stack[frame.stack_top] = frame.stack[frame.stack_top - 1];
                    frame.stack[frame.stack_top - 1] = context_set_flag(
                        make_context(ContextType::Block, branch_target),
                        CONTEXT_HAS_LEX_ENV,
                    );
                    frame.stack_top += 1;
                    frame.context_depth += BLOCK_CONTEXT_STACK_ALLOCATION;
                } else {
                    frame.grow_context(BLOCK_CONTEXT_STACK_ALLOCATION);
                    frame.set_context_word(context_set_flag(
                        make_context(ContextType::Block, branch_target),
                        CONTEXT_HAS_LEX_ENV,
                    ));
                }

                let env = self.heap.new_decl_env(Some(frame.lex_env));
                self.heap.object_mut(env).environment_mut().is_block = true;
                self.install_lex_env(frame, env);
                None
            }
            OpGroup::TryCreateEnv => {
                let word = frame.context_word();
                debug_assert!(matches!(
                    context_type(word),
                    ContextType::Try
                        | ContextType::Catch
                        | ContextType::FinallyJump
                        | ContextType::FinallyThrow
                        | ContextType::FinallyReturn
                ));
                debug_assert!(!context_has_flag(word, CONTEXT_HAS_LEX_ENV));
                frame.set_context_word(context_set_flag(word, CONTEXT_HAS_LEX_ENV));

                let env = self.heap.new_decl_env(Some(frame.lex_env));
                self.heap.object_mut(env).environment_mut().is_block = true;
                self.install_lex_env(frame, env);
                None
            }
            OpGroup::CloneContext => {
                let copy_values = opcode == Opcode::CloneFullContext;
                let source = frame.lex_env;

                let entries: Vec<(PropertyKey, PropertyFlags, Value)> = self
                    .heap
                    .object(source)
                    .properties
                    .iter()
                    .map(|entry| {
                        let PropertyValue::Data(value) = entry.property.value else {
                            unreachable!("accessor binding in declarative environment");
                        };
                        (entry.key.clone(), entry.property.flags, value)
                    })
                    .collect();
                let outer = self.heap.object(source).environment().outer;
                let is_block = self.heap.object(source).environment().is_block;

                let clone = self.heap.new_decl_env(outer);
                self.heap.object_mut(clone).environment_mut().is_block = is_block;
                for (key, flags, value) in entries {
                    let value = if copy_values {
                        self.heap.copy_value(value)
                    } else {
                        Value::UNINITIALIZED
                    };
                    self.heap.define_data_property(clone, key, flags, value);
                }
                self.install_lex_env(frame, clone);
                None
            }

            OpGroup::ForInInit => {
                let value = frame.pop();
                let collected = self.for_in_collection(value);
                self.heap.free_value(value);
                match collected? {
                    None => frame.cursor = branch_target,
                    Some((collection, object)) => {
                        debug_assert_eq!(frame.stack_top, frame.context_bottom());
                        frame.grow_context(FOR_IN_CONTEXT_STACK_ALLOCATION);
                        frame.set_context_word(make_context(ContextType::ForIn, branch_target));
                        frame.set_context_payload(1, collection);
                        frame.set_context_payload(2, Value::ZERO);
                        frame.set_context_payload(3, object);
                        self.skip_context_clone(frame);
                    }
                }
                None
            }
            OpGroup::ForInGetNext => {
                debug_assert_eq!(context_type(frame.context_word()), ContextType::ForIn);
                let collection = frame.context_payload(1);
                let index = frame.context_payload(2).as_integer() as usize;
                let name = self.heap.collection(collection)[index];
                let name = self.heap.fast_copy_value(name);
                frame.push(name);
                frame.set_context_payload(2, Value::from_integer(index as i32 + 1));
                None
            }
            OpGroup::ForInHasNext => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                let collection = frame.context_payload(1);
                let object = frame.context_payload(3);
                let mut index = frame.context_payload(2).as_integer() as usize;
                let total = self.heap.collection(collection).len();

                let mut found = false;
                while index < total {
                    let name = self.heap.collection(collection)[index];
                    let key = self.to_property_key(name)?;
                    if self.object_has(object.heap_ref(), &key)? {
                        found = true;
                        break;
                    }
                    index += 1;
                }

                if found {
                    frame.set_context_payload(2, Value::from_integer(index as i32));
                    frame.cursor = branch_target;
                } else {
                    self.heap.free_value(collection);
                    self.heap.free_value(object);
                    frame.shrink_context(FOR_IN_CONTEXT_STACK_ALLOCATION);
                }
                None
            }
            OpGroup::ForOfInit => {
                let value = frame.pop();
                let iterator = match self.get_iterator(value) {
                    Ok(iterator) => {
                        self.heap.free_value(value);
                        iterator
                    }
                    Err(thrown) => {
                        self.heap.free_value(value);
                        return Err(thrown);
                    }
                };
                let step = match self.iterator_step(iterator) {
                    Ok(step) => step,
                    Err(thrown) => {
                        self.heap.free_value(iterator);
                        return Err(thrown);
                    }
                };
                if step.is_false() {
                    self.heap.free_value(iterator);
                    frame.cursor = branch_target;
                } else {
                    debug_assert_eq!(frame.stack_top, frame.context_bottom());
                    frame.grow_context(FOR_OF_CONTEXT_STACK_ALLOCATION);
                    frame.set_context_word(context_set_flag(
                        make_context(ContextType::ForOf, branch_target),
                        CONTEXT_CLOSE_ITERATOR,
                    ));
                    frame.set_context_payload(1, step);
                    frame.set_context_payload(2, iterator);
                    self.skip_context_clone(frame);
                }
                None
            }
            OpGroup::ForOfGetNext => {
                debug_assert_eq!(context_type(frame.context_word()), ContextType::ForOf);
                let step = frame.context_payload(1);
                let value = self.iterator_value(step)?;
                frame.push(value);
                None
            }
            OpGroup::ForOfHasNext => {
                debug_assert_eq!(frame.stack_top, frame.context_bottom());
                let iterator = frame.context_payload(2);
                let step = self.iterator_step(iterator)?;
                let previous = frame.context_payload(1);
                if step.is_false() {
                    self.heap.free_value(previous);
                    self.heap.free_value(iterator);
                    frame.shrink_context(FOR_OF_CONTEXT_STACK_ALLOCATION);
                } else {
                    self.heap.free_value(previous);
                    frame.set_context_payload(1, step);
                    frame.cursor = branch_target;
                }
                None
            }

            OpGroup::ExtPrefix => unreachable!("prefix byte decoded as an instruction"),
            OpGroup::ExtError => {
                debug_assert!(self.has_pending_exception());
                return Ok(Flow::Leave(Value::ERROR));
            }

            OpGroup::SuperCall => {
                let argc = self.fetch_byte(frame)? as usize;
                if ext == Some(ExtOpcode::SpreadSuperCall) {
                    let collection = self.spread_arguments(frame, argc)?;
                    frame.push(collection);
                } else {
                    frame.stack_top -= argc;
                }
                frame.call_operation = CallOperation::SuperCall;
                frame.cursor = instr_start;
                return Ok(Flow::Suspend(Value::UNDEFINED));
            }
            OpGroup::SpreadArguments => {
                let argc = self.fetch_byte(frame)? as usize;
                let collection = self.spread_arguments(frame, argc)?;
                frame.push(collection);
                frame.call_operation = CallOperation::Spread;
                frame.cursor = instr_start;
                return Ok(Flow::Suspend(Value::UNDEFINED));
            }
            OpGroup::PushSpreadElement => {
                frame.push(Value::SPREAD_ELEMENT);
                None
            }
            OpGroup::GetIterator => {
                let iterable = frame.peek(0);
                let iterator = self.get_iterator(iterable)?;
                frame.push(iterator);
                None
            }
            OpGroup::IteratorStep => {
                let depth = match ext {
                    Some(ExtOpcode::IteratorStep2) => 2,
                    Some(ExtOpcode::IteratorStep3) => 3,
                    _ => 1,
                };
                let iterator = frame.peek(depth - 1);
                let step = self.iterator_step(iterator)?;
                let value = if step.is_false() {
                    Value::UNDEFINED
                } else {
                    let value = match self.iterator_value(step) {
                        Ok(value) => value,
                        Err(thrown) => {
                            self.heap.free_value(step);
                            return Err(thrown);
                        }
                    };
                    self.heap.free_value(step);
                    value
                };
                frame.push(value);
                None
            }
            OpGroup::IteratorClose => {
                self.iterator_close(left)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                None
            }
            OpGroup::RestInitializer => {
                let depth = match ext {
                    Some(ExtOpcode::RestInitializer2) => 2,
                    Some(ExtOpcode::RestInitializer3) => 3,
                    _ => 1,
                };
                let iterator = frame.peek(depth - 1);
                let array = self.heap.new_fast_array(Vec::new());
                loop {
                    let step = match self.iterator_step(iterator) {
                        Ok(step) => step,
                        Err(thrown) => {
                            self.heap.free_value(Value::object(array));
                            return Err(thrown);
                        }
                    };
                    if step.is_false() {
                        break;
                    }
                    let value = match self.iterator_value(step) {
                        Ok(value) => value,
                        Err(thrown) => {
                            self.heap.free_value(step);
                            self.heap.free_value(Value::object(array));
                            return Err(thrown);
                        }
                    };
                    self.heap.free_value(step);
                    let length = match &self.heap.object(array).kind {
                        crate::heap::ObjectKind::Array { elements } => elements.len() as u32,
                        _ => unreachable!(),
                    };
                    self.fast_array_set(array, length, value);
                }
                frame.push(Value::object(array));
                None
            }
            OpGroup::DefaultInitializer => {
                if frame.peek(0) != Value::UNDEFINED {
                    frame.cursor = branch_target;
                } else {
                    frame.stack_top -= 1;
                }
                None
            }
            OpGroup::CreateGenerator => {
                frame.call_operation = CallOperation::MakeGenerator;
                return Ok(Flow::Suspend(Value::UNDEFINED));
            }
            OpGroup::Yield | OpGroup::Await => {
                let value = frame.pop();
                frame.call_operation = CallOperation::Return;
                return Ok(Flow::Suspend(value));
            }
            OpGroup::PushNewTarget => {
                let new_target = self.heap.copy_value(self.current_new_target);
                frame.push(new_target);
                None
            }
            OpGroup::PushImplicitConstructor => {
                let function = self.heap.new_function(
                    crate::heap::FunctionKind::ImplicitConstructor { derived: false },
                    None,
                    Some(frame.lex_env),
                );
                frame.push(Value::object(function));
                None
            }
            OpGroup::PushSuperConstructor => {
                let function = self.current_function;
                if !function.is_object() {
                    return Err(self.raise_syntax_error("'super' keyword unexpected here"));
                }
                match self.heap.object(function.heap_ref()).prototype {
                    Some(parent) => {
                        self.heap.bump(parent);
                        frame.push(Value::object(parent));
                    }
                    None => {
                        return Err(
                            self.raise_type_error("Class extends value is not a constructor")
                        );
                    }
                }
                None
            }
            OpGroup::ResolveLexicalThis => {
                let this = self.get_this_binding(frame.lex_env)?;
                frame.push(this);
                None
            }
            OpGroup::InitClass => {
                let constructor = frame.peek(0);
                let parent = frame.peek(1);
                debug_assert!(self.heap.is_callable(constructor));

                let prototype = self.heap.new_object();
                let constructor_ref = constructor.heap_ref();
                self.heap.define_data_property(
                    constructor_ref,
                    PropertyKey::Name(Rc::from("prototype")),
                    PropertyFlags::empty(),
                    Value::object(prototype),
                );
                let back_reference = self.heap.copy_value(constructor);
                self.heap.define_data_property(
                    prototype,
                    PropertyKey::Name(Rc::from("constructor")),
                    PropertyFlags::configurable_writable(),
                    back_reference,
                );

                if parent.is_object() {
                    if !self.heap.is_constructor(parent) {
                        return Err(
                            self.raise_type_error("Class extends value is not a constructor")
                        );
                    }
                    let parent_ref = parent.heap_ref();
                    self.heap.bump(parent_ref);
                    self.heap.set_prototype(constructor_ref, Some(parent_ref));

                    let key = PropertyKey::Name(Rc::from("prototype"));
                    let parent_prototype = self.object_get(parent_ref, &key, parent)?;
                    if parent_prototype.is_object() {
                        let link = parent_prototype.heap_ref();
                        self.heap.bump(link);
                        self.heap.set_prototype(prototype, Some(link));
                    }
                    self.heap.free_value(parent_prototype);

                    if let crate::heap::ObjectKind::Function(function) =
                        &mut self.heap.object_mut(constructor_ref).kind
                    {
                        if let crate::heap::FunctionKind::ImplicitConstructor { derived } =
                            &mut function.kind
                        {
                            *derived = true;
                        }
                    }
                }

                // Restack as [constructor, prototype]; the heritage slot
                // is consumed.
                let top = frame.stack_top;
                frame.stack[top - 2] = constructor;
                self.heap.bump(prototype);
                frame.stack[top - 1] = Value::object(prototype);
                self.heap.free_value(parent);
                None
            }
            OpGroup::FinalizeClass => {
                let prototype = frame.pop();
                self.heap.free_value(prototype);
                None
            }
            OpGroup::StringConcat => {
                let left_str = self
                    .to_string_value(left)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                let right_str = self
                    .to_string_value(right)
                    .map_err(|thrown| self.operands_thrown(left, right, thrown))?;
                let mut joined = String::with_capacity(left_str.len() + right_str.len());
                joined.push_str(&left_str);
                joined.push_str(&right_str);
                let value = self.heap.string_value(&joined);
                frame.push(value);
                None
            }
            OpGroup::Line => {
                let mut value: u32 = 0;
                loop {
                    let byte = self.fetch_byte(frame)?;
                    value = (value << 7) | (byte & 0x7f) as u32;
                    if byte & 0x80 == 0 {
                        break;
                    }
                }
                #[cfg(feature = "line-info")]
                {
                    frame.current_line = value;
                }
                #[cfg(not(feature = "line-info"))]
                let _ = value;
                None
            }
            OpGroup::BreakpointEnabled | OpGroup::BreakpointDisabled => {
                #[cfg(feature = "debug")]
                {
                    if self.hooks.breakpoint_hit(instr_start) == crate::host::DebugAction::Stop {
                        return Err(self.raise_abort("stopped at breakpoint"));
                    }
                }
                None
            }
        };

        if let Some(mut result) = outcome {
            if put.contains(PutMode::IDENT) {
                let index = match self.read_literal_index(frame, info) {
                    Ok(index) => index,
                    Err(thrown) => {
                        self.heap.fast_free_value(result);
                        return Err(self.operands_thrown(left, right, thrown));
                    }
                };
                if index < info.register_end {
                    let old = frame.replace_register(index as usize, result);
                    self.heap.fast_free_value(old);
                    if put.intersects(PutMode::STACK | PutMode::BLOCK) {
                        result = self.heap.fast_copy_value(result);
                    }
                } else {
                    let name = frame.code.ident(index).clone();
                    if let Err(thrown) =
                        self.put_value_lex_env(frame.lex_env, &name, result, info.is_strict)
                    {
                        self.heap.fast_free_value(result);
                        return Err(self.operands_thrown(left, right, thrown));
                    }
                    self.infer_function_name(result, &name);
                    if !put.intersects(PutMode::STACK | PutMode::BLOCK) {
                        self.heap.fast_free_value(result);
                    }
                }
            } else if put.contains(PutMode::REFERENCE) {
                let property = frame.pop();
                let base = frame.pop();

                if base == Value::REGISTER_REF {
                    let index = property.as_integer() as usize;
                    let old = frame.replace_register(index, result);
                    self.heap.fast_free_value(old);
                    if put.intersects(PutMode::STACK | PutMode::BLOCK) {
                        result = self.heap.fast_copy_value(result);
                    } else {
                        self.heap.fast_free_value(right);
                        self.heap.fast_free_value(left);
                        return Ok(Flow::Continue);
                    }
                } else {
                    if let Err(thrown) = self.set_value(base, property, result, info.is_strict) {
                        self.heap.fast_free_value(result);
                        return Err(self.operands_thrown(left, right, thrown));
                    }
                    if !put.intersects(PutMode::STACK | PutMode::BLOCK) {
                        self.heap.fast_free_value(result);
                        self.heap.fast_free_value(right);
                        self.heap.fast_free_value(left);
                        return Ok(Flow::Continue);
                    }
                }
            }

            if put.contains(PutMode::STACK) {
                frame.push(result);
            } else if put.contains(PutMode::BLOCK) {
                let previous = core::mem::replace(&mut frame.block_result, result);
                self.heap.fast_free_value(previous);
            }
        }

        self.heap.fast_free_value(right);
        self.heap.fast_free_value(left);
        Ok(Flow::Continue)
    }

    /// Per-iteration contexts need no clone on their first pass; skip an
    /// immediately following clone opcode.
    fn skip_context_clone(&mut self, frame: &mut Frame) {
        if let Some(Opcode::CloneContext | Opcode::CloneFullContext) = frame
            .code
            .bytecode
            .get(frame.cursor)
            .copied()
            .and_then(Opcode::from_byte)
        {
            frame.cursor += 1;
        }
    }
}
