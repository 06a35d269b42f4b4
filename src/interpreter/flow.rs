//! Call, construct, super-call and spread dispatch
//!
//! The loop never invokes user code from inside its opcode switch: it parks
//! the cursor on the call instruction and returns to the driver, which runs
//! one of the handlers below and resumes the loop. Only the actual
//! user-function invocation re-enters the interpreter, one host frame per
//! script frame.

use std::rc::Rc;

use crate::code::CodeFlags;
use crate::error::Thrown;
use crate::frame::Frame;
use crate::heap::{FunctionKind, PropertyKey, ThisBinding};
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::opcode::{ExtOpcode, Opcode, PutMode};
use crate::value::{HeapRef, Value};

/// How the callee binds `this` at frame entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InvocationKind {
    /// Ordinary call; sloppy-mode functions coerce a missing receiver to
    /// the global object.
    Call,
    /// Base-class or ordinary construct; `this` is the fresh object.
    Construct,
    /// Derived-class construct; `this` stays uninitialized until
    /// `super()` binds it.
    DerivedConstruct,
}

impl<H: Host> Interpreter<H> {
    /// Invoke a callable with an owned receiver and owned arguments; both
    /// are released before returning. The callee is borrowed.
    pub(crate) fn function_call(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        debug_assert!(self.heap.is_callable(callee));

        let function = self.heap.object(callee.heap_ref()).function();
        let code = function.code.clone();
        let scope = function.scope;
        let captured_this = match &function.kind {
            FunctionKind::Arrow(captured) => Some(*captured),
            _ => None,
        };
        let is_class_ctor = matches!(function.kind, FunctionKind::ImplicitConstructor { .. })
            || code
                .as_ref()
                .is_some_and(|code| code.flags.contains(CodeFlags::CLASS_CONSTRUCTOR));

        if is_class_ctor {
            self.free_invocation(this, args);
            return Err(
                self.raise_type_error("Class constructor cannot be invoked without 'new'")
            );
        }

        let code = code.expect("callable without a body");

        let this = if let Some(captured) = captured_this {
            self.heap.free_value(this);
            self.heap.copy_value(captured)
        } else if !code.is_strict() && this.is_null_or_undefined() {
            self.heap.free_value(this);
            let global = self.global_object();
            self.heap.bump(global);
            Value::object(global)
        } else {
            this
        };

        let saved_function =
            core::mem::replace(&mut self.current_function, self.heap.copy_value(callee));
        let saved_new_target = core::mem::replace(&mut self.current_new_target, Value::UNDEFINED);

        let frame = self.build_function_frame(code, scope, this, args, InvocationKind::Call);
        let completion = self.run(frame);

        let function = core::mem::replace(&mut self.current_function, saved_function);
        self.heap.free_value(function);
        let new_target = core::mem::replace(&mut self.current_new_target, saved_new_target);
        self.heap.free_value(new_target);

        for argument in args {
            self.heap.fast_free_value(*argument);
        }

        if completion.is_error() {
            Err(Thrown)
        } else {
            Ok(completion)
        }
    }

    /// Construct through a constructor with an owned argument list. The
    /// callee and `new.target` are borrowed.
    pub(crate) fn function_construct(
        &mut self,
        callee: Value,
        new_target: Value,
        args: &[Value],
    ) -> Result<Value, Thrown> {
        debug_assert!(self.heap.is_constructor(callee));

        let function = self.heap.object(callee.heap_ref()).function();
        if let FunctionKind::ImplicitConstructor { derived } = function.kind {
            if derived {
                let parent = self.heap.object(callee.heap_ref()).prototype;
                let Some(parent) = parent else {
                    self.free_invocation(Value::UNDEFINED, args);
                    return Err(self.raise_type_error("Class extends value is not a constructor"));
                };
                return self.function_construct(Value::object(parent), new_target, args);
            }
            let this = self.new_target_instance(new_target);
            self.free_invocation(Value::UNDEFINED, args);
            return this;
        }

        let code = function
            .code
            .clone()
            .expect("constructor without a body");
        let scope = function.scope;
        let derived = code.flags.contains(CodeFlags::DERIVED_CONSTRUCTOR);

        let saved_function =
            core::mem::replace(&mut self.current_function, self.heap.copy_value(callee));
        let saved_new_target =
            core::mem::replace(&mut self.current_new_target, self.heap.copy_value(new_target));

        let outcome = if derived {
            let frame = self.build_function_frame(
                code,
                scope,
                Value::UNDEFINED,
                args,
                InvocationKind::DerivedConstruct,
            );
            let function_env = frame.lex_env;
            self.heap.bump(function_env);
            let completion = self.run(frame);
            let outcome = self.finish_derived_construct(completion, function_env);
            self.heap.free_value(Value::object(function_env));
            outcome
        } else {
            let this = match self.constructor_instance(callee) {
                Ok(this) => this,
                Err(thrown) => {
                    self.restore_invocation_context(saved_function, saved_new_target);
                    self.free_invocation(Value::UNDEFINED, args);
                    return Err(thrown);
                }
            };
            let frame_this = self.heap.copy_value(this);
            let frame =
                self.build_function_frame(code, scope, frame_this, args, InvocationKind::Construct);
            let completion = self.run(frame);
            if completion.is_error() {
                self.heap.free_value(this);
                Err(Thrown)
            } else if completion.is_object() {
                self.heap.free_value(this);
                Ok(completion)
            } else {
                self.heap.fast_free_value(completion);
                Ok(this)
            }
        };

        self.restore_invocation_context(saved_function, saved_new_target);
        for argument in args {
            self.heap.fast_free_value(*argument);
        }
        outcome
    }

    fn restore_invocation_context(&mut self, saved_function: Value, saved_new_target: Value) {
        let function = core::mem::replace(&mut self.current_function, saved_function);
        self.heap.free_value(function);
        let new_target = core::mem::replace(&mut self.current_new_target, saved_new_target);
        self.heap.free_value(new_target);
    }

    fn finish_derived_construct(
        &mut self,
        completion: Value,
        function_env: HeapRef,
    ) -> Result<Value, Thrown> {
        if completion.is_error() {
            return Err(Thrown);
        }
        if completion.is_object() {
            return Ok(completion);
        }
        if !completion.is_undefined() && !completion.is_empty() {
            self.heap.fast_free_value(completion);
            return Err(
                self.raise_type_error("Derived constructors may only return object or undefined")
            );
        }
        self.heap.fast_free_value(completion);
        match self.heap.object(function_env).environment().this_binding {
            ThisBinding::Bound(this) => Ok(self.heap.copy_value(this)),
            _ => Err(self.raise_reference_error(
                "Must call super constructor before returning from derived constructor",
            )),
        }
    }

    /// Fresh instance whose prototype comes from the constructor's
    /// `prototype` property.
    fn constructor_instance(&mut self, constructor: Value) -> Result<Value, Thrown> {
        let key = PropertyKey::Name(Rc::from("prototype"));
        let prototype = self.object_get(constructor.heap_ref(), &key, constructor)?;
        let instance = self.heap.new_object();
        if prototype.is_object() {
            let link = prototype.heap_ref();
            self.heap.bump(link);
            self.heap.set_prototype(instance, Some(link));
        }
        self.heap.free_value(prototype);
        Ok(Value::object(instance))
    }

    fn new_target_instance(&mut self, new_target: Value) -> Result<Value, Thrown> {
        if new_target.is_object() {
            self.constructor_instance(new_target)
        } else {
            Ok(Value::object(self.heap.new_object()))
        }
    }

    fn free_invocation(&mut self, this: Value, args: &[Value]) {
        self.heap.free_value(this);
        for argument in args {
            self.heap.fast_free_value(*argument);
        }
    }

    /* DRIVER-SIDE HANDLERS */

    /// `Call` family handler; the cursor is parked on the instruction.
    pub(crate) fn op_call(&mut self, frame: &mut Frame) {
        let instr = frame.cursor;
        let opcode = Opcode::from_byte(frame.code.bytecode[instr]).expect("parked call opcode");
        let argc = frame.code.bytecode[instr + 1] as usize;
        let cursor_after = instr + 2;
        let is_prop = matches!(
            opcode,
            Opcode::CallProp | Opcode::CallPropPush | Opcode::CallPropBlock
        );

        let args_base = frame.stack_top - argc;
        let callee = frame.stack[args_base - 1];
        let this = if is_prop {
            self.heap.copy_value(frame.stack[args_base - 3])
        } else {
            Value::UNDEFINED
        };

        let args: Vec<Value> = frame.stack[args_base..frame.stack_top].to_vec();
        frame.stack_top = args_base;

        let completion = if self.heap.is_callable(callee) {
            self.function_call(callee, this, &args)
        } else {
            self.free_invocation(this, &args);
            Err(self.raise_type_error("Expected a function"))
        };

        if is_prop {
            let func = frame.stack[frame.stack_top - 1];
            let property = frame.stack[frame.stack_top - 2];
            frame.stack_top -= 2;
            self.heap.free_value(func);
            self.heap.free_value(property);
        }

        match completion {
            Err(_) => frame.redirect_to_error(),
            Ok(result) => {
                let consumed = frame.stack[frame.stack_top - 1];
                frame.stack_top -= 1;
                self.heap.free_value(consumed);
                frame.cursor = cursor_after;
                self.apply_call_result(frame, opcode.meta().put, result);
            }
        }
    }

    /// `New` handler.
    pub(crate) fn op_construct(&mut self, frame: &mut Frame) {
        let instr = frame.cursor;
        let argc = frame.code.bytecode[instr + 1] as usize;
        let cursor_after = instr + 2;

        let args_base = frame.stack_top - argc;
        let callee = frame.stack[args_base - 1];
        let args: Vec<Value> = frame.stack[args_base..frame.stack_top].to_vec();
        frame.stack_top = args_base;

        let completion = if self.heap.is_constructor(callee) {
            self.function_construct(callee, callee, &args)
        } else {
            self.free_invocation(Value::UNDEFINED, &args);
            Err(self.raise_type_error("Expected a constructor"))
        };

        match completion {
            Err(_) => frame.redirect_to_error(),
            Ok(result) => {
                self.heap.free_value(frame.stack[frame.stack_top - 1]);
                frame.stack[frame.stack_top - 1] = result;
                frame.cursor = cursor_after;
            }
        }
    }

    /// `super(...)` handler.
    pub(crate) fn op_super_call(&mut self, frame: &mut Frame) {
        let instr = frame.cursor;
        let ext = ExtOpcode::from_byte(frame.code.bytecode[instr + 1]).expect("parked super call");
        let argc = frame.code.bytecode[instr + 2] as usize;
        let cursor_after = instr + 3;
        let spread = ext == ExtOpcode::SpreadSuperCall;

        let args: Vec<Value> = if spread {
            let collection = frame.pop();
            let values = core::mem::take(self.heap.collection_mut(collection));
            self.heap.free_value(collection);
            values
        } else {
            let args = frame.stack[frame.stack_top..frame.stack_top + argc].to_vec();
            args
        };

        let callee = frame.pop();

        let this_env = self.this_slot_environment(frame.lex_env);
        let completion = match this_env {
            None => {
                self.free_invocation(Value::UNDEFINED, &args);
                Err(self.raise_syntax_error("'super' keyword unexpected here"))
            }
            Some(env)
                if self.heap.object(env).environment().this_binding != ThisBinding::Uninitialized =>
            {
                self.free_invocation(Value::UNDEFINED, &args);
                Err(self.raise_reference_error("Super constructor may only be called once"))
            }
            Some(_) if !self.heap.is_constructor(callee) => {
                self.free_invocation(Value::UNDEFINED, &args);
                Err(self.raise_type_error("Class extends value is not a constructor"))
            }
            Some(env) => {
                let new_target = self.current_new_target;
                match self.function_construct(callee, new_target, &args) {
                    Err(thrown) => Err(thrown),
                    Ok(instance) => {
                        self.adopt_new_target_prototype(instance);
                        let bound = self.heap.copy_value(instance);
                        self.heap.object_mut(env).environment_mut().this_binding =
                            ThisBinding::Bound(bound);
                        Ok(instance)
                    }
                }
            }
        };

        self.heap.free_value(callee);

        match completion {
            Err(_) => frame.redirect_to_error(),
            Ok(instance) => {
                let previous = core::mem::replace(
                    &mut frame.this_binding,
                    self.heap.copy_value(instance),
                );
                self.heap.free_value(previous);
                frame.cursor = cursor_after;
                self.apply_call_result(frame, ext.meta().put, instance);
            }
        }
    }

    /// Point a freshly constructed instance at `new.target.prototype`,
    /// mirroring the construct semantics of a super chain.
    fn adopt_new_target_prototype(&mut self, instance: Value) {
        if !instance.is_object() || !self.current_new_target.is_object() {
            return;
        }
        let new_target = self.current_new_target;
        let key = PropertyKey::Name(Rc::from("prototype"));
        let Ok(prototype) = self.object_get(new_target.heap_ref(), &key, new_target) else {
            self.release_exception();
            return;
        };
        if prototype.is_object() {
            let link = prototype.heap_ref();
            self.heap.bump(link);
            self.heap.set_prototype(instance.heap_ref(), Some(link));
        }
        self.heap.free_value(prototype);
    }

    /// Environment carrying the class constructor's `this` slot.
    fn this_slot_environment(&self, env: HeapRef) -> Option<HeapRef> {
        let mut current = Some(env);
        while let Some(env) = current {
            let data = self.heap.object(env).environment();
            if data.this_binding != ThisBinding::Absent {
                return Some(env);
            }
            current = data.outer;
        }
        None
    }

    /// Spread call/construct handler.
    pub(crate) fn op_spread(&mut self, frame: &mut Frame) {
        let instr = frame.cursor;
        let ext = ExtOpcode::from_byte(frame.code.bytecode[instr + 1]).expect("parked spread op");
        let cursor_after = instr + 3;

        let collection = frame.pop();
        let args = core::mem::take(self.heap.collection_mut(collection));
        self.heap.free_value(collection);
        let callee = frame.pop();

        let is_prop = matches!(
            ext,
            ExtOpcode::SpreadCallProp
                | ExtOpcode::SpreadCallPropPush
                | ExtOpcode::SpreadCallPropBlock
        );

        let completion = if ext == ExtOpcode::SpreadNew {
            if self.heap.is_constructor(callee) {
                self.function_construct(callee, callee, &args)
            } else {
                self.free_invocation(Value::UNDEFINED, &args);
                Err(self.raise_type_error("Expected a constructor"))
            }
        } else if self.heap.is_callable(callee) {
            let this = if is_prop {
                self.heap.copy_value(frame.peek(1))
            } else {
                Value::UNDEFINED
            };
            self.function_call(callee, this, &args)
        } else {
            self.free_invocation(Value::UNDEFINED, &args);
            Err(self.raise_type_error("Expected a function"))
        };

        self.heap.free_value(callee);

        if is_prop {
            let property = frame.pop();
            let base = frame.pop();
            self.heap.free_value(property);
            self.heap.free_value(base);
        }

        match completion {
            Err(_) => frame.redirect_to_error(),
            Ok(result) => {
                frame.cursor = cursor_after;
                self.apply_call_result(frame, ext.meta().put, result);
            }
        }
    }

    /// Route a completed call's result per the parked instruction's
    /// disposition.
    fn apply_call_result(&mut self, frame: &mut Frame, put: PutMode, result: Value) {
        if put.contains(PutMode::STACK) {
            frame.push(result);
        } else if put.contains(PutMode::BLOCK) {
            let previous = core::mem::replace(&mut frame.block_result, result);
            self.heap.fast_free_value(previous);
        } else {
            self.heap.fast_free_value(result);
        }
    }

}
