//! Frame initialization and entry points

use std::rc::Rc;

use crate::code::{CodeFlags, CompiledCode};
use crate::error::{EngineError, ExceptionKind};
use crate::frame::Frame;
use crate::heap::{ObjectKind, ThisBinding};
use crate::host::Host;
use crate::interpreter::flow::InvocationKind;
use crate::interpreter::Interpreter;
use crate::value::{HeapRef, Value};

impl<H: Host> Interpreter<H> {
    /// Build the frame of a function invocation: a declarative function
    /// environment over the closure scope, arguments copied into the low
    /// registers, surplus arguments collected when the code carries a rest
    /// parameter. Takes ownership of `this`; `args` are copied.
    pub(crate) fn build_function_frame(
        &mut self,
        code: Rc<CompiledCode>,
        scope: Option<HeapRef>,
        this: Value,
        args: &[Value],
        invocation: InvocationKind,
    ) -> Frame {
        let env = self.heap.new_decl_env(scope);
        match invocation {
            InvocationKind::Call => {}
            InvocationKind::Construct => {
                let bound = self.heap.copy_value(this);
                self.heap.object_mut(env).environment_mut().this_binding =
                    ThisBinding::Bound(bound);
            }
            InvocationKind::DerivedConstruct => {
                self.heap.object_mut(env).environment_mut().this_binding =
                    ThisBinding::Uninitialized;
            }
        }

        let argument_end = code.argument_end as usize;
        let rest = code.flags.contains(CodeFlags::REST_PARAMETER);
        let mut frame = Frame::new(code, env, this);

        let named = args.len().min(argument_end);
        for (register, argument) in args[..named].iter().enumerate() {
            frame.stack[register] = self.heap.fast_copy_value(*argument);
        }

        if rest {
            let surplus: Vec<Value> = args[named.min(args.len())..]
                .iter()
                .map(|argument| self.heap.fast_copy_value(*argument))
                .collect();
            let array = self.heap.new_fast_array(surplus);
            frame.stack[argument_end] = Value::object(array);
        }

        tracing::trace!(
            registers = frame.register_end(),
            arguments = args.len(),
            "entering function frame"
        );
        frame
    }

    /// Run global code: installs the global scope (and the global lexical
    /// block when the header asks for one) and drives the loop.
    pub fn run_global(&mut self, code: Rc<CompiledCode>) -> Result<Value, EngineError> {
        if code.flags.contains(CodeFlags::LEXICAL_BLOCK_NEEDED) {
            self.ensure_global_lexical_block();
        }
        let scope = self.global_scope();
        self.heap.bump(scope);
        let global = self.global_object();
        self.heap.bump(global);

        let frame = Frame::new(code, scope, Value::object(global));
        let completion = self.run(frame);
        self.finish_run(completion)
    }

    /// Run eval code. Direct eval inherits the this-binding and scope of
    /// the innermost active frame; indirect eval runs against the global.
    /// Strict code layers a declarative environment, and the header may
    /// request a lexical block on top.
    pub fn run_eval(&mut self, code: Rc<CompiledCode>, direct: bool) -> Result<Value, EngineError> {
        let (mut env, this) = match self.frame_chain.last().copied() {
            Some((env, this)) if direct => {
                self.heap.bump(env);
                (env, self.heap.copy_value(this))
            }
            _ => {
                let env = self.global_scope();
                self.heap.bump(env);
                let global = self.global_object();
                self.heap.bump(global);
                (env, Value::object(global))
            }
        };

        if code.is_strict() {
            let strict_env = self.heap.new_decl_env(Some(env));
            self.heap.free_value(Value::object(env));
            env = strict_env;
        }

        if code.flags.contains(CodeFlags::LEXICAL_BLOCK_NEEDED) {
            let block = self.heap.new_decl_env(Some(env));
            self.heap.object_mut(block).environment_mut().is_block = true;
            self.heap.free_value(Value::object(env));
            env = block;
        }

        let mut frame = Frame::new(code, env, this);
        frame.is_eval_code = true;
        let completion = self.run(frame);
        self.finish_run(completion)
    }

    /// Run module code against the given environment (the global scope
    /// when absent), initializing module bindings through the host first.
    #[cfg(feature = "module-system")]
    pub fn run_module(
        &mut self,
        code: Rc<CompiledCode>,
        lex_env: Option<HeapRef>,
    ) -> Result<Value, EngineError> {
        if let Err(message) = self.hooks.module_initialize() {
            return Err(EngineError::Uncaught {
                kind: ExceptionKind::SyntaxError,
                message,
            });
        }

        let env = lex_env.unwrap_or_else(|| self.global_scope());
        self.heap.bump(env);
        let global = self.global_object();
        self.heap.bump(global);

        let frame = Frame::new(code, env, Value::object(global));
        let completion = self.run(frame);
        self.finish_run(completion)
    }

    /// Convert a loop completion into the host result: the value itself,
    /// or the pending exception as an [`EngineError`].
    pub(crate) fn finish_run(&mut self, completion: Value) -> Result<Value, EngineError> {
        if !completion.is_error() {
            return Ok(completion);
        }

        let exception = self.take_exception();
        let (kind, message) = self.describe_exception(exception);
        self.heap.free_value(exception);

        if self.has_pending_abort() {
            self.abort = false;
            tracing::debug!(%message, "execution aborted");
            return Err(EngineError::Aborted(message.into()));
        }
        tracing::debug!(%kind, %message, "uncaught exception");
        Err(EngineError::Uncaught {
            kind,
            message: message.into(),
        })
    }

    pub(crate) fn describe_exception(&self, exception: Value) -> (ExceptionKind, String) {
        if exception.is_object() {
            if let ObjectKind::Error(kind) = self.heap.object(exception.heap_ref()).kind {
                let message = {
                    let rendered = self.render_value(exception);
                    rendered
                        .split_once(": ")
                        .map(|(_, message)| message.to_string())
                        .unwrap_or_default()
                };
                return (kind, message);
            }
        }
        (ExceptionKind::Error, self.render_value(exception))
    }
}
