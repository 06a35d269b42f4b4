//! Outer frame driver
//!
//! Runs a frame to completion by alternating the dispatch loop with the
//! parked call operations it hands back. User-level recursion creates new
//! host frames only through this path, so the call chain stays one host
//! frame per script frame.

use crate::error::{EngineError, ExceptionKind};
use crate::frame::Frame;
use crate::heap::{CellData, ExecutableData, ObjectData, ObjectKind};
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::state::{CallOperation, GeneratorStep};
use crate::value::Value;

impl<H: Host> Interpreter<H> {
    /// Drive one frame until it completes or suspends.
    pub(crate) fn execute(&mut self, frame: &mut Frame) -> Value {
        loop {
            let completion = self.dispatch(frame);

            match frame.call_operation {
                CallOperation::Call => self.op_call(frame),
                CallOperation::Construct => self.op_construct(frame),
                CallOperation::SuperCall => self.op_super_call(frame),
                CallOperation::Spread => self.op_spread(frame),
                CallOperation::Return
                | CallOperation::MakeGenerator
                | CallOperation::None => return completion,
            }
        }
    }

    /// Run a fresh frame: execute it, then either dispose it or capture
    /// it into an executable object when the body is a generator.
    pub(crate) fn run(&mut self, mut frame: Frame) -> Value {
        self.frame_chain.push((frame.lex_env, frame.this_binding));
        let completion = self.execute(&mut frame);
        self.frame_chain.pop();

        match frame.call_operation {
            CallOperation::MakeGenerator => {
                debug_assert!(!completion.is_error());
                self.heap.fast_free_value(completion);
                let executable = self.heap.alloc(CellData::Object(ObjectData::new(
                    ObjectKind::Executable(Box::new(ExecutableData {
                        frame: Some(frame),
                        done: false,
                    })),
                )));
                Value::object(executable)
            }
            CallOperation::None => {
                self.dispose_frame(frame);
                completion
            }
            other => unreachable!("fresh frame finished with {other:?}"),
        }
    }

    /// Release everything a completed frame still owns. The operand stack
    /// was drained by the loop; registers, scope and receiver remain.
    fn dispose_frame(&mut self, frame: Frame) {
        for register in 0..frame.register_end() {
            self.heap.fast_free_value(frame.stack[register]);
        }
        self.heap.free_value(Value::object(frame.lex_env));
        self.heap.free_value(frame.this_binding);
        debug_assert!(frame.block_result.is_undefined());
    }

    /// Resume a suspended executable object with a sent value. The sent
    /// value becomes the result of the suspended yield expression (the
    /// instruction after generator creation discards it on first entry).
    pub fn resume(&mut self, executable: Value, sent: Value) -> Result<GeneratorStep, EngineError> {
        if !executable.is_object()
            || !matches!(
                self.heap.object(executable.heap_ref()).kind,
                ObjectKind::Executable(_)
            )
        {
            self.heap.free_value(sent);
            return Err(EngineError::Uncaught {
                kind: ExceptionKind::TypeError,
                message: "Cannot resume a non-executable object".into(),
            });
        }

        let taken = match &mut self.heap.object_mut(executable.heap_ref()).kind {
            ObjectKind::Executable(data) => data.frame.take(),
            _ => unreachable!(),
        };
        let Some(mut frame) = taken else {
            self.heap.free_value(sent);
            return Ok(GeneratorStep::Done(Value::UNDEFINED));
        };

        frame.push(sent);
        frame.call_operation = CallOperation::None;

        self.frame_chain.push((frame.lex_env, frame.this_binding));
        let completion = self.execute(&mut frame);
        self.frame_chain.pop();

        match frame.call_operation {
            CallOperation::Return => {
                match &mut self.heap.object_mut(executable.heap_ref()).kind {
                    ObjectKind::Executable(data) => data.frame = Some(frame),
                    _ => unreachable!(),
                }
                Ok(GeneratorStep::Yielded(completion))
            }
            CallOperation::None => {
                match &mut self.heap.object_mut(executable.heap_ref()).kind {
                    ObjectKind::Executable(data) => data.done = true,
                    _ => unreachable!(),
                }
                self.dispose_frame(frame);
                self.finish_run(completion).map(GeneratorStep::Done)
            }
            other => unreachable!("resumed frame finished with {other:?}"),
        }
    }

    /// Invoke a callable from the host. The receiver and arguments are
    /// borrowed; the returned value is owned by the caller.
    pub fn invoke(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        if !self.heap.is_callable(callee) {
            let _ = self.raise_type_error("Expected a function");
            return self.finish_run(Value::ERROR);
        }
        let this = self.heap.copy_value(this);
        let args: Vec<Value> = args
            .iter()
            .map(|argument| self.heap.copy_value(*argument))
            .collect();
        match self.function_call(callee, this, &args) {
            Ok(result) => Ok(result),
            Err(_) => self.finish_run(Value::ERROR),
        }
    }
}
