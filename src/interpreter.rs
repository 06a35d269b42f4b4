//! [`Interpreter`] implementation

use crate::error::{ExceptionKind, Thrown};
use crate::heap::{Heap, ObjectKind};
use crate::host::Host;
use crate::value::{HeapRef, Value};

pub(crate) mod alu;
mod executors;
mod flow;
mod initialization;
pub(crate) mod internal;

#[cfg(feature = "lookup-cache")]
use crate::property::LookupCache;

/// VM interpreter.
///
/// Owns the value heap, the per-context exception slot and the global
/// scope. Frames are created per invocation by the entry points and driven
/// through the dispatch loop; the internal state is not exposed because the
/// intended usage is to run compiled code through
/// [`run_global`](Interpreter::run_global) and inspect the returned values.
#[derive(Debug)]
pub struct Interpreter<H = ()> {
    pub(crate) heap: Heap,
    global_object: HeapRef,
    global_scope: HeapRef,
    global_lexical_block: Option<HeapRef>,
    pub(crate) exception: Option<Value>,
    pub(crate) abort: bool,
    /// `new.target` of the active construct invocation; owned value.
    pub(crate) current_new_target: Value,
    /// The function object being executed; owned value. Super-constructor
    /// resolution reads its prototype link.
    pub(crate) current_function: Value,
    /// Non-owning (lex-env, this) snapshots of the active frame chain,
    /// innermost last. Direct eval inherits scope from the top entry.
    pub(crate) frame_chain: Vec<(HeapRef, Value)>,
    /// The well-known `@@iterator` symbol; owned value.
    pub(crate) well_known_iterator: Value,
    #[cfg(feature = "lookup-cache")]
    pub(crate) lookup_cache: LookupCache,
    #[cfg(feature = "vm-exec-stop")]
    exec_stop_frequency: u32,
    #[cfg(feature = "vm-exec-stop")]
    pub(crate) exec_stop_counter: u32,
    pub(crate) hooks: H,
}

impl Default for Interpreter<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter<()> {
    /// Interpreter with the no-op unit host.
    pub fn new() -> Self {
        Self::with_hooks(())
    }
}

impl<H: Host> Interpreter<H> {
    /// Interpreter with embedder hooks installed.
    pub fn with_hooks(hooks: H) -> Self {
        let mut heap = Heap::new();
        let global_object = heap.new_object();
        heap.bump(global_object);
        let global_scope = heap.new_object_env(None, global_object, true);
        let well_known_iterator = heap.symbol_value(Some(std::rc::Rc::from("Symbol.iterator")));

        Interpreter {
            heap,
            global_object,
            global_scope,
            global_lexical_block: None,
            exception: None,
            abort: false,
            current_new_target: Value::UNDEFINED,
            current_function: Value::UNDEFINED,
            frame_chain: Vec::new(),
            well_known_iterator,
            #[cfg(feature = "lookup-cache")]
            lookup_cache: LookupCache::new(),
            #[cfg(feature = "vm-exec-stop")]
            exec_stop_frequency: crate::consts::EXEC_STOP_DEFAULT_FREQUENCY,
            #[cfg(feature = "vm-exec-stop")]
            exec_stop_counter: crate::consts::EXEC_STOP_DEFAULT_FREQUENCY,
            hooks,
        }
    }

    /// The value heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The value heap, mutable. Reference-count discipline is on the
    /// caller.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The installed host hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The global object.
    pub fn global_object(&self) -> HeapRef {
        self.global_object
    }

    /// The global scope: the lexical block when one was installed, the
    /// object-bound global environment otherwise.
    pub(crate) fn global_scope(&self) -> HeapRef {
        self.global_lexical_block.unwrap_or(self.global_scope)
    }

    /// Install the global lexical block for top-level `let`/`const`.
    /// Idempotent; the block persists across runs.
    pub(crate) fn ensure_global_lexical_block(&mut self) {
        if self.global_lexical_block.is_none() {
            let block = self.heap.new_decl_env(Some(self.global_scope));
            self.heap.object_mut(block).environment_mut().is_block = true;
            self.global_lexical_block = Some(block);
        }
    }

    /// Number of backward branches between stop-hook consultations.
    #[cfg(feature = "vm-exec-stop")]
    pub fn set_exec_stop_frequency(&mut self, frequency: u32) {
        self.exec_stop_frequency = frequency.max(1);
        self.exec_stop_counter = self.exec_stop_frequency;
    }

    #[cfg(feature = "vm-exec-stop")]
    pub(crate) fn exec_stop_frequency(&self) -> u32 {
        self.exec_stop_frequency
    }

    /* EXCEPTION CONTEXT */

    pub(crate) fn has_pending_exception(&self) -> bool {
        self.exception.is_some()
    }

    pub(crate) fn has_pending_abort(&self) -> bool {
        self.abort
    }

    /// Park `value` in the exception slot. The slot takes ownership.
    pub(crate) fn raise_exception(&mut self, value: Value) {
        debug_assert!(self.exception.is_none(), "exception raised over a pending one");
        self.exception = Some(value);
    }

    /// Move the pending exception out of the slot.
    #[must_use]
    pub(crate) fn take_exception(&mut self) -> Value {
        self.exception.take().expect("no pending exception to take")
    }

    /// Drop the pending exception without observing it. The abort flag is
    /// untouched; entry points clear it at the host boundary.
    pub(crate) fn release_exception(&mut self) {
        if let Some(value) = self.exception.take() {
            self.heap.free_value(value);
        }
    }

    fn raise_standard_error(&mut self, kind: ExceptionKind, message: &str) -> Thrown {
        tracing::debug!(%kind, message, "raising exception");
        #[cfg(not(feature = "error-messages"))]
        let message = "";
        let error = self.heap.new_error(kind, message);
        self.raise_exception(error);
        Thrown
    }

    pub(crate) fn raise_type_error(&mut self, message: &str) -> Thrown {
        self.raise_standard_error(ExceptionKind::TypeError, message)
    }

    pub(crate) fn raise_reference_error(&mut self, message: &str) -> Thrown {
        self.raise_standard_error(ExceptionKind::ReferenceError, message)
    }

    pub(crate) fn raise_syntax_error(&mut self, message: &str) -> Thrown {
        self.raise_standard_error(ExceptionKind::SyntaxError, message)
    }

    pub(crate) fn raise_range_error(&mut self, message: &str) -> Thrown {
        self.raise_standard_error(ExceptionKind::RangeError, message)
    }

    /// Raise with the abort flag set; aborts bypass `catch` entirely.
    pub(crate) fn raise_abort(&mut self, message: &str) -> Thrown {
        let value = self.heap.string_value(message);
        self.raise_exception(value);
        self.abort = true;
        Thrown
    }

    /* VALUE INSPECTION */

    /// Render a value for diagnostics and host messages. Never calls back
    /// into script code.
    pub fn render_value(&self, value: Value) -> String {
        if value.is_integer() {
            return value.as_integer().to_string();
        }
        if value.is_float() {
            return Heap::number_to_string(self.heap.number_of(value));
        }
        if value.is_string() {
            return self.heap.string_of(value).to_string();
        }
        if value.is_symbol() {
            return "Symbol(...)".into();
        }
        if value.is_object() {
            let object = self.heap.object(value.heap_ref());
            return match &object.kind {
                ObjectKind::Function(_) => "[function]".into(),
                ObjectKind::Array { .. } => "[array]".into(),
                ObjectKind::Error(kind) => {
                    let message = self.error_message(value.heap_ref());
                    if message.is_empty() {
                        kind.name().into()
                    } else {
                        format!("{}: {}", kind.name(), message)
                    }
                }
                _ => "[object]".into(),
            };
        }
        match value {
            Value::TRUE => "true".into(),
            Value::FALSE => "false".into(),
            Value::NULL => "null".into(),
            Value::UNDEFINED => "undefined".into(),
            _ => format!("{value:?}"),
        }
    }

    fn error_message(&self, error: HeapRef) -> String {
        use crate::heap::{PropertyKey, PropertyValue};
        let object = self.heap.object(error);
        object
            .find_property(&PropertyKey::Name("message".into()))
            .and_then(|slot| match object.property(slot).value {
                PropertyValue::Data(message) if message.is_string() => {
                    Some(self.heap.string_of(message).to_string())
                }
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Release a value previously handed out by an entry point.
    pub fn free_value(&mut self, value: Value) {
        self.heap.free_value(value);
    }

    /* HOST OBJECT SURFACE */

    /// Fresh plain object.
    pub fn create_object(&mut self) -> Value {
        Value::object(self.heap.new_object())
    }

    /// Fresh proxy over `target` with the given trap table; takes
    /// ownership of both references.
    pub fn create_proxy(&mut self, target: Value, handler: Value) -> Value {
        let proxy = self
            .heap
            .alloc(crate::heap::CellData::Object(crate::heap::ObjectData::new(
                ObjectKind::Proxy { target, handler },
            )));
        Value::object(proxy)
    }

    /// Define (or overwrite) a binding on the global object; takes
    /// ownership of `value`.
    pub fn set_global(&mut self, name: &str, value: Value) {
        use crate::heap::{PropertyFlags, PropertyKey};
        let key = PropertyKey::Name(name.into());
        let global = self.global_object;
        match self.heap.find_own_property(global, &key) {
            Some(slot) => self.heap.assign_data_property(global, slot, value),
            None => {
                self.heap.define_data_property(
                    global,
                    key,
                    PropertyFlags::configurable_enumerable_writable(),
                    value,
                );
            }
        }
    }

    /// Read a binding from the global object; `undefined` when absent.
    /// The returned value is owned by the caller.
    pub fn global_get(&mut self, name: &str) -> Value {
        use crate::heap::{PropertyKey, PropertyValue};
        let key = PropertyKey::Name(name.into());
        let global = self.global_object;
        match self.heap.find_own_property(global, &key) {
            Some(slot) => match self.heap.object(global).property(slot).value {
                PropertyValue::Data(value) => self.heap.fast_copy_value(value),
                PropertyValue::Accessor { .. } => Value::UNDEFINED,
            },
            None => Value::UNDEFINED,
        }
    }
}

impl<H> AsRef<Heap> for Interpreter<H> {
    fn as_ref(&self) -> &Heap {
        &self.heap
    }
}
