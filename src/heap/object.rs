//! Object storage
//!
//! Objects, lexical environments, functions, proxies and suspended
//! executable objects all share one cell layout: a kind, an optional
//! prototype and a named-property table. Declarative environments store
//! their bindings in the same table.

use std::rc::Rc;

use crate::code::CompiledCode;
use crate::error::ExceptionKind;
use crate::frame::Frame;
use crate::value::{HeapRef, Value};

bitflags::bitflags! {
    /// Attribute bits of a named property.
    pub struct PropertyFlags: u8 {
        /// The value may be replaced.
        const WRITABLE = 0x01;
        /// Visible to for-in enumeration.
        const ENUMERABLE = 0x02;
        /// May be deleted or converted to an accessor.
        const CONFIGURABLE = 0x04;
    }
}

impl PropertyFlags {
    /// Attributes of an ordinary assignment-created property.
    pub const fn configurable_enumerable_writable() -> Self {
        Self::from_bits_truncate(
            Self::WRITABLE.bits() | Self::ENUMERABLE.bits() | Self::CONFIGURABLE.bits(),
        )
    }

    /// Attributes of a `let` binding.
    pub const fn enumerable_writable() -> Self {
        Self::from_bits_truncate(Self::WRITABLE.bits() | Self::ENUMERABLE.bits())
    }

    /// Attributes of an eval-introduced hoisted binding.
    pub const fn configurable_writable() -> Self {
        Self::from_bits_truncate(Self::WRITABLE.bits() | Self::CONFIGURABLE.bits())
    }
}

/// Coerced property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Canonical numeric index.
    Index(u32),
    /// Interned name string.
    Name(Rc<str>),
    /// Symbol identity; the table owns one reference to the cell.
    Symbol(HeapRef),
}

impl PropertyKey {
    /// Name form of the key for diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            PropertyKey::Index(index) => index.to_string(),
            PropertyKey::Name(name) => name.to_string(),
            PropertyKey::Symbol(_) => "Symbol(...)".into(),
        }
    }
}

/// Payload of a named property.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Plain data slot; the property owns the value.
    Data(Value),
    /// Accessor pair; unset halves are `undefined`.
    Accessor {
        /// Getter function or `undefined`.
        getter: Value,
        /// Setter function or `undefined`.
        setter: Value,
    },
}

/// One named property.
#[derive(Debug, Clone)]
pub struct Property {
    /// Attribute bits.
    pub flags: PropertyFlags,
    /// Data or accessor payload.
    pub value: PropertyValue,
}

#[derive(Debug, Clone)]
pub(crate) struct PropertyEntry {
    pub(crate) key: PropertyKey,
    pub(crate) property: Property,
}

/// Function color, fixed at creation.
#[derive(Debug, Clone)]
pub enum FunctionKind {
    /// Ordinary function.
    Simple,
    /// Arrow function; `this` was captured at creation and the field owns
    /// it.
    Arrow(Value),
    /// Generator function; invocation materializes an executable object.
    Generator,
    /// Synthesized class constructor with no body of its own.
    ImplicitConstructor {
        /// Derived constructors forward their arguments to `super`.
        derived: bool,
    },
}

/// Function object payload.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub(crate) kind: FunctionKind,
    /// Body; `None` only for implicit constructors.
    pub(crate) code: Option<Rc<CompiledCode>>,
    /// Closure scope; owned reference, `None` for implicit constructors
    /// created before class wiring.
    pub(crate) scope: Option<HeapRef>,
}

/// Lexical environment payload.
#[derive(Debug)]
pub struct EnvironmentData {
    /// Binding storage variant.
    pub(crate) kind: EnvKind,
    /// Enclosing environment; owned reference, `None` at the global end
    /// of the chain.
    pub(crate) outer: Option<HeapRef>,
    /// Marks environments created for let/const blocks; the var
    /// declaration path skips them.
    pub(crate) is_block: bool,
    /// `this` slot for function environments of class constructors.
    pub(crate) this_binding: ThisBinding,
}

/// Binding storage of an environment.
#[derive(Debug)]
pub enum EnvKind {
    /// Bindings live in the environment's own property table.
    Declarative,
    /// Bindings are the properties of `object` (with-statement, global
    /// scope); owned reference.
    ObjectBound {
        /// The binding object.
        object: HeapRef,
        /// Whether the binding object doubles as the implicit `this`.
        provide_this: bool,
    },
}

/// State of an environment's `this` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThisBinding {
    /// The environment carries no `this` slot.
    Absent,
    /// Derived-constructor frame before `super()` ran.
    Uninitialized,
    /// Bound receiver; owned value.
    Bound(Value),
}

/// Suspended generator/async body.
#[derive(Debug)]
pub struct ExecutableData {
    /// Captured frame; taken while the body runs.
    pub(crate) frame: Option<Frame>,
    /// Set once the body completes or is abandoned.
    pub(crate) done: bool,
}

/// Object payload discriminator.
#[derive(Debug)]
pub enum ObjectKind {
    /// Plain object.
    Ordinary,
    /// Array; dense element storage while `fast` holds.
    Array {
        /// Element storage; holes are `ARRAY_HOLE`.
        elements: Vec<Value>,
    },
    /// Callable.
    Function(FunctionData),
    /// Lexical environment.
    Environment(EnvironmentData),
    /// Proxy exotic object; both fields owned.
    Proxy {
        /// Wrapped object.
        target: Value,
        /// Trap table.
        handler: Value,
    },
    /// Suspended generator/async execution.
    Executable(Box<ExecutableData>),
    /// Built-in iterator over a fast array; `target` is owned.
    ArrayIterator {
        /// Iterated array.
        target: HeapRef,
        /// Next element index.
        index: u32,
    },
    /// Error object; the message lives in the property table.
    Error(ExceptionKind),
    /// Regular expression materialized from a literal.
    Regexp(Rc<str>),
}

/// One heap object.
#[derive(Debug)]
pub struct ObjectData {
    pub(crate) kind: ObjectKind,
    /// Owned prototype reference.
    pub(crate) prototype: Option<HeapRef>,
    pub(crate) properties: Vec<PropertyEntry>,
    pub(crate) extensible: bool,
}

impl ObjectData {
    pub(crate) fn new(kind: ObjectKind) -> Self {
        ObjectData {
            kind,
            prototype: None,
            properties: Vec::new(),
            extensible: true,
        }
    }

    /// Slot of an own property.
    pub(crate) fn find_property(&self, key: &PropertyKey) -> Option<usize> {
        self.properties.iter().position(|entry| entry.key == *key)
    }

    pub(crate) fn property(&self, slot: usize) -> &Property {
        &self.properties[slot].property
    }

    pub(crate) fn property_mut(&mut self, slot: usize) -> &mut Property {
        &mut self.properties[slot].property
    }

    /// Whether the object is a lexical environment.
    pub(crate) fn is_environment(&self) -> bool {
        matches!(self.kind, ObjectKind::Environment(_))
    }

    pub(crate) fn environment(&self) -> &EnvironmentData {
        match &self.kind {
            ObjectKind::Environment(env) => env,
            other => unreachable!("environment access on {other:?}"),
        }
    }

    pub(crate) fn environment_mut(&mut self) -> &mut EnvironmentData {
        match &mut self.kind {
            ObjectKind::Environment(env) => env,
            other => unreachable!("environment access on {other:?}"),
        }
    }

    pub(crate) fn function(&self) -> &FunctionData {
        match &self.kind {
            ObjectKind::Function(function) => function,
            other => unreachable!("function access on {other:?}"),
        }
    }

    pub(crate) fn function_mut(&mut self) -> &mut FunctionData {
        match &mut self.kind {
            ObjectKind::Function(function) => function,
            other => unreachable!("function access on {other:?}"),
        }
    }

    /// Whether the object can be invoked as a function.
    pub(crate) fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Whether the object can be invoked as a constructor. Arrow and
    /// generator functions cannot.
    pub(crate) fn is_constructor(&self) -> bool {
        match &self.kind {
            ObjectKind::Function(function) => matches!(
                function.kind,
                FunctionKind::Simple | FunctionKind::ImplicitConstructor { .. }
            ),
            _ => false,
        }
    }

    /// Whether the array fast path may service index `index`.
    pub(crate) fn fast_array_element(&self, index: u32) -> Option<Value> {
        match &self.kind {
            ObjectKind::Array { elements } => elements.get(index as usize).copied(),
            _ => None,
        }
    }

    /// Push every value and owned reference reachable from this object
    /// onto the release worklist. Called once when the cell dies.
    pub(crate) fn collect_owned(mut self, pending: &mut Vec<Value>) {
        if let Some(prototype) = self.prototype.take() {
            pending.push(Value::object(prototype));
        }

        for entry in self.properties.drain(..) {
            if let PropertyKey::Symbol(symbol) = entry.key {
                pending.push(Value::symbol(symbol));
            }
            match entry.property.value {
                PropertyValue::Data(value) => pending.push(value),
                PropertyValue::Accessor { getter, setter } => {
                    pending.push(getter);
                    pending.push(setter);
                }
            }
        }

        match self.kind {
            ObjectKind::Ordinary | ObjectKind::Error(_) | ObjectKind::Regexp(_) => {}
            ObjectKind::Array { elements } => pending.extend(elements),
            ObjectKind::Function(function) => {
                if let FunctionKind::Arrow(this) = function.kind {
                    pending.push(this);
                }
                if let Some(scope) = function.scope {
                    pending.push(Value::object(scope));
                }
            }
            ObjectKind::Environment(env) => {
                if let Some(outer) = env.outer {
                    pending.push(Value::object(outer));
                }
                if let EnvKind::ObjectBound { object, .. } = env.kind {
                    pending.push(Value::object(object));
                }
                if let ThisBinding::Bound(this) = env.this_binding {
                    pending.push(this);
                }
            }
            ObjectKind::Proxy { target, handler } => {
                pending.push(target);
                pending.push(handler);
            }
            ObjectKind::Executable(executable) => {
                if let Some(frame) = executable.frame {
                    frame.collect_owned(pending);
                }
            }
            ObjectKind::ArrayIterator { target, .. } => pending.push(Value::object(target)),
        }
    }
}

impl Frame {
    /// Release support for frames captured inside executable objects.
    pub(crate) fn collect_owned(self, pending: &mut Vec<Value>) {
        pending.push(Value::object(self.lex_env));
        pending.push(self.this_binding);
        pending.push(self.block_result);
        pending.extend(&self.stack[..self.stack_top]);
    }
}

impl Value {
    pub(crate) const fn object(cell: HeapRef) -> Value {
        Value::heap(crate::consts::TAG_OBJECT, cell)
    }

    pub(crate) const fn symbol(cell: HeapRef) -> Value {
        Value::heap(crate::consts::TAG_SYMBOL, cell)
    }
}
