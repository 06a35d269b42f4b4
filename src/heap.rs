//! Value heap
//!
//! Reference-counted arena backing every heap value: boxed doubles,
//! strings, symbols, objects and the interpreter-internal collections.
//! Cells are addressed by index, so closure/environment cycles keep their
//! cells alive until the whole arena drops with the interpreter; the
//! reference counts reclaim acyclic garbage eagerly.

use std::rc::Rc;

use crate::consts::*;
use crate::error::ExceptionKind;
use crate::value::{HeapRef, Value};

pub mod object;

pub use object::{
    EnvKind, EnvironmentData, ExecutableData, FunctionData, FunctionKind, ObjectData, ObjectKind,
    Property, PropertyFlags, PropertyKey, PropertyValue, ThisBinding,
};

use object::PropertyEntry;

/// Payload of one heap cell.
#[derive(Debug)]
pub enum CellData {
    /// Boxed double.
    Number(f64),
    /// Immutable string.
    String(Rc<str>),
    /// Symbol with an optional description.
    Symbol(Option<Rc<str>>),
    /// Object of any kind, environments included.
    Object(ObjectData),
    /// Internal value collection (for-in name lists, spread arguments).
    Collection(Vec<Value>),
}

#[derive(Debug)]
enum Slot {
    Free,
    Used { refs: u32, data: CellData },
}

/// The reference-counted cell arena.
#[derive(Debug, Default)]
pub struct Heap {
    cells: Vec<Slot>,
    free_list: Vec<u32>,
    /// Bumped on every shape-changing property mutation; the lookup cache
    /// compares generations instead of tracking objects individually.
    #[cfg(feature = "lookup-cache")]
    pub(crate) shape_generation: u64,
}

impl Heap {
    /// Fresh empty heap.
    pub fn new() -> Self {
        Heap::default()
    }

    pub(crate) fn alloc(&mut self, data: CellData) -> HeapRef {
        if let Some(index) = self.free_list.pop() {
            self.cells[index as usize] = Slot::Used { refs: 1, data };
            HeapRef(index)
        } else {
            self.cells.push(Slot::Used { refs: 1, data });
            HeapRef((self.cells.len() - 1) as u32)
        }
    }

    fn cell(&self, cell: HeapRef) -> &CellData {
        match &self.cells[cell.0 as usize] {
            Slot::Used { data, .. } => data,
            Slot::Free => unreachable!("access to released heap cell #{}", cell.0),
        }
    }

    fn cell_mut(&mut self, cell: HeapRef) -> &mut CellData {
        match &mut self.cells[cell.0 as usize] {
            Slot::Used { data, .. } => data,
            Slot::Free => unreachable!("access to released heap cell #{}", cell.0),
        }
    }

    pub(crate) fn bump(&mut self, cell: HeapRef) {
        match &mut self.cells[cell.0 as usize] {
            Slot::Used { refs, .. } => *refs += 1,
            Slot::Free => unreachable!("reference to released heap cell #{}", cell.0),
        }
    }

    /* VALUE OWNERSHIP */

    /// Add a reference if the value is heap-backed; no-op otherwise.
    pub fn copy_value(&mut self, value: Value) -> Value {
        if value.is_heap_backed() {
            self.bump(value.heap_ref());
        }
        value
    }

    /// [`copy_value`](Self::copy_value) for values known not to be the
    /// error or empty sentinel.
    pub fn fast_copy_value(&mut self, value: Value) -> Value {
        debug_assert!(!value.is_error());
        self.copy_value(value)
    }

    /// Drop one reference; releases the cell and everything it owns when
    /// the count reaches zero.
    pub fn free_value(&mut self, value: Value) {
        if !value.is_heap_backed() {
            return;
        }

        let mut pending = vec![value];
        while let Some(value) = pending.pop() {
            if !value.is_heap_backed() {
                continue;
            }
            let index = value.heap_ref().0 as usize;
            let Slot::Used { refs, .. } = &mut self.cells[index] else {
                unreachable!("double release of heap cell #{index}");
            };
            *refs -= 1;
            if *refs > 0 {
                continue;
            }

            let slot = core::mem::replace(&mut self.cells[index], Slot::Free);
            self.free_list.push(index as u32);
            let Slot::Used { data, .. } = slot else {
                unreachable!()
            };
            match data {
                CellData::Number(_) | CellData::String(_) | CellData::Symbol(_) => {}
                CellData::Object(object) => object.collect_owned(&mut pending),
                CellData::Collection(values) => pending.extend(values),
            }
        }
    }

    /// [`free_value`](Self::free_value) for values known not to be the
    /// error or empty sentinel.
    pub fn fast_free_value(&mut self, value: Value) {
        debug_assert!(!value.is_error());
        self.free_value(value);
    }

    /* CONSTRUCTORS */

    /// Box a double, preferring the tagged integer representation.
    pub fn number_value(&mut self, number: f64) -> Value {
        let truncated = number as i32;
        if truncated as f64 == number
            && (INTEGER_NUMBER_MIN..=INTEGER_NUMBER_MAX).contains(&truncated)
            && !(number == 0.0 && number.is_sign_negative())
        {
            Value::from_integer(truncated)
        } else {
            Value::heap(TAG_FLOAT, self.alloc(CellData::Number(number)))
        }
    }

    /// Integer value, boxed only outside the unboxed range.
    pub fn int32_value(&mut self, value: i32) -> Value {
        if (INTEGER_NUMBER_MIN..=INTEGER_NUMBER_MAX).contains(&value) {
            Value::from_integer(value)
        } else {
            Value::heap(TAG_FLOAT, self.alloc(CellData::Number(value as f64)))
        }
    }

    /// Unsigned variant of [`int32_value`](Self::int32_value).
    pub fn uint32_value(&mut self, value: u32) -> Value {
        if value <= INTEGER_NUMBER_MAX as u32 {
            Value::from_integer(value as i32)
        } else {
            Value::heap(TAG_FLOAT, self.alloc(CellData::Number(value as f64)))
        }
    }

    /// Fresh string value.
    pub fn string_value(&mut self, content: &str) -> Value {
        self.str_value(Rc::from(content))
    }

    /// String value sharing an interned buffer.
    pub fn str_value(&mut self, content: Rc<str>) -> Value {
        Value::heap(TAG_STRING, self.alloc(CellData::String(content)))
    }

    pub(crate) fn symbol_value(&mut self, description: Option<Rc<str>>) -> Value {
        Value::heap(TAG_SYMBOL, self.alloc(CellData::Symbol(description)))
    }

    pub(crate) fn collection_value(&mut self, values: Vec<Value>) -> Value {
        Value::heap(TAG_COLLECTION, self.alloc(CellData::Collection(values)))
    }

    pub(crate) fn new_object(&mut self) -> HeapRef {
        self.alloc(CellData::Object(ObjectData::new(ObjectKind::Ordinary)))
    }

    pub(crate) fn new_fast_array(&mut self, elements: Vec<Value>) -> HeapRef {
        self.alloc(CellData::Object(ObjectData::new(ObjectKind::Array {
            elements,
        })))
    }

    pub(crate) fn new_function(
        &mut self,
        kind: FunctionKind,
        code: Option<Rc<crate::code::CompiledCode>>,
        scope: Option<HeapRef>,
    ) -> HeapRef {
        if let Some(scope) = scope {
            self.bump(scope);
        }
        self.alloc(CellData::Object(ObjectData::new(ObjectKind::Function(
            FunctionData { kind, code, scope },
        ))))
    }

    /// Fresh declarative environment chained to `outer`.
    pub(crate) fn new_decl_env(&mut self, outer: Option<HeapRef>) -> HeapRef {
        if let Some(outer) = outer {
            self.bump(outer);
        }
        self.alloc(CellData::Object(ObjectData::new(ObjectKind::Environment(
            EnvironmentData {
                kind: EnvKind::Declarative,
                outer,
                is_block: false,
                this_binding: ThisBinding::Absent,
            },
        ))))
    }

    /// Fresh object-bound environment chained to `outer`.
    pub(crate) fn new_object_env(
        &mut self,
        outer: Option<HeapRef>,
        object: HeapRef,
        provide_this: bool,
    ) -> HeapRef {
        if let Some(outer) = outer {
            self.bump(outer);
        }
        self.bump(object);
        self.alloc(CellData::Object(ObjectData::new(ObjectKind::Environment(
            EnvironmentData {
                kind: EnvKind::ObjectBound {
                    object,
                    provide_this,
                },
                outer,
                is_block: false,
                this_binding: ThisBinding::Absent,
            },
        ))))
    }

    /// Error object with a message property.
    pub(crate) fn new_error(&mut self, kind: ExceptionKind, message: &str) -> Value {
        let message_value = self.string_value(message);
        let error = self.alloc(CellData::Object(ObjectData::new(ObjectKind::Error(kind))));
        self.define_data_property(
            error,
            PropertyKey::Name(Rc::from("message")),
            PropertyFlags::configurable_writable(),
            message_value,
        );
        Value::object(error)
    }

    /* DEREFERENCE */

    pub(crate) fn object(&self, cell: HeapRef) -> &ObjectData {
        match self.cell(cell) {
            CellData::Object(object) => object,
            other => unreachable!("object access to {other:?}"),
        }
    }

    pub(crate) fn object_mut(&mut self, cell: HeapRef) -> &mut ObjectData {
        match self.cell_mut(cell) {
            CellData::Object(object) => object,
            other => unreachable!("object access to {other:?}"),
        }
    }

    /// Numeric payload of an integer or float value.
    pub fn number_of(&self, value: Value) -> f64 {
        debug_assert!(value.is_number());
        if value.is_integer() {
            value.as_integer() as f64
        } else {
            match self.cell(value.heap_ref()) {
                CellData::Number(number) => *number,
                other => unreachable!("number access to {other:?}"),
            }
        }
    }

    /// String payload of a string value.
    pub fn string_of(&self, value: Value) -> Rc<str> {
        debug_assert!(value.is_string());
        match self.cell(value.heap_ref()) {
            CellData::String(content) => content.clone(),
            other => unreachable!("string access to {other:?}"),
        }
    }

    pub(crate) fn collection(&self, value: Value) -> &[Value] {
        debug_assert!(value.is_collection());
        match self.cell(value.heap_ref()) {
            CellData::Collection(values) => values,
            other => unreachable!("collection access to {other:?}"),
        }
    }

    pub(crate) fn collection_mut(&mut self, value: Value) -> &mut Vec<Value> {
        debug_assert!(value.is_collection());
        match self.cell_mut(value.heap_ref()) {
            CellData::Collection(values) => values,
            other => unreachable!("collection access to {other:?}"),
        }
    }

    /// Whether the value is a lexical environment object.
    pub(crate) fn is_environment(&self, value: Value) -> bool {
        value.is_object() && self.object(value.heap_ref()).is_environment()
    }

    /// Whether the value can be invoked as a function.
    pub fn is_callable(&self, value: Value) -> bool {
        value.is_object() && self.object(value.heap_ref()).is_callable()
    }

    /// Whether the value can be invoked as a constructor.
    pub fn is_constructor(&self, value: Value) -> bool {
        value.is_object() && self.object(value.heap_ref()).is_constructor()
    }

    /// Whether the value is a class constructor function, whose
    /// `prototype` property is locked down.
    pub(crate) fn is_class_constructor(&self, value: Value) -> bool {
        if !value.is_object() {
            return false;
        }
        match &self.object(value.heap_ref()).kind {
            ObjectKind::Function(function) => match &function.kind {
                FunctionKind::ImplicitConstructor { .. } => true,
                _ => function.code.as_ref().is_some_and(|code| {
                    code.flags
                        .contains(crate::code::CodeFlags::CLASS_CONSTRUCTOR)
                }),
            },
            _ => false,
        }
    }

    /// Dense element view of a fast array value.
    pub fn array_elements(&self, value: Value) -> Option<&[Value]> {
        if !value.is_object() {
            return None;
        }
        match &self.object(value.heap_ref()).kind {
            ObjectKind::Array { elements } => Some(elements),
            _ => None,
        }
    }

    /// Prototype link of an object value.
    pub fn prototype_of(&self, value: Value) -> Option<HeapRef> {
        value
            .is_object()
            .then(|| self.object(value.heap_ref()).prototype)
            .flatten()
    }

    /* PROPERTY TABLE MUTATION */

    #[inline]
    fn shape_changed(&mut self) {
        #[cfg(feature = "lookup-cache")]
        {
            self.shape_generation += 1;
        }
    }

    /// Create a named data property. The table takes ownership of `value`
    /// and of one reference to a symbol key.
    pub(crate) fn define_data_property(
        &mut self,
        object: HeapRef,
        key: PropertyKey,
        flags: PropertyFlags,
        value: Value,
    ) -> usize {
        if let PropertyKey::Symbol(symbol) = key {
            self.bump(symbol);
        }
        self.shape_changed();
        let properties = &mut self.object_mut(object).properties;
        properties.push(PropertyEntry {
            key,
            property: Property {
                flags,
                value: PropertyValue::Data(value),
            },
        });
        properties.len() - 1
    }

    pub(crate) fn define_accessor_property(
        &mut self,
        object: HeapRef,
        key: PropertyKey,
        flags: PropertyFlags,
        getter: Value,
        setter: Value,
    ) {
        if let PropertyKey::Symbol(symbol) = key {
            self.bump(symbol);
        }
        self.shape_changed();
        let properties = &mut self.object_mut(object).properties;
        properties.push(PropertyEntry {
            key,
            property: Property {
                flags,
                value: PropertyValue::Accessor { getter, setter },
            },
        });
    }

    /// Replace the value of a data property, releasing the old occupant.
    pub(crate) fn assign_data_property(&mut self, object: HeapRef, slot: usize, value: Value) {
        let property = self.object_mut(object).property_mut(slot);
        let PropertyValue::Data(old) = core::mem::replace(&mut property.value, PropertyValue::Data(value))
        else {
            unreachable!("data assignment to accessor property");
        };
        self.free_value(old);
    }

    /// Remove an own property, releasing everything it owned.
    pub(crate) fn delete_own_property(&mut self, object: HeapRef, slot: usize) {
        self.shape_changed();
        let entry = self.object_mut(object).properties.remove(slot);
        if let PropertyKey::Symbol(symbol) = entry.key {
            self.free_value(Value::symbol(symbol));
        }
        match entry.property.value {
            PropertyValue::Data(value) => self.free_value(value),
            PropertyValue::Accessor { getter, setter } => {
                self.free_value(getter);
                self.free_value(setter);
            }
        }
    }

    /// Install a prototype link; takes ownership of one reference.
    pub(crate) fn set_prototype(&mut self, object: HeapRef, prototype: Option<HeapRef>) {
        self.shape_changed();
        let old = core::mem::replace(&mut self.object_mut(object).prototype, prototype);
        if let Some(old) = old {
            self.free_value(Value::object(old));
        }
    }

    /* PREDICATES AND COERCIONS WITHOUT SIDE EFFECTS */

    /// Strict equality; an ABI primitive. NaN compares unequal to itself.
    pub fn strict_equals(&self, left: Value, right: Value) -> bool {
        if left == right {
            // Identical words: heap identity or identical immediates. NaN
            // is always boxed, so an identical word may still be NaN.
            return !(left.is_float() && self.number_of(left).is_nan());
        }
        if left.is_number() && right.is_number() {
            return self.number_of(left) == self.number_of(right);
        }
        if left.is_string() && right.is_string() {
            return self.string_of(left) == self.string_of(right);
        }
        false
    }

    /// Boolean coercion; an ABI primitive.
    pub fn to_boolean(&self, value: Value) -> bool {
        if value.is_integer() {
            return value != Value::ZERO;
        }
        if value.is_float() {
            let number = self.number_of(value);
            return number != 0.0 && !number.is_nan();
        }
        if value.is_string() {
            return !self.string_of(value).is_empty();
        }
        !(value.is_false() || value.is_null_or_undefined())
    }

    /// Numeric coercion of non-object values; `None` when the operand
    /// needs the full `ToPrimitive` machinery.
    pub(crate) fn primitive_to_number(&self, value: Value) -> Option<f64> {
        if value.is_number() {
            return Some(self.number_of(value));
        }
        if value.is_string() {
            let content = self.string_of(value);
            let trimmed = content.trim();
            return Some(if trimmed.is_empty() {
                0.0
            } else if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64)
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            });
        }
        match value {
            Value::TRUE => Some(1.0),
            Value::FALSE | Value::NULL => Some(0.0),
            Value::UNDEFINED => Some(f64::NAN),
            _ => None,
        }
    }

    /// ECMAScript-style decimal rendering of a number.
    pub(crate) fn number_to_string(number: f64) -> String {
        if number.is_nan() {
            "NaN".into()
        } else if number.is_infinite() {
            if number > 0.0 {
                "Infinity".into()
            } else {
                "-Infinity".into()
            }
        } else if number == 0.0 {
            "0".into()
        } else if number as i64 as f64 == number {
            format!("{}", number as i64)
        } else {
            format!("{number}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_balances() {
        let mut heap = Heap::new();
        let s = heap.string_value("balanced");
        let copy = heap.copy_value(s);
        heap.free_value(copy);
        heap.free_value(s);
        assert_eq!(heap.free_list.len(), 1);
    }

    #[test]
    fn object_release_cascades() {
        let mut heap = Heap::new();
        let inner = heap.string_value("payload");
        let object = heap.new_object();
        heap.define_data_property(
            object,
            PropertyKey::Name(Rc::from("field")),
            PropertyFlags::configurable_enumerable_writable(),
            inner,
        );
        heap.free_value(Value::object(object));
        assert_eq!(heap.free_list.len(), 2);
    }

    #[test]
    fn strict_equality_round_trip() {
        let mut heap = Heap::new();
        let a = heap.string_value("x");
        let b = heap.string_value("x");
        assert!(heap.strict_equals(a, b));

        let nan = heap.number_value(f64::NAN);
        assert!(!heap.strict_equals(nan, nan));

        let int = Value::from_integer(3);
        let float = heap.number_value(3.5);
        assert!(!heap.strict_equals(int, float));
        let three = heap.alloc(CellData::Number(3.0));
        assert!(heap.strict_equals(int, Value::heap(TAG_FLOAT, three)));
    }

    #[test]
    fn number_value_prefers_tagged_integers() {
        let mut heap = Heap::new();
        assert_eq!(heap.number_value(7.0), Value::from_integer(7));
        assert!(heap.number_value(1e20).is_float());
        assert!(heap.number_value(-0.0).is_float());
        assert!(heap.number_value(0.5).is_float());
    }
}
