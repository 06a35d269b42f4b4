//! Property access path
//!
//! `get_value`/`set_value`/`delete` with the fast-array short-circuit, the
//! lookup-cache consultation, base coercion and lexical-environment binding
//! resolution. Proxy traps and accessors re-enter the call protocol; the
//! cache memoizes plain data properties only.

use std::rc::Rc;

use crate::error::Thrown;
use crate::heap::{
    EnvKind, Heap, ObjectKind, PropertyFlags, PropertyKey, PropertyValue, ThisBinding,
};
use crate::host::Host;
use crate::interpreter::alu::PreferredType;
use crate::interpreter::Interpreter;
use crate::value::{HeapRef, Value};

/// Direct-mapped memoization of `(object identity, property name) →
/// property slot`. A heap-global generation counter stands in for shape
/// tracking: any shape-changing mutation invalidates every entry.
#[cfg(feature = "lookup-cache")]
#[derive(Debug)]
pub(crate) struct LookupCache {
    rows: Vec<Option<CacheEntry>>,
}

#[cfg(feature = "lookup-cache")]
#[derive(Debug)]
struct CacheEntry {
    object: u32,
    key: PropertyKey,
    slot: u32,
    generation: u64,
}

#[cfg(feature = "lookup-cache")]
impl LookupCache {
    pub(crate) fn new() -> Self {
        let mut rows = Vec::new();
        rows.resize_with(crate::consts::LOOKUP_CACHE_SIZE, || None);
        LookupCache { rows }
    }

    fn row(object: HeapRef, key: &PropertyKey) -> usize {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        object.index().hash(&mut hasher);
        key.hash(&mut hasher);
        hasher.finish() as usize % crate::consts::LOOKUP_CACHE_SIZE
    }

    fn lookup(&self, generation: u64, object: HeapRef, key: &PropertyKey) -> Option<usize> {
        let entry = self.rows[Self::row(object, key)].as_ref()?;
        (entry.generation == generation && entry.object == object.index() && entry.key == *key)
            .then(|| entry.slot as usize)
    }

    fn insert(&mut self, generation: u64, object: HeapRef, key: PropertyKey, slot: usize) {
        let row = Self::row(object, &key);
        self.rows[row] = Some(CacheEntry {
            object: object.index(),
            key,
            slot: slot as u32,
            generation,
        });
    }
}

/// Where an identifier resolved inside the environment chain.
pub(crate) enum BindingLocation {
    /// Declarative binding: environment and property slot.
    Declarative(HeapRef, usize),
    /// Property of an object-bound environment's binding object.
    Object(HeapRef),
}

impl<H: Host> Interpreter<H> {
    /* PROPERTY NAME COERCION */

    /// Coerce a value to a property key. Does not consume the operand.
    pub(crate) fn to_property_key(&mut self, property: Value) -> Result<PropertyKey, Thrown> {
        if property.is_integer() {
            let index = property.as_integer();
            if index >= 0 {
                return Ok(PropertyKey::Index(index as u32));
            }
            return Ok(PropertyKey::Name(Rc::from(index.to_string())));
        }
        if property.is_string() {
            return Ok(name_or_index(&self.heap.string_of(property)));
        }
        if property.is_symbol() {
            return Ok(PropertyKey::Symbol(property.heap_ref()));
        }
        if property.is_object() {
            let primitive = self.to_primitive(property, PreferredType::String)?;
            let key = self.to_property_key(primitive);
            self.heap.free_value(primitive);
            return key;
        }
        let rendered = self.render_value(property);
        Ok(name_or_index(&rendered))
    }

    /* READ PATH */

    /// Get the value of `base[property]`. Operands stay owned by the
    /// caller.
    pub(crate) fn get_value(&mut self, base: Value, property: Value) -> Result<Value, Thrown> {
        if base.is_object() {
            let object = base.heap_ref();

            // Dense arrays short-circuit everything for covered indices.
            if property.is_integer() && property.as_integer() >= 0 {
                let index = property.as_integer() as u32;
                if let Some(element) = self.heap.object(object).fast_array_element(index) {
                    if !element.is_array_hole() {
                        return Ok(self.heap.fast_copy_value(element));
                    }
                }
            }

            let key = self.to_property_key(property)?;

            #[cfg(feature = "lookup-cache")]
            if let Some(slot) =
                self.lookup_cache
                    .lookup(self.heap.shape_generation, object, &key)
            {
                if let PropertyValue::Data(value) = self.heap.object(object).property(slot).value {
                    return Ok(self.heap.fast_copy_value(value));
                }
            }

            return self.object_get(object, &key, base);
        }

        if base.is_null_or_undefined() {
            return Err(self.raise_base_access_error("read", property, base));
        }

        let key = self.to_property_key(property)?;
        Ok(self.primitive_get(base, &key))
    }

    /// Prototype-walking `[[Get]]` with an explicit receiver.
    pub(crate) fn object_get(
        &mut self,
        object: HeapRef,
        key: &PropertyKey,
        receiver: Value,
    ) -> Result<Value, Thrown> {
        let mut current = object;

        loop {
            match &self.heap.object(current).kind {
                ObjectKind::Proxy { target, handler } => {
                    let (target, handler) = (*target, *handler);
                    return self.proxy_get(target, handler, key, receiver);
                }
                ObjectKind::Array { elements } => {
                    if let PropertyKey::Index(index) = key {
                        if let Some(element) = elements.get(*index as usize) {
                            if !element.is_array_hole() {
                                let element = *element;
                                return Ok(self.heap.fast_copy_value(element));
                            }
                        }
                    } else if is_length_key(key) {
                        let length = elements.len() as u32;
                        return Ok(self.heap.uint32_value(length));
                    }
                }
                _ => {}
            }

            if let Some(slot) = self.heap.object(current).find_property(key) {
                match self.heap.object(current).property(slot).value {
                    PropertyValue::Data(value) => {
                        #[cfg(feature = "lookup-cache")]
                        if current == object {
                            self.lookup_cache.insert(
                                self.heap.shape_generation,
                                object,
                                key.clone(),
                                slot,
                            );
                        }
                        return Ok(self.heap.fast_copy_value(value));
                    }
                    PropertyValue::Accessor { getter, .. } => {
                        if getter.is_undefined() {
                            return Ok(Value::UNDEFINED);
                        }
                        let this = self.heap.copy_value(receiver);
                        return self.function_call(getter, this, &[]);
                    }
                }
            }

            match self.heap.object(current).prototype {
                Some(prototype) => current = prototype,
                None => return Ok(Value::UNDEFINED),
            }
        }
    }

    fn proxy_get(
        &mut self,
        target: Value,
        handler: Value,
        key: &PropertyKey,
        receiver: Value,
    ) -> Result<Value, Thrown> {
        let trap = self.trap_function(handler, "get")?;
        if trap.is_undefined() {
            return self.object_get(target.heap_ref(), key, receiver);
        }
        let target_arg = self.heap.copy_value(target);
        let key_value = self.key_to_value(key);
        let receiver_arg = self.heap.copy_value(receiver);
        let result = self.function_call(trap, Value::UNDEFINED, &[target_arg, key_value, receiver_arg]);
        self.heap.free_value(trap);
        result
    }

    fn primitive_get(&mut self, base: Value, key: &PropertyKey) -> Value {
        if base.is_string() {
            let content = self.heap.string_of(base);
            if is_length_key(key) {
                return self.uint_value_of(content.chars().count() as u32);
            }
            if let PropertyKey::Index(index) = key {
                if let Some(ch) = content.chars().nth(*index as usize) {
                    return self.heap.string_value(&ch.to_string());
                }
            }
        }
        Value::UNDEFINED
    }

    fn uint_value_of(&mut self, value: u32) -> Value {
        self.heap.uint32_value(value)
    }

    /* WRITE PATH */

    /// Set `base[property] = value`. Consumes `base` and `property`;
    /// `value` stays owned by the caller.
    pub(crate) fn set_value(
        &mut self,
        base: Value,
        property: Value,
        value: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        let outcome = self.set_value_inner(base, property, value, strict);
        self.heap.free_value(base);
        self.heap.free_value(property);
        outcome
    }

    fn set_value_inner(
        &mut self,
        base: Value,
        property: Value,
        value: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        if base.is_null_or_undefined() {
            return Err(self.raise_base_access_error("set", property, base));
        }

        if !base.is_object() {
            // Primitive bases write onto a transient wrapper: the write is
            // observable only as a strict-mode failure.
            if strict {
                let key = self.to_property_key(property)?;
                let message = format!("Cannot create property '{}' on primitive", key.describe());
                return Err(self.raise_type_error(&message));
            }
            return Ok(());
        }

        let object = base.heap_ref();
        let key = self.to_property_key(property)?;

        if self.heap.object(object).is_environment() {
            let PropertyKey::Name(name) = &key else {
                unreachable!("environment binding with a non-name key");
            };
            let name = name.clone();
            return self.set_mutable_binding(object, &name, value, strict);
        }

        self.object_put(object, &key, value, base, strict)
    }

    /// Prototype-honoring `[[Set]]` with an explicit receiver. Stores a
    /// copy of `value`.
    pub(crate) fn object_put(
        &mut self,
        object: HeapRef,
        key: &PropertyKey,
        value: Value,
        receiver: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        if let ObjectKind::Proxy { target, handler } = self.heap.object(object).kind {
            return self.proxy_set(target, handler, key, value, receiver, strict);
        }

        if let ObjectKind::Array { .. } = self.heap.object(object).kind {
            match key {
                PropertyKey::Index(index) => {
                    let copied = self.heap.fast_copy_value(value);
                    self.fast_array_set(object, *index, copied);
                    return Ok(());
                }
                _ if is_length_key(key) => {
                    return self.array_set_length(object, value, strict);
                }
                _ => {}
            }
        }

        // Own property wins before the chain is consulted.
        if let Some(slot) = self.heap.object(object).find_property(key) {
            return self.write_found_property(object, slot, value, receiver, strict, key);
        }

        let mut current = self.heap.object(object).prototype;
        while let Some(holder) = current {
            if let ObjectKind::Proxy { target, handler } = self.heap.object(holder).kind {
                return self.proxy_set(target, handler, key, value, receiver, strict);
            }
            if let Some(slot) = self.heap.object(holder).find_property(key) {
                let property = self.heap.object(holder).property(slot);
                match property.value {
                    PropertyValue::Accessor { .. } => {
                        return self.write_found_property(holder, slot, value, receiver, strict, key);
                    }
                    PropertyValue::Data(_) => {
                        if !property.flags.contains(PropertyFlags::WRITABLE) {
                            return self.reject_write(strict, key);
                        }
                        break;
                    }
                }
            }
            current = self.heap.object(holder).prototype;
        }

        if !self.heap.object(object).extensible {
            return self.reject_write(strict, key);
        }

        let copied = self.heap.fast_copy_value(value);
        self.heap.define_data_property(
            object,
            key.clone(),
            PropertyFlags::configurable_enumerable_writable(),
            copied,
        );
        Ok(())
    }

    fn write_found_property(
        &mut self,
        holder: HeapRef,
        slot: usize,
        value: Value,
        receiver: Value,
        strict: bool,
        key: &PropertyKey,
    ) -> Result<(), Thrown> {
        let property = self.heap.object(holder).property(slot);
        match property.value {
            PropertyValue::Data(_) => {
                if !property.flags.contains(PropertyFlags::WRITABLE) {
                    return self.reject_write(strict, key);
                }
                let copied = self.heap.fast_copy_value(value);
                self.heap.assign_data_property(holder, slot, copied);
                Ok(())
            }
            PropertyValue::Accessor { setter, .. } => {
                if setter.is_undefined() {
                    return self.reject_write(strict, key);
                }
                let this = self.heap.copy_value(receiver);
                let argument = self.heap.fast_copy_value(value);
                let result = self.function_call(setter, this, &[argument])?;
                self.heap.free_value(result);
                Ok(())
            }
        }
    }

    fn proxy_set(
        &mut self,
        target: Value,
        handler: Value,
        key: &PropertyKey,
        value: Value,
        receiver: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        let trap = self.trap_function(handler, "set")?;
        if trap.is_undefined() {
            return self.object_put(target.heap_ref(), key, value, receiver, strict);
        }
        let target_arg = self.heap.copy_value(target);
        let key_value = self.key_to_value(key);
        let value_arg = self.heap.fast_copy_value(value);
        let receiver_arg = self.heap.copy_value(receiver);
        let result = self.function_call(
            trap,
            Value::UNDEFINED,
            &[target_arg, key_value, value_arg, receiver_arg],
        );
        self.heap.free_value(trap);
        let verdict = result?;
        let accepted = self.heap.to_boolean(verdict);
        self.heap.free_value(verdict);
        if !accepted && strict {
            return Err(self.raise_type_error("Proxy set trap returned falsish"));
        }
        Ok(())
    }

    fn reject_write(&mut self, strict: bool, key: &PropertyKey) -> Result<(), Thrown> {
        if strict {
            let message = format!("Cannot assign to read only property '{}'", key.describe());
            return Err(self.raise_type_error(&message));
        }
        Ok(())
    }

    /// Dense element write, extending with holes past the current length.
    pub(crate) fn fast_array_set(&mut self, array: HeapRef, index: u32, value: Value) {
        let ObjectKind::Array { elements } = &mut self.heap.object_mut(array).kind else {
            unreachable!("fast array write to non-array");
        };
        let index = index as usize;
        if index < elements.len() {
            let old = core::mem::replace(&mut elements[index], value);
            self.heap.free_value(old);
        } else {
            while elements.len() < index {
                elements.push(Value::ARRAY_HOLE);
            }
            elements.push(value);
        }
    }

    fn array_set_length(&mut self, array: HeapRef, value: Value, strict: bool) -> Result<(), Thrown> {
        let length = self.to_number_value(value)?;
        let truncated = length as u32;
        if truncated as f64 != length {
            return Err(self.raise_range_error("Invalid array length"));
        }
        let mut dropped = Vec::new();
        let ObjectKind::Array { elements } = &mut self.heap.object_mut(array).kind else {
            unreachable!("length write to non-array");
        };
        let target = truncated as usize;
        if target < elements.len() {
            dropped.extend(elements.drain(target..));
        } else {
            elements.resize(target, Value::ARRAY_HOLE);
        }
        for value in dropped {
            self.heap.free_value(value);
        }
        let _ = strict;
        Ok(())
    }

    /* DELETE PATH */

    /// `delete base[property]`. Operands stay owned by the caller;
    /// returns a boolean value.
    pub(crate) fn delete_prop(
        &mut self,
        base: Value,
        property: Value,
        strict: bool,
    ) -> Result<Value, Thrown> {
        if base.is_null_or_undefined() {
            return Err(self.raise_base_access_error("delete", property, base));
        }
        if !base.is_object() {
            return Ok(Value::TRUE);
        }

        let object = base.heap_ref();
        let key = self.to_property_key(property)?;

        if let ObjectKind::Proxy { target, handler } = self.heap.object(object).kind {
            return self.proxy_delete(target, handler, &key, strict);
        }

        if let ObjectKind::Array { elements } = &mut self.heap.object_mut(object).kind {
            if let PropertyKey::Index(index) = key {
                if let Some(slot) = elements.get_mut(index as usize) {
                    let old = core::mem::replace(slot, Value::ARRAY_HOLE);
                    self.heap.free_value(old);
                }
                return Ok(Value::TRUE);
            }
        }

        match self.heap.object(object).find_property(&key) {
            None => Ok(Value::TRUE),
            Some(slot) => {
                if self
                    .heap
                    .object(object)
                    .property(slot)
                    .flags
                    .contains(PropertyFlags::CONFIGURABLE)
                {
                    self.heap.delete_own_property(object, slot);
                    Ok(Value::TRUE)
                } else if strict {
                    let message =
                        format!("Cannot delete property '{}' of object", key.describe());
                    Err(self.raise_type_error(&message))
                } else {
                    Ok(Value::FALSE)
                }
            }
        }
    }

    fn proxy_delete(
        &mut self,
        target: Value,
        handler: Value,
        key: &PropertyKey,
        strict: bool,
    ) -> Result<Value, Thrown> {
        let trap = self.trap_function(handler, "deleteProperty")?;
        if trap.is_undefined() {
            let target_ref = target;
            let key_value = self.key_to_value(key);
            let result = self.delete_prop(target_ref, key_value, strict);
            self.heap.free_value(key_value);
            return result;
        }
        let target_arg = self.heap.copy_value(target);
        let key_value = self.key_to_value(key);
        let result = self.function_call(trap, Value::UNDEFINED, &[target_arg, key_value]);
        self.heap.free_value(trap);
        let verdict = result?;
        let accepted = self.heap.to_boolean(verdict);
        self.heap.free_value(verdict);
        Ok(Value::boolean(accepted))
    }

    /* HAS PATH */

    /// Prototype-walking `[[Has]]`.
    pub(crate) fn object_has(&mut self, object: HeapRef, key: &PropertyKey) -> Result<bool, Thrown> {
        let mut current = object;
        loop {
            match &self.heap.object(current).kind {
                ObjectKind::Proxy { target, handler } => {
                    let (target, handler) = (*target, *handler);
                    let trap = self.trap_function(handler, "has")?;
                    if trap.is_undefined() {
                        return self.object_has(target.heap_ref(), key);
                    }
                    let target_arg = self.heap.copy_value(target);
                    let key_value = self.key_to_value(key);
                    let result = self.function_call(trap, Value::UNDEFINED, &[target_arg, key_value]);
                    self.heap.free_value(trap);
                    let verdict = result?;
                    let answer = self.heap.to_boolean(verdict);
                    self.heap.free_value(verdict);
                    return Ok(answer);
                }
                ObjectKind::Array { elements } => {
                    if let PropertyKey::Index(index) = key {
                        if matches!(elements.get(*index as usize), Some(v) if !v.is_array_hole()) {
                            return Ok(true);
                        }
                    } else if is_length_key(key) {
                        return Ok(true);
                    }
                }
                _ => {}
            }
            if self.heap.object(current).find_property(key).is_some() {
                return Ok(true);
            }
            match self.heap.object(current).prototype {
                Some(prototype) => current = prototype,
                None => return Ok(false),
            }
        }
    }

    /* SHARED HELPERS */

    fn trap_function(&mut self, handler: Value, name: &str) -> Result<Value, Thrown> {
        if !handler.is_object() {
            return Err(self.raise_type_error("Proxy handler is not an object"));
        }
        let key = PropertyKey::Name(Rc::from(name));
        let trap = self.object_get(handler.heap_ref(), &key, handler)?;
        if trap.is_undefined() || self.heap.is_callable(trap) {
            Ok(trap)
        } else {
            self.heap.free_value(trap);
            Err(self.raise_type_error("Proxy trap is not callable"))
        }
    }

    /// Owned value form of a property key for trap arguments.
    pub(crate) fn key_to_value(&mut self, key: &PropertyKey) -> Value {
        match key {
            PropertyKey::Index(index) => self.heap.uint32_value(*index),
            PropertyKey::Name(name) => self.heap.str_value(name.clone()),
            PropertyKey::Symbol(symbol) => {
                self.heap.bump(*symbol);
                Value::symbol(*symbol)
            }
        }
    }

    fn raise_base_access_error(&mut self, action: &str, property: Value, base: Value) -> Thrown {
        #[cfg(feature = "error-messages")]
        let message = {
            let property = self.render_value(property);
            let base = self.render_value(base);
            format!("Cannot {action} property '{property}' of {base}")
        };
        #[cfg(not(feature = "error-messages"))]
        let message = {
            let _ = (action, property, base);
            String::new()
        };
        self.raise_type_error(&message)
    }

    /* LEXICAL ENVIRONMENT RESOLUTION */

    /// Find the environment holding `name`, walking the outer chain.
    pub(crate) fn resolve_binding(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
    ) -> Result<Option<BindingLocation>, Thrown> {
        let key = PropertyKey::Name(name.clone());
        let mut current = Some(env);

        while let Some(env) = current {
            let binding_object = match self.heap.object(env).environment().kind {
                EnvKind::Declarative => None,
                EnvKind::ObjectBound { object, .. } => Some(object),
            };
            match binding_object {
                None => {
                    if let Some(slot) = self.heap.object(env).find_property(&key) {
                        return Ok(Some(BindingLocation::Declarative(env, slot)));
                    }
                }
                Some(object) => {
                    if self.object_has(object, &key)? {
                        return Ok(Some(BindingLocation::Object(object)));
                    }
                }
            }
            current = self.heap.object(env).environment().outer;
        }

        Ok(None)
    }

    /// Read an identifier through the environment chain; the TDZ sentinel
    /// is never returned to the caller.
    pub(crate) fn resolve_reference_value(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
    ) -> Result<Value, Thrown> {
        match self.resolve_binding(env, name)? {
            Some(BindingLocation::Declarative(env, slot)) => {
                let PropertyValue::Data(value) = self.heap.object(env).property(slot).value else {
                    unreachable!("accessor binding in declarative environment");
                };
                if value == Value::UNINITIALIZED {
                    let message = format!("Variable '{name}' used before initialization");
                    return Err(self.raise_reference_error(&message));
                }
                Ok(self.heap.fast_copy_value(value))
            }
            Some(BindingLocation::Object(object)) => {
                let key = PropertyKey::Name(name.clone());
                self.object_get(object, &key, Value::object(object))
            }
            None => {
                let message = format!("{name} is not defined");
                Err(self.raise_reference_error(&message))
            }
        }
    }

    /// Like [`resolve_reference_value`](Self::resolve_reference_value),
    /// but also hands back the base environment/object and reports an
    /// unresolved name as `None` instead of raising.
    pub(crate) fn resolve_reference_base(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
    ) -> Result<Option<(HeapRef, Value)>, Thrown> {
        match self.resolve_binding(env, name)? {
            Some(BindingLocation::Declarative(env, slot)) => {
                let PropertyValue::Data(value) = self.heap.object(env).property(slot).value else {
                    unreachable!("accessor binding in declarative environment");
                };
                if value == Value::UNINITIALIZED {
                    let message = format!("Variable '{name}' used before initialization");
                    return Err(self.raise_reference_error(&message));
                }
                let value = self.heap.fast_copy_value(value);
                Ok(Some((env, value)))
            }
            Some(BindingLocation::Object(object)) => {
                let key = PropertyKey::Name(name.clone());
                let value = self.object_get(object, &key, Value::object(object))?;
                // The base is the holding environment's binding object.
                let env = self.environment_of_object(env, object, name)?;
                Ok(Some((env, value)))
            }
            None => Ok(None),
        }
    }

    /// Environment whose binding object is `object`; used to rebuild the
    /// reference base for `IdentReference`.
    fn environment_of_object(
        &mut self,
        env: HeapRef,
        object: HeapRef,
        _name: &Rc<str>,
    ) -> Result<HeapRef, Thrown> {
        let mut current = Some(env);
        while let Some(env) = current {
            if let EnvKind::ObjectBound { object: bound, .. } =
                self.heap.object(env).environment().kind
            {
                if bound == object {
                    return Ok(env);
                }
            }
            current = self.heap.object(env).environment().outer;
        }
        unreachable!("binding object without its environment");
    }

    /// Write an identifier through the environment chain. Stores a copy of
    /// `value`.
    pub(crate) fn put_value_lex_env(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
        value: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        match self.resolve_binding(env, name)? {
            Some(BindingLocation::Declarative(env, slot)) => {
                self.write_declarative_binding(env, slot, name, value)
            }
            Some(BindingLocation::Object(object)) => {
                let key = PropertyKey::Name(name.clone());
                self.object_put(object, &key, value, Value::object(object), strict)
            }
            None if strict => {
                let message = format!("{name} is not defined");
                Err(self.raise_reference_error(&message))
            }
            None => {
                // Sloppy-mode fallthrough creates an implicit global.
                let copied = self.heap.fast_copy_value(value);
                self.heap.define_data_property(
                    self.global_object(),
                    PropertyKey::Name(name.clone()),
                    PropertyFlags::configurable_enumerable_writable(),
                    copied,
                );
                Ok(())
            }
        }
    }

    fn write_declarative_binding(
        &mut self,
        env: HeapRef,
        slot: usize,
        name: &Rc<str>,
        value: Value,
    ) -> Result<(), Thrown> {
        let property = self.heap.object(env).property(slot);
        let PropertyValue::Data(current) = property.value else {
            unreachable!("accessor binding in declarative environment");
        };
        if !property.flags.contains(PropertyFlags::WRITABLE) {
            if current == Value::UNINITIALIZED {
                let message = format!("Variable '{name}' used before initialization");
                return Err(self.raise_reference_error(&message));
            }
            return Err(self.raise_type_error("Constant bindings cannot be reassigned"));
        }
        let copied = self.heap.fast_copy_value(value);
        self.heap.assign_data_property(env, slot, copied);
        Ok(())
    }

    /// `SetMutableBinding` on a specific environment; used when the base
    /// of a reference is a lexical environment.
    pub(crate) fn set_mutable_binding(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
        value: Value,
        strict: bool,
    ) -> Result<(), Thrown> {
        self.put_value_lex_env(env, name, value, strict)
    }

    /// Hoisting declaration: create the binding if absent. Eval code
    /// declares configurable bindings.
    pub(crate) fn var_decl(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
        is_eval_code: bool,
    ) -> Result<(), Thrown> {
        let key = PropertyKey::Name(name.clone());
        let binding_object = match self.heap.object(env).environment().kind {
            EnvKind::Declarative => None,
            EnvKind::ObjectBound { object, .. } => Some(object),
        };
        match binding_object {
            None => {
                if self.heap.object(env).find_property(&key).is_none() {
                    let flags = if is_eval_code {
                        PropertyFlags::configurable_writable()
                    } else {
                        PropertyFlags::WRITABLE
                    };
                    self.heap
                        .define_data_property(env, key, flags, Value::UNDEFINED);
                }
                Ok(())
            }
            Some(object) => {
                if !self.object_has(object, &key)? {
                    let flags = if is_eval_code {
                        PropertyFlags::configurable_enumerable_writable()
                    } else {
                        PropertyFlags::enumerable_writable()
                    };
                    self.heap
                        .define_data_property(object, key, flags, Value::UNDEFINED);
                }
                Ok(())
            }
        }
    }

    /// Store a hoisted function value into its binding. Takes ownership of
    /// `value`.
    pub(crate) fn set_var(
        &mut self,
        env: HeapRef,
        name: &Rc<str>,
        strict: bool,
        value: Value,
    ) -> Result<(), Thrown> {
        let outcome = self.put_value_lex_env(env, name, value, strict);
        self.heap.free_value(value);
        outcome
    }

    /// `delete` on an identifier: `false` for register and declarative
    /// bindings, object-bound bindings honor configurability.
    pub(crate) fn delete_var(&mut self, env: HeapRef, name: &Rc<str>) -> Result<Value, Thrown> {
        match self.resolve_binding(env, name)? {
            None => Ok(Value::TRUE),
            Some(BindingLocation::Declarative(..)) => Ok(Value::FALSE),
            Some(BindingLocation::Object(object)) => {
                let key_value = self.key_name_value(name);
                let result = self.delete_prop(Value::object(object), key_value, false);
                self.heap.free_value(key_value);
                result
            }
        }
    }

    fn key_name_value(&mut self, name: &Rc<str>) -> Value {
        self.heap.str_value(name.clone())
    }

    /// Implicit this of an environment: the binding object of a
    /// this-providing object-bound environment, `undefined` otherwise.
    pub(crate) fn implicit_this_value(&mut self, env: HeapRef) -> Value {
        let data = self.heap.object(env).environment();
        match &data.kind {
            EnvKind::ObjectBound {
                object,
                provide_this: true,
            } => {
                let object = *object;
                self.heap.bump(object);
                Value::object(object)
            }
            _ => Value::UNDEFINED,
        }
    }

    /// `this` binding of the nearest environment carrying a slot.
    pub(crate) fn get_this_binding(&mut self, env: HeapRef) -> Result<Value, Thrown> {
        let mut current = Some(env);
        while let Some(env) = current {
            match self.heap.object(env).environment().this_binding {
                ThisBinding::Bound(value) => return Ok(self.heap.copy_value(value)),
                ThisBinding::Uninitialized => {
                    return Err(self.raise_reference_error(
                        "Must call super constructor before accessing 'this'",
                    ));
                }
                ThisBinding::Absent => current = self.heap.object(env).environment().outer,
            }
        }
        Ok(Value::UNDEFINED)
    }
}

/// Canonical numeric strings become index keys.
fn name_or_index(name: &str) -> PropertyKey {
    if let Ok(index) = name.parse::<u32>() {
        if index.to_string() == name {
            return PropertyKey::Index(index);
        }
    }
    PropertyKey::Name(Rc::from(name))
}

fn is_length_key(key: &PropertyKey) -> bool {
    matches!(key, PropertyKey::Name(name) if &**name == "length")
}

/// Teach the heap about key-based own lookups used by the cache tests.
impl Heap {
    /// Slot of an own property by key.
    pub(crate) fn find_own_property(&self, object: HeapRef, key: &PropertyKey) -> Option<usize> {
        self.object(object).find_property(key)
    }
}
