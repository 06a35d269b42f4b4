//! Internal helpers shared by the dispatch loop and the call protocol.

use std::rc::Rc;

use itertools::Itertools;

use crate::code::{CodeFlags, Literal};
use crate::error::Thrown;
use crate::frame::Frame;
use crate::heap::{CellData, FunctionKind, ObjectKind, PropertyFlags, PropertyKey};
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::value::Value;

impl<H: Host> Interpreter<H> {
    /// Materialize a sub-function or regexp literal into a fresh object.
    pub(crate) fn construct_literal_object(
        &mut self,
        frame: &Frame,
        literal: &Literal,
    ) -> Result<Value, Thrown> {
        match literal {
            Literal::Function(code) => {
                let kind = if code.flags.contains(CodeFlags::ARROW) {
                    let this = self.heap.copy_value(frame.this_binding);
                    FunctionKind::Arrow(this)
                } else if code.flags.contains(CodeFlags::GENERATOR) {
                    FunctionKind::Generator
                } else {
                    FunctionKind::Simple
                };
                let function =
                    self.heap
                        .new_function(kind, Some(code.clone()), Some(frame.lex_env));
                Ok(Value::object(function))
            }
            Literal::Regexp(source) => {
                let regexp = self
                    .heap
                    .alloc(CellData::Object(crate::heap::ObjectData::new(
                        ObjectKind::Regexp(source.clone()),
                    )));
                Ok(Value::object(regexp))
            }
            other => unreachable!("object construction from {other:?}"),
        }
    }

    /// Centralized name inference: an anonymous function adopts the name
    /// of the binding or property it is assigned to.
    pub(crate) fn infer_function_name(&mut self, function: Value, name: &Rc<str>) {
        if !self.needs_name_inference(function) {
            return;
        }
        let name_value = self.heap.str_value(name.clone());
        self.heap.define_data_property(
            function.heap_ref(),
            PropertyKey::Name(Rc::from("name")),
            PropertyFlags::CONFIGURABLE,
            name_value,
        );
    }

    /// `ToObject`; primitives get a transient wrapper object.
    pub(crate) fn to_object(&mut self, value: Value) -> Result<Value, Thrown> {
        if value.is_object() {
            return Ok(self.heap.copy_value(value));
        }
        if value.is_null_or_undefined() {
            return Err(self.raise_type_error("Cannot convert null or undefined to an object"));
        }
        let wrapper = self.heap.new_object();
        Ok(Value::object(wrapper))
    }

    /// Append `count` stack values to the array below them, expanding
    /// spread elements through the iterator protocol.
    pub(crate) fn append_array(&mut self, frame: &mut Frame, count: usize) -> Result<(), Thrown> {
        let base = frame.stack_top - count;
        let array_value = frame.stack[base - 1];
        debug_assert!(array_value.is_object());
        let array = array_value.heap_ref();

        let values: Vec<Value> = frame.stack[base..frame.stack_top].to_vec();
        frame.stack_top = base;

        let mut next_is_spread = false;
        for (index, value) in values.iter().copied().enumerate() {
            if value == Value::SPREAD_ELEMENT {
                next_is_spread = true;
                continue;
            }
            if next_is_spread {
                next_is_spread = false;
                let spread = self.spread_into(value);
                self.heap.free_value(value);
                match spread {
                    Ok(elements) => {
                        for element in elements {
                            let length = self.array_length(array);
                            self.fast_array_set(array, length, element);
                        }
                    }
                    Err(thrown) => {
                        for rest in values.iter().copied().skip(index + 1) {
                            self.heap.free_value(rest);
                        }
                        return Err(thrown);
                    }
                }
            } else {
                let length = self.array_length(array);
                self.fast_array_set(array, length, value);
            }
        }
        Ok(())
    }

    fn array_length(&self, array: crate::value::HeapRef) -> u32 {
        match &self.heap.object(array).kind {
            ObjectKind::Array { elements } => elements.len() as u32,
            other => unreachable!("array length of {other:?}"),
        }
    }

    /// Drain an iterable into owned values.
    fn spread_into(&mut self, value: Value) -> Result<Vec<Value>, Thrown> {
        let iterator = self.get_iterator(value)?;
        let mut out = Vec::new();
        loop {
            let step = match self.iterator_step(iterator) {
                Ok(step) => step,
                Err(thrown) => {
                    for element in out.drain(..) {
                        self.heap.free_value(element);
                    }
                    self.heap.free_value(iterator);
                    return Err(thrown);
                }
            };
            if step.is_false() {
                break;
            }
            let element = self.iterator_value(step);
            self.heap.free_value(step);
            match element {
                Ok(element) => out.push(element),
                Err(thrown) => {
                    for element in out.drain(..) {
                        self.heap.free_value(element);
                    }
                    self.heap.free_value(iterator);
                    return Err(thrown);
                }
            }
        }
        self.heap.free_value(iterator);
        Ok(out)
    }

    /// Collect `count` argument slots into a collection cell, expanding
    /// spread markers. Pops the slots from the frame.
    pub(crate) fn spread_arguments(
        &mut self,
        frame: &mut Frame,
        count: usize,
    ) -> Result<Value, Thrown> {
        let base = frame.stack_top - count;
        let values: Vec<Value> = frame.stack[base..frame.stack_top].to_vec();
        frame.stack_top = base;

        let mut out = Vec::new();
        let mut next_is_spread = false;
        let mut failed: Option<Thrown> = None;

        for value in values {
            if failed.is_some() {
                self.heap.free_value(value);
                continue;
            }
            if value == Value::SPREAD_ELEMENT {
                next_is_spread = true;
                continue;
            }
            if next_is_spread {
                next_is_spread = false;
                match self.spread_into(value) {
                    Ok(mut spread) => out.append(&mut spread),
                    Err(thrown) => failed = Some(thrown),
                }
                self.heap.free_value(value);
            } else {
                out.push(value);
            }
        }

        if let Some(thrown) = failed {
            for element in out {
                self.heap.free_value(element);
            }
            return Err(thrown);
        }
        Ok(self.heap.collection_value(out))
    }

    /* FOR-IN ENUMERATION */

    /// Enumerable string-keyed property names of the operand and its
    /// prototype chain, in insertion order, deduplicated. `None` skips
    /// the loop entirely (null/undefined operand).
    pub(crate) fn for_in_collection(
        &mut self,
        value: Value,
    ) -> Result<Option<(Value, Value)>, Thrown> {
        if value.is_null_or_undefined() {
            return Ok(None);
        }
        let object_value = self.to_object(value)?;
        let object = object_value.heap_ref();

        if matches!(self.heap.object(object).kind, ObjectKind::Proxy { .. }) {
            self.heap.free_value(object_value);
            return Err(self.raise_type_error("Proxy enumeration is not supported"));
        }

        let mut names: Vec<String> = Vec::new();
        let mut current = Some(object);
        while let Some(holder) = current {
            let data = self.heap.object(holder);
            if let ObjectKind::Array { elements } = &data.kind {
                for (index, element) in elements.iter().enumerate() {
                    if !element.is_array_hole() {
                        names.push(index.to_string());
                    }
                }
            }
            for entry in &data.properties {
                if !entry.property.flags.contains(PropertyFlags::ENUMERABLE) {
                    continue;
                }
                match &entry.key {
                    PropertyKey::Index(index) => names.push(index.to_string()),
                    PropertyKey::Name(name) => names.push(name.to_string()),
                    PropertyKey::Symbol(_) => {}
                }
            }
            current = data.prototype;
        }

        let names: Vec<String> = names.into_iter().unique().collect();
        if names.is_empty() {
            self.heap.free_value(object_value);
            return Ok(None);
        }

        let values: Vec<Value> = names
            .iter()
            .map(|name| self.heap.string_value(name))
            .collect();
        let collection = self.heap.collection_value(values);
        Ok(Some((collection, object_value)))
    }

    /* ITERATOR PROTOCOL */

    /// The well-known iterator symbol; script wires iterables through it.
    pub fn iterator_symbol(&self) -> Value {
        self.well_known_iterator
    }

    /// `GetIterator`: the `@@iterator` method when one is installed, the
    /// built-in array iterator for fast arrays.
    pub(crate) fn get_iterator(&mut self, value: Value) -> Result<Value, Thrown> {
        if value.is_object() {
            let key = PropertyKey::Symbol(self.well_known_iterator.heap_ref());
            let method = self.object_get(value.heap_ref(), &key, value)?;
            if self.heap.is_callable(method) {
                let this = self.heap.copy_value(value);
                let iterator = self.function_call(method, this, &[]);
                self.heap.free_value(method);
                let iterator = iterator?;
                if !iterator.is_object() {
                    self.heap.free_value(iterator);
                    return Err(self.raise_type_error("Iterator is not an object"));
                }
                return Ok(iterator);
            }
            self.heap.free_value(method);

            if matches!(self.heap.object(value.heap_ref()).kind, ObjectKind::Array { .. }) {
                let target = value.heap_ref();
                self.heap.bump(target);
                let iterator = self
                    .heap
                    .alloc(CellData::Object(crate::heap::ObjectData::new(
                        ObjectKind::ArrayIterator { target, index: 0 },
                    )));
                return Ok(Value::object(iterator));
            }
        }
        let rendered = self.render_value(value);
        Err(self.raise_type_error(&format!("{rendered} is not iterable")))
    }

    /// One iterator step: `false` when exhausted, an owned step result
    /// otherwise.
    pub(crate) fn iterator_step(&mut self, iterator: Value) -> Result<Value, Thrown> {
        debug_assert!(iterator.is_object());

        if let ObjectKind::ArrayIterator { target, index } =
            self.heap.object(iterator.heap_ref()).kind
        {
            let element = self.heap.object(target).fast_array_element(index);
            return match element {
                None => Ok(Value::FALSE),
                Some(element) => {
                    let element = if element.is_array_hole() {
                        Value::UNDEFINED
                    } else {
                        self.heap.fast_copy_value(element)
                    };
                    if let ObjectKind::ArrayIterator { index, .. } =
                        &mut self.heap.object_mut(iterator.heap_ref()).kind
                    {
                        *index += 1;
                    }
                    Ok(self.heap.collection_value(vec![element]))
                }
            };
        }

        let key = PropertyKey::Name(Rc::from("next"));
        let next = self.object_get(iterator.heap_ref(), &key, iterator)?;
        if !self.heap.is_callable(next) {
            self.heap.free_value(next);
            return Err(self.raise_type_error("Iterator 'next' is not callable"));
        }
        let this = self.heap.copy_value(iterator);
        let result = self.function_call(next, this, &[]);
        self.heap.free_value(next);
        let result = result?;
        if !result.is_object() {
            self.heap.free_value(result);
            return Err(self.raise_type_error("Iterator result is not an object"));
        }

        let done_key = PropertyKey::Name(Rc::from("done"));
        let done = self.object_get(result.heap_ref(), &done_key, result)?;
        let finished = self.heap.to_boolean(done);
        self.heap.free_value(done);
        if finished {
            self.heap.free_value(result);
            return Ok(Value::FALSE);
        }
        Ok(result)
    }

    /// Value carried by a step result.
    pub(crate) fn iterator_value(&mut self, step: Value) -> Result<Value, Thrown> {
        if step.is_collection() {
            let element = self.heap.collection(step)[0];
            return Ok(self.heap.fast_copy_value(element));
        }
        let key = PropertyKey::Name(Rc::from("value"));
        self.object_get(step.heap_ref(), &key, step)
    }

    /// `IteratorClose`: invoke the iterator's `return` method if present.
    pub(crate) fn iterator_close(&mut self, iterator: Value) -> Result<(), Thrown> {
        if !iterator.is_object()
            || matches!(
                self.heap.object(iterator.heap_ref()).kind,
                ObjectKind::ArrayIterator { .. }
            )
        {
            return Ok(());
        }
        let key = PropertyKey::Name(Rc::from("return"));
        let close = self.object_get(iterator.heap_ref(), &key, iterator)?;
        if !self.heap.is_callable(close) {
            self.heap.free_value(close);
            return Ok(());
        }
        let this = self.heap.copy_value(iterator);
        let result = self.function_call(close, this, &[]);
        self.heap.free_value(close);
        let result = result?;
        self.heap.free_value(result);
        Ok(())
    }

    /* HOST STOP HOOK */

    /// Consulted when the backward-branch counter expires.
    #[cfg(feature = "vm-exec-stop")]
    pub(crate) fn consult_stop_hook(&mut self) -> Result<(), Thrown> {
        match self.hooks.exec_stop() {
            crate::host::ExecStop::Continue => {
                self.exec_stop_counter = self.exec_stop_frequency();
                Ok(())
            }
            crate::host::ExecStop::Abort(message) => {
                tracing::debug!(%message, "host stop-hook aborted execution");
                self.exec_stop_counter = 1;
                Err(self.raise_abort(&message))
            }
        }
    }
}
