//! Numeric and relational operator semantics
//!
//! The slow paths behind the dispatch loop's tagged-integer fast paths:
//! `ToPrimitive`/`ToNumber`/`ToString` coercion, boxed-number arithmetic,
//! bitwise logic on 32-bit lanes and the abstract comparison algorithms.
//! None of these consume their operands; the loop owns and frees them.

use std::rc::Rc;

use crate::error::Thrown;
use crate::heap::{Heap, ObjectKind, PropertyKey};
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Hint passed to `ToPrimitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreferredType {
    /// `valueOf` before `toString`.
    Number,
    /// `toString` before `valueOf`.
    String,
}

/// Boxed-number binary operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArithOp {
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
}

/// Bitwise operation selector for the 32-bit lane path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitwiseOp {
    And,
    Or,
    Xor,
    Not,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
}

/// Relational operator selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelOp {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl<H: Host> Interpreter<H> {
    /// `ToPrimitive`. Returns an owned value; non-objects are copied
    /// through.
    pub(crate) fn to_primitive(
        &mut self,
        value: Value,
        hint: PreferredType,
    ) -> Result<Value, Thrown> {
        if !value.is_object() {
            return Ok(self.heap.fast_copy_value(value));
        }

        let methods: [&str; 2] = match hint {
            PreferredType::Number => ["valueOf", "toString"],
            PreferredType::String => ["toString", "valueOf"],
        };

        for method in methods {
            let key = PropertyKey::Name(Rc::from(method));
            let callee = self.object_get(value.heap_ref(), &key, value)?;
            if self.heap.is_callable(callee) {
                let this = self.heap.copy_value(value);
                let result = match self.function_call(callee, this, &[]) {
                    Ok(result) => result,
                    Err(thrown) => {
                        self.heap.free_value(callee);
                        return Err(thrown);
                    }
                };
                self.heap.free_value(callee);
                if !result.is_object() {
                    return Ok(result);
                }
                self.heap.free_value(result);
            } else {
                self.heap.free_value(callee);
            }
        }

        Err(self.raise_type_error("Cannot convert object to primitive value"))
    }

    /// `ToNumber` as a raw double.
    pub(crate) fn to_number_value(&mut self, value: Value) -> Result<f64, Thrown> {
        if let Some(number) = self.heap.primitive_to_number(value) {
            return Ok(number);
        }
        if value.is_symbol() {
            return Err(self.raise_type_error("Cannot convert a Symbol to a number"));
        }
        let primitive = self.to_primitive(value, PreferredType::Number)?;
        let number = self.heap.primitive_to_number(primitive);
        self.heap.free_value(primitive);
        match number {
            Some(number) => Ok(number),
            None => Err(self.raise_type_error("Cannot convert object to a number")),
        }
    }

    /// `ToString` as an interned buffer.
    pub(crate) fn to_string_value(&mut self, value: Value) -> Result<Rc<str>, Thrown> {
        if value.is_string() {
            return Ok(self.heap.string_of(value));
        }
        if value.is_symbol() {
            return Err(self.raise_type_error("Cannot convert a Symbol to a string"));
        }
        if value.is_object() {
            let primitive = self.to_primitive(value, PreferredType::String)?;
            let result = self.to_string_value(primitive);
            self.heap.free_value(primitive);
            return result;
        }
        if value.is_number() {
            return Ok(Rc::from(Heap::number_to_string(self.heap.number_of(value))));
        }
        Ok(Rc::from(match value {
            Value::TRUE => "true",
            Value::FALSE => "false",
            Value::NULL => "null",
            Value::UNDEFINED => "undefined",
            _ => unreachable!("stringifying the {value:?} sentinel"),
        }))
    }

    /// The `+` slow path: `ToPrimitive` both sides, concatenate when
    /// either is a string, add numerically otherwise.
    pub(crate) fn addition(&mut self, left: Value, right: Value) -> Result<Value, Thrown> {
        let left_prim = self.to_primitive(left, PreferredType::Number)?;
        let right_prim = match self.to_primitive(right, PreferredType::Number) {
            Ok(value) => value,
            Err(thrown) => {
                self.heap.free_value(left_prim);
                return Err(thrown);
            }
        };

        let result = if left_prim.is_string() || right_prim.is_string() {
            match (
                self.to_string_value(left_prim),
                self.to_string_value(right_prim),
            ) {
                (Ok(left_str), Ok(right_str)) => {
                    let mut joined = String::with_capacity(left_str.len() + right_str.len());
                    joined.push_str(&left_str);
                    joined.push_str(&right_str);
                    Ok(self.heap.string_value(&joined))
                }
                (Err(thrown), _) | (_, Err(thrown)) => Err(thrown),
            }
        } else {
            match (
                self.to_number_value(left_prim),
                self.to_number_value(right_prim),
            ) {
                (Ok(left_num), Ok(right_num)) => Ok(self.heap.number_value(left_num + right_num)),
                (Err(thrown), _) | (_, Err(thrown)) => Err(thrown),
            }
        };

        self.heap.free_value(left_prim);
        self.heap.free_value(right_prim);
        result
    }

    /// Boxed-number binary arithmetic.
    pub(crate) fn number_arithmetic(
        &mut self,
        op: ArithOp,
        left: Value,
        right: Value,
    ) -> Result<Value, Thrown> {
        let left_num = self.to_number_value(left)?;
        let right_num = self.to_number_value(right)?;
        let result = match op {
            ArithOp::Sub => left_num - right_num,
            ArithOp::Mul => left_num * right_num,
            ArithOp::Div => left_num / right_num,
            ArithOp::Mod => left_num % right_num,
            ArithOp::Exp => left_num.powf(right_num),
        };
        Ok(self.heap.number_value(result))
    }

    /// Bitwise logic and shifts on coerced 32-bit lanes.
    pub(crate) fn bitwise_logic(
        &mut self,
        op: BitwiseOp,
        left: Value,
        right: Value,
    ) -> Result<Value, Thrown> {
        let left_num = self.to_number_value(left)?;
        let left_lane = to_int32(left_num);

        if op == BitwiseOp::Not {
            return Ok(self.heap.int32_value(!left_lane));
        }

        let right_num = self.to_number_value(right)?;
        let right_lane = to_int32(right_num);

        let result = match op {
            BitwiseOp::And => self.heap.int32_value(left_lane & right_lane),
            BitwiseOp::Or => self.heap.int32_value(left_lane | right_lane),
            BitwiseOp::Xor => self.heap.int32_value(left_lane ^ right_lane),
            BitwiseOp::ShiftLeft => self.heap.int32_value(left_lane << (right_lane & 0x1f)),
            BitwiseOp::ShiftRight => self.heap.int32_value(left_lane >> (right_lane & 0x1f)),
            BitwiseOp::ShiftRightUnsigned => self
                .heap
                .uint32_value((left_lane as u32) >> (right_lane & 0x1f)),
            BitwiseOp::Not => unreachable!(),
        };
        Ok(result)
    }

    /// Abstract relational comparison.
    pub(crate) fn relation(&mut self, op: RelOp, left: Value, right: Value) -> Result<Value, Thrown> {
        let left_prim = self.to_primitive(left, PreferredType::Number)?;
        let right_prim = match self.to_primitive(right, PreferredType::Number) {
            Ok(value) => value,
            Err(thrown) => {
                self.heap.free_value(left_prim);
                return Err(thrown);
            }
        };

        let verdict = if left_prim.is_string() && right_prim.is_string() {
            let left_str = self.heap.string_of(left_prim);
            let right_str = self.heap.string_of(right_prim);
            Some(match op {
                RelOp::Less => left_str < right_str,
                RelOp::Greater => left_str > right_str,
                RelOp::LessEqual => left_str <= right_str,
                RelOp::GreaterEqual => left_str >= right_str,
            })
        } else {
            match (
                self.to_number_value(left_prim),
                self.to_number_value(right_prim),
            ) {
                (Ok(left_num), Ok(right_num)) => {
                    left_num.partial_cmp(&right_num).map(|ordering| match op {
                        RelOp::Less => ordering.is_lt(),
                        RelOp::Greater => ordering.is_gt(),
                        RelOp::LessEqual => ordering.is_le(),
                        RelOp::GreaterEqual => ordering.is_ge(),
                    })
                }
                (Err(thrown), _) | (_, Err(thrown)) => {
                    self.heap.free_value(left_prim);
                    self.heap.free_value(right_prim);
                    return Err(thrown);
                }
            }
        };

        self.heap.free_value(left_prim);
        self.heap.free_value(right_prim);
        // NaN operands compare false for every relation.
        Ok(Value::boolean(verdict.unwrap_or(false)))
    }

    /// Abstract (loose) equality.
    pub(crate) fn equality(&mut self, left: Value, right: Value) -> Result<Value, Thrown> {
        if same_type(left, right) {
            return Ok(Value::boolean(self.heap.strict_equals(left, right)));
        }
        if left.is_null_or_undefined() && right.is_null_or_undefined() {
            return Ok(Value::TRUE);
        }
        if left.is_null_or_undefined() || right.is_null_or_undefined() {
            return Ok(Value::FALSE);
        }
        if (left.is_symbol() && !right.is_object()) || (right.is_symbol() && !left.is_object()) {
            return Ok(Value::FALSE);
        }
        if left.is_object() || right.is_object() {
            let (object, other) = if left.is_object() {
                (left, right)
            } else {
                (right, left)
            };
            let primitive = self.to_primitive(object, PreferredType::Number)?;
            let result = self.equality(primitive, other);
            self.heap.free_value(primitive);
            return result;
        }
        let left_num = self.to_number_value(left)?;
        let right_num = self.to_number_value(right)?;
        Ok(Value::boolean(left_num == right_num))
    }

    /// `typeof` result string.
    pub(crate) fn typeof_value(&mut self, value: Value) -> Value {
        let name = if value.is_number() {
            "number"
        } else if value.is_string() {
            "string"
        } else if value.is_symbol() {
            "symbol"
        } else if value.is_boolean() {
            "boolean"
        } else if value.is_null() {
            "object"
        } else if value.is_object() {
            if self.heap.is_callable(value) {
                "function"
            } else {
                "object"
            }
        } else {
            "undefined"
        };
        self.heap.string_value(name)
    }

    /// `instanceof`: walk the left operand's prototype chain looking for
    /// the constructor's `prototype` object.
    pub(crate) fn instanceof_op(&mut self, left: Value, right: Value) -> Result<Value, Thrown> {
        if !self.heap.is_callable(right) {
            return Err(self.raise_type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let key = PropertyKey::Name(Rc::from("prototype"));
        let prototype = self.object_get(right.heap_ref(), &key, right)?;
        if !prototype.is_object() {
            self.heap.free_value(prototype);
            return Err(self.raise_type_error("Constructor has a non-object prototype"));
        }

        let mut answer = false;
        if left.is_object() {
            let target = prototype.heap_ref();
            let mut current = self.heap.object(left.heap_ref()).prototype;
            while let Some(link) = current {
                if link == target {
                    answer = true;
                    break;
                }
                current = self.heap.object(link).prototype;
            }
        }
        self.heap.free_value(prototype);
        Ok(Value::boolean(answer))
    }

    /// `in`: property existence on an object operand.
    pub(crate) fn in_op(&mut self, left: Value, right: Value) -> Result<Value, Thrown> {
        if !right.is_object() {
            return Err(self.raise_type_error("Cannot use 'in' operator on a non-object"));
        }
        let key = self.to_property_key(left)?;
        let answer = self.object_has(right.heap_ref(), &key)?;
        Ok(Value::boolean(answer))
    }

    /// Unary `+`/`-` slow path.
    pub(crate) fn unary_operation(&mut self, value: Value, plus: bool) -> Result<Value, Thrown> {
        let number = self.to_number_value(value)?;
        Ok(self
            .heap
            .number_value(if plus { number } else { -number }))
    }

    /// Whether the value is a plain function without an own `name`
    /// property yet; such functions adopt the name of the binding they
    /// are first assigned to.
    pub(crate) fn needs_name_inference(&self, value: Value) -> bool {
        if !value.is_object() {
            return false;
        }
        let object = self.heap.object(value.heap_ref());
        matches!(object.kind, ObjectKind::Function(_))
            && object
                .find_property(&PropertyKey::Name(Rc::from("name")))
                .is_none()
    }
}

/// Modular `ToInt32`.
pub(crate) fn to_int32(number: f64) -> i32 {
    if !number.is_finite() || number == 0.0 {
        return 0;
    }
    let modulus = 2f64.powi(32);
    let mut wrapped = number.trunc() % modulus;
    if wrapped < 0.0 {
        wrapped += modulus;
    }
    wrapped as u32 as i32
}

fn same_type(left: Value, right: Value) -> bool {
    (left.is_number() && right.is_number())
        || (left.is_boolean() && right.is_boolean())
        || (left.is_string() && right.is_string())
        || (left.is_symbol() && right.is_symbol())
        || (left.is_object() && right.is_object())
        || (left.is_undefined() && right.is_undefined())
        || (left.is_null() && right.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_int32_wraps_modularly() {
        assert_eq!(to_int32(0.0), 0);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(f64::INFINITY), 0);
        assert_eq!(to_int32(4294967296.0), 0);
        assert_eq!(to_int32(4294967297.0), 1);
        assert_eq!(to_int32(2147483648.0), -2147483648);
    }
}
