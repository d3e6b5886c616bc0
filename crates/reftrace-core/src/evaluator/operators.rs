// Conversions, operators and property access
use std::cmp::Ordering;

use super::value::{array_index, number_to_string, string_to_number, to_int32};
use super::*;

/// Largest index an assignment may grow an array to
const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Result of ToNumeric
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Numeric {
    Number(f64),
    BigInt(i128),
}

impl<H: HookHost> Interpreter<H> {
    /// ToPrimitive without user-visible conversion hooks
    pub fn to_primitive(&self, value: &Value) -> Value {
        let mut visiting = Vec::new();
        self.to_primitive_inner(value, &mut visiting)
    }

    fn to_primitive_inner(&self, value: &Value, visiting: &mut Vec<ObjectHandle>) -> Value {
        let Value::Object(handle) = value else {
            return value.clone();
        };
        let object = self.heap.get(*handle);
        match &object.kind {
            ObjectKind::Array(elements) => {
                // Cyclic arrays join as empty
                if visiting.contains(handle) {
                    return Value::string("");
                }
                visiting.push(*handle);
                let parts: Vec<String> = elements
                    .iter()
                    .map(|element| match element {
                        Value::Undefined | Value::Null => String::new(),
                        other => {
                            let primitive = self.to_primitive_inner(other, visiting);
                            self.primitive_to_string(&primitive)
                        }
                    })
                    .collect();
                visiting.pop();
                Value::String(parts.join(","))
            }
            ObjectKind::Closure(_) | ObjectKind::Native(_) => {
                let name = object.get_own("name").map(|n| self.primitive_to_string(&n)).unwrap_or_default();
                Value::String(format!("function {name}() {{ [native code] }}"))
            }
            ObjectKind::Class(class) => Value::String(format!("class {} {{ }}", class.def.name)),
            ObjectKind::Ordinary => {
                if self.is_error(*handle) {
                    Value::String(self.error_to_string(*handle))
                } else {
                    Value::string("[object Object]")
                }
            }
        }
    }

    fn primitive_to_string(&self, value: &Value) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// ToString
    pub fn to_string(&self, value: &Value) -> String {
        let primitive = self.to_primitive(value);
        self.primitive_to_string(&primitive)
    }

    pub fn to_property_key(&self, value: &Value) -> String {
        self.to_string(value)
    }

    pub(crate) fn to_numeric(&self, value: &Value) -> Numeric {
        match self.to_primitive(value) {
            Value::Undefined => Numeric::Number(f64::NAN),
            Value::Null => Numeric::Number(0.0),
            Value::Boolean(b) => Numeric::Number(if b { 1.0 } else { 0.0 }),
            Value::Number(n) => Numeric::Number(n),
            Value::BigInt(n) => Numeric::BigInt(n),
            Value::String(s) => Numeric::Number(string_to_number(&s)),
            Value::Object(_) => Numeric::Number(f64::NAN),
        }
    }

    /// ToNumeric as a value
    pub(crate) fn to_numeric_value(&mut self, value: &Value) -> EvalResult<Value> {
        Ok(match self.to_numeric(value) {
            Numeric::Number(n) => Value::Number(n),
            Numeric::BigInt(n) => Value::BigInt(n),
        })
    }

    /// ToNumber; BigInts are rejected
    pub fn to_number(&mut self, value: &Value) -> EvalResult<f64> {
        match self.to_numeric(value) {
            Numeric::Number(n) => Ok(n),
            Numeric::BigInt(_) => Err(self.throw(
                ErrorKind::TypeError,
                "Cannot convert a BigInt value to a number",
            )),
        }
    }

    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Object(handle) if self.heap.get(*handle).kind.is_callable() => "function",
            Value::Object(_) => "object",
        }
    }

    pub(crate) fn negate(&mut self, value: Value) -> EvalResult<Value> {
        match self.to_numeric(&value) {
            Numeric::Number(n) => Ok(Value::Number(-n)),
            Numeric::BigInt(n) => match n.checked_neg() {
                Some(n) => Ok(Value::BigInt(n)),
                None => Err(self.throw(ErrorKind::RangeError, "Maximum BigInt size exceeded")),
            },
        }
    }

    pub(crate) fn bit_not(&mut self, value: Value) -> EvalResult<Value> {
        match self.to_numeric(&value) {
            Numeric::Number(n) => Ok(Value::Number(f64::from(!to_int32(n)))),
            Numeric::BigInt(n) => Ok(Value::BigInt(!n)),
        }
    }

    pub fn binary_op(&mut self, op: BinaryOp, left: Value, right: Value) -> EvalResult<Value> {
        match op {
            BinaryOp::Add => {
                let left = self.to_primitive(&left);
                let right = self.to_primitive(&right);
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    let joined = format!("{}{}", self.primitive_to_string(&left), self.primitive_to_string(&right));
                    return Ok(Value::String(joined));
                }
                self.numeric_op(op, &left, &right)
            }
            BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo
            | BinaryOp::Power
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::ShiftLeft
            | BinaryOp::ShiftRight => self.numeric_op(op, &left, &right),
            BinaryOp::Equal => Ok(Value::Boolean(self.loose_equals(&left, &right))),
            BinaryOp::NotEqual => Ok(Value::Boolean(!self.loose_equals(&left, &right))),
            BinaryOp::StrictEqual => Ok(Value::Boolean(strict_equals(&left, &right))),
            BinaryOp::StrictNotEqual => Ok(Value::Boolean(!strict_equals(&left, &right))),
            BinaryOp::LessThan => Ok(Value::Boolean(self.compare(&left, &right) == Some(Ordering::Less))),
            BinaryOp::GreaterThan => Ok(Value::Boolean(self.compare(&left, &right) == Some(Ordering::Greater))),
            BinaryOp::LessEqual => Ok(Value::Boolean(matches!(
                self.compare(&left, &right),
                Some(Ordering::Less | Ordering::Equal)
            ))),
            BinaryOp::GreaterEqual => Ok(Value::Boolean(matches!(
                self.compare(&left, &right),
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOp::In => {
                let Value::Object(handle) = right else {
                    let key = self.to_property_key(&left);
                    let shown = self.inspect(&right);
                    return Err(self.throw(
                        ErrorKind::TypeError,
                        format!("Cannot use 'in' operator to search for '{key}' in {shown}"),
                    ));
                };
                let key = self.to_property_key(&left);
                Ok(Value::Boolean(self.heap.lookup(handle, &key).is_some()))
            }
            BinaryOp::InstanceOf => self.instance_of(&left, &right).map(Value::Boolean),
        }
    }

    fn numeric_op(&mut self, op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
        match (self.to_numeric(left), self.to_numeric(right)) {
            (Numeric::Number(a), Numeric::Number(b)) => Ok(Value::Number(number_arith(op, a, b))),
            (Numeric::BigInt(a), Numeric::BigInt(b)) => self.bigint_arith(op, a, b),
            _ => Err(self.throw(
                ErrorKind::TypeError,
                "Cannot mix BigInt and other types, use explicit conversions",
            )),
        }
    }

    fn bigint_arith(&mut self, op: BinaryOp, a: i128, b: i128) -> EvalResult<Value> {
        if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
            return Err(self.throw(ErrorKind::RangeError, "Division by zero"));
        }
        if op == BinaryOp::Power && b < 0 {
            return Err(self.throw(ErrorKind::RangeError, "Exponent must be non-negative"));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Modulo => a.checked_rem(b),
            BinaryOp::Power => u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
            BinaryOp::BitAnd => Some(a & b),
            BinaryOp::BitOr => Some(a | b),
            BinaryOp::BitXor => Some(a ^ b),
            BinaryOp::ShiftLeft => shift_bigint(a, b),
            BinaryOp::ShiftRight => b.checked_neg().and_then(|b| shift_bigint(a, b)),
            _ => return Err(RuntimeError::internal("non-arithmetic BigInt operator")),
        };
        match result {
            Some(n) => Ok(Value::BigInt(n)),
            None => Err(self.throw(ErrorKind::RangeError, "Maximum BigInt size exceeded")),
        }
    }

    fn compare(&self, left: &Value, right: &Value) -> Option<Ordering> {
        let left = self.to_primitive(left);
        let right = self.to_primitive(right);
        if let (Value::String(a), Value::String(b)) = (&left, &right) {
            return Some(a.cmp(b));
        }
        match (self.to_numeric(&left), self.to_numeric(&right)) {
            (Numeric::BigInt(a), Numeric::BigInt(b)) => Some(a.cmp(&b)),
            (Numeric::BigInt(a), Numeric::Number(b)) => (a as f64).partial_cmp(&b),
            (Numeric::Number(a), Numeric::BigInt(b)) => a.partial_cmp(&(b as f64)),
            (Numeric::Number(a), Numeric::Number(b)) => a.partial_cmp(&b),
        }
    }

    /// Abstract equality (`==`)
    pub fn loose_equals(&self, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Boolean(_), Value::Boolean(_))
            | (Value::BigInt(_), Value::BigInt(_))
            | (Value::Object(_), Value::Object(_)) => strict_equals(left, right),
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                *n == string_to_number(s)
            }
            (Value::BigInt(i), Value::String(s)) | (Value::String(s), Value::BigInt(i)) => {
                s.trim().parse::<i128>().map_or(false, |parsed| parsed == *i)
            }
            (Value::BigInt(i), Value::Number(n)) | (Value::Number(n), Value::BigInt(i)) => (*i as f64) == *n,
            (Value::Boolean(b), other) | (other, Value::Boolean(b)) => {
                self.loose_equals(&Value::Number(if *b { 1.0 } else { 0.0 }), other)
            }
            // One side is an object and the other a primitive
            _ => self.loose_equals(&self.to_primitive(left), &self.to_primitive(right)),
        }
    }

    fn instance_of(&mut self, left: &Value, right: &Value) -> EvalResult<bool> {
        if !self.heap.is_callable(right) {
            return Err(self.throw(ErrorKind::TypeError, "Right-hand side of 'instanceof' is not callable"));
        }
        let Value::Object(instance) = left else {
            return Ok(false);
        };
        let Value::Object(target) = self.get_property(right, "prototype")? else {
            return Ok(false);
        };
        let mut current = self.heap.get(*instance).proto;
        while let Some(proto) = current {
            if proto == target {
                return Ok(true);
            }
            current = self.heap.get(proto).proto;
        }
        Ok(false)
    }

    /// Whether `handle` inherits from one of the builtin error prototypes
    pub fn is_error(&self, handle: ObjectHandle) -> bool {
        let error_proto = self.realm.error_proto(ErrorKind::Error);
        let mut current = Some(handle);
        while let Some(h) = current {
            if h == error_proto {
                return true;
            }
            current = self.heap.get(h).proto;
        }
        false
    }

    pub(crate) fn error_to_string(&self, handle: ObjectHandle) -> String {
        let field = |key: &str| match self.heap.lookup(handle, key) {
            Some(Value::Undefined) | None => String::new(),
            Some(Value::Object(_)) => "[object Object]".to_string(),
            Some(value) => self.primitive_to_string(&value),
        };
        let name = field("name");
        let message = field("message");
        match (name.is_empty(), message.is_empty()) {
            (_, true) => name,
            (true, false) => message,
            (false, false) => format!("{name}: {message}"),
        }
    }

    // ---- property access ----

    pub fn get_property(&mut self, target: &Value, key: &str) -> EvalResult<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let shown = if target == &Value::Null { "null" } else { "undefined" };
                Err(self.throw(
                    ErrorKind::TypeError,
                    format!("Cannot read properties of {shown} (reading '{key}')"),
                ))
            }
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::from(s.chars().count()));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                Ok(self.lookup_in(self.realm.string_proto, key))
            }
            Value::Number(_) => Ok(self.lookup_in(self.realm.number_proto, key)),
            Value::Boolean(_) => Ok(self.lookup_in(self.realm.boolean_proto, key)),
            Value::BigInt(_) => Ok(self.lookup_in(self.realm.object_proto, key)),
            Value::Object(handle) => {
                if key == "prototype" {
                    return Ok(self.function_prototype(*handle));
                }
                Ok(self.lookup_in(*handle, key))
            }
        }
    }

    fn lookup_in(&self, handle: ObjectHandle, key: &str) -> Value {
        self.heap.lookup(handle, key).unwrap_or(Value::Undefined)
    }

    /// `prototype` of a function, created on first access for constructible closures
    fn function_prototype(&mut self, handle: ObjectHandle) -> Value {
        if let Some(existing) = self.heap.get(handle).get_own("prototype") {
            return existing;
        }
        let constructible = matches!(&self.heap.get(handle).kind, ObjectKind::Closure(c) if c.constructible);
        if !constructible {
            return self.lookup_in(handle, "prototype");
        }
        let proto = self.new_object();
        self.heap
            .get_mut(proto)
            .hidden
            .insert("constructor".to_string(), Value::Object(handle));
        self.heap
            .get_mut(handle)
            .hidden
            .insert("prototype".to_string(), Value::Object(proto));
        Value::Object(proto)
    }

    pub fn set_property(&mut self, target: &Value, key: &str, value: Value) -> EvalResult<()> {
        let handle = match target {
            Value::Undefined | Value::Null => {
                let shown = if target == &Value::Null { "null" } else { "undefined" };
                return Err(self.throw(
                    ErrorKind::TypeError,
                    format!("Cannot set properties of {shown} (setting '{key}')"),
                ));
            }
            Value::Object(handle) => *handle,
            // Writes to primitives are silently dropped
            _ => return Ok(()),
        };

        if self.heap.is_array(target) {
            if key == "length" {
                let length = self.to_number(&value)?;
                if length < 0.0 || length.fract() != 0.0 || length > MAX_ARRAY_LENGTH as f64 {
                    return Err(self.throw(ErrorKind::RangeError, "Invalid array length"));
                }
                if let ObjectKind::Array(elements) = &mut self.heap.get_mut(handle).kind {
                    elements.resize(length as usize, Value::Undefined);
                }
                return Ok(());
            }
            if let Some(index) = array_index(key) {
                if index >= MAX_ARRAY_LENGTH {
                    return Err(self.throw(ErrorKind::RangeError, "Invalid array length"));
                }
                if let ObjectKind::Array(elements) = &mut self.heap.get_mut(handle).kind {
                    if index >= elements.len() {
                        elements.resize(index + 1, Value::Undefined);
                    }
                    elements[index] = value;
                }
                return Ok(());
            }
        }

        let object = self.heap.get_mut(handle);
        let is_function = object.kind.is_callable();
        if object.hidden.contains_key(key) || (is_function && key == "prototype") {
            object.hidden.insert(key.to_string(), value);
        } else {
            object.props.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn delete_property(&mut self, target: &Value, key: &str) -> EvalResult<bool> {
        let handle = match target {
            Value::Undefined | Value::Null => {
                return Err(self.throw(ErrorKind::TypeError, "Cannot convert undefined or null to object"))
            }
            Value::Object(handle) => *handle,
            _ => return Ok(true),
        };
        let object = self.heap.get_mut(handle);
        if let ObjectKind::Array(elements) = &mut object.kind {
            if key == "length" {
                return Ok(false);
            }
            if let Some(index) = array_index(key) {
                if let Some(slot) = elements.get_mut(index) {
                    *slot = Value::Undefined;
                }
                return Ok(true);
            }
        }
        if object.props.shift_remove(key).is_none() {
            object.hidden.shift_remove(key);
        }
        Ok(true)
    }
}

/// Strict equality (`===`)
pub fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        _ => left == right,
    }
}

/// SameValueZero, used by `includes`
pub fn same_value_zero(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => left == right,
    }
}

fn number_arith(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        BinaryOp::Power => js_pow(a, b),
        BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
        BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        BinaryOp::ShiftLeft => f64::from(to_int32(a).wrapping_shl(to_int32(b) as u32 & 31)),
        BinaryOp::ShiftRight => f64::from(to_int32(a).wrapping_shr(to_int32(b) as u32 & 31)),
        _ => f64::NAN,
    }
}

/// Exponentiation; differs from `powf` for NaN exponents and unit bases
pub fn js_pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() {
        return f64::NAN;
    }
    if base.abs() == 1.0 && exponent.is_infinite() {
        return f64::NAN;
    }
    base.powf(exponent)
}

fn shift_bigint(value: i128, shift: i128) -> Option<i128> {
    if shift >= 0 {
        let shift = u32::try_from(shift).ok().filter(|s| *s < 127)?;
        let shifted = value.checked_shl(shift)?;
        (shifted >> shift == value).then_some(shifted)
    } else {
        let shift = u32::try_from(-shift).unwrap_or(127).min(127);
        Some(value >> shift)
    }
}
