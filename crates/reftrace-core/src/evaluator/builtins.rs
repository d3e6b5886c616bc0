// Builtin library: prototypes, globals and native function dispatch
use std::collections::HashMap;

use super::operators::{js_pow, same_value_zero, strict_equals};
use super::value::to_int32;
use super::*;

/// Prototype objects shared by every value of a kind
#[derive(Debug, Clone)]
pub struct Realm {
    pub object_proto: ObjectHandle,
    pub function_proto: ObjectHandle,
    pub array_proto: ObjectHandle,
    pub string_proto: ObjectHandle,
    pub number_proto: ObjectHandle,
    pub boolean_proto: ObjectHandle,
    error_protos: HashMap<ErrorKind, ObjectHandle>,
}

const ARRAY_METHODS: &[Builtin] = &[
    Builtin::ArrayPush,
    Builtin::ArrayPop,
    Builtin::ArrayShift,
    Builtin::ArrayUnshift,
    Builtin::ArraySlice,
    Builtin::ArraySplice,
    Builtin::ArrayIndexOf,
    Builtin::ArrayIncludes,
    Builtin::ArrayJoin,
    Builtin::ArrayConcat,
    Builtin::ArrayReverse,
    Builtin::ArrayMap,
    Builtin::ArrayFilter,
    Builtin::ArrayForEach,
    Builtin::ArrayReduce,
    Builtin::ArrayFind,
    Builtin::ArraySome,
    Builtin::ArrayEvery,
];

const STRING_METHODS: &[Builtin] = &[
    Builtin::StringSlice,
    Builtin::StringSubstring,
    Builtin::StringIndexOf,
    Builtin::StringIncludes,
    Builtin::StringToUpperCase,
    Builtin::StringToLowerCase,
    Builtin::StringSplit,
    Builtin::StringTrim,
    Builtin::StringCharAt,
    Builtin::StringStartsWith,
    Builtin::StringEndsWith,
];

const MATH_FUNCTIONS: &[Builtin] = &[
    Builtin::MathFloor,
    Builtin::MathCeil,
    Builtin::MathRound,
    Builtin::MathAbs,
    Builtin::MathMax,
    Builtin::MathMin,
    Builtin::MathSqrt,
    Builtin::MathPow,
    Builtin::MathTrunc,
    Builtin::MathSign,
];

impl Realm {
    /// Allocate the builtin objects and bind the globals into `global`
    pub fn install(heap: &mut Heap, global: &Env) -> Realm {
        let object_proto = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        let function_proto = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_proto)));
        let ordinary = |heap: &mut Heap| heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(object_proto)));
        let array_proto = ordinary(heap);
        let string_proto = ordinary(heap);
        let number_proto = ordinary(heap);
        let boolean_proto = ordinary(heap);

        let native = |heap: &mut Heap, builtin: Builtin| {
            Value::Object(heap.alloc(JsObject::new(
                ObjectKind::Native(NativeFn::Builtin(builtin)),
                Some(function_proto),
            )))
        };
        let define = |heap: &mut Heap, target: ObjectHandle, key: &str, value: Value| {
            heap.get_mut(target).hidden.insert(key.to_string(), value);
        };

        for builtin in [Builtin::ObjectToString, Builtin::HasOwnProperty] {
            let f = native(heap, builtin);
            define(heap, object_proto, builtin.name(), f);
        }
        for builtin in ARRAY_METHODS {
            let f = native(heap, *builtin);
            define(heap, array_proto, builtin.name(), f);
        }
        for builtin in STRING_METHODS {
            let f = native(heap, *builtin);
            define(heap, string_proto, builtin.name(), f);
        }

        let mut error_protos = HashMap::new();
        let base_error = ordinary(heap);
        define(heap, base_error, "name", Value::string("Error"));
        define(heap, base_error, "message", Value::string(""));
        let to_string = native(heap, Builtin::ErrorToString);
        define(heap, base_error, "toString", to_string);
        error_protos.insert(ErrorKind::Error, base_error);
        for kind in ErrorKind::ALL.into_iter().filter(|k| *k != ErrorKind::Error) {
            let proto = heap.alloc(JsObject::new(ObjectKind::Ordinary, Some(base_error)));
            define(heap, proto, "name", Value::string(kind.name()));
            define(heap, proto, "message", Value::string(""));
            error_protos.insert(kind, proto);
        }

        // Constructors
        let mut constructors = vec![
            (Builtin::ObjectCtor, object_proto),
            (Builtin::ArrayCtor, array_proto),
            (Builtin::StringCtor, string_proto),
            (Builtin::NumberCtor, number_proto),
            (Builtin::BooleanCtor, boolean_proto),
        ];
        for kind in ErrorKind::ALL {
            constructors.push((Builtin::ErrorCtor(kind), error_protos[&kind]));
        }
        for (builtin, proto) in constructors {
            let ctor = native(heap, builtin);
            if let Value::Object(handle) = &ctor {
                define(heap, *handle, "prototype", Value::Object(proto));
            }
            define(heap, proto, "constructor", ctor.clone());
            global.declare(builtin.name(), Some(ctor), true);
        }
        if let Ok(Value::Object(object_ctor)) = global.get("Object") {
            for builtin in [
                Builtin::ObjectKeys,
                Builtin::ObjectValues,
                Builtin::ObjectEntries,
                Builtin::ObjectAssign,
            ] {
                let f = native(heap, builtin);
                define(heap, object_ctor, builtin.name(), f);
            }
        }
        if let Ok(Value::Object(array_ctor)) = global.get("Array") {
            let f = native(heap, Builtin::ArrayIsArray);
            define(heap, array_ctor, "isArray", f);
        }

        let console = ordinary(heap);
        let log = native(heap, Builtin::ConsoleLog);
        define(heap, console, "log", log);
        global.declare("console", Some(Value::Object(console)), true);

        let math = ordinary(heap);
        for builtin in MATH_FUNCTIONS {
            let f = native(heap, *builtin);
            define(heap, math, builtin.name(), f);
        }
        define(heap, math, "PI", Value::Number(std::f64::consts::PI));
        define(heap, math, "E", Value::Number(std::f64::consts::E));
        global.declare("Math", Some(Value::Object(math)), true);

        let is_nan = native(heap, Builtin::IsNaN);
        global.declare("isNaN", Some(is_nan), true);
        global.declare("NaN", Some(Value::Number(f64::NAN)), false);
        global.declare("Infinity", Some(Value::Number(f64::INFINITY)), false);
        global.declare("undefined", Some(Value::Undefined), false);

        Realm {
            object_proto,
            function_proto,
            array_proto,
            string_proto,
            number_proto,
            boolean_proto,
            error_protos,
        }
    }

    pub fn error_proto(&self, kind: ErrorKind) -> ObjectHandle {
        self.error_protos
            .get(&kind)
            .copied()
            .unwrap_or(self.object_proto)
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

/// Resolve a relative start/end argument against `len`
fn relative_index(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    let len_f = len as f64;
    let n = n.trunc();
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let floor = x.floor();
    let rounded = if x - floor >= 0.5 { floor + 1.0 } else { floor };
    if rounded == 0.0 && x < 0.0 {
        -0.0
    } else {
        rounded
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

impl<H: HookHost> Interpreter<H> {
    pub(crate) fn init_error(&mut self, instance: ObjectHandle, args: &[Value]) {
        if let Some(message) = args.first().filter(|m| **m != Value::Undefined) {
            let message = Value::String(self.to_string(message));
            self.heap
                .get_mut(instance)
                .hidden
                .insert("message".to_string(), message);
        }
    }

    pub(crate) fn construct_builtin(&mut self, builtin: Builtin, args: Vec<Value>) -> EvalResult<Value> {
        match builtin {
            Builtin::ErrorCtor(kind) => {
                let proto = self.realm.error_proto(kind);
                let instance = self.heap.alloc(
                    JsObject::new(ObjectKind::Ordinary, Some(proto))
                        .with_class_name(Some(kind.name().to_string())),
                );
                self.init_error(instance, &args);
                Ok(Value::Object(instance))
            }
            // Wrapper objects are not modelled; `new String(x)` yields the primitive
            other => self.call_builtin(other, Value::Undefined, args),
        }
    }

    pub(crate) fn call_builtin(&mut self, builtin: Builtin, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        match builtin {
            Builtin::ConsoleLog => {
                let line = args.iter().map(|a| self.display(a)).collect::<Vec<_>>().join(" ");
                debug!(target: "reftrace_core::console", "{line}");
                if self.options.capture_console {
                    self.console.push(line);
                }
                Ok(Value::Undefined)
            }
            Builtin::IsNaN => Ok(Value::Boolean(self.to_number(&arg(&args, 0))?.is_nan())),
            Builtin::StringCtor => Ok(Value::String(match args.first() {
                Some(value) => self.to_string(value),
                None => String::new(),
            })),
            Builtin::NumberCtor => Ok(Value::Number(match args.first() {
                Some(Value::BigInt(n)) => *n as f64,
                Some(value) => self.to_number(value)?,
                None => 0.0,
            })),
            Builtin::BooleanCtor => Ok(Value::Boolean(arg(&args, 0).truthy())),
            Builtin::ObjectCtor => match arg(&args, 0) {
                value @ Value::Object(_) => Ok(value),
                _ => Ok(Value::Object(self.new_object())),
            },
            Builtin::ArrayCtor => match args.as_slice() {
                [Value::Number(n)] => {
                    let n = *n;
                    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
                        return Err(self.throw(ErrorKind::RangeError, "Invalid array length"));
                    }
                    Ok(self.new_array(vec![Value::Undefined; n as usize]))
                }
                _ => Ok(self.new_array(args)),
            },
            Builtin::ErrorCtor(_) => self.construct_builtin(builtin, args),

            Builtin::MathFloor => self.math_unary(&args, f64::floor),
            Builtin::MathCeil => self.math_unary(&args, f64::ceil),
            Builtin::MathRound => self.math_unary(&args, js_round),
            Builtin::MathAbs => self.math_unary(&args, f64::abs),
            Builtin::MathSqrt => self.math_unary(&args, f64::sqrt),
            Builtin::MathTrunc => self.math_unary(&args, f64::trunc),
            Builtin::MathSign => self.math_unary(&args, |x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
            Builtin::MathPow => {
                let base = self.to_number(&arg(&args, 0))?;
                let exponent = self.to_number(&arg(&args, 1))?;
                Ok(Value::Number(js_pow(base, exponent)))
            }
            Builtin::MathMax | Builtin::MathMin => {
                let is_max = builtin == Builtin::MathMax;
                let mut result = if is_max { f64::NEG_INFINITY } else { f64::INFINITY };
                for value in &args {
                    let n = self.to_number(value)?;
                    if n.is_nan() {
                        result = f64::NAN;
                    } else if !result.is_nan() && ((is_max && n > result) || (!is_max && n < result)) {
                        result = n;
                    }
                }
                Ok(Value::Number(result))
            }

            Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => {
                let entries = match arg(&args, 0) {
                    Value::Undefined | Value::Null => {
                        return Err(self.throw(ErrorKind::TypeError, "Cannot convert undefined or null to object"))
                    }
                    Value::Object(handle) => self.heap.get(handle).own_entries(),
                    Value::String(s) => s
                        .chars()
                        .enumerate()
                        .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
                        .collect(),
                    _ => Vec::new(),
                };
                let items = entries
                    .into_iter()
                    .map(|(key, value)| match builtin {
                        Builtin::ObjectKeys => Value::String(key),
                        Builtin::ObjectValues => value,
                        _ => self.new_array(vec![Value::String(key), value]),
                    })
                    .collect();
                Ok(self.new_array(items))
            }
            Builtin::ObjectAssign => {
                let target = arg(&args, 0);
                if target.is_nullish() {
                    return Err(self.throw(ErrorKind::TypeError, "Cannot convert undefined or null to object"));
                }
                for source in args.iter().skip(1) {
                    if let Value::Object(handle) = source {
                        for (key, value) in self.heap.get(*handle).own_entries() {
                            self.set_property(&target, &key, value)?;
                        }
                    }
                }
                Ok(target)
            }
            Builtin::ArrayIsArray => Ok(Value::Boolean(self.heap.is_array(&arg(&args, 0)))),

            Builtin::ObjectToString => Ok(Value::string(match &this {
                Value::Undefined => "[object Undefined]",
                Value::Null => "[object Null]",
                Value::Object(handle) => match &self.heap.get(*handle).kind {
                    ObjectKind::Array(_) => "[object Array]",
                    ObjectKind::Ordinary if self.is_error(*handle) => "[object Error]",
                    ObjectKind::Ordinary => "[object Object]",
                    _ => "[object Function]",
                },
                Value::String(_) => "[object String]",
                Value::Number(_) => "[object Number]",
                Value::Boolean(_) => "[object Boolean]",
                Value::BigInt(_) => "[object BigInt]",
            })),
            Builtin::HasOwnProperty => {
                let key = self.to_property_key(&arg(&args, 0));
                Ok(Value::Boolean(match &this {
                    Value::Object(handle) => self.heap.get(*handle).has_own(&key),
                    Value::String(s) => key == "length" || value::array_index(&key).is_some_and(|i| i < s.chars().count()),
                    _ => false,
                }))
            }
            Builtin::ErrorToString => match &this {
                Value::Object(handle) => Ok(Value::String(self.error_to_string(*handle))),
                _ => Err(self.throw(ErrorKind::TypeError, "Error.prototype.toString called on non-object")),
            },

            Builtin::ArrayPush
            | Builtin::ArrayPop
            | Builtin::ArrayShift
            | Builtin::ArrayUnshift
            | Builtin::ArraySlice
            | Builtin::ArraySplice
            | Builtin::ArrayIndexOf
            | Builtin::ArrayIncludes
            | Builtin::ArrayJoin
            | Builtin::ArrayConcat
            | Builtin::ArrayReverse => self.array_method(builtin, this, args),
            Builtin::ArrayMap
            | Builtin::ArrayFilter
            | Builtin::ArrayForEach
            | Builtin::ArrayReduce
            | Builtin::ArrayFind
            | Builtin::ArraySome
            | Builtin::ArrayEvery => self.array_iteration(builtin, this, args),

            _ => self.string_method(builtin, this, args),
        }
    }

    fn math_unary(&mut self, args: &[Value], f: impl Fn(f64) -> f64) -> EvalResult<Value> {
        let x = self.to_number(&arg(args, 0))?;
        Ok(Value::Number(f(x)))
    }

    fn array_receiver(&mut self, builtin: Builtin, this: &Value) -> EvalResult<ObjectHandle> {
        match this {
            Value::Object(handle) if self.heap.is_array(this) => Ok(*handle),
            _ => Err(self.throw(
                ErrorKind::TypeError,
                format!("Array.prototype.{} called on a non-array", builtin.name()),
            )),
        }
    }

    fn elements_mut(&mut self, handle: ObjectHandle) -> EvalResult<&mut Vec<Value>> {
        match &mut self.heap.get_mut(handle).kind {
            ObjectKind::Array(elements) => Ok(elements),
            _ => Err(RuntimeError::internal("array receiver lost its elements")),
        }
    }

    fn array_method(&mut self, builtin: Builtin, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let handle = self.array_receiver(builtin, &this)?;
        let len = self.heap.array_elements(&this).len();
        match builtin {
            Builtin::ArrayPush => {
                let elements = self.elements_mut(handle)?;
                elements.extend(args);
                Ok(Value::from(elements.len()))
            }
            Builtin::ArrayPop => Ok(self.elements_mut(handle)?.pop().unwrap_or(Value::Undefined)),
            Builtin::ArrayShift => {
                let elements = self.elements_mut(handle)?;
                if elements.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(elements.remove(0))
                }
            }
            Builtin::ArrayUnshift => {
                let elements = self.elements_mut(handle)?;
                elements.splice(0..0, args);
                Ok(Value::from(elements.len()))
            }
            Builtin::ArraySlice => {
                let start = self.index_arg(&args, 0, len, 0)?;
                let end = self.index_arg(&args, 1, len, len)?;
                let items = self.heap.array_elements(&this);
                let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
                Ok(self.new_array(slice))
            }
            Builtin::ArraySplice => {
                let start = self.index_arg(&args, 0, len, 0)?;
                let delete_count = match args.get(1) {
                    None => len - start,
                    Some(count) => {
                        let count = self.to_number(count)?;
                        if count.is_nan() || count < 0.0 {
                            0
                        } else {
                            (count.trunc() as usize).min(len - start)
                        }
                    }
                };
                let inserted: Vec<Value> = args.into_iter().skip(2).collect();
                let removed: Vec<Value> = self
                    .elements_mut(handle)?
                    .splice(start..start + delete_count, inserted)
                    .collect();
                Ok(self.new_array(removed))
            }
            Builtin::ArrayIndexOf | Builtin::ArrayIncludes => {
                let needle = arg(&args, 0);
                let from = self.index_arg(&args, 1, len, 0)?;
                let items = self.heap.array_elements(&this);
                if builtin == Builtin::ArrayIncludes {
                    return Ok(Value::Boolean(items.iter().skip(from).any(|v| same_value_zero(v, &needle))));
                }
                let found = items.iter().skip(from).position(|v| strict_equals(v, &needle));
                Ok(Value::Number(found.map_or(-1.0, |i| (i + from) as f64)))
            }
            Builtin::ArrayJoin => {
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(sep) => self.to_string(sep),
                };
                let parts: Vec<String> = self
                    .heap
                    .array_elements(&this)
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { self.to_string(v) })
                    .collect();
                Ok(Value::String(parts.join(&separator)))
            }
            Builtin::ArrayConcat => {
                let mut items = self.heap.array_elements(&this);
                for value in &args {
                    if self.heap.is_array(value) {
                        items.extend(self.heap.array_elements(value));
                    } else {
                        items.push(value.clone());
                    }
                }
                Ok(self.new_array(items))
            }
            Builtin::ArrayReverse => {
                self.elements_mut(handle)?.reverse();
                Ok(this)
            }
            _ => Err(RuntimeError::internal("not an array method")),
        }
    }

    /// Relative index argument with a default for undefined
    fn index_arg(&mut self, args: &[Value], index: usize, len: usize, default: usize) -> EvalResult<usize> {
        match args.get(index) {
            None | Some(Value::Undefined) => Ok(default),
            Some(value) => {
                let n = self.to_number(value)?;
                Ok(relative_index(n, len))
            }
        }
    }

    fn array_iteration(&mut self, builtin: Builtin, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let handle = self.array_receiver(builtin, &this)?;
        let callback = arg(&args, 0);
        if !self.heap.is_callable(&callback) {
            let shown = self.inspect(&callback);
            return Err(self.throw(ErrorKind::TypeError, format!("{shown} is not a function")));
        }
        let this_arg = arg(&args, 1);
        let len = self.heap.array_elements(&this).len();
        let element_at = |interp: &Self, i: usize| match &interp.heap.get(handle).kind {
            ObjectKind::Array(elements) => elements.get(i).cloned(),
            _ => None,
        };

        if builtin == Builtin::ArrayReduce {
            let mut index = 0;
            let mut accumulator = match args.get(1) {
                Some(initial) => initial.clone(),
                None => {
                    if len == 0 {
                        return Err(self.throw(ErrorKind::TypeError, "Reduce of empty array with no initial value"));
                    }
                    index = 1;
                    element_at(&*self, 0).unwrap_or(Value::Undefined)
                }
            };
            while index < len {
                let Some(element) = element_at(&*self, index) else {
                    break;
                };
                accumulator = self.call_value(
                    &callback,
                    Value::Undefined,
                    vec![accumulator, element, Value::from(index), this.clone()],
                )?;
                index += 1;
            }
            return Ok(accumulator);
        }

        let mut mapped = Vec::new();
        for index in 0..len {
            let Some(element) = element_at(&*self, index) else {
                break;
            };
            let result = self.call_value(
                &callback,
                this_arg.clone(),
                vec![element.clone(), Value::from(index), this.clone()],
            )?;
            match builtin {
                Builtin::ArrayMap => mapped.push(result),
                Builtin::ArrayFilter if result.truthy() => mapped.push(element),
                Builtin::ArrayFind if result.truthy() => return Ok(element),
                Builtin::ArraySome if result.truthy() => return Ok(Value::Boolean(true)),
                Builtin::ArrayEvery if !result.truthy() => return Ok(Value::Boolean(false)),
                _ => {}
            }
        }
        match builtin {
            Builtin::ArrayMap | Builtin::ArrayFilter => Ok(self.new_array(mapped)),
            Builtin::ArraySome => Ok(Value::Boolean(false)),
            Builtin::ArrayEvery => Ok(Value::Boolean(true)),
            _ => Ok(Value::Undefined),
        }
    }

    fn string_method(&mut self, builtin: Builtin, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        if this.is_nullish() {
            return Err(self.throw(
                ErrorKind::TypeError,
                format!("String.prototype.{} called on null or undefined", builtin.name()),
            ));
        }
        let text = self.to_string(&this);
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let string_arg = |interp: &Self, index: usize| match args.get(index) {
            None => "undefined".to_string(),
            Some(value) => interp.to_string(value),
        };
        match builtin {
            Builtin::StringSlice => {
                let start = self.index_arg(&args, 0, len, 0)?;
                let end = self.index_arg(&args, 1, len, len)?;
                Ok(Value::String(if start < end {
                    chars[start..end].iter().collect()
                } else {
                    String::new()
                }))
            }
            Builtin::StringSubstring => {
                let clamp = |n: f64| if n.is_nan() { 0 } else { n.trunc().clamp(0.0, len as f64) as usize };
                let start = match args.first() {
                    None | Some(Value::Undefined) => 0,
                    Some(value) => clamp(self.to_number(value)?),
                };
                let end = match args.get(1) {
                    None | Some(Value::Undefined) => len,
                    Some(value) => clamp(self.to_number(value)?),
                };
                let (from, to) = if start <= end { (start, end) } else { (end, start) };
                Ok(Value::String(chars[from..to].iter().collect()))
            }
            Builtin::StringIndexOf | Builtin::StringIncludes => {
                let needle: Vec<char> = string_arg(&*self, 0).chars().collect();
                let from = match args.get(1) {
                    None | Some(Value::Undefined) => 0,
                    Some(value) => {
                        let n = self.to_number(value)?;
                        if n.is_nan() { 0 } else { n.trunc().clamp(0.0, len as f64) as usize }
                    }
                };
                let found = find_chars(&chars, &needle, from);
                if builtin == Builtin::StringIncludes {
                    Ok(Value::Boolean(found.is_some()))
                } else {
                    Ok(Value::Number(found.map_or(-1.0, |i| i as f64)))
                }
            }
            Builtin::StringStartsWith => {
                let needle: Vec<char> = string_arg(&*self, 0).chars().collect();
                let start = match args.get(1) {
                    None | Some(Value::Undefined) => 0,
                    Some(value) => (self.to_number(value)?.max(0.0) as usize).min(len),
                };
                Ok(Value::Boolean(chars[start..].starts_with(&needle)))
            }
            Builtin::StringEndsWith => {
                let needle: Vec<char> = string_arg(&*self, 0).chars().collect();
                let end = match args.get(1) {
                    None | Some(Value::Undefined) => len,
                    Some(value) => (self.to_number(value)?.max(0.0) as usize).min(len),
                };
                Ok(Value::Boolean(chars[..end].ends_with(&needle)))
            }
            Builtin::StringToUpperCase => Ok(Value::String(text.to_uppercase())),
            Builtin::StringToLowerCase => Ok(Value::String(text.to_lowercase())),
            Builtin::StringTrim => Ok(Value::String(text.trim().to_string())),
            Builtin::StringCharAt => {
                let index = match args.first() {
                    None | Some(Value::Undefined) => 0.0,
                    Some(value) => self.to_number(value)?.trunc(),
                };
                let c = if index >= 0.0 { chars.get(index as usize) } else { None };
                Ok(Value::String(c.map(|c| c.to_string()).unwrap_or_default()))
            }
            Builtin::StringSplit => {
                let limit = match args.get(1) {
                    None | Some(Value::Undefined) => usize::MAX,
                    Some(value) => to_int32(self.to_number(value)?) as u32 as usize,
                };
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::String(text.clone())],
                    Some(separator) => {
                        let separator = self.to_string(separator);
                        if separator.is_empty() {
                            chars.iter().map(|c| Value::String(c.to_string())).collect()
                        } else {
                            text.split(separator.as_str()).map(Value::string).collect()
                        }
                    }
                };
                Ok(self.new_array(parts.into_iter().take(limit).collect()))
            }
            _ => Err(RuntimeError::internal(format!("unhandled builtin {}", builtin.name()))),
        }
    }
}
