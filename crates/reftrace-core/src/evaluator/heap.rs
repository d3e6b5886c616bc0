// Arena heap of script objects
use std::rc::Rc;

use indexmap::IndexMap;

use super::errors::ErrorKind;
use super::scope::{Env, Frame};
use super::value::{array_index, ObjectHandle, Value};
use crate::ast::{Class, Function};
use crate::hooks::Hook;

/// A user-defined function or method
#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<Function>,
    pub env: Env,
    /// Captured `this`/`super` context; only arrows carry one
    pub frame: Option<Rc<Frame>>,
    pub home: Option<ObjectHandle>,
    pub class_ctor: Option<ObjectHandle>,
    /// Methods and arrows cannot be used with `new`
    pub constructible: bool,
}

#[derive(Debug, Clone)]
pub struct ClassData {
    pub def: Rc<Class>,
    pub env: Env,
    pub parent: Option<ObjectHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFn {
    Builtin(Builtin),
    Hook(Hook),
}

/// Natively implemented library functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ConsoleLog,
    IsNaN,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ObjectCtor,
    ArrayCtor,
    ErrorCtor(ErrorKind),
    // Math
    MathFloor,
    MathCeil,
    MathRound,
    MathAbs,
    MathMax,
    MathMin,
    MathSqrt,
    MathPow,
    MathTrunc,
    MathSign,
    // Object statics
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ArrayIsArray,
    // Object.prototype
    ObjectToString,
    HasOwnProperty,
    ErrorToString,
    // Array.prototype
    ArrayPush,
    ArrayPop,
    ArrayShift,
    ArrayUnshift,
    ArraySlice,
    ArraySplice,
    ArrayIndexOf,
    ArrayIncludes,
    ArrayJoin,
    ArrayConcat,
    ArrayReverse,
    ArrayMap,
    ArrayFilter,
    ArrayForEach,
    ArrayReduce,
    ArrayFind,
    ArraySome,
    ArrayEvery,
    // String.prototype
    StringSlice,
    StringSubstring,
    StringIndexOf,
    StringIncludes,
    StringToUpperCase,
    StringToLowerCase,
    StringSplit,
    StringTrim,
    StringCharAt,
    StringStartsWith,
    StringEndsWith,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::ConsoleLog => "log",
            Builtin::IsNaN => "isNaN",
            Builtin::StringCtor => "String",
            Builtin::NumberCtor => "Number",
            Builtin::BooleanCtor => "Boolean",
            Builtin::ObjectCtor => "Object",
            Builtin::ArrayCtor => "Array",
            Builtin::ErrorCtor(kind) => kind.name(),
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathRound => "round",
            Builtin::MathAbs => "abs",
            Builtin::MathMax => "max",
            Builtin::MathMin => "min",
            Builtin::MathSqrt => "sqrt",
            Builtin::MathPow => "pow",
            Builtin::MathTrunc => "trunc",
            Builtin::MathSign => "sign",
            Builtin::ObjectKeys => "keys",
            Builtin::ObjectValues => "values",
            Builtin::ObjectEntries => "entries",
            Builtin::ObjectAssign => "assign",
            Builtin::ArrayIsArray => "isArray",
            Builtin::ObjectToString | Builtin::ErrorToString => "toString",
            Builtin::HasOwnProperty => "hasOwnProperty",
            Builtin::ArrayPush => "push",
            Builtin::ArrayPop => "pop",
            Builtin::ArrayShift => "shift",
            Builtin::ArrayUnshift => "unshift",
            Builtin::ArraySlice | Builtin::StringSlice => "slice",
            Builtin::ArraySplice => "splice",
            Builtin::ArrayIndexOf | Builtin::StringIndexOf => "indexOf",
            Builtin::ArrayIncludes | Builtin::StringIncludes => "includes",
            Builtin::ArrayJoin => "join",
            Builtin::ArrayConcat => "concat",
            Builtin::ArrayReverse => "reverse",
            Builtin::ArrayMap => "map",
            Builtin::ArrayFilter => "filter",
            Builtin::ArrayForEach => "forEach",
            Builtin::ArrayReduce => "reduce",
            Builtin::ArrayFind => "find",
            Builtin::ArraySome => "some",
            Builtin::ArrayEvery => "every",
            Builtin::StringSubstring => "substring",
            Builtin::StringToUpperCase => "toUpperCase",
            Builtin::StringToLowerCase => "toLowerCase",
            Builtin::StringSplit => "split",
            Builtin::StringTrim => "trim",
            Builtin::StringCharAt => "charAt",
            Builtin::StringStartsWith => "startsWith",
            Builtin::StringEndsWith => "endsWith",
        }
    }

    /// Value reported by the function's `length` property
    pub fn arity(&self) -> usize {
        match self {
            Builtin::MathPow | Builtin::ArraySplice | Builtin::ObjectAssign | Builtin::StringSlice
            | Builtin::ArraySlice | Builtin::StringSubstring | Builtin::StringSplit => 2,
            Builtin::ConsoleLog
            | Builtin::StringTrim
            | Builtin::StringToUpperCase
            | Builtin::StringToLowerCase
            | Builtin::ArrayPop
            | Builtin::ArrayShift
            | Builtin::ArrayReverse
            | Builtin::ObjectToString
            | Builtin::ErrorToString => 0,
            _ => 1,
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(
            self,
            Builtin::StringCtor
                | Builtin::NumberCtor
                | Builtin::BooleanCtor
                | Builtin::ObjectCtor
                | Builtin::ArrayCtor
                | Builtin::ErrorCtor(_)
        )
    }
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Closure(Closure),
    Class(ClassData),
    Native(NativeFn),
}

impl ObjectKind {
    pub fn is_callable(&self) -> bool {
        matches!(self, ObjectKind::Closure(_) | ObjectKind::Class(_) | ObjectKind::Native(_))
    }
}

#[derive(Debug, Clone)]
pub struct JsObject {
    pub kind: ObjectKind,
    /// Enumerable own properties in insertion order
    pub props: IndexMap<String, Value>,
    /// Non-enumerable own properties (methods, `prototype`, `constructor`, ...)
    pub hidden: IndexMap<String, Value>,
    pub proto: Option<ObjectHandle>,
    pub class_name: Option<String>,
}

impl JsObject {
    pub fn new(kind: ObjectKind, proto: Option<ObjectHandle>) -> Self {
        Self {
            kind,
            props: IndexMap::new(),
            hidden: IndexMap::new(),
            proto,
            class_name: None,
        }
    }

    pub fn with_class_name(mut self, class_name: Option<String>) -> Self {
        self.class_name = class_name;
        self
    }

    /// Own property lookup, including virtual `length`/`name` and array elements
    pub fn get_own(&self, key: &str) -> Option<Value> {
        if let ObjectKind::Array(elements) = &self.kind {
            if key == "length" {
                return Some(Value::from(elements.len()));
            }
            if let Some(index) = array_index(key) {
                return elements.get(index).cloned();
            }
        }
        if let Some(value) = self.props.get(key).or_else(|| self.hidden.get(key)) {
            return Some(value.clone());
        }
        match (&self.kind, key) {
            (ObjectKind::Closure(closure), "length") => Some(Value::from(
                closure
                    .func
                    .params
                    .iter()
                    .take_while(|p| p.default.is_none())
                    .count(),
            )),
            (ObjectKind::Closure(closure), "name") => {
                Some(Value::string(closure.func.name.clone().unwrap_or_default()))
            }
            (ObjectKind::Class(class), "name") => Some(Value::string(class.def.name.clone())),
            (ObjectKind::Class(class), "length") => Some(Value::from(
                class.def.constructor.as_ref().map_or(0, |c| c.params.len()),
            )),
            (ObjectKind::Native(NativeFn::Builtin(builtin)), "name") => Some(Value::string(builtin.name())),
            (ObjectKind::Native(NativeFn::Builtin(builtin)), "length") => Some(Value::from(builtin.arity())),
            (ObjectKind::Native(NativeFn::Hook(hook)), "name") => Some(Value::string(hook.method_name())),
            _ => None,
        }
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.get_own(key).is_some()
    }

    /// Enumerable own entries: array elements first, then named properties
    pub fn own_entries(&self) -> Vec<(String, Value)> {
        let mut entries = Vec::new();
        if let ObjectKind::Array(elements) = &self.kind {
            entries.extend(
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone())),
            );
        }
        entries.extend(self.props.iter().map(|(k, v)| (k.clone(), v.clone())));
        entries
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.own_entries().into_iter().map(|(k, _)| k).collect()
    }
}

/// Arena of objects; a handle indexes its slot for the life of the heap
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, object: JsObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(object);
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> &JsObject {
        &self.objects[handle.0 as usize]
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> &mut JsObject {
        &mut self.objects[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_callable(&self, value: &Value) -> bool {
        match value {
            Value::Object(handle) => self.get(*handle).kind.is_callable(),
            _ => false,
        }
    }

    pub fn is_array(&self, value: &Value) -> bool {
        match value {
            Value::Object(handle) => matches!(self.get(*handle).kind, ObjectKind::Array(_)),
            _ => false,
        }
    }

    /// Look `key` up along the prototype chain starting at `handle`
    pub fn lookup(&self, handle: ObjectHandle, key: &str) -> Option<Value> {
        let mut current = Some(handle);
        while let Some(h) = current {
            let object = self.get(h);
            if let Some(value) = object.get_own(key) {
                return Some(value);
            }
            current = object.proto;
        }
        None
    }

    /// Elements of an array object; empty for anything else
    pub fn array_elements(&self, value: &Value) -> Vec<Value> {
        match value {
            Value::Object(handle) => match &self.get(*handle).kind {
                ObjectKind::Array(elements) => elements.clone(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}
