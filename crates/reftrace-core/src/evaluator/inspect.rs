// Human-readable rendering of values for console output and completions
use super::*;
use crate::ast::source_gen::is_identifier_name;

/// Nesting below this depth collapses to `[Object]` / `[Array]`
const MAX_INSPECT_DEPTH: usize = 2;

impl<H: HookHost> Interpreter<H> {
    /// Rendering used by `console.log`; top-level strings print raw
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => self.inspect(other),
        }
    }

    /// Inspection with quoted strings
    pub fn inspect(&self, value: &Value) -> String {
        let mut seen = Vec::new();
        self.inspect_inner(value, 0, &mut seen)
    }

    fn inspect_inner(&self, value: &Value, depth: usize, seen: &mut Vec<ObjectHandle>) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::BigInt(n) => format!("{n}n"),
            Value::String(s) => quote(s),
            Value::Object(handle) => {
                if seen.contains(handle) {
                    return "[Circular]".to_string();
                }
                seen.push(*handle);
                let rendered = self.inspect_object(*handle, depth, seen);
                seen.pop();
                rendered
            }
        }
    }

    fn inspect_object(&self, handle: ObjectHandle, depth: usize, seen: &mut Vec<ObjectHandle>) -> String {
        let object = self.heap.get(handle);
        match &object.kind {
            ObjectKind::Closure(_) | ObjectKind::Native(_) => {
                let name = match object.get_own("name") {
                    Some(Value::String(name)) if !name.is_empty() => format!("[Function: {name}]"),
                    _ => "[Function (anonymous)]".to_string(),
                };
                self.with_props(name, &object.props, depth, seen)
            }
            ObjectKind::Class(class) => {
                let parent = class
                    .parent
                    .and_then(|p| match self.heap.get(p).get_own("name") {
                        Some(Value::String(name)) if !name.is_empty() => Some(name),
                        _ => None,
                    });
                let head = match parent {
                    Some(parent) => format!("[class {} extends {parent}]", class.def.name),
                    None => format!("[class {}]", class.def.name),
                };
                self.with_props(head, &object.props, depth, seen)
            }
            ObjectKind::Array(elements) => {
                if elements.is_empty() && object.props.is_empty() {
                    return "[]".to_string();
                }
                if depth > MAX_INSPECT_DEPTH {
                    return "[Array]".to_string();
                }
                let mut parts: Vec<String> = elements
                    .iter()
                    .map(|element| self.inspect_inner(element, depth + 1, seen))
                    .collect();
                parts.extend(self.prop_parts(&object.props, depth, seen));
                format!("[ {} ]", parts.join(", "))
            }
            ObjectKind::Ordinary => {
                if self.is_error(handle) {
                    return self.error_to_string(handle);
                }
                let prefix = match &object.class_name {
                    Some(name) if name != "Object" => format!("{name} "),
                    _ => String::new(),
                };
                if object.props.is_empty() {
                    return format!("{prefix}{{}}");
                }
                if depth > MAX_INSPECT_DEPTH {
                    return match &object.class_name {
                        Some(name) if name != "Object" => format!("[{name}]"),
                        _ => "[Object]".to_string(),
                    };
                }
                let parts = self.prop_parts(&object.props, depth, seen);
                format!("{prefix}{{ {} }}", parts.join(", "))
            }
        }
    }

    fn with_props(
        &self,
        head: String,
        props: &indexmap::IndexMap<String, Value>,
        depth: usize,
        seen: &mut Vec<ObjectHandle>,
    ) -> String {
        if props.is_empty() || depth > MAX_INSPECT_DEPTH {
            return head;
        }
        let parts = self.prop_parts(props, depth, seen);
        format!("{head} {{ {} }}", parts.join(", "))
    }

    fn prop_parts(
        &self,
        props: &indexmap::IndexMap<String, Value>,
        depth: usize,
        seen: &mut Vec<ObjectHandle>,
    ) -> Vec<String> {
        props
            .iter()
            .map(|(key, value)| {
                let key = if is_identifier_name(key) { key.clone() } else { quote(key) };
                format!("{key}: {}", self.inspect_inner(value, depth + 1, seen))
            })
            .collect()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
