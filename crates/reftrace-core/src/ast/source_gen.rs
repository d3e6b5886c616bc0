// Source code generation from AST
// The instrumenter hands its rewritten tree to this module to produce the
// instrumented program text, so every construct it prints must parse back
// to the same tree.

use super::*;

const INDENT: &str = "  ";

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        expr_source(self, 0)
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        let mut out = String::new();
        write_stmt(&mut out, self, 0);
        out
    }
}

impl ToSource for Program {
    fn to_source(&self) -> String {
        let mut out = String::new();
        for stmt in &self.body {
            write_stmt(&mut out, stmt, 0);
        }
        out
    }
}

/// Escape a string for a double-quoted literal
pub fn escape_string(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Whether `name` can be printed bare as an identifier or property key
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else {
        format!("{n}")
    }
}

fn is_primary(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number(n) => n.is_finite() && !n.is_sign_negative(),
        ExprKind::BigInt(n) => *n >= 0,
        ExprKind::String(_)
        | ExprKind::Boolean(_)
        | ExprKind::Null
        | ExprKind::Identifier(_)
        | ExprKind::This
        | ExprKind::Array(_)
        | ExprKind::Object(_)
        | ExprKind::Member { .. }
        | ExprKind::Call { .. }
        | ExprKind::SuperCall(_)
        | ExprKind::SuperMember(_) => true,
        _ => false,
    }
}

/// Print a sub-expression, parenthesized unless it is a primary expression
fn operand(expr: &Expr, indent: usize) -> String {
    if is_primary(expr) {
        expr_source(expr, indent)
    } else {
        format!("({})", expr_source(expr, indent))
    }
}

fn args_source(args: &[Expr], indent: usize) -> String {
    args.iter()
        .map(|arg| match arg.kind {
            ExprKind::Sequence(_) => format!("({})", expr_source(arg, indent)),
            _ => expr_source(arg, indent),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_source(key: &PropKey, indent: usize) -> String {
    match key {
        PropKey::Named(name) if is_identifier_name(name) => name.clone(),
        PropKey::Named(name) => format!("\"{}\"", escape_string(name)),
        PropKey::Computed(expr) => format!("[{}]", expr_source(expr, indent)),
    }
}

fn params_source(params: &[Param], indent: usize) -> String {
    params
        .iter()
        .map(|p| match &p.default {
            Some(default) => format!("{} = {}", p.name, operand(default, indent)),
            None => p.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn block_source(stmts: &[Stmt], indent: usize) -> String {
    if stmts.is_empty() {
        return "{}".to_string();
    }
    let mut out = String::from("{\n");
    for stmt in stmts {
        write_stmt(&mut out, stmt, indent + 1);
    }
    out.push_str(&INDENT.repeat(indent));
    out.push('}');
    out
}

fn function_source(func: &Function, indent: usize) -> String {
    let params = params_source(&func.params, indent);
    if func.is_arrow {
        let body = match &func.body {
            FunctionBody::Expr(expr) => match expr.kind {
                ExprKind::Object(_) | ExprKind::Sequence(_) => {
                    format!("({})", expr_source(expr, indent))
                }
                _ => expr_source(expr, indent),
            },
            FunctionBody::Block(stmts) => block_source(stmts, indent),
        };
        return format!("({params}) => {body}");
    }
    let body = match &func.body {
        FunctionBody::Block(stmts) => block_source(stmts, indent),
        FunctionBody::Expr(expr) => format!("{{ return {}; }}", expr_source(expr, indent)),
    };
    match &func.name {
        Some(name) => format!("function {name}({params}) {body}"),
        None => format!("function ({params}) {body}"),
    }
}

fn method_source(name: &str, func: &Function, indent: usize) -> String {
    let params = params_source(&func.params, indent);
    let body = match &func.body {
        FunctionBody::Block(stmts) => block_source(stmts, indent),
        FunctionBody::Expr(expr) => format!("{{ return {}; }}", expr_source(expr, indent)),
    };
    format!("{name}({params}) {body}")
}

fn class_source(class: &Class, indent: usize) -> String {
    let mut out = format!("class {}", class.name);
    if let Some(parent) = &class.parent {
        out.push_str(&format!(" extends {}", operand(parent, indent)));
    }
    out.push_str(" {\n");
    let inner = INDENT.repeat(indent + 1);
    if let Some(ctor) = &class.constructor {
        out.push_str(&inner);
        out.push_str(&method_source("constructor", ctor, indent + 1));
        out.push('\n');
    }
    for method in &class.methods {
        out.push_str(&inner);
        if method.is_static {
            out.push_str("static ");
        }
        out.push_str(&method_source(&method.name, &method.function, indent + 1));
        out.push('\n');
    }
    out.push_str(&INDENT.repeat(indent));
    out.push('}');
    out
}

fn expr_source(expr: &Expr, indent: usize) -> String {
    match &expr.kind {
        // Literals
        ExprKind::Number(n) => format_number(*n),
        ExprKind::BigInt(n) => format!("{n}n"),
        ExprKind::String(s) => format!("\"{}\"", escape_string(s)),
        ExprKind::Boolean(b) => b.to_string(),
        ExprKind::Null => "null".to_string(),

        ExprKind::Identifier(name) => name.clone(),
        ExprKind::This => "this".to_string(),

        ExprKind::Array(elements) => format!("[{}]", args_source(elements, indent)),
        ExprKind::Object(props) => {
            if props.is_empty() {
                return "{}".to_string();
            }
            let entries = props
                .iter()
                .map(|prop| match (&prop.value.kind, prop.method) {
                    (ExprKind::Function(func), true) => {
                        method_source(&key_source(&prop.key, indent), func, indent)
                    }
                    _ => format!(
                        "{}: {}",
                        key_source(&prop.key, indent),
                        match prop.value.kind {
                            ExprKind::Sequence(_) => format!("({})", expr_source(&prop.value, indent)),
                            _ => expr_source(&prop.value, indent),
                        }
                    ),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{entries}}}")
        }

        ExprKind::Function(func) => function_source(func, indent),

        ExprKind::Unary { op, operand: inner } => {
            let inner = operand(inner, indent);
            match op {
                UnaryOp::Minus => format!("-{inner}"),
                UnaryOp::Plus => format!("+{inner}"),
                UnaryOp::Not => format!("!{inner}"),
                UnaryOp::BitNot => format!("~{inner}"),
                UnaryOp::Typeof => format!("typeof {inner}"),
                UnaryOp::Void => format!("void {inner}"),
                UnaryOp::Delete => format!("delete {inner}"),
            }
        }
        ExprKind::Update { op, prefix, target } => {
            let symbol = match op {
                UpdateOp::Increment => "++",
                UpdateOp::Decrement => "--",
            };
            let target = operand(target, indent);
            if *prefix {
                format!("{symbol}{target}")
            } else {
                format!("{target}{symbol}")
            }
        }
        ExprKind::Binary { op, left, right } => format!(
            "{} {} {}",
            operand(left, indent),
            op.symbol(),
            operand(right, indent)
        ),
        ExprKind::Logical { op, left, right } => format!(
            "{} {} {}",
            operand(left, indent),
            op.symbol(),
            operand(right, indent)
        ),
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => format!(
            "{} ? {} : {}",
            operand(test, indent),
            operand(consequent, indent),
            operand(alternate, indent)
        ),
        ExprKind::Assign { op, target, value } => format!(
            "{} {} {}",
            operand(target, indent),
            op.symbol(),
            operand(value, indent)
        ),
        ExprKind::Sequence(exprs) => exprs
            .iter()
            .map(|e| operand(e, indent))
            .collect::<Vec<_>>()
            .join(", "),

        ExprKind::Call { callee, args } => {
            format!("{}({})", operand(callee, indent), args_source(args, indent))
        }
        ExprKind::New { callee, args } => {
            let callee = match callee.kind {
                ExprKind::Identifier(_) => expr_source(callee, indent),
                _ => format!("({})", expr_source(callee, indent)),
            };
            format!("new {callee}({})", args_source(args, indent))
        }
        ExprKind::Member { object, property } => {
            let object = match object.kind {
                ExprKind::Object(_) | ExprKind::Number(_) => {
                    format!("({})", expr_source(object, indent))
                }
                _ => operand(object, indent),
            };
            match property {
                MemberProp::Named(name) => format!("{object}.{name}"),
                MemberProp::Computed(key) => format!("{object}[{}]", expr_source(key, indent)),
            }
        }
        ExprKind::SuperCall(args) => format!("super({})", args_source(args, indent)),
        ExprKind::SuperMember(name) => format!("super.{name}"),
    }
}

fn declarators_source(kind: VarKind, decls: &[Declarator], indent: usize) -> String {
    let decls = decls
        .iter()
        .map(|d| match &d.init {
            Some(init) => match init.kind {
                ExprKind::Sequence(_) => format!("{} = ({})", d.name, expr_source(init, indent)),
                _ => format!("{} = {}", d.name, expr_source(init, indent)),
            },
            None => d.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} {decls}", kind.keyword())
}

fn for_binding_source(binding: &ForBinding) -> String {
    match binding.kind {
        Some(kind) => format!("{} {}", kind.keyword(), binding.name),
        None => binding.name.clone(),
    }
}

/// Bodies of control statements are always printed as blocks
fn body_source(stmt: &Stmt, indent: usize) -> String {
    match &stmt.kind {
        StmtKind::Block(stmts) => block_source(stmts, indent),
        _ => block_source(std::slice::from_ref(stmt), indent),
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    let pad = INDENT.repeat(indent);
    out.push_str(&pad);
    match &stmt.kind {
        StmtKind::VarDecl { kind, decls } => {
            out.push_str(&declarators_source(*kind, decls, indent));
            out.push(';');
        }
        StmtKind::FunctionDecl(func) => out.push_str(&function_source(func, indent)),
        StmtKind::ClassDecl(class) => out.push_str(&class_source(class, indent)),
        StmtKind::Expr(expr) => {
            let needs_parens = match &expr.kind {
                ExprKind::Object(_) => true,
                ExprKind::Function(func) => !func.is_arrow,
                _ => false,
            };
            if needs_parens {
                out.push_str(&format!("({});", expr_source(expr, indent)));
            } else {
                out.push_str(&format!("{};", expr_source(expr, indent)));
            }
        }
        StmtKind::Block(stmts) => out.push_str(&block_source(stmts, indent)),
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            out.push_str(&format!(
                "if ({}) {}",
                expr_source(test, indent),
                body_source(consequent, indent)
            ));
            if let Some(alternate) = alternate {
                out.push_str(" else ");
                match alternate.kind {
                    StmtKind::If { .. } => {
                        let mut nested = String::new();
                        write_stmt(&mut nested, alternate, indent);
                        out.push_str(nested.trim_start().trim_end_matches('\n'));
                    }
                    _ => out.push_str(&body_source(alternate, indent)),
                }
            }
        }
        StmtKind::While { test, body } => out.push_str(&format!(
            "while ({}) {}",
            expr_source(test, indent),
            body_source(body, indent)
        )),
        StmtKind::DoWhile { body, test } => out.push_str(&format!(
            "do {} while ({});",
            body_source(body, indent),
            expr_source(test, indent)
        )),
        StmtKind::For {
            init,
            test,
            update,
            body,
        } => {
            let init = match init {
                Some(ForInit::VarDecl { kind, decls }) => declarators_source(*kind, decls, indent),
                Some(ForInit::Expr(expr)) => expr_source(expr, indent),
                None => String::new(),
            };
            let test = test
                .as_ref()
                .map(|e| expr_source(e, indent))
                .unwrap_or_default();
            let update = update
                .as_ref()
                .map(|e| expr_source(e, indent))
                .unwrap_or_default();
            out.push_str(&format!(
                "for ({init}; {test}; {update}) {}",
                body_source(body, indent)
            ));
        }
        StmtKind::ForIn {
            binding,
            object,
            body,
        } => out.push_str(&format!(
            "for ({} in {}) {}",
            for_binding_source(binding),
            expr_source(object, indent),
            body_source(body, indent)
        )),
        StmtKind::ForOf {
            binding,
            iterable,
            body,
        } => out.push_str(&format!(
            "for ({} of {}) {}",
            for_binding_source(binding),
            operand(iterable, indent),
            body_source(body, indent)
        )),
        StmtKind::Return(value) => match value {
            Some(value) => out.push_str(&format!("return {};", expr_source(value, indent))),
            None => out.push_str("return;"),
        },
        StmtKind::Break => out.push_str("break;"),
        StmtKind::Continue => out.push_str("continue;"),
        StmtKind::Throw(value) => out.push_str(&format!("throw {};", expr_source(value, indent))),
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            out.push_str(&format!("try {}", block_source(block, indent)));
            if let Some(handler) = handler {
                match &handler.param {
                    Some(param) => out.push_str(&format!(" catch ({param}) ")),
                    None => out.push_str(" catch "),
                }
                out.push_str(&block_source(&handler.body, indent));
            }
            if let Some(finalizer) = finalizer {
                out.push_str(&format!(" finally {}", block_source(finalizer, indent)));
            }
        }
        StmtKind::Empty => out.push(';'),
    }
    out.push('\n');
}
