// Binding analysis for the instrumenter
use crate::ast::*;
use crate::{HOOKS_NAME, INTERNAL_PREFIX};

/// Internal temporaries are never reported as roots
pub fn is_internal(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}

fn push_local(out: &mut Vec<String>, name: &str) {
    if !is_internal(name) && !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

/// Parameters and every name declared in a function body, excluding nested functions
pub fn function_locals(func: &Function) -> Vec<String> {
    let mut out = Vec::new();
    for param in &func.params {
        push_local(&mut out, &param.name);
    }
    if let FunctionBody::Block(stmts) = &func.body {
        collect_declared(stmts, &mut out);
    }
    out
}

fn collect_declared(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_stmt(stmt, out);
    }
}

fn collect_stmt(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::VarDecl { decls, .. } => {
            for decl in decls {
                push_local(out, &decl.name);
            }
        }
        StmtKind::FunctionDecl(func) => {
            if let Some(name) = &func.name {
                push_local(out, name);
            }
        }
        StmtKind::ClassDecl(class) => push_local(out, &class.name),
        StmtKind::Block(stmts) => collect_declared(stmts, out),
        StmtKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_stmt(consequent, out);
            if let Some(alternate) = alternate {
                collect_stmt(alternate, out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_stmt(body, out),
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::VarDecl { decls, .. }) = init {
                for decl in decls {
                    push_local(out, &decl.name);
                }
            }
            collect_stmt(body, out);
        }
        StmtKind::ForIn { binding, body, .. } | StmtKind::ForOf { binding, body, .. } => {
            if binding.kind.is_some() {
                push_local(out, &binding.name);
            }
            collect_stmt(body, out);
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            collect_declared(block, out);
            if let Some(handler) = handler {
                if let Some(param) = &handler.param {
                    push_local(out, param);
                }
                collect_declared(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_declared(finalizer, out);
            }
        }
        _ => {}
    }
}

/// Identifiers a program already uses that generated names must stay clear of
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameScan {
    /// First place the hooks parameter name is bound or referenced
    pub reserved: Option<Pos>,
    /// Highest `n` among user names shaped like a temporary (`__tr_<kind><n>`)
    pub temp_floor: usize,
}

pub fn scan_names(program: &Program) -> NameScan {
    let mut scan = NameScan::default();
    scan.stmts(&program.body);
    scan
}

/// The counter of a name shaped like a generated temporary
pub fn temp_number(name: &str) -> Option<usize> {
    let rest = name.strip_prefix(INTERNAL_PREFIX)?.strip_prefix('_')?;
    let mut chars = rest.chars();
    if !chars.next()?.is_ascii_alphabetic() {
        return None;
    }
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl NameScan {
    fn check(&mut self, name: &str, pos: Pos) {
        if self.reserved.is_none() && name == HOOKS_NAME {
            self.reserved = Some(pos);
        }
        if let Some(n) = temp_number(name) {
            self.temp_floor = self.temp_floor.max(n);
        }
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        if self.reserved.is_some() {
            return;
        }
        match &stmt.kind {
            StmtKind::VarDecl { decls, .. } => self.declarators(decls),
            StmtKind::FunctionDecl(func) => self.function(func),
            StmtKind::ClassDecl(class) => self.class(class),
            StmtKind::Expr(expr) | StmtKind::Throw(expr) => self.expr(expr),
            StmtKind::Block(stmts) => self.stmts(stmts),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.stmt(consequent);
                if let Some(alternate) = alternate {
                    self.stmt(alternate);
                }
            }
            StmtKind::While { test, body } | StmtKind::DoWhile { body, test } => {
                self.expr(test);
                self.stmt(body);
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::VarDecl { decls, .. }) => self.declarators(decls),
                    Some(ForInit::Expr(expr)) => self.expr(expr),
                    None => {}
                }
                for expr in [test, update].into_iter().flatten() {
                    self.expr(expr);
                }
                self.stmt(body);
            }
            StmtKind::ForIn {
                binding,
                object: source,
                body,
            }
            | StmtKind::ForOf {
                binding,
                iterable: source,
                body,
            } => {
                self.check(&binding.name, binding.pos);
                self.expr(source);
                self.stmt(body);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.stmts(block);
                if let Some(handler) = handler {
                    if let Some(param) = &handler.param {
                        self.check(param, handler.param_pos);
                    }
                    self.stmts(&handler.body);
                }
                if let Some(finalizer) = finalizer {
                    self.stmts(finalizer);
                }
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
        }
    }

    fn declarators(&mut self, decls: &[Declarator]) {
        for decl in decls {
            self.check(&decl.name, decl.pos);
            if let Some(init) = &decl.init {
                self.expr(init);
            }
        }
    }

    fn function(&mut self, func: &Function) {
        if let Some(name) = &func.name {
            self.check(name, func.pos);
        }
        for param in &func.params {
            self.check(&param.name, param.pos);
            if let Some(default) = &param.default {
                self.expr(default);
            }
        }
        match &func.body {
            FunctionBody::Block(stmts) => self.stmts(stmts),
            FunctionBody::Expr(expr) => self.expr(expr),
        }
    }

    fn class(&mut self, class: &Class) {
        self.check(&class.name, class.pos);
        if let Some(parent) = &class.parent {
            self.expr(parent);
        }
        if let Some(ctor) = &class.constructor {
            self.function(ctor);
        }
        for method in &class.methods {
            self.function(&method.function);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        if self.reserved.is_some() {
            return;
        }
        match &expr.kind {
            ExprKind::Identifier(name) => self.check(name, expr.pos),
            ExprKind::Array(items) | ExprKind::Sequence(items) | ExprKind::SuperCall(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            ExprKind::Object(props) => {
                for prop in props {
                    if let PropKey::Computed(key) = &prop.key {
                        self.expr(key);
                    }
                    self.expr(&prop.value);
                }
            }
            ExprKind::Function(func) => self.function(func),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Update { target, .. } => self.expr(target),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
            }
            ExprKind::Member { object, property } => {
                self.expr(object);
                if let MemberProp::Computed(key) = property {
                    self.expr(key);
                }
            }
            ExprKind::Number(_)
            | ExprKind::BigInt(_)
            | ExprKind::String(_)
            | ExprKind::Boolean(_)
            | ExprKind::Null
            | ExprKind::This
            | ExprKind::SuperMember(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn locals_of(source: &str) -> Vec<String> {
        let program = parse_program(source).unwrap();
        match &program.body[0].kind {
            StmtKind::FunctionDecl(func) => function_locals(func),
            other => panic!("expected a function declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_function_locals_cover_nested_blocks() {
        let locals = locals_of(
            r#"
function f(a, b) {
  var v = 1;
  if (a) { let inner = 2; }
  for (const x of b) {}
  try {} catch (e) {}
  function g() { let hidden = 1; }
  class K {}
}
"#,
        );
        assert_eq!(locals, vec!["a", "b", "v", "inner", "x", "e", "g", "K"]);
    }

    #[test]
    fn test_internal_names_are_not_locals() {
        assert_eq!(locals_of("function f(__tr_x, y) { let __tr_t = 1; }"), vec!["y"]);
    }

    #[test]
    fn test_reserved_name_detection() {
        let program = parse_program("let a = 1;\nfunction f(__tr) {}").unwrap();
        assert_eq!(scan_names(&program).reserved, Some(Pos::new(2, 12)));
        let program = parse_program("__tr.step(1)").unwrap();
        assert!(scan_names(&program).reserved.is_some());
        let program = parse_program("let __tr_ok = 1; __tr_ok + 1").unwrap();
        assert_eq!(scan_names(&program).reserved, None);
    }

    #[test]
    fn test_temp_floor_covers_user_names() {
        let program = parse_program("var __tr_o7 = 1;\nfunction f(__tr_k12) { return __tr_x + __tr_o; }").unwrap();
        let scan = scan_names(&program);
        assert_eq!(scan.reserved, None);
        assert_eq!(scan.temp_floor, 12);
        assert_eq!(temp_number("__tr_r3"), Some(3));
        assert_eq!(temp_number("__tr_o"), None);
        assert_eq!(temp_number("__tr_ok1x"), None);
        assert_eq!(temp_number("tr_o1"), None);
    }
}
