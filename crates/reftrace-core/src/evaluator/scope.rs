// Lexical environments
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::value::{ObjectHandle, Value};
use crate::ast::{ForInit, Stmt, StmtKind, VarKind};

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
    /// False while a `let`/`const`/`class` binding is in its dead zone
    pub initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    Undeclared,
    Uninitialized,
    Immutable,
}

#[derive(Debug)]
struct ScopeData {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
    is_function: bool,
}

/// Shared handle to one scope; closures keep their defining scope alive
#[derive(Debug, Clone)]
pub struct Env(Rc<RefCell<ScopeData>>);

impl Env {
    pub fn new_root() -> Self {
        Self::with_parent(None, true)
    }

    pub fn new_function(parent: &Env) -> Self {
        Self::with_parent(Some(parent.clone()), true)
    }

    pub fn new_block(parent: &Env) -> Self {
        Self::with_parent(Some(parent.clone()), false)
    }

    fn with_parent(parent: Option<Env>, is_function: bool) -> Self {
        Env(Rc::new(RefCell::new(ScopeData {
            vars: HashMap::new(),
            parent,
            is_function,
        })))
    }

    /// Declare a binding in this scope; `None` leaves it uninitialized
    pub fn declare(&self, name: &str, value: Option<Value>, mutable: bool) {
        let binding = Binding {
            initialized: value.is_some(),
            value: value.unwrap_or(Value::Undefined),
            mutable,
        };
        self.0.borrow_mut().vars.insert(name.to_string(), binding);
    }

    /// Declare `name` unless this scope already has it; used for `var` hoisting
    pub fn declare_var(&self, name: &str) {
        let mut data = self.0.borrow_mut();
        data.vars.entry(name.to_string()).or_insert(Binding {
            value: Value::Undefined,
            mutable: true,
            initialized: true,
        });
    }

    /// Complete a lexical declaration in this scope
    pub fn initialize(&self, name: &str, value: Value) {
        let mut data = self.0.borrow_mut();
        match data.vars.get_mut(name) {
            Some(binding) => {
                binding.value = value;
                binding.initialized = true;
            }
            None => {
                data.vars.insert(
                    name.to_string(),
                    Binding {
                        value,
                        mutable: true,
                        initialized: true,
                    },
                );
            }
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.0.borrow().vars.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Value, LookupError> {
        let mut current = self.clone();
        loop {
            let next = {
                let data = current.0.borrow();
                if let Some(binding) = data.vars.get(name) {
                    if !binding.initialized {
                        return Err(LookupError::Uninitialized);
                    }
                    return Ok(binding.value.clone());
                }
                data.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(LookupError::Undeclared),
            }
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<(), LookupError> {
        let mut current = self.clone();
        loop {
            let next = {
                let mut data = current.0.borrow_mut();
                if let Some(binding) = data.vars.get_mut(name) {
                    if !binding.initialized {
                        return Err(LookupError::Uninitialized);
                    }
                    if !binding.mutable {
                        return Err(LookupError::Immutable);
                    }
                    binding.value = value;
                    return Ok(());
                }
                data.parent.clone()
            };
            match next {
                Some(parent) => current = parent,
                None => return Err(LookupError::Undeclared),
            }
        }
    }

    /// Nearest enclosing function (or root) scope
    pub fn function_scope(&self) -> Env {
        let mut current = self.clone();
        loop {
            let next = {
                let data = current.0.borrow();
                if data.is_function {
                    None
                } else {
                    data.parent.clone()
                }
            };
            match next {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Sibling scope holding copies of this scope's bindings
    ///
    /// `for (let ...)` loops give every iteration its own copy so that
    /// closures capture the value of that iteration.
    pub fn copy_for_iteration(&self) -> Env {
        let data = self.0.borrow();
        Env(Rc::new(RefCell::new(ScopeData {
            vars: data.vars.clone(),
            parent: data.parent.clone(),
            is_function: data.is_function,
        })))
    }
}

/// `this` and `super` context of one function activation
#[derive(Debug, Clone)]
pub struct Frame {
    pub this: Value,
    /// Object whose prototype `super.x` lookups start from
    pub home: Option<ObjectHandle>,
    /// Class whose constructor is running, for `super(...)`
    pub class_ctor: Option<ObjectHandle>,
}

impl Frame {
    pub fn top_level() -> Rc<Self> {
        Rc::new(Frame {
            this: Value::Undefined,
            home: None,
            class_ctor: None,
        })
    }
}

/// Names declared with `var` anywhere in `stmts`, not descending into functions
pub fn collect_var_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_stmt_vars(stmt, out);
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn collect_stmt_vars(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::VarDecl {
            kind: VarKind::Var,
            decls,
        } => {
            for decl in decls {
                push_unique(out, &decl.name);
            }
        }
        StmtKind::Block(stmts) => collect_var_names(stmts, out),
        StmtKind::If {
            consequent,
            alternate,
            ..
        } => {
            collect_stmt_vars(consequent, out);
            if let Some(alternate) = alternate {
                collect_stmt_vars(alternate, out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => collect_stmt_vars(body, out),
        StmtKind::For { init, body, .. } => {
            if let Some(ForInit::VarDecl {
                kind: VarKind::Var,
                decls,
            }) = init
            {
                for decl in decls {
                    push_unique(out, &decl.name);
                }
            }
            collect_stmt_vars(body, out);
        }
        StmtKind::ForIn { binding, body, .. } | StmtKind::ForOf { binding, body, .. } => {
            if binding.kind == Some(VarKind::Var) {
                push_unique(out, &binding.name);
            }
            collect_stmt_vars(body, out);
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        _ => {}
    }
}
