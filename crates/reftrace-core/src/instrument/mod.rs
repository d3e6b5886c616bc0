// Source-to-source instrumentation
// The rewritten program reports every heap write, binding change and call
// boundary to a hooks object passed in as the single parameter of a wrapper
// function. Hooks only observe: the program itself still performs every
// mutation, so a run without tracing computes the same results.

pub mod scope;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::ast::*;
use crate::hooks::Hook;
use crate::parser::{ParseError, Parser, ScriptParser, DEFAULT_MAX_DEPTH};
use crate::trace::checkpoint_id;
use crate::{HOOKS_NAME, INTERNAL_PREFIX};
use scope::{function_locals, is_internal, scan_names};

/// Name reported to `enter`/`exit` for functions without one
pub const ANONYMOUS: &str = "(anonymous)";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("{0}")]
    Parse(ParseError),

    #[error("unsupported syntax at {pos}: {message}")]
    Unsupported { message: String, pos: Pos },
}

impl InstrumentError {
    pub fn pos(&self) -> Pos {
        match self {
            InstrumentError::Parse(err) => err.pos(),
            InstrumentError::Unsupported { pos, .. } => *pos,
        }
    }
}

impl From<ParseError> for InstrumentError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Unsupported { message, pos } => InstrumentError::Unsupported { message, pos },
            other => InstrumentError::Parse(other),
        }
    }
}

/// Rewrites user programs into traced programs
#[derive(Debug, Clone)]
pub struct Instrumenter {
    max_depth: usize,
}

impl Default for Instrumenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrumenter {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Parse and rewrite `source`, returning the wrapper function's source text
    pub fn instrument(&self, source: &str) -> Result<String, InstrumentError> {
        let program = ScriptParser::with_max_depth(self.max_depth).parse_program(source)?;
        let output = self.instrument_program(program)?.to_source();
        debug!(input = source.len(), output = output.len(), "instrumented source");
        Ok(output)
    }

    /// Rewrite a parsed program into `(function (__tr) { ... })`
    pub fn instrument_program(&self, program: Program) -> Result<Program, InstrumentError> {
        let names = scan_names(&program);
        if let Some(pos) = names.reserved {
            return Err(InstrumentError::Unsupported {
                message: format!("`{HOOKS_NAME}` is reserved for the tracing runtime"),
                pos,
            });
        }

        let mut stmts = program.body;
        let completion = match stmts.last().map(|s| &s.kind) {
            Some(StmtKind::Expr(_)) => stmts.pop(),
            _ => None,
        };
        // Temporaries are numbered past any user name of the same shape
        let mut rewriter = Rewriter {
            temps: names.temp_floor,
        };
        let mut body = rewriter.block(stmts);
        // The wrapper returns what the plain program would complete with
        if let Some(Stmt {
            kind: StmtKind::Expr(expr),
            pos,
        }) = completion
        {
            body.push(Stmt::new(StmtKind::Return(Some(rewriter.expr(expr))), pos));
        }

        let origin = Pos::default();
        let wrapper = Function {
            name: None,
            params: vec![Param {
                name: HOOKS_NAME.to_string(),
                default: None,
                pos: origin,
            }],
            body: FunctionBody::Block(body),
            is_arrow: false,
            pos: origin,
            synthetic: true,
        };
        let expr = Expr::synthetic(ExprKind::Function(Rc::new(wrapper)), origin);
        Ok(Program::new(vec![Stmt::new(StmtKind::Expr(expr), origin)]))
    }
}

fn take<T: Clone>(rc: Rc<T>) -> T {
    Rc::try_unwrap(rc).unwrap_or_else(|shared| (*shared).clone())
}

fn ident(name: &str, pos: Pos) -> Expr {
    Expr::synthetic(ExprKind::Identifier(name.to_string()), pos)
}

fn string(value: &str, pos: Pos) -> Expr {
    Expr::synthetic(ExprKind::String(value.to_string()), pos)
}

fn checkpoint(pos: Pos) -> Expr {
    Expr::synthetic(ExprKind::String(checkpoint_id(pos.line, pos.col)), pos)
}

fn undefined(pos: Pos) -> Expr {
    Expr::synthetic(
        ExprKind::Unary {
            op: UnaryOp::Void,
            operand: Box::new(Expr::synthetic(ExprKind::Number(0.0), pos)),
        },
        pos,
    )
}

fn sequence(mut exprs: Vec<Expr>, pos: Pos) -> Expr {
    if exprs.len() == 1 {
        return exprs.remove(0);
    }
    Expr::synthetic(ExprKind::Sequence(exprs), pos)
}

fn member(object: &str, property: MemberProp, pos: Pos) -> Expr {
    Expr::synthetic(
        ExprKind::Member {
            object: Box::new(ident(object, pos)),
            property,
        },
        pos,
    )
}

fn computed(key: Expr) -> MemberProp {
    MemberProp::Computed(Box::new(key))
}

fn assign(op: AssignOp, target: Expr, value: Expr, pos: Pos) -> Expr {
    Expr::synthetic(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        pos,
    )
}

fn expr_stmt(expr: Expr) -> Stmt {
    let pos = expr.pos;
    Stmt::new(StmtKind::Expr(expr), pos)
}

fn hook_call(hook: Hook, args: Vec<Expr>, pos: Pos) -> Expr {
    let callee = member(HOOKS_NAME, MemberProp::Named(hook.method_name().to_string()), pos);
    Expr::synthetic(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        pos,
    )
}

fn step(value: Expr, pos: Pos) -> Expr {
    hook_call(Hook::Step, vec![checkpoint(pos), value], pos)
}

fn root_set(name: &str, value: Expr, pos: Pos) -> Expr {
    hook_call(Hook::RootSet, vec![string(name, pos), value, checkpoint(pos)], pos)
}

/// `((params) => body)(args)`; temporaries keep every operand evaluated exactly once
fn evaluator(params: Vec<String>, body: Expr, args: Vec<Expr>, pos: Pos) -> Expr {
    let func = Function {
        name: None,
        params: params
            .into_iter()
            .map(|name| Param {
                name,
                default: None,
                pos,
            })
            .collect(),
        body: FunctionBody::Expr(Box::new(body)),
        is_arrow: true,
        pos,
        synthetic: true,
    };
    Expr::synthetic(
        ExprKind::Call {
            callee: Box::new(Expr::synthetic(ExprKind::Function(Rc::new(func)), pos)),
            args,
        },
        pos,
    )
}

#[derive(Debug, Default)]
struct Rewriter {
    temps: usize,
}

impl Rewriter {
    fn temp(&mut self, kind: char) -> String {
        self.temps += 1;
        format!("{INTERNAL_PREFIX}_{kind}{}", self.temps)
    }

    // Statements

    fn block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(stmts.len());
        // Function declarations are bound from the start of their block
        for stmt in &stmts {
            if let StmtKind::FunctionDecl(func) = &stmt.kind {
                if let Some(name) = func.name.as_deref().filter(|n| !is_internal(n)) {
                    out.push(expr_stmt(step(root_set(name, ident(name, func.pos), func.pos), func.pos)));
                }
            }
        }
        for stmt in stmts {
            self.stmt_into(stmt, &mut out);
        }
        out
    }

    fn body(&mut self, stmt: Stmt) -> Box<Stmt> {
        let pos = stmt.pos;
        match stmt.kind {
            StmtKind::Block(stmts) => Box::new(Stmt::new(StmtKind::Block(self.block(stmts)), pos)),
            kind => {
                let mut out = self.block(vec![Stmt::new(kind, pos)]);
                if out.len() == 1 {
                    Box::new(out.remove(0))
                } else {
                    Box::new(Stmt::new(StmtKind::Block(out), pos))
                }
            }
        }
    }

    /// Loop body that first reports the freshly bound iteration variable
    fn binding_body(&mut self, binding: &ForBinding, body: Stmt) -> Box<Stmt> {
        let pos = body.pos;
        let mut stmts = match self.body(body).kind {
            StmtKind::Block(stmts) => stmts,
            other => vec![Stmt::new(other, pos)],
        };
        if !is_internal(&binding.name) {
            let report = root_set(&binding.name, ident(&binding.name, binding.pos), binding.pos);
            stmts.insert(0, expr_stmt(step(report, binding.pos)));
        }
        Box::new(Stmt::new(StmtKind::Block(stmts), pos))
    }

    fn stmt_into(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) {
        let pos = stmt.pos;
        let kind = match stmt.kind {
            StmtKind::VarDecl { kind, decls } => StmtKind::VarDecl {
                kind,
                decls: self.declarators(kind, decls),
            },
            StmtKind::FunctionDecl(func) => {
                let func = take(func);
                let name = func.name.clone().unwrap_or_else(|| ANONYMOUS.to_string());
                StmtKind::FunctionDecl(Rc::new(self.function(func, &name)))
            }
            StmtKind::ClassDecl(class) => {
                let class = self.class(take(class));
                let name = class.name.clone();
                let class_pos = class.pos;
                out.push(Stmt::new(StmtKind::ClassDecl(Rc::new(class)), pos));
                if !is_internal(&name) {
                    out.push(expr_stmt(step(root_set(&name, ident(&name, class_pos), class_pos), class_pos)));
                }
                return;
            }
            StmtKind::Expr(expr) => StmtKind::Expr(self.expr(expr)),
            StmtKind::Block(stmts) => StmtKind::Block(self.block(stmts)),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => StmtKind::If {
                test: self.expr(test),
                consequent: self.body(*consequent),
                alternate: alternate.map(|alt| self.body(*alt)),
            },
            StmtKind::While { test, body } => StmtKind::While {
                test: self.expr(test),
                body: self.body(*body),
            },
            StmtKind::DoWhile { body, test } => StmtKind::DoWhile {
                body: self.body(*body),
                test: self.expr(test),
            },
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => StmtKind::For {
                init: init.map(|init| match init {
                    ForInit::VarDecl { kind, decls } => ForInit::VarDecl {
                        kind,
                        decls: self.declarators(kind, decls),
                    },
                    ForInit::Expr(expr) => ForInit::Expr(self.expr(expr)),
                }),
                test: test.map(|e| self.expr(e)),
                update: update.map(|e| self.expr(e)),
                body: self.body(*body),
            },
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => StmtKind::ForIn {
                object: self.expr(object),
                body: self.binding_body(&binding, *body),
                binding,
            },
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => StmtKind::ForOf {
                iterable: self.expr(iterable),
                body: self.binding_body(&binding, *body),
                binding,
            },
            StmtKind::Return(value) => StmtKind::Return(value.map(|e| self.expr(e))),
            StmtKind::Throw(value) => StmtKind::Throw(self.expr(value)),
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => StmtKind::Try {
                block: self.block(block),
                handler: handler.map(|handler| self.catch_clause(handler)),
                finalizer: finalizer.map(|stmts| self.block(stmts)),
            },
            kind @ (StmtKind::Break | StmtKind::Continue | StmtKind::Empty) => kind,
        };
        out.push(Stmt::new(kind, pos));
    }

    fn catch_clause(&mut self, handler: CatchClause) -> CatchClause {
        let CatchClause {
            param,
            param_pos,
            body,
        } = handler;
        let mut stmts = Vec::with_capacity(body.len() + 1);
        if let Some(name) = param.as_deref().filter(|n| !is_internal(n)) {
            stmts.push(expr_stmt(step(root_set(name, ident(name, param_pos), param_pos), param_pos)));
        }
        stmts.extend(self.block(body));
        CatchClause {
            param,
            param_pos,
            body: stmts,
        }
    }

    fn declarators(&mut self, kind: VarKind, decls: Vec<Declarator>) -> Vec<Declarator> {
        decls
            .into_iter()
            .map(|decl| {
                let Declarator { name, init, pos } = decl;
                if is_internal(&name) {
                    let init = init.map(|e| self.expr(e));
                    return Declarator { name, init, pos };
                }
                let value = match init {
                    Some(init) => self.named_value(init, &name),
                    // A bare `var` may redeclare a live binding
                    None if kind == VarKind::Var => return Declarator { name, init: None, pos },
                    None => undefined(pos),
                };
                let init = Some(step(root_set(&name, value, pos), pos));
                Declarator { name, init, pos }
            })
            .collect()
    }

    // Functions and classes

    /// Wrap a function body in enter/exit reporting and root bookkeeping
    fn function(&mut self, func: Function, name: &str) -> Function {
        let locals = function_locals(&func);
        let Function {
            name: own_name,
            params,
            body,
            is_arrow,
            pos,
            synthetic,
        } = func;
        let params: Vec<Param> = params
            .into_iter()
            .map(|param| Param {
                default: param.default.map(|d| self.expr(d)),
                ..param
            })
            .collect();

        let mut inner = Vec::new();
        for param in params.iter().filter(|p| !is_internal(&p.name)) {
            inner.push(expr_stmt(root_set(&param.name, ident(&param.name, param.pos), param.pos)));
        }
        match body {
            FunctionBody::Block(stmts) => inner.extend(self.block(stmts)),
            FunctionBody::Expr(expr) => {
                let value = self.expr(*expr);
                inner.push(Stmt::new(StmtKind::Return(Some(value)), pos));
            }
        }

        let mut cleanup: Vec<Stmt> = locals
            .iter()
            .map(|local| expr_stmt(hook_call(Hook::RootDel, vec![string(local, pos), checkpoint(pos)], pos)))
            .collect();
        cleanup.push(expr_stmt(hook_call(
            Hook::Exit,
            vec![string(name, pos), checkpoint(pos)],
            pos,
        )));
        let body = vec![
            expr_stmt(hook_call(Hook::Enter, vec![string(name, pos), checkpoint(pos)], pos)),
            Stmt::new(
                StmtKind::Try {
                    block: inner,
                    handler: None,
                    finalizer: Some(cleanup),
                },
                pos,
            ),
        ];

        Function {
            name: own_name,
            params,
            body: FunctionBody::Block(body),
            is_arrow,
            pos,
            synthetic,
        }
    }

    fn class(&mut self, class: Class) -> Class {
        let Class {
            name,
            parent,
            constructor,
            methods,
            pos,
        } = class;
        let parent = parent.map(|p| self.expr(p));
        let constructor = constructor.map(|ctor| Rc::new(self.function(take(ctor), &name)));
        let methods = methods
            .into_iter()
            .map(|method| ClassMethod {
                function: Rc::new(self.function(take(method.function), &method.name)),
                ..method
            })
            .collect();
        Class {
            name,
            parent,
            constructor,
            methods,
            pos,
        }
    }

    /// Rewrite a value bound to `name`; anonymous functions report under that name
    fn named_value(&mut self, value: Expr, name: &str) -> Expr {
        match value.kind {
            ExprKind::Function(func) if func.name.is_none() && !value.synthetic => {
                let func = self.function(take(func), name);
                Expr::new(ExprKind::Function(Rc::new(func)), value.pos)
            }
            kind => self.expr(Expr { kind, ..value }),
        }
    }

    // Expressions

    fn exprs(&mut self, exprs: Vec<Expr>) -> Vec<Expr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: Expr) -> Box<Expr> {
        Box::new(self.expr(expr))
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        if expr.synthetic {
            return expr;
        }
        let pos = expr.pos;
        let kind = match expr.kind {
            ExprKind::Array(items) => return self.array_literal(items, pos),
            ExprKind::Object(props) => return self.object_literal(props, pos),
            ExprKind::Function(func) => {
                let func = take(func);
                let name = func.name.clone().unwrap_or_else(|| ANONYMOUS.to_string());
                ExprKind::Function(Rc::new(self.function(func, &name)))
            }
            ExprKind::Unary {
                op: UnaryOp::Delete,
                operand,
            } => return self.delete(*operand, pos),
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: self.boxed(*operand),
            },
            ExprKind::Update { op, prefix, target } => return self.update(op, prefix, *target, pos),
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: self.boxed(*left),
                right: self.boxed(*right),
            },
            ExprKind::Logical { op, left, right } => ExprKind::Logical {
                op,
                left: self.boxed(*left),
                right: self.boxed(*right),
            },
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => ExprKind::Conditional {
                test: self.boxed(*test),
                consequent: self.boxed(*consequent),
                alternate: self.boxed(*alternate),
            },
            ExprKind::Assign { op, target, value } => return self.assign(op, *target, *value, pos),
            ExprKind::Sequence(exprs) => ExprKind::Sequence(self.exprs(exprs)),
            ExprKind::Call { callee, args } => return self.call(*callee, args, pos),
            ExprKind::New { callee, args } => {
                let new = ExprKind::New {
                    callee: self.boxed(*callee),
                    args: self.exprs(args),
                };
                return step(Expr::new(new, pos), pos);
            }
            ExprKind::SuperCall(args) => {
                let call = ExprKind::SuperCall(self.exprs(args));
                return step(Expr::new(call, pos), pos);
            }
            ExprKind::Member { object, property } => ExprKind::Member {
                object: self.boxed(*object),
                property: self.member_prop(property),
            },
            kind @ (ExprKind::Number(_)
            | ExprKind::BigInt(_)
            | ExprKind::String(_)
            | ExprKind::Boolean(_)
            | ExprKind::Null
            | ExprKind::Identifier(_)
            | ExprKind::This
            | ExprKind::SuperMember(_)) => kind,
        };
        Expr::new(kind, pos)
    }

    fn member_prop(&mut self, property: MemberProp) -> MemberProp {
        match property {
            MemberProp::Computed(key) => MemberProp::Computed(self.boxed(*key)),
            named => named,
        }
    }

    /// The key operand of a member target, as an argument for an evaluator
    fn key_operand(&mut self, property: MemberProp, pos: Pos) -> Expr {
        match property {
            MemberProp::Named(name) => string(&name, pos),
            MemberProp::Computed(key) => self.expr(*key),
        }
    }

    fn array_literal(&mut self, items: Vec<Expr>, pos: Pos) -> Expr {
        let interned = hook_call(Hook::Intern, vec![Expr::synthetic(ExprKind::Array(Vec::new()), pos)], pos);
        if items.is_empty() {
            return interned;
        }
        let obj = self.temp('o');
        let mut effects = Vec::with_capacity(items.len() + 1);
        for (index, item) in items.into_iter().enumerate() {
            let item_pos = item.pos;
            let value = self.expr(item);
            let slot = member(
                &obj,
                computed(Expr::synthetic(ExprKind::Number(index as f64), item_pos)),
                item_pos,
            );
            let store = assign(AssignOp::Assign, slot, value, item_pos);
            effects.push(hook_call(
                Hook::Write,
                vec![ident(&obj, item_pos), string(&index.to_string(), item_pos), store, checkpoint(item_pos)],
                item_pos,
            ));
        }
        effects.push(ident(&obj, pos));
        evaluator(vec![obj], sequence(effects, pos), vec![interned], pos)
    }

    fn object_literal(&mut self, mut props: Vec<Property>, pos: Pos) -> Expr {
        // Methods stay in the literal so `super` resolves against it
        let split = props.iter().rposition(|p| p.method).map_or(0, |i| i + 1);
        let tail = props.split_off(split);
        let head = props.into_iter().map(|prop| self.literal_property(prop)).collect();
        let interned = hook_call(Hook::Intern, vec![Expr::synthetic(ExprKind::Object(head), pos)], pos);
        if tail.is_empty() {
            return interned;
        }

        let obj = self.temp('o');
        let mut params = vec![obj.clone()];
        let mut effects = Vec::with_capacity(tail.len() + 1);
        for prop in tail {
            let prop_pos = prop.pos;
            let (key_arg, slot_key, hint) = match prop.key {
                PropKey::Named(name) => (string(&name, prop_pos), string(&name, prop_pos), Some(name)),
                PropKey::Computed(key) => {
                    let temp = self.temp('k');
                    params.push(temp.clone());
                    let key = self.expr(*key);
                    let bind = assign(AssignOp::Assign, ident(&temp, prop_pos), key, prop_pos);
                    (bind, ident(&temp, prop_pos), None)
                }
            };
            let value = match &hint {
                Some(name) => self.named_value(prop.value, name),
                None => self.expr(prop.value),
            };
            let store = assign(AssignOp::Assign, member(&obj, computed(slot_key), prop_pos), value, prop_pos);
            effects.push(hook_call(
                Hook::Write,
                vec![ident(&obj, prop_pos), key_arg, store, checkpoint(prop_pos)],
                prop_pos,
            ));
        }
        effects.push(ident(&obj, pos));
        evaluator(params, sequence(effects, pos), vec![interned], pos)
    }

    fn literal_property(&mut self, prop: Property) -> Property {
        let Property {
            key,
            value,
            pos,
            method,
        } = prop;
        let value = match &key {
            PropKey::Named(name) => self.named_value(value, name),
            PropKey::Computed(_) => self.expr(value),
        };
        let key = match key {
            PropKey::Computed(key) => PropKey::Computed(self.boxed(*key)),
            named => named,
        };
        Property {
            key,
            value,
            pos,
            method,
        }
    }

    fn delete(&mut self, operand: Expr, pos: Pos) -> Expr {
        let operand_pos = operand.pos;
        match operand.kind {
            ExprKind::Member { object, property } if !operand.synthetic => {
                let obj = self.temp('o');
                let key = self.temp('k');
                let removed = self.temp('r');
                let object = self.expr(*object);
                let key_value = self.key_operand(property, operand_pos);
                let delete = Expr::synthetic(
                    ExprKind::Unary {
                        op: UnaryOp::Delete,
                        operand: Box::new(member(&obj, computed(ident(&key, pos)), pos)),
                    },
                    pos,
                );
                let effects = vec![
                    assign(AssignOp::Assign, ident(&removed, pos), delete, pos),
                    hook_call(Hook::Del, vec![ident(&obj, pos), ident(&key, pos), checkpoint(pos)], pos),
                    ident(&removed, pos),
                ];
                let body = sequence(effects, pos);
                step(evaluator(vec![obj, key, removed], body, vec![object, key_value], pos), pos)
            }
            kind => {
                let operand = self.expr(Expr { kind, ..operand });
                let delete = ExprKind::Unary {
                    op: UnaryOp::Delete,
                    operand: Box::new(operand),
                };
                step(Expr::new(delete, pos), pos)
            }
        }
    }

    fn update(&mut self, op: UpdateOp, prefix: bool, target: Expr, pos: Pos) -> Expr {
        let target_pos = target.pos;
        match target.kind {
            ExprKind::Identifier(name) if !is_internal(&name) => {
                let result = self.temp('r');
                let update = Expr::new(
                    ExprKind::Update {
                        op,
                        prefix,
                        target: Box::new(Expr::new(ExprKind::Identifier(name.clone()), target_pos)),
                    },
                    pos,
                );
                let body = sequence(
                    vec![root_set(&name, ident(&name, pos), pos), ident(&result, pos)],
                    pos,
                );
                step(evaluator(vec![result], body, vec![update], pos), pos)
            }
            ExprKind::Member { object, property } => {
                let obj = self.temp('o');
                let key = self.temp('k');
                let object = self.expr(*object);
                let key_value = self.key_operand(property, target_pos);
                let update = Expr::synthetic(
                    ExprKind::Update {
                        op,
                        prefix,
                        target: Box::new(member(&obj, computed(ident(&key, pos)), pos)),
                    },
                    pos,
                );
                let write = hook_call(
                    Hook::Write,
                    vec![ident(&obj, pos), ident(&key, pos), update, checkpoint(pos)],
                    pos,
                );
                step(evaluator(vec![obj, key], write, vec![object, key_value], pos), pos)
            }
            kind => {
                let update = ExprKind::Update {
                    op,
                    prefix,
                    target: Box::new(Expr::new(kind, target_pos)),
                };
                step(Expr::new(update, pos), pos)
            }
        }
    }

    fn assign(&mut self, op: AssignOp, target: Expr, value: Expr, pos: Pos) -> Expr {
        let target_pos = target.pos;
        match target.kind {
            ExprKind::Identifier(name) => {
                let value = self.named_value(value, &name);
                let store = Expr::new(
                    ExprKind::Assign {
                        op,
                        target: Box::new(Expr::new(ExprKind::Identifier(name.clone()), target_pos)),
                        value: Box::new(value),
                    },
                    pos,
                );
                if is_internal(&name) {
                    step(store, pos)
                } else {
                    step(root_set(&name, store, pos), pos)
                }
            }
            ExprKind::Member { object, property } => {
                let obj = self.temp('o');
                let key = self.temp('k');
                let object = self.expr(*object);
                let value = match &property {
                    MemberProp::Named(name) => {
                        let name = name.clone();
                        self.named_value(value, &name)
                    }
                    MemberProp::Computed(_) => self.expr(value),
                };
                let key_value = self.key_operand(property, target_pos);
                let store = assign(op, member(&obj, computed(ident(&key, pos)), pos), value, pos);
                let write = hook_call(
                    Hook::Write,
                    vec![ident(&obj, pos), ident(&key, pos), store, checkpoint(pos)],
                    pos,
                );
                step(evaluator(vec![obj, key], write, vec![object, key_value], pos), pos)
            }
            kind => {
                let store = ExprKind::Assign {
                    op,
                    target: Box::new(Expr::new(kind, target_pos)),
                    value: self.boxed(value),
                };
                step(Expr::new(store, pos), pos)
            }
        }
    }

    fn call(&mut self, callee: Expr, args: Vec<Expr>, pos: Pos) -> Expr {
        let callee_pos = callee.pos;
        match callee.kind {
            // Method calls may mutate their receiver out of sight; sync it afterwards
            ExprKind::Member { object, property } if !callee.synthetic => {
                let obj = self.temp('o');
                let object = self.expr(*object);
                let property = self.member_prop(property);
                let args = self.exprs(args);
                let invoke = Expr::synthetic(
                    ExprKind::Call {
                        callee: Box::new(Expr::synthetic(
                            ExprKind::Member {
                                object: Box::new(ident(&obj, callee_pos)),
                                property,
                            },
                            callee_pos,
                        )),
                        args,
                    },
                    pos,
                );
                let sync = hook_call(Hook::Sync, vec![ident(&obj, pos), invoke, checkpoint(pos)], pos);
                step(evaluator(vec![obj], sync, vec![object], pos), pos)
            }
            ExprKind::SuperMember(name) => {
                let invoke = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(Expr::new(ExprKind::SuperMember(name), callee_pos)),
                        args: self.exprs(args),
                    },
                    pos,
                );
                let receiver = Expr::synthetic(ExprKind::This, pos);
                step(hook_call(Hook::Sync, vec![receiver, invoke, checkpoint(pos)], pos), pos)
            }
            kind => {
                let callee = self.expr(Expr { kind, ..callee });
                let call = ExprKind::Call {
                    callee: Box::new(callee),
                    args: self.exprs(args),
                };
                step(Expr::new(call, pos), pos)
            }
        }
    }
}
