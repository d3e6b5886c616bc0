// Tree-walking interpreter for the script language
use std::{
    rc::Rc,
    time::{Duration, Instant},
};

use tracing::{debug, trace};

use crate::ast::*;
use crate::hooks::Hook;
use crate::INTERNAL_PREFIX;

pub mod builtins;
pub mod errors;
pub mod heap;
pub mod inspect;
pub mod operators;
pub mod scope;
pub mod value;


pub use builtins::Realm;
pub use errors::{Completion, ErrorKind, EvalResult, RuntimeError};
pub use heap::{Builtin, ClassData, Closure, Heap, JsObject, NativeFn, ObjectKind};
pub use scope::{Env, Frame, LookupError};
pub use value::{number_to_string, ObjectHandle, Value};

/// Deadline checks happen once per this many evaluation ticks
const TICK_INTERVAL: u64 = 1024;

/// Receiver of hook calls made by instrumented programs
pub trait HookHost {
    fn call_hook(&mut self, hook: Hook, heap: &Heap, args: &[Value]) -> Value;
}

/// Host that records nothing; hooks return their pass-through value
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl HookHost for NoHooks {
    fn call_hook(&mut self, hook: Hook, _heap: &Heap, args: &[Value]) -> Value {
        hook.passthrough(args)
    }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub timeout: Option<Duration>,
    pub max_call_depth: usize,
    pub capture_console: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(2)),
            max_call_depth: 512,
            capture_console: true,
        }
    }
}

/// Lexical context of the code being evaluated
#[derive(Clone)]
struct Ctx {
    env: Env,
    frame: Rc<Frame>,
}

impl Ctx {
    fn with_env(&self, env: Env) -> Ctx {
        Ctx {
            env,
            frame: self.frame.clone(),
        }
    }
}

/// What a call site resolved its callee to
enum Callee {
    Closure(Closure),
    Class(String),
    Native(NativeFn),
    NotCallable,
}

pub struct Interpreter<H: HookHost> {
    heap: Heap,
    host: H,
    realm: Realm,
    global: Env,
    options: EvalOptions,
    console: Vec<String>,
    started: Instant,
    ticks: u64,
    call_depth: usize,
}

impl<H: HookHost> Interpreter<H> {
    pub fn new(host: H, options: EvalOptions) -> Self {
        let mut heap = Heap::new();
        let global = Env::new_root();
        let realm = Realm::install(&mut heap, &global);
        Self {
            heap,
            host,
            realm,
            global,
            options,
            console: Vec::new(),
            started: Instant::now(),
            ticks: 0,
            call_depth: 0,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn console(&self) -> &[String] {
        &self.console
    }

    /// Tear down the interpreter, keeping the hook host and captured console
    pub fn into_parts(self) -> (H, Vec<String>) {
        (self.host, self.console)
    }

    /// Run a top-level program; the result is the value of a trailing
    /// expression statement, or undefined
    pub fn run_program(&mut self, program: &Program) -> EvalResult<Value> {
        let ctx = Ctx {
            env: Env::new_function(&self.global),
            frame: Frame::top_level(),
        };
        self.hoist_declarations(&program.body, &ctx, true);

        let mut completion = Value::Undefined;
        let last = program.body.len().checked_sub(1);
        for (i, stmt) in program.body.iter().enumerate() {
            if Some(i) == last {
                if let StmtKind::Expr(expr) = &stmt.kind {
                    completion = self.eval_expr(expr, &ctx)?;
                    continue;
                }
            }
            if self.exec_stmt(stmt, &ctx)? != Completion::Normal {
                break;
            }
        }
        debug!(ticks = self.ticks, objects = self.heap.len(), "program finished");
        Ok(completion)
    }

    /// Object whose methods dispatch to the hook host
    pub fn create_hooks_object(&mut self) -> Value {
        let object = self
            .heap
            .alloc(JsObject::new(ObjectKind::Ordinary, Some(self.realm.object_proto)));
        for hook in Hook::ALL {
            let method = self.heap.alloc(JsObject::new(
                ObjectKind::Native(NativeFn::Hook(hook)),
                Some(self.realm.function_proto),
            ));
            self.heap
                .get_mut(object)
                .hidden
                .insert(hook.method_name().to_string(), Value::Object(method));
        }
        Value::Object(object)
    }

    /// Create a script-level error object
    pub fn make_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> Value {
        let proto = self.realm.error_proto(kind);
        let object = self.heap.alloc(
            JsObject::new(ObjectKind::Ordinary, Some(proto)).with_class_name(Some(kind.name().to_string())),
        );
        self.heap
            .get_mut(object)
            .hidden
            .insert("message".to_string(), Value::String(message.into()));
        Value::Object(object)
    }

    fn throw(&mut self, kind: ErrorKind, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Thrown(self.make_error(kind, message))
    }

    /// `name` and `message` of a thrown value
    pub fn error_summary(&self, value: &Value) -> (String, String) {
        match value {
            Value::Object(handle) if self.is_error(*handle) => {
                let name = self
                    .heap
                    .lookup(*handle, "name")
                    .map(|v| self.to_string(&v))
                    .unwrap_or_else(|| "Error".to_string());
                let message = self
                    .heap
                    .lookup(*handle, "message")
                    .map(|v| self.to_string(&v))
                    .unwrap_or_else(|| self.inspect(value));
                (name, message)
            }
            other => ("Uncaught".to_string(), self.inspect(other)),
        }
    }

    fn tick(&mut self) -> EvalResult<()> {
        self.ticks += 1;
        if self.ticks % TICK_INTERVAL == 0 {
            if let Some(timeout) = self.options.timeout {
                let elapsed = self.started.elapsed();
                if elapsed > timeout {
                    return Err(RuntimeError::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                    });
                }
            }
        }
        Ok(())
    }

    fn enter_call(&mut self) -> EvalResult<()> {
        if self.call_depth >= self.options.max_call_depth {
            return Err(self.throw(ErrorKind::RangeError, "Maximum call stack size exceeded"));
        }
        self.call_depth += 1;
        Ok(())
    }

    // ---- declarations ----

    fn hoist_declarations(&mut self, stmts: &[Stmt], ctx: &Ctx, function_level: bool) {
        if function_level {
            let mut vars = Vec::new();
            scope::collect_var_names(stmts, &mut vars);
            for name in vars {
                ctx.env.declare_var(&name);
            }
        }
        self.declare_lexical(stmts, ctx);
    }

    fn declare_lexical(&mut self, stmts: &[Stmt], ctx: &Ctx) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::VarDecl { kind, decls } if *kind != VarKind::Var => {
                    for decl in decls {
                        ctx.env.declare(&decl.name, None, *kind == VarKind::Let);
                    }
                }
                StmtKind::ClassDecl(class) => ctx.env.declare(&class.name, None, true),
                StmtKind::FunctionDecl(func) => {
                    let closure = self.make_closure(func, ctx.env.clone(), None, None, None, true);
                    if let Some(name) = &func.name {
                        ctx.env.declare(name, Some(Value::Object(closure)), true);
                    }
                }
                _ => {}
            }
        }
    }

    fn make_closure(
        &mut self,
        func: &Rc<Function>,
        env: Env,
        frame: Option<Rc<Frame>>,
        home: Option<ObjectHandle>,
        class_ctor: Option<ObjectHandle>,
        constructible: bool,
    ) -> ObjectHandle {
        let closure = Closure {
            func: func.clone(),
            env,
            frame,
            home,
            class_ctor,
            constructible,
        };
        self.heap.alloc(JsObject::new(
            ObjectKind::Closure(closure),
            Some(self.realm.function_proto),
        ))
    }

    fn make_function_value(&mut self, func: &Rc<Function>, ctx: &Ctx) -> Value {
        if func.is_arrow {
            let handle = self.make_closure(func, ctx.env.clone(), Some(ctx.frame.clone()), None, None, false);
            return Value::Object(handle);
        }
        match &func.name {
            // Named function expressions see their own name
            Some(name) => {
                let env = Env::new_block(&ctx.env);
                let handle = self.make_closure(func, env.clone(), None, None, None, true);
                env.declare(name, Some(Value::Object(handle)), false);
                Value::Object(handle)
            }
            None => Value::Object(self.make_closure(func, ctx.env.clone(), None, None, None, true)),
        }
    }

    fn eval_class(&mut self, class: &Rc<Class>, ctx: &Ctx) -> EvalResult<Value> {
        let parent = match &class.parent {
            Some(expr) => {
                let value = self.eval_expr(expr, ctx)?;
                match value {
                    Value::Object(handle) if self.heap.get(handle).kind.is_callable() => Some(handle),
                    other => {
                        let shown = self.inspect(&other);
                        return Err(self.throw(
                            ErrorKind::TypeError,
                            format!("Class extends value {shown} is not a constructor or null"),
                        ));
                    }
                }
            }
            None => None,
        };
        let proto_parent = match parent {
            Some(parent) => match self.get_property(&Value::Object(parent), "prototype")? {
                Value::Object(proto) => Some(proto),
                Value::Null => None,
                _ => {
                    return Err(self.throw(
                        ErrorKind::TypeError,
                        "Class extends value does not have valid prototype property",
                    ))
                }
            },
            None => Some(self.realm.object_proto),
        };

        let prototype = self.heap.alloc(JsObject::new(ObjectKind::Ordinary, proto_parent));
        let data = ClassData {
            def: class.clone(),
            env: ctx.env.clone(),
            parent,
        };
        let class_obj = self.heap.alloc(
            JsObject::new(
                ObjectKind::Class(data),
                Some(parent.unwrap_or(self.realm.function_proto)),
            )
            .with_class_name(Some(class.name.clone())),
        );
        self.heap
            .get_mut(class_obj)
            .hidden
            .insert("prototype".to_string(), Value::Object(prototype));
        self.heap
            .get_mut(prototype)
            .hidden
            .insert("constructor".to_string(), Value::Object(class_obj));

        for method in &class.methods {
            let home = if method.is_static { class_obj } else { prototype };
            let closure = self.make_closure(
                &method.function,
                ctx.env.clone(),
                None,
                Some(home),
                Some(class_obj),
                false,
            );
            self.heap
                .get_mut(home)
                .hidden
                .insert(method.name.clone(), Value::Object(closure));
        }
        Ok(Value::Object(class_obj))
    }

    // ---- statements ----

    fn exec_stmts(&mut self, stmts: &[Stmt], ctx: &Ctx) -> EvalResult<Completion> {
        for stmt in stmts {
            let completion = self.exec_stmt(stmt, ctx)?;
            if completion != Completion::Normal {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt], ctx: &Ctx) -> EvalResult<Completion> {
        let block = ctx.with_env(Env::new_block(&ctx.env));
        self.declare_lexical(stmts, &block);
        self.exec_stmts(stmts, &block)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, ctx: &Ctx) -> EvalResult<Completion> {
        self.tick()?;
        match &stmt.kind {
            StmtKind::VarDecl { kind, decls } => {
                self.exec_declarators(*kind, decls, ctx)?;
                Ok(Completion::Normal)
            }
            StmtKind::FunctionDecl(_) => Ok(Completion::Normal),
            StmtKind::ClassDecl(class) => {
                let value = self.eval_class(class, ctx)?;
                ctx.env.initialize(&class.name, value);
                Ok(Completion::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval_expr(expr, ctx)?;
                Ok(Completion::Normal)
            }
            StmtKind::Block(stmts) => self.exec_block(stmts, ctx),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, ctx)?.truthy() {
                    self.exec_stmt(consequent, ctx)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, ctx)
                } else {
                    Ok(Completion::Normal)
                }
            }
            StmtKind::While { test, body } => {
                while self.eval_expr(test, ctx)?.truthy() {
                    match self.exec_stmt(body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::DoWhile { body, test } => {
                loop {
                    match self.exec_stmt(body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval_expr(test, ctx)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, ctx),
            StmtKind::ForIn {
                binding,
                object,
                body,
            } => {
                let object = self.eval_expr(object, ctx)?;
                let keys = self.for_in_keys(&object)?;
                for key in keys {
                    match self.exec_loop_iteration(binding, Value::String(key), body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        _ => {}
                    }
                }
                Ok(Completion::Normal)
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
            } => self.exec_for_of(binding, iterable, body, ctx),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, ctx)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StmtKind::Break => Ok(Completion::Break),
            StmtKind::Continue => Ok(Completion::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval_expr(expr, ctx)?;
                Err(RuntimeError::Thrown(value))
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), ctx),
            StmtKind::Empty => Ok(Completion::Normal),
        }
    }

    fn exec_declarators(&mut self, kind: VarKind, decls: &[Declarator], ctx: &Ctx) -> EvalResult<()> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval_expr(init, ctx)?,
                None if kind == VarKind::Var => continue,
                None => Value::Undefined,
            };
            match kind {
                VarKind::Var => self.assign_identifier(&decl.name, value, ctx)?,
                VarKind::Let | VarKind::Const => ctx.env.initialize(&decl.name, value),
            }
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        ctx: &Ctx,
    ) -> EvalResult<Completion> {
        let mut loop_ctx = ctx.with_env(Env::new_block(&ctx.env));
        let mut per_iteration = false;
        match init {
            Some(ForInit::VarDecl { kind, decls }) => {
                if *kind != VarKind::Var {
                    per_iteration = true;
                    for decl in decls {
                        loop_ctx.env.declare(&decl.name, None, *kind == VarKind::Let);
                    }
                }
                self.exec_declarators(*kind, decls, &loop_ctx)?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, &loop_ctx)?;
            }
            None => {}
        }

        loop {
            if per_iteration {
                loop_ctx = loop_ctx.with_env(loop_ctx.env.copy_for_iteration());
            }
            if let Some(test) = test {
                if !self.eval_expr(test, &loop_ctx)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &loop_ctx)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
            if per_iteration {
                loop_ctx = loop_ctx.with_env(loop_ctx.env.copy_for_iteration());
            }
            if let Some(update) = update {
                self.eval_expr(update, &loop_ctx)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_for_of(&mut self, binding: &ForBinding, iterable: &Expr, body: &Stmt, ctx: &Ctx) -> EvalResult<Completion> {
        let source = self.eval_expr(iterable, ctx)?;
        match &source {
            // Arrays are iterated live so that growth during the loop is observed
            Value::Object(handle) if self.heap.is_array(&source) => {
                let handle = *handle;
                let mut index = 0;
                loop {
                    let item = match &self.heap.get(handle).kind {
                        ObjectKind::Array(elements) => elements.get(index).cloned(),
                        _ => None,
                    };
                    let Some(item) = item else {
                        break;
                    };
                    index += 1;
                    match self.exec_loop_iteration(binding, item, body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        _ => {}
                    }
                }
            }
            Value::String(s) => {
                for c in s.chars() {
                    match self.exec_loop_iteration(binding, Value::String(c.to_string()), body, ctx)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        _ => {}
                    }
                }
            }
            other => {
                let shown = self.inspect(other);
                return Err(self.throw(ErrorKind::TypeError, format!("{shown} is not iterable")));
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_loop_iteration(&mut self, binding: &ForBinding, item: Value, body: &Stmt, ctx: &Ctx) -> EvalResult<Completion> {
        match binding.kind {
            Some(kind @ (VarKind::Let | VarKind::Const)) => {
                let env = Env::new_block(&ctx.env);
                env.declare(&binding.name, Some(item), kind == VarKind::Let);
                self.exec_stmt(body, &ctx.with_env(env))
            }
            Some(VarKind::Var) | None => {
                self.assign_identifier(&binding.name, item, ctx)?;
                self.exec_stmt(body, ctx)
            }
        }
    }

    fn for_in_keys(&mut self, value: &Value) -> EvalResult<Vec<String>> {
        match value {
            Value::Object(handle) => {
                let mut keys: Vec<String> = Vec::new();
                let mut current = Some(*handle);
                while let Some(h) = current {
                    let object = self.heap.get(h);
                    for key in object.own_keys() {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                    current = object.proto;
                }
                Ok(keys)
            }
            Value::String(s) => Ok((0..s.chars().count()).map(|i| i.to_string()).collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        ctx: &Ctx,
    ) -> EvalResult<Completion> {
        let mut result = self.exec_block(block, ctx);
        if let (Err(RuntimeError::Thrown(exception)), Some(handler)) = (&result, handler) {
            let env = Env::new_block(&ctx.env);
            if let Some(param) = &handler.param {
                env.declare(param, Some(exception.clone()), true);
            }
            result = self.exec_block(&handler.body, &ctx.with_env(env));
        }
        if let Some(finalizer) = finalizer {
            // Deadline and internal failures abort without running finalizers
            if matches!(&result, Err(err) if !err.is_catchable()) {
                return result;
            }
            match self.exec_block(finalizer, ctx)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        result
    }

    // ---- expressions ----

    fn eval_expr(&mut self, expr: &Expr, ctx: &Ctx) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::BigInt(n) => Ok(Value::BigInt(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Boolean(b) => Ok(Value::Boolean(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Identifier(name) => self.lookup_identifier(name, ctx),
            ExprKind::This => Ok(ctx.frame.this.clone()),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, ctx)?);
                }
                Ok(self.new_array(values))
            }
            ExprKind::Object(props) => self.eval_object_literal(props, ctx),
            ExprKind::Function(func) => Ok(self.make_function_value(func, ctx)),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, ctx),
            ExprKind::Update { op, prefix, target } => self.eval_update(*op, *prefix, target, ctx),
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(left, ctx)?;
                let right = self.eval_expr(right, ctx)?;
                self.binary_op(*op, left, right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval_expr(left, ctx)?;
                if short_circuits(*op, &left) {
                    return Ok(left);
                }
                self.eval_expr(right, ctx)
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, ctx)?.truthy() {
                    self.eval_expr(consequent, ctx)
                } else {
                    self.eval_expr(alternate, ctx)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, ctx),
            ExprKind::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval_expr(expr, ctx)?;
                }
                Ok(last)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, ctx),
            ExprKind::New { callee, args } => {
                let constructor = self.eval_expr(callee, ctx)?;
                let args = self.eval_args(args, ctx)?;
                self.construct(&constructor, args, callee)
            }
            ExprKind::Member { object, property } => {
                let object = self.eval_expr(object, ctx)?;
                let key = self.member_key(property, ctx)?;
                self.get_property(&object, &key)
            }
            ExprKind::SuperCall(args) => {
                let args = self.eval_args(args, ctx)?;
                self.super_call(ctx, args)
            }
            ExprKind::SuperMember(name) => self.super_get(ctx, name),
        }
    }

    fn eval_args(&mut self, args: &[Expr], ctx: &Ctx) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, ctx)?);
        }
        Ok(values)
    }

    fn member_key(&mut self, property: &MemberProp, ctx: &Ctx) -> EvalResult<String> {
        match property {
            MemberProp::Named(name) => Ok(name.clone()),
            MemberProp::Computed(expr) => {
                let key = self.eval_expr(expr, ctx)?;
                Ok(self.to_property_key(&key))
            }
        }
    }

    pub fn new_array(&mut self, values: Vec<Value>) -> Value {
        Value::Object(self.heap.alloc(JsObject::new(
            ObjectKind::Array(values),
            Some(self.realm.array_proto),
        )))
    }

    pub fn new_object(&mut self) -> ObjectHandle {
        self.heap
            .alloc(JsObject::new(ObjectKind::Ordinary, Some(self.realm.object_proto)))
    }

    fn eval_object_literal(&mut self, props: &[Property], ctx: &Ctx) -> EvalResult<Value> {
        let object = self.new_object();
        for prop in props {
            let key = match &prop.key {
                PropKey::Named(name) => name.clone(),
                PropKey::Computed(expr) => {
                    let key = self.eval_expr(expr, ctx)?;
                    self.to_property_key(&key)
                }
            };
            let value = match (&prop.value.kind, prop.method) {
                (ExprKind::Function(func), true) => {
                    let closure = self.make_closure(func, ctx.env.clone(), None, Some(object), None, false);
                    Value::Object(closure)
                }
                _ => self.eval_expr(&prop.value, ctx)?,
            };
            self.heap.get_mut(object).props.insert(key, value);
        }
        Ok(Value::Object(object))
    }

    fn lookup_identifier(&mut self, name: &str, ctx: &Ctx) -> EvalResult<Value> {
        match ctx.env.get(name) {
            Ok(value) => Ok(value),
            Err(LookupError::Uninitialized) => Err(self.throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            )),
            Err(_) => Err(self.throw(ErrorKind::ReferenceError, format!("{name} is not defined"))),
        }
    }

    fn assign_identifier(&mut self, name: &str, value: Value, ctx: &Ctx) -> EvalResult<()> {
        match ctx.env.set(name, value) {
            Ok(()) => Ok(()),
            Err(LookupError::Immutable) => Err(self.throw(ErrorKind::TypeError, "Assignment to constant variable.")),
            Err(LookupError::Uninitialized) => Err(self.throw(
                ErrorKind::ReferenceError,
                format!("Cannot access '{name}' before initialization"),
            )),
            Err(LookupError::Undeclared) => {
                Err(self.throw(ErrorKind::ReferenceError, format!("{name} is not defined")))
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, ctx: &Ctx) -> EvalResult<Value> {
        match op {
            UnaryOp::Delete => match &operand.kind {
                ExprKind::Member { object, property } => {
                    let object = self.eval_expr(object, ctx)?;
                    let key = self.member_key(property, ctx)?;
                    Ok(Value::Boolean(self.delete_property(&object, &key)?))
                }
                ExprKind::Identifier(_) => Ok(Value::Boolean(false)),
                _ => {
                    self.eval_expr(operand, ctx)?;
                    Ok(Value::Boolean(true))
                }
            },
            UnaryOp::Typeof => {
                if let ExprKind::Identifier(name) = &operand.kind {
                    if let Err(LookupError::Undeclared) = ctx.env.get(name) {
                        return Ok(Value::string("undefined"));
                    }
                }
                let value = self.eval_expr(operand, ctx)?;
                Ok(Value::string(self.type_of(&value)))
            }
            UnaryOp::Void => {
                self.eval_expr(operand, ctx)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Not => Ok(Value::Boolean(!self.eval_expr(operand, ctx)?.truthy())),
            UnaryOp::Minus => {
                let value = self.eval_expr(operand, ctx)?;
                self.negate(value)
            }
            UnaryOp::Plus => {
                let value = self.eval_expr(operand, ctx)?;
                Ok(Value::Number(self.to_number(&value)?))
            }
            UnaryOp::BitNot => {
                let value = self.eval_expr(operand, ctx)?;
                self.bit_not(value)
            }
        }
    }

    fn eval_update(&mut self, op: UpdateOp, prefix: bool, target: &Expr, ctx: &Ctx) -> EvalResult<Value> {
        let delta = match op {
            UpdateOp::Increment => BinaryOp::Add,
            UpdateOp::Decrement => BinaryOp::Subtract,
        };
        match &target.kind {
            ExprKind::Identifier(name) => {
                let old = self.lookup_identifier(name, ctx)?;
                let old = self.to_numeric_value(&old)?;
                let new = self.increment(delta, &old)?;
                self.assign_identifier(name, new.clone(), ctx)?;
                Ok(if prefix { new } else { old })
            }
            ExprKind::Member { object, property } => {
                let object = self.eval_expr(object, ctx)?;
                let key = self.member_key(property, ctx)?;
                let old = self.get_property(&object, &key)?;
                let old = self.to_numeric_value(&old)?;
                let new = self.increment(delta, &old)?;
                self.set_property(&object, &key, new.clone())?;
                Ok(if prefix { new } else { old })
            }
            _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side expression in update")),
        }
    }

    fn increment(&mut self, op: BinaryOp, old: &Value) -> EvalResult<Value> {
        let one = match old {
            Value::BigInt(_) => Value::BigInt(1),
            _ => Value::Number(1.0),
        };
        self.binary_op(op, old.clone(), one)
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr, ctx: &Ctx) -> EvalResult<Value> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let new = match op {
                    AssignOp::Assign => self.eval_expr(value, ctx)?,
                    AssignOp::Compound(bin) => {
                        let old = self.lookup_identifier(name, ctx)?;
                        let rhs = self.eval_expr(value, ctx)?;
                        self.binary_op(bin, old, rhs)?
                    }
                    AssignOp::Logical(logical) => {
                        let old = self.lookup_identifier(name, ctx)?;
                        if short_circuits(logical, &old) {
                            return Ok(old);
                        }
                        self.eval_expr(value, ctx)?
                    }
                };
                self.assign_identifier(name, new.clone(), ctx)?;
                Ok(new)
            }
            ExprKind::Member { object, property } => {
                let object = self.eval_expr(object, ctx)?;
                let key = self.member_key(property, ctx)?;
                let new = match op {
                    AssignOp::Assign => self.eval_expr(value, ctx)?,
                    AssignOp::Compound(bin) => {
                        let old = self.get_property(&object, &key)?;
                        let rhs = self.eval_expr(value, ctx)?;
                        self.binary_op(bin, old, rhs)?
                    }
                    AssignOp::Logical(logical) => {
                        let old = self.get_property(&object, &key)?;
                        if short_circuits(logical, &old) {
                            return Ok(old);
                        }
                        self.eval_expr(value, ctx)?
                    }
                };
                self.set_property(&object, &key, new.clone())?;
                Ok(new)
            }
            _ => Err(self.throw(ErrorKind::SyntaxError, "Invalid left-hand side in assignment")),
        }
    }

    // ---- calls ----

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], ctx: &Ctx) -> EvalResult<Value> {
        let (function, this, label) = match &callee.kind {
            ExprKind::Member { object, property } => {
                let object = self.eval_expr(object, ctx)?;
                let key = self.member_key(property, ctx)?;
                let function = self.get_property(&object, &key)?;
                (function, object, key)
            }
            ExprKind::SuperMember(name) => {
                let function = self.super_get(ctx, name)?;
                (function, ctx.frame.this.clone(), format!("super.{name}"))
            }
            ExprKind::Identifier(name) => (self.lookup_identifier(name, ctx)?, Value::Undefined, name.clone()),
            _ => (self.eval_expr(callee, ctx)?, Value::Undefined, "expression".to_string()),
        };
        let args = self.eval_args(args, ctx)?;
        if !self.heap.is_callable(&function) {
            return Err(self.throw(ErrorKind::TypeError, format!("{label} is not a function")));
        }
        self.call_value(&function, this, args)
    }

    fn resolve_callee(&self, handle: ObjectHandle) -> Callee {
        match &self.heap.get(handle).kind {
            ObjectKind::Closure(closure) => Callee::Closure(closure.clone()),
            ObjectKind::Class(class) => Callee::Class(class.def.name.clone()),
            ObjectKind::Native(native) => Callee::Native(*native),
            _ => Callee::NotCallable,
        }
    }

    /// Call a function value with an explicit receiver
    pub fn call_value(&mut self, function: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let callee = match function {
            Value::Object(handle) => self.resolve_callee(*handle),
            _ => Callee::NotCallable,
        };
        match callee {
            Callee::Closure(closure) => self.call_closure(&closure, this, args),
            Callee::Class(name) => Err(self.throw(
                ErrorKind::TypeError,
                format!("Class constructor {name} cannot be invoked without 'new'"),
            )),
            Callee::Native(NativeFn::Builtin(builtin)) => self.call_builtin(builtin, this, args),
            Callee::Native(NativeFn::Hook(hook)) => {
                trace!(hook = hook.method_name(), "hook call");
                let mut args = args;
                if let Some(slot) = hook.key_arg().and_then(|i| args.get_mut(i)) {
                    *slot = Value::String(self.to_property_key(slot));
                }
                Ok(self.host.call_hook(hook, &self.heap, &args))
            }
            Callee::NotCallable => {
                let shown = self.inspect(function);
                Err(self.throw(ErrorKind::TypeError, format!("{shown} is not a function")))
            }
        }
    }

    fn call_closure(&mut self, closure: &Closure, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        // Evaluator arrows generated for tracing do not count toward the depth limit
        let counted = !is_internal_evaluator(&closure.func);
        if counted {
            self.enter_call()?;
        }
        let result = self.invoke_closure(closure, this, args);
        if counted {
            self.call_depth -= 1;
        }
        result
    }

    fn invoke_closure(&mut self, closure: &Closure, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let func = closure.func.clone();
        let frame = match &closure.frame {
            Some(frame) => frame.clone(),
            None => Rc::new(Frame {
                this,
                home: closure.home,
                class_ctor: closure.class_ctor,
            }),
        };
        let ctx = Ctx {
            env: Env::new_function(&closure.env),
            frame,
        };

        let mut args = args.into_iter();
        for param in &func.params {
            let mut value = args.next().unwrap_or(Value::Undefined);
            if value == Value::Undefined {
                if let Some(default) = &param.default {
                    value = self.eval_expr(default, &ctx)?;
                }
            }
            ctx.env.declare(&param.name, Some(value), true);
        }

        match &func.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, &ctx),
            FunctionBody::Block(stmts) => {
                self.hoist_declarations(stmts, &ctx, true);
                match self.exec_stmts(stmts, &ctx)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// Prototype object for instances created by `new constructor`
    fn instance_prototype(&mut self, constructor: ObjectHandle) -> EvalResult<ObjectHandle> {
        match self.get_property(&Value::Object(constructor), "prototype")? {
            Value::Object(proto) => Ok(proto),
            _ => Ok(self.realm.object_proto),
        }
    }

    fn construct(&mut self, constructor: &Value, args: Vec<Value>, callee: &Expr) -> EvalResult<Value> {
        let label = match &callee.kind {
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::Member {
                property: MemberProp::Named(name),
                ..
            } => name.clone(),
            _ => "expression".to_string(),
        };
        let Value::Object(handle) = constructor else {
            return Err(self.throw(ErrorKind::TypeError, format!("{label} is not a constructor")));
        };
        let handle = *handle;
        match self.resolve_callee(handle) {
            Callee::Class(name) => {
                let proto = self.instance_prototype(handle)?;
                let instance = self.heap.alloc(
                    JsObject::new(ObjectKind::Ordinary, Some(proto)).with_class_name(Some(name)),
                );
                let result = self.run_class_constructor(handle, Value::Object(instance), args)?;
                Ok(match result {
                    Value::Object(_) => result,
                    _ => Value::Object(instance),
                })
            }
            Callee::Closure(closure) if closure.constructible => {
                let proto = self.instance_prototype(handle)?;
                let instance = self.heap.alloc(
                    JsObject::new(ObjectKind::Ordinary, Some(proto)).with_class_name(closure.func.name.clone()),
                );
                let result = self.call_closure(&closure, Value::Object(instance), args)?;
                Ok(match result {
                    Value::Object(_) => result,
                    _ => Value::Object(instance),
                })
            }
            Callee::Native(NativeFn::Builtin(builtin)) if builtin.is_constructor() => {
                self.construct_builtin(builtin, args)
            }
            _ => Err(self.throw(ErrorKind::TypeError, format!("{label} is not a constructor"))),
        }
    }

    fn run_class_constructor(&mut self, class: ObjectHandle, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let data = match &self.heap.get(class).kind {
            ObjectKind::Class(data) => data.clone(),
            _ => return Err(RuntimeError::internal("class constructor on a non-class object")),
        };
        self.enter_call()?;
        let result = match &data.def.constructor {
            Some(ctor) => {
                let home = self.instance_prototype(class).ok();
                let closure = Closure {
                    func: ctor.clone(),
                    env: data.env.clone(),
                    frame: None,
                    home,
                    class_ctor: Some(class),
                    constructible: false,
                };
                self.invoke_closure(&closure, this, args)
            }
            None => match data.parent {
                Some(parent) => self.super_construct(parent, this, args).map(|_| Value::Undefined),
                None => Ok(Value::Undefined),
            },
        };
        self.call_depth -= 1;
        result
    }

    fn super_construct(&mut self, parent: ObjectHandle, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        match self.resolve_callee(parent) {
            Callee::Class(_) => self.run_class_constructor(parent, this, args),
            Callee::Closure(closure) if closure.constructible => self.call_closure(&closure, this, args),
            Callee::Native(NativeFn::Builtin(Builtin::ErrorCtor(_))) => {
                if let Value::Object(instance) = &this {
                    self.init_error(*instance, &args);
                }
                Ok(Value::Undefined)
            }
            Callee::Native(NativeFn::Builtin(Builtin::ObjectCtor)) => Ok(Value::Undefined),
            _ => Err(self.throw(ErrorKind::TypeError, "Super constructor is not a constructor")),
        }
    }

    fn super_call(&mut self, ctx: &Ctx, args: Vec<Value>) -> EvalResult<Value> {
        let Some(class) = ctx.frame.class_ctor else {
            return Err(self.throw(ErrorKind::SyntaxError, "'super' keyword unexpected here"));
        };
        let parent = match &self.heap.get(class).kind {
            ObjectKind::Class(data) => data.parent,
            _ => None,
        };
        let Some(parent) = parent else {
            return Err(self.throw(ErrorKind::SyntaxError, "'super' keyword unexpected here"));
        };
        self.super_construct(parent, ctx.frame.this.clone(), args)?;
        Ok(ctx.frame.this.clone())
    }

    fn super_get(&mut self, ctx: &Ctx, name: &str) -> EvalResult<Value> {
        let Some(home) = ctx.frame.home else {
            return Err(self.throw(ErrorKind::SyntaxError, "'super' keyword unexpected here"));
        };
        Ok(self
            .heap
            .get(home)
            .proto
            .and_then(|proto| self.heap.lookup(proto, name))
            .unwrap_or(Value::Undefined))
    }
}

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

/// Arrow functions whose parameters are all internal temporaries
fn is_internal_evaluator(func: &Function) -> bool {
    let temp_prefix = format!("{INTERNAL_PREFIX}_");
    func.is_arrow && !func.params.is_empty() && func.params.iter().all(|p| p.name.starts_with(&temp_prefix))
}
