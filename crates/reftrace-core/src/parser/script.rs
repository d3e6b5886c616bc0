// Recursive-descent parser for the script language
use std::rc::Rc;

use super::lexer::{tokenize, Token, TokenKind};
use super::{ParseError, Parser, DEFAULT_MAX_DEPTH};
use crate::ast::*;
use crate::evaluator::number_to_string;

type PResult<T> = Result<T, ParseError>;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "await",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Script language parser
pub struct ScriptParser {
    max_depth: usize,
}

impl ScriptParser {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Parser accepting deeper nesting, for generated sources
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for ScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ScriptParser {
    fn parse_program(&mut self, source: &str) -> Result<Program, ParseError> {
        let tokens = tokenize(source)?;
        ParseState::new(tokens, self.max_depth).parse_program()
    }

    fn name(&self) -> &'static str {
        "script"
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FnContext {
    super_call: bool,
    super_prop: bool,
}

enum BinaryKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

struct ParseState {
    tokens: Vec<Token>,
    idx: usize,
    depth: usize,
    max_depth: usize,
    fn_stack: Vec<FnContext>,
    loop_depth: usize,
    no_in: bool,
}

impl ParseState {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            idx: 0,
            depth: 0,
            max_depth,
            fn_stack: Vec::new(),
            loop_depth: 0,
            no_in: false,
        }
    }

    fn parse_program(mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program::new(body))
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.idx + offset).min(last)]
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.idx += 1;
        }
        token
    }

    fn check_punct(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn check_word(&self, w: &str) -> bool {
        self.peek().is_word(w)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.check_word(w) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<Pos> {
        if self.check_punct(p) {
            Ok(self.advance().pos)
        } else {
            Err(self.expected(&format!("'{p}'")))
        }
    }

    fn expect_word(&mut self, w: &str) -> PResult<Pos> {
        if self.check_word(w) {
            Ok(self.advance().pos)
        } else {
            Err(self.expected(&format!("'{w}'")))
        }
    }

    fn expected(&self, what: &str) -> ParseError {
        let token = self.peek();
        match &token.kind {
            TokenKind::Eof => ParseError::syntax(format!("expected {what}, found end of input"), token.pos),
            kind => ParseError::syntax(format!("expected {what}, found {}", describe(kind)), token.pos),
        }
    }

    fn unexpected(&self, token: &Token) -> ParseError {
        match &token.kind {
            TokenKind::Eof => ParseError::syntax("unexpected end of input", token.pos),
            kind => ParseError::syntax(format!("unexpected token {}", describe(kind)), token.pos),
        }
    }

    fn expect_identifier(&mut self) -> PResult<(String, Pos)> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Identifier(name) if name == "yield" => {
                Err(ParseError::unsupported("generators", token.pos))
            }
            TokenKind::Identifier(name) if name == "await" => {
                Err(ParseError::unsupported("async functions", token.pos))
            }
            TokenKind::Identifier(name) if !is_reserved(name) => {
                self.advance();
                Ok((name.clone(), token.pos))
            }
            TokenKind::Punct("[") | TokenKind::Punct("{") => {
                Err(ParseError::unsupported("destructuring patterns", token.pos))
            }
            _ => Err(self.expected("identifier")),
        }
    }

    /// Property names after `.` may be any identifier name, reserved or not
    fn expect_property_name(&mut self) -> PResult<String> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Punct("#") => Err(ParseError::unsupported("private names", token.pos)),
            _ => Err(self.expected("property name")),
        }
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") {
            return Ok(());
        }
        let token = self.peek();
        if token.is_punct("}") || token.kind == TokenKind::Eof || token.newline_before {
            return Ok(());
        }
        Err(self.unexpected(token))
    }

    // ---- context helpers ----

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= self.max_depth {
            return Err(ParseError::syntax("nesting too deep", self.peek().pos));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn with_no_in<T>(&mut self, no_in: bool, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let saved = std::mem::replace(&mut self.no_in, no_in);
        let result = f(self);
        self.no_in = saved;
        result
    }

    fn in_function<T>(&mut self, ctx: FnContext, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.fn_stack.push(ctx);
        let saved_loop = std::mem::replace(&mut self.loop_depth, 0);
        let saved_no_in = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = saved_no_in;
        self.loop_depth = saved_loop;
        self.fn_stack.pop();
        result
    }

    fn current_fn(&self) -> FnContext {
        self.fn_stack.last().copied().unwrap_or_default()
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> PResult<Stmt> {
        self.nested(|p| p.parse_statement_inner())
    }

    fn parse_statement_inner(&mut self) -> PResult<Stmt> {
        let token = self.peek().clone();
        let pos = token.pos;
        match &token.kind {
            TokenKind::Punct("{") => {
                let body = self.parse_block()?;
                Ok(Stmt::new(StmtKind::Block(body), pos))
            }
            TokenKind::Punct(";") => {
                self.advance();
                Ok(Stmt::new(StmtKind::Empty, pos))
            }
            TokenKind::Identifier(word) => match word.as_str() {
                "var" => self.parse_var_statement(VarKind::Var),
                "let" => self.parse_var_statement(VarKind::Let),
                "const" => self.parse_var_statement(VarKind::Const),
                "function" => self.parse_function_declaration(),
                "class" => self.parse_class_declaration(),
                "if" => self.parse_if(),
                "while" => self.parse_while(),
                "do" => self.parse_do_while(),
                "for" => self.parse_for(),
                "return" => self.parse_return(),
                "break" | "continue" => self.parse_jump(word == "break"),
                "throw" => self.parse_throw(),
                "try" => self.parse_try(),
                "switch" => Err(ParseError::unsupported("switch statements", pos)),
                "import" | "export" => Err(ParseError::unsupported("modules", pos)),
                "with" => Err(ParseError::unsupported("with statements", pos)),
                "debugger" => Err(ParseError::unsupported("debugger statements", pos)),
                "async" if self.peek_at(1).is_word("function") && !self.peek_at(1).newline_before => {
                    Err(ParseError::unsupported("async functions", pos))
                }
                w if !is_reserved(w) && self.peek_at(1).is_punct(":") => {
                    Err(ParseError::unsupported("labeled statements", pos))
                }
                _ => self.parse_expression_statement(),
            },
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.check_punct("}") {
            if self.at_eof() {
                return Err(self.expected("'}'"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_expression_statement(&mut self) -> PResult<Stmt> {
        let pos = self.peek().pos;
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::new(StmtKind::Expr(expr), pos))
    }

    fn parse_var_statement(&mut self, kind: VarKind) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let decls = self.parse_declarators(kind)?;
        self.consume_semicolon()?;
        Ok(Stmt::new(StmtKind::VarDecl { kind, decls }, pos))
    }

    fn parse_declarators(&mut self, kind: VarKind) -> PResult<Vec<Declarator>> {
        let mut decls = Vec::new();
        loop {
            let (name, pos) = self.expect_identifier()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            if kind == VarKind::Const && init.is_none() {
                return Err(ParseError::syntax("missing initializer in const declaration", pos));
            }
            decls.push(Declarator { name, init, pos });
            if !self.eat_punct(",") {
                return Ok(decls);
            }
        }
    }

    fn parse_function_declaration(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        if self.check_punct("*") {
            return Err(ParseError::unsupported("generators", self.peek().pos));
        }
        let (name, _) = self.expect_identifier()?;
        let func = self.parse_function_rest(Some(name), pos, FnContext::default())?;
        Ok(Stmt::new(StmtKind::FunctionDecl(Rc::new(func)), pos))
    }

    /// Parameters and body of a non-arrow function, starting at `(`
    fn parse_function_rest(&mut self, name: Option<String>, pos: Pos, ctx: FnContext) -> PResult<Function> {
        self.expect_punct("(")?;
        let params = self.parse_params()?;
        let body = self.in_function(ctx, |p| p.parse_block())?;
        Ok(Function {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
            pos,
            synthetic: false,
        })
    }

    /// Parameter list after the opening `(`, consuming the closing `)`
    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        self.with_no_in(false, |p| {
            loop {
                if p.eat_punct(")") {
                    return Ok(());
                }
                if p.check_punct("...") {
                    return Err(ParseError::unsupported("rest parameters", p.peek().pos));
                }
                let (name, pos) = p.expect_identifier()?;
                let default = if p.eat_punct("=") {
                    Some(p.parse_assignment()?)
                } else {
                    None
                };
                params.push(Param { name, default, pos });
                if !p.eat_punct(",") {
                    p.expect_punct(")")?;
                    return Ok(());
                }
            }
        })?;
        Ok(params)
    }

    fn parse_class_declaration(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let (name, _) = self.expect_identifier()?;
        let parent = if self.eat_word("extends") {
            Some(self.parse_lhs()?)
        } else {
            None
        };
        self.expect_punct("{")?;

        let mut constructor = None;
        let mut methods = Vec::new();
        loop {
            if self.eat_punct("}") {
                break;
            }
            if self.eat_punct(";") {
                continue;
            }
            let member_pos = self.peek().pos;
            let mut is_static = false;
            if self.check_word("static") && !self.peek_at(1).is_punct("(") {
                self.advance();
                is_static = true;
            }
            self.reject_accessor_prefix()?;
            let token = self.peek().clone();
            let method_name = match token.kind {
                TokenKind::Identifier(name) => name,
                TokenKind::String(s) => s,
                TokenKind::Number(n) => number_to_string(n),
                TokenKind::Punct("[") => {
                    return Err(ParseError::unsupported("computed class member names", token.pos))
                }
                TokenKind::Punct("#") => return Err(ParseError::unsupported("private names", token.pos)),
                _ => return Err(self.expected("class member")),
            };
            self.advance();
            if !self.check_punct("(") {
                return Err(ParseError::unsupported("class fields", member_pos));
            }

            let is_constructor = !is_static && method_name == "constructor";
            let ctx = FnContext {
                super_call: is_constructor && parent.is_some(),
                super_prop: true,
            };
            let func = Rc::new(self.parse_function_rest(None, member_pos, ctx)?);
            if is_constructor {
                if constructor.is_some() {
                    return Err(ParseError::syntax("a class may only have one constructor", member_pos));
                }
                constructor = Some(func);
            } else {
                methods.push(ClassMethod {
                    name: method_name,
                    is_static,
                    function: func,
                });
            }
        }

        let class = Class {
            name,
            parent,
            constructor,
            methods,
            pos,
        };
        Ok(Stmt::new(StmtKind::ClassDecl(Rc::new(class)), pos))
    }

    /// `get x()`, `set x(v)`, `async m()` and `*m()` members are outside the subset
    fn reject_accessor_prefix(&self) -> PResult<()> {
        let token = self.peek();
        if token.is_punct("*") {
            return Err(ParseError::unsupported("generators", token.pos));
        }
        let next = self.peek_at(1);
        let next_is_name = matches!(
            next.kind,
            TokenKind::Identifier(_) | TokenKind::String(_) | TokenKind::Number(_) | TokenKind::BigInt(_)
        ) || next.is_punct("[")
            || next.is_punct("*");
        if next_is_name {
            if token.is_word("get") || token.is_word("set") {
                return Err(ParseError::unsupported("getters and setters", token.pos));
            }
            if token.is_word("async") {
                return Err(ParseError::unsupported("async functions", token.pos));
            }
        }
        Ok(())
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_word("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                test,
                consequent,
                alternate,
            },
            pos,
        ))
    }

    fn parse_loop_body(&mut self) -> PResult<Box<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_statement();
        self.loop_depth -= 1;
        body.map(Box::new)
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::new(StmtKind::While { test, body }, pos))
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let body = self.parse_loop_body()?;
        self.expect_word("while")?;
        self.expect_punct("(")?;
        let test = self.parse_expression()?;
        self.expect_punct(")")?;
        self.eat_punct(";");
        Ok(Stmt::new(StmtKind::DoWhile { body, test }, pos))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        if self.check_word("await") {
            return Err(ParseError::unsupported("async iteration", self.peek().pos));
        }
        self.expect_punct("(")?;

        let init = if self.check_word("var") || self.check_word("let") || self.check_word("const") {
            let kind = match self.advance().kind {
                TokenKind::Identifier(w) if w == "var" => VarKind::Var,
                TokenKind::Identifier(w) if w == "let" => VarKind::Let,
                _ => VarKind::Const,
            };
            let next = self.peek_at(1);
            if matches!(self.peek().kind, TokenKind::Identifier(_)) && (next.is_word("of") || next.is_word("in")) {
                let (name, name_pos) = self.expect_identifier()?;
                let binding = ForBinding {
                    kind: Some(kind),
                    name,
                    pos: name_pos,
                };
                return self.parse_for_in_of(pos, binding);
            }
            let decls = self.with_no_in(true, |p| p.parse_declarators(kind))?;
            Some(ForInit::VarDecl { kind, decls })
        } else if self.check_punct(";") {
            None
        } else {
            let expr = self.with_no_in(true, |p| p.parse_expression())?;
            if self.check_word("of") || self.check_word("in") {
                let ExprKind::Identifier(name) = &expr.kind else {
                    return Err(ParseError::unsupported(
                        "for-in/for-of over a non-variable target",
                        expr.pos,
                    ));
                };
                let binding = ForBinding {
                    kind: None,
                    name: name.clone(),
                    pos: expr.pos,
                };
                return self.parse_for_in_of(pos, binding);
            }
            Some(ForInit::Expr(expr))
        };

        self.expect_punct(";")?;
        let test = if self.check_punct(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.check_punct(")") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(")")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                test,
                update,
                body,
            },
            pos,
        ))
    }

    fn parse_for_in_of(&mut self, pos: Pos, binding: ForBinding) -> PResult<Stmt> {
        if self.eat_word("of") {
            let iterable = self.parse_assignment()?;
            self.expect_punct(")")?;
            let body = self.parse_loop_body()?;
            return Ok(Stmt::new(
                StmtKind::ForOf {
                    binding,
                    iterable,
                    body,
                },
                pos,
            ));
        }
        self.expect_word("in")?;
        let object = self.parse_expression()?;
        self.expect_punct(")")?;
        let body = self.parse_loop_body()?;
        Ok(Stmt::new(
            StmtKind::ForIn {
                binding,
                object,
                body,
            },
            pos,
        ))
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        if self.fn_stack.is_empty() {
            return Err(ParseError::syntax("return outside of function", pos));
        }
        let token = self.peek();
        let value = if token.is_punct(";") || token.is_punct("}") || token.kind == TokenKind::Eof || token.newline_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume_semicolon()?;
        Ok(Stmt::new(StmtKind::Return(value), pos))
    }

    fn parse_jump(&mut self, is_break: bool) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let keyword = if is_break { "break" } else { "continue" };
        let token = self.peek();
        if matches!(token.kind, TokenKind::Identifier(_)) && !token.newline_before {
            return Err(ParseError::unsupported("labeled statements", token.pos));
        }
        if self.loop_depth == 0 {
            return Err(ParseError::syntax(format!("illegal {keyword} statement"), pos));
        }
        self.consume_semicolon()?;
        let kind = if is_break { StmtKind::Break } else { StmtKind::Continue };
        Ok(Stmt::new(kind, pos))
    }

    fn parse_throw(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        if self.peek().newline_before {
            return Err(ParseError::syntax("illegal newline after throw", self.peek().pos));
        }
        let value = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(Stmt::new(StmtKind::Throw(value), pos))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let block = self.parse_block()?;
        let handler = if self.check_word("catch") {
            let catch_pos = self.advance().pos;
            let (param, param_pos) = if self.eat_punct("(") {
                let (name, name_pos) = self.expect_identifier()?;
                self.expect_punct(")")?;
                (Some(name), name_pos)
            } else {
                (None, catch_pos)
            };
            let body = self.parse_block()?;
            Some(CatchClause { param, param_pos, body })
        } else {
            None
        };
        let finalizer = if self.eat_word("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.expected("'catch' or 'finally'"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                block,
                handler,
                finalizer,
            },
            pos,
        ))
    }

    // ---- expressions ----

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let pos = first.pos;
        let mut exprs = vec![first];
        while self.eat_punct(",") {
            exprs.push(self.parse_assignment()?);
        }
        Ok(Expr::new(ExprKind::Sequence(exprs), pos))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        self.nested(|p| p.parse_assignment_inner())
    }

    fn parse_assignment_inner(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        if let TokenKind::Identifier(name) = &token.kind {
            let next = self.peek_at(1);
            if name == "async" && !next.newline_before {
                let async_arrow = matches!(next.kind, TokenKind::Identifier(_))
                    || (next.is_punct("(") && self.is_arrow_after_paren(self.idx + 1));
                if async_arrow {
                    return Err(ParseError::unsupported("async functions", token.pos));
                }
            }
            if name == "yield" {
                return Err(ParseError::unsupported("generators", token.pos));
            }
            if !is_reserved(name) && next.is_punct("=>") && !next.newline_before {
                self.advance();
                let param = Param {
                    name: name.clone(),
                    default: None,
                    pos: token.pos,
                };
                return self.parse_arrow_rest(vec![param], token.pos);
            }
        }
        if token.is_punct("(") && self.is_arrow_after_paren(self.idx) {
            self.advance();
            let params = self.parse_params()?;
            return self.parse_arrow_rest(params, token.pos);
        }

        let target = self.parse_conditional()?;
        let Some(op) = self.assign_op()? else {
            return Ok(target);
        };
        if !target.is_assignment_target() {
            return match target.kind {
                ExprKind::Array(_) | ExprKind::Object(_) => {
                    Err(ParseError::unsupported("destructuring assignment", target.pos))
                }
                _ => Err(ParseError::syntax("invalid assignment target", target.pos)),
            };
        }
        self.advance();
        let value = self.parse_assignment()?;
        let pos = target.pos;
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            pos,
        ))
    }

    /// Whether the parenthesized group starting at `start` is followed by `=>`
    fn is_arrow_after_paren(&self, start: usize) -> bool {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(start) {
            match token.kind {
                TokenKind::Punct("(") | TokenKind::Punct("[") | TokenKind::Punct("{") => depth += 1,
                TokenKind::Punct(")") | TokenKind::Punct("]") | TokenKind::Punct("}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return self
                            .tokens
                            .get(i + 1)
                            .map(|next| next.is_punct("=>") && !next.newline_before)
                            .unwrap_or(false);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_arrow_rest(&mut self, params: Vec<Param>, pos: Pos) -> PResult<Expr> {
        self.expect_punct("=>")?;
        let ctx = self.current_fn();
        let body = self.in_function(ctx, |p| {
            if p.check_punct("{") {
                Ok(FunctionBody::Block(p.parse_block()?))
            } else {
                Ok(FunctionBody::Expr(Box::new(p.parse_assignment()?)))
            }
        })?;
        let func = Function {
            name: None,
            params,
            body,
            is_arrow: true,
            pos,
            synthetic: false,
        };
        Ok(Expr::new(ExprKind::Function(Rc::new(func)), pos))
    }

    fn assign_op(&self) -> PResult<Option<AssignOp>> {
        let token = self.peek();
        let TokenKind::Punct(p) = token.kind else {
            return Ok(None);
        };
        let op = match p {
            "=" => AssignOp::Assign,
            "+=" => AssignOp::Compound(BinaryOp::Add),
            "-=" => AssignOp::Compound(BinaryOp::Subtract),
            "*=" => AssignOp::Compound(BinaryOp::Multiply),
            "/=" => AssignOp::Compound(BinaryOp::Divide),
            "%=" => AssignOp::Compound(BinaryOp::Modulo),
            "**=" => AssignOp::Compound(BinaryOp::Power),
            "<<=" => AssignOp::Compound(BinaryOp::ShiftLeft),
            ">>=" => AssignOp::Compound(BinaryOp::ShiftRight),
            "&=" => AssignOp::Compound(BinaryOp::BitAnd),
            "|=" => AssignOp::Compound(BinaryOp::BitOr),
            "^=" => AssignOp::Compound(BinaryOp::BitXor),
            "&&=" => AssignOp::Logical(LogicalOp::And),
            "||=" => AssignOp::Logical(LogicalOp::Or),
            "??=" => AssignOp::Logical(LogicalOp::Nullish),
            ">>>=" => return Err(ParseError::unsupported("unsigned shift", token.pos)),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.with_no_in(false, |p| p.parse_assignment())?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        let pos = test.pos;
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            pos,
        ))
    }

    fn binary_op(&self) -> PResult<Option<(u8, BinaryKind)>> {
        let token = self.peek();
        let op = match &token.kind {
            TokenKind::Punct(p) => match *p {
                "??" => (1, BinaryKind::Logical(LogicalOp::Nullish)),
                "||" => (1, BinaryKind::Logical(LogicalOp::Or)),
                "&&" => (2, BinaryKind::Logical(LogicalOp::And)),
                "|" => (3, BinaryKind::Binary(BinaryOp::BitOr)),
                "^" => (4, BinaryKind::Binary(BinaryOp::BitXor)),
                "&" => (5, BinaryKind::Binary(BinaryOp::BitAnd)),
                "==" => (6, BinaryKind::Binary(BinaryOp::Equal)),
                "!=" => (6, BinaryKind::Binary(BinaryOp::NotEqual)),
                "===" => (6, BinaryKind::Binary(BinaryOp::StrictEqual)),
                "!==" => (6, BinaryKind::Binary(BinaryOp::StrictNotEqual)),
                "<" => (7, BinaryKind::Binary(BinaryOp::LessThan)),
                ">" => (7, BinaryKind::Binary(BinaryOp::GreaterThan)),
                "<=" => (7, BinaryKind::Binary(BinaryOp::LessEqual)),
                ">=" => (7, BinaryKind::Binary(BinaryOp::GreaterEqual)),
                "<<" => (8, BinaryKind::Binary(BinaryOp::ShiftLeft)),
                ">>" => (8, BinaryKind::Binary(BinaryOp::ShiftRight)),
                ">>>" => return Err(ParseError::unsupported("unsigned shift", token.pos)),
                "+" => (9, BinaryKind::Binary(BinaryOp::Add)),
                "-" => (9, BinaryKind::Binary(BinaryOp::Subtract)),
                "*" => (10, BinaryKind::Binary(BinaryOp::Multiply)),
                "/" => (10, BinaryKind::Binary(BinaryOp::Divide)),
                "%" => (10, BinaryKind::Binary(BinaryOp::Modulo)),
                "**" => (11, BinaryKind::Binary(BinaryOp::Power)),
                _ => return Ok(None),
            },
            TokenKind::Identifier(w) if w == "instanceof" => (7, BinaryKind::Binary(BinaryOp::InstanceOf)),
            TokenKind::Identifier(w) if w == "in" && !self.no_in => (7, BinaryKind::Binary(BinaryOp::In)),
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, kind)) = self.binary_op()? else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = match kind {
                // `**` is right associative
                BinaryKind::Binary(BinaryOp::Power) => self.nested(|p| p.parse_binary(prec))?,
                _ => self.nested(|p| p.parse_binary(prec + 1))?,
            };
            let pos = left.pos;
            let (left_box, right_box) = (Box::new(left), Box::new(right));
            left = match kind {
                BinaryKind::Binary(op) => Expr::new(
                    ExprKind::Binary {
                        op,
                        left: left_box,
                        right: right_box,
                    },
                    pos,
                ),
                BinaryKind::Logical(op) => Expr::new(
                    ExprKind::Logical {
                        op,
                        left: left_box,
                        right: right_box,
                    },
                    pos,
                ),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let token = self.peek().clone();
        let pos = token.pos;
        let op = match &token.kind {
            TokenKind::Punct("-") => Some(UnaryOp::Minus),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Identifier(w) if w == "typeof" => Some(UnaryOp::Typeof),
            TokenKind::Identifier(w) if w == "void" => Some(UnaryOp::Void),
            TokenKind::Identifier(w) if w == "delete" => Some(UnaryOp::Delete),
            TokenKind::Identifier(w) if w == "await" => {
                return Err(ParseError::unsupported("async functions", pos))
            }
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.nested(|p| p.parse_unary())?;
            if self.check_punct("**") {
                return Err(ParseError::syntax(
                    "unary operator used immediately before exponentiation",
                    self.peek().pos,
                ));
            }
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                pos,
            ));
        }

        if token.is_punct("++") || token.is_punct("--") {
            self.advance();
            let target = self.nested(|p| p.parse_unary())?;
            if !target.is_assignment_target() {
                return Err(ParseError::syntax("invalid update target", target.pos));
            }
            let op = if token.is_punct("++") {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                pos,
            ));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_lhs()?;
        let token = self.peek();
        if (token.is_punct("++") || token.is_punct("--")) && !token.newline_before {
            let op = if token.is_punct("++") {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            if !expr.is_assignment_target() {
                return Err(ParseError::syntax("invalid update target", expr.pos));
            }
            self.advance();
            let pos = expr.pos;
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: false,
                    target: Box::new(expr),
                },
                pos,
            ));
        }
        Ok(expr)
    }

    /// Member access, calls and `new`
    fn parse_lhs(&mut self) -> PResult<Expr> {
        let mut expr = if self.check_word("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if let Some(member) = self.parse_member_suffix(&expr)? {
                expr = member;
            } else if self.check_punct("(") {
                let args = self.parse_arguments()?;
                let pos = expr.pos;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    pos,
                );
            } else if self.check_punct("`") {
                return Err(ParseError::unsupported("template literals", self.peek().pos));
            } else {
                return Ok(expr);
            }
        }
    }

    /// `.name` or `[key]` applied to `object`, if one follows
    fn parse_member_suffix(&mut self, object: &Expr) -> PResult<Option<Expr>> {
        let property = if self.check_punct("?.") {
            return Err(ParseError::unsupported("optional chaining", self.peek().pos));
        } else if self.eat_punct(".") {
            MemberProp::Named(self.expect_property_name()?)
        } else if self.eat_punct("[") {
            let key = self.with_no_in(false, |p| p.parse_expression())?;
            self.expect_punct("]")?;
            MemberProp::Computed(Box::new(key))
        } else {
            return Ok(None);
        };
        Ok(Some(Expr::new(
            ExprKind::Member {
                object: Box::new(object.clone()),
                property,
            },
            object.pos,
        )))
    }

    fn parse_new(&mut self) -> PResult<Expr> {
        let pos = self.advance().pos;
        if self.check_punct(".") {
            return Err(ParseError::unsupported("new.target", pos));
        }
        let mut callee = if self.check_word("new") {
            self.nested(|p| p.parse_new())?
        } else {
            self.parse_primary()?
        };
        while let Some(member) = self.parse_member_suffix(&callee)? {
            callee = member;
        }
        let args = if self.check_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::new(
            ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            pos,
        ))
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_punct("(")?;
        self.with_no_in(false, |p| {
            let mut args = Vec::new();
            loop {
                if p.eat_punct(")") {
                    return Ok(args);
                }
                if p.check_punct("...") {
                    return Err(ParseError::unsupported("spread arguments", p.peek().pos));
                }
                args.push(p.parse_assignment()?);
                if !p.eat_punct(",") {
                    p.expect_punct(")")?;
                    return Ok(args);
                }
            }
        })
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.advance();
        let pos = token.pos;
        let kind = match token.kind {
            TokenKind::Number(n) => ExprKind::Number(n),
            TokenKind::BigInt(n) => ExprKind::BigInt(n),
            TokenKind::String(s) => ExprKind::String(s),
            TokenKind::Punct("(") => {
                let expr = self.with_no_in(false, |p| p.parse_expression())?;
                self.expect_punct(")")?;
                return Ok(expr);
            }
            TokenKind::Punct("[") => return self.parse_array_rest(pos),
            TokenKind::Punct("{") => return self.parse_object_rest(pos),
            TokenKind::Punct("/") | TokenKind::Punct("/=") => {
                return Err(ParseError::unsupported("regular expression literals", pos))
            }
            TokenKind::Punct("`") => return Err(ParseError::unsupported("template literals", pos)),
            TokenKind::Punct("#") => return Err(ParseError::unsupported("private names", pos)),
            TokenKind::Identifier(word) => match word.as_str() {
                "true" => ExprKind::Boolean(true),
                "false" => ExprKind::Boolean(false),
                "null" => ExprKind::Null,
                "this" => ExprKind::This,
                "function" => return self.parse_function_expression(pos),
                "class" => return Err(ParseError::unsupported("class expressions", pos)),
                "super" => return self.parse_super(pos),
                "new" => {
                    self.idx -= 1;
                    return self.parse_new();
                }
                "yield" => return Err(ParseError::unsupported("generators", pos)),
                "await" => return Err(ParseError::unsupported("async functions", pos)),
                "import" => return Err(ParseError::unsupported("modules", pos)),
                w if is_reserved(w) => return Err(ParseError::syntax(format!("unexpected keyword '{w}'"), pos)),
                _ => ExprKind::Identifier(word),
            },
            TokenKind::Eof => return Err(ParseError::syntax("unexpected end of input", pos)),
            TokenKind::Punct(p) => return Err(ParseError::syntax(format!("unexpected token '{p}'"), pos)),
        };
        Ok(Expr::new(kind, pos))
    }

    fn parse_function_expression(&mut self, pos: Pos) -> PResult<Expr> {
        if self.check_punct("*") {
            return Err(ParseError::unsupported("generators", self.peek().pos));
        }
        let name = match &self.peek().kind {
            TokenKind::Identifier(_) => Some(self.expect_identifier()?.0),
            _ => None,
        };
        let func = self.parse_function_rest(name, pos, FnContext::default())?;
        Ok(Expr::new(ExprKind::Function(Rc::new(func)), pos))
    }

    fn parse_super(&mut self, pos: Pos) -> PResult<Expr> {
        let ctx = self.current_fn();
        if self.check_punct("(") {
            if !ctx.super_call {
                return Err(ParseError::syntax("'super' call outside of a derived constructor", pos));
            }
            let args = self.parse_arguments()?;
            return Ok(Expr::new(ExprKind::SuperCall(args), pos));
        }
        if self.check_punct("[") {
            return Err(ParseError::unsupported("computed super property", pos));
        }
        if !ctx.super_prop || !self.eat_punct(".") {
            return Err(ParseError::syntax("'super' keyword unexpected here", pos));
        }
        let name = self.expect_property_name()?;
        Ok(Expr::new(ExprKind::SuperMember(name), pos))
    }

    fn parse_array_rest(&mut self, pos: Pos) -> PResult<Expr> {
        let elements = self.with_no_in(false, |p| {
            let mut elements = Vec::new();
            loop {
                if p.eat_punct("]") {
                    return Ok(elements);
                }
                if p.check_punct(",") {
                    return Err(ParseError::unsupported("array holes", p.peek().pos));
                }
                if p.check_punct("...") {
                    return Err(ParseError::unsupported("spread elements", p.peek().pos));
                }
                elements.push(p.parse_assignment()?);
                if !p.eat_punct(",") {
                    p.expect_punct("]")?;
                    return Ok(elements);
                }
            }
        })?;
        Ok(Expr::new(ExprKind::Array(elements), pos))
    }

    fn parse_object_rest(&mut self, pos: Pos) -> PResult<Expr> {
        let props = self.with_no_in(false, |p| {
            let mut props = Vec::new();
            loop {
                if p.eat_punct("}") {
                    return Ok(props);
                }
                props.push(p.parse_property()?);
                if !p.eat_punct(",") {
                    p.expect_punct("}")?;
                    return Ok(props);
                }
            }
        })?;
        Ok(Expr::new(ExprKind::Object(props), pos))
    }

    fn parse_property(&mut self) -> PResult<Property> {
        let token = self.peek().clone();
        let pos = token.pos;
        if token.is_punct("...") {
            return Err(ParseError::unsupported("spread properties", pos));
        }
        self.reject_accessor_prefix()?;

        let (key, shorthand) = match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                (PropKey::Named(name.clone()), Some(name))
            }
            TokenKind::String(s) => {
                self.advance();
                (PropKey::Named(s), None)
            }
            TokenKind::Number(n) => {
                self.advance();
                (PropKey::Named(number_to_string(n)), None)
            }
            TokenKind::BigInt(n) => {
                self.advance();
                (PropKey::Named(n.to_string()), None)
            }
            TokenKind::Punct("[") => {
                self.advance();
                let key = self.parse_assignment()?;
                self.expect_punct("]")?;
                (PropKey::Computed(Box::new(key)), None)
            }
            _ => return Err(self.expected("property name")),
        };

        if self.eat_punct(":") {
            let value = self.parse_assignment()?;
            return Ok(Property {
                key,
                value,
                pos,
                method: false,
            });
        }
        if self.check_punct("(") {
            let func = self.parse_function_rest(None, pos, FnContext::default())?;
            return Ok(Property {
                key,
                value: Expr::new(ExprKind::Function(Rc::new(func)), pos),
                pos,
                method: true,
            });
        }
        match shorthand {
            Some(name) if self.check_punct(",") || self.check_punct("}") => {
                if is_reserved(&name) {
                    return Err(ParseError::syntax(format!("unexpected keyword '{name}'"), pos));
                }
                Ok(Property {
                    key,
                    value: Expr::new(ExprKind::Identifier(name), pos),
                    pos,
                    method: false,
                })
            }
            Some(_) if self.check_punct("=") => Err(ParseError::unsupported("destructuring patterns", pos)),
            _ => Err(self.expected("':'")),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Identifier(name) => format!("'{name}'"),
        TokenKind::Number(n) => format!("number {}", number_to_string(*n)),
        TokenKind::BigInt(n) => format!("bigint {n}n"),
        TokenKind::String(s) => format!("string \"{s}\""),
        TokenKind::Punct(p) => format!("'{p}'"),
        TokenKind::Eof => "end of input".to_string(),
    }
}
