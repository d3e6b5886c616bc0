use super::*;
use crate::ast::*;

fn parse(source: &str) -> Program {
    parse_program(source).unwrap()
}

fn only_expr(source: &str) -> Expr {
    match parse(source).body.remove(0).kind {
        StmtKind::Expr(expr) => expr,
        other => panic!("expected an expression statement, got {other:?}"),
    }
}

#[test]
fn test_declarations_carry_identifier_positions() {
    let program = parse("let a = 1,\n    b = 2;");
    match &program.body[0].kind {
        StmtKind::VarDecl { kind, decls } => {
            assert_eq!(*kind, VarKind::Let);
            assert_eq!(decls[0].pos, Pos::new(1, 5));
            assert_eq!(decls[1].pos, Pos::new(2, 5));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_assignment_position_is_target_start() {
    let expr = only_expr("  obj.field = 3");
    assert_eq!(expr.pos, Pos::new(1, 3));
    match expr.kind {
        ExprKind::Assign { op, target, .. } => {
            assert_eq!(op, AssignOp::Assign);
            assert!(matches!(target.kind, ExprKind::Member { .. }));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_compound_and_logical_assignment() {
    assert!(matches!(
        only_expr("x += 1").kind,
        ExprKind::Assign {
            op: AssignOp::Compound(BinaryOp::Add),
            ..
        }
    ));
    assert!(matches!(
        only_expr("x ??= 1").kind,
        ExprKind::Assign {
            op: AssignOp::Logical(LogicalOp::Nullish),
            ..
        }
    ));
}

#[test]
fn test_call_position_is_callee_start() {
    let expr = only_expr("list.push(1, 2)");
    assert_eq!(expr.pos, Pos::new(1, 1));
    match expr.kind {
        ExprKind::Call { callee, args } => {
            assert_eq!(args.len(), 2);
            assert!(matches!(
                callee.kind,
                ExprKind::Member {
                    property: MemberProp::Named(ref name),
                    ..
                } if name == "push"
            ));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_precedence() {
    match only_expr("1 + 2 * 3").kind {
        ExprKind::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    op: BinaryOp::Multiply,
                    ..
                }
            ));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_object_literal_properties() {
    let expr = only_expr("({ a: 1, b, m() { return 2; }, [k]: 3, 4: 5 })");
    let ExprKind::Object(props) = expr.kind else {
        panic!("expected an object literal");
    };
    assert_eq!(props.len(), 5);
    assert_eq!(props[0].key, PropKey::Named("a".into()));
    assert!(matches!(props[1].value.kind, ExprKind::Identifier(ref n) if n == "b"));
    assert!(props[2].method);
    assert!(matches!(props[3].key, PropKey::Computed(_)));
    assert_eq!(props[4].key, PropKey::Named("4".into()));
}

#[test]
fn test_arrow_functions() {
    let expr = only_expr("(a, b = 2) => a + b");
    let ExprKind::Function(func) = expr.kind else {
        panic!("expected a function");
    };
    assert!(func.is_arrow);
    assert_eq!(func.params.len(), 2);
    assert!(func.params[1].default.is_some());
    assert!(matches!(func.body, FunctionBody::Expr(_)));
}

#[test]
fn test_class_declaration() {
    let program = parse("class B extends A { constructor(x) { super(x); } static make() { return new B(1); } run() {} }");
    let StmtKind::ClassDecl(class) = &program.body[0].kind else {
        panic!("expected a class");
    };
    assert_eq!(class.name, "B");
    assert!(class.parent.is_some());
    assert!(class.constructor.is_some());
    assert_eq!(class.methods.len(), 2);
    assert!(class.methods[0].is_static);
    assert_eq!(class.methods[1].name, "run");
}

#[test]
fn test_loops_and_bindings() {
    let program = parse("for (const k in o) {}\nfor (v of list) {}\nfor (let i = 0; i < 2; i++) {}");
    match &program.body[0].kind {
        StmtKind::ForIn { binding, .. } => {
            assert_eq!(binding.kind, Some(VarKind::Const));
            assert_eq!(binding.name, "k");
        }
        other => panic!("unexpected {other:?}"),
    }
    match &program.body[1].kind {
        StmtKind::ForOf { binding, .. } => assert_eq!(binding.kind, None),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(program.body[2].kind, StmtKind::For { .. }));
}

#[test]
fn test_try_catch() {
    let program = parse("try { f(); } catch (err) { g(err); } finally { h(); }");
    let StmtKind::Try {
        handler, finalizer, ..
    } = &program.body[0].kind
    else {
        panic!("expected try");
    };
    let handler = handler.as_ref().unwrap();
    assert_eq!(handler.param.as_deref(), Some("err"));
    assert_eq!(handler.param_pos, Pos::new(1, 21));
    assert!(finalizer.is_some());
}

#[test]
fn test_syntax_errors() {
    for source in ["let = 1;", "a +", "if (x {}", "const c;"] {
        let err = parse_program(source).unwrap_err();
        assert!(!err.is_unsupported(), "{source}: {err}");
    }
}

#[test]
fn test_unsupported_features() {
    for source in [
        "async function f() {}",
        "function* g() {}",
        "const { a } = o;",
        "x?.y",
        "`template`",
        "switch (x) {}",
        "class K { #p = 1 }",
        "import x from 'y';",
    ] {
        let err = parse_program(source).unwrap_err();
        assert!(err.is_unsupported(), "{source}: {err}");
    }
}

#[test]
fn test_nesting_limit() {
    let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    assert!(parse_program(&deep).is_err());
    // Deep recursive descent needs more than the default test thread stack
    let parsed = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || ScriptParser::with_max_depth(2048).parse_program(&deep).is_ok())
        .unwrap()
        .join()
        .unwrap();
    assert!(parsed);
}

#[test]
fn test_create_parser() {
    let mut parser = create_parser();
    assert_eq!(parser.name(), "script");
    assert!(parser.parse_program("1 + 1").is_ok());
}
