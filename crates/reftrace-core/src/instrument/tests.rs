use super::*;
use crate::parser::Parser;

fn instrument(source: &str) -> String {
    Instrumenter::new().instrument(source).unwrap()
}

fn reparses(output: &str) -> bool {
    ScriptParser::with_max_depth(2048).parse_program(output).is_ok()
}

#[test]
fn test_output_is_a_wrapper_function() {
    let output = instrument("let x = 1;");
    assert!(output.starts_with("(function (__tr) {"), "{output}");
    assert!(reparses(&output));
}

#[test]
fn test_declaration_reports_root() {
    let output = instrument("let x = 1;");
    assert!(output.contains(r#"let x = __tr.step("L1:5", __tr.rootSet("x", 1, "L1:5"));"#), "{output}");
}

#[test]
fn test_bare_var_is_not_reported() {
    let output = instrument("var x;");
    assert!(output.contains("var x;"), "{output}");
    assert!(!output.contains("rootSet"));
}

#[test]
fn test_bare_let_reports_undefined() {
    let output = instrument("let y;");
    assert!(output.contains(r#"__tr.rootSet("y", void 0, "L1:5")"#), "{output}");
}

#[test]
fn test_member_assignment_goes_through_write() {
    let output = instrument("let o = {}; o.a = 2;");
    assert!(
        output.contains(r#"((__tr_o1, __tr_k2) => __tr.write(__tr_o1, __tr_k2, __tr_o1[__tr_k2] = 2, "L1:13"))(o, "a")"#),
        "{output}"
    );
    assert!(reparses(&output));
}

#[test]
fn test_trailing_expression_becomes_return() {
    let output = instrument("let a = 1;\na + 2");
    assert!(output.contains("return a + 2;"), "{output}");
}

#[test]
fn test_method_call_syncs_receiver() {
    let output = instrument("let arr = [];\narr.push(1);");
    assert!(output.contains(r#"__tr.sync(__tr_o1, __tr_o1.push(1), "L2:1")"#), "{output}");
    assert!(output.contains("__tr.intern([])"));
}

#[test]
fn test_function_body_reports_frame() {
    let output = instrument("function f(a) { let t = a; return t; }");
    assert!(output.contains(r#"__tr.enter("f", "L1:1")"#), "{output}");
    assert!(output.contains(r#"__tr.rootSet("a", a, "L1:12")"#));
    assert!(output.contains(r#"__tr.rootDel("a", "L1:1")"#));
    assert!(output.contains(r#"__tr.rootDel("t", "L1:1")"#));
    assert!(output.contains(r#"__tr.exit("f", "L1:1")"#));
    assert!(output.contains("finally"));
    // Hoisted declarations are reported before any other statement of the block
    let report = output.find(r#"__tr.rootSet("f", f"#).unwrap();
    let decl = output.find("function f(a)").unwrap();
    assert!(report < decl);
}

#[test]
fn test_anonymous_functions_take_binding_name() {
    let output = instrument("const g = (n) => n * 2;");
    assert!(output.contains(r#"__tr.enter("g""#), "{output}");
    let output = instrument("[1].map(function (v) { return v; });");
    assert!(output.contains(r#"__tr.enter("(anonymous)""#), "{output}");
}

#[test]
fn test_literal_methods_stay_in_literal() {
    let output = instrument("let o = { m() { return 1; }, v: 2 };");
    assert!(output.contains("__tr.intern({m() {"), "{output}");
    assert!(output.contains(r#"__tr.write(__tr_o1, "v", __tr_o1["v"] = 2"#), "{output}");
    assert!(reparses(&output));
}

#[test]
fn test_array_literal_elements_are_written() {
    let output = instrument("let a = [10, 20];");
    assert!(output.contains(r#"__tr.write(__tr_o1, "0", __tr_o1[0] = 10, "L1:10")"#), "{output}");
    assert!(output.contains(r#"__tr.write(__tr_o1, "1", __tr_o1[1] = 20, "L1:14")"#), "{output}");
}

#[test]
fn test_delete_reports_after_removal() {
    let output = instrument("let o = {a: 1};\ndelete o.a;");
    assert!(output.contains(r#"__tr.del("#), "{output}");
    let removal = output.find("(delete __tr_o").unwrap();
    let hook = output.find("__tr.del(").unwrap();
    assert!(removal < hook);
}

#[test]
fn test_loop_and_catch_bindings_are_roots() {
    let output = instrument("for (const v of [1]) {}\ntry { throw 1; } catch (e) {}");
    assert!(output.contains(r#"__tr.rootSet("v", v, "L1:12")"#), "{output}");
    assert!(output.contains(r#"__tr.rootSet("e", e, "L2:25")"#), "{output}");
}

#[test]
fn test_class_declaration_reported_after_definition() {
    let output = instrument("class P { constructor(x) { this.x = x; } }");
    let class = output.find("class P").unwrap();
    let report = output.find(r#"__tr.rootSet("P", P"#).unwrap();
    assert!(class < report, "{output}");
    assert!(output.contains(r#"__tr.enter("P""#));
    assert!(reparses(&output));
}

#[test]
fn test_internal_names_are_not_roots() {
    let output = instrument("let __tr_tmp = 1;\n__tr_tmp = 2;");
    assert!(!output.contains("rootSet"), "{output}");
}

#[test]
fn test_reserved_hooks_name_is_rejected() {
    let err = Instrumenter::new().instrument("let __tr = 1;").unwrap_err();
    assert_eq!(
        err,
        InstrumentError::Unsupported {
            message: "`__tr` is reserved for the tracing runtime".to_string(),
            pos: Pos::new(1, 5),
        }
    );
}

#[test]
fn test_parse_errors_are_reported() {
    let err = Instrumenter::new().instrument("let = ;").unwrap_err();
    assert!(matches!(err, InstrumentError::Parse(_)), "{err:?}");
}

#[test]
fn test_unsupported_syntax_is_classified() {
    for source in ["async function f() {}", "function* g() {}", "let [a, b] = [1, 2];"] {
        let err = Instrumenter::new().instrument(source).unwrap_err();
        assert!(matches!(err, InstrumentError::Unsupported { .. }), "{source}: {err:?}");
    }
}

#[test]
fn test_temporaries_are_unique() {
    let output = instrument("let o = {}; o.a = 1; o.b = 2; o.c.d = 3;");
    for temp in ["__tr_o1", "__tr_k2", "__tr_o3", "__tr_k4", "__tr_o5", "__tr_k6"] {
        assert!(output.contains(temp), "{temp} missing in {output}");
    }
}

#[test]
fn test_nested_output_reparses() {
    let source = r#"
class Node {
  constructor(value) { this.value = value; this.next = null; }
}
class List {
  constructor() { this.head = null; this.size = 0; }
  push(value) {
    const node = new Node(value);
    node.next = this.head;
    this.head = node;
    this.size++;
    return this;
  }
}
const list = new List();
for (let i = 0; i < 3; i++) { list.push({ i, tags: [i, i * 2] }); }
const copy = Object.assign({}, { a: 1 });
delete copy.a;
list.size
"#;
    let output = instrument(source);
    assert!(reparses(&output), "{output}");
}
