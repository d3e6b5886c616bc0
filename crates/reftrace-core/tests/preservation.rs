//! Instrumented programs behave exactly like the programs they came from

use pretty_assertions::assert_eq;
use reftrace_core::{PlainRun, TraceRuntime};

const CORPUS: &[&str] = &[
    // closures
    r#"
function counter(start) {
  let n = start;
  return { inc: () => ++n, get() { return n; } };
}
const c = counter(10);
c.inc();
c.inc();
[c.get(), c.inc()]
"#,
    // classes
    r#"
class Animal {
  constructor(name) { this.name = name; this.sounds = []; }
  speak(s) { this.sounds.push(s); return this; }
}
class Dog extends Animal {
  constructor(name) { super(name); this.kind = "dog"; }
  speak() { return super.speak("woof"); }
}
const d = new Dog("rex");
d.speak().speak();
console.log(d.name, d.sounds.length);
d
"#,
    // literal shapes and key order
    r#"
const k = "dyn";
const o = { a: 1, m() { return this.a; }, [k + 1]: 2, b: [1, [2, 3], { c: 4 }] };
o.z = o.m();
delete o.a;
o.b[1].push(o.z);
[Object.keys(o).join(), o]
"#,
    // compound and logical assignment
    r#"
const s = { n: 1, list: [] };
let t = 0;
s.n += 4;
s.n **= 2;
t ||= s.n;
s.missing ??= "set";
s.list[3] = "far";
s.n++;
--t;
[s, t, s.list.length]
"#,
    // loops and control flow
    r#"
const out = [];
for (const key in { p: 1, q: 2 }) { out.push(key); }
for (const ch of "hi") { out.push(ch.toUpperCase()); }
let i = 0;
while (true) {
  i++;
  if (i % 2) continue;
  if (i > 6) break;
  out.push(i);
}
do { i--; } while (i > 3);
out.concat([i]).join("-")
"#,
    // exceptions caught and rethrown
    r#"
const log = [];
function risky(x) {
  try {
    if (x > 1) throw new RangeError("too big: " + x);
    return x;
  } catch (e) {
    log.push(e.name);
    throw e;
  } finally {
    log.push("finally");
  }
}
try { risky(5); } catch (e) { log.push(e.message); }
log.push(risky(1));
log
"#,
    // uncaught error
    r#"
const holder = {};
console.log("before");
holder.inner.value = 1;
"#,
    // thrown primitive
    r#"
function fail() { throw { code: 7 }; }
fail()
"#,
    // calling a non-function
    r#"
const api = { list: [] };
api.fetch(1)
"#,
    // array builtins
    r#"
const xs = [5, 3, 8, 1];
const doubled = xs.map((x) => x * 2).filter((x) => x > 5);
xs.reverse();
xs.splice(1, 2, "a", "b", "c");
const total = doubled.reduce((acc, x) => acc + x, 0);
xs.unshift(xs.shift());
[xs, doubled, total, xs.indexOf("b"), xs.includes(8)]
"#,
    // Object.assign and aliasing
    r#"
const base = { x: 1 };
const copy = Object.assign({}, base, { y: 2 });
const alias = copy;
alias.x = 9;
[base.x, copy.x, copy === alias]
"#,
    // recursion
    r#"
function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
const memo = {};
function walk(node, depth) {
  if (!node) return depth;
  memo[depth] = node.v;
  return walk(node.next, depth + 1);
}
[fib(12), walk({ v: 1, next: { v: 2, next: null } }, 0), memo]
"#,
    // typeof and void
    r#"
const f = function () { return typeof undefinedName; };
let u;
[f(), typeof u, void 0, typeof {}, typeof []]
"#,
];

fn plain(source: &str) -> PlainRun {
    TraceRuntime::default().run_plain(source).unwrap()
}

#[test]
fn test_tracing_preserves_program_behavior() {
    let runtime = TraceRuntime::default();
    for source in CORPUS {
        let expected = plain(source);
        let traced = runtime.trace_source(source).unwrap();
        let actual = PlainRun {
            error: traced.error.clone(),
            console: traced.console.clone(),
            completion: traced.completion.clone(),
        };
        assert_eq!(actual, expected, "behavior changed for:\n{source}");
        assert_eq!(traced.trace.skipped, 0, "skipped events for:\n{source}");
    }
}

#[test]
fn test_corpus_covers_success_and_failure() {
    let outcomes: Vec<bool> = CORPUS.iter().map(|s| plain(s).error.is_none()).collect();
    assert!(outcomes.iter().any(|ok| *ok));
    assert_eq!(outcomes.iter().filter(|ok| !**ok).count(), 3);
}

#[test]
fn test_uncaught_errors_match() {
    let run = plain(CORPUS[6]);
    let error = run.error.unwrap();
    assert_eq!(error.name, "TypeError");
    assert_eq!(error.message, "Cannot set properties of undefined (setting 'value')");
    assert_eq!(run.console, vec!["before".to_string()]);

    let thrown = plain(CORPUS[7]).error.unwrap();
    assert_eq!(thrown.name, "Uncaught");
    assert_eq!(thrown.message, "{ code: 7 }");

    let call = plain(CORPUS[8]).error.unwrap();
    assert_eq!(call.message, "fetch is not a function");
}

#[test]
fn test_user_names_shaped_like_temporaries_are_not_shadowed() {
    let source = r#"
var __tr_o1 = 5;
var __tr_k2 = "x";
var __tr_r3 = [];
const a = {};
a.x = __tr_o1;
a[__tr_k2] += __tr_o1;
delete a[__tr_k2];
__tr_r3.push(a.y = __tr_o1);
console.log(a.y, __tr_r3.length, __tr_k2);
[a, __tr_o1, __tr_r3]
"#;
    let expected = plain(source);
    assert_eq!(expected.console, vec!["5 1 x".to_string()]);
    let traced = TraceRuntime::default().trace_source(source).unwrap();
    let actual = PlainRun {
        error: traced.error.clone(),
        console: traced.console.clone(),
        completion: traced.completion.clone(),
    };
    assert_eq!(actual, expected);
}
