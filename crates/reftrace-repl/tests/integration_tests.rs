use std::io::Write;

use reftrace_core::{ObjKind, TraceConfig};
use reftrace_repl::repl::{Repl, ReplCommand};
use tempfile::NamedTempFile;

const SCRIPT: &str = "const x = 1;\nconst y = { a: x };\ny.a = 2;\n";

fn script_file(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn loaded_repl(source: &str) -> (Repl, NamedTempFile) {
    let file = script_file(source);
    let mut repl = Repl::with_config(TraceConfig::default()).unwrap();
    repl.set_quiet(true);
    let path = file.path().to_str().unwrap().to_string();
    let output = repl.handle_command(ReplCommand::Load(path)).unwrap();
    assert!(output.contains("Traced 3 steps"), "{output}");
    (repl, file)
}

#[test]
fn test_load_reports_outcome() {
    let (repl, _file) = loaded_repl(SCRIPT);
    assert_eq!(repl.current_step(), Some(0));
    let session = repl.session().unwrap();
    assert_eq!(session.source, SCRIPT);
    assert!(session.origin.is_some());
    assert_eq!(session.run.completion.as_deref(), Some("2"));
}

#[test]
fn test_stepping_through_roots() {
    let (mut repl, _file) = loaded_repl(SCRIPT);

    let first = repl.handle_command(ReplCommand::Roots).unwrap();
    assert_eq!(first, "  x = 1");

    let next = repl.handle_command(ReplCommand::Next).unwrap();
    assert!(next.starts_with("Step 1/2 at L2:7"), "{next}");
    assert!(next.ends_with("  x = 1\n  y = o1"), "{next}");

    let objects = repl.handle_command(ReplCommand::Objects).unwrap();
    assert_eq!(objects, "  o1 object {a: 1}");

    repl.handle_command(ReplCommand::Last).unwrap();
    let objects = repl.handle_command(ReplCommand::Objects).unwrap();
    assert_eq!(objects, "  o1 object {a: 2}");
    assert!(repl.handle_command(ReplCommand::Next).is_err());

    repl.handle_command(ReplCommand::First).unwrap();
    assert!(repl.handle_command(ReplCommand::Prev).is_err());
    assert!(repl.handle_command(ReplCommand::Step(3)).is_err());
}

#[test]
fn test_json_view_is_heap_state() {
    let (mut repl, _file) = loaded_repl(SCRIPT);
    repl.handle_command(ReplCommand::Last).unwrap();
    let json = repl.handle_command(ReplCommand::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["roots"]["y"]["id"], "o1");
    assert_eq!(value["objects"]["o1"]["props"]["a"]["v"]["value"], 2.0);
    assert_eq!(value["lastWrite"]["o1:a"]["checkpointId"], "L3:1");

    let state = repl.current_state().unwrap();
    assert_eq!(state.objects.values().next().unwrap().obj_kind, ObjKind::Object);
}

#[test]
fn test_source_marks_current_line() {
    let (mut repl, _file) = loaded_repl(SCRIPT);
    repl.handle_command(ReplCommand::Step(2)).unwrap();
    let source = repl.handle_command(ReplCommand::Source).unwrap();
    assert_eq!(
        source,
        "     1 | const x = 1;\n     2 | const y = { a: x };\n=>   3 | y.a = 2;"
    );
    let instrumented = repl.handle_command(ReplCommand::Instrumented).unwrap();
    assert!(instrumented.starts_with("(function (__tr) {"), "{instrumented}");
}

#[test]
fn test_events_and_calls() {
    let mut repl = Repl::with_config(TraceConfig::default()).unwrap();
    repl.trace_program("function f() { return 1; }\nf();").unwrap();
    repl.handle_command(ReplCommand::Last).unwrap();
    let calls = repl.handle_command(ReplCommand::Calls).unwrap();
    assert!(calls.contains("enter f @"), "{calls}");
    assert!(calls.contains("exit f @"), "{calls}");

    repl.handle_command(ReplCommand::First).unwrap();
    let events = repl.handle_command(ReplCommand::Events).unwrap();
    assert!(!events.contains("(no events)"), "{events}");
}

#[test]
fn test_debug_mode_shows_events_while_stepping() {
    let (mut repl, _file) = loaded_repl(SCRIPT);
    repl.handle_command(ReplCommand::Debug).unwrap();
    let output = repl.handle_command(ReplCommand::Step(2)).unwrap();
    assert!(output.contains("Events:"), "{output}");
}

#[test]
fn test_stats() {
    let (mut repl, _file) = loaded_repl(SCRIPT);
    let stats = repl.handle_command(ReplCommand::Stats).unwrap();
    assert!(stats.contains("Steps: 3"), "{stats}");
    assert!(stats.contains("Outcome: completed"), "{stats}");
    assert!(stats.contains("Skipped events: 0"), "{stats}");
}

#[test]
fn test_program_errors_still_load() {
    let mut repl = Repl::with_config(TraceConfig::default()).unwrap();
    let (output, _) = repl.trace_program("const a = {};\na.b.c = 1;").unwrap();
    assert!(
        output.contains("Uncaught TypeError: Cannot set properties of undefined (setting 'c')"),
        "{output}"
    );
    assert!(repl.handle_command(ReplCommand::Roots).unwrap().contains("a = o1"));
}

#[test]
fn test_commands_without_trace() {
    let mut repl = Repl::with_config(TraceConfig::default()).unwrap();
    assert!(repl.handle_command(ReplCommand::Roots).is_err());
    assert!(repl.handle_command(ReplCommand::Next).is_err());
    assert!(repl.handle_command(ReplCommand::Help).unwrap().contains(".step <n>"));
    assert!(repl.handle_command(ReplCommand::Load("/nonexistent/x.js".into())).is_err());
    assert!(repl.trace_program("let __tr = 1;").is_err());
    assert!(repl.session().is_none());

    repl.handle_command(ReplCommand::Quit).unwrap();
    assert!(!repl.is_running());
}

#[test]
fn test_dispatch_and_submit_report_through_notifier() {
    use reftrace_repl::BufferedNotifier;
    use std::sync::Arc;

    let notifier = Arc::new(BufferedNotifier::new());
    let mut repl = Repl::with_config(TraceConfig::default()).unwrap();
    repl.set_notifier(Box::new(notifier.clone()));

    repl.dispatch(".roots");
    repl.submit("const list = [1];\nlist.push(2);");
    repl.dispatch(".last");
    repl.dispatch(".bogus");

    let lines = notifier.lines();
    assert_eq!(lines.len(), 4, "{lines:?}");
    assert!(lines[0].starts_with("error: Error: No trace loaded"), "{}", lines[0]);
    assert!(lines[1].starts_with("=> 2\nTraced"), "{}", lines[1]);
    assert!(lines[2].ends_with("  list = o1"), "{}", lines[2]);
    assert_eq!(lines[3], "error: Error: Unknown command: .bogus");
}
