use std::{
    io::{self, IsTerminal},
    time::Duration,
};

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use reftrace_core::{init_tracing, init_tracing_with_default, TraceConfig, TraceRuntime};
use reftrace_repl::repl::{LineProcessResult, MultiLineCollector, Repl, ReplCommand};

/// Log directive for `--debug` when `RUST_LOG` is unset
const DEBUG_LOG_DIRECTIVE: &str = "reftrace_core=debug,reftrace_repl=debug";

fn main() -> Result<()> {
    let defaults = TraceConfig::default();

    // Parse command line arguments
    let matches = Command::new("reftrace-repl")
        .version(reftrace_core::VERSION)
        .about("Trace a script's heap references and step through them")
        .arg(
            Arg::new("file")
                .value_name("FILE")
                .help("Trace this script file on startup")
                .index(1),
        )
        .arg(
            Arg::new("snapshot-interval")
                .long("snapshot-interval")
                .value_name("STEPS")
                .help("Take a full heap snapshot every STEPS steps")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .help("Abandon a run after MS milliseconds")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_name("FRAMES")
                .help("Maximum script call depth")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug mode")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Extract command line options
    let input_file = matches.get_one::<String>("file").cloned();
    let debug = matches.get_flag("debug");

    // Initialize logging
    if debug {
        init_tracing_with_default(DEBUG_LOG_DIRECTIVE);
    } else {
        init_tracing();
    }

    let config = TraceConfig {
        snapshot_interval: matches
            .get_one::<u64>("snapshot-interval")
            .copied()
            .unwrap_or(defaults.snapshot_interval),
        timeout: matches
            .get_one::<u64>("timeout-ms")
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or(defaults.timeout),
        max_call_depth: matches
            .get_one::<usize>("max-depth")
            .copied()
            .unwrap_or(defaults.max_call_depth),
        ..defaults
    };

    println!("reftrace REPL v{}", reftrace_core::VERSION);
    println!(
        "Snapshot interval: {} steps, timeout: {}ms",
        config.snapshot_interval,
        config.timeout.as_millis()
    );

    if debug {
        println!("Debug mode: enabled");
    }

    let mut repl = Repl::new(TraceRuntime::new(config))?;
    repl.set_debug(debug);

    if let Some(path) = input_file {
        match repl.handle_command(ReplCommand::Load(path)) {
            Ok(output) => repl.notifier().on_output(&output),
            Err(e) => repl.notifier().on_error(&format!("Error: {e:#}")),
        }
    }

    println!("Type .help for help, .quit to exit");
    println!();

    run_repl(&mut repl)
}

fn run_repl(repl: &mut Repl) -> Result<()> {
    use rustyline::{error::ReadlineError, DefaultEditor};

    let mut rl = DefaultEditor::new()?;
    let mut multiline = MultiLineCollector::new();
    let is_interactive = io::stdin().is_terminal();

    while repl.is_running() {
        match rl.readline(multiline.get_prompt()) {
            Ok(line) => {
                // Echo input in non-interactive mode
                if !is_interactive {
                    println!("{}{line}", multiline.get_prompt());
                }

                let trimmed = line.trim();

                // Dot-commands only outside of a program being typed
                if !multiline.is_collecting() && trimmed.starts_with('.') && trimmed != "." {
                    rl.add_history_entry(trimmed)?;
                    repl.dispatch(trimmed);
                    continue;
                }

                if !multiline.is_collecting() && trimmed.is_empty() {
                    continue;
                }

                match multiline.process_line(&line) {
                    LineProcessResult::Complete(code) => {
                        rl.add_history_entry(&code)?;
                        repl.submit(&code);
                    }
                    LineProcessResult::NeedMore | LineProcessResult::Empty => {}
                }
            }
            Err(ReadlineError::Interrupted) => {
                if multiline.is_collecting() {
                    // Cancel the program being typed
                    println!("^C");
                    multiline.reset();
                } else {
                    println!("Use .quit to exit");
                }
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    // Show exit statistics
    repl.show_exit_stats();

    Ok(())
}

