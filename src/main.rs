use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stepjs::{Interpreter, Value};

#[derive(Parser)]
#[command(name = "stepjs", version, about = "A sandboxed, step-driven ES5 interpreter")]
struct Cli {
    /// JavaScript file to execute
    file: Option<PathBuf>,

    /// Evaluate inline JavaScript
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Abort after this many interpreter steps
    #[arg(long = "max-steps")]
    max_steps: Option<u64>,
}

fn run_source(source: &str, max_steps: Option<u64>, print_value: bool) -> Result<(), String> {
    let mut interp = Interpreter::with_init(source, |interp, global| {
        let log = interp.create_native_function(1, false, |interp, _this, args| {
            let parts: Vec<String> = args.iter().map(|v| interp.to_string_value(v)).collect();
            println!("{}", parts.join(" "));
            Ok(Value::Undefined)
        });
        let console = interp.native_to_guest(&stepjs::NativeValue::object(vec![]));
        interp.set_property(&console, "log", log);
        interp.set_property(global, "console", console);
    })
    .map_err(|e| e.to_string())?;

    let mut steps: u64 = 0;
    loop {
        let more = interp.step().map_err(|e| e.to_string())?;
        if !more {
            break;
        }
        if interp.is_paused() {
            return Err("program paused on an async binding with no resolver".to_string());
        }
        steps += 1;
        if let Some(limit) = max_steps {
            if steps >= limit {
                return Err(format!("step budget of {limit} exhausted"));
            }
        }
    }
    if print_value {
        let value = interp.value().clone();
        if !value.is_undefined() {
            println!("{}", interp.to_string_value(&value));
        }
    }
    Ok(())
}

fn execute_code(code: &str, max_steps: Option<u64>, print_value: bool) -> ExitCode {
    match run_source(code, max_steps, print_value) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_file(path: &Path, max_steps: Option<u64>) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            return ExitCode::from(1);
        }
    };
    execute_code(&source, max_steps, false)
}

fn run_repl(max_steps: Option<u64>) -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("stepjs v{}", env!("CARGO_PKG_VERSION"));
    println!("Type JavaScript expressions. Press Ctrl-D to exit.");

    loop {
        print!("> ");
        if stdout.flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let _ = execute_code(trimmed, max_steps, true);
                }
            }
            Err(e) => {
                eprintln!("Read error: {e}");
                return ExitCode::from(1);
            }
        }
    }

    println!();
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(code) = &cli.eval {
        return execute_code(code, cli.max_steps, true);
    }

    if let Some(path) = &cli.file {
        return run_file(path, cli.max_steps);
    }

    run_repl(cli.max_steps)
}
