//! sable CLI entry point.
//!
//! Usage:
//!   sable                  # Interactive REPL
//!   sable -e <source>      # Evaluate source and exit
//!   sable script.sbl       # Run a script

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Logs go to stderr so they never mix with results (RUST_LOG controls the level)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            let options = sable::config::from_env(true)?;
            sable::repl::start(options)?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("sable {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-e") => {
            let source = args.get(2).context("-e requires a source argument")?;
            let options = sable::config::from_env(true)?;
            let mut interpreter = sable_core::Interpreter::with_options(options);
            let output = interpreter.evaluate(source)?;
            interpreter.take_output();
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(ExitCode::SUCCESS)
        }

        Some(path) if !path.starts_with('-') => {
            let options = sable::config::from_env(true)?;
            sable::repl::run_file(Path::new(path), options)?;
            Ok(ExitCode::SUCCESS)
        }

        Some(flag) => {
            eprintln!("Unknown option: {flag}");
            print_help();
            Ok(ExitCode::from(2))
        }
    }
}

fn print_help() {
    println!(
        "sable - Sable language interpreter

Usage:
  sable                  Start the interactive REPL
  sable -e <source>      Evaluate source and print the results
  sable <script>         Run a script file

Environment:
  SABLE_MAX_DEPTH        Maximum nested function calls (default 2000)
  RUST_LOG               Log filter, e.g. sable_core=debug"
    );
}
