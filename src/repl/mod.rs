//! REPL (Read-Eval-Print Loop) for the Sable language

use crate::commands::{create_registry, CommandContext, CommandRegistry, CommandResult};
use anyhow::{Context, Result};
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RustylineResult};
use sable_core::{Interpreter, InterpreterOptions};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Interactive REPL for the Sable language
pub struct Repl {
    editor: DefaultEditor,
    registry: CommandRegistry,
    ctx: CommandContext,
    /// Lines read so far for a form whose parentheses are still open
    pending: String,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(options: InterpreterOptions) -> RustylineResult<Self> {
        let editor = DefaultEditor::new()?;
        let options = InterpreterOptions {
            echo_prints: true,
            ..options
        };

        Ok(Repl {
            editor,
            registry: create_registry(),
            ctx: CommandContext::new(options),
            pending: String::new(),
        })
    }

    fn prompt(&self) -> String {
        if self.pending.is_empty() {
            format!("{} ", "sable>".bright_magenta().bold())
        } else {
            format!("{} ", "  ...>".bright_black())
        }
    }

    /// Run the REPL loop
    pub fn run(&mut self) -> Result<()> {
        println!("{}", "Sable".bright_cyan().bold());
        println!(
            "Type forms like: {}, {}",
            "(+ 1 2)".cyan(),
            "(func sq (n) (* n n))".cyan()
        );
        println!(
            "Type '{}' for more information, '{}' or {} to exit.\n",
            ":help".bright_green(),
            ":quit".bright_red(),
            "Ctrl+D".bright_red()
        );

        loop {
            let prompt = self.prompt();
            let readline = self.editor.readline(&prompt);
            match readline {
                Ok(line) => {
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) if !self.pending.is_empty() => {
                    // Ctrl+C abandons an unfinished form
                    self.pending.clear();
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!("{}", "Goodbye!".bright_cyan());
                    break;
                }
                Err(err) => {
                    println!("{} {:?}", "Error reading input:".red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process one line of input, returning false when the REPL should exit
    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();

        if self.pending.is_empty() {
            if trimmed.is_empty() {
                return true;
            }
            match self.registry.execute(trimmed, &mut self.ctx) {
                CommandResult::NotACommand => {}
                result => {
                    let _ = self.editor.add_history_entry(trimmed);
                    return self.report(result);
                }
            }
        }

        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);

        if paren_balance(&self.pending) > 0 {
            return true;
        }

        let source = std::mem::take(&mut self.pending);
        let _ = self.editor.add_history_entry(source.trim());
        self.eval_source(&source);
        true
    }

    fn report(&self, result: CommandResult) -> bool {
        match result {
            CommandResult::Success | CommandResult::NotACommand => {}
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Error(e) => {
                println!("{} {}", "Error:".bright_red().bold(), e.red());
            }
            CommandResult::Exit => {
                println!("{}", "Goodbye!".bright_cyan());
                return false;
            }
        }
        true
    }

    fn eval_source(&mut self, source: &str) {
        let interpreter = &mut self.ctx.interpreter;
        let result = interpreter.evaluate(source);
        // Prints were echoed as they happened
        interpreter.take_output();

        match result {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{}", output.bright_white());
                }
            }
            Err(e) => {
                debug!(kind = %e.kind, "evaluation failed");
                println!("{}", e.render());
            }
        }
    }
}

/// Open parentheses minus closing ones, ignoring string literals and `;` comments.
/// Strings follow the lexer: no escapes, and they may run across lines.
pub fn paren_balance(source: &str) -> i64 {
    let mut balance = 0;
    let mut in_string = false;
    let mut in_comment = false;

    for c in source.chars() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if in_string {
            in_string = c != '"';
            continue;
        }
        match c {
            '(' => balance += 1,
            ')' => balance -= 1,
            '"' => in_string = true,
            ';' => in_comment = true,
            _ => {}
        }
    }

    balance
}

/// Start the REPL
pub fn start(options: InterpreterOptions) -> Result<()> {
    info!(max_depth = options.max_depth, "starting repl");
    let mut repl =
        Repl::new(options).map_err(|e| anyhow::anyhow!("Failed to initialize REPL: {}", e))?;
    repl.run()
}

/// Evaluate a script file, printing its results
pub fn run_file(path: &Path, options: InterpreterOptions) -> Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!(path = %path.display(), "running script");

    let mut interpreter = Interpreter::with_options(InterpreterOptions {
        echo_prints: true,
        ..options
    });
    let output = interpreter
        .evaluate(&source)
        .with_context(|| format!("Failed to evaluate {}", path.display()))?;
    interpreter.take_output();

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_of_complete_forms() {
        assert_eq!(paren_balance("(+ 1 2)"), 0);
        assert_eq!(paren_balance("(define x 1) (print x)"), 0);
        assert_eq!(paren_balance("42"), 0);
    }

    #[test]
    fn test_balance_of_open_forms() {
        assert_eq!(paren_balance("(func f (x)"), 1);
        assert_eq!(paren_balance("(if (< a b)\n  (print a)"), 1);
        assert_eq!(paren_balance("))"), -2);
    }

    #[test]
    fn test_balance_ignores_strings_and_comments() {
        assert_eq!(paren_balance("(print \"(((\")"), 0);
        assert_eq!(paren_balance("(print \"a ; (\")"), 0);
        assert_eq!(paren_balance("(begin ; (((\n 1)"), 0);
    }

    #[test]
    fn test_balance_treats_backslash_as_plain_text() {
        assert_eq!(paren_balance("(print \"a\\\") 1"), 0);
        assert_eq!(paren_balance("(print \"x\\\" (+ 1 2)"), 1);
        assert_eq!(paren_balance("(print \"two\nlines (\")"), 0);
    }

    #[test]
    fn test_run_file_missing_path() {
        let err = run_file(Path::new("/no/such/script.sbl"), InterpreterOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_run_file_reports_evaluation_errors() {
        let path = std::env::temp_dir().join(format!("sable-run-{}.sbl", std::process::id()));
        fs::write(&path, "(define x 1) (+ x undefined)").unwrap();
        let result = run_file(&path, InterpreterOptions::default());
        fs::remove_file(&path).ok();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to evaluate"));
        assert!(format!("{:#}", err).contains("Unbound symbol: undefined"));
    }
}
