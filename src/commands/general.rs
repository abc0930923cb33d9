//! General commands: help, quit, env, load

use super::{CommandContext, CommandResult};
use std::fs;

/// :help - Show available commands
pub fn cmd_help(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    CommandResult::Message(
        r#"Sable REPL Commands:
  :help              Show this help
  :quit, :exit       Exit the REPL
  :env               List global bindings with their types
  :load <file>       Evaluate a source file in this session

Forms:
  (define x 10)                 Bind a value
  (define x ::int 10)           Bind with a declared type
  (:= x 11)                     Reassign a binding
  (func sq (n) (* n n))         Define a function
  (lambda (x) (+ x 1))          Anonymous function
  (if c a b) (cond ...) (while c ...)
  (@Type args) (obj:method args) (@Type:static args) (obj:.field)

Input spanning several lines is read until the parentheses balance."#
            .to_string(),
    )
}

/// :quit / :exit - Exit the REPL
pub fn cmd_quit(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    CommandResult::Exit
}

/// :env - List global bindings
pub fn cmd_env(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    let bindings = ctx.interpreter.global_bindings();
    if bindings.is_empty() {
        return CommandResult::Message("No bindings defined".to_string());
    }

    let lines: Vec<String> = bindings
        .into_iter()
        .map(|(name, binding)| {
            let mut modifiers = String::new();
            if binding.dynamic {
                modifiers.push_str(" dyn");
            }
            if !binding.mutable {
                modifiers.push_str(" fin");
            }
            format!(
                "  {} ::{}{} = {}",
                name,
                binding.declared_type,
                modifiers,
                binding.value.as_string()
            )
        })
        .collect();
    CommandResult::Message(lines.join("\n"))
}

/// :load <file> - Evaluate a file in the current session
pub fn cmd_load(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: :load <file>".to_string());
    }

    let source = match fs::read_to_string(args) {
        Ok(source) => source,
        Err(e) => return CommandResult::Error(format!("Failed to read {}: {}", args, e)),
    };

    match ctx.interpreter.evaluate(&source) {
        Ok(result) => {
            let printed = ctx.interpreter.take_output();
            let mut message = format!("Loaded {}", args);
            if !printed.is_empty() {
                message.push('\n');
                message.push_str(printed.trim_end());
            }
            if !result.is_empty() {
                message.push('\n');
                message.push_str(&result);
            }
            CommandResult::Message(message)
        }
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::InterpreterOptions;

    fn context() -> CommandContext {
        CommandContext::new(InterpreterOptions::default())
    }

    #[test]
    fn test_env_empty_and_populated() {
        let mut ctx = context();
        assert_eq!(
            cmd_env("", &mut ctx),
            CommandResult::Message("No bindings defined".to_string())
        );

        ctx.interpreter
            .evaluate("(define a ::int 1) (define b &dyn \"x\")")
            .unwrap();
        match cmd_env("", &mut ctx) {
            CommandResult::Message(text) => {
                assert!(text.contains("a ::int = 1"));
                assert!(text.contains("b ::string dyn = x"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_load_requires_path() {
        let mut ctx = context();
        assert!(matches!(cmd_load("", &mut ctx), CommandResult::Error(_)));
        assert!(matches!(
            cmd_load("/definitely/not/here.sbl", &mut ctx),
            CommandResult::Error(_)
        ));
    }

    #[test]
    fn test_load_evaluates_into_session() {
        let path = std::env::temp_dir().join(format!("sable-load-{}.sbl", std::process::id()));
        fs::write(&path, "(define loaded 41) (print \"hi\") (+ loaded 1)").unwrap();

        let mut ctx = context();
        let result = cmd_load(path.to_str().unwrap(), &mut ctx);
        fs::remove_file(&path).ok();

        match result {
            CommandResult::Message(text) => {
                assert!(text.starts_with("Loaded "));
                assert!(text.contains("hi"));
                assert!(text.ends_with("42"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(ctx.interpreter.evaluate("loaded").unwrap(), "41");
    }
}
