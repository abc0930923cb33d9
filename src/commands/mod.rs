//! Command registry for REPL meta commands
//!
//! Lines starting with a registered prefix (`:help`, `:load`, ...) are
//! handled here; everything else is evaluated as Sable source.

pub mod general;

use sable_core::{Interpreter, InterpreterOptions};

/// Result of executing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Command executed successfully, continue REPL
    Success,
    /// Command executed, show this message
    Message(String),
    /// Exit the REPL
    Exit,
    /// Not a command, evaluate as source
    NotACommand,
    /// Error occurred
    Error(String),
}

/// Context passed to command handlers
pub struct CommandContext {
    pub interpreter: Interpreter,
}

impl CommandContext {
    pub fn new(options: InterpreterOptions) -> Self {
        Self {
            interpreter: Interpreter::with_options(options),
        }
    }
}

/// A command handler function
pub type CommandHandler = fn(&str, &mut CommandContext) -> CommandResult;

/// Registry of available commands
pub struct CommandRegistry {
    /// Sorted by prefix length descending for longest-match-first lookup
    commands: Vec<(String, CommandHandler)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Register a command with its prefix
    pub fn register(&mut self, prefix: &str, handler: CommandHandler) {
        self.commands.push((prefix.to_string(), handler));
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Execute a command, returning NotACommand if no match found
    pub fn execute(&self, input: &str, ctx: &mut CommandContext) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = input[prefix.len()..].trim();
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    /// Get all registered command prefixes
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with all built-in commands
pub fn create_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    registry.register(":help", general::cmd_help);
    registry.register(":quit", general::cmd_quit);
    registry.register(":exit", general::cmd_quit);
    registry.register(":env", general::cmd_env);
    registry.register(":load", general::cmd_load);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CommandContext {
        CommandContext::new(InterpreterOptions::default())
    }

    #[test]
    fn test_unknown_input_is_not_a_command() {
        let registry = create_registry();
        let mut ctx = context();
        assert_eq!(registry.execute("(+ 1 2)", &mut ctx), CommandResult::NotACommand);
        assert_eq!(registry.execute(":helpme", &mut ctx), CommandResult::NotACommand);
    }

    #[test]
    fn test_quit_aliases() {
        let registry = create_registry();
        let mut ctx = context();
        assert_eq!(registry.execute(":quit", &mut ctx), CommandResult::Exit);
        assert_eq!(registry.execute(":exit", &mut ctx), CommandResult::Exit);
    }

    #[test]
    fn test_longest_prefix_first() {
        fn short(_: &str, _: &mut CommandContext) -> CommandResult {
            CommandResult::Message("short".to_string())
        }
        fn long(args: &str, _: &mut CommandContext) -> CommandResult {
            CommandResult::Message(format!("long {}", args))
        }

        let mut registry = CommandRegistry::new();
        registry.register(":a", short);
        registry.register(":a b", long);
        let mut ctx = context();
        assert_eq!(
            registry.execute(":a b c", &mut ctx),
            CommandResult::Message("long c".to_string())
        );
        assert_eq!(registry.list_commands(), vec![":a b", ":a"]);
    }
}
