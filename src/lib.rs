//! # Sable
//!
//! Interactive shell for the Sable scripting language. The language itself
//! (lexer, parser, evaluator and host bridge) lives in `sable-core`; this
//! crate adds the REPL, its meta commands and environment configuration.
//!
//! ## Modules
//!
//! - `commands`: `:help`, `:env`, `:load` and the other REPL commands
//! - `config`: Interpreter options read from the environment
//! - `repl`: The Read-Eval-Print Loop and script runner

pub mod commands;
pub mod config;
pub mod repl;

pub use sable_core::{evaluate, Interpreter, InterpreterOptions};
