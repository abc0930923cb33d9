//! # Sable Core
//!
//! Embeddable interpreter for the Sable Lisp dialect: lexer, parser,
//! evaluator and the host interop bridge. The REPL lives in the `sable`
//! binary crate.
//!
//! ## Features
//!
//! - **serde**: Serialize tokens and errors
//! - **colored**: Colored error rendering (enabled by default)
//!
//! ## Example
//!
//! ```
//! use sable_core::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! let result = interp.evaluate("(func sq (n) (* n n)) (sq 7)").unwrap();
//! assert_eq!(result, "49");
//! ```

pub mod error;
pub mod parser;
pub mod runtime;

pub use error::{ErrorKind, HostFailure, Result, SableError};
pub use parser::{parse_program, Literal, Node, Program};
pub use runtime::{evaluate, HostBridge, HostObject, Interpreter, InterpreterOptions, NativeHost, NativeType};

/// Stack left before a recursive step moves onto a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each extra stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Run a recursive step, growing the stack first if it is running low
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, f)
}
