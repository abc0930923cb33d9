// sable-core/src/parser/mod.rs

pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;
pub mod token;

pub use ast::{Definition, Expression, Literal, Node, Operation, Program};
pub use lexer::{tokenize, Lexer};
pub use parser::{parse_program, Parser};
pub use token::{Token, TokenKind};
