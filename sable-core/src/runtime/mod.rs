// sable-core/src/runtime/mod.rs

pub mod environment;
pub mod evaluator;
pub mod host;
pub mod interpreter;
pub mod operations;


pub use environment::{Binding, FrameId, FrameRef, ScopeContext};
pub use evaluator::Evaluator;
pub use host::{HostBridge, HostMember, HostObject, HostTarget, NativeHost, NativeType, NoHost};
pub use interpreter::{evaluate, Interpreter, InterpreterOptions};
