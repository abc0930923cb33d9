//! Interpreter session
//!
//! Owns the scope context, the host bridge and the print buffer across
//! evaluations. Each call to [`Interpreter::evaluate`] parses the source
//! and runs its top-level forms in the global frame.

use crate::error::Result;
use crate::parser::ast::{Literal, Node, Program};
use crate::parser::parser::parse_program;
use crate::runtime::environment::{Binding, ScopeContext};
use crate::runtime::evaluator::Evaluator;
use crate::runtime::host::{HostBridge, NoHost};
use tracing::debug;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Nested lambda calls allowed before evaluation fails
    pub max_depth: usize,
    /// Also write `print` output to stdout as it happens
    pub echo_prints: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        InterpreterOptions {
            max_depth: 2_000,
            echo_prints: false,
        }
    }
}

/// A stateful evaluation session
pub struct Interpreter {
    scopes: ScopeContext,
    host: Box<dyn HostBridge>,
    options: InterpreterOptions,
    /// Text written by `print`, drained by `take_output`
    output: String,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(InterpreterOptions::default())
    }

    pub fn with_options(options: InterpreterOptions) -> Self {
        Interpreter {
            scopes: ScopeContext::new(),
            host: Box::new(NoHost),
            options,
            output: String::new(),
        }
    }

    /// Replace the host bridge
    pub fn with_host(mut self, host: impl HostBridge + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Parse and run `source`, returning the non-empty results one per line
    pub fn evaluate(&mut self, source: &str) -> Result<String> {
        let program = parse_program(source)?;
        debug!(forms = program.len(), "evaluating program");

        let results = self.run_program(&program)?;
        let rendered: Vec<String> = results
            .iter()
            .map(Literal::as_string)
            .filter(|text| !text.is_empty())
            .collect();
        Ok(rendered.join("\n"))
    }

    /// Run each top-level form in order, stopping at the first error
    pub fn run_program(&mut self, program: &Program) -> Result<Vec<Literal>> {
        let mut results = Vec::with_capacity(program.len());
        for node in &program.nodes {
            results.push(self.eval_node(node)?);
        }
        Ok(results)
    }

    /// Evaluate a single top-level node in the global frame
    pub fn eval_node(&mut self, node: &Node) -> Result<Literal> {
        let mut evaluator = Evaluator::new(
            &mut self.scopes,
            self.host.as_ref(),
            &mut self.output,
            &self.options,
        );
        let result = evaluator.eval(node);
        if result.is_err() {
            self.scopes.unwind_to_global();
        }
        result
    }

    /// Bind a value in the global frame, e.g. a host object for scripts to use
    pub fn define_global(&mut self, name: &str, value: Literal) -> Result<()> {
        let binding = Binding::new(None, value, false, true)?;
        self.scopes.create_binding(name, binding)
    }

    /// Current value of a visible binding
    pub fn get(&self, name: &str) -> Option<Literal> {
        self.scopes.get(name).map(|binding| binding.value.clone())
    }

    pub fn global_bindings(&self) -> Vec<(&String, &Binding)> {
        self.scopes.global_bindings()
    }

    /// Drain everything printed since the last call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Frames pushed above global; zero between top-level forms
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Frames held in the arena, including ones kept alive by closures
    pub fn live_frames(&self) -> usize {
        self.scopes.live_frames()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `source` in a fresh interpreter
pub fn evaluate(source: &str) -> Result<String> {
    Interpreter::new().evaluate(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_results_joined_by_newline() {
        let mut interp = Interpreter::new();
        let output = interp.evaluate("(define x 10) (+ x 5) (* x 2)").unwrap();
        assert_eq!(output, "15\n20");
    }

    #[test]
    fn test_state_persists_between_evaluations() {
        let mut interp = Interpreter::new();
        interp.evaluate("(define counter 1)").unwrap();
        interp.evaluate("(:= counter (+ counter 1))").unwrap();
        assert_eq!(interp.get("counter"), Some(Literal::Int(2)));
        assert_eq!(interp.global_bindings().len(), 1);
    }

    #[test]
    fn test_print_buffer_is_drained() {
        let mut interp = Interpreter::new();
        let result = interp.evaluate("(print \"a\" 1) (print #t)").unwrap();
        assert_eq!(result, "");
        assert_eq!(interp.take_output(), "a 1\n#t\n");
        assert_eq!(interp.take_output(), "");
    }

    #[test]
    fn test_failed_form_unwinds_frames() {
        let mut interp = Interpreter::new();
        let err = interp
            .evaluate("(func f (x) ((define y 1) (+ y \"s\"))) (f 1)")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Evaluation);
        assert_eq!(interp.scope_depth(), 0);
        assert!(interp.get("y").is_none());
        assert_eq!(interp.evaluate("(f)").unwrap_err().kind, ErrorKind::Evaluation);
    }

    #[test]
    fn test_define_global_from_host() {
        let mut interp = Interpreter::new();
        interp.define_global("limit", Literal::Long(99)).unwrap();
        assert_eq!(interp.evaluate("(+ limit 1)").unwrap(), "100");
        assert!(interp.define_global("limit", Literal::Int(1)).is_err());
    }

    #[test]
    fn test_deep_recursion_on_small_stack() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let mut interp = Interpreter::new();
                interp
                    .evaluate("(func down (n) (if (<= n 0) 0 (down (- n 1))))")
                    .unwrap();
                let near_limit = interp.evaluate("(down 1990)");
                let over_limit = interp.evaluate("(down 2500)");

                let nested = format!("{}1{}", "(+ 1 ".repeat(5000), ")".repeat(5000));
                let deeply_nested = interp.evaluate(&nested);
                (near_limit, over_limit, deeply_nested)
            })
            .unwrap();

        let (near_limit, over_limit, deeply_nested) = handle.join().unwrap();
        assert_eq!(near_limit.unwrap(), "0");
        let err = over_limit.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Evaluation);
        assert!(err.message.contains("Maximum call depth of 2000 exceeded"));
        assert_eq!(deeply_nested.unwrap(), "5001");
    }

    #[test]
    fn test_free_evaluate() {
        assert_eq!(evaluate("(- 10 4)").unwrap(), "6");
        assert_eq!(evaluate("(+ 1").unwrap_err().kind, ErrorKind::Parse);
    }
}
