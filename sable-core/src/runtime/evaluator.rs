//! Tree-walking evaluator
//!
//! An [`Evaluator`] borrows the interpreter's scope context, host bridge and
//! output buffer for the duration of one top-level form.

use crate::error::{Result, SableError};
use crate::parser::ast::{
    Accessor, Closure, CondBranch, Definition, Expression, FuncArg, LambdaDef, ListAccessor, Literal,
    Node, Operation, ParamDef, VariableDef,
};
use crate::parser::token::Modifier;
use crate::runtime::environment::{type_matches, Binding, FrameId, ScopeContext};
use crate::runtime::host::{HostBridge, HostTarget};
use crate::runtime::interpreter::InterpreterOptions;
use crate::runtime::operations;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{debug, trace};

/// Arguments after evaluation, split by how they were passed
struct CallArgs {
    named: Vec<(String, Literal)>,
    positional: Vec<Literal>,
}

impl CallArgs {
    fn len(&self) -> usize {
        self.named.len() + self.positional.len()
    }
}

/// Evaluates nodes against a borrowed interpreter state
pub struct Evaluator<'a> {
    scopes: &'a mut ScopeContext,
    host: &'a dyn HostBridge,
    output: &'a mut String,
    options: &'a InterpreterOptions,
    call_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        scopes: &'a mut ScopeContext,
        host: &'a dyn HostBridge,
        output: &'a mut String,
        options: &'a InterpreterOptions,
    ) -> Self {
        Evaluator {
            scopes,
            host,
            output,
            options,
            call_depth: 0,
        }
    }

    /// Evaluate a node in the current frame
    pub fn eval(&mut self, node: &Node) -> Result<Literal> {
        crate::with_stack(|| self.eval_node(node))
    }

    fn eval_node(&mut self, node: &Node) -> Result<Literal> {
        match node {
            Node::Literal(literal) => Ok(literal.clone()),
            Node::Definition(definition) => self.eval_definition(definition),
            Node::Expression(expression) => self.eval_expression(expression),
            Node::Operation(operation) => self.eval_operation(operation),
        }
    }

    /// Run `f` in the frame just pushed, popping it on every exit path
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        let popped = self.scopes.pop_scope();
        let value = result?;
        popped?;
        Ok(value)
    }

    fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push_scope();
        self.scoped(f)
    }

    fn with_closure_scope<T>(&mut self, captured: FrameId, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push_closure_scope(captured);
        self.scoped(f)
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    fn eval_definition(&mut self, definition: &Definition) -> Result<Literal> {
        match definition {
            Definition::Variable(def) => self.define_variable(def),
            Definition::Function(def) => {
                let closure = self.make_closure(&def.lambda)?;
                let binding = Binding::new(Some("lambda"), closure, false, false)?;
                self.scopes.create_binding(&def.name, binding)?;
                Ok(Literal::Void)
            }
            Definition::Lambda(lambda) => self.make_closure(lambda),
        }
    }

    fn define_variable(&mut self, def: &VariableDef) -> Result<Literal> {
        let value = self.eval(&def.value)?;
        let dynamic = def.modifiers.contains(&Modifier::Dyn);
        let mutable = !def.modifiers.contains(&Modifier::Fin);

        let binding = Binding::new(def.declared_type.as_deref(), value, dynamic, mutable)?;
        self.scopes.create_binding(&def.name, binding)?;
        Ok(Literal::Void)
    }

    /// Capture the current frame; it outlives its pop while the closure lives
    fn make_closure(&mut self, lambda: &Rc<LambdaDef>) -> Result<Literal> {
        let current = self.scopes.current();
        let frame = self.scopes.capture(current)?;
        Ok(Literal::Lambda(Rc::new(Closure {
            def: Rc::clone(lambda),
            frame,
        })))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval_expression(&mut self, expression: &Expression) -> Result<Literal> {
        match expression {
            Expression::Assign { name, value } => {
                let value = self.eval(value)?;
                self.scopes.reassign(name, value.clone())?;
                Ok(value)
            }
            Expression::If { branch, else_branch } => {
                if self.condition(&branch.condition, "if")? {
                    self.eval(&branch.then)
                } else {
                    match else_branch {
                        Some(node) => self.eval(node),
                        None => Ok(Literal::Boolean(false)),
                    }
                }
            }
            Expression::Cond {
                branches,
                else_branch,
            } => self.eval_cond(branches, else_branch.as_deref()),
            Expression::While {
                condition,
                body,
                is_do_while,
            } => self.eval_while(condition, body, *is_do_while),
            Expression::Multi(nodes) => self.with_scope(|ev| {
                let mut last = Literal::Void;
                for node in nodes {
                    last = ev.eval(node)?;
                }
                Ok(last)
            }),
            Expression::Print(nodes) => self.eval_print(nodes),
            Expression::Cons { car, cdr } => {
                let car = self.eval(car)?;
                let cdr = self.eval(cdr)?;
                Ok(Literal::cons(car, cdr))
            }
            Expression::PairList(nodes) => {
                let values = nodes
                    .iter()
                    .map(|node| self.eval(node))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Literal::list(values))
            }
            Expression::ListAccess { accessor, list } => self.eval_list_access(accessor, list),
            Expression::FunctionCall {
                name,
                accessors,
                args,
            } => {
                let callee = self.scopes.lookup(name)?;
                if accessors.is_empty() {
                    self.call_value(callee, args)
                } else {
                    let args = self.eval_positional(args)?;
                    self.member_chain(HostTarget::Instance(callee), accessors, args)
                }
            }
            Expression::LiteralCall { name, accessors } => {
                let value = self.scopes.lookup(name)?;
                if accessors.is_empty() {
                    Ok(value)
                } else {
                    self.member_chain(HostTarget::Instance(value), accessors, Vec::new())
                }
            }
            Expression::HostCall {
                type_name,
                accessors,
                args,
            } => {
                let args = self.eval_positional(args)?;
                if accessors.is_empty() {
                    let member = self.host.resolve_constructor(type_name, &args)?;
                    self.host
                        .invoke(&member, &HostTarget::Static(type_name.clone()), args)
                } else {
                    self.member_chain(HostTarget::Static(type_name.clone()), accessors, args)
                }
            }
            Expression::ObjectCall {
                target,
                accessors,
                args,
            } => {
                let target = self.eval(target)?;
                let args = self.eval_positional(args)?;
                self.member_chain(HostTarget::Instance(target), accessors, args)
            }
            Expression::Apply { callee, args } => {
                let callee = self.eval(callee)?;
                self.call_value(callee, args)
            }
        }
    }

    fn condition(&mut self, node: &Node, form: &str) -> Result<bool> {
        match self.eval(node)? {
            Literal::Boolean(value) => Ok(value),
            other => Err(SableError::eval(format!(
                "{} condition must evaluate to a boolean, found {}",
                form,
                other.lang_type()
            ))),
        }
    }

    fn eval_cond(&mut self, branches: &[CondBranch], else_branch: Option<&Node>) -> Result<Literal> {
        for branch in branches {
            if self.condition(&branch.condition, "cond")? {
                return self.eval(&branch.then);
            }
        }
        match else_branch {
            Some(node) => self.eval(node),
            None => Ok(Literal::Boolean(false)),
        }
    }

    fn eval_while(&mut self, condition: &Node, body: &Node, is_do_while: bool) -> Result<Literal> {
        if !is_do_while && !self.condition(condition, "while")? {
            return Ok(Literal::Boolean(false));
        }

        loop {
            let result = self.eval(body)?;
            if !self.condition(condition, "while")? {
                return Ok(result);
            }
        }
    }

    fn eval_print(&mut self, nodes: &[Node]) -> Result<Literal> {
        let mut parts = Vec::with_capacity(nodes.len());
        for node in nodes {
            parts.push(self.eval(node)?.as_string());
        }
        let line = parts.join(" ");

        debug!(output = %line, "print");
        if self.options.echo_prints {
            println!("{}", line);
        }
        self.output.push_str(&line);
        self.output.push('\n');
        Ok(Literal::Void)
    }

    fn eval_list_access(&mut self, accessor: &ListAccessor, list: &Node) -> Result<Literal> {
        match accessor {
            ListAccessor::Pattern(pattern) => {
                let mut value = self.eval(list)?;
                for step in pattern.chars().rev() {
                    value = list_step(&value, step)?;
                }
                Ok(value)
            }
            ListAccessor::Index(index) => {
                let index = match self.eval(index)? {
                    Literal::Int(n) if n >= 0 => n as u64,
                    Literal::Long(n) if n >= 0 => n as u64,
                    other => {
                        return Err(SableError::eval(format!(
                            "List index must be a non-negative integer, found {}",
                            other
                        )))
                    }
                };
                let value = self.eval(list)?;
                list_nth(&value, index)
            }
        }
    }

    // ========================================================================
    // Operations
    // ========================================================================

    fn eval_operation(&mut self, operation: &Operation) -> Result<Literal> {
        let operator = operation.operator();

        if let Some(rule) = operations::short_circuit(operator) {
            for node in operation.operands() {
                if self.eval(node)?.as_bool() == rule.stop_on {
                    return Ok(Literal::Boolean(rule.result));
                }
            }
            return Ok(Literal::Boolean(rule.exhausted()));
        }

        let operands = operation
            .operands()
            .iter()
            .map(|node| self.eval(node))
            .collect::<Result<Vec<_>>>()?;
        operations::apply(operator, &operands)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn eval_args(&mut self, args: &[FuncArg]) -> Result<CallArgs> {
        let mut evaluated = CallArgs {
            named: Vec::new(),
            positional: Vec::new(),
        };
        for arg in args {
            let value = self.eval(&arg.value)?;
            match &arg.name {
                Some(name) => evaluated.named.push((name.clone(), value)),
                None => evaluated.positional.push(value),
            }
        }
        Ok(evaluated)
    }

    /// Host members take positional arguments only
    fn eval_positional(&mut self, args: &[FuncArg]) -> Result<Vec<Literal>> {
        if let Some(arg) = args.iter().find(|arg| arg.is_named()) {
            return Err(SableError::eval(format!(
                "Named argument :{} is not supported for host calls",
                arg.name.as_deref().unwrap_or_default()
            )));
        }
        args.iter().map(|arg| self.eval(&arg.value)).collect()
    }

    fn call_value(&mut self, callee: Literal, args: &[FuncArg]) -> Result<Literal> {
        match callee {
            Literal::Lambda(closure) => {
                let args = self.eval_args(args)?;
                self.call_lambda(&closure, args)
            }
            Literal::Object(_) | Literal::AList(_) => {
                let args = self.eval_positional(args)?;
                let target = HostTarget::Instance(callee);
                let member = self.host.resolve_method(&target, "call", &args)?;
                self.host.invoke(&member, &target, args)
            }
            other => Err(SableError::eval(format!(
                "Value of type {} is not callable",
                other.lang_type()
            ))),
        }
    }

    fn call_lambda(&mut self, closure: &Closure, args: CallArgs) -> Result<Literal> {
        let def = &closure.def;

        if self.call_depth >= self.options.max_depth {
            return Err(SableError::eval(format!(
                "Maximum call depth of {} exceeded",
                self.options.max_depth
            )));
        }
        check_arity(def, args.len())?;

        trace!(depth = self.call_depth, signature = %def.signature(), "call lambda");
        self.call_depth += 1;
        let result = self.with_closure_scope(closure.frame.id(), |ev| {
            ev.bind_params(def, args)?;
            ev.eval(&def.body)
        });
        self.call_depth -= 1;
        let result = result?;

        if let Some(expected) = &def.return_type {
            let dynamic = def.has_modifier(Modifier::Dyn) || def.has_modifier(Modifier::DynAll);
            if !dynamic && !type_matches(expected, &result) {
                return Err(SableError::eval(format!(
                    "Return type mismatch: expected {}, found {}",
                    expected,
                    result.lang_type()
                )));
            }
        }
        Ok(result)
    }

    /// Bind named arguments, then positional ones in parameter order
    fn bind_params(&mut self, def: &LambdaDef, args: CallArgs) -> Result<()> {
        let mut bound = HashSet::new();

        for (name, value) in args.named {
            let param = def
                .params
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| SableError::eval(format!("Unknown parameter name: {}", name)))?;
            if param.rest {
                return Err(SableError::eval(format!(
                    "Rest parameter {} cannot be passed by name",
                    name
                )));
            }
            if !bound.insert(param.name.as_str()) {
                return Err(SableError::eval(format!("Parameter {} bound twice", name)));
            }
            self.bind_param(param, value)?;
        }

        let mut positional = args.positional.into_iter();
        for param in def.params.iter().filter(|p| !bound.contains(p.name.as_str())) {
            if param.rest {
                let rest: Vec<Literal> = positional.by_ref().collect();
                self.bind_param(param, Literal::list(rest))?;
                continue;
            }

            match positional.next() {
                Some(value) => self.bind_param(param, value)?,
                None if param.optional => {
                    let value = match &param.default {
                        Some(default) => self.eval(default)?,
                        None => Literal::Null,
                    };
                    self.bind_param(param, value)?;
                }
                None => {
                    return Err(SableError::eval(format!(
                        "Missing required argument: {}",
                        param.name
                    )))
                }
            }
        }

        if positional.next().is_some() {
            return Err(SableError::eval(format!(
                "Too many positional arguments for lambda {}",
                def.signature()
            )));
        }
        Ok(())
    }

    fn bind_param(&mut self, param: &ParamDef, value: Literal) -> Result<()> {
        let declared = if param.rest {
            None
        } else {
            param.declared_type.as_deref()
        };
        let binding = Binding::new(declared, value, param.dynamic, param.mutable)?;
        self.scopes.create_binding(&param.name, binding)
    }

    // ========================================================================
    // Host members
    // ========================================================================

    /// Walk `a:b:c`; only the last accessor receives `args`
    fn member_chain(&mut self, mut target: HostTarget, accessors: &[Accessor], args: Vec<Literal>) -> Result<Literal> {
        let Some((last, leading)) = accessors.split_last() else {
            return match target {
                HostTarget::Instance(value) => Ok(value),
                HostTarget::Static(name) => Err(SableError::eval(format!(
                    "Host type {} used without a member",
                    name
                ))),
            };
        };

        for accessor in leading {
            let value = self.access_member(&target, accessor, Vec::new())?;
            target = HostTarget::Instance(value);
        }
        self.access_member(&target, last, args)
    }

    fn access_member(&mut self, target: &HostTarget, accessor: &Accessor, mut args: Vec<Literal>) -> Result<Literal> {
        if !accessor.is_field {
            let member = self.host.resolve_method(target, &accessor.name, &args)?;
            return self.host.invoke(&member, target, args);
        }

        let member = self.host.resolve_field(target, &accessor.name)?;
        match args.len() {
            0 => self.host.get_field(&member, target),
            1 => match args.pop() {
                Some(value) => self.host.set_field(&member, target, value),
                None => self.host.get_field(&member, target),
            },
            n => Err(SableError::eval(format!(
                "Field {} accepts at most one value, found {}",
                accessor.name, n
            ))),
        }
    }
}

fn check_arity(def: &LambdaDef, count: usize) -> Result<()> {
    let min = def.min_arity();
    let max = def.max_arity();
    let within = count >= min && max.map_or(true, |max| count <= max);
    if within {
        return Ok(());
    }

    let expected = match max {
        Some(max) if max == min => format!("{}", min),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(SableError::eval(format!(
        "Arity mismatch: lambda {} expects {} arguments, found {}",
        def.signature(),
        expected,
        count
    )))
}

/// One `f` (car) or `r` (cdr) step of a list access
/// Element `index` of a list: `index` cdr steps, then a car
fn list_nth(value: &Literal, index: u64) -> Result<Literal> {
    if let Literal::AList(items) = value {
        return usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| {
                SableError::eval(format!(
                    "Invalid list access: index {} out of range for {} elements",
                    index,
                    items.len()
                ))
            });
    }

    let mut cursor = value.clone();
    for _ in 0..index {
        cursor = list_step(&cursor, 'r')?;
    }
    list_step(&cursor, 'f')
}

fn list_step(value: &Literal, step: char) -> Result<Literal> {
    match (value, step) {
        (Literal::Pair(pair), 'f') => Ok(pair.car.clone()),
        (Literal::Pair(pair), 'r') => Ok(pair.cdr.clone()),
        (Literal::AList(items), 'f') => items
            .first()
            .cloned()
            .ok_or_else(|| SableError::eval("Invalid list access: first of empty list")),
        (Literal::AList(items), 'r') if !items.is_empty() => {
            Ok(Literal::AList(Rc::new(items[1..].to_vec())))
        }
        (other, step) => Err(SableError::eval(format!(
            "Invalid list access: cannot apply '{}' to {}",
            step,
            other.lang_type()
        ))),
    }
}
