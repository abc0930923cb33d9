//! Abstract syntax tree and the literal value model
//!
//! A program is a list of [`Node`]s. Every node belongs to one of four
//! families: literals, definitions, expressions and operations. Literals
//! double as the runtime values produced by evaluation.

use crate::parser::token::{Modifier, Operator};
use crate::runtime::environment::FrameRef;
use crate::runtime::host::HostObject;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Literals
// ============================================================================

/// Coarse type tag used by the operation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Int,
    Long,
    Float,
    Double,
    String,
    Boolean,
    Null,
    Void,
    Quote,
    Object,
    AList,
    NilList,
    Pair,
    Lambda,
}

impl ResultType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ResultType::Int | ResultType::Long | ResultType::Float | ResultType::Double
        )
    }
}

/// A cons cell
#[derive(Debug, Clone)]
pub struct Pair {
    pub car: Literal,
    pub cdr: Literal,
}

impl Drop for Pair {
    // Unlink the cdr chain in a loop so long lists do not recurse
    fn drop(&mut self) {
        let mut next = std::mem::replace(&mut self.cdr, Literal::NilList);
        while let Literal::Pair(cell) = next {
            match Rc::try_unwrap(cell) {
                Ok(mut pair) => next = std::mem::replace(&mut pair.cdr, Literal::NilList),
                Err(_) => break,
            }
        }
    }
}

/// A lambda paired with the frame it was defined in
#[derive(Debug)]
pub struct Closure {
    pub def: Rc<LambdaDef>,
    pub frame: FrameRef,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Boolean(bool),
    Null,
    Void,
    /// Deferred expression, never evaluated
    Quote(Rc<Node>),
    Object(HostObject),
    /// Flat list produced by `++` and `--`
    AList(Rc<Vec<Literal>>),
    NilList,
    Pair(Rc<Pair>),
    Lambda(Rc<Closure>),
}

impl Literal {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Literal::Str(text.into())
    }

    pub fn cons(car: Literal, cdr: Literal) -> Self {
        Literal::Pair(Rc::new(Pair { car, cdr }))
    }

    /// Build a proper list terminated by the nil list
    pub fn list<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Literal>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Literal::NilList, |tail, item| Literal::cons(item, tail))
    }

    pub fn result_type(&self) -> ResultType {
        match self {
            Literal::Int(_) => ResultType::Int,
            Literal::Long(_) => ResultType::Long,
            Literal::Float(_) => ResultType::Float,
            Literal::Double(_) => ResultType::Double,
            Literal::Str(_) => ResultType::String,
            Literal::Boolean(_) => ResultType::Boolean,
            Literal::Null => ResultType::Null,
            Literal::Void => ResultType::Void,
            Literal::Quote(_) => ResultType::Quote,
            Literal::Object(_) => ResultType::Object,
            Literal::AList(_) => ResultType::AList,
            Literal::NilList => ResultType::NilList,
            Literal::Pair(_) => ResultType::Pair,
            Literal::Lambda(_) => ResultType::Lambda,
        }
    }

    /// Type name used by `::type` annotations and binding checks
    pub fn lang_type(&self) -> String {
        match self {
            Literal::Int(_) => "int".to_string(),
            Literal::Long(_) => "long".to_string(),
            Literal::Float(_) => "float".to_string(),
            Literal::Double(_) => "double".to_string(),
            Literal::Str(_) => "string".to_string(),
            Literal::Boolean(_) => "boolean".to_string(),
            Literal::Null => "null".to_string(),
            Literal::Void => "void".to_string(),
            Literal::Quote(_) => "quote".to_string(),
            Literal::Object(object) => object.type_name().to_string(),
            Literal::AList(_) => "alist".to_string(),
            Literal::NilList | Literal::Pair(_) => "list".to_string(),
            Literal::Lambda(_) => "lambda".to_string(),
        }
    }

    /// Number of pairs in a cons chain
    fn chain_len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self;
        while let Literal::Pair(pair) = cursor {
            count += 1;
            cursor = &pair.cdr;
        }
        count
    }

    fn size(&self) -> usize {
        match self {
            Literal::Str(text) => text.chars().count(),
            Literal::Quote(node) => node.to_string().chars().count(),
            Literal::AList(items) => items.len(),
            Literal::Pair(_) => self.chain_len(),
            _ => 0,
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Literal::Int(v) => *v,
            Literal::Long(v) => *v as i32,
            Literal::Float(v) => *v as i32,
            Literal::Double(v) => *v as i32,
            Literal::Boolean(v) => *v as i32,
            Literal::Null | Literal::Void | Literal::NilList => 0,
            Literal::Object(_) | Literal::Lambda(_) => 1,
            Literal::Str(_) | Literal::Quote(_) | Literal::AList(_) | Literal::Pair(_) => {
                self.size() as i32
            }
        }
    }

    pub fn as_long(&self) -> i64 {
        match self {
            Literal::Long(v) => *v,
            Literal::Float(v) => *v as i64,
            Literal::Double(v) => *v as i64,
            _ => self.as_int() as i64,
        }
    }

    pub fn as_float(&self) -> f32 {
        match self {
            Literal::Long(v) => *v as f32,
            Literal::Float(v) => *v,
            Literal::Double(v) => *v as f32,
            _ => self.as_int() as f32,
        }
    }

    pub fn as_double(&self) -> f64 {
        match self {
            Literal::Long(v) => *v as f64,
            Literal::Float(v) => *v as f64,
            Literal::Double(v) => *v,
            _ => self.as_int() as f64,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Literal::Int(v) => *v != 0,
            Literal::Long(v) => *v != 0,
            Literal::Float(v) => *v != 0.0,
            Literal::Double(v) => *v != 0.0,
            Literal::Boolean(v) => *v,
            Literal::Null | Literal::Void | Literal::NilList => false,
            Literal::Object(_) | Literal::Lambda(_) | Literal::Pair(_) => true,
            Literal::Str(_) | Literal::Quote(_) | Literal::AList(_) => self.size() > 0,
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Literal::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Identity comparison. Numbers compare by coerced value, booleans by
    /// the other side's truthiness, reference types by pointer.
    pub fn is_ref_equal_to(&self, other: &Literal) -> bool {
        match (self, other) {
            (a, b) if a.result_type().is_numeric() => {
                if !b.result_type().is_numeric() {
                    return false;
                }
                let integral = |t: ResultType| matches!(t, ResultType::Int | ResultType::Long);
                if integral(a.result_type()) && integral(b.result_type()) {
                    a.as_long() == b.as_long()
                } else {
                    a.as_double() == b.as_double()
                }
            }
            (Literal::Boolean(value), b) => b.as_bool() == *value,
            (Literal::Str(a), Literal::Str(b)) => Rc::ptr_eq(a, b),
            (Literal::Quote(a), Literal::Quote(b)) => Rc::ptr_eq(a, b),
            (Literal::Object(a), Literal::Object(b)) => a.ptr_eq(b),
            (Literal::AList(a), Literal::AList(b)) => Rc::ptr_eq(a, b),
            (Literal::Pair(a), Literal::Pair(b)) => Rc::ptr_eq(a, b),
            (Literal::Lambda(a), Literal::Lambda(b)) => Rc::ptr_eq(a, b),
            (Literal::Null, Literal::Null)
            | (Literal::Void, Literal::Void)
            | (Literal::NilList, Literal::NilList) => true,
            _ => false,
        }
    }

    pub fn is_lambda(&self) -> bool {
        matches!(self, Literal::Lambda(_))
    }
}

/// Structural equality: same variant and same value
impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Long(a), Literal::Long(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a == b,
            (Literal::Double(a), Literal::Double(b)) => a == b,
            (Literal::Str(a), Literal::Str(b)) => a == b,
            (Literal::Boolean(a), Literal::Boolean(b)) => a == b,
            (Literal::Quote(a), Literal::Quote(b)) => Rc::ptr_eq(a, b) || a.to_string() == b.to_string(),
            (Literal::Object(a), Literal::Object(b)) => a.ptr_eq(b),
            (Literal::AList(a), Literal::AList(b)) => a == b,
            (Literal::Pair(a), Literal::Pair(b)) => pairs_equal(a, b),
            (Literal::Lambda(a), Literal::Lambda(b)) => Rc::ptr_eq(a, b),
            (Literal::Null, Literal::Null)
            | (Literal::Void, Literal::Void)
            | (Literal::NilList, Literal::NilList) => true,
            _ => false,
        }
    }
}

fn pairs_equal(mut a: &Pair, mut b: &Pair) -> bool {
    loop {
        if std::ptr::eq(a, b) {
            return true;
        }
        if a.car != b.car {
            return false;
        }
        match (&a.cdr, &b.cdr) {
            (Literal::Pair(x), Literal::Pair(y)) => {
                a = x;
                b = y;
            }
            (x, y) => return x == y,
        }
    }
}

/// Floats keep a trailing `.0` when integral
fn write_float<T: Into<f64> + fmt::Display + Copy>(f: &mut fmt::Formatter<'_>, value: T) -> fmt::Result {
    let wide: f64 = value.into();
    if wide.is_finite() && wide.fract() == 0.0 && wide.abs() < 1e15 {
        write!(f, "{:.1}", value)
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Long(v) => write!(f, "{}", v),
            Literal::Float(v) => write_float(f, *v),
            Literal::Double(v) => write_float(f, *v),
            Literal::Str(text) => write!(f, "{}", text),
            Literal::Boolean(true) => write!(f, "#t"),
            Literal::Boolean(false) => write!(f, "#f"),
            Literal::Null => write!(f, "#null"),
            Literal::Void => Ok(()),
            Literal::Quote(node) => write!(f, "{}", node),
            Literal::Object(object) => write!(f, "{}", object),
            Literal::AList(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Literal::NilList => write!(f, "()"),
            Literal::Pair(pair) => {
                write!(f, "({}", pair.car)?;
                let mut tail = &pair.cdr;
                loop {
                    match tail {
                        Literal::Pair(next) => {
                            write!(f, " {}", next.car)?;
                            tail = &next.cdr;
                        }
                        Literal::NilList => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Literal::Lambda(closure) => write!(f, "#<lambda {}>", closure.def.signature()),
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    pub modifiers: Vec<Modifier>,
    pub declared_type: Option<String>,
    pub value: Box<Node>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub lambda: Rc<LambdaDef>,
}

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub declared_type: Option<String>,
    pub optional: bool,
    /// Collects the remaining positional arguments into a list
    pub rest: bool,
    pub default: Option<Box<Node>>,
    pub dynamic: bool,
    pub mutable: bool,
}

impl ParamDef {
    pub fn required(name: &str) -> Self {
        ParamDef {
            name: name.to_string(),
            declared_type: None,
            optional: false,
            rest: false,
            default: None,
            dynamic: false,
            mutable: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LambdaDef {
    pub modifiers: Vec<Modifier>,
    pub params: Vec<ParamDef>,
    pub body: Box<Node>,
    pub return_type: Option<String>,
}

impl LambdaDef {
    /// Count of leading parameters that must be supplied
    pub fn min_arity(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| !p.optional && !p.rest)
            .count()
    }

    /// Total parameter count, unbounded when a `&rest` parameter exists
    pub fn max_arity(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.rest) {
            None
        } else {
            Some(self.params.len())
        }
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    /// `(a b &opt c)` style rendering of the parameter list
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let mut text = String::new();
                if p.rest {
                    text.push_str("&rest ");
                }
                text.push_str(&p.name);
                if let Some(ty) = &p.declared_type {
                    text.push_str("::");
                    text.push_str(ty);
                }
                text
            })
            .collect();
        format!("({})", params.join(" "))
    }
}

#[derive(Debug, Clone)]
pub enum Definition {
    Variable(VariableDef),
    Function(FunctionDef),
    Lambda(Rc<LambdaDef>),
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
pub struct CondBranch {
    pub condition: Box<Node>,
    pub then: Box<Node>,
}

/// One `:name` or `:.field` segment of a member chain
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub name: String,
    pub is_field: bool,
}

#[derive(Debug, Clone)]
pub struct FuncArg {
    pub value: Node,
    /// Set for `:name value` arguments
    pub name: Option<String>,
}

impl FuncArg {
    pub fn positional(value: Node) -> Self {
        FuncArg { value, name: None }
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum ListAccessor {
    /// String of `f`/`r` steps, applied last character first
    Pattern(String),
    Index(Box<Node>),
}

#[derive(Debug, Clone)]
pub enum Expression {
    Assign {
        name: String,
        value: Box<Node>,
    },
    If {
        branch: CondBranch,
        else_branch: Option<Box<Node>>,
    },
    Cond {
        branches: Vec<CondBranch>,
        else_branch: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
        is_do_while: bool,
    },
    Multi(Vec<Node>),
    Print(Vec<Node>),
    Cons {
        car: Box<Node>,
        cdr: Box<Node>,
    },
    PairList(Vec<Node>),
    ListAccess {
        accessor: ListAccessor,
        list: Box<Node>,
    },
    FunctionCall {
        name: String,
        accessors: Vec<Accessor>,
        args: Vec<FuncArg>,
    },
    /// Bare variable read, optionally followed by member accessors
    LiteralCall {
        name: String,
        accessors: Vec<Accessor>,
    },
    /// `(@Type ...)` call into the host runtime
    HostCall {
        type_name: String,
        accessors: Vec<Accessor>,
        args: Vec<FuncArg>,
    },
    /// `(expr :member ...)` call on an evaluated value
    ObjectCall {
        target: Box<Node>,
        accessors: Vec<Accessor>,
        args: Vec<FuncArg>,
    },
    /// `((callee-expr) args...)` call on a computed callee
    Apply {
        callee: Box<Node>,
        args: Vec<FuncArg>,
    },
}

// ============================================================================
// Operations
// ============================================================================

macro_rules! operations {
    ($($variant:ident),* $(,)?) => {
        /// One variant per operator, each holding its operands in order
        #[derive(Debug, Clone)]
        pub enum Operation {
            $($variant(Vec<Node>),)*
        }

        impl Operation {
            pub fn new(operator: Operator, operands: Vec<Node>) -> Self {
                match operator {
                    $(Operator::$variant => Operation::$variant(operands),)*
                }
            }

            pub fn operator(&self) -> Operator {
                match self {
                    $(Operation::$variant(_) => Operator::$variant,)*
                }
            }

            pub fn operands(&self) -> &[Node] {
                match self {
                    $(Operation::$variant(operands) => operands,)*
                }
            }
        }
    };
}

operations!(
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponentiate,
    Increment,
    Decrement,
    And,
    Or,
    Nand,
    Nor,
    Xor,
    Xnor,
    Negate,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equals,
    RefEquality,
    RefNonEquality,
);

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
pub enum Node {
    Literal(Literal),
    Definition(Definition),
    Expression(Expression),
    Operation(Operation),
}

impl Node {
    pub fn int(value: i32) -> Self {
        Node::Literal(Literal::Int(value))
    }

    pub fn string(text: &str) -> Self {
        Node::Literal(Literal::string(text))
    }

    pub fn variable(name: &str) -> Self {
        Node::Expression(Expression::LiteralCall {
            name: name.to_string(),
            accessors: Vec::new(),
        })
    }

    pub fn call(name: &str, args: Vec<Node>) -> Self {
        Node::Expression(Expression::FunctionCall {
            name: name.to_string(),
            accessors: Vec::new(),
            args: args.into_iter().map(FuncArg::positional).collect(),
        })
    }

    pub fn operation(operator: Operator, operands: Vec<Node>) -> Self {
        Node::Operation(Operation::new(operator, operands))
    }
}

/// A parsed program: the ordered top-level nodes
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nodes: Vec<Node>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

// ============================================================================
// Source rendering
// ============================================================================

fn write_all(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, " {}", node)?;
    }
    Ok(())
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[FuncArg]) -> fmt::Result {
    for arg in args {
        match &arg.name {
            Some(name) => write!(f, " :{} {}", name, arg.value)?,
            None => write!(f, " {}", arg.value)?,
        }
    }
    Ok(())
}

fn write_accessors(f: &mut fmt::Formatter<'_>, accessors: &[Accessor]) -> fmt::Result {
    for accessor in accessors {
        let prefix = if accessor.is_field { ":." } else { ":" };
        write!(f, "{}{}", prefix, accessor.name)?;
    }
    Ok(())
}

impl fmt::Display for LambdaDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lambda {} {})", self.signature(), self.body)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(Literal::Str(text)) => write!(f, "\"{}\"", text),
            Node::Literal(Literal::Quote(node)) => write!(f, "`{}", node),
            Node::Literal(literal) => write!(f, "{}", literal),
            Node::Definition(Definition::Variable(def)) => {
                write!(f, "(define {} {})", def.name, def.value)
            }
            Node::Definition(Definition::Function(def)) => {
                write!(f, "(define {} {})", def.name, def.lambda)
            }
            Node::Definition(Definition::Lambda(def)) => write!(f, "{}", def),
            Node::Operation(operation) => {
                write!(f, "({}", operation.operator().lexeme())?;
                write_all(f, operation.operands())?;
                write!(f, ")")
            }
            Node::Expression(expression) => match expression {
                Expression::Assign { name, value } => write!(f, "(:= {} {})", name, value),
                Expression::If {
                    branch,
                    else_branch,
                } => {
                    write!(f, "(if {} {}", branch.condition, branch.then)?;
                    if let Some(other) = else_branch {
                        write!(f, " {}", other)?;
                    }
                    write!(f, ")")
                }
                Expression::Cond {
                    branches,
                    else_branch,
                } => {
                    write!(f, "(cond")?;
                    for branch in branches {
                        write!(f, " ({} {})", branch.condition, branch.then)?;
                    }
                    if let Some(other) = else_branch {
                        write!(f, " (else {})", other)?;
                    }
                    write!(f, ")")
                }
                Expression::While {
                    condition,
                    body,
                    is_do_while,
                } => {
                    let marker = if *is_do_while { " &do" } else { "" };
                    write!(f, "(while{} {} {})", marker, condition, body)
                }
                Expression::Multi(nodes) => {
                    write!(f, "(begin")?;
                    write_all(f, nodes)?;
                    write!(f, ")")
                }
                Expression::Print(nodes) => {
                    write!(f, "(print")?;
                    write_all(f, nodes)?;
                    write!(f, ")")
                }
                Expression::Cons { car, cdr } => write!(f, "(cons {} {})", car, cdr),
                Expression::PairList(nodes) => {
                    write!(f, "(list")?;
                    write_all(f, nodes)?;
                    write!(f, ")")
                }
                Expression::ListAccess { accessor, list } => match accessor {
                    ListAccessor::Pattern(pattern) => write!(f, "(lacc `{} {})", pattern, list),
                    ListAccessor::Index(index) => write!(f, "(lacc {} {})", index, list),
                },
                Expression::FunctionCall {
                    name,
                    accessors,
                    args,
                } => {
                    write!(f, "({}", name)?;
                    write_accessors(f, accessors)?;
                    write_args(f, args)?;
                    write!(f, ")")
                }
                Expression::LiteralCall { name, accessors } => {
                    write!(f, "{}", name)?;
                    write_accessors(f, accessors)
                }
                Expression::HostCall {
                    type_name,
                    accessors,
                    args,
                } => {
                    write!(f, "(@{}", type_name)?;
                    write_accessors(f, accessors)?;
                    write_args(f, args)?;
                    write!(f, ")")
                }
                Expression::ObjectCall {
                    target,
                    accessors,
                    args,
                } => {
                    write!(f, "({} ", target)?;
                    write_accessors(f, accessors)?;
                    write_args(f, args)?;
                    write!(f, ")")
                }
                Expression::Apply { callee, args } => {
                    write!(f, "({}", callee)?;
                    write_args(f, args)?;
                    write!(f, ")")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_lists_compare_and_drop() {
        let build = || Literal::list((0..200_000).map(Literal::Int).collect::<Vec<_>>());
        let a = build();
        let b = build();
        assert_eq!(a.as_int(), 200_000);
        assert!(a == b);
        assert!(a != Literal::list(vec![Literal::Int(0)]));
        drop(a);
        drop(b);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Literal::string("abc").as_int(), 3);
        assert!(!Literal::string("").as_bool());
        assert_eq!(Literal::Boolean(true).as_long(), 1);
        assert_eq!(Literal::Null.as_double(), 0.0);
        assert_eq!(Literal::Double(2.9).as_int(), 2);
        assert_eq!(Literal::list(vec![Literal::Int(1), Literal::Int(2)]).as_int(), 2);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Literal::Boolean(false).to_string(), "#f");
        assert_eq!(Literal::Null.to_string(), "#null");
        assert_eq!(Literal::Void.to_string(), "");
        assert_eq!(Literal::Double(3.0).to_string(), "3.0");
        assert_eq!(Literal::Float(2.5).to_string(), "2.5");
        assert_eq!(
            Literal::list(vec![Literal::Int(1), Literal::Int(2), Literal::Int(3)]).to_string(),
            "(1 2 3)"
        );
        assert_eq!(Literal::cons(Literal::Int(1), Literal::Int(2)).to_string(), "(1 . 2)");
        assert_eq!(
            Literal::AList(Rc::new(vec![Literal::Int(2), Literal::Int(3)])).to_string(),
            "[2, 3]"
        );
    }

    #[test]
    fn test_ref_equality_rules() {
        assert!(Literal::Int(2).is_ref_equal_to(&Literal::Double(2.0)));
        assert!(Literal::Long(7).is_ref_equal_to(&Literal::Int(7)));
        assert!(!Literal::Int(1).is_ref_equal_to(&Literal::string("a")));

        let shared = Literal::string("same");
        assert!(shared.is_ref_equal_to(&shared.clone()));
        assert!(!shared.is_ref_equal_to(&Literal::string("same")));

        assert!(Literal::Boolean(true).is_ref_equal_to(&Literal::Int(5)));
        assert!(Literal::Null.is_ref_equal_to(&Literal::Null));
        assert!(!Literal::Null.is_ref_equal_to(&Literal::Int(0)));
    }

    #[test]
    fn test_structural_equality_is_typed() {
        assert_eq!(Literal::string("a"), Literal::string("a"));
        assert_ne!(Literal::Int(1), Literal::Long(1));
        assert_eq!(
            Literal::list(vec![Literal::Int(1)]),
            Literal::list(vec![Literal::Int(1)])
        );
    }

    #[test]
    fn test_arity_bounds() {
        let mut optional = ParamDef::required("c");
        optional.optional = true;
        let lambda = LambdaDef {
            modifiers: Vec::new(),
            params: vec![ParamDef::required("a"), ParamDef::required("b"), optional],
            body: Box::new(Node::int(1)),
            return_type: None,
        };
        assert_eq!(lambda.min_arity(), 2);
        assert_eq!(lambda.max_arity(), Some(3));
    }

    #[test]
    fn test_node_rendering() {
        let node = Node::operation(
            Operator::Add,
            vec![Node::int(1), Node::call("f", vec![Node::variable("x")])],
        );
        assert_eq!(node.to_string(), "(+ 1 (f x))");
    }
}
