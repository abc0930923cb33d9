//! Recursive-descent parser for S-expression forms
//!
//! Every form is parenthesized. After the opening paren the parser
//! dispatches on the head token:
//! - `define`, `func`, `lambda` produce definitions
//! - `if`, `cond`, `begin`, `print`, `list`, `lacc`, `while`, `cons`,
//!   `car`, `cdr`, `:=` produce expressions
//! - operator symbols and words produce operations
//! - an identifier directly after `(` is a call, anywhere else a read

use crate::error::{Result, SableError};
use crate::parser::ast::{
    Accessor, CondBranch, Definition, Expression, FuncArg, FunctionDef, LambdaDef, ListAccessor,
    Literal, Node, Operation, ParamDef, Program, VariableDef,
};
use crate::parser::lexer::Lexer;
use crate::parser::token::{
    DefinitionKeyword, ExpressionKeyword, Lexical, LiteralKind, Modifier, Operator, Syntactic,
    Token, TokenKind, TokenValue,
};
use std::rc::Rc;
use tracing::warn;

const LEFT_PAREN: TokenKind = TokenKind::Lexical(Lexical::LeftParen);
const RIGHT_PAREN: TokenKind = TokenKind::Lexical(Lexical::RightParen);
const EOF: TokenKind = TokenKind::Lexical(Lexical::Eof);
const IDENTIFIER: TokenKind = TokenKind::Literal(LiteralKind::Identifier);

/// Longest token dump attached to a parse error
const REMAINING_DUMP_LIMIT: usize = 32;

/// Parses a token buffer into a [`Program`]
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a parser by lexing the given source
    pub fn new(input: &str) -> Result<Self> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self::from_tokens(tokens))
    }

    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(|t| t.is(EOF)) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token::new(EOF, "", None, line));
        }
        Parser {
            tokens,
            position: 0,
        }
    }

    // ========================================================================
    // Cursor
    // ========================================================================

    fn peek(&self) -> &Token {
        self.peek_n(1)
    }

    /// `peek_n(1)` is the current token, `peek_n(2)` the one after it
    fn peek_n(&self, n: usize) -> &Token {
        let index = (self.position + n.saturating_sub(1)).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    /// `previous_n(1)` is the last consumed token
    fn previous_n(&self, n: usize) -> Option<&Token> {
        self.position.checked_sub(n).and_then(|i| self.tokens.get(i))
    }

    fn at_end(&self) -> bool {
        self.peek().is(EOF)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.at_end() {
            self.position += 1;
        }
        token
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("{}, found: {}", message, self.peek().kind)))
        }
    }

    fn consume_left(&mut self, message: &str) -> Result<()> {
        self.consume(LEFT_PAREN, message).map(|_| ())
    }

    fn consume_right(&mut self, message: &str) -> Result<()> {
        self.consume(RIGHT_PAREN, message).map(|_| ())
    }

    fn error(&self, message: impl Into<String>) -> SableError {
        let remaining: Vec<String> = self.tokens[self.position..]
            .iter()
            .take(REMAINING_DUMP_LIMIT)
            .map(|t| t.kind.to_string())
            .collect();
        let mut dump = remaining.join(", ");
        if self.tokens.len() - self.position > REMAINING_DUMP_LIMIT {
            dump.push_str(", ...");
        }
        SableError::parse(message, self.peek().line, self.position, dump)
    }

    // ========================================================================
    // Program and forms
    // ========================================================================

    /// Grammar: program = expression_data*
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::new();
        while !self.at_end() {
            program.push(self.parse_expression_data()?);
        }
        Ok(program)
    }

    /// Parse whatever the current token starts. Forms that follow an
    /// opening paren are parsed without it; `parse_s_expr` owns the parens.
    fn parse_expression_data(&mut self) -> Result<Node> {
        crate::with_stack(|| self.parse_expression_form())
    }

    fn parse_expression_form(&mut self) -> Result<Node> {
        let token = self.peek();
        match token.kind {
            TokenKind::Lexical(Lexical::LeftParen) => self.parse_s_expr(),
            TokenKind::Definition(keyword) => match keyword {
                DefinitionKeyword::Define => self.parse_define(),
                DefinitionKeyword::Func => self.parse_func(),
                DefinitionKeyword::Lambda => {
                    let lambda = self.parse_lambda()?;
                    Ok(Node::Definition(Definition::Lambda(Rc::new(lambda))))
                }
            },
            TokenKind::Expression(keyword) => self.parse_exact_expression(keyword),
            TokenKind::Operation(operator) => self.parse_operation(operator),
            TokenKind::Literal(_) => self.parse_literal(),
            TokenKind::Syntactic(Syntactic::Grave) => self.parse_quote(),
            TokenKind::Lexical(Lexical::RightParen)
                if self.previous_n(1).is_some_and(|t| t.is(LEFT_PAREN)) =>
            {
                Ok(Node::Literal(Literal::NilList))
            }
            _ => Err(self.error(format!("Unexpected syntax in expression: {}", token))),
        }
    }

    /// Grammar: s_expr = '(' expression_data (':' member func_arg*)? ')'
    ///                 | '(' s_expr func_arg* ')'
    fn parse_s_expr(&mut self) -> Result<Node> {
        self.consume_left("Expected start of s-expression")?;
        let nested_head = self.check(LEFT_PAREN);
        let mut expression = self.parse_expression_data()?;

        if self.check(TokenKind::Syntactic(Syntactic::Colon)) {
            expression = self.parse_object_call(expression)?;
        } else if nested_head && !self.check(RIGHT_PAREN) {
            let args = self.parse_func_args()?;
            expression = Node::Expression(Expression::Apply {
                callee: Box::new(expression),
                args,
            });
        }

        self.consume_right("Expected closing parenthesis of expression")?;
        Ok(expression)
    }

    /// Grammar: object_call = ':' member_chain func_arg*
    fn parse_object_call(&mut self, target: Node) -> Result<Node> {
        self.consume(TokenKind::Syntactic(Syntactic::Colon), "Expected colon")?;
        let member = self.consume(IDENTIFIER, "Expected member name after ':'")?;
        let (name, mut rest) = split_accessors(member.text());

        let mut accessors = vec![Accessor {
            name,
            is_field: false,
        }];
        accessors.append(&mut rest);

        let args = self.parse_func_args()?;
        Ok(Node::Expression(Expression::ObjectCall {
            target: Box::new(target),
            accessors,
            args,
        }))
    }

    // ========================================================================
    // Definitions
    // ========================================================================

    /// Grammar: define = 'define' IDENT modifier* TYPE? (lambda_form | expression_data)
    fn parse_define(&mut self) -> Result<Node> {
        self.consume(TokenKind::Definition(DefinitionKeyword::Define), "Expected define")?;
        let name = self.consume(IDENTIFIER, "Definition without name")?.lexeme;
        let modifiers = self.parse_modifiers();
        let declared_type = self.parse_type_annotation();

        let lambda_follows = self.check(LEFT_PAREN)
            && self.peek_n(2).is(TokenKind::Definition(DefinitionKeyword::Lambda));

        if lambda_follows {
            self.consume_left("Expected start of s-expr")?;
            let lambda = self.parse_lambda()?;
            self.consume_right("Expected end of s-expr")?;

            if let Some(ty) = declared_type {
                warn!(
                    name = %name,
                    "Type specifier {} is unused. Type annotations are ignored on lambda bound definitions.",
                    ty
                );
            }
            return Ok(Node::Definition(Definition::Function(FunctionDef {
                name,
                lambda: Rc::new(lambda),
            })));
        }

        let value = match self.peek().kind {
            TokenKind::Lexical(Lexical::LeftParen) => self.parse_expression_data()?,
            TokenKind::Literal(_) => self.parse_literal()?,
            TokenKind::Syntactic(Syntactic::Grave) => self.parse_quote()?,
            _ => {
                return Err(self.error(format!("Invalid syntax in define: {}", self.peek().kind)))
            }
        };

        Ok(Node::Definition(Definition::Variable(VariableDef {
            name,
            modifiers,
            declared_type,
            value: Box::new(value),
        })))
    }

    /// Grammar: func = 'func' IDENT modifier* params '(' multi_expr ')' TYPE?
    fn parse_func(&mut self) -> Result<Node> {
        self.consume(TokenKind::Definition(DefinitionKeyword::Func), "Expected func")?;
        let name = self.consume(IDENTIFIER, "Func definition without name")?.lexeme;
        let modifiers = self.parse_modifiers();
        let params = self.parse_parameters(&modifiers)?;

        self.consume_left("Expected function body")?;
        let body = self.parse_multi_expr()?;
        self.consume_right("Expected end of function body")?;

        let return_type = self.parse_type_annotation();
        Ok(Node::Definition(Definition::Function(FunctionDef {
            name,
            lambda: Rc::new(LambdaDef {
                modifiers,
                params,
                body: Box::new(body),
                return_type,
            }),
        })))
    }

    /// Grammar: lambda = 'lambda' modifier* params ('(' multi_expr ')' | literal) TYPE?
    fn parse_lambda(&mut self) -> Result<LambdaDef> {
        self.consume(TokenKind::Definition(DefinitionKeyword::Lambda), "Expected lambda")?;
        let modifiers = self.parse_modifiers();
        let params = self.parse_parameters(&modifiers)?;

        let body = if self.check(LEFT_PAREN) {
            self.consume_left("Expected lambda body")?;
            let body = self.parse_multi_expr()?;
            self.consume_right("Expected end of lambda body")?;
            body
        } else {
            self.parse_literal()?
        };

        let return_type = self.parse_type_annotation();
        Ok(LambdaDef {
            modifiers,
            params,
            body: Box::new(body),
            return_type,
        })
    }

    /// Grammar: params = '(' (modifier* IDENT ('=' literal)? TYPE?)* ')'
    fn parse_parameters(&mut self, lambda_modifiers: &[Modifier]) -> Result<Vec<ParamDef>> {
        self.consume_left("Expected opening parenthesis for parameters")?;

        let fin_all = lambda_modifiers.contains(&Modifier::FinAll);
        let dynamic_all = !fin_all && lambda_modifiers.contains(&Modifier::DynAll);
        let mutable_all = !fin_all && (dynamic_all || lambda_modifiers.contains(&Modifier::MutAll));

        let mut params: Vec<ParamDef> = Vec::new();
        let mut optional = false;

        while !self.check(RIGHT_PAREN) && !self.at_end() {
            if params.last().is_some_and(|p| p.rest) {
                return Err(self.error("&rest must be the last parameter"));
            }

            let modifiers = self.parse_modifiers();
            optional |= modifiers.contains(&Modifier::Opt);
            let rest = modifiers.contains(&Modifier::Rest);
            let fin = modifiers.contains(&Modifier::Fin);
            let dynamic = !fin && (dynamic_all || modifiers.contains(&Modifier::Dyn));
            let mutable = !fin && (mutable_all || dynamic || modifiers.contains(&Modifier::Mut));

            let name = self.consume(IDENTIFIER, "Parameter Identifier expected")?.lexeme;

            let default = if self.check(TokenKind::Syntactic(Syntactic::Equal)) {
                if !optional {
                    return Err(self.error("Must specify &opt to declare optional parameters"));
                }
                if rest {
                    return Err(self.error("&rest parameters cannot declare a default"));
                }
                self.advance();
                Some(Box::new(self.parse_literal()?))
            } else {
                None
            };

            let declared_type = self.parse_type_annotation();
            params.push(ParamDef {
                name,
                declared_type,
                optional: optional && !rest,
                rest,
                default,
                dynamic,
                mutable,
            });
        }

        self.consume_right("Error parsing parameters")?;
        Ok(params)
    }

    fn parse_modifiers(&mut self) -> Vec<Modifier> {
        let mut modifiers = Vec::new();
        while let TokenKind::Modifier(modifier) = self.peek().kind {
            modifiers.push(modifier);
            self.advance();
        }
        modifiers
    }

    fn parse_type_annotation(&mut self) -> Option<String> {
        if self.check(TokenKind::Syntactic(Syntactic::Type)) {
            Some(self.advance().text().to_string())
        } else {
            None
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_exact_expression(&mut self, keyword: ExpressionKeyword) -> Result<Node> {
        self.advance();
        let expression = match keyword {
            ExpressionKeyword::Assign => self.parse_assign()?,
            ExpressionKeyword::If => self.parse_if()?,
            ExpressionKeyword::Cond => self.parse_cond()?,
            ExpressionKeyword::Begin => return self.parse_multi_expr(),
            ExpressionKeyword::Print => Expression::Print(self.parse_until_close()?),
            ExpressionKeyword::List => {
                let elements = self.parse_until_close()?;
                if elements.is_empty() {
                    return Ok(Node::Literal(Literal::NilList));
                }
                Expression::PairList(elements)
            }
            ExpressionKeyword::Lacc => self.parse_list_access()?,
            ExpressionKeyword::While => self.parse_while()?,
            ExpressionKeyword::Cons => {
                if self.check(RIGHT_PAREN) {
                    return Err(self.error("cons requires exactly two operands"));
                }
                let car = self.parse_expression_data()?;
                let cdr = self.parse_pair_operand()?;
                Expression::Cons {
                    car: Box::new(car),
                    cdr: Box::new(cdr),
                }
            }
            ExpressionKeyword::Car => Expression::ListAccess {
                accessor: ListAccessor::Pattern("f".to_string()),
                list: Box::new(self.parse_pair_operand()?),
            },
            ExpressionKeyword::Cdr => Expression::ListAccess {
                accessor: ListAccessor::Pattern("r".to_string()),
                list: Box::new(self.parse_pair_operand()?),
            },
        };
        Ok(Node::Expression(expression))
    }

    /// Grammar: multi_expr = expression_data+
    fn parse_multi_expr(&mut self) -> Result<Node> {
        let mut expressions = self.parse_until_close()?;
        match expressions.len() {
            0 => Err(self.error("Expected one or more expressions")),
            1 => Ok(expressions.remove(0)),
            _ => Ok(Node::Expression(Expression::Multi(expressions))),
        }
    }

    fn parse_until_close(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        while !self.check(RIGHT_PAREN) && !self.at_end() {
            nodes.push(self.parse_expression_data()?);
        }
        Ok(nodes)
    }

    /// The final operand of a fixed-arity form
    fn parse_pair_operand(&mut self) -> Result<Node> {
        let node = self.parse_expression_data()?;
        if !self.check(RIGHT_PAREN) {
            return Err(self.error("Invalid argument count"));
        }
        Ok(node)
    }

    /// Grammar: assign = ':=' IDENT expression_data
    fn parse_assign(&mut self) -> Result<Expression> {
        let name = self.consume(IDENTIFIER, "Expected identifier for assignment")?.lexeme;
        let value = self.parse_expression_data()?;
        Ok(Expression::Assign {
            name,
            value: Box::new(value),
        })
    }

    /// Grammar: if = 'if' expression_data expression_data expression_data?
    fn parse_if(&mut self) -> Result<Expression> {
        let condition = self.parse_expression_data()?;
        let then = self.parse_expression_data()?;
        let else_branch = if self.check(RIGHT_PAREN) {
            None
        } else {
            Some(Box::new(self.parse_expression_data()?))
        };
        Ok(Expression::If {
            branch: CondBranch {
                condition: Box::new(condition),
                then: Box::new(then),
            },
            else_branch,
        })
    }

    /// Grammar: cond = 'cond' ('(' expression_data expression_data ')')+ ('(' 'else' expression_data ')')?
    fn parse_cond(&mut self) -> Result<Expression> {
        let mut branches = Vec::new();
        let mut else_branch = None;

        while !self.check(RIGHT_PAREN) && !self.at_end() {
            if self.peek_n(2).is(TokenKind::Syntactic(Syntactic::Else)) {
                self.consume_left("Expected opening parenthesis for else")?;
                self.advance();
                else_branch = Some(Box::new(self.parse_expression_data()?));
                self.consume_right("Expected closing parenthesis for else")?;
                break;
            }

            self.consume_left("Expected opening parenthesis for conditional branch expression")?;
            let condition = self.parse_expression_data()?;
            let then = self.parse_expression_data()?;
            self.consume_right("Expected closing parenthesis for conditional branch expression")?;
            branches.push(CondBranch {
                condition: Box::new(condition),
                then: Box::new(then),
            });
        }

        if branches.is_empty() {
            return Err(self.error("Cond expression must have at least one branch"));
        }
        Ok(Expression::Cond {
            branches,
            else_branch,
        })
    }

    /// Grammar: while = 'while' '&do'? expression_data multi_expr
    fn parse_while(&mut self) -> Result<Expression> {
        let is_do_while = self.check(TokenKind::Modifier(Modifier::Do));
        if is_do_while {
            self.advance();
        }
        let condition = self.parse_expression_data()?;
        let body = self.parse_multi_expr()?;
        Ok(Expression::While {
            condition: Box::new(condition),
            body: Box::new(body),
            is_do_while,
        })
    }

    /// Grammar: lacc = 'lacc' ('`' PATTERN | expression_data) expression_data
    fn parse_list_access(&mut self) -> Result<Expression> {
        let accessor = if self.check(TokenKind::Syntactic(Syntactic::Grave)) {
            self.advance();
            let pattern = self.consume(IDENTIFIER, "Expected access pattern after '`'")?.lexeme;
            if pattern.is_empty() || !pattern.chars().all(|c| c == 'f' || c == 'r') {
                return Err(self.error(format!(
                    "Invalid list access pattern '{}': only 'f' and 'r' are allowed",
                    pattern
                )));
            }
            ListAccessor::Pattern(pattern)
        } else {
            ListAccessor::Index(Box::new(self.parse_expression_data()?))
        };

        let list = self.parse_pair_operand()?;
        Ok(Expression::ListAccess {
            accessor,
            list: Box::new(list),
        })
    }

    /// Grammar: operation = OPERATOR expression_data*
    fn parse_operation(&mut self, operator: Operator) -> Result<Node> {
        self.advance();
        let operands = self.parse_until_close()?;

        if operator == Operator::Negate && operands.len() > 1 {
            return Err(self.error("Negate is only valid as a unary operation"));
        }
        Ok(Node::Operation(Operation::new(operator, operands)))
    }

    fn parse_quote(&mut self) -> Result<Node> {
        self.advance();
        let quoted = self.parse_expression_data()?;
        Ok(Node::Literal(Literal::Quote(Rc::new(quoted))))
    }

    // ========================================================================
    // Literals and calls
    // ========================================================================

    fn parse_literal(&mut self) -> Result<Node> {
        if !matches!(self.peek().kind, TokenKind::Literal(_)) {
            return Err(self.error(format!("Expected literal value, found: {}", self.peek().kind)));
        }
        let token = self.advance();

        let literal = match (token.kind, &token.value) {
            (TokenKind::Literal(LiteralKind::True), _) => Literal::Boolean(true),
            (TokenKind::Literal(LiteralKind::False), _) => Literal::Boolean(false),
            (TokenKind::Literal(LiteralKind::Null), _) => Literal::Null,
            (TokenKind::Literal(LiteralKind::Str), Some(TokenValue::Text(text))) => {
                Literal::string(text.as_str())
            }
            (TokenKind::Literal(LiteralKind::Int), Some(TokenValue::Int(v))) => Literal::Int(*v),
            (TokenKind::Literal(LiteralKind::Long), Some(TokenValue::Long(v))) => Literal::Long(*v),
            (TokenKind::Literal(LiteralKind::Float), Some(TokenValue::Float(v))) => {
                Literal::Float(*v)
            }
            (TokenKind::Literal(LiteralKind::Double), Some(TokenValue::Double(v))) => {
                Literal::Double(*v)
            }
            (TokenKind::Literal(LiteralKind::Identifier), _) => return self.parse_identifier(&token),
            (TokenKind::Literal(LiteralKind::HostIdentifier), _) => {
                return self.parse_host_identifier(&token)
            }
            _ => return Err(self.error(format!("Malformed literal token: {}", token.lexeme))),
        };
        Ok(Node::Literal(literal))
    }

    /// True when the token just consumed was directly preceded by `(`
    fn in_call_position(&self) -> bool {
        self.previous_n(2).is_some_and(|t| t.is(LEFT_PAREN))
    }

    fn parse_identifier(&mut self, token: &Token) -> Result<Node> {
        let (name, accessors) = split_accessors(token.text());

        if self.in_call_position() {
            let args = self.parse_func_args()?;
            Ok(Node::Expression(Expression::FunctionCall {
                name,
                accessors,
                args,
            }))
        } else {
            Ok(Node::Expression(Expression::LiteralCall { name, accessors }))
        }
    }

    fn parse_host_identifier(&mut self, token: &Token) -> Result<Node> {
        if !self.in_call_position() {
            self.position -= 1;
            return Err(self.error("@<host> calls must occur inside an expression"));
        }
        let (type_name, accessors) = split_accessors(token.text());
        let args = self.parse_func_args()?;
        Ok(Node::Expression(Expression::HostCall {
            type_name,
            accessors,
            args,
        }))
    }

    /// Grammar: func_arg = (':' IDENT)? expression_data
    fn parse_func_args(&mut self) -> Result<Vec<FuncArg>> {
        let mut args = Vec::new();
        let mut named_seen = false;

        while !self.check(RIGHT_PAREN) && !self.at_end() {
            let arg = if self.check(TokenKind::Syntactic(Syntactic::Colon)) {
                self.advance();
                let name = self.consume(IDENTIFIER, "Expected named identifier for argument")?.lexeme;
                FuncArg {
                    value: self.parse_expression_data()?,
                    name: Some(name),
                }
            } else {
                FuncArg::positional(self.parse_expression_data()?)
            };

            named_seen |= arg.is_named();
            if named_seen && !arg.is_named() {
                return Err(self.error("All arguments following first named argument must be also named"));
            }
            args.push(arg);
        }
        Ok(args)
    }
}

/// Split `name:member:.field` into its base name and accessor chain
fn split_accessors(identifier: &str) -> (String, Vec<Accessor>) {
    let mut segments = identifier.split(':');
    let name = segments.next().unwrap_or_default().to_string();
    let accessors = segments
        .map(|segment| match segment.strip_prefix('.') {
            Some(field) => Accessor {
                name: field.to_string(),
                is_field: true,
            },
            None => Accessor {
                name: segment.to_string(),
                is_field: false,
            },
        })
        .collect();
    (name, accessors)
}

/// Lex and parse a source string
pub fn parse_program(input: &str) -> Result<Program> {
    Parser::new(input)?.parse_program()
}
