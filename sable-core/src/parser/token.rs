//! Token model
//!
//! Every token kind belongs to exactly one family. Symbolic lexemes are
//! bucketed by length into single and dual tables; word lexemes and
//! modifiers have their own tables. All tables are built once on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Structural tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lexical {
    LeftParen,
    RightParen,
    Quote,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Syntactic {
    Colon,
    /// `::name` type annotation
    Type,
    Grave,
    Equal,
    Else,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operator {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LiteralKind {
    True,
    False,
    Str,
    Int,
    Long,
    Float,
    Double,
    Identifier,
    /// `@Name` reference into the host runtime
    HostIdentifier,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExpressionKeyword {
    Assign,
    If,
    Cond,
    Begin,
    Print,
    List,
    Lacc,
    While,
    Cons,
    Car,
    Cdr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DefinitionKeyword {
    Define,
    Func,
    Lambda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Modifier {
    Mut,
    MutAll,
    Fin,
    FinAll,
    Dyn,
    DynAll,
    Opt,
    Rest,
    Do,
    Stat,
    StatAll,
    Priv,
    Pub,
    Prot,
    Sync,
    Vol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenKind {
    Lexical(Lexical),
    Syntactic(Syntactic),
    Operation(Operator),
    Literal(LiteralKind),
    Expression(ExpressionKeyword),
    Definition(DefinitionKeyword),
    Modifier(Modifier),
}

/// Typed payload carried by literal and annotation tokens
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub value: Option<TokenValue>,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, value: Option<TokenValue>, line: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            value,
            line,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Text payload, falling back to the raw lexeme
    pub fn text(&self) -> &str {
        match &self.value {
            Some(TokenValue::Text(text)) => text,
            _ => &self.lexeme,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Lexical(Lexical::Eof) => write!(f, "EOF"),
            TokenKind::Literal(LiteralKind::Str) => write!(f, "\"{}\"", self.text()),
            _ => write!(f, "{}", self.lexeme),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Lexical(kind) => write!(f, "{:?}", kind),
            TokenKind::Syntactic(kind) => write!(f, "{:?}", kind),
            TokenKind::Operation(kind) => write!(f, "{:?}", kind),
            TokenKind::Literal(kind) => write!(f, "{:?}", kind),
            TokenKind::Expression(kind) => write!(f, "{:?}", kind),
            TokenKind::Definition(kind) => write!(f, "{:?}", kind),
            TokenKind::Modifier(kind) => write!(f, "{:?}", kind),
        }
    }
}

// ============================================================================
// Lexeme tables
// ============================================================================

const SYMBOLS: &[(&str, TokenKind)] = &[
    ("(", TokenKind::Lexical(Lexical::LeftParen)),
    (")", TokenKind::Lexical(Lexical::RightParen)),
    ("\"", TokenKind::Lexical(Lexical::Quote)),
    (":", TokenKind::Syntactic(Syntactic::Colon)),
    ("`", TokenKind::Syntactic(Syntactic::Grave)),
    ("=", TokenKind::Syntactic(Syntactic::Equal)),
    ("+", TokenKind::Operation(Operator::Add)),
    ("-", TokenKind::Operation(Operator::Subtract)),
    ("*", TokenKind::Operation(Operator::Multiply)),
    ("/", TokenKind::Operation(Operator::Divide)),
    ("%", TokenKind::Operation(Operator::Modulo)),
    ("^", TokenKind::Operation(Operator::Exponentiate)),
    ("!", TokenKind::Operation(Operator::Negate)),
    (">", TokenKind::Operation(Operator::Greater)),
    ("<", TokenKind::Operation(Operator::Less)),
    ("::", TokenKind::Syntactic(Syntactic::Type)),
    (":=", TokenKind::Expression(ExpressionKeyword::Assign)),
    (">=", TokenKind::Operation(Operator::GreaterEqual)),
    ("<=", TokenKind::Operation(Operator::LessEqual)),
    ("==", TokenKind::Operation(Operator::RefEquality)),
    ("!=", TokenKind::Operation(Operator::RefNonEquality)),
    ("++", TokenKind::Operation(Operator::Increment)),
    ("--", TokenKind::Operation(Operator::Decrement)),
    ("#t", TokenKind::Literal(LiteralKind::True)),
    ("#f", TokenKind::Literal(LiteralKind::False)),
];

const WORDS: &[(&str, TokenKind)] = &[
    ("add", TokenKind::Operation(Operator::Add)),
    ("sub", TokenKind::Operation(Operator::Subtract)),
    ("mul", TokenKind::Operation(Operator::Multiply)),
    ("div", TokenKind::Operation(Operator::Divide)),
    ("mod", TokenKind::Operation(Operator::Modulo)),
    ("pow", TokenKind::Operation(Operator::Exponentiate)),
    ("inc", TokenKind::Operation(Operator::Increment)),
    ("dec", TokenKind::Operation(Operator::Decrement)),
    ("and", TokenKind::Operation(Operator::And)),
    ("or", TokenKind::Operation(Operator::Or)),
    ("nand", TokenKind::Operation(Operator::Nand)),
    ("nor", TokenKind::Operation(Operator::Nor)),
    ("xor", TokenKind::Operation(Operator::Xor)),
    ("xnor", TokenKind::Operation(Operator::Xnor)),
    ("not", TokenKind::Operation(Operator::Negate)),
    ("equals", TokenKind::Operation(Operator::Equals)),
    ("if", TokenKind::Expression(ExpressionKeyword::If)),
    ("cond", TokenKind::Expression(ExpressionKeyword::Cond)),
    ("begin", TokenKind::Expression(ExpressionKeyword::Begin)),
    ("print", TokenKind::Expression(ExpressionKeyword::Print)),
    ("list", TokenKind::Expression(ExpressionKeyword::List)),
    ("lacc", TokenKind::Expression(ExpressionKeyword::Lacc)),
    ("while", TokenKind::Expression(ExpressionKeyword::While)),
    ("cons", TokenKind::Expression(ExpressionKeyword::Cons)),
    ("car", TokenKind::Expression(ExpressionKeyword::Car)),
    ("cdr", TokenKind::Expression(ExpressionKeyword::Cdr)),
    ("define", TokenKind::Definition(DefinitionKeyword::Define)),
    ("func", TokenKind::Definition(DefinitionKeyword::Func)),
    ("lambda", TokenKind::Definition(DefinitionKeyword::Lambda)),
    ("else", TokenKind::Syntactic(Syntactic::Else)),
    ("null", TokenKind::Literal(LiteralKind::Null)),
];

const MODIFIERS: &[(&str, Modifier)] = &[
    ("&mut", Modifier::Mut),
    ("&mut-all", Modifier::MutAll),
    ("&fin", Modifier::Fin),
    ("&fin-all", Modifier::FinAll),
    ("&dyn", Modifier::Dyn),
    ("&dyn-all", Modifier::DynAll),
    ("&opt", Modifier::Opt),
    ("&rest", Modifier::Rest),
    ("&do", Modifier::Do),
    ("&stat", Modifier::Stat),
    ("&stat-all", Modifier::StatAll),
    ("&priv", Modifier::Priv),
    ("&pub", Modifier::Pub),
    ("&prot", Modifier::Prot),
    ("&sync", Modifier::Sync),
    ("&vol", Modifier::Vol),
];

static SINGLE_TOKENS: LazyLock<HashMap<char, TokenKind>> = LazyLock::new(|| {
    SYMBOLS
        .iter()
        .filter_map(|(lexeme, kind)| {
            let mut chars = lexeme.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some((c, *kind)),
                _ => None,
            }
        })
        .collect()
});

static DUAL_TOKENS: LazyLock<HashMap<(char, char), TokenKind>> = LazyLock::new(|| {
    SYMBOLS
        .iter()
        .filter_map(|(lexeme, kind)| {
            let mut chars = lexeme.chars();
            match (chars.next(), chars.next(), chars.next()) {
                (Some(a), Some(b), None) => Some(((a, b), *kind)),
                _ => None,
            }
        })
        .collect()
});

static KEYWORD_TOKENS: LazyLock<HashMap<&'static str, TokenKind>> =
    LazyLock::new(|| WORDS.iter().copied().collect());

static MODIFIER_TOKENS: LazyLock<HashMap<&'static str, Modifier>> =
    LazyLock::new(|| MODIFIERS.iter().copied().collect());

pub fn match_single(c: char) -> Option<TokenKind> {
    SINGLE_TOKENS.get(&c).copied()
}

pub fn match_dual(first: char, second: char) -> Option<TokenKind> {
    DUAL_TOKENS.get(&(first, second)).copied()
}

pub fn match_keyword(word: &str) -> Option<TokenKind> {
    KEYWORD_TOKENS.get(word).copied()
}

pub fn match_modifier(text: &str) -> Option<Modifier> {
    MODIFIER_TOKENS.get(text).copied()
}

impl Modifier {
    pub fn lexeme(self) -> &'static str {
        MODIFIERS
            .iter()
            .find(|(_, modifier)| *modifier == self)
            .map(|(lexeme, _)| *lexeme)
            .unwrap_or("&?")
    }
}

impl Operator {
    /// Canonical source lexeme, used when printing the AST
    pub fn lexeme(self) -> &'static str {
        SYMBOLS
            .iter()
            .chain(WORDS.iter())
            .find(|(_, kind)| *kind == TokenKind::Operation(self))
            .map(|(lexeme, _)| *lexeme)
            .unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_symbol_lands_in_one_bucket() {
        for (lexeme, kind) in SYMBOLS {
            let chars: Vec<char> = lexeme.chars().collect();
            let found = match chars.as_slice() {
                [c] => match_single(*c),
                [a, b] => match_dual(*a, *b),
                _ => None,
            };
            assert_eq!(found, Some(*kind), "lexeme {}", lexeme);
        }
    }

    #[test]
    fn test_keyword_and_modifier_lookup() {
        assert_eq!(match_keyword("xnor"), Some(TokenKind::Operation(Operator::Xnor)));
        assert_eq!(match_keyword("lacc"), Some(TokenKind::Expression(ExpressionKeyword::Lacc)));
        assert_eq!(match_keyword("order"), None);
        assert_eq!(match_modifier("&dyn-all"), Some(Modifier::DynAll));
        assert_eq!(match_modifier("&nope"), None);
    }

    #[test]
    fn test_operator_lexeme_prefers_symbol() {
        assert_eq!(Operator::Add.lexeme(), "+");
        assert_eq!(Operator::Xor.lexeme(), "xor");
        assert_eq!(Modifier::Opt.lexeme(), "&opt");
    }
}
