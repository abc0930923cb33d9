use crate::error::{Result, SableError};
use crate::parser::token::{
    match_dual, match_keyword, match_modifier, match_single, Lexical, LiteralKind, Syntactic, Token,
    TokenKind, TokenValue,
};

/// Tokenizes source text into tokens
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    line: usize,
    /// Kind of the most recently produced token
    last_kind: Option<TokenKind>,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Lexer {
            input: chars,
            position: 0,
            current_char,
            line: 1,
            last_kind: None,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    /// Skip whitespace and `;` comments, counting newlines
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.current_char {
            match ch {
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                ' ' | '\t' | '\r' => self.advance(),
                ';' => {
                    while !matches!(self.current_char, None | Some('\n')) {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Whitespace, `)` and end of input close a definition-like token
    fn at_def_end(&self) -> bool {
        match self.current_char {
            None => true,
            Some(ch) => ch.is_whitespace() || ch == ')',
        }
    }

    fn read_string(&mut self, line: usize) -> Result<Token> {
        self.advance(); // opening quote
        let mut text = String::new();

        loop {
            match self.current_char {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some(ch) => {
                    if ch == '\n' {
                        self.line += 1;
                    }
                    text.push(ch);
                    self.advance();
                }
                None => {
                    return Err(SableError::lex(
                        format!("Unterminated string line: {}", self.line),
                        self.line,
                    ))
                }
            }
        }

        Ok(Token::new(
            TokenKind::Literal(LiteralKind::Str),
            format!("\"{}\"", text),
            Some(TokenValue::Text(text)),
            line,
        ))
    }

    /// Read a numeric literal, including its optional suffix
    fn read_number(&mut self, line: usize) -> Result<Token> {
        let mut text = String::new();
        let mut fractional = false;

        if self.current_char == Some('-') {
            text.push('-');
            self.advance();
        }
        if self.current_char == Some('.') {
            text.push('.');
            fractional = true;
            self.advance();
        }

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.'
                && !fractional
                && self.peek().is_some_and(|next| next.is_ascii_digit())
            {
                text.push(ch);
                fractional = true;
                self.advance();
            } else {
                break;
            }
        }

        let suffix = match self.current_char {
            Some(c @ ('f' | 'F' | 'l' | 'L' | 'd' | 'D')) => {
                self.advance();
                if !self.at_def_end() {
                    return Err(SableError::lex(
                        format!(
                            "Encountered data directly after numeric literal terminator on line: {}",
                            self.line
                        ),
                        self.line,
                    ));
                }
                Some(c.to_ascii_lowercase())
            }
            Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => {
                return Err(SableError::lex(
                    format!("Invalid character '{}' after numeric literal {}", c, text),
                    self.line,
                ));
            }
            _ => None,
        };

        let (kind, value) = match (suffix, fractional) {
            (Some('f'), _) => (LiteralKind::Float, TokenValue::Float(parse_number(&text, line)?)),
            (Some('d'), _) | (None, true) => {
                (LiteralKind::Double, TokenValue::Double(parse_number(&text, line)?))
            }
            (Some(_), true) => {
                return Err(SableError::lex(
                    format!("Long literal cannot have a fractional part: {}", text),
                    line,
                ))
            }
            (Some(_), false) => (LiteralKind::Long, TokenValue::Long(parse_number(&text, line)?)),
            (None, false) => {
                let value: i64 = text.parse().map_err(|_| {
                    SableError::lex(format!("Integer literal out of range: {}", text), line)
                })?;
                match i32::try_from(value) {
                    Ok(small) => (LiteralKind::Int, TokenValue::Int(small)),
                    Err(_) => (LiteralKind::Long, TokenValue::Long(value)),
                }
            }
        };

        let lexeme = match suffix {
            Some(s) => format!("{}{}", text, s),
            None => text,
        };
        Ok(Token::new(TokenKind::Literal(kind), lexeme, Some(value), line))
    }

    /// Read an identifier body. A single `:` followed by a letter or `.`
    /// continues the identifier as a member accessor.
    fn read_identifier(&mut self) -> String {
        let mut result = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                result.push(ch);
                self.advance();
            } else if ch == ':' && !result.is_empty() {
                let starts_member = |c: Option<char>| c.is_some_and(|c| c.is_alphabetic() || c == '_');
                if starts_member(self.peek()) {
                    result.push(':');
                    self.advance();
                } else if self.peek() == Some('.') && starts_member(self.peek_at(2)) {
                    result.push_str(":.");
                    self.advance();
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        result
    }

    fn read_modifier(&mut self, line: usize) -> Result<Token> {
        let mut text = String::new();
        while !self.at_def_end() {
            if let Some(ch) = self.current_char {
                text.push(ch);
            }
            self.advance();
        }

        match match_modifier(&text) {
            Some(modifier) => Ok(Token::new(TokenKind::Modifier(modifier), text, None, line)),
            None => Err(SableError::lex(format!("Invalid syntax: {}", text), line)),
        }
    }

    /// Read the type name following `::`
    fn read_type(&mut self, line: usize) -> Result<Token> {
        let mut name = String::new();
        while !self.at_def_end() {
            if let Some(ch) = self.current_char {
                name.push(ch);
            }
            self.advance();
        }

        if name.is_empty() {
            return Err(SableError::lex("Expected type name after '::'", line));
        }
        Ok(Token::new(
            TokenKind::Syntactic(Syntactic::Type),
            format!("::{}", name),
            Some(TokenValue::Text(name)),
            line,
        ))
    }

    fn read_host_identifier(&mut self, line: usize) -> Result<Token> {
        self.advance(); // '@'
        let name = self.read_identifier();
        if name.is_empty() {
            return Err(SableError::lex("Expected host identifier after '@'", line));
        }
        Ok(Token::new(
            TokenKind::Literal(LiteralKind::HostIdentifier),
            format!("@{}", name),
            Some(TokenValue::Text(name)),
            line,
        ))
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let line = self.line;

        let Some(ch) = self.current_char else {
            return Ok(Token::new(TokenKind::Lexical(Lexical::Eof), "", None, line));
        };

        // Two-character lexemes win over their one-character prefixes when
        // a terminator follows; `::` runs straight into its type name
        if let Some(next) = self.peek().filter(|c| !c.is_whitespace()) {
            let dual = match_dual(ch, next).filter(|kind| {
                *kind == TokenKind::Syntactic(Syntactic::Type) || is_terminator(self.peek_at(2))
            });
            if let Some(kind) = dual {
                self.advance();
                self.advance();
                if kind == TokenKind::Syntactic(Syntactic::Type) {
                    return self.read_type(line);
                }
                return Ok(Token::new(kind, format!("{}{}", ch, next), None, line));
            }
        }

        // `-5` is a literal unless the minus heads a form
        let negative_number = ch == '-'
            && self.peek().is_some_and(|c| c.is_ascii_digit())
            && self.last_kind != Some(TokenKind::Lexical(Lexical::LeftParen));
        if negative_number {
            return self.read_number(line);
        }

        if let Some(kind) = match_single(ch) {
            if kind == TokenKind::Lexical(Lexical::Quote) {
                return self.read_string(line);
            }
            self.advance();
            return Ok(Token::new(kind, ch.to_string(), None, line));
        }

        match ch {
            '&' => self.read_modifier(line),
            '@' => self.read_host_identifier(line),
            c if c.is_ascii_digit() => self.read_number(line),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(line),
            c if c.is_alphabetic() || c == '_' => {
                let word = self.read_identifier();
                let kind = match_keyword(&word).unwrap_or(TokenKind::Literal(LiteralKind::Identifier));
                let value = (kind == TokenKind::Literal(LiteralKind::Identifier))
                    .then(|| TokenValue::Text(word.clone()));
                Ok(Token::new(kind, word, value, line))
            }
            _ => Err(SableError::lex(
                format!("Invalid character '{}' on line: {}", ch, line),
                line,
            )),
        }
    }

    /// Tokenize the entire input, ending with an EOF token
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(self.input.len() / 4 + 1);

        loop {
            let token = self.next_token()?;
            self.last_kind = Some(token.kind);
            let done = token.is(TokenKind::Lexical(Lexical::Eof));
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

fn parse_number<T: std::str::FromStr>(text: &str, line: usize) -> Result<T> {
    text.parse()
        .map_err(|_| SableError::lex(format!("Invalid numeric literal: {}", text), line))
}

/// Tokenize a source string
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).tokenize()
}

/// Whitespace, parens and end of input may follow a two-character lexeme
fn is_terminator(next: Option<char>) -> bool {
    match next {
        None => true,
        Some(ch) => ch.is_whitespace() || ch == '(' || ch == ')',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::token::{DefinitionKeyword, ExpressionKeyword, Modifier, Operator};

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_form() {
        let kinds = kinds("(define x 10)");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Lexical(Lexical::LeftParen),
                TokenKind::Definition(DefinitionKeyword::Define),
                TokenKind::Literal(LiteralKind::Identifier),
                TokenKind::Literal(LiteralKind::Int),
                TokenKind::Lexical(Lexical::RightParen),
                TokenKind::Lexical(Lexical::Eof),
            ]
        );
    }

    #[test]
    fn test_dual_tokens_not_split() {
        let kinds = kinds("(>= a b) (!= a b) (++ 1) (:= x 2) #t #f");
        assert!(kinds.contains(&TokenKind::Operation(Operator::GreaterEqual)));
        assert!(kinds.contains(&TokenKind::Operation(Operator::RefNonEquality)));
        assert!(kinds.contains(&TokenKind::Operation(Operator::Increment)));
        assert!(kinds.contains(&TokenKind::Expression(ExpressionKeyword::Assign)));
        assert!(kinds.contains(&TokenKind::Literal(LiteralKind::True)));
        assert!(kinds.contains(&TokenKind::Literal(LiteralKind::False)));
        assert!(!kinds.contains(&TokenKind::Operation(Operator::Greater)));
    }

    #[test]
    fn test_dual_tokens_need_terminator() {
        let glued = kinds("(:=x 1)");
        assert!(!glued.contains(&TokenKind::Expression(ExpressionKeyword::Assign)));
        assert_eq!(glued[1], TokenKind::Syntactic(Syntactic::Colon));
        assert_eq!(glued[2], TokenKind::Syntactic(Syntactic::Equal));

        assert_eq!(kinds("(>=(+ 1 2) 3)")[1], TokenKind::Operation(Operator::GreaterEqual));
        assert_eq!(kinds("(== a b)")[1], TokenKind::Operation(Operator::RefEquality));
        assert!(tokenize("#true").is_err());
        assert!(tokenize("(define x ::int 1)").is_ok());
    }

    #[test]
    fn test_numeric_literals() {
        let tokens = tokenize("1 2.5 3f 4L 5d .5 2147483647 2147483648").unwrap();
        let values: Vec<_> = tokens.iter().filter_map(|t| t.value.clone()).collect();
        assert_eq!(
            values,
            vec![
                TokenValue::Int(1),
                TokenValue::Double(2.5),
                TokenValue::Float(3.0),
                TokenValue::Long(4),
                TokenValue::Double(5.0),
                TokenValue::Double(0.5),
                TokenValue::Int(i32::MAX),
                TokenValue::Long(2147483648),
            ]
        );
    }

    #[test]
    fn test_suffix_needs_terminator() {
        let err = tokenize("(+ 1fx 2)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex);
        assert!(err.message.contains("numeric literal terminator"));

        assert!(tokenize("(+ 1f 2L)").is_ok());
        assert!(tokenize("12abc").is_err());
    }

    #[test]
    fn test_negative_literal_only_in_operand_position() {
        let tokens = tokenize("(- -5 3)").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operation(Operator::Subtract));
        assert_eq!(tokens[2].value, Some(TokenValue::Int(-5)));

        let tokens = tokenize("(-5 3)").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operation(Operator::Subtract));
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = tokenize("(print \"abc\n\ndef)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex);
        assert!(err.message.contains("Unterminated string line: 3"));
    }

    #[test]
    fn test_multiline_string_advances_line() {
        let tokens = tokenize("\"a\nb\" x").unwrap();
        assert_eq!(tokens[0].value, Some(TokenValue::Text("a\nb".to_string())));
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn test_modifiers_and_types() {
        let tokens = tokenize("(define x &dyn ::int 5)").unwrap();
        assert_eq!(tokens[3].kind, TokenKind::Modifier(Modifier::Dyn));
        assert_eq!(tokens[4].kind, TokenKind::Syntactic(Syntactic::Type));
        assert_eq!(tokens[4].text(), "int");

        let err = tokenize("(define x &bogus 5)").unwrap_err();
        assert!(err.message.contains("&bogus"));
    }

    #[test]
    fn test_type_directly_after_name() {
        let tokens = tokenize("(a::int b)").unwrap();
        assert_eq!(tokens[1].lexeme, "a");
        assert_eq!(tokens[2].text(), "int");
    }

    #[test]
    fn test_identifiers_with_accessors() {
        let tokens = tokenize("(obj:size) (@Counter:.count) :name").unwrap();
        assert_eq!(tokens[1].lexeme, "obj:size");
        assert_eq!(tokens[4].kind, TokenKind::Literal(LiteralKind::HostIdentifier));
        assert_eq!(tokens[4].text(), "Counter:.count");
        assert_eq!(tokens[6].kind, TokenKind::Syntactic(Syntactic::Colon));
        assert_eq!(tokens[7].lexeme, "name");
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let tokens = tokenize("or order my-var").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Operation(Operator::Or));
        assert_eq!(tokens[1].kind, TokenKind::Literal(LiteralKind::Identifier));
        assert_eq!(tokens[2].lexeme, "my-var");
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = tokenize("; leading comment\n(x) ; trailing\n y").unwrap();
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[3].line, 3);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("(+ 1 $)").unwrap_err();
        assert!(err.message.contains("Invalid character '$'"));
        assert_eq!(err.line, Some(1));
    }
}
