use std::fmt;

/// Failure reported by a host bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HostFailure {
    MemberNotFound,
    Invocation,
    IllegalAccess,
}

/// Which stage of the pipeline raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    Lex,
    Parse,
    Binding,
    Evaluation,
    Host(HostFailure),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Lex => write!(f, "Lex error"),
            ErrorKind::Parse => write!(f, "Parse error"),
            ErrorKind::Binding => write!(f, "Binding error"),
            ErrorKind::Evaluation => write!(f, "Evaluation error"),
            ErrorKind::Host(HostFailure::MemberNotFound) => write!(f, "Host lookup error"),
            ErrorKind::Host(HostFailure::Invocation) => write!(f, "Host invocation error"),
            ErrorKind::Host(HostFailure::IllegalAccess) => write!(f, "Host access error"),
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SableError {
    pub kind: ErrorKind,
    pub message: String,
    /// Source line, when the error is tied to one.
    pub line: Option<usize>,
    /// Token cursor position for parse errors.
    pub position: Option<usize>,
    /// Dump of the tokens left unparsed when a parse error was raised.
    pub remaining: Option<String>,
}

pub type Result<T> = std::result::Result<T, SableError>;

impl SableError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            position: None,
            remaining: None,
        }
    }

    pub fn lex(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Lex, message).at_line(line)
    }

    pub fn parse(message: impl Into<String>, line: usize, position: usize, remaining: String) -> Self {
        Self {
            position: Some(position),
            remaining: Some(remaining),
            ..Self::new(ErrorKind::Parse, message).at_line(line)
        }
    }

    pub fn binding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Binding, message)
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn host(failure: HostFailure, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Host(failure), message)
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Colored single-line rendering for terminals.
    #[cfg(feature = "colored")]
    pub fn render(&self) -> String {
        use colored::Colorize;
        format!("{} {}", format!("{}:", self.kind).bright_red().bold(), self.location_and_message().red())
    }

    #[cfg(not(feature = "colored"))]
    pub fn render(&self) -> String {
        self.to_string()
    }

    fn location_and_message(&self) -> String {
        match (self.line, self.position) {
            (Some(line), Some(position)) => {
                format!("[line {}, token {}] {}", line, position, self.message)
            }
            (Some(line), None) => format!("[line {}] {}", line, self.message),
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for SableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.location_and_message())?;
        // `{:#}` also prints the unparsed token dump
        if f.alternate() {
            if let Some(remaining) = &self.remaining {
                write!(f, "\nRemaining tokens: {}", remaining)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for SableError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_line() {
        let err = SableError::lex("Unterminated string", 3);
        assert_eq!(err.to_string(), "Lex error: [line 3] Unterminated string");
    }

    #[test]
    fn test_parse_error_alternate_shows_remaining() {
        let err = SableError::parse("Unexpected token", 1, 4, "RightParen, Eof".to_string());
        assert!(!err.to_string().contains("Remaining"));
        assert!(format!("{:#}", err).contains("Remaining tokens: RightParen, Eof"));
        assert_eq!(err.position, Some(4));
    }

    #[test]
    fn test_host_kind_display() {
        let err = SableError::host(HostFailure::MemberNotFound, "no member size");
        assert_eq!(err.kind, ErrorKind::Host(HostFailure::MemberNotFound));
        assert!(err.to_string().starts_with("Host lookup error"));
    }
}
