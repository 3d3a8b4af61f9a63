//! Error types for parsing and rendering

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// Fatal compile-time error. No partial tree is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Tag '{raw}' was not properly terminated with '%}}'")]
    UnterminatedTag { raw: String, span: Span },

    #[error("Variable '{raw}' was not properly terminated with '}}}}'")]
    UnterminatedVariable { raw: String, span: Span },

    #[error("Unknown tag '{name}'")]
    UnknownTag { name: String, span: Span },

    #[error("{block} tag does not expect else tag")]
    UnexpectedElse { block: String, span: Span },

    #[error("'end' is not a valid delimiter for {block} tags. use {expected}")]
    InvalidEnd {
        block: String,
        expected: String,
        span: Span,
    },

    #[error("{block} tag was never closed")]
    NeverClosed { block: String, span: Span },

    #[error("Syntax error in tag 'if': {message}")]
    InvalidCondition { message: String, span: Span },

    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::UnterminatedTag { span, .. }
            | ParseError::UnterminatedVariable { span, .. }
            | ParseError::UnknownTag { span, .. }
            | ParseError::UnexpectedElse { span, .. }
            | ParseError::InvalidEnd { span, .. }
            | ParseError::NeverClosed { span, .. }
            | ParseError::InvalidCondition { span, .. }
            | ParseError::Syntax { span, .. } => span,
        }
    }

    /// Message without the span prefix
    pub fn message(&self) -> String {
        match self {
            ParseError::Syntax {
                message, expected, ..
            } if !expected.is_empty() => {
                format!("{}, expected {}", message, expected.join(", "))
            }
            ParseError::Syntax { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Re-tag a markup error as a broken `if`/`elsif` condition
    pub(crate) fn into_invalid_condition(self) -> ParseError {
        match self {
            err @ ParseError::InvalidCondition { .. } => err,
            other => ParseError::InvalidCondition {
                message: other.message(),
                span: other.span().clone(),
            },
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let span = self.span().clone();
        let label = match self {
            ParseError::Syntax {
                message, expected, ..
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                format!("{}{}", message, expected_str)
            }
            ParseError::NeverClosed { .. } => "block opened here".to_string(),
            other => other.to_string(),
        };

        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(self.message())
            .with_label(
                Label::new((filename, span))
                    .with_message(label)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }

    /// Convert a chumsky error over markup that starts at `offset` in the source
    pub(crate) fn from_rich(err: chumsky::error::Rich<'_, Token>, offset: usize) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of markup".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        // Format expected tokens nicely
        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of markup".to_string()),
                _ => None,
            })
            .collect();

        let range = err.span().into_range();
        ParseError::Syntax {
            span: offset + range.start..offset + range.end,
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Integer(n) => format!("number {}", n),
        Token::Float(n) => format!("number {}", n),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Eq => "'=='".to_string(),
        Token::Ne => "'!='".to_string(),
        Token::Le => "'<='".to_string(),
        Token::Ge => "'>='".to_string(),
        Token::Lt => "'<'".to_string(),
        Token::Gt => "'>'".to_string(),
        Token::Contains => "'contains'".to_string(),
        Token::True => "'true'".to_string(),
        Token::False => "'false'".to_string(),
        Token::Nil => "'nil'".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
    }
}

/// Recoverable error raised while rendering one node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("comparison of {left} with {right} failed")]
    Comparison { left: String, right: String },

    #[error("undefined filter '{name}'")]
    UndefinedFilter { name: String },

    #[error("{filter}: {message}")]
    Filter { filter: String, message: String },

    #[error("{0}")]
    Custom(String),
}
