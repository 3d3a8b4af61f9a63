//! Splits template source into text, tag and variable tokens

use std::collections::VecDeque;

use logos::{Lexer, Logos};

use crate::parser::ast::Span;

/// Raw pieces recognized by the splitter. Unterminated openers are kept as
/// their own two-byte pieces so the parser can report them.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum Piece {
    #[token("{%", |lex| close(lex, "%}"))]
    Tag,

    #[token("{{", |lex| close(lex, "}}"))]
    Variable,

    #[regex(r"[^{]+")]
    Text,

    #[token("{")]
    Brace,
}

/// Extend the current piece up to and including the first `closer`. Without
/// one the piece stays the bare opener.
fn close(lex: &mut Lexer<Piece>, closer: &str) {
    if let Some(pos) = lex.remainder().find(closer) {
        lex.bump(pos + closer.len());
    }
}

/// Token classification. Whether a tag or variable is well formed is decided
/// by the parser, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Tag,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub span: Span,
}

/// Destructive token queue shared by every block during a parse
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: VecDeque<Token>,
}

impl TokenStream {
    /// Take the next token off the front of the queue
    pub fn shift(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Tokenize template source
pub fn tokenize(source: &str) -> TokenStream {
    let mut tokens: VecDeque<Token> = VecDeque::new();

    for (piece, span) in Piece::lexer(source).spanned() {
        let kind = match piece {
            Ok(Piece::Tag) => TokenKind::Tag,
            Ok(Piece::Variable) => TokenKind::Variable,
            Ok(Piece::Text) | Ok(Piece::Brace) | Err(_) => TokenKind::Text,
        };

        // a lone `{` splits text in two; glue it back
        if kind == TokenKind::Text {
            if let Some(last) = tokens.back_mut() {
                if last.kind == TokenKind::Text && last.span.end == span.start {
                    last.raw.push_str(&source[span.clone()]);
                    last.span.end = span.end;
                    continue;
                }
            }
        }

        tokens.push_back(Token {
            kind,
            raw: source[span.clone()].to_string(),
            span,
        });
    }

    TokenStream { tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        let mut stream = tokenize(source);
        let mut out = Vec::new();
        while let Some(tok) = stream.shift() {
            out.push((tok.kind, tok.raw));
        }
        out
    }

    #[test]
    fn test_text_only() {
        assert_eq!(
            kinds("hello world"),
            vec![(TokenKind::Text, "hello world".to_string())]
        );
    }

    #[test]
    fn test_empty_source() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tags_and_variables() {
        assert_eq!(
            kinds("A{% if a > 0 %}B{{ a }}{% endif %}"),
            vec![
                (TokenKind::Text, "A".to_string()),
                (TokenKind::Tag, "{% if a > 0 %}".to_string()),
                (TokenKind::Text, "B".to_string()),
                (TokenKind::Variable, "{{ a }}".to_string()),
                (TokenKind::Tag, "{% endif %}".to_string()),
            ]
        );
    }

    #[test]
    fn test_lone_brace_stays_text() {
        assert_eq!(
            kinds("a { b } c"),
            vec![(TokenKind::Text, "a { b } c".to_string())]
        );
    }

    #[test]
    fn test_percent_inside_tag() {
        assert_eq!(
            kinds("{% if a == '50%' %}"),
            vec![(TokenKind::Tag, "{% if a == '50%' %}".to_string())]
        );
    }

    #[test]
    fn test_unterminated_openers() {
        let toks = kinds("x {% if a y");
        assert_eq!(toks[0], (TokenKind::Text, "x ".to_string()));
        assert_eq!(toks[1], (TokenKind::Tag, "{%".to_string()));
        assert_eq!(toks[2], (TokenKind::Text, " if a y".to_string()));

        let toks = kinds("{{ name");
        assert_eq!(toks[0], (TokenKind::Variable, "{{".to_string()));
    }

    #[test]
    fn test_first_closer_ends_the_piece() {
        assert_eq!(
            kinds("{{ a }}}{% x %}%}"),
            vec![
                (TokenKind::Variable, "{{ a }}".to_string()),
                (TokenKind::Text, "}".to_string()),
                (TokenKind::Tag, "{% x %}".to_string()),
                (TokenKind::Text, "%}".to_string()),
            ]
        );
    }

    #[test]
    fn test_tag_inside_unterminated_variable() {
        let toks = kinds("{{ a {% if b %}");
        assert_eq!(toks[0], (TokenKind::Variable, "{{".to_string()));
        assert_eq!(toks[1], (TokenKind::Text, " a ".to_string()));
        assert_eq!(toks[2], (TokenKind::Tag, "{% if b %}".to_string()));
    }

    #[test]
    fn test_spans_cover_source() {
        let source = "ab{{ c }}de";
        let mut stream = tokenize(source);
        let mut rebuilt = String::new();
        while let Some(tok) = stream.shift() {
            assert_eq!(&source[tok.span.clone()], tok.raw);
            rebuilt.push_str(&tok.raw);
        }
        assert_eq!(rebuilt, source);
    }
}
