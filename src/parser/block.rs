//! Recursive-descent block parser
//!
//! Every block pulls tokens off one shared [`TokenStream`] until it sees its
//! end delimiter. Nested blocks are built by tag factories that call back into
//! [`BlockParser::parse_block`] with their own [`BlockBuilder`], so siblings
//! and children never reorder or duplicate tokens.

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::grammar;
use crate::parser::tokenizer::{Token, TokenKind, TokenStream};
use crate::template::TagRegistry;

/// Name and raw parameters of a `{% ... %}` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMarkup<'a> {
    pub name: &'a str,
    pub markup: &'a str,
    /// Byte position of `markup` in the template source
    pub markup_offset: usize,
    /// Span of the whole tag token
    pub span: Span,
}

fn full_tag() -> Option<&'static Regex> {
    static FULL_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    FULL_TAG
        .get_or_init(|| Regex::new(r"(?s)\A\{%\s*(\w+)\s*(.*?)\s*%\}\z").ok())
        .as_ref()
}

/// Split a tag token into name and markup, or `None` if it does not match
/// `{% name markup %}`
pub fn split_tag(token: &Token) -> Option<TagMarkup<'_>> {
    let caps = full_tag()?.captures(&token.raw)?;
    let name = caps.get(1)?;
    let markup = caps.get(2)?;
    Some(TagMarkup {
        name: name.as_str(),
        markup: markup.as_str(),
        markup_offset: token.span.start + markup.start(),
        span: token.span.clone(),
    })
}

/// Hooks a composite node supplies while its body is parsed
pub trait BlockBuilder {
    fn block_name(&self) -> &str;

    /// Tag name that closes this block; `None` means only end of input does
    fn end_delimiter(&self) -> Option<String> {
        Some(format!("end{}", self.block_name()))
    }

    /// Span reported when the block is never closed
    fn opening_span(&self) -> Span;

    fn push(&mut self, node: Node);

    /// Called for tags that are neither registered nor this block's delimiter
    fn unknown_tag(
        &mut self,
        tag: TagMarkup<'_>,
        _tokens: &mut TokenStream,
        _parser: &mut BlockParser<'_>,
    ) -> Result<(), ParseError> {
        Err(unknown_tag_error(
            self.block_name(),
            self.end_delimiter(),
            &tag,
        ))
    }

    /// Called when the token stream runs out before the end delimiter
    fn end_of_stream(&mut self, _tokens: &TokenStream) -> Result<(), ParseError> {
        Err(ParseError::NeverClosed {
            block: self.block_name().to_string(),
            span: self.opening_span(),
        })
    }
}

/// Default error for an unhandled tag. `else` and `end` get their own
/// messages pointing at the right delimiter.
pub fn unknown_tag_error(
    block: &str,
    end_delimiter: Option<String>,
    tag: &TagMarkup<'_>,
) -> ParseError {
    match (tag.name, end_delimiter) {
        ("else", _) => ParseError::UnexpectedElse {
            block: block.to_string(),
            span: tag.span.clone(),
        },
        ("end", Some(expected)) => ParseError::InvalidEnd {
            block: block.to_string(),
            expected,
            span: tag.span.clone(),
        },
        _ => ParseError::UnknownTag {
            name: tag.name.to_string(),
            span: tag.span.clone(),
        },
    }
}

/// Drives block parsing and hands out node ids
pub struct BlockParser<'r> {
    registry: &'r TagRegistry,
    next_id: u32,
}

impl<'r> BlockParser<'r> {
    pub fn new(registry: &'r TagRegistry) -> Self {
        Self {
            registry,
            next_id: 0,
        }
    }

    /// Fresh id for a variable or conditional branch
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Parse the whole stream as the root document
    pub fn parse_document(&mut self, tokens: &mut TokenStream) -> Result<Document, ParseError> {
        let mut root = DocumentBuilder::default();
        self.parse_block(tokens, &mut root)?;
        Ok(Document {
            nodelist: root.nodelist,
        })
    }

    /// Consume tokens into `block` until its end delimiter or end of stream
    pub fn parse_block(
        &mut self,
        tokens: &mut TokenStream,
        block: &mut dyn BlockBuilder,
    ) -> Result<(), ParseError> {
        let registry = self.registry;
        let end_delimiter = block.end_delimiter();

        while let Some(token) = tokens.shift() {
            match token.kind {
                TokenKind::Text => {
                    if !token.raw.is_empty() {
                        block.push(Node::Literal(token.raw));
                    }
                }
                TokenKind::Tag => {
                    let tag = split_tag(&token).ok_or_else(|| ParseError::UnterminatedTag {
                        raw: token.raw.clone(),
                        span: token.span.clone(),
                    })?;

                    // Proper delimiter: hand control back to the parent block
                    if end_delimiter.as_deref() == Some(tag.name) {
                        return Ok(());
                    }

                    match registry.get(tag.name) {
                        Some(factory) => {
                            let node = factory.build(tag, tokens, self)?;
                            block.push(node);
                        }
                        None => block.unknown_tag(tag, tokens, self)?,
                    }
                }
                TokenKind::Variable => {
                    let variable = self.variable(&token)?;
                    block.push(Node::Variable(variable));
                }
            }
        }

        block.end_of_stream(tokens)
    }

    /// Parse `{{ ... }}` into a variable node
    pub fn variable(&mut self, token: &Token) -> Result<Variable, ParseError> {
        let raw = token.raw.as_str();
        if raw.len() < 4 || !raw.starts_with("{{") || !raw.ends_with("}}") {
            return Err(ParseError::UnterminatedVariable {
                raw: raw.to_string(),
                span: token.span.clone(),
            });
        }

        let content = &raw[2..raw.len() - 2];
        let (expr, filters) = grammar::parse_variable_markup(content, token.span.start + 2)?;

        Ok(Variable {
            id: self.next_id(),
            markup: content.trim().to_string(),
            expr,
            filters,
            span: token.span.clone(),
        })
    }

    /// Parse `if`/`elsif` markup into a shared condition
    pub fn condition(&self, tag: &TagMarkup<'_>) -> Result<Arc<Condition>, ParseError> {
        grammar::parse_condition(tag.markup, tag.markup_offset).map(Arc::new)
    }
}

/// Root block, closed only by end of input
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    pub nodelist: Vec<Node>,
}

impl BlockBuilder for DocumentBuilder {
    fn block_name(&self) -> &str {
        "document"
    }

    fn end_delimiter(&self) -> Option<String> {
        None
    }

    fn opening_span(&self) -> Span {
        0..0
    }

    fn push(&mut self, node: Node) {
        self.nodelist.push(node);
    }

    fn end_of_stream(&mut self, _tokens: &TokenStream) -> Result<(), ParseError> {
        Ok(())
    }
}

/// Generic block that renders its body unchanged
#[derive(Debug)]
pub struct PlainBlockBuilder {
    name: String,
    span: Span,
    nodelist: Vec<Node>,
}

impl PlainBlockBuilder {
    pub fn new(tag: &TagMarkup<'_>) -> Self {
        Self {
            name: tag.name.to_string(),
            span: tag.span.clone(),
            nodelist: Vec::new(),
        }
    }

    pub fn finish(self) -> Vec<Node> {
        self.nodelist
    }
}

impl BlockBuilder for PlainBlockBuilder {
    fn block_name(&self) -> &str {
        &self.name
    }

    fn opening_span(&self) -> Span {
        self.span.clone()
    }

    fn push(&mut self, node: Node) {
        self.nodelist.push(node);
    }
}

/// Collects `if` / `elsif` / `else` branches
#[derive(Debug)]
pub struct IfBuilder {
    span: Span,
    branches: Vec<ConditionBranch>,
}

impl IfBuilder {
    pub fn new(tag: &TagMarkup<'_>, id: NodeId, predicate: Arc<Condition>) -> Self {
        Self {
            span: tag.span.clone(),
            branches: vec![ConditionBranch {
                id,
                predicate: Some(predicate),
                body: Vec::new(),
            }],
        }
    }

    pub fn finish(self) -> If {
        If {
            branches: self.branches,
        }
    }
}

impl BlockBuilder for IfBuilder {
    fn block_name(&self) -> &str {
        "if"
    }

    fn opening_span(&self) -> Span {
        self.span.clone()
    }

    fn push(&mut self, node: Node) {
        if let Some(branch) = self.branches.last_mut() {
            branch.body.push(node);
        }
    }

    fn unknown_tag(
        &mut self,
        tag: TagMarkup<'_>,
        _tokens: &mut TokenStream,
        parser: &mut BlockParser<'_>,
    ) -> Result<(), ParseError> {
        let predicate = match tag.name {
            "elsif" => Some(parser.condition(&tag)?),
            "else" => None,
            _ => {
                return Err(unknown_tag_error(
                    self.block_name(),
                    self.end_delimiter(),
                    &tag,
                ))
            }
        };

        self.branches.push(ConditionBranch {
            id: parser.next_id(),
            predicate,
            body: Vec::new(),
        });
        Ok(())
    }
}
