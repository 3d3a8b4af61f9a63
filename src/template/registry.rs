//! Tag registry mapping tag names to node factories

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ParseError;
use crate::parser::ast::{Block, BlockKind, Interrupt, Node, Tag, TagKind};
use crate::parser::block::{BlockParser, IfBuilder, PlainBlockBuilder, TagMarkup};
use crate::parser::tokenizer::TokenStream;
use crate::template::CustomTag;

/// Builds a node for one registered tag name.
///
/// Block factories consume their body from `tokens` through
/// [`BlockParser::parse_block`]; leaf factories return immediately.
pub trait TagFactory: Send + Sync {
    fn build(
        &self,
        tag: TagMarkup<'_>,
        tokens: &mut TokenStream,
        parser: &mut BlockParser<'_>,
    ) -> Result<Node, ParseError>;
}

/// Registry of known tags, consulted by name during parsing
#[derive(Clone)]
pub struct TagRegistry {
    factories: HashMap<String, Arc<dyn TagFactory>>,
}

impl Default for TagRegistry {
    /// `if`, `break` and `continue`
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("if", Arc::new(IfTag));
        registry.register("break", Arc::new(InterruptTag(Interrupt::Break)));
        registry.register("continue", Arc::new(InterruptTag(Interrupt::Continue)));
        registry
    }
}

impl TagRegistry {
    /// Registry without any tags
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous one of the same name
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn TagFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Register a block closed by `end<name>` that renders its body unchanged
    pub fn register_block(&mut self, name: impl Into<String>) {
        self.register(name, Arc::new(PlainBlock));
    }

    /// Register a leaf tag rendered by `tag`
    pub fn register_tag(&mut self, name: impl Into<String>, tag: Arc<dyn CustomTag>) {
        self.register(name, Arc::new(CustomTagFactory(tag)));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TagFactory>> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.names())
            .finish()
    }
}

struct IfTag;

impl TagFactory for IfTag {
    fn build(
        &self,
        tag: TagMarkup<'_>,
        tokens: &mut TokenStream,
        parser: &mut BlockParser<'_>,
    ) -> Result<Node, ParseError> {
        // first branch id is taken before the body so ids follow source order
        let id = parser.next_id();
        let predicate = parser.condition(&tag)?;
        let mut builder = IfBuilder::new(&tag, id, predicate);
        parser.parse_block(tokens, &mut builder)?;

        Ok(Node::Block(Block {
            name: tag.name.to_string(),
            markup: tag.markup.to_string(),
            span: tag.span.clone(),
            kind: BlockKind::If(builder.finish()),
        }))
    }
}

struct PlainBlock;

impl TagFactory for PlainBlock {
    fn build(
        &self,
        tag: TagMarkup<'_>,
        tokens: &mut TokenStream,
        parser: &mut BlockParser<'_>,
    ) -> Result<Node, ParseError> {
        let mut builder = PlainBlockBuilder::new(&tag);
        parser.parse_block(tokens, &mut builder)?;

        Ok(Node::Block(Block {
            name: tag.name.to_string(),
            markup: tag.markup.to_string(),
            span: tag.span.clone(),
            kind: BlockKind::Plain(builder.finish()),
        }))
    }
}

struct InterruptTag(Interrupt);

impl TagFactory for InterruptTag {
    fn build(
        &self,
        tag: TagMarkup<'_>,
        _tokens: &mut TokenStream,
        _parser: &mut BlockParser<'_>,
    ) -> Result<Node, ParseError> {
        Ok(Node::Tag(Tag {
            name: tag.name.to_string(),
            markup: tag.markup.to_string(),
            span: tag.span.clone(),
            kind: TagKind::Interrupt(self.0),
        }))
    }
}

struct CustomTagFactory(Arc<dyn CustomTag>);

impl TagFactory for CustomTagFactory {
    fn build(
        &self,
        tag: TagMarkup<'_>,
        _tokens: &mut TokenStream,
        _parser: &mut BlockParser<'_>,
    ) -> Result<Node, ParseError> {
        Ok(Node::Tag(Tag {
            name: tag.name.to_string(),
            markup: tag.markup.to_string(),
            span: tag.span.clone(),
            kind: TagKind::Custom(self.0.clone()),
        }))
    }
}
