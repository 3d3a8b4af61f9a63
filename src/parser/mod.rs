//! Parser for Liquid template source

pub mod ast;
pub mod block;
pub mod grammar;
pub mod lexer;
pub mod tokenizer;

pub use ast::*;

use crate::error::ParseError;
use crate::template::TagRegistry;
use block::BlockParser;

/// Parse template source with the standard tag set
pub fn parse(source: &str) -> Result<Document, ParseError> {
    parse_with(source, &TagRegistry::default())
}

/// Parse template source, resolving tags through `registry`
pub fn parse_with(source: &str, registry: &TagRegistry) -> Result<Document, ParseError> {
    let mut tokens = tokenizer::tokenize(source);
    let document = BlockParser::new(registry).parse_document(&mut tokens)?;
    tracing::debug!(nodes = document.node_count(), "parsed template");
    Ok(document)
}
