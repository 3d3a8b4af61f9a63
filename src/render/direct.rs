//! Direct renderer
//!
//! Walks the node tree depth first. Errors are contained per node through
//! [`Context::handle_error`], so one failing node never blanks its siblings.

use crate::error::RenderError;
use crate::parser::ast::{Block, BlockKind, If, Node, Tag, TagKind};
use crate::render::context::Context;
use crate::render::eval::{evaluate_condition, render_variable};

/// Render a nodelist in order, stopping at the first pending interrupt
pub fn render_all(nodes: &[Node], ctx: &mut Context) -> Result<String, RenderError> {
    let mut output = String::new();

    for node in nodes {
        // Break out if we have any unhandled interrupts
        if ctx.has_interrupt() {
            break;
        }

        if let Node::Tag(Tag {
            kind: TagKind::Interrupt(interrupt),
            ..
        }) = node
        {
            ctx.push_interrupt(*interrupt);
            break;
        }

        match render_node(node, ctx) {
            Ok(text) => output.push_str(&text),
            Err(err) => output.push_str(&ctx.handle_error(err)?),
        }
    }

    Ok(output)
}

/// Render a single node
pub fn render_node(node: &Node, ctx: &mut Context) -> Result<String, RenderError> {
    match node {
        Node::Literal(text) => Ok(text.clone()),
        Node::Variable(variable) => render_variable(variable, ctx),
        Node::Tag(tag) => match &tag.kind {
            TagKind::Interrupt(interrupt) => {
                ctx.push_interrupt(*interrupt);
                Ok(String::new())
            }
            TagKind::Custom(custom) => custom.render(&tag.markup, ctx),
        },
        Node::Block(Block { kind, .. }) => match kind {
            BlockKind::Plain(nodes) => render_all(nodes, ctx),
            BlockKind::If(if_node) => render_if(if_node, ctx),
        },
    }
}

/// First branch whose predicate holds, or the else branch, renders. Later
/// branches are never evaluated.
pub fn render_if(if_node: &If, ctx: &mut Context) -> Result<String, RenderError> {
    ctx.stack(|ctx| {
        for branch in &if_node.branches {
            let matched = match &branch.predicate {
                Some(predicate) => evaluate_condition(predicate, ctx)?,
                None => true,
            };
            if matched {
                return render_all(&branch.body, ctx);
            }
        }
        Ok(String::new())
    })
}
