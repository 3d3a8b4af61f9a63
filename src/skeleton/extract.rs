//! Single-pass skeleton extraction

use std::collections::BTreeMap;

use crate::error::RenderError;
use crate::parser::ast::{Block, BlockKind, ConditionBranch, Document, If, Node, Tag, TagKind};
use crate::render::context::Context;
use crate::render::direct::render_node;
use crate::render::eval::{evaluate_condition, render_variable};
use crate::skeleton::keys::{Key, KeyGenerator, KeyIdentity};
use crate::skeleton::{
    BranchCondition, ConditionalVariable, Fragment, Guard, Producer, Skeleton, SkeletonError,
};

/// Fragments and registries produced by one nodelist
#[derive(Debug, Default)]
struct Extraction {
    fragments: Vec<Fragment>,
    variables: BTreeMap<Key, Producer>,
    sections: BTreeMap<Key, String>,
}

impl Extraction {
    fn push(&mut self, fragment: Fragment) {
        if let (Some(Fragment::Literal(last)), Fragment::Literal(text)) =
            (self.fragments.last_mut(), &fragment)
        {
            last.push_str(text);
            return;
        }
        self.fragments.push(fragment);
    }

    /// Merge a child's registries and splice its fragments in place
    fn absorb(&mut self, child: Extraction) {
        self.variables.extend(child.variables);
        self.sections.extend(child.sections);
        for fragment in child.fragments {
            self.push(fragment);
        }
    }
}

/// Walks a document once, deferring the variables the context's separation
/// predicate selects
pub(crate) struct Extractor<'k> {
    keys: &'k mut KeyGenerator,
    halt: Option<Key>,
}

impl<'k> Extractor<'k> {
    pub(crate) fn new(keys: &'k mut KeyGenerator) -> Self {
        Self { keys, halt: None }
    }

    pub(crate) fn extract(
        &mut self,
        document: &Document,
        ctx: &mut Context,
    ) -> Result<Skeleton, SkeletonError> {
        let extraction = self.extract_nodes(&document.nodelist, ctx)?;
        tracing::debug!(
            fragments = extraction.fragments.len(),
            variables = extraction.variables.len(),
            sections = extraction.sections.len(),
            "extracted skeleton"
        );
        Ok(Skeleton {
            fragments: extraction.fragments,
            variables: extraction.variables,
            sections: extraction.sections,
            key_format: self.keys.format().clone(),
            halt: self.halt.take(),
        })
    }

    fn extract_nodes(
        &mut self,
        nodes: &[Node],
        ctx: &mut Context,
    ) -> Result<Extraction, SkeletonError> {
        let mut out = Extraction::default();

        for node in nodes {
            if ctx.has_interrupt() {
                break;
            }

            match node {
                Node::Literal(text) => self.push_text(&mut out, text.clone())?,
                Node::Variable(variable) if ctx.is_deferred(variable) => {
                    let key = self.keys.key_for(KeyIdentity::Variable(variable.id));
                    out.variables
                        .insert(key.clone(), Producer::Direct(variable.clone()));
                    out.push(Fragment::Variable(key));
                }
                Node::Variable(variable) => {
                    let text = contain(render_variable(variable, ctx), ctx)?;
                    self.push_text(&mut out, text)?;
                }
                Node::Tag(Tag {
                    kind: TagKind::Interrupt(interrupt),
                    ..
                }) => {
                    ctx.push_interrupt(*interrupt);
                    break;
                }
                Node::Tag(_) => {
                    let text = contain(render_node(node, ctx), ctx)?;
                    self.push_text(&mut out, text)?;
                }
                Node::Block(Block {
                    kind: BlockKind::Plain(children),
                    ..
                }) => {
                    let child = self.extract_nodes(children, ctx)?;
                    out.absorb(child);
                }
                Node::Block(Block {
                    kind: BlockKind::If(if_node),
                    ..
                }) => {
                    let child = self.extract_if(if_node, ctx)?;
                    out.absorb(child);
                }
            }
        }

        Ok(out)
    }

    fn push_text(&self, out: &mut Extraction, text: String) -> Result<(), SkeletonError> {
        if text.contains(self.keys.format().prefix.as_str()) {
            return Err(SkeletonError::ReservedText { fragment: text });
        }
        if !text.is_empty() {
            out.push(Fragment::Literal(text));
        }
        Ok(())
    }

    fn extract_if(&mut self, if_node: &If, ctx: &mut Context) -> Result<Extraction, SkeletonError> {
        let deferred = if_node.branches.iter().any(|branch| {
            branch
                .predicate
                .as_ref()
                .is_some_and(|p| ctx.is_condition_deferred(p))
        });

        ctx.stack(|ctx| {
            if deferred {
                self.extract_deferred_if(if_node, ctx)
            } else {
                self.extract_resolved_if(if_node, ctx)
            }
        })
    }

    /// No predicate reads a deferred name: pick the branch now
    fn extract_resolved_if(
        &mut self,
        if_node: &If,
        ctx: &mut Context,
    ) -> Result<Extraction, SkeletonError> {
        for branch in &if_node.branches {
            let matched = match &branch.predicate {
                Some(predicate) => match evaluate_condition(predicate, ctx) {
                    Ok(matched) => matched,
                    Err(err) => {
                        let mut out = Extraction::default();
                        let text = contain(Err(err), ctx)?;
                        self.push_text(&mut out, text)?;
                        return Ok(out);
                    }
                },
                None => true,
            };
            if matched {
                return self.extract_nodes(&branch.body, ctx);
            }
        }
        Ok(Extraction::default())
    }

    /// Emit one conditional placeholder per section. Every branch body up to
    /// the first `else` is extracted since the branch is only chosen per
    /// recipient.
    fn extract_deferred_if(
        &mut self,
        if_node: &If,
        ctx: &mut Context,
    ) -> Result<Extraction, SkeletonError> {
        let mut out = Extraction::default();
        let Some(owner) = if_node.id() else {
            return Ok(out);
        };
        let mut preceding: Vec<BranchCondition> = Vec::new();
        let mut reporter = None;

        for branch in if_node.reachable_branches() {
            let own = branch.predicate.as_ref().map(|predicate| BranchCondition {
                branch: branch.id,
                owner,
                predicate: predicate.clone(),
            });
            let guard = Guard::new(own.clone(), preceding.clone());
            let first = out.fragments.len();

            // an interrupt ends the output of recipients taking this branch
            // only, so it must not leak into the siblings
            let depth = ctx.interrupt_depth();
            let mut body = self.extract_nodes(&branch.body, ctx)?;
            if ctx.interrupt_depth() > depth {
                let halt = self.keys.key_for(KeyIdentity::Halt);
                self.halt = Some(halt.clone());
                body.push(Fragment::Halt(halt));
            }
            ctx.truncate_interrupts(depth);

            out.variables.extend(body.variables);
            out.sections.extend(body.sections);

            if body.fragments.iter().any(Fragment::is_section) {
                self.decompose_branch(branch, &guard, body.fragments, &mut out);
            } else {
                let text: String = body.fragments.iter().map(Fragment::text).collect();
                let key = self.section(branch, 0, text, &guard, &mut out);
                out.push(Fragment::Section(key));
            }

            // the last branch's guard reads every predicate of this `if`
            reporter = out.fragments.get(first).cloned();

            if let Some(condition) = own {
                preceding.push(condition);
            }
        }

        if let Some(Fragment::Section(key)) = reporter {
            if let Some(Producer::Conditional(conditional)) = out.variables.get_mut(&key) {
                conditional.reports.push(owner);
            }
        }

        Ok(out)
    }

    /// Nested conditional: each literal run becomes its own section under
    /// this branch's guard, and inner sections inherit the guard
    fn decompose_branch(
        &mut self,
        branch: &ConditionBranch,
        guard: &Guard,
        fragments: Vec<Fragment>,
        out: &mut Extraction,
    ) {
        let mut run = String::new();
        let mut runs = 0;

        for fragment in fragments {
            match fragment {
                Fragment::Section(inner) => {
                    if !run.is_empty() {
                        let key = self.section(branch, runs, std::mem::take(&mut run), guard, out);
                        out.push(Fragment::Section(key));
                        runs += 1;
                    }
                    if let Some(Producer::Conditional(conditional)) = out.variables.get_mut(&inner) {
                        conditional.guard.merge(guard);
                    }
                    out.push(Fragment::Section(inner));
                }
                other => run.push_str(other.text()),
            }
        }

        if !run.is_empty() {
            let key = self.section(branch, runs, run, guard, out);
            out.push(Fragment::Section(key));
        }
    }

    /// Register section text plus the conditional placeholder selecting it
    fn section(
        &mut self,
        branch: &ConditionBranch,
        index: usize,
        text: String,
        guard: &Guard,
        out: &mut Extraction,
    ) -> Key {
        let section = self.keys.key_for(KeyIdentity::Section(branch.id, index));
        let placeholder = self
            .keys
            .key_for(KeyIdentity::BranchVariable(branch.id, index));
        out.sections.insert(section.clone(), text);
        out.variables.insert(
            placeholder.clone(),
            Producer::Conditional(ConditionalVariable {
                guard: guard.clone(),
                value: section,
                reports: Vec::new(),
            }),
        );
        placeholder
    }
}

/// Route a render result through the context's error sink
fn contain(result: Result<String, RenderError>, ctx: &mut Context) -> Result<String, SkeletonError> {
    match result {
        Ok(text) => Ok(text),
        Err(err) => ctx.handle_error(err).map_err(SkeletonError::Extract),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::NodeId;
    use crate::parser::parse;
    use crate::render::value::{Map, Value};
    use crate::skeleton::keys::KeyFormat;
    use crate::skeleton::SeparationPredicate;
    use pretty_assertions::assert_eq;

    fn extract(source: &str, keys: &mut KeyGenerator, separate: Option<&str>) -> Skeleton {
        let doc = parse(source).expect("Should parse");
        let separation = separate.map(|pattern| {
            SeparationPredicate::from_regex(regex::Regex::new(pattern).expect("valid"))
        });
        let mut ctx = Context::default().with_separation(separation);
        Extractor::new(keys)
            .extract(&doc, &mut ctx)
            .expect("Should extract")
    }

    fn readable_keys() -> KeyGenerator {
        KeyGenerator::new(KeyFormat::new("<", ">"))
    }

    #[test]
    fn test_no_predicate_renders_literally() {
        let mut keys = readable_keys();
        let skeleton = extract("A{{a}}B", &mut keys, None);
        assert_eq!(skeleton.text(), "AB");
        assert!(skeleton.variables().is_empty());
        assert!(keys.is_empty());
    }

    #[test]
    fn test_deferred_variable() {
        let mut keys = readable_keys();
        let skeleton = extract("A{{a}}{{b}}", &mut keys, Some("a"));
        assert_eq!(skeleton.text(), "A<1>");
        assert_eq!(
            skeleton.fragments(),
            &[
                Fragment::Literal("A".to_string()),
                Fragment::Variable(keys.key_for(KeyIdentity::Variable(NodeId(0)))),
            ]
        );
    }

    #[test]
    fn test_filter_argument_defers() {
        let mut keys = readable_keys();
        let skeleton = extract("A{{3 | minus: a}}", &mut keys, Some("a"));
        assert_eq!(skeleton.text(), "A<1>");
        assert_eq!(skeleton.variables().len(), 1);
    }

    #[test]
    fn test_flat_if_emits_one_section_per_branch() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "A{% if a1 > 0 %}B{% elsif a1 < -1 %}C{% else %}D{% endif %}E",
            &mut keys,
            Some("a"),
        );
        assert_eq!(skeleton.text(), "A<2><4><6>E");
        assert_eq!(skeleton.sections().len(), 3);
        let texts: Vec<&str> = skeleton.sections().values().map(|s| s.as_str()).collect();
        assert_eq!(texts, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_else_guard_negates_all_siblings() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "{% if a1 > 0 %}B{% elsif a1 < -1 %}C{% else %}D{% endif %}",
            &mut keys,
            Some("a"),
        );
        let guards: Vec<(usize, usize)> = skeleton
            .variables()
            .values()
            .filter_map(|producer| match producer {
                Producer::Conditional(c) => Some((c.guard.positive().len(), c.guard.negative().len())),
                Producer::Direct(_) => None,
            })
            .collect();
        assert_eq!(guards, vec![(1, 0), (1, 1), (0, 2)]);
    }

    #[test]
    fn test_nested_if_decomposes_outer_branch() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "A{% if a > 0 %}B{% if b > 0 %}C{% else %}D{% endif %}{{ c }}{% else %}E{{ c }}{% endif %}{{ c }}F",
            &mut keys,
            Some("^(a|b|c)$"),
        );
        // outer-if run "B", inner if/else, outer run "<c>", outer else, top-level c
        assert_eq!(skeleton.fragments().iter().filter(|f| f.is_section()).count(), 5);
        assert!(skeleton.text().starts_with('A'));
        assert!(skeleton.text().ends_with('F'));

        let inner_guards: Vec<usize> = skeleton
            .variables()
            .values()
            .filter_map(|producer| match producer {
                Producer::Conditional(c) => Some(c.guard.positive().len() + c.guard.negative().len()),
                Producer::Direct(_) => None,
            })
            .collect();
        // inner branches carry their own condition plus the outer one
        assert_eq!(inner_guards.iter().filter(|&&n| n == 2).count(), 2);
    }

    fn reporters(skeleton: &Skeleton) -> Vec<(String, Vec<NodeId>)> {
        skeleton
            .variables()
            .iter()
            .filter_map(|(key, producer)| match producer {
                Producer::Conditional(c) if !c.reports.is_empty() => {
                    Some((key.to_string(), c.reports.clone()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_last_branch_reports_predicate_errors() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "{% if a1 > 0 %}B{% elsif a1 < -1 %}C{% else %}D{% endif %}",
            &mut keys,
            Some("a"),
        );
        assert_eq!(reporters(&skeleton), vec![("<6>".to_string(), vec![NodeId(0)])]);
    }

    #[test]
    fn test_nested_reporters() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "{% if a %}B{% else %}{% if b %}C{% endif %}{% endif %}",
            &mut keys,
            Some("^(a|b)$"),
        );
        // the inner `if` is the outer else's first placeholder, so it reports
        // for both
        assert_eq!(
            reporters(&skeleton),
            vec![("<4>".to_string(), vec![NodeId(2), NodeId(0)])]
        );
    }

    #[test]
    fn test_branches_after_else_are_skipped() {
        let mut keys = readable_keys();
        let skeleton = extract(
            "{% if a == 1 %}X{% else %}E{% elsif a == 2 %}Y{% endif %}",
            &mut keys,
            Some("a"),
        );
        let texts: Vec<&str> = skeleton.sections().values().map(|s| s.as_str()).collect();
        assert_eq!(texts, vec!["X", "E"]);
    }

    #[test]
    fn test_interrupt_in_deferred_branch_ends_section_with_halt() {
        let mut keys = readable_keys();
        let skeleton = extract("{% if a %}X{% break %}Y{% endif %}W", &mut keys, Some("a"));
        assert_eq!(skeleton.text(), "<3>W");
        assert_eq!(
            skeleton.section_texts().into_iter().collect::<Vec<_>>(),
            vec![("<2>".to_string(), "X<1>".to_string())]
        );
        assert_eq!(skeleton.halt, Some(keys.key_for(KeyIdentity::Halt)));
    }

    #[test]
    fn test_static_if_resolved_at_extraction() {
        let doc = parse("A{% if a1 > 0 %}B{{ u }}{% else %}C{% endif %}D").expect("Should parse");
        let assigns: Map = [("a1".to_string(), Value::Int(1))].into_iter().collect();
        let separation = SeparationPredicate::from_regex(regex::Regex::new("^u$").expect("valid"));
        let mut ctx = Context::default()
            .with_assigns(assigns)
            .with_separation(Some(separation));
        let mut keys = readable_keys();
        let skeleton = Extractor::new(&mut keys)
            .extract(&doc, &mut ctx)
            .expect("Should extract");
        assert_eq!(skeleton.text(), "AB<1>D");
        assert!(skeleton.sections().is_empty());
    }

    #[test]
    fn test_repeated_extraction_is_stable() {
        let mut keys = readable_keys();
        let source = "A{% if a1 > 0 %}B{{a1}}{% if a1 > 5 %}C{% endif %}{% else %}H{% endif %}I";
        let first = extract(source, &mut keys, Some("a"));
        let second = extract(source, &mut keys, Some("a"));
        assert_eq!(first.text(), second.text());
        assert_eq!(first.section_texts(), second.section_texts());
    }

    #[test]
    fn test_reserved_prefix_in_literal_is_rejected() {
        let doc = parse("A<1>B").expect("Should parse");
        let mut keys = readable_keys();
        let err = Extractor::new(&mut keys)
            .extract(&doc, &mut Context::default())
            .unwrap_err();
        assert_eq!(
            err,
            SkeletonError::ReservedText {
                fragment: "A<1>B".to_string()
            }
        );
    }

    #[test]
    fn test_render_errors_contained_in_skeleton() {
        let mut keys = readable_keys();
        let skeleton = extract("A{{ x | shout }}B", &mut keys, None);
        assert_eq!(skeleton.text(), "ALiquid error: undefined filter 'shout'B");
    }

    #[test]
    fn test_strict_extraction_fails() {
        let doc = parse("A{{ x | shout }}B").expect("Should parse");
        let mut keys = readable_keys();
        let mut ctx = Context::default().with_strict(true);
        let err = Extractor::new(&mut keys).extract(&doc, &mut ctx).unwrap_err();
        assert!(matches!(err, SkeletonError::Extract(RenderError::UndefinedFilter { .. })));
    }
}
