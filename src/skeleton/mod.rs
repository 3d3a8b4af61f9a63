//! Skeleton extraction for batch personalization
//!
//! A template is walked once against the shared data to produce a
//! [`Skeleton`]: static text with placeholder keys, the producers that fill
//! those keys per recipient, and the section text behind every conditional
//! branch. Rendering a recipient afterwards needs only the producers and
//! string substitution, never the node tree.
//!
//! ```text
//! A{% if a > 0 %}B{% else %}C{{ c }}{% endif %}
//!
//! fragments: "A" <k1> <k3>
//! variables: k1 -> k2 if (a > 0)
//!            k3 -> k4 unless (a > 0)
//!            k5 -> {{ c }}
//! sections:  k2 = "B"
//!            k4 = "C<k5>"
//! ```

mod batch;
mod extract;
pub mod keys;
mod reconstruct;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::error::RenderError;
use crate::parser::ast::{Condition, NodeId, Variable};
use crate::render::context::Context;
use crate::render::eval::{evaluate_condition, render_variable};
use crate::render::value::Value;

pub use batch::render_variables;
pub(crate) use extract::Extractor;
pub use keys::{Key, KeyFormat, KeyGenerator, KeyIdentity, DEFAULT_KEY_PREFIX, DEFAULT_KEY_SUFFIX};
pub use reconstruct::render_strings;

/// Per-recipient input: name to one value per recipient
pub type Recipients = BTreeMap<String, Vec<Value>>;

/// Batch output: key text to one rendered string per recipient
pub type VariableTable = BTreeMap<String, Vec<String>>;

/// Errors raised by extraction, batch evaluation or reconstruction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkeletonError {
    #[error("template text contains the reserved key prefix: {fragment:?}")]
    ReservedText { fragment: String },

    #[error("no recipients to render")]
    EmptyRecipients,

    #[error("recipient array '{name}' has {found} entries, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("variable table column '{key}' has {found} entries, expected {expected}")]
    TableMismatch {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("placeholders for recipient {index} did not resolve")]
    Unresolved { index: usize },

    #[error("render error during extraction: {0}")]
    Extract(RenderError),

    #[error("render error for recipient {index}: {source}")]
    Render { index: usize, source: RenderError },
}

/// Name-matching rule selecting which variables are deferred
#[derive(Clone)]
pub struct SeparationPredicate {
    matcher: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    pattern: Option<String>,
}

impl SeparationPredicate {
    pub fn new<F>(matcher: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
            pattern: None,
        }
    }

    /// Defer names the regex matches anywhere
    pub fn from_regex(regex: Regex) -> Self {
        let pattern = regex.as_str().to_string();
        Self {
            matcher: Arc::new(move |name| regex.is_match(name)),
            pattern: Some(pattern),
        }
    }

    /// Source pattern when built from a regex
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn matches(&self, name: &str) -> bool {
        (self.matcher)(name)
    }
}

impl fmt::Debug for SeparationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pattern {
            Some(pattern) => write!(f, "SeparationPredicate(/{}/)", pattern),
            None => f.write_str("SeparationPredicate(..)"),
        }
    }
}

/// Piece of skeleton text
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Literal(String),
    /// Key of a deferred variable
    Variable(Key),
    /// Key of a conditional placeholder that resolves to a section key or
    /// to nothing
    Section(Key),
    /// Interrupt inside a deferred branch; only ever part of section text
    Halt(Key),
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Literal(text) => text,
            Fragment::Variable(key) | Fragment::Section(key) | Fragment::Halt(key) => {
                key.as_str()
            }
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Fragment::Section(_))
    }
}

/// One branch predicate, identified by its branch and the `if` owning it
#[derive(Debug, Clone)]
pub struct BranchCondition {
    pub branch: NodeId,
    /// First branch of the enclosing `if`
    pub owner: NodeId,
    pub predicate: Arc<Condition>,
}

#[derive(Debug, Clone)]
struct GuardTerm {
    condition: BranchCondition,
    expected: bool,
}

/// Conditions under which a conditional placeholder is non-empty: every
/// positive condition holds and no negative condition does.
///
/// Terms are kept in the order a direct render evaluates them: enclosing
/// branches first, and within one `if` the earlier siblings before the
/// branch's own predicate.
#[derive(Debug, Clone, Default)]
pub struct Guard {
    terms: Vec<GuardTerm>,
}

impl Guard {
    pub fn new(positive: Option<BranchCondition>, negative: Vec<BranchCondition>) -> Self {
        let mut guard = Guard::default();
        for condition in negative {
            guard.add(condition, false);
        }
        if let Some(condition) = positive {
            guard.add(condition, true);
        }
        guard
    }

    pub fn positive(&self) -> Vec<&BranchCondition> {
        self.conditions(true)
    }

    pub fn negative(&self) -> Vec<&BranchCondition> {
        self.conditions(false)
    }

    fn conditions(&self, expected: bool) -> Vec<&BranchCondition> {
        self.terms
            .iter()
            .filter(|term| term.expected == expected)
            .map(|term| &term.condition)
            .collect()
    }

    fn add(&mut self, condition: BranchCondition, expected: bool) {
        if !self.contains(&condition) {
            self.terms.push(GuardTerm {
                condition,
                expected,
            });
        }
    }

    fn contains(&self, condition: &BranchCondition) -> bool {
        self.terms
            .iter()
            .any(|term| term.condition.branch == condition.branch)
    }

    /// Put an enclosing branch's conditions in front of this guard's own
    pub fn merge(&mut self, outer: &Guard) {
        let mut terms: Vec<GuardTerm> = outer
            .terms
            .iter()
            .filter(|term| !self.contains(&term.condition))
            .cloned()
            .collect();
        terms.append(&mut self.terms);
        self.terms = terms;
    }

    /// Evaluate the live predicates against `ctx`
    pub fn holds(&self, ctx: &Context) -> Result<bool, RenderError> {
        self.check(ctx).map_err(|(_, err)| err)
    }

    /// Like [`Guard::holds`], but a failing predicate also names its `if`
    fn check(&self, ctx: &Context) -> Result<bool, (NodeId, RenderError)> {
        for term in &self.terms {
            let matched = evaluate_condition(&term.condition.predicate, ctx)
                .map_err(|err| (term.condition.owner, err))?;
            if matched != term.expected {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Placeholder that yields a section key when its guard holds
#[derive(Debug, Clone)]
pub struct ConditionalVariable {
    pub guard: Guard,
    pub value: Key,
    /// `if` nodes whose predicate failures this placeholder reports. Each
    /// `if` has exactly one reporter so a failing predicate is contained
    /// once, as in a direct render. Other placeholders render empty.
    pub reports: Vec<NodeId>,
}

impl ConditionalVariable {
    pub fn render(&self, ctx: &Context) -> Result<String, RenderError> {
        match self.guard.check(ctx) {
            Ok(true) => Ok(self.value.to_string()),
            Ok(false) => Ok(String::new()),
            Err((owner, err)) if self.reports.contains(&owner) => Err(err),
            Err(_) => Ok(String::new()),
        }
    }
}

/// Fills one key per recipient
#[derive(Debug, Clone)]
pub enum Producer {
    Direct(Variable),
    Conditional(ConditionalVariable),
}

impl Producer {
    pub fn render(&self, ctx: &Context) -> Result<String, RenderError> {
        match self {
            Producer::Direct(variable) => render_variable(variable, ctx),
            Producer::Conditional(conditional) => conditional.render(ctx),
        }
    }
}

/// Result of skeleton extraction, built once and reused for a whole batch
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    pub(crate) fragments: Vec<Fragment>,
    pub(crate) variables: BTreeMap<Key, Producer>,
    pub(crate) sections: BTreeMap<Key, String>,
    pub(crate) key_format: KeyFormat,
    pub(crate) halt: Option<Key>,
}

impl Skeleton {
    /// Skeleton text with placeholder keys
    pub fn text(&self) -> String {
        self.fragments.iter().map(Fragment::text).collect()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn variables(&self) -> &BTreeMap<Key, Producer> {
        &self.variables
    }

    pub fn sections(&self) -> &BTreeMap<Key, String> {
        &self.sections
    }

    /// Sentinels the keys were generated with
    pub fn key_format(&self) -> &KeyFormat {
        &self.key_format
    }

    /// Sections keyed by their key text
    pub fn section_texts(&self) -> BTreeMap<String, String> {
        self.sections
            .iter()
            .map(|(key, text)| (key.to_string(), text.clone()))
            .collect()
    }

    /// Evaluate every producer once per recipient
    pub fn render_variables(
        &self,
        base: &Context,
        recipients: &Recipients,
    ) -> Result<VariableTable, SkeletonError> {
        render_variables(self, base, recipients)
    }

    /// Reconstruct `count` final strings from an evaluated table
    pub fn render_strings(
        &self,
        table: &VariableTable,
        count: usize,
    ) -> Result<Vec<String>, SkeletonError> {
        reconstruct::reconstruct(
            &self.text(),
            table,
            &self.section_texts(),
            count,
            self.halt.as_ref().map(Key::as_str),
        )
    }

    /// Evaluate and reconstruct in one go
    pub fn render_batch(
        &self,
        base: &Context,
        recipients: &Recipients,
    ) -> Result<Vec<String>, SkeletonError> {
        let count = batch::recipient_count(recipients)?;
        let table = self.render_variables(base, recipients)?;
        self.render_strings(&table, count)
    }
}
