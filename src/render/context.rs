//! Render context: scopes, registers, interrupts and the error sink

use std::sync::Arc;

use crate::error::RenderError;
use crate::parser::ast::{Condition, Interrupt, Variable};
use crate::render::filters::FilterRegistry;
use crate::render::value::{Map, Value};
use crate::skeleton::SeparationPredicate;

/// Evaluation state for one render or extraction pass.
///
/// Scope layers are reference counted so a shared base context can be cloned
/// per recipient without copying its data.
#[derive(Debug, Clone)]
pub struct Context {
    scopes: Vec<Arc<Map>>,
    registers: Map,
    interrupts: Vec<Interrupt>,
    errors: Vec<RenderError>,
    strict: bool,
    filters: Arc<FilterRegistry>,
    separation: Option<SeparationPredicate>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Arc::new(FilterRegistry::default()))
    }
}

impl Context {
    /// Empty context with one writable scope
    pub fn new(filters: Arc<FilterRegistry>) -> Self {
        Self {
            scopes: vec![Arc::new(Map::new())],
            registers: Map::new(),
            interrupts: Vec::new(),
            errors: Vec::new(),
            strict: false,
            filters,
            separation: None,
        }
    }

    /// Add a read-mostly layer of assigns on top of the current scopes
    pub fn with_assigns(mut self, assigns: Map) -> Self {
        self.push_layer(Arc::new(assigns));
        self
    }

    pub fn with_registers(mut self, registers: Map) -> Self {
        self.registers = registers;
        self
    }

    /// Propagate render errors instead of containing them
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_separation(mut self, separation: Option<SeparationPredicate>) -> Self {
        self.separation = separation;
        self
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Whether a variable must be deferred during skeleton extraction
    pub fn is_deferred(&self, variable: &Variable) -> bool {
        self.separation
            .as_ref()
            .is_some_and(|p| variable.referenced_names().into_iter().any(|n| p.matches(n)))
    }

    /// Whether an `if` predicate reads any deferred name
    pub fn is_condition_deferred(&self, condition: &Condition) -> bool {
        self.separation
            .as_ref()
            .is_some_and(|p| condition.referenced_names().into_iter().any(|n| p.matches(n)))
    }

    // Scopes

    pub fn push_scope(&mut self) {
        self.scopes.push(Arc::new(Map::new()));
    }

    /// Push an existing layer; it is only copied if later written to
    pub fn push_layer(&mut self, layer: Arc<Map>) {
        self.scopes.push(layer);
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Run `f` inside a fresh scope
    pub fn stack<R>(&mut self, f: impl FnOnce(&mut Context) -> R) -> R {
        self.push_scope();
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Look a name up, most recent scope first
    pub fn get(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Bind a name in the innermost scope
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            Arc::make_mut(scope).insert(name.into(), value);
        }
    }

    pub fn registers(&self) -> &Map {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Map {
        &mut self.registers
    }

    // Interrupts

    pub fn has_interrupt(&self) -> bool {
        !self.interrupts.is_empty()
    }

    pub fn push_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupts.push(interrupt);
    }

    pub fn pop_interrupt(&mut self) -> Option<Interrupt> {
        self.interrupts.pop()
    }

    pub(crate) fn interrupt_depth(&self) -> usize {
        self.interrupts.len()
    }

    pub(crate) fn truncate_interrupts(&mut self, depth: usize) {
        self.interrupts.truncate(depth);
    }

    // Errors

    /// Record a contained error and return its placeholder text. In strict
    /// mode the error is handed back instead.
    pub fn handle_error(&mut self, err: RenderError) -> Result<String, RenderError> {
        if self.strict {
            return Err(err);
        }
        tracing::debug!(error = %err, "contained render error");
        let placeholder = format!("Liquid error: {}", err);
        self.errors.push(err);
        Ok(placeholder)
    }

    pub fn errors(&self) -> &[RenderError] {
        &self.errors
    }
}
