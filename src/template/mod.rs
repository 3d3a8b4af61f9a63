//! Parsed templates and their rendering entry points
//!
//! A [`Template`] owns its node tree, the filters it renders with and the
//! key generator used for skeleton extraction. Rendering never mutates the
//! tree, so one template can serve many renders.
//!
//! # Example
//!
//! ```text
//! let template = Template::parse("Hi {{ name }}{% if vip %}!{% endif %}")?
//!     .with_separation(Some(predicate));
//! let skeleton = template.render_skeleton(&shared)?;
//! let table = template.render_variables(&skeleton, &shared, &recipients)?;
//! let output = skeleton.render_strings(&table, count)?;
//! ```

mod registry;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::error::{ParseError, RenderError};
use crate::parser::ast::Document;
use crate::parser::parse_with;
use crate::render::context::Context;
use crate::render::direct::render_all;
use crate::render::filters::FilterRegistry;
use crate::render::value::Map;
use crate::skeleton::{
    self, Extractor, KeyGenerator, Recipients, SeparationPredicate, Skeleton, SkeletonError,
    VariableTable,
};

pub use registry::{TagFactory, TagRegistry};

/// Leaf tag with custom rendering, registered through
/// [`TagRegistry::register_tag`]
pub trait CustomTag: Send + Sync {
    fn render(&self, markup: &str, ctx: &mut Context) -> Result<String, RenderError>;
}

/// A parsed template
#[derive(Debug)]
pub struct Template {
    root: Document,
    config: EngineConfig,
    filters: Arc<FilterRegistry>,
    keys: Mutex<KeyGenerator>,
}

impl Template {
    /// Parse with the standard tags and default configuration
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        Self::parse_with(source, &TagRegistry::default(), EngineConfig::default())
    }

    pub fn parse_with(
        source: &str,
        registry: &TagRegistry,
        config: EngineConfig,
    ) -> Result<Self, ParseError> {
        let root = parse_with(source, registry)?;
        let keys = KeyGenerator::new(config.key_format.clone());
        Ok(Self {
            root,
            config,
            filters: Arc::new(FilterRegistry::default()),
            keys: Mutex::new(keys),
        })
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    /// Replace the predicate choosing which variables are deferred
    pub fn with_separation(mut self, separation: Option<SeparationPredicate>) -> Self {
        self.config.separation = separation;
        self
    }

    pub fn document(&self) -> &Document {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh context over `assigns` carrying this template's settings
    pub fn context(&self, assigns: &Map) -> Context {
        Context::new(self.filters.clone())
            .with_assigns(assigns.clone())
            .with_strict(self.config.strict)
            .with_separation(self.config.separation.clone())
    }

    /// Render directly, inlining contained errors unless the template is
    /// configured strict
    pub fn render(&self, assigns: &Map) -> Result<String, RenderError> {
        let mut ctx = self.context(assigns);
        self.render_with_context(&mut ctx)
    }

    /// Render directly, propagating the first error
    pub fn render_strict(&self, assigns: &Map) -> Result<String, RenderError> {
        let mut ctx = self.context(assigns).with_strict(true);
        self.render_with_context(&mut ctx)
    }

    pub fn render_with_context(&self, ctx: &mut Context) -> Result<String, RenderError> {
        render_all(&self.root.nodelist, ctx)
    }

    /// Extract the skeleton against `shared`. Keys are stable across calls.
    pub fn render_skeleton(&self, shared: &Map) -> Result<Skeleton, SkeletonError> {
        let mut ctx = self.context(shared);
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Extractor::new(&mut keys).extract(&self.root, &mut ctx)
    }

    /// Evaluate a skeleton's producers for every recipient on top of `shared`
    pub fn render_variables(
        &self,
        skeleton: &Skeleton,
        shared: &Map,
        recipients: &Recipients,
    ) -> Result<VariableTable, SkeletonError> {
        skeleton.render_variables(&self.context(shared), recipients)
    }

    /// Reconstruct final strings from skeleton text, a variable table and
    /// section texts
    pub fn render_strings(
        text: &str,
        table: &VariableTable,
        sections: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, SkeletonError> {
        skeleton::render_strings(text, table, sections)
    }

    /// Extract, evaluate and reconstruct in one call
    pub fn render_batch(
        &self,
        shared: &Map,
        recipients: &Recipients,
    ) -> Result<Vec<String>, SkeletonError> {
        let skeleton = self.render_skeleton(shared)?;
        skeleton.render_batch(&self.context(shared), recipients)
    }
}
