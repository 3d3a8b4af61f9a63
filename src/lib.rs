//! Liquid Skeleton - Liquid templates with batch personalization
//!
//! This library parses a subset of Liquid (text, `{{ ... }}` output with
//! filters, `if`/`elsif`/`else`, `break`/`continue`) and renders it either
//! directly or through a skeleton: the template is walked once against the
//! data every recipient shares, and each recipient then costs only a pass
//! over the deferred variables plus string substitution.
//!
//! # Example
//!
//! ```rust
//! use liquid_skeleton::{render, Map, Value};
//!
//! let mut data = Map::new();
//! data.insert("name".to_string(), Value::from("world"));
//!
//! let output = render("Hello {{ name | upcase }}!", &data).unwrap();
//! assert_eq!(output, "Hello WORLD!");
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod render;
pub mod skeleton;
pub mod template;

pub use config::{ConfigError, EngineConfig};
pub use error::{ParseError, RenderError};
pub use parser::{parse, parse_with, Document};
pub use render::{Context, DataObject, FilterRegistry, Map, Value};
pub use skeleton::{
    KeyFormat, Recipients, SeparationPredicate, Skeleton, SkeletonError, VariableTable,
};
pub use template::{CustomTag, TagFactory, TagRegistry, Template};

use thiserror::Error;

/// Errors that can occur anywhere in the pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Parse and render `source` against `data` with default configuration
pub fn render(source: &str, data: &Map) -> Result<String, Error> {
    render_with_config(source, data, EngineConfig::default())
}

/// Parse and render `source` against `data`
pub fn render_with_config(source: &str, data: &Map, config: EngineConfig) -> Result<String, Error> {
    let template = Template::parse_with(source, &TagRegistry::default(), config)?;
    Ok(template.render(data)?)
}

/// Render `source` once per recipient through a skeleton.
///
/// `shared` is visible to every recipient; `recipients` holds one value per
/// recipient for each name, and the names `config.separation` selects are
/// deferred.
///
/// # Example
///
/// ```rust
/// use liquid_skeleton::{render_batch, EngineConfig, Map, Recipients, Value};
///
/// let config = EngineConfig::new().with_separation_pattern("^name$").unwrap();
/// let mut recipients = Recipients::new();
/// recipients.insert("name".to_string(), vec![Value::from("Ann"), Value::from("Bo")]);
///
/// let output = render_batch("Hi {{ name }}", &Map::new(), &recipients, config).unwrap();
/// assert_eq!(output, vec!["Hi Ann", "Hi Bo"]);
/// ```
pub fn render_batch(
    source: &str,
    shared: &Map,
    recipients: &Recipients,
    config: EngineConfig,
) -> Result<Vec<String>, Error> {
    let template = Template::parse_with(source, &TagRegistry::default(), config)?;
    Ok(template.render_batch(shared, recipients)?)
}
