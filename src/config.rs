//! Engine configuration
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! TOML file:
//!
//! ```toml
//! [render]
//! strict = false
//!
//! [skeleton]
//! separate = "^(user|recipient)"
//! key_prefix = "\uE000"
//! key_suffix = "\uE001"
//! ```

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::skeleton::{KeyFormat, SeparationPredicate};

/// Errors that can occur when loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid separation pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Invalid key format: {0}")]
    KeyFormat(String),
}

/// Settings shared by every render of a template
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Propagate render errors instead of inlining them
    pub strict: bool,
    /// Variables to defer during skeleton extraction
    pub separation: Option<SeparationPredicate>,
    /// Placeholder key sentinels
    pub key_format: KeyFormat,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    #[serde(default)]
    render: TomlRender,
    #[serde(default)]
    skeleton: TomlSkeleton,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlRender {
    strict: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TomlSkeleton {
    separate: Option<String>,
    key_prefix: Option<String>,
    key_suffix: Option<String>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_separation(mut self, separation: SeparationPredicate) -> Self {
        self.separation = Some(separation);
        self
    }

    /// Defer every variable whose name `pattern` matches
    pub fn with_separation_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.separation = Some(SeparationPredicate::from_regex(Regex::new(pattern)?));
        Ok(self)
    }

    pub fn with_key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string. Missing keys keep their
    /// defaults.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let mut config = EngineConfig::default();

        if let Some(strict) = parsed.render.strict {
            config.strict = strict;
        }
        if let Some(pattern) = parsed.skeleton.separate {
            config = config.with_separation_pattern(&pattern)?;
        }
        if let Some(prefix) = parsed.skeleton.key_prefix {
            config.key_format.prefix = prefix;
        }
        if let Some(suffix) = parsed.skeleton.key_suffix {
            config.key_format.suffix = suffix;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the key format can be told apart from template text
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_format.prefix.is_empty() {
            return Err(ConfigError::KeyFormat(
                "key prefix must not be empty".to_string(),
            ));
        }
        if self.key_format.prefix.chars().any(|c| c.is_ascii_digit()) {
            return Err(ConfigError::KeyFormat(format!(
                "key prefix {:?} must not contain digits",
                self.key_format.prefix
            )));
        }
        Ok(())
    }
}
