//! Placeholder key generation

use std::collections::HashMap;
use std::fmt;

use crate::parser::ast::NodeId;

/// Default key prefix, a Unicode private-use character
pub const DEFAULT_KEY_PREFIX: &str = "\u{E000}";
/// Default key suffix
pub const DEFAULT_KEY_SUFFIX: &str = "\u{E001}";

/// Placeholder standing in for a deferred value or a section
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sentinels wrapped around the key counter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat {
    pub prefix: String,
    pub suffix: String,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            suffix: DEFAULT_KEY_SUFFIX.to_string(),
        }
    }
}

impl KeyFormat {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }
}

/// Logical thing a key stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyIdentity {
    /// A deferred `{{ ... }}`
    Variable(NodeId),
    /// The n-th conditional placeholder a branch emits
    BranchVariable(NodeId, usize),
    /// The n-th section text of a branch
    Section(NodeId, usize),
    /// Where output stops after an interrupt inside a deferred branch
    Halt,
}

/// Counter plus identity memo. The same identity always maps to the same
/// key, so repeated extraction of one template is stable.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    format: KeyFormat,
    counter: u64,
    memo: HashMap<KeyIdentity, Key>,
}

impl KeyGenerator {
    pub fn new(format: KeyFormat) -> Self {
        Self {
            format,
            counter: 0,
            memo: HashMap::new(),
        }
    }

    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    /// Key for `identity`, allocating one on first use
    pub fn key_for(&mut self, identity: KeyIdentity) -> Key {
        if let Some(key) = self.memo.get(&identity) {
            return key.clone();
        }
        self.counter += 1;
        let key = Key(format!(
            "{}{}{}",
            self.format.prefix, self.counter, self.format.suffix
        ));
        self.memo.insert(identity, key.clone());
        key
    }

    /// Number of keys handed out so far
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}
