//! Runtime values

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name to value layer
pub type Map = BTreeMap<String, Value>;

/// Lazily resolved object exposed to templates
///
/// Members are resolved by name on each access. Unknown names fall back to
/// [`DataObject::before_method`].
pub trait DataObject: Send + Sync {
    /// Resolve a known member
    fn invoke(&self, name: &str) -> Option<Value>;

    /// Catch-all for names `invoke` does not know
    fn before_method(&self, _name: &str) -> Value {
        Value::Nil
    }

    /// Text written when the object itself is output
    fn to_output(&self) -> String {
        String::new()
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Map(Map),
    Data(Arc<dyn DataObject>),
}

impl Value {
    /// Only `nil` and `false` are falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "hash",
            Value::Data(_) => "object",
        }
    }

    /// Text written to the output for this value
    pub fn to_output(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::Array(items) => items.iter().map(Value::to_output).collect(),
            Value::Map(_) => self.to_json().to_string(),
            Value::Data(obj) => obj.to_output(),
        }
    }

    /// Literal-style rendering used in error messages
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Str(s) => format!("{:?}", s),
            Value::Array(_) | Value::Map(_) => self.to_json().to_string(),
            other => other.to_output(),
        }
    }

    /// Resolve `value.name`
    pub fn member(&self, name: &str) -> Value {
        match (self, name) {
            (Value::Map(map), _) if map.contains_key(name) => {
                map.get(name).cloned().unwrap_or_default()
            }
            (Value::Data(obj), _) => obj.invoke(name).unwrap_or_else(|| obj.before_method(name)),
            (Value::Array(items), "size") => Value::Int(items.len() as i64),
            (Value::Array(items), "first") => items.first().cloned().unwrap_or_default(),
            (Value::Array(items), "last") => items.last().cloned().unwrap_or_default(),
            (Value::Map(map), "size") => Value::Int(map.len() as i64),
            (Value::Map(map), "first") => map
                .iter()
                .next()
                .map(|(k, v)| Value::Array(vec![Value::Str(k.clone()), v.clone()]))
                .unwrap_or_default(),
            (Value::Str(s), "size") => Value::Int(s.chars().count() as i64),
            _ => Value::Nil,
        }
    }

    /// Resolve `value[key]`
    pub fn index(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Array(items), Value::Int(i)) => {
                let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                usize::try_from(idx)
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .cloned()
                    .unwrap_or_default()
            }
            (Value::Map(_), Value::Str(name)) | (Value::Data(_), Value::Str(name)) => {
                self.member(name)
            }
            (Value::Array(_), Value::Str(name)) | (Value::Str(_), Value::Str(name)) => {
                self.member(name)
            }
            _ => Value::Nil,
        }
    }

    /// Numeric view, if this value is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Data(obj) => serde_json::Value::String(obj.to_output()),
        }
    }
}

/// Whole floats keep one decimal (`2.0`), others print as-is (`0.5`)
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_), Value::Float(_))
            | (Value::Float(_), Value::Int(_))
            | (Value::Float(_), Value::Float(_)) => self.as_f64() == other.as_f64(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("Nil"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Value::Data(_) => f.write_str("Data(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<Arc<dyn DataObject>> for Value {
    fn from(obj: Arc<dyn DataObject>) -> Self {
        Value::Data(obj)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
