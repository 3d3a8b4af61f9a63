//! Filter registry and the standard filters

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RenderError;
use crate::render::value::Value;

/// A filter receives the piped value and its evaluated arguments
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, RenderError> + Send + Sync>;

/// Named filters available to `{{ value | filter }}`
#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("plus", |input, args| {
            arithmetic("plus", input, args, i64::checked_add, |a, b| a + b)
        });
        registry.register("minus", |input, args| {
            arithmetic("minus", input, args, i64::checked_sub, |a, b| a - b)
        });
        registry.register("times", |input, args| {
            arithmetic("times", input, args, i64::checked_mul, |a, b| a * b)
        });
        registry.register("divided_by", divided_by);
        registry.register("modulo", modulo);
        registry.register("append", |input, args| {
            let suffix = argument("append", args, 0)?;
            Ok(Value::Str(input.to_output() + &suffix.to_output()))
        });
        registry.register("prepend", |input, args| {
            let prefix = argument("prepend", args, 0)?;
            Ok(Value::Str(prefix.to_output() + &input.to_output()))
        });
        registry.register("upcase", |input, _| {
            Ok(Value::Str(input.to_output().to_uppercase()))
        });
        registry.register("downcase", |input, _| {
            Ok(Value::Str(input.to_output().to_lowercase()))
        });
        registry.register("capitalize", |input, _| Ok(Value::Str(capitalize(&input.to_output()))));
        registry.register("strip", |input, _| {
            Ok(Value::Str(input.to_output().trim().to_string()))
        });
        registry.register("size", |input, _| {
            Ok(match input {
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                Value::Array(items) => Value::Int(items.len() as i64),
                Value::Map(map) => Value::Int(map.len() as i64),
                Value::Data(_) => input.member("size"),
                _ => Value::Int(0),
            })
        });
        registry.register("default", |input, args| {
            let fallback = argument("default", args, 0)?;
            let blank = match input {
                Value::Nil | Value::Bool(false) => true,
                Value::Str(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::Map(map) => map.is_empty(),
                _ => false,
            };
            Ok(if blank { fallback.clone() } else { input.clone() })
        });
        registry
    }
}

impl FilterRegistry {
    /// Registry without any filters
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Register or replace a filter
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Apply a filter by name
    pub fn apply(&self, name: &str, input: &Value, args: &[Value]) -> Result<Value, RenderError> {
        let filter = self.get(name).ok_or_else(|| RenderError::UndefinedFilter {
            name: name.to_string(),
        })?;
        filter(input, args)
    }

    /// All registered filter names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

fn argument<'a>(filter: &str, args: &'a [Value], index: usize) -> Result<&'a Value, RenderError> {
    args.get(index).ok_or_else(|| RenderError::Filter {
        filter: filter.to_string(),
        message: format!("wrong number of arguments ({} for {})", args.len(), index + 1),
    })
}

/// Numeric view of a filter operand. Strings holding numbers are accepted,
/// nil counts as zero.
fn number(filter: &str, value: &Value) -> Result<Value, RenderError> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Nil => Ok(Value::Int(0)),
        Value::Str(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                Ok(Value::Int(n))
            } else if let Ok(f) = s.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Ok(Value::Int(0))
            }
        }
        other => Err(RenderError::Filter {
            filter: filter.to_string(),
            message: format!("{} is not a number", other.type_name()),
        }),
    }
}

fn operands(filter: &str, input: &Value, args: &[Value]) -> Result<(Value, Value), RenderError> {
    let lhs = number(filter, input)?;
    let rhs = number(filter, argument(filter, args, 0)?)?;
    Ok((lhs, rhs))
}

fn arithmetic(
    filter: &str,
    input: &Value,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RenderError> {
    match operands(filter, input, args)? {
        (Value::Int(a), Value::Int(b)) => {
            int_op(a, b).map(Value::Int).ok_or_else(|| overflow(filter))
        }
        (a, b) => Ok(Value::Float(float_op(
            a.as_f64().unwrap_or_default(),
            b.as_f64().unwrap_or_default(),
        ))),
    }
}

fn divided_by(input: &Value, args: &[Value]) -> Result<Value, RenderError> {
    match operands("divided_by", input, args)? {
        (Value::Int(_), Value::Int(0)) => Err(RenderError::Filter {
            filter: "divided_by".to_string(),
            message: "divided by 0".to_string(),
        }),
        (Value::Int(a), Value::Int(b)) => floor_div(a, b)
            .map(Value::Int)
            .ok_or_else(|| overflow("divided_by")),
        (a, b) => Ok(Value::Float(
            a.as_f64().unwrap_or_default() / b.as_f64().unwrap_or_default(),
        )),
    }
}

fn modulo(input: &Value, args: &[Value]) -> Result<Value, RenderError> {
    match operands("modulo", input, args)? {
        (Value::Int(_), Value::Int(0)) => Err(RenderError::Filter {
            filter: "modulo".to_string(),
            message: "divided by 0".to_string(),
        }),
        (Value::Int(a), Value::Int(b)) => floor_div(a, b)
            .and_then(|q| b.checked_mul(q))
            .and_then(|p| a.checked_sub(p))
            .map(Value::Int)
            .ok_or_else(|| overflow("modulo")),
        (a, b) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            Ok(Value::Float(a - b * (a / b).floor()))
        }
    }
}

/// Integer division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div_euclid(b)?;
    // euclidean division only floors for positive divisors
    if b < 0 && a.rem_euclid(b) != 0 {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn overflow(filter: &str) -> RenderError {
    RenderError::Filter {
        filter: filter.to_string(),
        message: "integer overflow".to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
