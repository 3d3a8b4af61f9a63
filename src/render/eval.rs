//! Expression, variable and condition evaluation

use std::cmp::Ordering;

use crate::error::RenderError;
use crate::parser::ast::{Accessor, Comparison, Condition, Expr, Literal, Operator, Variable};
use crate::render::context::Context;
use crate::render::value::Value;

pub fn evaluate_expr(expr: &Expr, ctx: &Context) -> Result<Value, RenderError> {
    match expr {
        Expr::Literal(literal) => Ok(match literal {
            Literal::Nil => Value::Nil,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
        }),
        Expr::Lookup { root, path } => {
            let mut value = ctx.get(root);
            for accessor in path {
                value = match accessor {
                    Accessor::Member(name) => value.member(name),
                    Accessor::Index(key) => value.index(&evaluate_expr(key, ctx)?),
                };
            }
            Ok(value)
        }
    }
}

/// Evaluate a variable and run its filter pipeline
pub fn evaluate_variable(variable: &Variable, ctx: &Context) -> Result<Value, RenderError> {
    let mut value = evaluate_expr(&variable.expr, ctx)?;
    for filter in &variable.filters {
        let args = filter
            .args
            .iter()
            .map(|arg| evaluate_expr(arg, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        value = ctx.filters().apply(&filter.name, &value, &args)?;
    }
    Ok(value)
}

/// Output text of a variable
pub fn render_variable(variable: &Variable, ctx: &Context) -> Result<String, RenderError> {
    evaluate_variable(variable, ctx).map(|value| value.to_output())
}

/// Evaluate an `if` predicate. `and`/`or` short-circuit.
pub fn evaluate_condition(condition: &Condition, ctx: &Context) -> Result<bool, RenderError> {
    match condition {
        Condition::Compare(comparison) => evaluate_comparison(comparison, ctx),
        Condition::And(left, right) => {
            Ok(evaluate_condition(left, ctx)? && evaluate_condition(right, ctx)?)
        }
        Condition::Or(left, right) => {
            Ok(evaluate_condition(left, ctx)? || evaluate_condition(right, ctx)?)
        }
    }
}

fn evaluate_comparison(comparison: &Comparison, ctx: &Context) -> Result<bool, RenderError> {
    let left = evaluate_expr(&comparison.left, ctx)?;
    match &comparison.op {
        None => Ok(left.is_truthy()),
        Some((op, right)) => compare(&left, *op, &evaluate_expr(right, ctx)?),
    }
}

/// Apply a comparison operator.
///
/// Ordering against nil or a non-orderable value is false. Ordering a number
/// against a string is an error.
pub fn compare(left: &Value, op: Operator, right: &Value) -> Result<bool, RenderError> {
    match op {
        Operator::Eq => Ok(left == right),
        Operator::Ne => Ok(left != right),
        Operator::Contains => Ok(contains(left, right)),
        Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
            let ordering = match (left, right) {
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                    match (left.as_f64(), right.as_f64()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => None,
                    }
                }
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                (Value::Int(_) | Value::Float(_), Value::Str(_))
                | (Value::Str(_), Value::Int(_) | Value::Float(_)) => {
                    return Err(RenderError::Comparison {
                        left: left.inspect(),
                        right: right.inspect(),
                    })
                }
                _ => None,
            };

            Ok(match ordering {
                Some(ordering) => match op {
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            })
        }
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::Str(s) => match right {
            Value::Nil => false,
            other => s.contains(other.to_output().as_str()),
        },
        Value::Array(items) => items.contains(right),
        Value::Map(map) => match right {
            Value::Str(key) => map.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}
