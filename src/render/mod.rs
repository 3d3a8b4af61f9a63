//! Direct rendering against a data context

pub mod context;
pub mod direct;
pub mod eval;
pub mod filters;
pub mod value;

pub use context::Context;
pub use direct::{render_all, render_if, render_node};
pub use eval::{compare, evaluate_condition, evaluate_expr, evaluate_variable, render_variable};
pub use filters::{FilterFn, FilterRegistry};
pub use value::{DataObject, Map, Value};
