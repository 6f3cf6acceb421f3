//! Expression layer: condition language and substitution templates.

pub mod ast;
pub mod eval;
pub mod parse;

pub use ast::{CmpOp, Condition, Expr, Part, Template, Value};
pub use eval::{Bindings, condition_holds, evaluate, render, truthy};
pub use parse::{is_valid_name, parse_condition, parse_expr, parse_template};
