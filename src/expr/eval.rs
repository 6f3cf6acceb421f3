//! Pure evaluation of conditions and templates against argument bindings.
//!
//! Arguments are always bound as strings. Comparisons coerce a string operand
//! only when the other side demands it (a number or a boolean literal), and a
//! string that does not coerce is a type mismatch rather than `false`.
//!
//! Both sides of `and` / `or` are always evaluated so that an unbound
//! reference or a type error surfaces regardless of the other operand.

use crate::error::{LaunchError, Result};
use crate::expr::ast::{CmpOp, Condition, Expr, Part, Template, Value};
use std::collections::{BTreeMap, HashMap};

/// Read access to argument bindings.
pub trait Bindings {
    /// `Ok(None)` when `name` is not bound anywhere visible.
    fn lookup(&self, name: &str) -> Result<Option<String>>;
}

impl Bindings for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name).cloned())
    }
}

impl Bindings for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name).cloned())
    }
}

fn arg_value<B: Bindings + ?Sized>(bindings: &B, name: &str, context: &str) -> Result<String> {
    bindings
        .lookup(name)?
        .ok_or_else(|| LaunchError::UnboundArgument {
            name: name.to_string(),
            context: context.to_string(),
        })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn to_number(v: &Value, op: CmpOp) -> Result<f64> {
    match v {
        Value::Num(n) => Ok(*n),
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            LaunchError::TypeMismatch(format!(
                "'{}' needs numbers, got non-numeric string {:?}",
                op.symbol(),
                s
            ))
        }),
        Value::Bool(b) => Err(LaunchError::TypeMismatch(format!(
            "'{}' needs numbers, got boolean {}",
            op.symbol(),
            b
        ))),
    }
}

/// Interpret a value as a boolean, accepting `true/false/1/0` strings.
pub fn truthy(v: &Value) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Str(s) => parse_bool(s).ok_or_else(|| {
            LaunchError::TypeMismatch(format!("expected a boolean, got string {:?}", s))
        }),
        Value::Num(n) => Err(LaunchError::TypeMismatch(format!(
            "expected a boolean, got number {}",
            n
        ))),
    }
}

fn equal(lhs: &Value, rhs: &Value) -> Result<bool> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Num(a), Value::Num(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Num(n), Value::Str(s)) | (Value::Str(s), Value::Num(n)) => {
            let parsed = s.trim().parse::<f64>().map_err(|_| {
                LaunchError::TypeMismatch(format!(
                    "cannot compare number {} with non-numeric string {:?}",
                    n, s
                ))
            })?;
            Ok(parsed == *n)
        }
        (Value::Bool(b), Value::Str(s)) | (Value::Str(s), Value::Bool(b)) => {
            let parsed = parse_bool(s).ok_or_else(|| {
                LaunchError::TypeMismatch(format!(
                    "cannot compare boolean {} with string {:?}",
                    b, s
                ))
            })?;
            Ok(parsed == *b)
        }
        (Value::Bool(_), Value::Num(_)) | (Value::Num(_), Value::Bool(_)) => {
            Err(LaunchError::TypeMismatch(format!(
                "cannot compare {} with {}",
                lhs.type_name(),
                rhs.type_name()
            )))
        }
    }
}

/// Evaluate an expression to a value. `context` names the expression in errors.
pub fn evaluate<B: Bindings + ?Sized>(expr: &Expr, bindings: &B, context: &str) -> Result<Value> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Arg(name) => Ok(Value::Str(arg_value(bindings, name, context)?)),
        Expr::Not(inner) => {
            let v = evaluate(inner, bindings, context)?;
            Ok(Value::Bool(!truthy(&v)?))
        }
        Expr::And(lhs, rhs) => {
            let l = truthy(&evaluate(lhs, bindings, context)?)?;
            let r = truthy(&evaluate(rhs, bindings, context)?)?;
            Ok(Value::Bool(l && r))
        }
        Expr::Or(lhs, rhs) => {
            let l = truthy(&evaluate(lhs, bindings, context)?)?;
            let r = truthy(&evaluate(rhs, bindings, context)?)?;
            Ok(Value::Bool(l || r))
        }
        Expr::Cmp(op, lhs, rhs) => {
            let l = evaluate(lhs, bindings, context)?;
            let r = evaluate(rhs, bindings, context)?;
            let result = match op {
                CmpOp::Eq => equal(&l, &r)?,
                CmpOp::Ne => !equal(&l, &r)?,
                CmpOp::Gt => to_number(&l, *op)? > to_number(&r, *op)?,
                CmpOp::Lt => to_number(&l, *op)? < to_number(&r, *op)?,
                CmpOp::Ge => to_number(&l, *op)? >= to_number(&r, *op)?,
                CmpOp::Le => to_number(&l, *op)? <= to_number(&r, *op)?,
            };
            Ok(Value::Bool(result))
        }
        Expr::In {
            needle,
            set,
            negated,
        } => {
            let n = evaluate(needle, bindings, context)?;
            let mut found = false;
            for member in set {
                let m = evaluate(member, bindings, context)?;
                found |= equal(&n, &m)?;
            }
            Ok(Value::Bool(found != *negated))
        }
    }
}

/// Evaluate a load condition. A missing condition is always true.
pub fn condition_holds<B: Bindings + ?Sized>(
    condition: Option<&Condition>,
    bindings: &B,
) -> Result<bool> {
    match condition {
        None => Ok(true),
        Some(c) => {
            let context = format!("condition `{}`", c.source);
            truthy(&evaluate(&c.expr, bindings, &context)?)
        }
    }
}

/// Render a template to its final string.
pub fn render<B: Bindings + ?Sized>(template: &Template, bindings: &B) -> Result<String> {
    let mut out = String::new();
    for part in &template.parts {
        match part {
            Part::Text(t) => out.push_str(t),
            Part::Arg(name) => {
                let context = format!("`{}`", template.source);
                out.push_str(&arg_value(bindings, name, &context)?);
            }
            Part::Eval(expr) => {
                let context = format!("`{}`", template.source);
                out.push_str(&evaluate(expr, bindings, &context)?.to_string());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse::{parse_condition, parse_expr, parse_template};

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn holds(expr: &str, b: &BTreeMap<String, String>) -> Result<bool> {
        truthy(&evaluate(&parse_expr(expr)?, b, expr)?)
    }

    #[test]
    fn string_and_numeric_comparisons() {
        let b = bindings(&[("robot", "burger"), ("n", "4")]);
        assert!(holds("robot == 'burger'", &b).unwrap());
        assert!(holds("robot != 'jackal'", &b).unwrap());
        assert!(holds("n > 3", &b).unwrap());
        assert!(holds("n <= 4", &b).unwrap());
        assert!(!holds("n < 2", &b).unwrap());
        assert!(holds("n == 4.0", &b).unwrap());
    }

    #[test]
    fn boolean_strings_coerce() {
        let b = bindings(&[("use_sim", "True"), ("headless", "0")]);
        assert!(holds("use_sim", &b).unwrap());
        assert!(holds("use_sim and not headless", &b).unwrap());
        assert!(holds("use_sim == true", &b).unwrap());
    }

    #[test]
    fn membership() {
        let b = bindings(&[("robot", "jackal")]);
        assert!(holds("robot in ['burger', 'jackal']", &b).unwrap());
        assert!(!holds("robot not in ['burger', 'jackal']", &b).unwrap());
        assert!(!holds("robot in ['burger']", &b).unwrap());
    }

    #[test]
    fn ordering_non_numeric_is_type_mismatch() {
        let b = bindings(&[("robot", "burger")]);
        assert!(matches!(holds("robot > 3", &b), Err(LaunchError::TypeMismatch(_))));
        assert!(matches!(holds("robot == 3", &b), Err(LaunchError::TypeMismatch(_))));
        assert!(matches!(holds("robot", &b), Err(LaunchError::TypeMismatch(_))));
        assert!(matches!(holds("true == 1", &b), Err(LaunchError::TypeMismatch(_))));
    }

    #[test]
    fn unbound_reference_even_when_other_side_decides() {
        let b = bindings(&[("a", "false")]);
        let err = holds("a and missing", &b).unwrap_err();
        assert!(matches!(err, LaunchError::UnboundArgument { ref name, .. } if name == "missing"));
    }

    #[test]
    fn condition_defaults_to_true() {
        let b = bindings(&[]);
        assert!(condition_holds(None, &b).unwrap());
        let c = parse_condition(None, Some("false")).unwrap();
        assert!(condition_holds(c.as_ref(), &b).unwrap());
    }

    #[test]
    fn render_substitutions() {
        let b = bindings(&[("ns", "env3"), ("n", "2")]);
        let t = parse_template("/$(arg ns)/scan_$(eval n > 1)").unwrap();
        assert_eq!(render(&t, &b).unwrap(), "/env3/scan_true");
        let t = parse_template("$(eval 3)").unwrap();
        assert_eq!(render(&t, &b).unwrap(), "3");
        let t = parse_template("$(arg other)").unwrap();
        assert!(matches!(render(&t, &b), Err(LaunchError::UnboundArgument { .. })));
    }
}
