//! Parsing for conditions and substitution templates.
//!
//! Condition grammar (lowest precedence first):
//!
//! ```text
//! or      := and ("or" and)*
//! and     := unary ("and" unary)*
//! unary   := "not" unary | compare
//! compare := operand ((== | != | > | < | >= | <=) operand
//!                    | "not"? "in" "[" operand ("," operand)* "]")?
//! operand := NAME | $(arg NAME) | 'str' | "str" | NUMBER | true | false | "(" or ")"
//! ```
//!
//! Templates are plain text with `$(arg NAME)` (alias `$(var NAME)`) and
//! `$(eval EXPR)` substitutions.

use crate::error::{LaunchError, Result};
use crate::expr::ast::{CmpOp, Condition, Expr, Part, Template, Value};
use regex::Regex;
use std::sync::LazyLock;

// Alternatives are tried left to right, so two-char operators precede one-char ones.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^\s*(?:\$\((?:arg|var)\s+(?P<sub>[A-Za-z_][A-Za-z0-9_]*)\s*\)|(?P<num>-?[0-9]+(?:\.[0-9]+)?)|'(?P<sq>[^']*)'|"(?P<dq>[^"]*)"|(?P<op>==|!=|>=|<=|>|<|\(|\)|\[|\]|,)|(?P<word>[A-Za-z_][A-Za-z0-9_]*))"#,
    )
    .expect("token pattern is valid")
});

static SUBST_HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$\(([a-z]+)\s+").expect("substitution pattern is valid"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Arg(String),
    Num(f64),
    Str(String),
    Bool(bool),
    Sym(&'static str),
    And,
    Or,
    Not,
    In,
}

fn syntax(input: &str, message: impl Into<String>) -> LaunchError {
    LaunchError::Syntax {
        input: input.to_string(),
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while !rest.trim().is_empty() {
        let caps = TOKEN_RE.captures(rest).ok_or_else(|| {
            syntax(input, format!("unexpected input at {:?}", rest.trim_start()))
        })?;
        let token = if let Some(m) = caps.name("sub") {
            Token::Arg(m.as_str().to_string())
        } else if let Some(m) = caps.name("num") {
            let n = m
                .as_str()
                .parse::<f64>()
                .map_err(|e| syntax(input, format!("bad number {}: {}", m.as_str(), e)))?;
            Token::Num(n)
        } else if let Some(m) = caps.name("sq").or_else(|| caps.name("dq")) {
            Token::Str(m.as_str().to_string())
        } else if let Some(m) = caps.name("op") {
            let sym = match m.as_str() {
                "==" => "==",
                "!=" => "!=",
                ">=" => ">=",
                "<=" => "<=",
                ">" => ">",
                "<" => "<",
                "(" => "(",
                ")" => ")",
                "[" => "[",
                "]" => "]",
                _ => ",",
            };
            Token::Sym(sym)
        } else if let Some(m) = caps.name("word") {
            match m.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "true" | "True" => Token::Bool(true),
                "false" | "False" => Token::Bool(false),
                name => Token::Arg(name.to_string()),
            }
        } else {
            return Err(syntax(input, "unrecognized token"));
        };
        tokens.push(token);
        rest = &rest[caps.get(0).map(|m| m.end()).unwrap_or(rest.len())..];
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_sym(&mut self, sym: &'static str) -> Result<()> {
        match self.next() {
            Some(Token::Sym(s)) if s == sym => Ok(()),
            other => Err(syntax(
                self.input,
                format!("expected '{}', found {}", sym, describe(other.as_ref())),
            )),
        }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr> {
        let lhs = self.operand()?;
        let op = match self.peek() {
            Some(Token::Sym("==")) => Some(CmpOp::Eq),
            Some(Token::Sym("!=")) => Some(CmpOp::Ne),
            Some(Token::Sym(">")) => Some(CmpOp::Gt),
            Some(Token::Sym("<")) => Some(CmpOp::Lt),
            Some(Token::Sym(">=")) => Some(CmpOp::Ge),
            Some(Token::Sym("<=")) => Some(CmpOp::Le),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.operand()?;
            return Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)));
        }

        let negated = match (self.peek(), self.peek_at(1)) {
            (Some(Token::In), _) => false,
            (Some(Token::Not), Some(Token::In)) => {
                self.pos += 1;
                true
            }
            _ => return Ok(lhs),
        };
        self.pos += 1; // `in`
        self.expect_sym("[")?;
        let mut set = vec![self.operand()?];
        while self.peek() == Some(&Token::Sym(",")) {
            self.pos += 1;
            set.push(self.operand()?);
        }
        self.expect_sym("]")?;
        Ok(Expr::In {
            needle: Box::new(lhs),
            set,
            negated,
        })
    }

    fn operand(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Arg(name)) => Ok(Expr::Arg(name)),
            Some(Token::Num(n)) => Ok(Expr::Lit(Value::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(Token::Bool(b)) => Ok(Expr::Lit(Value::Bool(b))),
            Some(Token::Sym("(")) => {
                let inner = self.or()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            other => Err(syntax(
                self.input,
                format!("expected an operand, found {}", describe(other.as_ref())),
            )),
        }
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(Token::Arg(n)) => format!("name '{}'", n),
        Some(Token::Num(n)) => format!("number {}", n),
        Some(Token::Str(s)) => format!("string {:?}", s),
        Some(Token::Bool(b)) => format!("boolean {}", b),
        Some(Token::Sym(s)) => format!("'{}'", s),
        Some(Token::And) => "'and'".to_string(),
        Some(Token::Or) => "'or'".to_string(),
        Some(Token::Not) => "'not'".to_string(),
        Some(Token::In) => "'in'".to_string(),
    }
}

/// Parse a condition-language expression.
pub fn parse_expr(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(syntax(input, "empty expression"));
    }
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
    };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(syntax(
            input,
            format!("trailing input starting at {}", describe(parser.peek())),
        ));
    }
    Ok(expr)
}

/// Build a load condition from optional `if` and `unless` clauses.
///
/// Both present means `(if) and not (unless)`.
pub fn parse_condition(when: Option<&str>, unless: Option<&str>) -> Result<Option<Condition>> {
    let expr = match (when, unless) {
        (None, None) => return Ok(None),
        (Some(w), None) => parse_expr(w)?,
        (None, Some(u)) => Expr::Not(Box::new(parse_expr(u)?)),
        (Some(w), Some(u)) => Expr::And(
            Box::new(parse_expr(w)?),
            Box::new(Expr::Not(Box::new(parse_expr(u)?))),
        ),
    };
    let source = match (when, unless) {
        (Some(w), Some(u)) => format!("if {} unless {}", w, u),
        (Some(w), None) => format!("if {}", w),
        (None, Some(u)) => format!("unless {}", u),
        (None, None) => String::new(),
    };
    Ok(Some(Condition { expr, source }))
}

/// Find the `)` closing a substitution whose body starts at `body_start`.
/// Parentheses inside quotes do not count.
fn closing_paren(text: &str, body_start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text[body_start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') if depth == 0 => return Some(body_start + i),
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Parse a substitution template.
pub fn parse_template(input: &str) -> Result<Template> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;
    while i < input.len() {
        let rest = &input[i..];
        if !rest.starts_with("$(") {
            let c = rest.chars().next().unwrap_or_default();
            text.push(c);
            i += c.len_utf8();
            continue;
        }

        let caps = SUBST_HEAD_RE
            .captures(rest)
            .ok_or_else(|| syntax(input, format!("malformed substitution at {:?}", rest)))?;
        let kind = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body_start = i + caps.get(0).map(|m| m.end()).unwrap_or(0);
        let end = closing_paren(input, body_start)
            .ok_or_else(|| syntax(input, "unterminated substitution"))?;
        let body = input[body_start..end].trim();

        let part = match kind {
            "arg" | "var" => {
                if !NAME_RE.is_match(body) {
                    return Err(syntax(input, format!("invalid argument name {:?}", body)));
                }
                Part::Arg(body.to_string())
            }
            "eval" => Part::Eval(parse_expr(body)?),
            other => {
                return Err(syntax(input, format!("unknown substitution '{}'", other)));
            }
        };
        if !text.is_empty() {
            parts.push(Part::Text(std::mem::take(&mut text)));
        }
        parts.push(part);
        i = end + 1;
    }
    if !text.is_empty() || parts.is_empty() {
        parts.push(Part::Text(text));
    }
    Ok(Template {
        source: input.to_string(),
        parts,
    })
}

/// True when `name` is a valid argument or namespace segment name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn arg(name: &str) -> Box<Expr> {
        Box::new(Expr::Arg(name.to_string()))
    }

    fn s(v: &str) -> Expr {
        Expr::Lit(Value::Str(v.to_string()))
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let e = parse_expr("a or b and not c").unwrap();
        assert_eq!(
            e,
            Expr::Or(
                arg("a"),
                Box::new(Expr::And(arg("b"), Box::new(Expr::Not(arg("c"))))),
            )
        );
    }

    #[test]
    fn comparison_with_literals() {
        let e = parse_expr("speed >= 1.5").unwrap();
        assert_eq!(
            e,
            Expr::Cmp(CmpOp::Ge, arg("speed"), Box::new(Expr::Lit(Value::Num(1.5))))
        );
        let e = parse_expr("$(arg robot) == \"burger\"").unwrap();
        assert_eq!(e, Expr::Cmp(CmpOp::Eq, arg("robot"), Box::new(s("burger"))));
    }

    #[test]
    fn membership_and_negated_membership() {
        let e = parse_expr("robot not in ['burger', 'jackal']").unwrap();
        assert_eq!(
            e,
            Expr::In {
                needle: arg("robot"),
                set: vec![s("burger"), s("jackal")],
                negated: true,
            }
        );
        assert!(matches!(
            parse_expr("not robot in ['x']").unwrap(),
            Expr::Not(_)
        ));
    }

    #[test]
    fn parenthesized_groups() {
        let e = parse_expr("(a or b) and c").unwrap();
        assert!(matches!(e, Expr::And(lhs, _) if matches!(*lhs, Expr::Or(_, _))));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_expr(""), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_expr("a =="), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_expr("a b"), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_expr("x in [1"), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_expr("a & b"), Err(LaunchError::Syntax { .. })));
    }

    #[test]
    fn unless_negates() {
        let c = parse_condition(None, Some("headless")).unwrap().unwrap();
        assert_eq!(c.expr, Expr::Not(arg("headless")));
        assert_eq!(c.source, "unless headless");
        assert!(parse_condition(None, None).unwrap().is_none());
    }

    #[test]
    fn template_parts() {
        let t = parse_template("/$(arg ns)/cmd_vel").unwrap();
        assert_eq!(
            t.parts,
            vec![
                Part::Text("/".to_string()),
                Part::Arg("ns".to_string()),
                Part::Text("/cmd_vel".to_string()),
            ]
        );
        assert!(!t.is_literal());
        assert!(parse_template("plain").unwrap().is_literal());
        assert!(parse_template("").unwrap().is_literal());
    }

    #[test]
    fn template_eval_with_nested_parens() {
        let t = parse_template("$(eval (robot == 'a)') or fast)").unwrap();
        assert_eq!(t.parts.len(), 1);
        assert!(matches!(&t.parts[0], Part::Eval(Expr::Or(_, _))));
    }

    #[test]
    fn template_errors() {
        assert!(matches!(parse_template("$(arg ns"), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_template("$(env HOME)"), Err(LaunchError::Syntax { .. })));
        assert!(matches!(parse_template("$(arg 1bad)"), Err(LaunchError::Syntax { .. })));
    }
}
