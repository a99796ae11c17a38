//! Matcher leaves: the `Predicate` payload of a [`crate::condition::Condition`].

use hub_core::Value;

use crate::token::TokenContext;

/// The twelve comparison operators §3 defines over a token path and a set of
/// literal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Co,
    Nc,
    Sw,
    Ew,
    Ex,
    Nx,
}

impl MatchOp {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => MatchOp::Eq,
            "ne" => MatchOp::Ne,
            "gt" => MatchOp::Gt,
            "ge" => MatchOp::Ge,
            "lt" => MatchOp::Lt,
            "le" => MatchOp::Le,
            "co" => MatchOp::Co,
            "nc" => MatchOp::Nc,
            "sw" => MatchOp::Sw,
            "ew" => MatchOp::Ew,
            "ex" => MatchOp::Ex,
            "nx" => MatchOp::Nx,
            _ => return None,
        })
    }
}

/// `{left: key, op, right: values}`. `values` holds one or more literals;
/// every op but `ex`/`nx` compares against `values[0]`.
#[derive(Debug, Clone)]
pub struct Matcher {
    key: String,
    op: MatchOp,
    values: Vec<Value>,
}

impl Matcher {
    #[must_use]
    pub fn new(key: impl Into<String>, op: MatchOp, values: Vec<Value>) -> Self {
        Self { key: key.into(), op, values }
    }

    /// Evaluates this matcher against `ctx`, per §4.4's evaluation rules:
    /// a missing path makes `nx` true and every other matcher false except
    /// `ne`, which treats absence as inequality.
    #[must_use]
    pub fn eval(&self, ctx: &TokenContext) -> bool {
        let resolved = ctx.resolve_path(&self.key);
        let Some(left) = resolved else {
            return matches!(self.op, MatchOp::Nx | MatchOp::Ne);
        };

        match self.op {
            MatchOp::Ex => true,
            MatchOp::Nx => false,
            MatchOp::Eq => self.values.first().is_some_and(|r| values_equal(&left, r)),
            MatchOp::Ne => !self.values.first().is_some_and(|r| values_equal(&left, r)),
            MatchOp::Gt => numeric_cmp(&left, self.values.first(), |a, b| a > b),
            MatchOp::Ge => numeric_cmp(&left, self.values.first(), |a, b| a >= b),
            MatchOp::Lt => numeric_cmp(&left, self.values.first(), |a, b| a < b),
            MatchOp::Le => numeric_cmp(&left, self.values.first(), |a, b| a <= b),
            MatchOp::Co => string_cmp(&left, self.values.first(), |a, b| a.contains(b)),
            MatchOp::Nc => !string_cmp(&left, self.values.first(), |a, b| a.contains(b)),
            MatchOp::Sw => string_cmp(&left, self.values.first(), |a, b| a.starts_with(b)),
            MatchOp::Ew => string_cmp(&left, self.values.first(), |a, b| a.ends_with(b)),
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_str(), right.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn numeric_cmp(left: &Value, right: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (left.as_f64(), right.and_then(Value::as_f64)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn string_cmp(left: &Value, right: Option<&Value>, cmp: impl Fn(&str, &str) -> bool) -> bool {
    match (left.as_str(), right.and_then(Value::as_str)) {
        (Some(a), Some(b)) => cmp(&a.to_ascii_lowercase(), &b.to_ascii_lowercase()),
        _ => false,
    }
}
