//! Boolean condition tree: `and`/`or`/`not` over matcher leaves.
//!
//! Structured the same way as a boolean-algebra-over-predicates library:
//! generic over the leaf predicate type so the tree itself never needs to
//! know what a matcher actually compares.

use smallvec::SmallVec;

use crate::matcher::Matcher;
use crate::token::TokenContext;

/// A condition tree. `Predicate` leaves are [`Matcher`]s; everything else is
/// short-circuiting boolean combination.
#[derive(Debug, Clone)]
pub enum Condition {
    And(SmallVec<[Box<Condition>; 4]>),
    Or(SmallVec<[Box<Condition>; 4]>),
    Not(Box<Condition>),
    Predicate(Matcher),
}

impl Condition {
    #[must_use]
    pub fn matcher(m: Matcher) -> Self {
        Condition::Predicate(m)
    }

    #[must_use]
    pub fn and(parts: Vec<Condition>) -> Self {
        Condition::And(parts.into_iter().map(Box::new).collect())
    }

    #[must_use]
    pub fn or(parts: Vec<Condition>) -> Self {
        Condition::Or(parts.into_iter().map(Box::new).collect())
    }

    #[must_use]
    pub fn not(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    /// Evaluates the tree against `ctx`. An empty `And` is vacuously true; an
    /// empty `Or` is vacuously false, matching standard boolean-algebra
    /// identity elements.
    #[must_use]
    pub fn eval(&self, ctx: &TokenContext) -> bool {
        match self {
            Condition::Predicate(m) => m.eval(ctx),
            Condition::Not(inner) => !inner.eval(ctx),
            Condition::And(parts) => parts.iter().all(|p| p.eval(ctx)),
            Condition::Or(parts) => parts.iter().any(|p| p.eval(ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchOp;
    use hub_core::Value;

    fn ctx_with(key: &str, value: Value) -> TokenContext {
        let mut data = Value::map();
        data.set_path(key, value);
        TokenContext::from_event_data(data)
    }

    #[test]
    fn and_short_circuits_on_first_false() {
        let cond = Condition::and(vec![
            Condition::matcher(Matcher::new("a", MatchOp::Eq, vec![Value::from("x")])),
            Condition::matcher(Matcher::new("b", MatchOp::Eq, vec![Value::from("y")])),
        ]);
        let ctx = ctx_with("a", Value::from("x"));
        assert!(!cond.eval(&ctx));
    }

    #[test]
    fn or_is_true_if_any_branch_matches() {
        let cond = Condition::or(vec![
            Condition::matcher(Matcher::new("a", MatchOp::Eq, vec![Value::from("nope")])),
            Condition::matcher(Matcher::new("a", MatchOp::Eq, vec![Value::from("x")])),
        ]);
        let ctx = ctx_with("a", Value::from("x"));
        assert!(cond.eval(&ctx));
    }

    #[test]
    fn not_inverts_its_child() {
        let cond = Condition::not(Condition::matcher(Matcher::new(
            "a",
            MatchOp::Eq,
            vec![Value::from("x")],
        )));
        let ctx = ctx_with("a", Value::from("x"));
        assert!(!cond.eval(&ctx));
    }

    #[test]
    fn empty_and_is_vacuously_true() {
        assert!(Condition::and(vec![]).eval(&TokenContext::from_event_data(Value::map())));
    }

    #[test]
    fn empty_or_is_vacuously_false() {
        assert!(!Condition::or(vec![]).eval(&TokenContext::from_event_data(Value::map())));
    }
}
