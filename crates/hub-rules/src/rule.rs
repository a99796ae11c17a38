//! Rule document parsing (§6): JSON `{version, rules: [{condition, consequences}]}`
//! into the in-memory [`Condition`]/[`Consequence`] trees the engine evaluates.

use serde::Deserialize;
use thiserror::Error;

use crate::condition::Condition;
use crate::consequence::Consequence;
use crate::matcher::{MatchOp, Matcher};
use hub_core::Value;

#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("malformed rule document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown group logic '{0}'")]
    UnknownLogic(String),
    #[error("unknown matcher operator '{0}'")]
    UnknownOperator(String),
    #[error("'not' group must have exactly one condition, found {0}")]
    NotArity(usize),
}

/// One parsed rule: evaluate `condition`, apply `consequences` in order on a
/// match.
#[derive(Debug, Clone)]
pub struct Rule {
    pub condition: Condition,
    pub consequences: Vec<Consequence>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ConditionNode {
    Group { definition: GroupDef },
    Matcher { definition: MatcherDef },
}

#[derive(Debug, Deserialize)]
struct GroupDef {
    logic: String,
    conditions: Vec<ConditionNode>,
}

#[derive(Debug, Deserialize)]
struct MatcherDef {
    key: String,
    matcher: String,
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

impl TryFrom<ConditionNode> for Condition {
    type Error = RuleParseError;

    fn try_from(node: ConditionNode) -> Result<Self, Self::Error> {
        match node {
            ConditionNode::Matcher { definition } => {
                let op = MatchOp::parse(&definition.matcher)
                    .ok_or_else(|| RuleParseError::UnknownOperator(definition.matcher.clone()))?;
                let values = definition.values.into_iter().map(Value::from).collect();
                Ok(Condition::matcher(Matcher::new(definition.key, op, values)))
            }
            ConditionNode::Group { definition } => {
                let mut children = Vec::with_capacity(definition.conditions.len());
                for child in definition.conditions {
                    children.push(Condition::try_from(child)?);
                }
                match definition.logic.as_str() {
                    "and" => Ok(Condition::and(children)),
                    "or" => Ok(Condition::or(children)),
                    "not" => {
                        if children.len() != 1 {
                            return Err(RuleParseError::NotArity(children.len()));
                        }
                        Ok(Condition::not(children.into_iter().next().expect("len checked above")))
                    }
                    other => Err(RuleParseError::UnknownLogic(other.to_string())),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConsequenceDoc {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    detail: serde_json::Value,
}

impl From<ConsequenceDoc> for Consequence {
    fn from(doc: ConsequenceDoc) -> Self {
        Consequence { id: doc.id, kind: doc.kind, detail: Value::from(doc.detail) }
    }
}

#[derive(Debug, Deserialize)]
struct RuleDoc {
    condition: ConditionNode,
    #[serde(default)]
    consequences: Vec<ConsequenceDoc>,
}

#[derive(Debug, Deserialize)]
struct RuleSetDoc {
    #[allow(dead_code)]
    version: u32,
    rules: Vec<RuleDoc>,
}

/// Parses a rule document's bytes into the ordered rule list the engine
/// evaluates. Rules are returned in document order, matching §4.4's "for
/// each rule, in order" evaluation requirement.
pub fn parse_rule_document(bytes: &[u8]) -> Result<Vec<Rule>, RuleParseError> {
    let doc: RuleSetDoc = serde_json::from_slice(bytes)?;
    doc.rules
        .into_iter()
        .map(|rule_doc| {
            Ok(Rule {
                condition: Condition::try_from(rule_doc.condition)?,
                consequences: rule_doc.consequences.into_iter().map(Consequence::from).collect(),
            })
        })
        .collect()
}
