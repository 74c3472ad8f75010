//! Assertion model: comparison predicates and boolean expressions.

use serde::{Deserialize, Serialize};

use crate::id::{AssertId, ResponseId};

/// Comparison applied by a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertKind {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
}

impl AssertKind {
    pub const ALL: [AssertKind; 8] = [
        AssertKind::Equal,
        AssertKind::NotEqual,
        AssertKind::Contains,
        AssertKind::NotContains,
        AssertKind::Greater,
        AssertKind::Less,
        AssertKind::GreaterOrEqual,
        AssertKind::LessOrEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssertKind::Equal => "equal",
            AssertKind::NotEqual => "not_equal",
            AssertKind::Contains => "contains",
            AssertKind::NotContains => "not_contains",
            AssertKind::Greater => "greater",
            AssertKind::Less => "less",
            AssertKind::GreaterOrEqual => "greater_or_equal",
            AssertKind::LessOrEqual => "less_or_equal",
        }
    }
}

impl std::str::FromStr for AssertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssertKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown assert kind: {s}"))
    }
}

/// A `(kind, path, value)` triple. `value` is kept in its literal string
/// form and coerced at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub kind: AssertKind,
    pub path: String,
    pub value: String,
}

/// What an assertion (or a condition node) checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssertCondition {
    Predicate(Predicate),
    Expression { expression: String },
}

impl AssertCondition {
    pub fn predicate(kind: AssertKind, path: impl Into<String>, value: impl Into<String>) -> Self {
        AssertCondition::Predicate(Predicate {
            kind,
            path: path.into(),
            value: value.into(),
        })
    }

    pub fn expression(expression: impl Into<String>) -> Self {
        AssertCondition::Expression {
            expression: expression.into(),
        }
    }
}

/// Outcome of one assertion against one captured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertResult {
    pub response_id: ResponseId,
    pub assert_id: AssertId,
    pub result: bool,
    /// Set when the assertion could not be evaluated (missing path, bad
    /// expression). `result` is false in that case.
    pub error: Option<String>,
}
