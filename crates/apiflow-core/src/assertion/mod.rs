//! Assertion evaluator.
//!
//! Predicates walk a dotted path into the runtime value tree and compare
//! the leaf with a coerced literal. Expressions are JEXL evaluated against
//! the same tree.

pub mod expression;
pub mod path;
pub mod predicate;

use apiflow_types::assertion::{AssertCondition, AssertKind, Predicate};
use apiflow_types::error::{CodedError, ErrorCode};
use serde_json::Value;

pub use expression::{ExpressionError, ExpressionEvaluator, truthy};
pub use predicate::Literal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssertionError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(#[from] path::PathError),

    #[error("cannot apply {} to a {actual} value", kind.as_str())]
    TypeMismatch { kind: AssertKind, actual: &'static str },

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl AssertionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AssertionError::Expression(e) => e.code(),
            AssertionError::InvalidPath(_) => ErrorCode::ExpressionSyntax,
            _ => ErrorCode::ExpressionRuntime,
        }
    }
}

impl From<AssertionError> for CodedError {
    fn from(err: AssertionError) -> Self {
        CodedError::new(err.code(), err.to_string())
    }
}

/// Evaluates assertion conditions; shared by request asserts, condition
/// nodes and loop break conditions.
#[derive(Default)]
pub struct AssertionEvaluator {
    expressions: ExpressionEvaluator,
}

impl AssertionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, condition: &AssertCondition, root: &Value) -> Result<bool, AssertionError> {
        match condition {
            AssertCondition::Predicate(p) => self.evaluate_predicate(p, root),
            AssertCondition::Expression { expression } => {
                Ok(self.expressions.evaluate_bool(expression, root)?)
            }
        }
    }

    pub fn evaluate_predicate(&self, predicate: &Predicate, root: &Value) -> Result<bool, AssertionError> {
        let segments = path::parse(&predicate.path)?;
        let expected = Literal::parse(&predicate.value);
        let leaf = |actual: &Value| predicate::check_leaf(predicate.kind, actual, &expected, &predicate.value);
        predicate::check_path(&segments, root, "", &leaf)
    }

    /// Evaluate an expression for its value, e.g. a for-each iteration path.
    pub fn evaluate_value(&self, expression: &str, root: &Value) -> Result<Value, AssertionError> {
        Ok(self.expressions.evaluate_value(expression, root)?)
    }

    pub fn expressions(&self) -> &ExpressionEvaluator {
        &self.expressions
    }
}
