//! JEXL evaluator for boolean conditions and iteration paths.
//!
//! Wraps `jexl_eval::Evaluator` with a small set of string transforms.
//! Runtime values are always passed as the context object and never
//! interpolated into the expression text.

use apiflow_types::error::{CodedError, ErrorCode};
use jexl_eval::error::EvaluationError;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression syntax error: {0}")]
    Syntax(String),

    #[error("expression evaluation failed: {0}")]
    Runtime(String),

    #[error("invalid context: {0}")]
    InvalidContext(String),
}

impl ExpressionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ExpressionError::Syntax(_) => ErrorCode::ExpressionSyntax,
            ExpressionError::Runtime(_) | ExpressionError::InvalidContext(_) => {
                ErrorCode::ExpressionRuntime
            }
        }
    }
}

impl From<ExpressionError> for CodedError {
    fn from(err: ExpressionError) -> Self {
        CodedError::new(err.code(), err.to_string())
    }
}

pub struct ExpressionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

fn str_arg(args: &[Value], i: usize) -> &str {
    args.get(i).and_then(|v| v.as_str()).unwrap_or("")
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| Ok(json!(str_arg(args, 0).to_lowercase())))
            .with_transform("upper", |args: &[Value]| Ok(json!(str_arg(args, 0).to_uppercase())))
            .with_transform("trim", |args: &[Value]| Ok(json!(str_arg(args, 0).trim())))
            .with_transform("split", |args: &[Value]| {
                let delimiter = args.get(1).and_then(|v| v.as_str()).unwrap_or(",");
                let parts: Vec<&str> = str_arg(args, 0).split(delimiter).collect();
                Ok(json!(parts))
            })
            .with_transform("not", |args: &[Value]| {
                Ok(json!(!truthy(args.first().unwrap_or(&Value::Null))))
            })
            .with_transform("contains", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).contains(str_arg(args, 1))))
            })
            .with_transform("startsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).starts_with(str_arg(args, 1))))
            })
            .with_transform("endsWith", |args: &[Value]| {
                Ok(json!(str_arg(args, 0).ends_with(str_arg(args, 1))))
            })
            .with_transform("length", |args: &[Value]| {
                let len = match args.first() {
                    Some(Value::String(s)) => s.chars().count(),
                    Some(Value::Array(a)) => a.len(),
                    Some(Value::Object(o)) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("keys", |args: &[Value]| match args.first() {
                Some(Value::Object(o)) => Ok(json!(o.keys().collect::<Vec<_>>())),
                _ => Ok(json!([])),
            })
            .with_transform("number", |args: &[Value]| {
                let n = match args.first() {
                    Some(Value::Number(n)) => n.as_f64(),
                    Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                    Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
                    _ => None,
                };
                Ok(n.map(|n| json!(n)).unwrap_or(Value::Null))
            });

        Self { evaluator }
    }

    /// Evaluate `expression` and coerce the result with JavaScript-like
    /// truthiness.
    pub fn evaluate_bool(&self, expression: &str, context: &Value) -> Result<bool, ExpressionError> {
        self.evaluate_value(expression, context).map(|v| truthy(&v))
    }

    /// Evaluate `expression` and return the raw result.
    pub fn evaluate_value(&self, expression: &str, context: &Value) -> Result<Value, ExpressionError> {
        if !context.is_object() {
            return Err(ExpressionError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }
        check_syntax(expression)?;

        // jexl parses every numeric literal as a float; match that in the
        // context so `a == 1` holds when `a` was stored as an integer.
        let context = normalize_numbers(context);
        self.evaluator
            .eval_in_context(expression, &context)
            .map_err(classify)
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn normalize_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) if !n.is_f64() => n.as_f64().map(|f| json!(f)).unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize_numbers(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn classify(err: EvaluationError<'_>) -> ExpressionError {
    let message = err.to_string();
    match err {
        EvaluationError::ParseError(_) | EvaluationError::DuplicateObjectKey(_) => ExpressionError::Syntax(message),
        EvaluationError::InvalidContext => ExpressionError::InvalidContext(message),
        _ => ExpressionError::Runtime(message),
    }
}

/// Cheap structural checks that the parser would reject anyway, run first
/// so the error text points at the actual problem.
fn check_syntax(expression: &str) -> Result<(), ExpressionError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ExpressionError::Syntax("empty expression".into()));
    }

    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in trimmed.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(ExpressionError::Syntax(format!("unbalanced '{c}'")));
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(ExpressionError::Syntax("unterminated string literal".into()));
    }
    if let Some(open) = stack.pop() {
        return Err(ExpressionError::Syntax(format!("unclosed '{open}'")));
    }

    const TRAILING: [&str; 13] = [
        "==", "!=", ">=", "<=", "&&", "||", ">", "<", "+", "-", "*", "/", "|",
    ];
    if let Some(op) = TRAILING.iter().find(|op| trimmed.ends_with(**op)) {
        return Err(ExpressionError::Syntax(format!("dangling operator '{op}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval() -> ExpressionEvaluator {
        ExpressionEvaluator::new()
    }

    #[test]
    fn integer_variables_compare_with_literals() {
        let ctx = json!({ "a": 1 });
        assert!(eval().evaluate_bool("a == 1", &ctx).unwrap());
        assert!(!eval().evaluate_bool("a == 2", &ctx).unwrap());
    }

    #[test]
    fn nested_response_fields() {
        let ctx = json!({ "response": { "status": 201, "body": { "ok": true } } });
        assert!(eval().evaluate_bool("response.status < 500", &ctx).unwrap());
        assert!(eval().evaluate_bool("response.body.ok == true", &ctx).unwrap());
    }

    #[test]
    fn transforms() {
        let ctx = json!({ "name": "  Hello World  ", "items": [1, 2, 3] });
        assert_eq!(eval().evaluate_value("name|trim|lower", &ctx).unwrap(), json!("hello world"));
        assert!(eval().evaluate_bool("items|length > 2", &ctx).unwrap());
        assert!(eval().evaluate_bool("name|contains('World')", &ctx).unwrap());
    }

    #[test]
    fn value_lookup_returns_structures() {
        let ctx = json!({ "var": { "hash": { "a": "va" } } });
        assert_eq!(eval().evaluate_value("var.hash", &ctx).unwrap(), json!({ "a": "va" }));
    }

    #[test]
    fn missing_property_is_null_and_falsy() {
        let ctx = json!({ "event": {} });
        assert_eq!(eval().evaluate_value("event.nothing", &ctx).unwrap(), Value::Null);
        assert!(!eval().evaluate_bool("event.nothing", &ctx).unwrap());
    }

    #[test]
    fn syntax_errors_are_classified() {
        let ctx = json!({ "a": 1 });
        for bad in ["", "a ==", "(a == 1", "a == 'x", "a == 1)"] {
            let err = eval().evaluate_bool(bad, &ctx).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ExpressionSyntax, "{bad:?} gave {err}");
        }
    }

    #[test]
    fn runtime_errors_are_classified() {
        let ctx = json!({ "a": "x" });
        let err = eval().evaluate_bool("a|nosuch", &ctx).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ExpressionRuntime);

        // The transform name must not make this look like a parse failure.
        let err = eval().evaluate_bool("a|parse", &ctx).unwrap_err();
        assert!(matches!(err, ExpressionError::Runtime(_)), "{err}");
    }

    #[test]
    fn parser_rejections_are_syntax_errors() {
        let err = eval().evaluate_bool("a b", &json!({ "a": 1, "b": 2 })).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax(_)), "{err}");
    }

    #[test]
    fn context_must_be_object() {
        assert!(matches!(
            eval().evaluate_bool("true", &json!("nope")),
            Err(ExpressionError::InvalidContext(_))
        ));
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!("x")));
    }
}
