//! Comparison predicates over JSON values.

use std::cmp::Ordering;

use apiflow_types::assertion::AssertKind;
use serde_json::{Number, Value};

use super::AssertionError;
use super::path::Segment;

/// A predicate's expected value, coerced from its literal text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl Literal {
    /// Coerce in precedence order: int, float, bool, string.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if let Ok(i) = text.parse::<i64>() {
            return Literal::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Literal::Float(f);
            }
        }
        match text {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ => Literal::String(raw.to_string()),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Exact comparison when both sides are integers, `f64` otherwise.
fn cmp_number(n: &Number, expected: &Literal) -> Option<Ordering> {
    if let Literal::Int(e) = expected {
        if let Some(a) = n.as_i64() {
            return Some(a.cmp(e));
        }
        if n.as_u64().is_some() {
            // Only u64 values above i64::MAX get here.
            return Some(Ordering::Greater);
        }
    }
    n.as_f64()?.partial_cmp(&expected.as_f64()?)
}

fn equals(actual: &Value, expected: &Literal, raw: &str) -> bool {
    match (actual, expected) {
        (Value::Number(n), lit) if lit.as_f64().is_some() => cmp_number(n, lit) == Some(Ordering::Equal),
        (Value::Bool(b), Literal::Bool(e)) => b == e,
        // "1" in a response body still equals the literal 1.
        (Value::String(s), _) => s == raw.trim() || s == raw,
        (Value::Null, Literal::String(s)) => s.trim() == "null",
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Literal, raw: &str) -> Result<bool, AssertionError> {
    match actual {
        Value::String(s) => Ok(s.contains(raw)),
        Value::Array(items) => Ok(items.iter().any(|v| equals(v, expected, raw))),
        Value::Object(map) => Ok(map.contains_key(raw)),
        other => Err(AssertionError::TypeMismatch {
            kind: AssertKind::Contains,
            actual: value_kind(other),
        }),
    }
}

fn compare(kind: AssertKind, actual: &Value, expected: &Literal, raw: &str) -> Result<Ordering, AssertionError> {
    let mismatch = || AssertionError::TypeMismatch {
        kind,
        actual: value_kind(actual),
    };
    match (actual, expected.as_f64()) {
        (Value::Number(n), Some(_)) => cmp_number(n, expected).ok_or_else(mismatch),
        (Value::String(s), Some(e)) => match (s.trim().parse::<i64>(), expected) {
            (Ok(a), Literal::Int(i)) => Ok(a.cmp(i)),
            _ => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|a| a.partial_cmp(&e))
                .ok_or_else(mismatch),
        },
        (Value::String(s), None) => Ok(s.as_str().cmp(raw)),
        _ => Err(mismatch()),
    }
}

/// Apply `kind` to a single leaf value.
pub fn check_leaf(kind: AssertKind, actual: &Value, expected: &Literal, raw: &str) -> Result<bool, AssertionError> {
    match kind {
        AssertKind::Equal => Ok(equals(actual, expected, raw)),
        AssertKind::NotEqual => Ok(!equals(actual, expected, raw)),
        AssertKind::Contains => contains(actual, expected, raw),
        AssertKind::NotContains => contains(actual, expected, raw).map(|b| !b),
        AssertKind::Greater => compare(kind, actual, expected, raw).map(Ordering::is_gt),
        AssertKind::Less => compare(kind, actual, expected, raw).map(Ordering::is_lt),
        AssertKind::GreaterOrEqual => compare(kind, actual, expected, raw).map(Ordering::is_ge),
        AssertKind::LessOrEqual => compare(kind, actual, expected, raw).map(Ordering::is_le),
    }
}

/// Walk `segments` from `value` and apply the predicate at the leaf.
///
/// `walked` is the textual path consumed so far, used in error messages.
pub fn check_path(
    segments: &[Segment],
    value: &Value,
    walked: &str,
    leaf: &dyn Fn(&Value) -> Result<bool, AssertionError>,
) -> Result<bool, AssertionError> {
    let Some((head, rest)) = segments.split_first() else {
        return leaf(value);
    };
    let here = if walked.is_empty() {
        head.to_string()
    } else {
        format!("{walked}.{head}")
    };
    let missing = || AssertionError::PathNotFound(here.clone());

    match head {
        Segment::Key(k) => {
            let next = match value {
                Value::Object(map) => map.get(k),
                _ => None,
            };
            check_path(rest, next.ok_or_else(missing)?, &here, leaf)
        }
        Segment::Index(i) => {
            let next = match value {
                Value::Array(items) => items.get(*i),
                Value::Object(map) => map.get(&i.to_string()),
                _ => None,
            };
            check_path(rest, next.ok_or_else(missing)?, &here, leaf)
        }
        Segment::Any => {
            let children: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => map.values().collect(),
                _ => return Err(missing()),
            };
            let mut saw_false = false;
            let mut first_err = None;
            for child in children {
                match check_path(rest, child, &here, leaf) {
                    Ok(true) => return Ok(true),
                    Ok(false) => saw_false = true,
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            match first_err {
                Some(e) if !saw_false => Err(e),
                _ => Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_coercion_precedence() {
        assert_eq!(Literal::parse("42"), Literal::Int(42));
        assert_eq!(Literal::parse("4.5"), Literal::Float(4.5));
        assert_eq!(Literal::parse("true"), Literal::Bool(true));
        assert_eq!(Literal::parse("hello"), Literal::String("hello".into()));
        assert_eq!(Literal::parse("inf"), Literal::String("inf".into()));
    }

    #[test]
    fn numeric_equality_ignores_representation() {
        assert!(check_leaf(AssertKind::Equal, &json!(200), &Literal::parse("200"), "200").unwrap());
        assert!(check_leaf(AssertKind::Equal, &json!(2.0), &Literal::parse("2"), "2").unwrap());
        assert!(check_leaf(AssertKind::NotEqual, &json!(404), &Literal::parse("200"), "200").unwrap());
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = json!(9_007_199_254_740_993_i64);
        let lit = Literal::parse("9007199254740992");
        assert!(!check_leaf(AssertKind::Equal, &big, &lit, "9007199254740992").unwrap());
        assert!(check_leaf(AssertKind::NotEqual, &big, &lit, "9007199254740992").unwrap());
        assert!(check_leaf(AssertKind::Greater, &big, &lit, "9007199254740992").unwrap());
        let same = Literal::parse("9007199254740993");
        assert!(check_leaf(AssertKind::Equal, &big, &same, "9007199254740993").unwrap());

        let huge = json!(u64::MAX);
        assert!(!check_leaf(AssertKind::Equal, &huge, &Literal::Int(i64::MAX), "9223372036854775807").unwrap());
        assert!(check_leaf(AssertKind::Greater, &huge, &Literal::Int(i64::MAX), "9223372036854775807").unwrap());
    }

    #[test]
    fn ordering_requires_comparable_values() {
        let lit = Literal::parse("500");
        assert!(check_leaf(AssertKind::Less, &json!(200), &lit, "500").unwrap());
        assert!(check_leaf(AssertKind::GreaterOrEqual, &json!(500), &lit, "500").unwrap());
        assert!(matches!(
            check_leaf(AssertKind::Greater, &json!({"a": 1}), &lit, "500"),
            Err(AssertionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn contains_on_strings_arrays_and_maps() {
        let lit = Literal::parse("ok");
        assert!(check_leaf(AssertKind::Contains, &json!("all ok"), &lit, "ok").unwrap());
        assert!(check_leaf(AssertKind::Contains, &json!(["ok", "no"]), &lit, "ok").unwrap());
        assert!(check_leaf(AssertKind::Contains, &json!({"ok": 1}), &lit, "ok").unwrap());
        assert!(check_leaf(AssertKind::NotContains, &json!("nope"), &lit, "ok").unwrap());
    }

    fn eq(raw: &'static str) -> impl Fn(&Value) -> Result<bool, AssertionError> {
        move |v| check_leaf(AssertKind::Equal, v, &Literal::parse(raw), raw)
    }

    #[test]
    fn any_matches_one_element() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}]});
        let path = super::super::path::parse("items.any.id").unwrap();
        assert!(check_path(&path, &doc, "", &eq("2")).unwrap());
        assert!(!check_path(&path, &doc, "", &eq("3")).unwrap());
    }

    #[test]
    fn any_over_empty_collection_is_false() {
        let doc = json!({"items": []});
        let path = super::super::path::parse("items.any.id").unwrap();
        assert!(!check_path(&path, &doc, "", &eq("1")).unwrap());
    }

    #[test]
    fn any_surfaces_error_when_no_element_is_comparable() {
        let doc = json!({"items": [{"x": 1}]});
        let path = super::super::path::parse("items.any.id").unwrap();
        assert!(matches!(
            check_path(&path, &doc, "", &eq("1")),
            Err(AssertionError::PathNotFound(_))
        ));
    }

    #[test]
    fn missing_path_is_an_error_not_false() {
        let doc = json!({"a": {"b": 1}});
        let path = super::super::path::parse("a.c").unwrap();
        match check_path(&path, &doc, "", &eq("1")) {
            Err(AssertionError::PathNotFound(p)) => assert_eq!(p, "a.c"),
            other => panic!("expected PathNotFound, got {other:?}"),
        }
    }
}
