//! Dotted paths into a runtime value tree.
//!
//! `response.body.items[0].id`, `response.body.items.0.id` and
//! `response.body.items.any.id` are all accepted. `any` (or `[*]`) fans
//! out over every element of an array or every value of a map.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
    Any,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "[{i}]"),
            Segment::Any => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("empty segment at byte {0}")]
    EmptySegment(usize),

    #[error("unterminated '[' at byte {0}")]
    Unterminated(usize),

    #[error("invalid index '{0}'")]
    InvalidIndex(String),
}

fn word(text: &str) -> Segment {
    if text == "any" || text == "*" {
        Segment::Any
    } else if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        match text.parse() {
            Ok(i) => Segment::Index(i),
            Err(_) => Segment::Key(text.to_string()),
        }
    } else {
        Segment::Key(text.to_string())
    }
}

/// Split a path into segments.
pub fn parse(path: &str) -> Result<Vec<Segment>, PathError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;
    // Set after a `]` so `a[0].b` does not see an empty segment before `.b`.
    let mut after_bracket = false;

    while i < bytes.len() {
        match bytes[i] {
            b'.' => {
                if i == start {
                    if !after_bracket {
                        return Err(PathError::EmptySegment(i));
                    }
                } else {
                    segments.push(word(&path[start..i]));
                }
                after_bracket = false;
                i += 1;
                start = i;
            }
            b'[' => {
                if i > start {
                    segments.push(word(&path[start..i]));
                } else if i == 0 && segments.is_empty() {
                    // A leading bracket indexes the root.
                } else if !after_bracket {
                    return Err(PathError::EmptySegment(i));
                }
                let close = path[i..]
                    .find(']')
                    .map(|off| i + off)
                    .ok_or(PathError::Unterminated(i))?;
                let inner = path[i + 1..close].trim().trim_matches(['"', '\'']);
                let seg = match inner {
                    "*" | "any" => Segment::Any,
                    _ if inner.bytes().all(|b| b.is_ascii_digit()) && !inner.is_empty() => {
                        Segment::Index(
                            inner
                                .parse()
                                .map_err(|_| PathError::InvalidIndex(inner.to_string()))?,
                        )
                    }
                    _ if path[i + 1..close].trim().starts_with(['"', '\'']) => {
                        Segment::Key(inner.to_string())
                    }
                    _ => return Err(PathError::InvalidIndex(inner.to_string())),
                };
                segments.push(seg);
                after_bracket = true;
                i = close + 1;
                start = i;
            }
            _ => {
                if after_bracket {
                    return Err(PathError::EmptySegment(i));
                }
                i += 1;
            }
        }
    }

    if start < bytes.len() {
        segments.push(word(&path[start..]));
    } else if !after_bracket {
        return Err(PathError::EmptySegment(bytes.len()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Segment {
        Segment::Key(k.into())
    }

    #[test]
    fn dotted_keys_and_indices() {
        assert_eq!(
            parse("response.body.items.0.id").unwrap(),
            vec![key("response"), key("body"), key("items"), Segment::Index(0), key("id")]
        );
    }

    #[test]
    fn bracketed_indices() {
        assert_eq!(
            parse("items[2].name").unwrap(),
            vec![key("items"), Segment::Index(2), key("name")]
        );
        assert_eq!(parse("m[1][0]").unwrap(), vec![key("m"), Segment::Index(1), Segment::Index(0)]);
    }

    #[test]
    fn quoted_bracket_keys() {
        assert_eq!(
            parse("headers['content-type']").unwrap(),
            vec![key("headers"), key("content-type")]
        );
    }

    #[test]
    fn any_segment_forms() {
        assert_eq!(parse("items.any.ok").unwrap()[1], Segment::Any);
        assert_eq!(parse("items[*].ok").unwrap()[1], Segment::Any);
    }

    #[test]
    fn malformed_paths() {
        assert_eq!(parse(""), Err(PathError::Empty));
        assert!(matches!(parse("a..b"), Err(PathError::EmptySegment(_))));
        assert!(matches!(parse("a."), Err(PathError::EmptySegment(_))));
        assert!(matches!(parse("a[0"), Err(PathError::Unterminated(_))));
        assert!(matches!(parse("a[x]"), Err(PathError::InvalidIndex(_))));
    }
}
