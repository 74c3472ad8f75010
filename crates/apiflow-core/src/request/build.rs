//! Turning an example's effective rows into a dispatchable request.

use apiflow_types::collection::BodyKind;
use apiflow_types::error::{CodedError, ErrorCode};
use apiflow_types::http::{HttpRequest, RequestBody};
use apiflow_types::overlay::KeyValueFields;
use serde_json::{Map, Value};
use http::Method;
use url::{ParseError, Url};

/// Everything needed to build a request, after delta inheritance and
/// overlay resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExample {
    pub method: String,
    pub url: String,
    pub headers: Vec<KeyValueFields>,
    pub queries: Vec<KeyValueFields>,
    pub body: ResolvedBody,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResolvedBody {
    #[default]
    None,
    Raw(Vec<u8>),
    Form(Vec<KeyValueFields>),
    UrlEncoded(Vec<KeyValueFields>),
}

impl ResolvedBody {
    pub fn kind(&self) -> BodyKind {
        match self {
            ResolvedBody::None => BodyKind::None,
            ResolvedBody::Raw(_) => BodyKind::Raw,
            ResolvedBody::Form(_) => BodyKind::Form,
            ResolvedBody::UrlEncoded(_) => BodyKind::UrlEncoded,
        }
    }
}

/// Values available to `{{ name }}` placeholders. Earlier layers win.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    layers: Vec<Map<String, Value>>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: Map<String, Value>) -> Self {
        self.layers.push(layer);
        self
    }

    /// Exact key first, then a dotted walk (`login.response.body.token`).
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.layers
            .iter()
            .find_map(|l| l.get(name).cloned().or_else(|| walk_dotted(l, name)))
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
    }

    /// Replace every `{{ name }}` with its value. Unknown names are left
    /// untouched so the failure shows up in the request itself.
    pub fn apply(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            let name = rest[open + 2..open + 2 + close].trim();
            out.push_str(&rest[..open]);
            match self.lookup(name) {
                Some(value) if !name.is_empty() => out.push_str(&value),
                _ => out.push_str(&rest[open..open + close + 4]),
            }
            rest = &rest[open + close + 4..];
        }
        out.push_str(rest);
        out
    }
}

fn walk_dotted(layer: &Map<String, Value>, name: &str) -> Option<Value> {
    let mut parts = name.split('.');
    let mut current = layer.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Trim and upper-case `method`, rejecting anything that is not an HTTP
/// token. An empty method stays empty.
pub fn normalize_method(method: &str) -> Result<String, CodedError> {
    let method = method.trim().to_ascii_uppercase();
    if method.is_empty() {
        return Ok(method);
    }
    Method::from_bytes(method.as_bytes())
        .map(|m| m.as_str().to_string())
        .map_err(|_| {
            CodedError::new(ErrorCode::InvalidMethod, format!("invalid HTTP method \"{method}\""))
                .with_detail(method.as_str())
        })
}

/// Reject URLs the HTTP client could not dispatch, with a taxonomy code.
pub fn validate_url(url: &str) -> Result<(), CodedError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CodedError::new(ErrorCode::InvalidUrl, "URL is empty"));
    }
    let parsed = Url::parse(url).map_err(|e| {
        let err = CodedError::new(ErrorCode::InvalidUrl, format!("URL '{url}': {e}"));
        match e {
            ParseError::InvalidPort => err.with_detail(port_text(url)),
            _ => err,
        }
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        _ => {
            let scheme = url.split_once(':').map_or(parsed.scheme(), |(s, _)| s);
            return Err(
                CodedError::new(ErrorCode::UnsupportedScheme, format!("unsupported protocol scheme \"{scheme}\""))
                    .with_detail(scheme),
            );
        }
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(CodedError::new(ErrorCode::InvalidUrl, format!("URL '{url}' has no host")));
    }
    Ok(())
}

/// The text after the last `:` in the authority, for port errors.
fn port_text(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    authority.rsplit_once(':').map(|(_, p)| p.to_string()).unwrap_or_default()
}

/// Append enabled query rows to `url`, keeping any query string it already has.
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }
    let (base, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    let sep = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };
    let mut out = format!("{base}{sep}{}", encoded.join("&"));
    if let Some(f) = fragment {
        out.push('#');
        out.push_str(f);
    }
    out
}

fn enabled_pairs(rows: &[KeyValueFields], subs: &Substitutions) -> Vec<(String, String)> {
    rows.iter()
        .filter(|r| r.enabled && !r.key.is_empty())
        .map(|r| (subs.apply(&r.key), subs.apply(&r.value)))
        .collect()
}

/// Build the wire request: substitute placeholders, drop disabled rows,
/// append queries, validate the final URL.
pub fn build_request(example: &ResolvedExample, subs: &Substitutions) -> Result<HttpRequest, CodedError> {
    let base = subs.apply(example.url.trim());
    let url = append_query(&base, &enabled_pairs(&example.queries, subs));
    let method = normalize_method(&example.method).map_err(|e| e.with_request(example.method.trim(), &url))?;
    let method = if method.is_empty() { "GET".to_string() } else { method };

    validate_url(&url).map_err(|e| e.with_request(&method, &url))?;

    let body = match &example.body {
        ResolvedBody::None => RequestBody::Empty,
        ResolvedBody::Raw(data) => match std::str::from_utf8(data) {
            Ok(text) => RequestBody::Raw {
                data: subs.apply(text).into_bytes(),
            },
            Err(_) => RequestBody::Raw { data: data.clone() },
        },
        ResolvedBody::Form(rows) => RequestBody::Multipart {
            fields: enabled_pairs(rows, subs),
        },
        ResolvedBody::UrlEncoded(rows) => RequestBody::UrlEncoded {
            fields: enabled_pairs(rows, subs),
        },
    };

    Ok(HttpRequest {
        method,
        url,
        headers: enabled_pairs(&example.headers, subs),
        body,
    })
}
