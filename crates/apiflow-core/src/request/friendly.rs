//! User-facing rendering of classified errors.

use apiflow_types::error::{CodedError, ErrorCode};
use url::Url;

const KNOWN_SCHEMES: [&str; 2] = ["http", "https"];

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

/// The supported scheme closest to `scheme`, if it looks like a typo.
pub fn suggest_scheme(scheme: &str) -> Option<&'static str> {
    let lower = scheme.to_ascii_lowercase();
    KNOWN_SCHEMES
        .iter()
        .map(|s| (*s, edit_distance(&lower, s)))
        .filter(|(_, d)| *d <= 1)
        .min_by_key(|(s, d)| (*d, std::cmp::Reverse(s.len())))
        .map(|(s, _)| s)
}

fn host_of(err: &CodedError) -> Option<String> {
    let url = Url::parse(&err.request.as_ref()?.url).ok()?;
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// One or two sentences a user can act on.
pub fn friendly_message(err: &CodedError) -> String {
    let host = host_of(err)
        .or_else(|| err.detail.clone())
        .unwrap_or_else(|| "the server".to_string());

    match err.code {
        ErrorCode::UnsupportedScheme => {
            let scheme = err.detail.as_deref().unwrap_or("unknown");
            match suggest_scheme(scheme) {
                Some(s) => format!(
                    "Unsupported URL scheme '{scheme}'. Did you mean '{s}'? Only http and https are supported."
                ),
                None => format!("Unsupported URL scheme '{scheme}'. Only http and https are supported."),
            }
        }
        ErrorCode::InvalidUrl => format!("The URL is not valid: {}.", err.message),
        ErrorCode::InvalidMethod => format!(
            "'{}' is not a valid HTTP method.",
            err.detail.as_deref().unwrap_or_default()
        ),
        ErrorCode::DnsError => format!("Could not resolve host '{host}'. Check the hostname and your DNS settings."),
        ErrorCode::ConnectionRefused => {
            format!("Connection to {host} was refused. Is the server running and listening on that port?")
        }
        ErrorCode::ConnectionReset => format!("Connection to {host} was reset by the peer. Try again."),
        ErrorCode::NetworkUnreachable => "The network is unreachable. Check your connection.".to_string(),
        ErrorCode::Timeout => format!("The request to {host} timed out."),
        ErrorCode::TlsUnknownAuthority => {
            format!("The certificate presented by {host} is signed by an unknown authority.")
        }
        ErrorCode::TlsHostnameMismatch => format!("The certificate presented by {host} does not match its hostname."),
        ErrorCode::TlsHandshake => format!("The TLS handshake with {host} failed."),
        ErrorCode::Canceled => "The request was canceled.".to_string(),
        ErrorCode::ExpressionSyntax => format!("The expression has a syntax error: {}", err.message),
        ErrorCode::ExpressionRuntime => format!("The expression could not be evaluated: {}", err.message),
        ErrorCode::IoError => format!("An I/O error occurred: {}", err.message),
        ErrorCode::Unexpected => format!("An unexpected error occurred: {}", err.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::build::validate_url;

    #[test]
    fn typo_scheme_suggests_https() {
        let err = validate_url("htps://google.com")
            .unwrap_err()
            .with_request("GET", "htps://google.com");
        let msg = friendly_message(&err);
        assert!(msg.contains("Unsupported URL scheme 'htps'"), "{msg}");
        assert!(msg.contains("https"), "{msg}");
    }

    #[test]
    fn far_scheme_gets_no_suggestion() {
        assert_eq!(suggest_scheme("ftp"), None);
        assert_eq!(suggest_scheme("htp"), Some("http"));
        assert_eq!(suggest_scheme("HTTPS"), Some("https"));
    }

    #[test]
    fn network_messages_name_the_host() {
        let err = CodedError::new(ErrorCode::ConnectionRefused, "connection refused")
            .with_request("GET", "http://localhost:9/x");
        assert!(friendly_message(&err).contains("localhost:9"));

        let err = CodedError::new(ErrorCode::DnsError, "no such host")
            .with_request("GET", "https://user:pw@api.example.test/v1?q=1");
        let msg = friendly_message(&err);
        assert!(msg.contains("'api.example.test'"), "{msg}");
    }
}
