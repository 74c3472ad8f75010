//! Mapping transport failures into the error taxonomy.
//!
//! The HTTP client reports which phase failed; the error's source chain
//! refines that into a specific code.

use std::error::Error as StdError;
use std::io;

use apiflow_types::error::{CodedError, ErrorCode};

fn from_io_kind(kind: io::ErrorKind) -> Option<ErrorCode> {
    match kind {
        io::ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
            Some(ErrorCode::ConnectionReset)
        }
        io::ErrorKind::TimedOut => Some(ErrorCode::Timeout),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => Some(ErrorCode::NetworkUnreachable),
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::NotConnected => Some(ErrorCode::IoError),
        _ => None,
    }
}

fn from_message(message: &str) -> Option<ErrorCode> {
    let m = message.to_ascii_lowercase();
    let has = |needle: &str| m.contains(needle);

    if has("unknownissuer") || has("unknown issuer") || has("unknown authority") || has("self signed") || has("self-signed") {
        Some(ErrorCode::TlsUnknownAuthority)
    } else if has("notvalidforname") || has("hostname mismatch") || has("not valid for name") || has("certificate is not valid for") {
        Some(ErrorCode::TlsHostnameMismatch)
    } else if has("certificate") || has("handshake") || has("tls") || has("ssl") {
        Some(ErrorCode::TlsHandshake)
    } else if has("dns") || has("failed to lookup address") || has("name or service not known") || has("no such host") || has("nodename nor servname") {
        Some(ErrorCode::DnsError)
    } else if has("connection refused") {
        Some(ErrorCode::ConnectionRefused)
    } else if has("connection reset") || has("broken pipe") || has("connection closed") {
        Some(ErrorCode::ConnectionReset)
    } else if has("network is unreachable") || has("no route to host") {
        Some(ErrorCode::NetworkUnreachable)
    } else if has("timed out") || has("deadline") || has("timeout") {
        Some(ErrorCode::Timeout)
    } else if has("unsupported scheme") || has("unsupported protocol") || has("url scheme is not allowed") {
        Some(ErrorCode::UnsupportedScheme)
    } else if has("builder error") || has("relative url") || has("invalid url") || has("empty host") {
        Some(ErrorCode::InvalidUrl)
    } else {
        None
    }
}

/// Where in the exchange a transport error was raised, as reported by the
/// HTTP client's own error predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPhase {
    Timeout,
    Builder,
    Connect,
    Redirect,
    Request,
    Body,
    Unknown,
}

/// Most specific code the source chain supports: typed `io::Error` kinds
/// first, message heuristics second.
fn refine(err: &(dyn StdError + 'static)) -> (Option<ErrorCode>, String) {
    let mut code = None;
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    let mut messages = Vec::new();
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            code = code.or_else(|| from_io_kind(io.kind()));
        }
        messages.push(e.to_string());
        current = e.source();
    }
    let code = code.or_else(|| messages.iter().rev().find_map(|m| from_message(m)));
    (code, messages.join(": "))
}

/// Classify an error with no client-reported phase.
pub fn classify_error(err: &(dyn StdError + 'static)) -> CodedError {
    classify_transport_error(TransportPhase::Unknown, err)
}

/// Classify a transport error. The phase decides the code; the source
/// chain only narrows it within that phase.
pub fn classify_transport_error(phase: TransportPhase, err: &(dyn StdError + 'static)) -> CodedError {
    let (refined, message) = refine(err);
    let code = match phase {
        TransportPhase::Timeout => ErrorCode::Timeout,
        TransportPhase::Builder => refined
            .filter(|c| matches!(c, ErrorCode::InvalidUrl | ErrorCode::UnsupportedScheme))
            .unwrap_or(ErrorCode::InvalidUrl),
        TransportPhase::Connect => refined
            .filter(|c| !matches!(c, ErrorCode::InvalidUrl | ErrorCode::UnsupportedScheme))
            .unwrap_or(ErrorCode::IoError),
        TransportPhase::Redirect => ErrorCode::Unexpected,
        TransportPhase::Request | TransportPhase::Body => refined.unwrap_or(ErrorCode::IoError),
        TransportPhase::Unknown => refined.unwrap_or(ErrorCode::Unexpected),
    };
    CodedError::new(code, message).with_cause(err)
}

/// [`classify_transport_error`] annotated with the request that failed.
pub fn classify_request_error(
    phase: TransportPhase,
    err: &(dyn StdError + 'static),
    method: &str,
    url: &str,
) -> CodedError {
    classify_transport_error(phase, err).with_request(method, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("error sending request")]
    struct Outer(#[source] io::Error);

    #[test]
    fn io_kind_in_source_chain_wins() {
        let err = Outer(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let coded = classify_request_error(TransportPhase::Connect, &err, "GET", "http://localhost:1");
        assert_eq!(coded.code, ErrorCode::ConnectionRefused);
        assert!(coded.retryable);
        assert_eq!(coded.request.unwrap().url, "http://localhost:1");
    }

    #[test]
    fn message_heuristics() {
        let cases = [
            ("dns error: failed to lookup address information", ErrorCode::DnsError),
            ("invalid peer certificate: UnknownIssuer", ErrorCode::TlsUnknownAuthority),
            ("invalid peer certificate: NotValidForName", ErrorCode::TlsHostnameMismatch),
            ("received fatal alert: HandshakeFailure", ErrorCode::TlsHandshake),
            ("operation timed out", ErrorCode::Timeout),
            ("something odd", ErrorCode::Unexpected),
        ];
        for (msg, code) in cases {
            let err = io::Error::other(msg);
            assert_eq!(classify_error(&err).code, code, "{msg}");
        }
    }

    #[test]
    fn phase_decides_when_the_chain_says_nothing() {
        let err = Outer(io::Error::other("hyper_util::client::legacy::Error(Connect, ..)"));
        assert_eq!(classify_transport_error(TransportPhase::Connect, &err).code, ErrorCode::IoError);
        assert_eq!(classify_transport_error(TransportPhase::Timeout, &err).code, ErrorCode::Timeout);
        assert_eq!(classify_transport_error(TransportPhase::Builder, &err).code, ErrorCode::InvalidUrl);
        assert_eq!(classify_transport_error(TransportPhase::Unknown, &err).code, ErrorCode::Unexpected);
    }

    #[test]
    fn timeout_phase_wins_over_a_reset_in_the_chain() {
        let err = Outer(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(classify_transport_error(TransportPhase::Timeout, &err).code, ErrorCode::Timeout);
        assert_eq!(classify_transport_error(TransportPhase::Body, &err).code, ErrorCode::ConnectionReset);
    }

    #[test]
    fn connect_phase_is_narrowed_by_dns_text() {
        let err = Outer(io::Error::other("dns error: failed to lookup address information"));
        assert_eq!(classify_transport_error(TransportPhase::Connect, &err).code, ErrorCode::DnsError);
    }
}
