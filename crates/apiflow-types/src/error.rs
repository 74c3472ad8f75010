use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from repository operations (used by trait definitions in apiflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    Invalid(String),
}

/// Normalised failure codes shared by the request executor, the flow
/// runtime and the user-facing renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Canceled,
    Timeout,
    DnsError,
    InvalidUrl,
    InvalidMethod,
    UnsupportedScheme,
    ConnectionRefused,
    ConnectionReset,
    NetworkUnreachable,
    TlsUnknownAuthority,
    TlsHostnameMismatch,
    TlsHandshake,
    IoError,
    ExpressionSyntax,
    ExpressionRuntime,
    Unexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Canceled => "canceled",
            ErrorCode::Timeout => "timeout",
            ErrorCode::DnsError => "dns_error",
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::InvalidMethod => "invalid_method",
            ErrorCode::UnsupportedScheme => "unsupported_scheme",
            ErrorCode::ConnectionRefused => "connection_refused",
            ErrorCode::ConnectionReset => "connection_reset",
            ErrorCode::NetworkUnreachable => "network_unreachable",
            ErrorCode::TlsUnknownAuthority => "tls_unknown_authority",
            ErrorCode::TlsHostnameMismatch => "tls_hostname_mismatch",
            ErrorCode::TlsHandshake => "tls_handshake",
            ErrorCode::IoError => "io_error",
            ErrorCode::ExpressionSyntax => "expression_syntax",
            ErrorCode::ExpressionRuntime => "expression_runtime",
            ErrorCode::Unexpected => "unexpected",
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout
                | ErrorCode::DnsError
                | ErrorCode::ConnectionRefused
                | ErrorCode::ConnectionReset
                | ErrorCode::NetworkUnreachable
                | ErrorCode::IoError
        )
    }

    /// Whether the condition is expected to clear on its own.
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::ConnectionReset | ErrorCode::NetworkUnreachable
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method and URL of the request an error belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
}

/// A classified failure.
///
/// `message` is the raw technical description; the user-facing text is
/// produced separately from `code` and `detail`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    pub temporary: bool,
    pub request: Option<RequestContext>,
    /// Code-specific detail such as the offending scheme or host.
    pub detail: Option<String>,
    /// Display form of the underlying error.
    pub cause: Option<String>,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
            temporary: code.is_temporary(),
            request: None,
            detail: None,
            cause: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_request(mut self, method: impl Into<String>, url: impl Into<String>) -> Self {
        self.request = Some(RequestContext {
            method: method.into(),
            url: url.into(),
        });
        self
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCode::Canceled, "operation canceled")
    }
}
