//! Error types for the church API client.
//!
//! # Design
//! Every failure that reaches calling code falls into one of four buckets:
//! timeout, unreachable network, server-reported failure, or a malformed
//! response. Each bucket carries a fixed user-facing message so screens can
//! show `err.to_string()` directly. The raw transport or parser error is kept
//! as the `source()` for developer logging and never leaks into the message.
//!
//! `Unexpected` covers the remaining local failures (a payload that cannot be
//! serialized, a transport error that is not a recognized network failure).

use thiserror::Error;

pub const TIMEOUT_MESSAGE: &str =
    "Request timed out. Please check your internet connection and try again.";
pub const NETWORK_MESSAGE: &str =
    "Unable to reach the server. Please check your internet connection.";
pub const INVALID_RESPONSE_MESSAGE: &str = "Invalid JSON response from server";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Substrings that identify a transport failure that happened before any
/// HTTP response was received.
const NETWORK_FAILURE_MARKERS: &[&str] = &[
    "failed to fetch",
    "network request failed",
    "networkerror",
    "connection refused",
    "connection reset",
    "connection aborted",
    "network is unreachable",
    "dns",
    "failed to lookup address",
    "could not resolve host",
    "name or service not known",
];

/// Failure reported by a host `Transport` before it produced a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    /// Anything else the host could not classify. The message is inspected
    /// for well-known network failure wording.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether this failure means the server was never reached.
    pub fn is_network_failure(&self) -> bool {
        match self {
            TransportError::ConnectionRefused(_) | TransportError::Dns(_) => true,
            TransportError::Other(message) => {
                let message = message.to_ascii_lowercase();
                NETWORK_FAILURE_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        }
    }
}

/// Coarse classification of an `ApiError`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Timeout,
    Network,
    Server,
    InvalidResponse,
    Unexpected,
}

/// Errors returned by `ApiClient` calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request did not complete before the deadline.
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    /// The transport failed before any HTTP response arrived.
    #[error("{}", NETWORK_MESSAGE)]
    Network {
        #[source]
        source: TransportError,
    },

    /// The server answered with a non-2xx status. `message` is the server's
    /// own text when it sent one.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// A 2xx response whose body could not be decoded.
    #[error("{}", INVALID_RESPONSE_MESSAGE)]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("{}", UNEXPECTED_MESSAGE)]
    Unexpected {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApiError {
    pub fn unexpected(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        ApiError::Unexpected {
            source: Box::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Timeout => ErrorKind::Timeout,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            ApiError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// HTTP status for server-reported failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Only failures where the server was never reached may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Timeout | ApiError::Network { .. })
    }
}
