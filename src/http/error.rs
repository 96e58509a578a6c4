//! Transport-level failures with status-aware classification.

use reqwest::StatusCode;

/// What went wrong below the envelope layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request timed out
    Timeout,
    /// The connection could not be established (DNS, refused, TLS)
    Connect,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// HTTP 429
    TooManyRequests,
    /// Other 4xx statuses
    ClientError(u16),
    /// 5xx statuses
    ServerError(u16),
    /// Any other non-2xx status
    UnexpectedStatus(u16),
    /// The response body could not be read
    Body,
    /// The request could not be built or encoded
    Request,
}

/// A failed HTTP exchange. Never returned to callers of the verb functions;
/// it is handed to the error interceptors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub url: String,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Builds an error for a request whose parameters or body could not be encoded.
    pub fn encode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Request, url, message)
    }

    /// Classifies a reqwest error by status first, then by failure phase.
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        let kind = match error.status() {
            Some(status) => classify_status(status),
            None if error.is_timeout() => TransportErrorKind::Timeout,
            None if error.is_connect() => TransportErrorKind::Connect,
            None if error.is_body() || error.is_decode() => TransportErrorKind::Body,
            None => TransportErrorKind::Request,
        };

        let url = error
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());

        Self::new(kind, url, error.to_string())
    }

    /// The HTTP status of the failed exchange, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Unauthorized => Some(401),
            TransportErrorKind::Forbidden => Some(403),
            TransportErrorKind::NotFound => Some(404),
            TransportErrorKind::TooManyRequests => Some(429),
            TransportErrorKind::ClientError(s)
            | TransportErrorKind::ServerError(s)
            | TransportErrorKind::UnexpectedStatus(s) => Some(s),
            _ => None,
        }
    }
}

/// Maps a non-2xx status onto a [`TransportErrorKind`].
pub fn classify_status(status: StatusCode) -> TransportErrorKind {
    match status {
        StatusCode::UNAUTHORIZED => TransportErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => TransportErrorKind::Forbidden,
        StatusCode::NOT_FOUND => TransportErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => TransportErrorKind::TooManyRequests,
        s if s.is_client_error() => TransportErrorKind::ClientError(s.as_u16()),
        s if s.is_server_error() => TransportErrorKind::ServerError(s.as_u16()),
        s => TransportErrorKind::UnexpectedStatus(s.as_u16()),
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TransportErrorKind::Timeout => write!(f, "Request to {} timed out", self.url),
            TransportErrorKind::Connect => {
                write!(f, "Failed to connect to {}: {}", self.url, self.message)
            }
            TransportErrorKind::Unauthorized => {
                write!(f, "Authentication failed: {}", self.url)
            }
            TransportErrorKind::Forbidden => write!(f, "Access forbidden: {}", self.url),
            TransportErrorKind::NotFound => write!(f, "Not found: {}", self.url),
            TransportErrorKind::TooManyRequests => {
                write!(f, "Too many requests: {}", self.url)
            }
            TransportErrorKind::ClientError(s)
            | TransportErrorKind::ServerError(s)
            | TransportErrorKind::UnexpectedStatus(s) => {
                write!(f, "HTTP {} error: {}", s, self.url)
            }
            TransportErrorKind::Body => {
                write!(f, "Failed to read response from {}: {}", self.url, self.message)
            }
            TransportErrorKind::Request => {
                write!(f, "Request error for {}: {}", self.url, self.message)
            }
        }
    }
}

impl std::error::Error for TransportError {}
