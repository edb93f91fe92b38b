use serde_json::Value as JsonValue;

/// Failure classification of an [`ApiError`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Timeout,
    NetworkFailure,
    MalformedResponse,
    HttpStatus,
    Conflict,
    InvalidRequest,
}

/// Terminal error returned by this crate.
///
/// Retryable failures are resolved inside the executor; a caller only ever
/// sees the classification of the last attempt.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Every attempt hit the per-attempt deadline.
    #[error("{message}")]
    Timeout {
        message: String,
        /// Number of physical attempts made.
        attempts: usize,
        retries_exhausted: bool,
    },
    /// The server could not be reached or the connection broke mid-call.
    #[error("network failure: {message}")]
    Network {
        message: String,
        attempts: usize,
        retries_exhausted: bool,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// Response could not be read as the JSON the API promises.
    #[error("malformed response (HTTP {status}): {message}")]
    MalformedResponse { status: u16, message: String },
    /// Non-success HTTP status other than 409.
    #[error("http error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// JSON error body echoed by the server, if any.
        payload: Option<JsonValue>,
    },
    /// 409 Conflict, usually carrying a reason and a suggested action.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        payload: Option<JsonValue>,
    },
    /// Rejected before any network attempt.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::NetworkFailure,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Http { .. } => ErrorKind::HttpStatus,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// HTTP status, present for `Http` and `Conflict` errors.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Conflict { .. } => Some(409),
            _ => None,
        }
    }

    /// Human-readable message without the classification prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout { message, .. }
            | Self::Network { message, .. }
            | Self::MalformedResponse { message, .. }
            | Self::Http { message, .. }
            | Self::Conflict { message, .. } => message,
            Self::InvalidRequest(message) => message,
        }
    }

    /// Structured error body returned by the server.
    pub fn server_payload(&self) -> Option<&JsonValue> {
        match self {
            Self::Http { payload, .. } | Self::Conflict { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// Whether the retry budget was spent before giving up.
    pub fn retries_exhausted(&self) -> bool {
        match self {
            Self::Timeout {
                retries_exhausted, ..
            }
            | Self::Network {
                retries_exhausted, ..
            } => *retries_exhausted,
            _ => false,
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::NetworkFailure)
    }
}
