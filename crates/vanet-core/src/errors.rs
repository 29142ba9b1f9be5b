use std::time::Duration;

/// A raw message that cannot become a [`crate::MessageRecord`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("message {id} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },
    #[error("message {id} has priority {value}, expected 1..=5")]
    PriorityOutOfRange { id: String, value: i64 },
    #[error("message {id} has non-finite packet delivery ratio")]
    InvalidPdr { id: String },
    #[error("message {id} has negative speed {value}")]
    NegativeSpeed { id: String, value: i64 },
    #[error("message {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },
}

impl MessageError {
    /// Stable label used in logs and metric labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::PriorityOutOfRange { .. } => "priority_out_of_range",
            Self::InvalidPdr { .. } => "invalid_pdr",
            Self::NegativeSpeed { .. } => "negative_speed",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Contract violations when building an [`crate::EventCluster`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    #[error("cluster {key} has no member messages")]
    EmptyGroup { key: String },
    #[error("message {id} does not belong to cluster {key}")]
    ForeignMember { key: String, id: String },
}

/// Failures from a text-generation backend.
/// Fatal errors are never retried; a timeout is final for the cycle.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Fatal: never retried
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("backend unavailable")]
    Unavailable,
    #[error("network error: {0}")]
    NetworkError(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::ServerError { .. } | Self::Unavailable | Self::NetworkError(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::InvalidRequest(_)
                | Self::InvalidResponse(_)
                | Self::NotConfigured(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Stable label used in logs and metric labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotConfigured(_) => "not_configured",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Unavailable => "unavailable",
            Self::NetworkError(_) => "network_error",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Map a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 422 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            503 => Self::Unavailable,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}
