use thiserror::Error;

/// Unified error type for the lodestar workspace.
///
/// This wraps backend transport failures, non-success backend statuses,
/// malformed backend data, and argument validation errors. Worker errors
/// never fail an aggregation on their own; they are logged, counted, and fed
/// to the owning backend's circuit breaker according to
/// [`trips_breaker`](LodestarError::trips_breaker).
#[derive(Debug, Error)]
pub enum LodestarError {
    /// Invalid input argument or builder misuse.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A backend could not be reached or the transport failed mid-flight.
    #[error("failed to query backend {backend}: {msg}")]
    Backend {
        /// Host of the backend that failed.
        backend: String,
        /// Human-readable transport error.
        msg: String,
    },

    /// A backend answered with a non-success status code.
    #[error("status {status} response from backend {backend}")]
    BackendStatus {
        /// Host of the backend that answered.
        backend: String,
        /// The HTTP status it answered with.
        status: u16,
    },

    /// Reading a backend's response body failed after the status line.
    #[error("failed to read response from backend {backend}: {msg}")]
    BackendRead {
        /// Host of the backend being read.
        backend: String,
        /// Human-readable read error.
        msg: String,
    },

    /// A backend produced data that does not match the expected schema.
    #[error("malformed backend data: {0}")]
    Decode(String),

    /// The surrounding request was cancelled or timed out while a worker ran.
    #[error("backend query cancelled: {backend}")]
    Canceled {
        /// Host of the backend whose query was cut short.
        backend: String,
    },

    /// Unknown/opaque error.
    #[error("{0}")]
    Other(String),
}

impl LodestarError {
    /// Helper: build a `Backend` transport error.
    pub fn backend(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `BackendStatus` error.
    pub fn backend_status(backend: impl Into<String>, status: u16) -> Self {
        Self::BackendStatus {
            backend: backend.into(),
            status,
        }
    }

    /// Helper: build a `BackendRead` error.
    pub fn backend_read(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BackendRead {
            backend: backend.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Decode` error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Helper: build a `Canceled` error.
    pub fn canceled(backend: impl Into<String>) -> Self {
        Self::Canceled {
            backend: backend.into(),
        }
    }

    /// Helper: build an `Other` error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error should count against a backend's circuit breaker.
    ///
    /// Only genuine health signals trip the breaker: transport failures and
    /// 5xx statuses. A 4xx status, malformed data, a body-read failure, or a
    /// cancellation-driven abort is the wire's problem rather than the
    /// backend's health, and is recorded as a success.
    #[must_use]
    pub const fn trips_breaker(&self) -> bool {
        match self {
            Self::Backend { .. } | Self::Other(_) => true,
            Self::BackendStatus { status, .. } => *status >= 500,
            Self::InvalidArg(_)
            | Self::BackendRead { .. }
            | Self::Decode(_)
            | Self::Canceled { .. } => false,
        }
    }
}

impl From<serde_json::Error> for LodestarError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
