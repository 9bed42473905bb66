use thiserror::Error;

/// Failure of a single exchange with a verification endpoint.
///
/// Carries strings rather than source errors so results can be fanned out to
/// every caller joined to a coalesced verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response did not match the expected schema: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Retryable failures are connectivity-shaped: offline, DNS, timeouts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("receipt store unavailable: {0}")]
    Unavailable(String),
}

/// Terminal verification failure reported to the caller.
///
/// Retryable transport failures never appear here; they are handled inside
/// the fallback/connectivity protocol and only a final outcome surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("verification rejected by server (status {code})")]
    ServerRejected { code: i32 },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("could not parse verification response: {0}")]
    Parse(String),

    #[error("receipt store error: {0}")]
    Store(#[from] StoreError),

    #[error("verification cancelled")]
    Cancelled,
}

// Helper type for results
pub type Result<T> = std::result::Result<T, VerifyError>;
