use thiserror::Error;

/// Errors surfaced by the connection, signaling and channel layers.
///
/// Every variant is recoverable at the operation boundary: the failing call
/// reports it and the process keeps running. Only `ConnectionFailed` leaves
/// the session unusable until restart.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("no session description was entered")]
    EmptyDescription,

    #[error("session description exceeds {limit} bytes")]
    DescriptionTooLarge { limit: usize },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("data channel '{label}' is not open")]
    ChannelNotOpen { label: String },

    #[error("peer connection failed, restart to try again")]
    ConnectionFailed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("webrtc: {0}")]
    Engine(#[from] webrtc::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub(crate) fn illegal(msg: impl Into<String>) -> Self {
        SessionError::IllegalState(msg.into())
    }

    pub(crate) fn invalid(msg: impl ToString) -> Self {
        SessionError::InvalidDescription(msg.to_string())
    }

    /// The operator may paste another record after these.
    pub fn is_retryable_input(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidDescription(_) | SessionError::DescriptionTooLarge { .. }
        )
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
