//! Error types for the call session core

/// Result type alias using the call Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or running a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Capture permission or device failure
    #[error("Media access denied: {0}")]
    MediaAccessDenied(String),

    /// Undecodable or malformed negotiation code pasted by the user
    #[error("Invalid negotiation code: {0}")]
    InvalidPayload(String),

    /// A negotiation step was attempted with no live peer connection
    #[error("No active session: {0}")]
    NoActiveSession(String),

    /// Native negotiation-step error (offer/answer/description/gathering)
    #[error("Negotiation failed: {0}")]
    NegotiationFailure(String),

    /// Connection health reported an unrecoverable failure
    #[error("Connectivity failure: {0}")]
    ConnectivityFailure(String),

    /// Command not permitted in the current call state
    #[error("Action not permitted: {0}")]
    InvalidAction(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is correctable by the user without restarting
    /// the session (bad paste, wrong button). The offending input is
    /// cleared and the call state stays unchanged.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Error::InvalidPayload(_) | Error::InvalidAction(_))
    }

    /// Check if this error forces a hang-up. The protocol offers only
    /// restart-from-scratch, never resumption mid-negotiation.
    pub fn forces_hang_up(&self) -> bool {
        matches!(
            self,
            Error::NoActiveSession(_)
                | Error::NegotiationFailure(_)
                | Error::ConnectivityFailure(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_error_is_user_correctable() {
        assert!(Error::InvalidPayload("test".to_string()).is_user_correctable());
        assert!(Error::InvalidAction("test".to_string()).is_user_correctable());
        assert!(!Error::NegotiationFailure("test".to_string()).is_user_correctable());
    }

    #[test]
    fn test_error_forces_hang_up() {
        assert!(Error::NoActiveSession("test".to_string()).forces_hang_up());
        assert!(Error::NegotiationFailure("test".to_string()).forces_hang_up());
        assert!(Error::ConnectivityFailure("test".to_string()).forces_hang_up());
        assert!(!Error::InvalidPayload("test".to_string()).forces_hang_up());
        assert!(!Error::MediaAccessDenied("test".to_string()).forces_hang_up());
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(!Error::InvalidPayload("test".to_string()).is_config_error());
    }
}
