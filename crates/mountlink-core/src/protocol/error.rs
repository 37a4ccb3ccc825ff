//! Protocol errors

use thiserror::Error;

/// How the dispatcher treats a failed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient link condition; the dispatcher retries once within the session
    Retryable,
    /// Surfaced to the caller unchanged
    Fatal,
}

/// Errors that can occur while talking to the mount
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Timeout waiting for exclusive access to '{device}' after {waited_ms}ms")]
    ExclusionTimeout { device: String, waited_ms: u64 },

    #[error("Timed out waiting for response terminator")]
    TransportTimeout,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Transport fault: {0}")]
    TransportFault(String),

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Session lock error: {0}")]
    LockError(String),
}

impl ProtocolError {
    /// Classify this error for the dispatcher's retry policy
    pub fn class(&self) -> FailureClass {
        match self {
            ProtocolError::TransportTimeout => FailureClass::Retryable,
            _ => FailureClass::Fatal,
        }
    }

    /// Check if the dispatcher may retry the exchange that produced this error
    pub fn is_retryable(&self) -> bool {
        self.class() == FailureClass::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_timeout_is_retryable() {
        assert!(ProtocolError::TransportTimeout.is_retryable());
        assert!(!ProtocolError::TransportFault("broken pipe".into()).is_retryable());
        assert!(!ProtocolError::MalformedResponse("x".into()).is_retryable());
        assert_eq!(
            ProtocolError::ExclusionTimeout {
                device: "mount".into(),
                waited_ms: 10,
            }
            .class(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_exclusion_timeout_display() {
        let err = ProtocolError::ExclusionTimeout {
            device: "pulsar".into(),
            waited_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Timeout waiting for exclusive access to 'pulsar' after 5000ms"
        );
    }
}
