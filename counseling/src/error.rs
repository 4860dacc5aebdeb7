//! Error taxonomy for the conduction core.
//!
//! No error here is fatal: the service layer recovers every variant into a
//! well-formed outbound payload (fresh session, retry notice, or completion
//! notice).

use thiserror::Error;

/// The only ways an exchange can be refused by the conductor.
#[derive(Debug, Clone, Error)]
pub enum ConductError {
    /// The inbound session payload failed validation.
    #[error("malformed session input: {reason}")]
    MalformedSession { reason: String },

    /// The session reached the terminal phase; no further exchanges.
    #[error("session {session_id} is complete")]
    TerminalSession { session_id: String },
}

impl ConductError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSession {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConductError::malformed("drift window longer than configured capacity");
        assert!(err.to_string().contains("malformed session input"));

        let err = ConductError::TerminalSession {
            session_id: "s-1".into(),
        };
        assert!(err.to_string().contains("s-1"));
    }
}
