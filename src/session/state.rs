use std::time::Instant;

use thiserror::Error;

/// Connection lifecycle of a [`MiioSession`](super::MiioSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no hello sent yet.
    Disconnected,
    /// Hello probe sent, waiting for the device header.
    AwaitingHello,
    /// Device id, stamp and key material are known.
    Connected { since: Instant },
    /// Transport released; terminal.
    Closed,
}

#[derive(Debug, Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct SessionStateError {
    pub from: &'static str,
    pub to: &'static str,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::AwaitingHello => "awaiting_hello",
            SessionState::Connected { .. } => "connected",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected { .. })
    }

    /// Validates and performs a transition.
    ///
    /// `AwaitingHello -> AwaitingHello` re-sends the probe after a failed hello.
    /// Any state may close.
    pub fn transition(self, next: SessionState) -> Result<SessionState, SessionStateError> {
        let allowed = matches!(
            (&self, &next),
            (SessionState::Disconnected, SessionState::AwaitingHello)
                | (SessionState::AwaitingHello, SessionState::AwaitingHello)
                | (SessionState::AwaitingHello, SessionState::Connected { .. })
                | (_, SessionState::Closed)
        );
        if allowed {
            Ok(next)
        } else {
            Err(SessionStateError {
                from: self.name(),
                to: next.name(),
            })
        }
    }
}
