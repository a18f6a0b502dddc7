//! Session state machine.

use crate::error::StateError;

/// Connection lifecycle of an appliance session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transport is held.
    #[default]
    Disconnected,
    /// Authentication is in progress.
    Connecting,
    /// The session accepts commands.
    Connected,
    /// The last connection attempt failed, or a command overran its timeout.
    Failed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Disconnected -> Connecting
    /// - Connecting -> Connected
    /// - Connecting -> Failed
    /// - Connected -> Disconnected
    /// - Connected -> Failed
    /// - Failed -> Connecting
    /// - Failed -> Disconnected
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connected, Disconnected)
                | (Connected, Failed)
                | (Failed, Connecting)
                | (Failed, Disconnected)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> Result<(), StateError> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if session can accept commands.
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}
