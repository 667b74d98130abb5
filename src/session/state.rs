//! Pure session state machine
//!
//! ```text
//! Disconnected --connect()--> Connecting
//! Connecting --transport success--> Connected
//! Connecting --transport failure--> Disconnected (schedules retry)
//! Connected --connection lost--> Disconnected (schedules retry)
//! Connected --disconnect()--> Disconnected (cancels retry)
//! Disconnected --scheduled retry fires--> Connecting
//! ```

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Connection state of a session; also the value passed to status-change callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        }
    }

    /// Next state for `trigger`, or `None` when the trigger does not apply here
    pub fn next(self, trigger: SessionTrigger) -> Option<SessionState> {
        use SessionState::*;
        use SessionTrigger::*;

        match (self, trigger) {
            (Disconnected | Connecting, ConnectRequested) => Some(Connecting),
            (Disconnected, RetryFired) => Some(Connecting),
            (Connecting, TransportSucceeded) => Some(Connected),
            (Connecting, TransportFailed) => Some(Disconnected),
            (Connected, ConnectionLost) => Some(Disconnected),
            (_, DisconnectRequested) => Some(Disconnected),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that may move a session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTrigger {
    ConnectRequested,
    TransportSucceeded,
    TransportFailed,
    ConnectionLost,
    DisconnectRequested,
    RetryFired,
}

/// Log connection state transition (pure logging function)
pub fn log_state_transition(from: SessionState, to: SessionState) {
    match (from, to) {
        (SessionState::Connecting, SessionState::Connected) => {
            info!(target: "session", "Connected to MQTT broker");
        }
        (SessionState::Connected, SessionState::Disconnected) => {
            warn!(target: "session", "MQTT session left connected state");
        }
        _ => {
            info!(target: "session", "Session state: {} -> {}", from, to);
        }
    }
}
