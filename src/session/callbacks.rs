//! Optional lifecycle callbacks
//!
//! Every callback is independently optional and invoked only when present.

use super::state::SessionState;
use crate::protocol::InboundMessage;
use std::sync::Arc;

pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
/// Receives the transport-reported reason
pub type ReasonCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(SessionState) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SessionCallbacks {
    pub on_connect: Option<ConnectCallback>,
    pub on_connection_lost: Option<ReasonCallback>,
    pub on_message_arrived: Option<MessageCallback>,
    pub on_connection_failed: Option<ReasonCallback>,
    pub on_status_change: Option<StatusCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_connection_lost(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_connection_lost = Some(Arc::new(f));
        self
    }

    pub fn on_message_arrived(
        mut self,
        f: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_message_arrived = Some(Arc::new(f));
        self
    }

    pub fn on_connection_failed(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_connection_failed = Some(Arc::new(f));
        self
    }

    pub fn on_status_change(mut self, f: impl Fn(SessionState) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Arc::new(f));
        self
    }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn connection_lost(&self, reason: &str) {
        if let Some(f) = &self.on_connection_lost {
            f(reason);
        }
    }

    pub(crate) fn message_arrived(&self, message: &InboundMessage) {
        if let Some(f) = &self.on_message_arrived {
            f(message);
        }
    }

    pub(crate) fn connection_failed(&self, reason: &str) {
        if let Some(f) = &self.on_connection_failed {
            f(reason);
        }
    }

    pub(crate) fn status_changed(&self, state: SessionState) {
        if let Some(f) = &self.on_status_change {
            f(state);
        }
    }
}

impl std::fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_connection_lost", &self.on_connection_lost.is_some())
            .field("on_message_arrived", &self.on_message_arrived.is_some())
            .field("on_connection_failed", &self.on_connection_failed.is_some())
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}
