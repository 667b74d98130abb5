//! Broker session manager
//!
//! Owns one logical connection: lifecycle, fixed-delay reconnection, outbound
//! operations and fan-out of inbound messages. All state lives in this struct
//! and is only mutated through its methods, driven from a single task by
//! [`SessionManager::run`] (or step by step with
//! [`SessionManager::process_next`]).

use super::callbacks::SessionCallbacks;
use super::handlers::{HandlerRegistry, MessageHandler};
use super::reconnect::ReconnectTimer;
use super::state::{log_state_transition, SessionState, SessionTrigger};
use crate::config::SessionConfig;
use crate::protocol::{InboundMessage, OutboundMessage, QoS};
use crate::session_span;
use crate::transport::{
    ConnectOptions, Transport, TransportEvent, TransportEventReceiver, TransportEventSender,
    TransportFactory,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Something the event pump has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// The reconnect deadline passed
    ReconnectDue,
}

pub struct SessionManager<F: TransportFactory> {
    config: SessionConfig,
    callbacks: SessionCallbacks,
    factory: F,
    /// Created on the first connect and reused for every later attempt
    transport: Option<F::Transport>,
    state: SessionState,
    handlers: HandlerRegistry,
    timer: ReconnectTimer,
    events_tx: TransportEventSender,
    events_rx: TransportEventReceiver,
    connect_attempts: u64,
}

impl<F: TransportFactory> SessionManager<F> {
    pub fn new(config: SessionConfig, callbacks: SessionCallbacks, factory: F) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timer = ReconnectTimer::new(config.reconnect_delay());

        Self {
            config,
            callbacks,
            factory,
            transport: None,
            state: SessionState::Disconnected,
            handlers: HandlerRegistry::new(),
            timer,
            events_tx,
            events_rx,
            connect_attempts: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn transport(&self) -> Option<&F::Transport> {
        self.transport.as_ref()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Number of connection attempts issued so far
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn add_message_handler(&mut self, handler: MessageHandler) {
        self.handlers.add(handler);
    }

    /// Remove a handler by reference identity; unknown handlers are ignored
    pub fn remove_message_handler(&mut self, handler: &MessageHandler) {
        if !self.handlers.remove(handler) {
            debug!(target: "session", "Ignoring removal of unregistered message handler");
        }
    }

    fn transition(&mut self, trigger: SessionTrigger) -> bool {
        match self.state.next(trigger) {
            Some(next) => {
                if next != self.state {
                    log_state_transition(self.state, next);
                }
                self.state = next;
                true
            }
            None => false,
        }
    }

    /// Start a connection attempt
    ///
    /// Never reports failure to the caller: failures are logged, passed to
    /// the failure callback and retried after the reconnect delay.
    pub async fn connect(&mut self) {
        self.begin_attempt(SessionTrigger::ConnectRequested).await;
    }

    async fn begin_attempt(&mut self, trigger: SessionTrigger) {
        if !self.transition(trigger) {
            debug!(target: "session", state = %self.state, "Connect ignored in current state");
            return;
        }

        self.timer.cancel();
        self.callbacks.status_changed(SessionState::Connecting);
        self.connect_attempts += 1;

        if self.transport.is_none() {
            let endpoint = self.config.endpoint();
            match self.factory.create(&endpoint, self.events_tx.clone()) {
                Ok(transport) => self.transport = Some(transport),
                Err(e) => {
                    self.on_connect_failed(format!("Failed to create transport: {e}"));
                    return;
                }
            }
        }

        let options = ConnectOptions {
            use_ssl: self.config.use_ssl,
        };
        info!(
            target: "session",
            attempt = self.connect_attempts,
            broker = %self.config.broker_url,
            port = self.config.port,
            "Connecting to MQTT broker"
        );

        let result = match self.transport.as_mut() {
            Some(transport) => transport.connect(options).await.map_err(|e| e.to_string()),
            None => Err("transport unavailable".to_string()),
        };
        if let Err(reason) = result {
            self.on_connect_failed(reason);
        }
    }

    /// Close the session; always reports `disconnected`
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Connected {
            if let Some(transport) = self.transport.as_mut() {
                if let Err(e) = transport.disconnect().await {
                    error!(target: "session", "Failed to disconnect from MQTT broker: {}", e);
                }
            }
        }

        self.timer.cancel();
        self.transition(SessionTrigger::DisconnectRequested);
        self.callbacks.status_changed(SessionState::Disconnected);
        info!(target: "session", "MQTT session disconnected");
    }

    fn connected_transport(&mut self, operation: &str) -> Option<&mut F::Transport> {
        if self.state != SessionState::Connected {
            error!(target: "session", "Cannot {}: client is not connected", operation);
            return None;
        }
        self.transport.as_mut()
    }

    /// Publish a message; dropped with a log line when not connected
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retained: bool,
    ) {
        let message = OutboundMessage::new(topic, payload)
            .with_qos(qos)
            .retained(retained);

        if let Some(transport) = self.connected_transport("publish") {
            if let Err(e) = transport.send(message).await {
                error!(target: "session", topic = %topic, "Failed to publish: {}", e);
            }
        }
    }

    pub async fn subscribe(&mut self, topic: &str, qos: QoS) {
        if let Some(transport) = self.connected_transport("subscribe") {
            if let Err(e) = transport.subscribe(topic, qos).await {
                error!(target: "session", topic = %topic, "Failed to subscribe: {}", e);
            }
        }
    }

    pub async fn unsubscribe(&mut self, topic: &str) {
        if let Some(transport) = self.connected_transport("unsubscribe") {
            if let Err(e) = transport.unsubscribe(topic).await {
                error!(target: "session", topic = %topic, "Failed to unsubscribe: {}", e);
            }
        }
    }

    /// Wait for the next transport event or reconnect deadline
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            event = self.events_rx.recv() => event.map(SessionEvent::Transport),
            _ = self.timer.fired() => Some(SessionEvent::ReconnectDue),
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(TransportEvent::ConnectSucceeded) => {
                self.on_connect_succeeded().await;
            }
            SessionEvent::Transport(TransportEvent::ConnectFailed(reason)) => {
                if self.state == SessionState::Connecting {
                    self.on_connect_failed(reason);
                } else {
                    debug!(target: "session", state = %self.state, "Ignoring stale connect failure: {}", reason);
                }
            }
            SessionEvent::Transport(TransportEvent::ConnectionLost(reason)) => {
                self.on_connection_lost(reason);
            }
            SessionEvent::Transport(TransportEvent::MessageArrived(message)) => {
                self.on_message_arrived(&message);
            }
            SessionEvent::ReconnectDue => {
                self.timer.cancel();
                info!(target: "session", "Attempting to reconnect...");
                self.begin_attempt(SessionTrigger::RetryFired).await;
            }
        }
    }

    /// Handle exactly one event
    pub async fn process_next(&mut self) {
        if let Some(event) = self.next_event().await {
            self.handle_event(event).await;
        }
    }

    /// Drive the session until the surrounding future is dropped
    pub async fn run(&mut self) {
        let span = session_span!(client_id = %self.config.client_id);
        loop {
            self.process_next().instrument(span.clone()).await;
        }
    }

    async fn on_connect_succeeded(&mut self) {
        if !self.transition(SessionTrigger::TransportSucceeded) {
            if self.state == SessionState::Disconnected {
                // Attempt completed after a local disconnect; honour the disconnect
                warn!(target: "session", "Connection completed after disconnect, closing it");
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.disconnect().await {
                        error!(target: "session", "Failed to close late connection: {}", e);
                    }
                }
            }
            return;
        }

        self.callbacks.status_changed(SessionState::Connected);

        let topic = self.config.topic.clone();
        if let Some(transport) = self.transport.as_mut() {
            match transport.subscribe(&topic, QoS::AtMostOnce).await {
                Ok(()) => info!(target: "session", topic = %topic, "Subscribed to sensor topic"),
                Err(e) => error!(target: "session", topic = %topic, "Failed to subscribe: {}", e),
            }
        }

        self.callbacks.connected();
        self.timer.cancel();
    }

    fn on_connect_failed(&mut self, reason: String) {
        self.transition(SessionTrigger::TransportFailed);
        error!(target: "session", "Failed to connect to MQTT: {}", reason);

        self.callbacks.status_changed(SessionState::Disconnected);
        self.callbacks.connection_failed(&reason);
        self.schedule_reconnect();
    }

    fn on_connection_lost(&mut self, reason: String) {
        if self.state != SessionState::Connected {
            debug!(target: "session", state = %self.state, "Ignoring connection loss: {}", reason);
            return;
        }

        warn!(target: "session", "Connection Lost: {}", reason);
        self.callbacks.connection_lost(&reason);
        self.transition(SessionTrigger::ConnectionLost);
        self.callbacks.status_changed(SessionState::Disconnected);
        self.schedule_reconnect();
    }

    fn on_message_arrived(&self, message: &InboundMessage) {
        let report = self.handlers.dispatch(message);
        debug!(
            target: "session",
            topic = %message.topic,
            delivered = report.delivered,
            failed = report.failed,
            "Message fanned out"
        );
        self.callbacks.message_arrived(message);
    }

    fn schedule_reconnect(&mut self) {
        self.timer.schedule();
        info!(
            target: "session",
            delay_ms = self.timer.delay().as_millis() as u64,
            "Reconnect scheduled"
        );
    }
}

impl<F: TransportFactory> std::fmt::Debug for SessionManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("client_id", &self.config.client_id)
            .field("state", &self.state)
            .field("handlers", &self.handlers.len())
            .field("reconnect_pending", &self.timer.is_pending())
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}
