//! Transport layer for the broker session
//!
//! This module provides the transport abstraction the session manager is
//! written against, and the MQTT implementation used in production.
//!
//! Outcomes that arrive asynchronously (connection acknowledgement, failure,
//! connection loss, inbound messages) are not returned from the trait methods.
//! The transport reports them as [`TransportEvent`]s on the sender it was
//! created with, and the session manager consumes them on its own task.

use crate::protocol::{InboundMessage, OutboundMessage, QoS};
use tokio::sync::mpsc;

pub mod mqtt;

/// Broker address and identity a transport is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

/// Per-attempt connection options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub use_ssl: bool,
}

/// Unsolicited notifications from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the connection attempt
    ConnectSucceeded,
    /// Connection attempt was rejected or could not reach the broker
    ConnectFailed(String),
    /// An established connection dropped
    ConnectionLost(String),
    /// Message received on a subscribed topic
    MessageArrived(InboundMessage),
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Transport capability the session manager depends on
///
/// This trait provides an abstraction over the messaging client library to
/// enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start a connection attempt; the outcome is reported as an event
    async fn connect(&mut self, options: ConnectOptions) -> Result<(), Self::Error>;

    /// Close the connection without reporting it as lost
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish a message
    async fn send(&mut self, message: OutboundMessage) -> Result<(), Self::Error>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}

/// Creates the transport handle on first connect
pub trait TransportFactory: Send {
    type Transport: Transport;

    fn create(
        &mut self,
        endpoint: &Endpoint,
        events: TransportEventSender,
    ) -> Result<Self::Transport, <Self::Transport as Transport>::Error>;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttTransport;
