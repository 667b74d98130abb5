//! MQTT transport backed by `rumqttc`
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure option building, broker addressing and errors
//! - [`events`] - Pure classification of `rumqttc` events
//! - [`client`] - Impure I/O: the event-loop poller and request forwarding
//!
//! Automatic reconnection is deliberately absent here. The poller stops at
//! the first connection error and the session manager decides when the next
//! attempt starts, reusing the same client and event loop.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensorwatch::config::SessionConfig;
//! use sensorwatch::transport::mqtt::MqttTransportFactory;
//! use sensorwatch::transport::{ConnectOptions, Transport, TransportFactory};
//!
//! # tokio_test::block_on(async {
//! let config = SessionConfig::default();
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let mut factory = MqttTransportFactory::from_config(&config);
//! let mut transport = factory.create(&config.endpoint(), events_tx)?;
//! transport.connect(ConnectOptions { use_ssl: config.use_ssl }).await?;
//! let first_event = events_rx.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod events;

pub use client::{MqttTransport, MqttTransportFactory};
pub use connection::{MqttSettings, TransportError};
pub use events::EventRoute;
