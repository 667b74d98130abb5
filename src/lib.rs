//! sensorwatch - MQTT sensor monitor
//!
//! A long-lived broker session with fixed-delay reconnection, fan-out of
//! inbound messages to registered observers, and fail-silent outbound
//! operations, plus the router and terminal board that turn sensor topics
//! into live readings.
//!
//! # Overview
//!
//! - [`session::SessionManager`] owns the connection lifecycle
//! - [`transport`] abstracts the messaging client; [`transport::mqtt`] is the
//!   `rumqttc` implementation
//! - [`routing::MessageRouter`] maps `.../devices/<device>/sensor/<measurement>/...`
//!   topics to readings
//! - [`display::SensorBoard`] prints the latest reading per device and measurement
//!
//! # Quick Start
//!
//! ```rust
//! use sensorwatch::protocol::{SensorTopic, QoS};
//!
//! let topic = SensorTopic::parse("projects/pandashouse/devices/kitchen/sensor/temperature/state")
//!     .unwrap();
//! assert_eq!(topic.element_id(), "kitchen-temperature");
//! assert_eq!(QoS::default(), QoS::AtMostOnce);
//! ```

pub mod config;
pub mod display;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{AppConfig, ConfigError, RouterConfig, SessionConfig, SessionOverrides};
pub use display::{DisplayFormat, SensorBoard};
pub use error::{SensorError, SensorResult};
pub use protocol::*;
pub use routing::{MessageRouter, ReadingSink, SensorReading};
pub use session::{SessionCallbacks, SessionManager, SessionState};
pub use transport::mqtt::{MqttTransport, MqttTransportFactory};
