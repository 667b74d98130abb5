//! Message types exchanged with the broker
//!
//! Inbound messages are handed to observers untouched: topic, payload and
//! transport metadata pass through exactly as the transport reported them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// MQTT delivery guarantee level
///
/// # Examples
/// ```
/// use sensorwatch::protocol::QoS;
///
/// assert_eq!(QoS::try_from(1u8).unwrap(), QoS::AtLeastOnce);
/// assert!(QoS::try_from(3u8).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Fire and forget (0)
    #[default]
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible (1)
    AtLeastOnce,
    /// Assured single delivery (2)
    ExactlyOnce,
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid QoS level {0}: must be 0, 1 or 2")]
pub struct InvalidQoS(pub u8);

impl QoS {
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = InvalidQoS;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(InvalidQoS(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Slash-delimited destination topic
    pub topic: String,
    /// Raw payload bytes
    pub payload: Bytes,
    pub qos: QoS,
    /// Broker replayed the stored last-known value
    pub retained: bool,
    /// Redelivery of an earlier attempt
    pub duplicate: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retained: false,
            duplicate: false,
        }
    }

    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Message handed to the transport for publishing
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    /// Ask the broker to keep this as the topic's last-known value
    pub retained: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retained: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retained(mut self, retained: bool) -> Self {
        self.retained = retained;
        self
    }
}
