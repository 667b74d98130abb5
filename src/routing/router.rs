//! Sensor message router

use crate::config::RouterConfig;
use crate::protocol::{topic_matches, InboundMessage, SensorTopic, TopicError};
use crate::session::{message_handler, MessageHandler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// One accepted reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub device_id: String,
    pub measurement: String,
    /// Payload text as published by the device
    pub value: String,
    pub received_at: DateTime<Utc>,
}

impl SensorReading {
    /// Key of the on-screen entry this reading updates
    pub fn element_id(&self) -> String {
        format!("{}-{}", self.device_id, self.measurement)
    }
}

/// Presentation layer receiving accepted readings
pub trait ReadingSink: Send + Sync {
    fn update(&self, reading: SensorReading);
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("Unroutable sensor topic: {0}")]
    InvalidTopic(#[from] TopicError),
}

/// What the router did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Forwarded(SensorReading),
    /// Measurement kind is in the exclusion set
    Excluded { measurement: String },
    /// Topic is outside the router's filter
    Ignored,
}

pub struct MessageRouter {
    excluded: HashSet<String>,
    topic_filter: Option<String>,
    sink: Arc<dyn ReadingSink>,
}

impl MessageRouter {
    pub fn new(config: &RouterConfig, sink: Arc<dyn ReadingSink>) -> Self {
        Self {
            excluded: config.excluded_measurements.iter().cloned().collect(),
            topic_filter: None,
            sink,
        }
    }

    /// Only route topics matching `filter`
    pub fn with_topic_filter(mut self, filter: impl Into<String>) -> Self {
        self.topic_filter = Some(filter.into());
        self
    }

    pub fn is_excluded(&self, measurement: &str) -> bool {
        self.excluded.contains(measurement)
    }

    /// Decide what to do with a message without touching the sink (pure function)
    pub fn classify(
        &self,
        message: &InboundMessage,
        received_at: DateTime<Utc>,
    ) -> Result<RouteOutcome, RouteError> {
        if let Some(filter) = &self.topic_filter {
            if !topic_matches(filter, &message.topic) {
                return Ok(RouteOutcome::Ignored);
            }
        }

        let SensorTopic {
            device_id,
            measurement,
        } = SensorTopic::parse(&message.topic)?;

        if self.is_excluded(&measurement) {
            return Ok(RouteOutcome::Excluded { measurement });
        }

        Ok(RouteOutcome::Forwarded(SensorReading {
            device_id,
            measurement,
            value: message.payload_str().into_owned(),
            received_at,
        }))
    }

    /// Classify a message and forward accepted readings to the sink
    pub fn route(&self, message: &InboundMessage) -> Result<RouteOutcome, RouteError> {
        let outcome = self.classify(message, Utc::now())?;
        match &outcome {
            RouteOutcome::Forwarded(reading) => self.sink.update(reading.clone()),
            RouteOutcome::Excluded { measurement } => {
                debug!(target: "router", topic = %message.topic, "Dropping excluded measurement {}", measurement);
            }
            RouteOutcome::Ignored => {
                debug!(target: "router", topic = %message.topic, "Topic outside router filter");
            }
        }
        Ok(outcome)
    }

    /// Adapt the router into a session message handler
    pub fn into_handler(self: Arc<Self>) -> MessageHandler {
        message_handler(move |message| {
            self.route(message)?;
            Ok(())
        })
    }
}
