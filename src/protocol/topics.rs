//! Topic filter validation, wildcard matching and sensor topic parsing
//!
//! Sensor topics follow the layout published by the home devices:
//! `projects/<project>/devices/<device>/sensor/<measurement>[/...]`, so the
//! device sits at segment index 3 and the measurement kind at index 5.

use thiserror::Error;

/// Segment index carrying the device identifier
pub const DEVICE_SEGMENT: usize = 3;
/// Segment index carrying the measurement kind
pub const MEASUREMENT_SEGMENT: usize = 5;

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic filter cannot be empty")]
    EmptyFilter,
    #[error("Multi-level wildcard '#' must be the last level of '{0}'")]
    MisplacedMultiLevelWildcard(String),
    #[error("Wildcard must occupy a whole level in '{0}'")]
    PartialLevelWildcard(String),
    #[error("Topic '{topic}' has no segment {index}")]
    MissingSegment { topic: String, index: usize },
    #[error("Topic '{topic}' has an empty segment {index}")]
    EmptySegment { topic: String, index: usize },
}

/// Validate a subscription filter per the MQTT wildcard rules
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    if filter.is_empty() {
        return Err(TopicError::EmptyFilter);
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" {
                return Err(TopicError::PartialLevelWildcard(filter.to_string()));
            }
            if index != last {
                return Err(TopicError::MisplacedMultiLevelWildcard(filter.to_string()));
            }
        }
        if level.contains('+') && *level != "+" {
            return Err(TopicError::PartialLevelWildcard(filter.to_string()));
        }
    }

    Ok(())
}

/// Check whether a concrete topic matches a subscription filter
///
/// `#` also matches the parent level (`a/#` matches `a`), and wildcards in the
/// first level never match topics starting with `$`.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Device and measurement identified by a sensor topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorTopic {
    pub device_id: String,
    pub measurement: String,
}

impl SensorTopic {
    /// Extract device and measurement from a slash-delimited topic
    ///
    /// # Examples
    /// ```
    /// use sensorwatch::protocol::SensorTopic;
    ///
    /// let parsed = SensorTopic::parse("projects/pandashouse/devices/kitchen/sensor/temperature/state").unwrap();
    /// assert_eq!(parsed.device_id, "kitchen");
    /// assert_eq!(parsed.measurement, "temperature");
    /// ```
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let segments: Vec<&str> = topic.split('/').collect();
        let device_id = segment(topic, &segments, DEVICE_SEGMENT)?;
        let measurement = segment(topic, &segments, MEASUREMENT_SEGMENT)?;

        Ok(Self {
            device_id: device_id.to_string(),
            measurement: measurement.to_string(),
        })
    }

    /// Stable key for the on-screen entry of this sensor
    pub fn element_id(&self) -> String {
        format!("{}-{}", self.device_id, self.measurement)
    }
}

fn segment<'a>(topic: &str, segments: &[&'a str], index: usize) -> Result<&'a str, TopicError> {
    match segments.get(index) {
        None => Err(TopicError::MissingSegment {
            topic: topic.to_string(),
            index,
        }),
        Some(value) if value.is_empty() => Err(TopicError::EmptySegment {
            topic: topic.to_string(),
            index,
        }),
        Some(value) => Ok(value),
    }
}
