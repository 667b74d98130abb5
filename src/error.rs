//! Crate-level error type
//!
//! Module errors stay in their modules; the binary and other top-level callers
//! work with [`SensorError`], which wraps each of them.

use crate::config::ConfigError;
use crate::observability::LoggingError;
use crate::routing::RouteError;
use crate::transport::mqtt::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for top-level sensorwatch operations
pub type SensorResult<T> = Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TopicError;

    #[test]
    fn test_config_error_conversion() {
        let error: SensorError = ConfigError::InvalidConfig("port must not be zero".to_string()).into();
        assert!(matches!(error, SensorError::Config(_)));
        assert!(error.to_string().contains("port must not be zero"));
    }

    #[test]
    fn test_route_error_conversion() {
        let error: SensorError = RouteError::from(TopicError::EmptyFilter).into();
        assert!(matches!(error, SensorError::Route(_)));
        assert!(error.to_string().starts_with("Routing error"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let error: SensorError = TransportError::NotStarted.into();
        assert!(matches!(error, SensorError::Transport(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let error: SensorError = std::io::Error::new(std::io::ErrorKind::Other, "closed").into();
        assert_eq!(error.to_string(), "I/O error: closed");
    }
}
