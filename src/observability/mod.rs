//! Observability for the sensor monitor
//!
//! Structured logging through `tracing`, with span macros for session work.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat, LoggingError};

pub use logging::{display_span, session_span};
