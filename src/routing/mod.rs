//! Routing of inbound sensor messages to the presentation layer
//!
//! The router is an ordinary message observer of the session: it turns a
//! topic into a (device, measurement) pair, drops measurement kinds that are
//! not readings, and forwards the rest to a [`ReadingSink`].

pub mod router;

pub use router::{MessageRouter, ReadingSink, RouteError, RouteOutcome, SensorReading};
