//! Message and topic types shared by the session, transport and router layers
//!
//! This module defines the shape of messages crossing the broker connection
//! and the topic rules the sensor network follows.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
