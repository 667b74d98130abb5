//! Testing utilities and mock implementations
//!
//! Lets the session manager and router be exercised without a broker.

pub mod mocks;

pub use mocks::*;
