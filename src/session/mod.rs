//! Connection lifecycle and message fan-out for one broker session
//!
//! - [`state`] - Pure state machine
//! - [`reconnect`] - Single-slot reconnect deadline
//! - [`handlers`] - Ordered, isolated message observers
//! - [`callbacks`] - Optional lifecycle callbacks
//! - [`manager`] - The [`SessionManager`] tying them to a transport
//!
//! # Usage
//!
//! ```rust,no_run
//! use sensorwatch::config::SessionConfig;
//! use sensorwatch::session::{message_handler, SessionCallbacks, SessionManager};
//! use sensorwatch::transport::mqtt::MqttTransportFactory;
//!
//! # tokio_test::block_on(async {
//! let config = SessionConfig::default();
//! let factory = MqttTransportFactory::from_config(&config);
//! let callbacks = SessionCallbacks::new()
//!     .on_status_change(|state| println!("Connection Status: {state}"));
//!
//! let mut session = SessionManager::new(config, callbacks, factory);
//! session.add_message_handler(message_handler(|message| {
//!     println!("{} = {}", message.topic, message.payload_str());
//!     Ok(())
//! }));
//! session.connect().await;
//! session.run().await;
//! # });
//! ```

pub mod callbacks;
pub mod handlers;
pub mod manager;
pub mod reconnect;
pub mod state;

pub use callbacks::SessionCallbacks;
pub use handlers::{
    message_handler, DispatchReport, HandlerError, HandlerRegistry, MessageHandler,
};
pub use manager::{SessionEvent, SessionManager};
pub use reconnect::ReconnectTimer;
pub use state::{SessionState, SessionTrigger};
