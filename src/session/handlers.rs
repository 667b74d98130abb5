//! Ordered registry of inbound message observers
//!
//! Handlers are identified by reference (`Arc::ptr_eq`), so registering the
//! same `Arc` twice yields two entries and removal drops every entry sharing
//! that allocation. Each invocation is isolated: a handler that returns an
//! error or panics is logged and the remaining handlers still run.

use crate::protocol::InboundMessage;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Error returned by a message handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Observer invoked for every inbound message
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) -> Result<(), HandlerError> + Send + Sync>;

/// Wrap a closure as a [`MessageHandler`]
pub fn message_handler<F>(f: F) -> MessageHandler
where
    F: Fn(&InboundMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome of delivering one message to every handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<MessageHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: MessageHandler) {
        self.handlers.push(handler);
    }

    /// Remove by reference identity; returns whether anything was removed
    pub fn remove(&mut self, handler: &MessageHandler) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler in registration order
    pub fn dispatch(&self, message: &InboundMessage) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, handler) in self.handlers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        target: "session",
                        handler = index,
                        topic = %message.topic,
                        "Message handler failed: {}", e
                    );
                    report.failed += 1;
                }
                Err(payload) => {
                    error!(
                        target: "session",
                        handler = index,
                        topic = %message.topic,
                        "Message handler panicked: {}", panic_message(payload.as_ref())
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_handler(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MessageHandler {
        message_handler(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_preserves_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.add(recording_handler(log.clone(), "h1"));
        registry.add(recording_handler(log.clone(), "h2"));
        registry.add(recording_handler(log.clone(), "h3"));

        let report = registry.dispatch(&InboundMessage::new("a/b", "1"));

        assert_eq!(*log.lock().unwrap(), vec!["h1", "h2", "h3"]);
        assert_eq!(report, DispatchReport { delivered: 3, failed: 0 });
    }

    #[test]
    fn test_failing_handler_does_not_stop_fanout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.add(message_handler(|_| Err("boom".into())));
        registry.add(message_handler(|_| panic!("handler exploded")));
        registry.add(recording_handler(log.clone(), "h3"));

        let report = registry.dispatch(&InboundMessage::new("a/b", "1"));

        assert_eq!(*log.lock().unwrap(), vec!["h3"]);
        assert_eq!(report, DispatchReport { delivered: 1, failed: 2 });
    }

    #[test]
    fn test_remove_by_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = recording_handler(log.clone(), "first");
        let lookalike = recording_handler(log.clone(), "first");
        let mut registry = HandlerRegistry::new();
        registry.add(first.clone());

        assert!(!registry.remove(&lookalike));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&first));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_unknown_handler_is_noop() {
        let mut registry = HandlerRegistry::new();
        registry.add(message_handler(|_| Ok(())));
        let stranger = message_handler(|_| Ok(()));

        assert!(!registry.remove(&stranger));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u32), "non-string panic payload");
    }
}
