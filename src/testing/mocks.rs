//! Mock implementations for testing
//!
//! [`MockTransportFactory`] hands out [`MockTransport`]s that share one
//! [`MockTransportHandle`]. Tests keep a clone of the handle to inspect the
//! calls the session made and to inject transport events.

use crate::protocol::{InboundMessage, OutboundMessage, QoS};
use crate::routing::{ReadingSink, SensorReading};
use crate::session::{SessionCallbacks, SessionState};
use crate::transport::{
    ConnectOptions, Endpoint, Transport, TransportEvent, TransportEventSender, TransportFactory,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MockTransportError {
    #[error("Mock connection failure")]
    ConnectRejected,
    #[error("Mock operation failure")]
    OperationFailed,
    #[error("Mock transport creation failure")]
    CreateFailed,
}

/// One call the session made on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect { use_ssl: bool },
    Disconnect,
    Send(OutboundMessage),
    Subscribe { topic: String, qos: QoS },
    Unsubscribe { topic: String },
}

/// How the mock answers a connect call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Accept the call; the test decides the outcome later
    #[default]
    Manual,
    /// Report `ConnectSucceeded` straight away
    Succeed,
    /// Report `ConnectFailed` straight away
    Fail,
    /// Return an error from the call itself
    Reject,
}

#[derive(Debug, Default)]
struct MockLink {
    calls: Vec<TransportCall>,
    behavior: ConnectBehavior,
    events: Option<TransportEventSender>,
    connected: bool,
    fail_operations: bool,
}

impl MockLink {
    fn emit(&mut self, event: TransportEvent) {
        match &event {
            TransportEvent::ConnectSucceeded => self.connected = true,
            TransportEvent::ConnectFailed(_) | TransportEvent::ConnectionLost(_) => {
                self.connected = false
            }
            TransportEvent::MessageArrived(_) => {}
        }
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Shared view of every mock transport created by one factory
#[derive(Debug, Clone, Default)]
pub struct MockTransportHandle {
    link: Arc<Mutex<MockLink>>,
}

impl MockTransportHandle {
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.link.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.link.lock().await.calls.clear();
    }

    pub async fn connect_calls(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Connect { .. }))
            .await
    }

    pub async fn disconnect_calls(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect))
            .await
    }

    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.link
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.link
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Subscribe { topic, qos } => Some((topic.clone(), *qos)),
                _ => None,
            })
            .collect()
    }

    async fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.link
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    pub async fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.link.lock().await.behavior = behavior;
    }

    /// Make send/subscribe/unsubscribe/disconnect return errors
    pub async fn set_fail_operations(&self, fail: bool) {
        self.link.lock().await.fail_operations = fail;
    }

    /// Broker accepted the pending attempt
    pub async fn complete_connect(&self) {
        self.link.lock().await.emit(TransportEvent::ConnectSucceeded);
    }

    /// Broker rejected the pending attempt
    pub async fn fail_connect(&self, reason: &str) {
        self.link
            .lock()
            .await
            .emit(TransportEvent::ConnectFailed(reason.to_string()));
    }

    /// Established connection dropped
    pub async fn drop_connection(&self, reason: &str) {
        self.link
            .lock()
            .await
            .emit(TransportEvent::ConnectionLost(reason.to_string()));
    }

    /// Broker delivered a message
    pub async fn deliver(&self, topic: &str, payload: &str) {
        self.deliver_message(InboundMessage::new(topic, payload.to_string()))
            .await;
    }

    pub async fn deliver_message(&self, message: InboundMessage) {
        self.link
            .lock()
            .await
            .emit(TransportEvent::MessageArrived(message));
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.connected
    }
}

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    handle: MockTransportHandle,
}

impl MockTransport {
    async fn record(&self, call: TransportCall) -> Result<(), MockTransportError> {
        let mut link = self.handle.link.lock().await;
        let connect = matches!(call, TransportCall::Connect { .. });
        link.calls.push(call);
        if link.fail_operations && !connect {
            return Err(MockTransportError::OperationFailed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self, options: ConnectOptions) -> Result<(), Self::Error> {
        self.record(TransportCall::Connect {
            use_ssl: options.use_ssl,
        })
        .await?;

        let mut link = self.handle.link.lock().await;
        match link.behavior {
            ConnectBehavior::Manual => Ok(()),
            ConnectBehavior::Succeed => {
                link.emit(TransportEvent::ConnectSucceeded);
                Ok(())
            }
            ConnectBehavior::Fail => {
                link.emit(TransportEvent::ConnectFailed(
                    "Mock connection failure".to_string(),
                ));
                Ok(())
            }
            ConnectBehavior::Reject => Err(MockTransportError::ConnectRejected),
        }
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.record(TransportCall::Disconnect).await?;
        self.handle.link.lock().await.connected = false;
        Ok(())
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<(), Self::Error> {
        self.record(TransportCall::Send(message)).await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        self.record(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        })
        .await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.record(TransportCall::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }

    fn is_connected(&self) -> bool {
        self.handle
            .link
            .try_lock()
            .map(|link| link.connected)
            .unwrap_or(false)
    }
}

/// Mock factory; every transport it creates reports through the same handle
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    handle: MockTransportHandle,
    created: Arc<AtomicUsize>,
    fail_create: bool,
    last_endpoint: Option<Endpoint>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let factory = Self::default();
        if let Ok(mut link) = factory.handle.link.try_lock() {
            link.behavior = behavior;
        }
        factory
    }

    /// Factory whose `create` always fails
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Default::default()
        }
    }

    pub fn handle(&self) -> MockTransportHandle {
        self.handle.clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn last_endpoint(&self) -> Option<&Endpoint> {
        self.last_endpoint.as_ref()
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn create(
        &mut self,
        endpoint: &Endpoint,
        events: TransportEventSender,
    ) -> Result<MockTransport, MockTransportError> {
        self.last_endpoint = Some(endpoint.clone());
        if self.fail_create {
            return Err(MockTransportError::CreateFailed);
        }

        if let Ok(mut link) = self.handle.link.try_lock() {
            link.events = Some(events);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockTransport {
            handle: self.handle.clone(),
        })
    }
}

/// Sink that keeps every reading it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    readings: std::sync::Mutex<Vec<SensorReading>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        match self.readings.lock() {
            Ok(readings) => readings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ReadingSink for RecordingSink {
    fn update(&self, reading: SensorReading) {
        match self.readings.lock() {
            Ok(mut readings) => readings.push(reading),
            Err(poisoned) => poisoned.into_inner().push(reading),
        }
    }
}

/// One lifecycle callback invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackRecord {
    Connected,
    ConnectionLost(String),
    MessageArrived(String),
    ConnectionFailed(String),
    StatusChanged(SessionState),
}

/// Shared log filled by [`recording_callbacks`]
#[derive(Debug, Clone, Default)]
pub struct CallbackLog {
    records: Arc<std::sync::Mutex<Vec<CallbackRecord>>>,
}

impl CallbackLog {
    fn push(&self, record: CallbackRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    pub fn records(&self) -> Vec<CallbackRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn statuses(&self) -> Vec<SessionState> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                CallbackRecord::StatusChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&CallbackRecord) -> bool) -> usize {
        self.records().iter().filter(|r| predicate(r)).count()
    }

    pub fn clear(&self) {
        match self.records.lock() {
            Ok(mut records) => records.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

/// Callbacks that record every invocation, in order
pub fn recording_callbacks() -> (SessionCallbacks, CallbackLog) {
    let log = CallbackLog::default();
    let (on_connect, on_lost, on_message, on_failed, on_status) =
        (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());

    let callbacks = SessionCallbacks::new()
        .on_connect(move || on_connect.push(CallbackRecord::Connected))
        .on_connection_lost(move |reason| {
            on_lost.push(CallbackRecord::ConnectionLost(reason.to_string()))
        })
        .on_message_arrived(move |message| {
            on_message.push(CallbackRecord::MessageArrived(message.topic.clone()))
        })
        .on_connection_failed(move |reason| {
            on_failed.push(CallbackRecord::ConnectionFailed(reason.to_string()))
        })
        .on_status_change(move |state| on_status.push(CallbackRecord::StatusChanged(state)));

    (callbacks, log)
}
