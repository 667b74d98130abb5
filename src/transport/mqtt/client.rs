//! Impure I/O operations for the MQTT transport
//!
//! This module owns the `rumqttc` client and event loop. Each connection
//! attempt spawns a poller task that drives the event loop and forwards what
//! it sees as [`TransportEvent`]s; the poller ends at the first connection
//! error, leaving the event loop ready for the next attempt.

use super::connection::{
    configure_mqtt_options, to_rumqttc_qos, MqttSettings, TransportError,
    REQUEST_CHANNEL_CAPACITY,
};
use super::events::{route_event, EventRoute};
use crate::config::SessionConfig;
use crate::protocol::{OutboundMessage, QoS};
use crate::transport::{
    ConnectOptions, Endpoint, Transport, TransportEvent, TransportEventSender, TransportFactory,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// How long `disconnect` waits for the poller to flush the DISCONNECT packet
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Flags shared between the transport and its poller task
#[derive(Debug, Default)]
struct LinkFlags {
    connected: AtomicBool,
    /// Set while a locally requested disconnect is in progress
    closing: AtomicBool,
}

/// `rumqttc` backed transport
pub struct MqttTransport {
    endpoint: Endpoint,
    settings: MqttSettings,
    events: TransportEventSender,
    client: Option<AsyncClient>,
    event_loop: Option<Arc<Mutex<EventLoop>>>,
    poller: Option<JoinHandle<()>>,
    link: Arc<LinkFlags>,
    use_ssl: Option<bool>,
}

impl MqttTransport {
    pub fn new(endpoint: Endpoint, settings: MqttSettings, events: TransportEventSender) -> Self {
        Self {
            endpoint,
            settings,
            events,
            client: None,
            event_loop: None,
            poller: None,
            link: Arc::new(LinkFlags::default()),
            use_ssl: None,
        }
    }

    /// Build the client and event loop on the first attempt; reuse them afterwards
    fn ensure_client(&mut self, use_ssl: bool) -> Result<Arc<Mutex<EventLoop>>, TransportError> {
        if let Some(event_loop) = &self.event_loop {
            if self.use_ssl != Some(use_ssl) {
                warn!(
                    target: "mqtt_transport",
                    "Ignoring use_ssl={} for an existing connection built with use_ssl={:?}",
                    use_ssl, self.use_ssl
                );
            }
            return Ok(event_loop.clone());
        }

        let mqtt_options = configure_mqtt_options(&self.endpoint, &self.settings, use_ssl)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let event_loop = Arc::new(Mutex::new(event_loop));

        self.client = Some(client);
        self.event_loop = Some(event_loop.clone());
        self.use_ssl = Some(use_ssl);
        Ok(event_loop)
    }

    fn poller_running(&self) -> bool {
        self.poller
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the poller and reset the event loop's connection
    async fn abort_poller(&mut self) {
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
        if let Some(event_loop) = &self.event_loop {
            // Waits for the aborted poller to release the event loop
            event_loop.lock().await.clean();
        }
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        self.client.as_ref().ok_or(TransportError::NotStarted)
    }

    /// Drive the event loop until the connection ends
    async fn poll_connection(
        event_loop: Arc<Mutex<EventLoop>>,
        events: TransportEventSender,
        link: Arc<LinkFlags>,
        client_id: String,
    ) {
        let mut event_loop = event_loop.lock().await;

        loop {
            match event_loop.poll().await {
                Ok(event) => match route_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        link.connected.store(true, Ordering::SeqCst);
                        info!(target: "mqtt_transport", client_id = %client_id, "Broker acknowledged connection");
                        let _ = events.send(TransportEvent::ConnectSucceeded);
                    }
                    EventRoute::MessageReceived(message) => {
                        debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", message.topic);
                        let _ = events.send(TransportEvent::MessageArrived(message));
                    }
                    EventRoute::Disconnected => {
                        // Drop the socket so the next poll opens a fresh connection
                        event_loop.clean();
                        let was_connected = link.connected.swap(false, Ordering::SeqCst);
                        if !link.closing.load(Ordering::SeqCst) && was_connected {
                            let _ = events.send(TransportEvent::ConnectionLost(
                                "Broker closed the connection".to_string(),
                            ));
                        }
                        break;
                    }
                    EventRoute::DisconnectSent => {
                        event_loop.clean();
                        link.connected.store(false, Ordering::SeqCst);
                        debug!(target: "mqtt_transport", "Disconnect sent, stopping poller");
                        break;
                    }
                    EventRoute::SubscriptionConfirmed { packet_id } => {
                        debug!(target: "mqtt_transport", "Subscription confirmed: packet {}", packet_id);
                    }
                    EventRoute::InfrastructureEvent(event_str) => {
                        tracing::trace!(target: "mqtt_transport", "MQTT event: {}", event_str);
                    }
                    EventRoute::OutgoingEvent => {}
                },
                // rumqttc resets the connection itself on errors, refused CONNACKs included
                Err(error) => {
                    let was_connected = link.connected.swap(false, Ordering::SeqCst);
                    if link.closing.load(Ordering::SeqCst) {
                        debug!(target: "mqtt_transport", "Event loop ended after local disconnect: {}", error);
                    } else if was_connected {
                        let _ = events.send(TransportEvent::ConnectionLost(error.to_string()));
                    } else {
                        let _ = events.send(TransportEvent::ConnectFailed(error.to_string()));
                    }
                    break;
                }
            }
        }

        debug!(target: "mqtt_transport", client_id = %client_id, "MQTT poller stopped");
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Error = TransportError;

    async fn connect(&mut self, options: ConnectOptions) -> Result<(), Self::Error> {
        if self.poller_running() {
            if !self.link.closing.load(Ordering::SeqCst) {
                debug!(target: "mqtt_transport", "Connection attempt already in flight");
                return Ok(());
            }
            // A previous disconnect never completed; start over on the same event loop
            self.abort_poller().await;
        }

        let event_loop = self.ensure_client(options.use_ssl)?;
        self.link.closing.store(false, Ordering::SeqCst);

        info!(
            target: "mqtt_transport",
            host = %self.endpoint.host,
            port = self.endpoint.port,
            use_ssl = options.use_ssl,
            websocket = self.settings.websocket,
            "Connecting to MQTT broker"
        );

        self.poller = Some(tokio::spawn(Self::poll_connection(
            event_loop,
            self.events.clone(),
            self.link.clone(),
            self.endpoint.client_id.clone(),
        )));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.link.closing.store(true, Ordering::SeqCst);
        self.link.connected.store(false, Ordering::SeqCst);

        let client = self.client()?;
        if !self.poller_running() {
            // A queued DISCONNECT would be sent on the next connection instead
            debug!(target: "mqtt_transport", "No live connection to disconnect");
            return Ok(());
        }
        client
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(Box::new(e)))?;

        info!(target: "mqtt_transport", "MQTT disconnect requested");

        // Wait for the DISCONNECT to go out so no request outlives this session
        if let Some(mut handle) = self.poller.take() {
            if time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err() {
                warn!(target: "mqtt_transport", "Poller did not stop after disconnect, aborting it");
                self.poller = Some(handle);
                self.abort_poller().await;
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: OutboundMessage) -> Result<(), Self::Error> {
        let client = self.client()?;
        client
            .publish(
                message.topic,
                to_rumqttc_qos(message.qos),
                message.retained,
                message.payload.to_vec(),
            )
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        let client = self.client()?;
        client
            .subscribe(topic, to_rumqttc_qos(qos))
            .await
            .map_err(|e| TransportError::SubscriptionFailed(Box::new(e)))
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let client = self.client()?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::SubscriptionFailed(Box::new(e)))
    }

    fn is_connected(&self) -> bool {
        self.link.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        // Background poller must not outlive the transport
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

/// Factory producing [`MqttTransport`]s from resolved settings
#[derive(Debug, Clone)]
pub struct MqttTransportFactory {
    settings: MqttSettings,
}

impl MqttTransportFactory {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(MqttSettings::from_config(config))
    }
}

impl TransportFactory for MqttTransportFactory {
    type Transport = MqttTransport;

    fn create(
        &mut self,
        endpoint: &Endpoint,
        events: TransportEventSender,
    ) -> Result<MqttTransport, TransportError> {
        // Surface addressing errors at creation rather than on the first attempt
        super::connection::broker_address(endpoint, &self.settings, false)?;
        Ok(MqttTransport::new(
            endpoint.clone(),
            self.settings.clone(),
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_endpoint() -> Endpoint {
        Endpoint {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "sensorwatch-client-test".to_string(),
        }
    }

    fn test_settings() -> MqttSettings {
        MqttSettings {
            websocket: false,
            websocket_path: "/mqtt".to_string(),
            keep_alive: Duration::from_secs(60),
            username: None,
            password: None,
        }
    }

    #[test]
    fn test_factory_creates_disconnected_transport() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut factory = MqttTransportFactory::new(test_settings());

        let transport = factory.create(&test_endpoint(), events_tx).unwrap();

        assert!(!transport.is_connected());
        assert!(!transport.poller_running());
    }

    #[test]
    fn test_factory_rejects_invalid_host() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut factory = MqttTransportFactory::new(test_settings());
        let mut endpoint = test_endpoint();
        endpoint.host = "not a host".to_string();

        let result = factory.create(&endpoint, events_tx);
        assert!(matches!(result, Err(TransportError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut transport = MqttTransport::new(test_endpoint(), test_settings(), events_tx);

        assert!(matches!(
            transport.send(OutboundMessage::new("a/b", "1")).await,
            Err(TransportError::NotStarted)
        ));
        assert!(matches!(
            transport.subscribe("a/#", QoS::AtMostOnce).await,
            Err(TransportError::NotStarted)
        ));
        assert!(matches!(
            transport.unsubscribe("a/#").await,
            Err(TransportError::NotStarted)
        ));
        assert!(matches!(
            transport.disconnect().await,
            Err(TransportError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_connect_failed() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            // Port 1 is reserved and never has a broker listening
            port: 1,
            client_id: "sensorwatch-unreachable".to_string(),
        };
        let mut transport = MqttTransport::new(endpoint, test_settings(), events_tx);

        transport
            .connect(ConnectOptions { use_ssl: false })
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), events_rx.recv())
            .await
            .expect("poller should report within the timeout");
        assert!(matches!(event, Some(TransportEvent::ConnectFailed(_))));
        assert!(!transport.is_connected());
    }
}
