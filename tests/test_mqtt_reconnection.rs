//! Reconnection tests against a local broker
//!
//! A minimal MQTT 3.1.1 broker on a loopback socket answers CONNECT,
//! SUBSCRIBE and PINGREQ, and can drop its clients on demand. These tests
//! drive the real `rumqttc` transport through repeated connections.

use sensorwatch::config::{SessionConfig, SessionOverrides};
use sensorwatch::session::{SessionManager, SessionState};
use sensorwatch::testing::{recording_callbacks, CallbackRecord};
use sensorwatch::transport::mqtt::{MqttSettings, MqttTransport, MqttTransportFactory};
use sensorwatch::transport::{ConnectOptions, Transport, TransportEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT: u8 = 1;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

/// Loopback broker that acknowledges everything and counts connections
struct FakeBroker {
    port: u16,
    connections: Arc<AtomicUsize>,
    kick: Arc<Notify>,
    accept: JoinHandle<()>,
}

impl FakeBroker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let kick = Arc::new(Notify::new());

        let accept = {
            let connections = connections.clone();
            let kick = kick.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, kick.clone()));
                }
            })
        };

        Self {
            port,
            connections,
            kick,
            accept,
        }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Close the live client connection without a DISCONNECT
    fn drop_client(&self) {
        self.kick.notify_one();
    }
}

impl Drop for FakeBroker {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

/// Read one control packet, returning its type and body
async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let header = stream.read_u8().await?;

    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        length |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; length];
    stream.read_exact(&mut body).await?;
    Ok((header >> 4, body))
}

async fn serve(mut stream: TcpStream, kick: Arc<Notify>) {
    loop {
        let packet = tokio::select! {
            packet = read_packet(&mut stream) => packet,
            _ = kick.notified() => return,
        };

        let reply = match packet {
            Ok((CONNECT, _)) => vec![0x20, 0x02, 0x00, 0x00],
            Ok((SUBSCRIBE, body)) if body.len() >= 2 => vec![0x90, 0x03, body[0], body[1], 0x00],
            Ok((PINGREQ, _)) => vec![0xD0, 0x00],
            Ok((DISCONNECT, _)) | Err(_) => return,
            Ok(_) => continue,
        };
        if stream.write_all(&reply).await.is_err() {
            return;
        }
    }
}

fn broker_config(port: u16) -> SessionConfig {
    SessionConfig::merged(SessionOverrides {
        broker_url: Some("127.0.0.1".to_string()),
        port: Some(port),
        use_ssl: Some(false),
        websocket: Some(false),
        client_id: Some("sensorwatch-reconnect-test".to_string()),
        reconnect_delay_ms: Some(200),
        ..Default::default()
    })
}

async fn next_event(session: &mut SessionManager<MqttTransportFactory>) {
    timeout(EVENT_TIMEOUT, session.process_next())
        .await
        .expect("session should handle an event within the timeout");
}

fn is_connection_failure(record: &CallbackRecord) -> bool {
    matches!(record, CallbackRecord::ConnectionFailed(_))
}

#[tokio::test]
async fn test_connect_after_disconnect_opens_fresh_connection() {
    // Arrange: connected session
    let broker = FakeBroker::start().await;
    let config = broker_config(broker.port);
    let (callbacks, log) = recording_callbacks();
    let factory = MqttTransportFactory::from_config(&config);
    let mut session = SessionManager::new(config, callbacks, factory);

    session.connect().await;
    next_event(&mut session).await;
    assert_eq!(session.state(), SessionState::Connected);

    // Act: disconnect, then connect again on the same transport
    session.disconnect().await;
    session.connect().await;
    next_event(&mut session).await;

    // Assert: second attempt succeeds without a failed attempt in between
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(log.count(is_connection_failure), 0);
    assert_eq!(log.count(|r| *r == CallbackRecord::Connected), 2);
    assert!(!session.has_pending_reconnect());
    assert_eq!(broker.connections(), 2);
}

#[tokio::test]
async fn test_dropped_connection_is_restored_by_retry() {
    // Arrange: connected session
    let broker = FakeBroker::start().await;
    let config = broker_config(broker.port);
    let (callbacks, log) = recording_callbacks();
    let factory = MqttTransportFactory::from_config(&config);
    let mut session = SessionManager::new(config, callbacks, factory);

    session.connect().await;
    next_event(&mut session).await;
    assert_eq!(session.state(), SessionState::Connected);

    // Act: broker drops the client
    broker.drop_client();
    next_event(&mut session).await;

    // Assert: loss reported and a retry is pending
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.has_pending_reconnect());
    assert_eq!(
        log.count(|r| matches!(r, CallbackRecord::ConnectionLost(_))),
        1
    );

    // Act: retry fires, then the broker accepts it
    next_event(&mut session).await;
    assert_eq!(session.state(), SessionState::Connecting);
    next_event(&mut session).await;

    // Assert: reconnected on the first retry
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(log.count(is_connection_failure), 0);
    assert_eq!(session.connect_attempts(), 2);
    assert_eq!(broker.connections(), 2);
}

#[tokio::test]
async fn test_transport_reports_success_for_each_connect() {
    // Arrange
    let broker = FakeBroker::start().await;
    let config = broker_config(broker.port);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut transport = MqttTransport::new(
        config.endpoint(),
        MqttSettings::from_config(&config),
        events_tx,
    );
    let options = ConnectOptions { use_ssl: false };

    for round in 1..=3 {
        // Act
        transport.connect(options).await.unwrap();
        let event = timeout(EVENT_TIMEOUT, events_rx.recv())
            .await
            .expect("transport should report within the timeout");

        // Assert
        assert_eq!(
            event,
            Some(TransportEvent::ConnectSucceeded),
            "connect round {round}"
        );
        assert!(transport.is_connected());

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    assert_eq!(broker.connections(), 3);
    assert!(events_rx.try_recv().is_err());
}
