//! Message fan-out and outbound operation tests


use sensorwatch::config::RouterConfig;
use sensorwatch::protocol::{OutboundMessage, QoS};
use sensorwatch::routing::MessageRouter;
use sensorwatch::session::{message_handler, MessageHandler};
use sensorwatch::testing::{CallbackRecord, ConnectBehavior, RecordingSink, TransportCall};
use std::sync::{Arc, Mutex};
use test_helpers::{test_session, TestSession};

const KITCHEN_TEMPERATURE: &str = "projects/pandashouse/devices/kitchen/sensor/temperature/state";

async fn connected_session() -> TestSession {
    let mut t = test_session(ConnectBehavior::Succeed);
    t.session.connect().await;
    t.session.process_next().await;
    assert!(t.session.is_connected());
    t.transport.clear_calls().await;
    t
}

/// Handler that appends `name` to a shared order log
fn named_handler(name: &'static str, order: &Arc<Mutex<Vec<&'static str>>>) -> MessageHandler {
    let order = order.clone();
    message_handler(move |_message| {
        order.lock().unwrap().push(name);
        Ok(())
    })
}

#[tokio::test(start_paused = true)]
async fn test_operations_while_disconnected_make_no_transport_calls() {
    // Arrange
    let mut t = test_session(ConnectBehavior::Manual);

    // Act
    t.session
        .publish("devices/kitchen/cmd", "on", QoS::AtMostOnce, false)
        .await;
    t.session.subscribe("devices/#", QoS::AtLeastOnce).await;
    t.session.unsubscribe("devices/#").await;

    // Assert
    assert!(t.transport.calls().await.is_empty());
    assert_eq!(t.session.factory().created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_operations_while_connecting_make_no_transport_calls() {
    let mut t = test_session(ConnectBehavior::Manual);
    t.session.connect().await;
    t.transport.clear_calls().await;

    t.session
        .publish("devices/kitchen/cmd", "on", QoS::AtMostOnce, false)
        .await;
    t.session.subscribe("devices/#", QoS::AtMostOnce).await;

    assert!(t.transport.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_publish_passes_qos_and_retained() {
    let mut t = connected_session().await;

    t.session
        .publish("devices/kitchen/cmd", "on", QoS::ExactlyOnce, true)
        .await;

    assert_eq!(
        t.transport.sent_messages().await,
        vec![OutboundMessage::new("devices/kitchen/cmd", "on")
            .with_qos(QoS::ExactlyOnce)
            .retained(true)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_and_unsubscribe_when_connected() {
    let mut t = connected_session().await;

    t.session.subscribe("devices/+/status", QoS::AtLeastOnce).await;
    t.session.unsubscribe("devices/+/status").await;

    assert_eq!(
        t.transport.calls().await,
        vec![
            TransportCall::Subscribe {
                topic: "devices/+/status".to_string(),
                qos: QoS::AtLeastOnce
            },
            TransportCall::Unsubscribe {
                topic: "devices/+/status".to_string()
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_operation_errors_are_not_propagated() {
    let mut t = connected_session().await;
    t.transport.set_fail_operations(true).await;

    t.session
        .publish("devices/kitchen/cmd", "on", QoS::AtMostOnce, false)
        .await;
    t.session.subscribe("devices/#", QoS::AtMostOnce).await;

    // Attempts were made and the session is still up
    assert_eq!(t.transport.calls().await.len(), 2);
    assert!(t.session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_handlers_run_in_registration_order() {
    // Arrange
    let mut t = connected_session().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["H1", "H2", "H3"] {
        t.session.add_message_handler(named_handler(name, &order));
    }

    // Act
    t.transport.deliver(KITCHEN_TEMPERATURE, "21.5").await;
    t.session.process_next().await;

    // Assert
    assert_eq!(*order.lock().unwrap(), vec!["H1", "H2", "H3"]);
    assert_eq!(
        t.log.records().last(),
        Some(&CallbackRecord::MessageArrived(KITCHEN_TEMPERATURE.to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_does_not_stop_later_handlers() {
    // Arrange
    let mut t = connected_session().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    t.session
        .add_message_handler(message_handler(|_message| Err("bad payload".into())));
    t.session.add_message_handler(message_handler(|_message| {
        panic!("handler bug");
    }));
    t.session.add_message_handler(named_handler("H2", &order));
    t.session.add_message_handler(named_handler("H3", &order));

    // Act
    t.transport.deliver(KITCHEN_TEMPERATURE, "21.5").await;
    t.session.process_next().await;

    // Assert
    assert_eq!(*order.lock().unwrap(), vec!["H2", "H3"]);
    assert_eq!(
        t.log
            .count(|r| matches!(r, CallbackRecord::MessageArrived(_))),
        1
    );
    assert!(t.session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_remove_handler_by_identity() {
    let mut t = connected_session().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    let h1 = named_handler("H1", &order);
    let h2 = named_handler("H2", &order);
    t.session.add_message_handler(h1.clone());
    t.session.add_message_handler(h2);

    t.session.remove_message_handler(&h1);
    t.transport.deliver(KITCHEN_TEMPERATURE, "21.5").await;
    t.session.process_next().await;

    assert_eq!(t.session.handler_count(), 1);
    assert_eq!(*order.lock().unwrap(), vec!["H2"]);
}

#[tokio::test(start_paused = true)]
async fn test_removing_unregistered_handler_is_ignored() {
    let mut t = connected_session().await;
    let order = Arc::new(Mutex::new(Vec::new()));
    t.session.add_message_handler(named_handler("H1", &order));
    t.session.add_message_handler(named_handler("H2", &order));

    // Same behavior, different identity
    let stranger = named_handler("H1", &order);
    t.session.remove_message_handler(&stranger);

    assert_eq!(t.session.handler_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_router_handler_updates_sink() {
    // Arrange
    let mut t = connected_session().await;
    let sink = Arc::new(RecordingSink::new());
    let router = Arc::new(MessageRouter::new(&RouterConfig::default(), sink.clone()));
    t.session.add_message_handler(router.into_handler());

    // Act
    t.transport.deliver(KITCHEN_TEMPERATURE, "21.5").await;
    t.transport
        .deliver("projects/pandashouse/devices/kitchen/sensor/uptime/state", "3600")
        .await;
    t.transport
        .deliver("projects/pandashouse/devices/porch/sensor/humidity/state", "71")
        .await;
    for _ in 0..3 {
        t.session.process_next().await;
    }

    // Assert
    let readings = sink.readings();
    let ids: Vec<String> = readings.iter().map(|r| r.element_id()).collect();
    assert_eq!(ids, vec!["kitchen-temperature", "porch-humidity"]);
    assert_eq!(readings[0].value, "21.5");
}
