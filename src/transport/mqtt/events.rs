//! Pure classification of `rumqttc` event-loop events
//!
//! The poller in [`super::client`] only acts on the routes produced here, so
//! every decision about what an event means can be tested without a broker.

use super::connection::from_rumqttc_qos;
use crate::protocol::InboundMessage;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker accepted the connection
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Broker closed the session
    Disconnected,
    /// Our own disconnect request went out
    DisconnectSent,
    /// Subscription confirmed with return codes
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PubAck, PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

/// Route MQTT event to appropriate handler (pure routing decision)
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            // Refusals never get here: the event loop turns them into poll errors
            Packet::ConnAck(connack) if connack.code == ConnectReturnCode::Success => {
                EventRoute::ConnectionAcknowledged
            }
            Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
                qos: from_rumqttc_qos(publish.qos),
                retained: publish.retain,
                duplicate: publish.dup,
            }),
            Packet::Disconnect => EventRoute::Disconnected,
            Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                packet_id: suback.pkid,
            },
            other => EventRoute::InfrastructureEvent(format!("{other:?}")),
        },
        Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
        Event::Outgoing(_) => EventRoute::OutgoingEvent,
    }
}
