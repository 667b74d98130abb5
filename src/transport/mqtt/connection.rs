//! Pure connection configuration for the MQTT transport
//!
//! This module contains pure functions for option building, broker
//! addressing and QoS conversion, plus the transport error type.

use crate::config::SessionConfig;
use crate::protocol::QoS;
use crate::transport::Endpoint;
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Capacity of the request channel between client and event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid client id: '{0}'")]
    InvalidClientId(String),
    #[error("Transport has not been connected yet")]
    NotStarted,
}

/// Connection settings beyond the endpoint itself
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub websocket: bool,
    pub websocket_path: String,
    pub keep_alive: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MqttSettings {
    /// Resolve settings, reading credentials from the configured environment variables
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            websocket: config.websocket,
            websocket_path: config.websocket_path.clone(),
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            username: config.username(),
            password: config.password(),
        }
    }
}

/// Broker address in the form `rumqttc` expects for the chosen transport
///
/// WebSocket transports take a full URL; TCP and TLS take the bare host.
pub fn broker_address(
    endpoint: &Endpoint,
    settings: &MqttSettings,
    use_ssl: bool,
) -> Result<String, TransportError> {
    if !settings.websocket {
        let url = Url::parse(&format!("mqtt://{}:{}", endpoint.host, endpoint.port))
            .map_err(|_| TransportError::InvalidBrokerUrl(endpoint.host.clone()))?;
        return url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::InvalidBrokerUrl(endpoint.host.clone()));
    }

    let scheme = if use_ssl { "wss" } else { "ws" };
    let url = Url::parse(&format!(
        "{scheme}://{}:{}{}",
        endpoint.host, endpoint.port, settings.websocket_path
    ))
    .map_err(|_| TransportError::InvalidBrokerUrl(endpoint.host.clone()))?;

    if url.host_str().is_none() {
        return Err(TransportError::InvalidBrokerUrl(endpoint.host.clone()));
    }

    Ok(url.to_string())
}

/// Pure function to configure MQTT options for one endpoint
pub fn configure_mqtt_options(
    endpoint: &Endpoint,
    settings: &MqttSettings,
    use_ssl: bool,
) -> Result<MqttOptions, TransportError> {
    // rumqttc panics on these ids, reject them up front
    if endpoint.client_id.is_empty() || endpoint.client_id.starts_with(' ') {
        return Err(TransportError::InvalidClientId(endpoint.client_id.clone()));
    }

    let address = broker_address(endpoint, settings, use_ssl)?;
    let mut mqtt_options = MqttOptions::new(endpoint.client_id.clone(), address, endpoint.port);

    let transport = match (settings.websocket, use_ssl) {
        (true, true) => RumqttcTransport::wss_with_default_config(),
        (true, false) => RumqttcTransport::Ws,
        (false, true) => RumqttcTransport::tls_with_default_config(),
        (false, false) => RumqttcTransport::Tcp,
    };
    mqtt_options.set_transport(transport);

    if let Some(username) = &settings.username {
        let password = settings.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(settings.keep_alive);
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}

pub fn to_rumqttc_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

pub fn from_rumqttc_qos(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}
