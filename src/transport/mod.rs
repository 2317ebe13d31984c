//! Transport layer for publishing occupancy events over MQTT.
//!
//! `endpoint` handles broker address parsing, the loopback policy and TLS
//! transport selection; `mqtt` implements `EventPublisher` on top of rumqttc.

mod endpoint;
mod mqtt;

pub use endpoint::{MqttEndpoint, TlsMaterials};
pub use mqtt::{MqttPublisher, MqttSettings};
