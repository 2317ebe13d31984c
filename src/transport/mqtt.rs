//! MQTT publisher for occupancy events.
//!
//! Publishes JSON payloads with QoS 1 (at least once), non-retained, on the
//! `person` and `person/duration` topics. The connection event loop is drained
//! on a background thread; a broken connection is logged there and surfaces as
//! publish errors, which `PeopleCounter` logs without touching counting state.

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};

use super::endpoint::{MqttEndpoint, TlsMaterials};
use crate::publish::{
    topic, CountPayload, DurationPayload, EventPublisher, TOPIC_COUNT, TOPIC_DURATION,
};

const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Everything needed to open a broker session.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub topic_prefix: Option<String>,
}

pub struct MqttPublisher {
    client: Client,
    connection_handle: Option<JoinHandle<()>>,
    count_topic: String,
    duration_topic: String,
}

impl MqttPublisher {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = &settings.endpoint;
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        options.set_transport(endpoint.transport(&settings.tls)?);

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAPACITY);
        let connection_handle = spawn_event_loop(connection);
        log::info!(
            "MQTT publisher started for {} (client_id={}, auth: {})",
            endpoint,
            settings.client_id,
            settings.username.is_some()
        );

        let prefix = settings.topic_prefix.as_deref();
        Ok(Self {
            client,
            connection_handle: Some(connection_handle),
            count_topic: topic(prefix, TOPIC_COUNT),
            duration_topic: topic(prefix, TOPIC_DURATION),
        })
    }

    pub fn count_topic(&self) -> &str {
        &self.count_topic
    }

    pub fn duration_topic(&self) -> &str {
        &self.duration_topic
    }

    fn publish_json(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| anyhow!("MQTT publish to {} failed: {}", topic, e))
    }
}

fn spawn_event_loop(mut connection: Connection) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

impl EventPublisher for MqttPublisher {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn publish_count(&mut self, payload: CountPayload) -> Result<()> {
        let body = serde_json::to_vec(&payload)?;
        self.publish_json(&self.count_topic, body)
    }

    fn publish_duration(&mut self, payload: DurationPayload) -> Result<()> {
        let body = serde_json::to_vec(&payload)?;
        self.publish_json(&self.duration_topic, body)
    }

    /// Disconnect and join the event loop. A connection that already dropped
    /// has nothing left to disconnect, so that case is a warning, not an error.
    fn close(&mut self) -> Result<()> {
        let Some(handle) = self.connection_handle.take() else {
            return Ok(());
        };
        if handle.is_finished() {
            log::warn!("MQTT connection already closed; skipping disconnect");
        } else if let Err(e) = self.client.disconnect() {
            // The request channel only fails once the event loop has exited.
            log::warn!("MQTT disconnect failed: {}", e);
        }
        if handle.join().is_err() {
            return Err(anyhow!("MQTT event loop thread panicked"));
        }
        log::info!("MQTT publisher disconnected");
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if self.connection_handle.is_some() {
            if let Err(e) = self.close() {
                log::warn!("{}", e);
            }
        }
    }
}
