//! Occupancy event publishing.
//!
//! Two channels are produced:
//! - `person`: `{"count": <int>, "total": <int>}` on every processed frame
//! - `person/duration`: `{"duration": <seconds>}` when an episode closes
//!
//! Publishers are fire-and-forget from the counter's point of view. A failed
//! publish is logged by `PeopleCounter` and never changes counting state.

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::Serialize;

pub const TOPIC_COUNT: &str = "person";
pub const TOPIC_DURATION: &str = "person/duration";

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CountPayload {
    pub count: u32,
    pub total: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DurationPayload {
    /// Seconds.
    pub duration: f64,
}

/// Join an optional prefix onto a channel name: `("site1", "person") -> "site1/person"`.
pub fn topic(prefix: Option<&str>, base: &str) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{}/{}", p, base),
        _ => base.to_string(),
    }
}

/// Sink for occupancy events.
pub trait EventPublisher: Send {
    fn name(&self) -> &'static str;

    fn publish_count(&mut self, payload: CountPayload) -> Result<()>;

    fn publish_duration(&mut self, payload: DurationPayload) -> Result<()>;

    /// Flush and release the underlying channel.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Event captured by `RecordingPublisher`.
#[derive(Clone, Debug, PartialEq)]
pub enum PublishedEvent {
    Count(CountPayload),
    Duration(DurationPayload),
}

/// In-memory publisher. Clones share the same event list.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PublishedEvent::Duration(d) => Some(d.duration),
                PublishedEvent::Count(_) => None,
            })
            .collect()
    }

    fn record(&self, event: PublishedEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow!("recording publisher lock poisoned"))?
            .push(event);
        Ok(())
    }
}

impl EventPublisher for RecordingPublisher {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish_count(&mut self, payload: CountPayload) -> Result<()> {
        self.record(PublishedEvent::Count(payload))
    }

    fn publish_duration(&mut self, payload: DurationPayload) -> Result<()> {
        self.record(PublishedEvent::Duration(payload))
    }
}

#[derive(Serialize)]
struct JsonLine<'a, T: Serialize> {
    topic: &'a str,
    payload: &'a T,
}

/// Writes one `{"topic": ..., "payload": ...}` JSON object per line.
pub struct JsonLinesPublisher<W: Write + Send> {
    writer: W,
    count_topic: String,
    duration_topic: String,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(writer: W, topic_prefix: Option<&str>) -> Self {
        Self {
            writer,
            count_topic: topic(topic_prefix, TOPIC_COUNT),
            duration_topic: topic(topic_prefix, TOPIC_DURATION),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, topic: &str, payload: &T) -> Result<()> {
        let line = serde_json::to_string(&JsonLine { topic, payload })?;
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}

impl<W: Write + Send> EventPublisher for JsonLinesPublisher<W> {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    fn publish_count(&mut self, payload: CountPayload) -> Result<()> {
        let topic = self.count_topic.clone();
        self.write_line(&topic, &payload)
    }

    fn publish_duration(&mut self, payload: DurationPayload) -> Result<()> {
        let topic = self.duration_topic.clone();
        self.write_line(&topic, &payload)
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
