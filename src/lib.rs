//! People Counter
//!
//! Turns per-frame person detections from a video stream into a denoised
//! occupancy count, a running total of people who entered, and the duration
//! of each occupancy episode, and publishes them as events.
//!
//! # Pipeline
//!
//! ```text
//! detections -> filter -> raw count -> denoiser -> stable count
//!            -> occupancy state machine -> (count, total, duration?) -> publisher
//! ```
//!
//! # Module Structure
//!
//! - `detect`: Detection types and the probability-threshold filter
//! - `denoise`: Sliding-window mode over raw counts
//! - `occupancy`: Entry/exit state machine, totals and episode durations
//! - `pipeline`: `PeopleCounter`, which wires the stages together per frame
//! - `publish`: Event payloads and the `EventPublisher` contract
//! - `transport`: MQTT publisher
//! - `ingest`: Detection sources (JSON-lines replay, scripted stub)
//! - `config`: File + environment configuration
//!
//! Model inference, video decoding and frame rendering are outside this
//! crate; detections arrive through `ingest::DetectionSource`.

pub mod config;
pub mod denoise;
pub mod detect;
pub mod ingest;
pub mod occupancy;
pub mod pipeline;
pub mod publish;
pub mod transport;

pub use config::{CounterConfig, CountingSettings, MqttConfig};
pub use denoise::{CountWindow, Denoiser};
pub use detect::{
    filter_detections, BoundingBox, Detection, FilteredDetections, FrameDetectionSet, ObjectClass,
};
pub use ingest::{open_source, DetectionSource, ReplaySource, ScriptedSource};
pub use occupancy::{OccupancyMachine, OccupancyState, StepResult, Transition};
pub use pipeline::{FrameReport, PeopleCounter, SessionSummary};
pub use publish::{
    CountPayload, DurationPayload, EventPublisher, JsonLinesPublisher, PublishedEvent,
    RecordingPublisher, TOPIC_COUNT, TOPIC_DURATION,
};
pub use transport::{MqttEndpoint, MqttPublisher, MqttSettings, TlsMaterials};
