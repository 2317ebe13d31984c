//! Per-frame counting pipeline.
//!
//! `PeopleCounter` owns one denoiser and one state machine and drives them
//! with person detections: filter, raw count, stable count, transition,
//! publish. It is single-threaded and must be fed frames in order; callers
//! ingesting from several threads should funnel frames through one queue
//! into a single counter.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::config::CountingSettings;
use crate::denoise::Denoiser;
use crate::detect::{filter_detections, FrameDetectionSet};
use crate::occupancy::{OccupancyMachine, Transition};
use crate::publish::{CountPayload, DurationPayload, EventPublisher};

/// Minimum spacing between publish-failure warnings.
const PUBLISH_FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What happened on one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// People above the threshold in this frame, before denoising.
    pub raw_count: u32,
    pub stable_count: u32,
    pub transition: Transition,
    pub total: u64,
    /// Seconds, set on the frame an episode closes.
    pub duration: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub current_count: u32,
    pub total: u64,
    pub episodes_closed: u64,
    pub publish_failures: u64,
}

pub struct PeopleCounter {
    settings: CountingSettings,
    denoiser: Denoiser,
    machine: OccupancyMachine,
    publisher: Option<Box<dyn EventPublisher>>,
    /// `None` until the first frame fixes the sequence origin.
    next_frame_index: Option<u64>,
    frames_processed: u64,
    publish_failures: u64,
    last_failure_log: Option<Instant>,
    suppressed_failures: u64,
}

impl PeopleCounter {
    /// Settings are validated here, before any frame is processed.
    pub fn new(settings: CountingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            denoiser: Denoiser::new(settings.window_size)?,
            machine: OccupancyMachine::new(settings.fps)?,
            settings,
            publisher: None,
            next_frame_index: None,
            frames_processed: 0,
            publish_failures: 0,
            last_failure_log: None,
            suppressed_failures: 0,
        })
    }

    pub fn with_publisher(mut self, publisher: Box<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn settings(&self) -> &CountingSettings {
        &self.settings
    }

    pub fn machine(&self) -> &OccupancyMachine {
        &self.machine
    }

    pub fn process_frame(&mut self, frame: &FrameDetectionSet) -> Result<FrameReport> {
        let frame_index = self.check_sequence(frame.frame_index)?;

        let filtered = filter_detections(frame.people(), self.settings.prob_threshold);
        let raw_count = u32::try_from(filtered.count)
            .map_err(|_| anyhow!("frame {} has too many detections", frame_index))?;
        let stable_count = self.denoiser.observe(raw_count);
        let step = self.machine.step(stable_count);
        self.frames_processed += 1;

        log::trace!(
            "frame {}: raw={} stable={} total={}",
            frame_index,
            raw_count,
            stable_count,
            step.total
        );

        self.publish(step.count, step.total, step.duration);

        Ok(FrameReport {
            frame_index,
            raw_count,
            stable_count,
            transition: step.transition,
            total: step.total,
            duration: step.duration,
        })
    }

    /// Resolve the index of an incoming frame and enforce ordering.
    ///
    /// The first frame sets the origin (its own index, or 0 when it carries
    /// none); every later indexed frame must follow its predecessor.
    fn check_sequence(&mut self, supplied: Option<u64>) -> Result<u64> {
        let index = match (self.next_frame_index, supplied) {
            (None, supplied) => supplied.unwrap_or(0),
            (Some(expected), None) => expected,
            (Some(expected), Some(index)) if index == expected => index,
            (Some(expected), Some(index)) => {
                if self.settings.strict_sequence {
                    return Err(anyhow!(
                        "frame sequence violation: expected frame {}, received {}",
                        expected,
                        index
                    ));
                }
                log::warn!(
                    "frame sequence gap: expected frame {}, received {}; durations may be skewed",
                    expected,
                    index
                );
                index
            }
        };
        self.next_frame_index = Some(index.saturating_add(1));
        Ok(index)
    }

    fn publish(&mut self, count: u32, total: u64, duration: Option<f64>) {
        let Some(publisher) = self.publisher.as_mut() else {
            return;
        };
        let mut failures = Vec::new();
        if let Err(e) = publisher.publish_count(CountPayload { count, total }) {
            failures.push(("count", e));
        }
        if let Some(duration) = duration {
            if let Err(e) = publisher.publish_duration(DurationPayload { duration }) {
                failures.push(("duration", e));
            }
        }
        let name = publisher.name();
        for (event, e) in failures {
            self.record_publish_failure(name, event, &e);
        }
    }

    /// Count a dropped event; warn at most once per interval.
    fn record_publish_failure(&mut self, publisher: &str, event: &str, error: &anyhow::Error) {
        self.publish_failures += 1;
        let due = self
            .last_failure_log
            .map_or(true, |at| at.elapsed() >= PUBLISH_FAILURE_LOG_INTERVAL);
        if !due {
            self.suppressed_failures += 1;
            return;
        }
        if self.suppressed_failures > 0 {
            log::warn!(
                "{} publisher: {} event dropped: {} ({} more dropped since last report)",
                publisher,
                event,
                error,
                self.suppressed_failures
            );
        } else {
            log::warn!("{} publisher: {} event dropped: {}", publisher, event, error);
        }
        self.suppressed_failures = 0;
        self.last_failure_log = Some(Instant::now());
    }

    pub fn summary(&self) -> SessionSummary {
        let state = self.machine.state();
        SessionSummary {
            frames_processed: self.frames_processed,
            current_count: state.current_stable_count(),
            total: state.cumulative_total(),
            episodes_closed: state.episodes_closed(),
            publish_failures: self.publish_failures,
        }
    }

    /// Close the publisher (if any) and return the session summary.
    ///
    /// A publisher that fails to close counts as one more publish failure;
    /// the session itself still completes.
    pub fn finish(mut self) -> Result<SessionSummary> {
        if let Some(mut publisher) = self.publisher.take() {
            if let Err(e) = publisher.close() {
                self.publish_failures += 1;
                log::warn!("{} publisher: close failed: {}", publisher.name(), e);
            }
        }
        if self.suppressed_failures > 0 {
            log::warn!(
                "{} publish failures were not logged individually",
                self.suppressed_failures
            );
        }
        Ok(self.summary())
    }
}
