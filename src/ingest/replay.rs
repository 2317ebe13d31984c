//! JSON-lines detection replay.
//!
//! Each non-blank line describes one frame:
//!
//! ```text
//! {"frame": 0, "detections": [{"label": "person", "confidence": 0.91, "bbox": [0.1, 0.2, 0.3, 0.8]}]}
//! ```
//!
//! `frame` is optional. `bbox` is `[x_min, y_min, x_max, y_max]` and defaults
//! to all zeros when absent.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use super::DetectionSource;
use crate::detect::{BoundingBox, Detection, FrameDetectionSet, ObjectClass};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrameRecord {
    #[serde(default)]
    frame: Option<u64>,
    #[serde(default)]
    detections: Vec<DetectionRecord>,
}

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    label: String,
    confidence: f32,
    #[serde(default)]
    bbox: [f32; 4],
}

impl DetectionRecord {
    fn into_detection(self, line: usize) -> Result<Detection> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "line {}: confidence {} is outside [0, 1]",
                line,
                self.confidence
            ));
        }
        Ok(Detection {
            class: ObjectClass::from_label(&self.label),
            confidence: self.confidence,
            bbox: BoundingBox::from(self.bbox),
        })
    }
}

/// Replays recorded per-frame detections from a JSON-lines stream.
pub struct ReplaySource<R: BufRead> {
    reader: R,
    line_no: usize,
    frames_read: u64,
}

impl ReplaySource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open detection log {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn parse_line(&self, line: &str) -> Result<FrameDetectionSet> {
        let record: FrameRecord = serde_json::from_str(line)
            .map_err(|e| anyhow!("line {}: invalid frame record: {}", self.line_no, e))?;
        let detections = record
            .detections
            .into_iter()
            .map(|d| d.into_detection(self.line_no))
            .collect::<Result<Vec<_>>>()?;
        Ok(FrameDetectionSet {
            frame_index: record.frame,
            detections,
        })
    }
}

impl<R: BufRead + Send> DetectionSource for ReplaySource<R> {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetectionSet>> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .with_context(|| format!("failed to read line {}", self.line_no + 1))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let frame = self.parse_line(line.trim())?;
            self.frames_read += 1;
            return Ok(Some(frame));
        }
    }
}
