//! Synthetic detections from a scripted list of per-frame person counts.
//!
//! `stub://0,0,1,1,2,1,0` yields seven frames with that many people each.
//! Every detection scores `SCRIPTED_CONFIDENCE`, so all of them clear the
//! default threshold.

use anyhow::{anyhow, Result};

use super::DetectionSource;
use crate::detect::{BoundingBox, Detection, FrameDetectionSet};

pub const SCRIPTED_CONFIDENCE: f32 = 0.9;

/// Largest per-frame count a script may request.
pub const MAX_SCRIPTED_PEOPLE: u32 = 1024;

pub struct ScriptedSource {
    counts: Vec<u32>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(counts: Vec<u32>) -> Result<Self> {
        if let Some(&people) = counts.iter().find(|&&people| people > MAX_SCRIPTED_PEOPLE) {
            return Err(anyhow!(
                "scripted count {} exceeds the per-frame limit of {}",
                people,
                MAX_SCRIPTED_PEOPLE
            ));
        }
        Ok(Self { counts, cursor: 0 })
    }

    /// Parse a `stub://` URL (or a bare comma-separated list).
    pub fn parse(script: &str) -> Result<Self> {
        let list = script.strip_prefix("stub://").unwrap_or(script);
        let counts = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<u32>()
                    .map_err(|_| anyhow!("invalid scripted count '{}'", entry))
            })
            .collect::<Result<Vec<_>>>()?;
        if counts.is_empty() {
            return Err(anyhow!("scripted source needs at least one count"));
        }
        Self::new(counts)
    }

    pub fn remaining(&self) -> usize {
        self.counts.len() - self.cursor
    }
}

fn synthetic_person(slot: u32, people: u32) -> Detection {
    let width = 1.0 / people.max(1) as f32;
    let x_min = slot as f32 * width;
    Detection::person(
        SCRIPTED_CONFIDENCE,
        BoundingBox {
            x_min,
            y_min: 0.2,
            x_max: x_min + width * 0.8,
            y_max: 0.9,
        },
    )
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn next_frame(&mut self) -> Result<Option<FrameDetectionSet>> {
        let Some(&people) = self.counts.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        self.cursor += 1;
        let detections = (0..people).map(|slot| synthetic_person(slot, people)).collect();
        Ok(Some(FrameDetectionSet::new(detections).with_index(index)))
    }
}
