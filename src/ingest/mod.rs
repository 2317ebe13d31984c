//! Detection sources.
//!
//! Model inference and video decoding live outside this crate; a source
//! hands the counter one `FrameDetectionSet` per frame, in frame order:
//! - `ReplaySource`: JSON-lines detection logs recorded by an inference process
//! - `ScriptedSource`: synthetic frames from a `stub://` count script (testing)

pub mod replay;
pub mod scripted;

use anyhow::Result;

use crate::detect::FrameDetectionSet;

pub use replay::ReplaySource;
pub use scripted::ScriptedSource;

pub trait DetectionSource: Send {
    fn name(&self) -> &'static str;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<FrameDetectionSet>>;
}

/// Open a source from a CLI input: `stub://...` scripts or a JSON-lines path.
pub fn open_source(input: &str) -> Result<Box<dyn DetectionSource>> {
    if input.starts_with("stub://") {
        return Ok(Box::new(ScriptedSource::parse(input)?));
    }
    Ok(Box::new(ReplaySource::open(input)?))
}
