mod filter;
mod result;

pub use filter::{filter_detections, FilteredDetections};
pub use result::{BoundingBox, Detection, FrameDetectionSet, ObjectClass};
