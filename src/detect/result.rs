/// One candidate object reported by the inference collaborator for a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    /// Detector score in [0, 1].
    pub confidence: f32,
    /// Passed through for drawing; never used for counting.
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn person(confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class: ObjectClass::Person,
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class == ObjectClass::Person
    }
}

/// Box corners in the detector's output coordinate space (usually normalized 0..1).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from(coords: [f32; 4]) -> Self {
        Self {
            x_min: coords[0],
            y_min: coords[1],
            x_max: coords[2],
            y_max: coords[3],
        }
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Unknown,
}

impl ObjectClass {
    /// Map a free-form detector label ("person", "Person", "car", ...) to a class.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "person" | "people" | "pedestrian" => Self::Person,
            "car" | "truck" | "bus" | "motorcycle" | "bicycle" | "vehicle" => Self::Vehicle,
            "dog" | "cat" | "bird" | "horse" | "animal" => Self::Animal,
            _ => Self::Unknown,
        }
    }
}

/// Detections for a single frame, in detector output order.
///
/// Created per frame and dropped once the frame is processed.
#[derive(Clone, Debug, Default)]
pub struct FrameDetectionSet {
    /// Source frame index, when the collaborator supplies one.
    pub frame_index: Option<u64>,
    pub detections: Vec<Detection>,
}

impl FrameDetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            frame_index: None,
            detections,
        }
    }

    pub fn with_index(mut self, frame_index: u64) -> Self {
        self.frame_index = Some(frame_index);
        self
    }

    /// Person detections only, preserving input order.
    pub fn people(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter().filter(|d| d.is_person())
    }
}
