use super::result::Detection;

/// Detections that cleared the probability threshold for one frame.
#[derive(Debug)]
pub struct FilteredDetections<'a> {
    /// Kept detections, in input order.
    pub kept: Vec<&'a Detection>,
    pub count: usize,
}

/// Keep every detection with `confidence >= prob_threshold`.
///
/// Pure; an empty input yields an empty result with a zero count.
pub fn filter_detections<'a, I>(detections: I, prob_threshold: f32) -> FilteredDetections<'a>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let kept: Vec<&Detection> = detections
        .into_iter()
        .filter(|d| d.confidence >= prob_threshold)
        .collect();
    let count = kept.len();
    FilteredDetections { kept, count }
}
