//! Sliding-window denoising of raw per-frame counts.
//!
//! Raw detection counts jitter from single-frame false positives and misses.
//! `Denoiser` keeps the last `window_size` raw counts and reports their mode,
//! which suppresses one-frame spikes while following a genuine change within
//! `window_size` frames.
//!
//! Ties between equally frequent values resolve to the **smallest** value, so
//! an evenly split window leans toward fewer people present.

use std::collections::{BTreeMap, VecDeque};

use anyhow::{anyhow, Result};

/// Fixed-capacity FIFO of raw counts with an incrementally maintained
/// frequency table.
///
/// Starts filled with zeros; its length always equals its capacity.
#[derive(Clone, Debug)]
pub struct CountWindow {
    entries: VecDeque<u32>,
    frequencies: BTreeMap<u32, usize>,
}

impl CountWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("window_size must be at least 1"));
        }
        let mut frequencies = BTreeMap::new();
        frequencies.insert(0, capacity);
        Ok(Self {
            entries: std::iter::repeat(0).take(capacity).collect(),
            frequencies,
        })
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().copied()
    }

    /// Drop the oldest count and append `count`.
    pub fn push(&mut self, count: u32) {
        if let Some(oldest) = self.entries.pop_front() {
            if let Some(freq) = self.frequencies.get_mut(&oldest) {
                *freq -= 1;
                if *freq == 0 {
                    self.frequencies.remove(&oldest);
                }
            }
        }
        self.entries.push_back(count);
        *self.frequencies.entry(count).or_insert(0) += 1;
    }

    /// Most frequent value; the smallest one wins a tie.
    pub fn mode(&self) -> u32 {
        let mut best = (0u32, 0usize);
        // BTreeMap iterates ascending, so a strict `>` keeps the smallest tied value.
        for (&value, &freq) in &self.frequencies {
            if freq > best.1 {
                best = (value, freq);
            }
        }
        best.0
    }
}

/// Majority-vote filter producing the stable count for each frame.
#[derive(Clone, Debug)]
pub struct Denoiser {
    window: CountWindow,
}

impl Denoiser {
    pub fn new(window_size: usize) -> Result<Self> {
        Ok(Self {
            window: CountWindow::new(window_size)?,
        })
    }

    /// Record this frame's raw count and return the stable count.
    pub fn observe(&mut self, raw_count: u32) -> u32 {
        self.window.push(raw_count);
        self.window.mode()
    }

    pub fn window(&self) -> &CountWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(denoiser: &mut Denoiser, counts: &[u32]) -> u32 {
        counts
            .iter()
            .fold(0, |_, &count| denoiser.observe(count))
    }

    #[test]
    fn rejects_zero_window() {
        let err = Denoiser::new(0).unwrap_err();
        assert!(err.to_string().contains("window_size"));
    }

    #[test]
    fn window_starts_full_of_zeros() {
        let denoiser = Denoiser::new(10).unwrap();
        assert_eq!(denoiser.window().len(), 10);
        assert!(denoiser.window().iter().all(|c| c == 0));
    }

    #[test]
    fn window_length_never_changes() {
        let mut denoiser = Denoiser::new(4).unwrap();
        for count in [3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5] {
            denoiser.observe(count);
            assert_eq!(denoiser.window().len(), 4);
        }
        let contents: Vec<u32> = denoiser.window().iter().collect();
        assert_eq!(contents, vec![6, 5, 3, 5]);
    }

    #[test]
    fn early_frames_are_biased_toward_empty() {
        let mut denoiser = Denoiser::new(10).unwrap();
        for _ in 0..4 {
            assert_eq!(denoiser.observe(1), 0);
        }
        // Five ones against five zeros: tie resolves to zero.
        assert_eq!(denoiser.observe(1), 0);
        assert_eq!(denoiser.observe(1), 1);
    }

    #[test]
    fn majority_wins() {
        let mut denoiser = Denoiser::new(10).unwrap();
        assert_eq!(feed(&mut denoiser, &[0, 0, 0, 1, 1, 1, 1, 0, 0, 0]), 0);
        assert_eq!(feed(&mut denoiser, &[1, 1, 1, 1, 1, 1, 1, 0, 0, 0]), 1);
    }

    #[test]
    fn even_split_resolves_to_smallest_value() {
        let window = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        for _ in 0..3 {
            let mut denoiser = Denoiser::new(10).unwrap();
            assert_eq!(feed(&mut denoiser, &window), 0);
        }

        let mut denoiser = Denoiser::new(4).unwrap();
        assert_eq!(feed(&mut denoiser, &[3, 2, 3, 2]), 2);
    }

    #[test]
    fn single_frame_spike_is_suppressed() {
        let mut denoiser = Denoiser::new(5).unwrap();
        feed(&mut denoiser, &[2, 2, 2, 2, 2]);
        assert_eq!(denoiser.observe(7), 2);
        assert_eq!(denoiser.observe(0), 2);
        assert_eq!(denoiser.observe(2), 2);
    }

    #[test]
    fn frequency_table_tracks_evictions() {
        let mut window = CountWindow::new(3).unwrap();
        window.push(4);
        window.push(4);
        window.push(4);
        assert_eq!(window.mode(), 4);
        window.push(1);
        window.push(1);
        assert_eq!(window.mode(), 1);
        assert!(window.iter().all(|c| c != 0));
    }

    #[test]
    fn unit_window_follows_input() {
        let mut denoiser = Denoiser::new(1).unwrap();
        assert_eq!(denoiser.observe(3), 3);
        assert_eq!(denoiser.observe(0), 0);
        assert_eq!(denoiser.observe(12), 12);
    }
}
