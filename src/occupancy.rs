//! Occupancy state machine.
//!
//! Consumes one stable count per frame and turns frame-to-frame deltas into
//! entry/exit transitions, a cumulative total and episode durations.
//!
//! # Frame ordering
//!
//! `OccupancyMachine::step` must be called exactly once per processed frame,
//! in frame order and without gaps. Episode durations are derived from a
//! frame counter and the nominal fps, so skipped frames shorten the reported
//! duration. The machine does not detect this; `PeopleCounter` can reject
//! out-of-sequence frames when strict sequencing is enabled.

use anyhow::{anyhow, Result};

/// Classification of one frame-to-frame change in the stable count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// People entered; carries the positive delta.
    Increase { entered: u32 },
    /// People left; carries the magnitude of the negative delta.
    Decrease { left: u32 },
    Steady,
}

/// Outcome of one `step`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    pub count: u32,
    pub total: u64,
    pub transition: Transition,
    /// Seconds the closing episode lasted; only set on a decrease.
    pub duration: Option<f64>,
}

impl StepResult {
    pub fn duration_ready(&self) -> bool {
        self.duration.is_some()
    }
}

/// Session-long state. Only `OccupancyMachine::step` mutates it.
#[derive(Clone, Debug, Default)]
pub struct OccupancyState {
    previous_stable: u32,
    current_stable: u32,
    cumulative_total: u64,
    episode_open: bool,
    episode_frames: u64,
    pending_duration: Option<f64>,
    episodes_opened: u64,
    episodes_closed: u64,
}

impl OccupancyState {
    pub fn previous_stable_count(&self) -> u32 {
        self.previous_stable
    }

    pub fn current_stable_count(&self) -> u32 {
        self.current_stable
    }

    pub fn cumulative_total(&self) -> u64 {
        self.cumulative_total
    }

    pub fn episode_open(&self) -> bool {
        self.episode_open
    }

    pub fn episode_frame_count(&self) -> u64 {
        self.episode_frames
    }

    pub fn episodes_closed(&self) -> u64 {
        self.episodes_closed
    }
}

pub struct OccupancyMachine {
    fps: f64,
    state: OccupancyState,
}

impl OccupancyMachine {
    /// `fps` is the nominal frame rate used to convert frame counts to seconds.
    pub fn new(fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(anyhow!("fps must be a finite value greater than zero"));
        }
        Ok(Self {
            fps,
            state: OccupancyState::default(),
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn state(&self) -> &OccupancyState {
        &self.state
    }

    /// Advance by one frame with this frame's stable count.
    pub fn step(&mut self, stable_count: u32) -> StepResult {
        let state = &mut self.state;
        // A pending duration is only valid for the frame that produced it.
        state.pending_duration = None;

        state.previous_stable = state.current_stable;
        state.current_stable = stable_count;
        let delta = i64::from(state.current_stable) - i64::from(state.previous_stable);

        let transition = if delta > 0 {
            state.cumulative_total += delta as u64;
            state.episode_frames = 0;
            state.episode_open = true;
            state.episodes_opened += 1;
            log::debug!(
                "occupancy increase: +{} count={} total={}",
                delta,
                state.current_stable,
                state.cumulative_total
            );
            Transition::Increase {
                entered: delta as u32,
            }
        } else if delta < 0 {
            if state.episodes_opened == 0 {
                log::warn!(
                    "occupancy decreased before any episode opened; reporting zero duration"
                );
            }
            let duration = state.episode_frames as f64 / self.fps;
            state.pending_duration = Some(duration);
            state.episode_open = false;
            state.episodes_closed += 1;
            log::info!(
                "occupancy episode closed after {} frames ({:.2}s), count={}",
                state.episode_frames,
                duration,
                state.current_stable
            );
            Transition::Decrease {
                left: delta.unsigned_abs() as u32,
            }
        } else {
            if state.episode_open {
                state.episode_frames += 1;
            }
            Transition::Steady
        };

        StepResult {
            count: state.current_stable,
            total: state.cumulative_total,
            transition,
            duration: state.pending_duration,
        }
    }

    /// Read the duration produced by the most recent step, clearing it.
    pub fn take_pending_duration(&mut self) -> Option<f64> {
        self.state.pending_duration.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(machine: &mut OccupancyMachine, counts: &[u32]) -> Vec<StepResult> {
        counts.iter().map(|&c| machine.step(c)).collect()
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("duration should be ready");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn rejects_invalid_fps() {
        assert!(OccupancyMachine::new(0.0).is_err());
        assert!(OccupancyMachine::new(-5.0).is_err());
        assert!(OccupancyMachine::new(f64::NAN).is_err());
        assert!(OccupancyMachine::new(f64::INFINITY).is_err());
        assert!(OccupancyMachine::new(10.0).is_ok());
    }

    #[test]
    fn entry_and_exit_sequence() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        let results = run(&mut machine, &[0, 0, 1, 1, 1, 2, 2, 1, 0]);

        assert_eq!(results[0].transition, Transition::Steady);
        assert_eq!(results[1].transition, Transition::Steady);

        assert_eq!(results[2].transition, Transition::Increase { entered: 1 });
        assert_eq!((results[2].count, results[2].total), (1, 1));

        assert_eq!(results[5].transition, Transition::Increase { entered: 1 });
        assert_eq!((results[5].count, results[5].total), (2, 2));

        // Index 5 reset the counter; only frame 6 was steady before the exit.
        assert_eq!(results[7].transition, Transition::Decrease { left: 1 });
        assert_eq!(results[7].count, 1);
        assert_close(results[7].duration, 0.1);

        assert_eq!(results[8].transition, Transition::Decrease { left: 1 });
        assert_eq!(results[8].count, 0);
        assert_close(results[8].duration, 0.1);

        for (i, result) in results.iter().enumerate() {
            if i != 7 && i != 8 {
                assert!(!result.duration_ready(), "unexpected duration at {i}");
            }
        }
    }

    #[test]
    fn duration_counts_steady_frames_since_last_increase() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        let results = run(&mut machine, &[1, 1, 1, 0]);
        assert_close(results[3].duration, 0.2);
        assert!(!machine.state().episode_open());
    }

    #[test]
    fn total_is_monotonic() {
        let mut machine = OccupancyMachine::new(25.0).unwrap();
        let counts = [0, 3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 0, 0, 8];
        let results = run(&mut machine, &counts);
        for pair in results.windows(2) {
            assert!(pair[1].total >= pair[0].total);
        }
        // Sum of positive deltas: 3 + 3 + 4 + 4 + 4 + 2 + 8.
        assert_eq!(results.last().unwrap().total, 28);
    }

    #[test]
    fn no_duration_without_decrease() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        for result in run(&mut machine, &[0, 1, 1, 2, 2, 2, 3, 3, 5]) {
            assert!(!result.duration_ready());
        }
    }

    #[test]
    fn repeated_count_is_a_no_op_for_total() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        machine.step(2);
        for _ in 0..5 {
            let result = machine.step(2);
            assert_eq!(result.transition, Transition::Steady);
            assert_eq!(result.total, 2);
            assert!(!result.duration_ready());
        }
        assert_eq!(machine.state().episode_frame_count(), 5);
    }

    #[test]
    fn aggregate_exit_yields_single_duration() {
        let mut machine = OccupancyMachine::new(5.0).unwrap();
        let results = run(&mut machine, &[3, 3, 3, 0]);
        assert_eq!(results[3].transition, Transition::Decrease { left: 3 });
        assert_close(results[3].duration, 0.4);
        assert_eq!(machine.state().episodes_closed(), 1);
    }

    #[test]
    fn steady_frames_without_episode_do_not_count() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        run(&mut machine, &[0, 0, 0, 0]);
        assert_eq!(machine.state().episode_frame_count(), 0);
        assert!(!machine.state().episode_open());
    }

    #[test]
    fn pending_duration_is_cleared_after_read() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        run(&mut machine, &[1, 1, 0]);
        assert_close(machine.take_pending_duration(), 0.1);
        assert_eq!(machine.take_pending_duration(), None);
    }

    #[test]
    fn pending_duration_lasts_one_frame() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        run(&mut machine, &[1, 1, 0]);
        let next = machine.step(0);
        assert!(!next.duration_ready());
        assert_eq!(machine.take_pending_duration(), None);
    }

    #[test]
    fn state_tracks_previous_and_current() {
        let mut machine = OccupancyMachine::new(10.0).unwrap();
        machine.step(2);
        machine.step(1);
        assert_eq!(machine.state().previous_stable_count(), 2);
        assert_eq!(machine.state().current_stable_count(), 1);
        assert_eq!(machine.state().cumulative_total(), 2);
    }
}
