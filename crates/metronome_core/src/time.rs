//! # Frame Timing
//!
//! ```text
//!   now() ──▶ FrameClock ──delta──▶ FixedTimestep ──steps──▶ FixedStep pass
//!                                        │
//!                                        └──alpha──▶ Rendering (interpolation)
//! ```
//!
//! - [`FrameClock`] turns absolute timestamps into clamped frame deltas.
//! - [`FixedTimestep`] accumulates deltas and hands out whole fixed steps.
//! - [`Time`] is the snapshot published to systems as a resource.

/// Fraction of one fixed step the accumulator is clamped to after the step
/// cap is hit.
pub const SPIRAL_CLAMP_RATIO: f64 = 0.999;

/// Timing snapshot, available to systems as a permanent resource.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Time {
    /// Seconds since the previous frame.
    pub delta: f64,
    /// Length of one fixed step in seconds.
    pub fixed_delta: f64,
    /// Sum of all frame deltas.
    pub elapsed: f64,
    /// Simulated time: fixed steps run times `fixed_delta`.
    pub fixed_elapsed: f64,
    /// Frames run so far, counting the current one.
    pub frame: u64,
    /// Fixed steps run so far.
    pub fixed_tick: u64,
    /// Fraction of a fixed step left in the accumulator, in `[0, 1)`.
    pub alpha: f64,
}

impl Time {
    /// A zeroed snapshot for the given fixed step.
    #[must_use]
    pub fn new(fixed_delta: f64) -> Self {
        Self {
            fixed_delta,
            ..Self::default()
        }
    }
}

/// Converts wall-clock samples into frame deltas.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    last: Option<f64>,
    max_delta: f64,
}

impl FrameClock {
    /// Creates a clock whose deltas never exceed `max_delta` seconds.
    #[must_use]
    pub const fn new(max_delta: f64) -> Self {
        Self {
            last: None,
            max_delta,
        }
    }

    /// Records `now` and returns the seconds since the previous sample.
    ///
    /// The first sample returns 0. A clock that goes backwards yields 0.
    pub fn sample(&mut self, now: f64) -> f64 {
        let delta = self.last.map_or(0.0, |last| now - last);
        self.last = Some(now);
        delta.clamp(0.0, self.max_delta)
    }

    /// Forgets the previous sample.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Upper bound on returned deltas.
    #[must_use]
    pub const fn max_delta(&self) -> f64 {
        self.max_delta
    }
}

/// Fixed-step accumulator with a per-frame step cap.
///
/// Call [`accumulate`](Self::accumulate) once per frame, then
/// [`try_consume`](Self::try_consume) until it returns false, then
/// [`finish_frame`](Self::finish_frame).
#[derive(Clone, Copy, Debug)]
pub struct FixedTimestep {
    step: f64,
    max_steps: u32,
    accumulator: f64,
    steps_this_frame: u32,
    total_steps: u64,
}

impl FixedTimestep {
    /// Creates a timestep of `step` seconds running at most `max_steps` per frame.
    #[must_use]
    pub const fn new(step: f64, max_steps: u32) -> Self {
        Self {
            step,
            max_steps,
            accumulator: 0.0,
            steps_this_frame: 0,
            total_steps: 0,
        }
    }

    /// Starts a frame by adding `delta` seconds to the accumulator.
    pub fn accumulate(&mut self, delta: f64) {
        self.accumulator += delta.max(0.0);
        self.steps_this_frame = 0;
    }

    /// Caps the accumulator at `max` seconds.
    pub fn clamp_accumulator(&mut self, max: f64) {
        self.accumulator = self.accumulator.min(max);
    }

    /// Consumes one fixed step if a whole step is available and the cap
    /// has not been reached.
    pub fn try_consume(&mut self) -> bool {
        if self.steps_this_frame >= self.max_steps || self.accumulator < self.step {
            return false;
        }
        self.accumulator -= self.step;
        self.steps_this_frame += 1;
        self.total_steps += 1;
        true
    }

    /// Ends the frame.
    ///
    /// If the cap was hit with at least one whole step still owed, the
    /// accumulator drops to just under one step. Returns the seconds shed.
    pub fn finish_frame(&mut self) -> f64 {
        if self.steps_this_frame < self.max_steps || self.accumulator < self.step {
            return 0.0;
        }
        let kept = self.step * SPIRAL_CLAMP_RATIO;
        let shed = self.accumulator - kept;
        self.accumulator = kept;
        shed
    }

    /// Interpolation factor between the last two fixed steps, in `[0, 1)`.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        if self.step <= 0.0 {
            return 0.0;
        }
        (self.accumulator / self.step).clamp(0.0, 1.0)
    }

    /// Seconds of simulation time owed.
    #[must_use]
    pub const fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Length of one step in seconds.
    #[must_use]
    pub const fn step(&self) -> f64 {
        self.step
    }

    /// Maximum steps per frame.
    #[must_use]
    pub const fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Steps consumed since the last [`accumulate`](Self::accumulate).
    #[must_use]
    pub const fn steps_this_frame(&self) -> u32 {
        self.steps_this_frame
    }

    /// Steps consumed over the whole run.
    #[must_use]
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f64 = 1.0 / 60.0;

    fn drain(timestep: &mut FixedTimestep) -> u32 {
        let mut steps = 0;
        while timestep.try_consume() {
            steps += 1;
        }
        steps
    }

    #[test]
    fn test_clock_first_sample_is_zero() {
        let mut clock = FrameClock::new(0.25);
        assert_eq!(clock.sample(10.0), 0.0);
        assert!((clock.sample(10.016) - 0.016).abs() < 1e-9);
    }

    #[test]
    fn test_clock_clamps_both_ends() {
        let mut clock = FrameClock::new(0.25);
        clock.sample(5.0);
        assert_eq!(clock.sample(7.0), 0.25);
        assert_eq!(clock.sample(6.0), 0.0);
    }

    #[test]
    fn test_exact_multiple_runs_whole_steps() {
        let mut timestep = FixedTimestep::new(0.25, 8);
        timestep.accumulate(0.75);
        assert_eq!(drain(&mut timestep), 3);
        assert_eq!(timestep.finish_frame(), 0.0);
        assert_eq!(timestep.accumulator(), 0.0);
    }

    #[test]
    fn test_remainder_carries_over() {
        let mut timestep = FixedTimestep::new(STEP, 8);
        timestep.accumulate(STEP * 0.5);
        assert_eq!(drain(&mut timestep), 0);
        assert!((timestep.alpha() - 0.5).abs() < 1e-9);

        timestep.accumulate(STEP * 0.75);
        assert_eq!(drain(&mut timestep), 1);
        assert!((timestep.alpha() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_cap_limits_steps_and_sheds_excess() {
        let mut timestep = FixedTimestep::new(0.1, 3);
        timestep.accumulate(1.0);
        assert_eq!(drain(&mut timestep), 3);

        let shed = timestep.finish_frame();
        assert!(shed > 0.6);
        assert!(timestep.accumulator() < timestep.step());
        assert!(timestep.alpha() < 1.0);
    }

    #[test]
    fn test_cap_hit_without_debt_sheds_nothing() {
        let mut timestep = FixedTimestep::new(0.1, 2);
        timestep.accumulate(0.25);
        assert_eq!(drain(&mut timestep), 2);
        assert_eq!(timestep.finish_frame(), 0.0);
        assert!((timestep.accumulator() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_clamp_accumulator() {
        let mut timestep = FixedTimestep::new(STEP, 100);
        timestep.accumulate(2.0);
        timestep.clamp_accumulator(0.26);
        assert_eq!(timestep.accumulator(), 0.26);
        assert_eq!(drain(&mut timestep), 15);
        assert_eq!(timestep.total_steps(), 15);
    }

    #[test]
    fn test_negative_delta_ignored() {
        let mut timestep = FixedTimestep::new(STEP, 8);
        timestep.accumulate(-1.0);
        assert_eq!(timestep.accumulator(), 0.0);
    }
}
