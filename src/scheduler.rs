//! Maps elapsed wall-clock time to a number of simulation days to advance.
//!
//! The execution host ticks at a fixed display rate (~60 Hz) while the
//! engine advances in whole days. This component is the pure glue between
//! the two clocks: it accumulates `elapsed × speed` fractional days and
//! releases whole steps, capped per tick so one tick can never do unbounded
//! work. At speed 1 a sustained run advances one simulated day per
//! wall-clock second; at speed 10, ten.

use std::time::Duration;

/// Accumulator-based step scheduler. Deterministic given the sequence of
/// elapsed intervals, and independently testable from the engine.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    /// Simulated days per wall-clock second.
    speed: f64,
    /// Hard cap on steps released per tick (bounded backpressure).
    max_steps_per_frame: u32,
    /// Fractional days owed but not yet released.
    accumulator: f64,
}

impl StepScheduler {
    pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 30;

    #[must_use]
    pub fn new(speed: f64, max_steps_per_frame: u32) -> StepScheduler {
        StepScheduler {
            speed: speed.clamp(0.1, 100.0),
            max_steps_per_frame: max_steps_per_frame.max(1),
            accumulator: 0.0,
        }
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Changes the speed multiplier, clamped to [0.1, 100]. Accumulated debt
    /// is kept so an in-flight fraction of a day is not lost.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_finite() {
            speed.clamp(0.1, 100.0)
        } else {
            1.0
        };
    }

    /// Drops any accumulated fractional days. Called when a run stops so a
    /// later run does not inherit debt.
    pub fn clear(&mut self) {
        self.accumulator = 0.0;
    }

    /// Number of whole simulation days to run for a tick after `elapsed`
    /// wall-clock time, at most `max_steps_per_frame`. Excess beyond the cap
    /// is discarded rather than carried, so a stalled host catches up
    /// gradually instead of freezing on one giant batch.
    pub fn steps_for_tick(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed.as_secs_f64() * self.speed;
        if self.accumulator < 1.0 {
            return 0;
        }
        let whole = self.accumulator.floor();
        let steps = if whole >= f64::from(self.max_steps_per_frame) {
            self.max_steps_per_frame
        } else {
            // Representable exactly: whole is a small positive integer.
            whole as u32
        };
        self.accumulator -= whole;
        steps
    }
}
