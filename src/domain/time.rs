//! Stepped simulation clock.
//!
//! Time is measured in days. The canonical state is the integer step index;
//! `current_time` is always derived as `time_index * delta_t`, so the clock never
//! drifts no matter how many fractional steps are taken.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Time {
    /// Days per step (may be fractional)
    pub delta_t: f64,
    /// Simulation end time in days
    pub end_time: f64,
    /// Current absolute time in days
    pub current_time: f64,
    /// Step counter, `current_time / delta_t`
    pub time_index: usize,
}

impl Time {
    /// Create a clock positioned at t = 0
    pub fn new(delta_t: f64, end_time: f64) -> SimResult<Self> {
        if !delta_t.is_finite() || delta_t <= 0.0 {
            return Err(SimError::config(format!(
                "delta_t must be positive and finite, got {}",
                delta_t
            )));
        }
        if !end_time.is_finite() || end_time < 0.0 {
            return Err(SimError::config(format!(
                "end_time must be non-negative and finite, got {}",
                end_time
            )));
        }

        Ok(Self {
            delta_t,
            end_time,
            current_time: 0.0,
            time_index: 0,
        })
    }

    /// Number of steps needed to cover `[0, end_time)`
    pub fn n_timesteps(&self) -> usize {
        (self.end_time / self.delta_t).ceil() as usize
    }

    /// Advance by exactly one `delta_t`
    pub fn advance(&mut self) {
        self.time_index += 1;
        self.current_time = self.time_index as f64 * self.delta_t;
    }

    pub fn is_finished(&self) -> bool {
        self.time_index >= self.n_timesteps()
    }

    /// Hour of day (0..24) at the start of the current step
    pub fn time_of_day_hours(&self) -> f64 {
        // Snap to 1e-9 h so 1/24-day steps land exactly on the hour
        let hours = ((self.current_time * 24.0).rem_euclid(24.0) * 1e9).round() / 1e9;
        if hours >= 24.0 {
            0.0
        } else {
            hours
        }
    }

    /// Start of the day containing the current step, in days
    pub fn day_start(&self) -> f64 {
        ((self.current_time * 1e9).round() / 1e9).floor()
    }
}

/// Daily operating window in clock hours, `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub begin: f64,
    pub end: f64,
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self { begin: 0.0, end: 24.0 }
    }
}

impl OperatingHours {
    pub fn new(begin: f64, end: f64) -> SimResult<Self> {
        let hours = Self { begin, end };
        hours.validate()?;
        Ok(hours)
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(0.0..=24.0).contains(&self.begin) || !(0.0..=24.0).contains(&self.end) {
            return Err(SimError::config(format!(
                "operating hours must lie within [0, 24], got {}..{}",
                self.begin, self.end
            )));
        }
        if self.end < self.begin {
            return Err(SimError::config(format!(
                "operating hours end ({}) precedes begin ({})",
                self.end, self.begin
            )));
        }
        Ok(())
    }

    /// Fraction of a day inside the window
    pub fn work_fraction(&self) -> f64 {
        (self.end - self.begin) / 24.0
    }

    /// Whether a method may run during the step starting at `time`.
    ///
    /// A zero-length window never operates. Steps of a day or longer always
    /// contain the window; shorter steps must start inside it.
    pub fn contains(&self, time: &Time) -> bool {
        if self.end <= self.begin {
            return false;
        }
        if time.delta_t >= 1.0 {
            return true;
        }
        let hour = time.time_of_day_hours();
        self.begin <= hour && hour < self.end
    }

    /// The window on the day containing `time`, in absolute days
    pub fn window_on(&self, time: &Time) -> (f64, f64) {
        let day = time.day_start();
        (day + self.begin / 24.0, day + self.end / 24.0)
    }
}
