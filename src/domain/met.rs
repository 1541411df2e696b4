//! # Meteorological Time Series
//!
//! Field-wide weather series consulted by detection methods whose probability
//! of detection or operating envelope depends on the environment.
//!
//! Each variable is sampled at arbitrary times (days). Lookups choose an
//! interpolation mode per variable:
//!
//! - **Nearest**: value of the closest sample
//! - **Linear**: piecewise linear, clamped to the first/last sample
//! - **Mean**: mean of samples inside the method's operating window on the
//!   current day, falling back to linear at the window midpoint

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{SimError, SimResult};

/// Known meteorological variables
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum MetVariable {
    #[strum(to_string = "wind speed", serialize = "wind_speed")]
    WindSpeed,
    #[strum(to_string = "temperature")]
    Temperature,
    #[strum(to_string = "relative humidity", serialize = "relative_humidity")]
    RelativeHumidity,
    #[strum(to_string = "cloud cover", serialize = "cloud_cover")]
    CloudCover,
    #[strum(to_string = "precipitation")]
    Precipitation,
}

/// How a series is evaluated at a query time
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterpMode {
    Nearest,
    #[default]
    Linear,
    Mean,
}

/// One sampled variable
/// One sampled variable, never empty. Built only through [`MetSeries::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl MetSeries {
    /// Build a series; samples are sorted by time
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> SimResult<Self> {
        if times.len() != values.len() {
            return Err(SimError::config(format!(
                "met series has {} times but {} values",
                times.len(),
                values.len()
            )));
        }
        if times.is_empty() {
            return Err(SimError::config("met series is empty"));
        }
        if times.iter().chain(values.iter()).any(|v| !v.is_finite()) {
            return Err(SimError::config("met series contains non-finite samples"));
        }

        let mut samples: Vec<(f64, f64)> = times.into_iter().zip(values).collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = samples.into_iter().unzip();
        Ok(Self { times, values })
    }

    /// Series repeating the same daily profile for `days` days.
    ///
    /// `profile` holds evenly spaced samples over one day (24 values = hourly).
    pub fn repeating_daily(profile: &[f64], days: usize) -> SimResult<Self> {
        let mut times = Vec::with_capacity(profile.len() * days);
        let mut values = Vec::with_capacity(profile.len() * days);
        let step = 1.0 / profile.len().max(1) as f64;
        for day in 0..days {
            for (i, v) in profile.iter().enumerate() {
                times.push(day as f64 + i as f64 * step);
                values.push(*v);
            }
        }
        Self::new(times, values)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn nearest(&self, t: f64) -> f64 {
        let idx = self.times.partition_point(|&x| x < t);
        if idx == 0 {
            return self.values[0];
        }
        if idx == self.times.len() {
            return self.values[idx - 1];
        }
        if (t - self.times[idx - 1]) <= (self.times[idx] - t) {
            self.values[idx - 1]
        } else {
            self.values[idx]
        }
    }

    fn linear(&self, t: f64) -> f64 {
        let n = self.times.len();
        if t <= self.times[0] {
            return self.values[0];
        }
        if t >= self.times[n - 1] {
            return self.values[n - 1];
        }
        let idx = self.times.partition_point(|&x| x <= t);
        let (t0, t1) = (self.times[idx - 1], self.times[idx]);
        let (v0, v1) = (self.values[idx - 1], self.values[idx]);
        if t1 - t0 < 1e-12 {
            return v0;
        }
        v0 + (t - t0) / (t1 - t0) * (v1 - v0)
    }

    fn window_mean(&self, window: (f64, f64)) -> f64 {
        let (start, end) = window;
        let lo = self.times.partition_point(|&x| x < start);
        let hi = self.times.partition_point(|&x| x < end);
        if hi > lo {
            self.values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        } else {
            self.linear((start + end) / 2.0)
        }
    }

    /// Evaluate the series at `t`; `window` is only used by [`InterpMode::Mean`]
    pub fn value_at(&self, t: f64, mode: InterpMode, window: (f64, f64)) -> f64 {
        match mode {
            InterpMode::Nearest => self.nearest(t),
            InterpMode::Linear => self.linear(t),
            InterpMode::Mean => self.window_mean(window),
        }
    }
}

/// All meteorological series for a gas field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetData {
    series: BTreeMap<MetVariable, MetSeries>,
}

impl MetData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, variable: MetVariable, series: MetSeries) -> Self {
        self.series.insert(variable, series);
        self
    }

    pub fn insert(&mut self, variable: MetVariable, series: MetSeries) {
        self.series.insert(variable, series);
    }

    pub fn contains(&self, variable: MetVariable) -> bool {
        self.series.contains_key(&variable)
    }

    pub fn get(&self, variable: MetVariable) -> Option<&MetSeries> {
        self.series.get(&variable)
    }

    pub fn value(
        &self,
        variable: MetVariable,
        t: f64,
        mode: InterpMode,
        window: (f64, f64),
    ) -> SimResult<f64> {
        self.series
            .get(&variable)
            .map(|s| s.value_at(t, mode, window))
            .ok_or(SimError::MissingMetVariable(variable))
    }
}
