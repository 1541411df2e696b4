//! Leak-prone equipment categories and their emission-size samplers.

use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Emission-size distribution for a component category.
///
/// The engine treats this as an opaque sampler. Empirical data is supplied by
/// whatever loads the measurement study; the engine only draws from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmissionSizeDistribution {
    /// Bootstrap resampling of measured fluxes (g/s)
    Empirical { samples: Vec<f64> },
    /// Log-normal fit, parameters of the underlying normal
    LogNormal { mu: f64, sigma: f64 },
    /// Every emission has the same flux
    Constant { flux: f64 },
}

impl Default for EmissionSizeDistribution {
    fn default() -> Self {
        EmissionSizeDistribution::Constant { flux: 1.0 }
    }
}

impl EmissionSizeDistribution {
    pub fn validate(&self) -> SimResult<()> {
        match self {
            EmissionSizeDistribution::Empirical { samples } => {
                if samples.is_empty() {
                    return Err(SimError::config("empirical emission distribution has no samples"));
                }
                if samples.iter().any(|s| !s.is_finite() || *s < 0.0) {
                    return Err(SimError::config(
                        "empirical emission samples must be finite and non-negative",
                    ));
                }
            }
            EmissionSizeDistribution::LogNormal { mu, sigma } => {
                LogNormal::new(*mu, *sigma).map_err(|e| SimError::Distribution(e.to_string()))?;
            }
            EmissionSizeDistribution::Constant { flux } => {
                if !flux.is_finite() || *flux < 0.0 {
                    return Err(SimError::config(format!(
                        "constant flux must be non-negative, got {}",
                        flux
                    )));
                }
            }
        }
        Ok(())
    }

    /// Draw one emission flux
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimResult<f64> {
        match self {
            EmissionSizeDistribution::Empirical { samples } => {
                if samples.is_empty() {
                    return Err(SimError::config("empirical emission distribution has no samples"));
                }
                Ok(samples[rng.gen_range(0..samples.len())])
            }
            EmissionSizeDistribution::LogNormal { mu, sigma } => {
                let dist = LogNormal::new(*mu, *sigma)
                    .map_err(|e| SimError::Distribution(e.to_string()))?;
                Ok(dist.sample(rng))
            }
            EmissionSizeDistribution::Constant { flux } => Ok(*flux),
        }
    }
}

/// A category of leak-prone equipment (e.g. "Fugitive emitters").
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    pub name: String,
    /// Flux sampler for new emissions
    pub emission_size: EmissionSizeDistribution,
    /// Probability that a component is already leaking at t = 0
    pub emission_per_comp: f64,
    /// New emissions per component per day
    pub emission_production_rate: f64,
    /// Cost to repair one emission on this component, if known
    pub repair_cost: Option<f64>,
    /// Natural lifetime of an emission in days (None = until repaired)
    pub emission_duration: Option<f64>,
}

impl Default for Component {
    fn default() -> Self {
        Self {
            name: "Fugitive emitters".to_string(),
            emission_size: EmissionSizeDistribution::default(),
            emission_per_comp: 0.0026,
            emission_production_rate: 5.4 / 650.0 / 365.0,
            repair_cost: None,
            emission_duration: None,
        }
    }
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_emission_size(mut self, emission_size: EmissionSizeDistribution) -> Self {
        self.emission_size = emission_size;
        self
    }

    pub fn with_emission_per_comp(mut self, probability: f64) -> Self {
        self.emission_per_comp = probability;
        self
    }

    pub fn with_production_rate(mut self, rate_per_comp_day: f64) -> Self {
        self.emission_production_rate = rate_per_comp_day;
        self
    }

    pub fn with_repair_cost(mut self, cost: f64) -> Self {
        self.repair_cost = Some(cost);
        self
    }

    pub fn with_emission_duration(mut self, days: f64) -> Self {
        self.emission_duration = Some(days);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(0.0..=1.0).contains(&self.emission_per_comp) {
            return Err(SimError::config(format!(
                "component '{}': emission_per_comp must be within [0, 1], got {}",
                self.name, self.emission_per_comp
            )));
        }
        if !self.emission_production_rate.is_finite() || self.emission_production_rate < 0.0 {
            return Err(SimError::config(format!(
                "component '{}': emission_production_rate must be non-negative, got {}",
                self.name, self.emission_production_rate
            )));
        }
        if let Some(duration) = self.emission_duration {
            if duration <= 0.0 {
                return Err(SimError::config(format!(
                    "component '{}': emission_duration must be positive, got {}",
                    self.name, duration
                )));
            }
        }
        self.emission_size.validate()
    }

    /// End time of an emission starting at `start_time`
    pub fn end_time_from(&self, start_time: f64) -> f64 {
        match self.emission_duration {
            Some(duration) => start_time + duration,
            None => f64::INFINITY,
        }
    }
}
