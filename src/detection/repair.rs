//! Terminal dispatch target: repairs what upstream methods flag.
//!
//! Requests are stamped with the time of the first [`Repair::repair`] call
//! after they arrive and are carried out once `repair_delay` days have
//! elapsed. Site requests resolve every emission active at the site at that
//! moment; emission requests resolve the listed emissions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::base::add_cost;
use super::DispatchTarget;
use crate::domain::{Emission, GasField, Time};
use crate::error::{SimError, SimResult};

const EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Days between a detection reaching the repair crew and the fix
    pub repair_delay: f64,
    /// Cost per repair when neither the emission nor its component has one
    pub default_cost: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            repair_delay: 0.0,
            default_cost: 0.0,
        }
    }
}

impl RepairConfig {
    pub fn with_repair_delay(mut self, days: f64) -> Self {
        self.repair_delay = days;
        self
    }

    pub fn with_default_cost(mut self, cost: f64) -> Self {
        self.default_cost = cost;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.repair_delay.is_finite() || self.repair_delay < 0.0 {
            return Err(SimError::config(format!(
                "repair_delay must be non-negative, got {}",
                self.repair_delay
            )));
        }
        if !self.default_cost.is_finite() || self.default_cost < 0.0 {
            return Err(SimError::config(format!(
                "default repair cost must be non-negative, got {}",
                self.default_cost
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct RepairRequest {
    received: Option<f64>,
    sites: Vec<usize>,
    emissions: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct Repair {
    config: RepairConfig,
    pending: Vec<RepairRequest>,
    n_repaired: usize,
}

impl Repair {
    pub fn new(config: RepairConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pending: Vec::new(),
            n_repaired: 0,
        })
    }

    /// Requests not yet carried out
    pub fn n_pending(&self) -> usize {
        self.pending.len()
    }

    /// Emissions resolved so far
    pub fn n_repaired(&self) -> usize {
        self.n_repaired
    }

    fn unit_cost(&self, gas_field: &GasField, emissions: &Emission, index: usize) -> f64 {
        emissions.repair_cost()[index]
            .or_else(|| {
                gas_field
                    .component(emissions.site_index()[index], emissions.comp_index()[index])
                    .and_then(|c| c.repair_cost)
            })
            .unwrap_or(self.config.default_cost)
    }

    /// Carry out due requests. Returns the number of emissions resolved.
    pub fn repair(
        &mut self,
        time: &Time,
        gas_field: &GasField,
        emissions: &mut Emission,
        repair_cost: &mut [f64],
    ) -> SimResult<usize> {
        let now = time.current_time;
        for request in &mut self.pending {
            request.received.get_or_insert(now);
        }

        let delay = self.config.repair_delay;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|r| r.received.map_or(false, |t| t + delay <= now + EPS));
        self.pending = waiting;
        if due.is_empty() {
            return Ok(0);
        }

        let mut targets: Vec<usize> = Vec::new();
        for request in &due {
            if !request.sites.is_empty() {
                targets.extend(
                    emissions
                        .active_indices(now)
                        .filter(|&i| request.sites.contains(&emissions.site_index()[i])),
                );
            }
            targets.extend(request.emissions.iter().copied());
        }
        targets.sort_unstable();
        targets.dedup();

        // Range check before any mutation
        emissions.detected(&targets)?;
        let open: Vec<usize> = targets
            .into_iter()
            .filter(|&i| emissions.end_time()[i] > now)
            .collect();
        let cost: f64 = open
            .iter()
            .map(|&i| self.unit_cost(gas_field, emissions, i))
            .sum();
        let resolved = emissions.resolve(&open, now)?;
        if resolved > 0 {
            add_cost(repair_cost, "repair_cost", time, cost)?;
        }

        self.n_repaired += resolved;
        debug!(
            time_index = time.time_index,
            resolved,
            cost,
            pending = self.pending.len(),
            "Repairs carried out"
        );
        Ok(resolved)
    }
}

impl DispatchTarget for Repair {
    fn action(&mut self, site_indices: &[usize], emission_indices: &[usize]) {
        if site_indices.is_empty() && emission_indices.is_empty() {
            return;
        }
        self.pending.push(RepairRequest {
            received: None,
            sites: site_indices.to_vec(),
            emissions: emission_indices.to_vec(),
        });
    }
}
