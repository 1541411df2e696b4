//! # Site Survey
//!
//! Survey-type detection that visits whole sites from a capacity-limited FIFO
//! queue and flags sites, not individual components.
//!
//! Each operating step:
//! 1. pop up to `sites_per_timestep` envelope-eligible sites from the queue,
//! 2. charge `site_cost` per visited site,
//! 3. sum the emission variables over every active emission on each visited
//!    site, substitute met variables, and look up the detection probability,
//! 4. draw one uniform per site in visit order; a site is flagged iff the draw
//!    does not exceed its probability,
//! 5. forward the flagged sites to the dispatch target.
//!
//! Emissions are never resolved here.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::base::{capacity_per_timestep, charge};
use super::{
    DetectionBase, DetectionMethod, DetectionRecord, DetectionVariable, DispatchHandle,
    DispatchTarget, OperatingEnvelope, ProbabilityTable, SimRng,
};
use crate::domain::{Emission, GasField, OperatingHours, Time};
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSurveyConfig {
    pub name: String,
    pub sites_per_day: f64,
    pub site_cost: f64,
    pub ophrs: OperatingHours,
    pub op_envelope: OperatingEnvelope,
    pub detection_variables: Vec<DetectionVariable>,
    /// Days between survey rounds (None = every step)
    pub survey_interval: Option<f64>,
    /// Sites queued before the first step
    pub site_queue: Vec<usize>,
}

impl Default for SiteSurveyConfig {
    fn default() -> Self {
        Self {
            name: "site survey".to_string(),
            sites_per_day: 200.0,
            site_cost: 100.0,
            ophrs: OperatingHours { begin: 8.0, end: 17.0 },
            op_envelope: OperatingEnvelope::default(),
            detection_variables: vec![DetectionVariable::flux()],
            survey_interval: None,
            site_queue: Vec::new(),
        }
    }
}

impl SiteSurveyConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_sites_per_day(mut self, sites_per_day: f64) -> Self {
        self.sites_per_day = sites_per_day;
        self
    }

    pub fn with_site_cost(mut self, site_cost: f64) -> Self {
        self.site_cost = site_cost;
        self
    }

    pub fn with_ophrs(mut self, ophrs: OperatingHours) -> Self {
        self.ophrs = ophrs;
        self
    }

    pub fn with_envelope(mut self, envelope: OperatingEnvelope) -> Self {
        self.op_envelope = envelope;
        self
    }

    pub fn with_detection_variables(mut self, variables: Vec<DetectionVariable>) -> Self {
        self.detection_variables = variables;
        self
    }

    pub fn with_survey_interval(mut self, days: f64) -> Self {
        self.survey_interval = Some(days);
        self
    }

    pub fn with_site_queue(mut self, sites: Vec<usize>) -> Self {
        self.site_queue = sites;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.sites_per_day.is_finite() || self.sites_per_day < 0.0 {
            return Err(SimError::config(format!(
                "'{}': sites_per_day must be non-negative, got {}",
                self.name, self.sites_per_day
            )));
        }
        if !self.site_cost.is_finite() || self.site_cost < 0.0 {
            return Err(SimError::config(format!(
                "'{}': site_cost must be non-negative, got {}",
                self.name, self.site_cost
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SiteSurvey {
    base: DetectionBase,
    sites_per_day: f64,
    site_cost: f64,
    sites_per_timestep: usize,
}

impl SiteSurvey {
    pub fn new(
        time: &Time,
        dispatch: DispatchHandle,
        config: SiteSurveyConfig,
        table: ProbabilityTable,
    ) -> SimResult<Self> {
        config.validate()?;

        let mut base = DetectionBase::new(config.name, config.ophrs, table, dispatch);
        base.envelope = config.op_envelope;
        base.detection_variables = config.detection_variables;
        base.survey_interval = config.survey_interval;
        base.enqueue(&config.site_queue);
        base.validate()?;

        let sites_per_timestep =
            capacity_per_timestep(config.sites_per_day, &base.ophrs, time.delta_t);
        base.warn_if_starved("sites", config.sites_per_day, sites_per_timestep);

        Ok(Self {
            base,
            sites_per_day: config.sites_per_day,
            site_cost: config.site_cost,
            sites_per_timestep,
        })
    }

    pub fn sites_per_day(&self) -> f64 {
        self.sites_per_day
    }

    pub fn sites_per_timestep(&self) -> usize {
        self.sites_per_timestep
    }

    pub fn site_cost(&self) -> f64 {
        self.site_cost
    }

    /// Queued sites, front first
    pub fn site_queue(&self) -> Vec<usize> {
        self.base.queue.iter().copied().collect()
    }

    /// Visit the next batch of sites and charge for them
    fn sites_surveyed(
        &mut self,
        gas_field: &GasField,
        time: &Time,
        find_cost: &mut [f64],
    ) -> SimResult<Vec<usize>> {
        let n = self.sites_per_timestep.min(self.base.queue.len());
        let sites = self.choose_sites(gas_field, time, n)?;
        charge(find_cost, "find_cost", time, sites.len(), self.site_cost)?;
        Ok(sites)
    }

    /// Bernoulli trial per visited site; returns the flagged sites in visit order
    fn detect_prob_curve<R: Rng + ?Sized>(
        &self,
        time: &Time,
        gas_field: &GasField,
        emissions: &Emission,
        sites: &[usize],
        rng: &mut R,
    ) -> SimResult<Vec<usize>> {
        if sites.is_empty() {
            return Ok(Vec::new());
        }

        let n_vars = self.base.detection_variables.len();
        let mut sums: HashMap<usize, Vec<f64>> =
            sites.iter().map(|&site| (site, vec![0.0; n_vars])).collect();
        for index in emissions.active_indices(time.current_time) {
            if let Some(acc) = sums.get_mut(&emissions.site_index()[index]) {
                self.base.accumulate(emissions, index, acc);
            }
        }

        let met = self.base.met_values(gas_field, time)?;
        let mut flagged = Vec::new();
        for &site in sites {
            let query = sums.get(&site).cloned().unwrap_or_else(|| vec![0.0; n_vars]);
            let p = self.base.probability(query, &met)?;
            let draw: f64 = rng.gen();
            if draw <= p {
                flagged.push(site);
            }
        }
        Ok(flagged)
    }
}

impl DispatchTarget for SiteSurvey {
    /// Append sites to the back of the queue
    fn action(&mut self, site_indices: &[usize], _emission_indices: &[usize]) {
        self.base.enqueue(site_indices);
    }
}

impl DetectionMethod for SiteSurvey {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn check_time(&self, time: &Time) -> bool {
        self.base.check_time(time)
    }

    fn choose_sites(&mut self, gas_field: &GasField, time: &Time, n: usize) -> SimResult<Vec<usize>> {
        self.base.choose_sites(gas_field, time, n)
    }

    fn detect(
        &mut self,
        time: &Time,
        gas_field: &GasField,
        emissions: &Emission,
        find_cost: &mut [f64],
        rng: &mut SimRng,
    ) -> SimResult<()> {
        if !self.check_time(time) {
            return Ok(());
        }

        let sites = self.sites_surveyed(gas_field, time, find_cost)?;
        if sites.is_empty() {
            return Ok(());
        }
        let flagged = self.detect_prob_curve(time, gas_field, emissions, &sites, rng)?;

        debug!(
            method = %self.base.name,
            time_index = time.time_index,
            surveyed = sites.len(),
            flagged = flagged.len(),
            queued = self.base.queue.len(),
            "Site survey step"
        );

        self.base.dispatch.dispatch(&flagged, &[])?;
        self.base.records.push(DetectionRecord {
            method: self.base.name.clone(),
            time_index: time.time_index,
            sites_surveyed: sites,
            flagged_sites: flagged,
            flagged_emissions: Vec::new(),
        });
        Ok(())
    }

    fn records(&self) -> &[DetectionRecord] {
        &self.base.records
    }

    fn queue_len(&self) -> usize {
        self.base.queue.len()
    }
}
