//! Component-level survey (e.g. OGI camera or Method 21 crews).
//!
//! Visits queued sites like [`SiteSurvey`](super::SiteSurvey) but capacity and
//! cost are counted per component, and each active emission on a visited site
//! is tested on its own. Flagged emission indices are dispatched downstream.

use rand::Rng;
use serde::{Deserialize, Serialize};
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
pub struct CompSurveyConfig {
    pub name: String,
    pub comps_per_day: f64,
    /// Cost per component surveyed
    pub comp_cost: f64,
    pub ophrs: OperatingHours,
    pub op_envelope: OperatingEnvelope,
    pub detection_variables: Vec<DetectionVariable>,
    pub survey_interval: Option<f64>,
    pub site_queue: Vec<usize>,
}

impl Default for CompSurveyConfig {
    fn default() -> Self {
        Self {
            name: "component survey".to_string(),
            comps_per_day: 500.0,
            comp_cost: 1.0,
            ophrs: OperatingHours { begin: 8.0, end: 17.0 },
            op_envelope: OperatingEnvelope::default(),
            detection_variables: vec![DetectionVariable::flux()],
            survey_interval: None,
            site_queue: Vec::new(),
        }
    }
}

impl CompSurveyConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_comps_per_day(mut self, comps_per_day: f64) -> Self {
        self.comps_per_day = comps_per_day;
        self
    }

    pub fn with_comp_cost(mut self, comp_cost: f64) -> Self {
        self.comp_cost = comp_cost;
        self
    }

    pub fn with_ophrs(mut self, ophrs: OperatingHours) -> Self {
        self.ophrs = ophrs;
        self
    }

    pub fn with_site_queue(mut self, sites: Vec<usize>) -> Self {
        self.site_queue = sites;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.comps_per_day.is_finite() || self.comps_per_day < 0.0 {
            return Err(SimError::config(format!(
                "'{}': comps_per_day must be non-negative, got {}",
                self.name, self.comps_per_day
            )));
        }
        if !self.comp_cost.is_finite() || self.comp_cost < 0.0 {
            return Err(SimError::config(format!(
                "'{}': comp_cost must be non-negative, got {}",
                self.name, self.comp_cost
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct CompSurvey {
    base: DetectionBase,
    comp_cost: f64,
    comps_per_timestep: usize,
}

impl CompSurvey {
    pub fn new(
        time: &Time,
        dispatch: DispatchHandle,
        config: CompSurveyConfig,
        table: ProbabilityTable,
    ) -> SimResult<Self> {
        config.validate()?;

        let mut base = DetectionBase::new(config.name, config.ophrs, table, dispatch);
        base.envelope = config.op_envelope;
        base.detection_variables = config.detection_variables;
        base.survey_interval = config.survey_interval;
        base.enqueue(&config.site_queue);
        base.validate()?;

        let comps_per_timestep =
            capacity_per_timestep(config.comps_per_day, &base.ophrs, time.delta_t);
        base.warn_if_starved("components", config.comps_per_day, comps_per_timestep);

        Ok(Self {
            base,
            comp_cost: config.comp_cost,
            comps_per_timestep,
        })
    }

    pub fn comps_per_timestep(&self) -> usize {
        self.comps_per_timestep
    }

    pub fn site_queue(&self) -> Vec<usize> {
        self.base.queue.iter().copied().collect()
    }

    /// Take queued sites while their components fit in this step's budget.
    /// A site larger than the whole budget is still taken when it comes first,
    /// so oversized sites cannot block the queue.
    fn sites_surveyed(
        &mut self,
        gas_field: &GasField,
        time: &Time,
        find_cost: &mut [f64],
    ) -> SimResult<(Vec<usize>, usize)> {
        let budget = self.comps_per_timestep;
        if budget == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut used = 0;
        let mut error = None;
        let sites = self.base.take_eligible(gas_field, time, |site| {
            let comps = match gas_field.site_type(site) {
                Ok(site_type) => site_type.site.total_components(),
                Err(e) => {
                    error = Some(e);
                    return false;
                }
            };
            if used > 0 && used + comps > budget {
                return false;
            }
            used += comps;
            true
        })?;
        if let Some(e) = error {
            return Err(e);
        }

        charge(find_cost, "find_cost", time, used, self.comp_cost)?;
        Ok((sites, used))
    }

    /// Bernoulli trial per active emission on the visited sites, in store order
    fn detect_emissions<R: Rng + ?Sized>(
        &self,
        time: &Time,
        gas_field: &GasField,
        emissions: &Emission,
        sites: &[usize],
        rng: &mut R,
    ) -> SimResult<Vec<usize>> {
        let candidates: Vec<usize> = emissions
            .active_indices(time.current_time)
            .filter(|&i| sites.contains(&emissions.site_index()[i]))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let n_vars = self.base.detection_variables.len();
        let met = self.base.met_values(gas_field, time)?;
        let mut flagged = Vec::new();
        for index in candidates {
            let mut query = vec![0.0; n_vars];
            self.base.accumulate(emissions, index, &mut query);
            let p = self.base.probability(query, &met)?;
            let draw: f64 = rng.gen();
            if draw <= p {
                flagged.push(index);
            }
        }
        Ok(flagged)
    }
}

impl DispatchTarget for CompSurvey {
    fn action(&mut self, site_indices: &[usize], _emission_indices: &[usize]) {
        self.base.enqueue(site_indices);
    }
}

impl DetectionMethod for CompSurvey {
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

        let (sites, comps) = self.sites_surveyed(gas_field, time, find_cost)?;
        if sites.is_empty() {
            return Ok(());
        }
        let flagged = self.detect_emissions(time, gas_field, emissions, &sites, rng)?;

        debug!(
            method = %self.base.name,
            time_index = time.time_index,
            sites = sites.len(),
            comps,
            flagged = flagged.len(),
            "Component survey step"
        );

        self.base.dispatch.dispatch(&[], &flagged)?;
        self.base.records.push(DetectionRecord {
            method: self.base.name.clone(),
            time_index: time.time_index,
            sites_surveyed: sites,
            flagged_sites: Vec::new(),
            flagged_emissions: flagged,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, ComponentGroup, EmissionBatch, EmissionRecord, Site, SiteType};
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Collector {
        emissions: Vec<Vec<usize>>,
    }

    impl DispatchTarget for Collector {
        fn action(&mut self, _: &[usize], emission_indices: &[usize]) {
            self.emissions.push(emission_indices.to_vec());
        }
    }

    fn field() -> GasField {
        let site = Site::new(
            "pad",
            vec![ComponentGroup {
                category: "Fugitive".to_string(),
                count: 4,
                component: Component::default(),
            }],
        )
        .unwrap();
        GasField::new(vec![SiteType::new("pad", 6, site)]).unwrap()
    }

    fn emissions(fluxes: &[(usize, f64)]) -> Emission {
        let batch: EmissionBatch = fluxes
            .iter()
            .map(|&(site, flux)| EmissionRecord {
                flux,
                site_index: site,
                comp_index: 1,
                start_time: 0.0,
                end_time: f64::INFINITY,
                repair_cost: None,
            })
            .collect();
        Emission::from_batch(&batch).unwrap()
    }

    fn threshold_table() -> ProbabilityTable {
        // Emissions of 1.0 and above are always found
        ProbabilityTable::new(vec![vec![0.0], vec![0.999], vec![1.0]], vec![0.0, 0.0, 1.0])
            .unwrap()
    }

    #[test]
    fn test_budget_counts_components() {
        let time = Time::new(1.0, 5.0).unwrap();
        let target = Rc::new(RefCell::new(Collector::default()));
        let config = CompSurveyConfig::default()
            .with_ophrs(OperatingHours::default())
            .with_comps_per_day(10.0)
            .with_comp_cost(2.5)
            .with_site_queue(vec![0, 1, 2, 3]);
        let mut survey =
            CompSurvey::new(&time, DispatchHandle::new(&target), config, threshold_table()).unwrap();
        let mut find_cost = vec![0.0; 5];
        let mut rng = SimRng::seed_from_u64(1);

        survey
            .detect(&time, &field(), &emissions(&[]), &mut find_cost, &mut rng)
            .unwrap();

        // Two 4-component sites fit in a budget of 10
        assert_eq!(survey.site_queue(), vec![2, 3]);
        assert_eq!(find_cost[0], 8.0 * 2.5);
    }

    #[test]
    fn test_flags_individual_emissions() {
        let time = Time::new(1.0, 5.0).unwrap();
        let target = Rc::new(RefCell::new(Collector::default()));
        let config = CompSurveyConfig::default()
            .with_ophrs(OperatingHours::default())
            .with_comps_per_day(100.0)
            .with_site_queue(vec![0, 1]);
        let mut survey =
            CompSurvey::new(&time, DispatchHandle::new(&target), config, threshold_table()).unwrap();
        let mut find_cost = vec![0.0; 5];
        let mut rng = SimRng::seed_from_u64(4);

        let store = emissions(&[(0, 2.0), (0, 0.5), (1, 1.0), (5, 3.0)]);
        survey
            .detect(&time, &field(), &store, &mut find_cost, &mut rng)
            .unwrap();

        assert_eq!(target.borrow().emissions, vec![vec![0, 2]]);
        assert_eq!(survey.records()[0].flagged_emissions, vec![0, 2]);
    }

    #[test]
    fn test_draw_equal_to_probability_flags() {
        let time = Time::new(1.0, 5.0).unwrap();
        let target = Rc::new(RefCell::new(Collector::default()));
        let survey = CompSurvey::new(
            &time,
            DispatchHandle::new(&target),
            CompSurveyConfig::default().with_ophrs(OperatingHours::default()),
            ProbabilityTable::constant(0.5),
        )
        .unwrap();
        let store = emissions(&[(0, 1.0), (0, 2.0)]);

        let mut at_p = StepRng::new(1 << 63, 0);
        let flagged = survey
            .detect_emissions(&time, &field(), &store, &[0], &mut at_p)
            .unwrap();
        assert_eq!(flagged, vec![0, 1]);
    }

    #[test]
    fn test_out_of_field_site_aborts() {
        let time = Time::new(1.0, 5.0).unwrap();
        let target = Rc::new(RefCell::new(Collector::default()));
        let config = CompSurveyConfig::default()
            .with_ophrs(OperatingHours::default())
            .with_site_queue(vec![0, 60]);
        let mut survey =
            CompSurvey::new(&time, DispatchHandle::new(&target), config, threshold_table()).unwrap();
        let mut find_cost = vec![0.0; 5];
        let mut rng = SimRng::seed_from_u64(2);

        let result = survey.detect(&time, &field(), &emissions(&[]), &mut find_cost, &mut rng);

        assert!(matches!(
            result,
            Err(SimError::SiteIndexOutOfRange { index: 60, n_sites: 6 })
        ));
        assert_eq!(find_cost[0], 0.0);
        assert_eq!(survey.site_queue(), vec![0, 60]);
    }

    #[test]
    fn test_action_enqueues_sites() {
        let time = Time::new(1.0, 5.0).unwrap();
        let target = Rc::new(RefCell::new(Collector::default()));
        let mut survey = CompSurvey::new(
            &time,
            DispatchHandle::new(&target),
            CompSurveyConfig::default(),
            threshold_table(),
        )
        .unwrap();
        survey.action(&[4, 2], &[]);
        survey.action(&[], &[]);
        assert_eq!(survey.site_queue(), vec![4, 2]);
    }
}
