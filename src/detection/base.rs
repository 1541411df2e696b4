//! State and behaviour shared by the concrete detection methods.
//!
//! ## Throughput
//!
//! Inspection capacity is configured per day and converted once to a per-step
//! budget. Whole days in a step contribute their full daily capacity; the
//! fractional part contributes in proportion to how much of the operating
//! window it can cover, capped at one full window:
//!
//! `floor(per_day × (floor(Δt) + min(1, frac(Δt) / work_time)))`
//!
//! where `work_time` is the window length in days.

use std::collections::VecDeque;
use tracing::warn;

use super::{
    Conditions, DetectionRecord, DetectionVariable, DispatchHandle, OperatingEnvelope,
    ProbabilityTable,
};
use crate::domain::{Emission, GasField, OperatingHours, Time};
use crate::error::{SimError, SimResult};

const EPS: f64 = 1e-9;

/// Per-step capacity for a per-day inspection rate
pub fn capacity_per_timestep(per_day: f64, ophrs: &OperatingHours, delta_t: f64) -> usize {
    let work_time = ophrs.work_fraction();
    if work_time <= 0.0 || per_day <= 0.0 {
        return 0;
    }
    let whole_days = delta_t.floor();
    let partial = ((delta_t - whole_days) / work_time).min(1.0);
    (per_day * (whole_days + partial) + EPS).floor() as usize
}

/// Whether a multiple of `interval` days falls inside the step starting at `time`
pub fn interval_due(time: &Time, interval: Option<f64>) -> bool {
    match interval {
        None => true,
        Some(n) if n <= 0.0 => true,
        Some(n) => {
            let next = (time.current_time / n - EPS).ceil() * n;
            next < time.current_time + time.delta_t - EPS
        }
    }
}

/// Whether the day containing `time` is a survey day for a method with its
/// own cadence. Steps of a day or longer fall back to [`interval_due`];
/// shorter steps are eligible for the whole day on which a multiple of
/// `interval` falls, so the operating hours decide when within that day.
pub fn survey_day_due(time: &Time, interval: Option<f64>) -> bool {
    if time.delta_t >= 1.0 {
        return interval_due(time, interval);
    }
    match interval {
        None => true,
        Some(n) if n <= 0.0 => true,
        Some(n) => {
            let day = time.day_start();
            let next = (day / n - EPS).ceil() * n;
            next < day + 1.0 - EPS
        }
    }
}

/// Charge `units × unit_cost` at the current time index; no write when `units == 0`
pub(crate) fn charge(
    ledger: &mut [f64],
    ledger_name: &'static str,
    time: &Time,
    units: usize,
    unit_cost: f64,
) -> SimResult<()> {
    if units == 0 {
        return Ok(());
    }
    add_cost(ledger, ledger_name, time, units as f64 * unit_cost)
}

pub(crate) fn add_cost(
    ledger: &mut [f64],
    ledger_name: &'static str,
    time: &Time,
    amount: f64,
) -> SimResult<()> {
    let len = ledger.len();
    let slot = ledger
        .get_mut(time.time_index)
        .ok_or(SimError::CostIndexOutOfRange {
            ledger: ledger_name,
            index: time.time_index,
            len,
        })?;
    *slot += amount;
    Ok(())
}

#[derive(Debug)]
pub struct DetectionBase {
    pub name: String,
    pub ophrs: OperatingHours,
    pub envelope: OperatingEnvelope,
    pub detection_variables: Vec<DetectionVariable>,
    pub table: ProbabilityTable,
    pub dispatch: DispatchHandle,
    pub survey_interval: Option<f64>,
    /// Sites awaiting survey, front first
    pub queue: VecDeque<usize>,
    pub records: Vec<DetectionRecord>,
}

impl DetectionBase {
    pub fn new(
        name: impl Into<String>,
        ophrs: OperatingHours,
        table: ProbabilityTable,
        dispatch: DispatchHandle,
    ) -> Self {
        Self {
            name: name.into(),
            ophrs,
            envelope: OperatingEnvelope::default(),
            detection_variables: vec![DetectionVariable::flux()],
            table,
            dispatch,
            survey_interval: None,
            queue: VecDeque::new(),
            records: Vec::new(),
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        self.ophrs.validate()?;
        self.envelope.validate()?;
        if self.detection_variables.len() != self.table.dimension() {
            return Err(SimError::config(format!(
                "method '{}' has {} detection variables but a {}-variable probability table",
                self.name,
                self.detection_variables.len(),
                self.table.dimension()
            )));
        }
        if let Some(interval) = self.survey_interval {
            if interval <= 0.0 {
                return Err(SimError::config(format!(
                    "method '{}': survey_interval must be positive, got {}",
                    self.name, interval
                )));
            }
        }
        Ok(())
    }

    pub fn check_time(&self, time: &Time) -> bool {
        self.ophrs.contains(time) && survey_day_due(time, self.survey_interval)
    }

    /// Remove and return queued sites passing the envelope, front to back,
    /// while `accept` keeps returning true. Sites failing the envelope stay
    /// queued in their original order.
    pub fn take_eligible(
        &mut self,
        gas_field: &GasField,
        time: &Time,
        mut accept: impl FnMut(usize) -> bool,
    ) -> SimResult<Vec<usize>> {
        if self.queue.is_empty() {
            return Ok(Vec::new());
        }
        let conditions = self.envelope.conditions(gas_field, time, &self.ophrs)?;

        let mut chosen = Vec::new();
        let mut picked = vec![false; self.queue.len()];
        for (pos, &site) in self.queue.iter().enumerate() {
            gas_field.site_type(site)?;
            if !self.envelope.allows(gas_field, site, &conditions)? {
                continue;
            }
            if !accept(site) {
                break;
            }
            chosen.push(site);
            picked[pos] = true;
        }

        let mut pos = 0;
        self.queue.retain(|_| {
            let keep = !picked[pos];
            pos += 1;
            keep
        });
        Ok(chosen)
    }

    /// First `n` eligible queued sites
    pub fn choose_sites(&mut self, gas_field: &GasField, time: &Time, n: usize) -> SimResult<Vec<usize>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut taken = 0;
        self.take_eligible(gas_field, time, |_| {
            taken += 1;
            taken <= n
        })
    }

    /// Met-derived query values, `None` for emission-derived slots
    pub fn met_values(&self, gas_field: &GasField, time: &Time) -> SimResult<Vec<Option<f64>>> {
        self.detection_variables
            .iter()
            .map(|var| match var {
                DetectionVariable::Met { variable, mode } => gas_field
                    .met_value(time, *variable, *mode, &self.ophrs)
                    .map(Some),
                DetectionVariable::Emission { .. } => Ok(None),
            })
            .collect()
    }

    /// Add emission `index`'s variables into the matching slots of `acc`
    pub fn accumulate(&self, emissions: &Emission, index: usize, acc: &mut [f64]) {
        for (slot, var) in acc.iter_mut().zip(&self.detection_variables) {
            if let DetectionVariable::Emission { variable } = var {
                *slot += variable.value(emissions, index);
            }
        }
    }

    /// Probability for an accumulated query, met slots filled from `met`
    pub fn probability(&self, mut query: Vec<f64>, met: &[Option<f64>]) -> SimResult<f64> {
        for (slot, value) in query.iter_mut().zip(met) {
            if let Some(value) = value {
                *slot = *value;
            }
        }
        self.table.probability(&query)
    }

    pub fn enqueue(&mut self, site_indices: &[usize]) {
        self.queue.extend(site_indices.iter().copied());
    }

    /// Warn when a positive daily rate rounds down to nothing per step
    pub fn warn_if_starved(&self, unit: &str, per_day: f64, per_timestep: usize) {
        if per_day > 0.0 && per_timestep < 1 {
            warn!(
                method = %self.name,
                unit,
                per_day,
                per_timestep,
                "Daily capacity rounds to zero per time step; the survey queue will never drain"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DispatchTarget, EnvelopeRule, OperatingRange};
    use crate::domain::{MetData, MetSeries, MetVariable, Site, SiteType};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Sink;
    impl DispatchTarget for Sink {
        fn action(&mut self, _: &[usize], _: &[usize]) {}
    }

    fn base(sink: &Rc<RefCell<Sink>>) -> DetectionBase {
        DetectionBase::new(
            "test",
            OperatingHours::default(),
            ProbabilityTable::constant(1.0),
            DispatchHandle::new(sink),
        )
    }

    fn field() -> GasField {
        let site = Site::new("pad", vec![]).unwrap();
        GasField::new(vec![SiteType::new("pad", 10, site)])
            .unwrap()
            .with_met(MetData::new().with_series(
                MetVariable::WindSpeed,
                MetSeries::new(vec![0.0], vec![4.0]).unwrap(),
            ))
    }

    #[rstest]
    #[case(50.0, 0.0, 24.0, 1.0, 50)]
    #[case(50.0, 0.0, 24.0, 0.5, 25)]
    #[case(50.0, 0.0, 24.0, 2.0, 100)]
    #[case(50.0, 8.0, 16.0, 1.0, 50)]
    #[case(50.0, 8.0, 16.0, 1.0 / 24.0, 6)]
    #[case(50.0, 8.0, 16.0, 0.5, 50)]
    #[case(50.0, 0.0, 24.0, 1.5, 75)]
    #[case(10.0, 0.0, 24.0, 1.0 / 24.0, 0)]
    #[case(50.0, 10.0, 10.0, 1.0, 0)]
    #[case(0.0, 0.0, 24.0, 1.0, 0)]
    fn test_capacity_per_timestep(
        #[case] per_day: f64,
        #[case] begin: f64,
        #[case] end: f64,
        #[case] delta_t: f64,
        #[case] expected: usize,
    ) {
        let ophrs = OperatingHours::new(begin, end).unwrap();
        assert_eq!(capacity_per_timestep(per_day, &ophrs, delta_t), expected);
        // Deterministic
        assert_eq!(
            capacity_per_timestep(per_day, &ophrs, delta_t),
            capacity_per_timestep(per_day, &ophrs, delta_t)
        );
    }

    #[rstest]
    #[case(None, 1.0, 3, true)]
    #[case(Some(7.0), 1.0, 0, true)]
    #[case(Some(7.0), 1.0, 1, false)]
    #[case(Some(7.0), 1.0, 6, false)]
    #[case(Some(7.0), 1.0, 7, true)]
    #[case(Some(7.0), 1.0, 14, true)]
    #[case(Some(1.0), 0.25, 4, true)]
    #[case(Some(1.0), 0.25, 5, false)]
    #[case(Some(0.5), 1.0, 3, true)]
    fn test_interval_due(
        #[case] interval: Option<f64>,
        #[case] delta_t: f64,
        #[case] steps: usize,
        #[case] expected: bool,
    ) {
        let mut time = Time::new(delta_t, 100.0).unwrap();
        for _ in 0..steps {
            time.advance();
        }
        assert_eq!(interval_due(&time, interval), expected);
    }

    #[rstest]
    #[case(0, 0.0)]
    #[case(1, 100.0)]
    #[case(7, 700.0)]
    fn test_charge(#[case] units: usize, #[case] expected: f64) {
        let time = Time::new(1.0, 3.0).unwrap();
        let mut ledger = vec![0.0; 3];
        charge(&mut ledger, "find_cost", &time, units, 100.0).unwrap();
        assert_eq!(ledger[0], expected);
        assert_eq!(ledger[1..], [0.0, 0.0]);
    }

    #[test]
    fn test_charge_past_ledger_end_fails() {
        let mut time = Time::new(1.0, 3.0).unwrap();
        for _ in 0..3 {
            time.advance();
        }
        let mut ledger = vec![0.0; 3];
        assert!(matches!(
            charge(&mut ledger, "find_cost", &time, 1, 1.0),
            Err(SimError::CostIndexOutOfRange { index: 3, len: 3, .. })
        ));
        // Zero units never touch the ledger
        assert!(charge(&mut ledger, "find_cost", &time, 0, 1.0).is_ok());
    }

    #[test]
    fn test_choose_sites_takes_front_of_queue() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.enqueue(&[4, 2, 9, 1]);
        let time = Time::new(1.0, 10.0).unwrap();
        let chosen = base.choose_sites(&field(), &time, 2).unwrap();
        assert_eq!(chosen, vec![4, 2]);
        assert_eq!(base.queue, VecDeque::from(vec![9, 1]));
    }

    #[test]
    fn test_envelope_failures_stay_queued() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.envelope = OperatingEnvelope::new().with_rule(
            MetVariable::WindSpeed,
            EnvelopeRule::PerSite(vec![
                OperatingRange::new(0.0, 10.0),
                OperatingRange::new(0.0, 1.0),
                OperatingRange::new(0.0, 10.0),
                OperatingRange::new(0.0, 10.0),
            ]),
        );
        base.enqueue(&[1, 0, 2, 3]);
        let time = Time::new(1.0, 10.0).unwrap();
        let chosen = base.choose_sites(&field(), &time, 2).unwrap();
        assert_eq!(chosen, vec![0, 2]);
        assert_eq!(base.queue, VecDeque::from(vec![1, 3]));
    }

    #[test]
    fn test_check_time_combines_hours_and_interval() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.ophrs = OperatingHours::new(8.0, 17.0).unwrap();
        base.survey_interval = Some(2.0);
        let mut time = Time::new(1.0 / 24.0, 10.0).unwrap();
        assert!(!base.check_time(&time));
        for _ in 0..9 {
            time.advance();
        }
        // 09:00 on day 0, a survey day
        assert!(base.check_time(&time));

        let mut daily = Time::new(1.0, 10.0).unwrap();
        assert!(base.check_time(&daily));
        daily.advance();
        assert!(!base.check_time(&daily));
        daily.advance();
        assert!(base.check_time(&daily));
    }

    #[rstest]
    #[case::day0_open(0, 8, true)]
    #[case::day0_last_hour(0, 16, true)]
    #[case::day0_closed(0, 17, false)]
    #[case::day0_early(0, 7, false)]
    #[case::off_day(1, 9, false)]
    #[case::day2_open(2, 8, true)]
    #[case::off_day_noon(3, 12, false)]
    #[case::day4_noon(4, 12, true)]
    fn test_sub_daily_steps_survey_every_other_day(
        #[case] day: usize,
        #[case] hour: usize,
        #[case] expected: bool,
    ) {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.ophrs = OperatingHours::new(8.0, 17.0).unwrap();
        base.survey_interval = Some(2.0);
        let mut time = Time::new(1.0 / 24.0, 10.0).unwrap();
        for _ in 0..day * 24 + hour {
            time.advance();
        }
        assert_eq!(base.check_time(&time), expected);
    }

    #[test]
    fn test_sub_daily_cadence_opens_full_window() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.ophrs = OperatingHours::new(8.0, 17.0).unwrap();
        base.survey_interval = Some(2.0);
        let mut time = Time::new(1.0 / 24.0, 10.0).unwrap();
        let mut active = Vec::new();
        for _ in 0..240 {
            if base.check_time(&time) {
                active.push(time.time_index);
            }
            time.advance();
        }
        let expected: Vec<usize> = [0, 2, 4, 6, 8]
            .iter()
            .flat_map(|d| (8..17).map(move |h| d * 24 + h))
            .collect();
        assert_eq!(active, expected);
    }

    #[rstest]
    #[case(None, 3, true)]
    #[case(Some(7.0), 0, true)]
    #[case(Some(7.0), 6, false)]
    #[case(Some(7.0), 7, true)]
    fn test_survey_day_due_matches_interval_for_daily_steps(
        #[case] interval: Option<f64>,
        #[case] steps: usize,
        #[case] expected: bool,
    ) {
        let mut time = Time::new(1.0, 100.0).unwrap();
        for _ in 0..steps {
            time.advance();
        }
        assert_eq!(survey_day_due(&time, interval), expected);
        assert_eq!(interval_due(&time, interval), expected);
    }

    #[test]
    fn test_out_of_field_site_aborts_and_keeps_queue() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        base.enqueue(&[3, 500]);
        let time = Time::new(1.0, 10.0).unwrap();
        let result = base.choose_sites(&field(), &time, 2);
        assert!(matches!(
            result,
            Err(SimError::SiteIndexOutOfRange { index: 500, n_sites: 10 })
        ));
        assert_eq!(base.queue, VecDeque::from(vec![3, 500]));
    }

    #[test]
    fn test_validate_dimension_mismatch() {
        let sink = Rc::new(RefCell::new(Sink));
        let mut base = base(&sink);
        assert!(base.validate().is_ok());
        base.detection_variables
            .push(DetectionVariable::met(MetVariable::WindSpeed, Default::default()));
        assert!(base.validate().is_err());
    }
}
