//! # LDAR Program
//!
//! A leak detection and repair program: an ordered list of detection methods,
//! one repair handler, and the cost ledgers they charge.
//!
//! Methods run in the order they were added, every step. A method dispatching
//! into another method that runs later in the list is seen by it in the same
//! step; dispatching into an earlier one is seen next step. Repairs run after
//! every method has had its turn.
//!
//! When a `survey_interval` is set the program acts as the queue manager:
//! at each interval boundary every site in the field is queued on the entry
//! methods.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::detection::{interval_due, DetectionMethod, DetectionRecord, Repair, SimRng};
use crate::domain::{Emission, GasField, Time};
use crate::error::{SimError, SimResult};

pub type MethodRef = Rc<RefCell<dyn DetectionMethod>>;

pub struct LdarProgram {
    methods: Vec<MethodRef>,
    /// Indices into `methods` fed by the interval requeue
    entry_points: Vec<usize>,
    repair: Rc<RefCell<Repair>>,
    survey_interval: Option<f64>,
    find_cost: Vec<f64>,
    repair_cost: Vec<f64>,
}

impl LdarProgram {
    /// Ledgers are sized to the run length of `time`
    pub fn new(time: &Time, repair: Rc<RefCell<Repair>>) -> Self {
        let n = time.n_timesteps();
        Self {
            methods: Vec::new(),
            entry_points: Vec::new(),
            repair,
            survey_interval: None,
            find_cost: vec![0.0; n],
            repair_cost: vec![0.0; n],
        }
    }

    pub fn with_method(mut self, method: MethodRef) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a method that receives the whole field at each survey interval
    pub fn with_entry_method(mut self, method: MethodRef) -> Self {
        self.entry_points.push(self.methods.len());
        self.methods.push(method);
        self
    }

    pub fn with_survey_interval(mut self, days: f64) -> Self {
        self.survey_interval = Some(days);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if let Some(interval) = self.survey_interval {
            if interval <= 0.0 {
                return Err(SimError::config(format!(
                    "program survey_interval must be positive, got {}",
                    interval
                )));
            }
            if self.entry_points.is_empty() {
                return Err(SimError::config(
                    "program has a survey_interval but no entry methods to queue sites on",
                ));
            }
        }
        Ok(())
    }

    pub fn n_methods(&self) -> usize {
        self.methods.len()
    }

    pub fn find_cost(&self) -> &[f64] {
        &self.find_cost
    }

    pub fn repair_cost(&self) -> &[f64] {
        &self.repair_cost
    }

    pub fn repair(&self) -> &Rc<RefCell<Repair>> {
        &self.repair
    }

    /// Detection records from every method, in method order
    pub fn records(&self) -> Vec<DetectionRecord> {
        self.methods
            .iter()
            .flat_map(|m| m.borrow().records().to_vec())
            .collect()
    }

    fn requeue(&self, time: &Time, gas_field: &GasField) {
        let Some(interval) = self.survey_interval else {
            return;
        };
        if !interval_due(time, Some(interval)) {
            return;
        }
        let sites: Vec<usize> = (0..gas_field.n_sites()).collect();
        for &entry in &self.entry_points {
            let mut method = self.methods[entry].borrow_mut();
            let backlog = method.queue_len();
            if backlog > 0 {
                warn!(
                    method = %method.name(),
                    backlog,
                    time_index = time.time_index,
                    "Previous survey round has not drained; queueing the field behind it"
                );
            }
            method.action(&sites, &[]);
        }
        debug!(
            time_index = time.time_index,
            n_sites = sites.len(),
            n_entry = self.entry_points.len(),
            "Queued field for survey"
        );
    }

    pub fn step(
        &mut self,
        time: &Time,
        gas_field: &GasField,
        emissions: &mut Emission,
        rng: &mut SimRng,
    ) -> SimResult<()> {
        self.requeue(time, gas_field);

        for method in &self.methods {
            let mut method = method.try_borrow_mut().map_err(|_| SimError::DispatchCycle)?;
            method.detect(time, gas_field, emissions, &mut self.find_cost, rng)?;
        }

        self.repair
            .try_borrow_mut()
            .map_err(|_| SimError::DispatchCycle)?
            .repair(time, gas_field, emissions, &mut self.repair_cost)?;
        Ok(())
    }
}

impl std::fmt::Debug for LdarProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .methods
            .iter()
            .map(|m| m.borrow().name().to_string())
            .collect();
        f.debug_struct("LdarProgram")
            .field("methods", &names)
            .field("entry_points", &self.entry_points)
            .field("survey_interval", &self.survey_interval)
            .finish()
    }
}
