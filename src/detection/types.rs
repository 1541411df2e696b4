//! # Detection Types
//!
//! Contracts shared by every detection method and dispatch target.
//!
//! ## Dispatch
//!
//! A detection method forwards what it flags to exactly one downstream
//! [`DispatchTarget`]: another detection method (chaining), a repair handler,
//! or a program-level queue manager. The method only holds a non-owning
//! [`DispatchHandle`]; the target is owned by whoever assembled the program.
//!
//! ## Stepping
//!
//! [`DetectionMethod::detect`] is the per-step entry point. It must not touch
//! the cost ledger or draw random numbers when [`DetectionMethod::check_time`]
//! is false.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use strum_macros::{Display, EnumString};

use crate::domain::{Emission, GasField, InterpMode, MetVariable, Time};
use crate::error::{SimError, SimResult};

/// The single pseudorandom source threaded through a run
pub type SimRng = StdRng;

/// Consumer side of the detection contract.
///
/// Exactly one of the two arguments is meaningful for a given implementor;
/// callers pass an empty slice for the other.
#[cfg_attr(test, mockall::automock)]
pub trait DispatchTarget {
    fn action(&mut self, site_indices: &[usize], emission_indices: &[usize]);
}

/// Non-owning reference to a dispatch target, fixed at construction
#[derive(Clone)]
pub struct DispatchHandle(Weak<RefCell<dyn DispatchTarget>>);

impl DispatchHandle {
    pub fn new<T: DispatchTarget + 'static>(target: &Rc<RefCell<T>>) -> Self {
        let target: Rc<RefCell<dyn DispatchTarget>> = target.clone();
        Self(Rc::downgrade(&target))
    }

    pub fn from_dyn(target: &Rc<RefCell<dyn DispatchTarget>>) -> Self {
        Self(Rc::downgrade(target))
    }

    /// Whether the target still exists
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Forward flagged sites or emissions to the target
    pub fn dispatch(&self, site_indices: &[usize], emission_indices: &[usize]) -> SimResult<()> {
        let target = self.0.upgrade().ok_or(SimError::DispatchTargetDropped)?;
        let mut target = target
            .try_borrow_mut()
            .map_err(|_| SimError::DispatchCycle)?;
        target.action(site_indices, emission_indices);
        Ok(())
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Per-emission quantities a probability curve can depend on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmissionVariable {
    Flux,
    RepairCost,
}

impl EmissionVariable {
    /// Value of this variable for emission `index`
    pub fn value(&self, emissions: &Emission, index: usize) -> f64 {
        match self {
            EmissionVariable::Flux => emissions.flux()[index],
            EmissionVariable::RepairCost => emissions.repair_cost()[index].unwrap_or(0.0),
        }
    }
}

/// One input of a probability-of-detection curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DetectionVariable {
    /// Summed (site surveys) or read directly (component surveys) from the store
    Emission { variable: EmissionVariable },
    /// Read from the field's meteorological series
    Met {
        variable: MetVariable,
        #[serde(default)]
        mode: InterpMode,
    },
}

impl DetectionVariable {
    pub fn flux() -> Self {
        DetectionVariable::Emission {
            variable: EmissionVariable::Flux,
        }
    }

    pub fn met(variable: MetVariable, mode: InterpMode) -> Self {
        DetectionVariable::Met { variable, mode }
    }
}

/// What a method did during one active step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub method: String,
    pub time_index: usize,
    pub sites_surveyed: Vec<usize>,
    pub flagged_sites: Vec<usize>,
    pub flagged_emissions: Vec<usize>,
}

/// A sensing technology stepped by the simulation loop
pub trait DetectionMethod: DispatchTarget {
    fn name(&self) -> &str;

    /// Whether the method operates during the step starting at `time`
    fn check_time(&self, time: &Time) -> bool;

    /// Select up to `n` sites eligible under the operating envelope,
    /// consuming them from the method's candidate structure
    fn choose_sites(&mut self, gas_field: &GasField, time: &Time, n: usize) -> SimResult<Vec<usize>>;

    fn detect(
        &mut self,
        time: &Time,
        gas_field: &GasField,
        emissions: &Emission,
        find_cost: &mut [f64],
        rng: &mut SimRng,
    ) -> SimResult<()>;

    fn records(&self) -> &[DetectionRecord];

    /// Sites still waiting to be surveyed
    fn queue_len(&self) -> usize;
}
