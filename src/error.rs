use thiserror::Error;

use crate::domain::MetVariable;

/// Errors raised by the simulation engine.
///
/// Capacity and index violations are never recovered from inside the engine:
/// they propagate out of `Simulation::run` and abort the run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Emission index {index} out of range in `{array}` (n_em = {n_em})")]
    EmissionIndexOutOfRange {
        array: &'static str,
        index: usize,
        n_em: usize,
    },

    #[error("Cost ledger `{ledger}` has no slot for time index {index} (len = {len})")]
    CostIndexOutOfRange {
        ledger: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Site index {index} out of range (n_sites = {n_sites})")]
    SiteIndexOutOfRange { index: usize, n_sites: usize },

    #[error("Emission batch column `{column}` has {actual} entries, expected {expected}")]
    BatchLengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Meteorological variable `{0}` is not available on this gas field")]
    MissingMetVariable(MetVariable),

    #[error("Dispatch target has been dropped")]
    DispatchTargetDropped,

    #[error("Dispatch target is already executing (dispatch cycle)")]
    DispatchCycle,

    #[error("Distribution error: {0}")]
    Distribution(String),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SimError::InvalidConfig(msg.into())
    }
}
