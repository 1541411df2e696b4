//! # Emission Store
//!
//! Columnar (struct-of-arrays) storage for every emission in a run.
//!
//! The columns are allocated with spare physical capacity and only the first
//! `n_em` entries are meaningful. Appending past the capacity reallocates all
//! columns at once (doubling), so a run never allocates per emission event.
//!
//! Entries are append-only. The only fields mutated after insertion are
//! `end_time` (set on resolution) and `detected`.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{SimError, SimResult};

const DEFAULT_CAPACITY: usize = 1024;

/// One emission, used to build batches row by row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub flux: f64,
    pub site_index: usize,
    pub comp_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub repair_cost: Option<f64>,
}

/// Columnar batch of new emissions passed to [`Emission::add`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmissionBatch {
    pub flux: Vec<f64>,
    pub site_index: Vec<usize>,
    pub comp_index: Vec<usize>,
    pub start_time: Vec<f64>,
    pub end_time: Vec<f64>,
    pub repair_cost: Vec<Option<f64>>,
}

impl EmissionBatch {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            flux: Vec::with_capacity(n),
            site_index: Vec::with_capacity(n),
            comp_index: Vec::with_capacity(n),
            start_time: Vec::with_capacity(n),
            end_time: Vec::with_capacity(n),
            repair_cost: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, record: EmissionRecord) {
        self.flux.push(record.flux);
        self.site_index.push(record.site_index);
        self.comp_index.push(record.comp_index);
        self.start_time.push(record.start_time);
        self.end_time.push(record.end_time);
        self.repair_cost.push(record.repair_cost);
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }

    /// Check that every column has the same number of entries
    fn check_lengths(&self) -> SimResult<usize> {
        let expected = self.flux.len();
        let columns: [(&'static str, usize); 5] = [
            ("site_index", self.site_index.len()),
            ("comp_index", self.comp_index.len()),
            ("start_time", self.start_time.len()),
            ("end_time", self.end_time.len()),
            ("repair_cost", self.repair_cost.len()),
        ];
        for (column, actual) in columns {
            if actual != expected {
                return Err(SimError::BatchLengthMismatch {
                    column,
                    expected,
                    actual,
                });
            }
        }
        Ok(expected)
    }
}

impl FromIterator<EmissionRecord> for EmissionBatch {
    fn from_iter<I: IntoIterator<Item = EmissionRecord>>(iter: I) -> Self {
        let mut batch = EmissionBatch::default();
        for record in iter {
            batch.push(record);
        }
        batch
    }
}

/// Emission store
#[derive(Debug, Clone)]
pub struct Emission {
    flux: Vec<f64>,
    site_index: Vec<usize>,
    comp_index: Vec<usize>,
    start_time: Vec<f64>,
    end_time: Vec<f64>,
    repair_cost: Vec<Option<f64>>,
    detected: Vec<bool>,
    /// Logical number of emissions; everything past it is scratch
    n_em: usize,
}

impl Default for Emission {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Emission {
    /// Create an empty store with the given physical capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            flux: vec![0.0; capacity],
            site_index: vec![0; capacity],
            comp_index: vec![0; capacity],
            start_time: vec![0.0; capacity],
            end_time: vec![f64::INFINITY; capacity],
            repair_cost: vec![None; capacity],
            detected: vec![false; capacity],
            n_em: 0,
        }
    }

    /// Create a store seeded with an initial batch
    pub fn from_batch(batch: &EmissionBatch) -> SimResult<Self> {
        let mut emissions = Self::with_capacity(batch.len().max(DEFAULT_CAPACITY));
        emissions.add(batch)?;
        Ok(emissions)
    }

    /// Logical number of emissions
    pub fn n_em(&self) -> usize {
        self.n_em
    }

    /// Physical capacity of the columns
    pub fn capacity(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_em == 0
    }

    /// Append a batch of emissions, returning the index range they occupy
    pub fn add(&mut self, batch: &EmissionBatch) -> SimResult<Range<usize>> {
        let n_new = batch.check_lengths()?;
        let start = self.n_em;
        let end = start + n_new;
        if end > self.capacity() {
            self.grow(end);
        }

        self.flux[start..end].copy_from_slice(&batch.flux);
        self.site_index[start..end].copy_from_slice(&batch.site_index);
        self.comp_index[start..end].copy_from_slice(&batch.comp_index);
        self.start_time[start..end].copy_from_slice(&batch.start_time);
        self.end_time[start..end].copy_from_slice(&batch.end_time);
        self.repair_cost[start..end].copy_from_slice(&batch.repair_cost);
        self.detected[start..end].fill(false);
        self.n_em = end;

        Ok(start..end)
    }

    /// Double the physical capacity until `required` entries fit
    fn grow(&mut self, required: usize) {
        let mut capacity = self.capacity().max(1);
        while capacity < required {
            capacity *= 2;
        }
        self.flux.resize(capacity, 0.0);
        self.site_index.resize(capacity, 0);
        self.comp_index.resize(capacity, 0);
        self.start_time.resize(capacity, 0.0);
        self.end_time.resize(capacity, f64::INFINITY);
        self.repair_cost.resize(capacity, None);
        self.detected.resize(capacity, false);
    }

    fn check_index(&self, array: &'static str, index: usize) -> SimResult<()> {
        if index >= self.n_em {
            return Err(SimError::EmissionIndexOutOfRange {
                array,
                index,
                n_em: self.n_em,
            });
        }
        Ok(())
    }

    /// Mark emissions as ended at `end_time`.
    ///
    /// Every index is checked before anything is written, so a failing call
    /// leaves the store untouched. Emissions that already end at or before
    /// `end_time` keep their original end time. Returns the number of entries
    /// whose end time changed.
    pub fn resolve(&mut self, indices: &[usize], end_time: f64) -> SimResult<usize> {
        for &index in indices {
            self.check_index("end_time", index)?;
        }

        let mut resolved = 0;
        for &index in indices {
            if end_time < self.end_time[index] {
                self.end_time[index] = end_time;
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Set the detection flag on emissions. Returns the number newly flagged.
    pub fn detected(&mut self, indices: &[usize]) -> SimResult<usize> {
        for &index in indices {
            self.check_index("detected", index)?;
        }

        let mut flagged = 0;
        for &index in indices {
            if !self.detected[index] {
                self.detected[index] = true;
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux[..self.n_em]
    }

    pub fn site_index(&self) -> &[usize] {
        &self.site_index[..self.n_em]
    }

    pub fn comp_index(&self) -> &[usize] {
        &self.comp_index[..self.n_em]
    }

    pub fn start_time(&self) -> &[f64] {
        &self.start_time[..self.n_em]
    }

    pub fn end_time(&self) -> &[f64] {
        &self.end_time[..self.n_em]
    }

    pub fn repair_cost(&self) -> &[Option<f64>] {
        &self.repair_cost[..self.n_em]
    }

    pub fn detection(&self) -> &[bool] {
        &self.detected[..self.n_em]
    }

    /// Whether emission `index` is emitting at time `t` (`start <= t < end`)
    pub fn is_active(&self, index: usize, t: f64) -> bool {
        index < self.n_em && self.start_time[index] <= t && t < self.end_time[index]
    }

    /// Indices of all emissions active at time `t`
    pub fn active_indices(&self, t: f64) -> impl Iterator<Item = usize> + '_ {
        (0..self.n_em).filter(move |&i| self.is_active(i, t))
    }

    /// Total flux of all emissions active at time `t`
    pub fn active_flux(&self, t: f64) -> f64 {
        self.active_indices(t).map(|i| self.flux[i]).sum()
    }
}
