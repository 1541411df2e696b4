//! Operating envelopes: the meteorological conditions under which a method
//! may survey a given site.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{GasField, InterpMode, MetVariable, OperatingHours, Time};
use crate::error::{SimError, SimResult};

/// One or more closed ranges `[min[i], max[i]]`; a value passes if any
/// range contains it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingRange {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl OperatingRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: vec![min],
            max: vec![max],
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.min.is_empty() || self.min.len() != self.max.len() {
            return Err(SimError::config(format!(
                "operating range needs matching min/max lists, got {} and {}",
                self.min.len(),
                self.max.len()
            )));
        }
        if self.min.iter().zip(&self.max).any(|(lo, hi)| lo > hi) {
            return Err(SimError::config("operating range has min greater than max"));
        }
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min
            .iter()
            .zip(&self.max)
            .any(|(&lo, &hi)| lo <= value && value <= hi)
    }
}

/// Which sites a range applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", content = "bounds", rename_all = "snake_case")]
pub enum EnvelopeRule {
    /// Same range for every site
    Global(OperatingRange),
    /// Range keyed by site-type name; unlisted types are unconstrained
    PerSiteType(BTreeMap<String, OperatingRange>),
    /// Range per global site index; sites past the end are unconstrained
    PerSite(Vec<OperatingRange>),
}

impl EnvelopeRule {
    fn validate(&self) -> SimResult<()> {
        match self {
            EnvelopeRule::Global(range) => range.validate(),
            EnvelopeRule::PerSiteType(ranges) => ranges.values().try_for_each(|r| r.validate()),
            EnvelopeRule::PerSite(ranges) => ranges.iter().try_for_each(|r| r.validate()),
        }
    }

    fn range_for(&self, gas_field: &GasField, site_index: usize) -> SimResult<Option<&OperatingRange>> {
        Ok(match self {
            EnvelopeRule::Global(range) => Some(range),
            EnvelopeRule::PerSiteType(ranges) => {
                ranges.get(&gas_field.site_type(site_index)?.name)
            }
            EnvelopeRule::PerSite(ranges) => ranges.get(site_index),
        })
    }
}

/// Per-parameter rules; an empty envelope allows every site at all times
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatingEnvelope {
    rules: BTreeMap<MetVariable, EnvelopeRule>,
}

/// Met values evaluated once per step for envelope checks
pub type Conditions = BTreeMap<MetVariable, f64>;

impl OperatingEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, variable: MetVariable, rule: EnvelopeRule) -> Self {
        self.rules.insert(variable, rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self) -> SimResult<()> {
        self.rules.values().try_for_each(|r| r.validate())
    }

    /// Daily mean of each constrained variable over the operating window
    pub fn conditions(
        &self,
        gas_field: &GasField,
        time: &Time,
        ophrs: &OperatingHours,
    ) -> SimResult<Conditions> {
        self.rules
            .keys()
            .map(|&variable| {
                gas_field
                    .met_value(time, variable, InterpMode::Mean, ophrs)
                    .map(|value| (variable, value))
            })
            .collect()
    }

    /// Whether `site_index` may be surveyed under `conditions`
    pub fn allows(
        &self,
        gas_field: &GasField,
        site_index: usize,
        conditions: &Conditions,
    ) -> SimResult<bool> {
        for (variable, rule) in &self.rules {
            let Some(range) = rule.range_for(gas_field, site_index)? else {
                continue;
            };
            let value = conditions
                .get(variable)
                .copied()
                .ok_or(SimError::MissingMetVariable(*variable))?;
            if !range.contains(value) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
