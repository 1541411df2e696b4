//! # Gas Field Topology
//!
//! The full field: how many sites of each type exist, what is installed on
//! them, and the stochastic process producing new emissions.
//!
//! Site indices are global across the field. Sites of the first declared type
//! occupy `0..count_0`, the next type follows, and so on. The flattened
//! `site_type_of` table gives O(1) lookup from a site index to its type.
//!
//! ## Emission process
//!
//! Each step, for every (site type, component group) pair, a Poisson number of
//! new emissions is drawn with mean
//! `emission_production_rate × components_per_site × n_sites_of_type × delta_t`.
//! Each new emission is placed uniformly on a site of that type and on a
//! component of that group.

use rand::Rng;
use rand_distr::{Binomial, Distribution, Poisson};
use std::ops::Range;
use tracing::{debug, info};

use super::{
    Component, Emission, EmissionBatch, EmissionRecord, InterpMode, MetData, MetVariable,
    OperatingHours, Site, Time,
};
use crate::error::{SimError, SimResult};

/// A site type and how many instances of it exist in the field
#[derive(Debug, Clone, PartialEq)]
pub struct SiteType {
    pub name: String,
    pub count: usize,
    pub site: Site,
}

impl SiteType {
    pub fn new(name: impl Into<String>, count: usize, site: Site) -> Self {
        Self {
            name: name.into(),
            count,
            site,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GasField {
    site_types: Vec<SiteType>,
    /// site_index -> index into `site_types`
    site_type_of: Vec<usize>,
    /// First global site index of each site type
    first_site: Vec<usize>,
    met: MetData,
}

impl GasField {
    pub fn new(site_types: Vec<SiteType>) -> SimResult<Self> {
        if site_types.is_empty() {
            return Err(SimError::config("gas field has no site types"));
        }

        let mut site_type_of = Vec::new();
        let mut first_site = Vec::with_capacity(site_types.len());
        for (type_index, site_type) in site_types.iter().enumerate() {
            if site_types[..type_index]
                .iter()
                .any(|other| other.name == site_type.name)
            {
                return Err(SimError::config(format!(
                    "gas field declares site type '{}' twice",
                    site_type.name
                )));
            }
            first_site.push(site_type_of.len());
            site_type_of.extend(std::iter::repeat(type_index).take(site_type.count));
        }

        info!(
            n_sites = site_type_of.len(),
            n_site_types = site_types.len(),
            "Gas field constructed"
        );

        Ok(Self {
            site_types,
            site_type_of,
            first_site,
            met: MetData::default(),
        })
    }

    pub fn with_met(mut self, met: MetData) -> Self {
        self.met = met;
        self
    }

    pub fn met(&self) -> &MetData {
        &self.met
    }

    pub fn n_sites(&self) -> usize {
        self.site_type_of.len()
    }

    pub fn site_types(&self) -> &[SiteType] {
        &self.site_types
    }

    /// Site type owning `site_index`
    pub fn site_type(&self, site_index: usize) -> SimResult<&SiteType> {
        self.site_type_of
            .get(site_index)
            .map(|&t| &self.site_types[t])
            .ok_or(SimError::SiteIndexOutOfRange {
                index: site_index,
                n_sites: self.n_sites(),
            })
    }

    /// Global site indices of the named site type
    pub fn sites_of_type(&self, name: &str) -> Option<Range<usize>> {
        self.site_types
            .iter()
            .position(|t| t.name == name)
            .map(|t| self.first_site[t]..self.first_site[t] + self.site_types[t].count)
    }

    /// Component installed at (`site_index`, `comp_index`)
    pub fn component(&self, site_index: usize, comp_index: usize) -> Option<&Component> {
        let site_type = self.site_type_of.get(site_index)?;
        self.site_types[*site_type]
            .site
            .component_at(comp_index)
            .map(|group| &group.component)
    }

    /// Components across every site in the field
    pub fn total_components(&self) -> usize {
        self.site_types
            .iter()
            .map(|t| t.count * t.site.total_components())
            .sum()
    }

    /// Meteorological value at the current step. `Mean` averages over the
    /// operating window of the current day.
    pub fn met_value(
        &self,
        time: &Time,
        variable: MetVariable,
        mode: InterpMode,
        ophrs: &OperatingHours,
    ) -> SimResult<f64> {
        self.met
            .value(variable, time.current_time, mode, ophrs.window_on(time))
    }

    /// Emissions already present at t = 0: each component leaks with
    /// probability `emission_per_comp`.
    pub fn initial_emissions<R: Rng + ?Sized>(&self, rng: &mut R) -> SimResult<Emission> {
        let mut batch = EmissionBatch::default();

        for (type_index, site_type) in self.site_types.iter().enumerate() {
            for site_index in self.first_site[type_index]..self.first_site[type_index] + site_type.count {
                for (group_index, group) in site_type.site.components().iter().enumerate() {
                    let component = &group.component;
                    let binomial = Binomial::new(group.count as u64, component.emission_per_comp)
                        .map_err(|e| SimError::Distribution(e.to_string()))?;
                    let n_leaking = binomial.sample(rng);
                    let comps = site_type.site.group_range(group_index);

                    for _ in 0..n_leaking {
                        batch.push(EmissionRecord {
                            flux: component.emission_size.sample(rng)?,
                            site_index,
                            comp_index: rng.gen_range(comps.clone()),
                            start_time: 0.0,
                            end_time: component.end_time_from(0.0),
                            repair_cost: component.repair_cost,
                        });
                    }
                }
            }
        }

        info!(n_em = batch.len(), "Initial emissions seeded");
        Emission::from_batch(&batch)
    }

    /// Draw this step's new emissions and append them to the store.
    /// Returns the number added.
    pub fn emerge<R: Rng + ?Sized>(
        &self,
        time: &Time,
        emissions: &mut Emission,
        rng: &mut R,
    ) -> SimResult<usize> {
        let mut batch = EmissionBatch::default();

        for (type_index, site_type) in self.site_types.iter().enumerate() {
            if site_type.count == 0 {
                continue;
            }
            let sites = self.first_site[type_index]..self.first_site[type_index] + site_type.count;

            for (group_index, group) in site_type.site.components().iter().enumerate() {
                let component = &group.component;
                let mean = component.emission_production_rate
                    * group.count as f64
                    * site_type.count as f64
                    * time.delta_t;
                if mean <= 0.0 || group.count == 0 {
                    continue;
                }

                let poisson =
                    Poisson::new(mean).map_err(|e| SimError::Distribution(e.to_string()))?;
                let n_new: f64 = poisson.sample(rng);
                let comps = site_type.site.group_range(group_index);

                for _ in 0..n_new as usize {
                    batch.push(EmissionRecord {
                        flux: component.emission_size.sample(rng)?,
                        site_index: rng.gen_range(sites.clone()),
                        comp_index: rng.gen_range(comps.clone()),
                        start_time: time.current_time,
                        end_time: component.end_time_from(time.current_time),
                        repair_cost: component.repair_cost,
                    });
                }
            }
        }

        let n_new = batch.len();
        if n_new > 0 {
            emissions.add(&batch)?;
            debug!(
                time_index = time.time_index,
                n_new,
                n_em = emissions.n_em(),
                "New emissions"
            );
        }
        Ok(n_new)
    }
}
