mod chains;
mod end_to_end;
mod reproducibility;

use ldar_sim::domain::{
    Component, ComponentGroup, Emission, EmissionBatch, EmissionRecord, GasField, Site, SiteType,
};

/// `n_sites` pads with `comps` fugitive components each
pub fn fugitive_field(n_sites: usize, comps: usize, rate: f64) -> GasField {
    let site = Site::new(
        "basic pad",
        vec![ComponentGroup {
            category: "Fugitive".to_string(),
            count: comps,
            component: Component::new("Fugitive emitters").with_production_rate(rate),
        }],
    )
    .unwrap();
    GasField::new(vec![SiteType::new("basic pad", n_sites, site)]).unwrap()
}

/// One unit-flux emission per entry of `sites`, repair cost 2.0
pub fn seeded_emissions(sites: &[usize]) -> Emission {
    let batch: EmissionBatch = sites
        .iter()
        .enumerate()
        .map(|(i, &site)| EmissionRecord {
            flux: 1.0,
            site_index: site,
            comp_index: i % 100,
            start_time: 0.0,
            end_time: f64::INFINITY,
            repair_cost: Some(2.0),
        })
        .collect();
    Emission::from_batch(&batch).unwrap()
}
