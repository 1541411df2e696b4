use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use rand::{Rng, SeedableRng};

use ldar_sim::detection::{
    DetectionMethod, DispatchHandle, DispatchTarget, ProbabilityTable, SimRng, SiteSurvey,
    SiteSurveyConfig,
};
use ldar_sim::domain::{OperatingHours, Time};

use super::{fugitive_field, seeded_emissions};

#[derive(Default)]
struct FlaggedSites(Vec<usize>);

impl DispatchTarget for FlaggedSites {
    fn action(&mut self, site_indices: &[usize], _emission_indices: &[usize]) {
        self.0.extend_from_slice(site_indices);
    }
}

/// Zero flux is never found, any positive flux sum always is
fn positive_flux_table() -> ProbabilityTable {
    ProbabilityTable::new(vec![vec![0.0], vec![1e-9], vec![1e9]], vec![0.0, 1.0, 1.0]).unwrap()
}

#[test]
fn test_site_survey_flags_exactly_the_emitting_sites() {
    let field = fugitive_field(100, 100, 0.0);
    let mut placement = SimRng::seed_from_u64(2024);
    let sites: Vec<usize> = (0..100).map(|_| placement.gen_range(0..100)).collect();
    let emissions = seeded_emissions(&sites);
    let expected: BTreeSet<usize> = sites.iter().copied().collect();

    let time = Time::new(1.0, 1.0).unwrap();
    let target = Rc::new(RefCell::new(FlaggedSites::default()));
    let site_cost = 125.0;
    let config = SiteSurveyConfig::default()
        .with_sites_per_day(100.0)
        .with_site_cost(site_cost)
        .with_ophrs(OperatingHours::default())
        .with_site_queue((0..100).collect());
    let mut survey = SiteSurvey::new(
        &time,
        DispatchHandle::new(&target),
        config,
        positive_flux_table(),
    )
    .unwrap();
    assert_eq!(survey.sites_per_timestep(), 100);

    let mut find_cost = vec![0.0; time.n_timesteps()];
    let mut rng = SimRng::seed_from_u64(1);
    let n_em = emissions.n_em();
    survey
        .detect(&time, &field, &emissions, &mut find_cost, &mut rng)
        .unwrap();

    let flagged: BTreeSet<usize> = target.borrow().0.iter().copied().collect();
    assert_eq!(flagged, expected);
    assert_eq!(target.borrow().0.len(), expected.len());
    assert_eq!(find_cost[0], 100.0 * site_cost);
    assert_eq!(emissions.n_em(), n_em);
    assert!(emissions.end_time().iter().all(|t| t.is_infinite()));
    assert!(survey.site_queue().is_empty());
}

#[test]
fn test_sub_daily_steps_respect_operating_hours() {
    let field = fugitive_field(20, 10, 0.0);
    let emissions = seeded_emissions(&[0, 5, 19]);
    let mut time = Time::new(1.0 / 24.0, 1.0).unwrap();
    let target = Rc::new(RefCell::new(FlaggedSites::default()));
    let config = SiteSurveyConfig::default()
        .with_sites_per_day(20.0)
        .with_site_cost(1.0)
        .with_ophrs(OperatingHours::new(8.0, 12.0).unwrap())
        .with_site_queue((0..20).collect());
    let mut survey = SiteSurvey::new(
        &time,
        DispatchHandle::new(&target),
        config,
        positive_flux_table(),
    )
    .unwrap();
    // 20 sites over a 4-hour window, one hour per step
    assert_eq!(survey.sites_per_timestep(), 5);

    let mut find_cost = vec![0.0; time.n_timesteps()];
    let mut rng = SimRng::seed_from_u64(8);
    while !time.is_finished() {
        survey
            .detect(&time, &field, &emissions, &mut find_cost, &mut rng)
            .unwrap();
        time.advance();
    }

    let charged_hours: Vec<usize> = find_cost
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0.0)
        .map(|(h, _)| h)
        .collect();
    assert_eq!(charged_hours, vec![8, 9, 10, 11]);
    assert_eq!(find_cost.iter().sum::<f64>(), 20.0);
    assert_eq!(target.borrow().0, vec![0, 5, 19]);
}
