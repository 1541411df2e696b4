use std::cell::RefCell;
use std::rc::Rc;

use ldar_sim::detection::{
    CompSurvey, CompSurveyConfig, DispatchHandle, ProbabilityTable, Repair, RepairConfig,
    SiteSurvey, SiteSurveyConfig,
};
use ldar_sim::domain::{OperatingHours, Time};
use ldar_sim::program::{LdarProgram, Simulation};

use super::{fugitive_field, seeded_emissions};

fn always() -> ProbabilityTable {
    ProbabilityTable::new(vec![vec![0.0], vec![1e-9]], vec![0.0, 1.0]).unwrap()
}

/// Site screen -> component survey -> repair, all within one day
fn chained_program(time: &Time, repair_delay: f64) -> LdarProgram {
    let repair = Rc::new(RefCell::new(
        Repair::new(RepairConfig::default().with_repair_delay(repair_delay)).unwrap(),
    ));
    let ogi = Rc::new(RefCell::new(
        CompSurvey::new(
            time,
            DispatchHandle::new(&repair),
            CompSurveyConfig::default()
                .with_name("ogi")
                .with_ophrs(OperatingHours::default())
                .with_comps_per_day(10_000.0)
                .with_comp_cost(0.5),
            always(),
        )
        .unwrap(),
    ));
    let screen = Rc::new(RefCell::new(
        SiteSurvey::new(
            time,
            DispatchHandle::new(&ogi),
            SiteSurveyConfig::default()
                .with_name("screen")
                .with_ophrs(OperatingHours::default())
                .with_sites_per_day(50.0)
                .with_site_cost(10.0),
            always(),
        )
        .unwrap(),
    ));

    LdarProgram::new(time, repair)
        .with_entry_method(screen)
        .with_method(ogi)
        .with_survey_interval(30.0)
}

#[test]
fn test_chain_repairs_every_seeded_emission() {
    let time = Time::new(1.0, 5.0).unwrap();
    let field = fugitive_field(50, 100, 0.0);
    let emissions = seeded_emissions(&[1, 1, 7, 30, 49]);
    let program = chained_program(&time, 0.0);

    let results = Simulation::new(time, field, emissions, program, 3)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(results.emission_rate, vec![0.0; 5]);
    assert_eq!(results.summary.n_detected, 5);
    // 50 sites screened, 4 emitting sites x 100 components surveyed
    assert_eq!(results.find_cost[0], 50.0 * 10.0 + 400.0 * 0.5);
    assert_eq!(results.repair_cost[0], 5.0 * 2.0);
    assert_eq!(results.find_cost[1..].iter().sum::<f64>(), 0.0);

    let screen = results.records.iter().find(|r| r.method == "screen").unwrap();
    assert_eq!(screen.flagged_sites, vec![1, 7, 30, 49]);
    let ogi = results.records.iter().find(|r| r.method == "ogi").unwrap();
    assert_eq!(ogi.flagged_emissions, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_repair_delay_keeps_emissions_active() {
    let time = Time::new(1.0, 6.0).unwrap();
    let field = fugitive_field(10, 100, 0.0);
    let emissions = seeded_emissions(&[2, 4]);
    let program = chained_program(&time, 3.0);

    let results = Simulation::new(time, field, emissions, program, 3)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(results.emission_rate, vec![2.0, 2.0, 2.0, 0.0, 0.0, 0.0]);
    assert_eq!(results.repair_cost[3], 4.0);
}
