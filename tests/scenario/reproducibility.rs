use std::cell::RefCell;
use std::rc::Rc;

use ldar_sim::config::Config;
use ldar_sim::detection::{DispatchHandle, ProbabilityTable, Repair, SiteSurvey, SiteSurveyConfig};
use ldar_sim::domain::{OperatingHours, Time};
use ldar_sim::program::{LdarProgram, Simulation, SimulationResults};

use super::fugitive_field;

fn run(seed: u64, with_survey: bool) -> SimulationResults {
    let time = Time::new(1.0, 60.0).unwrap();
    let repair = Rc::new(RefCell::new(Repair::default()));
    let mut program = LdarProgram::new(&time, repair.clone());
    if with_survey {
        let survey = Rc::new(RefCell::new(
            SiteSurvey::new(
                &time,
                DispatchHandle::new(&repair),
                SiteSurveyConfig::default()
                    .with_ophrs(OperatingHours::default())
                    .with_sites_per_day(5.0),
                ProbabilityTable::new(vec![vec![0.0], vec![2.0]], vec![0.0, 0.9]).unwrap(),
            )
            .unwrap(),
        ));
        program = program.with_entry_method(survey).with_survey_interval(10.0);
    }
    Simulation::with_initial_emissions(time, fugitive_field(30, 200, 0.0005), program, seed)
        .unwrap()
        .run()
        .unwrap()
}

#[test]
fn test_same_seed_reproduces_run() {
    let a = run(17, true);
    let b = run(17, true);
    assert_eq!(a.summary, b.summary);
    assert_eq!(a.find_cost, b.find_cost);
    assert_eq!(a.emission_rate, b.emission_rate);
    assert_eq!(a.records, b.records);
}

#[test]
fn test_programs_share_emission_realisation() {
    let with_survey = run(99, true);
    let without = run(99, false);
    assert_eq!(with_survey.emissions.n_em(), without.emissions.n_em());
    assert_eq!(with_survey.emissions.flux(), without.emissions.flux());
    assert_eq!(with_survey.emissions.start_time(), without.emissions.start_time());
    assert!(with_survey.summary.mean_emission_rate <= without.summary.mean_emission_rate);
}

#[test]
fn test_default_config_file_builds() {
    let text = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml"))
        .unwrap();
    let config = Config::from_toml_str(&text).unwrap();
    config.validate().unwrap();
    let simulation = config.build_scenario().unwrap();
    assert_eq!(simulation.gas_field().n_sites(), 105);
    assert_eq!(simulation.program().n_methods(), 2);
}
