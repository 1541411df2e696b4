//! Scenario configuration.
//!
//! Loaded from `config/default.toml` with `LDAR__`-prefixed environment
//! overrides (`LDAR__SIMULATION__SEED=7`).
//!
//! Detection methods are listed in invocation order. Each names the dispatch
//! target for what it flags: `"repair"` or a method listed after it. This
//! keeps every chain acyclic and lets producers run before their consumers
//! within a step.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::detection::{
    CompSurvey, CompSurveyConfig, DispatchHandle, ProbabilityTable, ProbabilityTableData, Repair,
    RepairConfig, SiteSurvey, SiteSurveyConfig,
};
use crate::domain::{
    ComponentGroup, GasField, MetData, MetSeries, MetVariable, Site, SiteType, Time,
};
use crate::error::{SimError, SimResult};
use crate::program::{LdarProgram, MethodRef, Simulation};

/// Reserved dispatch target name for the program's repair handler
pub const REPAIR_TARGET: &str = "repair";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub site_types: Vec<SiteTypeConfig>,
    #[serde(default)]
    pub met: Vec<MetSeriesConfig>,
    #[serde(default)]
    pub program: ProgramConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Days per step
    pub delta_t: f64,
    /// Run length in days
    pub end_time: f64,
    pub seed: u64,
    /// Seed the field with leaks present at t = 0
    #[serde(default = "default_true")]
    pub initial_emissions: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteTypeConfig {
    pub name: String,
    pub count: usize,
    pub components: Vec<ComponentGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetSeriesConfig {
    pub variable: MetVariable,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramConfig {
    /// Days between queueing the whole field on the entry methods
    pub survey_interval: Option<f64>,
}

/// One detection method. Exactly one of `site_survey` / `comp_survey` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodConfig {
    #[serde(default = "default_dispatch")]
    pub dispatch_to: String,
    /// Receives the whole field at each program survey interval
    #[serde(default)]
    pub entry: bool,
    pub table: ProbabilityTableData,
    pub site_survey: Option<SiteSurveyConfig>,
    pub comp_survey: Option<CompSurveyConfig>,
}

fn default_dispatch() -> String {
    REPAIR_TARGET.to_string()
}

impl MethodConfig {
    pub fn name(&self) -> &str {
        match (&self.site_survey, &self.comp_survey) {
            (Some(c), _) => &c.name,
            (None, Some(c)) => &c.name,
            (None, None) => "",
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        match (&self.site_survey, &self.comp_survey) {
            (Some(c), None) => c.validate(),
            (None, Some(c)) => c.validate(),
            _ => Err(SimError::config(format!(
                "method '{}' must set exactly one of site_survey or comp_survey",
                self.name()
            ))),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("LDAR__").split("__"));
        Ok(figment.extract()?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn validate(&self) -> SimResult<()> {
        Time::new(self.simulation.delta_t, self.simulation.end_time)?;
        if self.site_types.is_empty() {
            return Err(SimError::config("no site types configured"));
        }
        self.repair.validate()?;
        if let Some(interval) = self.program.survey_interval {
            if interval <= 0.0 {
                return Err(SimError::config("program survey_interval must be positive"));
            }
            if !self.methods.iter().any(|m| m.entry) {
                return Err(SimError::config(
                    "program survey_interval is set but no method is marked as entry",
                ));
            }
        }

        let mut names: Vec<&str> = vec![REPAIR_TARGET];
        for method in self.methods.iter().rev() {
            method.validate()?;
            if !names.contains(&method.dispatch_to.as_str()) {
                return Err(SimError::config(format!(
                    "method '{}' dispatches to '{}', which must be '{}' or a method listed after it",
                    method.name(),
                    method.dispatch_to,
                    REPAIR_TARGET
                )));
            }
            if names.contains(&method.name()) {
                return Err(SimError::config(format!(
                    "method name '{}' is used twice or reserved",
                    method.name()
                )));
            }
            names.push(method.name());
        }
        Ok(())
    }

    pub fn build_gas_field(&self) -> SimResult<GasField> {
        let site_types = self
            .site_types
            .iter()
            .map(|t| {
                Site::new(t.name.clone(), t.components.clone())
                    .map(|site| SiteType::new(t.name.clone(), t.count, site))
            })
            .collect::<SimResult<Vec<_>>>()?;

        let mut met = MetData::new();
        for series in &self.met {
            met.insert(
                series.variable,
                MetSeries::new(series.times.clone(), series.values.clone())?,
            );
        }
        Ok(GasField::new(site_types)?.with_met(met))
    }

    /// Build the methods back to front so each dispatch target exists first
    pub fn build_program(&self, time: &Time) -> SimResult<LdarProgram> {
        let repair = Rc::new(RefCell::new(Repair::new(self.repair.clone())?));
        let mut handles: HashMap<String, DispatchHandle> = HashMap::new();
        handles.insert(REPAIR_TARGET.to_string(), DispatchHandle::new(&repair));

        let mut built: Vec<(bool, MethodRef)> = Vec::with_capacity(self.methods.len());
        for method in self.methods.iter().rev() {
            method.validate()?;
            let dispatch = handles.get(&method.dispatch_to).cloned().ok_or_else(|| {
                SimError::config(format!(
                    "unknown dispatch target '{}' for method '{}'",
                    method.dispatch_to,
                    method.name()
                ))
            })?;
            let table = ProbabilityTable::from_data(method.table.clone())?;

            let (handle, method_ref): (DispatchHandle, MethodRef) =
                match (&method.site_survey, &method.comp_survey) {
                    (Some(config), None) => {
                        let survey = Rc::new(RefCell::new(SiteSurvey::new(
                            time,
                            dispatch,
                            config.clone(),
                            table,
                        )?));
                        let method_ref: MethodRef = survey.clone();
                        (DispatchHandle::new(&survey), method_ref)
                    }
                    (None, Some(config)) => {
                        let survey = Rc::new(RefCell::new(CompSurvey::new(
                            time,
                            dispatch,
                            config.clone(),
                            table,
                        )?));
                        let method_ref: MethodRef = survey.clone();
                        (DispatchHandle::new(&survey), method_ref)
                    }
                    _ => {
                        return Err(SimError::config(format!(
                            "method '{}' must set exactly one of site_survey or comp_survey",
                            method.name()
                        )))
                    }
                };
            handles.insert(method.name().to_string(), handle);
            built.push((method.entry, method_ref));
        }

        let mut program = LdarProgram::new(time, repair);
        if let Some(interval) = self.program.survey_interval {
            program = program.with_survey_interval(interval);
        }
        for (entry, method) in built.into_iter().rev() {
            program = if entry {
                program.with_entry_method(method)
            } else {
                program.with_method(method)
            };
        }
        program.validate()?;
        Ok(program)
    }

    /// Assemble the configured scenario, ready to run
    pub fn build_scenario(&self) -> SimResult<Simulation> {
        self.validate()?;
        let time = Time::new(self.simulation.delta_t, self.simulation.end_time)?;
        let gas_field = self.build_gas_field()?;
        let program = self.build_program(&time)?;
        let seed = self.simulation.seed;

        if self.simulation.initial_emissions {
            Simulation::with_initial_emissions(time, gas_field, program, seed)
        } else {
            Simulation::new(time, gas_field, Default::default(), program, seed)
        }
    }
}
