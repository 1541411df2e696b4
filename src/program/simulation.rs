//! # Simulation Loop
//!
//! Drives one LDAR program over one gas field.
//!
//! Two independent seeded streams are used: one for the emission process
//! (`seed`) and one for detection draws (`seed + 1`). Running different
//! programs with the same seed therefore sees the same emission realisation.
//!
//! ## Step order
//!
//! 1. the gas field adds this step's new emissions
//! 2. the program runs its methods, then its repairs
//! 3. the total active flux is recorded
//! 4. the clock advances

use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::LdarProgram;
use crate::detection::{DetectionRecord, SimRng};
use crate::domain::{Emission, GasField, Time};
use crate::error::SimResult;

/// Aggregate figures for a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub n_timesteps: usize,
    pub n_em: usize,
    pub n_detected: usize,
    pub n_active_at_end: usize,
    pub total_find_cost: f64,
    pub total_repair_cost: f64,
    /// Mean over steps of the total active flux
    pub mean_emission_rate: f64,
}

/// Read-only outputs of a run
#[derive(Debug, Clone)]
pub struct SimulationResults {
    pub emissions: Emission,
    pub find_cost: Vec<f64>,
    pub repair_cost: Vec<f64>,
    /// Total active flux at each step, after repairs
    pub emission_rate: Vec<f64>,
    pub records: Vec<DetectionRecord>,
    pub summary: RunSummary,
}

#[derive(Debug)]
pub struct Simulation {
    time: Time,
    gas_field: GasField,
    emissions: Emission,
    program: LdarProgram,
    emission_rng: SimRng,
    detection_rng: SimRng,
    emission_rate: Vec<f64>,
}

impl Simulation {
    pub fn new(
        time: Time,
        gas_field: GasField,
        emissions: Emission,
        program: LdarProgram,
        seed: u64,
    ) -> SimResult<Self> {
        program.validate()?;
        Ok(Self {
            emission_rate: Vec::with_capacity(time.n_timesteps()),
            time,
            gas_field,
            emissions,
            program,
            emission_rng: SimRng::seed_from_u64(seed),
            detection_rng: SimRng::seed_from_u64(seed.wrapping_add(1)),
        })
    }

    /// Start from the field's own initial emissions, drawn from the emission stream
    pub fn with_initial_emissions(
        time: Time,
        gas_field: GasField,
        program: LdarProgram,
        seed: u64,
    ) -> SimResult<Self> {
        let mut sim = Self::new(time, gas_field, Emission::default(), program, seed)?;
        sim.emissions = sim.gas_field.initial_emissions(&mut sim.emission_rng)?;
        Ok(sim)
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn emissions(&self) -> &Emission {
        &self.emissions
    }

    pub fn gas_field(&self) -> &GasField {
        &self.gas_field
    }

    pub fn program(&self) -> &LdarProgram {
        &self.program
    }

    pub fn is_finished(&self) -> bool {
        self.time.is_finished()
    }

    pub fn step(&mut self) -> SimResult<()> {
        self.gas_field
            .emerge(&self.time, &mut self.emissions, &mut self.emission_rng)?;
        self.program.step(
            &self.time,
            &self.gas_field,
            &mut self.emissions,
            &mut self.detection_rng,
        )?;
        self.emission_rate
            .push(self.emissions.active_flux(self.time.current_time));
        self.time.advance();
        Ok(())
    }

    /// Run to the end time. Any error aborts the run.
    pub fn run(mut self) -> SimResult<SimulationResults> {
        info!(
            n_timesteps = self.time.n_timesteps(),
            delta_t = self.time.delta_t,
            n_sites = self.gas_field.n_sites(),
            n_methods = self.program.n_methods(),
            initial_emissions = self.emissions.n_em(),
            "Simulation started"
        );

        while !self.time.is_finished() {
            self.step()?;
        }

        let summary = RunSummary {
            n_timesteps: self.emission_rate.len(),
            n_em: self.emissions.n_em(),
            n_detected: self.emissions.detection().iter().filter(|&&d| d).count(),
            n_active_at_end: self.emissions.active_indices(self.time.current_time).count(),
            total_find_cost: self.program.find_cost().iter().sum(),
            total_repair_cost: self.program.repair_cost().iter().sum(),
            mean_emission_rate: if self.emission_rate.is_empty() {
                0.0
            } else {
                self.emission_rate.iter().sum::<f64>() / self.emission_rate.len() as f64
            },
        };
        info!(
            n_em = summary.n_em,
            n_detected = summary.n_detected,
            total_find_cost = summary.total_find_cost,
            total_repair_cost = summary.total_repair_cost,
            "Simulation finished"
        );

        Ok(SimulationResults {
            records: self.program.records(),
            find_cost: self.program.find_cost().to_vec(),
            repair_cost: self.program.repair_cost().to_vec(),
            emission_rate: self.emission_rate,
            emissions: self.emissions,
            summary,
        })
    }
}
