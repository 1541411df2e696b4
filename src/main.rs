use anyhow::Result;
use ldar_sim::{config, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;
    cfg.validate()?;

    if cfg.methods.is_empty() {
        warn!("No detection methods configured; running the null program");
    }

    let simulation = cfg.build_scenario()?;
    info!(
        n_sites = simulation.gas_field().n_sites(),
        n_methods = simulation.program().n_methods(),
        seed = cfg.simulation.seed,
        "starting LDAR simulation"
    );

    let results = simulation.run()?;
    if results.summary.n_timesteps == 0 {
        anyhow::bail!("simulation ran zero time steps; check simulation.end_time");
    }

    println!("{}", serde_json::to_string_pretty(&results.summary)?);
    Ok(())
}
