pub mod config;
pub mod detection;
pub mod domain;
pub mod error;
pub mod program;
pub mod telemetry;

pub use error::{SimError, SimResult};
