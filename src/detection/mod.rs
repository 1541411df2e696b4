pub mod base;
pub mod comp_survey;
pub mod envelope;
pub mod probability;
pub mod repair;
pub mod site_survey;
pub mod types;

pub use base::{capacity_per_timestep, interval_due, survey_day_due, DetectionBase};
pub use comp_survey::*;
pub use envelope::*;
pub use probability::*;
pub use repair::*;
pub use site_survey::*;
pub use types::*;
