pub mod ldar;
pub mod simulation;

pub use ldar::*;
pub use simulation::*;
