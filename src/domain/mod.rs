pub mod component;
pub mod emission;
pub mod gas_field;
pub mod met;
pub mod site;
pub mod time;

pub use component::*;
pub use emission::*;
pub use gas_field::*;
pub use met::*;
pub use site::*;
pub use time::*;
