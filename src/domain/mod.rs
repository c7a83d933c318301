pub mod errors;
pub mod ports;
pub mod position;
pub mod risk;
pub mod symbol;
pub mod types;
