pub mod broker;
pub mod data;
pub mod engine;
pub mod provider;
pub mod statistics;
