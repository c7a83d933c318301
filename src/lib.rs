pub mod application;
pub mod backtest;
pub mod config;
pub mod domain;
pub mod infrastructure;
