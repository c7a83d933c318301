pub mod orchestrator;
pub mod risk_manager;
pub mod session;
pub mod signal_engine;
pub mod trade_manager;
