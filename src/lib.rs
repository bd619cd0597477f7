pub mod advisor;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod inputs;
pub mod market_data;
pub mod models;
pub mod optimizer;
pub mod optimizer_status;
pub mod param_utils;
pub mod performance;
pub mod request;
pub mod signals;
pub mod store;
pub mod strategy;

pub use config::BacktestConfig;
pub use engine::{run, Engine};
pub use error::{EngineError, EngineResult};
pub use inputs::extract;
pub use models::{BacktestResult, Bar, Parameter, SignalSet};
pub use signals::detect;
