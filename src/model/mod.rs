pub mod config;
mod domain;

pub use config::{
    load_suppliers, AlertPolicy, AllowlistConfig, Config, ConfigError, FetchSettings, Thresholds,
    Weights,
};
pub use domain::*;
