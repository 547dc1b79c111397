use thiserror::Error;

use crate::processing::control::{ControlCommand, ControlState};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Command '{command}' is not valid while {state}")]
    InvalidTransition {
        command: ControlCommand,
        state: ControlState,
    },

    #[error("Detection is already running")]
    AlreadyRunning,

    #[error("Detection is not running")]
    NotRunning,

    #[error("Requested {requested} samples, valid range is 1..={max}")]
    QueryOutOfRange { requested: usize, max: usize },

    #[error("Production step failed: {0}")]
    ProductionStepFailure(String),

    #[error("Tick rate {0} Hz is outside 10..=120")]
    InvalidTickRate(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
