pub mod config;
pub mod error;
pub mod local;
pub mod processing;
pub mod utils;

#[cfg(feature = "python")]
pub mod bindings;

pub use config::{load_config, save_config, Config};
pub use error::{MonitorError, MonitorResult};
pub use processing::control::{ControlCommand, ControlState};
pub use processing::detectors::{PeakClassification, PeakEvent};
pub use processing::pipeline::{ControlAck, PeakSignalReport, Pipeline, Snapshot, Status};
pub use processing::store::Sample;
