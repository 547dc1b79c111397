pub mod peak;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use peak::{detect_peak, PeakDetector};

// DETECTOR COMPONENT ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakClassification {
    Weak,
    Strong,
}

impl PeakClassification {
    /// Numeric label used by polling clients: 1 strong, 0 weak.
    pub fn label(self) -> u8 {
        match self {
            PeakClassification::Weak => 0,
            PeakClassification::Strong => 1,
        }
    }
}

impl fmt::Display for PeakClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeakClassification::Weak => write!(f, "weak"),
            PeakClassification::Strong => write!(f, "strong"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    pub frame_index: u64,
    pub classification: PeakClassification,
    /// `after_avg - before_avg` of the short-horizon trend check.
    pub confidence_delta: f64,
    /// `new_value - baseline`.
    pub excursion: f64,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Mean of the newest `window` values, or `None` while fewer exist.
pub fn baseline(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}
