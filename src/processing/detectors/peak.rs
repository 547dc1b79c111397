use super::{baseline, mean, PeakClassification, PeakEvent};
use crate::config::DetectorConfig;
use crate::error::MonitorResult;

/// Classifies `new_value` against `history`, the samples stored before it
/// (oldest first). Returns `None` when there is too little history, when
/// the excursion stays within `peak_threshold`, or when the trend windows
/// cannot be filled.
///
/// The baseline is the mean of the `baseline_window_size` samples directly
/// preceding the new one, so it reflects the pre-excursion level.
pub fn detect_peak(
    history: &[f64],
    new_value: f64,
    frame_index: u64,
    config: &DetectorConfig,
) -> Option<PeakEvent> {
    let baseline = baseline(history, config.baseline_window_size)?;
    let excursion = new_value - baseline;
    if !(excursion > config.peak_threshold) {
        return None;
    }

    // Small baseline windows may not cover the trend offsets, and an
    // unvalidated config may ask for windows longer than their offsets
    let n = history.len();
    let before_start = n.checked_sub(config.before_offset)?;
    let after_start = n.checked_sub(config.after_offset)?;
    let before_avg = mean(history.get(before_start..before_start + config.before_len)?)?;
    let after_avg = mean(history.get(after_start..after_start + config.after_len)?)?;
    let frame_diff = after_avg - before_avg;

    let classification = if frame_diff > config.classification_threshold {
        PeakClassification::Strong
    } else {
        PeakClassification::Weak
    };

    Some(PeakEvent {
        frame_index,
        classification,
        confidence_delta: frame_diff,
        excursion,
    })
}

/// Detector bound to one configuration. Holds no history: every call reads
/// the slice it is given.
#[derive(Debug, Clone)]
pub struct PeakDetector {
    config: DetectorConfig,
}

impl PeakDetector {
    pub fn new(config: DetectorConfig) -> MonitorResult<Self> {
        config.validate_windows()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// How many trailing samples a call needs to see.
    pub fn history_len(&self) -> usize {
        self.config
            .baseline_window_size
            .max(self.config.trend_history_required())
    }

    pub fn process_sample(
        &self,
        history: &[f64],
        value: f64,
        frame_index: u64,
    ) -> Option<PeakEvent> {
        detect_peak(history, value, frame_index, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 60 samples whose offsets -10..-6 sit at `before` and -4..-1 at
    /// `before + diff`; everything else is `level`.
    fn shaped_history(level: f64, before: f64, diff: f64) -> Vec<f64> {
        let mut history = vec![level; 60];
        let n = history.len();
        for v in &mut history[n - 10..n - 5] {
            *v = before;
        }
        for v in &mut history[n - 4..] {
            *v = before + diff;
        }
        history
    }

    #[test]
    fn strong_when_trend_exceeds_threshold() {
        let config = DetectorConfig::default();
        let history = shaped_history(120.0, 120.0, 2.5);
        let b = baseline(&history, 60).unwrap();
        let event = detect_peak(&history, b + 10.0, 61, &config).unwrap();
        assert_eq!(event.classification, PeakClassification::Strong);
        assert!((event.confidence_delta - 2.5).abs() < 1e-9);
        assert!((event.excursion - 10.0).abs() < 1e-9);
        assert_eq!(event.frame_index, 61);
    }

    #[test]
    fn weak_when_trend_is_flat() {
        let config = DetectorConfig::default();
        let history = shaped_history(120.0, 120.0, 1.0);
        let b = baseline(&history, 60).unwrap();
        let event = detect_peak(&history, b + 10.0, 61, &config).unwrap();
        assert_eq!(event.classification, PeakClassification::Weak);
    }

    #[test]
    fn none_below_peak_threshold() {
        let config = DetectorConfig::default();
        let history = vec![120.0; 60];
        assert_eq!(detect_peak(&history, 124.9, 61, &config), None);
        assert_eq!(detect_peak(&history, 125.0, 61, &config), None);
        assert!(detect_peak(&history, 125.1, 61, &config).is_some());
    }

    #[test]
    fn none_with_insufficient_history() {
        let config = DetectorConfig::default();
        let history = vec![120.0; 59];
        assert_eq!(detect_peak(&history, 200.0, 60, &config), None);
    }

    #[test]
    fn baseline_excludes_new_sample() {
        let config = DetectorConfig::default();
        let mut history = vec![100.0; 60];
        history[0] = 1000.0;
        // Only the last 60 entries count, so a leading outlier beyond the window is ignored
        history.insert(0, -5000.0);
        let event = detect_peak(&history, 130.0, 62, &config).unwrap();
        let expected_baseline = (1000.0 + 59.0 * 100.0) / 60.0;
        assert!((event.excursion - (130.0 - expected_baseline)).abs() < 1e-9);
    }

    #[test]
    fn small_window_guards_trend_offsets() {
        let config = DetectorConfig {
            baseline_window_size: 5,
            ..DetectorConfig::default()
        };
        let history = vec![0.0; 8];
        assert_eq!(detect_peak(&history, 50.0, 9, &config), None);

        let detector = PeakDetector::new(config).unwrap();
        assert_eq!(detector.history_len(), 10);
        assert!(detector.process_sample(&[0.0; 10], 50.0, 11).is_some());
    }

    #[test]
    fn windows_longer_than_offsets_yield_none() {
        let config = DetectorConfig {
            before_offset: 3,
            before_len: 5,
            ..DetectorConfig::default()
        };
        let history = vec![120.0; 60];
        assert_eq!(detect_peak(&history, 200.0, 61, &config), None);
        assert!(PeakDetector::new(config).is_err());
    }
}
