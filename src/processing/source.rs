use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::path::Path;

use crate::config::SourceConfig;
use crate::error::{MonitorError, MonitorResult};

pub trait SampleSource: Send {
    /// Raw value for `frame_index`. Must not touch the sample store.
    fn next_value(&mut self, frame_index: u64) -> MonitorResult<f64>;

    fn name(&self) -> String;
}

// -----------------------------------------------------------------------------
// SIMULATED SIGNAL
// -----------------------------------------------------------------------------

/// Constant base with uniform noise, plus a rising excursion at
/// `rise_frame` and a falling correction at `fall_frame` of every
/// `excursion_period` frames.
pub struct SyntheticSource {
    config: SourceConfig,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    fn excursion(&mut self, frame_index: u64) -> f64 {
        let phase = frame_index % self.config.excursion_period;
        if phase == self.config.rise_frame {
            let [low, high] = self.config.rise_range;
            self.rng.gen_range(low..=high)
        } else if phase == self.config.fall_frame {
            let [low, high] = self.config.fall_range;
            self.rng.gen_range(low..=high)
        } else {
            0.0
        }
    }
}

impl SampleSource for SyntheticSource {
    fn next_value(&mut self, frame_index: u64) -> MonitorResult<f64> {
        let amplitude = self.config.noise_amplitude;
        let noise = self.rng.gen_range(-amplitude..=amplitude);
        let excursion = self.excursion(frame_index);
        Ok(self.config.base_value + excursion + noise)
    }

    fn name(&self) -> String {
        "synthetic".to_string()
    }
}

// -----------------------------------------------------------------------------
// RECORDED SIGNAL
// -----------------------------------------------------------------------------

/// Plays back a fixed series of values, either once or looping.
pub struct ReplaySource {
    values: Vec<f64>,
    position: usize,
    looping: bool,
}

impl ReplaySource {
    pub fn new(values: Vec<f64>, looping: bool) -> Self {
        Self {
            values,
            position: 0,
            looping,
        }
    }

    /// Reads the first column of a headerless CSV file.
    pub fn from_csv<P: AsRef<Path>>(path: P, looping: bool) -> MonitorResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(File::open(path)?);
        let mut values = Vec::new();
        for result in rdr.records() {
            let record = result?;
            if let Some(field) = record.get(0) {
                let value: f64 = field.trim().parse().map_err(|e| {
                    MonitorError::Config(format!("invalid sample '{}': {}", field, e))
                })?;
                values.push(value);
            }
        }
        if values.is_empty() {
            return Err(MonitorError::Config("replay file holds no samples".to_string()));
        }
        Ok(Self::new(values, looping))
    }
}

impl SampleSource for ReplaySource {
    fn next_value(&mut self, _frame_index: u64) -> MonitorResult<f64> {
        if self.position >= self.values.len() {
            if !self.looping || self.values.is_empty() {
                return Err(MonitorError::ProductionStepFailure(
                    "replay source exhausted".to_string(),
                ));
            }
            self.position = 0;
        }
        let value = self.values[self.position];
        self.position += 1;
        Ok(value)
    }

    fn name(&self) -> String {
        format!("replay({} samples)", self.values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_stays_within_amplitude() {
        let mut source = SyntheticSource::new(SourceConfig::default(), Some(1));
        for frame in 1..=49 {
            let v = source.next_value(frame).unwrap();
            assert!((117.0..=123.0).contains(&v), "frame {} produced {}", frame, v);
        }
    }

    #[test]
    fn excursions_land_on_configured_frames() {
        let mut source = SyntheticSource::new(SourceConfig::default(), Some(2));
        for cycle in 0..5u64 {
            let rise = source.next_value(cycle * 100 + 50).unwrap();
            assert!((125.0..=138.0).contains(&rise), "rise {}", rise);
            let fall = source.next_value(cycle * 100 + 70).unwrap();
            assert!((109.0..=123.0).contains(&fall), "fall {}", fall);
        }
    }

    #[test]
    fn same_seed_same_series() {
        let mut a = SyntheticSource::new(SourceConfig::default(), Some(42));
        let mut b = SyntheticSource::new(SourceConfig::default(), Some(42));
        for frame in 1..=200 {
            assert_eq!(a.next_value(frame).unwrap(), b.next_value(frame).unwrap());
        }
    }

    #[test]
    fn replay_loops_or_reports_exhaustion() {
        let mut once = ReplaySource::new(vec![1.0, 2.0], false);
        assert_eq!(once.next_value(1).unwrap(), 1.0);
        assert_eq!(once.next_value(2).unwrap(), 2.0);
        assert!(matches!(
            once.next_value(3),
            Err(MonitorError::ProductionStepFailure(_))
        ));

        let mut looping = ReplaySource::new(vec![1.0, 2.0], true);
        let values: Vec<f64> = (1..=5).map(|f| looping.next_value(f).unwrap()).collect();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn replay_reads_csv_column() {
        let path = std::env::temp_dir()
            .join(format!("peak_monitor_replay_{}.csv", std::process::id()));
        std::fs::write(&path, "120.5\n121.0\n 119.25\n").unwrap();
        let mut source = ReplaySource::from_csv(&path, false).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(source.next_value(1).unwrap(), 120.5);
        assert_eq!(source.next_value(2).unwrap(), 121.0);
        assert_eq!(source.next_value(3).unwrap(), 119.25);
    }
}
