// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{MonitorError, MonitorResult};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const MIN_TICK_RATE_HZ: u32 = 10;
pub const MAX_TICK_RATE_HZ: u32 = 120;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub processor: ProcessorConfig,
    pub buffer: BufferConfig,
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProcessorConfig {
    pub tick_rate_hz: u32,
    pub max_consecutive_failures: u32,
    pub auto_start: bool,
    pub seed: Option<u64>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            max_consecutive_failures: 3,
            auto_start: false,
            seed: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub peak_log_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            peak_log_capacity: 32,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub base_value: f64,
    pub noise_amplitude: f64,
    pub excursion_period: u64,
    pub rise_frame: u64,
    pub rise_range: [f64; 2],
    pub fall_frame: u64,
    pub fall_range: [f64; 2],
    pub presentation_range: [f64; 2],
    /// Headerless single-column CSV to play back instead of the synthetic signal.
    pub replay_file: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_value: 120.0,
            noise_amplitude: 3.0,
            excursion_period: 100,
            rise_frame: 50,
            rise_range: [8.0, 15.0],
            fall_frame: 70,
            fall_range: [-8.0, 0.0],
            presentation_range: [0.0, 255.0],
            replay_file: None,
        }
    }
}

impl SourceConfig {
    /// Clamps a raw value into the physical range presentation consumers expect.
    /// Stored samples are never clamped.
    pub fn clamp_for_presentation(&self, value: f64) -> f64 {
        value.clamp(self.presentation_range[0], self.presentation_range[1])
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorConfig {
    pub baseline_window_size: usize,
    pub peak_threshold: f64,
    pub classification_threshold: f64,
    pub before_offset: usize,
    pub before_len: usize,
    pub after_offset: usize,
    pub after_len: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            baseline_window_size: 60,
            peak_threshold: 5.0,
            classification_threshold: 2.1,
            before_offset: 10,
            before_len: 5,
            after_offset: 4,
            after_len: 4,
        }
    }
}

impl DetectorConfig {
    /// Number of preceding samples the trend windows reach back to.
    pub fn trend_history_required(&self) -> usize {
        self.before_offset.max(self.after_offset)
    }

    /// Checks that the trend windows fit their offsets and the thresholds are usable.
    pub fn validate_windows(&self) -> MonitorResult<()> {
        if self.baseline_window_size == 0 {
            return Err(MonitorError::Config(
                "baseline_window_size must be > 0".to_string(),
            ));
        }
        if self.before_len == 0 || self.before_len > self.before_offset {
            return Err(MonitorError::Config(format!(
                "before window of {} samples does not fit offset {}",
                self.before_len, self.before_offset
            )));
        }
        if self.after_len == 0 || self.after_len > self.after_offset {
            return Err(MonitorError::Config(format!(
                "after window of {} samples does not fit offset {}",
                self.after_len, self.after_offset
            )));
        }
        if !self.peak_threshold.is_finite() || !self.classification_threshold.is_finite() {
            return Err(MonitorError::Config(
                "detector thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// `validate_windows` plus the checks against a buffer of `capacity` samples.
    pub fn validate_for_capacity(&self, capacity: usize) -> MonitorResult<()> {
        self.validate_windows()?;
        if self.baseline_window_size > capacity {
            return Err(MonitorError::Config(format!(
                "baseline_window_size must be in 1..={}, got {}",
                capacity, self.baseline_window_size
            )));
        }
        if self.trend_history_required() > capacity {
            return Err(MonitorError::Config(format!(
                "trend offsets reach back {} samples but the buffer holds {}",
                self.trend_history_required(),
                capacity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 30415,
            max_clients: 10,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub peak_journal: bool,
    pub enable_debug_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            peak_journal: false,
            enable_debug_logging: false,
        }
    }
}

pub fn validate_tick_rate(hz: u32) -> MonitorResult<()> {
    if (MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&hz) {
        Ok(())
    } else {
        Err(MonitorError::InvalidTickRate(hz))
    }
}

fn check_range(name: &str, range: [f64; 2]) -> MonitorResult<()> {
    if !range[0].is_finite() || !range[1].is_finite() || range[0] > range[1] {
        return Err(MonitorError::Config(format!(
            "{} must be a finite [low, high] pair, got {:?}",
            name, range
        )));
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> MonitorResult<()> {
        validate_tick_rate(self.processor.tick_rate_hz)
            .map_err(|e| MonitorError::Config(e.to_string()))?;
        if self.processor.max_consecutive_failures == 0 {
            return Err(MonitorError::Config(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        let capacity = self.buffer.capacity;
        if capacity == 0 {
            return Err(MonitorError::Config("buffer capacity must be > 0".to_string()));
        }

        self.detector.validate_for_capacity(capacity)?;

        let source = &self.source;
        if source.excursion_period == 0 {
            return Err(MonitorError::Config("excursion_period must be > 0".to_string()));
        }
        if !source.base_value.is_finite()
            || !source.noise_amplitude.is_finite()
            || source.noise_amplitude < 0.0
        {
            return Err(MonitorError::Config(
                "base_value must be finite and noise_amplitude non-negative".to_string(),
            ));
        }
        check_range("rise_range", source.rise_range)?;
        check_range("fall_range", source.fall_range)?;
        check_range("presentation_range", source.presentation_range)?;

        if self.server.max_clients == 0 {
            return Err(MonitorError::Config("max_clients must be > 0".to_string()));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> MonitorResult<Config> {
    let config_str = fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

/// Loads `path` when given, otherwise `config.yaml` in the working
/// directory if present, otherwise the defaults.
pub fn load_or_default(path: Option<&str>) -> MonitorResult<Config> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => Ok(Config::default()),
    }
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> MonitorResult<()> {
    let yaml = serde_yaml::to_string(config)?;
    fs::write(path, yaml)?;
    Ok(())
}
