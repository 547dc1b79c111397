use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use super::control::{ControlCommand, ControlMachine, ControlState};
use super::detectors::{PeakClassification, PeakDetector, PeakEvent};
use super::scheduler::{Scheduler, SchedulerHandle};
use super::source::SampleSource;
use super::store::{Sample, SampleStore};
use crate::config::{validate_tick_rate, Config, DetectorConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::utils::log::SessionJournal;

// -----------------------------------------------------------------------------
// SHARED STATE
// -----------------------------------------------------------------------------

/// Everything the producer and the readers share, behind one lock.
pub(crate) struct SharedState {
    pub store: SampleStore,
    pub control: ControlMachine,
    pub detector: PeakDetector,
    pub tick_rate_hz: u32,
    pub consecutive_failures: u32,
    pub fatal: Option<String>,
}

pub(crate) fn lock_shared(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    // Every critical section leaves the state whole, so a poisoned lock is still usable
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// -----------------------------------------------------------------------------
// QUERY RESULTS
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub samples: Vec<Sample>,
    pub baseline: Option<f64>,
    pub last_peak: Option<PeakClassification>,
    pub total_frame_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: ControlState,
    pub total_frame_count: u64,
    pub current_value: Option<f64>,
    pub peak_signal: Option<PeakClassification>,
    pub last_peak: Option<PeakClassification>,
    pub buffer_size: usize,
    pub buffer_capacity: usize,
    pub baseline: Option<f64>,
    pub tick_rate_hz: u32,
    pub fatal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakSignalReport {
    pub signal: Option<PeakClassification>,
    pub has_peak: bool,
    pub current_value: Option<f64>,
    pub frame_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlAck {
    Transition {
        command: ControlCommand,
        from: ControlState,
        to: ControlState,
    },
    PeakSignal(PeakSignalReport),
    Status(Status),
}

// -----------------------------------------------------------------------------
// PIPELINE CONTEXT
// -----------------------------------------------------------------------------

/// Explicitly constructed owner of the store, control state and
/// configuration. Clones share the same state.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    shared: Arc<Mutex<SharedState>>,
    epoch: Instant,
}

impl Pipeline {
    pub fn new(config: Config) -> MonitorResult<Self> {
        config.validate()?;
        let store = SampleStore::new(
            config.buffer.capacity,
            config.buffer.peak_log_capacity,
            config.detector.baseline_window_size,
        );
        let shared = SharedState {
            store,
            control: ControlMachine::new(),
            detector: PeakDetector::new(config.detector.clone())?,
            tick_rate_hz: config.processor.tick_rate_hz,
            consecutive_failures: 0,
            fatal: None,
        };
        Ok(Self {
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(shared)),
            epoch: Instant::now(),
        })
    }

    /// Configuration the pipeline was built with. Runtime changes to the
    /// tick rate and detector are read through their own accessors.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the producer for this pipeline without starting a thread.
    /// Tests drive it with [`Scheduler::tick`].
    pub fn scheduler(&self, source: Box<dyn SampleSource>) -> Scheduler {
        let journal = if self.config.logging.peak_journal {
            match SessionJournal::create(&self.config.logging.log_dir) {
                Ok(journal) => Some(journal),
                Err(e) => {
                    warn!("Peak journal disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Scheduler::new(
            Arc::clone(&self.shared),
            source,
            self.epoch,
            self.config.processor.max_consecutive_failures,
            self.config.logging.enable_debug_logging,
            journal,
        )
    }

    /// Starts the dedicated producer thread. It ticks until the handle is
    /// shut down; the control state only decides whether a tick produces.
    pub fn spawn_scheduler(&self, source: Box<dyn SampleSource>) -> MonitorResult<SchedulerHandle> {
        let scheduler = self.scheduler(source);
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("peak-monitor-scheduler".to_string())
            .spawn(move || scheduler.run(flag))?;
        Ok(SchedulerHandle::new(shutdown, handle))
    }

    // CONTROL -----------------------------------------------------------------

    pub fn control(&self, command: ControlCommand) -> MonitorResult<ControlAck> {
        match command {
            ControlCommand::QueryPeakSignal => Ok(ControlAck::PeakSignal(self.peak_signal())),
            ControlCommand::QueryStatus => Ok(ControlAck::Status(self.status())),
            _ => self.transition(command),
        }
    }

    fn transition(&self, command: ControlCommand) -> MonitorResult<ControlAck> {
        let (from, to) = {
            let mut shared = lock_shared(&self.shared);
            let from = shared.control.apply(command)?;
            if command == ControlCommand::Start {
                shared.consecutive_failures = 0;
                shared.fatal = None;
            }
            (from, shared.control.state())
        };
        info!("Control {} executed: {} -> {}", command, from, to);
        Ok(ControlAck::Transition { command, from, to })
    }

    pub fn start(&self) -> MonitorResult<ControlAck> {
        self.control(ControlCommand::Start)
    }

    pub fn stop(&self) -> MonitorResult<ControlAck> {
        self.control(ControlCommand::Stop)
    }

    pub fn pause(&self) -> MonitorResult<ControlAck> {
        self.control(ControlCommand::Pause)
    }

    pub fn resume(&self) -> MonitorResult<ControlAck> {
        self.control(ControlCommand::Resume)
    }

    pub fn state(&self) -> ControlState {
        lock_shared(&self.shared).control.state()
    }

    // QUERIES -----------------------------------------------------------------

    /// The newest `count` samples (fewer if the buffer holds fewer).
    pub fn query(&self, count: usize) -> MonitorResult<Snapshot> {
        let max = self.config.buffer.capacity;
        if count == 0 || count > max {
            return Err(MonitorError::QueryOutOfRange {
                requested: count,
                max,
            });
        }
        let shared = lock_shared(&self.shared);
        Ok(Snapshot {
            samples: shared.store.snapshot(count),
            baseline: shared.store.current_baseline(),
            last_peak: shared.store.last_peak_signal(),
            total_frame_count: shared.store.total_frame_count(),
        })
    }

    pub fn status(&self) -> Status {
        let shared = lock_shared(&self.shared);
        Status {
            state: shared.control.state(),
            total_frame_count: shared.store.total_frame_count(),
            current_value: shared.store.latest().map(|s| s.value),
            peak_signal: shared.store.peak_signal(),
            last_peak: shared.store.last_peak_signal(),
            buffer_size: shared.store.len(),
            buffer_capacity: shared.store.capacity(),
            baseline: shared.store.current_baseline(),
            tick_rate_hz: shared.tick_rate_hz,
            fatal: shared.fatal.clone(),
        }
    }

    pub fn peak_signal(&self) -> PeakSignalReport {
        let shared = lock_shared(&self.shared);
        let signal = shared.store.peak_signal();
        PeakSignalReport {
            signal,
            has_peak: signal.is_some(),
            current_value: shared.store.latest().map(|s| s.value),
            frame_count: shared.store.total_frame_count(),
        }
    }

    pub fn peak_events(&self) -> Vec<PeakEvent> {
        lock_shared(&self.shared).store.peak_events()
    }

    // MAINTENANCE -------------------------------------------------------------

    /// Drops all samples and counters. The control state is left as is.
    pub fn reset(&self) {
        lock_shared(&self.shared).store.reset();
        warn!("Sample store has been reset");
    }

    pub fn tick_rate(&self) -> u32 {
        lock_shared(&self.shared).tick_rate_hz
    }

    /// Changes the production rate; the scheduler re-anchors on its next tick.
    pub fn set_tick_rate(&self, hz: u32) -> MonitorResult<()> {
        validate_tick_rate(hz)?;
        lock_shared(&self.shared).tick_rate_hz = hz;
        info!("Tick rate set to {} Hz", hz);
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        lock_shared(&self.shared).detector.config().clone()
    }

    /// Swaps the detector settings. The next tick classifies with them and
    /// the reported baseline follows the new window immediately.
    pub fn set_detector_config(&self, detector: DetectorConfig) -> MonitorResult<()> {
        detector.validate_for_capacity(self.config.buffer.capacity)?;
        let window = detector.baseline_window_size;
        let detector = PeakDetector::new(detector)?;
        {
            let mut shared = lock_shared(&self.shared);
            shared.detector = detector;
            shared.store.set_baseline_window(window);
        }
        info!("Detector settings updated: {:?}", self.detector_config());
        Ok(())
    }
}
