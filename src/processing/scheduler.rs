use log::{debug, error, info, trace, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::control::ControlState;
use super::detectors::PeakEvent;
use super::pipeline::{lock_shared, SharedState};
use super::source::SampleSource;
use super::store::Sample;
use crate::error::{MonitorError, MonitorResult};
use crate::utils::log::SessionJournal;

pub fn period_for(rate_hz: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(rate_hz.max(1)))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// CLOCK COMPONENT -------------------------------------------------------------

/// Deadlines are `start + tick_index * period`, so sleep jitter never
/// accumulates. Falling more than one period behind re-anchors the clock
/// instead of bursting through the missed ticks.
#[derive(Debug, Clone)]
pub struct TickClock {
    start: Instant,
    period: Duration,
    tick_index: u64,
}

impl TickClock {
    pub fn new(period: Duration, now: Instant) -> Self {
        Self {
            start: now,
            period,
            tick_index: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn set_period(&mut self, period: Duration, now: Instant) {
        if period != self.period {
            self.period = period;
            self.start = now;
            self.tick_index = 0;
        }
    }

    /// Advances one tick and returns when it is due.
    pub fn next_deadline(&mut self, now: Instant) -> Instant {
        self.tick_index += 1;
        let offset = self.period.as_nanos() as u64 * self.tick_index;
        let deadline = self.start + Duration::from_nanos(offset);
        if now > deadline + self.period {
            warn!(
                "Scheduler fell {:?} behind at tick {}, re-anchoring",
                now - deadline,
                self.tick_index
            );
            self.start = now;
            self.tick_index = 0;
            return now;
        }
        deadline
    }
}

// SCHEDULER COMPONENT ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Produced {
        sample: Sample,
        peak: Option<PeakEvent>,
    },
    Skipped(ControlState),
    Failed {
        error: String,
        consecutive: u32,
    },
    /// Failure limit reached; the control state was forced to `Stopped`.
    Escalated {
        error: String,
    },
}

pub struct Scheduler {
    shared: Arc<Mutex<SharedState>>,
    source: Box<dyn SampleSource>,
    epoch: Instant,
    max_failures: u32,
    verbose: bool,
    journal: Option<SessionJournal>,
    history: Vec<f64>,
}

impl Scheduler {
    pub(crate) fn new(
        shared: Arc<Mutex<SharedState>>,
        source: Box<dyn SampleSource>,
        epoch: Instant,
        max_failures: u32,
        verbose: bool,
        journal: Option<SessionJournal>,
    ) -> Self {
        Self {
            shared,
            source,
            epoch,
            max_failures,
            verbose,
            journal,
            history: Vec::new(),
        }
    }

    /// One production step. The state check, value generation,
    /// classification and append happen under a single lock acquisition,
    /// so a concurrent stop lands either before or after a whole sample.
    pub fn tick(&mut self) -> TickOutcome {
        let shared = Arc::clone(&self.shared);
        let outcome = {
            let mut guard = lock_shared(&shared);
            let state = guard.control.state();
            if !state.is_producing() {
                return TickOutcome::Skipped(state);
            }

            match self.produce(&mut guard) {
                Ok((sample, peak)) => {
                    guard.consecutive_failures = 0;
                    TickOutcome::Produced { sample, peak }
                }
                Err(e) => {
                    guard.consecutive_failures += 1;
                    let error = e.to_string();
                    if guard.consecutive_failures >= self.max_failures {
                        guard.control.force_stop();
                        guard.fatal = Some(error.clone());
                        TickOutcome::Escalated { error }
                    } else {
                        TickOutcome::Failed {
                            error,
                            consecutive: guard.consecutive_failures,
                        }
                    }
                }
            }
        };

        self.report(&outcome);
        outcome
    }

    fn produce(&mut self, shared: &mut SharedState) -> MonitorResult<(Sample, Option<PeakEvent>)> {
        let frame_index = shared.store.next_frame_index();
        let source = &mut self.source;
        let value = panic::catch_unwind(AssertUnwindSafe(|| source.next_value(frame_index)))
            .map_err(|payload| {
                MonitorError::ProductionStepFailure(format!(
                    "source '{}' panicked: {}",
                    source.name(),
                    panic_message(payload.as_ref())
                ))
            })?
            .map_err(|e| match e {
                MonitorError::ProductionStepFailure(msg) => {
                    MonitorError::ProductionStepFailure(msg)
                }
                other => MonitorError::ProductionStepFailure(other.to_string()),
            })?;
        if !value.is_finite() {
            return Err(MonitorError::ProductionStepFailure(format!(
                "non-finite value {} at frame {}",
                value, frame_index
            )));
        }

        shared
            .store
            .recent_values_into(shared.detector.history_len(), &mut self.history);
        let peak = shared
            .detector
            .process_sample(&self.history, value, frame_index);
        let timestamp = self.epoch.elapsed().as_secs_f64();
        let sample = shared.store.append(timestamp, value, peak);
        Ok((sample, peak))
    }

    // Logging and journal I/O run after the lock is released
    fn report(&mut self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Produced { sample, peak } => {
                if self.verbose {
                    debug!(
                        "frame: {}, value: {:.3}, peak: {:?}",
                        sample.frame_index, sample.value, sample.peak
                    );
                } else {
                    trace!("frame: {}, value: {:.3}", sample.frame_index, sample.value);
                }
                if let Some(event) = peak {
                    info!(
                        "{} peak at frame {} - excursion: {:.3}, delta: {:.3}",
                        event.classification,
                        event.frame_index,
                        event.excursion,
                        event.confidence_delta
                    );
                    if let Some(journal) = self.journal.as_mut() {
                        if let Err(e) = journal.record_peak(sample, event) {
                            warn!("Failed to write peak journal: {}", e);
                        }
                    }
                }
            }
            TickOutcome::Skipped(_) => {}
            TickOutcome::Failed { error, consecutive } => {
                warn!(
                    "Production step failed ({}/{}): {}",
                    consecutive, self.max_failures, error
                );
            }
            TickOutcome::Escalated { error } => {
                error!(
                    "Production stopped after {} consecutive failures: {}",
                    self.max_failures, error
                );
                if let Some(journal) = self.journal.as_ref() {
                    if let Err(e) = journal.record_fatal(error) {
                        warn!("Failed to write session log: {}", e);
                    }
                }
            }
        }
    }

    fn current_period(&self) -> Duration {
        period_for(lock_shared(&self.shared).tick_rate_hz)
    }

    /// Tick loop for the dedicated producer thread.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!(
            "Scheduler started with source '{}' at {:?} per tick",
            self.source.name(),
            self.current_period()
        );
        let mut clock = TickClock::new(self.current_period(), Instant::now());

        while !shutdown.load(Ordering::Acquire) {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                let message = format!("scheduler panicked: {}", panic_message(payload.as_ref()));
                error!("Production stopped: {}", message);
                let mut shared = lock_shared(&self.shared);
                shared.control.force_stop();
                shared.fatal = Some(message);
                break;
            }

            clock.set_period(self.current_period(), Instant::now());
            let deadline = clock.next_deadline(Instant::now());
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
        }
        info!("Scheduler loop exited after {} ticks", clock.tick_index());
    }
}

// HANDLE COMPONENT ------------------------------------------------------------

/// Owns the producer thread. Dropping it stops and joins the thread.
pub struct SchedulerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub(crate) fn new(shutdown: Arc<AtomicBool>, handle: JoinHandle<()>) -> Self {
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
