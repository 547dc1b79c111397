use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl ControlState {
    /// Whether the scheduler should produce a sample this tick.
    pub fn is_producing(self) -> bool {
        self == ControlState::Running
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlState::Idle => "idle",
            ControlState::Running => "running",
            ControlState::Paused => "paused",
            ControlState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Start,
    Stop,
    Pause,
    Resume,
    QueryPeakSignal,
    QueryStatus,
}

impl ControlCommand {
    /// Accepts both the short form and the `*_detection` command names.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start" | "start_detection" => Some(ControlCommand::Start),
            "stop" | "stop_detection" => Some(ControlCommand::Stop),
            "pause" | "pause_detection" => Some(ControlCommand::Pause),
            "resume" | "resume_detection" => Some(ControlCommand::Resume),
            "peak" | "peak_signal" => Some(ControlCommand::QueryPeakSignal),
            "status" => Some(ControlCommand::QueryStatus),
            _ => None,
        }
    }

    pub fn is_query(self) -> bool {
        matches!(
            self,
            ControlCommand::QueryPeakSignal | ControlCommand::QueryStatus
        )
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlCommand::Start => "start_detection",
            ControlCommand::Stop => "stop_detection",
            ControlCommand::Pause => "pause_detection",
            ControlCommand::Resume => "resume_detection",
            ControlCommand::QueryPeakSignal => "peak_signal",
            ControlCommand::QueryStatus => "status",
        };
        write!(f, "{}", name)
    }
}

/// Idle -> Running <-> Paused, and Running/Paused -> Stopped. Stopped is
/// left only through an explicit start.
#[derive(Debug, Clone)]
pub struct ControlMachine {
    state: ControlState,
}

impl Default for ControlMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlMachine {
    pub fn new() -> Self {
        Self {
            state: ControlState::Idle,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Computes the target state of a transition command without applying it.
    pub fn next_state(&self, command: ControlCommand) -> MonitorResult<ControlState> {
        use ControlState::*;
        let invalid = || MonitorError::InvalidTransition {
            command,
            state: self.state,
        };
        match (command, self.state) {
            (ControlCommand::Start, Idle | Stopped) => Ok(Running),
            (ControlCommand::Start, Running) => Err(MonitorError::AlreadyRunning),
            // Paused sessions come back through resume only
            (ControlCommand::Start, Paused) => Err(invalid()),

            (ControlCommand::Stop, Running | Paused) => Ok(Stopped),
            (ControlCommand::Stop, Idle | Stopped) => Err(MonitorError::NotRunning),

            (ControlCommand::Pause, Running) => Ok(Paused),
            (ControlCommand::Pause, _) => Err(invalid()),

            (ControlCommand::Resume, Paused) => Ok(Running),
            (ControlCommand::Resume, _) => Err(invalid()),

            (ControlCommand::QueryPeakSignal | ControlCommand::QueryStatus, _) => Err(invalid()),
        }
    }

    /// Applies a transition command, returning the previous state.
    pub fn apply(&mut self, command: ControlCommand) -> MonitorResult<ControlState> {
        let next = self.next_state(command)?;
        let previous = self.state;
        self.state = next;
        Ok(previous)
    }

    /// Forced transition used when the scheduler gives up after repeated failures.
    pub fn force_stop(&mut self) -> ControlState {
        let previous = self.state;
        self.state = ControlState::Stopped;
        previous
    }
}
