use serde::Serialize;

use crate::error::TransitionError;

/// Lifecycle phase of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Loading,
    Running,
    /// Halted by the user before the rows ran out.
    Stopped,
    Completed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::Loading => "loading",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Completed => "completed",
        }
    }

    /// The timer only runs in `Running`.
    pub fn is_ticking(&self) -> bool {
        matches!(self, RunState::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    Start,
    Loaded,
    LoadFailed,
    /// A tick found no row left to process.
    Exhausted,
    Stop,
    Restart,
}

impl RunEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEvent::Start => "start",
            RunEvent::Loaded => "loaded",
            RunEvent::LoadFailed => "load_failed",
            RunEvent::Exhausted => "exhausted",
            RunEvent::Stop => "stop",
            RunEvent::Restart => "restart",
        }
    }
}

/// Next state for `event` in `from`.
///
/// A start or restart while loading abandons the pending load and loads
/// again. Stopping an idle engine is a no-op.
pub fn transition(from: RunState, event: RunEvent) -> Result<RunState, TransitionError> {
    use RunEvent as E;
    use RunState as S;

    match (from, event) {
        (S::NotStarted | S::Loading | S::Stopped | S::Completed, E::Start) => Ok(S::Loading),
        (_, E::Restart) => Ok(S::Loading),
        (S::Loading, E::Loaded) => Ok(S::Running),
        (S::Loading, E::LoadFailed) => Ok(S::NotStarted),
        (S::Running, E::Exhausted) => Ok(S::Completed),
        (S::Running, E::Stop) => Ok(S::Stopped),
        (S::Loading, E::Stop) => Ok(S::NotStarted),
        (S::NotStarted | S::Stopped | S::Completed, E::Stop) => Ok(from),
        _ => Err(TransitionError { from, event }),
    }
}
