//! Error types for row loading, per-row prediction and engine control.

use thiserror::Error;

use crate::engine::state::{RunEvent, RunState};

/// Fetching the row set for a dataset failed. Fatal to starting a run.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("row fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("row fetch returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("row payload could not be decoded: {0}")]
    Decode(String),
}

/// A single-row prediction call failed. Recoverable.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("prediction request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prediction returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("prediction payload could not be decoded: {0}")]
    Decode(String),

    #[error("prediction label {0} is not 0 or 1")]
    InvalidLabel(i64),

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid run transition: {event:?} from {from:?}")]
pub struct TransitionError {
    pub from: RunState,
    pub event: RunEvent,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine has been disposed")]
    Disposed,

    #[error(transparent)]
    Transition(#[from] TransitionError),
}
