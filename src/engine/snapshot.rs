use serde::Serialize;

use crate::aggregate::AggregationSnapshot;
use crate::model::EnrichedRow;
use crate::window::ChartPoint;

use super::playback::Playback;
use super::state::RunState;

/// Immutable view of the engine, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    /// Increments on every start/restart.
    pub generation: u64,
    pub state: RunState,
    pub stats: AggregationSnapshot,
    pub chart: Vec<ChartPoint>,
    /// Newest first.
    pub recent: Vec<EnrichedRow>,
    pub cursor: usize,
    pub total_rows: usize,
    pub skipped_count: usize,
}

impl EngineSnapshot {
    pub fn initial() -> Self {
        Self {
            generation: 0,
            state: RunState::NotStarted,
            stats: AggregationSnapshot::default(),
            chart: Vec::new(),
            recent: Vec::new(),
            cursor: 0,
            total_rows: 0,
            skipped_count: 0,
        }
    }

    pub fn capture(generation: u64, state: RunState, playback: &Playback) -> Self {
        let windows = playback.windows();
        Self {
            generation,
            state,
            stats: playback.stats(),
            chart: windows.chart().to_vec(),
            recent: windows.recent().to_vec(),
            cursor: playback.cursor(),
            total_rows: playback.total(),
            skipped_count: playback.skipped(),
        }
    }

    /// Fraction of rows the cursor has moved past.
    pub fn progress(&self) -> f64 {
        if self.total_rows == 0 {
            return if self.state == RunState::Completed { 1.0 } else { 0.0 };
        }
        self.cursor as f64 / self.total_rows as f64
    }
}

/// Transient notifications for the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    LoadFailed {
        generation: u64,
        error: String,
    },
    PredictionFailed {
        generation: u64,
        sample_id: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    RowSkipped {
        generation: u64,
        sample_id: String,
    },
    Completed {
        generation: u64,
        stats: AggregationSnapshot,
    },
}
