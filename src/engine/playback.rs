use chrono::{DateTime, Utc};

use crate::aggregate::{Aggregation, AggregationSnapshot};
use crate::config::EngineConfig;
use crate::model::{Prediction, ProcessedRow, Row};
use crate::window::WindowStore;

/// What a failed prediction did to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Cursor held; the row is resubmitted on the next tick.
    Retry { attempt: u32 },
    /// Attempts exhausted; cursor advanced past the row.
    Skipped { attempt: u32 },
}

/// Per-run state: the loaded rows, the cursor into them, the running
/// statistics and the display windows. Driven one row at a time.
pub struct Playback {
    rows: Vec<Row>,
    cursor: usize,
    attempts: u32,
    max_attempts: u32,
    skipped: usize,
    stats: Aggregation,
    windows: WindowStore,
}

impl Playback {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self::with_windows(
            WindowStore::new(cfg.chart_capacity, cfg.recent_capacity, cfg.seed),
            cfg.max_attempts,
        )
    }

    pub fn with_windows(windows: WindowStore, max_attempts: u32) -> Self {
        Self {
            rows: Vec::new(),
            cursor: 0,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            skipped: 0,
            stats: Aggregation::new(),
            windows,
        }
    }

    /// Drops the rows and every derived value.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.cursor = 0;
        self.attempts = 0;
        self.skipped = 0;
        self.stats.reset();
        self.windows.clear();
    }

    pub fn load(&mut self, rows: Vec<Row>) {
        self.reset();
        self.rows = rows;
    }

    pub fn next_row(&self) -> Option<&Row> {
        self.rows.get(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.rows.len()
    }

    /// Folds a prediction for the row under the cursor into the statistics
    /// and both windows, then advances.
    pub fn commit(&mut self, prediction: Prediction, at: DateTime<Utc>) -> Option<ProcessedRow> {
        let row = self.rows.get(self.cursor)?.clone();
        let processed = ProcessedRow::new(row, prediction, at);
        self.stats.record(&prediction);
        self.windows.observe(&processed);
        self.cursor += 1;
        self.attempts = 0;
        Some(processed)
    }

    /// Counts a failed attempt on the row under the cursor.
    pub fn fail(&mut self) -> FailureOutcome {
        self.attempts += 1;
        let attempt = self.attempts;
        if attempt >= self.max_attempts {
            self.cursor += 1;
            self.attempts = 0;
            self.skipped += 1;
            FailureOutcome::Skipped { attempt }
        } else {
            FailureOutcome::Retry { attempt }
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn stats(&self) -> AggregationSnapshot {
        self.stats.snapshot()
    }

    pub fn windows(&self) -> &WindowStore {
        &self.windows
    }
}
