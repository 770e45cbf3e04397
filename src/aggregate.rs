use serde::Serialize;

use crate::model::{Label, Prediction};

/// Read-only view of the running statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSnapshot {
    pub processed_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    /// Mean confidence in percent; 0 until the first row is recorded.
    pub average_confidence: f64,
}

impl AggregationSnapshot {
    /// Share of passing rows in [0, 1].
    pub fn pass_rate(&self) -> f64 {
        if self.processed_count == 0 {
            return 0.0;
        }
        self.pass_count as f64 / self.processed_count as f64
    }

    pub fn fail_rate(&self) -> f64 {
        if self.processed_count == 0 {
            return 0.0;
        }
        self.fail_count as f64 / self.processed_count as f64
    }
}

/// Running counters over the active run.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    processed: u64,
    pass: u64,
    fail: u64,
    confidence_sum: f64,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn record(&mut self, prediction: &Prediction) {
        self.processed += 1;
        match prediction.label {
            Label::Pass => self.pass += 1,
            Label::Fail => self.fail += 1,
        }
        self.confidence_sum += prediction.confidence;
    }

    pub fn average_confidence(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.confidence_sum / self.processed as f64 * 100.0
    }

    pub fn snapshot(&self) -> AggregationSnapshot {
        AggregationSnapshot {
            processed_count: self.processed,
            pass_count: self.pass,
            fail_count: self.fail,
            average_confidence: self.average_confidence(),
        }
    }
}
