//! In-process row sources and predictors, for offline runs and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LoadError, PredictionError};
use crate::model::{Prediction, Row};
use crate::source::{Predictor, RowSource};

/// Serves a fixed row set, or a fixed failure.
pub struct VecRowSource {
    rows: Vec<Row>,
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl VecRowSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// `n` featureless rows indexed 0..n.
    pub fn indexed(n: usize) -> Self {
        Self::new((0..n).map(Row::new).collect())
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            rows: Vec::new(),
            fail_with: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for VecRowSource {
    async fn load_all(&self, _dataset_id: u64) -> Result<Vec<Row>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(reason) => Err(LoadError::Decode(reason.clone())),
            None => Ok(self.rows.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Answer(Prediction),
    Fail(String),
}

/// Replies from a script, one entry per call; an exhausted script repeats
/// `fallback`. Optionally sleeps before answering to model a slow backend.
pub struct ScriptedPredictor {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    latency: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<usize>>,
}

impl ScriptedPredictor {
    pub fn new(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answers every row with the same prediction.
    pub fn constant(prediction: Prediction) -> Self {
        Self::new(Vec::new(), Scripted::Answer(prediction))
    }

    pub fn answers(predictions: Vec<Prediction>, fallback: Prediction) -> Self {
        Self::new(
            predictions.into_iter().map(Scripted::Answer).collect(),
            Scripted::Answer(fallback),
        )
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Row indices in the order they were submitted.
    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    async fn predict_step(&self, _dataset_id: u64, row: &Row) -> Result<Prediction, PredictionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(row.row_index);
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match next {
            Scripted::Answer(p) => Ok(p),
            Scripted::Fail(reason) => Err(PredictionError::Decode(reason)),
        }
    }
}
