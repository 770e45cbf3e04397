use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PredictionError;

/// One dataset record as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub row_index: usize,
    /// Domain feature values (sensor readings etc.), passed through untouched.
    #[serde(flatten)]
    pub features: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            features: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.features.insert(name.to_string(), value.into());
        self
    }

    /// Display id, e.g. `SAMPLE_007` for row index 6.
    pub fn sample_id(&self) -> String {
        format!("SAMPLE_{:03}", self.row_index + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Fail,
    Pass,
}

impl Label {
    pub fn from_wire(v: i64) -> Result<Self, PredictionError> {
        match v {
            1 => Ok(Label::Pass),
            0 => Ok(Label::Fail),
            other => Err(PredictionError::InvalidLabel(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Pass => "pass",
            Label::Fail => "fail",
        }
    }
}

/// Validated predictor output for one row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// Always within [0, 1].
    pub confidence: f64,
}

impl Prediction {
    pub fn new(label: Label, confidence: f64) -> Result<Self, PredictionError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(PredictionError::InvalidConfidence(confidence));
        }
        Ok(Self { label, confidence })
    }

    pub fn from_wire(label: i64, confidence: f64) -> Result<Self, PredictionError> {
        Self::new(Label::from_wire(label)?, confidence)
    }
}

/// A row after the predictor has answered for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRow {
    #[serde(flatten)]
    pub row: Row,
    pub timestamp: DateTime<Utc>,
    pub prediction: Label,
    pub confidence: f64,
}

/// Keys the processed and enriched wire forms write beside the flattened
/// features. A feature with one of these names would be emitted twice.
const RESERVED_KEYS: [&str; 5] = ["rowIndex", "timestamp", "prediction", "confidence", "sensorData"];

impl ProcessedRow {
    /// Features that collide with the outcome fields are dropped.
    pub fn new(mut row: Row, prediction: Prediction, timestamp: DateTime<Utc>) -> Self {
        for key in RESERVED_KEYS {
            row.features.remove(key);
        }
        Self {
            row,
            timestamp,
            prediction: prediction.label,
            confidence: prediction.confidence,
        }
    }
}

/// Auxiliary readings attached once when a row enters the recent-rows window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReadings {
    pub temperature_c: f64,
    pub pressure_hpa: u32,
    pub humidity_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRow {
    #[serde(flatten)]
    pub processed: ProcessedRow,
    pub sensor_data: SensorReadings,
}
