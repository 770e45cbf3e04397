use async_trait::async_trait;

use crate::error::{LoadError, PredictionError};
use crate::model::{Prediction, Row};

pub mod http;
pub mod memory;
pub mod retry;

/// Serves the full ordered row set for a dataset.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn load_all(&self, dataset_id: u64) -> Result<Vec<Row>, LoadError>;
}

/// Answers one prediction per row.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict_step(&self, dataset_id: u64, row: &Row) -> Result<Prediction, PredictionError>;
}
