use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::{LoadError, PredictionError};
use crate::logging::{log, obj, v_num, v_str, Domain, Level, ProfileScope};
use crate::model::{Prediction, Row};
use crate::source::retry::{
    is_retryable_http_status, is_retryable_network_error, retry_async, RetryConfig,
};
use crate::source::{Predictor, RowSource};

/// Backend client serving both the row set and per-row predictions.
pub struct HttpBackend {
    client: Client,
    base: String,
    load_retry: RetryConfig,
}

/// Label and confidence may sit at the top level or inside `row`.
#[derive(Deserialize, Debug)]
struct StepResponse {
    #[serde(default)]
    row: Option<StepRow>,
    #[serde(default)]
    prediction: Option<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct StepRow {
    #[serde(default)]
    prediction: Option<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl HttpBackend {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.http_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base: cfg.api_base.trim_end_matches('/').to_string(),
            load_retry: RetryConfig::with_retries(cfg.load_retries),
        }
    }

    fn rows_url(&self, dataset_id: u64) -> String {
        format!("{}/api/simulation/{}", self.base, dataset_id)
    }

    fn step_url(&self, dataset_id: u64) -> String {
        format!("{}/api/simulation/{}/step", self.base, dataset_id)
    }

    async fn fetch_rows(&self, url: &str) -> Result<Vec<Row>, LoadError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LoadError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| LoadError::Decode(e.to_string()))
    }
}

fn load_retryable(err: &LoadError) -> bool {
    match err {
        LoadError::Http(e) => is_retryable_network_error(e),
        LoadError::Status { status, .. } => is_retryable_http_status(*status),
        LoadError::Decode(_) => false,
    }
}

fn decode_step(bytes: &[u8]) -> Result<Prediction, PredictionError> {
    let resp: StepResponse =
        serde_json::from_slice(bytes).map_err(|e| PredictionError::Decode(e.to_string()))?;
    let (row_label, row_conf) = match &resp.row {
        Some(r) => (r.prediction, r.confidence),
        None => (None, None),
    };
    let label = resp
        .prediction
        .or(row_label)
        .ok_or_else(|| PredictionError::Decode("missing prediction".to_string()))?;
    let confidence = resp
        .confidence
        .or(row_conf)
        .ok_or_else(|| PredictionError::Decode("missing confidence".to_string()))?;
    Prediction::from_wire(label, confidence)
}

#[async_trait]
impl RowSource for HttpBackend {
    async fn load_all(&self, dataset_id: u64) -> Result<Vec<Row>, LoadError> {
        let _scope = ProfileScope::with_context(
            "source",
            "load_all",
            &[("dataset_id", json!(dataset_id))],
        );
        let url = self.rows_url(dataset_id);
        let rows = retry_async(&self.load_retry, "load_all", load_retryable, || {
            self.fetch_rows(&url)
        })
        .await?;
        log(
            Level::Info,
            Domain::Source,
            "rows_loaded",
            obj(&[
                ("dataset_id", json!(dataset_id)),
                ("rows", v_num(rows.len() as f64)),
            ]),
        );
        Ok(rows)
    }
}

#[async_trait]
impl Predictor for HttpBackend {
    async fn predict_step(&self, dataset_id: u64, row: &Row) -> Result<Prediction, PredictionError> {
        let resp = self
            .client
            .post(self.step_url(dataset_id))
            .json(row)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log(
                Level::Debug,
                Domain::Predict,
                "step_rejected",
                obj(&[
                    ("status", json!(status.as_u16())),
                    ("sample_id", v_str(&row.sample_id())),
                ]),
            );
            return Err(PredictionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        decode_step(&bytes)
    }
}
