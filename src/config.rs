use std::time::Duration;

use crate::window::{DEFAULT_CHART_CAPACITY, DEFAULT_RECENT_CAPACITY};

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub dataset_id: u64,
    pub tick_ms: u64,
    pub chart_capacity: usize,
    pub recent_capacity: usize,
    pub max_attempts: u32,
    pub http_timeout_secs: u64,
    pub load_retries: u32,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:5000".to_string(),
            dataset_id: 1,
            tick_ms: 1000,
            chart_capacity: DEFAULT_CHART_CAPACITY,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            max_attempts: 3,
            http_timeout_secs: 10,
            load_retries: 2,
            seed: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            api_base: std::env::var("SIM_API_BASE").unwrap_or(d.api_base),
            dataset_id: env_parse("SIM_DATASET_ID").unwrap_or(d.dataset_id),
            tick_ms: env_parse("SIM_TICK_MS").unwrap_or(d.tick_ms),
            chart_capacity: env_parse("SIM_CHART_CAPACITY").unwrap_or(d.chart_capacity),
            recent_capacity: env_parse("SIM_RECENT_CAPACITY").unwrap_or(d.recent_capacity),
            max_attempts: env_parse("SIM_PREDICT_ATTEMPTS").unwrap_or(d.max_attempts),
            http_timeout_secs: env_parse("SIM_HTTP_TIMEOUT_SECS").unwrap_or(d.http_timeout_secs),
            load_retries: env_parse("SIM_LOAD_RETRIES").unwrap_or(d.load_retries),
            seed: env_parse("SIM_SEED"),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            dataset_id: self.dataset_id,
            tick: Duration::from_millis(self.tick_ms.max(1)),
            chart_capacity: self.chart_capacity.max(1),
            recent_capacity: self.recent_capacity.max(1),
            max_attempts: self.max_attempts.max(1),
            seed: self.seed,
        }
    }
}

/// Settings the playback engine runs with.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dataset_id: u64,
    pub tick: Duration,
    pub chart_capacity: usize,
    pub recent_capacity: usize,
    /// Failed prediction attempts per row before it is skipped.
    pub max_attempts: u32,
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_cadence() {
        let e = EngineConfig::default();
        assert_eq!(e.tick, Duration::from_millis(1000));
        assert_eq!(e.chart_capacity, 20);
        assert_eq!(e.recent_capacity, 10);
        assert_eq!(e.max_attempts, 3);
    }

    #[test]
    fn test_engine_clamps_zeroes() {
        let cfg = Config {
            tick_ms: 0,
            chart_capacity: 0,
            recent_capacity: 0,
            max_attempts: 0,
            ..Config::default()
        };
        let e = cfg.engine();
        assert_eq!(e.tick, Duration::from_millis(1));
        assert_eq!(e.chart_capacity, 1);
        assert_eq!(e.recent_capacity, 1);
        assert_eq!(e.max_attempts, 1);
    }
}
