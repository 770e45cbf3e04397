//! Bounded live-display windows: the quality chart series and the
//! recent-rows table.
//!
//! Both windows drop their oldest entry once full. The chart grows at the
//! back; the recent-rows table grows at the front so index 0 is always the
//! newest row.

use std::collections::VecDeque;

use chrono::{DateTime, Local, TimeZone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::model::{EnrichedRow, ProcessedRow, SensorReadings};

pub const DEFAULT_CHART_CAPACITY: usize = 20;
pub const DEFAULT_RECENT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

/// 24-hour `HH:MM:SS` wall-clock label.
pub fn time_label<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%H:%M:%S").to_string()
}

/// Maps a raw confidence in [0, 1] to the plotted quality score.
pub trait QualityTransform: Send {
    fn score(&mut self, confidence: f64) -> f64;
}

/// Attaches display-only readings to a row entering the recent table.
pub trait RowEnricher: Send {
    fn readings(&mut self, row: &ProcessedRow) -> SensorReadings;
}

/// `confidence * 100` plus up to 10 points of jitter, held inside [75, 95].
pub struct JitteredQuality {
    rng: StdRng,
}

impl JitteredQuality {
    pub const FLOOR: f64 = 75.0;
    pub const CEIL: f64 = 95.0;

    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded(seed) }
    }
}

impl QualityTransform for JitteredQuality {
    fn score(&mut self, confidence: f64) -> f64 {
        let jitter: f64 = self.rng.gen_range(0.0..10.0);
        (confidence * 100.0 + jitter).clamp(Self::FLOOR, Self::CEIL)
    }
}

/// Plots confidence as a plain percentage.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawPercent;

impl QualityTransform for RawPercent {
    fn score(&mut self, confidence: f64) -> f64 {
        confidence * 100.0
    }
}

/// Temperature 20–40 °C, pressure 1000–1099 hPa, humidity 50–80 %.
pub struct SyntheticSensors {
    rng: StdRng,
}

impl SyntheticSensors {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded(seed) }
    }
}

impl RowEnricher for SyntheticSensors {
    fn readings(&mut self, _row: &ProcessedRow) -> SensorReadings {
        SensorReadings {
            temperature_c: one_decimal(self.rng.gen_range(20.0..40.0)),
            pressure_hpa: self.rng.gen_range(1000..1100),
            humidity_pct: one_decimal(self.rng.gen_range(50.0..80.0)),
        }
    }
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Fixed-capacity FIFO of chart points.
#[derive(Debug, Clone)]
pub struct ChartWindow {
    points: VecDeque<ChartPoint>,
    capacity: usize,
}

impl ChartWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, label: String, value: f64) {
        self.points.push_back(ChartPoint { label, value });
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn labels(&self) -> Vec<String> {
        self.points.iter().map(|p| p.label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn to_vec(&self) -> Vec<ChartPoint> {
        self.points.iter().cloned().collect()
    }
}

/// Fixed-capacity newest-first table of enriched rows.
#[derive(Debug, Clone)]
pub struct RecentRowsWindow {
    rows: VecDeque<EnrichedRow>,
    capacity: usize,
}

impl RecentRowsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, row: EnrichedRow) {
        self.rows.push_front(row);
        while self.rows.len() > self.capacity {
            self.rows.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn newest(&self) -> Option<&EnrichedRow> {
        self.rows.front()
    }

    pub fn to_vec(&self) -> Vec<EnrichedRow> {
        self.rows.iter().cloned().collect()
    }
}

/// Both display windows plus the transforms that feed them.
pub struct WindowStore {
    chart: ChartWindow,
    recent: RecentRowsWindow,
    quality: Box<dyn QualityTransform>,
    enricher: Box<dyn RowEnricher>,
}

impl WindowStore {
    pub fn new(chart_capacity: usize, recent_capacity: usize, seed: Option<u64>) -> Self {
        Self::with_transforms(
            chart_capacity,
            recent_capacity,
            Box::new(JitteredQuality::new(seed)),
            Box::new(SyntheticSensors::new(seed.map(|s| s.wrapping_add(1)))),
        )
    }

    pub fn with_transforms(
        chart_capacity: usize,
        recent_capacity: usize,
        quality: Box<dyn QualityTransform>,
        enricher: Box<dyn RowEnricher>,
    ) -> Self {
        Self {
            chart: ChartWindow::new(chart_capacity),
            recent: RecentRowsWindow::new(recent_capacity),
            quality,
            enricher,
        }
    }

    pub fn push_chart_point(&mut self, label: String, value: f64) {
        self.chart.push(label, value);
    }

    /// Enriches the row exactly once, then stores it at the front.
    pub fn push_recent_row(&mut self, row: ProcessedRow) {
        let sensor_data = self.enricher.readings(&row);
        self.recent.push(EnrichedRow {
            processed: row,
            sensor_data,
        });
    }

    /// Feeds one processed row into both windows.
    pub fn observe(&mut self, row: &ProcessedRow) {
        let label = time_label(&row.timestamp.with_timezone(&Local));
        let value = self.quality.score(row.confidence);
        self.push_chart_point(label, value);
        self.push_recent_row(row.clone());
    }

    pub fn clear(&mut self) {
        self.chart.clear();
        self.recent.clear();
    }

    pub fn chart(&self) -> &ChartWindow {
        &self.chart
    }

    pub fn recent(&self) -> &RecentRowsWindow {
        &self.recent
    }
}
