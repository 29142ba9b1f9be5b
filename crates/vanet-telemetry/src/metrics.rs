//! In-process metrics for the advisory pipeline.
//!
//! Series are keyed by kind, name and a sorted label set, so the same name
//! can be recorded as a counter and a histogram without clobbering either.
//! Snapshots come out ordered by that key.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// One series at the moment [`MetricsRecorder::snapshot`] ran.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub name: String,
    pub metric_type: MetricType,
    /// Counter total, gauge value, or histogram median.
    pub value: f64,
    /// Label set as a JSON object, absent for unlabelled series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
}

/// Nearest-rank statistics over every observation of a histogram.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl HistogramSummary {
    fn from_observations(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let rank = |q: f64| sorted[((q * n as f64).ceil() as usize).clamp(1, n) - 1];
        Self {
            count: n as u64,
            sum: sorted.iter().sum(),
            min: sorted[0],
            max: sorted[n - 1],
            p50: rank(0.50),
            p95: rank(0.95),
            p99: rank(0.99),
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesKey {
    kind: MetricType,
    name: String,
    labels: BTreeMap<String, String>,
}

impl SeriesKey {
    fn new(kind: MetricType, name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            kind,
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    fn labels_json(&self) -> Option<String> {
        if self.labels.is_empty() {
            None
        } else {
            serde_json::to_string(&self.labels).ok()
        }
    }
}

enum Series {
    Counter(u64),
    Gauge(f64),
    Histogram(Vec<f64>),
}

/// Thread-safe recorder shared by every pipeline component.
#[derive(Default)]
pub struct MetricsRecorder {
    series: Mutex<BTreeMap<SeriesKey, Series>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = SeriesKey::new(MetricType::Counter, name, labels);
        let mut series = self.series.lock();
        if let Series::Counter(total) = series.entry(key).or_insert(Series::Counter(0)) {
            *total = total.saturating_add(n);
        }
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = SeriesKey::new(MetricType::Counter, name, labels);
        match self.series.lock().get(&key) {
            Some(Series::Counter(total)) => *total,
            _ => 0,
        }
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(MetricType::Gauge, name, labels);
        self.series.lock().insert(key, Series::Gauge(value));
    }

    /// Adjust a gauge by `delta`, starting from zero if unset.
    pub fn gauge_inc(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        let key = SeriesKey::new(MetricType::Gauge, name, labels);
        let mut series = self.series.lock();
        if let Series::Gauge(value) = series.entry(key).or_insert(Series::Gauge(0.0)) {
            *value += delta;
        }
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = SeriesKey::new(MetricType::Gauge, name, labels);
        match self.series.lock().get(&key) {
            Some(Series::Gauge(value)) => *value,
            _ => 0.0,
        }
    }

    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = SeriesKey::new(MetricType::Histogram, name, labels);
        let mut series = self.series.lock();
        if let Series::Histogram(values) = series.entry(key).or_insert_with(|| Series::Histogram(Vec::new())) {
            values.push(value);
        }
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = SeriesKey::new(MetricType::Histogram, name, labels);
        match self.series.lock().get(&key) {
            Some(Series::Histogram(values)) => HistogramSummary::from_observations(values),
            _ => HistogramSummary::default(),
        }
    }

    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let timestamp = Utc::now().to_rfc3339();
        self.series
            .lock()
            .iter()
            .map(|(key, series)| MetricsSnapshot {
                timestamp: timestamp.clone(),
                name: key.name.clone(),
                metric_type: key.kind,
                value: match series {
                    Series::Counter(total) => *total as f64,
                    Series::Gauge(value) => *value,
                    Series::Histogram(values) => HistogramSummary::from_observations(values).p50,
                },
                labels: key.labels_json(),
            })
            .collect()
    }
}
