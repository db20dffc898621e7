/*!
 * # Metrics Module
 *
 * In-process counters for the store's business and HTTP traffic, rendered
 * in Prometheus text format at `/metrics`.
 *
 * Counters are keyed by name plus a sorted label set and live in one
 * process-wide registry. Database transaction timings are reported through
 * the `metrics` facade from `db::transaction` instead.
 */

use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Invalid metric name: {0}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Registry key: metric name plus label pairs in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    labels: BTreeMap<String, String>,
}

impl SeriesKey {
    fn render_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect();
        format!("{{{}}}", pairs.join(","))
    }
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<SeriesKey, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Result<Counter, MetricsError> {
        if !is_valid_metric_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        let key = SeriesKey {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        Ok(self.counters.entry(key).or_default().clone())
    }

    /// Current value of a series, 0 when it was never touched.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = SeriesKey {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.counters.get(&key).map(|c| c.get()).unwrap_or(0)
    }

    /// Prometheus text exposition, one `# TYPE` line per metric family.
    pub fn render_prometheus(&self) -> String {
        let mut series: Vec<(SeriesKey, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));

        let mut output = String::new();
        let mut last_family: Option<String> = None;
        for (key, value) in series {
            if last_family.as_deref() != Some(key.name.as_str()) {
                let _ = writeln!(output, "# TYPE {} counter", key.name);
                last_family = Some(key.name.clone());
            }
            let _ = writeln!(output, "{}{} {}", key.name, key.render_labels(), value);
        }
        output
    }
}

pub static METRICS: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

fn bump(name: &str, labels: &[(&str, &str)]) {
    match METRICS.counter(name, labels) {
        Ok(counter) => counter.inc(),
        Err(e) => tracing::debug!(error = %e, "metric dropped"),
    }
}

pub fn record_order_placed() {
    bump("perfume_orders_placed_total", &[]);
}

pub fn record_order_cancelled() {
    bump("perfume_orders_cancelled_total", &[]);
}

/// `reason` is the error kind that stopped the checkout.
pub fn record_checkout_rejection(reason: &str) {
    bump("perfume_checkout_rejections_total", &[("reason", reason)]);
}

pub fn record_stock_conflict() {
    bump("perfume_stock_conflicts_total", &[]);
}

pub fn record_http_status(status: StatusCode) {
    let class = match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    bump("perfume_http_requests_total", &[("status", class)]);
}

/// Middleware counting every response by status class.
pub async fn track_http_status(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;
    record_http_status(response.status());
    response
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render_prometheus(),
    )
}
