use crate::dataset::DatasetStats;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramOpts,
    HistogramVec, IntCounterVec, IntGauge, Opts,
};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Routes that get their own metric labels.
const TRACKED_ROUTES: &[&str] = &["/ways", "/status", "/health"];

lazy_static! {
    static ref RESPONSE_CODE_COLLECTOR: IntCounterVec = register_int_counter_vec!(
        Opts::new("http_requests_total", "Total Requests"),
        &["code", "method", "route"],
    )
    .unwrap();
    static ref RESPONSE_TIME_COLLECTOR: HistogramVec = register_histogram_vec!(
        HistogramOpts::new("http_request_duration_seconds", "Response Times"),
        &["code", "method", "route"]
    )
    .unwrap();
    static ref RELOAD_COLLECTOR: IntCounterVec = register_int_counter_vec!(
        Opts::new("dataset_reloads_total", "Dataset reload attempts"),
        &["outcome"],
    )
    .unwrap();
    static ref STATE_GAUGE: IntGauge =
        register_int_gauge!("dataset_state", "Sequence number of the active dataset").unwrap();
    static ref WAYS_GAUGE: IntGauge =
        register_int_gauge!("dataset_ways", "Ways in the active dataset").unwrap();
    static ref NODES_GAUGE: IntGauge =
        register_int_gauge!("dataset_nodes", "Nodes in the active dataset").unwrap();
    static ref SKIPPED_GAUGE: IntGauge = register_int_gauge!(
        "dataset_skipped_ways",
        "Ways of the active dataset dropped for missing nodes"
    )
    .unwrap();
    static ref PARTIAL_GAUGE: IntGauge = register_int_gauge!(
        "dataset_partial_ways",
        "Ways of the active dataset truncated for missing nodes"
    )
    .unwrap();
}

pub fn init_logging() {
    let formatting_layer = BunyanFormattingLayer::new(PKG_NAME.into(), std::io::stdout);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .init();
}

pub fn track_request(code: u16, method: &str, route: &str, time: f64) {
    // dos protection
    if !TRACKED_ROUTES.contains(&route) {
        return;
    }

    let normalized_code = match code {
        200..=299 => "2XX",
        300..=399 => "3XX",
        400..=499 => "4XX",
        500..=599 => "5XX",
        _ => "invalid",
    };

    RESPONSE_CODE_COLLECTOR
        .with_label_values(&[normalized_code, method, route])
        .inc();

    RESPONSE_TIME_COLLECTOR
        .with_label_values(&[normalized_code, method, route])
        .observe(time);
}

pub fn track_reload(outcome: &str) {
    RELOAD_COLLECTOR.with_label_values(&[outcome]).inc();
}

pub fn track_dataset(stats: &DatasetStats) {
    STATE_GAUGE.set(stats.state);
    WAYS_GAUGE.set(stats.ways as i64);
    NODES_GAUGE.set(stats.nodes as i64);
    SKIPPED_GAUGE.set(stats.skipped_ways as i64);
    PARTIAL_GAUGE.set(stats.partial_ways as i64);
}

pub fn render_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
