use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Store Metrics (MongoDB / in-memory)
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of persistence operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Persistence operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Model Metrics
    pub static ref MODEL_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "model_call_duration_seconds",
        "Language model call duration in seconds",
        &["call"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]
    )
    .unwrap();

    pub static ref EVALUATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "evaluations_total",
        "Evaluations applied to attempts, by response type",
        &["response_type"]
    )
    .unwrap();

    pub static ref FALLBACK_TURNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fallback_turns_total",
        "Fallback tutor turns issued after a contract violation",
        &["reason"]
    )
    .unwrap();

    // Business Metrics
    pub static ref HINTS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hints_recorded_total",
        "Hints recorded in attempt ledgers",
        &["hint_level"]
    )
    .unwrap();

    pub static ref ATTEMPTS_ACTIVE: IntGauge = register_int_gauge!(
        "attempts_active",
        "Number of open attempts held in memory"
    )
    .unwrap();

    pub static ref ATTEMPTS_FINALIZED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_finalized_total",
        "Finalized attempts by final status",
        &["final_status", "kind"]
    )
    .unwrap();

    pub static ref MASTERY_CHECKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "mastery_checks_total",
        "Mastery check lifecycle events",
        &["event"]
    )
    .unwrap();

    pub static ref DIAGNOSTICS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "diagnostics_total",
        "Misconception diagnostics by status",
        &["status"]
    )
    .unwrap();

    pub static ref PERSISTENCE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "persistence_failures_total",
        "Persistence writes that failed after retries",
        &["command"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a persistence operation with metrics
pub async fn track_store_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Helper: time a language model call
pub async fn track_model_call<F, T>(call: &str, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    MODEL_CALL_DURATION_SECONDS
        .with_label_values(&[call])
        .observe(start.elapsed().as_secs_f64());
    result
}
