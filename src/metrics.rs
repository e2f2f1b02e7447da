use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder, histogram_opts, opts,
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
};

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "portfolio_http_requests_total",
            "Total number of HTTP requests by method and status"
        ),
        &["method", "status"]
    )
    .unwrap()
});

pub static DB_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "portfolio_db_queries_total",
        "Total number of database query attempts"
    ))
    .unwrap()
});

pub static DB_QUERY_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "portfolio_db_query_failures_total",
        "Total number of failed database query attempts"
    ))
    .unwrap()
});

pub static DB_SLOW_QUERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "portfolio_db_slow_queries_total",
        "Total number of queries slower than the slow-query threshold"
    ))
    .unwrap()
});

pub static DB_QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(histogram_opts!(
        "portfolio_db_query_duration_seconds",
        "Histogram of database query durations",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ))
    .unwrap()
});

pub static DB_RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "portfolio_db_reconnects_total",
        "Total number of connection pool rebuilds"
    ))
    .unwrap()
});

pub static RATE_LIMITED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "portfolio_rate_limited_total",
            "Total number of requests rejected by the rate limiter"
        ),
        &["endpoint"]
    )
    .unwrap()
});

/// 0 = closed, 1 = half-open, 2 = open
pub static CIRCUIT_BREAKER_STATE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!(
        "portfolio_circuit_breaker_state",
        "Database circuit breaker state"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "200"]).inc();
        DB_QUERIES_TOTAL.inc();

        let output = gather_metrics().unwrap();
        assert!(output.contains("portfolio_http_requests_total"));
        assert!(output.contains("portfolio_db_queries_total"));
    }
}
