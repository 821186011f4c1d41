use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

// Registration only fails on duplicate names, which is a programming error.
lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("storefront_requests_total", "Total number of proxied requests").unwrap();
    pub static ref RATE_LIMIT_REJECTIONS: Counter = register_counter!(
        "storefront_rate_limit_rejections_total",
        "Requests rejected by the rate limiter"
    )
    .unwrap();
    pub static ref RATE_LIMIT_RECORDS: Gauge = register_gauge!(
        "storefront_rate_limit_records",
        "Current number of rate limit records held in memory"
    )
    .unwrap();
    pub static ref GATE_REDIRECTS: Counter = register_counter!(
        "storefront_gate_redirects_total",
        "Page requests redirected by the route gate"
    )
    .unwrap();
    pub static ref SESSION_REFRESHES: Counter = register_counter!(
        "storefront_session_refreshes_total",
        "Sessions refreshed by the session guardian"
    )
    .unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "storefront_upstream_latency_seconds",
        "Upstream request latency in seconds"
    )
    .unwrap();
}
