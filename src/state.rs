use std::sync::Arc;

use crate::rate_limit::RateLimiterService;

// app's shared state
pub struct AppState {
    pub client: reqwest::Client,
    pub upstream_url: String, // storefront origin, no trailing slash
    pub rate_limiter: Arc<RateLimiterService>,
}

impl AppState {
    pub fn new(client: reqwest::Client, upstream: &str, rate_limiter: Arc<RateLimiterService>) -> Self {
        // add http:// if not present
        let upstream_url = if upstream.starts_with("http") {
            upstream.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", upstream.trim_end_matches('/'))
        };

        Self {
            client,
            upstream_url,
            rate_limiter,
        }
    }
}
