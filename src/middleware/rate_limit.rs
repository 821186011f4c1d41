use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::metrics::{RATE_LIMIT_RECORDS, RATE_LIMIT_REJECTIONS};
use crate::models::RateLimitedBody;
use crate::presets::RateLimitPolicy;
use crate::rate_limit::{DEFAULT_MESSAGE, RateLimitResult, RateLimiterService, client_identifier, now_ms};
use crate::session::UserResolver;

static LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// State for one rate limited route.
#[derive(Clone)]
pub struct RateLimitLayerState {
    pub limiter: Arc<RateLimiterService>,
    pub policy: Arc<RateLimitPolicy>,
    pub resolver: Option<Arc<dyn UserResolver>>,
}

impl RateLimitLayerState {
    pub fn new(limiter: Arc<RateLimiterService>, policy: impl Into<RateLimitPolicy>) -> Self {
        Self {
            limiter,
            policy: Arc::new(policy.into()),
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn UserResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Admits or rejects the request for its caller.
///
/// Rejected requests get a 429 with the limit headers and `Retry-After`;
/// admitted ones run the wrapped handler and get the limit headers added to
/// its response, body and status untouched.
pub async fn rate_limit_middleware(
    State(layer): State<RateLimitLayerState>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers().clone();
    let user_id = match (&layer.resolver, layer.policy.use_user_id) {
        (Some(resolver), true) => resolver.resolve_user_id(&headers).await,
        _ => None,
    };
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identifier = client_identifier(&headers, user_id.as_deref(), peer);

    let options = &layer.policy.options;
    let result = layer.limiter.check(&identifier, options);
    RATE_LIMIT_RECORDS.set(layer.limiter.len() as f64);

    if !result.success {
        RATE_LIMIT_REJECTIONS.inc();
        tracing::info!(
            identifier = %identifier,
            path = %request.uri().path(),
            "rate limit exceeded"
        );
        return rejected(options.max_requests, &result, now_ms());
    }

    let mut response = next.run(request).await;
    add_rate_limit_headers(response.headers_mut(), options.max_requests, &result);
    response
}

fn rejected(limit: u32, result: &RateLimitResult, now_ms: i64) -> Response {
    let retry_after = result.retry_after_secs_at(now_ms);
    let body = RateLimitedBody {
        error: result
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    add_rate_limit_headers(headers, limit, result);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

pub fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u32, result: &RateLimitResult) {
    headers.insert(LIMIT.clone(), HeaderValue::from(limit));
    headers.insert(REMAINING.clone(), HeaderValue::from(result.remaining));
    headers.insert(RESET.clone(), HeaderValue::from(result.reset_time));
}
