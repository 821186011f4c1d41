use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use std::sync::Arc;

use crate::handlers::{health_handler, metrics_handler, proxy_handler};
use crate::middleware::{RateLimitLayerState, rate_limit_middleware, route_gate_middleware};
use crate::presets::{RateLimitPolicy, RateLimitPreset};
use crate::route_gate::RouteGate;
use crate::session::UserResolver;
use crate::state::AppState;

/// Builds the gateway router.
///
/// Write endpoints that create orders, change passwords or touch the cart and
/// wishlist are rate limited per user; search is limited per address.
/// Everything else goes straight to the origin. Page requests pass the route
/// gate first.
pub fn build_router(
    state: Arc<AppState>,
    gate: Arc<RouteGate>,
    resolver: Option<Arc<dyn UserResolver>>,
) -> Router {
    let limiter = state.rate_limiter.clone();
    let limited = |policy: RateLimitPolicy| {
        let layer = RateLimitLayerState::new(limiter.clone(), policy);
        match &resolver {
            Some(r) => layer.with_resolver(r.clone()),
            None => layer,
        }
    };
    let per_user = |preset: RateLimitPreset| RateLimitPolicy::from(preset).per_user();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/api/orders",
            post(proxy_handler)
                .route_layer(middleware::from_fn_with_state(
                    limited(per_user(RateLimitPreset::Order)),
                    rate_limit_middleware,
                ))
                .get(proxy_handler),
        )
        .route(
            "/api/search",
            get(proxy_handler).route_layer(middleware::from_fn_with_state(
                limited(RateLimitPreset::Search.into()),
                rate_limit_middleware,
            )),
        )
        .route(
            "/api/account/password",
            put(proxy_handler).route_layer(middleware::from_fn_with_state(
                limited(per_user(RateLimitPreset::Strict)),
                rate_limit_middleware,
            )),
        )
        .route(
            "/api/cart",
            post(proxy_handler)
                .route_layer(middleware::from_fn_with_state(
                    limited(per_user(RateLimitPreset::Standard)),
                    rate_limit_middleware,
                ))
                .get(proxy_handler),
        )
        .route(
            "/api/wishlist",
            post(proxy_handler)
                .route_layer(middleware::from_fn_with_state(
                    limited(per_user(RateLimitPreset::Standard)),
                    rate_limit_middleware,
                ))
                .get(proxy_handler),
        )
        .fallback(proxy_handler)
        .layer(middleware::from_fn_with_state(gate, route_gate_middleware))
        .with_state(state)
}
