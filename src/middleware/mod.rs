//! axum middleware for the gateway.

mod rate_limit;
mod route_gate;

pub use rate_limit::{RateLimitLayerState, add_rate_limit_headers, rate_limit_middleware};
pub use route_gate::route_gate_middleware;
