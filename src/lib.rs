//! Storefront edge gateway.
//!
//! Rate limits the storefront's write and search endpoints, gates page
//! navigation on the session cookie, proxies everything to the origin, and
//! provides a session guardian that keeps a client session fresh against the
//! hosted identity provider.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod presets;
pub mod rate_limit;
pub mod route_gate;
pub mod server;
pub mod session;
pub mod state;

pub use error::{AuthError, GatewayError, StoreError};
pub use presets::{RateLimitPolicy, RateLimitPreset};
pub use rate_limit::{
    RateLimitOptions, RateLimitRecord, RateLimitResult, RateLimiterService, client_identifier,
    get_client_identifier,
    spawn_sweeper,
};
pub use route_gate::{GateDecision, RouteGate};
pub use server::build_router;
