use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::metrics::GATE_REDIRECTS;
use crate::route_gate::{GateDecision, RouteGate};

// Redirect page requests per the gate, pass everything else through
pub async fn route_gate_middleware(
    State(gate): State<Arc<RouteGate>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !gate.applies_to(path) {
        return next.run(request).await;
    }

    match gate.decide_for(path, request.headers()) {
        GateDecision::Continue => next.run(request).await,
        GateDecision::Redirect(to) => {
            GATE_REDIRECTS.inc();
            tracing::debug!(from = %path, to = %to, "route gate redirect");
            Redirect::temporary(&to).into_response()
        }
    }
}
