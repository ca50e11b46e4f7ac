use crate::{
    api::{auth, health},
    observability::HealthChecker,
    rate_limit::{login_rate_limit_middleware, LoginGate},
};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub gate: Arc<LoginGate>,
    pub health_checker: Arc<HealthChecker>,
}

pub fn create_router(gate: Arc<LoginGate>, metrics_enabled: bool) -> Router {
    let health_checker = Arc::new(HealthChecker::new(gate.store().clone()));

    let state = AppState {
        gate: gate.clone(),
        health_checker,
    };

    let mut router = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    if metrics_enabled {
        router = router.route("/metrics", get(health::metrics));
    }

    router
        .nest("/v1", v1_routes(gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn v1_routes(gate: Arc<LoginGate>) -> Router<AppState> {
    // Only the login path is gated
    Router::new()
        .route("/auth/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            gate,
            login_rate_limit_middleware,
        ))
}
