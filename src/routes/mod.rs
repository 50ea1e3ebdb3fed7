// Route modules
pub mod entitlements;
pub mod transactions;

use crate::{
    app_state::AppState,
    middleware::{create_rate_limiter, jwt_auth_middleware, logging_middleware},
};
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Validation fans out to the store service, so it sits behind both
    // authentication and rate limiting
    let rate_limiter = create_rate_limiter(state.redis.clone(), &state.config.rate_limit);
    let validation_routes = Router::new()
        .route(
            "/transactions/validate",
            post(transactions::validate_transaction),
        )
        .route_layer(middleware::from_fn(rate_limiter))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Auth-only routes (no rate limiting, require JWT)
    let read_routes = Router::new()
        .route("/entitlement", get(entitlements::get_entitlement))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    Router::new()
        .merge(validation_routes)
        .merge(read_routes)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(logging_middleware))
                .layer(cors_layer(&state)),
        )
}

/// Allow the web dashboard origin when one is configured
fn cors_layer(state: &AppState) -> CorsLayer {
    match state
        .config
        .application
        .dashboard_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::new(),
    }
}
