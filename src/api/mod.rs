pub mod error;
pub mod middleware;
pub mod products;
pub mod purchases;
pub mod state;
pub mod users;

pub use middleware::CurrentUser;
pub use state::AppState;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    // Identity-scoped routes, all behind the authorization gate
    let protected = Router::new()
        .route("/products/favorites", post(products::add_favorite))
        .route("/products/:id", get(products::get_product))
        .route("/users/favorites", get(users::favorites))
        .route("/users/balance", get(users::balance))
        .route("/purchases", post(purchases::create).get(purchases::list))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_user,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/store/balance", get(users::store_balance))
        .merge(protected)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
