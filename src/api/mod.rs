mod bookings;
mod fields;
mod places;
mod response;

pub use response::{ApiError, ApiResponse, FieldErrors};

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Bearer token the gateway must present, if configured.
    pub gateway_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, gateway_token: Option<String>) -> Self {
        Self {
            engine,
            gateway_token: gateway_token.map(Arc::from),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/places", get(places::index).post(places::store))
        .route(
            "/places/:id",
            get(places::show).put(places::update).delete(places::destroy),
        )
        .route("/places/:id/booked-schedule", get(places::booked_schedule))
        .route("/filter-places", get(places::filter))
        .route("/bookings", get(bookings::index).post(bookings::store))
        .route(
            "/bookings/:id",
            get(bookings::show).put(bookings::update).delete(bookings::destroy),
        )
        .route(
            "/bookings/:id/cancel",
            post(bookings::cancel).put(bookings::cancel),
        )
        .route_layer(middleware::from_fn(observability::track_http))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}
