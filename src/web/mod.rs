use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    BoxError, Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::monitor::Monitor;
use crate::subscription::SubscriptionService;

pub mod handlers;
pub mod responses;

pub use handlers::{confirm, health_check, subscribe, unsubscribe};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub subscriptions: Arc<SubscriptionService>,
    pub monitor: Arc<Monitor>,
}

/// Builds the API router. Requests running longer than `request_timeout`
/// are answered with `408 Request Timeout`.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/subscribe", post(subscribe))
        .route("/confirm", get(confirm))
        .route("/unsubscribe", post(unsubscribe))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(HandleErrorLayer::new(handle_layer_error))
                .timeout(request_timeout),
        )
        .with_state(state)
}

async fn handle_layer_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        let body = ApiResponse::<()>::error("REQUEST_TIMEOUT", "Request timed out");
        return (StatusCode::REQUEST_TIMEOUT, Json(body)).into_response();
    }

    tracing::error!("Unhandled middleware error: {}", err);
    let body = ApiResponse::<()>::error("INTERNAL_SERVER_ERROR", "Internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
