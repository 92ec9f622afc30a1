use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState, MessageResponse, SubscriptionCreated};
use crate::models::SubscriptionRequest;
use crate::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmParams {
    pub id: String,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<ApiResponse<SubscriptionCreated>>, AppError> {
    tracing::info!("Subscribe request for {}", request.link);

    let confirmation_id = state.subscriptions.subscribe(&request).await?;
    Ok(Json(ApiResponse::success(SubscriptionCreated { confirmation_id })))
}

pub async fn confirm(
    State(state): State<AppState>,
    Query(params): Query<ConfirmParams>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    state.subscriptions.confirm(&params.id).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new("Subscription confirmed"))))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    tracing::info!("Unsubscribe request for {}", request.link);

    state.subscriptions.unsubscribe(&request).await?;
    Ok(Json(ApiResponse::success(MessageResponse::new("Unsubscribed"))))
}

pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "listing-watcher",
        "monitor_running": state.monitor.is_running(),
    }))
}
