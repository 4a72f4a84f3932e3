//! HTTP handlers for stock movement endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::stock_history::{RecordMovementInput, StockHistoryService, StockMovement};
use crate::AppState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Record a stock movement
pub async fn record_movement(
    State(state): State<AppState>,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<Json<StockMovement>> {
    let service = StockHistoryService::new(state.db);
    let movement = service.record_movement(input).await?;
    Ok(Json(movement))
}

/// Get movement history for an item
pub async fn get_item_movements(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = StockHistoryService::new(state.db);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let offset = query.offset.unwrap_or(0).max(0);
    let movements = service.list_for_item(item_id, limit, offset).await?;
    Ok(Json(movements))
}
