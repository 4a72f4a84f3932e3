//! Route definitions for the StockBook inventory platform

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stock movement log
        .nest("/movements", movement_routes())
        // Valuation and analytics reports
        .nest("/reports", report_routes())
}

/// Stock movement routes
fn movement_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::record_movement))
        .route("/items/:item_id", get(handlers::get_item_movements))
}

/// Reporting routes
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/financial-summary", get(handlers::get_financial_summary))
        .route("/stock-by-supplier", get(handlers::get_stock_by_supplier))
        .route("/low-stock", get(handlers::get_low_stock_items))
}
