//! Reporting handlers for valuation, analytics and data export

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::reporting::{FinancialSummaryRow, ReportingService};
use crate::services::valuation::ValuationService;
use crate::AppState;

#[derive(Deserialize)]
pub struct FinancialSummaryQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub supplier_id: Option<Uuid>,
    pub format: Option<String>, // "json" or "csv"
}

#[derive(Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

fn parse_date_param(
    value: Option<String>,
    field: &str,
) -> Result<Option<chrono::NaiveDate>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::Validation {
                field: field.to_string(),
                message: format!("Invalid date '{}', expected YYYY-MM-DD", raw),
            }),
    }
}

/// Get the weighted-average-cost financial summary for a date window
pub async fn get_financial_summary(
    State(state): State<AppState>,
    Query(query): Query<FinancialSummaryQuery>,
) -> AppResult<impl IntoResponse> {
    let service = ValuationService::new(state.db.clone());

    let start_date = parse_date_param(query.start_date, "start_date")?;
    let end_date = parse_date_param(query.end_date, "end_date")?;

    let summary = service
        .financial_summary(start_date, end_date, query.supplier_id)
        .await?;

    if query.format.as_deref() == Some("csv") {
        let rows = FinancialSummaryRow::from_summary(&summary);
        let csv = ReportingService::export_to_csv(&rows)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"financial_summary.csv\"",
                ),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(summary).into_response())
    }
}

/// Get on-hand stock grouped by supplier
pub async fn get_stock_by_supplier(
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let service = ReportingService::new(state.db.clone());
    let data = service.get_stock_by_supplier().await?;
    Ok(Json(data))
}

/// Get items at or below a stock threshold
pub async fn get_low_stock_items(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> AppResult<impl IntoResponse> {
    let service = ReportingService::new(state.db.clone());
    let data = service
        .get_low_stock_items(query.threshold.unwrap_or(10))
        .await?;
    Ok(Json(data))
}
