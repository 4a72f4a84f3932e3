//! Reporting service for simple inventory analytics and data export
//!
//! These reports are plain grouped aggregations over the movement log; the
//! stateful financial summary lives in the valuation service.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// On-hand stock grouped by supplier
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SupplierStockReport {
    pub supplier_id: Option<Uuid>,
    pub supplier_name: Option<String>,
    pub item_count: i64,
    pub total_on_hand: i64,
}

/// Item whose on-hand quantity sits at or below a threshold
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LowStockItem {
    pub item_id: Uuid,
    pub item_name: String,
    pub sku: String,
    pub on_hand: i64,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get current on-hand stock grouped by supplier
    pub async fn get_stock_by_supplier(&self) -> AppResult<Vec<SupplierStockReport>> {
        let reports = sqlx::query_as::<_, SupplierStockReport>(
            r#"
            SELECT
                s.id as supplier_id,
                s.name as supplier_name,
                COUNT(DISTINCT sm.item_id) as item_count,
                COALESCE(SUM(sm.quantity_delta), 0) as total_on_hand
            FROM stock_movements sm
            LEFT JOIN suppliers s ON s.id = sm.supplier_id
            GROUP BY s.id, s.name
            ORDER BY total_on_hand DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(reports)
    }

    /// Get items whose on-hand quantity is at or below a threshold
    pub async fn get_low_stock_items(&self, threshold: i64) -> AppResult<Vec<LowStockItem>> {
        let items = sqlx::query_as::<_, LowStockItem>(
            r#"
            SELECT
                i.id as item_id,
                i.name as item_name,
                i.sku,
                COALESCE(SUM(sm.quantity_delta), 0) as on_hand
            FROM items i
            LEFT JOIN stock_movements sm ON sm.item_id = i.id
            GROUP BY i.id, i.name, i.sku
            HAVING COALESCE(SUM(sm.quantity_delta), 0) <= $1
            ORDER BY on_hand ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record).map_err(|e| {
                crate::error::AppError::Internal(format!("CSV serialization error: {}", e))
            })?;
        }
        let csv_data = String::from_utf8(wtr.into_inner().map_err(|e| {
            crate::error::AppError::Internal(format!("CSV writer error: {}", e))
        })?)
        .map_err(|e| crate::error::AppError::Internal(format!("UTF-8 conversion error: {}", e)))?;
        Ok(csv_data)
    }
}

/// Flat CSV row for the financial summary export
#[derive(Debug, Serialize)]
pub struct FinancialSummaryRow {
    pub bucket: &'static str,
    pub quantity: i64,
    pub value: Decimal,
}

impl FinancialSummaryRow {
    /// Flatten a financial summary into exportable rows
    pub fn from_summary(summary: &crate::services::valuation::FinancialSummary) -> Vec<Self> {
        let row = |bucket, total: &crate::services::valuation::BucketTotal| Self {
            bucket,
            quantity: total.quantity,
            value: total.value,
        };
        vec![
            row("opening", &summary.opening),
            row("purchases", &summary.purchases),
            row("returns_in", &summary.returns_in),
            row("cogs", &summary.cogs),
            row("write_offs", &summary.write_offs),
            row("ending", &summary.ending),
        ]
    }
}
