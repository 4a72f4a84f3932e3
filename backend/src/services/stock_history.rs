//! Stock movement history service
//!
//! Owns the append-only `stock_movements` event log: recording new movements
//! and retrieving ordered slices of history for valuation and auditing.
//! Movements are immutable once recorded; there is no update or delete path.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::validation::{validate_quantity_delta, validate_unit_price};

/// Service for the append-only stock movement log
#[derive(Clone)]
pub struct StockHistoryService {
    db: PgPool,
}

/// Reason codes for stock movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    InitialStock,
    ManualUpdate,
    Sold,
    Scrapped,
    Destroyed,
    Damaged,
    Expired,
    Lost,
    ReturnedToSupplier,
    ReturnedByCustomer,
    PriceChange,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InitialStock => "initial_stock",
            ReasonCode::ManualUpdate => "manual_update",
            ReasonCode::Sold => "sold",
            ReasonCode::Scrapped => "scrapped",
            ReasonCode::Destroyed => "destroyed",
            ReasonCode::Damaged => "damaged",
            ReasonCode::Expired => "expired",
            ReasonCode::Lost => "lost",
            ReasonCode::ReturnedToSupplier => "returned_to_supplier",
            ReasonCode::ReturnedByCustomer => "returned_by_customer",
            ReasonCode::PriceChange => "price_change",
        }
    }
}

/// Stock movement record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub quantity_delta: i64,
    pub reason: ReasonCode,
    pub unit_price_at_change: Option<Decimal>,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a stock movement
#[derive(Debug, Deserialize)]
pub struct RecordMovementInput {
    pub item_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub quantity_delta: i64,
    pub reason: ReasonCode,
    pub unit_price_at_change: Option<Decimal>,
    pub changed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl StockHistoryService {
    /// Create a new StockHistoryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a stock movement
    pub async fn record_movement(&self, input: RecordMovementInput) -> AppResult<StockMovement> {
        let is_price_change = input.reason == ReasonCode::PriceChange;

        validate_quantity_delta(input.quantity_delta, is_price_change).map_err(|msg| {
            AppError::Validation {
                field: "quantity_delta".to_string(),
                message: msg.to_string(),
            }
        })?;

        validate_unit_price(input.unit_price_at_change).map_err(|msg| AppError::Validation {
            field: "unit_price_at_change".to_string(),
            message: msg.to_string(),
        })?;

        if is_price_change && input.unit_price_at_change.is_none() {
            return Err(AppError::Validation {
                field: "unit_price_at_change".to_string(),
                message: "Price-change events require a unit price snapshot".to_string(),
            });
        }

        // Validate item exists
        let item_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(input.item_id)
                .fetch_one(&self.db)
                .await?;

        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        let changed_at = input.changed_at.unwrap_or_else(Utc::now);

        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (
                item_id, supplier_id, quantity_delta, reason,
                unit_price_at_change, changed_at, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, item_id, supplier_id, quantity_delta, reason,
                      unit_price_at_change, changed_at, notes, created_at
            "#,
        )
        .bind(input.item_id)
        .bind(input.supplier_id)
        .bind(input.quantity_delta)
        .bind(input.reason)
        .bind(input.unit_price_at_change)
        .bind(changed_at)
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await?;

        Ok(movement)
    }

    /// Get all movements strictly before a cutoff, oldest first.
    ///
    /// This is the opening-inventory slice for valuation replay.
    pub async fn movements_before(
        &self,
        cutoff: DateTime<Utc>,
        supplier_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, item_id, supplier_id, quantity_delta, reason,
                   unit_price_at_change, changed_at, notes, created_at
            FROM stock_movements
            WHERE changed_at < $1
              AND ($2::uuid IS NULL OR supplier_id = $2)
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(cutoff)
        .bind(supplier_id)
        .fetch_all(&self.db)
        .await?;

        Ok(movements)
    }

    /// Get all movements within an inclusive window, oldest first.
    ///
    /// This is the in-period slice for valuation replay.
    pub async fn movements_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        supplier_id: Option<Uuid>,
    ) -> AppResult<Vec<StockMovement>> {
        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, item_id, supplier_id, quantity_delta, reason,
                   unit_price_at_change, changed_at, notes, created_at
            FROM stock_movements
            WHERE changed_at >= $1 AND changed_at <= $2
              AND ($3::uuid IS NULL OR supplier_id = $3)
            ORDER BY changed_at ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(supplier_id)
        .fetch_all(&self.db)
        .await?;

        Ok(movements)
    }

    /// Get movement history for an item, newest first
    pub async fn list_for_item(
        &self,
        item_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<StockMovement>> {
        let item_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
                .bind(item_id)
                .fetch_one(&self.db)
                .await?;

        if !item_exists {
            return Err(AppError::NotFound("Item".to_string()));
        }

        let movements = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, item_id, supplier_id, quantity_delta, reason,
                   unit_price_at_change, changed_at, notes, created_at
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY changed_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(item_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(movements)
    }
}
