//! HTTP handlers for the StockBook inventory platform

pub mod health;
pub mod movement;
pub mod reporting;

pub use health::health_check;
pub use movement::{get_item_movements, record_movement};
pub use reporting::{get_financial_summary, get_low_stock_items, get_stock_by_supplier};
