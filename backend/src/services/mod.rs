//! Business logic services for the StockBook inventory platform

pub mod reporting;
pub mod stock_history;
pub mod valuation;

pub use reporting::ReportingService;
pub use stock_history::StockHistoryService;
pub use valuation::ValuationService;
