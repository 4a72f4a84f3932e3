//! Validation utilities for the StockBook inventory platform

use chrono::NaiveDate;
use rust_decimal::Decimal;

// ============================================================================
// Date Window Validations
// ============================================================================

/// Validate a reporting date window: both bounds required, start not after end
pub fn validate_date_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate), &'static str> {
    let start = start.ok_or("start_date is required")?;
    let end = end.ok_or("end_date is required")?;
    if start > end {
        return Err("start_date must not be after end_date");
    }
    Ok((start, end))
}

// ============================================================================
// Stock Movement Validations
// ============================================================================

/// Validate a unit price snapshot (must be non-negative when present)
pub fn validate_unit_price(price: Option<Decimal>) -> Result<(), &'static str> {
    if let Some(p) = price {
        if p < Decimal::ZERO {
            return Err("Unit price cannot be negative");
        }
    }
    Ok(())
}

/// Validate a movement quantity delta against its reason semantics.
///
/// A zero delta is only meaningful for pure price-change events; every other
/// reason must actually move stock.
pub fn validate_quantity_delta(delta: i64, is_price_change: bool) -> Result<(), &'static str> {
    if delta == 0 && !is_price_change {
        return Err("Quantity delta must be non-zero for stock-moving reasons");
    }
    if delta != 0 && is_price_change {
        return Err("Price-change events must not move stock");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_requires_both_bounds() {
        assert!(validate_date_window(None, Some(date(2024, 1, 31))).is_err());
        assert!(validate_date_window(Some(date(2024, 1, 1)), None).is_err());
        assert!(validate_date_window(None, None).is_err());
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        let result = validate_date_window(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)));
        assert!(result.is_err());
    }

    #[test]
    fn window_accepts_single_day() {
        let result = validate_date_window(Some(date(2024, 1, 15)), Some(date(2024, 1, 15)));
        assert_eq!(result.unwrap(), (date(2024, 1, 15), date(2024, 1, 15)));
    }

    #[test]
    fn negative_unit_price_rejected() {
        assert!(validate_unit_price(Some(Decimal::from_str("-0.01").unwrap())).is_err());
        assert!(validate_unit_price(Some(Decimal::ZERO)).is_ok());
        assert!(validate_unit_price(None).is_ok());
    }

    #[test]
    fn zero_delta_only_for_price_change() {
        assert!(validate_quantity_delta(0, true).is_ok());
        assert!(validate_quantity_delta(0, false).is_err());
        assert!(validate_quantity_delta(5, false).is_ok());
        assert!(validate_quantity_delta(-5, false).is_ok());
        assert!(validate_quantity_delta(5, true).is_err());
    }
}
