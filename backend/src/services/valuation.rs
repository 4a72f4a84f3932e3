//! Weighted-average-cost (WAC) inventory valuation engine
//!
//! Replays the immutable stock movement log to reconstruct, for an arbitrary
//! date window and optional supplier filter, opening inventory value,
//! purchases, customer returns, cost of goods sold, write-offs, and ending
//! inventory value.
//!
//! The replay is a pure, synchronous fold over ordered events: per-item cost
//! state is rebuilt from scratch on every invocation and discarded afterwards,
//! so concurrent report requests are fully independent. Intermediate cost
//! arithmetic is kept at 4 decimal places; monetary totals are rounded to
//! 2 decimal places only in the final summary.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::stock_history::{ReasonCode, StockHistoryService, StockMovement};
use crate::validation::validate_date_window;

/// Decimal places carried through intermediate cost arithmetic
const COST_PRECISION: u32 = 4;

/// Decimal places of the final monetary totals
const MONEY_PRECISION: u32 = 2;

fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_PRECISION, RoundingStrategy::MidpointAwayFromZero)
}

/// Accounting categories a stock movement can be booked under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementCategory {
    Purchase,
    ReturnsIn,
    WriteOff,
    ReturnToSupplier,
    Cogs,
}

/// Classify a movement into exactly one accounting category.
///
/// The rules are fixed: customer returns re-enter stock, scrap-like reasons
/// are write-offs, supplier returns reverse purchases, priced inbounds and
/// initial stock are purchases, and everything else defaults to COGS.
pub fn classify_movement(
    reason: ReasonCode,
    quantity_delta: i64,
    unit_price: Option<Decimal>,
) -> MovementCategory {
    match reason {
        ReasonCode::ReturnedByCustomer => MovementCategory::ReturnsIn,
        ReasonCode::Scrapped
        | ReasonCode::Destroyed
        | ReasonCode::Damaged
        | ReasonCode::Expired
        | ReasonCode::Lost => MovementCategory::WriteOff,
        ReasonCode::ReturnedToSupplier => MovementCategory::ReturnToSupplier,
        ReasonCode::InitialStock => MovementCategory::Purchase,
        _ if quantity_delta > 0 && unit_price.is_some() => MovementCategory::Purchase,
        _ => MovementCategory::Cogs,
    }
}

/// Per-item running cost state during replay
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ItemCostState {
    /// On-hand quantity, clamped at zero
    pub quantity: i64,
    /// Weighted average unit cost, 4 decimal places
    pub unit_cost: Decimal,
}

/// Result of issuing stock out of an item's cost state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssueOutcome {
    /// Quantity actually issued, after clamping at on-hand stock
    pub quantity: i64,
    /// Cost of the issued quantity at the item's weighted average cost
    pub cost: Decimal,
    /// True when the requested quantity exceeded on-hand stock
    pub clamped: bool,
}

impl ItemCostState {
    /// Blend an inbound quantity into the weighted average cost.
    pub fn apply_inbound(&mut self, quantity: i64, unit_cost: Decimal) {
        let new_quantity = self.quantity + quantity;
        if new_quantity == 0 {
            self.quantity = 0;
            self.unit_cost = Decimal::ZERO;
            return;
        }

        let current_value = Decimal::from(self.quantity) * self.unit_cost;
        let incoming_value = Decimal::from(quantity) * unit_cost;
        self.unit_cost = round_cost((current_value + incoming_value) / Decimal::from(new_quantity));
        self.quantity = new_quantity;
    }

    /// Issue stock at the current weighted average cost.
    ///
    /// The weighted average never moves on an issue; only new inbound cost
    /// can. An over-issue clamps at on-hand quantity instead of going
    /// negative and is reported back as a data-quality signal. Only the
    /// clamped quantity is costed: charging more than ever entered stock
    /// would put the books permanently out of balance.
    pub fn issue(&mut self, quantity: i64) -> IssueOutcome {
        let clamped = quantity > self.quantity;
        let effective = quantity.min(self.quantity);
        let cost = round_cost(Decimal::from(effective) * self.unit_cost);
        self.quantity -= effective;
        IssueOutcome {
            quantity: effective,
            cost,
            clamped,
        }
    }
}

/// One accumulator of the financial summary: quantity plus monetary value
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketTotal {
    pub quantity: i64,
    pub value: Decimal,
}

impl BucketTotal {
    fn add(&mut self, quantity: i64, value: Decimal) {
        self.quantity += quantity;
        self.value += value;
    }

    fn subtract(&mut self, quantity: i64, value: Decimal) {
        self.quantity -= quantity;
        self.value -= value;
    }
}

/// Running totals accumulated during replay
#[derive(Debug, Clone, Default)]
struct FinancialBuckets {
    opening: BucketTotal,
    purchases: BucketTotal,
    returns_in: BucketTotal,
    cogs: BucketTotal,
    write_offs: BucketTotal,
    ending: BucketTotal,
    clamped_issues: u64,
    unpriced_inbounds: u64,
    /// Upper bound on the identity drift that 4-dp rounding alone can have
    /// introduced so far. Each average-cost blend can move the tracked value
    /// by up to half of the last kept digit times the new on-hand quantity;
    /// each bucket write by up to half of the last kept digit.
    rounding_allowance: Decimal,
}

impl FinancialBuckets {
    fn allow_blend_rounding(&mut self, new_quantity: i64) {
        self.rounding_allowance +=
            Decimal::new(5, 5) * (Decimal::from(new_quantity) + Decimal::ONE);
    }

    fn allow_issue_rounding(&mut self) {
        self.rounding_allowance += Decimal::new(5, 5);
    }
}

/// Financial summary for a date window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSummary {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub supplier_id: Option<Uuid>,
    pub opening: BucketTotal,
    pub purchases: BucketTotal,
    pub returns_in: BucketTotal,
    pub cogs: BucketTotal,
    pub write_offs: BucketTotal,
    pub ending: BucketTotal,
    /// Outbound movements that exceeded tracked on-hand stock (clamped to zero)
    pub clamped_issues: u64,
    /// Inbound movements valued at zero for lack of any cost history
    pub unpriced_inbounds: u64,
}

/// Split a full movement history into pre-window and in-window slices.
///
/// The window is inclusive on both bounds: a movement exactly at the start or
/// end timestamp belongs to the period, not to opening inventory. Movements
/// after the window are dropped entirely.
pub fn partition_window(
    movements: Vec<StockMovement>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> (Vec<StockMovement>, Vec<StockMovement>) {
    let mut before = Vec::new();
    let mut within = Vec::new();
    for movement in movements {
        if movement.changed_at < window_start {
            before.push(movement);
        } else if movement.changed_at <= window_end {
            within.push(movement);
        }
    }
    (before, within)
}

/// Resolve the unit cost for an inbound movement: explicit price snapshot
/// first, then the item's current weighted average, else zero.
fn resolve_inbound_cost(
    state: &ItemCostState,
    movement: &StockMovement,
    buckets: &mut FinancialBuckets,
) -> Decimal {
    match movement.unit_price_at_change {
        Some(price) => price,
        None => {
            if state.quantity == 0 && state.unit_cost.is_zero() {
                // First-ever inbound with no price snapshot: valued at zero.
                // Legal but a likely upstream data gap, so it is surfaced.
                buckets.unpriced_inbounds += 1;
                tracing::warn!(
                    item_id = %movement.item_id,
                    movement_id = %movement.id,
                    "inbound movement has no price and no cost history; valued at zero"
                );
            }
            state.unit_cost
        }
    }
}

/// Phase 1: replay a pre-window movement into item cost state only.
///
/// Costs computed here never reach a bucket; only the terminal state matters.
fn apply_opening_movement(
    states: &mut HashMap<Uuid, ItemCostState>,
    buckets: &mut FinancialBuckets,
    movement: &StockMovement,
) {
    if movement.quantity_delta == 0 {
        return;
    }

    let mut state = states.remove(&movement.item_id).unwrap_or_default();
    if movement.quantity_delta > 0 {
        let unit_cost = resolve_inbound_cost(&state, movement, buckets);
        state.apply_inbound(movement.quantity_delta, unit_cost);
    } else {
        let outcome = state.issue(-movement.quantity_delta);
        if outcome.clamped {
            buckets.clamped_issues += 1;
            tracing::warn!(
                item_id = %movement.item_id,
                movement_id = %movement.id,
                reason = movement.reason.as_str(),
                "outbound movement exceeds on-hand quantity; clamped to zero"
            );
        }
    }
    states.insert(movement.item_id, state);
}

/// Phase 2: replay an in-window movement into cost state and buckets.
fn apply_window_movement(
    states: &mut HashMap<Uuid, ItemCostState>,
    buckets: &mut FinancialBuckets,
    movement: &StockMovement,
) {
    // Pure price-change events are audit markers; they move no stock and
    // touch no bucket.
    if movement.quantity_delta == 0 {
        return;
    }

    let category = classify_movement(
        movement.reason,
        movement.quantity_delta,
        movement.unit_price_at_change,
    );
    let mut state = states.remove(&movement.item_id).unwrap_or_default();

    if movement.quantity_delta > 0 {
        let quantity = movement.quantity_delta;
        match category {
            MovementCategory::ReturnsIn => {
                // Customer returns re-enter stock at the existing weighted
                // average, not at any price carried on the event.
                let unit_cost = state.unit_cost;
                let value = round_cost(Decimal::from(quantity) * unit_cost);
                buckets.returns_in.add(quantity, value);
                state.apply_inbound(quantity, unit_cost);
                buckets.allow_blend_rounding(state.quantity);
            }
            _ => {
                // Purchases, and any other inbound treated as a
                // purchase-equivalent stock increase.
                let unit_cost = resolve_inbound_cost(&state, movement, buckets);
                let value = round_cost(Decimal::from(quantity) * unit_cost);
                buckets.purchases.add(quantity, value);
                state.apply_inbound(quantity, unit_cost);
                buckets.allow_blend_rounding(state.quantity);
            }
        }
    } else {
        let quantity = -movement.quantity_delta;
        let outcome = state.issue(quantity);
        if outcome.clamped {
            buckets.clamped_issues += 1;
            tracing::warn!(
                item_id = %movement.item_id,
                movement_id = %movement.id,
                reason = movement.reason.as_str(),
                "outbound movement exceeds on-hand quantity; clamped to zero"
            );
        }
        buckets.allow_issue_rounding();
        match category {
            // Supplier returns reverse purchases rather than booking COGS
            MovementCategory::ReturnToSupplier => {
                buckets.purchases.subtract(outcome.quantity, outcome.cost)
            }
            MovementCategory::WriteOff => buckets.write_offs.add(outcome.quantity, outcome.cost),
            _ => buckets.cogs.add(outcome.quantity, outcome.cost),
        }
    }

    states.insert(movement.item_id, state);
}

/// Sum every item's `quantity x wac` into a bucket total.
fn snapshot_inventory(states: &HashMap<Uuid, ItemCostState>) -> BucketTotal {
    let mut total = BucketTotal::default();
    for state in states.values() {
        total.add(
            state.quantity,
            round_cost(Decimal::from(state.quantity) * state.unit_cost),
        );
    }
    total
}

/// Replay a movement history into a financial summary.
///
/// `opening_events` must hold every movement before the window and
/// `window_events` every movement inside it (both bounds inclusive), for the
/// filtered supplier scope. Slices are re-sorted by `(changed_at, id)` before
/// replay, so out-of-order delivery from the source is tolerated.
///
/// Fails with an invariant violation if the accounting identity
/// `opening + purchases + returns_in - cogs - write_offs = ending` does not
/// hold within rounding tolerance; no partial result is ever returned.
pub fn compute_financial_summary(
    mut opening_events: Vec<StockMovement>,
    mut window_events: Vec<StockMovement>,
    window_start: NaiveDate,
    window_end: NaiveDate,
    supplier_id: Option<Uuid>,
) -> AppResult<FinancialSummary> {
    opening_events.sort_by_key(|m| (m.changed_at, m.id));
    window_events.sort_by_key(|m| (m.changed_at, m.id));

    let mut states: HashMap<Uuid, ItemCostState> = HashMap::new();
    let mut buckets = FinancialBuckets::default();

    // Phase 1: opening inventory
    for movement in &opening_events {
        apply_opening_movement(&mut states, &mut buckets, movement);
    }
    buckets.opening = snapshot_inventory(&states);

    // Phase 2: in-period aggregation
    for movement in &window_events {
        apply_window_movement(&mut states, &mut buckets, movement);
    }

    // Phase 3: ending inventory
    buckets.ending = snapshot_inventory(&states);

    // The balance equation must close before anything is returned. Per-event
    // rounding earns a bounded allowance (a few cents per item on realistic
    // histories, scaling with event volume); anything beyond that is a
    // replay defect.
    let balance = buckets.opening.value + buckets.purchases.value + buckets.returns_in.value
        - buckets.cogs.value
        - buckets.write_offs.value;
    let drift = (balance - buckets.ending.value).abs();
    let tolerance = Decimal::new(1, 2) * Decimal::from(states.len().max(1) as u64)
        + buckets.rounding_allowance;
    if drift > tolerance {
        return Err(AppError::InvariantViolation(format!(
            "financial summary out of balance: opening + inflows - outflows = {} but ending = {} (drift {}, tolerance {})",
            balance, buckets.ending.value, drift, tolerance
        )));
    }

    let round_bucket = |bucket: BucketTotal| BucketTotal {
        quantity: bucket.quantity,
        value: round_money(bucket.value),
    };

    Ok(FinancialSummary {
        window_start,
        window_end,
        supplier_id,
        opening: round_bucket(buckets.opening),
        purchases: round_bucket(buckets.purchases),
        returns_in: round_bucket(buckets.returns_in),
        cogs: round_bucket(buckets.cogs),
        write_offs: round_bucket(buckets.write_offs),
        ending: round_bucket(buckets.ending),
        clamped_issues: buckets.clamped_issues,
        unpriced_inbounds: buckets.unpriced_inbounds,
    })
}

/// Valuation service: fetches the movement slices and runs the replay
#[derive(Clone)]
pub struct ValuationService {
    db: PgPool,
}

impl ValuationService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Compute the financial summary for an inclusive date window and
    /// optional supplier filter.
    pub async fn financial_summary(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        supplier_id: Option<Uuid>,
    ) -> AppResult<FinancialSummary> {
        let (start, end) =
            validate_date_window(start_date, end_date).map_err(|msg| AppError::Validation {
                field: "date_window".to_string(),
                message: msg.to_string(),
            })?;

        let window_start = start.and_time(NaiveTime::MIN).and_utc();
        let window_end = end
            .and_hms_micro_opt(23, 59, 59, 999_999)
            .unwrap_or_else(|| end.and_time(NaiveTime::MIN))
            .and_utc();

        let history = StockHistoryService::new(self.db.clone());
        let opening_events = history.movements_before(window_start, supplier_id).await?;
        let window_events = history
            .movements_between(window_start, window_end, supplier_id)
            .await?;

        tracing::debug!(
            %window_start,
            %window_end,
            opening_events = opening_events.len(),
            window_events = window_events.len(),
            "replaying stock movements for financial summary"
        );

        compute_financial_summary(opening_events, window_events, start, end, supplier_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn classifier_routes_customer_returns() {
        let category = classify_movement(ReasonCode::ReturnedByCustomer, 10, Some(dec("9.99")));
        assert_eq!(category, MovementCategory::ReturnsIn);
    }

    #[test]
    fn classifier_routes_write_off_reasons() {
        for reason in [
            ReasonCode::Scrapped,
            ReasonCode::Destroyed,
            ReasonCode::Damaged,
            ReasonCode::Expired,
            ReasonCode::Lost,
        ] {
            assert_eq!(
                classify_movement(reason, -5, None),
                MovementCategory::WriteOff
            );
        }
    }

    #[test]
    fn classifier_routes_supplier_returns() {
        assert_eq!(
            classify_movement(ReasonCode::ReturnedToSupplier, -5, None),
            MovementCategory::ReturnToSupplier
        );
    }

    #[test]
    fn classifier_initial_stock_is_purchase_with_or_without_price() {
        assert_eq!(
            classify_movement(ReasonCode::InitialStock, 100, Some(dec("10.00"))),
            MovementCategory::Purchase
        );
        assert_eq!(
            classify_movement(ReasonCode::InitialStock, 100, None),
            MovementCategory::Purchase
        );
    }

    #[test]
    fn classifier_priced_inbound_is_purchase() {
        assert_eq!(
            classify_movement(ReasonCode::ManualUpdate, 50, Some(dec("12.00"))),
            MovementCategory::Purchase
        );
    }

    #[test]
    fn classifier_defaults_to_cogs() {
        assert_eq!(
            classify_movement(ReasonCode::Sold, -30, None),
            MovementCategory::Cogs
        );
        assert_eq!(
            classify_movement(ReasonCode::ManualUpdate, -10, None),
            MovementCategory::Cogs
        );
    }

    #[test]
    fn inbound_blends_weighted_average() {
        let mut state = ItemCostState {
            quantity: 100,
            unit_cost: dec("10.00"),
        };
        state.apply_inbound(50, dec("12.00"));

        // (100 x 10 + 50 x 12) / 150 = 10.666..., half-up to 4 places
        assert_eq!(state.quantity, 150);
        assert_eq!(state.unit_cost, dec("10.6667"));
    }

    #[test]
    fn issue_costs_at_current_average_and_keeps_it() {
        let mut state = ItemCostState {
            quantity: 150,
            unit_cost: dec("10.6667"),
        };
        let outcome = state.issue(50);

        assert_eq!(outcome.cost, dec("533.335"));
        assert_eq!(outcome.quantity, 50);
        assert!(!outcome.clamped);
        assert_eq!(state.quantity, 100);
        assert_eq!(state.unit_cost, dec("10.6667"));
    }

    #[test]
    fn repeated_issues_never_move_the_average() {
        let mut state = ItemCostState {
            quantity: 100,
            unit_cost: dec("7.1234"),
        };
        for _ in 0..10 {
            state.issue(5);
            assert_eq!(state.unit_cost, dec("7.1234"));
        }
        assert_eq!(state.quantity, 50);
    }

    #[test]
    fn over_issue_clamps_quantity_at_zero() {
        let mut state = ItemCostState {
            quantity: 10,
            unit_cost: dec("4.00"),
        };
        let outcome = state.issue(25);

        assert!(outcome.clamped);
        assert_eq!(state.quantity, 0);
        // Only what was actually on hand gets costed
        assert_eq!(outcome.quantity, 10);
        assert_eq!(outcome.cost, dec("40.00"));
    }

    #[test]
    fn inbound_to_zero_quantity_resets_average() {
        let mut state = ItemCostState::default();
        state.apply_inbound(0, dec("5.00"));
        assert_eq!(state.quantity, 0);
        assert_eq!(state.unit_cost, Decimal::ZERO);
    }

    #[test]
    fn unpriced_inbound_without_history_is_valued_at_zero() {
        let mut states = HashMap::new();
        let mut buckets = FinancialBuckets::default();
        let movement = movement(ReasonCode::InitialStock, 40, None, 0);

        apply_window_movement(&mut states, &mut buckets, &movement);

        let state = states[&movement.item_id];
        assert_eq!(state.quantity, 40);
        assert_eq!(state.unit_cost, Decimal::ZERO);
        assert_eq!(buckets.purchases.value, Decimal::ZERO);
        assert_eq!(buckets.unpriced_inbounds, 1);
    }

    #[test]
    fn price_change_events_are_neutral() {
        let mut states = HashMap::new();
        let mut buckets = FinancialBuckets::default();

        let inbound = movement(ReasonCode::InitialStock, 100, Some(dec("10.00")), 0);
        apply_window_movement(&mut states, &mut buckets, &inbound);
        let before = states[&inbound.item_id];

        let mut price_change = movement(ReasonCode::PriceChange, 0, Some(dec("99.00")), 1);
        price_change.item_id = inbound.item_id;
        apply_window_movement(&mut states, &mut buckets, &price_change);

        assert_eq!(states[&inbound.item_id], before);
        assert_eq!(buckets.cogs, BucketTotal::default());
        assert_eq!(buckets.write_offs, BucketTotal::default());
    }

    #[test]
    fn customer_return_re_enters_at_current_average() {
        let mut states = HashMap::new();
        let mut buckets = FinancialBuckets::default();

        let inbound = movement(ReasonCode::InitialStock, 100, Some(dec("10.00")), 0);
        apply_window_movement(&mut states, &mut buckets, &inbound);

        // Price on the return event must be ignored in favor of the WAC
        let mut ret = movement(ReasonCode::ReturnedByCustomer, 10, Some(dec("95.00")), 1);
        ret.item_id = inbound.item_id;
        apply_window_movement(&mut states, &mut buckets, &ret);

        assert_eq!(buckets.returns_in.quantity, 10);
        assert_eq!(buckets.returns_in.value, dec("100.00"));
        assert_eq!(states[&inbound.item_id].unit_cost, dec("10.00"));
        assert_eq!(states[&inbound.item_id].quantity, 110);
    }

    #[test]
    fn supplier_return_reverses_purchases() {
        let mut states = HashMap::new();
        let mut buckets = FinancialBuckets::default();

        let inbound = movement(ReasonCode::InitialStock, 100, Some(dec("10.00")), 0);
        apply_window_movement(&mut states, &mut buckets, &inbound);

        let mut ret = movement(ReasonCode::ReturnedToSupplier, -20, None, 1);
        ret.item_id = inbound.item_id;
        apply_window_movement(&mut states, &mut buckets, &ret);

        assert_eq!(buckets.purchases.quantity, 80);
        assert_eq!(buckets.purchases.value, dec("800.00"));
        assert_eq!(buckets.cogs, BucketTotal::default());
        assert_eq!(states[&inbound.item_id].quantity, 80);
    }

    fn movement(
        reason: ReasonCode,
        quantity_delta: i64,
        unit_price: Option<Decimal>,
        minute: u32,
    ) -> StockMovement {
        let changed_at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
            .and_utc();
        StockMovement {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            supplier_id: None,
            quantity_delta,
            reason,
            unit_price_at_change: unit_price,
            changed_at,
            notes: None,
            created_at: changed_at,
        }
    }
}
