use rust_decimal::Decimal;

use crate::domain::errors::SimulationError;
use crate::domain::market::candle::Candle;
use crate::domain::trading::fee_model::FeeModel;
use crate::domain::trading::order::{Order, OrderBook, OrderFlag, OrderSide, OrderType};
use crate::domain::trading::position::{CompletedTrade, MarginMode, Position};

/// Outcome of running one real (or forming) candle through the matching
/// engine: the orders that executed and the completed trade, if any,
/// produced by a closing fill or a liquidation.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub filled_orders: Vec<Order>,
    pub completed_trades: Vec<CompletedTrade>,
    pub liquidated: bool,
}

/// Per-route matching: converts intra-candle price movement into order
/// executions, partial-candle carry-over, and position updates.
pub struct MatchingEngine;

impl MatchingEngine {
    /// Runs `real_candle` against `book`'s pending (limit/stop) active
    /// orders for one route, applying fills to `position` in insertion
    /// order until no further order intersects the remaining candle
    /// range, then checks for liquidation.
    ///
    /// Mirrors the spec's split-candle loop: each fill narrows the
    /// "remaining" candle to begin at the fill price before the next scan,
    /// so a single real candle may execute multiple stacked orders. Market
    /// orders are never matched here — they carry no trigger price of
    /// their own (`Order::market` sets `price` to zero) and are drained
    /// separately at the tick's observed price by
    /// [`Self::execute_pending_market_orders`] (spec §4.4.3: "Market
    /// orders bypass queued").
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        book: &mut OrderBook,
        position: &mut Option<Position>,
        real_candle: &Candle,
        route_id: &str,
        symbol: &str,
        leverage: Decimal,
        mode: MarginMode,
        fee_model: Option<&dyn FeeModel>,
    ) -> Result<MatchResult, SimulationError> {
        let mut result = MatchResult::default();

        // Each executed order leaves the active set, so re-scanning the
        // same (unchanged) high/low range is exactly the "split the real
        // candle and repeat with what's left" contract: only orders that
        // are still active and still intersect the range can trigger
        // again, which handles stacked orders at the same or different
        // prices without needing to track a shrinking sub-range.
        loop {
            let hit = book
                .active_orders()
                .find(|o| o.order_type != OrderType::Market && o.triggers_within(real_candle.high, real_candle.low))
                .map(|o| (o.id, o.price, o.side, o.quantity, o.flag));

            let Some((id, fill_price, side, quantity, flag)) = hit else {
                break;
            };

            let filled = book
                .execute(id)
                .expect("id came from an active order just scanned");

            if let Some(trade) = Self::settle_fill(
                position,
                side,
                quantity,
                fill_price,
                real_candle.timestamp,
                route_id,
                symbol,
                leverage,
                mode,
                flag,
                fee_model,
            ) {
                result.completed_trades.push(trade);
            }

            result.filled_orders.push(filled);
        }

        if let Some(pos) = position.as_ref()
            && pos.mode == MarginMode::Isolated
            && pos.is_liquidated_within(real_candle.high, real_candle.low)
        {
            let pos = position.take().expect("checked Some above");
            let pnl = match pos.side() {
                OrderSide::Buy => (pos.bankruptcy_price - pos.entry_price) * pos.abs_quantity(),
                OrderSide::Sell => (pos.entry_price - pos.bankruptcy_price) * pos.abs_quantity(),
            };
            let fees = fee_model
                .map(|m| m.calculate_cost(pos.abs_quantity(), pos.bankruptcy_price, pos.side()).total_impact)
                .unwrap_or(Decimal::ZERO);
            let trade = CompletedTrade {
                route_id: route_id.to_string(),
                symbol: symbol.to_string(),
                side: pos.side(),
                quantity: pos.abs_quantity(),
                entry_price: pos.entry_price,
                exit_price: pos.bankruptcy_price,
                entry_timestamp: pos.opened_at,
                exit_timestamp: real_candle.timestamp,
                pnl,
                fees,
                liquidation: true,
            };
            result.filled_orders.push(
                Order::market(symbol, pos.side().opposite(), pos.abs_quantity(), real_candle.timestamp)
                    .with_flag(OrderFlag::ReduceOnly),
            );
            result.completed_trades.push(trade);
            result.liquidated = true;
        }

        Ok(result)
    }

    /// Drains every active market order in `book` at `price`, the tick's
    /// observed price, rather than the split-candle loop in [`Self::apply`]
    /// (spec §4.3 step 6 "Execute any queued market orders", §4.4.3
    /// "Market orders bypass queued ... drained by
    /// execute_pending_market_orders() at the end of each tick").
    #[allow(clippy::too_many_arguments)]
    pub fn execute_pending_market_orders(
        book: &mut OrderBook,
        position: &mut Option<Position>,
        price: Decimal,
        timestamp: i64,
        route_id: &str,
        symbol: &str,
        leverage: Decimal,
        mode: MarginMode,
        fee_model: Option<&dyn FeeModel>,
    ) -> MatchResult {
        let mut result = MatchResult::default();

        loop {
            let hit = book
                .active_orders()
                .find(|o| o.order_type == OrderType::Market)
                .map(|o| (o.id, o.side, o.quantity, o.flag));

            let Some((id, side, quantity, flag)) = hit else {
                break;
            };

            let filled = book
                .execute(id)
                .expect("id came from an active order just scanned");

            if let Some(trade) = Self::settle_fill(
                position, side, quantity, price, timestamp, route_id, symbol, leverage, mode, flag, fee_model,
            ) {
                result.completed_trades.push(trade);
            }
            result.filled_orders.push(filled);
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn settle_fill(
        position: &mut Option<Position>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        timestamp: i64,
        route_id: &str,
        symbol: &str,
        leverage: Decimal,
        mode: MarginMode,
        flag: OrderFlag,
        fee_model: Option<&dyn FeeModel>,
    ) -> Option<CompletedTrade> {
        match position.as_mut() {
            None => {
                if matches!(flag, OrderFlag::ReduceOnly) {
                    return None;
                }
                *position = Some(Position::open(symbol, side, quantity, price, leverage, mode, timestamp));
                None
            }
            Some(pos) => {
                let same_direction = (side == OrderSide::Buy) == pos.is_long();
                if same_direction {
                    pos.apply_fill(side, quantity, price);
                    None
                } else {
                    let closing_qty = quantity.min(pos.abs_quantity());
                    let pnl = match pos.side() {
                        OrderSide::Buy => (price - pos.entry_price) * closing_qty,
                        OrderSide::Sell => (pos.entry_price - price) * closing_qty,
                    };
                    let fees = fee_model
                        .map(|m| m.calculate_cost(closing_qty, price, pos.side()).total_impact)
                        .unwrap_or(Decimal::ZERO);
                    let trade = CompletedTrade {
                        route_id: route_id.to_string(),
                        symbol: symbol.to_string(),
                        side: pos.side(),
                        quantity: closing_qty,
                        entry_price: pos.entry_price,
                        exit_price: price,
                        entry_timestamp: pos.opened_at,
                        exit_timestamp: timestamp,
                        pnl,
                        fees,
                        liquidation: false,
                    };
                    pos.apply_fill(side, quantity, price);
                    if pos.quantity.is_zero() {
                        *position = None;
                    }
                    Some(trade)
                }
            }
        }
    }

    /// Probes whether `skip` upcoming one-minute candles may be safely
    /// aggregated into one forming candle without losing per-minute
    /// execution fidelity: counts, per order book, how many active orders
    /// have a price inside the aggregated window's `[low, high]`. More
    /// than one such order makes the execution order within the window
    /// ambiguous, so the caller should halve `skip` and retry.
    pub fn is_skip_safe(orders: &[&Order], window_high: Decimal, window_low: Decimal) -> bool {
        let touched = orders
            .iter()
            .filter(|o| o.price_in_range(window_high, window_low))
            .count();
        touched < 2
    }
}
