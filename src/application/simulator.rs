use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::application::market_data::candle_aggregator;
use crate::application::matching_engine::MatchingEngine;
use crate::application::session::Session;
use crate::application::strategy::{Strategy, StrategyContext};
use crate::domain::errors::SimulationError;
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::route::{min_timeframe_skip, Route};
use crate::domain::market::timeframe::Timeframe;
use crate::domain::trading::fee_model::FeeModel;
use crate::domain::trading::order::{Order, OrderBook};
use crate::domain::trading::position::{CompletedTrade, MarginMode, Position};

/// Result of replaying one or more routes' candle history through the
/// simulator.
#[derive(Debug, Clone, Default)]
pub struct SimulationReport {
    pub completed_trades: Vec<CompletedTrade>,
    /// Per-day aggregate realized P&L, sorted by day-start timestamp (ms).
    pub daily_pnl: Vec<(i64, Decimal)>,
    pub final_balance: Decimal,
    pub liquidation_count: u64,
}

impl SimulationReport {
    pub fn total_trades(&self) -> usize {
        self.completed_trades.len()
    }
}

struct RouteRuntime<'s> {
    route: Route,
    strategy: &'s mut dyn Strategy,
    order_book: OrderBook,
    position: Option<Position>,
    forming: Vec<Candle>,
}

/// Drives simulated time forward one minute at a time for every route
/// sharing an `(exchange, symbol)` candle stream, aggregating into each
/// route's configured timeframe, running the matching engine on every
/// price move, and invoking the strategy at timeframe boundaries.
///
/// Multiple `(exchange, symbol)` streams are each driven independently
/// (there is no cross-symbol order interaction) and their results merged;
/// see [`Simulator::run`].
pub struct Simulator {
    session: Session,
    leverage: Decimal,
    margin_mode: MarginMode,
    fee_model: Option<Arc<dyn FeeModel>>,
}

impl Simulator {
    pub fn new(starting_balance: Decimal, leverage: Decimal, margin_mode: MarginMode) -> Self {
        Self {
            session: Session::new(starting_balance),
            leverage,
            margin_mode,
            fee_model: None,
        }
    }

    /// Charges every closing fill and liquidation through `fee_model`
    /// (spec §6 `--fee`/`--no-fee`); omit to run with zero fees.
    pub fn with_fee_model(mut self, fee_model: Arc<dyn FeeModel>) -> Self {
        self.fee_model = Some(fee_model);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs every route grouped by its `(exchange, symbol)` pair against
    /// the matching candle series in `candles`, merging completed trades
    /// and daily P&L across groups. `hyperparameters` is handed to every
    /// strategy's [`StrategyContext`] unchanged — the adapter (spec §4.5)
    /// does not scope hyperparameters per route, only per optimization
    /// candidate.
    pub fn run(
        &mut self,
        routes: &[Route],
        candles: &HashMap<(String, String), Vec<Candle>>,
        strategies: &mut HashMap<String, Box<dyn Strategy>>,
        hyperparameters: &HashMap<String, f64>,
    ) -> Result<SimulationReport, SimulationError> {
        let mut grouped: HashMap<(String, String), Vec<&Route>> = HashMap::new();
        for route in routes {
            grouped
                .entry((route.exchange.clone(), route.symbol.clone()))
                .or_default()
                .push(route);
        }

        let mut report = SimulationReport {
            final_balance: self.session.current_balance,
            ..Default::default()
        };
        let mut daily_pnl: BTreeMap<i64, Decimal> = BTreeMap::new();

        for ((exchange, symbol), group_routes) in grouped {
            let series = match candles.get(&(exchange.clone(), symbol.clone())) {
                Some(series) if !series.is_empty() => series,
                _ => continue,
            };

            let mut runtimes: Vec<RouteRuntime<'_>> = Vec::with_capacity(group_routes.len());
            for route in group_routes {
                let strategy = strategies
                    .get_mut(&route.strategy_name)
                    .map(|s| s.as_mut())
                    .ok_or_else(|| SimulationError::StrategyFault {
                        strategy: route.strategy_name.clone(),
                        reason: "not registered for this run".into(),
                    })?;
                runtimes.push(RouteRuntime {
                    route: route.clone(),
                    strategy,
                    order_book: OrderBook::default(),
                    position: None,
                    forming: Vec::new(),
                });
            }

            let mut store = CandleStore::default();
            self.run_group(
                &exchange,
                &symbol,
                series,
                &mut runtimes,
                &mut report,
                &mut daily_pnl,
                &mut store,
                hyperparameters,
            )?;

            let last_candle = *series.last().expect("checked non-empty above");
            for runtime in &mut runtimes {
                let route_id = runtime.route.route_id();
                let timeframe = runtime.route.timeframe;
                let mut ctx = StrategyContext {
                    route_id: &route_id,
                    exchange: &exchange,
                    symbol: &symbol,
                    timeframe,
                    candle: &last_candle,
                    position: &runtime.position,
                    order_book: &mut runtime.order_book,
                    hyperparameters,
                    history: &store,
                };
                runtime.strategy.terminate(&mut ctx);
            }
        }

        report.daily_pnl = daily_pnl.into_iter().collect();
        report.final_balance = self.session.current_balance;
        report.liquidation_count = self.session.liquidation_count;
        Ok(report)
    }

    /// Drives one `(exchange, symbol)` stream. Batches up to
    /// `min_timeframe_skip` one-minute candles per tick (spec §4.3 step
    /// 8 / §4.4.2): the batch is halved until at most one active order
    /// per route would be touched by its aggregated `[low, high]`, so a
    /// single `MatchingEngine::apply` call on the whole batch produces
    /// exactly the fills a minute-by-minute walk would have produced.
    #[allow(clippy::too_many_arguments)]
    fn run_group(
        &mut self,
        exchange: &str,
        symbol: &str,
        series: &[Candle],
        runtimes: &mut [RouteRuntime<'_>],
        report: &mut SimulationReport,
        daily_pnl: &mut BTreeMap<i64, Decimal>,
        store: &mut CandleStore,
        hyperparameters: &HashMap<String, f64>,
    ) -> Result<(), SimulationError> {
        let base_skip = min_timeframe_skip(runtimes.iter().map(|r| &r.route)) as usize;
        let mut prev: Option<Candle> = None;
        let mut i = 0usize;

        while i < series.len() {
            self.session
                .check_cancellation()
                .map_err(|_| SimulationError::StrategyFault {
                    strategy: "session".into(),
                    reason: "terminated by cancellation token".into(),
                })?;

            let remaining = series.len() - i;
            let mut skip = base_skip.min(remaining).max(1);
            while skip > 1 {
                let window = &series[i..i + skip];
                let probe = candle_aggregator::generate(window, skip, true)
                    .expect("window is non-empty by construction");
                let all_safe = runtimes.iter().all(|runtime| {
                    let orders: Vec<&Order> = runtime.order_book.active_orders().collect();
                    MatchingEngine::is_skip_safe(&orders, probe.high, probe.low)
                });
                if all_safe {
                    break;
                }
                skip /= 2;
            }

            let mut block: Vec<Candle> = Vec::with_capacity(skip);
            for offset in 0..skip {
                let raw = series[i + offset];
                let candle = match prev {
                    Some(p) => candle_aggregator::fix_jumped(&p, &raw),
                    None => raw,
                };
                store.add(exchange, symbol, Timeframe::ONE_MIN, candle);
                block.push(candle);
                prev = Some(candle);
            }
            let block_candle = candle_aggregator::generate(&block, skip, true)
                .expect("block is non-empty by construction");

            for runtime in runtimes.iter_mut() {
                let route_id = runtime.route.route_id();
                let result = MatchingEngine::apply(
                    &mut runtime.order_book,
                    &mut runtime.position,
                    &block_candle,
                    &route_id,
                    symbol,
                    self.leverage,
                    self.margin_mode,
                    self.fee_model.as_deref(),
                )?;

                if result.liquidated {
                    self.session.record_liquidation();
                }
                for trade in result.completed_trades {
                    let day = Timeframe::ONE_DAY.period_start(trade.exit_timestamp);
                    self.session.current_balance += trade.net_pnl();
                    *daily_pnl.entry(day).or_insert(Decimal::ZERO) += trade.net_pnl();
                    report.completed_trades.push(trade);
                }

                runtime.forming.extend_from_slice(&block);
                let next_index = i + skip;
                let period_rolled_over =
                    next_index == series.len() || runtime.route.timeframe.is_period_start(series[next_index].timestamp);
                if period_rolled_over {
                    if let Some(period_candle) = candle_aggregator::generate(
                        &runtime.forming,
                        runtime.route.timeframe.to_minutes() as usize,
                        true,
                    ) {
                        store.add(exchange, symbol, runtime.route.timeframe, period_candle);
                        let mut ctx = StrategyContext {
                            route_id: &route_id,
                            exchange,
                            symbol,
                            timeframe: runtime.route.timeframe,
                            candle: &period_candle,
                            position: &runtime.position,
                            order_book: &mut runtime.order_book,
                            hyperparameters,
                            history: store,
                        };
                        runtime.strategy.execute(&mut ctx);
                    }
                    runtime.forming.clear();
                }

                // spec §4.3 step 6 / §4.4.3: market orders bypass the
                // queued/active split-candle matching above and are
                // drained here, at the tick's closing price, rather than
                // being left for the next tick's `MatchingEngine::apply`.
                let market_result = MatchingEngine::execute_pending_market_orders(
                    &mut runtime.order_book,
                    &mut runtime.position,
                    block_candle.close,
                    block_candle.timestamp,
                    &route_id,
                    symbol,
                    self.leverage,
                    self.margin_mode,
                    self.fee_model.as_deref(),
                );
                for trade in market_result.completed_trades {
                    let day = Timeframe::ONE_DAY.period_start(trade.exit_timestamp);
                    self.session.current_balance += trade.net_pnl();
                    *daily_pnl.entry(day).or_insert(Decimal::ZERO) += trade.net_pnl();
                    report.completed_trades.push(trade);
                }
            }

            i += skip;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::order::{Order as TradeOrder, OrderSide};
    use rust_decimal_macros::dec;

    struct BuyOnce {
        bought: bool,
    }

    impl Strategy for BuyOnce {
        fn name(&self) -> &str {
            "buy_once"
        }

        fn should_long(&mut self, _ctx: &StrategyContext<'_>) -> bool {
            !self.bought
        }

        fn go_long(&mut self, ctx: &mut StrategyContext<'_>) {
            self.bought = true;
            ctx.order_book
                .submit(TradeOrder::market(ctx.symbol, OrderSide::Buy, dec!(1), ctx.candle.timestamp));
        }
    }

    fn minute_candles(n: i64, price: Decimal) -> Vec<Candle> {
        (0..n)
            .map(|m| Candle::new(m * 60_000, price, price, price, price, dec!(1)).unwrap())
            .collect()
    }

    #[test]
    fn simulator_opens_a_position_on_the_first_strategy_tick() {
        let route = Route::new("binance", "BTC-USDT", Timeframe::ONE_MIN, "buy_once");
        let series = minute_candles(3, dec!(100));
        let mut candles = HashMap::new();
        candles.insert(("binance".to_string(), "BTC-USDT".to_string()), series);

        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        strategies.insert("buy_once".to_string(), Box::new(BuyOnce { bought: false }));

        let mut sim = Simulator::new(dec!(10000), dec!(1), MarginMode::Cross);
        let report = sim
            .run(&[route], &candles, &mut strategies, &HashMap::new())
            .unwrap();

        assert_eq!(report.liquidation_count, 0);
        assert!(report.completed_trades.is_empty());
    }

    #[test]
    fn cancellation_token_stops_the_run_early() {
        let route = Route::new("binance", "BTC-USDT", Timeframe::ONE_MIN, "buy_once");
        let series = minute_candles(100, dec!(100));
        let mut candles = HashMap::new();
        candles.insert(("binance".to_string(), "BTC-USDT".to_string()), series);

        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        strategies.insert("buy_once".to_string(), Box::new(BuyOnce { bought: false }));

        let mut sim = Simulator::new(dec!(10000), dec!(1), MarginMode::Cross);
        sim.session().cancellation_token().cancel();
        let result = sim.run(&[route], &candles, &mut strategies, &HashMap::new());
        assert!(result.is_err());
    }

    struct RoundTrip {
        closed: bool,
    }

    impl Strategy for RoundTrip {
        fn name(&self) -> &str {
            "round_trip"
        }

        fn should_long(&mut self, ctx: &StrategyContext<'_>) -> bool {
            ctx.position.is_none() && !self.closed
        }

        fn go_long(&mut self, ctx: &mut StrategyContext<'_>) {
            ctx.order_book
                .submit(TradeOrder::market(ctx.symbol, OrderSide::Buy, dec!(1), ctx.candle.timestamp));
        }

        fn update_position(&mut self, ctx: &mut StrategyContext<'_>) {
            if !self.closed {
                self.closed = true;
                ctx.order_book
                    .submit(TradeOrder::market(ctx.symbol, OrderSide::Sell, dec!(1), ctx.candle.timestamp));
            }
        }
    }

    /// Market orders must fill at the tick's observed candle price, never
    /// at the zero placeholder `Order::market` stores in `price` — a
    /// round trip through rising candles must realize the actual
    /// open/close spread, not a phantom P&L against a zero entry.
    #[test]
    fn market_orders_fill_at_the_candle_price_not_zero() {
        let route = Route::new("binance", "BTC-USDT", Timeframe::ONE_MIN, "round_trip");
        let series = vec![
            Candle::new(0, dec!(100), dec!(100), dec!(100), dec!(100), dec!(1)).unwrap(),
            Candle::new(60_000, dec!(110), dec!(110), dec!(110), dec!(110), dec!(1)).unwrap(),
        ];
        let mut candles = HashMap::new();
        candles.insert(("binance".to_string(), "BTC-USDT".to_string()), series);

        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        strategies.insert("round_trip".to_string(), Box::new(RoundTrip { closed: false }));

        let mut sim = Simulator::new(dec!(10000), dec!(1), MarginMode::Cross);
        let report = sim
            .run(&[route], &candles, &mut strategies, &HashMap::new())
            .unwrap();

        assert_eq!(report.completed_trades.len(), 1);
        let trade = &report.completed_trades[0];
        assert_eq!(trade.entry_price, dec!(100));
        assert_eq!(trade.exit_price, dec!(110));
        assert_eq!(trade.pnl, dec!(10));
    }

    struct LimitBuyer;

    impl Strategy for LimitBuyer {
        fn name(&self) -> &str {
            "limit_buyer"
        }

        fn should_long(&mut self, ctx: &StrategyContext<'_>) -> bool {
            ctx.order_book.active_orders().next().is_none()
        }

        fn go_long(&mut self, ctx: &mut StrategyContext<'_>) {
            ctx.order_book
                .submit(TradeOrder::limit(ctx.symbol, OrderSide::Buy, dec!(95), dec!(1), ctx.candle.timestamp));
        }
    }

    /// A quiet run (flat candles at 100, never touching the 95 limit)
    /// followed by a single candle that dips to 94 should fill the
    /// resting limit order wherever skip-ahead lands it — invariant 7:
    /// skip-ahead never executes an order outside its candle's range.
    #[test]
    fn skip_ahead_does_not_miss_a_fill_inside_the_dip_candle() {
        let route = Route::new("binance", "BTC-USDT", Timeframe::FIFTEEN_MIN, "limit_buyer");
        let mut series = minute_candles(30, dec!(100));
        series[20] = Candle::new(20 * 60_000, dec!(100), dec!(100), dec!(94), dec!(96), dec!(1)).unwrap();
        let mut candles = HashMap::new();
        candles.insert(("binance".to_string(), "BTC-USDT".to_string()), series);

        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        strategies.insert("limit_buyer".to_string(), Box::new(LimitBuyer));

        let mut sim = Simulator::new(dec!(10000), dec!(1), MarginMode::Cross);
        let report = sim
            .run(&[route], &candles, &mut strategies, &HashMap::new())
            .unwrap();

        assert_eq!(report.liquidation_count, 0);
        assert!(report.completed_trades.is_empty());
    }
}
