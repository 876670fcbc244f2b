use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::domain::errors::ConfigError;
use crate::domain::market::candle::Candle;
use crate::domain::market::candle_store::CandleStore;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::optimization::hyperparameter::HyperparameterSpace;
use crate::domain::trading::order::OrderBook;
use crate::domain::trading::position::Position;

/// Read-only view of a route's state a strategy's lifecycle hooks are
/// invoked with. Strategies observe only already-aggregated candles for
/// their own timeframe, never the simulator's forming 1m candle.
pub struct StrategyContext<'a> {
    pub route_id: &'a str,
    pub exchange: &'a str,
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub candle: &'a Candle,
    pub position: &'a Option<Position>,
    pub order_book: &'a mut OrderBook,
    pub hyperparameters: &'a HashMap<String, f64>,
    /// The full candle history the simulator has retained so far, across
    /// every timeframe it has aggregated for this route's symbol.
    pub history: &'a CandleStore,
}

impl<'a> StrategyContext<'a> {
    /// Candles at this route's own timeframe, oldest first.
    pub fn candles(&self) -> Vec<Candle> {
        self.history.get_range(self.exchange, self.symbol, self.timeframe)
    }
}

/// User-authored trading logic. Every hook has a no-op default so a
/// strategy only overrides the lifecycle events it cares about, matching
/// the teacher's optional-override trait pattern for strategy adapters.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// The hyperparameters this strategy exposes for optimization. An
    /// empty space means the strategy is not tunable.
    fn hyperparameters(&self) -> HyperparameterSpace {
        HyperparameterSpace::default()
    }

    /// Rejects hyperparameter combinations that are structurally invalid
    /// (e.g. a fast moving average period that isn't shorter than the
    /// slow one) before a simulation is run for them. Returning `Err`
    /// causes the coordinator to score the candidate `0.0` without
    /// simulating it.
    fn validate_hyperparameters(&self, _values: &HashMap<String, f64>) -> Result<(), ConfigError> {
        Ok(())
    }

    fn before_execute(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn should_long(&mut self, _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn should_short(&mut self, _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn should_cancel_entry(&mut self, _ctx: &StrategyContext<'_>) -> bool {
        false
    }

    fn go_long(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn go_short(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn update_position(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn on_execute(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn terminate(&mut self, _ctx: &mut StrategyContext<'_>) {}

    /// Invoked once per timeframe boundary tick; the default
    /// implementation runs the standard should_long/short → go_long/short
    /// → update_position sequence, matching the teacher's adapter-driven
    /// `_execute` flow. Strategies needing a different sequence can
    /// override this directly.
    fn execute(&mut self, ctx: &mut StrategyContext<'_>) {
        self.before_execute(ctx);
        if ctx.position.is_none() {
            if self.should_cancel_entry(ctx) {
                ctx.order_book.cancel_all_active();
            } else if self.should_long(ctx) {
                self.go_long(ctx);
            } else if self.should_short(ctx) {
                self.go_short(ctx);
            }
        } else {
            self.update_position(ctx);
        }
        self.on_execute(ctx);
    }
}

/// Builds a registered strategy by name, mirroring the teacher's
/// factory-over-trait-objects pattern: no reflection, just a lookup keyed
/// by the strategy's declared name.
#[derive(Default)]
pub struct StrategyFactory {
    builders: HashMap<String, Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>>,
}

impl StrategyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Box::new(builder));
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Strategy>, ConfigError> {
        self.builders
            .get(name)
            .map(|builder| builder())
            .ok_or_else(|| ConfigError::InvalidStrategy {
                reason: format!("no strategy registered under '{}'", name),
            })
    }

    pub fn registered_names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::order::OrderSide;
    use rust_decimal_macros::dec;

    struct AlwaysLong;

    impl Strategy for AlwaysLong {
        fn name(&self) -> &str {
            "always_long"
        }

        fn should_long(&mut self, _ctx: &StrategyContext<'_>) -> bool {
            true
        }

        fn go_long(&mut self, ctx: &mut StrategyContext<'_>) {
            ctx.order_book
                .submit(crate::domain::trading::order::Order::market(ctx.symbol, OrderSide::Buy, dec!(1), ctx.candle.timestamp));
        }
    }

    fn candle() -> Candle {
        Candle::new(0, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1)).unwrap()
    }

    #[test]
    fn default_execute_opens_a_position_when_should_long_and_flat() {
        let mut strategy = AlwaysLong;
        let mut book = OrderBook::default();
        let position = None;
        let hp = HashMap::new();
        let candle = candle();
        let history = CandleStore::default();
        let mut ctx = StrategyContext {
            route_id: "r1",
            exchange: "binance",
            symbol: "BTC-USDT",
            timeframe: Timeframe::ONE_MIN,
            candle: &candle,
            position: &position,
            order_book: &mut book,
            hyperparameters: &hp,
            history: &history,
        };
        strategy.execute(&mut ctx);
        assert_eq!(book.all().len(), 1);
    }

    #[test]
    fn factory_builds_by_registered_name() {
        let mut factory = StrategyFactory::new();
        factory.register("always_long", || Box::new(AlwaysLong));
        let strategy = factory.create("always_long").unwrap();
        assert_eq!(strategy.name(), "always_long");
        assert!(factory.create("missing").is_err());
    }
}
