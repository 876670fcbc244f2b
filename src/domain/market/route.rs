use crate::domain::market::timeframe::Timeframe;

/// One `(exchange, symbol, timeframe)` pairing driven by a strategy
/// instance. A simulation session may trade several routes concurrently,
/// each with its own strategy and position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy_name: String,
}

impl Route {
    pub fn new(
        exchange: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        strategy_name: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
            timeframe,
            strategy_name: strategy_name.into(),
        }
    }

    pub fn route_id(&self) -> String {
        format!("{}-{}-{}", self.exchange, self.symbol, self.timeframe)
    }
}

/// Resolves which routes care about a given `(exchange, symbol)` base
/// candle stream, and the minimum timeframe a simulation must aggregate
/// at to serve all of them.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn routes_for(&self, exchange: &str, symbol: &str) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(move |r| r.exchange == exchange && r.symbol == symbol)
    }

    /// Smallest timeframe across all routes, in minutes. Candles are
    /// always aggregated up from 1-minute bars, so this is simply the
    /// minimum of the configured route timeframes (1 if there are none).
    pub fn min_timeframe(&self) -> Timeframe {
        self.routes
            .iter()
            .map(|r| r.timeframe)
            .min()
            .unwrap_or(Timeframe::ONE_MIN)
    }

    /// Maximum number of one-minute candles the simulator may batch
    /// before any route needs strategy attention (spec §4.3): the gcd of
    /// every trading timeframe wider than 1 minute, or 1 if every route
    /// trades on 1-minute bars.
    pub fn min_timeframe_skip(&self) -> u32 {
        min_timeframe_skip(self.routes.iter())
    }
}

/// Standalone form of [`Router::min_timeframe_skip`] for callers (the
/// `Simulator`) that only have a route slice for one `(exchange, symbol)`
/// group, not a full `Router`.
pub fn min_timeframe_skip<'a>(routes: impl Iterator<Item = &'a Route>) -> u32 {
    routes
        .map(|r| r.timeframe.to_minutes())
        .filter(|&minutes| minutes > 1)
        .fold(0, gcd)
        .max(1)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_for_filters_by_exchange_and_symbol() {
        let router = Router::new(vec![
            Route::new("binance", "BTC-USDT", Timeframe::FIVE_MIN, "trend"),
            Route::new("binance", "ETH-USDT", Timeframe::ONE_HOUR, "trend"),
            Route::new("bitmex", "BTC-USDT", Timeframe::ONE_MIN, "scalp"),
        ]);

        let matched: Vec<_> = router.routes_for("binance", "BTC-USDT").collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].strategy_name, "trend");
    }

    #[test]
    fn min_timeframe_is_the_smallest_configured() {
        let router = Router::new(vec![
            Route::new("binance", "BTC-USDT", Timeframe::FIVE_MIN, "trend"),
            Route::new("binance", "ETH-USDT", Timeframe::ONE_HOUR, "trend"),
        ]);
        assert_eq!(router.min_timeframe(), Timeframe::FIVE_MIN);
    }

    #[test]
    fn min_timeframe_defaults_to_one_minute_when_empty() {
        let router = Router::default();
        assert_eq!(router.min_timeframe(), Timeframe::ONE_MIN);
    }

    #[test]
    fn min_timeframe_skip_is_the_gcd_of_non_one_minute_routes() {
        let router = Router::new(vec![
            Route::new("binance", "BTC-USDT", Timeframe::from_minutes(15).unwrap(), "trend"),
            Route::new("binance", "BTC-USDT", Timeframe::from_minutes(45).unwrap(), "trend"),
        ]);
        assert_eq!(router.min_timeframe_skip(), 15);
    }

    #[test]
    fn min_timeframe_skip_is_one_when_every_route_is_one_minute() {
        let router = Router::new(vec![Route::new("binance", "BTC-USDT", Timeframe::ONE_MIN, "scalp")]);
        assert_eq!(router.min_timeframe_skip(), 1);
    }
}
