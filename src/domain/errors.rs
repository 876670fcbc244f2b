use thiserror::Error;

/// Errors raised while building or validating a simulation configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timeframe: {reason}")]
    InvalidTimeframe { reason: String },

    #[error("invalid route configuration: {reason}")]
    InvalidRoute { reason: String },

    #[error("invalid strategy configuration: {reason}")]
    InvalidStrategy { reason: String },

    #[error("invalid hyperparameter grid: {reason}")]
    InvalidHyperparameters { reason: String },
}

/// Errors raised while sourcing or storing candle data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candles found for {exchange}/{symbol}/{timeframe} in range [{start}, {finish})")]
    CandleNotFoundInDatabase {
        exchange: String,
        symbol: String,
        timeframe: String,
        start: i64,
        finish: i64,
    },

    #[error("symbol not found on {exchange}: {symbol}")]
    SymbolNotFound { exchange: String, symbol: String },

    #[error("candle gap detected for {symbol} between {previous_timestamp} and {timestamp}")]
    CandleGap {
        symbol: String,
        previous_timestamp: i64,
        timestamp: i64,
    },
}

/// Errors surfaced by an exchange candle driver; all are retried by the
/// HTTP middleware before they reach this type.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange {exchange} is in maintenance")]
    ExchangeInMaintenance { exchange: String },

    #[error("request to {exchange} timed out after {duration_ms}ms")]
    Timeout { exchange: String, duration_ms: u64 },

    #[error("rate limit exceeded on {exchange}, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        exchange: String,
        retry_after_secs: u64,
    },
}

/// Errors raised by the matching engine or simulator while stepping
/// through a candle series. An optimization worker catches these and
/// records a `NaN` score instead of propagating them.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("inconsistent position state for {symbol}: {reason}")]
    InconsistentPosition { symbol: String, reason: String },

    #[error("account balance went negative: {balance}")]
    NegativeBalance { balance: rust_decimal::Decimal },

    #[error("position on {symbol} was liquidated at {price}")]
    Liquidated {
        symbol: String,
        price: rust_decimal::Decimal,
    },

    #[error("strategy {strategy} panicked or returned an invalid signal: {reason}")]
    StrategyFault { strategy: String, reason: String },
}

/// Cooperative termination signal, checked at tick boundaries. Never
/// thrown as a panic.
#[derive(Debug, Error)]
#[error("simulation terminated by request")]
pub struct Termination;

/// `true` for [`SimulationError`] variants an optimization worker should
/// record as a `NaN`-scored DNA rather than abort the run for.
pub fn is_recoverable(error: &SimulationError) -> bool {
    matches!(
        error,
        SimulationError::InconsistentPosition { .. }
            | SimulationError::NegativeBalance { .. }
            | SimulationError::Liquidated { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn config_error_formats_reason() {
        let err = ConfigError::InvalidTimeframe {
            reason: "must be positive".into(),
        };
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn data_error_includes_range() {
        let err = DataError::CandleNotFoundInDatabase {
            exchange: "binance".into(),
            symbol: "BTC-USDT".into(),
            timeframe: "1h".into(),
            start: 100,
            finish: 200,
        };
        let msg = err.to_string();
        assert!(msg.contains("binance"));
        assert!(msg.contains("100"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn negative_balance_and_liquidation_are_recoverable() {
        assert!(is_recoverable(&SimulationError::NegativeBalance {
            balance: dec!(-10)
        }));
        assert!(is_recoverable(&SimulationError::Liquidated {
            symbol: "BTC-USDT".into(),
            price: dec!(100)
        }));
    }

    #[test]
    fn strategy_fault_is_not_recoverable() {
        assert!(!is_recoverable(&SimulationError::StrategyFault {
            strategy: "demo".into(),
            reason: "bad signal".into()
        }));
    }
}
