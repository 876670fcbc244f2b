// Market data domain: candles, timeframes, and routing.
pub mod candle;
pub mod candle_store;
pub mod route;
pub mod timeframe;
pub mod timeframe_candle;
