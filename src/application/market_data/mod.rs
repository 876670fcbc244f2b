pub mod candle_aggregator;
