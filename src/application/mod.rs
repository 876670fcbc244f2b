// Candle aggregation and jump-fixing.
pub mod market_data;

// Per-minute price-change simulation and order/position matching.
pub mod matching_engine;

// User-strategy adapter and factory.
pub mod strategy;

// Bundled SMA-crossover strategy the CLI binaries run out of the box.
pub mod demo_strategy;

// The master simulation loop and its session state.
pub mod session;
pub mod simulator;

// Hyperparameter search coordinator and worker pool.
pub mod optimization;
