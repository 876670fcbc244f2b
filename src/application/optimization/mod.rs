// Search-strategy driver: genetic, random search, hill climbing,
// simulated annealing, and the walk-forward variant.
pub mod coordinator;

// Append-only per-study result CSV, one writer per coordinator.
pub mod study;

// Long-lived simulation worker, preloading candle data once per lifetime.
pub mod worker;

// Rolling train/test window search (spec §4.6 "Walk-forward variant").
pub mod walk_forward;
