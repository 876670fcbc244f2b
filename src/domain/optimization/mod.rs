// Hyperparameter grids and their DNA encoding.
pub mod hyperparameter;

// Candidate fitness scoring (trade-count effect rate x normalized ratio).
pub mod scoring;
