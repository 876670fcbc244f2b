// Domain-specific error types
pub mod errors;

// Market data domain
pub mod market;

// Hyperparameter search domain
pub mod optimization;

// Performance tracking domain
pub mod performance;

// Port interfaces implemented by infrastructure adapters
pub mod ports;

// Core trading domain
pub mod trading;
