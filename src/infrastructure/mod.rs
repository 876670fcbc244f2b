// One-week TTL candle cache, standing in for the Redis cache of spec §6.
pub mod cache;

// HTTP-backed CandleSource driver (+ an in-memory one for tests/demos).
pub mod candle_source;

// sqlx/SQLite-backed CandleRepository.
pub mod candle_repository;

// In-process task broker for dispatching DNA candidates to workers.
pub mod broker;
