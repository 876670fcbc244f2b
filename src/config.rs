use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::domain::trading::position::MarginMode;

/// Runtime configuration for a single backtest or optimization session,
/// loaded from environment variables (optionally via a `.env` file) the
/// way the teacher's `Config::from_env` loads exchange credentials. CLI
/// flags in `bin/backtest.rs`/`bin/optimize.rs` override these defaults
/// rather than replacing this loading path, matching the teacher's
/// env-first convention.
#[derive(Debug, Clone)]
pub struct Config {
    pub starting_balance: Decimal,
    pub leverage: Decimal,
    pub margin_mode: MarginMode,
    pub candle_store_capacity: usize,
    /// Number of 1-minute candles fed to `CandleStore` before the
    /// simulation window begins, so indicators have lookback (spec §4.3).
    pub warmup_candles: usize,
    pub commission_per_unit: Decimal,
    pub slippage_pct: Decimal,
    pub database_url: String,
    pub study_output_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let starting_balance = env_parse("STARTING_BALANCE", "10000")?;
        let leverage = env_parse("LEVERAGE", "1")?;
        let margin_mode = match env::var("MARGIN_MODE").unwrap_or_else(|_| "cross".into()).to_lowercase().as_str() {
            "isolated" => MarginMode::Isolated,
            "cross" => MarginMode::Cross,
            other => anyhow::bail!("invalid MARGIN_MODE '{}': expected 'isolated' or 'cross'", other),
        };
        let candle_store_capacity = env_parse("CANDLE_STORE_CAPACITY", "5000")?;
        let warmup_candles = env_parse("WARMUP_CANDLES", "240")?;
        let commission_per_unit = env_parse("COMMISSION_PER_UNIT", "0")?;
        let slippage_pct = env_parse("SLIPPAGE_PCT", "0")?;
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://candles.db".into());
        let study_output_dir =
            env::var("STUDY_OUTPUT_DIR").unwrap_or_else(|_| "storage/optimize/csv".into());

        Ok(Self {
            starting_balance,
            leverage,
            margin_mode,
            candle_store_capacity,
            warmup_candles,
            commission_per_unit,
            slippage_pct,
            database_url,
            study_output_dir,
        })
    }
}

fn env_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .with_context(|| format!("failed to parse {key}='{raw}'"))
}

/// Settings for a hyperparameter search run, loaded the same env-first
/// way as [`Config`]. CLI flags on `bin/optimize.rs` (`--cpu`, positional
/// `optimal_total`) take precedence when supplied.
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub worker_count: usize,
    pub generations: usize,
    pub population_size: usize,
    pub study_name: String,
}

impl OptimizationConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            worker_count: env_parse("OPTIMIZE_WORKERS", "4")?,
            generations: env_parse("OPTIMIZE_GENERATIONS", "20")?,
            population_size: env_parse("OPTIMIZE_POPULATION", "50")?,
            study_name: env::var("OPTIMIZE_STUDY_NAME").unwrap_or_else(|_| "study".into()),
        })
    }
}
