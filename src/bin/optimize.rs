use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;

use backtest_core::application::demo_strategy::SmaCrossover;
use backtest_core::application::optimization::coordinator::{OptimizationCoordinator, SearchStrategy};
use backtest_core::application::optimization::study::StudyWriter;
use backtest_core::application::optimization::walk_forward::{run_walk_forward, WalkForwardWindows};
use backtest_core::application::optimization::worker::{Task, WorkerInit, WorkerRuntime};
use backtest_core::application::strategy::StrategyFactory;
use backtest_core::config::{Config, OptimizationConfig};
use backtest_core::domain::market::candle::Candle;
use backtest_core::domain::market::route::Route;
use backtest_core::domain::market::timeframe::Timeframe;
use backtest_core::domain::optimization::scoring::RatioKind;
use backtest_core::domain::ports::{CandleRepository, CandleSource};
use backtest_core::infrastructure::broker::ChannelBroker;
use backtest_core::infrastructure::candle_repository::SqliteCandleRepository;
use backtest_core::infrastructure::candle_source::InMemoryCandleSource;

/// Searches a strategy's hyperparameter grid (spec §6 `optimize`/`walkforward`).
#[derive(Parser, Debug)]
#[command(author, version, about = "Search a strategy's hyperparameter grid", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// `optimize <start> <finish> <optimal_total>`: one genetic search over the full range.
    Optimize {
        start: String,
        finish: String,
        optimal_total: usize,

        #[arg(long, default_value_t = 4)]
        cpu: usize,

        #[arg(long)]
        debug: bool,

        #[arg(long)]
        csv: bool,

        #[arg(long)]
        json: bool,
    },
    /// `walkforward <start> <finish> <optimal_total>`: rolling train/test windows.
    Walkforward {
        start: String,
        finish: String,
        optimal_total: usize,

        #[arg(long, default_value_t = 1)]
        inc_month: u32,

        #[arg(long, default_value_t = 3)]
        train_month: u32,

        #[arg(long, default_value_t = 1)]
        test_month: u32,

        #[arg(long)]
        debug: bool,

        #[arg(long)]
        json: bool,
    },
}

const EXCHANGE: &str = "demo-exchange";
const SYMBOL: &str = "BTC-USDT";
const STRATEGY_NAME: &str = "sma_crossover";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let config = Config::from_env().context("loading configuration")?;
    let opt_config = OptimizationConfig::from_env().context("loading optimization configuration")?;

    let mut factory = StrategyFactory::new();
    factory.register(STRATEGY_NAME, || Box::new(SmaCrossover::new(9, 26)));
    let factory = Arc::new(factory);

    let route = Route::new(EXCHANGE, SYMBOL, Timeframe::ONE_HOUR, STRATEGY_NAME);
    let hyperparameter_space = factory
        .create(STRATEGY_NAME)
        .context("creating strategy for its hyperparameter space")?
        .hyperparameters();

    match Cli::parse().command {
        Commands::Optimize { start, finish, optimal_total, cpu, debug, csv, json } => {
            let start_ms = parse_date(&start)?;
            let finish_ms = parse_date(&finish)?;
            anyhow::ensure!(finish_ms > start_ms, "finish must be after start");

            let candles = load_or_generate_candles(&config, EXCHANGE, SYMBOL, start_ms, finish_ms).await?;
            if debug {
                tracing::debug!(count = candles.len(), "loaded candle series for optimization");
            }
            let mut candle_map = HashMap::new();
            candle_map.insert((EXCHANGE.to_string(), SYMBOL.to_string()), candles);

            let init = WorkerInit {
                routes: vec![route],
                candles: Arc::new(candle_map),
                hyperparameter_space: hyperparameter_space.clone(),
                starting_balance: config.starting_balance,
                leverage: config.leverage,
                margin_mode: config.margin_mode,
                optimal_total,
                ratio_kind: RatioKind::Sharpe,
            };
            let runtime = Arc::new(WorkerRuntime::new(init, Arc::clone(&factory)));

            let broker: Arc<ChannelBroker<Task>> = Arc::new(ChannelBroker::new());
            let (result_tx, result_rx) = crossbeam_channel::unbounded();
            let workers = cpu.max(1);
            // Worker threads block in `broker.next()` for the life of the
            // process; they are reclaimed on exit rather than joined, the
            // same daemon-pool shape the coordinator's own tests use.
            let _handles = Arc::clone(&runtime).spawn_pool(workers, Arc::clone(&broker) as Arc<_>, result_tx);
            tracing::info!(workers, "worker pool ready");

            let writer = StudyWriter::new(&config.study_output_dir, &opt_config.study_name, &hyperparameter_space);
            let coordinator = OptimizationCoordinator::new(hyperparameter_space, Arc::clone(&broker) as Arc<_>, result_rx, writer);

            let best = coordinator.run(SearchStrategy::Genetic {
                generations: opt_config.generations,
                population_size: opt_config.population_size,
            });

            match best {
                Some((dna, score)) => {
                    println!("best dna: {}", dna.encode());
                    println!("best score: {score}");
                }
                None => println!("no candidate produced a finite score"),
            }

            if csv {
                println!("wrote {}/{}.csv", config.study_output_dir, opt_config.study_name);
            }
            if json {
                let path = format!("{}/{}.json", config.study_output_dir, opt_config.study_name);
                if let Some((dna, score)) = &best {
                    std::fs::create_dir_all(&config.study_output_dir).ok();
                    std::fs::write(
                        &path,
                        serde_json::to_string_pretty(&serde_json::json!({
                            "best_dna": dna.encode(),
                            "best_score": score,
                        }))?,
                    )
                    .context("writing --json study summary")?;
                    println!("wrote {path}");
                }
            }
        }
        Commands::Walkforward { start, finish, optimal_total, inc_month, train_month, test_month, debug, json } => {
            let start_ms = parse_date(&start)?;
            let finish_ms = parse_date(&finish)?;
            anyhow::ensure!(finish_ms > start_ms, "finish must be after start");

            let candles = load_or_generate_candles(&config, EXCHANGE, SYMBOL, start_ms, finish_ms).await?;
            if debug {
                tracing::debug!(count = candles.len(), "loaded candle series for walk-forward");
            }
            let mut candle_map = HashMap::new();
            candle_map.insert((EXCHANGE.to_string(), SYMBOL.to_string()), candles.clone());

            let init_template = WorkerInit {
                routes: vec![route],
                candles: Arc::new(HashMap::new()),
                hyperparameter_space: hyperparameter_space.clone(),
                starting_balance: config.starting_balance,
                leverage: config.leverage,
                margin_mode: config.margin_mode,
                optimal_total,
                ratio_kind: RatioKind::Sharpe,
            };

            let windows = WalkForwardWindows { inc_months: inc_month, train_months: train_month, test_months: test_month };
            let results = run_walk_forward(
                start_ms,
                finish_ms,
                &candle_map,
                &init_template,
                &factory,
                windows,
                opt_config.generations,
                opt_config.population_size,
            );

            for result in &results {
                println!(
                    "window {} -> train best {} ({:.4}), test score {:.4}",
                    result.window_start,
                    result.train_best_dna.encode(),
                    result.train_best_score,
                    result.test_score
                );
            }

            if json {
                let path = format!("{}/{}_walkforward.json", config.study_output_dir, opt_config.study_name);
                std::fs::create_dir_all(&config.study_output_dir).ok();
                let rows: Vec<_> = results
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "window_start": r.window_start,
                            "train_best_dna": r.train_best_dna.encode(),
                            "train_best_score": r.train_best_score,
                            "test_score": r.test_score,
                        })
                    })
                    .collect();
                std::fs::write(&path, serde_json::to_string_pretty(&rows)?).context("writing --json walk-forward report")?;
                println!("wrote {path}");
            }
        }
    }

    Ok(())
}

fn parse_date(raw: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))?;
    let datetime = date.and_hms_opt(0, 0, 0).expect("midnight always valid");
    Ok(datetime.and_utc().timestamp_millis())
}

async fn load_or_generate_candles(config: &Config, exchange: &str, symbol: &str, start: i64, finish: i64) -> Result<Vec<Candle>> {
    let pool = sqlx::SqlitePool::connect(&config.database_url).await.context("connecting to candle database")?;
    let repository = SqliteCandleRepository::new(pool);
    repository.migrate().await.context("running candle table migration")?;

    match repository.load_range(exchange, symbol, Timeframe::ONE_MIN, start, finish).await {
        Ok(candles) => Ok(candles),
        Err(_) => {
            tracing::warn!(exchange, symbol, "no stored candles for this range, generating a synthetic series");
            let candles = synthetic_candles(start, finish);
            let source = InMemoryCandleSource::new(exchange.to_string(), candles.clone());
            let _ = source.get_starting_time(symbol).await;
            if let Err(e) = repository.save(exchange, symbol, Timeframe::ONE_MIN, &candles).await {
                tracing::error!(error = %e, "failed to persist synthetic candles");
            }
            Ok(candles)
        }
    }
}

fn synthetic_candles(start: i64, finish: i64) -> Vec<Candle> {
    use rand::Rng;
    let mut rng = rand::rng();
    let mut price = dec!(30000);
    let mut timestamp = start;
    let mut candles = Vec::new();

    while timestamp < finish {
        let drift = rust_decimal::Decimal::new(rng.random_range(-50..=50), 2);
        let open = price;
        price = (price + drift).max(dec!(1));
        let high = open.max(price) + dec!(1);
        let low = open.min(price) - dec!(1);
        if let Some(candle) = Candle::new(timestamp, open, high, low, price, dec!(1)) {
            candles.push(candle);
        }
        timestamp += 60_000;
    }

    candles
}
