use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::application::optimization::worker::{WorkerInit, WorkerRuntime};
use crate::application::strategy::StrategyFactory;
use crate::domain::market::candle::Candle;
use crate::domain::optimization::hyperparameter::{Dna, HyperparameterSpace};

/// A day-count approximation for "month" in the windowing config (spec
/// §4.6 "stepping by `inc_month`"): the spec leaves the calendar
/// semantics unspecified, so a 30-day month is used uniformly, same as
/// the teacher's period-based config elsewhere in this crate.
const DAYS_PER_MONTH: i64 = 30;
const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy)]
pub struct WalkForwardWindows {
    pub inc_months: u32,
    pub train_months: u32,
    pub test_months: u32,
}

#[derive(Debug, Clone)]
pub struct WalkForwardResult {
    pub window_start: i64,
    pub train_best_dna: Dna,
    pub train_best_score: f64,
    pub test_score: f64,
}

/// Slices `series` into rolling, disjoint train/test windows (spec
/// §4.6): each window trains a small genetic search on `train_months`
/// of history, then scores the winning DNA out-of-sample against the
/// following `test_months`, stepping the whole window by `inc_months`.
/// Runs sequentially (no worker pool) since each window's evaluation is
/// already small relative to a full study.
#[allow(clippy::too_many_arguments)]
pub fn run_walk_forward(
    series_start: i64,
    series_end: i64,
    candles: &HashMap<(String, String), Vec<Candle>>,
    init_template: &WorkerInit,
    strategy_factory: &Arc<StrategyFactory>,
    windows: WalkForwardWindows,
    generations: usize,
    population_size: usize,
) -> Vec<WalkForwardResult> {
    let inc_ms = i64::from(windows.inc_months) * DAYS_PER_MONTH * MS_PER_DAY;
    let train_ms = i64::from(windows.train_months) * DAYS_PER_MONTH * MS_PER_DAY;
    let test_ms = i64::from(windows.test_months) * DAYS_PER_MONTH * MS_PER_DAY;
    if inc_ms <= 0 || train_ms <= 0 || test_ms <= 0 {
        return Vec::new();
    }

    let mut results = Vec::new();
    let mut window_start = series_start;

    while window_start + train_ms + test_ms <= series_end {
        let train_end = window_start + train_ms;
        let test_end = train_end + test_ms;

        let train_candles = Arc::new(slice_all(candles, window_start, train_end));
        let test_candles = Arc::new(slice_all(candles, train_end, test_end));

        let train_runtime = WorkerRuntime::new(
            WorkerInit { candles: train_candles, ..clone_init(init_template) },
            Arc::clone(strategy_factory),
        );
        let test_runtime = WorkerRuntime::new(
            WorkerInit { candles: test_candles, ..clone_init(init_template) },
            Arc::clone(strategy_factory),
        );

        let (train_best_dna, train_best_score) =
            sequential_genetic_search(&train_runtime, &init_template.hyperparameter_space, generations, population_size);
        let test_score = test_runtime.run(&train_best_dna).score;

        results.push(WalkForwardResult {
            window_start,
            train_best_dna,
            train_best_score,
            test_score,
        });

        window_start += inc_ms;
    }

    results
}

fn slice_all(
    candles: &HashMap<(String, String), Vec<Candle>>,
    start: i64,
    end: i64,
) -> HashMap<(String, String), Vec<Candle>> {
    candles
        .iter()
        .map(|(key, series)| {
            let sliced = series.iter().filter(|c| c.timestamp >= start && c.timestamp < end).copied().collect();
            (key.clone(), sliced)
        })
        .collect()
}

fn clone_init(init: &WorkerInit) -> WorkerInit {
    WorkerInit {
        routes: init.routes.clone(),
        candles: Arc::clone(&init.candles),
        hyperparameter_space: init.hyperparameter_space.clone(),
        starting_balance: init.starting_balance,
        leverage: init.leverage,
        margin_mode: init.margin_mode,
        optimal_total: init.optimal_total,
        ratio_kind: init.ratio_kind,
    }
}

fn sequential_genetic_search(
    runtime: &WorkerRuntime,
    space: &HyperparameterSpace,
    generations: usize,
    population_size: usize,
) -> (Dna, f64) {
    let mut rng = rand::rng();
    let random_dna = |rng: &mut rand::rngs::ThreadRng| -> Dna {
        let genes = space.params().iter().map(|p| rng.random_range(0..p.cardinality())).collect();
        Dna::from_genes(genes)
    };

    let mut population: Vec<Dna> = (0..population_size.max(1)).map(|_| random_dna(&mut rng)).collect();
    let mut best: Option<(Dna, f64)> = None;

    for generation in 0..generations.max(1) {
        let scored: Vec<(Dna, f64)> = population.iter().map(|dna| {
            let result = runtime.run(dna);
            (result.dna, result.score)
        }).collect();

        for (dna, score) in &scored {
            if best.as_ref().is_none_or(|(_, best_score)| score > best_score) {
                best = Some((dna.clone(), *score));
            }
        }

        if generation + 1 == generations {
            break;
        }

        population = (0..population_size.max(1))
            .map(|_| {
                let parent_a = tournament_pick(&scored, &mut rng);
                let parent_b = tournament_pick(&scored, &mut rng);
                let child = crossover(&parent_a, &parent_b, &mut rng);
                mutate(child, space, 0.1, &mut rng)
            })
            .collect();
    }

    best.unwrap_or_else(|| (random_dna(&mut rng), f64::NAN))
}

fn tournament_pick(scored: &[(Dna, f64)], rng: &mut rand::rngs::ThreadRng) -> Dna {
    (0..3.min(scored.len()).max(1))
        .map(|_| &scored[rng.random_range(0..scored.len())])
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(dna, _)| dna.clone())
        .expect("scored is non-empty")
}

fn crossover(a: &Dna, b: &Dna, rng: &mut rand::rngs::ThreadRng) -> Dna {
    let a_genes = a.genes();
    let b_genes = b.genes();
    if a_genes.is_empty() {
        return a.clone();
    }
    let point = rng.random_range(0..a_genes.len());
    let genes = a_genes[..point].iter().chain(b_genes[point..].iter()).copied().collect();
    Dna::from_genes(genes)
}

fn mutate(dna: Dna, space: &HyperparameterSpace, rate: f64, rng: &mut rand::rngs::ThreadRng) -> Dna {
    let genes = dna
        .genes()
        .iter()
        .zip(space.params())
        .map(|(&gene, param)| if rng.random_bool(rate) { rng.random_range(0..param.cardinality()) } else { gene })
        .collect();
    Dna::from_genes(genes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategy::{Strategy, StrategyContext, StrategyFactory};
    use crate::domain::market::route::Route;
    use crate::domain::market::timeframe::Timeframe;
    use crate::domain::optimization::hyperparameter::Hyperparameter;
    use crate::domain::optimization::scoring::RatioKind;
    use crate::domain::trading::position::MarginMode;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct NeverTrades;

    impl Strategy for NeverTrades {
        fn name(&self) -> &str {
            "never_trades"
        }

        fn hyperparameters(&self) -> HyperparameterSpace {
            HyperparameterSpace::new(vec![Hyperparameter::new("noop", vec![1.0, 2.0])]).unwrap()
        }
    }

    fn flat_minute_candles(days: i64) -> Vec<Candle> {
        (0..days * 1440)
            .map(|m| Candle::new(m * 60_000, dec!(100), dec!(100), dec!(100), dec!(100), dec!(1)).unwrap())
            .collect()
    }

    /// Two disjoint 30-day train/test windows fit inside 90 days of
    /// history stepped by 30 days: starts at day 0 and day 30, each
    /// consuming 60 days of train+test, with day 90 as the final cutoff.
    #[test]
    fn walk_forward_slices_rolling_train_test_windows() {
        let mut candles = HashMap::new();
        candles.insert(("binance".to_string(), "BTC-USDT".to_string()), flat_minute_candles(90));

        let mut factory = StrategyFactory::new();
        factory.register("never_trades", || Box::new(NeverTrades));

        let init = WorkerInit {
            routes: vec![Route::new("binance", "BTC-USDT", Timeframe::ONE_HOUR, "never_trades")],
            candles: Arc::new(candles.clone()),
            hyperparameter_space: HyperparameterSpace::new(vec![Hyperparameter::new("noop", vec![1.0, 2.0])]).unwrap(),
            starting_balance: dec!(10000),
            leverage: dec!(1),
            margin_mode: MarginMode::Cross,
            optimal_total: 50,
            ratio_kind: RatioKind::Sharpe,
        };

        let results = run_walk_forward(
            0,
            90 * MS_PER_DAY,
            &candles,
            &init,
            &Arc::new(factory),
            WalkForwardWindows { inc_months: 1, train_months: 1, test_months: 1 },
            2,
            4,
        );

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].window_start, 0);
        assert_eq!(results[1].window_start, DAYS_PER_MONTH * MS_PER_DAY);
        // a strategy that never opens a position scores exactly 0, both
        // in-sample and out-of-sample (spec §4.6 score formula: zero
        // trades cannot be scored above zero).
        for result in &results {
            assert_eq!(result.train_best_score, 0.0);
            assert_eq!(result.test_score, 0.0);
        }
    }
}
