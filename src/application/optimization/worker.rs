use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rust_decimal::Decimal;

use crate::application::simulator::Simulator;
use crate::application::strategy::{Strategy, StrategyFactory};
use crate::domain::errors::is_recoverable;
use crate::domain::market::candle::Candle;
use crate::domain::market::route::Route;
use crate::domain::optimization::hyperparameter::{Dna, HyperparameterSpace};
use crate::domain::optimization::scoring::{self, RatioKind};
use crate::domain::ports::TaskBroker;
use crate::domain::trading::position::MarginMode;

/// One DNA candidate dispatched to a worker.
#[derive(Debug, Clone)]
pub struct Task {
    pub dna: Dna,
}

/// A scored (or unscorable) candidate, sent back to the coordinator.
/// `score` is `f64::NAN` when the candidate was rejected by
/// `Strategy::validate_hyperparameters` or the simulation itself faulted
/// (spec §7 "worker returns nan score and continues").
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub dna: Dna,
    pub score: f64,
}

/// Everything a worker needs preloaded once per lifetime (spec §4.7
/// `init`): the candle series for every route it will simulate, pinned
/// in memory and shared read-only across the pool so the preload cost is
/// paid exactly once (SPEC_FULL §5 "per-worker preload").
pub struct WorkerInit {
    pub routes: Vec<Route>,
    pub candles: Arc<HashMap<(String, String), Vec<Candle>>>,
    pub hyperparameter_space: HyperparameterSpace,
    pub starting_balance: Decimal,
    pub leverage: Decimal,
    pub margin_mode: MarginMode,
    pub optimal_total: usize,
    pub ratio_kind: RatioKind,
}

/// A long-lived worker: preloads candle data once, then blocks on a
/// task broker running one simulation per candidate (spec §4.7, §5
/// "Workers suspend on the task queue"). A fresh strategy instance is
/// built per task per route so state never leaks between candidates.
pub struct WorkerRuntime {
    init: WorkerInit,
    strategy_factory: Arc<StrategyFactory>,
}

impl WorkerRuntime {
    pub fn new(init: WorkerInit, strategy_factory: Arc<StrategyFactory>) -> Self {
        Self {
            init,
            strategy_factory,
        }
    }

    /// Decodes `dna`, runs one full simulation with the resulting
    /// hyperparameters, and scores it. Any `SimulationError` the
    /// matching engine or simulator raises is treated as a `NaN` score
    /// rather than propagated, matching spec §7's optimization-mode
    /// error policy.
    pub fn run(&self, dna: &Dna) -> TaskResult {
        let values = match self.init.hyperparameter_space.decode(dna) {
            Ok(values) => values,
            Err(_) => return TaskResult { dna: dna.clone(), score: f64::NAN },
        };
        let hyperparameters: HashMap<String, f64> = values.into_iter().collect();

        let mut strategies: HashMap<String, Box<dyn Strategy>> = HashMap::new();
        for route in &self.init.routes {
            let strategy = match self.strategy_factory.create(&route.strategy_name) {
                Ok(strategy) => strategy,
                Err(_) => return TaskResult { dna: dna.clone(), score: f64::NAN },
            };
            if strategy.validate_hyperparameters(&hyperparameters).is_err() {
                return TaskResult { dna: dna.clone(), score: f64::NAN };
            }
            strategies.insert(route.strategy_name.clone(), strategy);
        }

        let mut simulator = Simulator::new(self.init.starting_balance, self.init.leverage, self.init.margin_mode);
        let report = match simulator.run(&self.init.routes, &self.init.candles, &mut strategies, &hyperparameters) {
            Ok(report) => report,
            Err(err) => {
                if is_recoverable(&err) {
                    tracing::warn!(dna = %dna.encode(), error = %err, "simulation faulted, scoring NaN");
                }
                return TaskResult { dna: dna.clone(), score: f64::NAN };
            }
        };

        let ratio = crate::domain::performance::metrics::PerformanceMetrics::ratio_from_daily_pnl(
            &report.daily_pnl,
            self.init.starting_balance,
            self.init.ratio_kind,
        );
        let score = scoring::score(report.total_trades(), self.init.optimal_total, ratio, self.init.ratio_kind);
        TaskResult { dna: dna.clone(), score }
    }

    /// Spawns `count` OS threads, each blocking on `broker.next()` and
    /// sending its result through `results`. Returns immediately; join
    /// handles let the coordinator wait for the pool to drain once the
    /// broker is closed.
    pub fn spawn_pool(
        self: Arc<Self>,
        count: usize,
        broker: Arc<dyn TaskBroker<Task>>,
        results: crossbeam_channel::Sender<TaskResult>,
    ) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker_id| {
                let runtime = Arc::clone(&self);
                let broker = Arc::clone(&broker);
                let results = results.clone();
                thread::spawn(move || {
                    while let Some(task) = broker.next() {
                        let result = runtime.run(&task.dna);
                        if results.send(result).is_err() {
                            tracing::warn!(worker_id, "result channel closed, worker exiting");
                            break;
                        }
                    }
                })
            })
            .collect()
    }
}
