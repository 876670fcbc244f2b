use crate::domain::trading::position::CompletedTrade;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Trading days per year used to annualize ratio metrics. Crypto markets
/// trade every calendar day, unlike equities (252 trading days), so this
/// defaults to 365 rather than the teacher's equities-oriented 252.
pub const CRYPTO_TRADING_DAYS_PER_YEAR: f64 = 365.0;

/// Comprehensive performance metrics for a trading strategy, calculated
/// from a series of completed trades over a backtest period.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    // Returns
    pub total_return: Decimal,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,

    // Risk-adjusted returns
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub omega_ratio: f64,

    // Benchmark-relative
    pub alpha: f64,
    pub beta: f64,

    // Drawdown
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    // Trade statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // Profit metrics
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: f64,
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,

    // Consecutive trades
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // Exposure
    pub total_days: f64,
    pub days_in_market: f64,
    pub exposure_pct: f64,
}

impl PerformanceMetrics {
    /// Calculates metrics using a daily equity time series reconstructed
    /// from realized and unrealized P&L, matching `daily_closes`'
    /// timeline. `annualization_days` should be 365 for crypto routes and
    /// 252 for equities.
    pub fn calculate_time_series_metrics(
        trades: &[CompletedTrade],
        daily_closes: &[(i64, Decimal)],
        initial_equity: Decimal,
        annualization_days: f64,
    ) -> Self {
        Self::calculate_time_series_metrics_with_benchmark(
            trades,
            daily_closes,
            initial_equity,
            annualization_days,
            None,
        )
    }

    pub fn calculate_time_series_metrics_with_benchmark(
        trades: &[CompletedTrade],
        daily_closes: &[(i64, Decimal)],
        initial_equity: Decimal,
        annualization_days: f64,
        benchmark_daily_prices: Option<&[(i64, Decimal)]>,
    ) -> Self {
        let mut daily_equity = Vec::new();
        let mut period_days = 0.0;

        if !daily_closes.is_empty() {
            let start_ts = daily_closes.first().expect("non-empty").0;
            let end_ts = daily_closes.last().expect("non-empty").0;
            period_days = (end_ts - start_ts) as f64 / 86400.0;
        }

        for (ts, close_price) in daily_closes {
            let mut realized_pnl = Decimal::ZERO;
            let mut unrealized_pnl = Decimal::ZERO;

            for trade in trades {
                if trade.exit_timestamp <= *ts {
                    realized_pnl += trade.net_pnl();
                } else if trade.entry_timestamp <= *ts {
                    unrealized_pnl += (close_price - trade.entry_price) * trade.quantity;
                }
            }

            daily_equity.push(initial_equity + realized_pnl + unrealized_pnl);
        }

        let final_equity = if let Some(last) = daily_equity.last() {
            *last
        } else {
            let total_pnl: Decimal = trades.iter().map(CompletedTrade::net_pnl).sum();
            initial_equity + total_pnl
        };

        let total_return = final_equity - initial_equity;
        let total_return_pct = if initial_equity > Decimal::ZERO {
            (total_return.to_f64().unwrap_or(0.0) / initial_equity.to_f64().unwrap_or(1.0)) * 100.0
        } else {
            0.0
        };

        let annualized_return_pct = if period_days > 0.0 {
            total_return_pct * (365.0 / period_days)
        } else {
            0.0
        };

        let winning_trades: Vec<&CompletedTrade> =
            trades.iter().filter(|t| t.net_pnl() > Decimal::ZERO).collect();
        let losing_trades: Vec<&CompletedTrade> =
            trades.iter().filter(|t| t.net_pnl() < Decimal::ZERO).collect();
        let total_trades = trades.len();
        let num_wins = winning_trades.len();
        let num_losses = losing_trades.len();

        let win_rate = if total_trades > 0 {
            (num_wins as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };

        let gross_profit: Decimal = winning_trades.iter().map(|t| t.net_pnl()).sum();
        let gross_loss: Decimal = losing_trades.iter().map(|t| t.net_pnl()).sum();

        let profit_factor = if gross_loss < Decimal::ZERO {
            gross_profit.to_f64().unwrap_or(0.0) / gross_loss.abs().to_f64().unwrap_or(1.0)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        let average_win = if num_wins > 0 {
            gross_profit / Decimal::from(num_wins)
        } else {
            Decimal::ZERO
        };
        let average_loss = if num_losses > 0 {
            gross_loss / Decimal::from(num_losses)
        } else {
            Decimal::ZERO
        };
        let largest_win = winning_trades
            .iter()
            .map(|t| t.net_pnl())
            .max()
            .unwrap_or(Decimal::ZERO);
        let largest_loss = losing_trades
            .iter()
            .map(|t| t.net_pnl())
            .min()
            .unwrap_or(Decimal::ZERO);
        let (max_consecutive_wins, max_consecutive_losses) =
            Self::calculate_consecutive_streaks(trades);

        let max_drawdown_pct = Self::calculate_max_drawdown(&daily_equity);
        let max_drawdown = max_drawdown_pct * initial_equity.to_f64().unwrap_or(0.0) / 100.0;

        let returns = Self::calculate_returns(&daily_equity);
        let sharpe_ratio = Self::calculate_sharpe_ratio(&returns, annualization_days);
        let sortino_ratio = Self::calculate_sortino_ratio(&returns, annualization_days);
        let omega_ratio = Self::calculate_omega_ratio(&returns, 0.0);

        let calmar_ratio = if max_drawdown_pct.abs() > 0.01 {
            annualized_return_pct / max_drawdown_pct.abs()
        } else {
            0.0
        };

        let days_in_market = Self::calculate_days_in_market(trades);
        let exposure_pct = if period_days > 0.0 {
            (days_in_market / period_days) * 100.0
        } else {
            0.0
        };

        let (alpha, beta) = if let Some(benchmark_prices) = benchmark_daily_prices {
            Self::calculate_alpha_beta(&returns, benchmark_prices, annualized_return_pct, annualization_days)
        } else {
            (0.0, 0.0)
        };

        Self {
            total_return,
            total_return_pct,
            annualized_return_pct,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            omega_ratio,
            alpha,
            beta,
            max_drawdown,
            max_drawdown_pct,
            total_trades,
            winning_trades: num_wins,
            losing_trades: num_losses,
            win_rate,
            gross_profit,
            gross_loss,
            profit_factor,
            average_win,
            average_loss,
            largest_win,
            largest_loss,
            max_consecutive_wins,
            max_consecutive_losses,
            total_days: period_days,
            days_in_market,
            exposure_pct,
        }
    }

    /// Ratio needed by the optimization scoring formula (spec §4.6),
    /// computed straight from a session's daily realized P&L series
    /// rather than a closing-price series — the optimization worker has
    /// no benchmark/close-price feed, only the trades it produced.
    pub fn ratio_from_daily_pnl(
        daily_pnl: &[(i64, Decimal)],
        initial_equity: Decimal,
        kind: crate::domain::optimization::scoring::RatioKind,
    ) -> f64 {
        use crate::domain::optimization::scoring::RatioKind;

        let mut equity = initial_equity;
        let mut curve = Vec::with_capacity(daily_pnl.len() + 1);
        curve.push(equity);
        for (_, pnl) in daily_pnl {
            equity += *pnl;
            curve.push(equity);
        }
        let returns = Self::calculate_returns(&curve);

        match kind {
            RatioKind::Sharpe => Self::calculate_sharpe_ratio(&returns, CRYPTO_TRADING_DAYS_PER_YEAR),
            RatioKind::Sortino => Self::calculate_sortino_ratio(&returns, CRYPTO_TRADING_DAYS_PER_YEAR),
            RatioKind::Omega => Self::calculate_omega_ratio(&returns, 0.0),
            RatioKind::Calmar => {
                let max_dd = Self::calculate_max_drawdown(&curve);
                let total_return_pct = if initial_equity > Decimal::ZERO {
                    ((equity - initial_equity).to_f64().unwrap_or(0.0) / initial_equity.to_f64().unwrap_or(1.0)) * 100.0
                } else {
                    0.0
                };
                let days = (daily_pnl.len().max(1)) as f64;
                let annualized = total_return_pct * (CRYPTO_TRADING_DAYS_PER_YEAR / days);
                if max_dd.abs() > 0.01 {
                    annualized / max_dd.abs()
                } else {
                    0.0
                }
            }
        }
    }

    fn calculate_alpha_beta(
        strategy_returns: &[f64],
        benchmark_daily_prices: &[(i64, Decimal)],
        annualized_return_pct: f64,
        annualization_days: f64,
    ) -> (f64, f64) {
        if strategy_returns.is_empty() || benchmark_daily_prices.len() < 2 {
            return (0.0, 0.0);
        }
        let bench_returns: Vec<f64> = (1..benchmark_daily_prices.len())
            .filter_map(|i| {
                let prev = benchmark_daily_prices[i - 1].1.to_f64()?;
                let curr = benchmark_daily_prices[i].1.to_f64()?;
                if prev > 0.0 {
                    Some((curr - prev) / prev)
                } else {
                    None
                }
            })
            .collect();
        let n = strategy_returns.len().min(bench_returns.len()) as f64;
        if n < 2.0 {
            return (0.0, 0.0);
        }
        let s = &strategy_returns[..n as usize];
        let b = &bench_returns[..n as usize];
        let mean_s = s.iter().sum::<f64>() / n;
        let mean_b = b.iter().sum::<f64>() / n;
        let cov = s
            .iter()
            .zip(b.iter())
            .map(|(si, bi)| (si - mean_s) * (bi - mean_b))
            .sum::<f64>()
            / (n - 1.0);
        let var_b = b.iter().map(|bi| (bi - mean_b).powi(2)).sum::<f64>() / (n - 1.0);
        let beta = if var_b > 0.0 { cov / var_b } else { 0.0 };
        let benchmark_annual_pct = mean_b * annualization_days * 100.0;
        let alpha = annualized_return_pct - (beta * benchmark_annual_pct);
        (alpha, beta)
    }

    fn calculate_max_drawdown(equity_curve: &[Decimal]) -> f64 {
        let mut max_dd = 0.0;
        let mut peak = Decimal::ZERO;

        for &equity in equity_curve {
            if equity > peak {
                peak = equity;
            }

            if peak > Decimal::ZERO {
                let drawdown_pct = (equity - peak)
                    .checked_div(peak)
                    .and_then(|d| d.to_f64())
                    .unwrap_or(0.0)
                    * 100.0;
                let drawdown_pct = drawdown_pct.max(-100.0);
                if drawdown_pct < max_dd {
                    max_dd = drawdown_pct;
                }
            }
        }

        max_dd
    }

    fn calculate_returns(equity_curve: &[Decimal]) -> Vec<f64> {
        let mut returns = Vec::new();
        for i in 1..equity_curve.len() {
            let prev = equity_curve[i - 1].to_f64().unwrap_or(1.0);
            let curr = equity_curve[i].to_f64().unwrap_or(1.0);
            if prev > 0.0 {
                returns.push((curr - prev) / prev);
            }
        }
        returns
    }

    fn calculate_sharpe_ratio(returns: &[f64], annualization_days: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>() / returns.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev > 0.0 {
            mean_return * annualization_days.sqrt() / std_dev
        } else {
            0.0
        }
    }

    fn calculate_sortino_ratio(returns: &[f64], annualization_days: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let downside_returns: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
        if downside_returns.is_empty() {
            return if mean_return > 0.0 { f64::INFINITY } else { 0.0 };
        }
        let downside_variance =
            downside_returns.iter().map(|r| r.powi(2)).sum::<f64>() / downside_returns.len() as f64;
        let downside_dev = downside_variance.sqrt();
        if downside_dev > 0.0 {
            mean_return * annualization_days.sqrt() / downside_dev
        } else {
            0.0
        }
    }

    /// Omega ratio at `threshold`: the sum of returns above the threshold
    /// divided by the absolute sum of returns below it. Unlike Sharpe and
    /// Sortino it makes no normality assumption about the return
    /// distribution.
    fn calculate_omega_ratio(returns: &[f64], threshold: f64) -> f64 {
        let (gains, losses) = returns.iter().fold((0.0, 0.0), |(g, l), &r| {
            let excess = r - threshold;
            if excess > 0.0 {
                (g + excess, l)
            } else {
                (g, l - excess)
            }
        });
        if losses > 0.0 {
            gains / losses
        } else if gains > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn calculate_consecutive_streaks(trades: &[CompletedTrade]) -> (usize, usize) {
        let mut max_wins = 0;
        let mut max_losses = 0;
        let mut current_wins = 0;
        let mut current_losses = 0;

        for trade in trades {
            let pnl = trade.net_pnl();
            if pnl > Decimal::ZERO {
                current_wins += 1;
                current_losses = 0;
                max_wins = max_wins.max(current_wins);
            } else if pnl < Decimal::ZERO {
                current_losses += 1;
                current_wins = 0;
                max_losses = max_losses.max(current_losses);
            }
        }

        (max_wins, max_losses)
    }

    fn calculate_days_in_market(trades: &[CompletedTrade]) -> f64 {
        let total_ms: i64 = trades
            .iter()
            .map(|t| t.exit_timestamp - t.entry_timestamp)
            .sum();
        (total_ms as f64) / (1000.0 * 60.0 * 60.0 * 24.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::order::OrderSide;
    use rust_decimal_macros::dec;

    fn trade(entry: i64, exit: i64, entry_price: Decimal, exit_price: Decimal, pnl: Decimal) -> CompletedTrade {
        CompletedTrade {
            route_id: "r1".into(),
            symbol: "BTC-USDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(10),
            entry_price,
            exit_price,
            entry_timestamp: entry,
            exit_timestamp: exit,
            pnl,
            fees: Decimal::ZERO,
            liquidation: false,
        }
    }

    #[test]
    fn winning_trades_produce_full_win_rate() {
        let trades = vec![
            trade(0, 86_400_000, dec!(100), dec!(110), dec!(100)),
            trade(86_400_000, 172_800_000, dec!(110), dec!(120), dec!(100)),
        ];
        let daily_closes = vec![(0, dec!(100)), (86_400, dec!(110)), (172_800, dec!(120))];

        let metrics = PerformanceMetrics::calculate_time_series_metrics(
            &trades,
            &daily_closes,
            dec!(10000),
            CRYPTO_TRADING_DAYS_PER_YEAR,
        );

        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.win_rate, 100.0);
        assert_eq!(metrics.gross_profit, dec!(200));
    }

    #[test]
    fn mixed_trades_compute_profit_factor() {
        let trades = vec![
            trade(0, 86_400_000, dec!(100), dec!(110), dec!(100)),
            trade(86_400_000, 172_800_000, dec!(110), dec!(90), dec!(-200)),
            trade(172_800_000, 259_200_000, dec!(90), dec!(105), dec!(150)),
        ];

        let metrics = PerformanceMetrics::calculate_time_series_metrics(&trades, &[], dec!(10000), 365.0);

        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.win_rate - 66.67).abs() < 0.1);
        assert_eq!(metrics.gross_profit, dec!(250));
        assert_eq!(metrics.gross_loss, dec!(-200));
        assert!((metrics.profit_factor - 1.25).abs() < 0.01);
    }

    #[test]
    fn no_drawdown_when_equity_curve_is_monotonic() {
        let trades = vec![trade(1000, 2000, dec!(100), dec!(110), dec!(100))];
        let daily_closes = vec![(1500, dec!(105)), (2500, dec!(120)), (3500, dec!(125))];

        let metrics = PerformanceMetrics::calculate_time_series_metrics(
            &trades,
            &daily_closes,
            dec!(1000),
            365.0,
        );
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn omega_ratio_is_one_for_symmetric_returns() {
        let returns = vec![0.01, -0.01, 0.02, -0.02];
        let omega = PerformanceMetrics::calculate_omega_ratio(&returns, 0.0);
        assert!((omega - 1.0).abs() < 1e-9);
    }

    #[test]
    fn omega_ratio_favors_upside_skew() {
        let returns = vec![0.05, 0.05, -0.01];
        let omega = PerformanceMetrics::calculate_omega_ratio(&returns, 0.0);
        assert!(omega > 1.0);
    }

    #[test]
    fn ratio_from_daily_pnl_rewards_steady_gains_over_flat_pnl() {
        use crate::domain::optimization::scoring::RatioKind;

        let steady_gains = vec![(0, dec!(10)), (86_400, dec!(10)), (172_800, dec!(10))];
        let flat = vec![(0, dec!(0)), (86_400, dec!(0)), (172_800, dec!(0))];

        let gaining = PerformanceMetrics::ratio_from_daily_pnl(&steady_gains, dec!(10000), RatioKind::Sharpe);
        let flat_ratio = PerformanceMetrics::ratio_from_daily_pnl(&flat, dec!(10000), RatioKind::Sharpe);
        assert!(gaining > flat_ratio);
    }
}
