/// Which risk-adjusted ratio a study optimizes for. Each has its own
/// fixed normalization range (spec §4.6), since Sharpe, Calmar, Sortino
/// and Omega ratios live on different natural scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioKind {
    Sharpe,
    Calmar,
    Sortino,
    Omega,
}

impl RatioKind {
    /// `(min, max)` used to linearly clamp the chosen ratio into `[0, 1]`.
    fn normalization_range(self) -> (f64, f64) {
        match self {
            RatioKind::Sharpe => (-0.5, 5.0),
            RatioKind::Calmar => (-0.5, 30.0),
            RatioKind::Sortino => (-0.5, 15.0),
            RatioKind::Omega => (-0.5, 5.0),
        }
    }
}

/// Fitness score for one optimization candidate, combining how many
/// trades it produced (penalizing too-few-trades overfits) with how good
/// its risk-adjusted ratio was, exactly per spec §4.6:
///
/// ```text
/// total_effect_rate = min(1, log10(total_trades) / log10(optimal_total))
/// normalized_ratio  = clamp((ratio - min) / (max - min), 0, 1)
/// score             = total_effect_rate * normalized_ratio
/// ```
///
/// `ratio <= 0` forces the score to `0.0` regardless of trade count.
/// `total_trades == 0` also forces `0.0` (log10(0) is undefined and a
/// strategy that never traded cannot be scored).
pub fn score(total_trades: usize, optimal_total: usize, ratio: f64, kind: RatioKind) -> f64 {
    if total_trades == 0 || ratio <= 0.0 {
        return 0.0;
    }

    let total_effect_rate = if total_trades >= optimal_total {
        1.0
    } else {
        (f64::from(total_trades as u32).log10() / f64::from(optimal_total as u32).log10())
            .clamp(0.0, 1.0)
    };

    let (min, max) = kind.normalization_range();
    let normalized_ratio = ((ratio - min) / (max - min)).clamp(0.0, 1.0);

    total_effect_rate * normalized_ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_ratio_scores_zero() {
        assert_eq!(score(100, 50, 0.0, RatioKind::Sharpe), 0.0);
        assert_eq!(score(100, 50, -1.0, RatioKind::Sharpe), 0.0);
    }

    #[test]
    fn zero_trades_scores_zero_even_with_a_good_ratio() {
        assert_eq!(score(0, 50, 3.0, RatioKind::Sharpe), 0.0);
    }

    #[test]
    fn few_trades_penalizes_the_score_relative_to_optimal_total() {
        let few = score(2, 200, 3.0, RatioKind::Sharpe);
        let many = score(200, 200, 3.0, RatioKind::Sharpe);
        assert!(few < many);
        assert_eq!(many, (3.0 - (-0.5)) / (5.0 - (-0.5)));
    }

    #[test]
    fn score_is_monotone_non_increasing_as_trades_drop_to_one_or_fewer() {
        let one_trade = score(1, 200, 3.0, RatioKind::Sharpe);
        let ten_trades = score(10, 200, 3.0, RatioKind::Sharpe);
        assert!(one_trade <= ten_trades);
    }

    #[test]
    fn ratio_is_clamped_into_zero_one_before_scaling() {
        let maxed = score(200, 200, 1000.0, RatioKind::Sharpe);
        assert_eq!(maxed, 1.0);
        let floored = score(200, 200, -0.5, RatioKind::Sharpe);
        assert_eq!(floored, 0.0);
    }

    #[test]
    fn calmar_and_sortino_use_wider_ranges_than_sharpe_and_omega() {
        let sharpe = score(200, 200, 10.0, RatioKind::Sharpe);
        let calmar = score(200, 200, 10.0, RatioKind::Calmar);
        assert!(calmar < sharpe);
    }
}
