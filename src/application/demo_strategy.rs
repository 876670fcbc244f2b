use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::application::strategy::{Strategy, StrategyContext};
use crate::domain::optimization::hyperparameter::{Hyperparameter, HyperparameterSpace};
use crate::domain::trading::order::{Order, OrderSide};

/// A fast/slow simple-moving-average crossover, included so the CLI
/// binaries have something real to run without depending on a
/// user-authored strategy crate (out of scope; see `Strategy`). Exposes
/// its two periods as hyperparameters so `optimize` has a grid to search.
pub struct SmaCrossover {
    fast_period: usize,
    slow_period: usize,
    was_fast_above_slow: Option<bool>,
}

impl SmaCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            was_fast_above_slow: None,
        }
    }

    fn sma(closes: &[rust_decimal::Decimal], period: usize) -> Option<f64> {
        if closes.len() < period || period == 0 {
            return None;
        }
        let window = &closes[closes.len() - period..];
        let sum: rust_decimal::Decimal = window.iter().sum();
        (sum / rust_decimal::Decimal::from(period)).to_f64()
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn hyperparameters(&self) -> HyperparameterSpace {
        HyperparameterSpace::new(vec![
            Hyperparameter::new("fast_period", (2..=20).map(|v| v as f64).collect()),
            Hyperparameter::new("slow_period", (10..=60).step_by(5).map(|v| v as f64).collect()),
        ])
        .expect("grid is within the DNA alphabet bound")
    }

    fn validate_hyperparameters(&self, values: &std::collections::HashMap<String, f64>) -> Result<(), crate::domain::errors::ConfigError> {
        let fast = values.get("fast_period").copied().unwrap_or(self.fast_period as f64);
        let slow = values.get("slow_period").copied().unwrap_or(self.slow_period as f64);
        if fast >= slow {
            return Err(crate::domain::errors::ConfigError::InvalidHyperparameters {
                reason: format!("fast_period ({fast}) must be shorter than slow_period ({slow})"),
            });
        }
        Ok(())
    }

    fn before_execute(&mut self, ctx: &mut StrategyContext<'_>) {
        if let Some(&fast) = ctx.hyperparameters.get("fast_period") {
            self.fast_period = fast as usize;
        }
        if let Some(&slow) = ctx.hyperparameters.get("slow_period") {
            self.slow_period = slow as usize;
        }
    }

    fn should_long(&mut self, ctx: &StrategyContext<'_>) -> bool {
        self.crossed_up(ctx)
    }

    fn should_short(&mut self, ctx: &StrategyContext<'_>) -> bool {
        self.crossed_down(ctx)
    }

    fn go_long(&mut self, ctx: &mut StrategyContext<'_>) {
        ctx.order_book.submit(Order::market(ctx.symbol, OrderSide::Buy, dec!(1), ctx.candle.timestamp));
    }

    fn go_short(&mut self, ctx: &mut StrategyContext<'_>) {
        ctx.order_book.submit(Order::market(ctx.symbol, OrderSide::Sell, dec!(1), ctx.candle.timestamp));
    }

    fn update_position(&mut self, ctx: &mut StrategyContext<'_>) {
        let position_is_long = ctx.position.as_ref().map(|p| p.is_long());
        if position_is_long == Some(true) && self.crossed_down(ctx) {
            ctx.order_book.submit(Order::market(ctx.symbol, OrderSide::Sell, dec!(1), ctx.candle.timestamp));
        } else if position_is_long == Some(false) && self.crossed_up(ctx) {
            ctx.order_book.submit(Order::market(ctx.symbol, OrderSide::Buy, dec!(1), ctx.candle.timestamp));
        }
    }
}

impl SmaCrossover {
    fn crossed_up(&mut self, ctx: &StrategyContext<'_>) -> bool {
        self.crossing(ctx, true)
    }

    fn crossed_down(&mut self, ctx: &StrategyContext<'_>) -> bool {
        self.crossing(ctx, false)
    }

    fn crossing(&mut self, ctx: &StrategyContext<'_>, direction_up: bool) -> bool {
        let closes: Vec<_> = ctx.candles().iter().map(|c| c.close).collect();
        let (Some(fast), Some(slow)) = (Self::sma(&closes, self.fast_period), Self::sma(&closes, self.slow_period)) else {
            return false;
        };
        let fast_above_slow = fast > slow;
        let crossed = self.was_fast_above_slow == Some(!fast_above_slow) && self.was_fast_above_slow.is_some();
        self.was_fast_above_slow = Some(fast_above_slow);
        crossed && fast_above_slow == direction_up
    }
}
