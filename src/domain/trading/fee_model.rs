use crate::domain::trading::order::OrderSide;
use rust_decimal::Decimal;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeCost {
    pub fee: Decimal,
    pub slippage_cost: Decimal,
    pub total_impact: Decimal,
}

/// Deliberately limited to fixed percentage fees and a fixed slippage
/// allowance; order-book-depth slippage modeling is out of scope.
pub trait FeeModel: Debug + Send + Sync {
    fn calculate_cost(&self, quantity: Decimal, price: Decimal, side: OrderSide) -> TradeCost;
    fn description(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct ConstantFeeModel {
    pub commission_per_unit: Decimal,
    pub slippage_pct: Decimal,
}

impl ConstantFeeModel {
    pub fn new(commission_per_unit: Decimal, slippage_pct: Decimal) -> Self {
        Self {
            commission_per_unit,
            slippage_pct,
        }
    }
}

impl FeeModel for ConstantFeeModel {
    fn calculate_cost(&self, quantity: Decimal, price: Decimal, _side: OrderSide) -> TradeCost {
        let trade_value = quantity * price;
        let fee = quantity * self.commission_per_unit;
        let slippage_cost = trade_value * self.slippage_pct;
        TradeCost {
            fee,
            slippage_cost,
            total_impact: fee + slippage_cost,
        }
    }

    fn description(&self) -> String {
        format!(
            "Constant Fee Model (commission: {}, slippage: {:.2}%)",
            self.commission_per_unit,
            self.slippage_pct * Decimal::from(100)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TieredFeeModel {
    pub maker_fee_pct: Decimal,
    pub taker_fee_pct: Decimal,
    pub slippage_pct: Decimal,
}

impl TieredFeeModel {
    pub fn new(maker_fee_pct: Decimal, taker_fee_pct: Decimal, slippage_pct: Decimal) -> Self {
        Self {
            maker_fee_pct,
            taker_fee_pct,
            slippage_pct,
        }
    }
}

impl FeeModel for TieredFeeModel {
    fn calculate_cost(&self, quantity: Decimal, price: Decimal, _side: OrderSide) -> TradeCost {
        // Backtests cannot know whether a fill was posted or taken; assume
        // taker (the conservative, higher-cost case).
        let trade_value = quantity * price;
        let fee = trade_value * self.taker_fee_pct;
        let slippage_cost = trade_value * self.slippage_pct;
        TradeCost {
            fee,
            slippage_cost,
            total_impact: fee + slippage_cost,
        }
    }

    fn description(&self) -> String {
        format!(
            "Tiered Fee Model (taker: {:.2}%, slippage: {:.2}%)",
            self.taker_fee_pct * Decimal::from(100),
            self.slippage_pct * Decimal::from(100)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn constant_fee_model_sums_commission_and_slippage() {
        let model = ConstantFeeModel::new(dec!(0.01), dec!(0.001));
        let cost = model.calculate_cost(dec!(10), dec!(100), OrderSide::Buy);
        assert_eq!(cost.fee, dec!(0.1));
        assert_eq!(cost.slippage_cost, dec!(1));
        assert_eq!(cost.total_impact, dec!(1.1));
    }

    #[test]
    fn tiered_fee_model_uses_taker_rate_regardless_of_side() {
        let model = TieredFeeModel::new(dec!(0.0002), dec!(0.0004), dec!(0));
        let buy = model.calculate_cost(dec!(1), dec!(1000), OrderSide::Buy);
        let sell = model.calculate_cost(dec!(1), dec!(1000), OrderSide::Sell);
        assert_eq!(buy.fee, dec!(0.4));
        assert_eq!(buy.fee, sell.fee);
    }
}
