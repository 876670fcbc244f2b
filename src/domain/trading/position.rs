use crate::domain::trading::order::OrderSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginMode {
    /// Margin for this position is ring-fenced; losses cannot exceed it.
    Isolated,
    /// Margin is drawn from the whole account balance.
    Cross,
}

/// An open position on one route. `quantity` is signed: positive is
/// long, negative is short.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: Decimal,
    pub mode: MarginMode,
    pub opened_at: i64,
    pub liquidation_price: Decimal,
    pub bankruptcy_price: Decimal,
}

/// Maintenance margin rate used to derive the liquidation price buffer
/// above the bankruptcy price. A fixed default; a production engine
/// would tier this by notional size, which this crate does not model
/// (see Non-goals).
const MAINTENANCE_MARGIN_RATE: Decimal = dec!(0.005);

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        entry_price: Decimal,
        leverage: Decimal,
        mode: MarginMode,
        opened_at: i64,
    ) -> Self {
        let signed_quantity = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        let (liquidation_price, bankruptcy_price) =
            Self::calculate_risk_prices(side, entry_price, leverage);
        Self {
            symbol: symbol.into(),
            quantity: signed_quantity,
            entry_price,
            leverage,
            mode,
            opened_at,
            liquidation_price,
            bankruptcy_price,
        }
    }

    fn calculate_risk_prices(
        side: OrderSide,
        entry_price: Decimal,
        leverage: Decimal,
    ) -> (Decimal, Decimal) {
        let margin_fraction = Decimal::ONE / leverage;
        match side {
            OrderSide::Buy => {
                let bankruptcy = entry_price * (Decimal::ONE - margin_fraction);
                let liquidation = entry_price * (Decimal::ONE - margin_fraction + MAINTENANCE_MARGIN_RATE);
                (liquidation, bankruptcy)
            }
            OrderSide::Sell => {
                let bankruptcy = entry_price * (Decimal::ONE + margin_fraction);
                let liquidation = entry_price * (Decimal::ONE + margin_fraction - MAINTENANCE_MARGIN_RATE);
                (liquidation, bankruptcy)
            }
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn side(&self) -> OrderSide {
        if self.is_long() {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }

    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        (current_price - self.entry_price) * self.quantity
    }

    /// Whether `low..=high` of the current candle crosses the
    /// liquidation price.
    pub fn is_liquidated_within(&self, high: Decimal, low: Decimal) -> bool {
        if self.is_long() {
            low <= self.liquidation_price
        } else {
            high >= self.liquidation_price
        }
    }

    /// Adds to (or flips) a position with a new fill in the same or
    /// opposite direction, recomputing the volume-weighted entry price
    /// when increasing exposure. A fill larger than the current exposure
    /// flips the position: the closing portion realizes against the old
    /// `entry_price`, but the remainder opens fresh exposure in the other
    /// direction, so `entry_price` is reset to this fill's `price` rather
    /// than left stale.
    pub fn apply_fill(&mut self, side: OrderSide, quantity: Decimal, price: Decimal) {
        let signed_fill = match side {
            OrderSide::Buy => quantity,
            OrderSide::Sell => -quantity,
        };
        let was_long = self.is_long();
        let same_direction = (signed_fill > Decimal::ZERO) == was_long;

        if same_direction {
            let total_quantity = self.quantity + signed_fill;
            let total_cost = self.entry_price * self.quantity.abs() + price * quantity;
            self.entry_price = total_cost / total_quantity.abs();
            self.quantity = total_quantity;
        } else {
            let total_quantity = self.quantity + signed_fill;
            let flipped = !total_quantity.is_zero() && (total_quantity > Decimal::ZERO) != was_long;
            self.quantity = total_quantity;
            if flipped {
                self.entry_price = price;
            }
        }

        if self.quantity != Decimal::ZERO {
            let (liq, bankruptcy) =
                Self::calculate_risk_prices(self.side(), self.entry_price, self.leverage);
            self.liquidation_price = liq;
            self.bankruptcy_price = bankruptcy;
        }
    }
}

/// A fully closed round-trip on a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub route_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_timestamp: i64,
    pub exit_timestamp: i64,
    pub pnl: Decimal,
    pub fees: Decimal,
    pub liquidation: bool,
}

impl CompletedTrade {
    pub fn net_pnl(&self) -> Decimal {
        self.pnl - self.fees
    }
}
