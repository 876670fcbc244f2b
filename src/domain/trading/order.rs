use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Submission-time modifier affecting how an order interacts with an
/// existing position rather than how it is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderFlag {
    None,
    /// Rejected by the matching engine if it would increase exposure.
    ReduceOnly,
    /// Rejected by the matching engine if it would fill immediately
    /// against the current candle (maker-only).
    PostOnly,
}

/// What effect a fill has on the route's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    /// Opens a position where none existed.
    Open,
    /// Adds to an existing position in the same direction.
    Increase,
    /// Partially closes an existing position.
    Reduce,
    /// Fully closes an existing position.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    Executed,
    Canceled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: uuid::Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub flag: OrderFlag,
    /// Limit/stop trigger price. Ignored for `OrderType::Market`.
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub submitted_at: i64,
}

impl Order {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal, submitted_at: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            flag: OrderFlag::None,
            price: Decimal::ZERO,
            quantity,
            status: OrderStatus::Active,
            submitted_at,
        }
    }

    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        submitted_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            flag: OrderFlag::None,
            price,
            quantity,
            status: OrderStatus::Active,
            submitted_at,
        }
    }

    pub fn with_flag(mut self, flag: OrderFlag) -> Self {
        self.flag = flag;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Whether this order's trigger price falls inside `[low, high]`,
    /// regardless of side or order type. Used by the skip-ahead probe,
    /// which only cares about how many orders a price range would touch.
    pub fn price_in_range(&self, high: Decimal, low: Decimal) -> bool {
        self.order_type != OrderType::Market && self.price >= low && self.price <= high
    }

    /// Whether `high`/`low` of the current candle would trigger a fill
    /// for this order, per order type.
    pub fn triggers_within(&self, high: Decimal, low: Decimal) -> bool {
        match self.order_type {
            OrderType::Market => true,
            OrderType::Limit => match self.side {
                OrderSide::Buy => low <= self.price,
                OrderSide::Sell => high >= self.price,
            },
            OrderType::Stop | OrderType::StopLimit => match self.side {
                OrderSide::Buy => high >= self.price,
                OrderSide::Sell => low <= self.price,
            },
        }
    }
}

/// Holds all orders, pending and historical, for a single route.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Vec<Order>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self { orders: Vec::new() }
    }

    pub fn submit(&mut self, order: Order) -> uuid::Uuid {
        let id = order.id;
        self.orders.push(order);
        id
    }

    pub fn cancel(&mut self, id: uuid::Uuid) -> bool {
        if let Some(order) = self.orders.iter_mut().find(|o| o.id == id && o.is_active()) {
            order.status = OrderStatus::Canceled;
            true
        } else {
            false
        }
    }

    pub fn cancel_all_active(&mut self) {
        for order in self.orders.iter_mut().filter(|o| o.is_active()) {
            order.status = OrderStatus::Canceled;
        }
    }

    /// Transitions an active order to `Executed` and returns a copy of it,
    /// or `None` if `id` does not name an active order.
    pub fn execute(&mut self, id: uuid::Uuid) -> Option<Order> {
        let order = self.orders.iter_mut().find(|o| o.id == id && o.is_active())?;
        order.status = OrderStatus::Executed;
        Some(order.clone())
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(|o| o.is_active())
    }

    pub fn active_orders_mut(&mut self) -> impl Iterator<Item = &mut Order> {
        self.orders.iter_mut().filter(|o| o.status == OrderStatus::Active)
    }

    pub fn all(&self) -> &[Order] {
        &self.orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_order_always_triggers() {
        let order = Order::market("BTC-USDT", OrderSide::Buy, dec!(1), 0);
        assert!(order.triggers_within(dec!(200), dec!(50)));
    }

    #[test]
    fn buy_limit_triggers_when_low_touches_price() {
        let order = Order::limit("BTC-USDT", OrderSide::Buy, dec!(100), dec!(1), 0);
        assert!(order.triggers_within(dec!(110), dec!(99)));
        assert!(!order.triggers_within(dec!(110), dec!(101)));
    }

    #[test]
    fn sell_limit_triggers_when_high_touches_price() {
        let order = Order::limit("BTC-USDT", OrderSide::Sell, dec!(100), dec!(1), 0);
        assert!(order.triggers_within(dec!(101), dec!(90)));
        assert!(!order.triggers_within(dec!(99), dec!(90)));
    }

    #[test]
    fn order_book_cancel_only_affects_active_orders() {
        let mut book = OrderBook::new();
        let id = book.submit(Order::market("BTC-USDT", OrderSide::Buy, dec!(1), 0));
        assert!(book.cancel(id));
        assert!(!book.cancel(id));
        assert_eq!(book.active_orders().count(), 0);
    }

    #[test]
    fn cancel_all_active_clears_the_book() {
        let mut book = OrderBook::new();
        book.submit(Order::market("BTC-USDT", OrderSide::Buy, dec!(1), 0));
        book.submit(Order::limit("BTC-USDT", OrderSide::Sell, dec!(50), dec!(1), 0));
        book.cancel_all_active();
        assert_eq!(book.active_orders().count(), 0);
        assert_eq!(book.all().len(), 2);
    }
}
