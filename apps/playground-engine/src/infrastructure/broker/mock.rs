//! Scriptable in-process broker.
//!
//! Orders placed with it stay `pending` until a test (or `auto_fill`)
//! moves them. Fetch failures can be queued per broker id to exercise the
//! reconciler's error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{
    BrokerAccountType, BrokerError, BrokerOrderStatus, BrokerPort, BrokerPosition, BrokerQuote,
    EquitySnapshot, OrderSnapshot, PlaceEquityTradeRequest,
};
use crate::config::MockBrokerConfig;
use crate::domain::shared::{ExternalOrderId, Instrument, LiveAccountType};

/// Broker name live sources use to reach this broker.
pub const MOCK_BROKER_NAME: &str = "mock";

/// Mock broker for tests and the driver.
#[derive(Debug)]
pub struct MockBroker {
    equity: RwLock<EquitySnapshot>,
    positions: RwLock<Vec<BrokerPosition>>,
    quotes: RwLock<HashMap<Instrument, BrokerQuote>>,
    default_price: Decimal,
    auto_fill: bool,
    orders: RwLock<HashMap<ExternalOrderId, OrderSnapshot>>,
    placed: RwLock<Vec<(ExternalOrderId, PlaceEquityTradeRequest)>>,
    place_failures: RwLock<VecDeque<BrokerError>>,
    fetch_failures: RwLock<HashMap<ExternalOrderId, VecDeque<BrokerError>>>,
    next_id: AtomicU64,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new(EquitySnapshot {
            equity: Decimal::new(100_000, 0),
            open_pl: Decimal::ZERO,
            close_pl: Decimal::ZERO,
            account_type: BrokerAccountType::Margin,
        })
    }
}

impl MockBroker {
    /// Create a mock broker reporting `equity`.
    #[must_use]
    pub fn new(equity: EquitySnapshot) -> Self {
        Self {
            equity: RwLock::new(equity),
            positions: RwLock::new(Vec::new()),
            quotes: RwLock::new(HashMap::new()),
            default_price: Decimal::ZERO,
            auto_fill: false,
            orders: RwLock::new(HashMap::new()),
            placed: RwLock::new(Vec::new()),
            place_failures: RwLock::new(VecDeque::new()),
            fetch_failures: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a mock broker from configuration.
    #[must_use]
    pub fn from_config(config: &MockBrokerConfig) -> Self {
        let account_type = config
            .account_type
            .parse()
            .unwrap_or_else(|e: std::convert::Infallible| match e {});
        let mut broker = Self::new(EquitySnapshot {
            equity: config.equity,
            open_pl: Decimal::ZERO,
            close_pl: Decimal::ZERO,
            account_type,
        });
        broker.default_price = config.quote_price;
        broker.auto_fill = config.auto_fill;
        broker
    }

    // ========================================================================
    // Scripting
    // ========================================================================

    /// Replace the equity snapshot.
    pub fn set_equity(&self, equity: EquitySnapshot) {
        *self.equity.write() = equity;
    }

    /// Replace the reported positions.
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        *self.positions.write() = positions;
    }

    /// Quote `symbol` at `price` with a one-cent spread.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        let symbol = Instrument::new(symbol);
        let quote = spread_quote(symbol.clone(), price);
        self.quotes.write().insert(symbol, quote);
    }

    /// Fail the next `place_order` call with `error`.
    pub fn fail_next_place(&self, error: BrokerError) {
        self.place_failures.write().push_back(error);
    }

    /// Fail the next `fetch_order` call for `external_id` with `error`.
    pub fn fail_next_fetch(&self, external_id: &ExternalOrderId, error: BrokerError) {
        self.fetch_failures
            .write()
            .entry(external_id.clone())
            .or_default()
            .push_back(error);
    }

    /// Report the order as working at the broker.
    pub fn open(&self, external_id: &ExternalOrderId) {
        self.update(external_id, |o| {
            o.status = BrokerOrderStatus::Open.as_str().to_string();
        });
    }

    /// Report the order as filled.
    pub fn fill(&self, external_id: &ExternalOrderId, price: Decimal, quantity: Decimal) {
        self.update(external_id, |o| *o = o.clone().filled(price, quantity));
    }

    /// Report the order as rejected.
    pub fn reject(&self, external_id: &ExternalOrderId, reason: &str) {
        self.update(external_id, |o| *o = o.clone().rejected(reason));
    }

    /// Report the order with an arbitrary broker status text.
    pub fn set_status(&self, external_id: &ExternalOrderId, status: &str) {
        self.update(external_id, |o| o.status = status.to_string());
    }

    /// Broker ids and requests of every order placed, in placement order.
    #[must_use]
    pub fn placed(&self) -> Vec<(ExternalOrderId, PlaceEquityTradeRequest)> {
        self.placed.read().clone()
    }

    /// Forget an order, as if the broker had never seen it.
    pub fn forget(&self, external_id: &ExternalOrderId) {
        self.orders.write().remove(external_id);
    }

    /// Add an order the engine never placed.
    pub fn insert_foreign_order(&self, snapshot: OrderSnapshot) {
        self.orders.write().insert(snapshot.id.clone(), snapshot);
    }

    fn update(&self, external_id: &ExternalOrderId, change: impl FnOnce(&mut OrderSnapshot)) {
        if let Some(order) = self.orders.write().get_mut(external_id) {
            change(order);
        } else {
            tracing::warn!(external_id = %external_id, "Mock broker has no such order");
        }
    }

    fn quote(&self, symbol: &Instrument) -> Option<BrokerQuote> {
        if let Some(quote) = self.quotes.read().get(symbol) {
            return Some(quote.clone());
        }
        (self.default_price > Decimal::ZERO).then(|| spread_quote(symbol.clone(), self.default_price))
    }
}

fn spread_quote(symbol: Instrument, price: Decimal) -> BrokerQuote {
    let half_spread = Decimal::new(5, 3);
    BrokerQuote {
        symbol,
        bid: price - half_spread,
        ask: price + half_spread,
        last: price,
    }
}

#[async_trait]
impl BrokerPort for MockBroker {
    fn name(&self) -> &str {
        MOCK_BROKER_NAME
    }

    async fn fetch_order(
        &self,
        external_id: &ExternalOrderId,
        _account_type: LiveAccountType,
    ) -> Result<OrderSnapshot, BrokerError> {
        let failure = self
            .fetch_failures
            .write()
            .get_mut(external_id)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }

        self.orders
            .read()
            .get(external_id)
            .cloned()
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: external_id.to_string(),
            })
    }

    async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, BrokerError> {
        let mut orders: Vec<OrderSnapshot> = self.orders.read().values().cloned().collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.positions.read().clone())
    }

    async fn fetch_equity(&self) -> Result<EquitySnapshot, BrokerError> {
        Ok(self.equity.read().clone())
    }

    async fn fetch_quotes(&self, symbols: &[Instrument]) -> Result<Vec<BrokerQuote>, BrokerError> {
        Ok(symbols.iter().filter_map(|s| self.quote(s)).collect())
    }

    async fn place_order(
        &self,
        request: PlaceEquityTradeRequest,
    ) -> Result<ExternalOrderId, BrokerError> {
        if let Some(error) = self.place_failures.write().pop_front() {
            return Err(error);
        }

        let id = ExternalOrderId::new(format!(
            "mock-{:06}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let mut snapshot = OrderSnapshot::new(id.clone(), BrokerOrderStatus::Pending, Utc::now());
        if self.auto_fill {
            if let Some(quote) = self.quote(&request.symbol) {
                snapshot = snapshot.filled(quote.price_for(request.side), request.quantity);
            }
        }

        tracing::debug!(
            external_id = %id,
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            "Mock broker accepted order"
        );
        self.orders.write().insert(id.clone(), snapshot);
        self.placed.write().push((id.clone(), request));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderDuration, OrderSide, OrderType};
    use rust_decimal_macros::dec;

    fn request(symbol: &str) -> PlaceEquityTradeRequest {
        PlaceEquityTradeRequest {
            symbol: Instrument::new(symbol),
            side: OrderSide::Buy,
            quantity: dec!(5),
            order_type: OrderType::Market,
            duration: OrderDuration::Day,
            limit_price: None,
            stop_price: None,
            tag: String::new(),
            account_type: LiveAccountType::Reconciliation,
        }
    }

    #[tokio::test]
    async fn placed_orders_start_pending() {
        let broker = MockBroker::default();
        let id = broker.place_order(request("AAPL")).await.unwrap();
        let snapshot = broker
            .fetch_order(&id, LiveAccountType::Margin)
            .await
            .unwrap();
        assert_eq!(snapshot.parsed_status().unwrap(), BrokerOrderStatus::Pending);
        assert_eq!(broker.placed().len(), 1);
    }

    #[tokio::test]
    async fn scripted_fill_and_failures() {
        let broker = MockBroker::default();
        let id = broker.place_order(request("AAPL")).await.unwrap();
        broker.fill(&id, dec!(101), dec!(5));
        broker.fail_next_fetch(&id, BrokerError::RateLimited);

        let first = broker.fetch_order(&id, LiveAccountType::Margin).await;
        assert_eq!(first, Err(BrokerError::RateLimited));
        let second = broker.fetch_order(&id, LiveAccountType::Margin).await.unwrap();
        assert_eq!(second.parsed_status().unwrap(), BrokerOrderStatus::Filled);
        assert_eq!(second.avg_fill_price, dec!(101));

        broker.fail_next_place(BrokerError::OrderRejected {
            reason: "halted".to_string(),
        });
        assert!(broker.place_order(request("AAPL")).await.is_err());
    }

    #[tokio::test]
    async fn quotes_only_for_known_symbols_without_default() {
        let broker = MockBroker::default();
        broker.set_price("AAPL", dec!(100));
        let quotes = broker
            .fetch_quotes(&[Instrument::new("AAPL"), Instrument::new("MSFT")])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].price_for(OrderSide::Buy), dec!(100.005));
    }

    #[tokio::test]
    async fn config_sets_auto_fill_and_default_quote() {
        let config = MockBrokerConfig {
            auto_fill: true,
            ..MockBrokerConfig::default()
        };
        let broker = MockBroker::from_config(&config);
        let id = broker.place_order(request("MSFT")).await.unwrap();
        let snapshot = broker
            .fetch_order(&id, LiveAccountType::Margin)
            .await
            .unwrap();
        assert_eq!(snapshot.parsed_status().unwrap(), BrokerOrderStatus::Filled);
        assert_eq!(snapshot.last_fill_quantity, dec!(5));
        assert_eq!(broker.fetch_equity().await.unwrap().account_type, BrokerAccountType::Margin);
    }
}
