//! Live and Reconcile Pipeline Integration Tests
//!
//! Live playgrounds mirror their orders into the account's reconcile
//! playground; only reconcile orders reach the broker. These tests script the
//! mock broker and drive the reconciler pass by pass.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use playground_engine::application::dto::{
    AccountRequestDto, AppendBarsRequestDto, CancelOrderRequestDto, ClockRequestDto,
    CreatePlaygroundRequestDto, GetAccountRequestDto, NextTickRequestDto, PlaceOrderRequestDto,
    PlaceOrderResponseDto, RepositoryRequestDto,
};
use playground_engine::application::ports::{
    BrokerAccountType, BrokerError, BrokerOrderStatus, BrokerPosition, EquitySnapshot,
    OrderSnapshot,
};
use playground_engine::domain::market::Candle;
use playground_engine::domain::order::{OrderIntent, OrderSide, OrderStatus};
use playground_engine::domain::playground::{AccountSnapshot, OrderFilter, RECONCILE_CLOSE_TAG};
use playground_engine::infrastructure::broker::MOCK_BROKER_NAME;
use playground_engine::{
    Container, EngineError, EngineSettings, Environment, ErrorKind, ExternalOrderId,
    InMemoryStore, Instrument, LiveAccountType, LiveSource, MockBroker, PlaygroundId,
};

// =============================================================================
// Helpers
// =============================================================================

type TestContainer = Container<MockBroker, InMemoryStore>;

fn settings() -> EngineSettings {
    EngineSettings {
        poll_interval: StdDuration::from_millis(1),
        ..EngineSettings::default()
    }
}

/// Container over a broker quoting AAPL at 100.
fn container() -> TestContainer {
    let broker = MockBroker::default();
    broker.set_price("AAPL", dec!(100));
    Container::new(Arc::new(broker), Arc::new(InMemoryStore::new()), settings())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 4, 14, 30, 0).unwrap()
}

fn source() -> LiveSource {
    LiveSource {
        broker: MOCK_BROKER_NAME.to_string(),
        account_id: "acct-1".to_string(),
        account_type: LiveAccountType::Margin,
    }
}

fn live_request(source: LiveSource, save_to_db: bool) -> CreatePlaygroundRequestDto {
    CreatePlaygroundRequestDto {
        env: Environment::Live,
        account: AccountRequestDto {
            balance: dec!(10000),
            source: Some(source),
        },
        repositories: vec![RepositoryRequestDto {
            symbol: Instrument::new("AAPL"),
            period_in_seconds: 60,
            bars: vec![Candle::flat(t0(), dec!(100))],
            indicators: Vec::new(),
            history_in_days: 0,
        }],
        clock: ClockRequestDto {
            start_date: t0(),
            stop_date: None,
        },
        backfill_orders: Vec::new(),
        tags: Vec::new(),
        client_id: None,
        save_to_db,
    }
}

async fn live_playground(container: &TestContainer) -> PlaygroundId {
    container
        .create_playground_use_case()
        .execute(live_request(source(), false))
        .await
        .unwrap()
        .playground_id
}

fn reconcile_id(container: &TestContainer) -> PlaygroundId {
    let accounts = container.registry().live_accounts();
    assert_eq!(accounts.len(), 1);
    accounts[0].reconcile_playground_id.clone()
}

async fn place(
    container: &TestContainer,
    playground_id: &PlaygroundId,
    side: OrderSide,
    quantity: Decimal,
) -> Result<PlaceOrderResponseDto, EngineError> {
    container
        .place_order_use_case()
        .execute(PlaceOrderRequestDto {
            playground_id: playground_id.clone(),
            order: OrderIntent::market("AAPL", side, quantity),
            perform_checks: None,
        })
        .await
}

async fn account(container: &TestContainer, playground_id: &PlaygroundId) -> AccountSnapshot {
    container
        .get_account_use_case()
        .execute(GetAccountRequestDto {
            playground_id: playground_id.clone(),
            filter: OrderFilter {
                fetch_orders: true,
                ..OrderFilter::default()
            },
        })
        .await
        .unwrap()
}

fn position(account: &AccountSnapshot, symbol: &str) -> Decimal {
    account
        .positions
        .get(&Instrument::new(symbol))
        .map_or(Decimal::ZERO, |p| p.quantity)
}

fn routed_ids(response: &PlaceOrderResponseDto) -> Vec<ExternalOrderId> {
    response
        .reconcile_orders
        .iter()
        .map(|o| o.external_id().cloned().expect("reconcile order was routed"))
        .collect()
}

/// Buy 19 on a fresh live playground and fill it at 100.
async fn long_19(container: &TestContainer) -> (PlaygroundId, PlaceOrderResponseDto) {
    let live = live_playground(container).await;
    let placed = place(container, &live, OrderSide::Buy, dec!(19)).await.unwrap();
    let ids = routed_ids(&placed);
    container.broker().fill(&ids[0], dec!(100), dec!(19));
    let report = container.reconciler().run_once().await;
    assert_eq!(report.committed, 1);
    (live, placed)
}

// =============================================================================
// Live placement mirrors into the reconcile playground
// =============================================================================

#[tokio::test]
async fn live_order_is_mirrored_and_routed() {
    let container = container();
    let live = live_playground(&container).await;
    let reconcile = reconcile_id(&container);

    let placed = place(&container, &live, OrderSide::Buy, dec!(19)).await.unwrap();
    assert_eq!(placed.order.status(), OrderStatus::Pending);
    assert_eq!(placed.reconcile_orders.len(), 1);

    let mirrored = &placed.reconcile_orders[0];
    assert_eq!(mirrored.playground_id(), &reconcile);
    assert_ne!(mirrored.id(), placed.order.id());
    assert_eq!(mirrored.side(), OrderSide::Buy);
    assert_eq!(mirrored.absolute_quantity(), dec!(19));
    assert_eq!(mirrored.status(), OrderStatus::Pending);
    assert_eq!(placed.order.reconciles(), &[mirrored.order_ref()]);
    assert_eq!(mirrored.reconciles(), &[placed.order.order_ref()]);

    let routed = container.broker().placed();
    assert_eq!(routed.len(), 1);
    assert_eq!(Some(&routed[0].0), mirrored.external_id());
    assert_eq!(routed[0].1.account_type, LiveAccountType::Reconciliation);

    // Live orders are never routed themselves.
    let live_account = account(&container, &live).await;
    assert_eq!(live_account.orders.len(), 1);
    assert!(live_account.orders[0].external_id().is_none());
    assert_eq!(live_account.balance, dec!(10000));
}

#[tokio::test]
async fn reconcile_playground_is_funded_from_broker_equity() {
    let container = container();
    live_playground(&container).await;
    let reconcile = account(&container, &reconcile_id(&container)).await;
    assert_eq!(reconcile.balance, dec!(100000));
    assert_eq!(reconcile.meta.environment, Environment::Reconcile);
}

#[tokio::test]
async fn second_live_playground_shares_the_reconcile_playground() {
    let container = container();
    let first = live_playground(&container).await;
    let second = live_playground(&container).await;

    let accounts = container.registry().live_accounts();
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].live_playground_ids.contains(&first));
    assert!(accounts[0].live_playground_ids.contains(&second));
}

// =============================================================================
// Cross-zero split across live playgrounds
// =============================================================================

#[tokio::test]
async fn cross_zero_order_splits_and_closes_the_peer() {
    let container = container();
    let (first, original) = long_19(&container).await;
    let reconcile = reconcile_id(&container);

    let first_account = account(&container, &first).await;
    assert_eq!(first_account.balance, dec!(8100));
    assert_eq!(position(&first_account, "AAPL"), dec!(19));

    let second = live_playground(&container).await;
    let placed = place(&container, &second, OrderSide::SellShort, dec!(20)).await.unwrap();

    assert_eq!(placed.reconcile_orders.len(), 2);
    let close = &placed.reconcile_orders[0];
    let open = &placed.reconcile_orders[1];
    assert_eq!(close.side(), OrderSide::Sell);
    assert_eq!(close.absolute_quantity(), dec!(19));
    assert_eq!(close.closes().len(), 1);
    assert_eq!(&close.closes()[0].order_id, original.reconcile_orders[0].id());
    assert_eq!(open.side(), OrderSide::SellShort);
    assert_eq!(open.absolute_quantity(), dec!(1));

    // The first live playground got a closing order of its own.
    let first_account = account(&container, &first).await;
    let peer = first_account
        .orders
        .iter()
        .find(|o| o.tag() == RECONCILE_CLOSE_TAG)
        .expect("peer close order");
    assert_eq!(peer.side(), OrderSide::Sell);
    assert_eq!(peer.absolute_quantity(), dec!(19));
    assert!(close.reconciles().contains(&peer.order_ref()));

    for external_id in routed_ids(&placed) {
        let quantity = if &external_id == close.external_id().unwrap() {
            dec!(19)
        } else {
            dec!(1)
        };
        container.broker().fill(&external_id, dec!(110), quantity);
    }
    let report = container.reconciler().run_once().await;
    assert_eq!(report.committed, 2);

    let reconcile_account = account(&container, &reconcile).await;
    assert_eq!(position(&reconcile_account, "AAPL"), dec!(-1));

    let second_account = account(&container, &second).await;
    let second_traded: Decimal = second_account
        .orders
        .iter()
        .flat_map(|o| o.trades())
        .map(|t| t.quantity())
        .sum();
    assert_eq!(second_traded, dec!(-20));
    assert_eq!(second_account.orders[0].status(), OrderStatus::Filled);

    let first_account = account(&container, &first).await;
    let peer = first_account
        .orders
        .iter()
        .find(|o| o.tag() == RECONCILE_CLOSE_TAG)
        .unwrap();
    assert_eq!(peer.trades().len(), 1);
    assert_eq!(peer.trades()[0].quantity(), dec!(-19));
    assert_eq!(peer.trades()[0].realized_pnl(), dec!(190));
    assert_eq!(position(&first_account, "AAPL"), Decimal::ZERO);
    assert_eq!(first_account.balance, dec!(10000) - dec!(1900) + dec!(2090));
}

// =============================================================================
// Broker outcomes
// =============================================================================

#[tokio::test]
async fn broker_rejection_reaches_the_live_order() {
    let container = container();
    let live = live_playground(&container).await;
    let reconcile = reconcile_id(&container);

    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    let ids = routed_ids(&placed);
    container.broker().reject(&ids[0], "insufficient buying power");

    let report = container.reconciler().run_once().await;
    assert_eq!(report.statuses_applied, 1);

    let reconcile_account = account(&container, &reconcile).await;
    assert_eq!(reconcile_account.orders[0].status(), OrderStatus::Rejected);
    assert_eq!(
        reconcile_account.orders[0].reject_reason(),
        Some("insufficient buying power")
    );
    assert_eq!(reconcile_account.balance, dec!(100000));

    let live_account = account(&container, &live).await;
    assert_eq!(live_account.orders[0].status(), OrderStatus::Rejected);
    assert_eq!(
        live_account.orders[0].reject_reason(),
        Some("insufficient buying power")
    );
    assert_eq!(live_account.balance, dec!(10000));
    assert!(live_account.positions.values().all(|p| p.quantity.is_zero()));
}

#[tokio::test]
async fn reject_reason_is_never_read_as_a_status() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    container.broker().reject(&routed_ids(&placed)[0], "open");

    container.reconciler().run_once().await;

    for playground_id in [reconcile_id(&container), live] {
        let snapshot = account(&container, &playground_id).await;
        assert_eq!(snapshot.orders[0].status(), OrderStatus::Rejected);
        assert_eq!(snapshot.orders[0].reject_reason(), Some("open"));
    }
}

#[tokio::test]
async fn broker_acceptance_opens_both_orders() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    container.broker().open(&routed_ids(&placed)[0]);

    container.reconciler().run_once().await;

    let reconcile_account = account(&container, &reconcile_id(&container)).await;
    assert_eq!(reconcile_account.orders[0].status(), OrderStatus::Open);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Open);

    // Already open: nothing new to report.
    let report = container.reconciler().run_once().await;
    assert_eq!(report.polled, 1);
    assert_eq!(report.updates_queued, 0);
}

#[tokio::test]
async fn broker_cancel_and_expiry_cancel_both_orders() {
    for status in ["canceled", "expired"] {
        let container = container();
        let live = live_playground(&container).await;
        let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
        container.broker().set_status(&routed_ids(&placed)[0], status);

        container.reconciler().run_once().await;

        let reconcile_account = account(&container, &reconcile_id(&container)).await;
        assert_eq!(reconcile_account.orders[0].status(), OrderStatus::Canceled, "{status}");
        assert_eq!(
            account(&container, &live).await.orders[0].status(),
            OrderStatus::Canceled,
            "{status}"
        );
    }
}

#[tokio::test]
async fn fills_are_committed_once() {
    let container = container();
    let (live, _) = long_19(&container).await;

    let report = container.reconciler().run_once().await;
    assert_eq!(report.polled, 0);
    assert_eq!(report.committed, 0);
    assert!(container.reconciler().cache().is_empty().await);

    let live_account = account(&container, &live).await;
    assert_eq!(live_account.orders[0].trades().len(), 1);
    assert_eq!(position(&live_account, "AAPL"), dec!(19));
}

#[tokio::test]
async fn transient_poll_failure_is_retried_next_pass() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    let external_id = routed_ids(&placed)[0].clone();
    container.broker().fill(&external_id, dec!(100), dec!(5));
    container
        .broker()
        .fail_next_fetch(&external_id, BrokerError::RateLimited);

    let first = container.reconciler().run_once().await;
    assert_eq!(first.polled, 1);
    assert_eq!(first.committed, 0);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Pending);

    let second = container.reconciler().run_once().await;
    assert_eq!(second.committed, 1);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Filled);
}

#[tokio::test]
async fn unknown_broker_status_is_skipped() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    container
        .broker()
        .set_status(&routed_ids(&placed)[0], "held_for_review");

    let report = container.reconciler().run_once().await;
    assert_eq!(report.errors, 1);
    assert_eq!(report.updates_queued, 0);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Pending);
}

#[tokio::test]
async fn order_the_broker_forgot_stays_pending() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();
    container.broker().forget(&routed_ids(&placed)[0]);

    let report = container.reconciler().run_once().await;
    assert_eq!(report.polled, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Pending);
}

// =============================================================================
// Routing
// =============================================================================

#[tokio::test]
async fn routing_failure_rejects_live_and_reconcile_orders() {
    let container = container();
    let live = live_playground(&container).await;
    container.broker().fail_next_place(BrokerError::OrderRejected {
        reason: "symbol halted".to_string(),
    });

    let err = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokerFatal);

    let reconcile_account = account(&container, &reconcile_id(&container)).await;
    assert_eq!(reconcile_account.orders.len(), 1);
    assert_eq!(reconcile_account.orders[0].status(), OrderStatus::Rejected);
    assert!(reconcile_account.orders[0].external_id().is_none());

    let live_account = account(&container, &live).await;
    assert_eq!(live_account.orders[0].status(), OrderStatus::Rejected);
    assert!(live_account.orders[0].reject_reason().is_some());

    assert!(container.broker().placed().is_empty());
}

#[tokio::test]
async fn routing_failure_rejects_every_later_leg() {
    let container = container();
    let (first, _) = long_19(&container).await;
    let second = live_playground(&container).await;

    // The close leg is refused, so the open leg is never sent.
    container.broker().fail_next_place(BrokerError::RateLimited);
    let err = place(&container, &second, OrderSide::SellShort, dec!(20)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokerTransient);
    assert_eq!(container.broker().placed().len(), 1);

    let reconcile_account = account(&container, &reconcile_id(&container)).await;
    let statuses: Vec<OrderStatus> = reconcile_account.orders.iter().map(|o| o.status()).collect();
    assert_eq!(
        statuses,
        vec![OrderStatus::Filled, OrderStatus::Rejected, OrderStatus::Rejected]
    );
    assert_eq!(
        account(&container, &second).await.orders[0].status(),
        OrderStatus::Rejected
    );

    // The peer close never executes, so the first playground keeps its long.
    let first_account = account(&container, &first).await;
    let peer = first_account
        .orders
        .iter()
        .find(|o| o.tag() == RECONCILE_CLOSE_TAG)
        .expect("peer close order");
    assert_eq!(peer.status(), OrderStatus::Rejected);
    assert_eq!(position(&first_account, "AAPL"), dec!(19));
}

#[tokio::test]
async fn routed_live_order_cannot_be_canceled_locally() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(5)).await.unwrap();

    let err = container
        .cancel_order_use_case()
        .execute(CancelOrderRequestDto {
            playground_id: live.clone(),
            order_id: placed.order.id().clone(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(account(&container, &live).await.orders[0].status(), OrderStatus::Pending);
}

#[tokio::test]
async fn live_placement_needs_a_broker_quote() {
    let container = container();
    let live = live_playground(&container).await;
    let err = container
        .place_order_use_case()
        .execute(PlaceOrderRequestDto {
            playground_id: live,
            order: OrderIntent::market("MSFT", OrderSide::Buy, dec!(1)),
            perform_checks: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(container.broker().placed().is_empty());
}

// =============================================================================
// Account bootstrap
// =============================================================================

#[tokio::test]
async fn unsupported_broker_account_is_refused() {
    let broker = MockBroker::new(EquitySnapshot {
        equity: dec!(5000),
        open_pl: Decimal::ZERO,
        close_pl: Decimal::ZERO,
        account_type: BrokerAccountType::Other("cash".to_string()),
    });
    let container = Container::new(Arc::new(broker), Arc::new(InMemoryStore::new()), settings());

    let err = container
        .create_playground_use_case()
        .execute(live_request(source(), false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokerFatal);
    assert!(container.registry().is_empty());
}

#[tokio::test]
async fn unknown_broker_name_is_a_validation_error() {
    let container = container();
    let source = LiveSource {
        broker: "elsewhere".to_string(),
        ..source()
    };
    let err = container
        .create_playground_use_case()
        .execute(live_request(source, false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn reconcile_playgrounds_are_not_created_directly() {
    let container = container();
    let request = CreatePlaygroundRequestDto {
        env: Environment::Reconcile,
        ..live_request(source(), false)
    };
    let err = container
        .create_playground_use_case()
        .execute(request)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn reconcile_playgrounds_do_not_tick() {
    let container = container();
    live_playground(&container).await;
    let err = container
        .next_tick_use_case()
        .execute(NextTickRequestDto {
            playground_id: reconcile_id(&container),
            seconds: 60,
            is_preview: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// =============================================================================
// Live ticks and feeds
// =============================================================================

#[tokio::test]
async fn live_tick_reports_reconciled_trades_once() {
    let container = container();
    let (live, _) = long_19(&container).await;

    let request = NextTickRequestDto {
        playground_id: live.clone(),
        seconds: 60,
        is_preview: false,
    };
    let delta = container.next_tick_use_case().execute(request.clone()).await.unwrap();
    assert_eq!(delta.new_trades.len(), 1);
    assert_eq!(delta.new_trades[0].quantity(), dec!(19));
    assert_eq!(delta.new_trades[0].price(), dec!(100));
    assert!(!delta.is_backtest_complete);
    assert!(delta.current_time > t0());

    let again = container.next_tick_use_case().execute(request).await.unwrap();
    assert!(again.new_trades.is_empty());
}

#[tokio::test]
async fn live_playgrounds_cannot_preview() {
    let container = container();
    let live = live_playground(&container).await;
    let err = container
        .next_tick_use_case()
        .execute(NextTickRequestDto {
            playground_id: live,
            seconds: 60,
            is_preview: true,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn appended_bars_reach_every_live_subscriber() {
    let container = container();
    let first = live_playground(&container).await;
    let second = live_playground(&container).await;

    let response = container
        .append_bars_use_case()
        .execute(AppendBarsRequestDto {
            symbol: Instrument::new("AAPL"),
            period_in_seconds: 60,
            bars: vec![Candle::flat(t0() + Duration::minutes(1), dec!(101))],
        })
        .unwrap();
    assert_eq!(response.appended, 1);
    assert_eq!(response.subscribers, 2);

    for id in [first, second] {
        let delta = container
            .next_tick_use_case()
            .execute(NextTickRequestDto {
                playground_id: id,
                seconds: 60,
                is_preview: false,
            })
            .await
            .unwrap();
        assert_eq!(delta.new_candles.len(), 1);
        assert_eq!(delta.new_candles[0].bar.close, dec!(101));
    }
}

// =============================================================================
// Audits
// =============================================================================

#[tokio::test]
async fn position_audit_reports_drift_only() {
    let container = container();
    long_19(&container).await;
    let reconcile = reconcile_id(&container);

    container.broker().set_positions(vec![BrokerPosition {
        symbol: Instrument::new("AAPL"),
        quantity: dec!(19),
        cost_basis: dec!(100),
    }]);
    assert!(container.reconciler().audit_positions().await.unwrap().is_empty());

    container.broker().set_positions(vec![BrokerPosition {
        symbol: Instrument::new("AAPL"),
        quantity: dec!(20),
        cost_basis: dec!(100),
    }]);
    let drift = container.reconciler().audit_positions().await.unwrap();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].playground_id, reconcile);
    assert_eq!(drift[0].local, dec!(19));
    assert_eq!(drift[0].broker, dec!(20));

    // Audits never touch state.
    assert_eq!(position(&account(&container, &reconcile).await, "AAPL"), dec!(19));
}

#[tokio::test]
async fn order_audit_finds_foreign_broker_orders() {
    let container = container();
    long_19(&container).await;
    let foreign = ExternalOrderId::new("manual-1");
    container.broker().insert_foreign_order(OrderSnapshot::new(
        foreign.clone(),
        BrokerOrderStatus::Open,
        t0(),
    ));

    let unknown = container.reconciler().audit_orders().await.unwrap();
    assert_eq!(unknown, vec![foreign]);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn saved_live_state_survives_a_restart() {
    let broker = MockBroker::default();
    broker.set_price("AAPL", dec!(100));
    let broker = Arc::new(broker);
    let store = Arc::new(InMemoryStore::new());

    let before = Container::new(Arc::clone(&broker), Arc::clone(&store), settings());
    let live = before
        .create_playground_use_case()
        .execute(live_request(source(), true))
        .await
        .unwrap()
        .playground_id;
    let placed = place(&before, &live, OrderSide::Buy, dec!(19)).await.unwrap();
    broker.fill(&routed_ids(&placed)[0], dec!(100), dec!(19));
    assert_eq!(before.reconciler().run_once().await.committed, 1);

    let after = Container::new(Arc::clone(&broker), Arc::clone(&store), settings());
    let report = after.hydrate().await.unwrap();
    assert_eq!(report.playgrounds, 2);
    assert_eq!(report.live_accounts, 1);

    let live_account = account(&after, &live).await;
    assert_eq!(live_account.balance, dec!(8100));
    assert_eq!(position(&live_account, "AAPL"), dec!(19));

    // The restored account keeps mirroring into the same reconcile playground.
    let reconcile = reconcile_id(&after);
    let sold = place(&after, &live, OrderSide::Sell, dec!(19)).await.unwrap();
    assert_eq!(sold.reconcile_orders[0].playground_id(), &reconcile);
    assert_eq!(sold.reconcile_orders[0].side(), OrderSide::Sell);
}

#[tokio::test]
async fn fill_for_an_unsaved_live_playground_reaches_the_reconcile_account() {
    let broker = MockBroker::default();
    broker.set_price("AAPL", dec!(100));
    let broker = Arc::new(broker);
    let store = Arc::new(InMemoryStore::new());

    let before = Container::new(Arc::clone(&broker), Arc::clone(&store), settings());
    let live = live_playground(&before).await;
    let placed = place(&before, &live, OrderSide::Buy, dec!(19)).await.unwrap();
    let external_id = routed_ids(&placed)[0].clone();

    // The live playground was never saved, so the restart forgets it.
    let after = Container::new(Arc::clone(&broker), Arc::clone(&store), settings());
    let report = after.hydrate().await.unwrap();
    assert_eq!(report.playgrounds, 1);
    assert!(after.registry().meta(&live).is_err());

    broker.fill(&external_id, dec!(100), dec!(19));
    let report = after.reconciler().run_once().await;
    assert_eq!(report.committed, 1);
    assert_eq!(report.dropped, 0);

    let reconcile = account(&after, &reconcile_id(&after)).await;
    assert_eq!(reconcile.orders[0].status(), OrderStatus::Filled);
    assert_eq!(position(&reconcile, "AAPL"), dec!(19));

    // Committed once: the next pass has nothing to do.
    let report = after.reconciler().run_once().await;
    assert_eq!(report.committed, 0);
    assert_eq!(report.dropped, 0);
}

#[tokio::test]
async fn background_reconciler_commits_fills() {
    let container = container();
    let live = live_playground(&container).await;
    let placed = place(&container, &live, OrderSide::Buy, dec!(3)).await.unwrap();
    container
        .broker()
        .fill(&routed_ids(&placed)[0], dec!(100), dec!(3));

    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = container.spawn_reconciler(shutdown.clone());

    let mut filled = false;
    for _ in 0..200 {
        if account(&container, &live).await.orders[0].status() == OrderStatus::Filled {
            filled = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    shutdown.cancel();
    handle.await.unwrap();
    assert!(filled, "reconciler loop never committed the fill");
}
