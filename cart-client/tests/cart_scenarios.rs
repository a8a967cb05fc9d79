//! End-to-end cart and checkout scenarios through `CartEngine`

use cart_client::testing::{FakeServices, flash_sale, in_shop, line, snapshot};
use cart_client::{
    CartEngine, CartEvent, CheckoutFailure, CheckoutOutcome, CheckoutPhase, ClientConfig,
    IntentOutcome, LineKey, PaymentMethod, ShippingQuote,
};
use rust_decimal::Decimal;
use shared::error::ApiErrorBody;
use shared::models::IntendedOrder;
use std::time::Duration;

fn key(s: &str) -> LineKey {
    s.parse().unwrap()
}

fn engine(fakes: &FakeServices) -> CartEngine {
    let config = ClientConfig::default()
        .with_quantity_debounce(Duration::from_millis(400))
        .with_duplicate_click_window(Duration::from_millis(100));
    CartEngine::new(config, fakes.services())
}

fn two_line_cart() -> FakeServices {
    FakeServices::new(snapshot(vec![
        line("P1", None, 2, 100, 10),
        line("P2", Some("S1"), 1, 50, 10),
    ]))
}

async fn wait_idle(engine: &CartEngine) {
    while !engine.view().pending.is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_a_selected_totals() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;

    assert!(engine.toggle_one(&key("P1:no-size"), true));
    assert!(engine.toggle_one(&key("P2:S1"), true));

    let view = engine.view();
    assert_eq!(view.selected_subtotal, Decimal::from(250));
    assert_eq!(view.selected_quantity, 3);
    assert!(view.all_checked);
}

#[tokio::test(start_paused = true)]
async fn scenario_b_rapid_clicks_single_write() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    let p1 = key("P1:no-size");

    for _ in 0..5 {
        assert_eq!(engine.increment(&p1), Ok(IntentOutcome::Scheduled));
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    assert_eq!(engine.view().pending, vec![p1.clone()]);

    wait_idle(&engine).await;
    let updates = fakes.cart.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].product_id, "P1");
    assert_eq!(updates[0].size_id, None);
    assert_eq!(updates[0].quantity, 7);

    let line = engine.view().lines.into_iter().find(|l| l.key() == p1).unwrap();
    assert_eq!(line.quantity, 7);
    assert_eq!(line.line_total(), Decimal::from(700));
}

#[tokio::test(start_paused = true)]
async fn scenario_c_empty_selection() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    let fetches = fakes.cart.fetch_count();

    let result = engine.checkout().await;
    assert_eq!(result, Err(CheckoutFailure::NoItemsSelected));
    assert_eq!(fakes.orders.call_count(), 0);
    assert_eq!(fakes.payments.call_count(), 0);
    assert_eq!(fakes.cart.fetch_count(), fetches);
    assert_eq!(engine.view().phase, CheckoutPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_vnpay_redirects_without_order() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);
    assert_eq!(
        engine.shipping_quote().await,
        ShippingQuote::Known(Decimal::from(30_000))
    );
    engine.set_payment_method(PaymentMethod::Vnpay);

    let outcome = engine.checkout().await.unwrap();
    let url = "https://pay.test/checkout?txn=TXN-1".to_string();
    assert_eq!(outcome, CheckoutOutcome::Redirected { url: url.clone() });
    assert_eq!(fakes.payments.call_count(), 1);
    assert_eq!(fakes.orders.call_count(), 0);
    assert_eq!(fakes.navigator.redirects(), vec![url]);

    let (method, request) = fakes.payments.calls().remove(0);
    assert_eq!(method, PaymentMethod::Vnpay);
    assert_eq!(request.amount, 30_250);
    assert_eq!(request.user_id, "user-1");
    assert_eq!(request.address_id, "addr-1");
    let intended: IntendedOrder = serde_json::from_str(&request.order_data_json).unwrap();
    assert_eq!(intended.selected_items.len(), 2);
    assert_eq!(intended.address_id, "addr-1");
    assert_eq!(intended.shipping_fee, Some(Decimal::from(30_000)));
    assert_eq!(intended.voucher_discount, Decimal::ZERO);
    assert_eq!(intended.temp_order_id, None);

    // No order exists yet, so the selection stays
    assert_eq!(engine.view().selection.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_insufficient_stock_at_order_time() {
    let fakes = two_line_cart();
    fakes.orders.reject_with(Some(
        serde_json::from_value::<ApiErrorBody>(serde_json::json!({
            "error": "INSUFFICIENT_STOCK",
            "message": "Insufficient stock",
            "details": {"available": 2, "requested": 5}
        }))
        .unwrap(),
    ));
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);
    let before = engine.view().selection;

    let result = engine.checkout().await;
    assert_eq!(
        result,
        Err(CheckoutFailure::InsufficientStock {
            available: Some(2),
            requested: Some(5),
        })
    );
    assert_eq!(engine.view().selection, before);
    assert_eq!(engine.view().phase, CheckoutPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn stock_limit_blocks_without_network() {
    let fakes = FakeServices::new(snapshot(vec![line("P1", None, 3, 100, 3)]));
    let engine = engine(&fakes);
    engine.mount(None).await;
    let p1 = key("P1:no-size");

    assert!(engine.change_quantity(&p1, 4).is_err());
    assert!(engine.increment(&p1).is_err());
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(fakes.cart.update_count(), 0);
    assert_eq!(engine.view().lines[0].quantity, 3);
}

#[tokio::test(start_paused = true)]
async fn unavailable_line_pruned_on_next_snapshot() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);
    let mut events = engine.subscribe();

    // Seller disables P2 and P1 sells out
    let mut p2 = line("P2", Some("S1"), 1, 50, 10);
    p2.product_available = false;
    fakes
        .cart
        .set_cart(snapshot(vec![line("P1", None, 2, 100, 0), p2]));
    engine.reconcile().await;

    assert!(engine.view().selection.is_empty());
    let mut pruned = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CartEvent::SelectionPruned { keys } = event {
            pruned.extend(keys);
        }
    }
    pruned.sort();
    assert_eq!(pruned, vec![key("P1:no-size"), key("P2:S1")]);
}

#[tokio::test(start_paused = true)]
async fn select_all_round_trip() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;

    engine.toggle_all(true);
    assert!(engine.view().all_checked);

    engine.toggle_all(false);
    let view = engine.view();
    assert!(view.selection.is_empty());
    assert!(!view.all_checked);
}

#[tokio::test(start_paused = true)]
async fn quote_invalidated_before_new_fee() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);
    engine.shipping_quote().await;

    let mut events = engine.subscribe();
    fakes.shipping.set_fee(Decimal::from(45_000));
    engine.increment(&key("P1:no-size")).unwrap();
    assert!(engine.view().calculating);
    assert_eq!(engine.view().shipping_fee, None);

    wait_idle(&engine).await;
    assert_eq!(
        engine.shipping_quote().await,
        ShippingQuote::Known(Decimal::from(45_000))
    );

    // Every fee shown after the change was preceded by a calculating state
    let mut calculating_seen = false;
    while let Ok(event) = events.try_recv() {
        if let CartEvent::ShippingQuoteChanged { fee, calculating } = event {
            if calculating {
                calculating_seen = true;
            } else if fee.is_some() {
                assert!(calculating_seen);
                assert_eq!(fee, Some(Decimal::from(45_000)));
            }
        }
    }
    assert!(calculating_seen);
}

#[tokio::test(start_paused = true)]
async fn checkout_is_not_reentrant() {
    let fakes = two_line_cart();
    fakes.orders.set_latency(Duration::from_secs(1));
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);

    let (first, second) = tokio::join!(engine.checkout(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.checkout().await
    });

    assert!(matches!(first, Ok(CheckoutOutcome::OrderAccepted(_))));
    assert_eq!(second, Ok(CheckoutOutcome::AlreadyInProgress));
    assert_eq!(fakes.orders.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn checkout_right_after_selecting_charges_shipping() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);
    engine.set_payment_method(PaymentMethod::Vnpay);
    // Quote still debouncing
    assert!(engine.view().calculating);

    engine.checkout().await.unwrap();
    let (_, request) = fakes.payments.calls().remove(0);
    assert_eq!(request.amount, 30_250);
    let intended: IntendedOrder = serde_json::from_str(&request.order_data_json).unwrap();
    assert_eq!(intended.shipping_fee, Some(Decimal::from(30_000)));
}

#[tokio::test(start_paused = true)]
async fn cod_order_carries_frozen_fee() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);

    engine.checkout().await.unwrap();
    let order = fakes.orders.calls().remove(0);
    assert_eq!(order.shipping_fee, Some(Decimal::from(30_000)));
    assert_eq!(order.payment_method, PaymentMethod::Cod);
}

#[tokio::test(start_paused = true)]
async fn shop_voucher_and_flash_sale_through_payment() {
    let fakes = FakeServices::new(snapshot(vec![
        flash_sale(in_shop(line("P1", None, 2, 100, 10), "shop-a")),
        in_shop(line("P2", Some("S1"), 1, 50, 10), "shop-b"),
    ]));
    fakes.vouchers.accept("SHOPA", "V-A", Decimal::from(10_000));
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_shop("shop-a", true);
    engine.toggle_shop("shop-b", true);
    assert!(engine.view().all_checked);

    // Discount is capped at the shop's selected subtotal
    let voucher = engine.apply_voucher("shop-a", "shopa").await.unwrap();
    assert_eq!(voucher.discount, Decimal::from(200));
    engine.set_payment_method(PaymentMethod::Momo);

    let outcome = engine.checkout().await.unwrap();
    assert!(matches!(outcome, CheckoutOutcome::Redirected { .. }));

    let reservations = fakes.reservations.calls();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].product_id, "P1");

    let (method, request) = fakes.payments.calls().remove(0);
    assert_eq!(method, PaymentMethod::Momo);
    // 250 + 30 000 shipping - 200 voucher
    assert_eq!(request.amount, 30_050);
    let intended: IntendedOrder = serde_json::from_str(&request.order_data_json).unwrap();
    assert_eq!(intended.voucher_id.as_deref(), Some("V-A"));
    assert_eq!(intended.voucher_discount, Decimal::from(200));
    assert_eq!(intended.temp_order_id.as_deref(), Some(reservations[0].order_id.as_str()));
    assert_eq!(fakes.orders.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sold_out_flash_sale_blocks_checkout() {
    let fakes = FakeServices::new(snapshot(vec![flash_sale(line("P1", None, 1, 100, 10))]));
    fakes.reservations.sell_out("P1");
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);

    let result = engine.checkout().await;
    assert!(matches!(result, Err(CheckoutFailure::ReservationFailed(_))));
    assert_eq!(fakes.orders.call_count(), 0);
    assert_eq!(engine.view().selection, vec![key("P1:no-size")]);
    assert_eq!(engine.view().phase, CheckoutPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn dispose_releases_quote_waiters() {
    let fakes = two_line_cart();
    let engine = engine(&fakes);
    engine.mount(None).await;
    engine.toggle_all(true);

    engine.dispose();
    let quote = tokio::time::timeout(Duration::from_secs(1), engine.shipping_quote()).await;
    assert_eq!(quote, Ok(ShippingQuote::NotApplicable));
}
