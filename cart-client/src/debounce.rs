//! Mutation Debouncer
//!
//! Coalesces bursts of quantity intents into one write per line per quiet
//! period.
//!
//! ```text
//! intent ─▶ validate ─▶ apply_optimistic ─▶ (cancel old timer) ─▶ timer
//!                                                                  │ fire
//!                       reconcile ◀─ settle ◀─ PUT (per-key lock) ◀┘
//! ```
//!
//! - A new intent cancels a timer that has not fired; that write never
//!   reaches the network.
//! - A fired write is never cancelled. A later intent schedules a follow-up
//!   write that waits on the per-key write lock.
//! - Every write ends in a reconcile, whatever its result.

use crate::api::CartService;
use crate::error::ClientError;
use crate::http::bounded;
use crate::session::CartSession;
use parking_lot::Mutex;
use shared::error::ErrorCode;
use shared::message::{CartEvent, Notice};
use shared::models::{CartItemUpdate, LineKey};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Rejected quantity intent; nothing was sent or applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("Quantity must be at least 1")]
    BelowMinimum,

    #[error("Only {available} left in stock")]
    ExceedsStock { available: u32 },

    #[error("Cart line not found: {0}")]
    UnknownLine(LineKey),
}

impl QuantityError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BelowMinimum => ErrorCode::QuantityBelowMinimum,
            Self::ExceedsStock { .. } => ErrorCode::QuantityExceedsStock,
            Self::UnknownLine(_) => ErrorCode::UnknownLine,
        }
    }
}

impl From<QuantityError> for ErrorCode {
    fn from(err: QuantityError) -> Self {
        err.code()
    }
}

/// What happened to an accepted intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    /// Applied locally, write scheduled
    Scheduled,
    /// Same quantity repeated inside the duplicate-click window
    Duplicate,
    /// Already the confirmed quantity with nothing pending
    Unchanged,
    /// Debouncer was disposed
    Disposed,
}

#[derive(Debug)]
struct PendingMutation {
    desired: u32,
    seq: u64,
    last_intent: Instant,
    timer: CancellationToken,
}

struct Inner {
    session: Arc<CartSession>,
    cart: Arc<dyn CartService>,
    window: Duration,
    duplicate_window: Duration,
    timeout: Duration,
    /// Scheduled, not yet fired
    pending: Mutex<HashMap<LineKey, PendingMutation>>,
    /// Fired, write or reconcile still running (count per key)
    in_flight: Mutex<HashMap<LineKey, usize>>,
    write_locks: Mutex<HashMap<LineKey, Arc<tokio::sync::Mutex<()>>>>,
    shutdown: CancellationToken,
}

pub struct QuantityDebouncer {
    inner: Arc<Inner>,
}

impl QuantityDebouncer {
    pub fn new(session: Arc<CartSession>, cart: Arc<dyn CartService>) -> Self {
        let config = &session.config;
        let inner = Inner {
            window: config.quantity_debounce,
            duplicate_window: config.duplicate_click_window,
            timeout: config.request_timeout,
            session: session.clone(),
            cart,
            pending: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Register a quantity intent for `key`
    pub fn request(&self, key: &LineKey, quantity: u32) -> Result<IntentOutcome, QuantityError> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Ok(IntentOutcome::Disposed);
        }

        let line = inner
            .session
            .store
            .line(key)
            .ok_or_else(|| QuantityError::UnknownLine(key.clone()))?;
        if quantity < 1 {
            return Err(QuantityError::BelowMinimum);
        }
        if quantity > line.available_stock {
            return Err(QuantityError::ExceedsStock {
                available: line.available_stock,
            });
        }

        let now = Instant::now();
        {
            let mut pending = inner.pending.lock();

            if let Some(prev) = pending.get(key)
                && prev.desired == quantity
                && now.duration_since(prev.last_intent) < inner.duplicate_window
            {
                tracing::debug!(%key, quantity, "Dropping duplicate click");
                return Ok(IntentOutcome::Duplicate);
            }

            if !pending.contains_key(key)
                && !inner.session.store.has_overlay(key)
                && line.quantity == quantity
            {
                return Ok(IntentOutcome::Unchanged);
            }

            let seq = inner
                .session
                .store
                .apply_optimistic(key, quantity)
                .ok_or_else(|| QuantityError::UnknownLine(key.clone()))?;

            if let Some(prev) = pending.remove(key) {
                prev.timer.cancel();
            }
            let timer = inner.shutdown.child_token();
            pending.insert(
                key.clone(),
                PendingMutation {
                    desired: quantity,
                    seq,
                    last_intent: now,
                    timer: timer.clone(),
                },
            );
            tokio::spawn(run_timer(inner.clone(), key.clone(), timer));
        }

        tracing::debug!(%key, quantity, "Quantity change scheduled");
        if inner.session.selection.lock().contains(key) {
            inner.session.refresh_quote();
        }
        Ok(IntentOutcome::Scheduled)
    }

    /// Drop a scheduled write for `key` (line removed); in-flight writes run on
    pub fn cancel(&self, key: &LineKey) {
        if let Some(prev) = self.inner.pending.lock().remove(key) {
            prev.timer.cancel();
            tracing::debug!(%key, "Scheduled quantity write cancelled");
        }
        let in_flight = self.inner.in_flight.lock();
        if !in_flight.contains_key(key) {
            self.inner.write_locks.lock().remove(key);
        }
    }

    /// Keys with a scheduled or in-flight write
    pub fn pending_keys(&self) -> Vec<LineKey> {
        let mut keys: BTreeSet<LineKey> = self.inner.pending.lock().keys().cloned().collect();
        keys.extend(self.inner.in_flight.lock().keys().cloned());
        keys.into_iter().collect()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.pending.lock().is_empty() && self.inner.in_flight.lock().is_empty()
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> usize {
        self.inner.write_locks.lock().len()
    }

    /// Cancel every timer that has not fired; later intents are ignored
    pub fn dispose(&self) {
        self.inner.shutdown.cancel();
        let dropped = {
            let mut pending = self.inner.pending.lock();
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            tracing::debug!(dropped, "Quantity debouncer disposed");
        }
    }
}

impl Drop for QuantityDebouncer {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

async fn run_timer(inner: Arc<Inner>, key: LineKey, timer: CancellationToken) {
    tokio::select! {
        _ = timer.cancelled() => return,
        _ = tokio::time::sleep(inner.window) => {}
    }

    // 定时器已触发：取出最终数量，此后不可取消
    let (desired, seq) = {
        let mut pending = inner.pending.lock();
        if timer.is_cancelled() {
            return;
        }
        let Some(mutation) = pending.remove(&key) else {
            return;
        };
        *inner.in_flight.lock().entry(key.clone()).or_default() += 1;
        (mutation.desired, mutation.seq)
    };

    write(&inner, &key, desired, seq).await;

    if let Err(e) = inner.session.reconcile().await {
        tracing::warn!(%key, error = %e, "Reconcile after quantity write failed");
        inner
            .session
            .bus
            .notify(Notice::warning(ErrorCode::SyncFailed, e.user_message()));
    }
    // Quote is re-fired on every settlement, even if the reconcile failed
    inner.session.refresh_quote();

    let mut in_flight = inner.in_flight.lock();
    if let Some(n) = in_flight.get_mut(&key) {
        *n -= 1;
        if *n == 0 {
            in_flight.remove(&key);
            // 最后一个写入者：释放该 key 的写锁
            let mut locks = inner.write_locks.lock();
            if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(&key);
            }
        }
    }
}

async fn write(inner: &Inner, key: &LineKey, desired: u32, seq: u64) {
    let lock = inner
        .write_locks
        .lock()
        .entry(key.clone())
        .or_default()
        .clone();
    let _guard = lock.lock().await;

    let store = &inner.session.store;
    let bus = &inner.session.bus;
    let update = CartItemUpdate::for_key(key, desired);
    tracing::debug!(%key, quantity = desired, "Writing quantity");

    match bounded(inner.timeout, inner.cart.update_quantity(&update)).await {
        Ok(()) => {
            store.confirm_quantity(key, desired);
            store.settle(key, seq);
            tracing::info!(%key, quantity = desired, "Quantity saved");
            bus.publish(CartEvent::QuantitySettled {
                key: key.clone(),
                quantity: desired,
                confirmed: true,
            });
        }
        Err(e) => match e.stock_conflict() {
            Some(details) => {
                let settled = store.settle(key, seq);
                let (quantity, message) = match details.available {
                    Some(available) => {
                        // 只有当前 overlay 仍是本次写入时才回落到库存上限
                        if settled && available > 0 {
                            store.confirm_quantity(key, available);
                        }
                        (available, format!("Only {available} left in stock"))
                    }
                    None => (desired, e.user_message()),
                };
                tracing::warn!(
                    %key,
                    requested = desired,
                    available = ?details.available,
                    "Stock conflict on quantity write"
                );
                bus.notify(Notice::warning(ErrorCode::InsufficientStock, message));
                bus.publish(CartEvent::QuantitySettled {
                    key: key.clone(),
                    quantity,
                    confirmed: false,
                });
            }
            None => {
                store.settle(key, seq);
                report_failure(inner, key, desired, &e);
            }
        },
    }
}

fn report_failure(inner: &Inner, key: &LineKey, desired: u32, e: &ClientError) {
    tracing::error!(%key, quantity = desired, error = %e, "Quantity write failed");
    let code = match e.code() {
        ErrorCode::Unknown => ErrorCode::SyncFailed,
        code => code,
    };
    let bus = &inner.session.bus;
    bus.notify(Notice::error(code, e.user_message()));
    bus.publish(CartEvent::QuantitySettled {
        key: key.clone(),
        quantity: desired,
        confirmed: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFailure, FakeServices, line, snapshot};
    use crate::config::ClientConfig;

    fn key(s: &str) -> LineKey {
        s.parse().unwrap()
    }

    async fn setup(fakes: &FakeServices) -> (Arc<CartSession>, QuantityDebouncer) {
        let config = ClientConfig::default()
            .with_quantity_debounce(Duration::from_millis(400))
            .with_duplicate_click_window(Duration::from_millis(100));
        let services = fakes.services();
        let session = Arc::new(CartSession::new(config, &services));
        session.store.load().await.unwrap();
        let debouncer = QuantityDebouncer::new(session.clone(), services.cart.clone());
        (session, debouncer)
    }

    async fn settle(debouncer: &QuantityDebouncer) {
        while !debouncer.is_idle() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_write() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        for q in 3..=7 {
            assert_eq!(debouncer.request(&k, q), Ok(IntentOutcome::Scheduled));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(session.store.line(&k).unwrap().quantity, 7);
        assert_eq!(debouncer.pending_keys(), vec![k.clone()]);
        assert_eq!(fakes.cart.update_count(), 0);

        settle(&debouncer).await;
        let updates = fakes.cart.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].quantity, 7);
        assert_eq!(session.store.line(&k).unwrap().quantity, 7);
        assert!(debouncer.pending_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_rejects_without_network() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 3)]));
        let (session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        assert_eq!(debouncer.request(&k, 0), Err(QuantityError::BelowMinimum));
        assert_eq!(
            debouncer.request(&k, 4),
            Err(QuantityError::ExceedsStock { available: 3 })
        );
        assert!(matches!(
            debouncer.request(&key("P9:no-size"), 1),
            Err(QuantityError::UnknownLine(_))
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fakes.cart.update_count(), 0);
        assert_eq!(session.store.line(&k).unwrap().quantity, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_click_dropped() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (_session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        assert_eq!(debouncer.request(&k, 3), Ok(IntentOutcome::Scheduled));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(debouncer.request(&k, 3), Ok(IntentOutcome::Duplicate));
        assert_eq!(debouncer.request(&k, 2), Ok(IntentOutcome::Scheduled));

        settle(&debouncer).await;
        assert_eq!(fakes.cart.updates().len(), 1);
        assert_eq!(fakes.cart.updates()[0].quantity, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_conflict_clamps_and_reconciles() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let mut events = session.bus.subscribe();
        let k = key("P1:no-size");

        fakes.cart.fail_updates(Some(FakeFailure::Stock { available: 4 }));
        debouncer.request(&k, 8).unwrap();
        settle(&debouncer).await;

        // Reconcile restored the server quantity
        assert_eq!(session.store.line(&k).unwrap().quantity, 2);
        assert_eq!(fakes.cart.fetch_count(), 2);

        let mut warned = false;
        while let Ok(event) = events.try_recv() {
            if let CartEvent::Notice(n) = event {
                warned |= n.code == Some(ErrorCode::InsufficientStock);
            }
        }
        assert!(warned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_conflict_shows_available_when_reconcile_fails() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let mut events = session.bus.subscribe();
        let k = key("P1:no-size");

        fakes.cart.fail_fetch(true);
        fakes.cart.fail_updates(Some(FakeFailure::Stock { available: 4 }));
        debouncer.request(&k, 8).unwrap();
        settle(&debouncer).await;

        // Only the clamp can have moved the line off 2
        let line = session.store.line(&k).unwrap();
        assert_eq!(line.quantity, 4);
        assert!(!session.store.has_overlay(&k));

        let mut settled = Vec::new();
        let mut messages = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                CartEvent::QuantitySettled { quantity, confirmed, .. } => {
                    settled.push((quantity, confirmed))
                }
                CartEvent::Notice(n) if n.code == Some(ErrorCode::InsufficientStock) => {
                    messages.push(n.message)
                }
                _ => {}
            }
        }
        assert_eq!(settled, vec![(4, false)]);
        assert_eq!(messages, vec!["Only 4 left in stock".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stock_conflict_without_count_keeps_service_message() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let mut events = session.bus.subscribe();
        let k = key("P1:no-size");

        fakes.cart.fail_fetch(true);
        fakes.cart.fail_updates(Some(FakeFailure::StockUnknown {
            message: "Sold out for now".into(),
        }));
        debouncer.request(&k, 5).unwrap();
        settle(&debouncer).await;

        // No count to clamp to: optimistic value dropped, confirmed kept
        assert_eq!(session.store.line(&k).unwrap().quantity, 2);

        let mut settled = Vec::new();
        let mut messages = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                CartEvent::QuantitySettled { quantity, confirmed, .. } => {
                    settled.push((quantity, confirmed))
                }
                CartEvent::Notice(n) if n.code == Some(ErrorCode::InsufficientStock) => {
                    messages.push(n.message)
                }
                _ => {}
            }
        }
        assert_eq!(settled, vec![(5, false)]);
        assert_eq!(messages, vec!["Sold out for now".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_rolls_back() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        fakes.cart.fail_updates(Some(FakeFailure::Server("boom".into())));
        debouncer.request(&k, 5).unwrap();
        assert_eq!(session.store.line(&k).unwrap().quantity, 5);

        settle(&debouncer).await;
        assert_eq!(session.store.line(&k).unwrap().quantity, 2);
        assert!(!session.store.has_overlay(&k));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_treated_as_failure() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        fakes.cart.set_update_latency(Duration::from_secs(60));
        debouncer.request(&k, 5).unwrap();
        settle(&debouncer).await;
        assert_eq!(session.store.line(&k).unwrap().quantity, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_write_waits_for_in_flight() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        fakes.cart.set_update_latency(Duration::from_secs(1));
        debouncer.request(&k, 3).unwrap();
        // First write fired and is in flight
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fakes.cart.update_count(), 1);
        debouncer.request(&k, 6).unwrap();

        settle(&debouncer).await;
        let quantities: Vec<u32> = fakes.cart.updates().iter().map(|u| u.quantity).collect();
        assert_eq!(quantities, vec![3, 6]);
        assert_eq!(fakes.cart.max_concurrent_updates(), 1);
        assert_eq!(session.store.line(&k).unwrap().quantity, 6);
        assert_eq!(debouncer.write_lock_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_keys_are_independent() {
        let fakes = FakeServices::new(snapshot(vec![
            line("P1", None, 2, 100, 10),
            line("P2", Some("S1"), 1, 50, 10),
        ]));
        let (_session, debouncer) = setup(&fakes).await;

        debouncer.request(&key("P1:no-size"), 3).unwrap();
        debouncer.request(&key("P2:S1"), 2).unwrap();
        assert_eq!(debouncer.pending_keys().len(), 2);

        settle(&debouncer).await;
        assert_eq!(fakes.cart.update_count(), 2);
        assert_eq!(debouncer.write_lock_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_locks_released_after_each_burst() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (_session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        for q in 3..=6 {
            debouncer.request(&k, q).unwrap();
            settle(&debouncer).await;
            assert_eq!(debouncer.write_lock_count(), 0);
        }
        assert_eq!(fakes.cart.update_count(), 4);

        debouncer.request(&k, 7).unwrap();
        debouncer.cancel(&k);
        assert_eq!(debouncer.write_lock_count(), 0);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_timers() {
        let fakes = FakeServices::new(snapshot(vec![line("P1", None, 2, 100, 10)]));
        let (_session, debouncer) = setup(&fakes).await;
        let k = key("P1:no-size");

        debouncer.request(&k, 3).unwrap();
        debouncer.dispose();
        assert_eq!(debouncer.request(&k, 4), Ok(IntentOutcome::Disposed));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fakes.cart.update_count(), 0);
    }
}
