//! Shipping Quote Calculator
//!
//! Debounced fee lookup for (address, selected lines). Every input change
//! moves the quote to [`ShippingQuote::Calculating`] before anything else is
//! shown, and results of superseded requests are discarded by generation.

use crate::api::ShippingService;
use crate::bus::EventBus;
use crate::http::bounded;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::message::CartEvent;
use shared::models::{SelectedItem, ShippingQuoteRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shipping fee as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShippingQuote {
    /// No address chosen or nothing selected
    #[default]
    NotApplicable,
    /// Inputs changed, new fee not resolved yet
    Calculating,
    Known(Decimal),
    /// The service failed or returned no fee
    Unavailable,
}

impl ShippingQuote {
    pub fn fee(&self) -> Option<Decimal> {
        match self {
            Self::Known(fee) => Some(*fee),
            _ => None,
        }
    }

    pub fn is_calculating(&self) -> bool {
        matches!(self, Self::Calculating)
    }
}

#[derive(Debug, Default)]
struct CalcState {
    generation: u64,
    pending: Option<CancellationToken>,
    disposed: bool,
}

struct Shared {
    state: Mutex<CalcState>,
    tx: watch::Sender<ShippingQuote>,
    bus: EventBus,
}

impl Shared {
    fn set(&self, quote: ShippingQuote) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == quote {
                return false;
            }
            *current = quote;
            true
        });
        if changed {
            self.bus.publish(CartEvent::ShippingQuoteChanged {
                fee: quote.fee(),
                calculating: quote.is_calculating(),
            });
        }
    }
}

pub struct ShippingQuoteCalculator {
    service: Arc<dyn ShippingService>,
    debounce: Duration,
    timeout: Duration,
    shared: Arc<Shared>,
}

impl ShippingQuoteCalculator {
    pub fn new(
        service: Arc<dyn ShippingService>,
        bus: EventBus,
        debounce: Duration,
        timeout: Duration,
    ) -> Self {
        let (tx, _) = watch::channel(ShippingQuote::NotApplicable);
        Self {
            service,
            debounce,
            timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(CalcState::default()),
                tx,
                bus,
            }),
        }
    }

    pub fn current(&self) -> ShippingQuote {
        *self.shared.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShippingQuote> {
        self.shared.tx.subscribe()
    }

    /// Invalidate the current quote and schedule a new lookup
    ///
    /// With no address or no lines the quote becomes
    /// [`ShippingQuote::NotApplicable`] at once and nothing is sent.
    pub fn recompute(&self, address_id: Option<String>, items: Vec<SelectedItem>) {
        let (generation, token) = {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return;
            }
            state.generation += 1;
            if let Some(prev) = state.pending.take() {
                prev.cancel();
            }
            let token = CancellationToken::new();
            state.pending = Some(token.clone());
            (state.generation, token)
        };

        let Some(address_id) = address_id.filter(|_| !items.is_empty()) else {
            self.shared.set(ShippingQuote::NotApplicable);
            return;
        };

        self.shared.set(ShippingQuote::Calculating);

        let request = ShippingQuoteRequest {
            address_id,
            selected_items: items,
        };
        let service = self.service.clone();
        let shared = self.shared.clone();
        let debounce = self.debounce;
        let timeout = self.timeout;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }

            tracing::debug!(generation, address_id = %request.address_id, "Requesting shipping quote");
            let quote = match bounded(timeout, service.quote(&request)).await {
                Ok(Some(fee)) => ShippingQuote::Known(fee),
                Ok(None) => ShippingQuote::Unavailable,
                Err(e) => {
                    tracing::warn!(generation, error = %e, "Shipping quote failed");
                    ShippingQuote::Unavailable
                }
            };

            let mut state = shared.state.lock();
            if state.generation != generation {
                tracing::debug!(generation, "Discarding stale shipping quote");
                return;
            }
            state.pending = None;
            // generation 校验与发布在同一把锁内
            shared.set(quote);
        });
    }

    /// Wait until the quote is no longer calculating
    pub async fn resolve(&self) -> ShippingQuote {
        let mut rx = self.subscribe();
        match rx.wait_for(|q| !q.is_calculating()).await {
            Ok(quote) => *quote,
            Err(_) => self.current(),
        }
    }

    /// Cancel the pending lookup and stop accepting new ones
    ///
    /// A quote still calculating falls back to
    /// [`ShippingQuote::NotApplicable`], so [`Self::resolve`] returns.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        state.disposed = true;
        state.generation += 1;
        if let Some(token) = state.pending.take() {
            token.cancel();
        }
        if self.current().is_calculating() {
            self.shared.set(ShippingQuote::NotApplicable);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeShipping;

    fn item(product: &str, qty: u32) -> SelectedItem {
        SelectedItem {
            product_id: product.into(),
            size_id: None,
            quantity: qty,
            unit_price: Decimal::from(100),
            is_flash_sale: false,
        }
    }

    fn calculator(fake: &Arc<FakeShipping>) -> ShippingQuoteCalculator {
        ShippingQuoteCalculator::new(
            fake.clone(),
            EventBus::new(),
            Duration::from_millis(500),
            Duration::from_secs(15),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_applicable_without_inputs() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        let calc = calculator(&fake);

        calc.recompute(None, vec![item("P1", 1)]);
        assert_eq!(calc.current(), ShippingQuote::NotApplicable);
        calc.recompute(Some("addr-1".into()), vec![]);
        assert_eq!(calc.current(), ShippingQuote::NotApplicable);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_single_request() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        let calc = calculator(&fake);

        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        calc.recompute(Some("addr-1".into()), vec![item("P1", 2)]);
        calc.recompute(Some("addr-2".into()), vec![item("P1", 3)]);
        assert_eq!(calc.current(), ShippingQuote::Calculating);

        assert_eq!(calc.resolve().await, ShippingQuote::Known(Decimal::from(30)));
        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].address_id, "addr-2");
        assert_eq!(calls[0].selected_items[0].quantity, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_fee_is_known() {
        let fake = Arc::new(FakeShipping::new(Decimal::ZERO));
        let calc = calculator(&fake);
        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        assert_eq!(calc.resolve().await, ShippingQuote::Known(Decimal::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_unavailable_without_retry() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        fake.fail(true);
        let calc = calculator(&fake);

        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        assert_eq!(calc.resolve().await, ShippingQuote::Unavailable);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_discarded() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        fake.set_latency(Duration::from_secs(2));
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let calc = ShippingQuoteCalculator::new(
            fake.clone(),
            bus,
            Duration::from_millis(500),
            Duration::from_secs(15),
        );

        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        // First request is now in flight
        tokio::time::sleep(Duration::from_millis(600)).await;
        fake.set_fee(Decimal::from(45));
        calc.recompute(Some("addr-2".into()), vec![item("P1", 1)]);

        assert_eq!(calc.resolve().await, ShippingQuote::Known(Decimal::from(45)));
        assert_eq!(fake.call_count(), 2);

        let mut shown = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CartEvent::ShippingQuoteChanged { fee: Some(fee), .. } = event {
                shown.push(fee);
            }
        }
        assert_eq!(shown, vec![Decimal::from(45)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        let calc = calculator(&fake);
        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        calc.dispose();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fake.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_returns_after_dispose() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        fake.set_latency(Duration::from_secs(2));
        let calc = calculator(&fake);

        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        // Request in flight, its result will be discarded
        tokio::time::sleep(Duration::from_millis(600)).await;
        calc.dispose();

        let quote = tokio::time::timeout(Duration::from_secs(1), calc.resolve()).await;
        assert_eq!(quote, Ok(ShippingQuote::NotApplicable));

        calc.recompute(Some("addr-1".into()), vec![item("P1", 2)]);
        assert_eq!(calc.current(), ShippingQuote::NotApplicable);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_keeps_known_fee() {
        let fake = Arc::new(FakeShipping::new(Decimal::from(30)));
        let calc = calculator(&fake);
        calc.recompute(Some("addr-1".into()), vec![item("P1", 1)]);
        calc.resolve().await;
        calc.dispose();
        assert_eq!(calc.current(), ShippingQuote::Known(Decimal::from(30)));
    }
}
