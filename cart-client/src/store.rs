//! CartSnapshot Store
//!
//! Two-phase state: the `confirmed` snapshot last fetched from the cart
//! service, plus an optimistic overlay of quantities not yet confirmed.
//! Readers always see [`merge`] of the two.
//!
//! ```text
//! fetch ──▶ confirmed ─┐
//!                      ├──▶ merge() ──▶ snapshot()
//! intent ──▶ overlay ──┘
//! ```

use crate::api::CartService;
use crate::bus::EventBus;
use crate::http::bounded;
use crate::ClientResult;
use parking_lot::Mutex;
use shared::message::CartEvent;
use shared::models::{CartLine, CartSnapshot, LineKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Optimistic quantity for one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayEntry {
    pub quantity: u32,
    /// Bumped on every distinct quantity; used to settle only the latest
    pub seq: u64,
}

pub type Overlay = HashMap<LineKey, OverlayEntry>;

/// Apply `overlay` on top of `confirmed`
///
/// Overlay entries for keys absent from `confirmed` are ignored.
pub fn merge(confirmed: &CartSnapshot, overlay: &Overlay) -> CartSnapshot {
    if overlay.is_empty() {
        return confirmed.clone();
    }
    CartSnapshot {
        items: confirmed
            .items
            .iter()
            .map(|line| match overlay.get(&line.key()) {
                Some(entry) if entry.quantity != line.quantity => {
                    line.with_quantity(entry.quantity)
                }
                _ => line.clone(),
            })
            .collect(),
        ..confirmed.clone()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    confirmed: CartSnapshot,
    overlay: Overlay,
    next_seq: u64,
}

pub struct CartStore {
    cart: Arc<dyn CartService>,
    state: Mutex<StoreState>,
    bus: EventBus,
    timeout: Duration,
}

impl CartStore {
    pub fn new(cart: Arc<dyn CartService>, bus: EventBus, timeout: Duration) -> Self {
        Self {
            cart,
            state: Mutex::new(StoreState::default()),
            bus,
            timeout,
        }
    }

    /// Current view (confirmed + overlay)
    pub fn snapshot(&self) -> CartSnapshot {
        let state = self.state.lock();
        merge(&state.confirmed, &state.overlay)
    }

    /// Last snapshot confirmed by the cart service
    pub fn confirmed(&self) -> CartSnapshot {
        self.state.lock().confirmed.clone()
    }

    pub fn line(&self, key: &LineKey) -> Option<CartLine> {
        let state = self.state.lock();
        let line = state.confirmed.line(key)?;
        Some(match state.overlay.get(key) {
            Some(entry) => line.with_quantity(entry.quantity),
            None => line.clone(),
        })
    }

    pub fn has_overlay(&self, key: &LineKey) -> bool {
        self.state.lock().overlay.contains_key(key)
    }

    /// Fetch the cart and replace everything, overlay included
    ///
    /// On failure the store is reset to an empty cart and the error is
    /// returned for the caller to surface.
    pub async fn load(&self) -> ClientResult<()> {
        match bounded(self.timeout, self.cart.fetch_cart()).await {
            Ok(cart) => {
                let line_count = cart.items.len();
                {
                    let mut state = self.state.lock();
                    state.confirmed = cart;
                    state.overlay.clear();
                }
                tracing::debug!(line_count, "Cart loaded");
                self.bus
                    .publish(CartEvent::SnapshotReplaced { line_count });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load cart, showing empty cart");
                {
                    let mut state = self.state.lock();
                    state.confirmed = CartSnapshot::empty();
                    state.overlay.clear();
                }
                self.bus
                    .publish(CartEvent::SnapshotReplaced { line_count: 0 });
                Err(e)
            }
        }
    }

    /// Re-fetch and replace the confirmed snapshot
    ///
    /// Overlay entries for lines that still exist are kept (their writes are
    /// still pending); entries for vanished lines are dropped. On failure
    /// the current state is kept as is.
    pub async fn reconcile(&self) -> ClientResult<()> {
        let cart = bounded(self.timeout, self.cart.fetch_cart()).await?;
        let line_count = cart.items.len();
        {
            let mut state = self.state.lock();
            state.overlay.retain(|key, _| cart.line(key).is_some());
            state.confirmed = cart;
        }
        tracing::debug!(line_count, "Cart reconciled");
        self.bus
            .publish(CartEvent::SnapshotReplaced { line_count });
        Ok(())
    }

    /// Show `quantity` for `key` until the write settles
    ///
    /// Returns the overlay sequence number, or `None` if the line is not in
    /// the cart. Calling again with the same quantity changes nothing and
    /// returns the same sequence.
    pub fn apply_optimistic(&self, key: &LineKey, quantity: u32) -> Option<u64> {
        let mut state = self.state.lock();
        state.confirmed.line(key)?;
        if let Some(entry) = state.overlay.get(key)
            && entry.quantity == quantity
        {
            return Some(entry.seq);
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.overlay.insert(key.clone(), OverlayEntry { quantity, seq });
        Some(seq)
    }

    /// Drop the overlay for `key` if it is still the one written at `seq`
    ///
    /// Returns false when a newer intent replaced it meanwhile.
    pub fn settle(&self, key: &LineKey, seq: u64) -> bool {
        let mut state = self.state.lock();
        match state.overlay.get(key) {
            Some(entry) if entry.seq == seq => {
                state.overlay.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Patch the confirmed line with a quantity the server is known to hold
    pub fn confirm_quantity(&self, key: &LineKey, quantity: u32) {
        let mut state = self.state.lock();
        if let Some(line) = state.confirmed.items.iter_mut().find(|l| &l.key() == key) {
            *line = line.with_quantity(quantity);
        }
    }
}
