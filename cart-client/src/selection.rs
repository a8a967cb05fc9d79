//! Selection Set
//!
//! Line keys the user intends to buy now. The set only stores keys; line
//! data is always read from the current snapshot, so a selection never
//! carries stale prices or quantities.

use rust_decimal::Decimal;
use shared::models::{CartLine, CartSnapshot, LineKey};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    keys: BTreeSet<LineKey>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or remove one key
    pub fn toggle(&mut self, key: LineKey, included: bool) {
        if included {
            self.keys.insert(key);
        } else {
            self.keys.remove(&key);
        }
    }

    /// Select every purchasable line of `snapshot`, or clear the set
    ///
    /// Turning all off clears everything, including keys of lines that are
    /// no longer in the snapshot.
    pub fn toggle_all(&mut self, included: bool, snapshot: &CartSnapshot) {
        self.keys.clear();
        if included {
            self.keys.extend(selectable_keys(snapshot));
        }
    }

    /// Select every purchasable line of one shop, or deselect all its lines
    pub fn toggle_shop(&mut self, shop: &str, included: bool, snapshot: &CartSnapshot) {
        for line in shop_lines(snapshot, shop) {
            if !included {
                self.keys.remove(&line.key());
            } else if line.is_purchasable() {
                self.keys.insert(line.key());
            }
        }
    }

    /// Shop checkbox state, same rule as [`Self::all_checked`] within one shop
    pub fn shop_checked(&self, shop: &str, snapshot: &CartSnapshot) -> bool {
        let mut selectable = shop_lines(snapshot, shop)
            .filter(|line| line.is_purchasable())
            .peekable();
        selectable.peek().is_some() && selectable.all(|line| self.keys.contains(&line.key()))
    }

    /// Shops with at least one selected line
    pub fn selected_shops(&self, snapshot: &CartSnapshot) -> BTreeSet<String> {
        self.selected_lines(snapshot)
            .iter()
            .map(|line| line.shop_key().to_string())
            .collect()
    }

    /// Subtotal of the selected lines of one shop
    pub fn shop_subtotal(&self, shop: &str, snapshot: &CartSnapshot) -> Decimal {
        shop_lines(snapshot, shop)
            .filter(|line| self.keys.contains(&line.key()))
            .map(CartLine::line_total)
            .sum()
    }

    /// Replace the selection with exactly one key (Buy Now)
    pub fn select_only(&mut self, key: LineKey) {
        self.keys.clear();
        self.keys.insert(key);
    }

    pub fn remove(&mut self, key: &LineKey) -> bool {
        self.keys.remove(key)
    }

    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a LineKey>) {
        for key in keys {
            self.keys.remove(key);
        }
    }

    pub fn contains(&self, key: &LineKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> Vec<LineKey> {
        self.keys.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True iff every selectable line of `snapshot` is selected
    ///
    /// False when nothing is selectable.
    pub fn all_checked(&self, snapshot: &CartSnapshot) -> bool {
        let mut selectable = selectable_keys(snapshot).peekable();
        selectable.peek().is_some() && selectable.all(|key| self.keys.contains(&key))
    }

    /// Drop keys whose line vanished or is no longer purchasable
    ///
    /// Returns the removed keys.
    pub fn prune(&mut self, snapshot: &CartSnapshot) -> Vec<LineKey> {
        let removed: Vec<LineKey> = self
            .keys
            .iter()
            .filter(|key| !snapshot.line(key).is_some_and(CartLine::is_purchasable))
            .cloned()
            .collect();
        for key in &removed {
            self.keys.remove(key);
        }
        removed
    }

    /// Selected lines in cart order
    pub fn selected_lines<'a>(&self, snapshot: &'a CartSnapshot) -> Vec<&'a CartLine> {
        snapshot
            .items
            .iter()
            .filter(|line| self.keys.contains(&line.key()))
            .collect()
    }

    pub fn selected_quantity(&self, snapshot: &CartSnapshot) -> u32 {
        self.selected_lines(snapshot)
            .iter()
            .map(|line| line.quantity)
            .sum()
    }

    pub fn selected_subtotal(&self, snapshot: &CartSnapshot) -> Decimal {
        self.selected_lines(snapshot)
            .iter()
            .map(|line| line.line_total())
            .sum()
    }
}

fn selectable_keys(snapshot: &CartSnapshot) -> impl Iterator<Item = LineKey> + '_ {
    snapshot
        .items
        .iter()
        .filter(|line| line.is_purchasable())
        .map(CartLine::key)
}

fn shop_lines<'a>(snapshot: &'a CartSnapshot, shop: &'a str) -> impl Iterator<Item = &'a CartLine> {
    snapshot.items.iter().filter(move |line| line.shop_key() == shop)
}
