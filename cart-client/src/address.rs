//! 地址簿 - delivery addresses and the one chosen for checkout

use crate::ClientResult;
use crate::api::AddressService;
use crate::http::bounded;
use parking_lot::Mutex;
use shared::models::{Address, preferred_address};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct AddressState {
    list: Vec<Address>,
    chosen: Option<String>,
}

pub struct AddressBook {
    service: Arc<dyn AddressService>,
    state: Mutex<AddressState>,
    timeout: Duration,
}

impl AddressBook {
    pub fn new(service: Arc<dyn AddressService>, timeout: Duration) -> Self {
        Self {
            service,
            state: Mutex::new(AddressState::default()),
            timeout,
        }
    }

    /// Reload the address list
    ///
    /// A chosen address that still exists stays chosen; otherwise the
    /// default address (or the first one) is picked. On failure the previous
    /// list is kept. Returns true when the chosen address changed.
    pub async fn refresh(&self) -> ClientResult<bool> {
        let list = bounded(self.timeout, self.service.list_addresses()).await?;
        let mut state = self.state.lock();
        let before = state.chosen.clone();

        let kept = before
            .as_deref()
            .filter(|id| list.iter().any(|a| a.id == *id))
            .map(str::to_string);
        state.chosen = kept.or_else(|| preferred_address(&list).map(|a| a.id.clone()));
        state.list = list;

        tracing::debug!(
            count = state.list.len(),
            chosen = ?state.chosen,
            "Addresses refreshed"
        );
        Ok(state.chosen != before)
    }

    /// Choose an address by id; unknown ids are refused
    pub fn select(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if state.list.iter().any(|a| a.id == id) {
            state.chosen = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn chosen_id(&self) -> Option<String> {
        self.state.lock().chosen.clone()
    }

    pub fn chosen(&self) -> Option<Address> {
        let state = self.state.lock();
        let id = state.chosen.as_deref()?;
        state.list.iter().find(|a| a.id == id).cloned()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.state.lock().list.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().list.is_empty()
    }
}
