//! # Selection state store
//!
//! A reducer-style store partitioned by container id (`dpId`). Every mutation goes through
//! [`SelectionStore::dispatch`] with a [`DataProductsEvent`]; the per-container transition is the
//! pure [`SelectionState::reduce`].
//!
//! Published candidates are also broadcast, so a host can follow what each container shows
//! without polling:
//!
//! ```rust,ignore
//! let mut rx = store.subscribe();
//! while let Ok((dp_id, candidate)) = rx.recv().await {
//!     render(&dp_id, &candidate);
//! }
//! ```

pub mod state;

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, trace};

pub use state::{DataProductsEvent, SearchParams, SelectionState};

use crate::{
    candidate::DisplayCandidate,
    constants::{DpId, FastMap, LookupKey, MenuKey},
    menu::MenuMemory,
};

const PUBLISH_CAPACITY: usize = 64;

pub struct SelectionStore {
    states: Mutex<FastMap<DpId, SelectionState>>,
    published: broadcast::Sender<(DpId, DisplayCandidate)>,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.lock().len();
        f.debug_struct("SelectionStore").field("containers", &n).finish()
    }
}

impl SelectionStore {
    pub fn new() -> Self {
        let (published, _) = broadcast::channel(PUBLISH_CAPACITY);
        SelectionStore {
            states: Mutex::new(FastMap::default()),
            published,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FastMap<DpId, SelectionState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Receive every candidate published by any container.
    pub fn subscribe(&self) -> broadcast::Receiver<(DpId, DisplayCandidate)> {
        self.published.subscribe()
    }

    /// Apply one event.
    ///
    /// The container state is created on first reference. When the published candidate changes,
    /// it is broadcast to subscribers.
    pub fn dispatch(&self, event: DataProductsEvent) {
        let Some(dp_id) = event.dp_id().map(str::to_string) else {
            debug!("selection store reinit");
            self.lock().clear();
            return;
        };
        let published = {
            let mut states = self.lock();
            let current = states.entry(dp_id.clone()).or_default();
            let next = current.reduce(&event);
            if next == *current {
                trace!(dp_id, "event without effect");
                return;
            }
            let changed = next.data_products != current.data_products;
            *current = next;
            changed.then(|| current.data_products.clone()).flatten()
        };
        if let Some(candidate) = published {
            // no subscriber is not an error
            let _ = self.published.send((dp_id, candidate));
        }
    }

    /// Copy of the state of a container.
    pub fn state(&self, dp_id: &str) -> Option<SelectionState> {
        self.lock().get(dp_id).cloned()
    }

    pub fn get_data_products(&self, dp_id: &str) -> Option<DisplayCandidate> {
        self.lock().get(dp_id).and_then(|s| s.data_products.clone())
    }

    pub fn get_active_menu_key(&self, dp_id: &str, lookup_key: &str) -> Option<MenuKey> {
        self.lock()
            .get(dp_id)
            .and_then(|s| s.active_menu_keys.get(lookup_key).cloned())
    }

    pub fn get_active_file_menu_key_by_key(&self, dp_id: &str, lookup_key: &str) -> Option<MenuKey> {
        self.lock()
            .get(dp_id)
            .and_then(|s| s.active_file_menu_keys.get(lookup_key).cloned())
    }

    pub fn get_current_active_key_id(&self, dp_id: &str) -> Option<LookupKey> {
        self.lock()
            .get(dp_id)
            .and_then(|s| s.current_active_key_id.clone())
    }

    pub fn get_service_descriptor_activate_status(&self, dp_id: &str, id: &str) -> bool {
        self.lock()
            .get(dp_id)
            .and_then(|s| s.service_descriptor_activate_status.get(id).copied())
            .unwrap_or(false)
    }

    pub fn get_search_params(&self, dp_id: &str) -> Vec<SearchParams> {
        self.lock()
            .get(dp_id)
            .map(|s| s.search_params.clone())
            .unwrap_or_default()
    }

    /// Append a progress note to the working message of every listed container showing `url`.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_ids`: Containers watching `url`.
    /// * `url`: URL of the request in progress.
    /// * `progress`: Human readable progress, e.g. `"40%"`.
    pub fn update_working_message(&self, dp_ids: &[DpId], url: &str, progress: &str) {
        for dp_id in dp_ids {
            if self.state(dp_id).is_none() {
                continue;
            }
            self.dispatch(DataProductsEvent::UpdateProgress {
                dp_id: dp_id.clone(),
                url: url.to_string(),
                progress: progress.to_string(),
            });
        }
    }

    /// Snapshot of the keys of one container, for menu construction.
    pub fn memory(&self, dp_id: &str) -> StoreMemory {
        let state = self.state(dp_id).unwrap_or_default();
        StoreMemory {
            active_menu_keys: state.active_menu_keys,
            current_active_key_id: state.current_active_key_id,
        }
    }
}

/// Keys of one container captured at a point in time.
#[derive(Debug, Clone, Default)]
pub struct StoreMemory {
    active_menu_keys: FastMap<LookupKey, MenuKey>,
    current_active_key_id: Option<LookupKey>,
}

impl MenuMemory for StoreMemory {
    fn active_menu_key(&self, lookup_key: &str) -> Option<MenuKey> {
        self.active_menu_keys.get(lookup_key).cloned()
    }

    fn current_active_key_id(&self) -> Option<LookupKey> {
        self.current_active_key_id.clone()
    }
}

#[cfg(test)]
mod store_test {
    use super::*;
    use crate::request::ProductRequest;

    #[test]
    fn test_lazy_init_and_reinit() {
        let store = SelectionStore::new();
        assert!(store.state("dp").is_none());
        store.dispatch(DataProductsEvent::Init { dp_id: "dp".into() });
        assert_eq!(store.state("dp"), Some(SelectionState::default()));
        store.dispatch(DataProductsEvent::Reinit);
        assert!(store.state("dp").is_none());
    }

    #[test]
    fn test_containers_are_isolated() {
        let store = SelectionStore::new();
        store.dispatch(DataProductsEvent::UpdateProducts {
            dp_id: "a".into(),
            candidate: DisplayCandidate::message("for a"),
        });
        assert!(store.get_data_products("b").is_none());
        assert_eq!(store.get_data_products("a").unwrap().name, "for a");
    }

    #[test]
    fn test_working_message_progress() {
        let store = SelectionStore::new();
        let r = ProductRequest::from_url("https://x.org/a.fits");
        store.dispatch(DataProductsEvent::UpdateProducts {
            dp_id: "dp".into(),
            candidate: DisplayCandidate::working_message("Loading...", Some(&r)),
        });
        store.update_working_message(&["dp".to_string()], "https://x.org/other", "10%");
        assert_eq!(store.get_data_products("dp").unwrap().name, "Loading...");
        store.update_working_message(&["dp".to_string()], "https://x.org/a.fits", "10%");
        let dp = store.get_data_products("dp").unwrap();
        assert_eq!(dp.as_message().unwrap().message, "Loading... - 10%");
        assert!(dp.is_working_state());
    }

    #[tokio::test]
    async fn test_publish_broadcast() {
        let store = SelectionStore::new();
        let mut rx = store.subscribe();
        store.dispatch(DataProductsEvent::UpdateProducts {
            dp_id: "dp".into(),
            candidate: DisplayCandidate::message("hello"),
        });
        // same candidate again: no second broadcast
        store.dispatch(DataProductsEvent::UpdateProducts {
            dp_id: "dp".into(),
            candidate: DisplayCandidate::message("hello"),
        });
        let (dp_id, c) = rx.recv().await.unwrap();
        assert_eq!(dp_id, "dp");
        assert_eq!(c.name, "hello");
        assert!(rx.try_recv().is_err());
    }
}
