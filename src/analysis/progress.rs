//! Subscriptions of containers to progress events of outstanding inspections.
//!
//! While a request is being inspected, the container that started it subscribes to progress
//! events keyed by the request URL. Each event rewrites the working message of the container as
//! `"<root message> - <progress>"`.

use std::sync::{Mutex, PoisonError};

use crate::constants::{DpId, FastMap};

#[derive(Debug, Default)]
pub struct ProgressRegistry {
    watchers: Mutex<FastMap<String, Vec<DpId>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&self, url: &str, dp_id: &str) {
        let mut w = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        let ids = w.entry(url.to_string()).or_default();
        if !ids.iter().any(|id| id == dp_id) {
            ids.push(dp_id.to_string());
        }
    }

    pub fn cancel(&self, url: &str, dp_id: &str) {
        let mut w = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ids) = w.get_mut(url) {
            ids.retain(|id| id != dp_id);
            if ids.is_empty() {
                w.remove(url);
            }
        }
    }

    /// Containers currently waiting on `url`.
    pub fn subscribers(&self, url: &str) -> Vec<DpId> {
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .unwrap_or_default()
    }
}

/// Progress message shown under a working candidate.
pub fn progress_message(root: &str, progress: &str) -> String {
    format!("{root} - {progress}")
}

#[cfg(test)]
mod progress_test {
    use super::*;

    #[test]
    fn test_watch_cancel() {
        let reg = ProgressRegistry::new();
        reg.watch("u", "dp1");
        reg.watch("u", "dp1");
        reg.watch("u", "dp2");
        assert_eq!(reg.subscribers("u"), vec!["dp1".to_string(), "dp2".to_string()]);
        reg.cancel("u", "dp1");
        reg.cancel("u", "dp2");
        assert!(reg.subscribers("u").is_empty());
        assert_eq!(progress_message("Loading...", "40%"), "Loading... - 40%");
    }
}
