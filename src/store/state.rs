//! Selection state of one container and the events mutating it.
//!
//! [`SelectionState::reduce`] is a pure function: it never mutates its input and returns the
//! next state. Events whose effect is already present return an equal state, so replaying an
//! event is harmless.

use std::collections::BTreeMap;

use crate::{
    analysis::progress::progress_message,
    candidate::{CandidateKind, DisplayCandidate, DisplayType, FileMenu},
    constants::{DpId, FastMap, LookupKey, MenuKey},
};

/// Parameters typed by the user for one service descriptor.
pub type SearchParams = BTreeMap<String, String>;

/// What is currently shown for one container, and which menu entries were picked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionState {
    /// The published candidate, `None` until something is published.
    pub data_products: Option<DisplayCandidate>,
    pub active_menu_keys: FastMap<LookupKey, MenuKey>,
    pub active_file_menu_keys: FastMap<LookupKey, MenuKey>,
    /// Lookup key of the top-level menu changed most recently.
    pub current_active_key_id: Option<LookupKey>,
    pub service_descriptor_activate_status: FastMap<String, bool>,
    pub search_params: Vec<SearchParams>,
}

/// The closed set of events accepted by the selection store.
#[derive(Debug, Clone, PartialEq)]
pub enum DataProductsEvent {
    /// Create the container state if absent.
    Init { dp_id: DpId },
    /// Replace the published candidate.
    UpdateProducts {
        dp_id: DpId,
        candidate: DisplayCandidate,
    },
    /// Merge key changes; pairs are applied in order.
    UpdateActiveKey {
        dp_id: DpId,
        menu_key_changes: Vec<(LookupKey, MenuKey)>,
        file_menu_key_changes: Vec<(LookupKey, MenuKey)>,
    },
    /// Promote a sibling of the published candidate.
    ActivateMenuItem { dp_id: DpId, menu_key: MenuKey },
    /// Promote an entry of a file menu.
    ActivateFileMenuItem {
        dp_id: DpId,
        file_menu: Box<FileMenu>,
        new_key: Option<MenuKey>,
        menu: Option<Vec<DisplayCandidate>>,
        current_menu_key: Option<MenuKey>,
    },
    SetSearchParams {
        dp_id: DpId,
        params: Vec<SearchParams>,
    },
    SetServiceDescriptorStatus {
        dp_id: DpId,
        id: String,
        active: bool,
    },
    /// Append inspect progress to the working message showing `url`.
    UpdateProgress {
        dp_id: DpId,
        url: String,
        progress: String,
    },
    /// Drop every container.
    Reinit,
}

impl DataProductsEvent {
    /// Container targeted by the event, `None` for [`DataProductsEvent::Reinit`].
    pub fn dp_id(&self) -> Option<&str> {
        match self {
            DataProductsEvent::Init { dp_id }
            | DataProductsEvent::UpdateProducts { dp_id, .. }
            | DataProductsEvent::UpdateActiveKey { dp_id, .. }
            | DataProductsEvent::ActivateMenuItem { dp_id, .. }
            | DataProductsEvent::ActivateFileMenuItem { dp_id, .. }
            | DataProductsEvent::SetSearchParams { dp_id, .. }
            | DataProductsEvent::SetServiceDescriptorStatus { dp_id, .. }
            | DataProductsEvent::UpdateProgress { dp_id, .. } => Some(dp_id),
            DataProductsEvent::Reinit => None,
        }
    }
}

fn is_file_menu_type_supported(t: DisplayType) -> bool {
    matches!(
        t,
        DisplayType::Image
            | DisplayType::Table
            | DisplayType::Chart
            | DisplayType::ChartTable
            | DisplayType::Png
            | DisplayType::Download
            | DisplayType::Message
    )
}

fn missing_activation_message(entry: &DisplayCandidate, menu: Vec<DisplayCandidate>) -> DisplayCandidate {
    let mut m = DisplayCandidate::message(format!("{} cannot be shown: nothing to activate", entry.name))
        .with_menu(menu)
        .with_menu_key(entry.menu_key.clone());
    m.active_menu_lookup_key = entry.active_menu_lookup_key.clone();
    m
}

impl SelectionState {
    /// Next state after `event`.
    ///
    /// Arguments
    /// -----------------
    /// * `event`: Any event but [`DataProductsEvent::Init`] and [`DataProductsEvent::Reinit`],
    ///   which act on the container set and leave a single state unchanged.
    ///
    /// Return
    /// ----------
    /// * The next state; equal to `self` when the event changes nothing.
    pub fn reduce(&self, event: &DataProductsEvent) -> SelectionState {
        match event {
            DataProductsEvent::Init { .. } | DataProductsEvent::Reinit => self.clone(),
            DataProductsEvent::UpdateProducts { candidate, .. } => SelectionState {
                data_products: Some(candidate.clone()),
                ..self.clone()
            },
            DataProductsEvent::UpdateActiveKey {
                menu_key_changes,
                file_menu_key_changes,
                ..
            } => self.update_active_key(menu_key_changes, file_menu_key_changes),
            DataProductsEvent::ActivateMenuItem { menu_key, .. } => self.activate_menu_item(menu_key),
            DataProductsEvent::ActivateFileMenuItem {
                file_menu,
                new_key,
                menu,
                current_menu_key,
                ..
            } => self.activate_file_menu_item(
                file_menu,
                new_key.as_deref(),
                menu.as_ref(),
                current_menu_key.as_deref(),
            ),
            DataProductsEvent::SetSearchParams { params, .. } => SelectionState {
                search_params: params.clone(),
                ..self.clone()
            },
            DataProductsEvent::SetServiceDescriptorStatus { id, active, .. } => {
                if self.service_descriptor_activate_status.get(id) == Some(active) {
                    return self.clone();
                }
                let mut next = self.clone();
                next.service_descriptor_activate_status
                    .insert(id.clone(), *active);
                next
            }
            DataProductsEvent::UpdateProgress { url, progress, .. } => self.update_progress(url, progress),
        }
    }

    /// Only a working message waiting on `url` takes the progress note.
    fn update_progress(&self, url: &str, progress: &str) -> SelectionState {
        let Some(mut current) = self.data_products.clone() else {
            return self.clone();
        };
        let CandidateKind::Message(m) = &mut current.kind else {
            return self.clone();
        };
        let Some(working) = &m.working else {
            return self.clone();
        };
        if working.request_url.as_deref() != Some(url) {
            return self.clone();
        }
        m.message = progress_message(&working.root_message, progress);
        current.name = m.message.clone();
        SelectionState {
            data_products: Some(current),
            ..self.clone()
        }
    }

    fn update_active_key(
        &self,
        menu_key_changes: &[(LookupKey, MenuKey)],
        file_menu_key_changes: &[(LookupKey, MenuKey)],
    ) -> SelectionState {
        let unchanged = |map: &FastMap<LookupKey, MenuKey>, changes: &[(LookupKey, MenuKey)]| {
            changes.iter().all(|(k, v)| map.get(k) == Some(v))
        };
        let last_key = menu_key_changes.last().map(|(k, _)| k);
        if unchanged(&self.active_menu_keys, menu_key_changes)
            && unchanged(&self.active_file_menu_keys, file_menu_key_changes)
            && (last_key.is_none() || last_key == self.current_active_key_id.as_ref())
        {
            return self.clone();
        }
        let mut next = self.clone();
        next.active_menu_keys
            .extend(menu_key_changes.iter().cloned());
        next.active_file_menu_keys
            .extend(file_menu_key_changes.iter().cloned());
        if let Some(k) = last_key {
            next.current_active_key_id = Some(k.clone());
        }
        next
    }

    fn activate_menu_item(&self, menu_key: &str) -> SelectionState {
        let Some(current) = &self.data_products else {
            return self.clone();
        };
        let Some(menu) = &current.menu else {
            return self.clone();
        };
        let Some(entry) = menu.iter().find(|m| m.menu_key == menu_key) else {
            return self.clone();
        };

        let lookup = current
            .active_menu_lookup_key
            .clone()
            .or_else(|| entry.active_menu_lookup_key.clone());
        let mut next = self.clone();
        let published = if entry.requires_activation() && entry.activation().is_none() {
            missing_activation_message(entry, menu.clone())
        } else {
            let mut promoted = entry.clone();
            promoted.menu = Some(menu.clone());
            promoted.active_menu_lookup_key = lookup.clone();
            promoted
        };
        next.data_products = Some(published);
        if let Some(lookup) = lookup {
            next.active_menu_keys.insert(lookup.clone(), menu_key.to_string());
            next.current_active_key_id = Some(lookup);
        }
        next
    }

    fn activate_file_menu_item(
        &self,
        file_menu: &FileMenu,
        new_key: Option<&str>,
        menu: Option<&Vec<DisplayCandidate>>,
        current_menu_key: Option<&str>,
    ) -> SelectionState {
        let lookup = &file_menu.active_item_lookup_key;
        let remembered = self.active_file_menu_keys.get(lookup).map(String::as_str);
        let wanted = new_key.or(remembered);
        let entry = wanted
            .and_then(|k| file_menu.menu.iter().find(|m| m.menu_key == k))
            .or_else(|| file_menu.menu.get(file_menu.initial_default_index))
            .or_else(|| file_menu.menu.first());
        let Some(entry) = entry else {
            return self.clone();
        };

        let top_menu = menu
            .cloned()
            .or_else(|| self.data_products.as_ref().and_then(|d| d.menu.clone()));
        let top_lookup = self
            .data_products
            .as_ref()
            .and_then(|d| d.active_menu_lookup_key.clone());

        let t = entry.display_type();
        let mut published = if !is_file_menu_type_supported(t) {
            DisplayCandidate::message(format!("Unsupported display type in file menu: {t}"))
        } else if entry.requires_activation() && entry.activation().is_none() {
            missing_activation_message(entry, Vec::new())
        } else {
            entry.clone()
        };
        published.file_menu = Some(Box::new(file_menu.clone()));
        published.menu = top_menu;
        published.active_menu_lookup_key = top_lookup;
        if let Some(k) = current_menu_key {
            published.menu_key = k.to_string();
        }

        let mut next = self.clone();
        next.data_products = Some(published);
        next.active_file_menu_keys
            .insert(lookup.clone(), entry.menu_key.clone());
        next
    }
}
