//! # DataProd: the application context
//!
//! [`DataProd`] owns everything the resolution engine shares between containers:
//!
//! 1. the [`ConverterRegistry`] and the factory options registered per factory key,
//! 2. the [`SelectionStore`] holding the published candidate of each container,
//! 3. the [`Orchestrator`] with its analysis cache and progress registry.
//!
//! Hosts create one context, start a [`ChangeWatcher`] per container and forward the user's menu
//! choices through [`DataProd::activate_menu_item`] and [`DataProd::activate_file_menu_item`].
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use std::sync::Arc;
//! use dataprod::dataprod::DataProd;
//! use dataprod::env_state::DataProdEnv;
//! # async fn demo(env: DataProdEnv, table: Arc<dataprod::table::TableModel>) {
//! let dp = DataProd::new(env);
//! let phase = dp.resolve("dp-1", table, None).await;
//! let published = dp.store().get_data_products("dp-1");
//! # }
//! ```
//!
//! ## See also
//! ------------
//! * [`crate::watcher`] – Event driven resolutions.
//! * [`crate::store`] – Queries over the published state.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    analysis::orchestrator::{Orchestrator, ReportAnalyzer},
    candidate::{Activation, CandidateKind, DisplayCandidate},
    constants::{DpId, FastMap, MenuKey, NO_DATA_PRODUCTS_MSG},
    converter::ConverterRegistry,
    env_state::DataProdEnv,
    options::{FactoryOptions, Layout},
    store::{DataProductsEvent, SearchParams, SelectionStore},
    table::TableModel,
    watcher::{
        resolve_products,
        token::{CancellationToken, ResolutionPhase},
        ChangeWatcher,
    },
};

/// Per container settings and the token of its running resolution.
#[derive(Debug, Clone, Default)]
struct Container {
    factory_key: Option<String>,
    token: CancellationToken,
}

#[derive(Debug)]
pub struct DataProd {
    registry: Arc<ConverterRegistry>,
    store: Arc<SelectionStore>,
    orchestrator: Orchestrator,
    containers: Mutex<FastMap<DpId, Container>>,
}

impl DataProd {
    /// Context with the built-in converters.
    pub fn new(env: DataProdEnv) -> Self {
        Self::with_registry(env, ConverterRegistry::new())
    }

    /// Context with a custom registry.
    ///
    /// Arguments
    /// -----------------
    /// * `env`: Inspect, datalink and row access collaborators.
    /// * `registry`: Converter templates and factory options.
    pub fn with_registry(env: DataProdEnv, registry: ConverterRegistry) -> Self {
        let store = Arc::new(SelectionStore::new());
        DataProd {
            registry: Arc::new(registry),
            orchestrator: Orchestrator::new(env, store.clone()),
            store,
            containers: Mutex::new(FastMap::default()),
        }
    }

    /// Register a client side analyzer for reports naming `analyzer_id`.
    pub fn with_client_analyzer(mut self, analyzer_id: impl Into<String>, analyzer: Arc<dyn ReportAnalyzer>) -> Self {
        self.orchestrator = self.orchestrator.with_client_analyzer(analyzer_id, analyzer);
        self
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SelectionStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Receiver of every candidate published by the store.
    pub fn subscribe(&self) -> broadcast::Receiver<(DpId, DisplayCandidate)> {
        self.store.subscribe()
    }

    fn with_container<T>(&self, dp_id: &str, f: impl FnOnce(&mut Container) -> T) -> T {
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        f(containers.entry(dp_id.to_string()).or_default())
    }

    /// Abort the running resolution of `dp_id` and return the token of the next one.
    fn renew_token(&self, dp_id: &str) -> CancellationToken {
        self.with_container(dp_id, |c| {
            c.token.abort();
            c.token = CancellationToken::new();
            c.token.clone()
        })
    }

    fn options_for(&self, dp_id: &str) -> FactoryOptions {
        let key = self.with_container(dp_id, |c| c.factory_key.clone());
        self.registry.factory_options(key.as_deref())
    }

    /// Create the state of a container, bound to the options of `factory_key`.
    pub fn init(&self, dp_id: &str, factory_key: Option<&str>) {
        self.with_container(dp_id, |c| c.factory_key = factory_key.map(str::to_string));
        self.store.dispatch(DataProductsEvent::Init {
            dp_id: dp_id.to_string(),
        });
    }

    /// Drop the state of every container and abort their resolutions.
    pub fn reinit(&self) {
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        for c in containers.values() {
            c.token.abort();
        }
        containers.clear();
        drop(containers);
        self.store.dispatch(DataProductsEvent::Reinit);
    }

    /// Watcher for a container, using the options bound by [`DataProd::init`].
    pub fn watcher(&self, dp_id: &str) -> ChangeWatcher {
        let factory_key = self.with_container(dp_id, |c| c.factory_key.clone());
        ChangeWatcher::new(dp_id, factory_key, self.registry.clone(), self.orchestrator.clone())
    }

    /// Resolve the products of the highlighted row of `table` once, without a watcher.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container receiving the candidates.
    /// * `table`: The source table.
    /// * `layout`: Viewer layout; the converter's initial layout when `None`.
    ///
    /// Return
    /// ----------
    /// * The terminal phase of the resolution. `"No Data Products"` is settled when no converter
    ///   accepts the table.
    pub async fn resolve(&self, dp_id: &str, table: Arc<TableModel>, layout: Option<Layout>) -> ResolutionPhase {
        let token = self.renew_token(dp_id);
        let factory_key = self.with_container(dp_id, |c| c.factory_key.clone());
        let Some(converter) = self.registry.select_converter(&table, factory_key.as_deref()) else {
            let message = DisplayCandidate::message(NO_DATA_PRODUCTS_MSG);
            self.store.dispatch(DataProductsEvent::UpdateProducts {
                dp_id: dp_id.to_string(),
                candidate: message.clone(),
            });
            return ResolutionPhase::Settled(message);
        };
        let layout = layout.unwrap_or(converter.initial_layout);
        resolve_products(dp_id, &self.orchestrator, &converter, &table, layout, &token).await
    }

    /// Activate an entry of the menu of the published candidate.
    ///
    /// An `Analyze` entry starts a deep analysis of its job, with `user_input` appended to the
    /// service parameters; any other entry is promoted by the store.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container showing the menu.
    /// * `menu_key`: Key of the entry.
    /// * `user_input`: Service parameters typed by the user.
    pub async fn activate_menu_item(
        &self,
        dp_id: &str,
        menu_key: &str,
        user_input: Option<&BTreeMap<String, String>>,
    ) {
        let Some(current) = self.store.get_data_products(dp_id) else {
            return;
        };
        let Some(menu) = current.menu.clone() else {
            return;
        };
        let Some(entry) = menu.iter().find(|m| m.menu_key == menu_key) else {
            debug!(dp_id, menu_key, "menu key not found");
            return;
        };

        let job = match &entry.kind {
            CandidateKind::Analyze(a) => match &a.activate {
                Some(Activation::Analysis(job)) => Some(job.clone()),
                _ => None,
            },
            _ => None,
        };
        let Some(job) = job else {
            self.store.dispatch(DataProductsEvent::ActivateMenuItem {
                dp_id: dp_id.to_string(),
                menu_key: menu_key.to_string(),
            });
            return;
        };

        if let Some(lookup) = current.active_menu_lookup_key.clone() {
            self.store.dispatch(DataProductsEvent::UpdateActiveKey {
                dp_id: dp_id.to_string(),
                menu_key_changes: vec![(lookup, menu_key.to_string())],
                file_menu_key_changes: Vec::new(),
            });
        }
        let token = self.renew_token(dp_id);
        let options = self.options_for(dp_id);
        self.orchestrator
            .activate_analysis(dp_id, &job, Some(menu), &options, user_input, &token)
            .await;
    }

    /// Activate an entry of the file menu of the published candidate.
    pub fn activate_file_menu_item(&self, dp_id: &str, new_key: &str) {
        let Some(current) = self.store.get_data_products(dp_id) else {
            return;
        };
        let Some(file_menu) = current.file_menu else {
            return;
        };
        self.store.dispatch(DataProductsEvent::ActivateFileMenuItem {
            dp_id: dp_id.to_string(),
            file_menu,
            new_key: Some(new_key.to_string()),
            menu: current.menu,
            current_menu_key: Some(current.menu_key),
        });
    }

    /// Record a menu key under a lookup key, e.g. to restore a choice made in another session.
    pub fn set_active_menu_key(&self, dp_id: &str, lookup_key: &str, menu_key: MenuKey) {
        self.store.dispatch(DataProductsEvent::UpdateActiveKey {
            dp_id: dp_id.to_string(),
            menu_key_changes: vec![(lookup_key.to_string(), menu_key)],
            file_menu_key_changes: Vec::new(),
        });
    }

    pub fn set_search_params(&self, dp_id: &str, params: Vec<SearchParams>) {
        self.store.dispatch(DataProductsEvent::SetSearchParams {
            dp_id: dp_id.to_string(),
            params,
        });
    }

    pub fn set_service_descriptor_status(&self, dp_id: &str, id: &str, active: bool) {
        self.store.dispatch(DataProductsEvent::SetServiceDescriptorStatus {
            dp_id: dp_id.to_string(),
            id: id.to_string(),
            active,
        });
    }

    /// Forward inspect progress to every container waiting on `url`.
    pub fn report_progress(&self, url: &str, progress: &str) {
        self.orchestrator.report_progress(url, progress);
    }
}
