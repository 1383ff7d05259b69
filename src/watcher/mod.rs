//! # Change watcher
//!
//! One [`ChangeWatcher`] per container follows the table and viewer events of that container and
//! starts a new resolution whenever the displayed products may have changed:
//!
//! 1. the previous resolution is cancelled through its [`CancellationToken`],
//! 2. the registry picks the converter of the watched table,
//! 3. the entry point matching the viewer layout runs,
//! 4. deferred candidates are settled and every step is published to the selection store.
//!
//! A paused watcher ignores events, except that unmounting the viewer always pauses and
//! mounting it (or the first row becoming available) always resumes. Removing the watched table,
//! or its last row, publishes `"No Data Products"` and stops the watcher.
//!
//! ## See also
//! ------------
//! * [`token::settle`] – Deferred chaining with cancellation.
//! * [`crate::converter::Converter::resolve`] – Layout dispatch.

pub mod token;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    analysis::orchestrator::Orchestrator,
    candidate::{Activation, CandidateKind, DisplayCandidate},
    constants::{DpId, NO_DATA_PRODUCTS_MSG},
    converter::{Converter, ConverterRegistry, ProductContext},
    options::Layout,
    store::DataProductsEvent,
    table::TableModel,
};

use self::token::{settle, CancellationToken, ResolutionPhase};

/// Table and viewer events consumed by a watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// The highlighted row changed, or another table became the watched one.
    TableHighlight(Arc<TableModel>),
    /// Rows of the table changed (sort, filter, new data).
    TableUpdate(Arc<TableModel>),
    TableRemoved { tbl_id: String },
    ViewerMount,
    ViewerUnmount,
    LayoutChange(Layout),
    /// A table that was loading has its first row.
    FirstRowAvailable(Arc<TableModel>),
}

/// What a watcher did with one event.
#[derive(Debug)]
pub enum WatchStep {
    Ignored,
    /// A resolution was started; the handle yields its terminal phase.
    Started(JoinHandle<ResolutionPhase>),
    /// The watched table is gone.
    Stopped,
}

#[derive(Debug, Default)]
struct WatcherState {
    paused: bool,
    first_time: bool,
    token: CancellationToken,
    layout: Layout,
    table: Option<Arc<TableModel>>,
}

/// Watcher of one container.
#[derive(Debug)]
pub struct ChangeWatcher {
    dp_id: DpId,
    factory_key: Option<String>,
    registry: Arc<ConverterRegistry>,
    orchestrator: Orchestrator,
    state: WatcherState,
    phase: Arc<Mutex<ResolutionPhase>>,
}

impl ChangeWatcher {
    /// Watcher for `dp_id`, not paused, waiting for its first table.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container whose products are published.
    /// * `factory_key`: Key of the factory options used to select converters.
    /// * `registry`: Converter templates.
    /// * `orchestrator`: Analysis and store access.
    pub fn new(
        dp_id: impl Into<DpId>,
        factory_key: Option<String>,
        registry: Arc<ConverterRegistry>,
        orchestrator: Orchestrator,
    ) -> Self {
        ChangeWatcher {
            dp_id: dp_id.into(),
            factory_key,
            registry,
            orchestrator,
            state: WatcherState {
                first_time: true,
                ..Default::default()
            },
            phase: Arc::new(Mutex::new(ResolutionPhase::Idle)),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.state.layout = layout;
        self
    }

    pub fn dp_id(&self) -> &str {
        &self.dp_id
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn layout(&self) -> Layout {
        self.state.layout
    }

    /// Token of the current resolution.
    pub fn token(&self) -> &CancellationToken {
        &self.state.token
    }

    /// Phase of the latest resolution.
    pub fn phase(&self) -> ResolutionPhase {
        self.phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_phase(&self, phase: ResolutionPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn cancel(&mut self) {
        self.state.token.abort();
        self.state.token = CancellationToken::new();
    }

    fn publish(&self, candidate: DisplayCandidate) {
        self.orchestrator
            .store()
            .dispatch(DataProductsEvent::UpdateProducts {
                dp_id: self.dp_id.clone(),
                candidate,
            });
    }

    fn is_watched(&self, tbl_id: &str) -> bool {
        self.state.table.as_ref().is_some_and(|t| t.tbl_id == tbl_id)
    }

    /// Clear the container and stop watching.
    fn stop(&mut self) -> WatchStep {
        info!(dp_id = %self.dp_id, "watched table removed");
        self.state.token.abort();
        self.state.table = None;
        self.set_phase(ResolutionPhase::Aborted);
        self.publish(DisplayCandidate::message(NO_DATA_PRODUCTS_MSG));
        WatchStep::Stopped
    }

    /// Apply one event.
    ///
    /// Return
    /// ----------
    /// * [`WatchStep::Started`] when the event triggered a new resolution,
    ///   [`WatchStep::Stopped`] when the watched table is gone, else [`WatchStep::Ignored`].
    pub fn handle(&mut self, event: WatchEvent) -> WatchStep {
        match event {
            WatchEvent::ViewerUnmount => {
                debug!(dp_id = %self.dp_id, "viewer unmounted, pausing");
                self.state.paused = true;
                self.cancel();
                self.set_phase(ResolutionPhase::Aborted);
                WatchStep::Ignored
            }
            WatchEvent::ViewerMount => {
                self.state.paused = false;
                self.update()
            }
            WatchEvent::FirstRowAvailable(table) => {
                self.state.paused = false;
                self.state.table = Some(table);
                self.update()
            }
            _ if self.state.paused => WatchStep::Ignored,
            WatchEvent::TableRemoved { tbl_id } if self.is_watched(&tbl_id) => self.stop(),
            WatchEvent::TableRemoved { .. } => WatchStep::Ignored,
            WatchEvent::TableUpdate(table) if table.row_count() == 0 && self.is_watched(&table.tbl_id) => {
                self.stop()
            }
            WatchEvent::TableHighlight(table) | WatchEvent::TableUpdate(table) => {
                self.state.table = Some(table);
                self.update()
            }
            WatchEvent::LayoutChange(layout) => {
                if layout == self.state.layout && !self.state.first_time {
                    return WatchStep::Ignored;
                }
                self.state.layout = layout;
                self.update()
            }
        }
    }

    /// Cancel the running resolution and start a new one for the watched table.
    fn update(&mut self) -> WatchStep {
        let Some(table) = self.state.table.clone() else {
            return WatchStep::Ignored;
        };
        if table.row_count() == 0 {
            return WatchStep::Ignored;
        }
        self.cancel();
        self.state.first_time = false;
        self.set_phase(ResolutionPhase::Pending);
        debug!(dp_id = %self.dp_id, tbl_id = %table.tbl_id, row = table.highlighted_row, layout = ?self.state.layout, "resolving");

        let Some(converter) = self.registry.select_converter(&table, self.factory_key.as_deref()) else {
            let message = DisplayCandidate::message(NO_DATA_PRODUCTS_MSG);
            self.publish(message.clone());
            self.set_phase(ResolutionPhase::Settled(message));
            return WatchStep::Ignored;
        };

        let dp_id = self.dp_id.clone();
        let orchestrator = self.orchestrator.clone();
        let token = self.state.token.clone();
        let layout = self.state.layout;
        let phase = self.phase.clone();
        WatchStep::Started(tokio::spawn(async move {
            let result = resolve_products(&dp_id, &orchestrator, &converter, &table, layout, &token).await;
            if let ResolutionPhase::Settled(_) = &result {
                *phase.lock().unwrap_or_else(PoisonError::into_inner) = result.clone();
            }
            result
        }))
    }

    /// Consume events until the channel closes or the watched table is removed.
    pub async fn run(mut self, mut events: mpsc::Receiver<WatchEvent>) {
        while let Some(event) = events.recv().await {
            if let WatchStep::Stopped = self.handle(event) {
                break;
            }
        }
        self.state.token.abort();
        debug!(dp_id = %self.dp_id, "watcher stopped");
    }
}

/// One resolution of the products of `table`.
///
/// Every deferred step publishes its working message; the terminal candidate is published unless
/// `token` was aborted in the meantime. A terminal `Analyze` candidate is activated at once.
///
/// Arguments
/// -----------------
/// * `dp_id`: Container receiving the candidates.
/// * `orchestrator`: Analysis and store access.
/// * `converter`: Converter selected for `table`.
/// * `table`: The source table; its highlighted row is resolved.
/// * `layout`: Layout of the viewer, selecting the converter entry point.
/// * `token`: Abort flag of this resolution.
///
/// Return
/// ----------
/// * [`ResolutionPhase::Settled`] with the published candidate, or [`ResolutionPhase::Aborted`].
pub async fn resolve_products(
    dp_id: &str,
    orchestrator: &Orchestrator,
    converter: &Converter,
    table: &Arc<TableModel>,
    layout: Layout,
    token: &CancellationToken,
) -> ResolutionPhase {
    let ctx = ProductContext {
        dp_id,
        orchestrator,
        token,
    };
    let first = converter.resolve(ctx, table, layout).await;
    let store = orchestrator.store();
    let result = settle(first, token, |working| {
        if !token.is_aborted() {
            store.dispatch(DataProductsEvent::UpdateProducts {
                dp_id: dp_id.to_string(),
                candidate: working,
            });
        }
    })
    .await;

    let ResolutionPhase::Settled(candidate) = &result else {
        debug!(dp_id, "late result dropped");
        return result;
    };
    // a newer resolution may have started since `settle` returned
    if token.is_aborted() {
        debug!(dp_id, "late result dropped");
        return ResolutionPhase::Aborted;
    }
    store.dispatch(DataProductsEvent::UpdateProducts {
        dp_id: dp_id.to_string(),
        candidate: candidate.clone(),
    });
    if let CandidateKind::Analyze(analyze) = &candidate.kind {
        if let Some(Activation::Analysis(job)) = &analyze.activate {
            orchestrator
                .activate_analysis(dp_id, job, candidate.menu.clone(), &converter.options, None, token)
                .await;
        }
    }
    result
}

/// Start a watcher on its own task.
///
/// Return
/// ----------
/// * The sender feeding the watcher and the handle of its task.
pub fn spawn_watcher(watcher: ChangeWatcher, buffer: usize) -> (mpsc::Sender<WatchEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (tx, tokio::spawn(watcher.run(rx)))
}
