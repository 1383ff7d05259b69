#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use dataprod::{
    analysis::report::{FileFormat, InspectResponse},
    constants::FastMap,
    dataprod::DataProd,
    dataprod_errors::DataProdError,
    env_state::DataProdEnv,
    request::ProductRequest,
    services::{DatalinkFetcher, InspectService, RowAccess},
    table::TableModel,
};

pub const IMAGE_REPORT: &str = r#"{"fileFormat": "FITS", "parts": [
    {"index": 0, "type": "Image", "desc": "SCI", "naxis": [100, 100]}
]}"#;

pub const HEADER_ONLY_REPORT: &str = r#"{"fileFormat": "FITS", "parts": [
    {"index": 0, "type": "HeaderOnly", "desc": "Primary"},
    {"index": 1, "type": "HeaderOnly", "desc": "EXT"}
]}"#;

/// Inspect service answering every request with the same report, counting its calls.
pub struct ScriptedInspect {
    pub calls: AtomicUsize,
    pub report: String,
}

impl ScriptedInspect {
    pub fn new(report: &str) -> Arc<Self> {
        Arc::new(ScriptedInspect {
            calls: AtomicUsize::new(0),
            report: report.to_string(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InspectService for ScriptedInspect {
    async fn inspect(
        &self,
        request: &ProductRequest,
        _analyzer_params: &BTreeMap<String, String>,
    ) -> Result<InspectResponse, DataProdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(InspectResponse {
            cache_handle: format!("${{upload}}/{}", request.display_file_name()),
            file_format: FileFormat::Fits,
            analysis_result: self.report.clone(),
        })
    }
}

/// Datalink tables served from memory, keyed by URL.
#[derive(Default)]
pub struct MemoryDatalink {
    pub tables: FastMap<String, TableModel>,
}

#[async_trait]
impl DatalinkFetcher for MemoryDatalink {
    async fn fetch_datalink(&self, url: &str, tbl_id: &str) -> Result<TableModel, DataProdError> {
        self.tables
            .get(url)
            .cloned()
            .map(|mut t| {
                t.tbl_id = tbl_id.to_string();
                t
            })
            .ok_or_else(|| DataProdError::DatalinkFetchFailed {
                url: url.to_string(),
                reason: "not found".into(),
            })
    }
}

/// Holds every call on one URL until [`Gate::release`].
pub struct Gate {
    url: String,
    started: Notify,
    open: Semaphore,
}

impl Gate {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Gate {
            url: url.to_string(),
            started: Notify::new(),
            open: Semaphore::new(0),
        })
    }

    async fn pass(&self, url: Option<&str>) {
        if url == Some(self.url.as_str()) {
            self.started.notify_one();
            let _permit = self.open.acquire().await.expect("gate semaphore closed");
        }
    }

    /// Wait until a call reached the gate.
    pub async fn reached(&self) {
        self.started.notified().await;
    }

    pub fn release(&self) {
        self.open.add_permits(1);
    }
}

/// [`ScriptedInspect`] whose calls on the gated URL wait for the gate.
pub struct GatedInspect {
    pub inner: Arc<ScriptedInspect>,
    pub gate: Arc<Gate>,
}

#[async_trait]
impl InspectService for GatedInspect {
    async fn inspect(
        &self,
        request: &ProductRequest,
        analyzer_params: &BTreeMap<String, String>,
    ) -> Result<InspectResponse, DataProdError> {
        self.gate.pass(request.url()).await;
        self.inner.inspect(request, analyzer_params).await
    }
}

/// [`MemoryDatalink`] whose fetches of the gated URL wait for the gate.
pub struct GatedDatalink {
    pub inner: MemoryDatalink,
    pub gate: Arc<Gate>,
}

#[async_trait]
impl DatalinkFetcher for GatedDatalink {
    async fn fetch_datalink(&self, url: &str, tbl_id: &str) -> Result<TableModel, DataProdError> {
        self.gate.pass(Some(url)).await;
        self.inner.fetch_datalink(url, tbl_id).await
    }
}

pub struct DenyAll;

impl RowAccess for DenyAll {
    fn has_row_access(&self, _table: &TableModel, _row: usize) -> bool {
        false
    }
}

pub const DL_COLUMNS: [&str; 7] = [
    "ID",
    "access_url",
    "semantics",
    "content_type",
    "content_length",
    "description",
    "local_semantics",
];

/// Datalink row: `(id, url, semantics, content_type, content_length)`.
pub fn dl_row(id: &str, url: &str, semantics: &str, content_type: &str, length: &str) -> Vec<String> {
    vec![
        id.into(),
        url.into(),
        semantics.into(),
        content_type.into(),
        length.into(),
        String::new(),
        String::new(),
    ]
}

pub fn datalink_table(rows: Vec<Vec<String>>) -> TableModel {
    TableModel::new("dl", &DL_COLUMNS, rows)
}

pub const DL_FORMAT: &str = "application/x-votable+xml;content=datalink";

/// One-row ObsCore table.
pub fn obscore_table(access_url: &str, access_format: &str, product_type: &str) -> Arc<TableModel> {
    Arc::new(TableModel::new(
        "obscore",
        &["obs_id", "access_url", "access_format", "dataproduct_type"],
        vec![vec![
            "obs1".into(),
            access_url.into(),
            access_format.into(),
            product_type.into(),
        ]],
    ))
}

/// Context over a scripted inspect service and in-memory datalink tables.
pub fn context(report: &str, datalink: MemoryDatalink) -> (DataProd, Arc<ScriptedInspect>) {
    let inspect = ScriptedInspect::new(report);
    let env = DataProdEnv::new(inspect.clone(), Arc::new(datalink));
    (DataProd::new(env), inspect)
}

/// Context whose inspect calls on `gated_url` wait for the returned gate.
pub fn gated_inspect_context(report: &str, gated_url: &str) -> (DataProd, Arc<Gate>) {
    let gate = Gate::new(gated_url);
    let inspect = GatedInspect {
        inner: ScriptedInspect::new(report),
        gate: gate.clone(),
    };
    let env = DataProdEnv::new(Arc::new(inspect), Arc::new(MemoryDatalink::default()));
    (DataProd::new(env), gate)
}

/// Context whose datalink fetches of `gated_url` wait for the returned gate.
pub fn gated_datalink_context(report: &str, datalink: MemoryDatalink, gated_url: &str) -> (DataProd, Arc<Gate>) {
    let gate = Gate::new(gated_url);
    let datalink = GatedDatalink {
        inner: datalink,
        gate: gate.clone(),
    };
    let env = DataProdEnv::new(ScriptedInspect::new(report), Arc::new(datalink));
    (DataProd::new(env), gate)
}

pub fn datalink_with(url: &str, table: TableModel) -> MemoryDatalink {
    let mut dl = MemoryDatalink::default();
    dl.tables.insert(url.to_string(), table);
    dl
}

/// Log to the test output; `RUST_LOG=dataprod=debug` shows the engine's decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
