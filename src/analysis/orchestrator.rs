//! Deep analysis of product requests and activation of its results.
//!
//! [`Orchestrator::resolve_single`] is the entry point used by converters for a single row:
//!
//! 1. the row access gate, before any network call,
//! 2. the [`fast_path`](crate::analysis::fast_path) classification,
//! 3. otherwise a deferred candidate wrapping [`Orchestrator::analyze`].
//!
//! [`Orchestrator::analyze`] appends service parameters to the request, looks up or fills the
//! [`AnalysisCache`], applies client side report analyzers and hands the report to the file menu
//! builder.

use std::{collections::BTreeMap, fmt, sync::Arc};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    analysis::{
        cache::{AnalysisCache, CachedAnalysis, Fingerprint},
        fast_path::quick_classify,
        progress::ProgressRegistry,
        report::FileAnalysisReport,
    },
    candidate::{
        Activation, AnalysisJob, CandidateKind, DataTypeHint, DisplayCandidate, PendingResult,
    },
    constants::{
        FastMap, LOADING_MSG, META_ANALYZER_COLUMNS, META_ANALYZER_ID, META_ANALYZER_PARAMS,
        NO_ACCESS_MSG,
    },
    dataprod_errors::DataProdError,
    env_state::DataProdEnv,
    menu::{
        file_menu::{make_error_result, process_analysis_result, FileMenuInput},
        service_descriptor::resolve_params,
    },
    options::FactoryOptions,
    request::ProductRequest,
    services::InspectService,
    store::{DataProductsEvent, SelectionStore},
    table::{ServiceParam, TableModel},
    watcher::token::CancellationToken,
};

/// Client side post-processing of a report, registered under a `dataProductsAnalyzerId`.
///
/// Consulted when the inspect service names an analyzer it could not run itself.
pub trait ReportAnalyzer: Send + Sync {
    fn analyze(&self, report: FileAnalysisReport, table: &TableModel, row: usize) -> FileAnalysisReport;
}

impl<F> ReportAnalyzer for F
where
    F: Fn(FileAnalysisReport, &TableModel, usize) -> FileAnalysisReport + Send + Sync,
{
    fn analyze(&self, report: FileAnalysisReport, table: &TableModel, row: usize) -> FileAnalysisReport {
        self(report, table, row)
    }
}

/// One inspect call. A response without a report keeps the file format of the response.
async fn inspect_analysis(
    inspect: Arc<dyn InspectService>,
    request: ProductRequest,
    params: BTreeMap<String, String>,
) -> Result<CachedAnalysis, DataProdError> {
    info!(request = %request, "inspect call");
    let response = inspect.inspect(&request, &params).await?;
    let report = response.report()?.unwrap_or_else(|| FileAnalysisReport {
        file_format: response.file_format,
        ..Default::default()
    });
    Ok(CachedAnalysis {
        cache_handle: response.cache_handle,
        file_format: response.file_format,
        report: Arc::new(report),
    })
}

/// Analyzer parameters declared by a table: `AnalyzerId`, the `k=v,k=v` pairs of
/// `AnalyzerParams` and the row values of the `AnalyzerColumns` columns.
pub fn analyzer_params(table: &TableModel, row: usize) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(id) = table.meta_entry(META_ANALYZER_ID) {
        params.insert("analyzerId".to_string(), id.to_string());
    }
    if let Some(raw) = table.meta_entry(META_ANALYZER_PARAMS) {
        for pair in raw.split(',') {
            if let Some((k, v)) = pair.split_once('=') {
                params.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
    }
    if let Some(cols) = table.meta_entry(META_ANALYZER_COLUMNS) {
        for col in cols.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if let Some(v) = table.cell(row, col) {
                params.insert(col.to_string(), v.to_string());
            }
        }
    }
    params
}

/// Copy of `request` with service parameters and user input appended to its URL.
///
/// Arguments
/// -----------------
/// * `request`: The service request.
/// * `ser_def_params`: Parameters declared by the service descriptor. Literal values come first,
///   then column references resolved from `row`.
/// * `table`, `row`: Source of the column references.
/// * `user_input`: Values typed by the user; empty values are skipped.
///
/// Return
/// ----------
/// * The request unchanged when there is nothing to append, else the new request.
pub fn apply_service_params(
    request: &ProductRequest,
    ser_def_params: &[ServiceParam],
    table: &TableModel,
    row: usize,
    user_input: Option<&BTreeMap<String, String>>,
) -> Result<ProductRequest, DataProdError> {
    let mut params = resolve_params(ser_def_params, table, row);
    if let Some(input) = user_input {
        params.extend(
            input
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }
    if params.is_empty() {
        return Ok(request.clone());
    }
    request.with_query_params(&params)
}

/// Owner of the analysis cache and of the collaborators used by deep analyses.
///
/// Cheap to clone; clones share the cache, the progress registry and the store.
#[derive(Clone)]
pub struct Orchestrator {
    env: DataProdEnv,
    cache: Arc<AnalysisCache>,
    progress: Arc<ProgressRegistry>,
    store: Arc<SelectionStore>,
    client_analyzers: Arc<FastMap<String, Arc<dyn ReportAnalyzer>>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", &self.cache)
            .field("client_analyzers", &self.client_analyzers.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(env: DataProdEnv, store: Arc<SelectionStore>) -> Self {
        Orchestrator {
            env,
            cache: Arc::new(AnalysisCache::new()),
            progress: Arc::new(ProgressRegistry::new()),
            store,
            client_analyzers: Arc::new(FastMap::default()),
        }
    }

    /// Register a client side analyzer for reports naming `analyzer_id`.
    pub fn with_client_analyzer(mut self, analyzer_id: impl Into<String>, analyzer: Arc<dyn ReportAnalyzer>) -> Self {
        Arc::make_mut(&mut self.client_analyzers).insert(analyzer_id.into(), analyzer);
        self
    }

    pub fn env(&self) -> &DataProdEnv {
        &self.env
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub fn store(&self) -> &Arc<SelectionStore> {
        &self.store
    }

    /// Forward a progress event of the inspect service to the containers waiting on `url`.
    pub fn report_progress(&self, url: &str, progress: &str) {
        let dp_ids = self.progress.subscribers(url);
        self.store.update_working_message(&dp_ids, url, progress);
    }

    /// Candidate for one row pointing directly at a product.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container the result is for.
    /// * `table`, `row`: The source row.
    /// * `request`: Request locating the product.
    /// * `content_type`: Content type declared by the table, if any.
    /// * `options`: Factory options of the converter.
    /// * `token`: Abort flag of the resolution the candidate belongs to.
    ///
    /// Return
    /// ----------
    /// * An access message, a fast path candidate, or a deferred candidate running
    ///   [`Orchestrator::analyze`].
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_single(
        &self,
        dp_id: &str,
        table: &Arc<TableModel>,
        row: usize,
        request: ProductRequest,
        content_type: Option<&str>,
        options: &FactoryOptions,
        token: &CancellationToken,
    ) -> DisplayCandidate {
        if !self.env.row_access.has_row_access(table, row) {
            debug!(tbl_id = %table.tbl_id, row, "row access denied");
            return DisplayCandidate::message(NO_ACCESS_MSG);
        }
        if let Some(quick) = quick_classify(&request, content_type, row) {
            debug!(request = %request, "fast path classification");
            return quick;
        }

        let hint = DataTypeHint::from(options.data_type_hint.as_deref().unwrap_or_default());
        let job = AnalysisJob::new(table.clone(), row, request.clone()).with_hint(hint);
        let this = self.clone();
        let dp_id = dp_id.to_string();
        let options = options.clone();
        let token = token.clone();
        let pending =
            PendingResult::new(async move { this.analyze(&dp_id, &job, &options, None, &token).await });
        DisplayCandidate::deferred(LOADING_MSG, pending, Some(request))
    }

    /// Deep analysis of one job, producing a file menu candidate or a message.
    ///
    /// Identical requests (same signature and user input) are inspected once; later ones reuse the
    /// cached report. Failures are reported as messages and never cached.
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container receiving progress updates and remembering the file menu key.
    /// * `job`: Request, source row and service parameters.
    /// * `options`: Factory options.
    /// * `user_input`: Service parameters typed by the user.
    /// * `token`: Abort flag; once aborted the file menu key is no longer recorded.
    ///
    /// Return
    /// ----------
    /// * The active entry of the file menu, or a message.
    pub async fn analyze(
        &self,
        dp_id: &str,
        job: &AnalysisJob,
        options: &FactoryOptions,
        user_input: Option<&BTreeMap<String, String>>,
        token: &CancellationToken,
    ) -> DisplayCandidate {
        if !self.env.row_access.has_row_access(&job.table, job.row) {
            return DisplayCandidate::message(NO_ACCESS_MSG);
        }
        let request = match apply_service_params(
            &job.request,
            &job.ser_def_params,
            &job.table,
            job.row,
            user_input,
        ) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "cannot build service request");
                return make_error_result(&e.to_string(), None, job.request.url());
            }
        };

        let fp = Fingerprint::of(&request, user_input);
        let url = request.url().map(str::to_string);
        if let Some(u) = &url {
            self.progress.watch(u, dp_id);
        }

        let inspect = self.env.inspect.clone();
        let params = analyzer_params(&job.table, job.row);
        let to_inspect = request.clone();
        let outcome = self
            .cache
            .get_or_inspect(fp, options.single_flight, move || {
                inspect_analysis(inspect, to_inspect, params)
            })
            .await;

        if let Some(u) = &url {
            self.progress.cancel(u, dp_id);
        }

        let analysis = match outcome {
            Ok(a) => a,
            Err(e) => {
                warn!(request = %request, error = %e, "inspect failed");
                let mut m = make_error_result(
                    &e.to_string(),
                    Some(&request.display_file_name()),
                    request.url(),
                );
                if let Some(msg) = m.as_message_mut() {
                    msg.bad_url = request.url().map(str::to_string);
                }
                return m;
            }
        };

        let report = self.post_process(&analysis.report, &job.table, job.row);
        let input = FileMenuInput {
            table: &job.table,
            row: job.row,
            request: &request,
            cache_handle: &analysis.cache_handle,
            report: &report,
            data_type_hint: &job.data_type_hint,
            options,
        };
        let resolution = process_analysis_result(&input, |key| {
            self.store.get_active_file_menu_key_by_key(dp_id, key)
        });
        if token.is_aborted() {
            debug!(dp_id, request = %request, "analysis of a superseded resolution, keys left as is");
            return resolution.candidate;
        }
        if let Some(change) = resolution.active_key_change {
            self.store.dispatch(DataProductsEvent::UpdateActiveKey {
                dp_id: dp_id.to_string(),
                menu_key_changes: Vec::new(),
                file_menu_key_changes: vec![change],
            });
        }
        resolution.candidate
    }

    fn post_process(
        &self,
        report: &Arc<FileAnalysisReport>,
        table: &TableModel,
        row: usize,
    ) -> Arc<FileAnalysisReport> {
        if report.analyzer_found {
            return report.clone();
        }
        let analyzer = report
            .data_products_analyzer_id
            .as_deref()
            .and_then(|id| self.client_analyzers.get(id));
        match analyzer {
            Some(a) => {
                debug!(analyzer_id = ?report.data_products_analyzer_id, "client side analyzer");
                Arc::new(a.analyze((**report).clone(), table, row))
            }
            None => report.clone(),
        }
    }

    /// Run an `Analyze` entry picked from a menu and publish its result.
    ///
    /// A working message keeping the menu is published first. The result is then applied to the
    /// store, unless `token` was aborted meanwhile:
    ///
    /// * a message (other than a single download offer) keeps the menu and resets the menu key,
    /// * a browser redirect becomes a `"Loaded in new tab"` message,
    /// * a file menu is activated through [`DataProductsEvent::ActivateFileMenuItem`].
    ///
    /// Arguments
    /// -----------------
    /// * `dp_id`: Container showing the menu.
    /// * `job`: The job of the picked entry.
    /// * `menu`: The menu the entry was picked from.
    /// * `options`: Factory options.
    /// * `user_input`: Service parameters typed by the user.
    /// * `token`: Abort flag of the container's current resolution.
    pub async fn activate_analysis(
        &self,
        dp_id: &str,
        job: &AnalysisJob,
        menu: Option<Vec<DisplayCandidate>>,
        options: &FactoryOptions,
        user_input: Option<&BTreeMap<String, String>>,
        token: &CancellationToken,
    ) {
        if token.is_aborted() {
            return;
        }
        let lookup = self
            .store
            .get_data_products(dp_id)
            .and_then(|d| d.active_menu_lookup_key);
        let mut working = DisplayCandidate::working_message(LOADING_MSG, Some(&job.request));
        working.menu = menu.clone();
        working.active_menu_lookup_key = lookup.clone();
        if let Some(k) = &job.menu_key {
            working.menu_key = k.clone();
        }
        self.store.dispatch(DataProductsEvent::UpdateProducts {
            dp_id: dp_id.to_string(),
            candidate: working,
        });

        let result = self.analyze(dp_id, job, options, user_input, token).await;
        if token.is_aborted() {
            debug!(dp_id, "analysis result dropped, resolution aborted");
            return;
        }
        self.do_activate_result(dp_id, job, result, menu, lookup);
    }

    fn do_activate_result(
        &self,
        dp_id: &str,
        job: &AnalysisJob,
        result: DisplayCandidate,
        menu: Option<Vec<DisplayCandidate>>,
        lookup: Option<String>,
    ) {
        let single_download = result.as_message().is_some_and(|m| m.single_download);
        let event = match result.kind {
            CandidateKind::Message(_) if !single_download => {
                let mut m = result;
                if let Some(msg) = m.as_message_mut() {
                    msg.reset_menu_key = job.menu_key.clone();
                }
                m.menu = menu;
                m.active_menu_lookup_key = lookup;
                if let Some(k) = &job.menu_key {
                    m.menu_key = k.clone();
                }
                DataProductsEvent::UpdateProducts {
                    dp_id: dp_id.to_string(),
                    candidate: m,
                }
            }
            CandidateKind::SendToBrowser { .. } => {
                let mut m = DisplayCandidate::message("Loaded in new tab");
                m.menu = menu;
                m.active_menu_lookup_key = lookup;
                DataProductsEvent::UpdateProducts {
                    dp_id: dp_id.to_string(),
                    candidate: m,
                }
            }
            _ => match result.file_menu {
                Some(file_menu) => DataProductsEvent::ActivateFileMenuItem {
                    dp_id: dp_id.to_string(),
                    file_menu,
                    new_key: None,
                    menu,
                    current_menu_key: job.menu_key.clone(),
                },
                None => {
                    let mut c = result;
                    c.menu = menu;
                    c.active_menu_lookup_key = lookup;
                    DataProductsEvent::UpdateProducts {
                        dp_id: dp_id.to_string(),
                        candidate: c,
                    }
                }
            },
        };
        self.store.dispatch(event);
    }

    /// Image grid of several rows.
    ///
    /// Every row with access is analyzed; rows whose report has at least one image part become
    /// grid entries.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: Source table; its highlighted row must be among the image rows.
    /// * `rows`: `(row, request)` of each visible row.
    /// * `options`: Factory options.
    ///
    /// Return
    /// ----------
    /// * An `Image` candidate carrying an [`Activation::ImageGrid`], or a message flagged
    ///   `grid_not_supported`.
    pub async fn analysis_grid(
        &self,
        table: &Arc<TableModel>,
        rows: Vec<(usize, ProductRequest)>,
        options: &FactoryOptions,
    ) -> DisplayCandidate {
        let accessible: Vec<_> = rows
            .into_iter()
            .filter(|(row, _)| self.env.row_access.has_row_access(table, *row))
            .collect();

        let analyses = join_all(accessible.iter().map(|(row, request)| {
            let fp = Fingerprint::of(request, None);
            let inspect = self.env.inspect.clone();
            let params = analyzer_params(table, *row);
            let request = request.clone();
            self.cache.get_or_inspect(fp, options.single_flight, move || {
                inspect_analysis(inspect, request, params)
            })
        }))
        .await;

        let mut image_rows = Vec::new();
        let mut requests = Vec::new();
        for ((row, request), outcome) in accessible.iter().zip(analyses) {
            match outcome {
                Ok(a) if a.report.image_part_count() > 0 => {
                    image_rows.push(*row);
                    requests.push(
                        request
                            .to_file_request(&a.cache_handle)
                            .with_plot_id(format!("{}-gridplot-{row}", table.tbl_id)),
                    );
                }
                Ok(_) => {}
                Err(e) => debug!(row, error = %e, "grid row not analyzed"),
            }
        }

        if !image_rows.contains(&table.highlighted_row) {
            let mut m = DisplayCandidate::message("This product cannot be shown in image grid");
            if let Some(msg) = m.as_message_mut() {
                msg.grid_not_supported = true;
            }
            return m;
        }
        let activate = Activation::ImageGrid {
            requests,
            tbl_id: table.tbl_id.clone(),
        };
        DisplayCandidate::image("Image", Some(activate), None, "image-grid-0")
    }
}

#[cfg(test)]
mod orchestrator_test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        analysis::report::{FileFormat, InspectResponse},
        candidate::DisplayType,
        services::{DatalinkFetcher, InspectService},
    };

    struct CountingInspect {
        calls: AtomicUsize,
        report: String,
    }

    #[async_trait]
    impl InspectService for CountingInspect {
        async fn inspect(
            &self,
            _request: &ProductRequest,
            _analyzer_params: &BTreeMap<String, String>,
        ) -> Result<InspectResponse, DataProdError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(InspectResponse {
                cache_handle: "${upload}/x.fits".into(),
                file_format: FileFormat::Fits,
                analysis_result: self.report.clone(),
            })
        }
    }

    struct NoDatalink;

    #[async_trait]
    impl DatalinkFetcher for NoDatalink {
        async fn fetch_datalink(&self, url: &str, _tbl_id: &str) -> Result<TableModel, DataProdError> {
            Err(DataProdError::DatalinkFetchFailed {
                url: url.into(),
                reason: "none".into(),
            })
        }
    }

    const IMAGE_REPORT: &str = r#"{"fileFormat": "FITS", "parts": [
        {"index": 0, "type": "Image", "naxis": [10, 10]}
    ]}"#;

    fn orchestrator(report: &str) -> (Orchestrator, Arc<CountingInspect>) {
        let inspect = Arc::new(CountingInspect {
            calls: AtomicUsize::new(0),
            report: report.to_string(),
        });
        let env = DataProdEnv::new(inspect.clone(), Arc::new(NoDatalink));
        (Orchestrator::new(env, Arc::new(SelectionStore::new())), inspect)
    }

    fn source() -> Arc<TableModel> {
        Arc::new(
            TableModel::new("src", &["url", "band"], vec![vec!["https://x.org/a.fits".into(), "g".into()]])
                .with_meta(META_ANALYZER_ID, "sed-analyzer")
                .with_meta(META_ANALYZER_PARAMS, "mode=fast, level=2")
                .with_meta(META_ANALYZER_COLUMNS, "band"),
        )
    }

    #[tokio::test]
    async fn test_missing_report_keeps_file_format() {
        let (_, inspect) = orchestrator("");
        let a = inspect_analysis(
            inspect.clone(),
            ProductRequest::from_url("https://x.org/a.fits"),
            BTreeMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(a.report.file_format, FileFormat::Fits);
        assert!(a.report.parts().is_empty());
        assert_eq!(inspect.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_analyzer_params() {
        let p = analyzer_params(&source(), 0);
        assert_eq!(p.get("analyzerId").map(String::as_str), Some("sed-analyzer"));
        assert_eq!(p.get("level").map(String::as_str), Some("2"));
        assert_eq!(p.get("band").map(String::as_str), Some("g"));
    }

    #[test]
    fn test_apply_service_params() {
        let params = vec![
            ServiceParam {
                name: "BAND".into(),
                col_name: Some("band".into()),
                ..Default::default()
            },
            ServiceParam {
                name: "FMT".into(),
                value: Some("fits".into()),
                ..Default::default()
            },
        ];
        let mut input = BTreeMap::new();
        input.insert("SIZE".to_string(), "0.1".to_string());
        input.insert("EMPTY".to_string(), " ".to_string());
        let r = apply_service_params(
            &ProductRequest::from_url("https://x.org/svc"),
            &params,
            &source(),
            0,
            Some(&input),
        )
        .unwrap();
        assert_eq!(r.url(), Some("https://x.org/svc?FMT=fits&BAND=g&SIZE=0.1"));
    }

    #[tokio::test]
    async fn test_resolve_single_deferred_then_cached() {
        let (orch, inspect) = orchestrator(IMAGE_REPORT);
        let table = source();
        let options = FactoryOptions::default();
        let request = ProductRequest::from_url("https://x.org/a.fits");

        let token = CancellationToken::new();
        let first = orch.resolve_single("dp", &table, 0, request.clone(), None, &options, &token);
        let CandidateKind::Deferred(d) = first.kind else {
            panic!("expected a deferred candidate");
        };
        let a = d.pending.wait().await;
        assert_eq!(a.display_type(), DisplayType::Image);
        assert!(a.file_menu.is_some());

        let job = AnalysisJob::new(table.clone(), 0, request);
        let b = orch.analyze("dp", &job, &options, None, &token).await;
        assert_eq!(a, b);
        assert_eq!(inspect.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_report_is_not_cached() {
        let (orch, inspect) = orchestrator("");
        let job = AnalysisJob::new(source(), 0, ProductRequest::from_url("https://x.org/a.fits"));
        let options = FactoryOptions::default();
        for _ in 0..2 {
            let c = orch.analyze("dp", &job, &options, None, &CancellationToken::new()).await;
            assert!(c.as_message().unwrap().message.contains("Could not parse file"));
        }
        assert_eq!(inspect.calls.load(Ordering::SeqCst), 2);
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn test_client_analyzer_applied() {
        let report = r#"{"fileFormat": "FITS", "analyzerFound": false, "dataProductsAnalyzerId": "drop-all",
            "parts": [{"index": 0, "type": "Image", "naxis": [10, 10]}]}"#;
        let (orch, _) = orchestrator(report);
        let drop_all = |mut r: FileAnalysisReport, _: &TableModel, _: usize| {
            r.parts = Some(Vec::new());
            r
        };
        let orch = orch.with_client_analyzer("drop-all", Arc::new(drop_all));
        let job = AnalysisJob::new(source(), 0, ProductRequest::from_url("https://x.org/a.fits"));
        let c = orch
            .analyze("dp", &job, &FactoryOptions::default(), None, &CancellationToken::new())
            .await;
        assert_eq!(c.as_message().unwrap().message, "Cannot analyze file");
    }

    #[tokio::test]
    async fn test_activation_keeps_menu_on_message() {
        let (orch, _) = orchestrator("");
        let job = AnalysisJob::new(source(), 0, ProductRequest::from_url("https://x.org/a.fits"))
            .with_menu_key("dlt-1");
        let menu = vec![
            DisplayCandidate::png("png", "https://x.org/a.png", "dlt-0"),
            DisplayCandidate::analyze("fits", job.clone(), "dlt-1", None),
        ];
        orch.activate_analysis(
            "dp",
            &job,
            Some(menu.clone()),
            &FactoryOptions::default(),
            None,
            &CancellationToken::new(),
        )
        .await;
        let published = orch.store().get_data_products("dp").unwrap();
        let m = published.as_message().unwrap();
        assert_eq!(m.reset_menu_key.as_deref(), Some("dlt-1"));
        assert_eq!(published.menu, Some(menu));
    }

    #[tokio::test]
    async fn test_aborted_activation_is_dropped() {
        let (orch, inspect) = orchestrator(IMAGE_REPORT);
        let job = AnalysisJob::new(source(), 0, ProductRequest::from_url("https://x.org/a.fits"));
        let token = CancellationToken::new();
        token.abort();
        orch.activate_analysis("dp", &job, None, &FactoryOptions::default(), None, &token)
            .await;
        assert!(orch.store().state("dp").is_none());
        assert_eq!(inspect.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_aborted_analysis_leaves_file_menu_keys() {
        let (orch, inspect) = orchestrator(IMAGE_REPORT);
        let job = AnalysisJob::new(source(), 0, ProductRequest::from_url("https://x.org/a.fits"));
        let token = CancellationToken::new();
        token.abort();
        let c = orch
            .analyze("dp", &job, &FactoryOptions::default(), None, &token)
            .await;
        assert!(c.file_menu.is_some());
        assert_eq!(inspect.calls.load(Ordering::SeqCst), 1);
        assert!(orch.store().state("dp").is_none());

        orch.analyze("dp", &job, &FactoryOptions::default(), None, &CancellationToken::new())
            .await;
        assert_eq!(orch.store().state("dp").unwrap().active_file_menu_keys.len(), 1);
    }
}
