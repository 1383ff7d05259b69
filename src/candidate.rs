//! # Display candidates
//!
//! A [`DisplayCandidate`](crate::candidate::DisplayCandidate) describes one thing the host could
//! show for a row: an image, a table, a chart, a file to download or a message. The payload is a
//! closed sum type, [`CandidateKind`](crate::candidate::CandidateKind), with the fields required by
//! each tag carried inside its variant.
//!
//! ## Structure
//!
//! ```text
//! DisplayCandidate
//! ├── menu_key / name / size / semantics     (common)
//! ├── menu       (sibling candidates the user may switch to)
//! ├── file_menu  (entries of a deeply inspected file)
//! └── kind       (Message | Image | Table | Chart | ChartTable | Png | Download
//!                 | DownloadMenuItem | Analyze | SendToBrowser | Deferred)
//! ```
//!
//! ## Activation
//!
//! Rendering is done by the host. Candidates that need a render step carry an
//! [`Activation`](crate::candidate::Activation): a plain description of what to load, which the
//! host executes exactly once when the user opens the candidate. The only activation the engine
//! runs itself is [`Activation::Analysis`](crate::candidate::Activation::Analysis), through
//! [`DataProd::activate_analysis`](crate::dataprod::DataProd::activate_analysis).
//!
//! ## Deferred results
//!
//! [`CandidateKind::Deferred`](crate::candidate::CandidateKind::Deferred) wraps a shared pending
//! computation producing another candidate. The change watcher awaits it, re-checking its
//! cancellation token, until a terminal candidate comes out.

use std::{fmt, future::Future, sync::Arc};

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};

use crate::{
    analysis::report::FileAnalysisReport,
    constants::{LookupKey, MenuKey},
    request::ProductRequest,
    table::{ServiceParam, TableModel},
};

/// Tag of a [`CandidateKind`], handy for comparisons and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayType {
    Message,
    Image,
    Table,
    Chart,
    ChartTable,
    Png,
    Download,
    DownloadMenuItem,
    Analyze,
    SendToBrowser,
    DeferredResult,
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayType::Message => "message",
            DisplayType::Image => "image",
            DisplayType::Table => "table",
            DisplayType::Chart => "chart",
            DisplayType::ChartTable => "chart-table",
            DisplayType::Png => "png",
            DisplayType::Download => "download",
            DisplayType::DownloadMenuItem => "download-menu-item",
            DisplayType::Analyze => "analyze",
            DisplayType::SendToBrowser => "send-to-browser",
            DisplayType::DeferredResult => "deferred-result",
        };
        f.write_str(s)
    }
}

/// Hint on the kind of data a product holds, used to pick and order menu entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataTypeHint {
    #[default]
    Unspecified,
    Spectrum,
    Timeseries,
    Image,
    Cube,
    Other(String),
}

impl From<&str> for DataTypeHint {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" => DataTypeHint::Unspecified,
            "spectrum" => DataTypeHint::Spectrum,
            "timeseries" => DataTypeHint::Timeseries,
            "image" => DataTypeHint::Image,
            "cube" => DataTypeHint::Cube,
            other => DataTypeHint::Other(other.to_string()),
        }
    }
}

/// Everything needed to run a deferred deep analysis of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisJob {
    pub table: Arc<TableModel>,
    pub row: usize,
    pub request: ProductRequest,
    pub data_type_hint: DataTypeHint,
    pub ser_def_params: Vec<ServiceParam>,
    pub menu_key: Option<MenuKey>,
    pub original_title: Option<String>,
}

impl AnalysisJob {
    pub fn new(table: Arc<TableModel>, row: usize, request: ProductRequest) -> Self {
        AnalysisJob {
            table,
            row,
            request,
            data_type_hint: DataTypeHint::Unspecified,
            ser_def_params: Vec::new(),
            menu_key: None,
            original_title: None,
        }
    }

    pub fn with_hint(mut self, hint: DataTypeHint) -> Self {
        self.data_type_hint = hint;
        self
    }

    pub fn with_ser_def_params(mut self, params: Vec<ServiceParam>) -> Self {
        self.ser_def_params = params;
        self
    }

    pub fn with_menu_key(mut self, menu_key: impl Into<MenuKey>) -> Self {
        self.menu_key = Some(menu_key.into());
        self
    }

    pub fn with_original_title(mut self, title: impl Into<String>) -> Self {
        self.original_title = Some(title.into());
        self
    }
}

/// Description of the render step a candidate needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    SingleImage {
        request: ProductRequest,
        tbl_id: String,
        row: usize,
    },
    ImageGrid {
        requests: Vec<ProductRequest>,
        tbl_id: String,
    },
    RelatedImageGrid {
        requests: Vec<ProductRequest>,
        three_color: Option<[Option<ProductRequest>; 3]>,
        tbl_id: String,
    },
    Table {
        source: String,
        tbl_id: String,
        title: String,
        table_index: Option<usize>,
    },
    ChartTable {
        source: String,
        tbl_id: String,
        chart_id: String,
        title: String,
        table_index: Option<usize>,
    },
    MultiTable(Vec<Activation>),
    Analysis(Box<AnalysisJob>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub label: String,
    pub url: String,
}

/// Marks a message as interstitial feedback for outstanding work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingState {
    pub root_message: String,
    pub request_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageProduct {
    pub message: String,
    pub detail: Option<String>,
    pub download: Option<DownloadLink>,
    pub bad_url: Option<String>,
    pub file_type: Option<String>,
    pub single_download: bool,
    pub grid_not_supported: bool,
    pub reset_menu_key: Option<MenuKey>,
    pub working: Option<WorkingState>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageProduct {
    pub activate: Option<Activation>,
    pub request: Option<ProductRequest>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableProduct {
    pub activate: Option<Activation>,
    pub url: Option<String>,
    pub tbl_id: Option<String>,
    pub chart_id: Option<String>,
    /// Image view of the same part, when the part is both an image and a table.
    pub image_activate: Option<Activation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProduct {
    pub url: String,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeProduct {
    pub activate: Option<Activation>,
    pub request: ProductRequest,
    pub prod_type_hint: Option<String>,
}

/// A shared, not yet settled computation of a candidate.
#[derive(Clone)]
pub struct PendingResult(Shared<BoxFuture<'static, DisplayCandidate>>);

impl PendingResult {
    pub fn new<F>(fut: F) -> Self
    where
        F: Future<Output = DisplayCandidate> + Send + 'static,
    {
        PendingResult(fut.boxed().shared())
    }

    /// Wait for the candidate; every clone resolves to the same value.
    pub async fn wait(self) -> DisplayCandidate {
        self.0.await
    }
}

impl fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingResult").finish()
    }
}

impl PartialEq for PendingResult {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeferredProduct {
    pub message: String,
    pub request: Option<ProductRequest>,
    pub pending: PendingResult,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateKind {
    Message(MessageProduct),
    Image(ImageProduct),
    Table(TableProduct),
    Chart(TableProduct),
    ChartTable(TableProduct),
    Png { url: String },
    Download(DownloadProduct),
    DownloadMenuItem(DownloadProduct),
    Analyze(AnalyzeProduct),
    SendToBrowser { url: String },
    Deferred(DeferredProduct),
}

/// Menu of one deeply inspected file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMenu {
    pub report: Arc<FileAnalysisReport>,
    pub menu: Vec<DisplayCandidate>,
    /// Fingerprint of the originating request signature.
    pub active_item_lookup_key: LookupKey,
    pub active_item_lookup_key_origin: String,
    pub initial_default_index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayCandidate {
    pub menu_key: MenuKey,
    pub name: String,
    pub menu: Option<Vec<DisplayCandidate>>,
    pub size: Option<u64>,
    pub semantics: Option<String>,
    pub active_menu_lookup_key: Option<LookupKey>,
    pub size_warning: Option<String>,
    pub file_menu: Option<Box<FileMenu>>,
    pub kind: CandidateKind,
}

impl DisplayCandidate {
    fn with_kind(name: impl Into<String>, menu_key: impl Into<MenuKey>, kind: CandidateKind) -> Self {
        DisplayCandidate {
            menu_key: menu_key.into(),
            name: name.into(),
            menu: None,
            size: None,
            semantics: None,
            active_menu_lookup_key: None,
            size_warning: None,
            file_menu: None,
            kind,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_kind(
            message.clone(),
            "message",
            CandidateKind::Message(MessageProduct {
                message,
                ..Default::default()
            }),
        )
    }

    /// Message offering a download of the product it failed to display.
    pub fn message_with_download(
        message: impl Into<String>,
        label: Option<String>,
        url: Option<String>,
    ) -> Self {
        let mut c = Self::message(message);
        if let (CandidateKind::Message(m), Some(url)) = (&mut c.kind, url) {
            m.download = Some(DownloadLink {
                label: label.unwrap_or_else(|| "Download File".to_string()),
                url,
            });
        }
        c
    }

    /// Message explaining a failure, the detail kept apart from the headline.
    pub fn message_with_error(detail: impl Into<String>) -> Self {
        let mut c = Self::message("Error");
        if let CandidateKind::Message(m) = &mut c.kind {
            m.detail = Some(detail.into());
        }
        c
    }

    /// Interstitial message published while work is outstanding.
    pub fn working_message(message: impl Into<String>, request: Option<&ProductRequest>) -> Self {
        let message = message.into();
        let mut c = Self::message(message.clone());
        c.menu_key = "working".to_string();
        if let CandidateKind::Message(m) = &mut c.kind {
            m.working = Some(WorkingState {
                root_message: message,
                request_url: request.and_then(|r| r.url().map(str::to_string)),
            });
        }
        c
    }

    pub fn image(
        name: impl Into<String>,
        activate: Option<Activation>,
        request: Option<ProductRequest>,
        menu_key: impl Into<MenuKey>,
    ) -> Self {
        Self::with_kind(
            name,
            menu_key,
            CandidateKind::Image(ImageProduct { activate, request }),
        )
    }

    pub fn table(name: impl Into<String>, table: TableProduct, menu_key: impl Into<MenuKey>) -> Self {
        Self::with_kind(name, menu_key, CandidateKind::Table(table))
    }

    pub fn chart(name: impl Into<String>, table: TableProduct, menu_key: impl Into<MenuKey>) -> Self {
        Self::with_kind(name, menu_key, CandidateKind::Chart(table))
    }

    pub fn chart_table(
        name: impl Into<String>,
        table: TableProduct,
        menu_key: impl Into<MenuKey>,
    ) -> Self {
        Self::with_kind(name, menu_key, CandidateKind::ChartTable(table))
    }

    pub fn png(name: impl Into<String>, url: impl Into<String>, menu_key: impl Into<MenuKey>) -> Self {
        Self::with_kind(name, menu_key, CandidateKind::Png { url: url.into() })
    }

    pub fn download(
        name: impl Into<String>,
        url: impl Into<String>,
        menu_key: impl Into<MenuKey>,
        file_type: Option<&str>,
    ) -> Self {
        Self::with_kind(
            name,
            menu_key,
            CandidateKind::Download(DownloadProduct {
                url: url.into(),
                file_type: file_type.map(str::to_string),
            }),
        )
    }

    pub fn download_menu_item(
        name: impl Into<String>,
        url: impl Into<String>,
        menu_key: impl Into<MenuKey>,
        file_type: Option<&str>,
    ) -> Self {
        Self::with_kind(
            name,
            menu_key,
            CandidateKind::DownloadMenuItem(DownloadProduct {
                url: url.into(),
                file_type: file_type.map(str::to_string),
            }),
        )
    }

    pub fn analyze(
        name: impl Into<String>,
        job: AnalysisJob,
        menu_key: impl Into<MenuKey>,
        prod_type_hint: Option<String>,
    ) -> Self {
        let request = job.request.clone();
        Self::with_kind(
            name,
            menu_key,
            CandidateKind::Analyze(AnalyzeProduct {
                activate: Some(Activation::Analysis(Box::new(job))),
                request,
                prod_type_hint,
            }),
        )
    }

    pub fn send_to_browser(url: impl Into<String>) -> Self {
        Self::with_kind(
            "Show in browser",
            "send-to-browser",
            CandidateKind::SendToBrowser { url: url.into() },
        )
    }

    pub fn deferred(
        message: impl Into<String>,
        pending: PendingResult,
        request: Option<ProductRequest>,
    ) -> Self {
        let message = message.into();
        Self::with_kind(
            message.clone(),
            "deferred",
            CandidateKind::Deferred(DeferredProduct {
                message,
                request,
                pending,
            }),
        )
    }

    /// Promote `menu[index]`, keeping the full menu as its siblings.
    ///
    /// Return
    /// ----------
    /// * `None` when `index` is out of range.
    pub fn from_menu(
        menu: Vec<DisplayCandidate>,
        index: usize,
        lookup_key: impl Into<LookupKey>,
    ) -> Option<Self> {
        let mut active = menu.get(index)?.clone();
        active.active_menu_lookup_key = Some(lookup_key.into());
        active.menu = Some(menu);
        Some(active)
    }

    pub fn with_menu(mut self, menu: Vec<DisplayCandidate>) -> Self {
        self.menu = Some(menu);
        self
    }

    pub fn with_menu_key(mut self, menu_key: impl Into<MenuKey>) -> Self {
        self.menu_key = menu_key.into();
        self
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_semantics(mut self, semantics: impl Into<String>) -> Self {
        self.semantics = Some(semantics.into());
        self
    }

    pub fn with_lookup_key(mut self, key: impl Into<LookupKey>) -> Self {
        self.active_menu_lookup_key = Some(key.into());
        self
    }

    pub fn with_size_warning(mut self, warning: Option<String>) -> Self {
        self.size_warning = warning;
        self
    }

    pub fn display_type(&self) -> DisplayType {
        match &self.kind {
            CandidateKind::Message(_) => DisplayType::Message,
            CandidateKind::Image(_) => DisplayType::Image,
            CandidateKind::Table(_) => DisplayType::Table,
            CandidateKind::Chart(_) => DisplayType::Chart,
            CandidateKind::ChartTable(_) => DisplayType::ChartTable,
            CandidateKind::Png { .. } => DisplayType::Png,
            CandidateKind::Download(_) => DisplayType::Download,
            CandidateKind::DownloadMenuItem(_) => DisplayType::DownloadMenuItem,
            CandidateKind::Analyze(_) => DisplayType::Analyze,
            CandidateKind::SendToBrowser { .. } => DisplayType::SendToBrowser,
            CandidateKind::Deferred(_) => DisplayType::DeferredResult,
        }
    }

    pub fn is_working_state(&self) -> bool {
        matches!(&self.kind, CandidateKind::Message(m) if m.working.is_some())
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.kind, CandidateKind::Deferred(_))
    }

    pub fn as_message(&self) -> Option<&MessageProduct> {
        match &self.kind {
            CandidateKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_message_mut(&mut self) -> Option<&mut MessageProduct> {
        match &mut self.kind {
            CandidateKind::Message(m) => Some(m),
            _ => None,
        }
    }

    /// The render step this candidate carries, if any.
    pub fn activation(&self) -> Option<&Activation> {
        match &self.kind {
            CandidateKind::Image(i) => i.activate.as_ref(),
            CandidateKind::Table(t) | CandidateKind::Chart(t) | CandidateKind::ChartTable(t) => {
                t.activate.as_ref()
            }
            CandidateKind::Analyze(a) => a.activate.as_ref(),
            _ => None,
        }
    }

    /// Tags that cannot be shown without an activation.
    pub fn requires_activation(&self) -> bool {
        matches!(
            self.kind,
            CandidateKind::Image(_)
                | CandidateKind::Table(_)
                | CandidateKind::Chart(_)
                | CandidateKind::ChartTable(_)
                | CandidateKind::Analyze(_)
        )
    }

    /// URL a host could download this candidate from.
    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            CandidateKind::Png { url } | CandidateKind::SendToBrowser { url } => Some(url),
            CandidateKind::Download(d) | CandidateKind::DownloadMenuItem(d) => Some(&d.url),
            CandidateKind::Table(t) | CandidateKind::Chart(t) | CandidateKind::ChartTable(t) => {
                t.url.as_deref()
            }
            CandidateKind::Analyze(a) => a.request.url(),
            CandidateKind::Image(i) => i.request.as_ref().and_then(|r| r.url()),
            CandidateKind::Message(m) => m.download.as_ref().map(|d| d.url.as_str()),
            CandidateKind::Deferred(d) => d.request.as_ref().and_then(|r| r.url()),
        }
    }

    pub fn request(&self) -> Option<&ProductRequest> {
        match &self.kind {
            CandidateKind::Image(i) => i.request.as_ref(),
            CandidateKind::Analyze(a) => Some(&a.request),
            CandidateKind::Deferred(d) => d.request.as_ref(),
            _ => None,
        }
    }
}
