//! Classification of one datalink access URL into a display candidate.
//!
//! Rules are tried in order, first match wins:
//!
//! 1. download-only content (tar, gzip, octet-stream) → `Download` (`DownloadMenuItem` for `#this`)
//! 2. simple raster image → `PNG`
//! 3. size above the display threshold → `Download` named with the "(too large to show)" suffix
//! 4. spectrum served as a VOTable → `ChartTable`
//! 5. analyzable content (fits, cube, table, spectrum, auxiliary, or no content type) → `Analyze`,
//!    or a guessed direct candidate when file analysis is disabled
//! 6. anything else is dropped

use std::sync::Arc;

use crate::{
    candidate::{Activation, AnalysisJob, DataTypeHint, DisplayCandidate, TableProduct},
    constants::{MenuKey, TOO_LARGE_SUFFIX},
    menu::datalink::{is_download_type, is_simple_image_type, is_tar_type, is_votable, DatalinkRow},
    options::FactoryOptions,
    request::ProductRequest,
    table::TableModel,
};

const ANALYSIS_TYPES: [&str; 5] = ["fits", "cube", "table", "spectrum", "auxiliary"];

/// Source of the menu entries being built.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub source_table: &'a Arc<TableModel>,
    pub source_row: usize,
    /// URL of the datalink table, key under which the chosen entry is remembered.
    pub dl_table_url: Option<&'a str>,
    pub options: &'a FactoryOptions,
    pub do_file_analysis: bool,
}

impl EntryContext<'_> {
    pub fn lookup_key(&self, idx: usize) -> String {
        self.dl_table_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("no-table-{idx}"))
    }

    /// Product type of the source row (ObsCore `dataproduct_type`).
    pub fn prod_type(&self) -> Option<&str> {
        self.source_table.obscore_product_type(self.source_row)
    }

    pub fn table_id(&self, idx: usize) -> String {
        format!("{}-{idx}", self.options.table_id_base())
    }

    pub fn chart_id(&self, idx: usize) -> String {
        format!("{}-{idx}", self.options.chart_id_base())
    }
}

pub fn is_analysis_type(ct: &str) -> bool {
    ct.is_empty() || ANALYSIS_TYPES.iter().any(|a| ct.contains(a))
}

pub fn dl_menu_key(idx: usize) -> MenuKey {
    format!("dlt-{idx}")
}

fn annotate(c: DisplayCandidate, ctx: &EntryContext, dl: &DatalinkRow) -> DisplayCandidate {
    c.with_semantics(dl.semantics.clone())
        .with_size(dl.size)
        .with_lookup_key(ctx.lookup_key(dl.row_idx))
}

fn download_file_type(ct: &str) -> Option<&'static str> {
    if ct.contains("gzip") {
        Some("gzip")
    } else if is_tar_type(ct) {
        Some("tar")
    } else {
        None
    }
}

/// Candidate for a datalink row carrying an access URL.
///
/// Arguments
/// -----------------
/// * `ctx`: Source table, row and options.
/// * `dl`: The datalink row; must carry a URL.
/// * `name`: Entry name, from [`make_name`](crate::menu::naming::make_name).
///
/// Return
/// ----------
/// * The candidate, or `None` when the content cannot be shown nor downloaded.
pub fn access_url_entry(ctx: &EntryContext, dl: &DatalinkRow, name: &str) -> Option<DisplayCandidate> {
    let url = dl.url.as_deref()?;
    let a = &dl.analysis;
    let ct = dl.content_type.as_str();
    let menu_key = dl_menu_key(dl.row_idx);

    if a.is_download_only {
        let label = format!("Download file: {name}");
        let file_type = download_file_type(ct);
        let c = if a.is_this {
            DisplayCandidate::download_menu_item(label, url, menu_key, file_type)
        } else {
            DisplayCandidate::download(label, url, menu_key, file_type)
        };
        return Some(annotate(c, ctx, dl));
    }
    if a.is_simple_image {
        let c = DisplayCandidate::png(format!("Show PNG image: {name}"), url, menu_key);
        return Some(annotate(c, ctx, dl));
    }
    if dl.size.is_some_and(|s| s > ctx.options.max_display_size) {
        let c = DisplayCandidate::download(
            format!("Download: {name} {TOO_LARGE_SUFFIX}"),
            url,
            menu_key,
            Some("fits"),
        );
        return Some(annotate(c, ctx, dl));
    }
    if a.is_spectrum && is_votable(ct) {
        let tbl_id = ctx.table_id(dl.row_idx);
        let chart_id = ctx.chart_id(dl.row_idx);
        let activate = Activation::ChartTable {
            source: url.to_string(),
            tbl_id: tbl_id.clone(),
            chart_id: chart_id.clone(),
            title: dl.description.clone(),
            table_index: Some(0),
        };
        let c = DisplayCandidate::chart_table(
            format!("Show: {}", dl.description),
            TableProduct {
                activate: Some(activate),
                url: Some(url.to_string()),
                tbl_id: Some(tbl_id),
                chart_id: Some(chart_id),
                image_activate: None,
            },
            menu_key,
        );
        return Some(annotate(c, ctx, dl));
    }
    if is_analysis_type(ct) {
        if !ctx.do_file_analysis {
            return guess_data_type(ctx, dl, name, url).map(|c| annotate(c, ctx, dl));
        }
        let (hint, prod_type_hint) = if a.is_spectrum {
            (DataTypeHint::Spectrum, "spectrum".to_string())
        } else {
            let prod = ctx.prod_type().unwrap_or_default();
            let hint_src = if ct.is_empty() { prod } else { ct };
            (DataTypeHint::from(prod), hint_src.to_string())
        };
        let request = ProductRequest::from_url(url).with_title(name);
        let job = AnalysisJob::new(ctx.source_table.clone(), ctx.source_row, request)
            .with_hint(hint)
            .with_menu_key(menu_key.clone())
            .with_original_title(name);
        let c = DisplayCandidate::analyze(format!("Show: {name}"), job, menu_key, Some(prod_type_hint));
        return Some(annotate(c, ctx, dl));
    }
    None
}

/// Direct candidate guessed from the content type, used when file analysis is disabled.
pub fn guess_data_type(
    ctx: &EntryContext,
    dl: &DatalinkRow,
    name: &str,
    url: &str,
) -> Option<DisplayCandidate> {
    let ct = dl.content_type.as_str();
    let menu_key = dl_menu_key(dl.row_idx);
    if ct.contains("image") || ct.contains("fits") || ct.contains("cube") {
        let request = ProductRequest::from_url(url).with_title(name);
        let activate = Activation::SingleImage {
            request: request.clone(),
            tbl_id: ctx.source_table.tbl_id.clone(),
            row: ctx.source_row,
        };
        Some(DisplayCandidate::image(name, Some(activate), Some(request), menu_key))
    } else if ct.contains("table") || ct.contains("spectrum") || dl.semantics.contains("auxiliary") {
        let activate = Activation::Table {
            source: url.to_string(),
            tbl_id: ctx.table_id(dl.row_idx),
            title: dl.semantics.clone(),
            table_index: None,
        };
        Some(DisplayCandidate::table(
            name,
            TableProduct {
                activate: Some(activate),
                url: Some(url.to_string()),
                ..Default::default()
            },
            menu_key,
        ))
    } else if is_simple_image_type(ct) {
        Some(DisplayCandidate::png(name, url, menu_key))
    } else if is_download_type(ct) {
        Some(DisplayCandidate::download(name, url, menu_key, download_file_type(ct)))
    } else {
        None
    }
}
