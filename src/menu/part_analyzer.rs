//! Per-part classification of an analyzed file.
//!
//! Each [`FilePart`] of a report may yield an image entry, a table (or chart-table) entry, or
//! both when the part can be read either way. One-dimensional images cannot be drawn and are
//! offered as a download instead.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    analysis::report::{FileFormat, FilePart},
    candidate::{Activation, DisplayCandidate, DisplayType, TableProduct},
    options::FactoryOptions,
    request::ProductRequest,
    table::TableModel,
};

static X_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(wave|wavelength|lambda|freq|frequency|energy|time|mjd|jd|bjd|hjd|x)")
        .expect("x column pattern")
});

static Y_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(flux|flux_density|mag|magnitude|rate|counts|intensity|y)")
        .expect("y column pattern")
});

const MIN_CHART_ROWS: u64 = 3;

/// What one file part contributes to the file menu.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartAnalysis {
    pub image: Option<DisplayCandidate>,
    pub table: Option<DisplayCandidate>,
    /// Download offered in place of an image that cannot be drawn.
    pub download: Option<DisplayCandidate>,
}

impl PartAnalysis {
    /// The part is both an image and a table.
    pub fn is_duo(&self) -> bool {
        self.image.is_some() && self.table.is_some()
    }
}

/// Inputs shared by every part of one report.
#[derive(Debug, Clone, Copy)]
pub struct PartContext<'a> {
    pub request: &'a ProductRequest,
    pub table: &'a Arc<TableModel>,
    pub row: usize,
    pub file_format: FileFormat,
    /// Server side handle of the analyzed file.
    pub cache_handle: &'a str,
    pub options: &'a FactoryOptions,
}

/// True when the columns hold an x-like and a y-like column, e.g. `wavelength` and `flux`.
pub fn has_chart_columns(column_names: &[String]) -> bool {
    column_names.iter().any(|c| X_LIKE.is_match(c)) && column_names.iter().any(|c| Y_LIKE.is_match(c))
}

fn part_title(part: &FilePart) -> String {
    if part.desc.is_empty() {
        format!("HDU #{}", part.index)
    } else {
        format!("HDU #{} ({})", part.index, part.desc)
    }
}

/// Request loading the image of one part from the analyzed file.
pub fn part_image_request(ctx: &PartContext, part: &FilePart) -> ProductRequest {
    let mut request = ctx
        .request
        .to_file_request(ctx.cache_handle)
        .with_param("hdu", part.index.to_string());
    for (k, v) in &part.additional_image_params {
        request.set_param(k, v);
    }
    request
}

fn image_entry(ctx: &PartContext, part: &FilePart) -> DisplayCandidate {
    let request = part_image_request(ctx, part);
    let label = if part.planes() > 1 { "Cube" } else { "Image" };
    let activate = Activation::SingleImage {
        request: request.clone(),
        tbl_id: ctx.table.tbl_id.clone(),
        row: ctx.row,
    };
    DisplayCandidate::image(
        format!("{label} - {}", part_title(part)),
        Some(activate),
        Some(request),
        "",
    )
}

fn table_entry(ctx: &PartContext, part: &FilePart) -> DisplayCandidate {
    let tbl_id = format!("{}-{}", ctx.options.table_id_base(), part.index);
    let title = part_title(part);
    let chartable = part.total_table_rows >= MIN_CHART_ROWS && has_chart_columns(&part.column_names);
    if chartable {
        let chart_id = format!("{}-{}", ctx.options.chart_id_base(), part.index);
        let activate = Activation::ChartTable {
            source: ctx.cache_handle.to_string(),
            tbl_id: tbl_id.clone(),
            chart_id: chart_id.clone(),
            title: title.clone(),
            table_index: Some(part.index),
        };
        DisplayCandidate::chart_table(
            format!("Chart - {title}"),
            TableProduct {
                activate: Some(activate),
                url: ctx.request.url().map(str::to_string),
                tbl_id: Some(tbl_id),
                chart_id: Some(chart_id),
                image_activate: None,
            },
            "",
        )
    } else {
        let activate = Activation::Table {
            source: ctx.cache_handle.to_string(),
            tbl_id: tbl_id.clone(),
            title: title.clone(),
            table_index: Some(part.index),
        };
        DisplayCandidate::table(
            format!("Table - {title}"),
            TableProduct {
                activate: Some(activate),
                url: ctx.request.url().map(str::to_string),
                tbl_id: Some(tbl_id),
                ..Default::default()
            },
            "",
        )
    }
}

/// Classify one part of an analyzed file.
///
/// Arguments
/// -----------------
/// * `ctx`: Request, source table and options shared by every part.
/// * `part`: The part to classify.
///
/// Return
/// ----------
/// * A [`PartAnalysis`]; header-only, error and unknown parts yield an empty analysis.
pub fn analyze_part(ctx: &PartContext, part: &FilePart) -> PartAnalysis {
    let mut out = PartAnalysis::default();
    let readable_as_table = part.is_table() || (part.is_image() && !part.column_names.is_empty());

    if part.is_image() {
        if part.is_one_dimensional_image() {
            let url = ctx.request.url().unwrap_or(ctx.cache_handle);
            let file_type = (ctx.file_format == FileFormat::Fits).then_some("fits");
            out.download = Some(DisplayCandidate::download(
                format!("Download {} (one-dimensional image)", part_title(part)),
                url,
                "",
                file_type,
            ));
        } else {
            out.image = Some(image_entry(ctx, part));
        }
    }
    if readable_as_table {
        out.table = Some(table_entry(ctx, part));
    }
    out
}

/// Index of the entry to open first in a file menu.
///
/// Chart entries win for spectrum and time series data, then the first table when the file has no
/// image, else the first entry.
pub fn choose_default_entry(menu: &[DisplayCandidate], prefer_chart: bool) -> usize {
    let chart = menu
        .iter()
        .position(|c| matches!(c.display_type(), DisplayType::ChartTable | DisplayType::Chart));
    if prefer_chart {
        if let Some(i) = chart {
            return i;
        }
    }
    let has_image = menu.iter().any(|c| c.display_type() == DisplayType::Image);
    if !has_image {
        if let Some(i) = chart.or_else(|| menu.iter().position(|c| c.display_type() == DisplayType::Table)) {
            return i;
        }
    }
    0
}
