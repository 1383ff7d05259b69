//! Datalink entry points shared by the converters.
//!
//! A row may point at a datalink table instead of a product. These entry points fetch that
//! table, build the menu of its rows and publish the working message while the fetch is
//! outstanding.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    analysis::cache::hash_code,
    candidate::{Activation, CandidateKind, DisplayCandidate, DisplayType},
    constants::LOADING_DATA_PRODUCTS_MSG,
    converter::ProductContext,
    menu::{
        classify::EntryContext,
        create_datalink_menu,
        cutout::{collapse_cutout_pairs, cutout_total_warning},
        datalink::read_datalink_rows,
        process_datalink_table, DatalinkMenuInput, ParsingAlgorithm,
    },
    options::{FactoryOptions, ViewerLimit},
    request::ProductRequest,
    table::TableModel,
};

/// Table id given to a fetched datalink table.
pub fn datalink_table_id(dl_table_url: &str) -> String {
    format!("datalink-{}", hash_code(dl_table_url))
}

fn fetch_failed_message(reason: &str, title: &str, dl_table_url: &str) -> DisplayCandidate {
    DisplayCandidate::message_with_download(
        format!("No data to display: Could not retrieve datalink data, {reason}"),
        Some(format!("Download File: {title}")),
        Some(dl_table_url.to_string()),
    )
}

fn algorithm_for(limit: ViewerLimit) -> ParsingAlgorithm {
    match limit {
        ViewerLimit::All => ParsingAlgorithm::UseAll,
        ViewerLimit::ImageOnly => ParsingAlgorithm::Image,
        ViewerLimit::TableOnly => ParsingAlgorithm::Spectrum,
    }
}

/// Menu of the datalink table of one row.
///
/// Arguments
/// -----------------
/// * `ctx`: Container and cancellation scope.
/// * `table`, `row`: The source row.
/// * `dl_table_url`: URL of the datalink table.
/// * `title`: Base title of the row, used in entry names and in the download label.
/// * `additional_service_menu`: Service descriptor entries appended to the menu.
/// * `options`: Factory options; the viewer limit selects the parsing algorithm.
///
/// Return
/// ----------
/// * The active entry of the datalink menu, or a message offering the datalink table for
///   download when it cannot be retrieved.
pub async fn datalink_single_product(
    ctx: ProductContext<'_>,
    table: &Arc<TableModel>,
    row: usize,
    dl_table_url: &str,
    title: &str,
    additional_service_menu: Vec<DisplayCandidate>,
    options: &FactoryOptions,
) -> DisplayCandidate {
    ctx.publish_working(LOADING_DATA_PRODUCTS_MSG);
    let datalink = ctx.orchestrator.env().datalink.clone();
    let datalink_table = match datalink
        .fetch_datalink(dl_table_url, &datalink_table_id(dl_table_url))
        .await
    {
        Ok(t) => t,
        Err(e) => {
            warn!(url = dl_table_url, error = %e, "datalink fetch failed");
            return fetch_failed_message(&e.to_string(), title, dl_table_url);
        }
    };

    let input = DatalinkMenuInput {
        ctx: EntryContext {
            source_table: table,
            source_row: row,
            dl_table_url: Some(dl_table_url),
            options,
            do_file_analysis: true,
        },
        datalink_table: &datalink_table,
        base_title: Some(title),
        algorithm: algorithm_for(options.limit_viewer_display),
        additional_service_menu,
    };
    let memory = ctx.orchestrator.store().memory(ctx.dp_id);
    let resolution = process_datalink_table(input, &memory);
    ctx.record_active_key(resolution.active_key_change);
    resolution.candidate
}

fn with_plot_id_suffix(request: &ProductRequest, fallback: &str, suffix: &str) -> ProductRequest {
    let base = request.plot_id.as_deref().unwrap_or(fallback);
    request.clone().with_plot_id(format!("{base}{suffix}"))
}

/// Three-color selection: requests at the given indexes, sharing one plot id.
fn three_color_requests(
    requests: &[ProductRequest],
    ops: [Option<usize>; 3],
    tbl_id: &str,
) -> [Option<ProductRequest>; 3] {
    let plot_id = format!("3id_{tbl_id}");
    ops.map(|idx| {
        idx.and_then(|i| requests.get(i))
            .map(|r| r.clone().with_plot_id(plot_id.clone()))
    })
}

/// Grid of the image rows of one datalink table, e.g. every band of an observation.
///
/// Arguments
/// -----------------
/// * `ctx`: Container and cancellation scope.
/// * `table`, `row`: The source row.
/// * `dl_table_url`: URL of the datalink table.
/// * `title`: Base title of the row.
/// * `three_color`: Indexes of the grid entries to combine into a three-color image.
/// * `options`: Factory options.
///
/// Return
/// ----------
/// * An `Image` candidate named `"image grid"` carrying an [`Activation::RelatedImageGrid`], or
///   a message when the table has no grid images or the panel only shows tables.
pub async fn datalink_related_image_grid(
    ctx: ProductContext<'_>,
    table: &Arc<TableModel>,
    row: usize,
    dl_table_url: &str,
    title: &str,
    three_color: Option<[Option<usize>; 3]>,
    options: &FactoryOptions,
) -> DisplayCandidate {
    if options.limit_viewer_display == ViewerLimit::TableOnly {
        return DisplayCandidate::message("Configuration Error: No support for related spectrum");
    }
    ctx.publish_working(LOADING_DATA_PRODUCTS_MSG);
    let datalink = ctx.orchestrator.env().datalink.clone();
    let datalink_table = match datalink
        .fetch_datalink(dl_table_url, &datalink_table_id(dl_table_url))
        .await
    {
        Ok(t) => t,
        Err(e) => return fetch_failed_message(&e.to_string(), title, dl_table_url),
    };

    let rows = read_datalink_rows(&datalink_table);
    let grid_rows: Vec<_> = rows
        .iter()
        .filter(|r| r.analysis.is_grid && r.analysis.is_image)
        .collect();
    if grid_rows.is_empty() {
        return DisplayCandidate::message("no support for related grid in datalink file");
    }
    let cutout_switching = grid_rows.iter().all(|r| r.analysis.cutout_full_pair);
    let full_sizes: Vec<Option<u64>> = grid_rows
        .iter()
        .filter(|r| !r.analysis.is_cutout)
        .map(|r| r.size)
        .collect();

    let input = DatalinkMenuInput {
        ctx: EntryContext {
            source_table: table,
            source_row: row,
            dl_table_url: Some(dl_table_url),
            options,
            do_file_analysis: false,
        },
        datalink_table: &datalink_table,
        base_title: Some(title),
        algorithm: ParsingAlgorithm::RelatedImageGrid,
        additional_service_menu: Vec::new(),
    };
    let collapsed = collapse_cutout_pairs(rows.clone(), options.prefer_cutout, options.cutout_warn_size);
    let menu = create_datalink_menu(&input, &collapsed);

    let requests: Vec<ProductRequest> = menu
        .iter()
        .filter(|m| matches!(m.display_type(), DisplayType::Image | DisplayType::Analyze))
        .filter_map(|m| m.request())
        .enumerate()
        .map(|(idx, r)| with_plot_id_suffix(r, &table.tbl_id, &format!("-related_grid-{idx}")))
        .collect();
    if requests.is_empty() {
        return DisplayCandidate::message("no support for related grid in datalink file");
    }
    debug!(entries = requests.len(), url = dl_table_url, "related image grid");

    let three_color = three_color
        .filter(|_| requests.len() > 1)
        .map(|ops| three_color_requests(&requests, ops, &datalink_table.tbl_id));
    let warning = (options.prefer_cutout && cutout_switching)
        .then(|| cutout_total_warning(&full_sizes, options.cutout_warn_size))
        .flatten();
    let activate = Activation::RelatedImageGrid {
        requests,
        three_color,
        tbl_id: table.tbl_id.clone(),
    };
    let extract: Vec<DisplayCandidate> = menu
        .into_iter()
        .filter(|m| matches!(m.kind, CandidateKind::Download(_) | CandidateKind::DownloadMenuItem(_)))
        .collect();
    let mut grid = DisplayCandidate::image("image grid", Some(activate), None, "image-grid-0")
        .with_size_warning(warning)
        .with_lookup_key(dl_table_url);
    if !extract.is_empty() {
        grid = grid.with_menu(extract);
    }
    grid
}

#[cfg(test)]
mod datalink_products_test {
    use super::*;

    #[test]
    fn test_three_color_requests() {
        let reqs = vec![
            ProductRequest::from_url("https://x.org/g.fits"),
            ProductRequest::from_url("https://x.org/r.fits"),
            ProductRequest::from_url("https://x.org/i.fits"),
        ];
        let [r, g, b] = three_color_requests(&reqs, [Some(2), Some(1), None], "dl-7");
        assert_eq!(r.unwrap().url(), Some("https://x.org/i.fits"));
        assert_eq!(g.unwrap().plot_id.as_deref(), Some("3id_dl-7"));
        assert!(b.is_none());
    }

    #[test]
    fn test_algorithm_for_limit() {
        assert_eq!(algorithm_for(ViewerLimit::All), ParsingAlgorithm::UseAll);
        assert_eq!(algorithm_for(ViewerLimit::ImageOnly), ParsingAlgorithm::Image);
        assert_eq!(algorithm_for(ViewerLimit::TableOnly), ParsingAlgorithm::Spectrum);
    }
}
