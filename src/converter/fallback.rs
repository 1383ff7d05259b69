//! `UNKNOWN` converter, used for any table with a column holding a file or URL.
//!
//! The data source column is taken from the `DataSource` metadata entry, else guessed among
//! `FILE, FITS, DATA, SOURCE, URL`. Every product goes through analysis.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    candidate::DisplayCandidate,
    constants::NO_DATA_PRODUCTS_MSG,
    converter::{ConverterTemplate, PlotRow, ProductContext, ProductStrategy},
    options::FactoryOptions,
    request::ProductRequest,
    table::TableModel,
};

pub const FALLBACK_CONVERTER_ID: &str = "UNKNOWN";

fn matches(table: &TableModel) -> bool {
    table.find_data_source_column().is_some()
}

/// Request for the data source cell of `row`: a URL when it has a scheme, else a server file.
pub fn data_source_request(table: &TableModel, row: usize) -> Option<ProductRequest> {
    let col = table.find_data_source_column()?;
    let source = table.non_empty_cell(row, &col.name)?;
    let request = if source.contains("://") {
        ProductRequest::from_url(source)
    } else {
        ProductRequest::from_file(source)
    };
    Some(match &table.title {
        Some(title) => request.with_title(format!("{title} row {row}")),
        None => request,
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisProducts;

#[async_trait]
impl ProductStrategy for AnalysisProducts {
    async fn single(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        row: usize,
        options: &FactoryOptions,
    ) -> DisplayCandidate {
        match data_source_request(table, row) {
            Some(request) => ctx
                .orchestrator
                .resolve_single(ctx.dp_id, table, row, request, None, options, ctx.token),
            None => DisplayCandidate::message(NO_DATA_PRODUCTS_MSG),
        }
    }

    async fn grid(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        plot_rows: &[PlotRow],
        options: &FactoryOptions,
    ) -> DisplayCandidate {
        let requests = plot_rows
            .iter()
            .filter_map(|p| data_source_request(table, p.row).map(|r| (p.row, r)))
            .collect();
        ctx.orchestrator.analysis_grid(table, requests, options).await
    }
}

pub fn template() -> ConverterTemplate {
    ConverterTemplate::new(FALLBACK_CONVERTER_ID, matches, Arc::new(AnalysisProducts))
        .with_can_grid(true)
        .with_has_related_bands(false)
        .with_max_plots(12)
}

#[cfg(test)]
mod fallback_test {
    use super::*;
    use crate::request::RequestType;

    #[test]
    fn test_data_source_request() {
        let t = TableModel::new(
            "t",
            &["name", "Data"],
            vec![
                vec!["a".into(), "https://x.org/a.fits".into()],
                vec!["b".into(), "/work/b.fits".into()],
                vec!["c".into(), "  ".into()],
            ],
        );
        let url = data_source_request(&t, 0).unwrap();
        assert_eq!(url.request_type, RequestType::Url);
        assert_eq!(url.url(), Some("https://x.org/a.fits"));
        let file = data_source_request(&t, 1).unwrap();
        assert_eq!(file.request_type, RequestType::File);
        assert!(data_source_request(&t, 2).is_none());
    }

    #[test]
    fn test_data_source_from_meta() {
        let t = TableModel::new("t", &["image_path", "FITS"], vec![vec!["https://x.org/m.fits".into(), "x".into()]])
            .with_meta("DataSource", "image_path");
        assert_eq!(data_source_request(&t, 0).unwrap().url(), Some("https://x.org/m.fits"));
    }
}
