//! `ObsCore` converter: rows locating their product through `access_url` / `access_format`.
//!
//! An access format of `application/x-votable+xml;content=datalink` makes the access URL a
//! datalink table; any other format points at the product itself.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    candidate::DisplayCandidate,
    constants::{NO_ACCESS_MSG, NO_DATA_PRODUCTS_MSG},
    converter::{
        datalink_products::{datalink_related_image_grid, datalink_single_product},
        simple_create, Converter, ConverterTemplate, PlotRow, ProductContext, ProductStrategy,
    },
    menu::{
        classify::EntryContext,
        service_descriptor::{find_datalink_service, make_dl_url, service_descriptor_menu},
    },
    options::FactoryOptions,
    request::ProductRequest,
    table::TableModel,
};

pub const OBSCORE_CONVERTER_ID: &str = "ObsCore";

/// Title of an ObsCore row: `obs_title`, else `obs_id`, else the table title.
pub fn obscore_title(table: &TableModel, row: usize) -> String {
    table
        .non_empty_cell(row, "obs_title")
        .or_else(|| table.non_empty_cell(row, "obs_id"))
        .or(table.title.as_deref())
        .unwrap_or("data product")
        .to_string()
}

/// Datalink table URL of a row, from a datalink access format or a datalink service descriptor.
fn datalink_url(table: &TableModel, row: usize) -> Option<String> {
    if table.is_format_datalink(row) {
        return table.obscore_access_url(row).map(str::to_string);
    }
    if table.obscore_access_url(row).is_none() {
        let sd = find_datalink_service(table)?;
        return make_dl_url(sd, table, row).ok();
    }
    None
}

fn row_options(table: &TableModel, row: usize, options: &FactoryOptions) -> FactoryOptions {
    let mut o = options.clone();
    if o.data_type_hint.is_none() {
        o.data_type_hint = table.obscore_product_type(row).map(str::to_string);
    }
    o
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ObsCoreProducts;

#[async_trait]
impl ProductStrategy for ObsCoreProducts {
    async fn single(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        row: usize,
        options: &FactoryOptions,
    ) -> DisplayCandidate {
        if !ctx.orchestrator.env().row_access.has_row_access(table, row) {
            return DisplayCandidate::message(NO_ACCESS_MSG);
        }
        let options = row_options(table, row, options);
        let title = obscore_title(table, row);

        if let Some(dl_url) = datalink_url(table, row) {
            let entry_ctx = EntryContext {
                source_table: table,
                source_row: row,
                dl_table_url: Some(&dl_url),
                options: &options,
                do_file_analysis: true,
            };
            let extra = service_descriptor_menu(&entry_ctx);
            return datalink_single_product(ctx, table, row, &dl_url, &title, extra, &options).await;
        }

        let Some(url) = table.obscore_access_url(row) else {
            return DisplayCandidate::message(NO_DATA_PRODUCTS_MSG);
        };
        let format = table.obscore_access_format(row);
        let content_type = (!format.is_empty()).then_some(format.as_str());
        let request = ProductRequest::from_url(url).with_title(&title);
        ctx.orchestrator
            .resolve_single(ctx.dp_id, table, row, request, content_type, &options, ctx.token)
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
            .filter(|p| !table.is_format_datalink(p.row))
            .filter_map(|p| {
                let url = table.obscore_access_url(p.row)?;
                Some((p.row, ProductRequest::from_url(url).with_title(obscore_title(table, p.row))))
            })
            .collect();
        ctx.orchestrator.analysis_grid(table, requests, options).await
    }

    async fn related(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        row: usize,
        three_color: Option<[Option<usize>; 3]>,
        options: &FactoryOptions,
    ) -> DisplayCandidate {
        if !ctx.orchestrator.env().row_access.has_row_access(table, row) {
            return DisplayCandidate::message(NO_ACCESS_MSG);
        }
        match datalink_url(table, row) {
            Some(dl_url) => {
                let title = obscore_title(table, row);
                datalink_related_image_grid(ctx, table, row, &dl_url, &title, three_color, options).await
            }
            None => DisplayCandidate::message("Related data products need a datalink table"),
        }
    }
}

/// Related bands are only offered when the panel allows the related-image grid.
fn create(table: &TableModel, template: &ConverterTemplate, mut options: FactoryOptions) -> Converter {
    if !options.allow_image_related_grid {
        options.has_related_bands = Some(false);
    }
    simple_create(table, template, options)
}

pub fn template() -> ConverterTemplate {
    ConverterTemplate::new(
        OBSCORE_CONVERTER_ID,
        TableModel::has_obscore_like_data_products,
        Arc::new(ObsCoreProducts),
    )
    .with_create(create)
    .with_can_grid(true)
    .with_has_related_bands(true)
    .with_three_color(false)
    .with_max_plots(8)
}
