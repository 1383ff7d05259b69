//! `ServiceDescriptor` converter: tables whose products are reached by invoking the services
//! they declare.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    candidate::DisplayCandidate,
    constants::{NO_ACCESS_MSG, NO_DATA_PRODUCTS_MSG},
    converter::{datalink_products::datalink_single_product, ConverterTemplate, ProductContext, ProductStrategy},
    menu::{
        classify::EntryContext,
        service_descriptor::{find_datalink_service, make_dl_url, service_descriptor_menu},
    },
    options::FactoryOptions,
    table::TableModel,
};

pub const SERVICE_DESCRIPTOR_CONVERTER_ID: &str = "ServiceDescriptor";

fn matches(table: &TableModel) -> bool {
    table.has_service_descriptors() && !table.has_obscore_like_data_products()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceDescriptorProducts;

#[async_trait]
impl ProductStrategy for ServiceDescriptorProducts {
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
        let dl_url = find_datalink_service(table).and_then(|sd| make_dl_url(sd, table, row).ok());
        let entry_ctx = EntryContext {
            source_table: table,
            source_row: row,
            dl_table_url: dl_url.as_deref(),
            options,
            do_file_analysis: true,
        };
        let menu = service_descriptor_menu(&entry_ctx);

        if let Some(dl_url) = dl_url.as_deref() {
            let title = table.title.as_deref().unwrap_or("data product");
            return datalink_single_product(ctx, table, row, dl_url, title, menu, options).await;
        }
        if menu.is_empty() {
            return DisplayCandidate::message(NO_DATA_PRODUCTS_MSG);
        }

        let lookup_key = table.tbl_id.clone();
        let index = ctx
            .orchestrator
            .store()
            .get_active_menu_key(ctx.dp_id, &lookup_key)
            .and_then(|k| menu.iter().position(|m| m.menu_key == k))
            .unwrap_or(0);
        let menu_key = menu[index].menu_key.clone();
        match DisplayCandidate::from_menu(menu, index, lookup_key.clone()) {
            Some(candidate) => {
                ctx.record_active_key(Some((lookup_key, menu_key)));
                candidate
            }
            None => DisplayCandidate::message(NO_DATA_PRODUCTS_MSG),
        }
    }
}

pub fn template() -> ConverterTemplate {
    ConverterTemplate::new(SERVICE_DESCRIPTOR_CONVERTER_ID, matches, Arc::new(ServiceDescriptorProducts))
        .with_can_grid(false)
        .with_has_related_bands(false)
        .with_max_plots(1)
}

#[cfg(test)]
mod service_desc_test {
    use super::*;
    use crate::table::ServiceDescriptor;

    #[test]
    fn test_matches_excludes_obscore() {
        let sd = ServiceDescriptor {
            title: "Cutouts".into(),
            access_url: "https://x.org/cutout".into(),
            ..Default::default()
        };
        let plain = TableModel::new("t", &["a"], vec![]).with_service_descriptor(sd.clone());
        assert!(matches(&plain));
        let obscore = TableModel::new("o", &["access_url", "access_format", "dataproduct_type"], vec![])
            .with_service_descriptor(sd);
        assert!(!matches(&obscore));
        assert!(!matches(&TableModel::new("e", &["a"], vec![])));
    }
}
