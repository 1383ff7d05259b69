//! Menu entries for service descriptors.
//!
//! A service descriptor is turned into an `Analyze` candidate: nothing is requested until the user
//! opens the entry, at which point the descriptor parameters (and any user input) are appended to
//! the access URL and the resulting file goes through deep analysis.

use crate::{
    candidate::{AnalysisJob, DataTypeHint, DisplayCandidate},
    constants::MenuKey,
    dataprod_errors::DataProdError,
    menu::{classify::EntryContext, datalink::DatalinkRow},
    request::ProductRequest,
    table::{ServiceDescriptor, ServiceParam, TableModel},
};

const DATALINK_STANDARD: &str = "datalink";

pub fn is_datalink_service(sd: &ServiceDescriptor) -> bool {
    sd.standard_id
        .as_deref()
        .is_some_and(|s| s.to_lowercase().contains(DATALINK_STANDARD))
}

/// First service descriptor of the table pointing at a datalink service.
pub fn find_datalink_service(table: &TableModel) -> Option<&ServiceDescriptor> {
    table.service_descriptors.iter().find(|sd| is_datalink_service(sd))
}

/// URL of the datalink table of `row`, built from a datalink service descriptor.
///
/// Parameters with a literal value are sent as is; parameters referencing a column take the cell
/// of `row`.
pub fn make_dl_url(sd: &ServiceDescriptor, table: &TableModel, row: usize) -> Result<String, DataProdError> {
    let params = resolve_params(&sd.url_params, table, row);
    let request = ProductRequest::from_url(&sd.access_url).with_query_params(&params)?;
    request.url.ok_or(DataProdError::MissingSource)
}

/// Values of service parameters: literal values first, then column references read from `row`.
pub fn resolve_params(
    params: &[ServiceParam],
    table: &TableModel,
    row: usize,
) -> Vec<(String, String)> {
    let literal = params
        .iter()
        .filter_map(|p| p.value.as_ref().map(|v| (p.name.clone(), v.clone())));
    let referenced = params
        .iter()
        .filter(|p| p.value.is_none() && (p.col_name.is_some() || p.ref_id.is_some()))
        .filter_map(|p| {
            let col = p
                .col_name
                .as_deref()
                .or_else(|| p.ref_id.as_deref().and_then(|r| table.column_id_to_name(r)))?;
            table
                .non_empty_cell(row, col)
                .map(|v| (p.name.clone(), v.to_string()))
        });
    literal.chain(referenced).collect()
}

/// `Analyze` candidate invoking one service descriptor.
///
/// Arguments
/// -----------------
/// * `ctx`: Source table, row and options.
/// * `sd`: The descriptor; for datalink rows its column references are already resolved.
/// * `name`: Entry name.
/// * `menu_key`: Key of the entry in its menu.
/// * `dl`: The datalink row declaring the descriptor, if any.
///
/// Return
/// ----------
/// * The `Analyze` candidate, or an error message when the descriptor has no access URL.
pub fn service_descriptor_entry(
    ctx: &EntryContext,
    sd: &ServiceDescriptor,
    name: &str,
    menu_key: MenuKey,
    dl: Option<&DatalinkRow>,
) -> DisplayCandidate {
    let lookup = ctx.lookup_key(dl.map(|d| d.row_idx).unwrap_or_default());
    if sd.access_url.trim().is_empty() {
        let mut c = DisplayCandidate::message_with_error(format!(
            "Service descriptor {} has no access URL",
            sd.id.as_deref().unwrap_or(&sd.title)
        ));
        c.name = name.to_string();
        c.menu_key = menu_key;
        return c.with_lookup_key(lookup);
    }

    let description = dl.map(|d| d.description.as_str()).filter(|d| !d.is_empty());
    let title = description.unwrap_or(&sd.title).to_string();
    let prod_type_hint = dl
        .map(|d| d.content_type.as_str())
        .filter(|ct| !ct.is_empty())
        .or(ctx.prod_type())
        .map(str::to_string);
    let hint = match dl {
        Some(d) if d.analysis.is_spectrum => DataTypeHint::Spectrum,
        _ => DataTypeHint::from(ctx.prod_type().unwrap_or_default()),
    };

    let request = ProductRequest::from_url(&sd.access_url).with_title(&title);
    let job = AnalysisJob::new(ctx.source_table.clone(), ctx.source_row, request)
        .with_hint(hint)
        .with_ser_def_params(sd.url_params.clone())
        .with_menu_key(menu_key.clone())
        .with_original_title(title);
    let mut c = DisplayCandidate::analyze(name, job, menu_key, prod_type_hint).with_lookup_key(lookup);
    if let Some(d) = dl {
        c = c.with_semantics(d.semantics.clone()).with_size(d.size);
    }
    c
}

/// Entries for the non-datalink service descriptors attached to a table, keyed `sd-<idx>`.
pub fn service_descriptor_menu(ctx: &EntryContext) -> Vec<DisplayCandidate> {
    ctx.source_table
        .service_descriptors
        .iter()
        .filter(|sd| !is_datalink_service(sd))
        .enumerate()
        .map(|(idx, sd)| {
            let name = if sd.title.is_empty() {
                format!("Service {idx}")
            } else {
                sd.title.clone()
            };
            service_descriptor_entry(ctx, sd, &name, format!("sd-{idx}"), None)
        })
        .collect()
}

#[cfg(test)]
mod service_descriptor_test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        candidate::{Activation, DisplayType},
        options::FactoryOptions,
    };

    fn source() -> Arc<TableModel> {
        let cutout = ServiceDescriptor {
            id: Some("cutout".into()),
            title: "Cutout service".into(),
            access_url: "https://x.org/soda".into(),
            standard_id: None,
            url_params: vec![
                ServiceParam {
                    name: "ID".into(),
                    ref_id: Some("col_obs_id".into()),
                    col_name: Some("obs_id".into()),
                    ..Default::default()
                },
                ServiceParam {
                    name: "RESPONSEFORMAT".into(),
                    value: Some("fits".into()),
                    ..Default::default()
                },
            ],
        };
        let dl = ServiceDescriptor {
            id: Some("dl".into()),
            title: "links".into(),
            access_url: "https://x.org/links".into(),
            standard_id: Some("ivo://ivoa.net/std/DataLink#links-1.0".into()),
            url_params: vec![ServiceParam {
                name: "ID".into(),
                ref_id: Some("col_obs_id".into()),
                col_name: Some("obs_id".into()),
                ..Default::default()
            }],
        };
        Arc::new(
            TableModel::new("src", &["obs_id"], vec![vec!["ivo://obs/1".into()]])
                .with_service_descriptor(cutout)
                .with_service_descriptor(dl),
        )
    }

    #[test]
    fn test_make_dl_url() {
        let t = source();
        let sd = find_datalink_service(&t).unwrap();
        let url = make_dl_url(sd, &t, 0).unwrap();
        assert_eq!(url, "https://x.org/links?ID=ivo%3A%2F%2Fobs%2F1");
    }

    #[test]
    fn test_resolve_params_order() {
        let t = source();
        let p = resolve_params(&t.service_descriptors[0].url_params, &t, 0);
        assert_eq!(
            p,
            vec![
                ("RESPONSEFORMAT".to_string(), "fits".to_string()),
                ("ID".to_string(), "ivo://obs/1".to_string()),
            ]
        );
    }

    #[test]
    fn test_service_descriptor_menu() {
        let t = source();
        let options = FactoryOptions::default();
        let ctx = EntryContext {
            source_table: &t,
            source_row: 0,
            dl_table_url: None,
            options: &options,
            do_file_analysis: true,
        };
        let menu = service_descriptor_menu(&ctx);
        assert_eq!(menu.len(), 1);
        assert_eq!(menu[0].display_type(), DisplayType::Analyze);
        assert_eq!(menu[0].menu_key, "sd-0");
        assert_eq!(menu[0].name, "Cutout service");
        match menu[0].activation() {
            Some(Activation::Analysis(job)) => assert_eq!(job.ser_def_params.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_access_url() {
        let t = source();
        let options = FactoryOptions::default();
        let ctx = EntryContext {
            source_table: &t,
            source_row: 0,
            dl_table_url: None,
            options: &options,
            do_file_analysis: true,
        };
        let sd = ServiceDescriptor {
            title: "broken".into(),
            ..Default::default()
        };
        let c = service_descriptor_entry(&ctx, &sd, "broken", "sd-9".into(), None);
        assert_eq!(c.display_type(), DisplayType::Message);
        assert_eq!(c.menu_key, "sd-9");
    }
}
