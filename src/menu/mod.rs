//! # Menu resolution
//!
//! Turns classification results into ordered lists of [`DisplayCandidate`]s:
//!
//! * a datalink table ([`process_datalink_table`](crate::menu::process_datalink_table)),
//! * the report of a deeply analyzed file ([`file_menu::process_analysis_result`]),
//! * the service descriptors of a table ([`service_descriptor::service_descriptor_menu`]).
//!
//! ## Datalink pipeline
//!
//! ```text
//! datalink table ─▶ read_datalink_rows ─▶ collapse_cutout_pairs ─▶ ParsingAlgorithm filter
//!                ─▶ one entry per row (error | service descriptor | access url)
//!                ─▶ spectrum merge / extra entries ─▶ sort_menu ─▶ active index
//! ```
//!
//! Nothing here touches the selection store directly: resolutions return the active key change
//! the caller must record.

pub mod classify;
pub mod cutout;
pub mod datalink;
pub mod file_menu;
pub mod naming;
pub mod ordering;
pub mod part_analyzer;
pub mod service_descriptor;

use tracing::debug;

use crate::{
    analysis::cache::hash_code,
    candidate::{Activation, CandidateKind, DisplayCandidate, DisplayType, TableProduct},
    constants::{LookupKey, MenuKey, VO_TABLE_CONTENT_TYPE},
    menu::{
        classify::{access_url_entry, dl_menu_key, EntryContext},
        cutout::collapse_cutout_pairs,
        datalink::{read_datalink_rows, DatalinkRow},
        naming::{make_name, NameCounters},
        ordering::sort_menu,
        service_descriptor::service_descriptor_entry,
    },
    table::TableModel,
};

const NO_TABLE_LOOKUP: &str = "no-table";
const DATALINK_ENTRY_PREFIX: &str = "datalink-entry-";

/// Which datalink rows a menu is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsingAlgorithm {
    #[default]
    UseAll,
    Image,
    RelatedImageGrid,
    Spectrum,
}

impl ParsingAlgorithm {
    pub fn accepts(&self, dl: &DatalinkRow) -> bool {
        let a = &dl.analysis;
        match self {
            ParsingAlgorithm::UseAll => true,
            ParsingAlgorithm::Image => a.is_image,
            ParsingAlgorithm::RelatedImageGrid => a.is_grid && a.is_image,
            ParsingAlgorithm::Spectrum => a.is_spectrum,
        }
    }
}

/// A resolved menu and the active key to record for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuResolution {
    pub candidate: DisplayCandidate,
    /// `(lookup key, menu key)` of the activated entry.
    pub active_key_change: Option<(LookupKey, MenuKey)>,
}

/// Keys remembered by the selection store, as seen by menu construction.
pub trait MenuMemory {
    /// Menu key last activated under `lookup_key`.
    fn active_menu_key(&self, lookup_key: &str) -> Option<MenuKey>;

    /// Lookup key changed most recently.
    fn current_active_key_id(&self) -> Option<LookupKey>;
}

/// Memory with nothing recorded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl MenuMemory for NoMemory {
    fn active_menu_key(&self, _lookup_key: &str) -> Option<MenuKey> {
        None
    }

    fn current_active_key_id(&self) -> Option<LookupKey> {
        None
    }
}

/// Inputs of [`process_datalink_table`].
#[derive(Debug, Clone)]
pub struct DatalinkMenuInput<'a> {
    pub ctx: EntryContext<'a>,
    pub datalink_table: &'a TableModel,
    pub base_title: Option<&'a str>,
    pub algorithm: ParsingAlgorithm,
    /// Service descriptor entries appended by [`ParsingAlgorithm::UseAll`] menus.
    pub additional_service_menu: Vec<DisplayCandidate>,
}

fn error_entry(dl: &DatalinkRow, detail: &str) -> DisplayCandidate {
    let mut c = DisplayCandidate::message_with_error(detail);
    c.menu_key = dl_menu_key(dl.row_idx);
    c.name = format!("Error in related data (datalink) row {}", dl.row_idx);
    c
}

/// Entry of one datalink row: a service descriptor invocation or an access URL.
fn make_menu_entry(ctx: &EntryContext, dl: &DatalinkRow, name: &str) -> Option<DisplayCandidate> {
    if let Some(sd) = &dl.service_def {
        Some(service_descriptor_entry(ctx, sd, name, dl_menu_key(dl.row_idx), Some(dl)))
    } else if dl.url.is_some() {
        access_url_entry(ctx, dl, name)
    } else {
        None
    }
}

/// Candidate for a single datalink row shown on its own.
///
/// Return
/// ----------
/// * An error message for rows carrying `error_message` or referencing a missing service
///   descriptor, else the row entry, `None` when the row has nothing to show.
pub fn datalink_single_row_item(ctx: &EntryContext, dl: &DatalinkRow) -> Option<DisplayCandidate> {
    if let Some(err) = &dl.error_message {
        return Some(error_entry(dl, err));
    }
    if dl.service_def_ref.is_some() && dl.service_def.is_none() {
        return Some(error_entry(
            dl,
            "Datalink row has an unsupported or missing service descriptor (async service descriptors are not supported)",
        ));
    }
    make_menu_entry(ctx, dl, &dl.semantics)
}

fn datalink_table_entries(dl_table_url: &str, show_key: &str, download_key: &str) -> [DisplayCandidate; 2] {
    let activate = Activation::Table {
        source: dl_table_url.to_string(),
        tbl_id: format!("datalink-{}", hash_code(dl_table_url)),
        title: "Datalink VO Table".to_string(),
        table_index: None,
    };
    [
        DisplayCandidate::table(
            "Show Datalink VO Table for list of products",
            TableProduct {
                activate: Some(activate),
                url: Some(dl_table_url.to_string()),
                ..Default::default()
            },
            show_key,
        ),
        DisplayCandidate::download(
            "Download Datalink VO Table for list of products",
            dl_table_url,
            download_key,
            Some(VO_TABLE_CONTENT_TYPE),
        ),
    ]
}

/// Merge every chart-table entry into a single multi-table spectrum entry.
fn merge_spectra(menu: &[DisplayCandidate]) -> DisplayCandidate {
    let activations = menu
        .iter()
        .filter_map(|m| match &m.kind {
            CandidateKind::ChartTable(t) if t.tbl_id.is_some() => t.activate.clone(),
            _ => None,
        })
        .collect();
    DisplayCandidate::chart_table(
        "Show: Spectrum",
        TableProduct {
            activate: Some(Activation::MultiTable(activations)),
            ..Default::default()
        },
        "multi-table",
    )
}

/// Build the ordered menu of a datalink table.
///
/// Arguments
/// -----------------
/// * `input`: Source row context, the datalink table and the parsing algorithm.
/// * `rows`: Rows read from the datalink table, cutout pairs already collapsed, with the size
///   warning of each kept row.
///
/// Return
/// ----------
/// * The menu, sorted with [`sort_menu`].
pub fn create_datalink_menu(
    input: &DatalinkMenuInput,
    rows: &[(DatalinkRow, Option<String>)],
) -> Vec<DisplayCandidate> {
    let ctx = &input.ctx;
    let mut counters = NameCounters {
        aux_total: rows.iter().filter(|(r, _)| r.semantics == "#auxiliary").count(),
        ..Default::default()
    };

    let mut menu: Vec<DisplayCandidate> = Vec::new();
    for (dl, warning) in rows.iter().filter(|(r, _)| input.algorithm.accepts(r)) {
        let name = make_name(&dl.semantics, dl.url.as_deref(), &counters, input.base_title);
        if let Some(err) = &dl.error_message {
            menu.push(error_entry(dl, err));
            continue;
        }
        if dl.service_def_ref.is_some() && dl.service_def.is_none() && dl.url.is_none() {
            menu.push(error_entry(
                dl,
                "Datalink row has an unsupported or missing service descriptor (async service descriptors are not supported)",
            ));
            continue;
        }
        if let Some(entry) = make_menu_entry(ctx, dl, &name) {
            menu.push(entry.with_size_warning(warning.clone()));
        }
        if dl.analysis.is_auxiliary {
            counters.aux_count += 1;
        }
        if dl.analysis.is_this {
            counters.prime_count += 1;
        }
    }

    if input.algorithm == ParsingAlgorithm::Spectrum && menu.len() > 1 {
        return vec![merge_spectra(&menu)];
    }
    if input.algorithm == ParsingAlgorithm::UseAll {
        menu.extend(input.additional_service_menu.iter().cloned());
        if let Some(url) = ctx.dl_table_url {
            menu.extend(datalink_table_entries(
                url,
                "datalink-entry-showtable",
                "datalink-entry-downloadtable",
            ));
        }
    }
    sort_menu(menu)
}

/// Turn every entry into a download of its URL; entries without URL are dropped.
pub fn convert_all_to_download(menu: &[DisplayCandidate]) -> Vec<DisplayCandidate> {
    menu.iter()
        .filter(|d| !is_datalink_table_entry(d))
        .filter_map(|d| {
            if d.display_type() == DisplayType::Download {
                return Some(d.clone());
            }
            let url = d.url()?;
            let mut dl = DisplayCandidate::download(d.name.clone(), url, d.menu_key.clone(), None)
                .with_size(d.size);
            dl.semantics = d.semantics.clone();
            dl.active_menu_lookup_key = d.active_menu_lookup_key.clone();
            Some(dl)
        })
        .collect()
}

fn is_datalink_table_entry(c: &DisplayCandidate) -> bool {
    c.menu_key.starts_with(DATALINK_ENTRY_PREFIX)
}

fn can_show(menu: &[DisplayCandidate], max_display_size: u64) -> bool {
    menu.iter().filter(|m| !is_datalink_table_entry(m)).any(|m| {
        m.display_type() != DisplayType::Download && m.size.map_or(true, |s| s < max_display_size)
    })
}

/// Resolve a datalink table into the candidate to publish.
///
/// The active entry is the one last picked for this datalink table; for related image grids the
/// entry last picked in the previously active menu is tried first, so that stepping through rows
/// keeps showing the same band. When nothing can be displayed the whole menu is offered as
/// downloads.
///
/// Arguments
/// -----------------
/// * `input`: Source row context, the datalink table and the parsing algorithm.
/// * `memory`: Active keys recorded by the selection store.
///
/// Return
/// ----------
/// * The candidate and the active key change to record.
pub fn process_datalink_table(mut input: DatalinkMenuInput, memory: &dyn MenuMemory) -> MenuResolution {
    let options = input.ctx.options;
    let lookup_key = input.ctx.dl_table_url.unwrap_or(NO_TABLE_LOOKUP).to_string();
    let rows = read_datalink_rows(input.datalink_table);
    if rows.is_empty() {
        return MenuResolution {
            candidate: DisplayCandidate::message("No data available for this row")
                .with_lookup_key(lookup_key),
            active_key_change: None,
        };
    }

    let is_image_grid = options.allow_image_related_grid
        && rows
            .iter()
            .filter(|r| r.analysis.is_image && r.analysis.is_grid)
            .count()
            > 1;
    let multi_table_spectrum = rows
        .iter()
        .filter(|r| r.analysis.is_this && r.analysis.is_grid && r.analysis.is_spectrum)
        .count()
        > 1;
    if input.algorithm == ParsingAlgorithm::UseAll && multi_table_spectrum {
        input.algorithm = ParsingAlgorithm::Spectrum;
    }

    let collapsed = collapse_cutout_pairs(rows, options.prefer_cutout, options.cutout_warn_size);
    let menu = create_datalink_menu(&input, &collapsed);
    let ctx = &input.ctx;
    debug!(entries = menu.len(), algorithm = ?input.algorithm, "datalink menu for {}", lookup_key);

    if can_show(&menu, options.max_display_size) {
        let mut index = None;
        if is_image_grid {
            let last = memory
                .current_active_key_id()
                .and_then(|id| memory.active_menu_key(&id));
            index = last.and_then(|k| menu.iter().position(|m| m.menu_key == k));
        }
        let index = index
            .or_else(|| {
                memory
                    .active_menu_key(&lookup_key)
                    .and_then(|k| menu.iter().position(|m| m.menu_key == k))
            })
            .unwrap_or(0);
        let active_key = menu[index].menu_key.clone();
        if let Some(candidate) = DisplayCandidate::from_menu(menu, index, lookup_key.clone()) {
            return MenuResolution {
                candidate,
                active_key_change: Some((lookup_key, active_key)),
            };
        }
        return MenuResolution {
            candidate: DisplayCandidate::message("No data available for this row"),
            active_key_change: None,
        };
    }

    if menu.is_empty() {
        return MenuResolution {
            candidate: DisplayCandidate::message("No data available for this row")
                .with_lookup_key(lookup_key),
            active_key_change: None,
        };
    }

    let downloads = convert_all_to_download(&menu);
    let msg = if downloads.is_empty() {
        "No displayable data available for this row"
    } else {
        "You may only download data for this row - nothing to display"
    };
    let mut msg_menu = downloads;
    if let Some(url) = ctx.dl_table_url {
        msg_menu.extend(datalink_table_entries(url, "nd0-showtable", "nd1-downloadtable"));
    }
    let mut candidate = DisplayCandidate::message(msg)
        .with_menu(msg_menu)
        .with_lookup_key(lookup_key);
    if let Some(m) = candidate.as_message_mut() {
        m.single_download = true;
    }
    MenuResolution {
        candidate,
        active_key_change: None,
    }
}

#[cfg(test)]
mod menu_test {
    use std::sync::Arc;

    use super::*;
    use crate::{constants::TOO_LARGE_SUFFIX, options::FactoryOptions, table::TableModel};

    struct Remembered(Vec<(String, String)>, Option<String>);

    impl MenuMemory for Remembered {
        fn active_menu_key(&self, lookup_key: &str) -> Option<MenuKey> {
            self.0
                .iter()
                .find(|(k, _)| k == lookup_key)
                .map(|(_, v)| v.clone())
        }

        fn current_active_key_id(&self) -> Option<LookupKey> {
            self.1.clone()
        }
    }

    const COLS: [&str; 8] = [
        "ID",
        "access_url",
        "service_def",
        "error_message",
        "semantics",
        "content_type",
        "content_length",
        "description",
    ];

    fn dl_row(cells: [&str; 8]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn run(dl: &TableModel, options: &FactoryOptions, memory: &dyn MenuMemory) -> MenuResolution {
        let source = Arc::new(TableModel::new("src", &["a"], vec![vec!["1".into()]]));
        let input = DatalinkMenuInput {
            ctx: EntryContext {
                source_table: &source,
                source_row: 0,
                dl_table_url: Some("https://x.org/dl?ID=1"),
                options,
                do_file_analysis: true,
            },
            datalink_table: dl,
            base_title: None,
            algorithm: ParsingAlgorithm::UseAll,
            additional_service_menu: vec![],
        };
        process_datalink_table(input, memory)
    }

    fn names(c: &DisplayCandidate) -> Vec<String> {
        c.menu
            .as_ref()
            .map(|m| m.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_use_all_menu() {
        let dl = TableModel::new(
            "dl",
            &COLS,
            vec![
                dl_row(["a", "https://x.org/aux.fits", "", "", "#auxiliary", "application/fits", "10", "aux"]),
                dl_row(["a", "https://x.org/a.fits", "", "", "#this", "application/fits", "100", "main"]),
                dl_row(["a", "", "", "gone", "#progenitor", "", "", ""]),
            ],
        );
        let r = run(&dl, &FactoryOptions::default(), &NoMemory);
        assert_eq!(
            names(&r.candidate),
            vec![
                "Show: Primary product (#this)",
                "Show: auxiliary",
                "Error in related data (datalink) row 2",
                "Show Datalink VO Table for list of products",
                "Download Datalink VO Table for list of products",
            ]
        );
        assert_eq!(r.candidate.menu_key, "dlt-1");
        assert_eq!(
            r.active_key_change,
            Some(("https://x.org/dl?ID=1".to_string(), "dlt-1".to_string()))
        );
    }

    #[test]
    fn test_remembered_key() {
        let dl = TableModel::new(
            "dl",
            &COLS,
            vec![
                dl_row(["a", "https://x.org/a.fits", "", "", "#this", "application/fits", "100", ""]),
                dl_row(["a", "https://x.org/b.fits", "", "", "#preview", "application/fits", "100", ""]),
            ],
        );
        let memory = Remembered(vec![("https://x.org/dl?ID=1".into(), "dlt-1".into())], None);
        let r = run(&dl, &FactoryOptions::default(), &memory);
        assert_eq!(r.candidate.menu_key, "dlt-1");
    }

    #[test]
    fn test_only_downloads() {
        let dl = TableModel::new(
            "dl",
            &COLS,
            vec![dl_row([
                "a",
                "https://x.org/a.fits",
                "",
                "",
                "#this",
                "application/fits",
                "3221225472",
                "",
            ])],
        );
        let r = run(&dl, &FactoryOptions::default(), &NoMemory);
        let m = r.candidate.as_message().unwrap();
        assert_eq!(m.message, "You may only download data for this row - nothing to display");
        assert!(m.single_download);
        let menu = r.candidate.menu.as_ref().unwrap();
        assert!(menu[0].name.ends_with(TOO_LARGE_SUFFIX));
        assert_eq!(menu[1].menu_key, "nd0-showtable");
        assert_eq!(menu[2].menu_key, "nd1-downloadtable");
        assert!(r.active_key_change.is_none());
    }

    #[test]
    fn test_p5_cutout_pair() {
        let dl = TableModel::new(
            "dl",
            &["ID", "access_url", "semantics", "content_type", "content_length"],
            vec![
                vec!["a", "https://x.org/a.fits", "#this", "image/fits", "2147483648"],
                vec!["a", "https://x.org/soda?ID=a", "#cutout", "image/fits", "1048576"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect(),
        );
        let r = run(&dl, &FactoryOptions::default(), &NoMemory);
        let menu = r.candidate.menu.as_ref().unwrap();
        let for_a: Vec<_> = menu
            .iter()
            .filter(|m| m.menu_key.starts_with("dlt-"))
            .collect();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].menu_key, "dlt-1");
        assert_eq!(for_a[0].size_warning.as_deref(), Some("Full image size: 2048.0 MB"));
    }

    #[test]
    fn test_empty_table() {
        let dl = TableModel::new("dl", &COLS, vec![]);
        let r = run(&dl, &FactoryOptions::default(), &NoMemory);
        assert_eq!(r.candidate.as_message().unwrap().message, "No data available for this row");
    }

    #[test]
    fn test_convert_all_to_download() {
        let menu = vec![
            DisplayCandidate::png("p", "https://x.org/p.png", "dlt-0"),
            DisplayCandidate::message("m"),
        ];
        let d = convert_all_to_download(&menu);
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].display_type(), DisplayType::Download);
        assert_eq!(d[0].url(), Some("https://x.org/p.png"));
    }
}
