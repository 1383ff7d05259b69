//! Construction of the menu of one deeply analyzed file.
//!
//! The report of the inspect operation is turned into a [`FileMenu`]: an optional
//! "all images" entry, then one entry per usable part. The entry to activate is the one the user
//! picked last for the same request (remembered under the request fingerprint), else a default
//! chosen from the data type hint.

use std::sync::Arc;

use tracing::debug;

use crate::{
    analysis::{
        cache::Fingerprint,
        report::{FileAnalysisReport, FileFormat},
    },
    candidate::{Activation, CandidateKind, DataTypeHint, DisplayCandidate, FileMenu},
    constants::{LookupKey, MenuKey},
    menu::{
        ordering::apply_type_hint,
        part_analyzer::{analyze_part, choose_default_entry, PartAnalysis, PartContext},
    },
    options::FactoryOptions,
    request::ProductRequest,
    table::TableModel,
};

/// Inputs of [`process_analysis_result`].
#[derive(Debug, Clone, Copy)]
pub struct FileMenuInput<'a> {
    pub table: &'a Arc<TableModel>,
    pub row: usize,
    /// The request that was analyzed, with its service parameters applied.
    pub request: &'a ProductRequest,
    pub cache_handle: &'a str,
    pub report: &'a Arc<FileAnalysisReport>,
    pub data_type_hint: &'a DataTypeHint,
    pub options: &'a FactoryOptions,
}

/// A resolved file menu and the active key to record for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMenuResolution {
    pub candidate: DisplayCandidate,
    /// `(request fingerprint, menu key)` of the activated entry, absent for messages.
    pub active_key_change: Option<(LookupKey, MenuKey)>,
}

impl FileMenuResolution {
    fn message(candidate: DisplayCandidate) -> Self {
        FileMenuResolution {
            candidate,
            active_key_change: None,
        }
    }
}

/// Message offered when an analyzed file has nothing to show.
pub fn make_error_result(message: &str, file_name: Option<&str>, url: Option<&str>) -> DisplayCandidate {
    let text = if message.is_empty() {
        "No displayable data available for this row".to_string()
    } else {
        format!("No displayable data available for this row: {message}")
    };
    DisplayCandidate::message_with_download(
        text,
        file_name.filter(|f| !f.is_empty()).map(|f| format!("Download: {f}")),
        url.map(str::to_string),
    )
}

fn empty_menu_message(report: &FileAnalysisReport) -> &'static str {
    if report.all_header_only() && report.file_format == FileFormat::Fits {
        "You may only download this File - Nothing to display - FITS file has only header HDUs"
    } else {
        "Cannot analyze file"
    }
}

fn download_only(message: &str, label: &str, url: &str) -> DisplayCandidate {
    DisplayCandidate::message_with_download(message, Some(label.to_string()), Some(url.to_string()))
}

/// Candidate for file formats that never get a menu.
fn format_shortcut(report: &FileAnalysisReport, url: &str) -> Option<DisplayCandidate> {
    let c = match report.file_format {
        FileFormat::Pdf => download_only(
            "Cannot display PDF file, you may only download it",
            "Download PDF File",
            url,
        ),
        FileFormat::Tar => download_only(
            "Cannot display Tar file, you may only download it",
            "Download Tar File",
            url,
        ),
        FileFormat::Region => download_only(
            "Cannot display Region file, you may only download it",
            "Download Region File",
            url,
        ),
        FileFormat::Png => DisplayCandidate::png("PNG Image", url, "png-0"),
        FileFormat::Html => DisplayCandidate::send_to_browser(url),
        _ => return None,
    };
    Some(c)
}

fn all_image_entry(input: &FileMenuInput, image_part_count: usize) -> DisplayCandidate {
    let path = if input.report.file_path.is_empty() {
        input.cache_handle
    } else {
        input.report.file_path.as_str()
    };
    let mut request = input.request.to_file_request(path);
    for (k, v) in input
        .report
        .parts()
        .iter()
        .flat_map(|p| p.additional_image_params.iter())
    {
        request.set_param(k, v);
    }
    let name = if image_part_count > 1 {
        "Image Data: All Images in File"
    } else {
        "Image Data"
    };
    let activate = Activation::SingleImage {
        request: request.clone(),
        tbl_id: input.table.tbl_id.clone(),
        row: input.row,
    };
    DisplayCandidate::image(name, Some(activate), Some(request), "image-0")
}

fn build_menu(input: &FileMenuInput, analyses: Vec<PartAnalysis>) -> Vec<DisplayCandidate> {
    let part_count = input.report.parts().len();
    let image_parts = analyses.iter().filter(|pa| pa.image.is_some()).count();
    let duo_parts = analyses.iter().filter(|pa| pa.is_duo()).count();

    let mut make_all_images = !input.report.disable_all_image_option
        && (image_parts > 1 || (image_parts == 1 && part_count == 1));
    // a single image that is also a table is shown through its table entry
    if make_all_images && duo_parts == 1 && image_parts == 1 {
        make_all_images = false;
    }
    let use_part_images = part_count > 1 || !make_all_images || duo_parts > 0;

    let mut menu = Vec::new();
    if make_all_images {
        menu.push(all_image_entry(input, image_parts));
    }
    for pa in analyses {
        match (pa.image, pa.table) {
            (Some(image), Some(mut table)) => {
                if let CandidateKind::Table(t) | CandidateKind::ChartTable(t) = &mut table.kind {
                    t.image_activate = image.activation().cloned();
                }
                menu.push(table);
            }
            (image, table) => {
                if use_part_images {
                    menu.extend(image);
                }
                menu.extend(table);
            }
        }
        menu.extend(pa.download);
    }
    menu
}

/// Build the menu of an analyzed file and pick its active entry.
///
/// Arguments
/// -----------------
/// * `input`: The analyzed request, its report and the source row.
/// * `last_active`: Menu key the user picked last for a lookup key, usually read from the
///   selection store.
///
/// Return
/// ----------
/// * The active entry carrying the whole [`FileMenu`], or a message when the file cannot be shown.
///
/// See also
/// ------------
/// * [`analyze_part`] – Classification of each part.
/// * [`apply_type_hint`] – Placement of image entries.
pub fn process_analysis_result(
    input: &FileMenuInput,
    last_active: impl FnOnce(&str) -> Option<MenuKey>,
) -> FileMenuResolution {
    let report = input.report;
    let url = input.request.url().unwrap_or(input.cache_handle);

    if let Some(desc) = report.error_desc() {
        let mut m = DisplayCandidate::message_with_error(desc);
        if let Some(msg) = m.as_message_mut() {
            msg.bad_url = input.request.url().map(str::to_string);
        }
        return FileMenuResolution::message(m);
    }
    if report.parts.is_none() || report.file_format == FileFormat::Unknown {
        return FileMenuResolution::message(make_error_result(
            "Could not parse file",
            Some(&report.file_name),
            Some(input.cache_handle),
        ));
    }
    if let Some(c) = format_shortcut(report, url) {
        return FileMenuResolution::message(c);
    }

    let part_ctx = PartContext {
        request: input.request,
        table: input.table,
        row: input.row,
        file_format: report.file_format,
        cache_handle: input.cache_handle,
        options: input.options,
    };
    let analyses = report
        .parts()
        .iter()
        .map(|p| analyze_part(&part_ctx, p))
        .collect();
    let mut menu = apply_type_hint(build_menu(input, analyses), input.data_type_hint);

    if menu.is_empty() {
        let mut m = DisplayCandidate::message_with_download(
            empty_menu_message(report),
            Some("Download File".to_string()),
            Some(url.to_string()),
        );
        if let Some(msg) = m.as_message_mut() {
            msg.file_type = (report.file_format == FileFormat::Fits).then(|| "FITS".to_string());
        }
        return FileMenuResolution::message(m);
    }

    for (idx, entry) in menu.iter_mut().enumerate() {
        entry.menu_key = format!("fm-{idx}");
    }
    let prefer_chart = matches!(
        input.data_type_hint,
        DataTypeHint::Spectrum | DataTypeHint::Timeseries
    );
    let initial_default_index = choose_default_entry(&menu, prefer_chart);

    let origin = input.request.to_string();
    let lookup_key = Fingerprint::of(input.request, None).to_string();
    let active_idx = last_active(&lookup_key)
        .and_then(|key| menu.iter().position(|m| m.menu_key == key))
        .unwrap_or(initial_default_index);
    debug!(
        entries = menu.len(),
        active_idx, "file menu built for {}", origin
    );

    let mut candidate = menu[active_idx].clone();
    let active_key = candidate.menu_key.clone();
    candidate.file_menu = Some(Box::new(FileMenu {
        report: report.clone(),
        menu,
        active_item_lookup_key: lookup_key.clone(),
        active_item_lookup_key_origin: origin,
        initial_default_index,
    }));
    FileMenuResolution {
        candidate,
        active_key_change: Some((lookup_key, active_key)),
    }
}

#[cfg(test)]
mod file_menu_test {
    use super::*;
    use crate::{
        analysis::report::{FilePart, PartType},
        candidate::DisplayType,
    };

    fn part(index: usize, part_type: PartType) -> FilePart {
        FilePart {
            index,
            part_type,
            naxis: if part_type == PartType::Image { vec![10, 10] } else { vec![] },
            ..Default::default()
        }
    }

    fn run(report: FileAnalysisReport, hint: DataTypeHint, last: Option<&str>) -> FileMenuResolution {
        let table = Arc::new(TableModel::new("src", &["a"], vec![vec!["1".into()]]));
        let request = ProductRequest::from_url("https://x.org/a.fits");
        let options = FactoryOptions::default();
        let report = Arc::new(report);
        let input = FileMenuInput {
            table: &table,
            row: 0,
            request: &request,
            cache_handle: "/cache/a.fits",
            report: &report,
            data_type_hint: &hint,
            options: &options,
        };
        process_analysis_result(&input, |_| last.map(str::to_string))
    }

    fn fits(parts: Vec<FilePart>) -> FileAnalysisReport {
        FileAnalysisReport {
            file_path: "/cache/a.fits".into(),
            file_name: "a.fits".into(),
            file_format: FileFormat::Fits,
            parts: Some(parts),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_only_fits() {
        let r = run(
            fits(vec![part(0, PartType::HeaderOnly), part(1, PartType::HeaderOnly)]),
            DataTypeHint::Unspecified,
            None,
        );
        let m = r.candidate.as_message().unwrap();
        assert!(m.message.contains("only header HDUs"));
        assert_eq!(m.download.as_ref().unwrap().label, "Download File");
        assert!(r.active_key_change.is_none());
    }

    #[test]
    fn test_single_image_file() {
        let r = run(fits(vec![part(0, PartType::Image)]), DataTypeHint::Unspecified, None);
        let fm = r.candidate.file_menu.as_ref().unwrap();
        assert_eq!(fm.menu.len(), 1);
        assert_eq!(r.candidate.name, "Image Data");
        assert_eq!(r.candidate.menu_key, "fm-0");
        assert_eq!(r.active_key_change.unwrap().1, "fm-0");
    }

    #[test]
    fn test_multi_part_file() {
        let mut t = part(2, PartType::Table);
        t.total_table_rows = 10;
        t.column_names = vec!["wavelength".into(), "flux".into()];
        let r = run(
            fits(vec![part(0, PartType::Image), part(1, PartType::Image), t]),
            DataTypeHint::Spectrum,
            None,
        );
        let fm = r.candidate.file_menu.as_ref().unwrap();
        let names: Vec<_> = fm.menu.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Chart - HDU #2",
                "Image Data: All Images in File",
                "Image - HDU #0",
                "Image - HDU #1"
            ]
        );
        assert_eq!(r.candidate.display_type(), DisplayType::ChartTable);
    }

    #[test]
    fn test_last_active_key_wins() {
        let r = run(
            fits(vec![part(0, PartType::Image), part(1, PartType::Image)]),
            DataTypeHint::Unspecified,
            Some("fm-2"),
        );
        assert_eq!(r.candidate.menu_key, "fm-2");
        assert_eq!(r.candidate.name, "Image - HDU #1");
    }

    #[test]
    fn test_shortcuts_and_errors() {
        let mut pdf = fits(vec![part(0, PartType::Unknown)]);
        pdf.file_format = FileFormat::Pdf;
        let r = run(pdf, DataTypeHint::Unspecified, None);
        assert!(r.candidate.as_message().unwrap().message.contains("PDF"));

        let mut unknown = fits(vec![]);
        unknown.file_format = FileFormat::Unknown;
        let r = run(unknown, DataTypeHint::Unspecified, None);
        assert_eq!(
            r.candidate.as_message().unwrap().message,
            "No displayable data available for this row: Could not parse file"
        );

        let mut err = fits(vec![FilePart {
            part_type: PartType::ErrorResponse,
            desc: "404 not found".into(),
            ..Default::default()
        }]);
        err.file_format = FileFormat::Unknown;
        let r = run(err, DataTypeHint::Unspecified, None);
        let m = r.candidate.as_message().unwrap();
        assert_eq!(m.detail.as_deref(), Some("404 not found"));
        assert_eq!(m.bad_url.as_deref(), Some("https://x.org/a.fits"));
    }
}
