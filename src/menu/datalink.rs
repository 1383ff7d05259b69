//! Datalink rows and their derived classification flags.
//!
//! Each row of a datalink table is read into a [`DatalinkRow`](crate::menu::datalink::DatalinkRow)
//! whose [`DatalinkAnalysis`](crate::menu::datalink::DatalinkAnalysis) flags drive menu
//! construction. Full-image / cutout rows sharing the same `ID` are linked once, here.

use crate::{
    constants::{
        DL_ACCESS_URL, DL_CONTENT_LENGTH, DL_CONTENT_QUALIFIER, DL_CONTENT_TYPE, DL_DESCRIPTION,
        DL_ERROR_MESSAGE, DL_ID, DL_LOCAL_SEMANTICS, DL_SEMANTICS, DL_SERVICE_DEF,
    },
    table::{ServiceDescriptor, TableModel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatalinkAnalysis {
    pub is_this: bool,
    pub is_auxiliary: bool,
    pub is_counterpart: bool,
    pub is_cutout: bool,
    pub is_grid: bool,
    pub is_spectrum: bool,
    pub is_image: bool,
    pub maybe_image: bool,
    pub is_simple_image: bool,
    pub is_tar: bool,
    pub is_gzip: bool,
    pub is_download_only: bool,
    /// Linked with a row of the same `ID` on the other side of the full/cutout split.
    pub cutout_full_pair: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatalinkRow {
    /// Row index in the datalink table.
    pub row_idx: usize,
    pub id: String,
    pub semantics: String,
    pub local_semantics: String,
    pub content_type: String,
    pub content_qualifier: String,
    pub url: Option<String>,
    pub service_def_ref: Option<String>,
    pub service_def: Option<ServiceDescriptor>,
    pub size: Option<u64>,
    pub description: String,
    pub error_message: Option<String>,
    pub analysis: DatalinkAnalysis,
    /// Index (in the returned list) of the linked cutout row.
    pub related_cutout: Option<usize>,
    /// Index (in the returned list) of the linked full-image row.
    pub related_full_image: Option<usize>,
}

pub fn is_simple_image_type(ct: &str) -> bool {
    ["image/png", "image/jpeg", "image/jpg", "image/gif"]
        .iter()
        .any(|t| ct.starts_with(t))
}

pub fn is_tar_type(ct: &str) -> bool {
    ct.contains("tar")
}

pub fn is_gzip_type(ct: &str) -> bool {
    ct.contains("gzip") || ct.ends_with("/gz")
}

/// Content types that can only be downloaded.
pub fn is_download_type(ct: &str) -> bool {
    is_tar_type(ct) || is_gzip_type(ct) || ct.contains("octet-stream") || ct.contains("zip")
}

pub fn is_votable(ct: &str) -> bool {
    ct.contains("votable") || ct.contains("x-votable")
}

fn analyze(sem: &str, local_sem: &str, ct: &str, qualifier: &str) -> DatalinkAnalysis {
    let is_this = sem.starts_with("#this");
    let is_cutout = sem.contains("cutout") || local_sem.contains("cutout");
    let is_spectrum = ct.contains("spectrum")
        || local_sem.contains("spectrum")
        || qualifier.contains("spectrum");
    let is_simple_image = is_simple_image_type(ct);
    let maybe_image = ct.is_empty() || ct.contains("fits") || ct.contains("image");
    let is_image = !is_spectrum
        && !is_simple_image
        && (qualifier.contains("image") || qualifier.contains("cube") || (ct.contains("image") && ct.contains("fits")));
    let is_tar = is_tar_type(ct);
    let is_gzip = is_gzip_type(ct);
    DatalinkAnalysis {
        is_this,
        is_auxiliary: sem.contains("auxiliary"),
        is_counterpart: sem.contains("counterpart"),
        is_cutout,
        is_grid: local_sem.contains("grid"),
        is_spectrum,
        is_image,
        maybe_image,
        is_simple_image,
        is_tar,
        is_gzip,
        is_download_only: is_download_type(ct),
        cutout_full_pair: false,
    }
}

/// Copy of a service descriptor whose column-referencing params carry the values of row `row`.
fn resolve_row_params(sd: &ServiceDescriptor, table: &TableModel, row: usize) -> ServiceDescriptor {
    let mut sd = sd.clone();
    for p in sd.url_params.iter_mut().filter(|p| p.value.is_none()) {
        let col = p
            .col_name
            .as_deref()
            .or_else(|| p.ref_id.as_deref().and_then(|r| table.column_id_to_name(r)));
        p.value = col
            .and_then(|c| table.non_empty_cell(row, c))
            .map(str::to_string);
    }
    sd
}

fn is_fetchable_url(url: &str) -> bool {
    let u = url.to_lowercase();
    u.starts_with("http://") || u.starts_with("https://") || u.starts_with("ftp://")
}

/// Read every usable row of a datalink table.
///
/// A row is kept when it references a service descriptor, carries an `http(s)`/`ftp` access URL,
/// or carries an error message. Cutout rows are then linked with the full-image row of the same
/// `ID`; both sides get `cutout_full_pair` set.
///
/// Arguments
/// -----------------
/// * `datalink_table`: The datalink table, with its service descriptors.
///
/// Return
/// ----------
/// * The kept rows, in table order.
pub fn read_datalink_rows(datalink_table: &TableModel) -> Vec<DatalinkRow> {
    let text = |row: usize, col: &str| {
        datalink_table
            .non_empty_cell(row, col)
            .map(str::to_string)
            .unwrap_or_default()
    };

    let mut rows: Vec<DatalinkRow> = (0..datalink_table.row_count())
        .filter_map(|r| {
            let url = datalink_table
                .non_empty_cell(r, DL_ACCESS_URL)
                .filter(|u| is_fetchable_url(u))
                .map(str::to_string);
            let service_def_ref = datalink_table
                .non_empty_cell(r, DL_SERVICE_DEF)
                .map(str::to_string);
            let error_message = datalink_table
                .non_empty_cell(r, DL_ERROR_MESSAGE)
                .map(str::to_string);
            if url.is_none() && service_def_ref.is_none() && error_message.is_none() {
                return None;
            }
            let service_def = service_def_ref.as_ref().and_then(|sref| {
                datalink_table
                    .service_descriptors
                    .iter()
                    .find(|sd| sd.id.as_deref() == Some(sref.as_str()))
                    .map(|sd| resolve_row_params(sd, datalink_table, r))
            });
            let semantics = text(r, DL_SEMANTICS);
            let local_semantics = text(r, DL_LOCAL_SEMANTICS);
            let content_type = text(r, DL_CONTENT_TYPE).to_lowercase();
            let content_qualifier = text(r, DL_CONTENT_QUALIFIER).to_lowercase();
            let analysis = analyze(
                &semantics.to_lowercase(),
                &local_semantics.to_lowercase(),
                &content_type,
                &content_qualifier,
            );
            Some(DatalinkRow {
                row_idx: r,
                id: text(r, DL_ID),
                semantics,
                local_semantics,
                content_type,
                content_qualifier,
                url,
                service_def_ref,
                service_def,
                size: datalink_table
                    .non_empty_cell(r, DL_CONTENT_LENGTH)
                    .and_then(|s| s.parse::<u64>().ok()),
                description: text(r, DL_DESCRIPTION),
                error_message,
                analysis,
                related_cutout: None,
                related_full_image: None,
            })
        })
        .collect();

    link_cutout_pairs(&mut rows);
    rows
}

fn link_cutout_pairs(rows: &mut [DatalinkRow]) {
    let links: Vec<(usize, usize)> = rows
        .iter()
        .enumerate()
        .filter(|(_, r)| r.analysis.is_cutout && !r.id.is_empty())
        .filter_map(|(ci, cutout)| {
            rows.iter()
                .position(|full| {
                    !full.analysis.is_cutout
                        && full.id == cutout.id
                        && full.error_message.is_none()
                        && (full.analysis.maybe_image || full.analysis.is_image)
                })
                .map(|fi| (fi, ci))
        })
        .collect();

    for (fi, ci) in links {
        if rows[fi].related_cutout.is_some() {
            continue;
        }
        rows[fi].related_cutout = Some(ci);
        rows[fi].analysis.cutout_full_pair = true;
        rows[ci].related_full_image = Some(fi);
        rows[ci].analysis.cutout_full_pair = true;
    }
}
