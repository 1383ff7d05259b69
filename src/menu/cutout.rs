//! Full-image / cutout pair collapsing.

use crate::menu::datalink::DatalinkRow;

const MB: f64 = 1_048_576.0;

fn size_warning(dropped: &DatalinkRow, warn_size: u64) -> Option<String> {
    let size = dropped.size.filter(|&s| s > warn_size)?;
    let what = if dropped.analysis.is_cutout {
        "Cutout"
    } else {
        "Full image"
    };
    Some(format!("{what} size: {:.1} MB", size as f64 / MB))
}

/// Keep one side of every linked full/cutout pair.
///
/// Arguments
/// -----------------
/// * `rows`: Datalink rows, as returned by [`read_datalink_rows`](crate::menu::datalink::read_datalink_rows).
/// * `prefer_cutout`: Keep the cutout side, else the full image.
/// * `warn_size`: Size (bytes) of the dropped side above which the kept side is annotated.
///
/// Return
/// ----------
/// * The rows in their original order, each with its optional size warning.
pub fn collapse_cutout_pairs(
    rows: Vec<DatalinkRow>,
    prefer_cutout: bool,
    warn_size: u64,
) -> Vec<(DatalinkRow, Option<String>)> {
    let partner = |r: &DatalinkRow| r.related_cutout.or(r.related_full_image);

    rows.iter()
        .filter(|r| {
            !r.analysis.cutout_full_pair || partner(r).is_none() || r.analysis.is_cutout == prefer_cutout
        })
        .map(|r| {
            let warning = partner(r)
                .filter(|_| r.analysis.cutout_full_pair)
                .and_then(|p| rows.get(p))
                .and_then(|dropped| size_warning(dropped, warn_size));
            (r.clone(), warning)
        })
        .collect()
}

/// Warning attached to a related image grid built from cutouts.
///
/// Return
/// ----------
/// * `Some` when the full images behind the cutouts add up to more than `warn_size`.
pub fn cutout_total_warning(full_sizes: &[Option<u64>], warn_size: u64) -> Option<String> {
    let total: u64 = full_sizes.iter().flatten().sum();
    (total > warn_size).then(|| {
        format!(
            "{} full images, total size: {:.1} MB",
            full_sizes.len(),
            total as f64 / MB
        )
    })
}
