//! Row access policy based on proprietary metadata.
//!
//! A table declares its proprietary columns through the `datarights_col` and
//! `release_date_col` metadata entries. A row is accessible when the table declares neither,
//! when its data-rights cell is one of `public, secure, 1, true, t`, or when its release date
//! is in the past.

use hifitime::Epoch;

use crate::{
    constants::{META_DATARIGHTS_COL, META_RELEASE_DATE_COL, PUBLIC_RIGHTS},
    table::TableModel,
};

/// Parse a release date cell.
///
/// Accepts ISO dates (`2020-01-01`), ISO date-times with `T` or with a space separator.
fn parse_release_date(raw: &str) -> Option<Epoch> {
    let raw = raw.trim();
    let candidate = if raw.len() == 10 {
        format!("{raw}T00:00:00")
    } else {
        raw.to_string()
    };
    Epoch::from_gregorian_str(&candidate)
        .or_else(|_| Epoch::from_gregorian_str(&candidate.replacen(' ', "T", 1)))
        .ok()
}

/// Evaluate access to one row at the instant `now`.
///
/// Arguments
/// -----------------
/// * `table`: Source table carrying the proprietary metadata.
/// * `row`: Row index.
/// * `now`: Reference instant compared with the release date.
///
/// Return
/// ----------
/// * `true` when the row may be retrieved.
pub fn has_row_access_at(table: &TableModel, row: usize, now: Epoch) -> bool {
    let release_col = table.meta_entry(META_RELEASE_DATE_COL);
    let rights_col = table.meta_entry(META_DATARIGHTS_COL);
    if release_col.is_none() && rights_col.is_none() {
        return true;
    }

    if let Some(col) = rights_col {
        let rights = table.cell(row, col).unwrap_or_default().trim().to_lowercase();
        if PUBLIC_RIGHTS.contains(&rights.as_str()) {
            return true;
        }
    }

    if let Some(col) = release_col {
        return table
            .non_empty_cell(row, col)
            .and_then(parse_release_date)
            .is_some_and(|release| release < now);
    }
    false
}

/// Evaluate access to one row against the current system time.
///
/// Rows are refused when the clock cannot be read.
pub fn has_row_access(table: &TableModel, row: usize) -> bool {
    match Epoch::now() {
        Ok(now) => has_row_access_at(table, row, now),
        Err(_) => {
            table.meta_entry(META_RELEASE_DATE_COL).is_none()
                && table.meta_entry(META_DATARIGHTS_COL).is_none()
        }
    }
}

#[cfg(test)]
mod row_access_test {
    use super::*;

    fn proprietary_table() -> TableModel {
        TableModel::new(
            "t",
            &["obs_id", "release", "rights"],
            vec![
                vec!["old".into(), "2001-03-04".into(), "proprietary".into()],
                vec!["future".into(), "2990-01-01 10:00:00".into(), "".into()],
                vec!["open".into(), "2990-01-01".into(), "PUBLIC".into()],
                vec!["broken".into(), "not a date".into(), "".into()],
            ],
        )
        .with_meta("release_date_col", "release")
        .with_meta("datarights_col", "rights")
    }

    fn now() -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(2025, 6, 1)
    }

    #[test]
    fn test_no_proprietary_meta() {
        let t = TableModel::new("t", &["a"], vec![vec!["1".into()]]);
        assert!(has_row_access_at(&t, 0, now()));
        assert!(has_row_access(&t, 0));
    }

    #[test]
    fn test_release_and_rights() {
        let t = proprietary_table();
        assert!(has_row_access_at(&t, 0, now()));
        assert!(!has_row_access_at(&t, 1, now()));
        assert!(has_row_access_at(&t, 2, now()));
        assert!(!has_row_access_at(&t, 3, now()));
    }
}
