//! # Source tables
//!
//! In-memory model of a result table as seen by the resolution engine: columns, string cells,
//! free-form metadata and the service descriptors declared alongside the table.
//!
//! The engine never mutates a [`TableModel`](crate::table::TableModel); tables are shared as
//! `Arc<TableModel>` between converters, analysis jobs and candidate activations.
//!
//! ## Overview
//!
//! - Cell and metadata lookup (metadata keys are matched case-insensitively)
//! - Data-source column guessing used by the fallback converter
//! - ObsCore column detection and datalink format detection
//! - [`row_access`](crate::table::row_access) – proprietary period / data rights policy
//! - [`votable`](crate::table::votable) – VOTable `TABLEDATA` reader (datalink responses)
//!
//! ## See also
//! ------------
//! * [`ConverterRegistry`](crate::converter::ConverterRegistry) – consumes the table to pick a converter.
//! * [`DatalinkRow`](crate::menu::datalink::DatalinkRow) – rows derived from a datalink table.

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        FastMap, DEFAULT_DATA_SOURCE_GUESSES, META_DATA_SOURCE, OBSCORE_ACCESS_FORMAT,
        OBSCORE_ACCESS_URL, OBSCORE_PRODUCT_TYPE,
    },
    dataprod_errors::DataProdError,
};

pub mod row_access;
pub mod votable;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub ucd: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One input parameter of a service descriptor.
///
/// A parameter carrying a `ref_id` takes its value from a column of the source row; a parameter
/// without reference, value or options is optional user input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceParam {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub col_name: Option<String>,
    #[serde(default)]
    pub options: Option<String>,
}

impl ServiceParam {
    pub fn is_optional(&self) -> bool {
        self.ref_id.is_none() && self.value.is_none() && self.options.is_none()
    }

    pub fn allows_input(&self) -> bool {
        self.ref_id.is_none()
    }

    pub fn input_required(&self) -> bool {
        self.ref_id.is_none() && self.value.is_none() && !self.is_optional()
    }
}

/// A remotely declared, parametrized operation attached to a table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub access_url: String,
    #[serde(default)]
    pub standard_id: Option<String>,
    #[serde(default)]
    pub url_params: Vec<ServiceParam>,
}

impl ServiceDescriptor {
    /// Parameters the user may fill in before invoking the service.
    pub fn input_params(&self) -> impl Iterator<Item = &ServiceParam> {
        self.url_params.iter().filter(|p| p.allows_input())
    }

    /// Parameters whose value is taken from the source row.
    pub fn row_params(&self) -> impl Iterator<Item = &ServiceParam> {
        self.url_params.iter().filter(|p| p.ref_id.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableModel {
    pub tbl_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub meta: FastMap<String, String>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub highlighted_row: usize,
    #[serde(default)]
    pub service_descriptors: Vec<ServiceDescriptor>,
}

impl TableModel {
    /// Build a table from column names and string rows.
    ///
    /// Arguments
    /// -----------------
    /// * `tbl_id`: Table identifier, used as lookup key by grid menus.
    /// * `column_names`: Column names, in cell order.
    /// * `rows`: Row cells; short rows are treated as having empty trailing cells.
    ///
    /// Return
    /// ----------
    /// * A [`TableModel`] with empty metadata and the first row highlighted.
    pub fn new(tbl_id: impl Into<String>, column_names: &[&str], rows: Vec<Vec<String>>) -> Self {
        TableModel {
            tbl_id: tbl_id.into(),
            columns: column_names.iter().map(|n| Column::new(*n)).collect(),
            rows,
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_highlighted_row(mut self, row: usize) -> Self {
        self.highlighted_row = row;
        self
    }

    pub fn with_service_descriptor(mut self, sd: ServiceDescriptor) -> Self {
        self.service_descriptors.push(sd);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column, exact name first, then case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.column_index(n).is_some())
    }

    /// Raw cell value; `None` when the column or the row does not exist.
    pub fn cell(&self, row: usize, col_name: &str) -> Option<&str> {
        let idx = self.column_index(col_name)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// Cell value with empty strings mapped to `None`.
    pub fn non_empty_cell(&self, row: usize, col_name: &str) -> Option<&str> {
        self.cell(row, col_name).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn try_cell(&self, row: usize, col_name: &str) -> Result<&str, DataProdError> {
        if row >= self.rows.len() {
            return Err(DataProdError::RowOutOfRange {
                tbl_id: self.tbl_id.clone(),
                row,
            });
        }
        self.cell(row, col_name)
            .ok_or_else(|| DataProdError::ColumnNotFound(col_name.to_string()))
    }

    /// Every cell of a row keyed by column name.
    pub fn row_as_map(&self, row: usize) -> FastMap<String, String> {
        let mut map = FastMap::default();
        if let Some(cells) = self.rows.get(row) {
            for (col, value) in self.columns.iter().zip(cells) {
                map.insert(col.name.clone(), value.clone());
            }
        }
        map
    }

    /// Metadata entry, key matched case-insensitively.
    pub fn meta_entry(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First metadata entry matching any of `keys`, keys matched case-insensitively.
    pub fn find_meta_entry(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.meta_entry(k))
    }

    /// Resolve a column `ID` (as referenced by service descriptor params) to its name.
    pub fn column_id_to_name(&self, id: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.id.as_deref() == Some(id) || c.name == id)
            .map(|c| c.name.as_str())
    }

    /// Guess the column holding a file or URL to display.
    ///
    /// The value of the `DataSource` metadata entry is tried first, then the fixed guesses
    /// `FILE, FITS, DATA, SOURCE, URL`, all compared case-insensitively.
    pub fn find_data_source_column(&self) -> Option<&Column> {
        let guesses: Vec<String> = self
            .meta_entry(META_DATA_SOURCE)
            .into_iter()
            .chain(DEFAULT_DATA_SOURCE_GUESSES.iter().copied())
            .map(str::to_uppercase)
            .collect();
        self.columns
            .iter()
            .find(|c| guesses.contains(&c.name.to_uppercase()))
    }

    /// True when the table carries the three ObsCore columns needed to locate a product.
    pub fn has_obscore_like_data_products(&self) -> bool {
        self.has_columns(&[
            OBSCORE_ACCESS_URL,
            OBSCORE_ACCESS_FORMAT,
            OBSCORE_PRODUCT_TYPE,
        ])
    }

    pub fn obscore_access_url(&self, row: usize) -> Option<&str> {
        self.non_empty_cell(row, OBSCORE_ACCESS_URL)
    }

    pub fn obscore_access_format(&self, row: usize) -> String {
        self.cell(row, OBSCORE_ACCESS_FORMAT)
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn obscore_product_type(&self, row: usize) -> Option<&str> {
        self.non_empty_cell(row, OBSCORE_PRODUCT_TYPE)
    }

    /// The access URL of this row points at a datalink table.
    pub fn is_format_datalink(&self, row: usize) -> bool {
        let format = self.obscore_access_format(row);
        format.contains("votable") && format.contains("content=datalink")
    }

    pub fn has_service_descriptors(&self) -> bool {
        !self.service_descriptors.is_empty()
    }
}
