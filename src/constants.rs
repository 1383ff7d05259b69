//! # Constants and type definitions for dataprod
//!
//! This module centralizes the **size thresholds**, **table metadata keys**, **fixed user
//! messages** and **common type aliases** shared by the resolution pipeline.
//!
//! ## Overview
//!
//! - Byte thresholds used to downgrade oversized products to downloads
//! - Metadata keys read from a source table (data source, analyzer, proprietary columns)
//! - Datalink column names
//! - Type aliases for container ids, menu keys and lookup keys

use std::collections::HashMap;

use ahash::RandomState;

// -------------------------------------------------------------------------------------------------
// Size thresholds
// -------------------------------------------------------------------------------------------------

/// One gibibyte, in bytes
pub const GIG: u64 = 1_048_576 * 1024;

/// Default largest product the engine will try to display (2 GiB)
pub const MAX_DISPLAY_SIZE: u64 = 2 * GIG;

/// Default size above which a full image next to its cutout triggers a warning (200 MiB)
pub const CUTOUT_WARN_SIZE: u64 = 200 * 1_048_576;

// -------------------------------------------------------------------------------------------------
// Messages
// -------------------------------------------------------------------------------------------------

pub const LOADING_MSG: &str = "Loading...";
pub const LOADING_DATA_PRODUCTS_MSG: &str = "Loading data products...";
pub const NO_ACCESS_MSG: &str = "You do not have access to this data.";
pub const NO_DATA_PRODUCTS_MSG: &str = "No Data Products";
pub const TOO_LARGE_SUFFIX: &str = "(too large to show)";
pub const THIS_MARKER: &str = "(#this)";

// -------------------------------------------------------------------------------------------------
// Table metadata keys
// -------------------------------------------------------------------------------------------------

pub const META_DATA_SOURCE: &str = "DataSource";
pub const META_IMAGE_SOURCE_ID: &str = "ImageSourceId";
pub const META_DATASET_CONVERTER: &str = "datasetInfoConverterId";
pub const META_ANALYZER_ID: &str = "AnalyzerId";
pub const META_ANALYZER_PARAMS: &str = "AnalyzerParams";
pub const META_ANALYZER_COLUMNS: &str = "AnalyzerColumns";
pub const META_RELEASE_DATE_COL: &str = "release_date_col";
pub const META_DATARIGHTS_COL: &str = "datarights_col";

/// Column name guesses for the fallback converter, after the `DataSource` meta value
pub const DEFAULT_DATA_SOURCE_GUESSES: [&str; 5] = ["FILE", "FITS", "DATA", "SOURCE", "URL"];

/// Values of a data-rights column granting public access
pub const PUBLIC_RIGHTS: [&str; 5] = ["public", "secure", "1", "true", "t"];

// -------------------------------------------------------------------------------------------------
// Datalink / ObsCore columns
// -------------------------------------------------------------------------------------------------

pub const DL_ID: &str = "ID";
pub const DL_ACCESS_URL: &str = "access_url";
pub const DL_SERVICE_DEF: &str = "service_def";
pub const DL_ERROR_MESSAGE: &str = "error_message";
pub const DL_SEMANTICS: &str = "semantics";
pub const DL_LOCAL_SEMANTICS: &str = "local_semantics";
pub const DL_DESCRIPTION: &str = "description";
pub const DL_CONTENT_TYPE: &str = "content_type";
pub const DL_CONTENT_LENGTH: &str = "content_length";
pub const DL_CONTENT_QUALIFIER: &str = "content_qualifier";

pub const OBSCORE_ACCESS_URL: &str = "access_url";
pub const OBSCORE_ACCESS_FORMAT: &str = "access_format";
pub const OBSCORE_PRODUCT_TYPE: &str = "dataproduct_type";

pub const VO_TABLE_CONTENT_TYPE: &str = "application/x-votable+xml";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Identifier of a display container (one per result panel)
pub type DpId = String;

/// Key of a candidate inside its menu (`dlt-3`, `fm-0`, ...)
pub type MenuKey = String;

/// Key under which the last chosen menu entry is remembered
pub type LookupKey = String;

/// Hash map using the `ahash` hasher, used for every keyed map in the crate
pub type FastMap<K, V> = HashMap<K, V, RandomState>;
