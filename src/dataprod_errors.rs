use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataProdError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("VOTable parsing error: {0}")]
    VoTableError(#[from] quick_xml::DeError),

    #[cfg(feature = "http")]
    #[error("HTTP reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Inspect call failed: {0}")]
    InspectFailed(String),

    #[error("Datalink fetch failed for {url}: {reason}")]
    DatalinkFetchFailed { url: String, reason: String },

    #[error("Request has no URL or file to analyze")]
    MissingSource,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Row {row} out of range for table {tbl_id}")]
    RowOutOfRange { tbl_id: String, row: usize },

    #[error("Invalid factory option: {0}")]
    InvalidOption(String),

    #[error("Resolution aborted")]
    Aborted,
}

impl PartialEq for DataProdError {
    fn eq(&self, other: &Self) -> bool {
        use DataProdError::*;
        match (self, other) {
            (InvalidUrl(a), InvalidUrl(b)) => a == b,

            // not comparable, same variant is enough
            (JsonError(_), JsonError(_)) => true,
            (VoTableError(_), VoTableError(_)) => true,
            #[cfg(feature = "http")]
            (ReqwestError(_), ReqwestError(_)) => true,

            (InspectFailed(a), InspectFailed(b)) => a == b,
            (
                DatalinkFetchFailed { url: u1, reason: r1 },
                DatalinkFetchFailed { url: u2, reason: r2 },
            ) => u1 == u2 && r1 == r2,
            (ColumnNotFound(a), ColumnNotFound(b)) => a == b,
            (
                RowOutOfRange { tbl_id: t1, row: r1 },
                RowOutOfRange { tbl_id: t2, row: r2 },
            ) => t1 == t2 && r1 == r2,
            (InvalidOption(a), InvalidOption(b)) => a == b,

            (MissingSource, MissingSource) => true,
            (Aborted, Aborted) => true,

            _ => false,
        }
    }
}
