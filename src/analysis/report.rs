//! File analysis report returned by the remote inspect operation.
//!
//! The inspect service answers with a cache handle, a file format and a JSON encoded
//! [`FileAnalysisReport`](crate::analysis::report::FileAnalysisReport) describing every part
//! (HDU, table, ...) found in the file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataprod_errors::DataProdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FileFormat {
    #[serde(rename = "FITS")]
    Fits,
    #[serde(rename = "VO_TABLE", alias = "VOTABLE")]
    VoTable,
    #[serde(rename = "IPACTABLE")]
    IpacTable,
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "TSV")]
    Tsv,
    #[serde(rename = "PARQUET")]
    Parquet,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "TAR")]
    Tar,
    #[serde(rename = "REGION")]
    Region,
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "HTML")]
    Html,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartType {
    Image,
    Table,
    HeaderOnly,
    ErrorResponse,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One part (HDU, table, ...) of an analyzed file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilePart {
    pub index: usize,
    #[serde(rename = "type")]
    pub part_type: PartType,
    pub desc: String,
    pub total_table_rows: u64,
    /// Axis lengths of an image part.
    pub naxis: Vec<u64>,
    /// Column names when the part can be read as a table.
    pub column_names: Vec<String>,
    /// Extra request parameters needed to load the image of this part.
    pub additional_image_params: BTreeMap<String, String>,
}

impl FilePart {
    pub fn is_image(&self) -> bool {
        self.part_type == PartType::Image
    }

    pub fn is_table(&self) -> bool {
        self.part_type == PartType::Table
    }

    /// An image part with fewer than two significant axes.
    pub fn is_one_dimensional_image(&self) -> bool {
        self.is_image() && (self.naxis.len() < 2 || self.naxis.iter().take(2).any(|&n| n <= 1))
    }

    /// Number of planes of a cube, `1` for a plain image.
    pub fn planes(&self) -> u64 {
        self.naxis.get(2).copied().filter(|&n| n > 1).unwrap_or(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileAnalysisReport {
    pub file_path: String,
    pub file_name: String,
    pub file_format: FileFormat,
    pub parts: Option<Vec<FilePart>>,
    pub disable_all_image_option: bool,
    pub data_products_analyzer_id: Option<String>,
    /// `false` when the server names an analyzer it could not run; client analyzers then apply.
    /// A report without the field was analyzed server side.
    #[serde(default = "server_analyzed")]
    pub analyzer_found: bool,
}

fn server_analyzed() -> bool {
    true
}

impl FileAnalysisReport {
    pub fn parts(&self) -> &[FilePart] {
        self.parts.as_deref().unwrap_or_default()
    }

    /// The server could not retrieve or read the file.
    pub fn is_error_response(&self) -> bool {
        self.parts()
            .first()
            .is_some_and(|p| p.part_type == PartType::ErrorResponse)
    }

    pub fn error_desc(&self) -> Option<&str> {
        self.parts()
            .first()
            .filter(|p| p.part_type == PartType::ErrorResponse)
            .map(|p| p.desc.as_str())
    }

    pub fn image_part_count(&self) -> usize {
        self.parts().iter().filter(|p| p.is_image()).count()
    }

    pub fn all_header_only(&self) -> bool {
        !self.parts().is_empty()
            && self
                .parts()
                .iter()
                .all(|p| p.part_type == PartType::HeaderOnly)
    }
}

/// Raw answer of the inspect operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InspectResponse {
    pub cache_handle: String,
    pub file_format: FileFormat,
    /// JSON encoded [`FileAnalysisReport`].
    pub analysis_result: String,
}

impl InspectResponse {
    /// Decode the embedded report.
    ///
    /// Return
    /// ----------
    /// * `Ok(None)` when the response carries no cache handle or no report.
    /// * A [`DataProdError::JsonError`] when the report is not valid JSON.
    pub fn report(&self) -> Result<Option<FileAnalysisReport>, DataProdError> {
        if self.cache_handle.is_empty() || self.analysis_result.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&self.analysis_result)?))
    }
}

#[cfg(test)]
mod report_test {
    use super::*;

    #[test]
    fn test_decode_report() {
        let json = r#"{
            "filePath": "/cache/x.fits",
            "fileName": "x.fits",
            "fileFormat": "FITS",
            "parts": [
                {"index": 0, "type": "HeaderOnly", "desc": "Primary"},
                {"index": 1, "type": "Image", "desc": "SCI", "naxis": [100, 200]},
                {"index": 2, "type": "Table", "desc": "SPEC (3 cols x 120 rows)", "totalTableRows": 120,
                 "columnNames": ["wave", "flux", "err"]},
                {"index": 3, "type": "Mystery"}
            ]
        }"#;
        let resp = InspectResponse {
            cache_handle: "${upload}/x.fits".into(),
            file_format: FileFormat::Fits,
            analysis_result: json.into(),
        };
        let report = resp.report().unwrap().unwrap();
        assert_eq!(report.file_format, FileFormat::Fits);
        assert_eq!(report.parts().len(), 4);
        assert_eq!(report.image_part_count(), 1);
        assert_eq!(report.parts()[3].part_type, PartType::Unknown);
        assert!(!report.parts()[1].is_one_dimensional_image());
        assert!(!report.is_error_response());
        assert!(!report.all_header_only());
    }

    #[test]
    fn test_empty_response() {
        let resp = InspectResponse::default();
        assert_eq!(resp.report(), Ok(None));
        let bad = InspectResponse {
            cache_handle: "h".into(),
            analysis_result: "{not json".into(),
            ..Default::default()
        };
        assert!(bad.report().is_err());
    }

    #[test]
    fn test_one_dimensional() {
        let p = FilePart {
            part_type: PartType::Image,
            naxis: vec![2048, 1],
            ..Default::default()
        };
        assert!(p.is_one_dimensional_image());
        let cube = FilePart {
            part_type: PartType::Image,
            naxis: vec![10, 10, 5],
            ..Default::default()
        };
        assert_eq!(cube.planes(), 5);
    }

    #[test]
    fn test_analyzer_found_defaults_to_server_side() {
        let r: FileAnalysisReport = serde_json::from_str(r#"{"fileFormat": "FITS"}"#).unwrap();
        assert!(r.analyzer_found);
        let r: FileAnalysisReport =
            serde_json::from_str(r#"{"fileFormat": "FITS", "analyzerFound": false}"#).unwrap();
        assert!(!r.analyzer_found);
    }
}
