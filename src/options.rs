//! # Factory options
//!
//! [`FactoryOptions`](crate::options::FactoryOptions) gathers every tunable of the resolution
//! engine: size thresholds, cutout preference, viewer restrictions, identifiers given to the
//! tables and charts the engine asks the host to load, and capability overrides applied on top of
//! converter templates.
//!
//! Options are attached to a *factory key* in the
//! [`ConverterRegistry`](crate::converter::ConverterRegistry); a host usually has one key per
//! result panel family. Options can be built in code with
//! [`FactoryOptions::builder`](crate::options::FactoryOptions::builder) or deserialized from JSON.
//!
//! ```rust
//! use dataprod::options::{FactoryOptions, ViewerLimit};
//!
//! let opts = FactoryOptions::builder()
//!     .prefer_cutout(false)
//!     .limit_viewer_display(ViewerLimit::ImageOnly)
//!     .max_plots(4)
//!     .build()
//!     .unwrap();
//! assert_eq!(opts.max_plots, Some(4));
//! ```

use std::fmt;

use serde::Deserialize;

use crate::{
    constants::{CUTOUT_WARN_SIZE, MAX_DISPLAY_SIZE},
    dataprod_errors::DataProdError,
};

/// How a converter lays out its products in the image viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    #[default]
    Single,
    Grid,
    Related,
}

/// Restricts which kinds of datalink products a panel may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ViewerLimit {
    #[default]
    All,
    ImageOnly,
    TableOnly,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FactoryOptions {
    /// Keep the cutout side of a cutout/full-image pair.
    pub prefer_cutout: bool,
    /// Products larger than this (bytes) are only offered as downloads.
    pub max_display_size: u64,
    /// Size (bytes) of the discarded side of a cutout pair above which a warning is attached.
    pub cutout_warn_size: u64,
    /// Allow the related-image grid built from datalink `#this` grid rows.
    pub allow_image_related_grid: bool,
    pub limit_viewer_display: ViewerLimit,
    /// Base id of tables loaded from datalink rows; `direct-result-tbl` when unset.
    pub table_id_base: Option<String>,
    /// Base id of charts loaded from datalink rows; `direct-result-chart` when unset.
    pub chart_id_base: Option<String>,
    /// Data type hint applied when a row carries none.
    pub data_type_hint: Option<String>,

    pub can_grid: Option<bool>,
    pub has_related_bands: Option<bool>,
    pub max_plots: Option<usize>,
    pub initial_layout: Option<Layout>,
    pub three_color: Option<bool>,

    /// Share one inspect call between concurrent identical requests.
    pub single_flight: bool,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        FactoryOptions {
            prefer_cutout: true,
            max_display_size: MAX_DISPLAY_SIZE,
            cutout_warn_size: CUTOUT_WARN_SIZE,
            allow_image_related_grid: false,
            limit_viewer_display: ViewerLimit::All,
            table_id_base: None,
            chart_id_base: None,
            data_type_hint: None,
            can_grid: None,
            has_related_bands: None,
            max_plots: None,
            initial_layout: None,
            three_color: None,
            single_flight: true,
        }
    }
}

impl FactoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a [`FactoryOptionsBuilder`] from the default values.
    pub fn builder() -> FactoryOptionsBuilder {
        FactoryOptionsBuilder::new()
    }

    /// Parse and validate options from a JSON object.
    ///
    /// Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self, DataProdError> {
        let opts: FactoryOptions = serde_json::from_str(json)?;
        FactoryOptionsBuilder { options: opts }.build()
    }

    pub fn table_id_base(&self) -> &str {
        self.table_id_base.as_deref().unwrap_or("direct-result-tbl")
    }

    pub fn chart_id_base(&self) -> &str {
        self.chart_id_base.as_deref().unwrap_or("direct-result-chart")
    }
}

/// Builder for [`FactoryOptions`], with validation.
#[derive(Debug, Clone, Default)]
pub struct FactoryOptionsBuilder {
    options: FactoryOptions,
}

impl FactoryOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefer_cutout(mut self, v: bool) -> Self {
        self.options.prefer_cutout = v;
        self
    }

    pub fn max_display_size(mut self, v: u64) -> Self {
        self.options.max_display_size = v;
        self
    }

    pub fn cutout_warn_size(mut self, v: u64) -> Self {
        self.options.cutout_warn_size = v;
        self
    }

    pub fn allow_image_related_grid(mut self, v: bool) -> Self {
        self.options.allow_image_related_grid = v;
        self
    }

    pub fn limit_viewer_display(mut self, v: ViewerLimit) -> Self {
        self.options.limit_viewer_display = v;
        self
    }

    pub fn table_id_base(mut self, v: impl Into<String>) -> Self {
        self.options.table_id_base = Some(v.into());
        self
    }

    pub fn chart_id_base(mut self, v: impl Into<String>) -> Self {
        self.options.chart_id_base = Some(v.into());
        self
    }

    pub fn data_type_hint(mut self, v: impl Into<String>) -> Self {
        self.options.data_type_hint = Some(v.into());
        self
    }

    // --- Capability overrides ---
    pub fn can_grid(mut self, v: bool) -> Self {
        self.options.can_grid = Some(v);
        self
    }

    pub fn has_related_bands(mut self, v: bool) -> Self {
        self.options.has_related_bands = Some(v);
        self
    }

    pub fn max_plots(mut self, v: usize) -> Self {
        self.options.max_plots = Some(v);
        self
    }

    pub fn initial_layout(mut self, v: Layout) -> Self {
        self.options.initial_layout = Some(v);
        self
    }

    pub fn three_color(mut self, v: bool) -> Self {
        self.options.three_color = Some(v);
        self
    }

    pub fn single_flight(mut self, v: bool) -> Self {
        self.options.single_flight = v;
        self
    }

    /// Validate and return the options.
    ///
    /// Return
    /// ----------
    /// * The options, or [`DataProdError::InvalidOption`] when a size threshold is zero, the
    ///   cutout warning threshold exceeds the display threshold, or `max_plots` is zero.
    pub fn build(self) -> Result<FactoryOptions, DataProdError> {
        let o = &self.options;
        if o.max_display_size == 0 {
            return Err(DataProdError::InvalidOption(
                "max_display_size must be > 0".into(),
            ));
        }
        if o.cutout_warn_size == 0 || o.cutout_warn_size > o.max_display_size {
            return Err(DataProdError::InvalidOption(
                "require 0 < cutout_warn_size <= max_display_size".into(),
            ));
        }
        if o.max_plots == Some(0) {
            return Err(DataProdError::InvalidOption(
                "max_plots must be >= 1".into(),
            ));
        }
        if matches!(o.table_id_base.as_deref(), Some("")) || matches!(o.chart_id_base.as_deref(), Some("")) {
            return Err(DataProdError::InvalidOption(
                "table_id_base and chart_id_base must not be empty".into(),
            ));
        }
        Ok(self.options)
    }
}

impl fmt::Display for FactoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Factory options")?;
            writeln!(f, "---------------")?;
            writeln!(f, "  prefer_cutout            = {}", self.prefer_cutout)?;
            writeln!(f, "  max_display_size         = {} B", self.max_display_size)?;
            writeln!(f, "  cutout_warn_size         = {} B", self.cutout_warn_size)?;
            writeln!(f, "  allow_image_related_grid = {}", self.allow_image_related_grid)?;
            writeln!(f, "  limit_viewer_display     = {:?}", self.limit_viewer_display)?;
            writeln!(f, "  table_id_base            = {}", self.table_id_base())?;
            writeln!(f, "  chart_id_base            = {}", self.chart_id_base())?;
            writeln!(f, "  single_flight            = {}", self.single_flight)
        } else {
            write!(
                f,
                "FactoryOptions(prefer_cutout={}, max_display_size={}, limit={:?})",
                self.prefer_cutout, self.max_display_size, self.limit_viewer_display
            )
        }
    }
}

#[cfg(test)]
mod options_test {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = FactoryOptions::default();
        assert!(o.prefer_cutout);
        assert_eq!(o.max_display_size, MAX_DISPLAY_SIZE);
        assert_eq!(o.table_id_base(), "direct-result-tbl");
        assert!(o.single_flight);
    }

    #[test]
    fn test_builder_validation() {
        assert_eq!(
            FactoryOptions::builder().max_plots(0).build(),
            Err(DataProdError::InvalidOption("max_plots must be >= 1".into()))
        );
        assert!(FactoryOptions::builder()
            .max_display_size(10)
            .cutout_warn_size(20)
            .build()
            .is_err());
        assert!(FactoryOptions::builder().table_id_base("").build().is_err());
    }

    #[test]
    fn test_from_json() {
        let o = FactoryOptions::from_json(
            r#"{"preferCutout": false, "limitViewerDisplay": "TableOnly", "maxPlots": 6, "initialLayout": "grid"}"#,
        )
        .unwrap();
        assert!(!o.prefer_cutout);
        assert_eq!(o.limit_viewer_display, ViewerLimit::TableOnly);
        assert_eq!(o.max_plots, Some(6));
        assert_eq!(o.initial_layout, Some(Layout::Grid));
        assert_eq!(o.cutout_warn_size, CUTOUT_WARN_SIZE);

        assert!(FactoryOptions::from_json(r#"{"maxPlots": 0}"#).is_err());
    }

    #[test]
    fn test_display() {
        let s = format!("{:#}", FactoryOptions::default());
        assert!(s.contains("prefer_cutout            = true"));
    }
}
