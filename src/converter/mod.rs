//! # Converter registry
//!
//! A converter knows how to turn the rows of one kind of table into data products. The registry
//! holds an ordered list of [`ConverterTemplate`]s; the first template whose match predicate
//! accepts a table is used to build a live [`Converter`].
//!
//! ## Built-in templates
//!
//! | id                  | matches                                            | grid | max plots |
//! |---------------------|----------------------------------------------------|------|-----------|
//! | `ObsCore`           | `access_url`, `access_format`, `dataproduct_type`  | yes  | 8         |
//! | `ServiceDescriptor` | tables declaring service descriptors               | no   | 1         |
//! | `UNKNOWN`           | any table with a guessable data source column      | yes  | 12        |
//!
//! `UNKNOWN` is the fallback and is declared last.
//!
//! ## Capabilities
//!
//! Capability flags of a converter are merged as *explicit option → template value → hard
//! default*, where the options are the [`FactoryOptions`] registered under a factory key.
//!
//! ## See also
//! ------------
//! * [`ProductStrategy`] – The single/grid/related entry points of a template.
//! * [`datalink_products`] – Shared datalink entry points used by the built-in strategies.

pub mod datalink_products;
pub mod fallback;
pub mod obscore;
pub mod service_desc;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    analysis::orchestrator::Orchestrator,
    candidate::DisplayCandidate,
    constants::FastMap,
    options::{FactoryOptions, Layout},
    store::DataProductsEvent,
    table::TableModel,
    watcher::token::CancellationToken,
};

const DEFAULT_MAX_PLOTS: usize = 12;

/// A row of an image grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotRow {
    pub row: usize,
    pub highlight: bool,
}

/// Rows shown in a grid: the page of `max_plots` rows holding the highlighted row.
pub fn grid_plot_rows(table: &TableModel, max_plots: usize) -> Vec<PlotRow> {
    let max_plots = max_plots.max(1);
    let start = (table.highlighted_row / max_plots) * max_plots;
    let end = (start + max_plots).min(table.row_count());
    (start..end)
        .map(|row| PlotRow {
            row,
            highlight: row == table.highlighted_row,
        })
        .collect()
}

/// Container and cancellation scope a converter entry point runs in.
#[derive(Debug, Clone, Copy)]
pub struct ProductContext<'a> {
    pub dp_id: &'a str,
    pub orchestrator: &'a Orchestrator,
    pub token: &'a CancellationToken,
}

impl ProductContext<'_> {
    /// Publish interstitial feedback, unless the resolution was superseded.
    pub fn publish_working(&self, message: &str) {
        if self.token.is_aborted() {
            return;
        }
        self.orchestrator
            .store()
            .dispatch(DataProductsEvent::UpdateProducts {
                dp_id: self.dp_id.to_string(),
                candidate: DisplayCandidate::working_message(message, None),
            });
    }

    /// Record the entry activated in a menu, unless the resolution was superseded.
    pub fn record_active_key(&self, change: Option<(String, String)>) {
        if self.token.is_aborted() {
            return;
        }
        if let Some(change) = change {
            self.orchestrator
                .store()
                .dispatch(DataProductsEvent::UpdateActiveKey {
                    dp_id: self.dp_id.to_string(),
                    menu_key_changes: vec![change],
                    file_menu_key_changes: Vec::new(),
                });
        }
    }
}

/// Entry points of a converter.
///
/// Entry points never fail: unsupported operations and errors resolve to a message candidate.
#[async_trait]
pub trait ProductStrategy: Send + Sync {
    /// Product of one row.
    async fn single(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        row: usize,
        options: &FactoryOptions,
    ) -> DisplayCandidate;

    /// Image grid of several rows.
    async fn grid(
        &self,
        _ctx: ProductContext<'_>,
        _table: &Arc<TableModel>,
        _plot_rows: &[PlotRow],
        _options: &FactoryOptions,
    ) -> DisplayCandidate {
        DisplayCandidate::message("Grid display is not supported for this table")
    }

    /// Grid of the products related to one row, e.g. the bands of an observation.
    async fn related(
        &self,
        _ctx: ProductContext<'_>,
        _table: &Arc<TableModel>,
        _row: usize,
        _three_color: Option<[Option<usize>; 3]>,
        _options: &FactoryOptions,
    ) -> DisplayCandidate {
        DisplayCandidate::message("Related data products are not supported for this table")
    }
}

pub type TableMatcher = fn(&TableModel) -> bool;

/// Hook deriving a converter from the matched template, e.g. to adjust capabilities per table.
pub type CreateFn = fn(&TableModel, &ConverterTemplate, FactoryOptions) -> Converter;

/// Declaration of a converter: match predicate, capabilities and entry points.
#[derive(Clone)]
pub struct ConverterTemplate {
    pub converter_id: String,
    pub table_matches: TableMatcher,
    pub create: Option<CreateFn>,
    pub can_grid: Option<bool>,
    pub has_related_bands: Option<bool>,
    pub max_plots: Option<usize>,
    pub initial_layout: Option<Layout>,
    pub three_color: Option<bool>,
    pub strategy: Arc<dyn ProductStrategy>,
}

impl fmt::Debug for ConverterTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterTemplate")
            .field("converter_id", &self.converter_id)
            .field("can_grid", &self.can_grid)
            .field("max_plots", &self.max_plots)
            .finish_non_exhaustive()
    }
}

impl ConverterTemplate {
    pub fn new(converter_id: impl Into<String>, table_matches: TableMatcher, strategy: Arc<dyn ProductStrategy>) -> Self {
        ConverterTemplate {
            converter_id: converter_id.into(),
            table_matches,
            create: None,
            can_grid: None,
            has_related_bands: None,
            max_plots: None,
            initial_layout: None,
            three_color: None,
            strategy,
        }
    }

    pub fn with_create(mut self, create: CreateFn) -> Self {
        self.create = Some(create);
        self
    }

    pub fn with_can_grid(mut self, v: bool) -> Self {
        self.can_grid = Some(v);
        self
    }

    pub fn with_has_related_bands(mut self, v: bool) -> Self {
        self.has_related_bands = Some(v);
        self
    }

    pub fn with_max_plots(mut self, v: usize) -> Self {
        self.max_plots = Some(v);
        self
    }

    pub fn with_initial_layout(mut self, v: Layout) -> Self {
        self.initial_layout = Some(v);
        self
    }

    pub fn with_three_color(mut self, v: bool) -> Self {
        self.three_color = Some(v);
        self
    }

    /// Merge capability flags: explicit option, then template value, then hard default.
    pub fn merge_options(&self, options: &FactoryOptions) -> FactoryOptions {
        let mut merged = options.clone();
        merged.can_grid = Some(options.can_grid.or(self.can_grid).unwrap_or(false));
        merged.has_related_bands = Some(
            options
                .has_related_bands
                .or(self.has_related_bands)
                .unwrap_or(false),
        );
        merged.max_plots = Some(
            options
                .max_plots
                .or(self.max_plots)
                .unwrap_or(DEFAULT_MAX_PLOTS),
        );
        merged.initial_layout = Some(
            options
                .initial_layout
                .or(self.initial_layout)
                .unwrap_or_default(),
        );
        merged.three_color = Some(options.three_color.or(self.three_color).unwrap_or(false));
        merged
    }

    /// Build the live converter for `table`.
    pub fn make_converter(&self, table: &TableModel, options: &FactoryOptions) -> Converter {
        let merged = self.merge_options(options);
        match self.create {
            Some(create) => create(table, self, merged),
            None => simple_create(table, self, merged),
        }
    }
}

/// Converter using the template capabilities as merged.
pub fn simple_create(_table: &TableModel, template: &ConverterTemplate, options: FactoryOptions) -> Converter {
    Converter {
        converter_id: template.converter_id.clone(),
        can_grid: options.can_grid.unwrap_or(false),
        has_related_bands: options.has_related_bands.unwrap_or(false),
        three_color: options.three_color.unwrap_or(false),
        max_plots: options.max_plots.unwrap_or(DEFAULT_MAX_PLOTS),
        initial_layout: options.initial_layout.unwrap_or_default(),
        options,
        strategy: template.strategy.clone(),
    }
}

/// A converter bound to one table.
#[derive(Clone)]
pub struct Converter {
    pub converter_id: String,
    pub can_grid: bool,
    pub has_related_bands: bool,
    pub three_color: bool,
    pub max_plots: usize,
    pub initial_layout: Layout,
    pub options: FactoryOptions,
    strategy: Arc<dyn ProductStrategy>,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("converter_id", &self.converter_id)
            .field("can_grid", &self.can_grid)
            .field("has_related_bands", &self.has_related_bands)
            .field("max_plots", &self.max_plots)
            .field("initial_layout", &self.initial_layout)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub async fn single(&self, ctx: ProductContext<'_>, table: &Arc<TableModel>, row: usize) -> DisplayCandidate {
        self.strategy.single(ctx, table, row, &self.options).await
    }

    pub async fn grid(&self, ctx: ProductContext<'_>, table: &Arc<TableModel>, plot_rows: &[PlotRow]) -> DisplayCandidate {
        if !self.can_grid {
            return DisplayCandidate::message("Grid display is not supported for this table");
        }
        self.strategy.grid(ctx, table, plot_rows, &self.options).await
    }

    pub async fn related(
        &self,
        ctx: ProductContext<'_>,
        table: &Arc<TableModel>,
        row: usize,
        three_color: Option<[Option<usize>; 3]>,
    ) -> DisplayCandidate {
        let three_color = three_color.filter(|_| self.three_color);
        self.strategy.related(ctx, table, row, three_color, &self.options).await
    }

    /// Run the entry point matching `layout` for the highlighted row of `table`.
    ///
    /// Layouts the converter cannot do fall back to the single product.
    pub async fn resolve(&self, ctx: ProductContext<'_>, table: &Arc<TableModel>, layout: Layout) -> DisplayCandidate {
        let row = table.highlighted_row;
        match layout {
            Layout::Grid if self.can_grid => {
                let rows = grid_plot_rows(table, self.max_plots);
                self.grid(ctx, table, &rows).await
            }
            Layout::Related if self.has_related_bands => self.related(ctx, table, row, None).await,
            _ => self.single(ctx, table, row).await,
        }
    }
}

pub type OverrideFactory = Arc<dyn Fn(&TableModel, &FactoryOptions) -> Option<Converter> + Send + Sync>;

/// Ordered converter templates and the options registered per factory key.
#[derive(Clone)]
pub struct ConverterRegistry {
    templates: Vec<ConverterTemplate>,
    factory_options: FastMap<String, FactoryOptions>,
    override_factory: Option<OverrideFactory>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("templates", &self.templates)
            .field("factory_keys", &self.factory_options.keys().collect::<Vec<_>>())
            .field("override", &self.override_factory.is_some())
            .finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistry {
    /// Registry with the built-in templates: `ObsCore`, `ServiceDescriptor`, then `UNKNOWN`.
    pub fn new() -> Self {
        ConverterRegistry {
            templates: vec![
                obscore::template(),
                service_desc::template(),
                fallback::template(),
            ],
            factory_options: FastMap::default(),
            override_factory: None,
        }
    }

    pub fn empty() -> Self {
        ConverterRegistry {
            templates: Vec::new(),
            factory_options: FastMap::default(),
            override_factory: None,
        }
    }

    pub fn templates(&self) -> &[ConverterTemplate] {
        &self.templates
    }

    /// Insert a template ahead of every other one.
    pub fn add_template(&mut self, template: ConverterTemplate) {
        self.templates.insert(0, template);
    }

    /// Append a template, after the fallback.
    pub fn add_template_to_end(&mut self, template: ConverterTemplate) {
        self.templates.push(template);
    }

    /// Factory consulted before the template lookup.
    pub fn set_override_factory(&mut self, factory: OverrideFactory) {
        self.override_factory = Some(factory);
    }

    pub fn set_factory_options(&mut self, factory_key: impl Into<String>, options: FactoryOptions) {
        self.factory_options.insert(factory_key.into(), options);
    }

    pub fn factory_options(&self, factory_key: Option<&str>) -> FactoryOptions {
        factory_key
            .and_then(|k| self.factory_options.get(k))
            .cloned()
            .unwrap_or_default()
    }

    /// Converter for `table`.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: The table whose rows need products.
    /// * `factory_key`: Key of the options registered with [`ConverterRegistry::set_factory_options`].
    ///
    /// Return
    /// ----------
    /// * The converter of the override factory, else of the first matching template, or `None`
    ///   when no template accepts the table.
    pub fn select_converter(&self, table: &TableModel, factory_key: Option<&str>) -> Option<Converter> {
        let options = self.factory_options(factory_key);
        if let Some(c) = self.override_factory.as_ref().and_then(|f| f(table, &options)) {
            debug!(converter_id = %c.converter_id, tbl_id = %table.tbl_id, "override converter");
            return Some(c);
        }
        let template = self.templates.iter().find(|t| (t.table_matches)(table))?;
        debug!(converter_id = %template.converter_id, tbl_id = %table.tbl_id, "converter selected");
        Some(template.make_converter(table, &options))
    }
}

#[cfg(test)]
mod converter_test {
    use super::*;
    use crate::table::ServiceDescriptor;

    struct Silent;

    #[async_trait]
    impl ProductStrategy for Silent {
        async fn single(
            &self,
            _ctx: ProductContext<'_>,
            _table: &Arc<TableModel>,
            _row: usize,
            _options: &FactoryOptions,
        ) -> DisplayCandidate {
            DisplayCandidate::message("silent")
        }
    }

    fn obscore_table() -> TableModel {
        TableModel::new(
            "obs",
            &["access_url", "access_format", "dataproduct_type"],
            vec![vec!["https://x.org/a.fits".into(), "image/fits".into(), "image".into()]],
        )
    }

    #[test]
    fn test_builtin_selection() {
        let reg = ConverterRegistry::new();
        assert_eq!(reg.select_converter(&obscore_table(), None).unwrap().converter_id, "ObsCore");

        let sd = TableModel::new("sd", &["a"], vec![vec!["1".into()]]).with_service_descriptor(ServiceDescriptor {
            title: "Cutouts".into(),
            access_url: "https://x.org/cutout".into(),
            ..Default::default()
        });
        assert_eq!(reg.select_converter(&sd, None).unwrap().converter_id, "ServiceDescriptor");

        let fits = TableModel::new("f", &["FITS"], vec![vec!["https://x.org/a.fits".into()]]);
        assert_eq!(reg.select_converter(&fits, None).unwrap().converter_id, "UNKNOWN");

        let none = TableModel::new("n", &["ra", "dec"], vec![vec!["1".into(), "2".into()]]);
        assert!(reg.select_converter(&none, None).is_none());
    }

    #[test]
    fn test_capability_merge() {
        let mut reg = ConverterRegistry::new();
        let c = reg.select_converter(&obscore_table(), None).unwrap();
        assert_eq!(c.max_plots, 8);
        assert!(c.can_grid);
        assert!(!c.three_color);

        reg.set_factory_options("panel", FactoryOptions::builder().max_plots(3).build().unwrap());
        let c = reg.select_converter(&obscore_table(), Some("panel")).unwrap();
        assert_eq!(c.max_plots, 3);
        assert_eq!(c.options.max_plots, Some(3));

        let bare = ConverterTemplate::new("bare", |_| true, Arc::new(Silent));
        let merged = bare.merge_options(&FactoryOptions::default());
        assert_eq!(merged.max_plots, Some(DEFAULT_MAX_PLOTS));
        assert_eq!(merged.can_grid, Some(false));
        assert_eq!(merged.initial_layout, Some(Layout::Single));
    }

    #[test]
    fn test_template_order_and_override() {
        let mut reg = ConverterRegistry::new();
        reg.add_template(ConverterTemplate::new("first", |t| t.tbl_id == "obs", Arc::new(Silent)));
        assert_eq!(reg.select_converter(&obscore_table(), None).unwrap().converter_id, "first");

        reg.add_template_to_end(ConverterTemplate::new("last", |_| true, Arc::new(Silent)));
        let plain = TableModel::new("n", &["ra"], vec![vec!["1".into()]]);
        assert_eq!(reg.select_converter(&plain, None).unwrap().converter_id, "last");

        let forced = ConverterTemplate::new("forced", |_| true, Arc::new(Silent));
        reg.set_override_factory(Arc::new(move |t: &TableModel, o: &FactoryOptions| {
            (t.tbl_id == "n").then(|| forced.make_converter(t, o))
        }));
        assert_eq!(reg.select_converter(&plain, None).unwrap().converter_id, "forced");
        assert_eq!(reg.select_converter(&obscore_table(), None).unwrap().converter_id, "first");
    }

    #[test]
    fn test_grid_plot_rows() {
        let rows: Vec<Vec<String>> = (0..10).map(|i| vec![i.to_string()]).collect();
        let t = TableModel::new("t", &["a"], rows).with_highlighted_row(7);
        let plot_rows = grid_plot_rows(&t, 4);
        assert_eq!(plot_rows.iter().map(|p| p.row).collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        assert!(plot_rows[3].highlight);
        let tail = grid_plot_rows(&t.with_highlighted_row(9), 4);
        assert_eq!(tail.len(), 2);
    }
}
