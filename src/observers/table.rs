//! Table observer for pretty-printing counter snapshots.
//!
//! This module provides [`TableObserver`], which renders a
//! [`StatsSnapshot`] as a formatted ASCII table using the `tabled` crate, and
//! a list of [`ProcessorSnapshot`]s as a counter × processor matrix.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! shardstat = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ## Standard format (vertical list)
//!
//! ```rust,ignore
//! use shardstat::observers::table::{TableObserver, TableStyle};
//! use shardstat::{Granularity, Stats, StatsConfig};
//!
//! let stats = Stats::new(StatsConfig::new()).unwrap();
//! let requests = stats.register_or_get("requests").unwrap();
//! let errors = stats.register_or_get("errors").unwrap();
//! stats.add(requests, 1000);
//! stats.add(errors, 5);
//!
//! let observer = TableObserver::new().with_style(TableStyle::Rounded);
//! println!("{}", observer.render(&stats.snapshot(Granularity::Global)));
//! // ╭────┬──────────┬───────╮
//! // │ Id │ Name     │ Value │
//! // ├────┼──────────┼───────┤
//! // │ 0  │ requests │ 1000  │
//! // │ 1  │ errors   │ 5     │
//! // ╰────┴──────────┴───────╯
//! ```
//!
//! ## Compact format (multiple columns)
//!
//! ```rust,ignore
//! let observer = TableObserver::new().compact(true).columns(3);
//! println!("{}", observer.render(&snapshot));
//! // ╭────────────────┬───────────┬──────────────╮
//! // │ requests: 1000 │ errors: 5 │ latency: 120 │
//! // ╰────────────────┴───────────┴──────────────╯
//! ```
//!
//! ## Per-processor matrix
//!
//! ```rust,ignore
//! println!("{}", TableObserver::new().render_processors(&stats.processor_snapshot()));
//! // ╭──────────┬──────┬──────┬───────╮
//! // │ Name     │ cpu0 │ cpu1 │ Total │
//! // ├──────────┼──────┼──────┼───────┤
//! // │ requests │ 600  │ 400  │ 1000  │
//! // ╰──────────┴──────┴──────┴───────╯
//! ```

use crate::snapshot::{ProcessorSnapshot, StatsSnapshot};
use tabled::{builder::Builder, settings::Style, Table, Tabled};

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// Extended ASCII characters
    Extended,
    /// GitHub-flavored Markdown table
    Markdown,
    /// ReStructuredText table
    ReStructuredText,
    /// Dots for borders
    Dots,
    /// No borders, just spacing
    Blank,
}

/// Separator style between name and value in compact mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompactSeparator {
    /// Colon separator: "name: value"
    #[default]
    Colon,
    /// Equals separator: "name = value"
    Equals,
    /// Arrow separator: "name → value"
    Arrow,
    /// Pipe separator: "name | value"
    Pipe,
    /// No separator, just space: "name value"
    Space,
}

impl CompactSeparator {
    /// Returns the separator string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactSeparator::Colon => ": ",
            CompactSeparator::Equals => " = ",
            CompactSeparator::Arrow => " → ",
            CompactSeparator::Pipe => " | ",
            CompactSeparator::Space => " ",
        }
    }
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row (only in non-compact mode).
    pub show_header: bool,
    /// Custom title for the table (optional).
    pub title: Option<String>,
    /// Whether to use compact format (name: value in cells).
    pub compact: bool,
    /// Number of columns in compact mode (default: 1).
    pub columns: usize,
    /// Separator between name and value in compact mode.
    pub separator: CompactSeparator,
    /// Placeholder for empty cells in compact mode.
    pub empty_cell: String,
    /// Whether to leave out counters whose value is zero.
    pub hide_zero: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            compact: false,
            columns: 1,
            separator: CompactSeparator::default(),
            empty_cell: String::new(),
            hide_zero: false,
        }
    }
}

/// Internal row representation for tabled (standard mode).
#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "Id")]
    id: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Value")]
    value: u64,
}

/// An observer that renders counter snapshots as formatted ASCII tables.
///
/// Supports two rendering modes for a [`StatsSnapshot`]:
///
/// 1. **Standard mode**: Id, Name and Value columns, one counter per row
/// 2. **Compact mode**: Multi-column grid with "name: value" cells
///
/// and a matrix mode for per-processor snapshots
/// ([`render_processors`](Self::render_processors)).
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    ///
    /// Default style is [`TableStyle::Rounded`] in standard (non-compact) mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    ///
    /// Only applies in standard (non-compact) mode.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets an optional title for the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Enables or disables compact mode.
    pub fn compact(mut self, enabled: bool) -> Self {
        self.config.compact = enabled;
        self
    }

    /// Sets the number of columns in compact mode.
    ///
    /// Default is 1. Values less than 1 are treated as 1.
    pub fn columns(mut self, count: usize) -> Self {
        self.config.columns = count.max(1);
        self
    }

    /// Sets the separator between name and value in compact mode.
    pub fn separator(mut self, sep: CompactSeparator) -> Self {
        self.config.separator = sep;
        self
    }

    /// Sets the placeholder text for empty cells in compact mode.
    pub fn empty_cell(mut self, placeholder: impl Into<String>) -> Self {
        self.config.empty_cell = placeholder.into();
        self
    }

    /// Leaves counters with a zero value out of the output.
    pub fn hide_zero(mut self, enabled: bool) -> Self {
        self.config.hide_zero = enabled;
        self
    }

    /// Applies the configured style to a table.
    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Extended => {
                table.with(Style::extended());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::ReStructuredText => {
                table.with(Style::re_structured_text());
            }
            TableStyle::Dots => {
                table.with(Style::dots());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn with_title_line(&self, table: &Table) -> String {
        match self.config.title {
            Some(ref title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    fn display_name(name: &str) -> &str {
        if name.is_empty() {
            "(unnamed)"
        } else {
            name
        }
    }

    /// Renders the snapshot in compact mode (grid layout).
    fn render_compact(&self, snapshot: &StatsSnapshot) -> String {
        let cells: Vec<String> = snapshot
            .counters
            .iter()
            .filter(|c| !self.config.hide_zero || c.value != 0)
            .map(|c| {
                format!(
                    "{}{}{}",
                    Self::display_name(&c.name),
                    self.config.separator.as_str(),
                    c.value
                )
            })
            .collect();

        if cells.is_empty() {
            return String::new();
        }

        let cols = self.config.columns;
        let mut builder = Builder::default();

        for chunk in cells.chunks(cols) {
            let mut row: Vec<String> = chunk.to_vec();
            // Pad the last row with empty cells
            while row.len() < cols {
                row.push(self.config.empty_cell.clone());
            }
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        self.with_title_line(&table)
    }

    /// Renders the snapshot in standard mode (three-column table).
    fn render_standard(&self, snapshot: &StatsSnapshot) -> String {
        let rows: Vec<CounterRow> = snapshot
            .counters
            .iter()
            .filter(|c| !self.config.hide_zero || c.value != 0)
            .map(|c| CounterRow {
                id: c.id,
                name: Self::display_name(&c.name).to_string(),
                value: c.value,
            })
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        self.with_title_line(&table)
    }

    /// Renders the snapshot as a formatted table string.
    pub fn render(&self, snapshot: &StatsSnapshot) -> String {
        if self.config.compact {
            self.render_compact(snapshot)
        } else {
            self.render_standard(snapshot)
        }
    }

    /// Renders per-processor snapshots as a matrix with one row per counter,
    /// one column per processor and a final total column.
    ///
    /// Compact mode does not apply to this layout.
    pub fn render_processors(&self, processors: &[ProcessorSnapshot]) -> String {
        let mut builder = Builder::default();

        if self.config.show_header {
            let mut header = vec!["Name".to_string()];
            header.extend(processors.iter().map(|p| format!("cpu{}", p.processor)));
            header.push("Total".to_string());
            builder.push_record(header);
        }

        let counters = processors.first().map(|p| p.counters.len()).unwrap_or(0);
        for index in 0..counters {
            let values: Vec<u64> = processors
                .iter()
                .map(|p| p.counters.get(index).map(|c| c.value).unwrap_or(0))
                .collect();
            let total = values.iter().fold(0u64, |acc, v| acc.wrapping_add(*v));
            if self.config.hide_zero && total == 0 {
                continue;
            }

            let name = Self::display_name(&processors[0].counters[index].name);
            let mut row = vec![name.to_string()];
            row.extend(values.iter().map(u64::to_string));
            row.push(total.to_string());
            builder.push_record(row);
        }

        let mut table = builder.build();
        self.apply_style(&mut table);
        self.with_title_line(&table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CounterSnapshot;
    use crate::stats::Granularity;

    fn snapshot(values: &[(&str, u64)]) -> StatsSnapshot {
        StatsSnapshot::new(
            Granularity::Global,
            values
                .iter()
                .enumerate()
                .map(|(id, (name, value))| CounterSnapshot::new(id, *name, *value))
                .collect(),
        )
    }

    #[test]
    fn test_render_empty() {
        let output = TableObserver::new().render(&snapshot(&[]));
        // Header only
        assert!(output.contains("Name"));
    }

    #[test]
    fn test_render_empty_compact() {
        let output = TableObserver::new()
            .compact(true)
            .columns(3)
            .render(&snapshot(&[]));
        assert!(output.is_empty());
    }

    #[test]
    fn test_render_single_counter() {
        let output = TableObserver::new().render(&snapshot(&[("test_counter", 42)]));
        assert!(output.contains("test_counter"));
        assert!(output.contains("42"));
        assert!(output.contains("Id"));
    }

    #[test]
    fn test_render_compact_single() {
        let output = TableObserver::new()
            .compact(true)
            .render(&snapshot(&[("requests", 100)]));
        assert!(output.contains("requests: 100"));
    }

    #[test]
    fn test_render_compact_multiple_columns() {
        let output = TableObserver::new()
            .compact(true)
            .columns(2)
            .empty_cell("-")
            .render(&snapshot(&[("a", 1), ("b", 2), ("c", 3)]));

        assert!(output.contains("a: 1"));
        assert!(output.contains("b: 2"));
        assert!(output.contains("c: 3"));
        assert!(output.contains("-"));
        // 2 rows of data
        let a_line = output.lines().find(|l| l.contains("a: 1")).unwrap();
        assert!(a_line.contains("b: 2"));
    }

    #[test]
    fn test_render_compact_with_separator() {
        let snap = snapshot(&[("x", 7)]);
        let eq = TableObserver::new()
            .compact(true)
            .separator(CompactSeparator::Equals)
            .render(&snap);
        assert!(eq.contains("x = 7"));

        let arrow = TableObserver::new()
            .compact(true)
            .separator(CompactSeparator::Arrow)
            .render(&snap);
        assert!(arrow.contains("x → 7"));
    }

    #[test]
    fn test_render_with_different_styles() {
        let snap = snapshot(&[("s", 1)]);
        for style in [
            TableStyle::Ascii,
            TableStyle::Rounded,
            TableStyle::Sharp,
            TableStyle::Modern,
            TableStyle::Extended,
            TableStyle::Markdown,
            TableStyle::ReStructuredText,
            TableStyle::Dots,
            TableStyle::Blank,
        ] {
            let output = TableObserver::new().with_style(style).render(&snap);
            assert!(output.contains("s"), "style {:?}", style);
        }
        let ascii = TableObserver::new()
            .with_style(TableStyle::Ascii)
            .render(&snap);
        assert!(ascii.contains('+'));
    }

    #[test]
    fn test_render_with_title() {
        let output = TableObserver::new()
            .with_title("Counters")
            .render(&snapshot(&[("a", 1)]));
        assert!(output.starts_with("Counters\n"));
    }

    #[test]
    fn test_render_without_header() {
        let output = TableObserver::new()
            .with_header(false)
            .render(&snapshot(&[("a", 1)]));
        assert!(!output.contains("Value"));
        assert!(output.contains("a"));
    }

    #[test]
    fn test_render_unnamed_counter() {
        let output = TableObserver::new().render(&snapshot(&[("", 3)]));
        assert!(output.contains("(unnamed)"));
    }

    #[test]
    fn test_hide_zero() {
        let snap = snapshot(&[("busy", 5), ("idle", 0)]);
        let output = TableObserver::new().hide_zero(true).render(&snap);
        assert!(output.contains("busy"));
        assert!(!output.contains("idle"));

        let compact = TableObserver::new()
            .compact(true)
            .hide_zero(true)
            .render(&snap);
        assert!(!compact.contains("idle"));
    }

    #[test]
    fn test_columns_min_value() {
        let observer = TableObserver::new().compact(true).columns(0);
        let output = observer.render(&snapshot(&[("a", 1), ("b", 2)]));
        assert!(output.contains("a: 1"));
        assert!(output.contains("b: 2"));
    }

    #[test]
    fn test_config_builder() {
        let config = TableConfig {
            style: TableStyle::Markdown,
            compact: true,
            columns: 4,
            ..Default::default()
        };
        let observer = TableObserver::with_config(config);
        let output = observer.render(&snapshot(&[("m", 9)]));
        assert!(output.contains("m: 9"));
        assert!(output.contains('|'));
    }

    #[test]
    fn test_render_processors() {
        let processors = vec![
            ProcessorSnapshot {
                processor: 0,
                threads: 1,
                counters: vec![
                    CounterSnapshot::new(0, "req", 100),
                    CounterSnapshot::new(1, "err", 0),
                ],
            },
            ProcessorSnapshot {
                processor: 1,
                threads: 1,
                counters: vec![
                    CounterSnapshot::new(0, "req", 50),
                    CounterSnapshot::new(1, "err", 0),
                ],
            },
        ];

        let output = TableObserver::new().render_processors(&processors);
        assert!(output.contains("cpu0"));
        assert!(output.contains("cpu1"));
        assert!(output.contains("Total"));
        let req_line = output.lines().find(|l| l.contains("req")).unwrap();
        assert!(req_line.contains("100"));
        assert!(req_line.contains("50"));
        assert!(req_line.contains("150"));

        let hidden = TableObserver::new()
            .hide_zero(true)
            .render_processors(&processors);
        assert!(!hidden.contains("err"));
    }
}
