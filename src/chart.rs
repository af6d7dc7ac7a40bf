//! Chart data derived from dataset rows, and the per-kind render options
//! saved alongside it.

use crate::cell::{CellValue, Record};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref CSS_COLOR: Regex = Regex::new(
        r"^(#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})|rgba?\(\s*\d{1,3}\s*,\s*\d{1,3}\s*,\s*\d{1,3}\s*(,\s*(0|1|0?\.\d+|1\.0+)\s*)?\)|[a-zA-Z]+)$"
    )
    .expect("valid color pattern");
}

/// Chart types a user can save
///
/// Only `Pie` changes the shape of the computed data; every other kind
/// renders the raw point list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Compares values across categories with rectangular bars
    Bar,

    /// Connects points in row order
    Line,

    /// Category totals as slices of a circle
    Pie,

    /// Unconnected points
    Scatter,

    /// Line chart with the area below the line filled in
    Area,

    /// Bar chart drawn with depth
    #[serde(rename = "3d-column")]
    Column3d,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::Bar,
        ChartKind::Line,
        ChartKind::Pie,
        ChartKind::Scatter,
        ChartKind::Area,
        ChartKind::Column3d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
            ChartKind::Area => "area",
            ChartKind::Column3d => "3d-column",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        ChartKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| Error::validation(format!("unknown chart type: {}", s)))
    }
}

/// One plotted point; `label` mirrors `x`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: CellValue,
    pub y: f64,
    pub label: CellValue,
}

/// One pie bucket; `x`/`y` mirror `label`/`value`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub x: String,
    pub y: f64,
}

/// Renderer-ready chart data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "lowercase")]
pub enum ChartSeries {
    Points(Vec<ChartPoint>),
    Slices(Vec<PieSlice>),
}

impl ChartSeries {
    /// The "no data yet" series for a kind
    pub fn empty_for(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Pie => ChartSeries::Slices(Vec::new()),
            _ => ChartSeries::Points(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChartSeries::Points(points) => points.len(),
            ChartSeries::Slices(slices) => slices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turn an (x, y) column selection into chart data.
///
/// Missing rows or a missing/empty column selection give an empty series.
/// `y` is read leniently (non-numeric is 0) and rows with a null `x` are
/// dropped. Pie charts sum `y` per distinct `x`, in first-seen order.
///
/// # Examples
/// ```
/// use chartbook::cell::{CellValue, Record};
/// use chartbook::chart::{compute_chart, ChartKind};
///
/// let mut row = Record::new();
/// row.insert("region".to_string(), CellValue::text("north"));
/// row.insert("sales".to_string(), CellValue::Number(4.0));
///
/// let rows = vec![row];
/// let series = compute_chart(
///     Some(rows.as_slice()),
///     Some("region"),
///     Some("sales"),
///     ChartKind::Bar,
/// );
/// assert_eq!(series.len(), 1);
/// ```
pub fn compute_chart(
    rows: Option<&[Record]>,
    x_column: Option<&str>,
    y_column: Option<&str>,
    kind: ChartKind,
) -> ChartSeries {
    let (Some(rows), Some(x_column), Some(y_column)) = (
        rows,
        x_column.filter(|c| !c.is_empty()),
        y_column.filter(|c| !c.is_empty()),
    ) else {
        return ChartSeries::empty_for(kind);
    };

    let points: Vec<ChartPoint> = rows
        .iter()
        .filter_map(|row| {
            let x = row.get(x_column).filter(|v| !v.is_null())?;
            let y = row
                .get(y_column)
                .map_or(0.0, CellValue::leading_number_or_zero);
            Some(ChartPoint {
                x: x.clone(),
                y,
                label: x.clone(),
            })
        })
        .collect();

    match kind {
        ChartKind::Pie => ChartSeries::Slices(group_slices(points)),
        _ => ChartSeries::Points(points),
    }
}

fn group_slices(points: Vec<ChartPoint>) -> Vec<PieSlice> {
    let mut totals: IndexMap<String, f64> = IndexMap::new();
    for point in points {
        *totals.entry(point.x.to_string()).or_insert(0.0) += point.y;
    }

    totals
        .into_iter()
        .map(|(label, total)| {
            // Finite values can still overflow when summed.
            let value = if total.is_finite() { total } else { 0.0 };
            PieSlice {
                x: label.clone(),
                label,
                value,
                y: value,
            }
        })
        .collect()
}

/// Where the legend sits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegendPosition {
    #[default]
    Top,
    Bottom,
    Left,
    Right,
    Hidden,
}

/// Options for bar, line and area charts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CartesianOptions {
    pub legend: LegendPosition,
    pub background_color: String,
    pub border_color: String,
    pub border_width: u32,
    pub show_grid: bool,
}

impl Default for CartesianOptions {
    fn default() -> Self {
        Self {
            legend: LegendPosition::Top,
            background_color: "rgba(75, 192, 192, 0.6)".to_string(),
            border_color: "rgba(75, 192, 192, 1)".to_string(),
            border_width: 1,
            show_grid: true,
        }
    }
}

impl CartesianOptions {
    fn validate(&self) -> Result<()> {
        check_color("backgroundColor", &self.background_color)?;
        check_color("borderColor", &self.border_color)?;
        if self.border_width > 20 {
            return Err(Error::validation("borderWidth must be at most 20"));
        }
        Ok(())
    }
}

/// Options for scatter charts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScatterOptions {
    pub legend: LegendPosition,
    pub point_color: String,
    pub point_radius: u32,
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            legend: LegendPosition::Top,
            point_color: "rgba(255, 99, 132, 0.6)".to_string(),
            point_radius: 3,
        }
    }
}

/// Options for pie charts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PieOptions {
    pub legend: LegendPosition,
    /// Slice colors, reused cyclically
    pub palette: Vec<String>,
    pub show_percentages: bool,
}

impl Default for PieOptions {
    fn default() -> Self {
        Self {
            legend: LegendPosition::Right,
            palette: [
                "#4bc0c0", "#ff6384", "#36a2eb", "#ffce56", "#9966ff", "#ff9f40",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            show_percentages: false,
        }
    }
}

/// Options for 3d column charts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnOptions {
    #[serde(flatten)]
    pub base: CartesianOptions,
    /// Column depth in pixels
    pub depth: u32,
    /// Viewing angle in degrees
    pub angle: u32,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        Self {
            base: CartesianOptions::default(),
            depth: 20,
            angle: 15,
        }
    }
}

/// Render configuration saved with an analysis, keyed by chart kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chartType", content = "options", rename_all = "lowercase")]
pub enum RenderConfig {
    Bar(CartesianOptions),
    Line(CartesianOptions),
    Area(CartesianOptions),
    Scatter(ScatterOptions),
    Pie(PieOptions),
    #[serde(rename = "3d-column")]
    Column3d(ColumnOptions),
}

impl RenderConfig {
    pub fn default_for(kind: ChartKind) -> Self {
        match kind {
            ChartKind::Bar => RenderConfig::Bar(CartesianOptions::default()),
            ChartKind::Line => RenderConfig::Line(CartesianOptions::default()),
            ChartKind::Area => RenderConfig::Area(CartesianOptions::default()),
            ChartKind::Scatter => RenderConfig::Scatter(ScatterOptions::default()),
            ChartKind::Pie => RenderConfig::Pie(PieOptions::default()),
            ChartKind::Column3d => RenderConfig::Column3d(ColumnOptions::default()),
        }
    }

    pub fn kind(&self) -> ChartKind {
        match self {
            RenderConfig::Bar(_) => ChartKind::Bar,
            RenderConfig::Line(_) => ChartKind::Line,
            RenderConfig::Area(_) => ChartKind::Area,
            RenderConfig::Scatter(_) => ChartKind::Scatter,
            RenderConfig::Pie(_) => ChartKind::Pie,
            RenderConfig::Column3d(_) => ChartKind::Column3d,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            RenderConfig::Bar(opts) | RenderConfig::Line(opts) | RenderConfig::Area(opts) => {
                opts.validate()
            }
            RenderConfig::Scatter(opts) => {
                check_color("pointColor", &opts.point_color)?;
                if !(1..=50).contains(&opts.point_radius) {
                    return Err(Error::validation("pointRadius must be between 1 and 50"));
                }
                Ok(())
            }
            RenderConfig::Pie(opts) => {
                if opts.palette.is_empty() {
                    return Err(Error::validation("palette needs at least one color"));
                }
                opts.palette
                    .iter()
                    .try_for_each(|color| check_color("palette", color))
            }
            RenderConfig::Column3d(opts) => {
                opts.base.validate()?;
                if !(1..=100).contains(&opts.depth) {
                    return Err(Error::validation("depth must be between 1 and 100"));
                }
                if opts.angle > 90 {
                    return Err(Error::validation("angle must be at most 90 degrees"));
                }
                Ok(())
            }
        }
    }
}

fn check_color(field: &str, value: &str) -> Result<()> {
    if CSS_COLOR.is_match(value.trim()) {
        Ok(())
    } else {
        Err(Error::validation(format!("{} is not a color: {:?}", field, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_kinds_use_wire_names() {
        assert_eq!(serde_json::to_string(&ChartKind::Column3d).unwrap(), r#""3d-column""#);
        assert_eq!("3D-Column".parse::<ChartKind>().unwrap(), ChartKind::Column3d);
        assert!("donut".parse::<ChartKind>().is_err());
    }

    #[test]
    fn render_config_is_tagged_by_kind() {
        let config: RenderConfig =
            serde_json::from_str(r#"{"chartType":"scatter","options":{"pointRadius":5}}"#).unwrap();
        assert_eq!(config.kind(), ChartKind::Scatter);
        match config {
            RenderConfig::Scatter(opts) => {
                assert_eq!(opts.point_radius, 5);
                assert_eq!(opts.point_color, ScatterOptions::default().point_color);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn every_default_config_validates() {
        for kind in ChartKind::ALL {
            let config = RenderConfig::default_for(kind);
            assert_eq!(config.kind(), kind);
            config.validate().unwrap();
        }
    }

    #[test]
    fn bad_options_are_rejected() {
        let mut opts = CartesianOptions::default();
        opts.background_color = "url(javascript:1)".to_string();
        assert!(RenderConfig::Bar(opts).validate().unwrap_err().is_validation());

        let pie = RenderConfig::Pie(PieOptions {
            palette: Vec::new(),
            ..PieOptions::default()
        });
        assert!(pie.validate().is_err());

        let column = RenderConfig::Column3d(ColumnOptions {
            angle: 120,
            ..ColumnOptions::default()
        });
        assert!(column.validate().is_err());
    }

    #[test]
    fn overflowing_pie_total_becomes_zero() {
        let rows: Vec<Record> = ["a", "a", "b"]
            .iter()
            .map(|k| {
                let mut row = Record::new();
                row.insert("k".to_string(), CellValue::text(*k));
                row.insert("v".to_string(), CellValue::Number(1e308));
                row
            })
            .collect();

        let series = compute_chart(Some(rows.as_slice()), Some("k"), Some("v"), ChartKind::Pie);
        let ChartSeries::Slices(slices) = series else {
            panic!("pie chart should produce slices");
        };
        assert_eq!(slices[0].value, 0.0);
        assert_eq!(slices[0].y, 0.0);
        assert_eq!(slices[1].value, 1e308);
    }

    #[test]
    fn empty_series_matches_kind_shape() {
        assert_eq!(ChartSeries::empty_for(ChartKind::Pie), ChartSeries::Slices(vec![]));
        assert_eq!(ChartSeries::empty_for(ChartKind::Area), ChartSeries::Points(vec![]));
    }
}
