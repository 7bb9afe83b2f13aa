// src/report/mod.rs

use serde::Serialize;
use std::{fmt, ops::RangeInclusive};
use tracing::{debug, info};

use crate::aggregate::{
    AggregateTable, ChartKind, ChartSpec, KeyField, Reduction, RowFilter, RowOrder, ValueField,
};
use crate::source::SourceTable;

pub const RECESSION_LABEL: &str = "Recession Period Statistics";
pub const YEARLY_LABEL: &str = "Yearly Statistics";
pub const MODE_PLACEHOLDER: &str = "Select Statistics";
pub const YEAR_PLACEHOLDER: &str = "Select-year";

/// Years offered by the year selector.
pub const SELECTABLE_YEARS: RangeInclusive<i64> = 1980..=2023;

/// Top-level report selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReportMode {
    RecessionPeriod,
    Yearly,
    Unselected,
}

impl ReportMode {
    /// Map a selector label onto a mode. Unknown labels, including the
    /// placeholder, mean nothing is selected.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            RECESSION_LABEL => ReportMode::RecessionPeriod,
            YEARLY_LABEL => ReportMode::Yearly,
            _ => ReportMode::Unselected,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportMode::RecessionPeriod => RECESSION_LABEL,
            ReportMode::Yearly => YEARLY_LABEL,
            ReportMode::Unselected => MODE_PLACEHOLDER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Year(pub i64);

impl Year {
    /// Parse a year selector value; the placeholder and non-numeric text give `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        label.trim().parse().ok().map(Year)
    }

    pub fn is_selectable(&self) -> bool {
        SELECTABLE_YEARS.contains(&self.0)
    }

    pub fn selectable() -> Vec<Year> {
        SELECTABLE_YEARS.map(Year).collect()
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four tables handed to the renderer, in slot order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FourChartResult {
    pub mode: ReportMode,
    pub year: Option<Year>,
    pub charts: [AggregateTable; 4],
}

impl FourChartResult {
    pub fn iter(&self) -> impl Iterator<Item = &AggregateTable> {
        self.charts.iter()
    }
}

fn chart(
    kind: ChartKind,
    filter: RowFilter,
    key: KeyField,
    value: ValueField,
    reduction: Reduction,
    order: RowOrder,
) -> ChartSpec {
    ChartSpec {
        kind,
        filter,
        key,
        value,
        reduction,
        order,
    }
}

/// Full-history yearly trend; shared by both pipelines apart from the filter.
fn sales_by_year(filter: RowFilter) -> ChartSpec {
    chart(
        ChartKind::Line,
        filter,
        KeyField::Year,
        ValueField::AutomobileSales,
        Reduction::Mean,
        RowOrder::KeyAscending,
    )
}

/// Chart specs for the recession view, with their titles.
pub fn recession_charts() -> [(ChartSpec, String); 4] {
    let f = RowFilter::Recession;
    [
        (
            sales_by_year(f),
            "Automobile Sales over Recession Period".to_string(),
        ),
        (
            chart(
                ChartKind::Bar,
                f,
                KeyField::VehicleType,
                ValueField::VehiclesSold,
                Reduction::Mean,
                RowOrder::KeyAscending,
            ),
            "Average Vehicles Sold by Vehicle Type during Recession".to_string(),
        ),
        (
            chart(
                ChartKind::Pie,
                f,
                KeyField::VehicleType,
                ValueField::TotalExpenditure,
                Reduction::Sum,
                RowOrder::KeyAscending,
            ),
            "Total Expenditure Share by Vehicle Type during Recession".to_string(),
        ),
        (
            chart(
                ChartKind::Bar,
                f,
                KeyField::VehicleTypeAndUnemployment,
                ValueField::VehiclesSold,
                Reduction::Mean,
                RowOrder::KeyAscending,
            ),
            "Effect of Unemployment Rate on Vehicle Type and Sales during Recession".to_string(),
        ),
    ]
}

/// Chart specs for the single-year view. Only charts B to D look at `year`.
pub fn yearly_charts(year: Year) -> [(ChartSpec, String); 4] {
    let f = RowFilter::Year(year.0);
    [
        (
            sales_by_year(RowFilter::All),
            "Yearly Automobile Sales".to_string(),
        ),
        (
            chart(
                ChartKind::Line,
                f,
                KeyField::Month,
                ValueField::AutomobileSales,
                Reduction::Sum,
                RowOrder::FirstSeen,
            ),
            "Total Monthly Automobile Sales".to_string(),
        ),
        (
            chart(
                ChartKind::Bar,
                f,
                KeyField::VehicleType,
                ValueField::VehiclesSold,
                Reduction::Mean,
                RowOrder::KeyAscending,
            ),
            format!("Average Vehicles Sold by Vehicle Type in {}", year),
        ),
        (
            chart(
                ChartKind::Pie,
                f,
                KeyField::VehicleType,
                ValueField::TotalExpenditure,
                Reduction::Sum,
                RowOrder::KeyAscending,
            ),
            "Total Advertisement Expenditure for each Vehicle".to_string(),
        ),
    ]
}

fn run_all(table: &SourceTable, specs: [(ChartSpec, String); 4]) -> [AggregateTable; 4] {
    specs.map(|(spec, title)| spec.run(table, title))
}

/// Build the four chart tables for a selection.
///
/// Returns `None` (nothing to display) when no mode is selected, or when the
/// yearly view has no year or a year outside [`SELECTABLE_YEARS`]. The
/// recession view ignores `year`.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.num_rows()))]
pub fn compute(
    table: &SourceTable,
    mode: ReportMode,
    year: Option<Year>,
) -> Option<FourChartResult> {
    let (specs, year) = match (mode, year) {
        (ReportMode::RecessionPeriod, _) => (recession_charts(), None),
        (ReportMode::Yearly, Some(y)) if y.is_selectable() => (yearly_charts(y), Some(y)),
        _ => {
            debug!("no complete selection; nothing to display");
            return None;
        }
    };

    let charts = run_all(table, specs);
    info!(
        mode = mode.label(),
        year = ?year,
        rows = ?charts.iter().map(AggregateTable::len).collect::<Vec<_>>(),
        "report computed"
    );
    Some(FourChartResult { mode, year, charts })
}
