// src/aggregate/chart.rs

use tracing::trace;

use super::{AggregateRow, AggregateTable, ChartKind, GroupBy, KeyValue, Reduction};
use crate::source::{
    SourceTable, AUTOMOBILE_SALES, MONTH, TOTAL_EXPENDITURE, UNEMPLOYMENT_RATE, VEHICLES_SOLD,
    VEHICLE_TYPE, YEAR,
};

/// Which source rows feed a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    Recession,
    Year(i64),
}

impl RowFilter {
    pub fn keep(&self, table: &SourceTable, row: usize) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Recession => table.is_recession(row),
            RowFilter::Year(year) => table.year(row) == *year,
        }
    }
}

/// Grouping column(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    Year,
    Month,
    VehicleType,
    VehicleTypeAndUnemployment,
}

impl KeyField {
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            KeyField::Year => vec![YEAR],
            KeyField::Month => vec![MONTH],
            KeyField::VehicleType => vec![VEHICLE_TYPE],
            KeyField::VehicleTypeAndUnemployment => vec![VEHICLE_TYPE, UNEMPLOYMENT_RATE],
        }
    }

    pub fn key(&self, table: &SourceTable, row: usize) -> Vec<KeyValue> {
        match self {
            KeyField::Year => vec![KeyValue::Int(table.year(row))],
            KeyField::Month => vec![table.month(row).into()],
            KeyField::VehicleType => vec![table.vehicle_type(row).into()],
            KeyField::VehicleTypeAndUnemployment => vec![
                table.vehicle_type(row).into(),
                KeyValue::float(table.unemployment_rate(row)),
            ],
        }
    }
}

/// Column being reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueField {
    AutomobileSales,
    VehiclesSold,
    TotalExpenditure,
}

impl ValueField {
    pub fn column(&self) -> &'static str {
        match self {
            ValueField::AutomobileSales => AUTOMOBILE_SALES,
            ValueField::VehiclesSold => VEHICLES_SOLD,
            ValueField::TotalExpenditure => TOTAL_EXPENDITURE,
        }
    }

    pub fn value(&self, table: &SourceTable, row: usize) -> f64 {
        match self {
            ValueField::AutomobileSales => table.automobile_sales(row),
            ValueField::VehiclesSold => table.vehicles_sold(row),
            ValueField::TotalExpenditure => table.total_expenditure(row),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Order in which each key first appears in the filtered rows.
    FirstSeen,
    KeyAscending,
}

/// A filter → group → reduce pipeline producing one chart's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub filter: RowFilter,
    pub key: KeyField,
    pub value: ValueField,
    pub reduction: Reduction,
    pub order: RowOrder,
}

impl ChartSpec {
    /// Single pass over `table`. Groups exist only for keys present in the
    /// filtered rows, so no mean is ever taken over an empty group.
    pub fn run(&self, table: &SourceTable, title: impl Into<String>) -> AggregateTable {
        let mut groups = GroupBy::new();
        let mut matched = 0usize;
        for row in 0..table.num_rows() {
            if !self.filter.keep(table, row) {
                continue;
            }
            matched += 1;
            groups.push(self.key.key(table, row), self.value.value(table, row));
        }

        let mut rows: Vec<AggregateRow> = groups
            .finish(self.reduction)
            .into_iter()
            .map(|(key, value)| AggregateRow { key, value })
            .collect();
        if self.order == RowOrder::KeyAscending {
            rows.sort_by(|a, b| a.key.cmp(&b.key));
        }

        let title = title.into();
        trace!(chart = %title, matched, groups = rows.len(), "chart reduced");

        AggregateTable {
            title,
            kind: self.kind,
            key_columns: self.key.columns(),
            value_column: self.value.column(),
            reduction: self.reduction,
            rows,
        }
    }
}
