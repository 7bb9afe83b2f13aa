// src/aggregate/mod.rs

use serde::Serialize;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

pub mod chart;
pub mod group;

pub use chart::{ChartSpec, KeyField, RowFilter, RowOrder, ValueField};
pub use group::{Accumulator, GroupBy};

/// How the values of one group collapse into a single number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    Mean,
    Sum,
}

impl Reduction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reduction::Mean => "mean",
            Reduction::Sum => "sum",
        }
    }
}

/// Rendering hint carried alongside each table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
}

/// One component of a group key.
///
/// Floats compare and hash by bit pattern (with `-0.0` folded into `0.0`),
/// which makes them usable as grouping keys and gives a total order.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
    Float(f64),
}

impl KeyValue {
    pub fn float(v: f64) -> Self {
        KeyValue::Float(if v == 0.0 { 0.0 } else { v })
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::Int(_) => 0,
            KeyValue::Float(_) => 1,
            KeyValue::Text(_) => 2,
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::float(v)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            KeyValue::Int(v) => v.hash(state),
            KeyValue::Text(v) => v.hash(state),
            KeyValue::Float(v) => v.to_bits().hash(state),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Text(a), KeyValue::Text(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<KeyValue>,
    pub value: f64,
}

/// Grouped-and-reduced output for one chart slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub title: String,
    pub kind: ChartKind,
    pub key_columns: Vec<&'static str>,
    pub value_column: &'static str,
    pub reduction: Reduction,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value stored under `key`, if that group exists.
    pub fn value_of(&self, key: &[KeyValue]) -> Option<f64> {
        self.rows
            .iter()
            .find(|row| row.key.as_slice() == key)
            .map(|row| row.value)
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().map(|row| row.value).sum()
    }

    /// Each row's value as a fraction of the table total (pie slices).
    /// All shares are zero when the total is zero.
    pub fn shares(&self) -> Vec<(Vec<KeyValue>, f64)> {
        let total = self.total();
        self.rows
            .iter()
            .map(|row| {
                let share = if total == 0.0 { 0.0 } else { row.value / total };
                (row.key.clone(), share)
            })
            .collect()
    }
}
