pub mod aggregate;
pub mod config;
pub mod export;
pub mod fetch;
pub mod report;
pub mod source;

pub use aggregate::{AggregateRow, AggregateTable, ChartKind, KeyValue, Reduction};
pub use config::Config;
pub use report::{compute, FourChartResult, ReportMode, Year};
pub use source::{LoadError, Record, SourceTable};
