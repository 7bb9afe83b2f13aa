// src/source/mod.rs

use arrow::{
    array::{Array, ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::fetch::{fetch_source, RetryPolicy};

pub mod csv;

pub use self::csv::parse_csv;

pub const YEAR: &str = "Year";
pub const MONTH: &str = "Month";
pub const RECESSION: &str = "Recession";
pub const AUTOMOBILE_SALES: &str = "Automobile_Sales";
pub const VEHICLES_SOLD: &str = "Number_of_Vehicles_Sold";
pub const VEHICLE_TYPE: &str = "Vehicle_Type";
pub const TOTAL_EXPENDITURE: &str = "Total_Expenditure";
pub const UNEMPLOYMENT_RATE: &str = "Unemployment_Rate";

/// The eight columns every source file must carry, with the Arrow type each
/// one is decoded as. Column order here is the column order of the snapshot.
pub const REQUIRED_COLUMNS: [(&str, DataType); 8] = [
    (YEAR, DataType::Int64),
    (MONTH, DataType::Utf8),
    (RECESSION, DataType::Int64),
    (AUTOMOBILE_SALES, DataType::Float64),
    (VEHICLES_SOLD, DataType::Float64),
    (VEHICLE_TYPE, DataType::Utf8),
    (TOTAL_EXPENDITURE, DataType::Float64),
    (UNEMPLOYMENT_RATE, DataType::Float64),
];

/// Failures while fetching or decoding the source file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source {location} is unreachable: {message}")]
    Unreachable { location: String, message: String },

    #[error("failed to decode source data: {0}")]
    Parse(String),

    #[error("source is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("column {column} contains {nulls} empty values")]
    NullValues { column: String, nulls: usize },

    #[error("column {column} has type {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        found: DataType,
    },
}

impl From<arrow::error::ArrowError> for LoadError {
    fn from(err: arrow::error::ArrowError) -> Self {
        LoadError::Parse(err.to_string())
    }
}

/// One sales observation, named after the CSV headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "Month")]
    pub month: String,
    #[serde(rename = "Recession")]
    pub recession: i64,
    #[serde(rename = "Automobile_Sales")]
    pub automobile_sales: f64,
    #[serde(rename = "Number_of_Vehicles_Sold")]
    pub vehicles_sold: f64,
    #[serde(rename = "Vehicle_Type")]
    pub vehicle_type: String,
    #[serde(rename = "Total_Expenditure")]
    pub total_expenditure: f64,
    #[serde(rename = "Unemployment_Rate")]
    pub unemployment_rate: f64,
}

/// Immutable columnar snapshot of the source file.
///
/// Every column is null-free and has the type listed in [`REQUIRED_COLUMNS`];
/// both are checked once in [`SourceTable::from_batch`], so the accessors
/// below never fail.
#[derive(Debug, Clone)]
pub struct SourceTable {
    year: Int64Array,
    month: StringArray,
    recession: Int64Array,
    automobile_sales: Float64Array,
    vehicles_sold: Float64Array,
    vehicle_type: StringArray,
    total_expenditure: Float64Array,
    unemployment_rate: Float64Array,
}

fn typed_column<T: Array + Clone + 'static>(
    batch: &RecordBatch,
    name: &str,
    expected: &DataType,
) -> Result<T, LoadError> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| LoadError::MissingColumns(vec![name.to_string()]))?;

    if col.data_type() != expected {
        return Err(LoadError::TypeMismatch {
            column: name.to_string(),
            expected: expected.clone(),
            found: col.data_type().clone(),
        });
    }
    if col.null_count() > 0 {
        return Err(LoadError::NullValues {
            column: name.to_string(),
            nulls: col.null_count(),
        });
    }

    col.as_any()
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| LoadError::TypeMismatch {
            column: name.to_string(),
            expected: expected.clone(),
            found: col.data_type().clone(),
        })
}

impl SourceTable {
    /// Arrow schema of the snapshot (the eight required columns, non-nullable).
    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(
            REQUIRED_COLUMNS
                .iter()
                .map(|(name, ty)| Field::new(*name, ty.clone(), false))
                .collect::<Vec<_>>(),
        ))
    }

    /// Validate a decoded batch and take typed handles on its columns.
    /// Extra columns are ignored.
    pub fn from_batch(batch: &RecordBatch) -> Result<Self, LoadError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|(name, _)| batch.column_by_name(name).is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        Ok(Self {
            year: typed_column(batch, YEAR, &DataType::Int64)?,
            month: typed_column(batch, MONTH, &DataType::Utf8)?,
            recession: typed_column(batch, RECESSION, &DataType::Int64)?,
            automobile_sales: typed_column(batch, AUTOMOBILE_SALES, &DataType::Float64)?,
            vehicles_sold: typed_column(batch, VEHICLES_SOLD, &DataType::Float64)?,
            vehicle_type: typed_column(batch, VEHICLE_TYPE, &DataType::Utf8)?,
            total_expenditure: typed_column(batch, TOTAL_EXPENDITURE, &DataType::Float64)?,
            unemployment_rate: typed_column(batch, UNEMPLOYMENT_RATE, &DataType::Float64)?,
        })
    }

    /// Build a snapshot from in-memory records, in order.
    pub fn from_records(records: &[Record]) -> Self {
        Self {
            year: records.iter().map(|r| r.year).collect::<Vec<_>>().into(),
            month: records.iter().map(|r| Some(r.month.as_str())).collect(),
            recession: records.iter().map(|r| r.recession).collect::<Vec<_>>().into(),
            automobile_sales: records
                .iter()
                .map(|r| r.automobile_sales)
                .collect::<Vec<_>>()
                .into(),
            vehicles_sold: records
                .iter()
                .map(|r| r.vehicles_sold)
                .collect::<Vec<_>>()
                .into(),
            vehicle_type: records.iter().map(|r| Some(r.vehicle_type.as_str())).collect(),
            total_expenditure: records
                .iter()
                .map(|r| r.total_expenditure)
                .collect::<Vec<_>>()
                .into(),
            unemployment_rate: records
                .iter()
                .map(|r| r.unemployment_rate)
                .collect::<Vec<_>>()
                .into(),
        }
    }

    pub fn empty() -> Self {
        Self::from_records(&[])
    }

    pub fn num_rows(&self) -> usize {
        self.year.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn year(&self, row: usize) -> i64 {
        self.year.value(row)
    }

    pub fn month(&self, row: usize) -> &str {
        self.month.value(row)
    }

    pub fn is_recession(&self, row: usize) -> bool {
        self.recession.value(row) == 1
    }

    pub fn automobile_sales(&self, row: usize) -> f64 {
        self.automobile_sales.value(row)
    }

    pub fn vehicles_sold(&self, row: usize) -> f64 {
        self.vehicles_sold.value(row)
    }

    pub fn vehicle_type(&self, row: usize) -> &str {
        self.vehicle_type.value(row)
    }

    pub fn total_expenditure(&self, row: usize) -> f64 {
        self.total_expenditure.value(row)
    }

    pub fn unemployment_rate(&self, row: usize) -> f64 {
        self.unemployment_rate.value(row)
    }

    /// Owned copy of one row.
    pub fn record(&self, row: usize) -> Record {
        Record {
            year: self.year(row),
            month: self.month(row).to_string(),
            recession: self.recession.value(row),
            automobile_sales: self.automobile_sales(row),
            vehicles_sold: self.vehicles_sold(row),
            vehicle_type: self.vehicle_type(row).to_string(),
            total_expenditure: self.total_expenditure(row),
            unemployment_rate: self.unemployment_rate(row),
        }
    }

    /// Re-assemble the snapshot as a single Arrow batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch, LoadError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.year.clone()),
            Arc::new(self.month.clone()),
            Arc::new(self.recession.clone()),
            Arc::new(self.automobile_sales.clone()),
            Arc::new(self.vehicles_sold.clone()),
            Arc::new(self.vehicle_type.clone()),
            Arc::new(self.total_expenditure.clone()),
            Arc::new(self.unemployment_rate.clone()),
        ];
        Ok(RecordBatch::try_new(Self::schema(), columns)?)
    }
}

/// A one-shot slot for the decoded source. The first successful load or
/// [`install`](SharedSource::install) wins; concurrent callers wait on it
/// instead of fetching again.
#[derive(Debug)]
pub struct SharedSource {
    cell: OnceCell<SourceTable>,
}

impl SharedSource {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Store `table` unless a snapshot already exists, and hand back the
    /// snapshot that is kept.
    pub async fn install(&self, table: SourceTable) -> &SourceTable {
        let mut fresh = false;
        let flag = &mut fresh;
        let kept = self
            .cell
            .get_or_init(|| async move {
                *flag = true;
                table
            })
            .await;
        if fresh {
            info!(rows = kept.num_rows(), "source table installed");
        } else {
            warn!("source table already installed; keeping the first snapshot");
        }
        kept
    }

    pub fn get(&self) -> Option<&SourceTable> {
        self.cell.get()
    }

    /// [`load`] at most once. Callers arriving while the fetch is in flight
    /// wait for it; a failed load leaves the slot empty for the next caller.
    pub async fn load(
        &self,
        client: &Client,
        location: &str,
        policy: RetryPolicy,
    ) -> Result<&SourceTable, LoadError> {
        self.cell
            .get_or_try_init(|| async move {
                let table = load(client, location, policy).await?;
                info!(rows = table.num_rows(), "source table installed");
                Ok::<_, LoadError>(table)
            })
            .await
    }
}

impl Default for SharedSource {
    fn default() -> Self {
        Self::new()
    }
}

static SHARED: SharedSource = SharedSource::new();

/// Publish `table` as the process-wide snapshot. Only the first call stores
/// anything; later calls keep the existing table and hand it back.
pub async fn install(table: SourceTable) -> &'static SourceTable {
    SHARED.install(table).await
}

/// The process-wide snapshot, if one has been installed.
pub fn shared() -> Option<&'static SourceTable> {
    SHARED.get()
}

/// Fetch and decode the source at `location`.
#[tracing::instrument(level = "info", skip(client, policy))]
pub async fn load(
    client: &Client,
    location: &str,
    policy: RetryPolicy,
) -> Result<SourceTable, LoadError> {
    let bytes = fetch_source(client, location, policy).await?;
    let table = parse_csv(&bytes)?;
    info!(rows = table.num_rows(), "source loaded");
    Ok(table)
}

/// [`load`] once per process: returns the installed snapshot without any I/O
/// if one exists, otherwise loads and installs it.
pub async fn load_shared(
    client: &Client,
    location: &str,
    policy: RetryPolicy,
) -> Result<&'static SourceTable, LoadError> {
    SHARED.load(client, location, policy).await
}


#[cfg(test)]
mod tests {
    use super::fixtures::{init_test_logging, record};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_from_records_accessors() {
        let table = SourceTable::from_records(&[
            record(1980, "Jan", 1, "Supperminicar", 3684.0, 29.0, 1558.0, 5.4),
            record(1981, "Feb", 0, "Smallfamilycar", 1800.5, 33.0, 2200.0, 2.1),
        ]);

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.year(1), 1981);
        assert_eq!(table.month(0), "Jan");
        assert!(table.is_recession(0));
        assert!(!table.is_recession(1));
        assert_eq!(table.vehicle_type(1), "Smallfamilycar");
        assert_eq!(table.unemployment_rate(0), 5.4);
        assert_eq!(
            table.record(1),
            record(1981, "Feb", 0, "Smallfamilycar", 1800.5, 33.0, 2200.0, 2.1)
        );
    }

    #[test]
    fn test_batch_roundtrip_keeps_rows() {
        let table = SourceTable::from_records(&[record(
            2019, "Mar", 0, "Sports", 12.0, 4.0, 900.0, 3.3,
        )]);
        let batch = table.to_record_batch().unwrap();
        assert_eq!(batch.num_columns(), 8);

        let back = SourceTable::from_batch(&batch).unwrap();
        assert_eq!(back.record(0), table.record(0));
    }

    #[test]
    fn test_from_batch_reports_all_missing_columns() {
        let schema = Arc::new(Schema::new(vec![Field::new(YEAR, DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![2000]))]).unwrap();

        match SourceTable::from_batch(&batch) {
            Err(LoadError::MissingColumns(cols)) => {
                assert_eq!(cols.len(), 7);
                assert!(cols.contains(&VEHICLE_TYPE.to_string()));
                assert!(!cols.contains(&YEAR.to_string()));
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_from_batch_rejects_wrong_type() {
        let table = SourceTable::from_records(&[record(
            2001, "Jan", 1, "Sports", 1.0, 1.0, 1.0, 1.0,
        )]);
        let batch = table.to_record_batch().unwrap();

        let mut fields: Vec<Field> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let mut columns = batch.columns().to_vec();
        fields[0] = Field::new(YEAR, DataType::Utf8, false);
        columns[0] = Arc::new(StringArray::from(vec!["2001"]));
        let bad = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap();

        assert!(matches!(
            SourceTable::from_batch(&bad),
            Err(LoadError::TypeMismatch { ref column, .. }) if column == YEAR
        ));
    }

    #[tokio::test]
    async fn test_load_local_csv() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "Year,Month,Recession,Automobile_Sales,Number_of_Vehicles_Sold,Vehicle_Type,Total_Expenditure,Unemployment_Rate"
        )
        .unwrap();
        writeln!(tmp, "1998,Jul,0,2500.5,120,Sports,3400,4.2").unwrap();

        let path = tmp.path().to_string_lossy().to_string();
        let table = load(&Client::new(), &path, RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(
            table.record(0),
            record(1998, "Jul", 0, "Sports", 2500.5, 120.0, 3400.0, 4.2)
        );
    }

    #[tokio::test]
    async fn test_install_keeps_first_snapshot() {
        let slot = SharedSource::new();
        let first = slot
            .install(SourceTable::from_records(&[record(
                1990, "Jan", 0, "Sports", 1.0, 1.0, 1.0, 1.0,
            )]))
            .await;
        let second = slot.install(SourceTable::empty()).await;

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.num_rows(), 1);
        assert!(std::ptr::eq(first, slot.get().unwrap()));
    }

    #[tokio::test]
    async fn test_process_install_is_one_shot() {
        let first = install(SourceTable::empty()).await;
        let second = install(SourceTable::empty()).await;

        assert!(std::ptr::eq(first, second));
        assert!(std::ptr::eq(first, shared().unwrap()));
    }

    fn loopback_client() -> Client {
        Client::builder().no_proxy().build().unwrap()
    }

    /// Serve `body` over HTTP on a loopback port, counting connections.
    async fn serve_counting(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    // Hold the response so a second caller arrives mid-fetch.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}/historical_automobile_sales.csv", addr), hits)
    }

    const SALES_CSV: &str = "Year,Month,Recession,Automobile_Sales,Number_of_Vehicles_Sold,Vehicle_Type,Total_Expenditure,Unemployment_Rate\n\
                             1980,Jan,1,3684,29,Supperminicar,1558,5.4\n\
                             1980,Feb,1,3761.5,67,Mediumfamilycar,2250.25,4.8\n";

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        init_test_logging();
        let (url, hits) = serve_counting(SALES_CSV).await;
        let slot = SharedSource::new();
        let client = loopback_client();

        let (a, b) = tokio::join!(
            slot.load(&client, &url, RetryPolicy::default()),
            slot.load(&client, &url, RetryPolicy::default()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(hits.load(Ordering::SeqCst), 1, "source fetched more than once");
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.num_rows(), 2);

        // Later callers are served from the slot without touching the network.
        let c = slot.load(&client, &url, RetryPolicy::default()).await.unwrap();
        assert!(std::ptr::eq(a, c));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_slot_empty() {
        let slot = SharedSource::new();
        let client = Client::new();
        let missing = "/nonexistent/historical_automobile_sales.csv";

        assert!(matches!(
            slot.load(&client, missing, RetryPolicy::default()).await,
            Err(LoadError::Unreachable { .. })
        ));
        assert!(slot.get().is_none());

        let table = slot
            .install(SourceTable::from_records(&[record(
                2001, "Mar", 0, "Sports", 5.0, 2.0, 3.0, 4.0,
            )]))
            .await;
        assert_eq!(table.num_rows(), 1);
        assert!(std::ptr::eq(table, slot.get().unwrap()));
    }

    #[tokio::test]
    async fn test_load_shared_returns_process_snapshot() {
        let (url, hits) = serve_counting(SALES_CSV).await;
        let client = loopback_client();

        let (a, b) = tokio::join!(
            load_shared(&client, &url, RetryPolicy::default()),
            load_shared(&client, &url, RetryPolicy::default()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(std::ptr::eq(a, b));
        assert!(std::ptr::eq(a, shared().unwrap()));
        // Another test may have installed the process snapshot first, in
        // which case no fetch happens at all.
        assert!(hits.load(Ordering::SeqCst) <= 1);
    }
}
