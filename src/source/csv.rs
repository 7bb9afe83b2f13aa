// src/source/csv.rs

use ::csv::ReaderBuilder as HeaderReaderBuilder;
use arrow::{
    compute::concat_batches,
    csv::ReaderBuilder,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::debug;

use super::{LoadError, SourceTable, REQUIRED_COLUMNS};

const BATCH_SIZE: usize = 8_192;

/// Trim whitespace, a leading byte-order mark and outer quotes from a header cell.
fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .to_string()
}

/// Decode the raw bytes of the sales CSV into a [`SourceTable`].
///
/// - Header names are matched exactly; every absent required column is
///   reported in a single [`LoadError::MissingColumns`].
/// - Columns outside [`REQUIRED_COLUMNS`] are read as text and dropped by
///   the projection.
/// - Empty cells in a required column fail with [`LoadError::NullValues`].
#[tracing::instrument(level = "info", skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_csv(bytes: &[u8]) -> Result<SourceTable, LoadError> {
    // 1) Header row only
    let mut header_rdr = HeaderReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers: Vec<String> = header_rdr
        .headers()
        .map_err(|e| LoadError::Parse(format!("reading header row: {}", e)))?
        .iter()
        .map(clean_header)
        .collect();
    debug!(columns = headers.len(), "read header row");

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|(name, _)| !headers.iter().any(|h| h == name))
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    // 2) Full-width schema: typed required columns, text for everything else
    let fields: Vec<Field> = headers
        .iter()
        .map(|h| {
            let ty = REQUIRED_COLUMNS
                .iter()
                .find(|(name, _)| name == h)
                .map(|(_, ty)| ty.clone())
                .unwrap_or(DataType::Utf8);
            Field::new(h, ty, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let projection: Vec<usize> = REQUIRED_COLUMNS
        .iter()
        .filter_map(|(name, _)| headers.iter().position(|h| h == name))
        .collect();
    let projected = Arc::new(schema.project(&projection)?);

    // 3) Decode, projected down to the required columns
    let reader = ReaderBuilder::new(schema)
        .with_header(true)
        .with_batch_size(BATCH_SIZE)
        .with_projection(projection)
        .build(bytes)?;
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>()?;
    let batch = concat_batches(&projected, &batches)?;
    debug!(
        rows = batch.num_rows(),
        batches = batches.len(),
        "decoded source rows"
    );

    // 4) Type and null checks
    SourceTable::from_batch(&batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::init_test_logging;

    const HEADER: &str = "Date,Year,Month,Recession,Automobile_Sales,GDP,Number_of_Vehicles_Sold,Vehicle_Type,Total_Expenditure,Unemployment_Rate";

    #[test]
    fn test_parse_ignores_extra_columns() {
        init_test_logging();
        let content = format!(
            "{}\n\
             1/31/1980,1980,Jan,1,3684,27.483571,29,Supperminicar,1558,5.4\n\
             2/29/1980,1980,Feb,1,3761.5,24.308678,67,Mediumfamilycar,2250.25,4.8\n",
            HEADER
        );

        let table = parse_csv(content.as_bytes()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.year(0), 1980);
        assert_eq!(table.month(1), "Feb");
        assert!(table.is_recession(1));
        assert_eq!(table.automobile_sales(1), 3761.5);
        assert_eq!(table.vehicles_sold(0), 29.0);
        assert_eq!(table.vehicle_type(1), "Mediumfamilycar");
        assert_eq!(table.total_expenditure(1), 2250.25);
        assert_eq!(table.unemployment_rate(0), 5.4);
    }

    #[test]
    fn test_parse_header_only_gives_empty_table() {
        let table = parse_csv(format!("{}\n", HEADER).as_bytes()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_parse_strips_bom_and_reorders() {
        let content = "\u{feff}Vehicle_Type,Unemployment_Rate,Total_Expenditure,Number_of_Vehicles_Sold,Automobile_Sales,Recession,Month,Year\n\
                       Sports,2.5,100,7,12.5,0,Mar,2005\n";

        let table = parse_csv(content.as_bytes()).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.year(0), 2005);
        assert_eq!(table.vehicle_type(0), "Sports");
        assert_eq!(table.automobile_sales(0), 12.5);
    }

    #[test]
    fn test_parse_reports_missing_columns() {
        let content = "Year,Month,Recession,Automobile_Sales\n1980,Jan,1,10\n";

        match parse_csv(content.as_bytes()) {
            Err(LoadError::MissingColumns(cols)) => assert_eq!(
                cols,
                vec![
                    "Number_of_Vehicles_Sold",
                    "Vehicle_Type",
                    "Total_Expenditure",
                    "Unemployment_Rate"
                ]
            ),
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty_numeric_cell() {
        let content = format!(
            "{}\n1/31/1980,1980,Jan,1,,27.4,29,Supperminicar,1558,5.4\n",
            HEADER
        );

        assert!(matches!(
            parse_csv(content.as_bytes()),
            Err(LoadError::NullValues { ref column, .. }) if column == "Automobile_Sales"
        ));
    }

    #[test]
    fn test_parse_rejects_non_numeric_value() {
        let content = format!(
            "{}\n1/31/1980,nineteen-eighty,Jan,1,3684,27.4,29,Supperminicar,1558,5.4\n",
            HEADER
        );

        assert!(matches!(
            parse_csv(content.as_bytes()),
            Err(LoadError::Parse(_))
        ));
    }
}
