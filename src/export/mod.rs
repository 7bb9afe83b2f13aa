// src/export/mod.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

use crate::aggregate::{AggregateTable, KeyValue};
use crate::report::FourChartResult;
use crate::source::REQUIRED_COLUMNS;

const SLOT_NAMES: [&str; 4] = ["chart_a", "chart_b", "chart_c", "chart_d"];

fn column_type(name: &str) -> Result<DataType> {
    REQUIRED_COLUMNS
        .iter()
        .find(|(col, _)| *col == name)
        .map(|(_, ty)| ty.clone())
        .ok_or_else(|| anyhow!("unknown key column {}", name))
}

fn key_array(table: &AggregateTable, idx: usize, ty: &DataType) -> Result<ArrayRef> {
    let keys = table.rows.iter().map(|row| &row.key[idx]);
    let arr: ArrayRef = match ty {
        DataType::Int64 => Arc::new(Int64Array::from(
            keys.map(|k| match k {
                KeyValue::Int(v) => Ok(*v),
                other => Err(anyhow!("expected integer key, found {:?}", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            keys.map(|k| match k {
                KeyValue::Float(v) => Ok(*v),
                other => Err(anyhow!("expected float key, found {:?}", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        )),
        DataType::Utf8 => Arc::new(StringArray::from(
            keys.map(|k| match k {
                KeyValue::Text(v) => Ok(v.as_str()),
                other => Err(anyhow!("expected text key, found {:?}", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        )),
        other => bail!("unsupported key type {}", other),
    };
    Ok(arr)
}

/// Columnar form of a chart table: key columns, then the reduced value.
pub fn to_record_batch(table: &AggregateTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.key_columns.len() + 1);
    let mut columns = Vec::with_capacity(table.key_columns.len() + 1);

    for (idx, name) in table.key_columns.iter().enumerate() {
        let ty = column_type(name)?;
        columns.push(key_array(table, idx, &ty)?);
        fields.push(Field::new(*name, ty, false));
    }
    fields.push(Field::new(table.value_column, DataType::Float64, false));
    columns.push(Arc::new(Float64Array::from(
        table.rows.iter().map(|row| row.value).collect::<Vec<_>>(),
    )));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("building record batch for {:?}", table.title))
}

/// Write one chart table as a Snappy-compressed Parquet file.
pub fn write_parquet(table: &AggregateTable, path: &Path) -> Result<()> {
    let batch = to_record_batch(table)?;
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating Arrow writer for chart table")?;
    writer.write(&batch).context("writing chart batch")?;
    writer.close().context("closing chart writer")?;
    Ok(())
}

/// Write the four tables as `chart_a.parquet` … `chart_d.parquet` under `dir`.
pub fn write_report(result: &FourChartResult, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating output directory {:?}", dir))?;

    let mut written = Vec::with_capacity(SLOT_NAMES.len());
    for (slot, table) in SLOT_NAMES.iter().zip(result.iter()) {
        let path = dir.join(format!("{}.parquet", slot));
        write_parquet(table, &path)?;
        info!(path = %path.display(), rows = table.len(), "wrote chart");
        written.push(path);
    }
    Ok(written)
}

pub fn to_json(result: &FourChartResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("serialising report to JSON")
}

pub fn to_yaml(result: &FourChartResult) -> Result<String> {
    serde_yaml::to_string(result).context("serialising report to YAML")
}
