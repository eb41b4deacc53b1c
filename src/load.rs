use crate::error::{DashboardError, Result};
use crate::structs::{ColumnNames, Record, SnapshotRow};
use crate::transform::derive_records;
use arrow_array::{Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use csv::{ReaderBuilder, Writer};
use log::{debug, info};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::{fs, fs::File, path::Path, sync::Arc};

/// Loads the sensor log from a CSV file.
///
/// The first row holds column names. The whole file must parse: any I/O,
/// CSV or cell error fails the load.
///
/// # Arguments
/// * `input_path` - Path of the CSV file
/// * `columns` - Names of the columns the dashboard relies on
///
/// # Errors
/// Returns `DashboardError::DataLoad` if the file is missing, malformed or empty.
pub fn read_records(input_path: &Path, columns: &ColumnNames) -> Result<Vec<Record>> {
    let file = File::open(input_path).map_err(|e| {
        DashboardError::DataLoad(format!("cannot open {}: {}", input_path.display(), e))
    })?;
    let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(load_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for row in reader.records() {
        let row = row.map_err(load_error)?;
        rows.push(row.iter().map(|c| c.to_string()).collect::<Vec<_>>());
    }
    if rows.is_empty() {
        return Err(DashboardError::DataLoad(format!(
            "{} contains no data rows",
            input_path.display()
        )));
    }
    debug!("Read {} rows with columns {:?}", rows.len(), headers);

    let records = derive_records(&headers, rows, columns)?;
    info!("Loaded {} records from {}", records.len(), input_path.display());
    Ok(records)
}

fn load_error(e: csv::Error) -> DashboardError {
    DashboardError::DataLoad(e.to_string())
}

/// Writes group snapshots to a CSV file.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_csv(rows: &[SnapshotRow], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    writer.write_record(["Group", "Key", "Value", "Count"])?;
    for row in rows {
        writer.write_record(&[
            row.group.clone(),
            row.key.clone(),
            format!("{:.2}", row.value),
            row.count.map(|c| c.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes group snapshots to a pretty-formatted JSON file.
///
/// # Errors
/// Returns error if file cannot be created or serialization fails.
pub fn write_json(rows: &[SnapshotRow], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

/// Writes group snapshots to a columnar Parquet file using Arrow format.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_parquet(rows: &[SnapshotRow], output_path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("group", DataType::Utf8, false),
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
        Field::new("count", DataType::UInt64, true),
    ]));

    let groups = StringArray::from_iter_values(rows.iter().map(|r| r.group.as_str()));
    let keys = StringArray::from_iter_values(rows.iter().map(|r| r.key.as_str()));
    let values: Float64Array = rows.iter().map(|r| r.value).collect();
    let counts: UInt64Array = rows.iter().map(|r| r.count).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(groups),
            Arc::new(keys),
            Arc::new(values),
            Arc::new(counts),
        ],
    )?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

/// Writes a rendered SVG document.
pub fn write_svg(svg: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, svg)?;
    Ok(())
}
