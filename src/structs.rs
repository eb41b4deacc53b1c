use chrono::NaiveDateTime;
use log::{Level, Log, Metadata, Record as LogRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Simple logger implementation
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if record.level() <= Level::Warn {
            eprintln!("[{}] {}", record.level(), record.args());
        } else {
            println!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Number of 45° compass sectors used by the wind rose.
pub const WIND_BUCKETS: usize = 8;

/// One parsed sensor reading with its derived classification fields.
///
/// Records are immutable once loaded. Numeric sensor columns live in
/// `fields` under their CSV header names.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date_time: NaiveDateTime,
    pub fields: BTreeMap<String, f64>,
    /// Days from the common era (0001-01-01 is day 1).
    pub day: i32,
    /// Sunday-aligned week index, `day.div_euclid(7)`.
    pub week: i32,
    /// Wind-direction bucket in `[0, 8)`.
    pub wind_bucket: u8,
}

impl Record {
    /// Numeric value of a sensor column, if the column exists.
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    /// Numeric value of a sensor column, `0.0` when absent.
    pub fn value(&self, name: &str) -> f64 {
        self.field(name).unwrap_or(0.0)
    }
}

/// Names of the CSV columns the dashboard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub date_time: String,
    pub temperature: String,
    pub rainfall: String,
    pub wind_direction: String,
    pub solar_flux: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            date_time: "dateTime".to_string(),
            temperature: "surfTemp".to_string(),
            rainfall: "rainfall".to_string(),
            wind_direction: "windDir".to_string(),
            solar_flux: "solarFlux".to_string(),
        }
    }
}

/// Layout of the polar chart, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarConfig {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
}

impl Default for PolarConfig {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 400.0,
            margin: 30.0,
        }
    }
}

/// Configuration for the dashboard session
#[derive(Debug, Clone, Default)]
pub struct DashboardConfig {
    pub polar: PolarConfig,
    pub columns: ColumnNames,
}

/// Snapshot export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Parquet,
    All,
}

impl OutputFormat {
    pub fn includes(&self, other: OutputFormat) -> bool {
        *self == OutputFormat::All || *self == other
    }
}

/// One flattened `(key, accumulator)` entry of a group, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub group: String,
    pub key: String,
    pub value: f64,
    pub count: Option<u64>,
}
