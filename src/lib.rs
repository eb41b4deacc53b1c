pub mod crossfilter;
pub mod dashboard;
pub mod dimension;
pub mod error;
pub mod group;
pub mod load;
pub mod polar;
pub mod reducer;
pub mod structs;
pub mod transform;

#[cfg(test)]
mod test_utils;

// Re-export public API
pub use crossfilter::{Crossfilter, DimensionHandle, FilterStats, GroupHandle};
pub use dashboard::{COMPASS_LABELS, Dashboard};
pub use dimension::{Filter, RecordId};
pub use error::{DashboardError, Result};
pub use load::{read_records, write_csv, write_json, write_parquet, write_svg};
pub use polar::{ChartUpdate, PolarChart, PolarGeometry, render};
pub use reducer::{Average, AverageValue, Count, Reducer, Sum, reduce};
pub use structs::{
    ColumnNames, DashboardConfig, OutputFormat, PolarConfig, Record, SimpleLogger, SnapshotRow,
};
