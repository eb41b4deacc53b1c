use crate::error::{DashboardError, Result};
use crate::structs::{ColumnNames, Record, WIND_BUCKETS};
use chrono::{Datelike, NaiveDateTime, NaiveTime};
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

const SECTOR_DEGREES: f64 = 360.0 / WIND_BUCKETS as f64;

/// Derives typed records from raw CSV rows.
///
/// Every row must carry a parsable timestamp in the configured date/time
/// column and a numeric value in every other column. A single bad cell fails
/// the whole load; there is no partial-load mode.
///
/// # Arguments
///
/// * `headers` - Column names, in row order
/// * `rows` - Raw cell values, one `Vec` per data row
/// * `columns` - Names of the columns the dashboard relies on
///
/// # Errors
///
/// Returns `DashboardError::DataLoad` naming the offending row and column.
pub fn derive_records(
    headers: &[String],
    rows: Vec<Vec<String>>,
    columns: &ColumnNames,
) -> Result<Vec<Record>> {
    let time_col = headers
        .iter()
        .position(|h| *h == columns.date_time)
        .ok_or_else(|| missing_column(&columns.date_time))?;
    if !headers.contains(&columns.wind_direction) {
        return Err(missing_column(&columns.wind_direction));
    }

    debug!("Deriving {} records in parallel", rows.len());
    rows.into_par_iter()
        .enumerate()
        .map(|(i, row)| derive_record(headers, time_col, &row, columns, i + 2))
        .collect()
}

fn missing_column(name: &str) -> DashboardError {
    DashboardError::DataLoad(format!("missing required column '{}'", name))
}

fn derive_record(
    headers: &[String],
    time_col: usize,
    row: &[String],
    columns: &ColumnNames,
    line: usize,
) -> Result<Record> {
    if row.len() != headers.len() {
        return Err(DashboardError::DataLoad(format!(
            "line {}: expected {} cells, found {}",
            line,
            headers.len(),
            row.len()
        )));
    }

    let date_time = parse_date_time(&row[time_col])
        .map_err(|e| DashboardError::DataLoad(format!("line {}: {}", line, e)))?;

    let mut fields = BTreeMap::new();
    for (idx, (header, cell)) in headers.iter().zip(row).enumerate() {
        if idx == time_col {
            continue;
        }
        let value: f64 = cell.trim().parse().map_err(|_| {
            DashboardError::DataLoad(format!(
                "line {}: column '{}' is not numeric: '{}'",
                line, header, cell
            ))
        })?;
        fields.insert(header.clone(), value);
    }

    let degrees = fields
        .get(&columns.wind_direction)
        .copied()
        .filter(|d| d.is_finite())
        .ok_or_else(|| {
            DashboardError::DataLoad(format!("line {}: wind direction is not finite", line))
        })?;

    let day = day_index(&date_time);
    Ok(Record {
        date_time,
        fields,
        day,
        week: week_index(day),
        wind_bucket: wind_bucket(degrees),
    })
}

/// Parses a `YYYY/MM/DD HH:MM` timestamp.
pub fn parse_date_time(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), DATE_TIME_FORMAT).map_err(|e| {
        DashboardError::DataLoad(format!("invalid timestamp '{}': {}", raw.trim(), e))
    })
}

/// Calendar day bucket of a timestamp, as days from the common era.
pub fn day_index(date_time: &NaiveDateTime) -> i32 {
    date_time.date().num_days_from_ce()
}

/// Smallest day bucket whose midnight is at or after `date_time`.
///
/// Used to turn a continuous brush edge into a half-open range of day keys.
pub fn day_ceil(date_time: &NaiveDateTime) -> i32 {
    let day = day_index(date_time);
    if date_time.time() == NaiveTime::MIN {
        day
    } else {
        day + 1
    }
}

/// Sunday-aligned week bucket. Day 0 of the common era is a Sunday.
pub fn week_index(day: i32) -> i32 {
    day.div_euclid(7)
}

/// Compass sector of a wind direction: `floor((degrees mod 360) / 45)`.
pub fn wind_bucket(degrees: f64) -> u8 {
    let normalized = degrees.rem_euclid(360.0);
    let bucket = (normalized / SECTOR_DEGREES).floor() as usize;
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    bucket.min(WIND_BUCKETS - 1) as u8
}

/// Earliest and latest timestamps of the dataset.
pub fn extent(records: &[Record]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let min = records.par_iter().map(|r| r.date_time).min()?;
    let max = records.par_iter().map(|r| r.date_time).max()?;
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Weekday};

    fn headers() -> Vec<String> {
        ["dateTime", "surfTemp", "rainfall", "windDir", "solarFlux"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_wind_bucket_boundaries() {
        assert_eq!(wind_bucket(0.0), 0);
        assert_eq!(wind_bucket(44.9), 0);
        assert_eq!(wind_bucket(45.0), 1);
        assert_eq!(wind_bucket(359.9), 7);
        assert_eq!(wind_bucket(360.0), 0);
        assert_eq!(wind_bucket(405.0), 1);
        assert_eq!(wind_bucket(-10.0), 7);
        assert_eq!(wind_bucket(-1e-20), 7);
    }

    #[test]
    fn test_week_starts_on_sunday() {
        let sunday = NaiveDate::from_ymd_opt(2015, 3, 1).unwrap();
        assert_eq!(sunday.weekday(), Weekday::Sun);
        let saturday = sunday.pred_opt().unwrap();
        let next_saturday = NaiveDate::from_ymd_opt(2015, 3, 7).unwrap();

        let week = week_index(sunday.num_days_from_ce());
        assert_eq!(week_index(next_saturday.num_days_from_ce()), week);
        assert_eq!(week_index(saturday.num_days_from_ce()), week - 1);
    }

    #[test]
    fn test_day_ceil() {
        let midnight = parse_date_time("2015/01/02 00:00").unwrap();
        let later = parse_date_time("2015/01/02 00:01").unwrap();
        assert_eq!(day_ceil(&midnight), day_index(&midnight));
        assert_eq!(day_ceil(&later), day_index(&later) + 1);
    }

    #[test]
    fn test_derive_records() {
        let rows = vec![
            row(&["2015/01/01 00:00", "4.5", "0.2", "100", "12"]),
            row(&["2015/01/01 00:30", "4.1", "0", "350", "0"]),
        ];
        let records = derive_records(&headers(), rows, &ColumnNames::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].wind_bucket, 2);
        assert_eq!(records[1].wind_bucket, 7);
        assert_eq!(records[0].value("surfTemp"), 4.5);
        assert_eq!(records[0].field("dateTime"), None);
        assert_eq!(records[0].day, records[1].day);
        assert_eq!(
            NaiveDate::from_num_days_from_ce_opt(records[0].day),
            NaiveDate::from_ymd_opt(2015, 1, 1)
        );
    }

    #[test]
    fn test_derive_records_rejects_bad_cells() {
        let rows = vec![row(&["2015/01/01 00:00", "warm", "0.2", "100", "12"])];
        let err = derive_records(&headers(), rows, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DashboardError::DataLoad(msg) if msg.contains("surfTemp")));

        let rows = vec![row(&["01-01-2015", "1", "0.2", "100", "12"])];
        assert!(derive_records(&headers(), rows, &ColumnNames::default()).is_err());
    }

    #[test]
    fn test_derive_records_requires_wind_direction() {
        let headers: Vec<String> = vec!["dateTime".into(), "surfTemp".into()];
        let rows = vec![row(&["2015/01/01 00:00", "1"])];
        let err = derive_records(&headers, rows, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DashboardError::DataLoad(msg) if msg.contains("windDir")));
    }

    #[test]
    fn test_extent() {
        let rows = vec![
            row(&["2015/02/01 10:00", "1", "0", "0", "0"]),
            row(&["2015/01/01 00:00", "1", "0", "0", "0"]),
            row(&["2015/03/01 23:30", "1", "0", "0", "0"]),
        ];
        let records = derive_records(&headers(), rows, &ColumnNames::default()).unwrap();
        let (min, max) = extent(&records).unwrap();
        assert_eq!(min, parse_date_time("2015/01/01 00:00").unwrap());
        assert_eq!(max, parse_date_time("2015/03/01 23:30").unwrap());
        assert!(extent(&[]).is_none());
    }
}
