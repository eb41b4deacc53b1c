use crate::structs::Record;
use crate::transform::{day_index, parse_date_time, week_index, wind_bucket};
use std::collections::BTreeMap;

/// Builds a sensor reading the way the CSV loader would.
pub fn reading(date_time: &str, temp: f64, rain: f64, wind_dir: f64, flux: f64) -> Record {
    let date_time = parse_date_time(date_time).unwrap();
    let fields: BTreeMap<String, f64> = [
        ("surfTemp", temp),
        ("rainfall", rain),
        ("windDir", wind_dir),
        ("solarFlux", flux),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let day = day_index(&date_time);
    Record {
        date_time,
        fields,
        day,
        week: week_index(day),
        wind_bucket: wind_bucket(wind_dir),
    }
}

/// Readings keyed only by temperature, one per value, all on the same day.
pub fn temperatures(values: &[f64]) -> Vec<Record> {
    values
        .iter()
        .map(|&t| reading("2015/01/01 12:00", t, 0.0, 0.0, 0.0))
        .collect()
}
