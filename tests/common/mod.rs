#![allow(dead_code)]

use lib::Record;
use lib::transform::{day_index, parse_date_time, week_index, wind_bucket};
use std::collections::BTreeMap;

pub const HEADER: &str = "dateTime,atmosPress,rainfall,windSpeed,windDir,surfTemp,relHumid,solarFlux,battery";

/// A reading on day `day` of March 2015 at `hour`.
pub fn reading(day: u32, hour: u32, temp: f64, rain: f64, wind_dir: f64) -> Record {
    let date_time = parse_date_time(&format!("2015/03/{:02} {:02}:00", day, hour)).unwrap();
    let fields: BTreeMap<String, f64> = [
        ("surfTemp", temp),
        ("rainfall", rain),
        ("windDir", wind_dir),
        ("solarFlux", temp * 10.0),
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

/// CSV line in the JCMB column layout.
pub fn csv_line(date_time: &str, rain: f64, wind_dir: f64, temp: f64, flux: f64) -> String {
    format!(
        "{},1000,{},2.5,{},{},80,{},13.2",
        date_time, rain, wind_dir, temp, flux
    )
}
