use crate::crossfilter::{Crossfilter, DimensionHandle, FilterStats, GroupHandle};
use crate::dimension::Filter;
use crate::error::{DashboardError, Result};
use crate::polar::{ChartUpdate, PolarChart};
use crate::reducer::{Average, Count, Sum};
use crate::structs::{DashboardConfig, Record, SnapshotRow, WIND_BUCKETS};
use crate::transform::{day_ceil, extent, week_index};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};

/// Compass labels of the wind-direction buckets, in bucket order.
pub const COMPASS_LABELS: [&str; WIND_BUCKETS] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// The sensor dashboard: one aggregation session plus the dimensions and
/// groups behind each chart.
///
/// - time chart: average temperature per day, brushable
/// - rainfall chart: rainfall total per week, grouped on the day dimension
///   so the time brush leaves it whole as the brushing overview
/// - wind rose: reading count per wind-direction bucket
/// - solar flux chart: reading count per whole W/m²
#[derive(Debug)]
pub struct Dashboard {
    session: Crossfilter,
    extent: (NaiveDateTime, NaiveDateTime),
    wind_rose: PolarChart,
    pub day: DimensionHandle<i32>,
    pub wind: DimensionHandle<u8>,
    pub solar_flux: DimensionHandle<i64>,
    pub day_temperature: GroupHandle<i32, Average>,
    pub week_rainfall: GroupHandle<i32, Sum>,
    pub wind_counts: GroupHandle<u8, Count>,
    pub solar_flux_counts: GroupHandle<i64, Count>,
}

impl Dashboard {
    /// Indexes `records` and builds every chart's group.
    ///
    /// # Errors
    /// Returns `DashboardError::DataLoad` when there is nothing to index.
    pub fn new(records: Vec<Record>, config: DashboardConfig) -> Result<Self> {
        let extent = extent(&records)
            .ok_or_else(|| DashboardError::DataLoad("no records to index".to_string()))?;
        let columns = config.columns.clone();
        let mut session = Crossfilter::new(records);

        let day = session.dimension("day", |r| r.day)?;
        let wind = session.dimension("wind", |r| r.wind_bucket)?;
        let flux_column = columns.solar_flux.clone();
        let solar_flux = session.dimension("solar flux", move |r| {
            r.value(&flux_column).round() as i64
        })?;

        let day_temperature =
            session.group("temperature", &day, Average::of(columns.temperature.clone()))?;
        let week_rainfall = session.group_by(
            "rainfall",
            &day,
            |day| week_index(*day),
            Sum::of(columns.rainfall.clone()),
        )?;
        let wind_counts = session.group("wind direction", &wind, Count)?;
        let solar_flux_counts = session.group("solar flux", &solar_flux, Count)?;
        info!(
            "Dashboard indexed {} records from {} to {}",
            session.size(),
            extent.0,
            extent.1
        );

        let wind_rose = PolarChart::new(config.polar);
        Ok(Self {
            session,
            extent,
            wind_rose,
            day,
            wind,
            solar_flux,
            day_temperature,
            week_rainfall,
            wind_counts,
            solar_flux_counts,
        })
    }

    pub fn session(&self) -> &Crossfilter {
        &self.session
    }

    /// Earliest and latest reading, the time chart's x domain.
    pub fn extent(&self) -> (NaiveDateTime, NaiveDateTime) {
        self.extent
    }

    pub fn on_filtered(&mut self, listener: impl FnMut() + 'static) {
        self.session.on_filtered(listener);
    }

    /// Brushes the time chart over `[from, to)`.
    ///
    /// A day is selected when its midnight falls inside the brush. A brush
    /// with `from == to` clears the selection.
    pub fn brush_time(&mut self, from: NaiveDateTime, to: NaiveDateTime) -> Result<FilterStats> {
        if from == to {
            return self.clear_time_brush();
        }
        let (from, to) = if from < to { (from, to) } else { (to, from) };
        let lo = day_ceil(&from);
        let hi = day_ceil(&to);
        debug!("Time brush {} .. {} selects day keys [{}, {})", from, to, lo, hi);
        self.session.set_filter(&self.day, Some(Filter::Range { lo, hi }))
    }

    pub fn clear_time_brush(&mut self) -> Result<FilterStats> {
        self.session.set_filter(&self.day, None)
    }

    /// Restricts the wind rose to the given buckets; an empty slice clears it.
    pub fn select_wind_buckets(&mut self, buckets: &[u8]) -> Result<FilterStats> {
        if let Some(bad) = buckets.iter().find(|b| **b as usize >= WIND_BUCKETS) {
            return Err(DashboardError::InvariantViolation(format!(
                "wind bucket {} is outside [0, {})",
                bad, WIND_BUCKETS
            )));
        }
        let filter = if buckets.is_empty() {
            None
        } else {
            Some(buckets.iter().copied().collect::<Filter<u8>>())
        };
        self.session.set_filter(&self.wind, filter)
    }

    /// Clears every brush on the dashboard.
    pub fn clear_all(&mut self) -> Result<()> {
        self.session.filter_all()
    }

    /// Reading count per wind bucket, always all eight buckets.
    pub fn wind_rose_values(&self) -> Result<[f64; WIND_BUCKETS]> {
        let mut values = [0.0; WIND_BUCKETS];
        for (bucket, count) in self.session.all(&self.wind_counts)? {
            values[bucket as usize] = count as f64;
        }
        Ok(values)
    }

    /// Re-reads the wind group and patches the wind rose geometry.
    pub fn redraw_wind_rose(&mut self) -> Result<ChartUpdate> {
        let values = self.wind_rose_values()?;
        Ok(self.wind_rose.update(&values))
    }

    pub fn wind_rose(&self) -> &PolarChart {
        &self.wind_rose
    }

    /// Wind rose as a standalone SVG document, sectors titled by compass point.
    pub fn wind_rose_svg(&self) -> String {
        self.wind_rose.geometry().to_svg(&COMPASS_LABELS)
    }

    /// Current state of every group, flattened for export.
    pub fn snapshot(&self) -> Result<Vec<SnapshotRow>> {
        let mut rows = Vec::new();

        for (day, avg) in self.session.all(&self.day_temperature)? {
            rows.push(SnapshotRow {
                group: "temperature".to_string(),
                key: day_label(day),
                value: avg.avg,
                count: Some(avg.count),
            });
        }
        for (week, total) in self.session.all(&self.week_rainfall)? {
            rows.push(SnapshotRow {
                group: "rainfall".to_string(),
                key: day_label(week * 7),
                value: total,
                count: None,
            });
        }
        let wind = self.wind_rose_values()?;
        for (bucket, count) in wind.iter().enumerate() {
            rows.push(SnapshotRow {
                group: "wind direction".to_string(),
                key: COMPASS_LABELS[bucket].to_string(),
                value: *count,
                count: Some(*count as u64),
            });
        }
        for (flux, count) in self.session.all(&self.solar_flux_counts)? {
            rows.push(SnapshotRow {
                group: "solar flux".to_string(),
                key: flux.to_string(),
                value: count as f64,
                count: Some(count),
            });
        }
        Ok(rows)
    }
}

fn day_label(day: i32) -> String {
    NaiveDate::from_num_days_from_ce_opt(day)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| day.to_string())
}
