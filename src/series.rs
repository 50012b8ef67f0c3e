//! Hourly AQI time series and the CSV ingestion helpers that produce them.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::features::EnvironmentalReading;

/// Ordered (timestamp, AQI) observations for one location.
///
/// Timestamps are strictly increasing and values are finite and
/// non-negative; both are checked on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl TimeSeries {
    pub fn new(points: Vec<(DateTime<Utc>, f64)>) -> Result<Self, CoreError> {
        for (i, (ts, value)) in points.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(CoreError::MalformedSeries(format!(
                    "value {value} at {ts} is not a non-negative number"
                )));
            }
            if i > 0 && points[i - 1].0 >= *ts {
                return Err(CoreError::MalformedSeries(format!(
                    "timestamp {ts} does not follow {}",
                    points[i - 1].0
                )));
            }
        }
        Ok(Self { points })
    }

    /// Build an hourly series from bare values, starting at `start`.
    pub fn from_values(start: DateTime<Utc>, values: &[f64]) -> Result<Self, CoreError> {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::hours(i as i64), *v))
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(DateTime<Utc>, f64)] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|(ts, _)| *ts)
    }

    /// Bucket observations to the hour and fill missing hours.
    ///
    /// Each bucket holds the mean of its observations. Hours with no
    /// observation between two populated buckets are linearly interpolated.
    pub fn resample_hourly(&self) -> Result<Self, CoreError> {
        let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
        for (ts, value) in &self.points {
            let hour = ts
                .duration_trunc(Duration::hours(1))
                .map_err(|e| CoreError::MalformedSeries(e.to_string()))?;
            let entry = buckets.entry(hour).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }

        let hourly: Vec<(DateTime<Utc>, f64)> = buckets
            .into_iter()
            .map(|(hour, (sum, count))| (hour, sum / count as f64))
            .collect();

        let mut points = Vec::with_capacity(hourly.len());
        let mut filled = 0usize;
        for pair in hourly.windows(2) {
            let (t1, v1) = pair[0];
            let (t2, v2) = pair[1];
            points.push((t1, v1));

            let gap_hours = (t2 - t1).num_hours();
            for h in 1..gap_hours {
                let t = h as f64 / gap_hours as f64;
                points.push((t1 + Duration::hours(h), v1 + t * (v2 - v1)));
                filled += 1;
            }
        }
        if let Some(last) = hourly.last() {
            points.push(*last);
        }

        if filled > 0 {
            debug!(filled, "interpolated missing hours");
        }
        Self::new(points)
    }
}

/// One row of a readings CSV.
///
/// Only `timestamp`, `location` and `aqi` are required.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingRecord {
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub aqi: f64,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub pressure: Option<f64>,
    pub visibility: Option<f64>,
}

impl ReadingRecord {
    /// Environmental reading for this row.
    ///
    /// PM2.5 is required by the Feature Builder; `None` when it is absent.
    pub fn environmental_reading(&self) -> Option<EnvironmentalReading> {
        Some(EnvironmentalReading {
            aqi: self.aqi,
            pm25: self.pm25?,
            pm10: self.pm10,
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            pressure: self.pressure,
            visibility: self.visibility,
        })
    }
}

/// Parse every record from CSV input.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<ReadingRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for (line, row) in csv_reader.deserialize().enumerate() {
        let record: ReadingRecord =
            row.with_context(|| format!("Failed to parse CSV record {}", line + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Load all records for `location` from a CSV file, sorted by time.
pub fn load_location_records(path: &Path, location: &str) -> Result<Vec<ReadingRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open readings file {}", path.display()))?;
    let mut records: Vec<ReadingRecord> = read_records(file)?
        .into_iter()
        .filter(|r| r.location.eq_ignore_ascii_case(location))
        .collect();
    records.sort_by_key(|r| r.timestamp);
    Ok(records)
}

/// Hourly AQI series for a location's records.
pub fn series_from_records(records: &[ReadingRecord]) -> Result<TimeSeries, CoreError> {
    // Duplicate timestamps are merged by the hourly bucketing, so only the
    // ordering requirement is relaxed here.
    let mut raw: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for record in records {
        let entry = raw.entry(record.timestamp).or_insert((0.0, 0));
        entry.0 += record.aqi;
        entry.1 += 1;
    }
    let points = raw
        .into_iter()
        .map(|(ts, (sum, count))| (ts, sum / count as f64))
        .collect();
    TimeSeries::new(points)?.resample_hourly()
}
