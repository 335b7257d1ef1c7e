//! Price series model and the CSV series loader.
//!
//! A [`Series`] is the cleaned input of every pipeline step: strictly
//! ascending unix timestamps paired with finite closing prices. The loader
//! mirrors the daily pipeline's formatting step: it reads a flat table with
//! `timestamp` and `close` columns, drops rows with missing values and sorts
//! by time before validating.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// Opaque location of a stored price table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation(String);

impl StorageLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for StorageLocation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-indexed, ascending, null-free numeric series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    timestamps: Vec<i64>,
    values: Vec<f64>,
}

impl Series {
    /// Build a series, validating ordering and finiteness.
    pub fn new(timestamps: Vec<i64>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if timestamps.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        if values.is_empty() {
            return Err(SeriesError::Empty);
        }
        for (i, (&ts, &v)) in timestamps.iter().zip(values.iter()).enumerate() {
            if !v.is_finite() {
                return Err(SeriesError::NonFiniteValue { timestamp: ts, value: v });
            }
            if i > 0 && ts <= timestamps[i - 1] {
                return Err(SeriesError::NotAscending { index: i });
            }
        }
        Ok(Self { timestamps, values })
    }

    /// Series with consecutive integer timestamps, starting at 0.
    pub fn from_values(values: Vec<f64>) -> Result<Self, SeriesError> {
        let timestamps = (0..values.len() as i64).collect();
        Self::new(timestamps, values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time span covered by the series, for logging and run metadata.
    pub fn window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let first = self.timestamps.first().and_then(|&t| DateTime::from_timestamp(t, 0));
        let last = self.timestamps.last().and_then(|&t| DateTime::from_timestamp(t, 0));
        (first, last)
    }

    /// Load the table stored at `location`.
    ///
    /// Only local tables are understood: a plain path or a `file://` URI.
    pub fn load(location: &StorageLocation) -> Result<Self, SeriesError> {
        let raw = location.as_str();
        let path = raw.strip_prefix("file://").unwrap_or(raw);
        Self::from_csv_path(Path::new(path))
    }

    /// Load a series from a CSV file with `timestamp` (unix seconds) and
    /// `close` columns.
    pub fn from_csv_path(path: &Path) -> Result<Self, SeriesError> {
        let file = File::open(path).map_err(|source| SeriesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_csv_reader(file)
    }

    /// Load a series from any CSV source. Rows with an empty or unparsable
    /// timestamp/close cell are dropped; the rest are sorted by time.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, SeriesError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let ts_idx = column_index(&headers, "timestamp")?;
        let close_idx = column_index(&headers, "close")?;

        let mut rows: Vec<(i64, f64)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let ts = record.get(ts_idx).and_then(parse_timestamp);
            let close = record
                .get(close_idx)
                .and_then(|c| c.parse::<f64>().ok())
                .filter(|c| c.is_finite());
            if let (Some(ts), Some(close)) = (ts, close) {
                rows.push((ts, close));
            }
        }

        rows.sort_by_key(|&(ts, _)| ts);
        let (timestamps, values): (Vec<i64>, Vec<f64>) = rows.into_iter().unzip();
        Self::new(timestamps, values)
    }
}

fn column_index(headers: &csv::StringRecord, name: &'static str) -> Result<usize, SeriesError> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or(SeriesError::MissingColumn(name))
}

/// Accepts integer or float-formatted unix seconds (`1700000000` or
/// `1700000000.0`), as written by dataframe exports.
fn parse_timestamp(cell: &str) -> Option<i64> {
    if let Ok(ts) = cell.parse::<i64>() {
        return Some(ts);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .map(|t| t as i64)
}
