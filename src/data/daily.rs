//! Timestamp parsing, per-day averaging and min-max scaling.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::config::DatasetConfig;
use crate::data::table::Table;
use crate::error::{ForecastError, Result};

/// Parses the timestamp column; unparsable or missing cells give `None`
pub fn parse_timestamps(table: &Table, column: &str, format: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let cells = table.text(column)?;
    let parsed: Vec<Option<NaiveDateTime>> = cells
        .iter()
        .map(|cell| {
            cell.as_deref()
                .and_then(|text| NaiveDateTime::parse_from_str(text.trim(), format).ok())
        })
        .collect();

    let failed = parsed.iter().filter(|t| t.is_none()).count();
    if failed > 0 {
        warn!("Skipping {} rows with unparsable timestamps in '{}'", failed, column);
    }
    Ok(parsed)
}

/// One row per observed calendar day, features in columns
#[derive(Clone, Debug, PartialEq)]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub feature_names: Vec<String>,
    /// `(days, features)`
    pub values: Array2<f64>,
}

impl DailySeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn feature_index(&self, name: &str) -> Result<usize> {
        self.feature_names
            .iter()
            .position(|f| f == name)
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }
}

/// Numeric feature columns used for training, in table order
fn feature_columns(table: &Table, config: &DatasetConfig) -> Result<Vec<String>> {
    match &config.feature_columns {
        Some(names) => {
            for name in names {
                table.numeric(name)?;
            }
            Ok(names.clone())
        }
        None => Ok(table
            .columns()
            .iter()
            .filter(|c| c.name != config.datetime_column && c.data.is_numeric())
            .map(|c| c.name.clone())
            .collect()),
    }
}

/// Averages every feature over the rows of each calendar day.
///
/// A day without any value for a feature takes the previous day's mean, or
/// the next available one at the start of the series.
pub fn daily_means(table: &Table, config: &DatasetConfig) -> Result<DailySeries> {
    let timestamps = parse_timestamps(table, &config.datetime_column, &config.datetime_format)?;
    let feature_names = feature_columns(table, config)?;
    if feature_names.is_empty() {
        return Err(ForecastError::EmptyDataset("no numeric feature columns".to_string()));
    }

    let columns: Vec<&[Option<f64>]> = feature_names
        .iter()
        .map(|name| table.numeric(name))
        .collect::<Result<_>>()?;

    // (sum, count) per feature
    let mut days: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();
    for (row, timestamp) in timestamps.iter().enumerate() {
        let Some(timestamp) = timestamp else { continue };
        let sums = days
            .entry(timestamp.date())
            .or_insert_with(|| vec![(0.0, 0); feature_names.len()]);
        for (acc, column) in sums.iter_mut().zip(&columns) {
            if let Some(value) = column[row] {
                acc.0 += value;
                acc.1 += 1;
            }
        }
    }

    let dates: Vec<NaiveDate> = days.keys().copied().collect();
    let (Some(first), Some(last)) = (dates.first(), dates.last()) else {
        return Err(ForecastError::EmptyDataset("no rows with a valid timestamp".to_string()));
    };
    let span = (*last - *first).num_days() as usize + 1;
    if span > dates.len() {
        warn!("{} calendar days between {} and {} have no observations", span - dates.len(), first, last);
    }

    let mut values = Array2::zeros((dates.len(), feature_names.len()));
    for (f, name) in feature_names.iter().enumerate() {
        let means: Vec<Option<f64>> = days
            .values()
            .map(|sums| {
                let (sum, count) = sums[f];
                (count > 0).then(|| sum / count as f64)
            })
            .collect();
        let filled = fill_gaps(&means).ok_or_else(|| ForecastError::EmptyDataset(format!("feature '{}' has no values", name)))?;
        values.column_mut(f).assign(&Array1::from(filled));
    }

    info!("Aggregated {} rows into {} days of {} features", table.num_rows(), dates.len(), feature_names.len());
    Ok(DailySeries { dates, feature_names, values })
}

/// Forward fill, then back fill the leading gap. `None` when nothing is present.
fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|value| {
                if let Some(v) = value {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

/// Per-feature min-max scaling into `[0, 1]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit on `(rows, features)` data
    pub fn fit(data: &Array2<f64>) -> Self {
        let mut mins = vec![f64::INFINITY; data.ncols()];
        let mut maxs = vec![f64::NEG_INFINITY; data.ncols()];
        for row in data.rows() {
            for (i, &value) in row.iter().enumerate() {
                mins[i] = mins[i].min(value);
                maxs[i] = maxs[i].max(value);
            }
        }
        debug!("Fitted min-max scaler over {} features", data.ncols());
        MinMaxScaler { mins, maxs }
    }

    fn scale(value: f64, min: f64, max: f64) -> f64 {
        let range = max - min;
        if range > 0.0 {
            (value - min) / range
        } else {
            0.0
        }
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let mut scaled = data.clone();
        for (i, mut column) in scaled.columns_mut().into_iter().enumerate() {
            let (min, max) = (self.mins[i], self.maxs[i]);
            column.mapv_inplace(|v| Self::scale(v, min, max));
        }
        scaled
    }

    pub fn fit_transform(data: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(data);
        let scaled = scaler.transform(data);
        (scaler, scaled)
    }

    /// Maps scaled values of one feature back to physical units
    pub fn inverse_transform_column(&self, values: ArrayView1<f64>, feature: usize) -> Array1<f64> {
        let (min, max) = (self.mins[feature], self.maxs[feature]);
        values.mapv(|v| v * (max - min) + min)
    }
}
