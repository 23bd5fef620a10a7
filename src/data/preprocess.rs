//! Cleaning steps applied to the raw observation table.
//!
//! The steps run in a fixed order (see [`preprocess_table`]): header
//! normalisation, condition consolidation and encoding, zero-as-missing,
//! imputation, wind direction to degrees. Unknown labels are passed through
//! unchanged.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::data::table::{ColumnData, Table};
use crate::utils::median;

/// Remove the underscores in a column name
pub fn remove_underscores(name: &str) -> String {
    name.replace('_', "")
}

/// Remove the spaces in a column name
pub fn remove_spaces(name: &str) -> String {
    name.replace(' ', "")
}

/// A canonical condition label and the raw descriptions it absorbs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionCategory {
    pub label: String,
    pub synonyms: Vec<String>,
}

impl ConditionCategory {
    pub fn new(label: &str, synonyms: &[&str]) -> Self {
        ConditionCategory {
            label: label.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Ordered mapping from canonical labels to raw synonyms.
///
/// Lists should be disjoint; when a raw value appears under several labels
/// the last one wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionCategories(pub Vec<ConditionCategory>);

impl Default for ConditionCategories {
    /// The six categories used for the Delhi observations
    fn default() -> Self {
        ConditionCategories(vec![
            ConditionCategory::new("Dust", &["Widespread Dust", "Blowing Sand", "Sandstorm", "Volcanic Ash", "Light Sandstorm"]),
            ConditionCategory::new(
                "Fog",
                &["Fog", "Shallow Fog", "Partial Fog", "Light Fog", "Mist", "Heavy Fog", "Light Haze", "Patches of Fog"],
            ),
            ConditionCategory::new("Cloudy", &["Scattered Clouds", "Partly Cloudy", "Mostly Cloudy", "Overcast", "Funnel Cloud"]),
            ConditionCategory::new(
                "Rain",
                &["Light Rain", "Light Drizzle", "Rain", "Drizzle", "Light Rain Showers", "Drizzle", "Rain Showers"],
            ),
            ConditionCategory::new(
                "Thunderstorms",
                &["Thunderstorms and Rain", "Light Thunderstorms and Rain", "Light Thunderstorm", "Heavy Thunderstorms and Rain", "Heavy Rain"],
            ),
            ConditionCategory::new(
                "Others",
                &["Thunderstorms with Hail", "Squalls", "Light Hail Showers", "Light Freezing Rain", "Heavy Thunderstorms with Hail", "Unknown"],
            ),
        ])
    }
}

impl ConditionCategories {
    /// Raw value -> label lookup, later categories overwriting earlier ones
    pub fn lookup(&self) -> HashMap<&str, &str> {
        let mut lookup = HashMap::new();
        for category in &self.0 {
            for synonym in &category.synonyms {
                lookup.insert(synonym.as_str(), category.label.as_str());
            }
        }
        lookup
    }
}

/// Rewrites the condition column to canonical labels
pub fn generalize_conditions(table: &mut Table, condition_column: &str, categories: &ConditionCategories) {
    let lookup = categories.lookup();
    let Some(column) = table.column_mut(condition_column) else {
        warn!("Condition column '{}' not found, skipping consolidation", condition_column);
        return;
    };
    let ColumnData::Text(values) = &mut column.data else {
        warn!("Condition column '{}' is not text, skipping consolidation", condition_column);
        return;
    };

    let mut unmapped = 0;
    for value in values.iter_mut().flatten() {
        match lookup.get(value.as_str()) {
            Some(label) => *value = label.to_string(),
            None => unmapped += 1,
        }
    }
    debug!("{} condition values kept their original label", unmapped);
}

/// Label used for a missing condition when encoding
const MISSING_LABEL: &str = "nan";

/// Replaces the column with dense integer codes assigned in first-seen order.
///
/// Missing cells are encoded as their own category. Returns the labels indexed
/// by code, or `None` if the column does not exist or is already numeric.
pub fn cond_to_numeric(table: &mut Table, column_name: &str) -> Option<Vec<String>> {
    let column = table.column_mut(column_name)?;
    let ColumnData::Text(values) = &column.data else {
        warn!("Column '{}' is already numeric, not re-encoding", column_name);
        return None;
    };

    let mut codes: HashMap<String, usize> = HashMap::new();
    let mut labels = Vec::new();
    let encoded = values
        .iter()
        .map(|value| {
            let label = value.as_deref().unwrap_or(MISSING_LABEL);
            let code = *codes.entry(label.to_string()).or_insert_with(|| {
                labels.push(label.to_string());
                labels.len() - 1
            });
            Some(code as f64)
        })
        .collect();

    column.data = ColumnData::Numeric(encoded);
    Some(labels)
}

/// Every numeric cell exactly equal to zero becomes missing.
///
/// Zero is taken to be an invalid reading for every measured field, so
/// genuine zeros (and the first condition code) are blanked too.
pub fn zero_to_nan(table: &mut Table) {
    for column in table.columns_mut() {
        if let ColumnData::Numeric(values) = &mut column.data {
            for value in values.iter_mut() {
                if *value == Some(0.0) {
                    *value = None;
                }
            }
        }
    }
}

/// Most frequent value; ties go to the lexicographically smallest
fn mode(values: &[Option<String>]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values.iter().flatten() {
        *counts.entry(value.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(value, _)| value.to_string())
}

/// Drops columns whose missing count reaches `threshold * rows`, fills the
/// rest with the column median (numeric) or mode (text).
///
/// Returns the names of the dropped columns.
pub fn replace_nan(table: &mut Table, threshold: f64) -> Vec<String> {
    let limit = threshold * table.num_rows() as f64;
    let mut dropped = Vec::new();

    for column in table.columns_mut() {
        let missing = column.data.missing_count();
        if (missing as f64) >= limit {
            dropped.push(column.name.clone());
            continue;
        }
        if missing == 0 {
            continue;
        }

        match &mut column.data {
            ColumnData::Numeric(values) => {
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                let fill = median(&present);
                debug!("Filling {} missing values in '{}' with median {:?}", missing, column.name, fill);
                for value in values.iter_mut().filter(|v| v.is_none()) {
                    *value = fill;
                }
            }
            ColumnData::Text(values) => {
                let fill = mode(values);
                debug!("Filling {} missing values in '{}' with mode {:?}", missing, column.name, fill);
                for value in values.iter_mut().filter(|v| v.is_none()) {
                    *value = fill.clone();
                }
            }
        }
    }

    if !dropped.is_empty() {
        info!("Dropped {} mostly-missing columns: {:?}", dropped.len(), dropped);
    }
    table.retain_columns(|c| !dropped.contains(&c.name));
    dropped
}

/// 16-point compass abbreviations folded onto the 8-point names
const COMPASS_16_TO_8: [(&str, &str); 9] = [
    ("WNW", "West"),
    ("WSW", "West"),
    ("ESE", "East"),
    ("ENE", "East"),
    ("NNW", "North"),
    ("SSE", "South"),
    ("NNE", "North"),
    ("SSW", "South"),
    ("Variable", "North"),
];

/// The 8 cardinal names in degree order
pub const CARDINAL_DIRECTIONS: [&str; 8] = ["North", "NE", "East", "SE", "South", "SW", "West", "NW"];

/// Degree value of a compass label, `None` for anything unrecognised
pub fn direction_to_degrees(label: &str, step: u32) -> Option<u32> {
    let cardinal = COMPASS_16_TO_8
        .iter()
        .find(|(from, _)| *from == label)
        .map_or(label, |(_, to)| *to);
    CARDINAL_DIRECTIONS
        .iter()
        .position(|name| *name == cardinal)
        .map(|i| step * i as u32)
}

/// Converts the wind direction column to degrees (`step * i` for the i-th
/// cardinal direction).
///
/// The column becomes numeric when every present value converts; otherwise
/// converted cells are stored as degree strings and the rest kept as they
/// were. A numeric column is left untouched, so the conversion is idempotent.
pub fn wind_dir_to_deg(table: &mut Table, column_name: &str, step: u32) {
    let Some(column) = table.column_mut(column_name) else {
        warn!("Wind direction column '{}' not found, skipping conversion", column_name);
        return;
    };
    let ColumnData::Text(values) = &column.data else {
        return;
    };

    let converted: Vec<Option<Result<u32, String>>> = values
        .iter()
        .map(|value| {
            value
                .as_deref()
                .map(|label| direction_to_degrees(label, step).ok_or_else(|| label.to_string()))
        })
        .collect();

    let unmapped = converted.iter().flatten().filter(|c| c.is_err()).count();
    column.data = if unmapped == 0 {
        ColumnData::Numeric(converted.into_iter().map(|c| c.and_then(Result::ok).map(f64::from)).collect())
    } else {
        warn!("{} wind direction values could not be mapped to degrees", unmapped);
        ColumnData::Text(
            converted
                .into_iter()
                .map(|c| c.map(|r| r.map_or_else(|label| label, |deg| deg.to_string())))
                .collect(),
        )
    };
}

/// Options of the cleaning stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub condition_column: String,
    pub wind_direction_column: String,
    pub degree_step: u32,
    pub missing_threshold: f64,
    pub categories: ConditionCategories,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            condition_column: "conds".to_string(),
            wind_direction_column: "wdire".to_string(),
            degree_step: 45,
            missing_threshold: 0.5,
            categories: ConditionCategories::default(),
        }
    }
}

/// Runs every cleaning step in order on a raw table
pub fn preprocess_table(mut table: Table, config: &PreprocessConfig) -> Table {
    table.rename_columns(remove_underscores);
    table.rename_columns(remove_spaces);

    generalize_conditions(&mut table, &config.condition_column, &config.categories);
    if let Some(labels) = cond_to_numeric(&mut table, &config.condition_column) {
        debug!("Encoded {} condition categories: {:?}", labels.len(), labels);
    }
    zero_to_nan(&mut table);
    replace_nan(&mut table, config.missing_threshold);
    wind_dir_to_deg(&mut table, &config.wind_direction_column, config.degree_step);

    info!(
        "Cleaned table has {} rows and {} columns",
        table.num_rows(),
        table.num_columns()
    );
    table
}
