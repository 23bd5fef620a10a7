#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use weather_lstm::{ModelConfig, TrainingConfig};

/// A model small enough to train in milliseconds
pub fn small_model_config(window_size: usize, num_features: usize) -> ModelConfig {
    ModelConfig {
        window_size,
        num_features,
        conv1_filters: 3,
        conv2_filters: 3,
        conv3_filters: 4,
        lstm_units: 4,
        lstm_layers: 1,
        dropout: 0.0,
        bilstm_units: 3,
        dense_units: 5,
        ..ModelConfig::default()
    }
}

pub fn quick_training(epochs: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size: 8,
        shuffle: false,
        seed: Some(1),
        learning_rate: 1e-2,
        early_stopping: None,
        checkpoint_path: None,
        ..TrainingConfig::default()
    }
}

/// Two readings per day for `days` days, in the layout of the Delhi export
pub fn write_raw_observations(path: &Path, days: i64) {
    let conditions = ["Haze", "Mist", "Light Rain", "Haze", "Scattered Clouds"];
    let winds = ["North", "NNW", "East", "SE", "WSW", "Variable"];
    let start = NaiveDate::from_ymd_opt(1996, 11, 1).unwrap();

    let mut file = File::create(path).unwrap();
    writeln!(file, "datetime_utc, _conds, _tempm, _hum, _snow, _wdire").unwrap();
    for day in 0..days {
        let date = start + Duration::days(day);
        for (i, hour) in ["06:00", "18:00"].iter().enumerate() {
            let row = (day * 2) as usize + i;
            // The very first condition is one that never repeats
            let cond = if row == 0 { "Smoke" } else { conditions[row % conditions.len()] };
            let temp = 20.0 + (day as f64 * 0.4).sin() * 5.0 + i as f64;
            let hum = 50 + (row % 7) as i64;
            writeln!(
                file,
                "{}-{},{},{:.1},{},,{}",
                date.format("%Y%m%d"),
                hour,
                cond,
                temp,
                hum,
                winds[row % winds.len()]
            )
            .unwrap();
        }
    }
}
