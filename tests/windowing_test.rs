mod common;

use ndarray::s;
use tempfile::tempdir;
use weather_lstm::data::daily::{daily_means, MinMaxScaler};
use weather_lstm::data::windowing::{sliding_windows, window_count};
use weather_lstm::pipeline::run_preprocess;
use weather_lstm::{DatasetConfig, ForecastError, PreprocessConfig};

#[test]
fn test_thirty_five_days_yield_five_windows() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    let processed = dir.path().join("processed.csv");
    common::write_raw_observations(&raw, 35);
    let table = run_preprocess(&raw, &processed, &PreprocessConfig::default()).unwrap();

    let config = DatasetConfig::default();
    let series = daily_means(&table, &config).unwrap();
    assert_eq!(series.len(), 35);

    let (_, scaled) = MinMaxScaler::fit_transform(&series.values);
    assert!(scaled.iter().all(|v| (0.0..=1.0).contains(v)));

    let target = series.feature_index("tempm").unwrap();
    let windows = sliding_windows(scaled.view(), target, config.window_size).unwrap();
    assert_eq!(windows.len(), window_count(35, 30));
    assert_eq!(windows.len(), 5);

    for i in 0..windows.len() {
        assert_eq!(windows.inputs.slice(s![i, .., ..]), scaled.slice(s![i..i + 30, ..]));
        assert_eq!(windows.labels[i], scaled[[i + 30, target]]);
    }

    let (train, test) = windows.split_at(config.split_index).unwrap();
    assert_eq!((train.len(), test.len()), (5, 0));
}

#[test]
fn test_short_series_is_rejected() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    common::write_raw_observations(&raw, 30);
    let table = run_preprocess(&raw, dir.path().join("p.csv"), &PreprocessConfig::default()).unwrap();

    let series = daily_means(&table, &DatasetConfig::default()).unwrap();
    let result = sliding_windows(series.values.view(), 0, 30);
    assert!(matches!(result, Err(ForecastError::WindowTooLarge { window: 30, len: 30 })));
}

#[test]
fn test_window_count_property() {
    for n in 0..50 {
        for w in 1..40 {
            assert_eq!(window_count(n, w), n.saturating_sub(w));
            if w < n {
                let series = ndarray::Array2::<f64>::zeros((n, 2));
                assert_eq!(sliding_windows(series.view(), 0, w).unwrap().len(), n - w);
            }
        }
    }
}
