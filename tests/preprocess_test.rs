mod common;

use tempfile::tempdir;
use weather_lstm::data::preprocess::{replace_nan, wind_dir_to_deg, zero_to_nan};
use weather_lstm::data::table::{Column, ColumnData};
use weather_lstm::pipeline::run_preprocess;
use weather_lstm::{PreprocessConfig, Table};

#[test]
fn test_replace_nan_leaves_no_gaps_and_respects_threshold() {
    let rows = 10;
    let columns: Vec<Column> = (0..=rows)
        .map(|missing| {
            let values = (0..rows).map(|r| if r < missing { None } else { Some(r as f64 + 1.0) }).collect();
            Column::numeric(format!("m{}", missing), values)
        })
        .collect();
    let mut table = Table::new(columns).unwrap();

    let dropped = replace_nan(&mut table, 0.5);

    // Columns with 5 or more missing cells out of 10 are dropped
    assert_eq!(dropped, vec!["m5", "m6", "m7", "m8", "m9", "m10"]);
    assert_eq!(table.column_names(), vec!["m0", "m1", "m2", "m3", "m4"]);
    for column in table.columns() {
        assert_eq!(column.data.missing_count(), 0, "{} still has gaps", column.name);
    }
}

#[test]
fn test_temperature_and_wind_example() {
    let mut table = Table::new(vec![
        Column::numeric("temp", vec![Some(0.0), Some(10.0)]),
        Column::text("wdire", vec![Some("NNW".to_string()), Some("SE".to_string())]),
    ])
    .unwrap();

    zero_to_nan(&mut table);
    replace_nan(&mut table, 0.5);
    wind_dir_to_deg(&mut table, "wdire", 45);

    assert_eq!(table.column_names(), vec!["wdire"]);
    assert_eq!(table.column("wdire").unwrap().data, ColumnData::Numeric(vec![Some(0.0), Some(135.0)]));
}

#[test]
fn test_run_preprocess_writes_clean_csv() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("testset.csv");
    let out_path = dir.path().join("out").join("processed.csv");
    common::write_raw_observations(&raw_path, 10);

    let cleaned = run_preprocess(&raw_path, &out_path, &PreprocessConfig::default()).unwrap();

    assert_eq!(cleaned.num_rows(), 20);
    assert_eq!(cleaned.column_names(), vec!["datetimeutc", "conds", "tempm", "hum", "wdire"]);
    assert!(cleaned.columns().iter().all(|c| c.data.missing_count() == 0));

    let degrees = cleaned.numeric("wdire").unwrap();
    assert!(degrees.iter().flatten().all(|d| [0.0, 90.0, 135.0, 270.0].contains(d)));

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(written.lines().next(), Some("datetimeutc,conds,tempm,hum,wdire"));
    assert_eq!(written.lines().count(), 21);

    let reread = Table::read_csv(&out_path).unwrap();
    assert_eq!(reread.numeric("tempm").unwrap(), cleaned.numeric("tempm").unwrap());
}

#[test]
fn test_run_preprocess_missing_input() {
    let dir = tempdir().unwrap();
    let result = run_preprocess(dir.path().join("absent.csv"), dir.path().join("out.csv"), &PreprocessConfig::default());
    assert!(result.is_err());
}
