//! A small column-oriented table read from and written to CSV.
//!
//! Cells are either numeric or text; `None` marks a missing value. Column
//! types are inferred on load: a column is numeric when every non-missing
//! cell parses as `f64`.

use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use log::debug;

use crate::error::{ForecastError, Result};

/// Cell strings treated as missing when reading
pub const MISSING_TOKENS: [&str; 6] = ["", "NA", "N/A", "NaN", "nan", "null"];

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn missing_count(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    fn cell_to_string(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(values) => values[row].map(format_number).unwrap_or_default(),
            ColumnData::Text(values) => values[row].clone().unwrap_or_default(),
        }
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        match self {
            ColumnData::Numeric(values) => retain_by_mask(values, keep),
            ColumnData::Text(values) => retain_by_mask(values, keep),
        }
    }
}

fn retain_by_mask<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut flags = keep.iter();
    values.retain(|_| *flags.next().unwrap_or(&false));
}

/// Integers are written without a trailing `.0`
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Column { name: name.into(), data: ColumnData::Numeric(values) }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Column { name: name.into(), data: ColumnData::Text(values) }
    }

    /// Infers the column type from raw cells
    fn from_raw(name: String, cells: Vec<Option<String>>) -> Self {
        let parsed: Option<Vec<Option<f64>>> = cells
            .iter()
            .map(|cell| match cell {
                None => Some(None),
                Some(text) => text.trim().parse::<f64>().ok().map(Some),
            })
            .collect();

        match parsed {
            Some(values) => Column::numeric(name, values),
            None => Column::text(name, cells),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            if let Some(bad) = columns.iter().find(|c| c.data.len() != rows) {
                return Err(ForecastError::InvalidConfig(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.data.len(),
                    rows
                )));
            }
        }
        Ok(Table { columns })
    }

    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ForecastError::Io { path: path.to_path_buf(), source })?;
        let csv_err = |source| ForecastError::Csv { path: path.to_path_buf(), source };

        // Ragged rows are padded with missing cells instead of failing
        let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(file);
        let headers: Vec<String> = reader.headers().map_err(csv_err)?.iter().map(str::to_string).collect();

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            for (i, column) in cells.iter_mut().enumerate() {
                let cell = record.get(i).filter(|value| !MISSING_TOKENS.contains(&value.trim()));
                column.push(cell.map(str::to_string));
            }
        }

        let columns: Vec<Column> = headers.into_iter().zip(cells).map(|(name, raw)| Column::from_raw(name, raw)).collect();
        debug!("Read {} columns from {}", columns.len(), path.display());
        Table::new(columns)
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ForecastError::Io { path: parent.to_path_buf(), source })?;
        }
        let csv_err = |source| ForecastError::Csv { path: path.to_path_buf(), source };

        let mut writer = WriterBuilder::new().from_path(path).map_err(csv_err)?;
        writer.write_record(self.column_names()).map_err(csv_err)?;
        for row in 0..self.num_rows() {
            writer
                .write_record(self.columns.iter().map(|c| c.data.cell_to_string(row)))
                .map_err(csv_err)?;
        }
        writer.flush().map_err(|source| ForecastError::Io { path: path.to_path_buf(), source })?;
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Numeric values of a column, or an error naming what is wrong
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Ok(values),
            Some(ColumnData::Text(_)) => Err(ForecastError::NonNumericColumn(name.to_string())),
            None => Err(ForecastError::MissingColumn(name.to_string())),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[Option<String>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Text(values)) => Ok(values),
            Some(ColumnData::Numeric(_)) => Err(ForecastError::InvalidConfig(format!("column '{}' is not text", name))),
            None => Err(ForecastError::MissingColumn(name.to_string())),
        }
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(index))
    }

    pub fn retain_columns<F: FnMut(&Column) -> bool>(&mut self, keep: F) {
        self.columns.retain(keep);
    }

    /// Keeps the rows whose flag is `true`
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            column.data.retain_rows(keep);
        }
    }

    /// Applies a header transform such as [`remove_underscores`](crate::data::preprocess::remove_underscores)
    pub fn rename_columns<F: Fn(&str) -> String>(&mut self, rename: F) {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_csv_infers_types_and_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "datetime_utc, _tempm, _conds").unwrap();
        writeln!(file, "19961101-11:00,30,Smoke").unwrap();
        writeln!(file, "19961101-12:00,,Haze").unwrap();
        writeln!(file, "19961101-13:00,28.5,N/A").unwrap();
        drop(file);

        let table = Table::read_csv(&path).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), vec!["datetime_utc", " _tempm", " _conds"]);
        assert_eq!(table.numeric(" _tempm").unwrap(), &[Some(30.0), None, Some(28.5)]);
        assert_eq!(table.text(" _conds").unwrap()[2], None);
        assert!(matches!(table.numeric("datetime_utc"), Err(ForecastError::NonNumericColumn(_))));
        assert!(matches!(table.numeric("nope"), Err(ForecastError::MissingColumn(_))));
    }

    #[test]
    fn test_write_then_read_preserves_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let table = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), None, Some(2.5)]),
            Column::text("b", vec![Some("x".into()), Some("y".into()), None]),
        ])
        .unwrap();

        table.write_csv(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("a,b\n1,x\n"));

        let reread = Table::read_csv(&path).unwrap();
        assert_eq!(reread, table);
    }

    #[test]
    fn test_mismatched_column_lengths_are_rejected() {
        let result = Table::new(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("b", vec![Some(1.0), Some(2.0)]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_retain_rows() {
        let mut table = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0), Some(3.0)]),
            Column::text("b", vec![Some("x".into()), None, Some("z".into())]),
        ])
        .unwrap();
        table.retain_rows(&[true, false, true]);
        assert_eq!(table.numeric("a").unwrap(), &[Some(1.0), Some(3.0)]);
        assert_eq!(table.text("b").unwrap(), &[Some("x".to_string()), Some("z".to_string())]);
    }
}
