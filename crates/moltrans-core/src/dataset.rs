//! Tabular dataset abstraction and the in-memory data frame behind it.
//!
//! The pipeline only needs row/column counts, headers, typed cell access and
//! the declared value range of a column. `TabularDataset` is that seam;
//! `DataFrame` is the implementation used by the CLI and the tests.

use crate::errors::{Result, TransitionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl CellValue {
    /// Numeric view of the cell, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Text(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// Column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Categorical(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ColumnData::Categorical(_))
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub header: String,
    pub data: ColumnData,
}

impl Column {
    pub fn float(header: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            header: header.into(),
            data: ColumnData::Float(values),
        }
    }

    pub fn int(header: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            header: header.into(),
            data: ColumnData::Int(values),
        }
    }

    pub fn categorical(header: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            header: header.into(),
            data: ColumnData::Categorical(values),
        }
    }
}

/// Collaborator contract for the tabular data the pipeline reads.
pub trait TabularDataset {
    /// Number of rows (members)
    fn rows(&self) -> usize;

    /// Number of columns
    fn cols(&self) -> usize;

    /// Header of column `col`
    fn header(&self, col: usize) -> &str;

    /// Typed cell at (row, col)
    fn cell(&self, row: usize, col: usize) -> CellValue;

    /// Whether column `col` holds numbers
    fn is_numeric(&self, col: usize) -> bool;

    /// Declared value range of a numeric column; `None` when the column is
    /// empty or not numeric
    fn value_range(&self, col: usize) -> Option<(f64, f64)> {
        if !self.is_numeric(col) {
            return None;
        }
        let mut range: Option<(f64, f64)> = None;
        for row in 0..self.rows() {
            if let Some(v) = self.cell(row, col).as_f64() {
                if v.is_nan() {
                    continue;
                }
                range = Some(match range {
                    None => (v, v),
                    Some((lo, hi)) => (lo.min(v), hi.max(v)),
                });
            }
        }
        range
    }

    /// Index of the column whose lower-cased header equals `name` lower-cased
    fn find_column(&self, name: &str) -> Option<usize> {
        let wanted = name.to_lowercase();
        (0..self.cols()).find(|&col| self.header(col).to_lowercase() == wanted)
    }

    /// Like `find_column`, failing with `MissingColumn`
    fn require_column(&self, name: &str) -> Result<usize> {
        self.find_column(name)
            .ok_or_else(|| TransitionError::missing_column(name))
    }

    /// All values of a numeric column
    fn numeric_values(&self, col: usize) -> Result<Vec<f64>> {
        (0..self.rows())
            .map(|row| {
                self.cell(row, col)
                    .as_f64()
                    .ok_or_else(|| TransitionError::NonNumericColumn(self.header(col).to_string()))
            })
            .collect()
    }
}

/// In-memory column-oriented table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl DataFrame {
    /// Empty frame with no columns
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from columns, all of which must have the same length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut frame = Self::new();
        for column in columns {
            frame.add_column(column)?;
        }
        Ok(frame)
    }

    /// Append a column. The first column fixes the row count.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.data.len() != self.n_rows {
            return Err(TransitionError::config(format!(
                "column '{}' has {} rows, frame has {}",
                column.header,
                column.data.len(),
                self.n_rows
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = column.data.len();
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn add_float_column(&mut self, header: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.add_column(Column::float(header, values))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, col: usize) -> Option<&Column> {
        self.columns.get(col)
    }

    /// Overwrite a cell. The value must fit the column type.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> Result<()> {
        let n_rows = self.n_rows;
        let column = self
            .columns
            .get_mut(col)
            .ok_or_else(|| TransitionError::config(format!("column index {} out of range", col)))?;
        if row >= n_rows {
            return Err(TransitionError::config(format!(
                "row index {} out of range ({} rows)",
                row, n_rows
            )));
        }
        match (&mut column.data, value) {
            (ColumnData::Float(v), CellValue::Float(x)) => v[row] = x,
            (ColumnData::Float(v), CellValue::Int(x)) => v[row] = x as f64,
            (ColumnData::Int(v), CellValue::Int(x)) => v[row] = x,
            (ColumnData::Categorical(v), CellValue::Text(s)) => v[row] = s,
            (_, value) => {
                return Err(TransitionError::config(format!(
                    "cannot store {:?} in column '{}'",
                    value, column.header
                )))
            }
        }
        Ok(())
    }

    /// Load a CSV file with a header row. Columns whose cells all parse as
    /// integers become `Int`, all-numeric ones `Float`, the rest `Categorical`.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (col, cells) in raw.iter_mut().enumerate() {
                cells.push(record.get(col).unwrap_or("").to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(header, cells)| infer_column(header, cells))
            .collect();
        let frame = Self::from_columns(columns)?;
        log::debug!(
            "Loaded {} rows x {} columns from {}",
            frame.rows(),
            frame.cols(),
            path.display()
        );
        Ok(frame)
    }

    /// Write the frame as CSV with a header row
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.columns.iter().map(|c| c.header.as_str()))?;
        for row in 0..self.n_rows {
            writer.write_record((0..self.cols()).map(|col| self.cell(row, col).to_string()))?;
        }
        writer.flush().map_err(|e| TransitionError::io(path, e))?;
        Ok(())
    }
}

fn infer_column(header: String, cells: Vec<String>) -> Column {
    if !cells.is_empty() {
        if let Ok(ints) = cells.iter().map(|c| c.parse::<i64>()).collect::<std::result::Result<Vec<_>, _>>() {
            return Column::int(header, ints);
        }
        if let Ok(floats) = cells.iter().map(|c| c.parse::<f64>()).collect::<std::result::Result<Vec<_>, _>>() {
            return Column::float(header, floats);
        }
    }
    Column::categorical(header, cells)
}

impl TabularDataset for DataFrame {
    fn rows(&self) -> usize {
        self.n_rows
    }

    fn cols(&self) -> usize {
        self.columns.len()
    }

    fn header(&self, col: usize) -> &str {
        &self.columns[col].header
    }

    fn cell(&self, row: usize, col: usize) -> CellValue {
        match &self.columns[col].data {
            ColumnData::Float(v) => CellValue::Float(v[row]),
            ColumnData::Int(v) => CellValue::Int(v[row]),
            ColumnData::Categorical(v) => CellValue::Text(v[row].clone()),
        }
    }

    fn is_numeric(&self, col: usize) -> bool {
        self.columns[col].data.is_numeric()
    }
}
