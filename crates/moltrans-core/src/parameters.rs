//! Excited-state parameter files.
//!
//! One state per line, whitespace separated:
//! `name energy_ev wavelength_nm oscillator_strength rotatory_strength`.

use crate::dataset::{Column, DataFrame};
use crate::errors::{Result, TransitionError};
use std::path::Path;

/// Parse parameter-file text into a data frame with the columns
/// `Name`, `Energy (eV)`, `Wavelength (nm)`, `Oscillatory strength`,
/// `Rotatory strength`. Blank lines are skipped.
pub fn parse_parameters(text: &str, source_name: &str) -> Result<DataFrame> {
    let mut names = Vec::new();
    let mut numeric: [Vec<f64>; 4] = Default::default();

    for (idx, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 5 {
            return Err(TransitionError::parse(
                source_name,
                idx + 1,
                format!("expected 5 fields, found {}", fields.len()),
            ));
        }
        names.push(fields[0].to_string());
        for (slot, raw) in numeric.iter_mut().zip(&fields[1..5]) {
            let value = raw.parse::<f64>().map_err(|_| {
                TransitionError::parse(source_name, idx + 1, format!("'{}' is not a number", raw))
            })?;
            slot.push(value);
        }
    }

    let [energy, wavelength, osc, rot] = numeric;
    DataFrame::from_columns(vec![
        Column::categorical("Name", names),
        Column::float("Energy (eV)", energy),
        Column::float("Wavelength (nm)", wavelength),
        Column::float("Oscillatory strength", osc),
        Column::float("Rotatory strength", rot),
    ])
}

/// Read a parameter file from disk. An empty path yields an empty frame;
/// a path that cannot be read is an `Io` error.
pub fn read_parameters(path: &Path) -> Result<DataFrame> {
    if path.as_os_str().is_empty() {
        return Ok(DataFrame::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| TransitionError::io(path, e))?;
    parse_parameters(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{CellValue, TabularDataset};

    #[test]
    fn test_parse_parameters() {
        let text = "S1   4.52 274.3 0.0120 -3.1\n\nS2 4.90 253.0 0.1 2.5\n";
        let df = parse_parameters(text, "params.txt").unwrap();
        assert_eq!(df.rows(), 2);
        assert_eq!(df.cols(), 5);
        assert_eq!(df.cell(1, 0), CellValue::Text("S2".into()));
        assert_eq!(df.cell(0, 4), CellValue::Float(-3.1));
    }

    #[test]
    fn test_short_line_rejected() {
        let err = parse_parameters("S1 4.52 274.3\n", "params.txt").unwrap_err();
        assert!(matches!(err, TransitionError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = parse_parameters("S1 4.52 x 0.1 0.2\n", "p").unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_read_parameters_paths() {
        let empty = read_parameters(Path::new("")).unwrap();
        assert_eq!(empty.rows(), 0);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.txt");
        assert!(matches!(
            read_parameters(&missing),
            Err(TransitionError::Io { .. })
        ));

        let file = dir.path().join("params.txt");
        std::fs::write(&file, "S1 4.52 274.3 0.0120 -3.1\n").unwrap();
        assert_eq!(read_parameters(&file).unwrap().rows(), 1);
    }
}
