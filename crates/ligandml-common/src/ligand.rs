//! Ligand datasets: SMILES strings paired with measured potency.
//!
//! Files use the header `smiles,standard_value`. Untested ligands carry an
//! empty value column. Models are fit on the log-compressed target produced by
//! [`log_standard_value`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LigandError, Result};

/// Scale applied after `ln(1 + v)` when compressing standard values.
pub const LOG_SCALE: f64 = 0.125;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LigandRecord {
    pub smiles: String,
    pub standard_value: Option<f64>,
}

impl LigandRecord {
    pub fn tested(smiles: impl Into<String>, standard_value: f64) -> Self {
        Self { smiles: smiles.into(), standard_value: Some(standard_value) }
    }

    pub fn untested(smiles: impl Into<String>) -> Self {
        Self { smiles: smiles.into(), standard_value: None }
    }
}

pub fn log_standard_value(value: f64) -> f64 {
    LOG_SCALE * value.ln_1p()
}

pub fn standard_value_from_log(log_value: f64) -> f64 {
    (log_value / LOG_SCALE).exp_m1()
}

/// Read a ligand CSV. Rows with an empty SMILES column are rejected.
pub fn read_ligands(path: impl AsRef<Path>) -> Result<Vec<LigandRecord>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;

    let headers = reader.headers()?.clone();
    for column in ["smiles", "standard_value"] {
        if !headers.iter().any(|h| h == column) {
            return Err(LigandError::MissingColumn(column.to_string()));
        }
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<LigandRecord>() {
        let record = row.map_err(|e| LigandError::InvalidRecord {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        if record.smiles.trim().is_empty() {
            return Err(LigandError::InvalidRecord {
                line: records.len() as u64 + 2,
                reason: "empty smiles".to_string(),
            });
        }
        records.push(record);
    }

    debug!(path = %path.as_ref().display(), count = records.len(), "Read ligand dataset");
    Ok(records)
}

pub fn write_ligands(path: impl AsRef<Path>, records: &[LigandRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_transform_inverts() {
        for v in [0.0, 1.0, 12.5, 850.0] {
            let back = standard_value_from_log(log_standard_value(v));
            assert!((back - v).abs() < 1e-9 * v.max(1.0), "{v} -> {back}");
        }
        assert_eq!(log_standard_value(0.0), 0.0);
    }

    #[test]
    fn test_write_then_read_keeps_untested_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1_test.csv");
        let records = vec![
            LigandRecord::tested("CC(=O)OC1=CC=CC=C1C(=O)O", 12.0),
            LigandRecord::untested("c1ccccc1"),
        ];
        write_ligands(&path, &records).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("smiles,standard_value\n"));
        assert!(text.contains("c1ccccc1,\n"));

        assert_eq!(read_ligands(&path).unwrap(), records);
    }

    #[test]
    fn test_bad_value_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "smiles,standard_value\nCCO,1.5\nCCN,abc\n").unwrap();

        match read_ligands(&path) {
            Err(LigandError::InvalidRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected invalid record, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cols.csv");
        std::fs::write(&path, "smiles\nCCO\n").unwrap();
        assert!(matches!(read_ligands(&path), Err(LigandError::MissingColumn(c)) if c == "standard_value"));
    }

    #[test]
    fn test_missing_file_surfaces_csv_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_ligands(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, LigandError::Csv(_)));
        assert!(err.to_string().starts_with("CSV error"));
    }
}
