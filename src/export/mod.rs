//! Brain export module for persisting evolved brains.
//!
//! A [`BrainSnapshot`] carries the topology and every weight and bias of an
//! [`AgentBrain`] together with a schema version, so that brains written by one
//! build can be validated before another build loads them. Context memory is
//! runtime state and is not persisted.

use crate::brain::{AgentBrain, Topology};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current schema version written into every snapshot
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to access brain file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to (de)serialize brain JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Malformed brain snapshot: {0}")]
    Malformed(String),
}

/// Canonical persisted shape of a brain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BrainSnapshot {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Unix timestamp when the snapshot was taken
    pub exported_at: i64,
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub weights1: Vec<Vec<f64>>,
    pub biases1: Vec<f64>,
    pub weights2: Vec<Vec<f64>>,
    pub biases2: Vec<f64>,
}

impl BrainSnapshot {
    pub fn from_brain(brain: &AgentBrain) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            exported_at: chrono::Utc::now().timestamp(),
            input_size: brain.input_size,
            hidden_size: brain.hidden_size,
            output_size: brain.output_size,
            weights1: brain.weights1.clone(),
            biases1: brain.biases1.clone(),
            weights2: brain.weights2.clone(),
            biases2: brain.biases2.clone(),
        }
    }

    /// Checks the version and every dimension, then rebuilds the brain.
    pub fn into_brain(self) -> Result<AgentBrain, ExportError> {
        if self.schema_version == 0 || self.schema_version > SCHEMA_VERSION {
            return Err(ExportError::UnsupportedVersion {
                found: self.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        check_matrix("weights1", &self.weights1, self.hidden_size, self.input_size)?;
        check_len("biases1", self.biases1.len(), self.hidden_size)?;
        check_matrix("weights2", &self.weights2, self.output_size, self.hidden_size)?;
        check_len("biases2", self.biases2.len(), self.output_size)?;

        let all_finite = [&self.biases1, &self.biases2]
            .into_iter()
            .flatten()
            .chain(self.weights1.iter().flatten())
            .chain(self.weights2.iter().flatten())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ExportError::Malformed("non-finite parameter".to_string()));
        }

        Ok(AgentBrain::from_parts(
            Topology {
                input_size: self.input_size,
                hidden_size: self.hidden_size,
                output_size: self.output_size,
            },
            self.weights1,
            self.biases1,
            self.weights2,
            self.biases2,
        ))
    }
}

fn check_len(name: &str, found: usize, expected: usize) -> Result<(), ExportError> {
    if found != expected {
        return Err(ExportError::Malformed(format!(
            "{} has length {}, expected {}",
            name, found, expected
        )));
    }
    Ok(())
}

fn check_matrix(name: &str, matrix: &[Vec<f64>], rows: usize, cols: usize) -> Result<(), ExportError> {
    check_len(name, matrix.len(), rows)?;
    for (i, row) in matrix.iter().enumerate() {
        check_len(&format!("{}[{}]", name, i), row.len(), cols)?;
    }
    Ok(())
}

pub fn brain_to_json(brain: &AgentBrain) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&BrainSnapshot::from_brain(brain))?)
}

pub fn brain_from_json(json: &str) -> Result<AgentBrain, ExportError> {
    let snapshot: BrainSnapshot = serde_json::from_str(json)?;
    snapshot.into_brain()
}

/// Writes a brain snapshot to a JSON file.
pub fn write_brain_to_json(brain: &AgentBrain, output_path: &Path) -> Result<(), ExportError> {
    std::fs::write(output_path, brain_to_json(brain)?)?;
    Ok(())
}

/// Reads and validates a brain snapshot from a JSON file.
pub fn read_brain_from_json(input_path: &Path) -> Result<AgentBrain, ExportError> {
    let content = std::fs::read_to_string(input_path)?;
    brain_from_json(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use tempfile::NamedTempFile;

    fn test_brain() -> AgentBrain {
        AgentBrain::with_rng(3, 4, 2, &mut SmallRng::seed_from_u64(5))
    }

    #[test]
    fn test_write_and_read_file() {
        let brain = test_brain();
        let file = NamedTempFile::new().unwrap();
        write_brain_to_json(&brain, file.path()).unwrap();

        let loaded = read_brain_from_json(file.path()).unwrap();
        assert_eq!(loaded, brain);
    }

    #[test]
    fn test_every_parameter_survives_json_exactly() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let mut brain = AgentBrain::with_rng(3, 4, 2, &mut rng);
            brain.self_modify();
            let loaded = brain_from_json(&brain_to_json(&brain).unwrap()).unwrap();
            let changed = brain
                .parameters()
                .zip(loaded.parameters())
                .filter(|(a, b)| a.to_bits() != b.to_bits())
                .count();
            assert_eq!(changed, 0);
        }
    }

    #[test]
    fn test_loaded_brain_starts_with_empty_context() {
        let mut brain = test_brain();
        brain.process_input(&[0.1, 0.2, 0.3]).unwrap();
        let loaded = brain_from_json(&brain_to_json(&brain).unwrap()).unwrap();
        assert_eq!(loaded.context_len(), 0);
        assert_eq!(loaded.topology(), brain.topology());
    }

    #[test]
    fn test_snapshot_has_canonical_fields() {
        let json = brain_to_json(&test_brain()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "schema_version",
            "input_size",
            "hidden_size",
            "output_size",
            "weights1",
            "biases1",
            "weights2",
            "biases2",
        ] {
            assert!(value.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_rejects_future_version() {
        let mut snapshot = BrainSnapshot::from_brain(&test_brain());
        snapshot.schema_version = SCHEMA_VERSION + 1;
        assert!(matches!(
            snapshot.into_brain(),
            Err(ExportError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_rejects_dimension_mismatch() {
        let mut snapshot = BrainSnapshot::from_brain(&test_brain());
        snapshot.weights1[2].pop();
        assert!(matches!(snapshot.into_brain(), Err(ExportError::Malformed(_))));

        let mut snapshot = BrainSnapshot::from_brain(&test_brain());
        snapshot.output_size = 3;
        assert!(matches!(snapshot.into_brain(), Err(ExportError::Malformed(_))));
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(brain_from_json("{\"input_size\": 3"), Err(ExportError::Json(_))));
    }
}
