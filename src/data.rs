use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::EvaluationError;
use crate::types::{ClassLabel, Feature};

/// Aligned feature rows and labels produced by upstream embedding extraction.
///
/// Rows may end with all-zero padding; [`crate::pool::FeaturePool`] strips it.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
    /// One row per instance, shape `(instances, feature_dim)`.
    pub features: Array2<Feature>,
    /// One label per row.
    pub labels: Vec<ClassLabel>,
}

/// On-disk JSON layout of a [`FeatureSet`].
#[derive(Debug, Serialize, Deserialize)]
struct FeatureSetFile {
    features: Vec<Vec<Feature>>,
    labels: Vec<ClassLabel>,
}

impl FeatureSet {
    /// Wrap rows and labels without checking alignment.
    pub fn new(features: Array2<Feature>, labels: Vec<ClassLabel>) -> Self {
        Self { features, labels }
    }

    /// Build from nested rows; every row must share one dimension.
    pub fn from_rows(
        rows: Vec<Vec<Feature>>,
        labels: Vec<ClassLabel>,
    ) -> Result<Self, EvaluationError> {
        let instances = rows.len();
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != dim) {
            return Err(EvaluationError::Serialization(format!(
                "feature row {idx} has dimension {} but row 0 has {dim}",
                row.len()
            )));
        }
        let flat: Vec<Feature> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((instances, dim), flat)
            .map_err(|err| EvaluationError::Serialization(err.to_string()))?;
        Ok(Self { features, labels })
    }

    /// Load `{"features": [[...], ...], "labels": [...]}` from a JSON file.
    pub fn from_json_path(path: &Path) -> Result<Self, EvaluationError> {
        let file: FeatureSetFile = read_json(path)?;
        Self::from_rows(file.features, file.labels)
    }

    /// Number of rows, padding included.
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trained model handed over by the training step.
///
/// `state` is opaque here; `epoch` only shows up in the result log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelState<S = serde_json::Value> {
    /// Trained parameter set.
    pub state: S,
    /// Training epoch the parameters were saved at.
    pub epoch: i64,
}

impl<S: DeserializeOwned> ModelState<S> {
    /// Load `{"epoch": N, "state": ...}` from a JSON file.
    pub fn from_json_path(path: &Path) -> Result<Self, EvaluationError> {
        read_json(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EvaluationError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|err| {
        EvaluationError::Serialization(format!("failed to parse {}: {err}", path.display()))
    })
}
