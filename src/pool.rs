use indexmap::IndexMap;
use ndarray::{Array1, ArrayView2};

use crate::data::FeatureSet;
use crate::errors::EvaluationError;
use crate::types::{ClassLabel, Feature};

/// Precomputed feature vectors grouped by class label.
///
/// Classes iterate in order of first occurrence in the source rows, which is
/// also the order the sampler draws from. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct FeaturePool {
    classes: IndexMap<ClassLabel, Vec<Array1<Feature>>>,
    feature_dim: usize,
}

impl FeaturePool {
    /// Group aligned rows by label after stripping trailing all-zero padding rows.
    ///
    /// Trimming stops at the last row with any non-zero value, so a genuine
    /// all-zero vector in the middle of the data survives, but one at the very
    /// end is indistinguishable from padding and is dropped.
    pub fn from_features(
        features: ArrayView2<'_, Feature>,
        labels: &[ClassLabel],
    ) -> Result<Self, EvaluationError> {
        if features.nrows() != labels.len() {
            return Err(EvaluationError::FeatureAlignment {
                features: features.nrows(),
                labels: labels.len(),
            });
        }
        let kept = trimmed_len(features);
        let mut classes: IndexMap<ClassLabel, Vec<Array1<Feature>>> = IndexMap::new();
        for (row, label) in features.outer_iter().zip(labels).take(kept) {
            classes.entry(*label).or_default().push(row.to_owned());
        }
        Ok(Self {
            classes,
            feature_dim: features.ncols(),
        })
    }

    /// Convenience wrapper over [`FeaturePool::from_features`].
    pub fn from_feature_set(set: &FeatureSet) -> Result<Self, EvaluationError> {
        Self::from_features(set.features.view(), &set.labels)
    }

    /// Number of distinct classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Total number of retained instances across classes.
    pub fn num_instances(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    /// True when no class survived trimming.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Dimension of every feature vector.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Class labels in first-occurrence order.
    pub fn labels(&self) -> impl Iterator<Item = ClassLabel> + '_ {
        self.classes.keys().copied()
    }

    /// Instances of `label`, in source order.
    pub fn instances(&self, label: ClassLabel) -> Option<&[Array1<Feature>]> {
        self.classes.get(&label).map(Vec::as_slice)
    }

    /// Size of the smallest class, if any.
    pub fn min_class_size(&self) -> Option<usize> {
        self.classes.values().map(Vec::len).min()
    }
}

/// Row count once trailing all-zero rows are removed.
fn trimmed_len(features: ArrayView2<'_, Feature>) -> usize {
    let mut kept = features.nrows();
    while kept > 0 && features.row(kept - 1).iter().all(|value| *value == 0.0) {
        kept -= 1;
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn rows_with_trailing_padding(total: usize, padding: usize) -> Array2<Feature> {
        Array2::from_shape_fn((total, 4), |(row, col)| {
            if row >= total - padding {
                0.0
            } else {
                (row * 4 + col + 1) as Feature
            }
        })
    }

    #[test]
    fn trims_only_trailing_zero_rows() {
        let features = rows_with_trailing_padding(10, 3);
        let labels: Vec<ClassLabel> = (0..10).map(|idx| idx % 2).collect();
        let pool = FeaturePool::from_features(features.view(), &labels).unwrap();
        assert_eq!(pool.num_instances(), 7);
        assert_eq!(pool.instances(0).unwrap().len(), 4);
        assert_eq!(pool.instances(1).unwrap().len(), 3);
    }

    #[test]
    fn keeps_interior_zero_rows() {
        let mut features = rows_with_trailing_padding(6, 1);
        features.row_mut(2).fill(0.0);
        let labels = vec![5, 5, 5, 6, 6, 6];
        let pool = FeaturePool::from_features(features.view(), &labels).unwrap();
        assert_eq!(pool.num_instances(), 5);
        assert!(pool.instances(5).unwrap()[2].iter().all(|value| *value == 0.0));
        assert_eq!(pool.min_class_size(), Some(2));
    }

    #[test]
    fn all_padding_yields_empty_pool() {
        let features = Array2::<Feature>::zeros((5, 3));
        let labels = vec![1, 2, 3, 4, 5];
        let pool = FeaturePool::from_features(features.view(), &labels).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.num_classes(), 0);
        assert_eq!(pool.min_class_size(), None);
    }

    #[test]
    fn classes_follow_first_occurrence_order() {
        let features = rows_with_trailing_padding(6, 0);
        let labels = vec![42, 7, 42, 19, 7, 19];
        let pool = FeaturePool::from_features(features.view(), &labels).unwrap();
        assert_eq!(pool.labels().collect::<Vec<_>>(), vec![42, 7, 19]);
        assert_eq!(pool.instances(7).unwrap().len(), 2);
        assert_eq!(pool.instances(7).unwrap()[1][0], 17.0);
        assert!(pool.instances(8).is_none());
    }

    #[test]
    fn misaligned_inputs_are_reported() {
        let features = rows_with_trailing_padding(4, 0);
        let err = FeaturePool::from_features(features.view(), &[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::FeatureAlignment {
                features: 4,
                labels: 3
            }
        ));
    }
}
