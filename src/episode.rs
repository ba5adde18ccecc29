use ndarray::{Array3, ArrayView3, s};

use crate::config::TaskShape;
use crate::types::{ClassIndex, ClassLabel, Feature};

/// One sampled N-way K-shot task.
///
/// `data` is laid out `(n_way, n_shot + n_query, feature_dim)`: along axis 1
/// the first `n_shot` rows of each class are support, the rest are query.
/// Query ground truth is implicit in the class axis, see
/// [`Episode::query_labels`].
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    classes: Vec<ClassLabel>,
    data: Array3<Feature>,
    shape: TaskShape,
}

impl Episode {
    /// Wrap an already stacked tensor.
    ///
    /// Callers guarantee `data.dim() == (classes.len(), shape.per_class(), _)`.
    pub(crate) fn from_parts(
        classes: Vec<ClassLabel>,
        data: Array3<Feature>,
        shape: TaskShape,
    ) -> Self {
        debug_assert_eq!(data.dim().0, classes.len());
        debug_assert_eq!(data.dim().1, shape.per_class());
        Self {
            classes,
            data,
            shape,
        }
    }

    /// Pool labels of the selected classes; position is the episode class index.
    pub fn classes(&self) -> &[ClassLabel] {
        &self.classes
    }

    /// Task shape this episode was sampled with.
    pub fn shape(&self) -> TaskShape {
        self.shape
    }

    /// Dimension of each feature vector.
    pub fn feature_dim(&self) -> usize {
        self.data.dim().2
    }

    /// Full stacked tensor.
    pub fn data(&self) -> ArrayView3<'_, Feature> {
        self.data.view()
    }

    /// Mutable stacked tensor, used to inject support label noise.
    pub(crate) fn data_mut(&mut self) -> &mut Array3<Feature> {
        &mut self.data
    }

    /// Support region `(n_way, n_shot, feature_dim)`.
    pub fn support(&self) -> ArrayView3<'_, Feature> {
        self.data.slice(s![.., ..self.shape.n_shot, ..])
    }

    /// Query region `(n_way, n_query, feature_dim)`.
    pub fn query(&self) -> ArrayView3<'_, Feature> {
        self.data.slice(s![.., self.shape.n_shot.., ..])
    }

    /// Ground-truth query labels: each class index repeated `n_query` times, in class order.
    pub fn query_labels(&self) -> Vec<ClassIndex> {
        query_labels(self.shape)
    }
}

/// `[0; n_query] ++ [1; n_query] ++ … ++ [n_way - 1; n_query]`.
pub fn query_labels(shape: TaskShape) -> Vec<ClassIndex> {
    (0..shape.n_way)
        .flat_map(|class_idx| std::iter::repeat_n(class_idx, shape.n_query))
        .collect()
}
