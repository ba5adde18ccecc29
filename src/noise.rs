use ndarray::{Array3, Zip, s};
use rand::Rng;
use rand::seq::index;

use crate::errors::EvaluationError;
use crate::types::Feature;

/// Exchange support feature vectors between classes to simulate mislabeled support examples.
///
/// Each of the `n_swaps` draws picks two distinct classes and, independently,
/// one support position (`< n_shot`) in each, then swaps the two vectors.
/// Draws are independent, so a later swap may revisit or undo an earlier
/// one. Query rows and per-class counts are never touched.
pub fn apply_label_swaps<R: Rng + ?Sized>(
    data: &mut Array3<Feature>,
    n_swaps: usize,
    n_shot: usize,
    rng: &mut R,
) -> Result<(), EvaluationError> {
    if n_swaps == 0 {
        return Ok(());
    }
    let (n_way, per_class, _) = data.dim();
    if n_way < 2 {
        return Err(EvaluationError::Configuration(format!(
            "label swaps need at least 2 classes, episode has {n_way}"
        )));
    }
    if n_shot == 0 || n_shot > per_class {
        return Err(EvaluationError::Configuration(format!(
            "label swaps need 1..={per_class} support positions, got n_shot={n_shot}"
        )));
    }
    for _ in 0..n_swaps {
        let classes = index::sample(rng, n_way, 2);
        let (first_class, second_class) = (classes.index(0), classes.index(1));
        let first_pos = rng.random_range(0..n_shot);
        let second_pos = rng.random_range(0..n_shot);
        let (mut first, mut second) = data.multi_slice_mut((
            s![first_class, first_pos, ..],
            s![second_class, second_pos, ..],
        ));
        Zip::from(&mut first)
            .and(&mut second)
            .for_each(|left, right| std::mem::swap(left, right));
    }
    Ok(())
}
