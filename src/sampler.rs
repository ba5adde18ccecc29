use ndarray::{Array3, s};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::TaskShape;
use crate::episode::Episode;
use crate::errors::EvaluationError;
use crate::noise::apply_label_swaps;
use crate::pool::FeaturePool;
use crate::types::ClassLabel;

/// Public sampling interface: one fresh episode per call, no state carried between episodes.
pub trait Sampler {
    /// Draw the next episode.
    fn next_episode(&mut self) -> Result<Episode, EvaluationError>;
}

/// Draw one balanced task from `pool`.
///
/// Classes are chosen uniformly without replacement from the pool's
/// first-occurrence order; their draw order becomes the episode class index.
/// Within each class a uniform permutation of the instances is taken and its
/// first `n_shot + n_query` entries kept, so no instance repeats inside a
/// class.
pub fn sample_episode<R: Rng + ?Sized>(
    pool: &FeaturePool,
    shape: TaskShape,
    rng: &mut R,
) -> Result<Episode, EvaluationError> {
    shape.validate()?;
    let labels: Vec<ClassLabel> = pool.labels().collect();
    if labels.len() < shape.n_way {
        return Err(EvaluationError::InsufficientClasses {
            requested: shape.n_way,
            available: labels.len(),
        });
    }
    let selected: Vec<ClassLabel> = partial_permutation(labels.len(), shape.n_way, rng)
        .into_iter()
        .map(|idx| labels[idx])
        .collect();

    let per_class = shape.per_class();
    let mut data = Array3::zeros((shape.n_way, per_class, pool.feature_dim()));
    for (class_idx, label) in selected.iter().enumerate() {
        let instances = pool.instances(*label).unwrap_or_default();
        if instances.len() < per_class {
            return Err(EvaluationError::InsufficientInstances {
                label: *label,
                requested: per_class,
                available: instances.len(),
            });
        }
        let picks = partial_permutation(instances.len(), per_class, rng);
        for (pos, instance_idx) in picks.into_iter().enumerate() {
            data.slice_mut(s![class_idx, pos, ..]).assign(&instances[instance_idx]);
        }
    }
    Ok(Episode::from_parts(selected, data, shape))
}

/// First `amount` entries of a uniform random permutation of `0..len`.
fn partial_permutation<R: Rng + ?Sized>(len: usize, amount: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order.truncate(amount);
    order
}

/// Sampler over a fixed feature pool that also injects support label swaps.
///
/// Owns the run's single RNG; the pool is only ever read.
pub struct EpisodeSampler<'a, R: Rng> {
    pool: &'a FeaturePool,
    shape: TaskShape,
    n_swaps: usize,
    rng: R,
}

impl<'a, R: Rng> EpisodeSampler<'a, R> {
    /// Create a sampler for `shape` episodes with `n_swaps` support swaps each.
    pub fn new(pool: &'a FeaturePool, shape: TaskShape, n_swaps: usize, rng: R) -> Self {
        Self {
            pool,
            shape,
            n_swaps,
            rng,
        }
    }

    /// Task shape of every episode.
    pub fn shape(&self) -> TaskShape {
        self.shape
    }

    /// Support swaps applied to every episode.
    pub fn n_swaps(&self) -> usize {
        self.n_swaps
    }
}

impl<R: Rng> Sampler for EpisodeSampler<'_, R> {
    fn next_episode(&mut self) -> Result<Episode, EvaluationError> {
        let mut episode = sample_episode(self.pool, self.shape, &mut self.rng)?;
        apply_label_swaps(
            episode.data_mut(),
            self.n_swaps,
            self.shape.n_shot,
            &mut self.rng,
        )?;
        Ok(episode)
    }
}
