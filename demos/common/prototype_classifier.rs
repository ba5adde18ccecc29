use fewshot_eval::classifier::{ClassifierFactory, ClassifierSpec, FewShotClassifier};
use fewshot_eval::{EvaluationError, Feature};
use ndarray::{Array2, ArrayView3, Axis, s};
use serde_json::Value;

/// Scores each query by negative squared distance to the class mean of the support set.
pub struct NearestPrototype {
    n_query: usize,
}

impl FewShotClassifier for NearestPrototype {
    fn set_n_query(&mut self, n_query: usize) {
        self.n_query = n_query;
    }

    fn set_forward(
        &mut self,
        episode: ArrayView3<'_, Feature>,
    ) -> Result<Array2<f32>, EvaluationError> {
        let (n_way, per_class, dim) = episode.dim();
        let n_shot = per_class.checked_sub(self.n_query).ok_or_else(|| {
            EvaluationError::Classifier(format!(
                "episode has {per_class} instances per class, fewer than n_query={}",
                self.n_query
            ))
        })?;
        let prototypes = episode
            .slice(s![.., ..n_shot, ..])
            .mean_axis(Axis(1))
            .ok_or_else(|| EvaluationError::Classifier("empty support set".to_string()))?;
        let queries = episode
            .slice(s![.., n_shot.., ..])
            .to_shape((n_way * self.n_query, dim))
            .map_err(|err| EvaluationError::Classifier(err.to_string()))?
            .to_owned();

        let mut scores = Array2::zeros((queries.nrows(), n_way));
        for (query, mut row) in queries.outer_iter().zip(scores.outer_iter_mut()) {
            for (prototype, score) in prototypes.outer_iter().zip(row.iter_mut()) {
                let diff = &query - &prototype;
                *score = -diff.dot(&diff);
            }
        }
        Ok(scores)
    }

    fn set_forward_adaptation(
        &mut self,
        episode: ArrayView3<'_, Feature>,
    ) -> Result<Array2<f32>, EvaluationError> {
        self.set_forward(episode)
    }
}

/// Builds [`NearestPrototype`] for every method; checkpoint state is ignored.
pub struct PrototypeFactory;

impl ClassifierFactory<Value> for PrototypeFactory {
    fn build(
        &self,
        _spec: &ClassifierSpec,
        _state: Option<&Value>,
    ) -> Result<Box<dyn FewShotClassifier>, EvaluationError> {
        Ok(Box::new(NearestPrototype { n_query: 0 }))
    }
}

pub fn build_prototype_factory() -> Box<dyn ClassifierFactory<Value>> {
    Box::new(PrototypeFactory)
}
