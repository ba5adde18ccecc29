use ndarray::{Array2, ArrayView3};

use crate::config::Method;
use crate::data::ModelState;
use crate::episode::Episode;
use crate::errors::EvaluationError;
use crate::types::{ClassIndex, Feature};

/// Loss variant a classifier was trained with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossType {
    /// Softmax cross-entropy over a linear head.
    Softmax,
    /// Cosine-distance head.
    Dist,
    /// Mean squared error on relation scores.
    Mse,
}

/// Construction-time backbone switches.
///
/// Passed to the factory for each classifier instead of toggling shared
/// state on backbone types, so two evaluations in one process never
/// contaminate each other.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackboneOptions {
    /// Build blocks whose weights can be overridden by fast weights (gradient meta-learning).
    pub gradient_meta: bool,
    /// Flatten the final feature map (relation networks keep it spatial).
    pub flatten: bool,
}

impl BackboneOptions {
    /// Backbone switches required by `method`.
    pub fn for_method(method: Method) -> Self {
        Self {
            gradient_meta: method.is_gradient_meta(),
            flatten: !matches!(method, Method::RelationNet | Method::RelationNetSoftmax),
        }
    }
}

/// Everything a factory needs to build one classifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierSpec {
    /// Strategy to build.
    pub method: Method,
    /// Backbone identifier.
    pub backbone: String,
    /// Backbone construction switches.
    pub backbone_options: BackboneOptions,
    /// Classes per evaluation episode.
    pub n_way: usize,
    /// Support instances per class.
    pub n_support: usize,
    /// Training objective variant.
    pub loss_type: LossType,
    /// First-order approximation (gradient meta-learning only).
    pub approx: bool,
}

impl ClassifierSpec {
    /// Spec for `method` on `backbone` with an `n_way`-way `n_support`-shot head.
    pub fn new(
        method: Method,
        backbone: impl Into<String>,
        n_way: usize,
        n_support: usize,
    ) -> Self {
        let loss_type = match method {
            Method::BaselinePlusPlus => LossType::Dist,
            Method::RelationNet => LossType::Mse,
            _ => LossType::Softmax,
        };
        Self {
            method,
            backbone: backbone.into(),
            backbone_options: BackboneOptions::for_method(method),
            n_way,
            n_support,
            loss_type,
            approx: method == Method::MamlApprox,
        }
    }
}

/// A few-shot classifier operating on precomputed features.
///
/// Implementations own their parameters. Scores are returned as a
/// `(n_way * n_query, n_way)` matrix, one row per query in class order.
pub trait FewShotClassifier {
    /// Set the per-class query count of the next episode.
    fn set_n_query(&mut self, n_query: usize);

    /// Fixed-parameter forward pass.
    fn set_forward(
        &mut self,
        episode: ArrayView3<'_, Feature>,
    ) -> Result<Array2<f32>, EvaluationError>;

    /// Forward pass preceded by test-time adaptation on the support set.
    fn set_forward_adaptation(
        &mut self,
        episode: ArrayView3<'_, Feature>,
    ) -> Result<Array2<f32>, EvaluationError>;
}

/// Builds classifiers from a spec and a trained model.
pub trait ClassifierFactory<S> {
    /// Build the classifier described by `spec`.
    ///
    /// `state` is `None` for methods that do not read checkpoint parameters.
    fn build(
        &self,
        spec: &ClassifierSpec,
        state: Option<&S>,
    ) -> Result<Box<dyn FewShotClassifier>, EvaluationError>;
}

/// Uniform `evaluate(episode) -> predictions` over any [`FewShotClassifier`].
pub struct ClassifierAdapter {
    method: Method,
    classifier: Box<dyn FewShotClassifier>,
    adaptation: bool,
}

impl ClassifierAdapter {
    /// Wrap an already built classifier.
    pub fn new(method: Method, classifier: Box<dyn FewShotClassifier>, adaptation: bool) -> Self {
        Self {
            method,
            classifier,
            adaptation,
        }
    }

    /// Build through `factory`, passing checkpoint parameters only to methods that load them.
    pub fn build<S>(
        factory: &dyn ClassifierFactory<S>,
        spec: &ClassifierSpec,
        model: &ModelState<S>,
        adaptation: bool,
    ) -> Result<Self, EvaluationError> {
        let state = spec.method.loads_checkpoint().then_some(&model.state);
        let classifier = factory.build(spec, state)?;
        Ok(Self::new(spec.method, classifier, adaptation))
    }

    /// Strategy behind this adapter.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Whether the adapted forward pass is used.
    pub fn adaptation(&self) -> bool {
        self.adaptation
    }

    /// Predict a class index in `0..n_way` for every query of `episode`, in class order.
    pub fn evaluate(&mut self, episode: &Episode) -> Result<Vec<ClassIndex>, EvaluationError> {
        let shape = episode.shape();
        self.classifier.set_n_query(shape.n_query);
        let scores = if self.adaptation {
            self.classifier.set_forward_adaptation(episode.data())?
        } else {
            self.classifier.set_forward(episode.data())?
        };
        let expected = (shape.query_len(), shape.n_way);
        if scores.dim() != expected {
            return Err(EvaluationError::Classifier(format!(
                "{} returned scores of shape {:?}, expected {:?}",
                self.method,
                scores.dim(),
                expected
            )));
        }
        Ok(argmax_rows(&scores))
    }
}

/// Column of the first maximum in each row.
fn argmax_rows(scores: &Array2<f32>) -> Vec<ClassIndex> {
    scores
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (idx, value)| {
                    if *value > best.1 { (idx, *value) } else { best }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskShape;
    use ndarray::Array3;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Scores the query's own first feature as the class index, so predictions echo the data.
    struct EchoClassifier {
        n_query: Rc<RefCell<Option<usize>>>,
        adapted_calls: Rc<RefCell<usize>>,
    }

    impl EchoClassifier {
        fn scores(&self, episode: ArrayView3<'_, Feature>) -> Array2<f32> {
            let (n_way, per_class, _) = episode.dim();
            let n_query = self.n_query.borrow().unwrap();
            let n_shot = per_class - n_query;
            let mut scores = Array2::zeros((n_way * n_query, n_way));
            for class in 0..n_way {
                for q in 0..n_query {
                    let target = episode[[class, n_shot + q, 0]] as usize;
                    scores[[class * n_query + q, target]] = 1.0;
                }
            }
            scores
        }
    }

    impl FewShotClassifier for EchoClassifier {
        fn set_n_query(&mut self, n_query: usize) {
            *self.n_query.borrow_mut() = Some(n_query);
        }

        fn set_forward(
            &mut self,
            episode: ArrayView3<'_, Feature>,
        ) -> Result<Array2<f32>, EvaluationError> {
            Ok(self.scores(episode))
        }

        fn set_forward_adaptation(
            &mut self,
            episode: ArrayView3<'_, Feature>,
        ) -> Result<Array2<f32>, EvaluationError> {
            *self.adapted_calls.borrow_mut() += 1;
            Ok(self.scores(episode))
        }
    }

    fn episode(n_way: usize, n_shot: usize, n_query: usize) -> Episode {
        let shape = TaskShape {
            n_way,
            n_shot,
            n_query,
        };
        let data = Array3::from_shape_fn((n_way, n_shot + n_query, 1), |(class, _, _)| {
            class as Feature
        });
        Episode::from_parts((0..n_way as i64).collect(), data, shape)
    }

    fn echo() -> (EchoClassifier, Rc<RefCell<Option<usize>>>, Rc<RefCell<usize>>) {
        let n_query = Rc::new(RefCell::new(None));
        let adapted = Rc::new(RefCell::new(0));
        (
            EchoClassifier {
                n_query: Rc::clone(&n_query),
                adapted_calls: Rc::clone(&adapted),
            },
            n_query,
            adapted,
        )
    }

    #[test]
    fn adapter_sets_query_count_and_takes_argmax() {
        let (classifier, n_query, adapted) = echo();
        let mut adapter = ClassifierAdapter::new(Method::ProtoNet, Box::new(classifier), false);
        let predictions = adapter.evaluate(&episode(4, 2, 3)).unwrap();
        assert_eq!(*n_query.borrow(), Some(3));
        assert_eq!(predictions, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3]);
        assert_eq!(*adapted.borrow(), 0);
    }

    #[test]
    fn adaptation_flag_selects_adapted_forward() {
        let (classifier, _, adapted) = echo();
        let mut adapter = ClassifierAdapter::new(Method::Baseline, Box::new(classifier), true);
        adapter.evaluate(&episode(2, 1, 1)).unwrap();
        assert_eq!(*adapted.borrow(), 1);
    }

    struct WrongShape;

    impl FewShotClassifier for WrongShape {
        fn set_n_query(&mut self, _: usize) {}

        fn set_forward(
            &mut self,
            _: ArrayView3<'_, Feature>,
        ) -> Result<Array2<f32>, EvaluationError> {
            Ok(Array2::zeros((1, 1)))
        }

        fn set_forward_adaptation(
            &mut self,
            episode: ArrayView3<'_, Feature>,
        ) -> Result<Array2<f32>, EvaluationError> {
            self.set_forward(episode)
        }
    }

    #[test]
    fn malformed_scores_are_rejected() {
        let mut adapter = ClassifierAdapter::new(Method::MatchingNet, Box::new(WrongShape), false);
        assert!(matches!(
            adapter.evaluate(&episode(3, 1, 2)),
            Err(EvaluationError::Classifier(_))
        ));
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        let scores =
            Array2::from_shape_vec((3, 3), vec![0.5, 0.5, 0.1, -1.0, -2.0, -0.5, 0.0, 0.0, 0.0])
                .unwrap();
        assert_eq!(argmax_rows(&scores), vec![0, 2, 0]);
    }

    #[test]
    fn spec_carries_method_specific_switches() {
        let relation = ClassifierSpec::new(Method::RelationNet, "Conv4", 5, 1);
        assert_eq!(relation.loss_type, LossType::Mse);
        assert!(!relation.backbone_options.flatten);
        assert!(!relation.backbone_options.gradient_meta);

        let relation_softmax = ClassifierSpec::new(Method::RelationNetSoftmax, "Conv4", 5, 1);
        assert_eq!(relation_softmax.loss_type, LossType::Softmax);

        let baseline_pp = ClassifierSpec::new(Method::BaselinePlusPlus, "ResNet10", 5, 5);
        assert_eq!(baseline_pp.loss_type, LossType::Dist);
        assert!(baseline_pp.backbone_options.flatten);

        let maml = ClassifierSpec::new(Method::MamlApprox, "Conv4", 5, 5);
        assert!(maml.approx);
        assert!(maml.backbone_options.gradient_meta);
        assert!(!ClassifierSpec::new(Method::Maml, "Conv4", 5, 5).approx);
    }

    struct RecordingFactory {
        saw_state: RefCell<Option<bool>>,
    }

    impl ClassifierFactory<u32> for RecordingFactory {
        fn build(
            &self,
            _: &ClassifierSpec,
            state: Option<&u32>,
        ) -> Result<Box<dyn FewShotClassifier>, EvaluationError> {
            *self.saw_state.borrow_mut() = Some(state.is_some());
            Ok(Box::new(WrongShape))
        }
    }

    #[test]
    fn baselines_do_not_receive_checkpoint_state() {
        let model = ModelState {
            state: 7_u32,
            epoch: 3,
        };
        for (method, expects_state) in [
            (Method::Baseline, false),
            (Method::BaselinePlusPlus, false),
            (Method::ProtoNet, true),
            (Method::RelationNetSoftmax, true),
        ] {
            let factory = RecordingFactory {
                saw_state: RefCell::new(None),
            };
            let spec = ClassifierSpec::new(method, "Conv4", 5, 5);
            let adapter = ClassifierAdapter::build(&factory, &spec, &model, false).unwrap();
            assert_eq!(adapter.method(), method);
            assert_eq!(*factory.saw_state.borrow(), Some(expects_state));
        }
    }
}
