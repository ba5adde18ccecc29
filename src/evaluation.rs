use std::path::PathBuf;

use tracing::{debug, info};

use crate::classifier::{ClassifierAdapter, ClassifierFactory, ClassifierSpec};
use crate::config::{EvaluationConfig, Method, Split};
use crate::constants::evaluation::{
    ADAPTATION_TASK_UPDATE_NUM, CONV_BACKBONE_PREFIX, CONV_IMAGE_SIZE, DEFAULT_IMAGE_SIZE,
    PROGRESS_LOG_INTERVAL,
};
use crate::data::{FeatureSet, ModelState};
use crate::episode::query_labels;
use crate::errors::EvaluationError;
use crate::metrics::{AccuracyRecord, AccuracySummary, episode_accuracy};
use crate::pool::FeaturePool;
use crate::results::{ResultLog, ResultRecord, experiment_setting};
use crate::rng::{EpisodeRng, resolve_seed};
use crate::sampler::{EpisodeSampler, Sampler};
use crate::types::{AccuracyPercent, SettingDescriptor};

/// Parameters handed to an image-episode runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageTaskRequest {
    /// Seed for every random draw the runner makes (image order, episode sampling, swaps).
    pub seed: u64,
    /// Square input side in pixels.
    pub image_size: usize,
    /// Number of episodes to run.
    pub n_episodes: usize,
    /// Classes per episode.
    pub n_way: usize,
    /// Support instances per class.
    pub n_shot: usize,
    /// Query instances per class.
    pub n_query: usize,
    /// Support label swaps per episode.
    pub n_swaps: usize,
    /// Partition images are loaded from.
    pub split: Split,
    /// Inner-loop update count override when adapting at test time.
    pub task_update_num: Option<usize>,
}

/// Mean and population std reported by an image-episode runner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageRunOutcome {
    /// Mean accuracy in percent.
    pub mean: f64,
    /// Population standard deviation of per-episode accuracy.
    pub std: f64,
}

/// Runs gradient meta-learners end to end on raw image episodes.
///
/// These methods need backbone gradients, so they bypass the feature pool
/// and do their own loading, sampling, and scoring.
pub trait ImageEpisodeRunner<S> {
    /// Evaluate `request.n_episodes` episodes with the model described by `spec`.
    fn run(
        &mut self,
        spec: &ClassifierSpec,
        state: &S,
        request: &ImageTaskRequest,
    ) -> Result<ImageRunOutcome, EvaluationError>;
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    /// Evaluated strategy.
    pub method: Method,
    /// Seed the run's RNG was initialised with.
    pub seed: u64,
    /// Descriptor written to the result log.
    pub setting: SettingDescriptor,
    /// Aggregate accuracy.
    pub summary: AccuracySummary,
    /// Per-episode accuracies (empty for image-episode runs).
    pub accuracies: Vec<AccuracyPercent>,
    /// Log the record was appended to.
    pub result_log: PathBuf,
}

impl EvaluationReport {
    /// Mean accuracy in percent.
    pub fn mean_accuracy(&self) -> f64 {
        self.summary.mean
    }
}

/// Episodic evaluation of one trained model.
///
/// Construction validates the configuration, so an unknown method fails
/// before any data is touched. A run either completes every episode and
/// appends one record to the result log, or fails and leaves the log as it
/// was.
#[derive(Clone, Debug)]
pub struct MethodEvaluation {
    config: EvaluationConfig,
    method: Method,
    result_log: ResultLog,
}

impl MethodEvaluation {
    /// Validate `config` and resolve its result log.
    pub fn new(config: EvaluationConfig) -> Result<Self, EvaluationError> {
        let method = config.validate()?;
        let result_log =
            ResultLog::for_run(&config.output_root, &config.dataset, &config.backbone, method);
        Ok(Self {
            config,
            method,
            result_log,
        })
    }

    /// Validated configuration.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Resolved strategy.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Result log this evaluation appends to.
    pub fn result_log(&self) -> &ResultLog {
        &self.result_log
    }

    /// Classifier description for the evaluation task.
    pub fn classifier_spec(&self) -> ClassifierSpec {
        ClassifierSpec::new(
            self.method,
            self.config.backbone.clone(),
            self.config.test_n_way,
            self.config.n_shot,
        )
    }

    /// Image-episode parameters derived from the configuration, seeded with `seed`.
    pub fn image_task_request(&self, seed: u64) -> ImageTaskRequest {
        let image_size = if self.config.backbone.starts_with(CONV_BACKBONE_PREFIX) {
            CONV_IMAGE_SIZE
        } else {
            DEFAULT_IMAGE_SIZE
        };
        ImageTaskRequest {
            seed,
            image_size,
            n_episodes: self.config.n_iter,
            n_way: self.config.test_n_way,
            n_shot: self.config.n_shot,
            n_query: self.config.n_query,
            n_swaps: self.config.n_swaps,
            split: self.config.split,
            task_update_num: self.config.adaptation.then_some(ADAPTATION_TASK_UPDATE_NUM),
        }
    }

    /// Build the classifier through `factory` and evaluate it on feature episodes.
    pub fn evaluate_features<S>(
        &self,
        model: &ModelState<S>,
        features: &FeatureSet,
        factory: &dyn ClassifierFactory<S>,
    ) -> Result<EvaluationReport, EvaluationError> {
        self.require_feature_method()?;
        let spec = self.classifier_spec();
        let mut adapter = ClassifierAdapter::build(factory, &spec, model, self.config.adaptation)?;
        self.evaluate_with_adapter(model.epoch, features, &mut adapter)
    }

    /// Evaluate an already built adapter on `n_iter` feature episodes.
    ///
    /// The adapter must wrap the configured method and use the configured
    /// forward pass, otherwise the record would describe a different run.
    pub fn evaluate_with_adapter(
        &self,
        epoch: i64,
        features: &FeatureSet,
        adapter: &mut ClassifierAdapter,
    ) -> Result<EvaluationReport, EvaluationError> {
        self.require_feature_method()?;
        if adapter.method() != self.method {
            return Err(EvaluationError::Configuration(format!(
                "adapter wraps {} but the evaluation is configured for {}",
                adapter.method(),
                self.method
            )));
        }
        if adapter.adaptation() != self.config.adaptation {
            return Err(EvaluationError::Configuration(format!(
                "adapter adaptation={} but the evaluation is configured with adaptation={}",
                adapter.adaptation(),
                self.config.adaptation
            )));
        }
        let seed = resolve_seed(self.config.random_seed);
        let rng = EpisodeRng::new(seed);

        let pool = FeaturePool::from_feature_set(features)?;
        info!(
            classes = pool.num_classes(),
            instances = pool.num_instances(),
            smallest_class = pool.min_class_size().unwrap_or(0),
            trimmed = features.len() - pool.num_instances(),
            "feature pool ready"
        );

        let n_iter = self.config.n_iter;
        let mut sampler =
            EpisodeSampler::new(&pool, self.config.task_shape(), self.config.n_swaps, rng);
        info!(
            n_way = sampler.shape().n_way,
            per_class = sampler.shape().per_class(),
            n_swaps = sampler.n_swaps(),
            "sampling episodes"
        );
        let truth = query_labels(sampler.shape());
        let mut record = AccuracyRecord::with_capacity(n_iter);
        for iteration in 0..n_iter {
            let episode = sampler.next_episode()?;
            let predictions = adapter.evaluate(&episode)?;
            let accuracy = episode_accuracy(&predictions, &truth);
            debug!(iteration, accuracy, "episode scored");
            record.push(accuracy);
            if iteration % PROGRESS_LOG_INTERVAL == 0 {
                info!("{}/{}", iteration, n_iter);
            }
        }

        let summary = record.summarize().ok_or_else(|| {
            EvaluationError::Configuration("no episodes were evaluated".to_string())
        })?;
        self.finish(seed, epoch, summary, record.values().to_vec())
    }

    /// Evaluate a gradient meta-learner through `runner` on raw image episodes.
    pub fn evaluate_images<S>(
        &self,
        model: &ModelState<S>,
        runner: &mut dyn ImageEpisodeRunner<S>,
    ) -> Result<EvaluationReport, EvaluationError> {
        if !self.method.is_gradient_meta() {
            return Err(EvaluationError::Configuration(format!(
                "{} is evaluated on precomputed features, not image episodes",
                self.method
            )));
        }
        let seed = resolve_seed(self.config.random_seed);
        let request = self.image_task_request(seed);
        info!(
            image_size = request.image_size,
            episodes = request.n_episodes,
            "running image episodes"
        );
        let outcome = runner.run(&self.classifier_spec(), &model.state, &request)?;
        let summary = AccuracySummary::from_moments(request.n_episodes, outcome.mean, outcome.std);
        self.finish(seed, model.epoch, summary, Vec::new())
    }

    fn require_feature_method(&self) -> Result<(), EvaluationError> {
        if self.method.is_gradient_meta() {
            return Err(EvaluationError::Configuration(format!(
                "{} needs backbone gradients and runs on image episodes, not cached features",
                self.method
            )));
        }
        Ok(())
    }

    fn finish(
        &self,
        seed: u64,
        epoch: i64,
        summary: AccuracySummary,
        accuracies: Vec<AccuracyPercent>,
    ) -> Result<EvaluationReport, EvaluationError> {
        info!("{}", summary.accuracy_line());
        let setting = experiment_setting(&self.config, self.method);
        self.result_log.append(&ResultRecord {
            setting: setting.clone(),
            epoch,
            summary,
        })?;
        info!(path = %self.result_log.path().display(), "result appended");
        Ok(EvaluationReport {
            method: self.method,
            seed,
            setting,
            summary,
            accuracies,
            result_log: self.result_log.path().to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(method: &str, backbone: &str) -> EvaluationConfig {
        EvaluationConfig {
            method: method.to_string(),
            backbone: backbone.to_string(),
            output_root: PathBuf::from("unused"),
            ..EvaluationConfig::default()
        }
    }

    #[test]
    fn unknown_method_fails_at_construction() {
        assert!(matches!(
            MethodEvaluation::new(config("prototype", "Conv4")),
            Err(EvaluationError::UnknownMethod(_))
        ));
    }

    #[test]
    fn image_request_follows_backbone_and_adaptation() {
        let conv = MethodEvaluation::new(config("maml", "Conv6")).unwrap();
        let request = conv.image_task_request(3);
        assert_eq!(request.seed, 3);
        assert_eq!(request.image_size, 84);
        assert_eq!(request.task_update_num, None);
        assert_eq!(request.n_episodes, 600);

        let resnet = MethodEvaluation::new(EvaluationConfig {
            adaptation: true,
            ..config("maml_approx", "ResNet10")
        })
        .unwrap();
        let request = resnet.image_task_request(3);
        assert_eq!(request.image_size, 224);
        assert_eq!(request.task_update_num, Some(100));
        assert!(resnet.classifier_spec().approx);
    }

    struct FixedRunner {
        seen: Option<ImageTaskRequest>,
    }

    impl ImageEpisodeRunner<()> for FixedRunner {
        fn run(
            &mut self,
            spec: &ClassifierSpec,
            _: &(),
            request: &ImageTaskRequest,
        ) -> Result<ImageRunOutcome, EvaluationError> {
            assert!(spec.backbone_options.gradient_meta);
            self.seen = Some(request.clone());
            Ok(ImageRunOutcome {
                mean: 62.5,
                std: 10.0,
            })
        }
    }

    #[test]
    fn image_path_aggregates_and_persists_runner_outcome() {
        let dir = tempdir().unwrap();
        let evaluation = MethodEvaluation::new(EvaluationConfig {
            output_root: dir.path().to_path_buf(),
            n_iter: 100,
            random_seed: Some(5),
            ..config("maml", "Conv4")
        })
        .unwrap();
        let mut runner = FixedRunner { seen: None };
        let model = ModelState {
            state: (),
            epoch: 12,
        };
        let report = evaluation.evaluate_images(&model, &mut runner).unwrap();
        assert_eq!(report.seed, 5);
        assert_eq!(report.mean_accuracy(), 62.5);
        assert!((report.summary.half_width - 1.96).abs() < 1e-12);
        assert!(report.accuracies.is_empty());
        let request = runner.seen.take().unwrap();
        assert_eq!(request.n_episodes, 100);
        assert_eq!(request.seed, 5);

        let contents = std::fs::read_to_string(&report.result_log).unwrap();
        assert_eq!(
            contents,
            "Setting: CUB-novel-Conv4-maml 5shot 5way_train 5way_test\n \
             Retrieved model from epoch 12\n \
             Acc: 100 Test Acc = 62.50% +- 1.96% \n"
        );
    }

    #[test]
    fn image_runner_receives_the_configured_seed() {
        let dir = tempdir().unwrap();
        let model = ModelState {
            state: (),
            epoch: 1,
        };
        let mut seeds = Vec::new();
        for seed in [1, 2] {
            let evaluation = MethodEvaluation::new(EvaluationConfig {
                output_root: dir.path().to_path_buf(),
                random_seed: Some(seed),
                ..config("maml_approx", "Conv4")
            })
            .unwrap();
            let mut runner = FixedRunner { seen: None };
            let report = evaluation.evaluate_images(&model, &mut runner).unwrap();
            let request = runner.seen.unwrap();
            assert_eq!(request.seed, report.seed);
            seeds.push(request.seed);
        }
        assert_eq!(seeds, vec![1, 2]);
    }

    #[test]
    fn feature_and_image_paths_are_not_interchangeable() {
        let protonet = MethodEvaluation::new(config("protonet", "Conv4")).unwrap();
        let model = ModelState {
            state: (),
            epoch: 0,
        };
        let mut runner = FixedRunner { seen: None };
        assert!(matches!(
            protonet.evaluate_images(&model, &mut runner),
            Err(EvaluationError::Configuration(_))
        ));
        assert!(runner.seen.is_none());

        let maml = MethodEvaluation::new(config("maml", "Conv4")).unwrap();
        assert!(matches!(
            maml.require_feature_method(),
            Err(EvaluationError::Configuration(_))
        ));
    }
}
