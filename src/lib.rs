#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Classifier traits, construction specs, and the prediction adapter.
pub mod classifier;
/// Evaluation configuration, method identifiers, and task shapes.
pub mod config;
/// Centralized constants used across evaluation, metrics, and result logs.
pub mod constants;
/// Feature files and trained model state.
pub mod data;
/// Sampled episode tensors.
pub mod episode;
/// Episodic evaluation driver.
pub mod evaluation;
/// Reusable CLI runners shared by downstream crates.
pub mod example_apps;
/// Accuracy aggregation and confidence intervals.
pub mod metrics;
/// Support label noise.
pub mod noise;
/// Per-class feature pools.
pub mod pool;
/// Result records and the append-only result log.
pub mod results;
/// Seeded episode RNG.
pub mod rng;
/// Episode sampler implementations.
pub mod sampler;
/// Shared type aliases.
pub mod types;

mod errors;

pub use classifier::{
    BackboneOptions, ClassifierAdapter, ClassifierFactory, ClassifierSpec, FewShotClassifier,
    LossType,
};
pub use config::{EvaluationConfig, Method, Split, TaskShape};
pub use data::{FeatureSet, ModelState};
pub use episode::Episode;
pub use errors::EvaluationError;
pub use evaluation::{
    EvaluationReport, ImageEpisodeRunner, ImageRunOutcome, ImageTaskRequest, MethodEvaluation,
};
pub use metrics::{AccuracyRecord, AccuracySummary};
pub use pool::FeaturePool;
pub use results::{ResultLog, ResultRecord};
pub use rng::EpisodeRng;
pub use sampler::{EpisodeSampler, Sampler};
pub use types::{
    AccuracyPercent, BackboneId, ClassIndex, ClassLabel, DatasetId, Feature, SettingDescriptor,
};
