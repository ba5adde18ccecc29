use std::io;

use thiserror::Error;

use crate::types::ClassLabel;

/// Error type for configuration, sampling, classifier, and persistence failures.
///
/// Every variant is fatal to an evaluation run; nothing in this crate retries.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("feature pool has {available} classes but {requested} are required per episode")]
    InsufficientClasses { requested: usize, available: usize },
    #[error(
        "class {label} has {available} instances but {requested} are required (n_shot + n_query)"
    )]
    InsufficientInstances {
        label: ClassLabel,
        requested: usize,
        available: usize,
    },
    #[error("unknown method '{0}'")]
    UnknownMethod(String),
    #[error("features and labels are misaligned: {features} feature rows vs {labels} labels")]
    FeatureAlignment { features: usize, labels: usize },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("classifier failure: {0}")]
    Classifier(String),
    #[error("serialization failure: {0}")]
    Serialization(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
