use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::evaluation::BEST_CHECKPOINT_ITER;
use crate::constants::results::DEFAULT_OUTPUT_ROOT;
use crate::errors::EvaluationError;
use crate::types::{BackboneId, DatasetId};

/// Closed set of few-shot classification strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Linear head fine-tuned on the support set.
    Baseline,
    /// Cosine-distance head fine-tuned on the support set.
    BaselinePlusPlus,
    /// Prototypical networks.
    ProtoNet,
    /// Matching networks.
    MatchingNet,
    /// Relation networks trained with an MSE objective.
    RelationNet,
    /// Relation networks trained with a softmax objective.
    RelationNetSoftmax,
    /// Model-agnostic meta-learning.
    Maml,
    /// First-order approximation of MAML.
    MamlApprox,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Method; 8] = [
        Method::Baseline,
        Method::BaselinePlusPlus,
        Method::ProtoNet,
        Method::MatchingNet,
        Method::RelationNet,
        Method::RelationNetSoftmax,
        Method::Maml,
        Method::MamlApprox,
    ];

    /// Stable identifier used in configs, paths, and result lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Baseline => "baseline",
            Method::BaselinePlusPlus => "baseline++",
            Method::ProtoNet => "protonet",
            Method::MatchingNet => "matchingnet",
            Method::RelationNet => "relationnet",
            Method::RelationNetSoftmax => "relationnet_softmax",
            Method::Maml => "maml",
            Method::MamlApprox => "maml_approx",
        }
    }

    /// Baselines fit a fresh head per episode and never read checkpoint parameters.
    pub fn is_baseline(self) -> bool {
        matches!(self, Method::Baseline | Method::BaselinePlusPlus)
    }

    /// Gradient meta-learners need backbone gradients, so they run on raw images.
    pub fn is_gradient_meta(self) -> bool {
        matches!(self, Method::Maml | Method::MamlApprox)
    }

    /// Whether the trained parameter set must be handed to the classifier.
    pub fn loads_checkpoint(self) -> bool {
        !self.is_baseline()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = EvaluationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str() == raw)
            .ok_or_else(|| EvaluationError::UnknownMethod(raw.to_string()))
    }
}

/// Dataset partition the evaluation features were extracted from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Classes seen during training.
    Base,
    /// Held-out validation classes.
    Val,
    /// Novel classes never seen during training.
    #[default]
    Novel,
}

impl Split {
    /// Stable identifier used in result lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Base => "base",
            Split::Val => "val",
            Split::Novel => "novel",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = EvaluationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "base" => Ok(Split::Base),
            "val" => Ok(Split::Val),
            "novel" => Ok(Split::Novel),
            other => Err(EvaluationError::Configuration(format!(
                "unknown split '{other}': expected base, val or novel"
            ))),
        }
    }
}

/// Shape of one N-way K-shot task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskShape {
    /// Number of classes per episode.
    pub n_way: usize,
    /// Labeled support instances per class.
    pub n_shot: usize,
    /// Query instances per class.
    pub n_query: usize,
}

impl TaskShape {
    /// Instances drawn per class (`n_shot + n_query`).
    pub fn per_class(&self) -> usize {
        self.n_shot + self.n_query
    }

    /// Total query instances in one episode.
    pub fn query_len(&self) -> usize {
        self.n_way * self.n_query
    }

    /// Upper bound on support label swaps: each swap pairs two support cells.
    pub fn max_label_swaps(&self) -> usize {
        if self.n_way < 2 {
            0
        } else {
            self.n_way * self.n_shot / 2
        }
    }

    /// Reject shapes no pool can satisfy.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.n_way == 0 {
            return Err(EvaluationError::Configuration(
                "n_way must be at least 1".to_string(),
            ));
        }
        if self.n_shot == 0 {
            return Err(EvaluationError::Configuration(
                "n_shot must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level evaluation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Dataset identifier (for example `CUB` or `miniImageNet`).
    pub dataset: DatasetId,
    /// Backbone identifier (for example `Conv4` or `ResNet18`).
    pub backbone: BackboneId,
    /// Method identifier; parsed into [`Method`] by [`EvaluationConfig::validate`].
    pub method: String,
    /// Classes per task used when the model was trained.
    pub train_n_way: usize,
    /// Classes per evaluation episode.
    pub test_n_way: usize,
    /// Labeled support instances per class.
    pub n_shot: usize,
    /// Query instances per class.
    pub n_query: usize,
    /// Whether training used data augmentation (descriptor only).
    pub train_aug: bool,
    /// Partition the features were extracted from.
    pub split: Split,
    /// Checkpoint epoch the features come from; `-1` selects the best checkpoint.
    pub save_iter: i64,
    /// Number of independent episodes.
    pub n_iter: usize,
    /// Run the test-time-adapted forward pass instead of the fixed one.
    pub adaptation: bool,
    /// RNG seed; a fresh seed is drawn and reported when `None`.
    pub random_seed: Option<u64>,
    /// Support label swaps applied to every episode.
    pub n_swaps: usize,
    /// Root directory for per-run result logs.
    pub output_root: PathBuf,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dataset: "CUB".to_string(),
            backbone: "Conv4".to_string(),
            method: Method::Baseline.as_str().to_string(),
            train_n_way: 5,
            test_n_way: 5,
            n_shot: 5,
            n_query: 15,
            train_aug: false,
            split: Split::Novel,
            save_iter: BEST_CHECKPOINT_ITER,
            n_iter: 600,
            adaptation: false,
            random_seed: None,
            n_swaps: 0,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
        }
    }
}

impl EvaluationConfig {
    /// Evaluation task shape (`test_n_way`, `n_shot`, `n_query`).
    pub fn task_shape(&self) -> TaskShape {
        TaskShape {
            n_way: self.test_n_way,
            n_shot: self.n_shot,
            n_query: self.n_query,
        }
    }

    /// Split descriptor, suffixed with the checkpoint epoch unless the best one is used.
    pub fn split_descriptor(&self) -> String {
        if self.save_iter != BEST_CHECKPOINT_ITER {
            format!("{}_{}", self.split, self.save_iter)
        } else {
            self.split.to_string()
        }
    }

    /// Parse the method and check task parameters.
    ///
    /// The method is resolved first so an unknown identifier is reported
    /// before any other problem.
    pub fn validate(&self) -> Result<Method, EvaluationError> {
        let method = self.method.parse::<Method>()?;
        let shape = self.task_shape();
        shape.validate()?;
        if self.n_iter == 0 {
            return Err(EvaluationError::Configuration(
                "n_iter must be at least 1".to_string(),
            ));
        }
        if self.n_swaps > shape.max_label_swaps() {
            return Err(EvaluationError::Configuration(format!(
                "n_swaps={} exceeds the {} support pairs available for a {}-way {}-shot task",
                self.n_swaps,
                shape.max_label_swaps(),
                shape.n_way,
                shape.n_shot
            )));
        }
        Ok(method)
    }
}
